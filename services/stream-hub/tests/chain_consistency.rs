//! Consistency tests for chained hubs
//!
//! Every scenario checks the central guarantee: once a call into the graph
//! returns, each hub holds exactly what a from-scratch computation over its
//! provider's current cache produces.
//!
//! Tests include:
//! - Late arrivals, corrections and deletions through a three-level chain
//! - Idempotent redelivery
//! - Overflow teardown
//! - Pruning to a maximum cache size
//! - Bar aggregation and Donchian rollback
//! - Random operation sequences (proptest)

use std::cell::RefCell;
use std::rc::{Rc, Weak};

use proptest::prelude::*;
use rust_decimal::Decimal;

use stream_hub::indicators::{
    BarPeriod, Donchian, DonchianResult, Ema, EmaResult, QuoteAggregator, QuotePart, Sma,
    SmaResult,
};
use stream_hub::{Act, Hub, HubConfig, SourceHub, StreamObserver, StreamProvider, Subscription};
use types::errors::StreamError;
use types::quote::Quote;
use types::series::TimeValue;
use types::timestamp::Timestamp;

const SECOND: i64 = 1_000_000_000;
const MINUTE: i64 = 60 * SECOND;

fn init_tracing() {
    let _ = tracing_subscriber::fmt().with_test_writer().try_init();
}

fn ts(minutes: i64) -> Timestamp {
    Timestamp::from_nanos(minutes * MINUTE)
}

fn at(minutes: i64, value: f64) -> TimeValue {
    TimeValue::new(ts(minutes), Some(value))
}

/// SMA(3) -> EMA(3) -> SMA(2) over a value source.
struct Chain {
    source: SourceHub<TimeValue>,
    sma: Hub<TimeValue, SmaResult, Sma>,
    ema: Hub<SmaResult, EmaResult, Ema>,
    smooth: Hub<EmaResult, SmaResult, Sma>,
}

type Outputs = (Vec<SmaResult>, Vec<EmaResult>, Vec<SmaResult>);

impl Chain {
    /// Load `items` into a fresh source first, then attach the hubs.
    fn build(name: &str, items: Vec<TimeValue>) -> Self {
        let source = SourceHub::with_defaults(name).unwrap();
        source.add_batch(items).unwrap();
        let sma = source.chain(Sma::new(3).unwrap()).unwrap();
        let ema = sma.chain(Ema::new(3).unwrap()).unwrap();
        let smooth = ema.chain(Sma::new(2).unwrap()).unwrap();
        Self {
            source,
            sma,
            ema,
            smooth,
        }
    }

    fn outputs(&self) -> Outputs {
        (self.sma.snapshot(), self.ema.snapshot(), self.smooth.snapshot())
    }

    fn assert_matches_fresh(&self) {
        assert!(self.source.results().windows(2).all(|w| w[0].timestamp < w[1].timestamp));
        let fresh = Chain::build("FRESH", self.source.snapshot());
        assert_eq!(self.outputs(), fresh.outputs());
    }
}

#[derive(Default)]
struct Recorder {
    adds: RefCell<usize>,
    rebuilds: RefCell<Vec<Timestamp>>,
    prunes: RefCell<Vec<Timestamp>>,
    errors: RefCell<usize>,
    completed: RefCell<bool>,
}

impl<T> StreamObserver<T> for Recorder {
    fn on_add(&self, _item: &T, _index: Option<usize>) -> Result<(), StreamError> {
        *self.adds.borrow_mut() += 1;
        Ok(())
    }

    fn on_rebuild(&self, from: Timestamp) -> Result<(), StreamError> {
        self.rebuilds.borrow_mut().push(from);
        Ok(())
    }

    fn on_prune(&self, to: Timestamp) -> Result<(), StreamError> {
        self.prunes.borrow_mut().push(to);
        Ok(())
    }

    fn on_error(&self, _error: &StreamError) {
        *self.errors.borrow_mut() += 1;
    }

    fn on_completed(&self) {
        *self.completed.borrow_mut() = true;
    }
}

fn record<T: 'static>(provider: Rc<dyn StreamProvider<T>>) -> (Rc<Recorder>, Subscription) {
    let recorder = Rc::new(Recorder::default());
    let weak: Weak<dyn StreamObserver<T>> = Rc::<Recorder>::downgrade(&recorder);
    let handle = provider.subscribe(weak);
    (recorder, handle)
}

#[test]
fn test_late_arrival_equals_full_replay() {
    init_tracing();
    let chain = Chain::build("LIVE", Vec::new());

    for m in [1, 2, 4, 5, 7, 8, 9] {
        chain.source.add(at(m, m as f64 * 1.5)).unwrap();
    }
    assert_eq!(chain.source.add(at(3, 4.0)).unwrap(), Act::AddOld);
    assert_eq!(chain.source.add(at(6, 10.0)).unwrap(), Act::AddOld);
    assert_eq!(chain.source.add(at(0, 1.0)).unwrap(), Act::AddOld);

    assert_eq!(chain.smooth.len(), 10);
    chain.assert_matches_fresh();
}

#[test]
fn test_correction_cascades() {
    init_tracing();
    let items = (0..12).map(|m| at(m, 10.0 + m as f64)).collect();
    let chain = Chain::build("LIVE", items);

    assert_eq!(chain.source.add(at(5, 99.0)).unwrap(), Act::Update);
    assert_eq!(chain.source.add(at(11, 0.5)).unwrap(), Act::Update);

    chain.assert_matches_fresh();
}

#[test]
fn test_deletion_cascades() {
    init_tracing();
    let items = (0..12).map(|m| at(m, 10.0 + (m % 4) as f64)).collect();
    let chain = Chain::build("LIVE", items);

    chain.source.remove(&at(4, 10.0)).unwrap();
    chain.source.remove_at(0).unwrap();
    assert_eq!(chain.source.remove_range(ts(10)).unwrap(), 2);

    assert!(chain.ema.results().iter().all(|r| r.timestamp != ts(4)));
    assert_eq!(chain.smooth.len(), 8);
    chain.assert_matches_fresh();
}

#[test]
fn test_identical_redelivery_is_ignored() {
    init_tracing();
    let items: Vec<TimeValue> = (0..6).map(|m| at(m, m as f64)).collect();
    let chain = Chain::build("LIVE", items);
    let (recorder, _handle) = record(chain.sma.provider());
    let before = chain.outputs();

    assert_eq!(chain.source.add(at(5, 5.0)).unwrap(), Act::Ignore);
    assert_eq!(chain.source.add(at(5, 5.0)).unwrap(), Act::Ignore);

    assert_eq!(chain.outputs(), before);
    assert_eq!(*recorder.adds.borrow(), 0);
    assert!(recorder.rebuilds.borrow().is_empty());
}

#[test]
fn test_overflow_faults_source_and_unsubscribes_chain() {
    init_tracing();
    let items = (0..10).map(|m| at(m, 10.0)).collect();
    let chain = Chain::build("LIVE", items);
    let (recorder, _handle) = record(chain.sma.provider());
    let (root, _root_handle) = record(chain.source.provider());

    for _ in 0..100 {
        assert_eq!(chain.source.add(at(9, 10.0)).unwrap(), Act::Ignore);
    }
    let err = chain.source.add(at(9, 10.0)).unwrap_err();

    assert!(err.is_overflow());
    assert!(chain.source.is_faulted());
    assert!(!chain.source.has_subscribers());
    assert!(!chain.sma.is_subscribed());
    assert_eq!(*recorder.errors.borrow(), 1);
    assert!(*root.completed.borrow());
    assert!(!*recorder.completed.borrow());
    assert_eq!(chain.source.len(), 10);
    assert_eq!(chain.sma.len(), 10);

    // A genuinely new item clears the fault; the chain stays detached.
    assert_eq!(chain.source.add(at(10, 11.0)).unwrap(), Act::Add);
    assert!(!chain.source.is_faulted());
    assert_eq!(chain.sma.len(), 10);

    chain.sma.reinitialize().unwrap();
    assert_eq!(chain.sma.len(), 11);
    assert!(chain.sma.is_subscribed());
}

#[test]
fn test_source_remove_range_notifies_newest_first() {
    init_tracing();
    let items = (0..5).map(|m| at(m, m as f64)).collect();
    let chain = Chain::build("LIVE", items);
    let (recorder, _handle) = record(chain.source.provider());

    assert_eq!(chain.source.remove_range(ts(2)).unwrap(), 3);

    assert_eq!(*recorder.rebuilds.borrow(), vec![ts(4), ts(3), ts(2)]);
    assert_eq!(chain.sma.len(), 2);
    chain.assert_matches_fresh();
}

#[test]
fn test_chain_inherits_config_through_levels() {
    let config: HubConfig =
        serde_json::from_str(r#"{"overflow_threshold": 12, "max_cache_size": 64}"#).unwrap();
    let source = SourceHub::<TimeValue>::new("CONFIGURED", config.clone()).unwrap();
    let sma = source.chain(Sma::new(2).unwrap()).unwrap();
    let ema = sma.chain(Ema::new(2).unwrap()).unwrap();

    assert_eq!(sma.config(), &config);
    assert_eq!(ema.config(), &config);
    assert_eq!(ema.label(), "EMA(2)");
    assert_eq!(ema.config().max_cache_size, Some(64));
}

type Windowed = (
    SourceHub<TimeValue>,
    Hub<TimeValue, SmaResult, Sma>,
    Hub<SmaResult, SmaResult, Sma>,
);

/// SMA(3) -> SMA(2). Each result reads a fixed provider window, so a pruned
/// chain can be compared with one built over what it retained.
fn windowed(config: HubConfig, items: Vec<TimeValue>) -> Windowed {
    let source = SourceHub::new("WINDOWED", config).unwrap();
    source.add_batch(items).unwrap();
    let sma = source.chain(Sma::new(3).unwrap()).unwrap();
    let smooth = sma.chain(Sma::new(2).unwrap()).unwrap();
    (source, sma, smooth)
}

#[test]
fn test_capped_chain_stays_bounded_and_matches_retained_window() {
    init_tracing();
    let (source, sma, smooth) = windowed(HubConfig::default().with_max_cache_size(20), Vec::new());
    let (recorder, _handle) = record(smooth.provider());

    for i in 0..100 {
        let m = 2 * i;
        source.add(at(m, 10.0 + (i % 7) as f64)).unwrap();
        if i % 10 == 9 {
            assert_eq!(source.add(at(m - 5, 3.0)).unwrap(), Act::AddOld);
            assert_eq!(source.add(at(m - 2, 50.0)).unwrap(), Act::Update);
        }
        assert!(source.len() <= 20);
        assert!(sma.len() <= 20);
        assert!(smooth.len() <= 20);
    }

    assert_eq!((source.len(), sma.len(), smooth.len()), (20, 20, 20));
    assert!(!recorder.prunes.borrow().is_empty());

    // Past the warmup rows, results equal a chain built over the retained
    // source window alone.
    let (_, fresh_sma, fresh_smooth) = windowed(HubConfig::default(), source.snapshot());
    assert_eq!(fresh_sma.results()[1].sma, None);
    assert_eq!(sma.snapshot()[2..], fresh_sma.snapshot()[2..]);
    assert_eq!(smooth.snapshot()[3..], fresh_smooth.snapshot()[3..]);
}

fn tick(millis: i64, price: i64) -> Quote {
    Quote::flat(
        Timestamp::from_nanos(millis * 1_000_000),
        Decimal::from(price),
        Decimal::ONE,
    )
}

fn bars_from_scratch(ticks: Vec<Quote>) -> (Vec<Quote>, Vec<SmaResult>) {
    let source = SourceHub::with_defaults("FRESH").unwrap();
    source.add_batch(ticks).unwrap();
    let bars = source.chain(QuoteAggregator::new(BarPeriod::M1)).unwrap();
    let closes = bars.chain(QuotePart::Close).unwrap();
    let sma = closes.chain(Sma::new(2).unwrap()).unwrap();
    (bars.snapshot(), sma.snapshot())
}

#[test]
fn test_aggregated_bars_equal_rebuild_from_scratch() {
    init_tracing();
    let source = SourceHub::with_defaults("TICKS").unwrap();
    let bars = source.chain(QuoteAggregator::new(BarPeriod::M1)).unwrap();
    let closes = bars.chain(QuotePart::Close).unwrap();
    let sma = closes.chain(Sma::new(2).unwrap()).unwrap();

    for (millis, price) in [(0, 10), (10_000, 12), (50_000, 9), (70_000, 11), (130_000, 14)] {
        source.add(tick(millis, price)).unwrap();
    }
    assert_eq!(bars.len(), 3);

    // Late tick into the first bar, a correction, and a deletion.
    assert_eq!(source.add(tick(30_000, 20)).unwrap(), Act::AddOld);
    assert_eq!(source.add(tick(70_000, 8)).unwrap(), Act::Update);
    source.remove(&tick(130_000, 14)).unwrap();

    let expected = bars_from_scratch(source.snapshot());
    assert_eq!((bars.snapshot(), sma.snapshot()), expected);

    let settled = bars.snapshot();
    let first = &settled[0];
    assert_eq!(first.open, Decimal::from(10));
    assert_eq!(first.high, Decimal::from(20));
    assert_eq!(first.close, Decimal::from(9));
    assert_eq!(first.volume, Decimal::from(4));
}

#[test]
fn test_many_ticks_per_bar_do_not_trip_overflow() {
    init_tracing();
    let source = SourceHub::with_defaults("TICKS").unwrap();
    let bars = source.chain(QuoteAggregator::new(BarPeriod::M1)).unwrap();

    for i in 0..150 {
        source.add(tick(i * 100, 100 + i % 7)).unwrap();
    }

    assert!(!bars.is_faulted());
    assert!(bars.is_subscribed());
    assert_eq!(bars.len(), 1);
    assert_eq!(bars.results()[0].volume, Decimal::from(150));
}

fn quote(minutes: i64, high: i64, low: i64) -> Quote {
    let mid = Decimal::from(high + low) / Decimal::TWO;
    Quote::new(ts(minutes), mid, Decimal::from(high), Decimal::from(low), mid, Decimal::ONE)
}

fn donchian_from_scratch(quotes: Vec<Quote>) -> Vec<DonchianResult> {
    let source = SourceHub::with_defaults("FRESH").unwrap();
    source.add_batch(quotes).unwrap();
    source.chain(Donchian::new(4).unwrap()).unwrap().snapshot()
}

#[test]
fn test_donchian_windows_roll_back_on_late_arrival() {
    init_tracing();
    let source = SourceHub::with_defaults("QUOTES").unwrap();
    let channel = source.chain(Donchian::new(4).unwrap()).unwrap();

    for m in (0..20).filter(|m| m % 5 != 2) {
        let high = 100 + (m * 7) % 11;
        source.add(quote(m, high, high - 5)).unwrap();
    }
    source.add(quote(7, 130, 90)).unwrap();
    source.add(quote(12, 95, 60)).unwrap();
    source.remove_at(3).unwrap();

    assert_eq!(channel.snapshot(), donchian_from_scratch(source.snapshot()));
    assert!(channel.results().iter().any(|r| r.upper == Some(Decimal::from(130))));
}

#[derive(Debug, Clone)]
enum Op {
    Add(i64, i32),
    RemoveAt(usize),
}

fn op() -> impl Strategy<Value = Op> {
    prop_oneof![
        4 => (0i64..40, -50i32..50).prop_map(|(m, v)| Op::Add(m, v)),
        1 => (0usize..64).prop_map(Op::RemoveAt),
    ]
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(64))]

    #[test]
    fn prop_any_sequence_matches_full_replay(ops in prop::collection::vec(op(), 1..64)) {
        let chain = Chain::build("LIVE", Vec::new());

        for op in ops {
            match op {
                Op::Add(m, v) => {
                    chain.source.add(at(m, v as f64)).unwrap();
                }
                Op::RemoveAt(i) => {
                    let len = chain.source.len();
                    if len > 0 {
                        chain.source.remove_at(i % len).unwrap();
                    }
                }
            }
        }

        let stamps: Vec<Timestamp> = chain.source.results().iter().map(|r| r.timestamp).collect();
        prop_assert!(stamps.windows(2).all(|w| w[0] < w[1]));

        let fresh = Chain::build("FRESH", chain.source.snapshot());
        prop_assert_eq!(chain.outputs(), fresh.outputs());
    }
}
