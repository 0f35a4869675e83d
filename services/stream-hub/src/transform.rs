//! Transform contract implemented by concrete indicators
//!
//! A hub resolves where its input lives in the provider cache, then asks the
//! transform for the output at that position. The output must depend only on
//! the provider prefix up to that position, on the hub's own results before
//! it, and on auxiliary state that `rollback` rewinds.

use types::errors::StreamError;
use types::series::Series;
use types::timestamp::Timestamp;

use crate::cache::TimeSeriesCache;

/// Read-only inputs available to a transform.
pub struct Context<'a, I, O> {
    /// The provider's published cache.
    pub provider: &'a TimeSeriesCache<I>,
    /// This hub's own results, settled up to (not including) the entry
    /// being computed.
    pub results: &'a TimeSeriesCache<O>,
}

impl<'a, I: Series, O: Series> Context<'a, I, O> {
    pub fn new(provider: &'a TimeSeriesCache<I>, results: &'a TimeSeriesCache<O>) -> Self {
        Self { provider, results }
    }

    /// Own result for the provider entry one position before `index`.
    ///
    /// Matched by timestamp, so the two caches may have pruned different
    /// prefixes.
    pub fn previous_result(&self, index: usize) -> Option<&'a O> {
        let prev = index.checked_sub(1)?;
        let input = self.provider.get(prev)?;
        let at = self.results.find_index(input.timestamp())?;
        self.results.get(at)
    }

    /// The `len` provider entries ending at `index` inclusive.
    pub fn window(&self, index: usize, len: usize) -> Option<&'a [I]> {
        if len == 0 || index + 1 < len || index >= self.provider.len() {
            return None;
        }
        Some(&self.provider.as_slice()[index + 1 - len..=index])
    }
}

/// Resolve the provider index of `input`.
///
/// A hint is trusted when the provider entry at that position carries the
/// same timestamp; otherwise an exact search is made.
pub fn resolve_index<I: Series>(
    provider: &TimeSeriesCache<I>,
    input: &I,
    hint: Option<usize>,
) -> Result<usize, StreamError> {
    if let Some(index) = hint {
        if provider
            .get(index)
            .is_some_and(|cached| cached.timestamp() == input.timestamp())
        {
            return Ok(index);
        }
    }
    provider.index_of(input).ok_or(StreamError::NotFound {
        timestamp: input.timestamp(),
    })
}

/// The computation a hub applies to every provider item.
pub trait Transform<I, O> {
    /// Compute the output for `input`, located at `index` in `ctx.provider`.
    fn transform(&mut self, input: &I, index: usize, ctx: &Context<'_, I, O>) -> Result<O, StreamError>;

    /// Short description of the construction parameters, e.g. `"EMA(10)"`.
    fn label(&self) -> String;

    /// Rewind auxiliary state before results at or after `at` are recomputed.
    ///
    /// `ctx.results` has already been truncated. Stateless transforms keep
    /// the default.
    fn rollback(&mut self, _at: Timestamp, _ctx: &Context<'_, I, O>) {}

    /// Map a provider rebuild timestamp onto this hub's own timeline.
    fn rebuild_origin(&self, from: Timestamp) -> Timestamp {
        from
    }

    /// Whether an output sharing the last result's timestamp revises that
    /// result in place instead of forcing a rebuild.
    fn revises_in_place(&self) -> bool {
        false
    }
}
