//! Exponential moving average

use serde::{Deserialize, Serialize};

use types::errors::StreamError;
use types::numeric::finite;
use types::series::{Chainable, Series};
use types::timestamp::Timestamp;

use crate::indicators::sma::mean;
use crate::transform::{Context, Transform};

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct EmaResult {
    pub timestamp: Timestamp,
    pub ema: Option<f64>,
}

impl Series for EmaResult {
    fn timestamp(&self) -> Timestamp {
        self.timestamp
    }
}

impl Chainable for EmaResult {
    fn value(&self) -> Option<f64> {
        self.ema
    }
}

/// EMA with smoothing factor `2 / (lookback + 1)`.
///
/// The first value is the SMA of the first complete window; each later value
/// builds on the hub's own previous result, which the hub keeps truncated in
/// step with rebuilds. No other state is carried.
#[derive(Debug, Clone)]
pub struct Ema {
    lookback: usize,
    k: f64,
}

impl Ema {
    pub fn new(lookback: usize) -> Result<Self, StreamError> {
        if lookback == 0 {
            return Err(StreamError::invalid_parameter(
                "lookback",
                "must be greater than zero",
            ));
        }
        Ok(Self {
            lookback,
            k: 2.0 / (lookback as f64 + 1.0),
        })
    }

    pub fn lookback(&self) -> usize {
        self.lookback
    }

    pub fn smoothing(&self) -> f64 {
        self.k
    }
}

impl<I: Chainable> Transform<I, EmaResult> for Ema {
    fn transform(
        &mut self,
        input: &I,
        index: usize,
        ctx: &Context<'_, I, EmaResult>,
    ) -> Result<EmaResult, StreamError> {
        let previous = ctx.previous_result(index).and_then(|r| r.ema);

        let ema = match (previous, input.value()) {
            (Some(prev), Some(value)) => finite(prev + self.k * (value - prev)),
            (None, Some(_)) => ctx.window(index, self.lookback).and_then(mean),
            (_, None) => None,
        };

        Ok(EmaResult {
            timestamp: input.timestamp(),
            ema,
        })
    }

    fn label(&self) -> String {
        format!("EMA({})", self.lookback)
    }
}
