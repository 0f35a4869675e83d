//! Simple moving average

use serde::{Deserialize, Serialize};

use types::errors::StreamError;
use types::numeric::finite;
use types::series::{Chainable, Series};
use types::timestamp::Timestamp;

use crate::transform::{Context, Transform};

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SmaResult {
    pub timestamp: Timestamp,
    pub sma: Option<f64>,
}

impl Series for SmaResult {
    fn timestamp(&self) -> Timestamp {
        self.timestamp
    }
}

impl Chainable for SmaResult {
    fn value(&self) -> Option<f64> {
        self.sma
    }
}

/// Arithmetic mean of the last `lookback` provider values.
///
/// Stateless: every result is read straight off the provider window, so a
/// rebuild needs no rollback.
#[derive(Debug, Clone)]
pub struct Sma {
    lookback: usize,
}

impl Sma {
    pub fn new(lookback: usize) -> Result<Self, StreamError> {
        if lookback == 0 {
            return Err(StreamError::invalid_parameter(
                "lookback",
                "must be greater than zero",
            ));
        }
        Ok(Self { lookback })
    }

    pub fn lookback(&self) -> usize {
        self.lookback
    }
}

/// Mean of a window of chain values; `None` if any value is missing.
pub(crate) fn mean<I: Chainable>(window: &[I]) -> Option<f64> {
    let mut sum = 0.0;
    for item in window {
        sum += item.value()?;
    }
    finite(sum / window.len() as f64)
}

impl<I: Chainable> Transform<I, SmaResult> for Sma {
    fn transform(
        &mut self,
        input: &I,
        index: usize,
        ctx: &Context<'_, I, SmaResult>,
    ) -> Result<SmaResult, StreamError> {
        let sma = ctx.window(index, self.lookback).and_then(mean);
        Ok(SmaResult {
            timestamp: input.timestamp(),
            sma,
        })
    }

    fn label(&self) -> String {
        format!("SMA({})", self.lookback)
    }
}
