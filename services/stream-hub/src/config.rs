//! Hub configuration

use serde::{Deserialize, Serialize};

use types::errors::StreamError;

use crate::overflow::DEFAULT_OVERFLOW_THRESHOLD;

/// Configuration shared by a root source and every hub chained from it.
///
/// Hubs created through `chain` inherit their provider's configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct HubConfig {
    /// Consecutive same-timestamp arrivals tolerated before an overflow fault.
    pub overflow_threshold: u32,
    /// Upper bound on cached entries per hub. The oldest entries are pruned
    /// once it is exceeded; `None` keeps everything.
    pub max_cache_size: Option<usize>,
}

impl Default for HubConfig {
    fn default() -> Self {
        Self {
            overflow_threshold: DEFAULT_OVERFLOW_THRESHOLD,
            max_cache_size: None,
        }
    }
}

impl HubConfig {
    pub fn with_overflow_threshold(mut self, threshold: u32) -> Self {
        self.overflow_threshold = threshold;
        self
    }

    pub fn with_max_cache_size(mut self, max: usize) -> Self {
        self.max_cache_size = Some(max);
        self
    }

    pub fn validate(&self) -> Result<(), StreamError> {
        if self.overflow_threshold == 0 {
            return Err(StreamError::invalid_parameter(
                "overflow_threshold",
                "must be greater than 0",
            ));
        }
        if self.max_cache_size == Some(0) {
            return Err(StreamError::invalid_parameter(
                "max_cache_size",
                "must be greater than 0",
            ));
        }
        Ok(())
    }
}
