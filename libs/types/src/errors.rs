//! Error types for the streaming engine
//!
//! Comprehensive error taxonomy using thiserror. An overflow is the only
//! recoverable fault; everything else aborts the current operation.

use thiserror::Error;

use crate::timestamp::Timestamp;

/// Top-level stream error
#[derive(Error, Debug, Clone, PartialEq)]
pub enum StreamError {
    /// Repeated same-timestamp arrivals crossed the threshold. The faulted
    /// hub has already torn down its subscribers when this is returned.
    #[error(
        "A repeated stream update at {timestamp} exceeded the {threshold} attempt threshold. \
         Check and remove circular chains or check your stream provider. Provider terminated."
    )]
    Overflow { timestamp: Timestamp, threshold: u32 },

    #[error("Cache invariant violated: {reason}")]
    InvariantViolation { reason: String },

    #[error("No cached entry at {timestamp}")]
    NotFound { timestamp: Timestamp },

    #[error("Index {index} out of range for cache of length {len}")]
    IndexOutOfRange { index: usize, len: usize },

    #[error("Invalid parameter {name}: {reason}")]
    InvalidParameter { name: String, reason: String },
}

impl StreamError {
    pub fn invariant(reason: impl Into<String>) -> Self {
        Self::InvariantViolation {
            reason: reason.into(),
        }
    }

    pub fn invalid_parameter(name: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::InvalidParameter {
            name: name.into(),
            reason: reason.into(),
        }
    }

    /// True for the recoverable circuit-breaker fault.
    pub fn is_overflow(&self) -> bool {
        matches!(self, Self::Overflow { .. })
    }

    /// True when classification and mutation disagreed about cache state.
    pub fn is_invariant_violation(&self) -> bool {
        matches!(
            self,
            Self::InvariantViolation { .. } | Self::NotFound { .. }
        )
    }
}
