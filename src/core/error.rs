//! Core capability errors (identity parsing, payload decoding, encoding).
//!
//! These are domain/refusal states, not library implementation details.

use thiserror::Error;

use crate::core::canon::CanonError;
use crate::error::{Effect, Transience};

/// Invalid identifier.
#[derive(Debug, Error, Clone)]
#[non_exhaustive]
pub enum InvalidId {
    #[error("analysis id `{raw}` is invalid: {reason}")]
    Analysis { raw: String, reason: String },
    #[error("result path `{raw}` is invalid: {reason}")]
    Path { raw: String, reason: String },
}

/// A stored attribute could not be parsed as the expected payload.
///
/// Usually malformed or partially merged document state.
#[derive(Debug, Error, Clone)]
#[error("failed to decode `{field}`: {reason}")]
pub struct DecodeError {
    pub field: &'static str,
    pub reason: String,
}

impl DecodeError {
    pub fn new(field: &'static str, reason: impl Into<String>) -> Self {
        Self {
            field,
            reason: reason.into(),
        }
    }
}

/// Canonical error enum for core capability.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum CoreError {
    #[error(transparent)]
    InvalidId(#[from] InvalidId),
    #[error(transparent)]
    Decode(#[from] DecodeError),
    #[error(transparent)]
    Encode(#[from] CanonError),
    #[error("`{field}` value {value} does not fit a signed 64-bit attribute")]
    OutOfRange { field: &'static str, value: u64 },
}

impl CoreError {
    pub fn transience(&self) -> Transience {
        // Core errors are pure domain/input failures.
        Transience::Permanent
    }

    pub fn effect(&self) -> Effect {
        Effect::None
    }
}
