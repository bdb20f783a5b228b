//! Canonical byte encoding for change detection.
//!
//! Both sides of a comparison go through the same encoder, so byte equality
//! is value equality. Rules:
//! - object keys sorted by UTF-8 byte order, recursively
//! - no insignificant whitespace
//! - non-finite floats are rejected (serde_json would silently turn them into `null`)

use serde::Serialize;
use serde_json::Value;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum CanonError {
    #[error("canonical encode failed: {0}")]
    Json(#[from] serde_json::Error),
    #[error("non-finite float at `{at}`")]
    NonFiniteFloat { at: String },
}

/// Serialize a value to canonical JSON bytes.
pub fn to_canonical_bytes<T: Serialize>(value: &T) -> Result<Vec<u8>, CanonError> {
    let value = serde_json::to_value(value)?;
    // serde_json's default Map is a BTreeMap, so keys already come out sorted.
    Ok(serde_json::to_vec(&value)?)
}

/// Reject floats that cannot round-trip through JSON.
pub(crate) fn ensure_finite(at: &str, value: f64) -> Result<(), CanonError> {
    if value.is_finite() {
        Ok(())
    } else {
        Err(CanonError::NonFiniteFloat { at: at.to_string() })
    }
}

/// Parse canonical bytes back into a generic JSON value.
pub(crate) fn from_canonical_bytes(bytes: &[u8]) -> Result<Value, CanonError> {
    Ok(serde_json::from_slice(bytes)?)
}
