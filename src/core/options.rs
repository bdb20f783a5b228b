//! Analysis configuration as exchanged with the engine and mirrored into the
//! document's `__options` attribute.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::canon::{CanonError, from_canonical_bytes, to_canonical_bytes};
use super::error::DecodeError;

const FIELD: &str = "__options";

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct AnalysisOptions(BTreeMap<String, Value>);

impl AnalysisOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, name: impl Into<String>, value: impl Into<Value>) -> Self {
        self.0.insert(name.into(), value.into());
        self
    }

    pub fn set(&mut self, name: impl Into<String>, value: impl Into<Value>) {
        self.0.insert(name.into(), value.into());
    }

    pub fn get(&self, name: &str) -> Option<&Value> {
        self.0.get(name)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &Value)> {
        self.0.iter()
    }

    /// Canonical bytes; equal options always encode identically.
    pub fn encode(&self) -> Result<Vec<u8>, CanonError> {
        to_canonical_bytes(self)
    }

    pub fn decode(bytes: &[u8]) -> Result<Self, DecodeError> {
        let value = from_canonical_bytes(bytes).map_err(|e| DecodeError::new(FIELD, e.to_string()))?;
        match value {
            Value::Object(map) => Ok(Self(map.into_iter().collect())),
            other => Err(DecodeError::new(
                FIELD,
                format!("expected an object, found {}", json_kind(&other)),
            )),
        }
    }

    /// Decode the `0x`-prefixed hex form editor clients write.
    pub fn decode_hex(raw: &str) -> Result<Self, DecodeError> {
        Self::decode(&decode_prefixed_hex(raw)?)
    }
}

/// Strip an optional `0x` prefix and decode the remaining hex digits.
pub fn decode_prefixed_hex(raw: &str) -> Result<Vec<u8>, DecodeError> {
    let digits = raw.strip_prefix("0x").unwrap_or(raw);
    hex::decode(digits).map_err(|e| DecodeError::new(FIELD, e.to_string()))
}

fn json_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "bool",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}
