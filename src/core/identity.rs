//! Layer 1: identities

use std::fmt;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::error::InvalidId;

/// Process-unique identity of a tracked analysis.
///
/// Carried by the document's analysis root element (`__uuid`) and used to
/// name the analysis's content fragment.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct AnalysisId(Uuid);

impl AnalysisId {
    pub fn new(uuid: Uuid) -> Self {
        Self(uuid)
    }

    pub fn generate() -> Self {
        Self(Uuid::new_v4())
    }

    pub fn parse(raw: &str) -> Result<Self, InvalidId> {
        Uuid::parse_str(raw.trim())
            .map(Self)
            .map_err(|e| InvalidId::Analysis {
                raw: raw.to_string(),
                reason: e.to_string(),
            })
    }

    pub fn as_uuid(&self) -> &Uuid {
        &self.0
    }

    /// Name of the document root that holds this analysis's content.
    pub fn content_fragment(&self) -> String {
        self.0.hyphenated().to_string()
    }
}

impl fmt::Display for AnalysisId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0.hyphenated())
    }
}

/// Monotonic stamp on document-originated option pushes.
///
/// The engine keeps the highest revision it has applied and discards anything
/// at or below it.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Revision(u64);

impl Revision {
    pub const ZERO: Revision = Revision(0);

    pub fn new(value: u64) -> Self {
        Self(value)
    }

    pub fn get(self) -> u64 {
        self.0
    }

    pub fn next(self) -> Self {
        Self(self.0.saturating_add(1))
    }
}

impl fmt::Display for Revision {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "r{}", self.0)
    }
}
