//! Layer 2: derived result paths
//!
//! A path is the join key between an engine result node and its mirrored
//! document node. It is derived purely from ancestry and declared names, so an
//! unchanged engine tree reproduces identical paths on every pass.

use std::fmt;

use serde::{Deserialize, Serialize};

use super::error::InvalidId;

pub const ROOT_TOKEN: &str = "root";
pub const HEADING_SUFFIX: &str = "heading";
pub const SEPARATOR: char = ':';

#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ResultPath(String);

impl ResultPath {
    /// Path of the analysis's top-level result group.
    pub fn root() -> Self {
        Self(ROOT_TOKEN.to_string())
    }

    /// Parse a path read back from a document attribute.
    pub fn parse(raw: impl Into<String>) -> Result<Self, InvalidId> {
        let raw = raw.into();
        if raw.is_empty() {
            return Err(InvalidId::Path {
                raw,
                reason: "empty".to_string(),
            });
        }
        if raw.split(SEPARATOR).any(str::is_empty) {
            return Err(InvalidId::Path {
                raw,
                reason: "empty segment".to_string(),
            });
        }
        Ok(Self(raw))
    }

    /// Whether `name` round-trips through [`ResultPath::parse`] as one
    /// segment of a child path.
    pub fn is_segment(name: &str) -> bool {
        !name.is_empty() && !name.contains(SEPARATOR)
    }

    /// `self + ":" + name`
    pub fn child(&self, name: &str) -> Self {
        let mut out = String::with_capacity(self.0.len() + 1 + name.len());
        out.push_str(&self.0);
        out.push(SEPARATOR);
        out.push_str(name);
        Self(out)
    }

    /// Path of the heading that introduces the group at `self`.
    pub fn heading(&self) -> Self {
        self.child(HEADING_SUFFIX)
    }

    pub fn is_heading(&self) -> bool {
        self.0
            .rsplit(SEPARATOR)
            .next()
            .is_some_and(|last| last == HEADING_SUFFIX)
    }

    pub fn depth(&self) -> usize {
        self.0.split(SEPARATOR).count()
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ResultPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl AsRef<str> for ResultPath {
    fn as_ref(&self) -> &str {
        &self.0
    }
}
