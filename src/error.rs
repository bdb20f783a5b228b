use thiserror::Error;

use crate::config::ConfigError;
use crate::core::CoreError;
use crate::doc::DocError;
use crate::engine::EngineError;
use crate::sync::SyncError;

/// Whether retrying this operation may succeed.
#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub enum Transience {
    /// Retry will never help without changing inputs/state.
    Permanent,
    /// Retry may help (engine busy, peer update arrived out of order).
    Retryable,
    /// Unknown if retry will help.
    Unknown,
}

impl Transience {
    pub fn is_retryable(self) -> bool {
        matches!(self, Transience::Retryable)
    }
}

/// What we know about document side effects when an error is returned.
#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub enum Effect {
    /// Nothing was written to the document.
    None,
    /// Mutations were committed before the failure.
    Some,
    /// We don't know if mutations were committed.
    Unknown,
}

impl Effect {
    pub fn as_str(self) -> &'static str {
        match self {
            Effect::None => "none",
            Effect::Some => "some",
            Effect::Unknown => "unknown",
        }
    }
}

/// Crate-level convenience error.
///
/// A thin wrapper over the per-capability errors.
#[derive(Error, Debug)]
#[non_exhaustive]
pub enum Error {
    #[error(transparent)]
    Core(#[from] CoreError),

    #[error(transparent)]
    Doc(#[from] DocError),

    #[error(transparent)]
    Engine(#[from] EngineError),

    #[error(transparent)]
    Sync(#[from] SyncError),

    #[error(transparent)]
    Config(#[from] ConfigError),
}

impl Error {
    pub fn transience(&self) -> Transience {
        match self {
            Error::Core(e) => e.transience(),
            Error::Doc(e) => e.transience(),
            Error::Engine(e) => e.transience(),
            Error::Sync(e) => e.transience(),
            Error::Config(_) => Transience::Permanent,
        }
    }

    pub fn effect(&self) -> Effect {
        match self {
            Error::Core(e) => e.effect(),
            Error::Doc(e) => e.effect(),
            Error::Engine(e) => e.effect(),
            Error::Sync(e) => e.effect(),
            Error::Config(_) => Effect::None,
        }
    }
}
