use thiserror::Error;

use crate::core::{AnalysisId, CoreError, ResultPath};
use crate::doc::DocError;
use crate::engine::EngineError;
use crate::error::{Effect, Transience};

#[derive(Debug, Error)]
#[non_exhaustive]
pub enum SyncError {
    /// Two engine nodes of one analysis derive the same path.
    #[error("analysis {analysis}: more than one result resolves to `{path}`")]
    IdentityConflict {
        analysis: AnalysisId,
        path: ResultPath,
    },
    /// An engine node's name cannot form a path segment.
    #[error("analysis {analysis}: result name `{name}` under `{parent}` cannot form a path")]
    InvalidName {
        analysis: AnalysisId,
        parent: ResultPath,
        name: String,
    },
    #[error("analysis {0} is not tracked")]
    UnknownAnalysis(AnalysisId),
    #[error("analysis {0} is already tracked")]
    AlreadyTracked(AnalysisId),
    #[error(transparent)]
    Core(#[from] CoreError),
    #[error(transparent)]
    Doc(#[from] DocError),
    #[error(transparent)]
    Engine(#[from] EngineError),
}

impl SyncError {
    pub fn transience(&self) -> Transience {
        match self {
            SyncError::Doc(e) => e.transience(),
            SyncError::Engine(e) => e.transience(),
            SyncError::Core(e) => e.transience(),
            SyncError::IdentityConflict { .. }
            | SyncError::InvalidName { .. }
            | SyncError::UnknownAnalysis(_)
            | SyncError::AlreadyTracked(_) => Transience::Permanent,
        }
    }

    /// Failed passes abort their transaction, so nothing reaches the document.
    pub fn effect(&self) -> Effect {
        match self {
            SyncError::Engine(_) => Effect::Unknown,
            _ => Effect::None,
        }
    }
}

impl From<crate::core::CanonError> for SyncError {
    fn from(err: crate::core::CanonError) -> Self {
        SyncError::Core(CoreError::Encode(err))
    }
}
