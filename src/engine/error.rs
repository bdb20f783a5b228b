use thiserror::Error;

use super::AnalysisHandle;
use crate::error::{Effect, Transience};

#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[non_exhaustive]
pub enum EngineError {
    #[error("engine has no analysis {0}")]
    UnknownAnalysis(AnalysisHandle),
    #[error("engine rejected the request: {reason}")]
    Rejected { reason: String },
    #[error("engine unavailable: {reason}")]
    Unavailable { reason: String },
}

impl EngineError {
    pub fn transience(&self) -> Transience {
        match self {
            EngineError::UnknownAnalysis(_) | EngineError::Rejected { .. } => {
                Transience::Permanent
            }
            EngineError::Unavailable { .. } => Transience::Retryable,
        }
    }

    pub fn effect(&self) -> Effect {
        // Engine calls never touch the document themselves.
        Effect::None
    }
}
