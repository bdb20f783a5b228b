#![forbid(unsafe_code)]

//! Keeps an analysis engine's result trees and a replicated document tree
//! consistent in both directions.

pub mod config;
pub mod core;
pub mod doc;
pub mod engine;
pub mod error;
pub mod events;
mod paths;
pub mod sync;
pub mod telemetry;
pub mod test_harness;

pub use error::{Effect, Error, Transience};
pub type Result<T> = std::result::Result<T, Error>;

pub use crate::core::{
    AnalysisId, AnalysisOptions, AnalysisResponse, AnalysisStatus, ElementKind, ResultElement,
    ResultGroup, ResultPath, Revision, Visibility,
};
pub use crate::doc::{
    AttrValue, DocError, DocumentStore, LoroDocument, NodeId, Origin, TransactionSummary,
    TxnToken,
};
pub use crate::engine::{AnalysisEngine, AnalysisHandle, AnalysisSpec, EngineError, EngineEvent};
pub use crate::sync::{
    AnalysesDoc, AnalysisResource, DocChanged, PumpReport, ReconcileReport, ResourceTable,
    ResultItem, ScanReport, SyncError, TxnCoordinator,
};
