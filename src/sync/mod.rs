//! Reconciliation between engine result trees and the replicated document.
//!
//! - resource: per-analysis state and the ownership table
//! - txn: the transaction coordinator
//! - reconcile: the tree reconciler and its sweep planner
//! - options: bidirectional options sync
//! - analyses: the orchestrator and its task queue

mod analyses;
mod error;
pub mod options;
pub mod reconcile;
mod resource;
mod txn;

pub use analyses::{AnalysesDoc, DocChanged, PumpReport, ScanReport, Task};
pub use error::SyncError;
pub use options::{PullOutcome, PushOutcome};
pub use reconcile::{DeleteRange, ReconcileReport, Slot, plan_deletions, reconcile};
pub use resource::{AnalysisResource, ResourceTable, ResultItem};
pub use txn::TxnCoordinator;
