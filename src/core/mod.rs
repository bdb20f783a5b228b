//! Core domain types (leaves first)
//!
//! Module hierarchy follows type dependency order:
//! - canon: deterministic byte encoding used for change detection
//! - identity: AnalysisId, Revision
//! - path: ResultPath (derived structural identity)
//! - visibility: tri-state Visibility and its cascade
//! - options: AnalysisOptions
//! - results: engine result tree (table | image | group | array)
//! - error: CoreError

pub mod canon;
pub mod error;
pub mod identity;
pub mod options;
pub mod path;
pub mod results;
pub mod visibility;

pub use canon::{CanonError, to_canonical_bytes};
pub use error::{CoreError, DecodeError, InvalidId};
pub use identity::{AnalysisId, Revision};
pub use options::AnalysisOptions;
pub use path::ResultPath;
pub use results::{
    AnalysisResponse, AnalysisStatus, Cell, Column, ElementKind, Image, ResponseHeader,
    ResultElement, ResultGroup, Table,
};
pub use visibility::Visibility;
