//! Analysis engine boundary.
//!
//! The engine computes results and owns option state. It reports back through
//! [`EngineEvent`]s delivered to subscribers; the orchestrator queues them and
//! handles them on its own turn, never inline.

mod error;

use std::fmt;

use crate::core::{AnalysisOptions, AnalysisResponse, Revision};
use crate::events::{Sink, SubscriptionHandle};

pub use error::EngineError;

/// Engine-side reference to one analysis instance.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct AnalysisHandle(u64);

impl AnalysisHandle {
    pub fn new(raw: u64) -> Self {
        Self(raw)
    }

    pub fn get(self) -> u64 {
        self.0
    }
}

impl fmt::Display for AnalysisHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// What the document declares about an analysis to create.
#[derive(Clone, Debug, PartialEq)]
pub struct AnalysisSpec {
    /// Engine-defined analysis kind; `0` lets the engine pick from the name.
    pub kind: u32,
    pub name: String,
    pub namespace: String,
    pub options: AnalysisOptions,
}

#[derive(Clone, Debug, PartialEq)]
pub enum EngineEvent {
    OptionsChanged {
        handle: AnalysisHandle,
        options: AnalysisOptions,
    },
    ResultsChanged {
        handle: AnalysisHandle,
        response: AnalysisResponse,
    },
}

impl EngineEvent {
    pub fn handle(&self) -> AnalysisHandle {
        match self {
            EngineEvent::OptionsChanged { handle, .. }
            | EngineEvent::ResultsChanged { handle, .. } => *handle,
        }
    }
}

pub trait AnalysisEngine {
    fn create(&mut self, spec: AnalysisSpec) -> Result<AnalysisHandle, EngineError>;

    /// Push options into the engine.
    ///
    /// `authoritative` marks a document-originated update: the engine applies
    /// it unless it already holds a revision at or above `revision`.
    fn set_options(
        &mut self,
        handle: AnalysisHandle,
        options: &AnalysisOptions,
        revision: Revision,
        authoritative: bool,
    ) -> Result<(), EngineError>;

    fn run(&mut self, handle: AnalysisHandle) -> Result<(), EngineError>;

    fn remove(&mut self, handle: AnalysisHandle) -> Result<(), EngineError>;

    fn subscribe(&mut self, sink: Sink<EngineEvent>) -> SubscriptionHandle;
}
