//! In-process engine double for unit and integration tests.
//!
//! [`ScriptedEngine`] behaves like a real engine at the boundary: it echoes
//! options on create and on accepted pushes, discards authoritative pushes
//! whose revision it has already seen, and publishes scripted results when an
//! analysis is run. Every call is recorded for assertions.

use std::collections::{BTreeMap, HashMap};

use crate::core::{AnalysisOptions, AnalysisResponse, Revision};
use crate::engine::{AnalysisEngine, AnalysisHandle, AnalysisSpec, EngineError, EngineEvent};
use crate::events::{EventHub, Sink, SubscriptionHandle};

#[derive(Clone, Debug, PartialEq)]
pub enum EngineCall {
    Create {
        handle: AnalysisHandle,
        spec: AnalysisSpec,
    },
    SetOptions {
        handle: AnalysisHandle,
        options: AnalysisOptions,
        revision: Revision,
        authoritative: bool,
        applied: bool,
    },
    Run(AnalysisHandle),
    Remove(AnalysisHandle),
}

#[derive(Debug)]
struct ScriptedAnalysis {
    name: String,
    options: AnalysisOptions,
    revision: Revision,
}

#[derive(Default)]
pub struct ScriptedEngine {
    next_handle: u64,
    analyses: BTreeMap<AnalysisHandle, ScriptedAnalysis>,
    scripts: HashMap<String, AnalysisResponse>,
    calls: Vec<EngineCall>,
    hub: EventHub<EngineEvent>,
}

impl ScriptedEngine {
    pub fn new() -> Self {
        Self::default()
    }

    /// Results published whenever an analysis named `name` is run.
    pub fn script_results(&mut self, name: impl Into<String>, response: AnalysisResponse) {
        self.scripts.insert(name.into(), response);
    }

    /// Publish results as if a computation just completed.
    pub fn emit_results(&mut self, handle: AnalysisHandle, mut response: AnalysisResponse) {
        response.instance_id = handle.get();
        self.hub
            .publish(&EngineEvent::ResultsChanged { handle, response });
    }

    /// Change options engine-side (e.g. a default filled in) and announce it.
    pub fn emit_options(&mut self, handle: AnalysisHandle, options: AnalysisOptions) {
        if let Some(analysis) = self.analyses.get_mut(&handle) {
            analysis.options = options.clone();
        }
        self.hub
            .publish(&EngineEvent::OptionsChanged { handle, options });
    }

    pub fn options(&self, handle: AnalysisHandle) -> Option<&AnalysisOptions> {
        self.analyses.get(&handle).map(|a| &a.options)
    }

    pub fn revision(&self, handle: AnalysisHandle) -> Option<Revision> {
        self.analyses.get(&handle).map(|a| a.revision)
    }

    pub fn handles(&self) -> Vec<AnalysisHandle> {
        self.analyses.keys().copied().collect()
    }

    pub fn calls(&self) -> &[EngineCall] {
        &self.calls
    }

    pub fn take_calls(&mut self) -> Vec<EngineCall> {
        std::mem::take(&mut self.calls)
    }

    /// Revisions of authoritative pushes, in call order.
    pub fn pushed_revisions(&self, handle: AnalysisHandle) -> Vec<Revision> {
        self.calls
            .iter()
            .filter_map(|call| match call {
                EngineCall::SetOptions {
                    handle: h,
                    revision,
                    authoritative: true,
                    ..
                } if *h == handle => Some(*revision),
                _ => None,
            })
            .collect()
    }

    fn analysis_mut(&mut self, handle: AnalysisHandle) -> Result<&mut ScriptedAnalysis, EngineError> {
        self.analyses
            .get_mut(&handle)
            .ok_or(EngineError::UnknownAnalysis(handle))
    }
}

impl AnalysisEngine for ScriptedEngine {
    fn create(&mut self, spec: AnalysisSpec) -> Result<AnalysisHandle, EngineError> {
        if spec.name.is_empty() {
            return Err(EngineError::Rejected {
                reason: "analysis name is empty".to_string(),
            });
        }
        self.next_handle += 1;
        let handle = AnalysisHandle::new(self.next_handle);
        self.analyses.insert(
            handle,
            ScriptedAnalysis {
                name: spec.name.clone(),
                options: spec.options.clone(),
                revision: Revision::ZERO,
            },
        );
        let options = spec.options.clone();
        self.calls.push(EngineCall::Create { handle, spec });
        self.hub
            .publish(&EngineEvent::OptionsChanged { handle, options });
        Ok(handle)
    }

    fn set_options(
        &mut self,
        handle: AnalysisHandle,
        options: &AnalysisOptions,
        revision: Revision,
        authoritative: bool,
    ) -> Result<(), EngineError> {
        let analysis = self.analysis_mut(handle)?;
        let applied = !authoritative || revision > analysis.revision;
        if applied {
            analysis.options = options.clone();
            if authoritative {
                analysis.revision = revision;
            }
        }
        self.calls.push(EngineCall::SetOptions {
            handle,
            options: options.clone(),
            revision,
            authoritative,
            applied,
        });
        if applied {
            self.hub.publish(&EngineEvent::OptionsChanged {
                handle,
                options: options.clone(),
            });
        }
        Ok(())
    }

    fn run(&mut self, handle: AnalysisHandle) -> Result<(), EngineError> {
        let name = self.analysis_mut(handle)?.name.clone();
        self.calls.push(EngineCall::Run(handle));
        if let Some(response) = self.scripts.get(&name).cloned() {
            self.emit_results(handle, response);
        }
        Ok(())
    }

    fn remove(&mut self, handle: AnalysisHandle) -> Result<(), EngineError> {
        self.analyses
            .remove(&handle)
            .ok_or(EngineError::UnknownAnalysis(handle))?;
        self.calls.push(EngineCall::Remove(handle));
        Ok(())
    }

    fn subscribe(&mut self, sink: Sink<EngineEvent>) -> SubscriptionHandle {
        self.hub.subscribe(sink)
    }
}
