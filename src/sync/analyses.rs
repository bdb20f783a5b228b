//! The orchestrator: owns one document, one engine and the resources that tie
//! them together.
//!
//! Engine events and document notifications are forwarded into a single
//! [`TaskQueue`] and handled one at a time by [`AnalysesDoc::process_pending`].
//! Handlers that mutate the document receive the transaction they run in; a
//! handler invoked from inside another (the bootstrap of a new analysis
//! drains its own engine events) reuses the outer transaction.

use std::collections::HashSet;

use tracing::{debug, info, trace, warn};

use crate::config::SyncConfig;
use crate::core::{AnalysisId, AnalysisOptions};
use crate::doc::node::{self, ContentRole};
use crate::doc::{
    AttrValue, DocumentStore, LoroDocument, NodeId, Origin, StateVector, TransactionSummary,
    TxnToken,
};
use crate::engine::{AnalysisEngine, AnalysisHandle, AnalysisSpec, EngineEvent};
use crate::events::{EventHub, Sink, SubscriptionHandle, TaskQueue};

use super::options::{self, PullOutcome, PushOutcome};
use super::reconcile::{self, ReconcileReport};
use super::resource::{AnalysisResource, ResourceTable};
use super::txn::TxnCoordinator;
use super::SyncError;

#[derive(Clone, Debug, PartialEq)]
pub enum Task {
    Engine(EngineEvent),
    Document(TransactionSummary),
}

/// Published after every local commit that changed the document.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct DocChanged {
    pub before: StateVector,
    pub after: StateVector,
    /// Everything a peer at `before` is missing.
    pub update: Vec<u8>,
}

#[derive(Debug, Default)]
pub struct PumpReport {
    pub processed: usize,
    pub failures: Vec<SyncError>,
}

#[derive(Debug, Default)]
pub struct ScanReport {
    pub created: Vec<AnalysisId>,
    pub removed: Vec<AnalysisId>,
    /// Tracked analyses whose options were pushed to the engine again.
    pub recomputed: Vec<AnalysisId>,
    pub failures: Vec<(AnalysisId, SyncError)>,
}

pub struct AnalysesDoc<D, E> {
    doc: D,
    engine: E,
    resources: ResourceTable,
    coordinator: TxnCoordinator,
    queue: TaskQueue<Task>,
    doc_changed: EventHub<DocChanged>,
    settings: SyncConfig,
    _engine_events: SubscriptionHandle,
    _doc_events: SubscriptionHandle,
}

impl<E: AnalysisEngine> AnalysesDoc<LoroDocument, E> {
    /// A fresh replica whose local writes carry `settings.replica()`.
    pub fn from_config(engine: E, settings: SyncConfig) -> Self {
        let doc = LoroDocument::from_config(&settings);
        Self::new(doc, engine, settings)
    }
}

impl<D: DocumentStore, E: AnalysisEngine> AnalysesDoc<D, E> {
    pub fn new(mut doc: D, mut engine: E, settings: SyncConfig) -> Self {
        let queue = TaskQueue::new();
        let engine_events =
            engine.subscribe(EventHub::<EngineEvent>::forward_to(queue.sender(), Task::Engine));
        let doc_events = doc.observe_after_transaction(
            EventHub::<TransactionSummary>::forward_to(queue.sender(), Task::Document),
        );
        Self {
            doc,
            engine,
            resources: ResourceTable::new(),
            coordinator: TxnCoordinator::new(),
            queue,
            doc_changed: EventHub::new(),
            settings,
            _engine_events: engine_events,
            _doc_events: doc_events,
        }
    }

    pub fn doc(&self) -> &D {
        &self.doc
    }

    pub fn engine(&self) -> &E {
        &self.engine
    }

    /// Direct engine access, e.g. to trigger a recompute. Events it raises
    /// are handled on the next [`AnalysesDoc::process_pending`].
    pub fn engine_mut(&mut self) -> &mut E {
        &mut self.engine
    }

    pub fn resources(&self) -> &ResourceTable {
        &self.resources
    }

    pub fn settings(&self) -> &SyncConfig {
        &self.settings
    }

    pub fn pending(&self) -> usize {
        self.queue.len()
    }

    pub fn subscribe_doc_changed(&mut self, sink: Sink<DocChanged>) -> SubscriptionHandle {
        self.doc_changed.subscribe(sink)
    }

    /// `(state_vector, update)`: our version, and what a peer at `since` is
    /// missing (everything when `since` is `None`).
    pub fn get_changes(&self, since: Option<&[u8]>) -> Result<(Vec<u8>, Vec<u8>), SyncError> {
        let vector = self.doc.encode_state_vector()?;
        let update = self.doc.encode_state_as_update(since)?;
        Ok((vector, update))
    }

    /// Merge a peer's update, then handle everything it set off.
    pub fn apply_changes(&mut self, update: &[u8]) -> Result<PumpReport, SyncError> {
        let summary = self.doc.apply_update(update)?;
        trace!(
            inserted = summary.inserted.len(),
            removed = summary.removed.len(),
            attributes = summary.attribute_changes.len(),
            "peer update merged"
        );
        Ok(self.process_pending())
    }

    /// Drain the task queue. Failures are logged and reported, never retried.
    pub fn process_pending(&mut self) -> PumpReport {
        let mut report = PumpReport::default();
        while let Some(task) = self.queue.pop() {
            report.processed += 1;
            if let Err(err) = self.dispatch(task, None) {
                warn!(error = %err, "task failed");
                report.failures.push(err);
            }
        }
        report
    }

    fn dispatch(&mut self, task: Task, outer: Option<&TxnToken>) -> Result<(), SyncError> {
        match task {
            Task::Engine(EngineEvent::OptionsChanged {
                handle,
                options: engine_options,
            }) => self.on_engine_options(handle, &engine_options, outer),
            Task::Engine(EngineEvent::ResultsChanged { handle, response }) => {
                let Some(id) = self.resources.id_for_handle(handle) else {
                    trace!(%handle, "results for untracked analysis ignored");
                    return Ok(());
                };
                if !response.is_complete() {
                    trace!(analysis = %id, status = ?response.status, "incomplete results ignored");
                    return Ok(());
                }
                self.in_transaction(outer, |this, txn| {
                    this.reconcile_in(txn, id, &response).map(|_| ())
                })
            }
            Task::Document(summary) => match summary.origin {
                Origin::Local => self.publish_local(&summary),
                Origin::Remote => self.on_remote(&summary),
            },
        }
    }

    fn on_engine_options(
        &mut self,
        handle: AnalysisHandle,
        engine_options: &AnalysisOptions,
        outer: Option<&TxnToken>,
    ) -> Result<(), SyncError> {
        let Some(id) = self.resources.id_for_handle(handle) else {
            trace!(%handle, "options for untracked analysis ignored");
            return Ok(());
        };
        if self
            .resources
            .get(&id)
            .is_some_and(|resource| resource.initializing)
        {
            trace!(analysis = %id, "options echo during bootstrap suppressed");
            return Ok(());
        }
        self.in_transaction(outer, |this, txn| {
            let resource = this
                .resources
                .get(&id)
                .ok_or(SyncError::UnknownAnalysis(id))?;
            match options::push_engine_options(&mut this.doc, txn, resource, engine_options)? {
                PushOutcome::Written => debug!(analysis = %id, "options mirrored"),
                PushOutcome::Unchanged | PushOutcome::Suppressed => {}
            }
            Ok(())
        })
    }

    fn reconcile_in(
        &mut self,
        txn: &TxnToken,
        id: AnalysisId,
        response: &crate::core::AnalysisResponse,
    ) -> Result<ReconcileReport, SyncError> {
        let resource = self
            .resources
            .get_mut(&id)
            .ok_or(SyncError::UnknownAnalysis(id))?;
        reconcile::reconcile(&mut self.doc, txn, resource, response, &self.settings)
    }

    fn publish_local(&mut self, summary: &TransactionSummary) -> Result<(), SyncError> {
        if !summary.changed_state() {
            return Ok(());
        }
        let since = summary.before.encode()?;
        let update = self.doc.encode_state_as_update(Some(&since))?;
        self.doc_changed.publish(&DocChanged {
            before: summary.before.clone(),
            after: summary.after.clone(),
            update,
        });
        Ok(())
    }

    /// Scan first so re-created roots are rebound before their options
    /// changes are matched. Analyses the scan just created or recomputed
    /// already run on the document's options.
    fn on_remote(&mut self, summary: &TransactionSummary) -> Result<(), SyncError> {
        let report = self.scan_analyses()?;
        for change in summary.changes_for(node::OPTIONS) {
            let Some(id) = self.resources.id_for_element(&change.node) else {
                continue;
            };
            if report.created.contains(&id) || report.recomputed.contains(&id) {
                continue;
            }
            let Some(resource) = self.resources.get_mut(&id) else {
                continue;
            };
            if let PullOutcome::Pushed(revision) =
                options::pull_document_options(&mut self.engine, resource, &change)?
            {
                trace!(analysis = %id, %revision, "remote options applied");
            }
        }
        if let Some((id, err)) = report.failures.into_iter().next() {
            warn!(analysis = %id, error = %err, "analysis bootstrap failed");
            return Err(err);
        }
        Ok(())
    }

    /// Run `f` inside `outer` if given, otherwise inside a fresh transaction
    /// that is committed on success and aborted on error.
    fn in_transaction<T>(
        &mut self,
        outer: Option<&TxnToken>,
        f: impl FnOnce(&mut Self, &TxnToken) -> Result<T, SyncError>,
    ) -> Result<T, SyncError> {
        if let Some(txn) = outer {
            return f(self, txn);
        }
        let txn = self.coordinator.begin(&mut self.doc)?;
        match f(self, &txn) {
            Ok(value) => {
                self.coordinator.commit(&mut self.doc, txn)?;
                Ok(value)
            }
            Err(err) => {
                if let Err(abort_err) = self.coordinator.abort(&mut self.doc, txn) {
                    warn!(error = %abort_err, "abort after failed handler also failed");
                }
                Err(err)
            }
        }
    }

    /// Find analysis roots in the root fragment (and, recursively, in the
    /// content of analyses found there). Creates engine analyses for new
    /// roots and tears down resources whose root has gone.
    pub fn scan_analyses(&mut self) -> Result<ScanReport, SyncError> {
        let mut found: Vec<(AnalysisId, NodeId)> = Vec::new();
        let mut visited: HashSet<NodeId> = HashSet::new();
        let root = self.doc.root(&self.settings.root_fragment);
        self.collect_roots(root, &mut found, &mut visited)?;

        let mut report = ScanReport::default();
        let mut present: HashSet<AnalysisId> = HashSet::new();
        for (id, element) in found {
            if !present.insert(id) {
                trace!(analysis = %id, "duplicate analysis root ignored");
                continue;
            }
            if self.resources.contains(&id) {
                if self.refresh_tracked(id, element)? {
                    report.recomputed.push(id);
                }
                continue;
            }
            match self.create_analysis(id, element) {
                Ok(_) => report.created.push(id),
                Err(err) => report.failures.push((id, err)),
            }
        }

        if self.settings.teardown_removed {
            for id in self.resources.ids() {
                if !present.contains(&id) {
                    self.teardown(id);
                    report.removed.push(id);
                }
            }
        }
        Ok(report)
    }

    fn collect_roots(
        &self,
        fragment: NodeId,
        found: &mut Vec<(AnalysisId, NodeId)>,
        visited: &mut HashSet<NodeId>,
    ) -> Result<(), SyncError> {
        if !visited.insert(fragment.clone()) {
            return Ok(());
        }
        for child in self.doc.children(&fragment)? {
            if let ContentRole::AnalysisRoot(id) = ContentRole::classify(&self.doc, &child) {
                found.push((id, child));
                self.collect_roots(NodeId::root(id.content_fragment()), found, visited)?;
            }
        }
        Ok(())
    }

    /// A tracked analysis seen again. A re-created root element is followed
    /// and its options pushed, as is a value that could not be decoded
    /// earlier. Returns whether the engine got new options.
    fn refresh_tracked(&mut self, id: AnalysisId, element: NodeId) -> Result<bool, SyncError> {
        let replaced = self.resources.rebind_element(&id, element.clone()).is_some();
        let Some(resource) = self.resources.get_mut(&id) else {
            return Ok(false);
        };
        if replaced {
            debug!(analysis = %id, "analysis root element replaced");
        }
        if !replaced && !resource.needs_recompute {
            return Ok(false);
        }
        let Some(value) = self.doc.attribute(&element, node::OPTIONS) else {
            return Ok(false);
        };
        let decoded = match node::decode_options(&value) {
            Ok(decoded) => decoded,
            Err(err) => {
                resource.needs_recompute = true;
                warn!(analysis = %id, error = %err, "document options unreadable");
                return Ok(false);
            }
        };
        resource.revision = resource.revision.next();
        resource.needs_recompute = false;
        info!(analysis = %id, revision = %resource.revision, "pushing options from the document");
        self.engine
            .set_options(resource.handle, &decoded, resource.revision, true)?;
        Ok(true)
    }

    /// Create and bootstrap the engine analysis for a newly seen root.
    ///
    /// Everything the bootstrap writes, including the first results if the
    /// engine produces them synchronously, lands in one transaction.
    pub fn create_analysis(
        &mut self,
        id: AnalysisId,
        element: NodeId,
    ) -> Result<AnalysisHandle, SyncError> {
        if self.resources.contains(&id) {
            return Err(SyncError::AlreadyTracked(id));
        }
        let (initial, undecodable) = match self.doc.attribute(&element, node::OPTIONS) {
            None => (AnalysisOptions::new(), false),
            Some(value) => match node::decode_options(&value) {
                Ok(decoded) => (decoded, false),
                Err(err) => {
                    warn!(analysis = %id, error = %err, "starting with default options");
                    (AnalysisOptions::new(), true)
                }
            },
        };
        let spec = AnalysisSpec {
            kind: 0,
            name: node::string_attr(&self.doc, &element, node::NAME),
            namespace: node::string_attr(&self.doc, &element, node::NAMESPACE),
            options: initial,
        };

        let txn = self.coordinator.begin(&mut self.doc)?;
        match self.bootstrap(&txn, id, element, spec, undecodable) {
            Ok(handle) => {
                self.coordinator.commit(&mut self.doc, txn)?;
                info!(analysis = %id, %handle, "analysis created");
                Ok(handle)
            }
            Err(err) => {
                if let Err(abort_err) = self.coordinator.abort(&mut self.doc, txn) {
                    warn!(error = %abort_err, "abort after failed bootstrap also failed");
                }
                if let Some(resource) = self.resources.remove(&id) {
                    if let Err(remove_err) = self.engine.remove(resource.handle) {
                        warn!(analysis = %id, error = %remove_err, "engine cleanup failed");
                    }
                }
                Err(err)
            }
        }
    }

    fn bootstrap(
        &mut self,
        txn: &TxnToken,
        id: AnalysisId,
        element: NodeId,
        spec: AnalysisSpec,
        undecodable: bool,
    ) -> Result<AnalysisHandle, SyncError> {
        let handle = self.engine.create(spec)?;
        let mut resource = AnalysisResource::new(id, handle, element);
        resource.initializing = true;
        resource.needs_recompute = undecodable;
        let content_root = resource.content_root.clone();
        self.resources.insert(resource)?;

        let outcome = self.run_bootstrap(txn, id, handle);
        if let Some(resource) = self.resources.get_mut(&id) {
            resource.initializing = false;
        }
        outcome?;

        let dir = AttrValue::from(node::LEFT_TO_RIGHT);
        if self.doc.attribute(&content_root, node::DIR).as_ref() != Some(&dir) {
            self.doc.set_attribute(txn, &content_root, node::DIR, dir)?;
        }
        Ok(handle)
    }

    fn run_bootstrap(
        &mut self,
        txn: &TxnToken,
        id: AnalysisId,
        handle: AnalysisHandle,
    ) -> Result<(), SyncError> {
        self.engine.run(handle)?;
        let tasks = self
            .queue
            .take_matching(|task| matches!(task, Task::Engine(event) if event.handle() == handle));
        for task in tasks {
            match self.dispatch(task, Some(txn)) {
                Ok(()) => {}
                // Detected before any write, so the rest of the bootstrap stands.
                Err(err @ (SyncError::IdentityConflict { .. } | SyncError::InvalidName { .. })) => {
                    warn!(analysis = %id, error = %err, "bootstrap results rejected");
                }
                Err(err) => return Err(err),
            }
        }
        Ok(())
    }

    fn teardown(&mut self, id: AnalysisId) {
        let Some(resource) = self.resources.remove(&id) else {
            return;
        };
        if let Err(err) = self.engine.remove(resource.handle) {
            warn!(analysis = %id, error = %err, "engine analysis removal failed");
        }
        info!(analysis = %id, handle = %resource.handle, "analysis torn down");
    }
}
