//! Tree Reconciler: one pass bringing an analysis's content fragment in line
//! with a complete engine result tree.
//!
//! A pass runs inside the caller's transaction and goes:
//! 1. identity pre-check (no writes if two engine nodes share a path)
//! 2. index rebuild from the document
//! 3. analysis header mirrors (`__id`, `__dets`) and the title heading
//! 4. depth-first walk with an insertion cursor
//! 5. garbage-collection sweep with coalesced range deletes
//! 6. index re-derivation
//!
//! Every write is preceded by a byte comparison against what is stored, so an
//! unchanged tree produces no writes at all.

use std::collections::{BTreeMap, HashSet};

use tracing::{debug, trace};

use crate::config::SyncConfig;
use crate::core::{
    AnalysisId, AnalysisResponse, CoreError, ResultElement, ResultPath, Visibility,
};
use crate::doc::node::{self, HeadingSpec};
use crate::doc::{AttrValue, DocumentStore, NodeId, TxnToken};

use super::SyncError;
use super::resource::{AnalysisResource, ResultItem};

const TITLE_TAG: &str = "h1";
/// Top-level groups sit one level below the title.
const FIRST_GROUP_LEVEL: usize = 2;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct DeleteRange {
    pub begin: usize,
    pub len: usize,
}

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct ReconcileReport {
    pub created: usize,
    pub attribute_writes: usize,
    pub removed: usize,
    /// Issued range deletes, in pre-deletion coordinates.
    pub delete_ranges: Vec<DeleteRange>,
}

impl ReconcileReport {
    pub fn is_noop(&self) -> bool {
        self.created == 0 && self.attribute_writes == 0 && self.removed == 0
    }
}

/// Classification of one content position during the sweep.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Slot {
    /// Registered and not revisited, or a later duplicate of a path.
    Stale,
    /// Registered and revisited.
    Kept,
    /// Not a result node; never deleted, but ends a run.
    Boundary,
}

/// Coalesce maximal runs of consecutive stale slots into range deletes.
pub fn plan_deletions(slots: &[Slot]) -> Vec<DeleteRange> {
    let mut ranges = Vec::new();
    let mut open: Option<DeleteRange> = None;
    for (index, slot) in slots.iter().enumerate() {
        match slot {
            Slot::Stale => match open.as_mut() {
                Some(run) => run.len += 1,
                None => {
                    open = Some(DeleteRange {
                        begin: index,
                        len: 1,
                    })
                }
            },
            Slot::Kept | Slot::Boundary => {
                if let Some(run) = open.take() {
                    ranges.push(run);
                }
            }
        }
    }
    if let Some(run) = open {
        ranges.push(run);
    }
    ranges
}

/// Reject engine trees in which two nodes would share a document path, or a
/// name cannot be read back from the path it derives.
pub fn check_identities(id: AnalysisId, response: &AnalysisResponse) -> Result<(), SyncError> {
    fn visit(
        id: AnalysisId,
        elements: &[ResultElement],
        base: &ResultPath,
        seen: &mut HashSet<ResultPath>,
    ) -> Result<(), SyncError> {
        for element in elements {
            if !ResultPath::is_segment(&element.name) {
                return Err(SyncError::InvalidName {
                    analysis: id,
                    parent: base.clone(),
                    name: element.name.clone(),
                });
            }
            let path = base.child(&element.name);
            claim(id, seen, path.clone())?;
            if let Some(children) = element.children() {
                claim(id, seen, path.heading())?;
                visit(id, children, &path, seen)?;
            }
        }
        Ok(())
    }

    fn claim(
        id: AnalysisId,
        seen: &mut HashSet<ResultPath>,
        path: ResultPath,
    ) -> Result<(), SyncError> {
        if seen.contains(&path) {
            return Err(SyncError::IdentityConflict { analysis: id, path });
        }
        seen.insert(path);
        Ok(())
    }

    let root = ResultPath::root();
    let mut seen = HashSet::new();
    seen.insert(root.heading());
    visit(id, &response.group.elements, &root, &mut seen)
}

/// Bring `resource`'s content fragment in line with `response`.
///
/// The caller owns `txn` and decides whether to commit or abort on error.
pub fn reconcile<D: DocumentStore + ?Sized>(
    doc: &mut D,
    txn: &TxnToken,
    resource: &mut AnalysisResource,
    response: &AnalysisResponse,
    settings: &SyncConfig,
) -> Result<ReconcileReport, SyncError> {
    let id = resource.id;
    check_identities(id, response)?;

    let mut pass = Pass {
        doc,
        txn,
        resource,
        settings,
        report: ReconcileReport::default(),
    };
    pass.rebuild_index()?;
    pass.mirror_header(response)?;
    let mut cursor = pass.title(&response.title)?;
    pass.walk(
        &response.group.elements,
        &ResultPath::root(),
        FIRST_GROUP_LEVEL,
        Visibility::Show,
        &mut cursor,
    )?;
    pass.sweep()?;
    pass.reindex()?;

    let report = pass.report;
    debug!(
        analysis = %id,
        created = report.created,
        writes = report.attribute_writes,
        removed = report.removed,
        ranges = report.delete_ranges.len(),
        "reconciled"
    );
    Ok(report)
}

struct Pass<'a, D: ?Sized> {
    doc: &'a mut D,
    txn: &'a TxnToken,
    resource: &'a mut AnalysisResource,
    settings: &'a SyncConfig,
    report: ReconcileReport,
}

impl<D: DocumentStore + ?Sized> Pass<'_, D> {
    fn content(&self) -> Result<Vec<NodeId>, SyncError> {
        Ok(self.doc.children(&self.resource.content_root)?)
    }

    /// Rebuild `items` from document order. The first node carrying a path
    /// owns it; later duplicates stay unregistered and get swept.
    fn rebuild_index(&mut self) -> Result<(), SyncError> {
        let mut items = BTreeMap::new();
        for (index, child) in self.content()?.into_iter().enumerate() {
            let Some(path) = node::path_of(&*self.doc, &child) else {
                continue;
            };
            items.entry(path.clone()).or_insert(ResultItem {
                path,
                node: child,
                index,
                processed: false,
            });
        }
        self.resource.items = items;
        Ok(())
    }

    fn mirror_header(&mut self, response: &AnalysisResponse) -> Result<(), SyncError> {
        let element = self.resource.element.clone();
        let instance =
            i64::try_from(response.instance_id).map_err(|_| CoreError::OutOfRange {
                field: node::INSTANCE_ID,
                value: response.instance_id,
            })?;
        self.write_if_changed(&element, node::INSTANCE_ID, AttrValue::Int(instance))?;
        let header = response.header_bytes()?;
        self.write_bytes_if_changed(&element, node::DETAILS, header)?;
        Ok(())
    }

    /// Place the title heading; returns the cursor position after it.
    fn title(&mut self, title: &str) -> Result<usize, SyncError> {
        let path = ResultPath::root().heading();
        match self.resource.items.get_mut(&path) {
            Some(item) => {
                item.processed = true;
                let (heading, index) = (item.node.clone(), item.index);
                // Text is user-editable once created; only the default moves.
                self.write_if_changed(&heading, node::DEFAULT_VALUE, title.into())?;
                Ok(index + 1)
            }
            None => {
                self.insert_heading(
                    0,
                    &HeadingSpec {
                        path: &path,
                        tag: TITLE_TAG,
                        title,
                        visible: true,
                    },
                )?;
                Ok(1)
            }
        }
    }

    /// Walk `elements` in declaration order. Returns whether any of them
    /// resolved visible.
    fn walk(
        &mut self,
        elements: &[ResultElement],
        base: &ResultPath,
        level: usize,
        inherited: Visibility,
        cursor: &mut usize,
    ) -> Result<bool, SyncError> {
        let mut any_visible = false;
        for element in elements {
            let path = base.child(&element.name);
            let shown = match element.children() {
                None => self.leaf(element, &path, inherited, cursor)?,
                Some(children) => self.group(element, children, &path, level, inherited, cursor)?,
            };
            any_visible |= shown;
        }
        Ok(any_visible)
    }

    fn leaf(
        &mut self,
        element: &ResultElement,
        path: &ResultPath,
        inherited: Visibility,
        cursor: &mut usize,
    ) -> Result<bool, SyncError> {
        let effective = element.visible.effective(inherited);
        let payload = element.leaf_payload(effective)?;
        match self.seen(path) {
            Some((target, index)) => {
                if self.write_bytes_if_changed(&target, node::DATA, payload)? {
                    debug!(analysis = %self.resource.id, %path, "result updated");
                }
                *cursor = index + 1;
            }
            None => {
                let at = self.clamp(*cursor)?;
                let created = node::insert_result(
                    &mut *self.doc,
                    self.txn,
                    &self.resource.content_root,
                    at,
                    path,
                    payload,
                )?;
                debug!(analysis = %self.resource.id, %path, index = at, "result created");
                self.register(path.clone(), created, at);
                *cursor = at + 1;
            }
        }
        Ok(effective.is_shown())
    }

    fn group(
        &mut self,
        element: &ResultElement,
        children: &[ResultElement],
        path: &ResultPath,
        level: usize,
        inherited: Visibility,
        cursor: &mut usize,
    ) -> Result<bool, SyncError> {
        let effective = element.visible.effective(inherited);
        let resolved = element.resolved_visibility(inherited);
        let heading_visible = !element.title.is_empty() && resolved.is_shown();
        let heading_path = path.heading();

        match self.seen(&heading_path) {
            Some((heading, index)) => {
                self.write_if_changed(&heading, node::VISIBLE, heading_visible.into())?;
                self.write_if_changed(&heading, node::DEFAULT_VALUE, element.title.as_str().into())?;
                *cursor = index + 1;
            }
            None => {
                let at = self.clamp(*cursor)?;
                let tag = format!("h{}", level.min(usize::from(self.settings.max_heading_level)));
                self.insert_heading(
                    at,
                    &HeadingSpec {
                        path: &heading_path,
                        tag: &tag,
                        title: &element.title,
                        visible: heading_visible,
                    },
                )?;
                *cursor = at + 1;
            }
        }

        let child_visible = self.walk(children, path, level + 1, effective, cursor)?;
        trace!(
            analysis = %self.resource.id,
            %path,
            child_visible,
            resolved = ?resolved,
            "group walked"
        );
        Ok(resolved.is_shown())
    }

    fn insert_heading(&mut self, at: usize, heading: &HeadingSpec<'_>) -> Result<(), SyncError> {
        let created = node::insert_heading(
            &mut *self.doc,
            self.txn,
            &self.resource.content_root,
            at,
            heading,
        )?;
        debug!(analysis = %self.resource.id, path = %heading.path, index = at, "heading created");
        self.register(heading.path.clone(), created, at);
        Ok(())
    }

    /// Mark a known path processed and return its node and position.
    fn seen(&mut self, path: &ResultPath) -> Option<(NodeId, usize)> {
        let item = self.resource.items.get_mut(path)?;
        item.processed = true;
        Some((item.node.clone(), item.index))
    }

    /// Record a freshly inserted node, shifting everything at or after it.
    fn register(&mut self, path: ResultPath, created: NodeId, at: usize) {
        for item in self.resource.items.values_mut() {
            if item.index >= at {
                item.index += 1;
            }
        }
        self.resource.items.insert(
            path.clone(),
            ResultItem {
                path,
                node: created,
                index: at,
                processed: true,
            },
        );
        self.report.created += 1;
    }

    fn clamp(&self, cursor: usize) -> Result<usize, SyncError> {
        Ok(cursor.min(self.content()?.len()))
    }

    fn write_if_changed(
        &mut self,
        target: &NodeId,
        key: &'static str,
        value: AttrValue,
    ) -> Result<bool, SyncError> {
        if self.doc.attribute(target, key).as_ref() == Some(&value) {
            return Ok(false);
        }
        self.doc.set_attribute(self.txn, target, key, value)?;
        self.report.attribute_writes += 1;
        Ok(true)
    }

    fn write_bytes_if_changed(
        &mut self,
        target: &NodeId,
        key: &'static str,
        bytes: Vec<u8>,
    ) -> Result<bool, SyncError> {
        if node::stored_bytes(&*self.doc, target, key).as_deref() == Some(bytes.as_slice()) {
            return Ok(false);
        }
        self.doc
            .set_attribute(self.txn, target, key, AttrValue::Bytes(bytes))?;
        self.report.attribute_writes += 1;
        Ok(true)
    }

    fn sweep(&mut self) -> Result<(), SyncError> {
        let content = self.content()?;
        let mut slots = Vec::with_capacity(content.len());
        for child in &content {
            let slot = match node::path_of(&*self.doc, child) {
                None => Slot::Boundary,
                Some(path) => {
                    let state = self
                        .resource
                        .items
                        .get(&path)
                        .map(|item| (&item.node == child, item.processed));
                    match state {
                        // Later duplicate, or a path already dropped above.
                        None | Some((false, _)) => Slot::Stale,
                        Some((true, true)) => Slot::Kept,
                        Some((true, false)) => {
                            self.resource.items.remove(&path);
                            Slot::Stale
                        }
                    }
                }
            };
            slots.push(slot);
        }

        let ranges = plan_deletions(&slots);
        // Back to front so earlier ranges keep their coordinates.
        for range in ranges.iter().rev() {
            debug!(
                analysis = %self.resource.id,
                begin = range.begin,
                len = range.len,
                "removing stale results"
            );
            self.doc
                .remove_range(self.txn, &self.resource.content_root, range.begin, range.len)?;
            self.report.removed += range.len;
        }
        self.report.delete_ranges = ranges;
        Ok(())
    }

    fn reindex(&mut self) -> Result<(), SyncError> {
        for (index, child) in self.content()?.into_iter().enumerate() {
            let Some(path) = node::path_of(&*self.doc, &child) else {
                continue;
            };
            if let Some(item) = self.resource.items.get_mut(&path) {
                if item.node == child {
                    item.index = index;
                }
            }
        }
        Ok(())
    }
}
