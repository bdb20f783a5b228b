//! Ownership table of tracked analyses.

use std::collections::{BTreeMap, HashMap};

use crate::core::{AnalysisId, ResultPath, Revision};
use crate::doc::NodeId;
use crate::engine::AnalysisHandle;

use super::SyncError;

/// What has been materialized in the document for one path.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ResultItem {
    pub path: ResultPath,
    pub node: NodeId,
    /// Last-known position among the content root's children.
    pub index: usize,
    /// Revisited during the current pass.
    pub processed: bool,
}

#[derive(Debug)]
pub struct AnalysisResource {
    pub id: AnalysisId,
    pub handle: AnalysisHandle,
    /// Element carrying `__uuid` and `__options`. Owned by the document;
    /// moved with [`ResourceTable::rebind_element`] so lookups follow it.
    pub element: NodeId,
    /// Fragment holding the mirrored results.
    pub content_root: NodeId,
    pub items: BTreeMap<ResultPath, ResultItem>,
    pub revision: Revision,
    /// Set while the analysis is being created.
    pub initializing: bool,
    /// The mirrored options could not be decoded; the engine is behind the
    /// document until a readable value arrives.
    pub needs_recompute: bool,
}

impl AnalysisResource {
    pub fn new(id: AnalysisId, handle: AnalysisHandle, element: NodeId) -> Self {
        Self {
            id,
            handle,
            element,
            content_root: NodeId::root(id.content_fragment()),
            items: BTreeMap::new(),
            revision: Revision::ZERO,
            initializing: false,
            needs_recompute: false,
        }
    }

    /// Items in document order.
    pub fn items_in_order(&self) -> Vec<&ResultItem> {
        let mut items: Vec<&ResultItem> = self.items.values().collect();
        items.sort_by_key(|item| item.index);
        items
    }
}

#[derive(Debug, Default)]
pub struct ResourceTable {
    by_id: BTreeMap<AnalysisId, AnalysisResource>,
    by_handle: HashMap<AnalysisHandle, AnalysisId>,
    by_element: HashMap<NodeId, AnalysisId>,
}

impl ResourceTable {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, resource: AnalysisResource) -> Result<(), SyncError> {
        if self.by_id.contains_key(&resource.id) {
            return Err(SyncError::AlreadyTracked(resource.id));
        }
        self.by_handle.insert(resource.handle, resource.id);
        self.by_element.insert(resource.element.clone(), resource.id);
        self.by_id.insert(resource.id, resource);
        Ok(())
    }

    pub fn contains(&self, id: &AnalysisId) -> bool {
        self.by_id.contains_key(id)
    }

    pub fn get(&self, id: &AnalysisId) -> Option<&AnalysisResource> {
        self.by_id.get(id)
    }

    pub fn get_mut(&mut self, id: &AnalysisId) -> Option<&mut AnalysisResource> {
        self.by_id.get_mut(id)
    }

    pub fn id_for_handle(&self, handle: AnalysisHandle) -> Option<AnalysisId> {
        self.by_handle.get(&handle).copied()
    }

    pub fn id_for_element(&self, element: &NodeId) -> Option<AnalysisId> {
        self.by_element.get(element).copied()
    }

    /// Point `id` at a re-created root element. Returns the element it
    /// replaced, or `None` if nothing changed.
    pub fn rebind_element(&mut self, id: &AnalysisId, element: NodeId) -> Option<NodeId> {
        let resource = self.by_id.get_mut(id)?;
        if resource.element == element {
            return None;
        }
        self.by_element.remove(&resource.element);
        self.by_element.insert(element.clone(), *id);
        Some(std::mem::replace(&mut resource.element, element))
    }

    pub fn remove(&mut self, id: &AnalysisId) -> Option<AnalysisResource> {
        let resource = self.by_id.remove(id)?;
        self.by_handle.remove(&resource.handle);
        self.by_element.remove(&resource.element);
        Some(resource)
    }

    pub fn ids(&self) -> Vec<AnalysisId> {
        self.by_id.keys().copied().collect()
    }

    pub fn len(&self) -> usize {
        self.by_id.len()
    }

    pub fn is_empty(&self) -> bool {
        self.by_id.is_empty()
    }
}
