//! Replicated document on a Loro CRDT.
//!
//! Every named fragment is a `LoroTree` with fractional-index ordering.
//! Element and text nodes are tree nodes; their metadata map carries the node
//! kind, the tag, the text runs and every attribute under an `@` prefix.
//! Fragment-level attributes live in a map container of their own. The
//! `fragments` map lists every fragment ever written, so a replica can find
//! nodes that were created elsewhere.
//!
//! A transaction edits a private fork of the shared document. Commit ships the
//! fork's new ops into the shared document as one update; abort drops the
//! fork. Node ids are the ids of the tree-create ops and agree across
//! replicas.

use std::collections::BTreeMap;

use loro::{
    ExportMode, LoroDoc, LoroMap, LoroTree, LoroValue, TreeID, TreeParentId, ValueOrContainer,
    VersionVector, ID,
};
use tracing::trace;

use super::{
    AttrValue, Attributes, AttributeChange, ClientId, DocError, DocumentStore, ItemId, NodeId,
    NodeKind, Origin, StateVector, TextRun, TransactionSummary, TxnToken,
};
use crate::config::SyncConfig;
use crate::events::{EventHub, Sink, SubscriptionHandle};

const FRAGMENTS: &str = "fragments";
const KIND: &str = "kind";
const TAG: &str = "tag";
const RUNS: &str = "runs";
const ATTR_PREFIX: &str = "@";
const KIND_ELEMENT: &str = "element";
const KIND_TEXT: &str = "text";

fn substrate(err: impl std::fmt::Display) -> DocError {
    DocError::Substrate {
        reason: err.to_string(),
    }
}

fn attr_key(key: &str) -> String {
    format!("{ATTR_PREFIX}{key}")
}

fn fragment_attrs(name: &str) -> String {
    format!("attrs:{name}")
}

fn tree_id(item: ItemId) -> Option<TreeID> {
    i32::try_from(item.clock)
        .ok()
        .map(|counter| TreeID::new(item.client, counter))
}

fn node_id(id: TreeID) -> NodeId {
    NodeId::Item(ItemId {
        client: id.peer,
        clock: u64::from(id.counter.unsigned_abs()),
    })
}

fn to_loro(value: AttrValue) -> LoroValue {
    match value {
        AttrValue::Null => LoroValue::Null,
        AttrValue::Bool(b) => b.into(),
        AttrValue::Int(i) => i.into(),
        AttrValue::Str(s) => s.into(),
        AttrValue::Bytes(bytes) => bytes.into(),
    }
}

fn from_loro(value: LoroValue) -> Option<AttrValue> {
    match value {
        LoroValue::Null => Some(AttrValue::Null),
        LoroValue::Bool(b) => Some(AttrValue::Bool(b)),
        LoroValue::I64(i) => Some(AttrValue::Int(i)),
        LoroValue::String(s) => Some(AttrValue::Str(s.to_string())),
        LoroValue::Binary(bytes) => Some(AttrValue::Bytes(bytes.to_vec())),
        _ => None,
    }
}

fn plain_value(map: &LoroMap, key: &str) -> Option<LoroValue> {
    match map.get(key)? {
        ValueOrContainer::Value(value) => Some(value),
        ValueOrContainer::Container(_) => None,
    }
}

fn string_value(map: &LoroMap, key: &str) -> Option<String> {
    match plain_value(map, key)? {
        LoroValue::String(s) => Some(s.to_string()),
        _ => None,
    }
}

fn attributes_of(map: &LoroMap) -> Attributes {
    let mut attrs = Attributes::new();
    map.for_each(|key, value| {
        let (Some(name), ValueOrContainer::Value(value)) = (key.strip_prefix(ATTR_PREFIX), value)
        else {
            return;
        };
        if let Some(value) = from_loro(value) {
            attrs.insert(name.to_string(), value);
        }
    });
    attrs
}

fn state_vector(vv: &VersionVector) -> StateVector {
    vv.iter()
        .filter(|(_, end)| **end > 0)
        .map(|(peer, end)| (*peer, u64::from(end.unsigned_abs())))
        .collect()
}

fn version_vector(vector: &StateVector) -> VersionVector {
    let mut vv = VersionVector::new();
    for (peer, end) in vector.iter() {
        if let Ok(end) = i32::try_from(end) {
            vv.set_end(ID::new(peer, end));
        }
    }
    vv
}

/// Read access to either the shared document or an open fork.
struct View<'a>(&'a LoroDoc);

impl View<'_> {
    fn fragments(&self) -> Vec<String> {
        let mut names = Vec::new();
        self.0
            .get_map(FRAGMENTS)
            .for_each(|name, _| names.push(name.to_string()));
        names.sort();
        names
    }

    fn tree(&self, name: &str) -> LoroTree {
        let tree = self.0.get_tree(name);
        tree.enable_fractional_index(0);
        tree
    }

    fn locate(&self, id: TreeID) -> Option<LoroTree> {
        self.fragments()
            .iter()
            .map(|name| self.tree(name))
            .find(|tree| tree.contains(id) && !tree.is_node_deleted(&id).unwrap_or(true))
    }

    /// The tree holding `node`'s children and the parent id inside it.
    fn container(&self, node: &NodeId) -> Result<(LoroTree, TreeParentId), DocError> {
        match node {
            NodeId::Root(name) => Ok((self.tree(name), TreeParentId::Root)),
            NodeId::Item(item) => {
                let id = tree_id(*item).ok_or_else(|| DocError::UnknownNode(node.clone()))?;
                let tree = self
                    .locate(id)
                    .ok_or_else(|| DocError::UnknownNode(node.clone()))?;
                Ok((tree, TreeParentId::Node(id)))
            }
        }
    }

    fn meta(&self, node: &NodeId) -> Option<LoroMap> {
        match node {
            NodeId::Root(name) => Some(self.0.get_map(fragment_attrs(name).as_str())),
            NodeId::Item(item) => {
                let id = tree_id(*item)?;
                self.locate(id)?.get_meta(id).ok()
            }
        }
    }

    fn exists(&self, node: &NodeId) -> bool {
        match node {
            NodeId::Root(_) => true,
            NodeId::Item(_) => self.meta(node).is_some(),
        }
    }

    fn kind(&self, node: &NodeId) -> Option<NodeKind> {
        if let NodeId::Root(_) = node {
            return Some(NodeKind::Fragment);
        }
        let meta = self.meta(node)?;
        match string_value(&meta, KIND).as_deref() {
            Some(KIND_TEXT) => Some(NodeKind::Text),
            _ => Some(NodeKind::Element {
                tag: string_value(&meta, TAG).unwrap_or_default(),
            }),
        }
    }

    fn children(&self, node: &NodeId) -> Result<Vec<NodeId>, DocError> {
        let (tree, parent) = self.container(node)?;
        Ok(tree
            .children(parent)
            .unwrap_or_default()
            .into_iter()
            .map(node_id)
            .collect())
    }

    fn attribute(&self, node: &NodeId, key: &str) -> Option<AttrValue> {
        let meta = self.meta(node)?;
        from_loro(plain_value(&meta, &attr_key(key))?)
    }

    fn text(&self, node: &NodeId) -> Result<Vec<TextRun>, DocError> {
        match self.kind(node) {
            None => return Err(DocError::UnknownNode(node.clone())),
            Some(NodeKind::Text) => {}
            Some(_) => return Err(DocError::NotText(node.clone())),
        }
        let meta = self
            .meta(node)
            .ok_or_else(|| DocError::UnknownNode(node.clone()))?;
        match string_value(&meta, RUNS) {
            None => Ok(Vec::new()),
            Some(json) => serde_json::from_str(&json).map_err(substrate),
        }
    }
}

/// Attributes of every live node, for diffing around a merge.
#[derive(Debug, Default)]
struct Snapshot {
    nodes: BTreeMap<NodeId, Attributes>,
}

#[derive(Debug, Default)]
struct Changes {
    attribute_changes: Vec<AttributeChange>,
    inserted: Vec<NodeId>,
    removed: Vec<NodeId>,
}

impl Snapshot {
    fn capture(view: &View<'_>) -> Self {
        let mut nodes = BTreeMap::new();
        for name in view.fragments() {
            let tree = view.tree(&name);
            let root = NodeId::Root(name);
            if let Some(meta) = view.meta(&root) {
                nodes.insert(root, attributes_of(&meta));
            }
            let mut pending = tree.children(TreeParentId::Root).unwrap_or_default();
            while let Some(id) = pending.pop() {
                if let Ok(meta) = tree.get_meta(id) {
                    nodes.insert(node_id(id), attributes_of(&meta));
                }
                pending.extend(tree.children(TreeParentId::Node(id)).unwrap_or_default());
            }
        }
        Self { nodes }
    }

    fn diff(&self, after: &Snapshot) -> Changes {
        let mut changes = Changes::default();
        let none = Attributes::new();
        for (node, attrs) in &after.nodes {
            let old_attrs = match self.nodes.get(node) {
                Some(old) => old,
                None => {
                    if let NodeId::Item(_) = node {
                        changes.inserted.push(node.clone());
                    }
                    &none
                }
            };
            for (key, value) in attrs {
                let old = old_attrs.get(key);
                if old != Some(value) {
                    changes.attribute_changes.push(AttributeChange {
                        node: node.clone(),
                        key: key.clone(),
                        old: old.cloned(),
                        new: Some(value.clone()),
                    });
                }
            }
            for (key, value) in old_attrs.iter().filter(|(k, _)| !attrs.contains_key(*k)) {
                changes.attribute_changes.push(AttributeChange {
                    node: node.clone(),
                    key: key.clone(),
                    old: Some(value.clone()),
                    new: None,
                });
            }
        }
        changes.removed = self
            .nodes
            .keys()
            .filter(|node| matches!(node, NodeId::Item(_)) && !after.nodes.contains_key(*node))
            .cloned()
            .collect();
        changes
    }
}

struct OpenTxn {
    id: u64,
    work: LoroDoc,
}

/// [`DocumentStore`] over a [`LoroDoc`], identified by its replica (peer) id.
pub struct LoroDocument {
    replica: ClientId,
    doc: LoroDoc,
    open: Option<OpenTxn>,
    next_txn: u64,
    observers: EventHub<TransactionSummary>,
}

impl LoroDocument {
    /// `replica` must be unique among the replicas that edit this document.
    pub fn new(replica: ClientId) -> Self {
        Self {
            replica,
            doc: LoroDoc::new(),
            open: None,
            next_txn: 1,
            observers: EventHub::new(),
        }
    }

    pub fn from_config(config: &SyncConfig) -> Self {
        Self::new(config.replica())
    }

    pub fn replica(&self) -> ClientId {
        self.replica
    }

    pub fn state_vector(&self) -> StateVector {
        state_vector(&self.doc.oplog_vv())
    }

    pub fn in_transaction(&self) -> bool {
        self.open.is_some()
    }

    fn view(&self) -> View<'_> {
        View(self.open.as_ref().map_or(&self.doc, |open| &open.work))
    }

    /// The fork `txn` writes to.
    fn work(&self, txn: &TxnToken) -> Result<&LoroDoc, DocError> {
        match &self.open {
            None => Err(DocError::NoTransaction),
            Some(open) if open.id != txn.id() => Err(DocError::ForeignTransaction {
                open: open.id,
                got: txn.id(),
            }),
            Some(open) => Ok(&open.work),
        }
    }

    fn register_fragment(work: &LoroDoc, name: &str) -> Result<(), DocError> {
        let fragments = work.get_map(FRAGMENTS);
        if fragments.get(name).is_none() {
            fragments.insert(name, true).map_err(substrate)?;
        }
        Ok(())
    }

    fn insert_node(
        &self,
        txn: &TxnToken,
        parent: &NodeId,
        index: usize,
        kind: NodeKind,
    ) -> Result<NodeId, DocError> {
        let work = self.work(txn)?;
        let view = View(work);
        match (parent, view.kind(parent)) {
            (_, None) => return Err(DocError::UnknownNode(parent.clone())),
            (_, Some(NodeKind::Text)) => return Err(DocError::NotAContainer(parent.clone())),
            (NodeId::Root(name), _) => Self::register_fragment(work, name)?,
            (NodeId::Item(_), _) => {}
        }
        let len = view.children(parent)?.len();
        if index > len {
            return Err(DocError::OutOfBounds { index, len });
        }

        let (tree, parent_id) = view.container(parent)?;
        let id = tree.create_at(parent_id, index).map_err(substrate)?;
        let meta = tree.get_meta(id).map_err(substrate)?;
        match kind {
            NodeKind::Text => meta.insert(KIND, KIND_TEXT).map_err(substrate)?,
            NodeKind::Element { tag } => {
                meta.insert(KIND, KIND_ELEMENT).map_err(substrate)?;
                meta.insert(TAG, tag).map_err(substrate)?;
            }
            NodeKind::Fragment => return Err(DocError::NotAContainer(parent.clone())),
        }
        Ok(node_id(id))
    }

    /// Import `update` into the shared document and announce what it changed.
    fn merge(&mut self, update: &[u8], origin: Origin) -> Result<TransactionSummary, DocError> {
        let before_vector = self.state_vector();
        let before = Snapshot::capture(&View(&self.doc));
        self.doc
            .import(update)
            .map_err(|err| DocError::MalformedUpdate {
                reason: err.to_string(),
            })?;
        let changes = before.diff(&Snapshot::capture(&View(&self.doc)));

        let summary = TransactionSummary {
            origin,
            before: before_vector,
            after: self.state_vector(),
            attribute_changes: changes.attribute_changes,
            inserted: changes.inserted,
            removed: changes.removed,
        };
        if summary.changed_state() {
            self.observers.publish(&summary);
        }
        Ok(summary)
    }
}

impl DocumentStore for LoroDocument {
    fn exists(&self, node: &NodeId) -> bool {
        self.view().exists(node)
    }

    fn kind(&self, node: &NodeId) -> Option<NodeKind> {
        self.view().kind(node)
    }

    fn children(&self, node: &NodeId) -> Result<Vec<NodeId>, DocError> {
        self.view().children(node)
    }

    fn attribute(&self, node: &NodeId, key: &str) -> Option<AttrValue> {
        self.view().attribute(node, key)
    }

    fn text(&self, node: &NodeId) -> Result<Vec<TextRun>, DocError> {
        self.view().text(node)
    }

    fn begin(&mut self) -> Result<TxnToken, DocError> {
        if let Some(open) = &self.open {
            return Err(DocError::TransactionInFlight { open: open.id });
        }
        let snapshot = self.doc.export(ExportMode::Snapshot).map_err(substrate)?;
        let work = LoroDoc::new();
        work.set_peer_id(self.replica).map_err(substrate)?;
        work.import(&snapshot).map_err(substrate)?;

        let id = self.next_txn;
        self.next_txn += 1;
        self.open = Some(OpenTxn { id, work });
        Ok(TxnToken::new(id))
    }

    fn commit(&mut self, txn: TxnToken) -> Result<TransactionSummary, DocError> {
        self.work(&txn)?;
        let open = self.open.take().ok_or(DocError::NoTransaction)?;
        open.work.commit();
        let shared = self.doc.oplog_vv();
        let update = open
            .work
            .export(ExportMode::updates(&shared))
            .map_err(substrate)?;
        trace!(txn = open.id, bytes = update.len(), "transaction committed");
        self.merge(&update, Origin::Local)
    }

    fn abort(&mut self, txn: TxnToken) -> Result<(), DocError> {
        self.work(&txn)?;
        self.open = None;
        Ok(())
    }

    fn insert_element(
        &mut self,
        txn: &TxnToken,
        parent: &NodeId,
        index: usize,
        tag: &str,
    ) -> Result<NodeId, DocError> {
        self.insert_node(
            txn,
            parent,
            index,
            NodeKind::Element {
                tag: tag.to_string(),
            },
        )
    }

    fn insert_text(
        &mut self,
        txn: &TxnToken,
        parent: &NodeId,
        index: usize,
    ) -> Result<NodeId, DocError> {
        self.insert_node(txn, parent, index, NodeKind::Text)
    }

    fn set_attribute(
        &mut self,
        txn: &TxnToken,
        node: &NodeId,
        key: &str,
        value: AttrValue,
    ) -> Result<(), DocError> {
        let work = self.work(txn)?;
        if let NodeId::Root(name) = node {
            Self::register_fragment(work, name)?;
        }
        let meta = View(work)
            .meta(node)
            .ok_or_else(|| DocError::UnknownNode(node.clone()))?;
        meta.insert(&attr_key(key), to_loro(value))
            .map_err(substrate)
    }

    fn push_text(
        &mut self,
        txn: &TxnToken,
        node: &NodeId,
        run: TextRun,
    ) -> Result<(), DocError> {
        let work = self.work(txn)?;
        let view = View(work);
        let mut runs = view.text(node)?;
        runs.push(run);
        let json = serde_json::to_string(&runs).map_err(substrate)?;
        let meta = view
            .meta(node)
            .ok_or_else(|| DocError::UnknownNode(node.clone()))?;
        meta.insert(RUNS, json).map_err(substrate)
    }

    fn remove_range(
        &mut self,
        txn: &TxnToken,
        parent: &NodeId,
        index: usize,
        len: usize,
    ) -> Result<(), DocError> {
        let view = View(self.work(txn)?);
        let siblings = view.children(parent)?;
        let end = index.saturating_add(len);
        if end > siblings.len() {
            return Err(DocError::OutOfBounds {
                index: end,
                len: siblings.len(),
            });
        }
        let (tree, _) = view.container(parent)?;
        for child in &siblings[index..end] {
            let NodeId::Item(item) = child else {
                continue;
            };
            let id = tree_id(*item).ok_or_else(|| DocError::UnknownNode(child.clone()))?;
            tree.delete(id).map_err(substrate)?;
        }
        Ok(())
    }

    fn encode_state_vector(&self) -> Result<Vec<u8>, DocError> {
        self.state_vector().encode()
    }

    fn encode_state_as_update(&self, since: Option<&[u8]>) -> Result<Vec<u8>, DocError> {
        let since = match since {
            Some(bytes) => version_vector(&StateVector::decode(bytes)?),
            None => VersionVector::new(),
        };
        self.doc
            .export(ExportMode::updates(&since))
            .map_err(substrate)
    }

    fn apply_update(&mut self, update: &[u8]) -> Result<TransactionSummary, DocError> {
        if let Some(open) = &self.open {
            return Err(DocError::TransactionInFlight { open: open.id });
        }
        self.merge(update, Origin::Remote)
    }

    fn observe_after_transaction(
        &mut self,
        sink: Sink<TransactionSummary>,
    ) -> SubscriptionHandle {
        self.observers.subscribe(sink)
    }
}
