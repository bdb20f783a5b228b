#![allow(dead_code)]

use std::cell::RefCell;
use std::rc::Rc;

use analyses_doc::config::SyncConfig;
use analyses_doc::doc::node;
use analyses_doc::events::SubscriptionHandle;
use analyses_doc::sync::{DocChanged, PumpReport};
use analyses_doc::test_harness::ScriptedEngine;
use analyses_doc::{AnalysesDoc, AnalysisId, AttrValue, DocumentStore, LoroDocument, NodeId};

use super::peer::Peer;

pub const SERVER_CLIENT: u64 = 1;

/// The server side: one document, one scripted engine, plus a record of
/// every `doc_changed` it published.
pub struct Rig {
    pub sync: AnalysesDoc<LoroDocument, ScriptedEngine>,
    pub published: Rc<RefCell<Vec<DocChanged>>>,
    _published_sub: SubscriptionHandle,
}

impl Rig {
    pub fn new(engine: ScriptedEngine) -> Self {
        Self::with_settings(engine, SyncConfig::default())
    }

    pub fn with_settings(engine: ScriptedEngine, settings: SyncConfig) -> Self {
        let mut sync = AnalysesDoc::new(LoroDocument::new(SERVER_CLIENT), engine, settings);
        let published = Rc::new(RefCell::new(Vec::new()));
        let sink = Rc::clone(&published);
        let sub = sync.subscribe_doc_changed(Box::new(move |event: &DocChanged| {
            sink.borrow_mut().push(event.clone());
            true
        }));
        Self {
            sync,
            published,
            _published_sub: sub,
        }
    }

    /// Merge everything the peer has that we lack, and handle it.
    pub fn pull_from(&mut self, peer: &Peer) -> PumpReport {
        let ours = self.sync.doc().encode_state_vector().expect("state vector");
        let update = peer.update_since(Some(&ours));
        self.sync.apply_changes(&update).expect("apply peer update")
    }

    /// Send the peer everything it lacks.
    pub fn push_to(&self, peer: &mut Peer) {
        let since = peer.state_vector();
        let (_, update) = self.sync.get_changes(Some(&since)).expect("changes");
        peer.merge(&update);
    }

    pub fn publish_count(&self) -> usize {
        self.published.borrow().len()
    }

    pub fn content_root(&self, id: &AnalysisId) -> NodeId {
        NodeId::root(id.content_fragment())
    }
}

/// `__path` of every child of `parent`, in document order.
pub fn paths<D: DocumentStore>(doc: &D, parent: &NodeId) -> Vec<String> {
    doc.children(parent)
        .expect("children")
        .iter()
        .filter_map(|child| node::path_of(doc, child))
        .map(|path| path.to_string())
        .collect()
}

pub fn child_with_path<D: DocumentStore>(doc: &D, parent: &NodeId, path: &str) -> Option<NodeId> {
    doc.children(parent)
        .expect("children")
        .into_iter()
        .find(|child| node::path_of(doc, child).is_some_and(|p| p.as_str() == path))
}

/// Decoded `__data` of a result node.
pub fn payload<D: DocumentStore>(doc: &D, target: &NodeId) -> serde_json::Value {
    match doc.attribute(target, node::DATA) {
        Some(AttrValue::Bytes(bytes)) => serde_json::from_slice(&bytes).expect("payload json"),
        other => panic!("result node without payload: {other:?}"),
    }
}
