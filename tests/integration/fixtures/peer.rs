#![allow(dead_code)]

use analyses_doc::doc::node;
use analyses_doc::{AnalysisId, AnalysisOptions, DocumentStore, LoroDocument, NodeId};

pub const PEER_CLIENT: u64 = 2;

/// A remote editor: declares analyses and edits their options.
pub struct Peer {
    pub doc: LoroDocument,
}

impl Peer {
    pub fn new() -> Self {
        Self {
            doc: LoroDocument::new(PEER_CLIENT),
        }
    }

    pub fn state_vector(&self) -> Vec<u8> {
        self.doc.encode_state_vector().expect("state vector")
    }

    /// Everything this peer wrote since `since`.
    pub fn update_since(&self, since: Option<&[u8]>) -> Vec<u8> {
        self.doc.encode_state_as_update(since).expect("encode update")
    }

    pub fn merge(&mut self, update: &[u8]) {
        self.doc.apply_update(update).expect("merge update");
    }

    /// Appends an analysis root the way editor clients do: options as a
    /// `0x`-prefixed hex string.
    pub fn add_analysis(&mut self, name: &str, options: &AnalysisOptions) -> (AnalysisId, NodeId) {
        let id = AnalysisId::generate();
        let root = self.doc.root("root");
        let at = self.doc.children(&root).expect("root children").len();
        let txn = self.doc.begin().expect("begin");
        let element = self
            .doc
            .insert_element(&txn, &root, at, "analysis")
            .expect("insert analysis");
        self.doc
            .set_attribute(&txn, &element, node::UUID, id.to_string().into())
            .expect("uuid");
        self.doc
            .set_attribute(&txn, &element, node::NAME, name.into())
            .expect("name");
        self.doc
            .set_attribute(&txn, &element, node::NAMESPACE, "jmv".into())
            .expect("ns");
        self.doc
            .set_attribute(&txn, &element, node::OPTIONS, hex_options(options).into())
            .expect("options");
        self.doc.commit(txn).expect("commit");
        (id, element)
    }

    pub fn edit_options(&mut self, element: &NodeId, options: &AnalysisOptions) {
        let txn = self.doc.begin().expect("begin");
        self.doc
            .set_attribute(&txn, element, node::OPTIONS, hex_options(options).into())
            .expect("options");
        self.doc.commit(txn).expect("commit");
    }

    pub fn remove_analysis(&mut self, element: &NodeId) {
        let root = self.doc.root("root");
        let index = self
            .doc
            .children(&root)
            .expect("root children")
            .iter()
            .position(|child| child == element)
            .expect("analysis present");
        let txn = self.doc.begin().expect("begin");
        self.doc
            .remove_range(&txn, &root, index, 1)
            .expect("remove analysis");
        self.doc.commit(txn).expect("commit");
    }

    /// Swaps an analysis root for a fresh element carrying the same identity,
    /// as editors do when a whole block is cut and pasted back.
    pub fn replace_analysis(
        &mut self,
        element: &NodeId,
        id: AnalysisId,
        name: &str,
        options: &AnalysisOptions,
    ) -> NodeId {
        let root = self.doc.root("root");
        let index = self
            .doc
            .children(&root)
            .expect("root children")
            .iter()
            .position(|child| child == element)
            .expect("analysis present");
        let txn = self.doc.begin().expect("begin");
        self.doc
            .remove_range(&txn, &root, index, 1)
            .expect("remove analysis");
        let replacement = self
            .doc
            .insert_element(&txn, &root, index, "analysis")
            .expect("insert analysis");
        for (key, value) in [
            (node::UUID, id.to_string()),
            (node::NAME, name.to_string()),
            (node::NAMESPACE, "jmv".to_string()),
            (node::OPTIONS, hex_options(options)),
        ] {
            self.doc
                .set_attribute(&txn, &replacement, key, value.into())
                .expect("attribute");
        }
        self.doc.commit(txn).expect("commit");
        replacement
    }
}

pub fn hex_options(options: &AnalysisOptions) -> String {
    format!("0x{}", hex::encode(options.encode().expect("encode options")))
}
