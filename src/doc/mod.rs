//! Replicated document boundary.
//!
//! The substrate (merge algorithm, conflict resolution, wire protocol) is an
//! external collaborator. This module fixes the surface the reconciler and the
//! options synchronizer consume: an ordered child sequence per node, named
//! attributes, positional insert and range delete, version vectors, and an
//! after-transaction notification.
//!
//! Every mutation takes a [`TxnToken`]. Tokens are minted by
//! [`DocumentStore::begin`] and consumed by `commit`/`abort`; a mutation with
//! a token that is not the open transaction fails fast.

mod crdt;
mod error;
pub mod node;

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::events::{Sink, SubscriptionHandle};

pub use error::DocError;
pub use crdt::LoroDocument;

pub type ClientId = u64;

/// Identity of an item created by one replica; agrees across replicas.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ItemId {
    pub client: ClientId,
    pub clock: u64,
}

#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NodeId {
    /// Named top-level fragment, implicitly present on every replica.
    Root(String),
    Item(ItemId),
}

impl NodeId {
    pub fn root(name: impl Into<String>) -> Self {
        NodeId::Root(name.into())
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NodeKind {
    Fragment,
    Element { tag: String },
    Text,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AttrValue {
    Null,
    Bool(bool),
    Int(i64),
    Str(String),
    Bytes(Vec<u8>),
}

impl AttrValue {
    pub fn as_str(&self) -> Option<&str> {
        match self {
            AttrValue::Str(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            AttrValue::Bool(b) => Some(*b),
            _ => None,
        }
    }

    pub fn as_int(&self) -> Option<i64> {
        match self {
            AttrValue::Int(i) => Some(*i),
            _ => None,
        }
    }

    pub fn as_bytes(&self) -> Option<&[u8]> {
        match self {
            AttrValue::Bytes(b) => Some(b),
            _ => None,
        }
    }
}

impl From<&str> for AttrValue {
    fn from(value: &str) -> Self {
        AttrValue::Str(value.to_string())
    }
}

impl From<String> for AttrValue {
    fn from(value: String) -> Self {
        AttrValue::Str(value)
    }
}

impl From<bool> for AttrValue {
    fn from(value: bool) -> Self {
        AttrValue::Bool(value)
    }
}

impl From<i64> for AttrValue {
    fn from(value: i64) -> Self {
        AttrValue::Int(value)
    }
}

impl From<Vec<u8>> for AttrValue {
    fn from(value: Vec<u8>) -> Self {
        AttrValue::Bytes(value)
    }
}

pub type Attributes = BTreeMap<String, AttrValue>;

/// A run of text inside a text node, with its formatting attributes.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TextRun {
    pub text: String,
    pub attrs: Attributes,
}

/// Operations seen per client.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct StateVector(BTreeMap<ClientId, u64>);

impl StateVector {
    pub fn get(&self, client: ClientId) -> u64 {
        self.0.get(&client).copied().unwrap_or(0)
    }

    pub fn iter(&self) -> impl Iterator<Item = (ClientId, u64)> + '_ {
        self.0.iter().map(|(client, seen)| (*client, *seen))
    }

    pub fn encode(&self) -> Result<Vec<u8>, DocError> {
        serde_json::to_vec(self).map_err(|e| DocError::MalformedUpdate {
            reason: e.to_string(),
        })
    }

    pub fn decode(bytes: &[u8]) -> Result<Self, DocError> {
        serde_json::from_slice(bytes).map_err(|e| DocError::MalformedUpdate {
            reason: format!("state vector: {e}"),
        })
    }
}

impl FromIterator<(ClientId, u64)> for StateVector {
    fn from_iter<I: IntoIterator<Item = (ClientId, u64)>>(iter: I) -> Self {
        Self(iter.into_iter().collect())
    }
}

/// Where a committed change came from.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Origin {
    /// Committed through a local transaction.
    Local,
    /// Merged from a peer's update.
    Remote,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct AttributeChange {
    pub node: NodeId,
    pub key: String,
    pub old: Option<AttrValue>,
    pub new: Option<AttrValue>,
}

impl AttributeChange {
    pub fn is_update(&self) -> bool {
        self.old != self.new
    }
}

/// Delivered after every commit or merged update.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct TransactionSummary {
    pub origin: Origin,
    pub before: StateVector,
    pub after: StateVector,
    pub attribute_changes: Vec<AttributeChange>,
    pub inserted: Vec<NodeId>,
    pub removed: Vec<NodeId>,
}

impl TransactionSummary {
    pub fn changed_state(&self) -> bool {
        self.before != self.after
    }

    /// Changes to `key`, collapsed to one entry per node (first old value,
    /// last new value).
    pub fn changes_for(&self, key: &str) -> Vec<AttributeChange> {
        let mut out: Vec<AttributeChange> = Vec::new();
        for change in self.attribute_changes.iter().filter(|c| c.key == key) {
            match out.iter_mut().find(|c| c.node == change.node) {
                Some(existing) => existing.new = change.new.clone(),
                None => out.push(change.clone()),
            }
        }
        out
    }
}

/// Proof that a transaction is open; consumed by commit/abort.
#[derive(Debug, PartialEq, Eq)]
pub struct TxnToken {
    id: u64,
}

impl TxnToken {
    /// Substrates mint one token per `begin`.
    pub fn new(id: u64) -> Self {
        Self { id }
    }

    pub fn id(&self) -> u64 {
        self.id
    }
}

pub trait DocumentStore {
    // Reads.
    fn root(&self, name: &str) -> NodeId {
        NodeId::root(name)
    }
    fn exists(&self, node: &NodeId) -> bool;
    fn kind(&self, node: &NodeId) -> Option<NodeKind>;
    fn children(&self, node: &NodeId) -> Result<Vec<NodeId>, DocError>;
    fn attribute(&self, node: &NodeId, key: &str) -> Option<AttrValue>;
    fn text(&self, node: &NodeId) -> Result<Vec<TextRun>, DocError>;

    // Transaction scope.
    fn begin(&mut self) -> Result<TxnToken, DocError>;
    fn commit(&mut self, txn: TxnToken) -> Result<TransactionSummary, DocError>;
    fn abort(&mut self, txn: TxnToken) -> Result<(), DocError>;

    // Mutations, only inside a transaction.
    fn insert_element(
        &mut self,
        txn: &TxnToken,
        parent: &NodeId,
        index: usize,
        tag: &str,
    ) -> Result<NodeId, DocError>;
    fn insert_text(
        &mut self,
        txn: &TxnToken,
        parent: &NodeId,
        index: usize,
    ) -> Result<NodeId, DocError>;
    fn set_attribute(
        &mut self,
        txn: &TxnToken,
        node: &NodeId,
        key: &str,
        value: AttrValue,
    ) -> Result<(), DocError>;
    fn push_text(&mut self, txn: &TxnToken, node: &NodeId, run: TextRun)
    -> Result<(), DocError>;
    fn remove_range(
        &mut self,
        txn: &TxnToken,
        parent: &NodeId,
        index: usize,
        len: usize,
    ) -> Result<(), DocError>;

    // Versioning.
    fn encode_state_vector(&self) -> Result<Vec<u8>, DocError>;
    fn encode_state_as_update(&self, since: Option<&[u8]>) -> Result<Vec<u8>, DocError>;
    fn apply_update(&mut self, update: &[u8]) -> Result<TransactionSummary, DocError>;

    // Observation.
    fn observe_after_transaction(&mut self, sink: Sink<TransactionSummary>)
    -> SubscriptionHandle;
}
