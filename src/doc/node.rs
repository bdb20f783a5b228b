//! Attribute and node conventions shared with editor clients.
//!
//! The reconciler never inspects node kinds at runtime beyond
//! [`ContentRole::classify`]; everything else goes through the typed helpers
//! here.

use super::{AttrValue, DocError, DocumentStore, NodeId, NodeKind, TextRun, TxnToken};
use crate::core::{AnalysisId, AnalysisOptions, DecodeError, ResultPath, options};

pub const UUID: &str = "__uuid";
pub const NAME: &str = "__name";
pub const NAMESPACE: &str = "__ns";
pub const OPTIONS: &str = "__options";
pub const INSTANCE_ID: &str = "__id";
pub const DETAILS: &str = "__dets";

pub const TYPE: &str = "__type";
pub const PATH: &str = "__path";
pub const DATA: &str = "__data";
pub const VISIBLE: &str = "__visible";
pub const DEFAULT_VALUE: &str = "__defaultValue";
pub const TAG: &str = "__tag";

pub const FORMAT: &str = "__format";
pub const STYLE: &str = "__style";
pub const INDENT: &str = "__indent";
pub const DIR: &str = "__dir";
pub const TEXT_FORMAT: &str = "__textFormat";
pub const TEXT_STYLE: &str = "__textStyle";
pub const MODE: &str = "__mode";
pub const DETAIL: &str = "__detail";

pub const TYPE_RESULT: &str = "result";
pub const TYPE_HEADING: &str = "result-heading";
pub const TYPE_TEXT: &str = "text";
pub const RESULT_TAG: &str = "result";
pub const LEFT_TO_RIGHT: &str = "ltr";

/// What a node means to the reconciler.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ContentRole {
    /// Element carrying an analysis identity.
    AnalysisRoot(AnalysisId),
    /// Mirrored leaf result.
    Result(ResultPath),
    /// Title or group heading.
    Heading(ResultPath),
    /// Anything else: user paragraphs, foreign nodes, malformed paths.
    Unmanaged,
}

impl ContentRole {
    pub fn classify<D: DocumentStore + ?Sized>(doc: &D, node: &NodeId) -> ContentRole {
        if let Some(NodeKind::Element { .. }) = doc.kind(node) {
            if let Some(id) = analysis_id_of(doc, node) {
                return ContentRole::AnalysisRoot(id);
            }
        }
        let Some(path) = path_of(doc, node) else {
            return ContentRole::Unmanaged;
        };
        match doc.attribute(node, TYPE).as_ref().and_then(AttrValue::as_str) {
            Some(TYPE_HEADING) => ContentRole::Heading(path),
            _ => ContentRole::Result(path),
        }
    }

    pub fn path(&self) -> Option<&ResultPath> {
        match self {
            ContentRole::Result(path) | ContentRole::Heading(path) => Some(path),
            ContentRole::AnalysisRoot(_) | ContentRole::Unmanaged => None,
        }
    }
}

/// `__uuid` of an analysis root element, if present and well-formed.
pub fn analysis_id_of<D: DocumentStore + ?Sized>(doc: &D, node: &NodeId) -> Option<AnalysisId> {
    let raw = doc.attribute(node, UUID)?;
    AnalysisId::parse(raw.as_str()?).ok()
}

/// `__path` of a content node. Unparseable paths count as absent.
pub fn path_of<D: DocumentStore + ?Sized>(doc: &D, node: &NodeId) -> Option<ResultPath> {
    let raw = doc.attribute(node, PATH)?;
    ResultPath::parse(raw.as_str()?).ok()
}

pub fn string_attr<D: DocumentStore + ?Sized>(doc: &D, node: &NodeId, key: &str) -> String {
    doc.attribute(node, key)
        .and_then(|v| v.as_str().map(str::to_string))
        .unwrap_or_default()
}

/// Raw bytes of a binary attribute, accepting both bytes and the `0x` hex
/// strings editor clients write.
pub fn attr_bytes(value: &AttrValue, field: &'static str) -> Result<Vec<u8>, DecodeError> {
    match value {
        AttrValue::Bytes(bytes) => Ok(bytes.clone()),
        AttrValue::Str(raw) => options::decode_prefixed_hex(raw)
            .map_err(|e| DecodeError::new(field, e.reason)),
        other => Err(DecodeError::new(
            field,
            format!("unexpected attribute value {other:?}"),
        )),
    }
}

pub fn options_bytes(value: &AttrValue) -> Result<Vec<u8>, DecodeError> {
    attr_bytes(value, OPTIONS)
}

/// Stored bytes of a binary attribute, `None` when absent or unreadable.
pub fn stored_bytes<D: DocumentStore + ?Sized>(
    doc: &D,
    node: &NodeId,
    key: &'static str,
) -> Option<Vec<u8>> {
    doc.attribute(node, key)
        .and_then(|value| attr_bytes(&value, key).ok())
}

pub fn decode_options(value: &AttrValue) -> Result<AnalysisOptions, DecodeError> {
    AnalysisOptions::decode(&options_bytes(value)?)
}

/// Current `__options` bytes of an analysis root, `None` when absent or
/// unreadable.
pub fn stored_options_bytes<D: DocumentStore + ?Sized>(doc: &D, node: &NodeId) -> Option<Vec<u8>> {
    stored_bytes(doc, node, OPTIONS)
}

/// Attributes describing a heading to insert.
#[derive(Clone, Debug)]
pub struct HeadingSpec<'a> {
    pub path: &'a ResultPath,
    pub tag: &'a str,
    pub title: &'a str,
    pub visible: bool,
}

pub fn insert_heading<D: DocumentStore + ?Sized>(
    doc: &mut D,
    txn: &TxnToken,
    parent: &NodeId,
    index: usize,
    heading: &HeadingSpec<'_>,
) -> Result<NodeId, DocError> {
    let node = doc.insert_text(txn, parent, index)?;
    let attrs: [(&str, AttrValue); 11] = [
        (TYPE, TYPE_HEADING.into()),
        (FORMAT, AttrValue::Int(0)),
        (STYLE, "".into()),
        (INDENT, AttrValue::Int(0)),
        (DIR, LEFT_TO_RIGHT.into()),
        (TEXT_FORMAT, AttrValue::Int(0)),
        (TEXT_STYLE, "".into()),
        (TAG, heading.tag.into()),
        (PATH, heading.path.as_str().into()),
        (VISIBLE, heading.visible.into()),
        (DEFAULT_VALUE, heading.title.into()),
    ];
    for (key, value) in attrs {
        doc.set_attribute(txn, &node, key, value)?;
    }
    let run = TextRun {
        text: heading.title.to_string(),
        attrs: [
            (TYPE.to_string(), AttrValue::from(TYPE_TEXT)),
            (FORMAT.to_string(), AttrValue::Int(0)),
            (STYLE.to_string(), AttrValue::from("")),
            (MODE.to_string(), AttrValue::Int(0)),
            (DETAIL.to_string(), AttrValue::Int(0)),
        ]
        .into_iter()
        .collect(),
    };
    doc.push_text(txn, &node, run)?;
    Ok(node)
}

pub fn insert_result<D: DocumentStore + ?Sized>(
    doc: &mut D,
    txn: &TxnToken,
    parent: &NodeId,
    index: usize,
    path: &ResultPath,
    data: Vec<u8>,
) -> Result<NodeId, DocError> {
    let node = doc.insert_element(txn, parent, index, RESULT_TAG)?;
    doc.set_attribute(txn, &node, TYPE, TYPE_RESULT.into())?;
    doc.set_attribute(txn, &node, PATH, path.as_str().into())?;
    doc.set_attribute(txn, &node, DATA, AttrValue::Bytes(data))?;
    Ok(node)
}
