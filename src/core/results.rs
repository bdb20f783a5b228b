//! Layer 3: the engine's result tree
//!
//! A closed set of element kinds. Tables and images are leaves that get
//! mirrored as one document node each; groups and arrays are containers that
//! get a heading node followed by their children.

use serde::{Deserialize, Serialize};

use super::canon::{CanonError, ensure_finite, to_canonical_bytes};
use super::visibility::Visibility;

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AnalysisStatus {
    #[default]
    Pending,
    Running,
    Complete,
    Error,
}

/// One computed result tree, as delivered with a results-changed event.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct AnalysisResponse {
    /// Engine-side instance number, mirrored into `__id`.
    pub instance_id: u64,
    pub status: AnalysisStatus,
    pub title: String,
    #[serde(default)]
    pub references: Vec<String>,
    pub group: ResultGroup,
}

/// The part of a response mirrored into `__dets`.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct ResponseHeader<'a> {
    pub instance_id: u64,
    pub status: AnalysisStatus,
    pub title: &'a str,
    pub references: &'a [String],
}

impl AnalysisResponse {
    pub fn complete(title: impl Into<String>, elements: Vec<ResultElement>) -> Self {
        Self {
            instance_id: 0,
            status: AnalysisStatus::Complete,
            title: title.into(),
            references: Vec::new(),
            group: ResultGroup { elements },
        }
    }

    pub fn is_complete(&self) -> bool {
        self.status == AnalysisStatus::Complete
    }

    pub fn header(&self) -> ResponseHeader<'_> {
        ResponseHeader {
            instance_id: self.instance_id,
            status: self.status,
            title: &self.title,
            references: &self.references,
        }
    }

    pub fn header_bytes(&self) -> Result<Vec<u8>, CanonError> {
        to_canonical_bytes(&self.header())
    }
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct ResultGroup {
    pub elements: Vec<ResultElement>,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ResultElement {
    pub name: String,
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub visible: Visibility,
    pub kind: ElementKind,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ElementKind {
    Table(Table),
    Image(Image),
    Group(ResultGroup),
    Array(ResultGroup),
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct Table {
    pub columns: Vec<Column>,
    #[serde(default)]
    pub notes: Vec<String>,
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct Column {
    pub name: String,
    pub title: String,
    pub cells: Vec<Cell>,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Cell {
    Empty,
    Int(i64),
    Number(f64),
    Text(String),
    NotANumber,
    Infinite { negative: bool },
}

impl Cell {
    /// Map non-finite floats to explicit markers so cells always encode.
    pub fn number(value: f64) -> Cell {
        if value.is_nan() {
            Cell::NotANumber
        } else if value.is_infinite() {
            Cell::Infinite {
                negative: value < 0.0,
            }
        } else {
            Cell::Number(value)
        }
    }
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct Image {
    pub width: u32,
    pub height: u32,
    #[serde(default)]
    pub path: Option<String>,
}

impl ResultElement {
    pub fn table(name: impl Into<String>, table: Table) -> Self {
        Self::new(name, ElementKind::Table(table))
    }

    pub fn image(name: impl Into<String>, image: Image) -> Self {
        Self::new(name, ElementKind::Image(image))
    }

    pub fn group(name: impl Into<String>, elements: Vec<ResultElement>) -> Self {
        Self::new(name, ElementKind::Group(ResultGroup { elements }))
    }

    pub fn array(name: impl Into<String>, elements: Vec<ResultElement>) -> Self {
        Self::new(name, ElementKind::Array(ResultGroup { elements }))
    }

    fn new(name: impl Into<String>, kind: ElementKind) -> Self {
        Self {
            name: name.into(),
            title: String::new(),
            visible: Visibility::Show,
            kind,
        }
    }

    pub fn titled(mut self, title: impl Into<String>) -> Self {
        self.title = title.into();
        self
    }

    pub fn with_visibility(mut self, visible: Visibility) -> Self {
        self.visible = visible;
        self
    }

    /// Children of a group or array, `None` for leaves.
    pub fn children(&self) -> Option<&[ResultElement]> {
        match &self.kind {
            ElementKind::Group(group) | ElementKind::Array(group) => Some(&group.elements),
            ElementKind::Table(_) | ElementKind::Image(_) => None,
        }
    }

    pub fn is_leaf(&self) -> bool {
        self.children().is_none()
    }

    /// Final visibility under an ancestor's effective state.
    ///
    /// Leaves take their cascaded state. Groups and arrays resolve against
    /// their children: shown only if at least one child resolves shown.
    pub fn resolved_visibility(&self, inherited: Visibility) -> Visibility {
        let effective = self.visible.effective(inherited);
        match self.children() {
            None => effective,
            Some(children) => {
                let any_shown = effective.is_shown()
                    && children
                        .iter()
                        .any(|child| child.resolved_visibility(effective).is_shown());
                effective.resolve_group(any_shown)
            }
        }
    }

    /// Serialized payload of a leaf with its effective visibility applied.
    ///
    /// This is what lands in the result node's `__data` attribute and what
    /// change detection compares byte-for-byte.
    pub fn leaf_payload(&self, effective: Visibility) -> Result<Vec<u8>, CanonError> {
        if let ElementKind::Table(table) = &self.kind {
            for column in &table.columns {
                for cell in &column.cells {
                    if let Cell::Number(value) = cell {
                        ensure_finite(&column.name, *value)?;
                    }
                }
            }
        }
        let view = LeafPayload {
            name: &self.name,
            title: &self.title,
            visible: effective,
            kind: &self.kind,
        };
        to_canonical_bytes(&view)
    }
}

#[derive(Serialize)]
struct LeafPayload<'a> {
    name: &'a str,
    title: &'a str,
    visible: Visibility,
    kind: &'a ElementKind,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn descriptives() -> ResultElement {
        ResultElement::table(
            "desc",
            Table {
                columns: vec![Column {
                    name: "mean".into(),
                    title: "Mean".into(),
                    cells: vec![Cell::number(1.5), Cell::number(f64::NAN), Cell::Empty],
                }],
                notes: vec![],
            },
        )
        .titled("Descriptives")
    }

    #[test]
    fn payload_reflects_effective_visibility() {
        let table = descriptives();
        let shown = table.leaf_payload(Visibility::Show).unwrap();
        let hidden = table.leaf_payload(Visibility::Hide).unwrap();
        assert_ne!(shown, hidden);
        assert_eq!(shown, table.clone().leaf_payload(Visibility::Show).unwrap());
    }

    #[test]
    fn non_finite_numbers_are_rejected_unless_mapped() {
        let mut table = descriptives();
        if let ElementKind::Table(t) = &mut table.kind {
            t.columns[0].cells.push(Cell::Number(f64::INFINITY));
        }
        assert!(table.leaf_payload(Visibility::Show).is_err());
        assert_eq!(
            Cell::number(f64::NEG_INFINITY),
            Cell::Infinite { negative: true }
        );
    }

    #[test]
    fn containers_expose_children() {
        let group = ResultElement::group("g", vec![descriptives()]);
        assert_eq!(group.children().map(<[_]>::len), Some(1));
        assert!(!group.is_leaf());
        assert!(descriptives().is_leaf());
    }

    #[test]
    fn conditional_group_resolves_through_nested_groups() {
        let leaf = descriptives();
        let nested = ResultElement::group(
            "a",
            vec![ResultElement::group("b", vec![leaf]).titled("B")],
        )
        .titled("A")
        .with_visibility(Visibility::ShowIfNonEmpty);
        assert_eq!(nested.resolved_visibility(Visibility::Show), Visibility::Show);

        let empty = ResultElement::group("a", vec![ResultElement::group("b", vec![])])
            .with_visibility(Visibility::ShowIfNonEmpty);
        assert_eq!(empty.resolved_visibility(Visibility::Show), Visibility::Hide);

        let hidden_leaf = descriptives().with_visibility(Visibility::Hide);
        let only_hidden = ResultElement::group("g", vec![hidden_leaf]);
        assert_eq!(
            only_hidden.resolved_visibility(Visibility::Show),
            Visibility::Hide
        );
    }

    #[test]
    fn header_bytes_ignore_result_body() {
        let mut a = AnalysisResponse::complete("T-Test", vec![descriptives()]);
        let b = AnalysisResponse::complete("T-Test", vec![]);
        assert_eq!(a.header_bytes().unwrap(), b.header_bytes().unwrap());
        a.references.push("R Core Team".into());
        assert_ne!(a.header_bytes().unwrap(), b.header_bytes().unwrap());
    }
}
