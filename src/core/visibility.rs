//! Layer 2: tri-state visibility and its cascade
//!
//! Effective visibility is evaluated top-down. A hidden ancestor hides
//! everything below it; a still-conditional ancestor downgrades `Show`
//! descendants to conditional. A conditional group resolves only after its
//! children are walked.

use serde::{Deserialize, Serialize};

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Visibility {
    /// Always visible.
    #[default]
    Show,
    /// Always hidden.
    Hide,
    /// Visible only if it ends up with at least one visible descendant.
    ShowIfNonEmpty,
}

impl Visibility {
    /// Cascade a declared state under an ancestor's effective state.
    pub fn effective(self, inherited: Visibility) -> Visibility {
        match (inherited, self) {
            (Visibility::Show, declared) => declared,
            (Visibility::Hide, _) => Visibility::Hide,
            (Visibility::ShowIfNonEmpty, Visibility::Show) => Visibility::ShowIfNonEmpty,
            (Visibility::ShowIfNonEmpty, declared) => declared,
        }
    }

    /// Not hidden outright. Conditional nodes count until proven empty.
    pub fn is_shown(self) -> bool {
        !matches!(self, Visibility::Hide)
    }

    /// Final state of a group once its children have been walked.
    pub fn resolve_group(self, has_visible_child: bool) -> Visibility {
        if self.is_shown() && has_visible_child {
            Visibility::Show
        } else {
            Visibility::Hide
        }
    }

    pub fn from_flag(visible: bool) -> Visibility {
        if visible {
            Visibility::Show
        } else {
            Visibility::Hide
        }
    }
}

#[cfg(test)]
mod tests {
    use super::Visibility::{Hide, Show, ShowIfNonEmpty};

    #[test]
    fn show_ancestor_passes_declared_state_through() {
        assert_eq!(Show.effective(Show), Show);
        assert_eq!(Hide.effective(Show), Hide);
        assert_eq!(ShowIfNonEmpty.effective(Show), ShowIfNonEmpty);
    }

    #[test]
    fn hidden_ancestor_never_exposes_descendants() {
        for declared in [Show, Hide, ShowIfNonEmpty] {
            assert_eq!(declared.effective(Hide), Hide);
        }
    }

    #[test]
    fn conditional_ancestor_downgrades_show() {
        assert_eq!(Show.effective(ShowIfNonEmpty), ShowIfNonEmpty);
        assert_eq!(Hide.effective(ShowIfNonEmpty), Hide);
        assert_eq!(ShowIfNonEmpty.effective(ShowIfNonEmpty), ShowIfNonEmpty);
    }

    #[test]
    fn groups_resolve_after_children() {
        assert_eq!(ShowIfNonEmpty.resolve_group(true), Show);
        assert_eq!(ShowIfNonEmpty.resolve_group(false), Hide);
        assert_eq!(Show.resolve_group(false), Hide);
        assert_eq!(Hide.resolve_group(true), Hide);
    }
}
