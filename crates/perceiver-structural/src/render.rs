//! Machine-consumable screen representations.
//!
//! These are the payloads handed to script variables (via `read_screen`) and
//! embedded in recovery requests.

use serde::{Deserialize, Serialize};
use uiscript_core_types::Bounds;

use crate::model::{ElementDescriptor, NodeIndex, ScreenSnapshot, UiElement};

/// Roles that a user can act on directly.
const INTERACTIVE_ROLES: &[&str] = &[
    "button",
    "imagebutton",
    "link",
    "checkbox",
    "radio",
    "switch",
    "toggle",
    "textbox",
    "textfield",
    "edittext",
    "searchbox",
    "combobox",
    "listbox",
    "option",
    "menuitem",
    "tab",
    "slider",
    "spinbutton",
];

/// One row of the `summary` representation: no children, no pass-through
/// containers.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct SummaryEntry {
    pub id: String,
    pub role: String,
    pub text: Option<String>,
    pub bounds: Bounds,
    pub enabled: bool,
    pub visible: bool,
}

impl From<&UiElement> for SummaryEntry {
    fn from(element: &UiElement) -> Self {
        Self {
            id: element.id.clone(),
            role: element.role.clone(),
            text: element.text.clone(),
            bounds: element.bounds,
            enabled: element.enabled,
            visible: element.visible,
        }
    }
}

pub fn is_interactive(element: &UiElement) -> bool {
    element.focusable
        || INTERACTIVE_ROLES
            .iter()
            .any(|role| element.role.eq_ignore_ascii_case(role))
}

pub fn is_text_bearing(element: &UiElement) -> bool {
    element.visible_text().is_some()
}

/// Entire element tree, nested.
pub fn render_full(snapshot: &ScreenSnapshot) -> Vec<ElementDescriptor> {
    render_subtrees(snapshot, snapshot.roots())
}

/// Interactive or text-bearing elements as a flat list in document order.
pub fn render_summary(snapshot: &ScreenSnapshot) -> Vec<SummaryEntry> {
    snapshot
        .iter()
        .filter(|(_, element)| is_interactive(element) || is_text_bearing(element))
        .map(|(_, element)| SummaryEntry::from(element))
        .collect()
}

/// Nested subtrees rooted at each of `roots`, in the given order.
pub fn render_subtrees(snapshot: &ScreenSnapshot, roots: &[NodeIndex]) -> Vec<ElementDescriptor> {
    roots
        .iter()
        .filter_map(|index| snapshot.descriptor(*index))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn screen_with(interactive: usize, filler: usize) -> ScreenSnapshot {
        let mut root = ElementDescriptor::new("root", "window");
        for i in 0..filler {
            root = root.with_child(ElementDescriptor::new(format!("frame-{i}"), "group"));
        }
        for i in 0..interactive {
            root = root.with_child(
                ElementDescriptor::new(format!("btn-{i}"), "button").with_bounds(0, i as i32 * 10, 50, 10),
            );
        }
        ScreenSnapshot::from_descriptors(&[root])
    }

    #[test]
    fn summary_keeps_only_interactive_and_text_nodes() {
        let snapshot = screen_with(10, 39);
        assert_eq!(snapshot.len(), 50);
        let summary = render_summary(&snapshot);
        assert_eq!(summary.len(), 10);
        let ids: Vec<String> = summary.iter().map(|e| e.id.clone()).collect();
        let expected: Vec<String> = (0..10).map(|i| format!("btn-{i}")).collect();
        assert_eq!(ids, expected);
    }

    #[test]
    fn summary_includes_plain_text_labels() {
        let snapshot = ScreenSnapshot::from_descriptors(&[ElementDescriptor::new("root", "window")
            .with_child(ElementDescriptor::new("title", "text").with_text("Inbox"))
            .with_child(ElementDescriptor::new("blank", "text").with_text("   "))]);
        let summary = render_summary(&snapshot);
        assert_eq!(summary.len(), 1);
        assert_eq!(summary[0].id, "title");
    }

    #[test]
    fn full_render_round_trips_shape() {
        let snapshot = screen_with(2, 1);
        let full = render_full(&snapshot);
        assert_eq!(full.len(), 1);
        assert_eq!(full[0].children.len(), 3);
        let again = ScreenSnapshot::from_descriptors(&full);
        assert!(again.structurally_eq(&snapshot));
    }
}
