use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uiscript_core_types::{Bounds, SnapshotId};

/// Position of an element inside a snapshot arena.
///
/// Arena order is pre-order traversal order, so comparing indexes compares
/// document order.
pub type NodeIndex = usize;

/// Roles that accept text input when the device does not report focusability.
const EDITABLE_ROLES: &[&str] = &[
    "textbox",
    "textfield",
    "edittext",
    "searchbox",
    "combobox",
    "input",
    "securetextfield",
];

/// Wire form of one element, as returned by a screen source and by the
/// `full` screen representation.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct ElementDescriptor {
    #[serde(default)]
    pub id: String,
    #[serde(default)]
    pub role: String,
    #[serde(default)]
    pub text: Option<String>,
    #[serde(default)]
    pub bounds: Bounds,
    #[serde(default = "default_true")]
    pub enabled: bool,
    #[serde(default = "default_true")]
    pub visible: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub focusable: Option<bool>,
    #[serde(default)]
    pub children: Vec<ElementDescriptor>,
}

fn default_true() -> bool {
    true
}

impl ElementDescriptor {
    pub fn new(id: impl Into<String>, role: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            role: role.into(),
            text: None,
            bounds: Bounds::default(),
            enabled: true,
            visible: true,
            focusable: None,
            children: Vec::new(),
        }
    }

    pub fn with_text(mut self, text: impl Into<String>) -> Self {
        self.text = Some(text.into());
        self
    }

    pub fn with_bounds(mut self, x: i32, y: i32, w: i32, h: i32) -> Self {
        self.bounds = Bounds::new(x, y, w, h);
        self
    }

    pub fn with_enabled(mut self, enabled: bool) -> Self {
        self.enabled = enabled;
        self
    }

    pub fn with_visible(mut self, visible: bool) -> Self {
        self.visible = visible;
        self
    }

    pub fn with_focusable(mut self, focusable: bool) -> Self {
        self.focusable = Some(focusable);
        self
    }

    pub fn with_child(mut self, child: ElementDescriptor) -> Self {
        self.children.push(child);
        self
    }

    pub fn with_children(mut self, children: impl IntoIterator<Item = ElementDescriptor>) -> Self {
        self.children.extend(children);
        self
    }
}

/// Arena record for one element of a snapshot.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct UiElement {
    pub id: String,
    pub role: String,
    pub text: Option<String>,
    pub bounds: Bounds,
    pub enabled: bool,
    pub visible: bool,
    pub focusable: bool,
    pub parent: Option<NodeIndex>,
    pub children: Vec<NodeIndex>,
    pub depth: u32,
    /// Exclusive end of this element's subtree in the arena.
    pub subtree_end: NodeIndex,
}

impl UiElement {
    /// Trimmed visible text, `None` when absent or blank.
    pub fn visible_text(&self) -> Option<&str> {
        self.text
            .as_deref()
            .map(str::trim)
            .filter(|text| !text.is_empty())
    }
}

/// Lightweight handle to an element of a specific snapshot.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ElementRef {
    pub snapshot: SnapshotId,
    pub index: NodeIndex,
    pub element_id: String,
}

/// Immutable, timestamped capture of the UI tree.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ScreenSnapshot {
    pub id: SnapshotId,
    pub captured_at: DateTime<Utc>,
    nodes: Vec<UiElement>,
    roots: Vec<NodeIndex>,
    /// True when two consecutive captures were structurally equal.
    pub stable: bool,
    /// Number of captures taken to produce this snapshot.
    pub attempts: u32,
}

impl ScreenSnapshot {
    /// Flatten a descriptor forest into a pre-order arena.
    pub fn from_descriptors(forest: &[ElementDescriptor]) -> Self {
        let mut nodes = Vec::new();
        let mut roots = Vec::with_capacity(forest.len());
        for root in forest {
            roots.push(push_subtree(&mut nodes, root, None, 0));
        }
        Self {
            id: SnapshotId::new(),
            captured_at: Utc::now(),
            nodes,
            roots,
            stable: false,
            attempts: 1,
        }
    }

    pub fn with_stability(mut self, stable: bool, attempts: u32) -> Self {
        self.stable = stable;
        self.attempts = attempts;
        self
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    pub fn roots(&self) -> &[NodeIndex] {
        &self.roots
    }

    pub fn get(&self, index: NodeIndex) -> Option<&UiElement> {
        self.nodes.get(index)
    }

    /// Elements in document order.
    pub fn iter(&self) -> impl Iterator<Item = (NodeIndex, &UiElement)> {
        self.nodes.iter().enumerate()
    }

    pub fn element(&self, element: &ElementRef) -> Option<&UiElement> {
        if element.snapshot != self.id {
            return None;
        }
        self.nodes.get(element.index)
    }

    pub fn element_ref(&self, index: NodeIndex) -> Option<ElementRef> {
        self.nodes.get(index).map(|node| ElementRef {
            snapshot: self.id.clone(),
            index,
            element_id: node.id.clone(),
        })
    }

    /// True when `node` lies strictly inside the subtree of `ancestor`.
    pub fn is_descendant(&self, node: NodeIndex, ancestor: NodeIndex) -> bool {
        match self.nodes.get(ancestor) {
            Some(anc) => node > ancestor && node < anc.subtree_end,
            None => false,
        }
    }

    /// Indexes strictly inside the subtree of `index`, in document order.
    pub fn descendants(&self, index: NodeIndex) -> std::ops::Range<NodeIndex> {
        match self.nodes.get(index) {
            Some(node) => index + 1..node.subtree_end,
            None => 0..0,
        }
    }

    pub fn ancestors(&self, index: NodeIndex) -> Ancestors<'_> {
        Ancestors {
            snapshot: self,
            next: self.nodes.get(index).and_then(|node| node.parent),
        }
    }

    /// Equality of element content and shape, ignoring id and timestamp.
    pub fn structurally_eq(&self, other: &ScreenSnapshot) -> bool {
        self.roots == other.roots && self.nodes == other.nodes
    }

    /// Rebuild the nested descriptor for the subtree rooted at `index`.
    pub fn descriptor(&self, index: NodeIndex) -> Option<ElementDescriptor> {
        let node = self.nodes.get(index)?;
        let children = node
            .children
            .iter()
            .filter_map(|child| self.descriptor(*child))
            .collect();
        Some(ElementDescriptor {
            id: node.id.clone(),
            role: node.role.clone(),
            text: node.text.clone(),
            bounds: node.bounds,
            enabled: node.enabled,
            visible: node.visible,
            focusable: Some(node.focusable),
            children,
        })
    }
}

pub struct Ancestors<'a> {
    snapshot: &'a ScreenSnapshot,
    next: Option<NodeIndex>,
}

impl<'a> Iterator for Ancestors<'a> {
    type Item = (NodeIndex, &'a UiElement);

    fn next(&mut self) -> Option<Self::Item> {
        let index = self.next?;
        let node = self.snapshot.nodes.get(index)?;
        self.next = node.parent;
        Some((index, node))
    }
}

fn push_subtree(
    nodes: &mut Vec<UiElement>,
    descriptor: &ElementDescriptor,
    parent: Option<NodeIndex>,
    depth: u32,
) -> NodeIndex {
    let index = nodes.len();
    let focusable = descriptor.focusable.unwrap_or_else(|| {
        EDITABLE_ROLES
            .iter()
            .any(|role| descriptor.role.eq_ignore_ascii_case(role))
    });
    nodes.push(UiElement {
        id: descriptor.id.clone(),
        role: descriptor.role.clone(),
        text: descriptor.text.clone(),
        bounds: descriptor.bounds,
        enabled: descriptor.enabled,
        visible: descriptor.visible,
        focusable,
        parent,
        children: Vec::with_capacity(descriptor.children.len()),
        depth,
        subtree_end: index + 1,
    });

    for child in &descriptor.children {
        let child_index = push_subtree(nodes, child, Some(index), depth + 1);
        nodes[index].children.push(child_index);
    }
    nodes[index].subtree_end = nodes.len();
    index
}
