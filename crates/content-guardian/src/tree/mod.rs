//! Tree host abstraction.
//!
//! The engine never talks to a concrete document. It sees a tree through two
//! capabilities on the same [`NodeId`] handle:
//!
//! - [`NodeQuery`]: read-only structure, text and attribute access. Text
//!   extraction, keyword matching and container resolution only need this.
//! - [`NodeMutation`]: class toggling, processed marks and insertion of the
//!   engine's own wrapper/control elements.
//!
//! [`TreeHost`] combines both and adds the change-batch notification stream.
//! [`MemoryTree`] is the in-memory implementation used by the CLI and tests.

mod memory;
mod selector;

use std::fmt;

use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;

use crate::error::Result;

pub use memory::{Element, MemoryTree, SharedTree, PROCESSED_ATTRIBUTE};
pub use selector::Selector;

use selector::SelectorView;

/// Opaque handle to a node of a tree host.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct NodeId(pub usize);

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Rendered size of a node.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Size {
    /// Rendered width.
    pub width: f64,
    /// Rendered height.
    pub height: f64,
}

impl Size {
    /// Create a new size.
    #[must_use]
    pub const fn new(width: f64, height: f64) -> Self {
        Self { width, height }
    }
}

/// One batch of tree changes reported by a host.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct MutationBatch {
    /// Number of nodes structurally added.
    pub added_nodes: usize,
    /// Number of nodes whose text or attributes changed.
    pub changed_nodes: usize,
}

impl MutationBatch {
    /// A batch describing `count` added nodes.
    #[must_use]
    pub const fn additions(count: usize) -> Self {
        Self {
            added_nodes: count,
            changed_nodes: 0,
        }
    }

    /// A batch describing `count` changed nodes and no additions.
    #[must_use]
    pub const fn changes(count: usize) -> Self {
        Self {
            added_nodes: 0,
            changed_nodes: count,
        }
    }

    /// Whether any nodes were structurally added.
    #[must_use]
    pub const fn has_structural_additions(&self) -> bool {
        self.added_nodes > 0
    }
}

/// An element the engine asks the host to create.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewElement {
    /// Tag name.
    pub tag: String,
    /// Single class marking the element as engine-owned.
    pub class: String,
    /// Optional text content.
    pub text: Option<String>,
}

impl NewElement {
    /// Create a new element description.
    #[must_use]
    pub fn new(tag: impl Into<String>, class: impl Into<String>) -> Self {
        Self {
            tag: tag.into(),
            class: class.into(),
            text: None,
        }
    }

    /// Set the text content.
    #[must_use]
    pub fn with_text(mut self, text: impl Into<String>) -> Self {
        self.text = Some(text.into());
        self
    }
}

/// Read-only access to a tree.
///
/// Required methods return owned data so that lock-guarded hosts can implement
/// them. Unknown handles yield empty values rather than errors.
pub trait NodeQuery {
    /// The root node, if the document has one yet.
    fn root(&self) -> Option<NodeId>;

    /// Lower-cased tag name.
    fn tag(&self, node: NodeId) -> Option<String>;

    /// The node's own text, excluding its descendants.
    fn own_text(&self, node: NodeId) -> Option<String>;

    /// Value of an attribute. `id` and `class` are exposed as attributes too.
    fn attribute(&self, node: NodeId, name: &str) -> Option<String>;

    /// Every attribute of the node, `id` and `class` included.
    fn attributes(&self, node: NodeId) -> Vec<(String, String)>;

    /// Whether the node carries a presentation class.
    fn has_class(&self, node: NodeId, class: &str) -> bool;

    /// Parent node.
    fn parent(&self, node: NodeId) -> Option<NodeId>;

    /// Child nodes, in document order.
    fn children(&self, node: NodeId) -> Vec<NodeId>;

    /// Rendered size.
    fn size(&self, node: NodeId) -> Size;

    /// Whether the node carries the processed mark.
    fn is_processed(&self, node: NodeId) -> bool;

    /// Text content of the node and all its descendants, in document order.
    fn text(&self, node: NodeId) -> String {
        std::iter::once(node)
            .chain(self.descendants(node))
            .filter_map(|n| self.own_text(n))
            .collect()
    }

    /// Ancestors from the parent up to the root.
    fn ancestors(&self, node: NodeId) -> Vec<NodeId> {
        let mut ancestors = Vec::new();
        let mut current = self.parent(node);
        while let Some(parent) = current {
            ancestors.push(parent);
            current = self.parent(parent);
        }
        ancestors
    }

    /// Descendants in document (pre-)order, excluding `node` itself.
    fn descendants(&self, node: NodeId) -> Vec<NodeId> {
        let mut out = Vec::new();
        let mut stack: Vec<NodeId> = self.children(node).into_iter().rev().collect();
        while let Some(current) = stack.pop() {
            out.push(current);
            stack.extend(self.children(current).into_iter().rev());
        }
        out
    }

    /// Every node reachable from the root, root first.
    fn all_nodes(&self) -> Vec<NodeId> {
        match self.root() {
            Some(root) => {
                let mut nodes = vec![root];
                nodes.extend(self.descendants(root));
                nodes
            }
            None => Vec::new(),
        }
    }

    /// Nodes matching a selector, in document order.
    fn select(&self, selector: &Selector) -> Vec<NodeId> {
        SelectorView::build(self).select(selector)
    }

    /// Nodes matching each selector in turn.
    ///
    /// Results are concatenated per selector, so a node matched by several
    /// selectors appears several times.
    fn query(&self, selectors: &[Selector]) -> Vec<NodeId> {
        let view = SelectorView::build(self);
        selectors.iter().flat_map(|s| view.select(s)).collect()
    }

    /// The node itself or its nearest ancestor matching any of the selectors.
    fn closest(&self, node: NodeId, selectors: &[Selector]) -> Option<NodeId> {
        let view = SelectorView::build(self);
        std::iter::once(node)
            .chain(self.ancestors(node))
            .find(|&candidate| selectors.iter().any(|s| view.matches(candidate, s)))
    }

    /// First descendant of `scope` carrying `class`.
    fn find_class_within(&self, scope: NodeId, class: &str) -> Option<NodeId> {
        self.descendants(scope)
            .into_iter()
            .find(|&node| self.has_class(node, class))
    }
}

/// Presentation and structure changes the engine is allowed to make.
pub trait NodeMutation {
    /// Add a presentation class (no-op if present).
    ///
    /// # Errors
    ///
    /// Returns an error if the node is unknown.
    fn add_class(&mut self, node: NodeId, class: &str) -> Result<()>;

    /// Remove a presentation class (no-op if absent).
    ///
    /// # Errors
    ///
    /// Returns an error if the node is unknown.
    fn remove_class(&mut self, node: NodeId, class: &str) -> Result<()>;

    /// Set the processed mark.
    ///
    /// # Errors
    ///
    /// Returns an error if the node is unknown.
    fn mark_processed(&mut self, node: NodeId) -> Result<()>;

    /// Clear the processed mark.
    ///
    /// # Errors
    ///
    /// Returns an error if the node is unknown.
    fn clear_processed_mark(&mut self, node: NodeId) -> Result<()>;

    /// Insert a new element between `node` and its parent.
    ///
    /// # Errors
    ///
    /// Returns an error if the node is unknown or has no parent.
    fn insert_wrapper(&mut self, node: NodeId, wrapper: NewElement) -> Result<NodeId>;

    /// Replace `wrapper` by its children.
    ///
    /// # Errors
    ///
    /// Returns an error if the node is unknown or has no parent.
    fn unwrap_node(&mut self, wrapper: NodeId) -> Result<()>;

    /// Insert a new element as the first child of `parent`.
    ///
    /// # Errors
    ///
    /// Returns an error if the parent is unknown.
    fn prepend_child(&mut self, parent: NodeId, child: NewElement) -> Result<NodeId>;

    /// Detach a node and its subtree.
    ///
    /// # Errors
    ///
    /// Returns an error if the node is unknown.
    fn remove_node(&mut self, node: NodeId) -> Result<()>;
}

/// A mutable document the engine can scan and annotate.
pub trait TreeHost: NodeQuery + NodeMutation {
    /// Subscribe to change batches.
    ///
    /// Every call returns an independent receiver.
    fn observe_mutations(&mut self) -> mpsc::UnboundedReceiver<MutationBatch>;
}
