//! In-memory tree host.
//!
//! An arena of elements with DOM-like text content and mutation notification.
//! Documents are loaded from and saved to a JSON [`Element`] tree.

use std::collections::BTreeMap;
use std::path::Path;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;
use tracing::trace;

use super::{
    MutationBatch, NewElement, NodeId, NodeMutation, NodeQuery, Selector, Size, TreeHost,
};
use crate::error::{Error, Result};

/// Attribute used to carry the processed mark in serialized documents.
pub const PROCESSED_ATTRIBUTE: &str = "data-content-guardian-processed";

/// Serialized form of an element and its subtree.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Element {
    /// Tag name.
    pub tag: String,

    /// Element id.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,

    /// Presentation classes.
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub classes: Vec<String>,

    /// Other attributes.
    #[serde(skip_serializing_if = "BTreeMap::is_empty")]
    pub attributes: BTreeMap<String, String>,

    /// Own text, placed before the children's text.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub text: Option<String>,

    /// Rendered size.
    pub size: Size,

    /// Child elements.
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub children: Vec<Element>,
}

impl Element {
    /// Create an empty element.
    #[must_use]
    pub fn new(tag: impl Into<String>) -> Self {
        Self {
            tag: tag.into(),
            ..Self::default()
        }
    }

    /// Set the id.
    #[must_use]
    pub fn with_id(mut self, id: impl Into<String>) -> Self {
        self.id = Some(id.into());
        self
    }

    /// Add a class.
    #[must_use]
    pub fn with_class(mut self, class: impl Into<String>) -> Self {
        self.classes.push(class.into());
        self
    }

    /// Set an attribute.
    #[must_use]
    pub fn with_attr(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.attributes.insert(name.into(), value.into());
        self
    }

    /// Set the own text.
    #[must_use]
    pub fn with_text(mut self, text: impl Into<String>) -> Self {
        self.text = Some(text.into());
        self
    }

    /// Set the rendered size.
    #[must_use]
    pub fn with_size(mut self, width: f64, height: f64) -> Self {
        self.size = Size::new(width, height);
        self
    }

    /// Append a child.
    #[must_use]
    pub fn with_child(mut self, child: Element) -> Self {
        self.children.push(child);
        self
    }
}

#[derive(Debug, Clone)]
struct NodeData {
    tag: String,
    id: Option<String>,
    classes: Vec<String>,
    attributes: BTreeMap<String, String>,
    text: Option<String>,
    size: Size,
    parent: Option<NodeId>,
    children: Vec<NodeId>,
    processed: bool,
}

/// Arena-backed document tree.
#[derive(Debug, Default)]
pub struct MemoryTree {
    nodes: Vec<NodeData>,
    root: Option<NodeId>,
    observers: Vec<mpsc::UnboundedSender<MutationBatch>>,
}

impl MemoryTree {
    /// Create a tree without a root. Hosts start like this until the document
    /// body exists.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a tree from a document.
    #[must_use]
    pub fn from_document(root: Element) -> Self {
        let mut tree = Self::new();
        let (id, _) = tree.build(root, None);
        tree.root = Some(id);
        tree
    }

    /// Load a JSON document from disk.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read or is not a valid document.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let contents = std::fs::read_to_string(path)?;
        let root: Element = serde_json::from_str(&contents)?;
        Ok(Self::from_document(root))
    }

    /// Install the root element, replacing any existing document.
    pub fn set_root(&mut self, root: Element) -> NodeId {
        let (id, count) = self.build(root, None);
        self.root = Some(id);
        self.notify(MutationBatch::additions(count));
        id
    }

    /// Append a subtree under `parent`.
    ///
    /// # Errors
    ///
    /// Returns an error if the parent is unknown.
    pub fn append(&mut self, parent: NodeId, element: Element) -> Result<NodeId> {
        self.node(parent)?;
        let (id, count) = self.build(element, Some(parent));
        self.node_mut(parent)?.children.push(id);
        self.notify(MutationBatch::additions(count));
        Ok(id)
    }

    /// Replace the own text of a node.
    ///
    /// # Errors
    ///
    /// Returns an error if the node is unknown.
    pub fn set_text(&mut self, node: NodeId, text: impl Into<String>) -> Result<()> {
        self.node_mut(node)?.text = Some(text.into());
        self.notify(MutationBatch::changes(1));
        Ok(())
    }

    /// Serialize the current document.
    #[must_use]
    pub fn to_document(&self) -> Option<Element> {
        self.root.map(|root| self.export(root))
    }

    /// Classes of a node, in insertion order.
    #[must_use]
    pub fn classes(&self, node: NodeId) -> Vec<String> {
        self.nodes
            .get(node.0)
            .map(|n| n.classes.clone())
            .unwrap_or_default()
    }

    fn node(&self, node: NodeId) -> Result<&NodeData> {
        self.nodes.get(node.0).ok_or(Error::UnknownNode { node })
    }

    fn node_mut(&mut self, node: NodeId) -> Result<&mut NodeData> {
        self.nodes.get_mut(node.0).ok_or(Error::UnknownNode { node })
    }

    fn alloc(&mut self, data: NodeData) -> NodeId {
        let id = NodeId(self.nodes.len());
        self.nodes.push(data);
        id
    }

    /// Build a subtree, returning its root and the number of nodes created.
    fn build(&mut self, element: Element, parent: Option<NodeId>) -> (NodeId, usize) {
        let mut attributes = element.attributes;
        let processed = attributes.remove(PROCESSED_ATTRIBUTE).is_some();
        let id = self.alloc(NodeData {
            tag: element.tag.to_ascii_lowercase(),
            id: element.id,
            classes: element.classes,
            attributes,
            text: element.text,
            size: element.size,
            parent,
            children: Vec::new(),
            processed,
        });

        let mut count = 1;
        for child in element.children {
            let (child_id, child_count) = self.build(child, Some(id));
            self.nodes[id.0].children.push(child_id);
            count += child_count;
        }
        (id, count)
    }

    fn export(&self, node: NodeId) -> Element {
        let data = &self.nodes[node.0];
        let mut attributes = data.attributes.clone();
        if data.processed {
            attributes.insert(PROCESSED_ATTRIBUTE.to_string(), "true".to_string());
        }
        Element {
            tag: data.tag.clone(),
            id: data.id.clone(),
            classes: data.classes.clone(),
            attributes,
            text: data.text.clone(),
            size: data.size,
            children: data.children.iter().map(|&c| self.export(c)).collect(),
        }
    }

    fn position_in_parent(&self, node: NodeId) -> Result<(NodeId, usize)> {
        let parent = self.node(node)?.parent.ok_or(Error::DetachedNode { node })?;
        let index = self
            .node(parent)?
            .children
            .iter()
            .position(|&c| c == node)
            .ok_or_else(|| Error::internal(format!("{node} missing from its parent")))?;
        Ok((parent, index))
    }

    fn create(&mut self, element: NewElement, parent: NodeId, size: Size) -> NodeId {
        self.alloc(NodeData {
            tag: element.tag,
            id: None,
            classes: vec![element.class],
            attributes: BTreeMap::new(),
            text: element.text,
            size,
            parent: Some(parent),
            children: Vec::new(),
            processed: false,
        })
    }

    fn notify(&mut self, batch: MutationBatch) {
        trace!(?batch, observers = self.observers.len(), "Mutation batch");
        self.observers.retain(|tx| tx.send(batch).is_ok());
    }
}

impl NodeQuery for MemoryTree {
    fn root(&self) -> Option<NodeId> {
        self.root
    }

    fn tag(&self, node: NodeId) -> Option<String> {
        self.nodes.get(node.0).map(|n| n.tag.clone())
    }

    fn own_text(&self, node: NodeId) -> Option<String> {
        self.nodes.get(node.0).and_then(|n| n.text.clone())
    }

    fn attribute(&self, node: NodeId, name: &str) -> Option<String> {
        let data = self.nodes.get(node.0)?;
        match name {
            "id" => data.id.clone(),
            "class" if data.classes.is_empty() => None,
            "class" => Some(data.classes.join(" ")),
            _ => data.attributes.get(name).cloned(),
        }
    }

    fn attributes(&self, node: NodeId) -> Vec<(String, String)> {
        let Some(data) = self.nodes.get(node.0) else {
            return Vec::new();
        };
        let id = data.id.clone().map(|id| ("id".to_string(), id));
        let class = (!data.classes.is_empty())
            .then(|| ("class".to_string(), data.classes.join(" ")));
        id.into_iter()
            .chain(class)
            .chain(data.attributes.iter().map(|(k, v)| (k.clone(), v.clone())))
            .collect()
    }

    fn has_class(&self, node: NodeId, class: &str) -> bool {
        self.nodes
            .get(node.0)
            .is_some_and(|n| n.classes.iter().any(|c| c == class))
    }

    fn parent(&self, node: NodeId) -> Option<NodeId> {
        self.nodes.get(node.0).and_then(|n| n.parent)
    }

    fn children(&self, node: NodeId) -> Vec<NodeId> {
        self.nodes
            .get(node.0)
            .map(|n| n.children.clone())
            .unwrap_or_default()
    }

    fn size(&self, node: NodeId) -> Size {
        self.nodes.get(node.0).map(|n| n.size).unwrap_or_default()
    }

    fn is_processed(&self, node: NodeId) -> bool {
        self.nodes.get(node.0).is_some_and(|n| n.processed)
    }
}

impl NodeMutation for MemoryTree {
    fn add_class(&mut self, node: NodeId, class: &str) -> Result<()> {
        let data = self.node_mut(node)?;
        if !data.classes.iter().any(|c| c == class) {
            data.classes.push(class.to_string());
        }
        Ok(())
    }

    fn remove_class(&mut self, node: NodeId, class: &str) -> Result<()> {
        self.node_mut(node)?.classes.retain(|c| c != class);
        Ok(())
    }

    fn mark_processed(&mut self, node: NodeId) -> Result<()> {
        self.node_mut(node)?.processed = true;
        Ok(())
    }

    fn clear_processed_mark(&mut self, node: NodeId) -> Result<()> {
        self.node_mut(node)?.processed = false;
        Ok(())
    }

    fn insert_wrapper(&mut self, node: NodeId, wrapper: NewElement) -> Result<NodeId> {
        let (parent, index) = self.position_in_parent(node)?;
        let size = self.node(node)?.size;
        let wrapper_id = self.create(wrapper, parent, size);
        self.nodes[wrapper_id.0].children.push(node);
        self.nodes[parent.0].children[index] = wrapper_id;
        self.nodes[node.0].parent = Some(wrapper_id);
        Ok(wrapper_id)
    }

    fn unwrap_node(&mut self, wrapper: NodeId) -> Result<()> {
        let (parent, index) = self.position_in_parent(wrapper)?;
        let children = std::mem::take(&mut self.nodes[wrapper.0].children);
        for &child in &children {
            self.nodes[child.0].parent = Some(parent);
        }
        let siblings = &mut self.nodes[parent.0].children;
        siblings.remove(index);
        for (offset, child) in children.into_iter().enumerate() {
            siblings.insert(index + offset, child);
        }
        self.nodes[wrapper.0].parent = None;
        Ok(())
    }

    fn prepend_child(&mut self, parent: NodeId, child: NewElement) -> Result<NodeId> {
        self.node(parent)?;
        let id = self.create(child, parent, Size::default());
        self.nodes[parent.0].children.insert(0, id);
        Ok(id)
    }

    fn remove_node(&mut self, node: NodeId) -> Result<()> {
        if self.root == Some(node) {
            self.root = None;
            return Ok(());
        }
        let (parent, index) = self.position_in_parent(node)?;
        self.nodes[parent.0].children.remove(index);
        self.nodes[node.0].parent = None;
        Ok(())
    }
}

impl TreeHost for MemoryTree {
    fn observe_mutations(&mut self) -> mpsc::UnboundedReceiver<MutationBatch> {
        let (tx, rx) = mpsc::unbounded_channel();
        self.observers.push(tx);
        rx
    }
}

/// A cloneable, lock-guarded handle to a [`MemoryTree`].
///
/// Lets a content producer keep appending to the document while the engine
/// owns another handle to it.
#[derive(Debug, Clone, Default)]
pub struct SharedTree {
    inner: Arc<Mutex<MemoryTree>>,
}

impl SharedTree {
    /// Wrap a tree.
    #[must_use]
    pub fn new(tree: MemoryTree) -> Self {
        Self {
            inner: Arc::new(Mutex::new(tree)),
        }
    }

    fn lock(&self) -> MutexGuard<'_, MemoryTree> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Run a closure with shared access to the tree.
    pub fn with<R>(&self, f: impl FnOnce(&MemoryTree) -> R) -> R {
        f(&self.lock())
    }

    /// Run a closure with exclusive access to the tree.
    pub fn with_mut<R>(&self, f: impl FnOnce(&mut MemoryTree) -> R) -> R {
        f(&mut self.lock())
    }
}

impl NodeQuery for SharedTree {
    fn root(&self) -> Option<NodeId> {
        self.lock().root()
    }

    fn tag(&self, node: NodeId) -> Option<String> {
        self.lock().tag(node)
    }

    fn own_text(&self, node: NodeId) -> Option<String> {
        self.lock().own_text(node)
    }

    fn text(&self, node: NodeId) -> String {
        self.lock().text(node)
    }

    fn attribute(&self, node: NodeId, name: &str) -> Option<String> {
        self.lock().attribute(node, name)
    }

    fn attributes(&self, node: NodeId) -> Vec<(String, String)> {
        self.lock().attributes(node)
    }

    fn has_class(&self, node: NodeId, class: &str) -> bool {
        self.lock().has_class(node, class)
    }

    fn parent(&self, node: NodeId) -> Option<NodeId> {
        self.lock().parent(node)
    }

    fn children(&self, node: NodeId) -> Vec<NodeId> {
        self.lock().children(node)
    }

    fn size(&self, node: NodeId) -> Size {
        self.lock().size(node)
    }

    fn is_processed(&self, node: NodeId) -> bool {
        self.lock().is_processed(node)
    }

    fn all_nodes(&self) -> Vec<NodeId> {
        self.lock().all_nodes()
    }

    fn select(&self, selector: &Selector) -> Vec<NodeId> {
        self.lock().select(selector)
    }

    fn query(&self, selectors: &[Selector]) -> Vec<NodeId> {
        self.lock().query(selectors)
    }

    fn closest(&self, node: NodeId, selectors: &[Selector]) -> Option<NodeId> {
        self.lock().closest(node, selectors)
    }
}

impl NodeMutation for SharedTree {
    fn add_class(&mut self, node: NodeId, class: &str) -> Result<()> {
        self.lock().add_class(node, class)
    }

    fn remove_class(&mut self, node: NodeId, class: &str) -> Result<()> {
        self.lock().remove_class(node, class)
    }

    fn mark_processed(&mut self, node: NodeId) -> Result<()> {
        self.lock().mark_processed(node)
    }

    fn clear_processed_mark(&mut self, node: NodeId) -> Result<()> {
        self.lock().clear_processed_mark(node)
    }

    fn insert_wrapper(&mut self, node: NodeId, wrapper: NewElement) -> Result<NodeId> {
        self.lock().insert_wrapper(node, wrapper)
    }

    fn unwrap_node(&mut self, wrapper: NodeId) -> Result<()> {
        self.lock().unwrap_node(wrapper)
    }

    fn prepend_child(&mut self, parent: NodeId, child: NewElement) -> Result<NodeId> {
        self.lock().prepend_child(parent, child)
    }

    fn remove_node(&mut self, node: NodeId) -> Result<()> {
        self.lock().remove_node(node)
    }
}

impl TreeHost for SharedTree {
    fn observe_mutations(&mut self) -> mpsc::UnboundedReceiver<MutationBatch> {
        self.lock().observe_mutations()
    }
}
