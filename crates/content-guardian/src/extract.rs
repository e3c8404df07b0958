//! Text signature extraction.

use crate::applier::is_control_node;
use crate::tree::{NodeId, NodeQuery};

/// Label-like attributes read after the text content, in order.
pub const LABEL_ATTRIBUTES: &[&str] = &["title", "alt", "aria-label"];

/// Build the normalized text signature of a node: text content, then the
/// title, alt and aria-label attributes, skipping empty sources, joined by a
/// single space and lower-cased.
///
/// Reads the node's current state on every call. Controls the engine
/// inserted contribute nothing.
pub fn extract_text<Q: NodeQuery + ?Sized>(tree: &Q, node: NodeId) -> String {
    std::iter::once(Some(content_text(tree, node)))
        .chain(LABEL_ATTRIBUTES.iter().map(|name| tree.attribute(node, name)))
        .flatten()
        .filter(|source| !source.is_empty())
        .collect::<Vec<_>>()
        .join(" ")
        .to_lowercase()
}

/// Text content in document order, leaving out engine controls.
fn content_text<Q: NodeQuery + ?Sized>(tree: &Q, node: NodeId) -> String {
    let mut text = String::new();
    let mut stack = vec![node];
    while let Some(current) = stack.pop() {
        if is_control_node(tree, current) {
            continue;
        }
        if let Some(own) = tree.own_text(current) {
            text.push_str(&own);
        }
        stack.extend(tree.children(current).into_iter().rev());
    }
    text
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::applier::{UNBLUR_CLASS, WRAPPER_CLASS};
    use crate::tree::{Element, MemoryTree, NewElement, NodeMutation};

    fn single(element: Element) -> (MemoryTree, NodeId) {
        let tree = MemoryTree::from_document(Element::new("body").with_child(element));
        let node = tree.children(tree.root().unwrap())[0];
        (tree, node)
    }

    #[test]
    fn test_text_only() {
        let (tree, node) = single(Element::new("p").with_text("Local Politics Update"));
        assert_eq!(extract_text(&tree, node), "local politics update");
    }

    #[test]
    fn test_sources_in_order() {
        let (tree, node) = single(
            Element::new("img")
                .with_attr("aria-label", "Label")
                .with_attr("alt", "Alt")
                .with_attr("title", "Title")
                .with_text("Text"),
        );
        assert_eq!(extract_text(&tree, node), "text title alt label");
    }

    #[test]
    fn test_skips_empty_sources() {
        let (tree, node) = single(Element::new("img").with_attr("title", "").with_attr("alt", "A Cat"));
        assert_eq!(extract_text(&tree, node), "a cat");
    }

    #[test]
    fn test_empty_node() {
        let (tree, node) = single(Element::new("span"));
        assert_eq!(extract_text(&tree, node), "");
    }

    #[test]
    fn test_includes_descendant_text() {
        let (tree, node) = single(
            Element::new("article")
                .with_child(Element::new("h2").with_text("Breaking "))
                .with_child(Element::new("p").with_text("NEWSflash")),
        );
        assert_eq!(extract_text(&tree, node), "breaking newsflash");
    }

    #[test]
    fn test_reflects_current_state() {
        let (mut tree, node) = single(Element::new("p").with_text("before"));
        assert_eq!(extract_text(&tree, node), "before");
        tree.set_text(node, "After").unwrap();
        assert_eq!(extract_text(&tree, node), "after");
    }

    #[test]
    fn test_skips_engine_controls() {
        let (mut tree, post) = single(
            Element::new("div")
                .with_attr("role", "article")
                .with_child(Element::new("p").with_text("Local politics update")),
        );
        let paragraph = tree.children(post)[0];
        let wrapper = tree
            .insert_wrapper(paragraph, NewElement::new("div", WRAPPER_CLASS))
            .unwrap();
        tree.prepend_child(
            wrapper,
            NewElement::new("button", UNBLUR_CLASS).with_text("Show content (filtered: politics)"),
        )
        .unwrap();

        assert_eq!(extract_text(&tree, post), "local politics update");
        assert_eq!(extract_text(&tree, wrapper), "local politics update");
    }
}
