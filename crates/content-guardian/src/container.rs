//! Container resolution.
//!
//! Climbs from a matched node to the unit that should be filtered as a whole:
//! the nearest semantic unit (post, card, tweet), else the first ancestor big
//! enough to be a content block, else the node itself.

use tracing::trace;

use crate::config::ContainerConfig;
use crate::error::Result;
use crate::profile::ProfileResolver;
use crate::tree::{NodeId, NodeQuery, Selector};

/// How a container was chosen.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ContainerKind {
    /// Nearest node matching a semantic-unit selector.
    SemanticUnit,
    /// First ancestor passing the size heuristic.
    SizedAncestor,
    /// Nothing better found; the matched node itself.
    MatchedNode,
}

/// Resolves the container for a matched node.
#[derive(Debug, Clone)]
pub struct ContainerResolver {
    semantic_units: Vec<Selector>,
    max_depth: usize,
    min_height: f64,
    min_width: f64,
}

impl ContainerResolver {
    /// Create a resolver with the built-in semantic-unit selectors.
    ///
    /// # Errors
    ///
    /// Returns an error if a built-in selector fails to parse.
    pub fn new(config: &ContainerConfig) -> Result<Self> {
        Ok(Self::with_selectors(ProfileResolver::semantic_units()?, config))
    }

    /// Create a resolver with explicit semantic-unit selectors.
    #[must_use]
    pub fn with_selectors(semantic_units: Vec<Selector>, config: &ContainerConfig) -> Self {
        Self {
            semantic_units,
            max_depth: config.max_depth,
            min_height: config.min_height,
            min_width: config.min_width,
        }
    }

    /// Resolve the container for `node`. Always yields a node.
    pub fn resolve<Q: NodeQuery + ?Sized>(&self, tree: &Q, node: NodeId) -> NodeId {
        self.resolve_with_kind(tree, node).0
    }

    /// Resolve the container and report which rule chose it.
    pub fn resolve_with_kind<Q: NodeQuery + ?Sized>(
        &self,
        tree: &Q,
        node: NodeId,
    ) -> (NodeId, ContainerKind) {
        if let Some(container) = tree.closest(node, &self.semantic_units) {
            trace!(%node, %container, "Container is semantic unit");
            return (container, ContainerKind::SemanticUnit);
        }

        let sized = tree
            .ancestors(node)
            .into_iter()
            .take(self.max_depth)
            .find(|&ancestor| {
                let size = tree.size(ancestor);
                size.height > self.min_height || size.width > self.min_width
            });
        if let Some(container) = sized {
            trace!(%node, %container, "Container is sized ancestor");
            return (container, ContainerKind::SizedAncestor);
        }

        trace!(%node, "Container is matched node");
        (node, ContainerKind::MatchedNode)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tree::{Element, MemoryTree};

    fn resolver() -> ContainerResolver {
        ContainerResolver::new(&ContainerConfig::default()).unwrap()
    }

    fn find(tree: &MemoryTree, id: &str) -> NodeId {
        tree.all_nodes()
            .into_iter()
            .find(|&n| tree.attribute(n, "id").as_deref() == Some(id))
            .unwrap()
    }

    /// `depth` nested small divs around a paragraph.
    fn nested(depth: usize, outer: Element) -> MemoryTree {
        let mut element = Element::new("p").with_id("match").with_text("x");
        for _ in 0..depth {
            element = Element::new("div").with_size(10.0, 10.0).with_child(element);
        }
        MemoryTree::from_document(Element::new("body").with_child(outer.with_child(element)))
    }

    #[test]
    fn test_semantic_unit_ancestor() {
        let tree = nested(2, Element::new("article").with_id("post"));
        let node = find(&tree, "match");
        assert_eq!(
            resolver().resolve_with_kind(&tree, node),
            (find(&tree, "post"), ContainerKind::SemanticUnit)
        );
    }

    #[test]
    fn test_semantic_unit_includes_self() {
        let tree = MemoryTree::from_document(
            Element::new("body").with_child(
                Element::new("div")
                    .with_size(900.0, 900.0)
                    .with_child(Element::new("article").with_id("post")),
            ),
        );
        let node = find(&tree, "post");
        assert_eq!(resolver().resolve(&tree, node), node);
    }

    #[test]
    fn test_nearest_semantic_unit_wins() {
        let tree = MemoryTree::from_document(
            Element::new("body").with_child(
                Element::new("article").with_id("outer").with_child(
                    Element::new("div")
                        .with_class("g")
                        .with_id("inner")
                        .with_child(Element::new("h3").with_id("match")),
                ),
            ),
        );
        let node = find(&tree, "match");
        assert_eq!(resolver().resolve(&tree, node), find(&tree, "inner"));
    }

    #[test]
    fn test_sized_ancestor_height() {
        let tree = nested(2, Element::new("div").with_id("block").with_size(10.0, 51.0));
        let node = find(&tree, "match");
        assert_eq!(
            resolver().resolve_with_kind(&tree, node),
            (find(&tree, "block"), ContainerKind::SizedAncestor)
        );
    }

    #[test]
    fn test_sized_ancestor_width() {
        let tree = nested(0, Element::new("div").with_id("block").with_size(101.0, 0.0));
        let node = find(&tree, "match");
        assert_eq!(resolver().resolve(&tree, node), find(&tree, "block"));
    }

    #[test]
    fn test_size_threshold_is_strict() {
        let tree = nested(0, Element::new("div").with_id("block").with_size(100.0, 50.0));
        let node = find(&tree, "match");
        // body has no size either, so the node is its own container.
        assert_eq!(resolver().resolve(&tree, node), node);
    }

    #[test]
    fn test_size_search_bounded_to_five_levels() {
        // Sized block sits six levels up: out of reach.
        let tree = nested(5, Element::new("div").with_id("block").with_size(800.0, 600.0));
        let node = find(&tree, "match");
        assert_eq!(
            resolver().resolve_with_kind(&tree, node),
            (node, ContainerKind::MatchedNode)
        );

        // Five levels up: found.
        let tree = nested(4, Element::new("div").with_id("block").with_size(800.0, 600.0));
        let node = find(&tree, "match");
        assert_eq!(resolver().resolve(&tree, node), find(&tree, "block"));
    }

    #[test]
    fn test_matched_node_itself_is_not_size_tested() {
        let tree = MemoryTree::from_document(
            Element::new("body").with_child(
                Element::new("p")
                    .with_id("match")
                    .with_size(1000.0, 1000.0),
            ),
        );
        let node = find(&tree, "match");
        assert_eq!(
            resolver().resolve_with_kind(&tree, node),
            (node, ContainerKind::MatchedNode)
        );
    }

    #[test]
    fn test_configurable_depth() {
        let config = ContainerConfig {
            max_depth: 1,
            ..ContainerConfig::default()
        };
        let resolver = ContainerResolver::new(&config).unwrap();
        let tree = nested(1, Element::new("div").with_id("block").with_size(800.0, 600.0));
        let node = find(&tree, "match");
        assert_eq!(resolver.resolve(&tree, node), node);
    }
}
