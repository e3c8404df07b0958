//! Structural selectors.
//!
//! Selectors are parsed and matched by `scraper`. A tree host is mirrored into
//! a `scraper::Html` document for the duration of a query, so any host that
//! implements [`NodeQuery`] can be searched with the full CSS selector grammar
//! `scraper` understands.

use std::collections::HashMap;
use std::fmt;

use html5ever::tendril::StrTendril;
use html5ever::{ns, Attribute, LocalName, QualName};
use scraper::{ElementRef, Html, Node};

use super::{NodeId, NodeQuery};
use crate::error::{Error, Result};

/// A parsed structural selector.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Selector {
    source: String,
    inner: scraper::Selector,
}

impl Selector {
    /// Parse a selector.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Selector`] if the text is empty or not a valid selector.
    pub fn parse(source: &str) -> Result<Self> {
        let source = source.trim();
        if source.is_empty() {
            return Err(Error::selector(source, "empty selector"));
        }
        let inner =
            scraper::Selector::parse(source).map_err(|e| Error::selector(source, e.to_string()))?;
        Ok(Self {
            source: source.to_string(),
            inner,
        })
    }

    /// Parse a list of selectors, failing on the first invalid one.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Selector`] for the first selector that does not parse.
    pub fn parse_all<I, S>(sources: I) -> Result<Vec<Self>>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        sources
            .into_iter()
            .map(|s| Self::parse(s.as_ref()))
            .collect()
    }

    /// The selector text as written.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.source
    }
}

impl fmt::Display for Selector {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.source)
    }
}

/// A `scraper` document mirroring a tree host at one point in time.
///
/// Only element structure, tag names and attributes are mirrored. Text does
/// not take part in selector matching.
#[derive(Debug)]
pub(crate) struct SelectorView {
    html: Html,
    nodes: HashMap<ego_tree::NodeId, NodeId>,
    elements: HashMap<NodeId, ego_tree::NodeId>,
}

impl SelectorView {
    /// Mirror the tree reachable from the host's root.
    pub(crate) fn build<Q: NodeQuery + ?Sized>(tree: &Q) -> Self {
        let mut view = Self {
            html: Html::new_document(),
            nodes: HashMap::new(),
            elements: HashMap::new(),
        };
        let Some(root) = tree.root() else {
            return view;
        };

        // Pre-order, so the arena order of the mirror is document order.
        let mut stack = vec![(root, view.html.tree.root().id())];
        while let Some((node, parent_id)) = stack.pop() {
            let Some(mut parent) = view.html.tree.get_mut(parent_id) else {
                continue;
            };
            let id = parent.append(Node::Element(mirror_element(tree, node))).id();
            view.nodes.insert(id, node);
            view.elements.insert(node, id);
            stack.extend(tree.children(node).into_iter().rev().map(|child| (child, id)));
        }
        view
    }

    /// Nodes matching `selector`, in document order.
    pub(crate) fn select(&self, selector: &Selector) -> Vec<NodeId> {
        self.html
            .select(&selector.inner)
            .filter_map(|element| self.nodes.get(&element.id()).copied())
            .collect()
    }

    /// Whether `node` matches `selector`. Nodes outside the mirrored document
    /// never match.
    pub(crate) fn matches(&self, node: NodeId, selector: &Selector) -> bool {
        self.elements
            .get(&node)
            .and_then(|&id| self.html.tree.get(id))
            .and_then(ElementRef::wrap)
            .is_some_and(|element| selector.inner.matches(&element))
    }
}

fn mirror_element<Q: NodeQuery + ?Sized>(tree: &Q, node: NodeId) -> scraper::node::Element {
    let tag = tree.tag(node).unwrap_or_default();
    let attributes = tree
        .attributes(node)
        .into_iter()
        .map(|(name, value)| Attribute {
            name: QualName::new(None, ns!(), LocalName::from(name.to_ascii_lowercase().as_str())),
            value: StrTendril::from(value.as_str()),
        })
        .collect();
    scraper::node::Element::new(
        QualName::new(None, ns!(html), LocalName::from(tag.as_str())),
        attributes,
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tree::{Element, MemoryTree, NodeMutation};

    fn tree() -> MemoryTree {
        MemoryTree::from_document(
            Element::new("body").with_child(
                Element::new("div")
                    .with_attr("role", "feed")
                    .with_child(
                        Element::new("div")
                            .with_attr("role", "article")
                            .with_attr("data-testid", "tweetText")
                            .with_class("g")
                            .with_child(Element::new("h3").with_id("video-title")),
                    )
                    .with_child(
                        Element::new("span")
                            .with_class("xQ8gFc")
                            .with_class("note")
                            .with_attr("aria-label", "ad notice"),
                    ),
            ),
        )
    }

    fn count(tree: &MemoryTree, selector: &str) -> usize {
        tree.select(&Selector::parse(selector).unwrap()).len()
    }

    #[test]
    fn test_parse_rejects_empty() {
        assert!(Selector::parse("").is_err());
        assert!(Selector::parse("   ").is_err());
    }

    #[test]
    fn test_parse_rejects_invalid_syntax() {
        assert!(Selector::parse("p >").is_err());
        assert!(Selector::parse("div[]").is_err());
        assert!(Selector::parse("a:hover").is_err());
        assert!(Selector::parse(".").is_err());
    }

    #[test]
    fn test_parse_error_names_selector() {
        let err = Selector::parse("div >").unwrap_err();
        assert!(matches!(err, Error::Selector { ref selector, .. } if selector == "div >"));
    }

    #[test]
    fn test_display_is_source() {
        let selector = Selector::parse(" .g h3 ").unwrap();
        assert_eq!(selector.to_string(), ".g h3");
        assert_eq!(selector.as_str(), ".g h3");
    }

    #[test]
    fn test_type_selector_case_insensitive() {
        let tree = tree();
        assert_eq!(count(&tree, "H3"), 1);
        assert_eq!(count(&tree, "div"), 2);
        assert_eq!(count(&tree, "*"), 5);
    }

    #[test]
    fn test_id_and_class() {
        let tree = tree();
        assert_eq!(count(&tree, "#video-title"), 1);
        assert_eq!(count(&tree, "span.xQ8gFc"), 1);
        assert_eq!(count(&tree, "span.xQ8gFc.note"), 1);
        assert_eq!(count(&tree, "span.missing"), 0);
        assert_eq!(count(&tree, "p.xQ8gFc"), 0);
    }

    #[test]
    fn test_attribute_operators() {
        let tree = tree();
        assert_eq!(count(&tree, "[role]"), 2);
        assert_eq!(count(&tree, "div[role=\"article\"]"), 1);
        assert_eq!(count(&tree, "div[role=article]"), 1);
        assert_eq!(count(&tree, "[data-testid*='tweet']"), 1);
        assert_eq!(count(&tree, "[data-testid=\"tweet\"]"), 0);
        assert_eq!(count(&tree, "[data-testid^=tweet]"), 1);
        assert_eq!(count(&tree, "[data-testid$=Text]"), 1);
        assert_eq!(count(&tree, "[aria-label~=notice]"), 1);
        assert_eq!(count(&tree, "[aria-label~=not]"), 0);
    }

    #[test]
    fn test_combinators() {
        let tree = tree();
        assert_eq!(count(&tree, ".g h3"), 1);
        assert_eq!(count(&tree, "[role=\"feed\"] [role=\"article\"]"), 1);
        assert_eq!(count(&tree, "body div h3"), 1);
        assert_eq!(count(&tree, "span h3"), 0);
        assert_eq!(count(&tree, "h3 body"), 0);
        assert_eq!(count(&tree, "[role=\"feed\"] > h3"), 0);
        assert_eq!(count(&tree, "[role=\"feed\"] > span"), 1);
    }

    #[test]
    fn test_select_document_order() {
        let tree = tree();
        let tags: Vec<_> = tree
            .select(&Selector::parse("div, h3, span").unwrap())
            .into_iter()
            .filter_map(|n| tree.tag(n))
            .collect();
        assert_eq!(tags, vec!["div", "div", "h3", "span"]);
    }

    #[test]
    fn test_view_follows_tree_changes() {
        let mut tree = tree();
        let span = tree.select(&Selector::parse("span").unwrap())[0];
        tree.add_class(span, "content-guardian-hidden").unwrap();

        let hidden = Selector::parse(".content-guardian-hidden").unwrap();
        let view = SelectorView::build(&tree);
        assert!(view.matches(span, &hidden));
        assert!(!view.matches(NodeId(999), &hidden));
    }

    #[test]
    fn test_empty_tree_selects_nothing() {
        let tree = MemoryTree::new();
        assert!(tree.select(&Selector::parse("*").unwrap()).is_empty());
    }

    #[test]
    fn test_parse_all_reports_first_failure() {
        assert_eq!(Selector::parse_all(["p", "h1"]).unwrap().len(), 2);
        let err = Selector::parse_all(["p", "p >"]).unwrap_err();
        assert!(err.to_string().contains("p >"));
    }
}
