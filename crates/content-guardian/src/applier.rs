//! Annotation and filter application.
//!
//! Each [`Action`] resolves to an [`ActionStrategy`] through a static table.
//! A strategy owns one presentation class and, optionally, one control placed
//! in the container's wrapper. Everything the engine inserts carries one of
//! the classes below so a full reset can find and remove it again.

use tracing::{debug, trace};

use crate::error::Result;
use crate::rule::{Action, Rule};
use crate::tree::{NewElement, NodeId, NodeQuery, TreeHost};

/// Class applied by the hide action.
pub const HIDDEN_CLASS: &str = "content-guardian-hidden";

/// Class applied by the blur action.
pub const BLURRED_CLASS: &str = "content-guardian-blurred";

/// Class applied by the flag action.
pub const FLAGGED_CLASS: &str = "content-guardian-flagged";

/// Class of the wrapper inserted around a container.
pub const WRAPPER_CLASS: &str = "content-guardian-wrapper";

/// Class of the unblur button.
pub const UNBLUR_CLASS: &str = "content-guardian-unblur";

/// Class of the flag indicator.
pub const FLAG_CLASS: &str = "content-guardian-flag";

/// Classes marking nodes the engine created.
pub const ENGINE_CLASSES: &[&str] = &[WRAPPER_CLASS, UNBLUR_CLASS, FLAG_CLASS];

/// A control placed in a wrapper.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Control {
    /// One-shot button revealing blurred content.
    Unblur,
    /// Non-interactive label naming the matched keyword.
    FlagIndicator,
}

impl Control {
    /// Every control kind.
    pub const ALL: [Control; 2] = [Control::Unblur, Control::FlagIndicator];

    /// Class identifying this control.
    #[must_use]
    pub const fn class(self) -> &'static str {
        match self {
            Self::Unblur => UNBLUR_CLASS,
            Self::FlagIndicator => FLAG_CLASS,
        }
    }

    /// Tag of the inserted element.
    #[must_use]
    pub const fn tag(self) -> &'static str {
        match self {
            Self::Unblur => "button",
            Self::FlagIndicator => "div",
        }
    }

    /// Visible label for a match on `keyword`.
    #[must_use]
    pub fn label(self, keyword: &str) -> String {
        match self {
            Self::Unblur => format!("Show content (filtered: {keyword})"),
            Self::FlagIndicator => format!("Filtered: {keyword}"),
        }
    }

    /// Element to insert for a match on `keyword`.
    #[must_use]
    pub fn element(self, keyword: &str) -> NewElement {
        NewElement::new(self.tag(), self.class()).with_text(self.label(keyword))
    }

    /// The control kind of `node`, if it is one.
    pub fn of(tree: &dyn TreeHost, node: NodeId) -> Option<Self> {
        Self::ALL
            .into_iter()
            .find(|control| tree.has_class(node, control.class()))
    }
}

/// Presentation behavior of one action.
pub trait ActionStrategy: Sync {
    /// The action this strategy implements.
    fn action(&self) -> Action;

    /// The presentation class put on the container.
    fn class(&self) -> &'static str;

    /// The control added to the wrapper, if any.
    fn control(&self) -> Option<Control> {
        None
    }

    /// Annotate `container`. The control goes into `wrapper` unless it already
    /// holds one.
    ///
    /// # Errors
    ///
    /// Returns an error if the tree rejects a mutation.
    fn apply(
        &self,
        tree: &mut dyn TreeHost,
        container: NodeId,
        wrapper: Option<NodeId>,
        rule: &Rule,
    ) -> Result<()> {
        tree.add_class(container, self.class())?;
        if let (Some(control), Some(wrapper)) = (self.control(), wrapper) {
            ensure_control(tree, wrapper, control, &rule.keyword)?;
        }
        Ok(())
    }

    /// Remove this strategy's class from `container`.
    ///
    /// # Errors
    ///
    /// Returns an error if the tree rejects a mutation.
    fn revert(&self, tree: &mut dyn TreeHost, container: NodeId) -> Result<()> {
        tree.remove_class(container, self.class())
    }
}

/// Hides the container.
#[derive(Debug)]
pub struct HideStrategy;

impl ActionStrategy for HideStrategy {
    fn action(&self) -> Action {
        Action::Hide
    }

    fn class(&self) -> &'static str {
        HIDDEN_CLASS
    }
}

/// Blurs the container behind an unblur button.
#[derive(Debug)]
pub struct BlurStrategy;

impl ActionStrategy for BlurStrategy {
    fn action(&self) -> Action {
        Action::Blur
    }

    fn class(&self) -> &'static str {
        BLURRED_CLASS
    }

    fn control(&self) -> Option<Control> {
        Some(Control::Unblur)
    }
}

/// Flags the container with a keyword indicator.
#[derive(Debug)]
pub struct FlagStrategy;

impl ActionStrategy for FlagStrategy {
    fn action(&self) -> Action {
        Action::Flag
    }

    fn class(&self) -> &'static str {
        FLAGGED_CLASS
    }

    fn control(&self) -> Option<Control> {
        Some(Control::FlagIndicator)
    }
}

/// Strategies indexed by [`Action::index`].
static STRATEGIES: [&dyn ActionStrategy; 3] = [&HideStrategy, &BlurStrategy, &FlagStrategy];

impl Action {
    /// The strategy implementing this action.
    #[must_use]
    pub fn strategy(self) -> &'static dyn ActionStrategy {
        STRATEGIES[self.index()]
    }
}

/// Whether `node` was inserted by the engine.
pub fn is_engine_node<Q: NodeQuery + ?Sized>(tree: &Q, node: NodeId) -> bool {
    ENGINE_CLASSES.iter().any(|class| tree.has_class(node, class))
}

/// Whether `node` is a control the engine inserted into a wrapper.
pub fn is_control_node<Q: NodeQuery + ?Sized>(tree: &Q, node: NodeId) -> bool {
    Control::ALL
        .iter()
        .any(|control| tree.has_class(node, control.class()))
}

/// The wrapper enclosing `container`, inserting one if needed.
///
/// Returns `None` for the document root, which cannot be wrapped.
///
/// # Errors
///
/// Returns an error if the tree rejects the insertion.
pub fn ensure_wrapper(tree: &mut dyn TreeHost, container: NodeId) -> Result<Option<NodeId>> {
    let Some(parent) = tree.parent(container) else {
        debug!(%container, "Container is the root, applying without wrapper");
        return Ok(None);
    };
    if tree.has_class(parent, WRAPPER_CLASS) {
        return Ok(Some(parent));
    }
    let wrapper = tree.insert_wrapper(container, NewElement::new("div", WRAPPER_CLASS))?;
    trace!(%container, %wrapper, "Inserted wrapper");
    Ok(Some(wrapper))
}

/// Add `control` as the first child of `wrapper` unless the wrapper already
/// holds a control. Returns the inserted node.
///
/// # Errors
///
/// Returns an error if the tree rejects the insertion.
pub fn ensure_control(
    tree: &mut dyn TreeHost,
    wrapper: NodeId,
    control: Control,
    keyword: &str,
) -> Result<Option<NodeId>> {
    let existing = tree
        .children(wrapper)
        .into_iter()
        .find(|&child| Control::of(&*tree, child).is_some());
    if let Some(existing) = existing {
        trace!(%wrapper, %existing, "Wrapper already holds a control");
        return Ok(None);
    }
    let node = tree.prepend_child(wrapper, control.element(keyword))?;
    Ok(Some(node))
}

/// Apply `rule`'s action to `container`. Returns the wrapper, if any.
///
/// The caller guards this with the processed mark; it is not re-entrant
/// per container within a scan cycle.
///
/// # Errors
///
/// Returns an error if the tree rejects a mutation.
pub fn apply_filter(
    tree: &mut dyn TreeHost,
    container: NodeId,
    rule: &Rule,
) -> Result<Option<NodeId>> {
    let wrapper = ensure_wrapper(tree, container)?;
    rule.action.strategy().apply(tree, container, wrapper, rule)?;
    debug!(
        %container,
        rule = %rule.id,
        keyword = %rule.keyword,
        action = %rule.action,
        "Applied filter"
    );
    Ok(wrapper)
}

/// Activate a control node. Returns whether anything changed.
///
/// An unblur button removes the blurred class from the content it guards and
/// then removes itself. Flag indicators and ordinary nodes are inert.
///
/// # Errors
///
/// Returns an error if the tree rejects a mutation.
pub fn activate_control(tree: &mut dyn TreeHost, node: NodeId) -> Result<bool> {
    match Control::of(tree, node) {
        Some(Control::Unblur) => {
            if let Some(wrapper) = tree.parent(node) {
                let blurred = tree
                    .children(wrapper)
                    .into_iter()
                    .find(|&child| tree.has_class(child, BLURRED_CLASS))
                    .or_else(|| tree.find_class_within(wrapper, BLURRED_CLASS));
                if let Some(blurred) = blurred {
                    BlurStrategy.revert(tree, blurred)?;
                }
            }
            tree.remove_node(node)?;
            debug!(%node, "Unblurred content");
            Ok(true)
        }
        Some(Control::FlagIndicator) | None => Ok(false),
    }
}

/// What a full reset removed.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct StripReport {
    /// Processed marks cleared.
    pub marks: usize,
    /// Presentation classes removed.
    pub classes: usize,
    /// Controls removed.
    pub controls: usize,
    /// Wrappers removed.
    pub wrappers: usize,
}

/// Remove every processed mark, presentation class, control and wrapper.
///
/// # Errors
///
/// Returns an error if the tree rejects a mutation.
pub fn strip_annotations(tree: &mut dyn TreeHost) -> Result<StripReport> {
    let mut report = StripReport::default();
    let nodes = tree.all_nodes();

    for &node in &nodes {
        if Control::of(tree, node).is_some() {
            tree.remove_node(node)?;
            report.controls += 1;
        }
    }

    for &node in &nodes {
        if tree.has_class(node, WRAPPER_CLASS) && tree.parent(node).is_some() {
            tree.unwrap_node(node)?;
            report.wrappers += 1;
        }
    }

    for node in tree.all_nodes() {
        if tree.is_processed(node) {
            tree.clear_processed_mark(node)?;
            report.marks += 1;
        }
        for action in Action::ALL {
            let strategy = action.strategy();
            if tree.has_class(node, strategy.class()) {
                strategy.revert(tree, node)?;
                report.classes += 1;
            }
        }
    }

    debug!(?report, "Stripped annotations");
    Ok(report)
}
