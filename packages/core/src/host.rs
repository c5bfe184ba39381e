//! The boundary between the tracker and whatever owns the live tree.
//!
//! A host supplies three things: read access to the tree ([`Dom`]), a way to be told about changes to a
//! subtree ([`MutationSource`]), and deferred callbacks ([`TimerSource`]). The browser implementation
//! lives in `appear-web`; [`crate::MemoryDom`] is an in-memory implementation for tests and headless use.

use std::fmt::{Debug, Display};
use std::time::Duration;

use crate::error::{SelectorError, TrackError};

/// The kind of a node, as far as the tracker cares.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum NodeKind {
    Document,
    Element,
    ShadowRoot,
    Fragment,
    Text,
    Comment,
}

impl NodeKind {
    /// Whether nodes of this kind can have children, and so can be observed.
    pub fn is_container(self) -> bool {
        matches!(
            self,
            NodeKind::Document | NodeKind::Element | NodeKind::ShadowRoot | NodeKind::Fragment
        )
    }
}

/// Read access to a node tree.
///
/// Shadow trees are not part of the ordinary tree: `children` never yields shadow content and the
/// top-level children of a shadow root report the shadow root as their parent, never the host.
pub trait Dom {
    type Node: Clone + PartialEq + Debug + 'static;

    /// A selector compiled by this host. Browsers match with their own engine; [`crate::MemoryDom`]
    /// uses [`crate::Selector`].
    type Selector: Display + Debug + 'static;

    /// Remembers which nodes a repeating registration has already reported.
    type Seen: NodeSet<Self::Node> + Default + 'static;

    /// Reject selectors the host cannot match, before anything is subscribed.
    fn compile_selector(&self, source: &str) -> Result<Self::Selector, SelectorError>;

    /// Whether `node` itself matches. Nodes that are not elements never match.
    fn matches(&self, node: &Self::Node, selector: &Self::Selector) -> bool;

    /// `node` if it matches, otherwise its first matching descendant in document order.
    ///
    /// Shadow trees are not entered.
    fn find_match(&self, node: &Self::Node, selector: &Self::Selector) -> Option<Self::Node> {
        let mut stack = vec![node.clone()];
        while let Some(current) = stack.pop() {
            if self.matches(&current, selector) {
                return Some(current);
            }
            stack.extend(self.children(&current).into_iter().rev());
        }
        None
    }

    /// The node observed when a registration does not name a root.
    fn document(&self) -> Self::Node;

    /// `None` when the host does not know the node (for example, a node handle that was dropped).
    fn kind(&self, node: &Self::Node) -> Option<NodeKind>;

    /// The lowercase tag name of an element; `None` for every other kind of node.
    fn local_name(&self, node: &Self::Node) -> Option<String>;

    fn attribute(&self, node: &Self::Node, name: &str) -> Option<String>;

    fn children(&self, node: &Self::Node) -> Vec<Self::Node>;

    fn parent(&self, node: &Self::Node) -> Option<Self::Node>;

    /// The shadow root attached to `node`, if any.
    fn shadow_root(&self, node: &Self::Node) -> Option<Self::Node>;
}

/// A set of nodes compared by identity.
pub trait NodeSet<N> {
    /// Add `node`, returning `false` if it was already present.
    fn insert(&mut self, node: &N) -> bool;
}

/// What a subscription wants to hear about.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Default)]
pub struct ObserveOptions {
    pub child_list: bool,
    pub subtree: bool,
    pub attributes: bool,
}

impl ObserveOptions {
    /// Child-list changes anywhere under the root, never attribute changes.
    pub const CHILD_LIST_SUBTREE: Self = Self {
        child_list: true,
        subtree: true,
        attributes: false,
    };
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum RecordKind {
    ChildList,
    Attributes,
}

/// One change inside a delivered batch.
#[derive(Clone, Debug, PartialEq)]
pub struct MutationRecord<N> {
    pub kind: RecordKind,
    pub target: N,
    pub added_nodes: Vec<N>,
    pub removed_nodes: Vec<N>,
}

impl<N> MutationRecord<N> {
    pub fn child_list(target: N, added_nodes: Vec<N>, removed_nodes: Vec<N>) -> Self {
        Self {
            kind: RecordKind::ChildList,
            target,
            added_nodes,
            removed_nodes,
        }
    }

    pub fn attributes(target: N) -> Self {
        Self {
            kind: RecordKind::Attributes,
            target,
            added_nodes: Vec::new(),
            removed_nodes: Vec::new(),
        }
    }
}

/// Receives every batch for one subscription.
pub type BatchHandler<N> = Box<dyn FnMut(Vec<MutationRecord<N>>)>;

/// A live subscription. Delivery stops once `disconnect` is called; calling it again does nothing.
pub trait Subscription {
    fn disconnect(&mut self);
}

/// A source of batched change notifications.
///
/// Batches must be delivered asynchronously, never from inside the mutation that caused them.
pub trait MutationSource: Dom {
    type Subscription: Subscription;

    fn observe(
        &self,
        root: &Self::Node,
        options: ObserveOptions,
        handler: BatchHandler<Self::Node>,
    ) -> Result<Self::Subscription, TrackError>;
}

/// A pending deferred callback.
pub trait Timer {
    /// Prevent the callback from running. Cancelling a fired or cancelled timer does nothing.
    fn cancel(&mut self);
}

pub trait TimerSource {
    type Timer: Timer;

    fn set_timeout(&self, delay: Duration, callback: Box<dyn FnOnce()>) -> Self::Timer;
}

/// Everything a [`crate::TrackerRuntime`] needs from its environment.
pub trait Host: MutationSource + TimerSource + 'static {}

impl<T> Host for T where T: MutationSource + TimerSource + 'static {}
