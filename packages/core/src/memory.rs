//! An in-memory [`Host`](crate::Host) for tests and headless use.
//!
//! Mutations are recorded per subscription and only delivered when [`MemoryDom::flush`] runs, the same
//! way a browser queues mutation records until the next microtask checkpoint. Timers run on a virtual
//! clock that only moves when [`MemoryDom::advance`] is called.

use std::cell::RefCell;
use std::collections::{BTreeMap, HashSet};
use std::fmt;
use std::rc::{Rc, Weak};
use std::time::Duration;

use rustc_hash::{FxHashMap, FxHashSet};
use slab::Slab;

use crate::error::{SelectorError, TrackError};
use crate::host::{
    BatchHandler, Dom, MutationRecord, MutationSource, NodeKind, NodeSet, ObserveOptions,
    RecordKind, Subscription, Timer, TimerSource,
};
use crate::selector::Selector;

/// A node of a [`MemoryDom`].
#[derive(Hash, PartialEq, Eq, Clone, Copy, Debug, PartialOrd, Ord)]
pub struct NodeId(usize);

struct NodeData {
    kind: NodeKind,
    name: Option<String>,
    text: Option<String>,
    attrs: FxHashMap<String, String>,
    parent: Option<NodeId>,
    children: Vec<NodeId>,
    shadow_root: Option<NodeId>,
    host: Option<NodeId>,
}

impl NodeData {
    fn new(kind: NodeKind) -> Self {
        Self {
            kind,
            name: None,
            text: None,
            attrs: FxHashMap::default(),
            parent: None,
            children: Vec::new(),
            shadow_root: None,
            host: None,
        }
    }
}

struct Observer {
    root: NodeId,
    options: ObserveOptions,
    queue: Vec<MutationRecord<NodeId>>,
    handler: Rc<RefCell<BatchHandler<NodeId>>>,
}

type TimerKey = (Duration, u64);

struct DomState {
    nodes: Slab<NodeData>,
    document: NodeId,
    body: NodeId,
    observers: Slab<Observer>,
    timers: BTreeMap<TimerKey, Box<dyn FnOnce()>>,
    next_timer: u64,
    now: Duration,
}

/// A cheaply clonable handle to an in-memory document.
///
/// A new document contains `<html><body></body></html>`.
///
/// The tree-editing methods panic on requests a browser would reject with a `HierarchyRequestError`
/// (inserting a node into itself, appending a document or a shadow root, ...).
#[derive(Clone)]
pub struct MemoryDom {
    state: Rc<RefCell<DomState>>,
}

impl Default for MemoryDom {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for MemoryDom {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = self.state.borrow();
        f.debug_struct("MemoryDom")
            .field("nodes", &state.nodes.len())
            .field("observers", &state.observers.len())
            .field("timers", &state.timers.len())
            .field("now", &state.now)
            .finish()
    }
}

impl MemoryDom {
    pub fn new() -> Self {
        let mut nodes = Slab::new();
        let document = NodeId(nodes.insert(NodeData::new(NodeKind::Document)));
        let html = NodeId(nodes.insert(NodeData {
            name: Some("html".to_string()),
            parent: Some(document),
            ..NodeData::new(NodeKind::Element)
        }));
        let body = NodeId(nodes.insert(NodeData {
            name: Some("body".to_string()),
            parent: Some(html),
            ..NodeData::new(NodeKind::Element)
        }));
        nodes[document.0].children.push(html);
        nodes[html.0].children.push(body);

        Self {
            state: Rc::new(RefCell::new(DomState {
                nodes,
                document,
                body,
                observers: Slab::new(),
                timers: BTreeMap::new(),
                next_timer: 0,
                now: Duration::ZERO,
            })),
        }
    }

    pub fn body(&self) -> NodeId {
        self.state.borrow().body
    }

    /// Create a detached element. The tag name is stored lowercase.
    pub fn create_element(&self, tag: &str) -> NodeId {
        let mut state = self.state.borrow_mut();
        NodeId(state.nodes.insert(NodeData {
            name: Some(tag.to_ascii_lowercase()),
            ..NodeData::new(NodeKind::Element)
        }))
    }

    pub fn create_text(&self, text: &str) -> NodeId {
        let mut state = self.state.borrow_mut();
        NodeId(state.nodes.insert(NodeData {
            text: Some(text.to_string()),
            ..NodeData::new(NodeKind::Text)
        }))
    }

    pub fn create_comment(&self, text: &str) -> NodeId {
        let mut state = self.state.borrow_mut();
        NodeId(state.nodes.insert(NodeData {
            text: Some(text.to_string()),
            ..NodeData::new(NodeKind::Comment)
        }))
    }

    /// A document fragment. Inserting it moves its children, leaving it empty.
    pub fn create_fragment(&self) -> NodeId {
        let mut state = self.state.borrow_mut();
        NodeId(state.nodes.insert(NodeData::new(NodeKind::Fragment)))
    }

    pub fn text(&self, node: NodeId) -> Option<String> {
        self.state.borrow().nodes.get(node.0)?.text.clone()
    }

    pub fn set_attribute(&self, node: NodeId, name: &str, value: &str) {
        let mut state = self.state.borrow_mut();
        let data = state.node_mut(node);
        assert!(
            data.kind == NodeKind::Element,
            "only elements have attributes"
        );
        data.attrs
            .insert(name.to_ascii_lowercase(), value.to_string());
        state.queue(MutationRecord::attributes(node));
    }

    pub fn remove_attribute(&self, node: NodeId, name: &str) {
        let mut state = self.state.borrow_mut();
        if state
            .node_mut(node)
            .attrs
            .remove(&name.to_ascii_lowercase())
            .is_some()
        {
            state.queue(MutationRecord::attributes(node));
        }
    }

    pub fn append_child(&self, parent: NodeId, child: NodeId) {
        self.insert_before(parent, child, None);
    }

    /// Insert `child` into `parent` before `reference`, or at the end when `reference` is `None`.
    ///
    /// A child that already has a parent is moved, which records a removal on the old parent first.
    pub fn insert_before(&self, parent: NodeId, child: NodeId, reference: Option<NodeId>) {
        let mut state = self.state.borrow_mut();
        state.check_insert(parent, child, reference);

        let moved = match state.node(child).kind {
            NodeKind::Fragment => {
                let children = std::mem::take(&mut state.node_mut(child).children);
                if !children.is_empty() {
                    state.queue(MutationRecord::child_list(child, Vec::new(), children.clone()));
                }
                children
            }
            _ => {
                state.detach(child);
                vec![child]
            }
        };
        if moved.is_empty() {
            return;
        }

        let index = match reference {
            Some(reference) => state
                .node(parent)
                .children
                .iter()
                .position(|c| *c == reference)
                .unwrap_or(state.node(parent).children.len()),
            None => state.node(parent).children.len(),
        };

        for node in &moved {
            state.node_mut(*node).parent = Some(parent);
        }
        let children = &mut state.node_mut(parent).children;
        let tail = children.split_off(index);
        children.extend(moved.iter().copied());
        children.extend(tail);
        state.queue(MutationRecord::child_list(parent, moved, Vec::new()));
    }

    pub fn remove_child(&self, parent: NodeId, child: NodeId) {
        let mut state = self.state.borrow_mut();
        assert_eq!(
            state.node(child).parent,
            Some(parent),
            "{child:?} is not a child of {parent:?}"
        );
        state.detach(child);
    }

    /// Detach `node` from its parent, if it has one.
    pub fn remove(&self, node: NodeId) {
        self.state.borrow_mut().detach(node);
    }

    /// Attach an open shadow root to an element. Attaching a shadow root produces no mutation record.
    pub fn attach_shadow(&self, host: NodeId) -> NodeId {
        let mut state = self.state.borrow_mut();
        let data = state.node(host);
        assert!(
            data.kind == NodeKind::Element,
            "shadow roots can only be attached to elements"
        );
        assert!(
            data.shadow_root.is_none(),
            "{host:?} already has a shadow root"
        );

        let shadow = NodeId(state.nodes.insert(NodeData {
            host: Some(host),
            ..NodeData::new(NodeKind::ShadowRoot)
        }));
        state.node_mut(host).shadow_root = Some(shadow);
        shadow
    }

    /// The element a shadow root is attached to.
    pub fn host_of(&self, shadow: NodeId) -> Option<NodeId> {
        self.state.borrow().nodes.get(shadow.0)?.host
    }

    /// Deliver every queued batch, repeating until no observer has anything pending.
    ///
    /// Each observer receives everything queued for it since its last delivery as one batch. Observers
    /// whose handler is already running further up the stack are skipped; the outer flush picks them up.
    pub fn flush(&self) {
        loop {
            let ready = {
                let mut state = self.state.borrow_mut();
                state
                    .observers
                    .iter_mut()
                    .find(|(_, observer)| {
                        !observer.queue.is_empty() && observer.handler.try_borrow_mut().is_ok()
                    })
                    .map(|(_, observer)| {
                        (
                            observer.handler.clone(),
                            std::mem::take(&mut observer.queue),
                        )
                    })
            };

            let Some((handler, batch)) = ready else {
                return;
            };
            let mut handler = handler.borrow_mut();
            (*handler)(batch);
        }
    }

    /// Move the virtual clock forward, firing due timers in deadline order.
    ///
    /// Pending mutation batches are flushed before the first timer and after every timer, as a browser
    /// runs its microtask checkpoint between tasks.
    pub fn advance(&self, by: Duration) {
        self.flush();
        let target = self.state.borrow().now + by;

        loop {
            let due = {
                let mut state = self.state.borrow_mut();
                match state.timers.keys().next().copied() {
                    Some(key) if key.0 <= target => {
                        state.now = state.now.max(key.0);
                        state.timers.remove(&key)
                    }
                    _ => None,
                }
            };
            let Some(callback) = due else {
                break;
            };
            callback();
            self.flush();
        }

        let mut state = self.state.borrow_mut();
        state.now = state.now.max(target);
    }

    /// Time elapsed on the virtual clock.
    pub fn now(&self) -> Duration {
        self.state.borrow().now
    }

    /// Number of connected subscriptions.
    pub fn observer_count(&self) -> usize {
        self.state.borrow().observers.len()
    }

    /// Number of timers that have neither fired nor been cancelled.
    pub fn pending_timers(&self) -> usize {
        self.state.borrow().timers.len()
    }
}

impl DomState {
    fn node(&self, id: NodeId) -> &NodeData {
        match self.nodes.get(id.0) {
            Some(node) => node,
            None => panic!("{id:?} does not belong to this document"),
        }
    }

    fn node_mut(&mut self, id: NodeId) -> &mut NodeData {
        match self.nodes.get_mut(id.0) {
            Some(node) => node,
            None => panic!("{id:?} does not belong to this document"),
        }
    }

    fn check_insert(&self, parent: NodeId, child: NodeId, reference: Option<NodeId>) {
        assert!(
            self.node(parent).kind.is_container(),
            "{parent:?} cannot have children"
        );
        assert!(
            !matches!(
                self.node(child).kind,
                NodeKind::Document | NodeKind::ShadowRoot
            ),
            "{child:?} cannot be inserted into a tree"
        );
        if let Some(reference) = reference {
            assert_eq!(
                self.node(reference).parent,
                Some(parent),
                "{reference:?} is not a child of {parent:?}"
            );
        }

        let mut cursor = Some(parent);
        while let Some(ancestor) = cursor {
            assert_ne!(ancestor, child, "{child:?} cannot be inserted into itself");
            let data = self.node(ancestor);
            cursor = data.parent.or(data.host);
        }
    }

    fn detach(&mut self, child: NodeId) {
        let Some(parent) = self.node_mut(child).parent.take() else {
            return;
        };
        self.node_mut(parent).children.retain(|c| *c != child);
        self.queue(MutationRecord::child_list(parent, Vec::new(), vec![child]));
    }

    /// Queue `record` for every observer watching its target.
    fn queue(&mut self, record: MutationRecord<NodeId>) {
        let interested: Vec<usize> = self
            .observers
            .iter()
            .filter(|(_, observer)| {
                let wanted = match record.kind {
                    RecordKind::ChildList => observer.options.child_list,
                    RecordKind::Attributes => observer.options.attributes,
                };
                wanted && self.observes(observer, record.target)
            })
            .map(|(key, _)| key)
            .collect();

        for key in interested {
            self.observers[key].queue.push(record.clone());
        }
    }

    fn observes(&self, observer: &Observer, target: NodeId) -> bool {
        if target == observer.root {
            return true;
        }
        if !observer.options.subtree {
            return false;
        }
        // Shadow roots have no parent, so the walk never leaves the tree the target lives in.
        let mut cursor = self.nodes.get(target.0).and_then(|node| node.parent);
        while let Some(ancestor) = cursor {
            if ancestor == observer.root {
                return true;
            }
            cursor = self.nodes.get(ancestor.0).and_then(|node| node.parent);
        }
        false
    }
}

impl NodeSet<NodeId> for FxHashSet<NodeId> {
    fn insert(&mut self, node: &NodeId) -> bool {
        HashSet::insert(self, *node)
    }
}

impl Dom for MemoryDom {
    type Node = NodeId;
    type Selector = Selector;
    type Seen = FxHashSet<NodeId>;

    fn compile_selector(&self, source: &str) -> Result<Selector, SelectorError> {
        Selector::parse(source)
    }

    fn matches(&self, node: &NodeId, selector: &Selector) -> bool {
        selector.matches(self, node)
    }

    fn document(&self) -> NodeId {
        self.state.borrow().document
    }

    fn kind(&self, node: &NodeId) -> Option<NodeKind> {
        self.state.borrow().nodes.get(node.0).map(|data| data.kind)
    }

    fn local_name(&self, node: &NodeId) -> Option<String> {
        let state = self.state.borrow();
        let data = state.nodes.get(node.0)?;
        match data.kind {
            NodeKind::Element => data.name.clone(),
            _ => None,
        }
    }

    fn attribute(&self, node: &NodeId, name: &str) -> Option<String> {
        let state = self.state.borrow();
        state.nodes.get(node.0)?.attrs.get(name).cloned()
    }

    fn children(&self, node: &NodeId) -> Vec<NodeId> {
        let state = self.state.borrow();
        state
            .nodes
            .get(node.0)
            .map(|data| data.children.clone())
            .unwrap_or_default()
    }

    fn parent(&self, node: &NodeId) -> Option<NodeId> {
        self.state.borrow().nodes.get(node.0)?.parent
    }

    fn shadow_root(&self, node: &NodeId) -> Option<NodeId> {
        self.state.borrow().nodes.get(node.0)?.shadow_root
    }
}

/// A subscription created by [`MemoryDom`]'s [`MutationSource`] implementation.
pub struct MemorySubscription {
    key: Option<usize>,
    state: Weak<RefCell<DomState>>,
}

impl Subscription for MemorySubscription {
    fn disconnect(&mut self) {
        let (Some(key), Some(state)) = (self.key.take(), self.state.upgrade()) else {
            return;
        };
        let observer = state.borrow_mut().observers.try_remove(key);
        drop(observer);
    }
}

impl Drop for MemorySubscription {
    fn drop(&mut self) {
        self.disconnect();
    }
}

impl MutationSource for MemoryDom {
    type Subscription = MemorySubscription;

    fn observe(
        &self,
        root: &NodeId,
        options: ObserveOptions,
        handler: BatchHandler<NodeId>,
    ) -> Result<MemorySubscription, TrackError> {
        let mut state = self.state.borrow_mut();
        if !state.nodes.contains(root.0) {
            return Err(TrackError::Subscribe(format!(
                "{root:?} does not belong to this document"
            )));
        }
        let key = state.observers.insert(Observer {
            root: *root,
            options,
            queue: Vec::new(),
            handler: Rc::new(RefCell::new(handler)),
        });
        Ok(MemorySubscription {
            key: Some(key),
            state: Rc::downgrade(&self.state),
        })
    }
}

/// A timer on [`MemoryDom`]'s virtual clock.
pub struct MemoryTimer {
    key: Option<TimerKey>,
    state: Weak<RefCell<DomState>>,
}

impl Timer for MemoryTimer {
    fn cancel(&mut self) {
        let (Some(key), Some(state)) = (self.key.take(), self.state.upgrade()) else {
            return;
        };
        let callback = state.borrow_mut().timers.remove(&key);
        drop(callback);
    }
}

impl TimerSource for MemoryDom {
    type Timer = MemoryTimer;

    fn set_timeout(&self, delay: Duration, callback: Box<dyn FnOnce()>) -> MemoryTimer {
        let mut state = self.state.borrow_mut();
        let key = (state.now + delay, state.next_timer);
        state.next_timer += 1;
        state.timers.insert(key, callback);
        MemoryTimer {
            key: Some(key),
            state: Rc::downgrade(&self.state),
        }
    }
}
