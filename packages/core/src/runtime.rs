use std::cell::{Cell, RefCell};
use std::fmt::Display;
use std::rc::Rc;

use slotmap::SlotMap;
use tracing::{debug, error, trace, warn};

use crate::callback::{self, Callback};
use crate::error::{Result, TrackError};
use crate::host::{Host, MutationRecord, ObserveOptions, RecordKind, Subscription, Timer};
use crate::options::{Mode, TrackOptions};
use crate::tracker::{Registration, Termination, TrackerEntry, TrackerHandle, TrackerId};

/// Owns every live tracker for one host.
///
/// This is the process-level context a page script creates once and tears down on unload. Trackers stay
/// alive as long as the runtime does, whether or not anyone holds their [`TrackerHandle`]. Dropping the
/// runtime tears it down.
///
/// # Example
///
/// ```rust
/// use std::cell::Cell;
/// use std::rc::Rc;
/// use appear_core::{MemoryDom, TrackerRuntime};
///
/// let dom = MemoryDom::new();
/// let runtime = TrackerRuntime::new(dom.clone());
///
/// let seen = Rc::new(Cell::new(None));
/// let handle = runtime
///     .track("#x", {
///         let seen = seen.clone();
///         move |node| seen.set(Some(node))
///     })
///     .unwrap();
///
/// let outer = dom.create_element("div");
/// let inner = dom.create_element("div");
/// dom.set_attribute(inner, "id", "x");
/// dom.append_child(outer, inner);
/// dom.append_child(dom.body(), outer);
/// dom.flush();
///
/// assert_eq!(seen.get(), Some(inner));
/// assert!(handle.is_terminated());
/// ```
pub struct TrackerRuntime<H: Host> {
    inner: Rc<RuntimeInner<H>>,
}

pub(crate) struct RuntimeInner<H: Host> {
    host: H,
    trackers: RefCell<SlotMap<TrackerId, TrackerEntry<H>>>,
    next_serial: Cell<u64>,

    /// Number of batch evaluations currently on the stack.
    evaluating: Cell<usize>,

    /// Timeouts that fired while an evaluation was in flight.
    deferred_timeouts: RefCell<Vec<TrackerId>>,

    shut_down: Cell<bool>,
}

/// Tracks in-flight evaluations; applies deferred timeouts once the outermost one finishes.
struct EvaluationGuard<'a, H: Host>(&'a Rc<RuntimeInner<H>>);

impl<'a, H: Host> EvaluationGuard<'a, H> {
    fn new(runtime: &'a Rc<RuntimeInner<H>>) -> Self {
        runtime.evaluating.set(runtime.evaluating.get() + 1);
        Self(runtime)
    }
}

impl<H: Host> Drop for EvaluationGuard<'_, H> {
    fn drop(&mut self) {
        let depth = self.0.evaluating.get() - 1;
        self.0.evaluating.set(depth);
        if depth == 0 && !std::thread::panicking() {
            self.0.apply_deferred_timeouts();
        }
    }
}

/// A node still to be checked for an attached shadow root.
struct ShadowScan<N> {
    owner: TrackerId,
    node: N,
    descend: bool,
}

impl<H: Host> TrackerRuntime<H> {
    pub fn new(host: H) -> Self {
        Self {
            inner: Rc::new(RuntimeInner {
                host,
                trackers: RefCell::new(SlotMap::with_key()),
                next_serial: Cell::new(0),
                evaluating: Cell::new(0),
                deferred_timeouts: RefCell::new(Vec::new()),
                shut_down: Cell::new(false),
            }),
        }
    }

    pub fn host(&self) -> &H {
        &self.inner.host
    }

    /// Call `callback` once with the first node matching `selector` that appears anywhere under the
    /// host's document.
    pub fn track(
        &self,
        selector: &str,
        callback: impl Fn(H::Node) + 'static,
    ) -> Result<TrackerHandle<H>> {
        self.track_with(TrackOptions::new(selector), callback)
    }

    /// Register a tracker described by `options`.
    ///
    /// A panicking callback is caught and logged only where panics unwind. On
    /// `wasm32-unknown-unknown` panics abort the module, so browser callbacks that can fail should
    /// return an error through [`TrackerRuntime::try_track_with`] instead.
    pub fn track_with(
        &self,
        options: TrackOptions<H::Node>,
        callback: impl Fn(H::Node) + 'static,
    ) -> Result<TrackerHandle<H>> {
        self.inner.register(options, callback::infallible(callback))
    }

    /// Like [`TrackerRuntime::track_with`], for callbacks that can fail.
    ///
    /// A returned error is logged and otherwise treated like a successful invocation.
    pub fn try_track_with<E: Display>(
        &self,
        options: TrackOptions<H::Node>,
        callback: impl Fn(H::Node) -> std::result::Result<(), E> + 'static,
    ) -> Result<TrackerHandle<H>> {
        self.inner.register(options, callback::fallible(callback))
    }

    /// The number of active trackers, shadow-tree trackers included.
    pub fn live_trackers(&self) -> usize {
        self.inner.trackers.borrow().len()
    }

    /// Terminate every tracker and refuse further registrations.
    pub fn teardown(&self) {
        self.inner.teardown();
    }

    pub fn is_shut_down(&self) -> bool {
        self.inner.shut_down.get()
    }
}

impl<H: Host> Drop for TrackerRuntime<H> {
    fn drop(&mut self) {
        self.inner.teardown();
    }
}

impl<H: Host> RuntimeInner<H> {
    fn register(
        self: &Rc<Self>,
        options: TrackOptions<H::Node>,
        callback: Callback<H::Node>,
    ) -> Result<TrackerHandle<H>> {
        if self.shut_down.get() {
            return Err(TrackError::RuntimeShutdown);
        }

        let selector = self.host.compile_selector(&options.selector)?;
        let root = options.root.unwrap_or_else(|| self.host.document());
        match self.host.kind(&root) {
            Some(kind) if kind.is_container() => {}
            Some(kind) => {
                return Err(TrackError::InvalidRoot(format!(
                    "{kind:?} nodes cannot have children"
                )))
            }
            None => {
                return Err(TrackError::InvalidRoot(format!(
                    "{root:?} is not known to the host"
                )))
            }
        }

        debug!(
            selector = %selector,
            mode = ?options.mode,
            timeout = ?options.timeout,
            "registering tracker"
        );

        let registration = Rc::new(Registration {
            selector,
            callback,
            mode: options.mode,
            timeout: options.timeout,
            fired: Cell::new(false),
            reported: RefCell::default(),
        });

        let id = self.spawn(root.clone(), None, &registration)?;
        let (serial, status) = {
            let trackers = self.trackers.borrow();
            let entry = &trackers[id];
            (entry.serial, entry.status.clone())
        };
        let handle = TrackerHandle::new(id, serial, status, Rc::downgrade(self));

        let _guard = EvaluationGuard::new(self);
        if options.scan_existing {
            let candidates = self.host.children(&root);
            self.report(id, &registration, candidates);
        }
        self.cover_shadow_trees(
            &registration,
            vec![ShadowScan {
                owner: id,
                node: root,
                descend: true,
            }],
        );

        Ok(handle)
    }

    /// Create one tracker, subscribe it, and arm its timeout. Shadow trees under `root` are not scanned.
    fn spawn(
        self: &Rc<Self>,
        root: H::Node,
        parent: Option<TrackerId>,
        registration: &Rc<Registration<H>>,
    ) -> Result<TrackerId> {
        let serial = self.next_serial.get();
        self.next_serial.set(serial + 1);

        let id = self.trackers.borrow_mut().insert(TrackerEntry {
            serial,
            root: root.clone(),
            parent,
            children: Vec::new(),
            registration: registration.clone(),
            subscription: None,
            timer: None,
            status: Rc::new(Cell::new(None)),
        });

        let handler = {
            let runtime = Rc::downgrade(self);
            Box::new(move |records: Vec<MutationRecord<H::Node>>| {
                if let Some(runtime) = runtime.upgrade() {
                    runtime.evaluate(id, records);
                }
            })
        };

        let subscription =
            match self
                .host
                .observe(&root, ObserveOptions::CHILD_LIST_SUBTREE, handler)
            {
                Ok(subscription) => subscription,
                Err(err) => {
                    self.trackers.borrow_mut().remove(id);
                    return Err(err);
                }
            };

        let timer = registration.timeout.map(|timeout| {
            let runtime = Rc::downgrade(self);
            self.host.set_timeout(
                timeout,
                Box::new(move || {
                    if let Some(runtime) = runtime.upgrade() {
                        runtime.on_timeout(id);
                    }
                }),
            )
        });

        {
            let mut trackers = self.trackers.borrow_mut();
            let entry = &mut trackers[id];
            entry.subscription = Some(subscription);
            entry.timer = timer;
            if let Some(parent) = parent.and_then(|parent| trackers.get_mut(parent)) {
                parent.children.push(id);
            }
        }

        debug!(serial, parent = ?parent, root = ?root, "tracker subscribed");
        Ok(id)
    }

    /// Give every shadow root reachable from `scans` a tracker of its own, walking the new shadow
    /// trees as well. Content already inside a newly covered shadow tree is reported right away.
    fn cover_shadow_trees(
        self: &Rc<Self>,
        registration: &Rc<Registration<H>>,
        mut scans: Vec<ShadowScan<H::Node>>,
    ) {
        scans.reverse();

        while let Some(ShadowScan {
            owner,
            node,
            descend,
        }) = scans.pop()
        {
            // A report below may have terminated the registration.
            if !self.is_alive(owner) {
                continue;
            }

            if let Some(shadow) = self.host.shadow_root(&node) {
                if !self.is_watched(registration, &shadow) {
                    match self.spawn(shadow.clone(), Some(owner), registration) {
                        Ok(child) => {
                            let existing = self.host.children(&shadow);
                            self.report(child, registration, existing);
                            scans.push(ShadowScan {
                                owner: child,
                                node: shadow,
                                descend: true,
                            });
                        }
                        Err(err) => warn!("failed to watch shadow root of {node:?}: {err}"),
                    }
                }
            }

            if descend {
                let children = self.host.children(&node);
                scans.extend(children.into_iter().rev().map(|node| ShadowScan {
                    owner,
                    node,
                    descend: true,
                }));
            }
        }
    }

    fn is_watched(&self, registration: &Rc<Registration<H>>, root: &H::Node) -> bool {
        self.trackers
            .borrow()
            .values()
            .any(|entry| Rc::ptr_eq(&entry.registration, registration) && entry.root == *root)
    }

    fn evaluate(self: &Rc<Self>, id: TrackerId, records: Vec<MutationRecord<H::Node>>) {
        let (serial, registration) = match self.trackers.borrow().get(id) {
            Some(entry) => (entry.serial, entry.registration.clone()),
            None => return,
        };

        trace!(serial, records = records.len(), "evaluating batch: {records:?}");
        let _guard = EvaluationGuard::new(self);

        let candidates = records
            .iter()
            .filter(|record| record.kind == RecordKind::ChildList)
            .flat_map(|record| record.added_nodes.iter().cloned())
            .collect();
        self.report(id, &registration, candidates);

        if !self.is_alive(id) {
            return;
        }

        let mut scans = Vec::new();
        for record in &records {
            let added = record.added_nodes.iter().map(|node| (node, true));
            let removed = record.removed_nodes.iter().map(|node| (node, false));
            let target = std::iter::once((&record.target, false));
            scans.extend(added.chain(removed).chain(target).map(|(node, descend)| {
                ShadowScan {
                    owner: id,
                    node: node.clone(),
                    descend,
                }
            }));
        }
        self.cover_shadow_trees(&registration, scans);
    }

    /// Hand matching candidates to the callback according to the registration's mode.
    fn report(
        self: &Rc<Self>,
        id: TrackerId,
        registration: &Rc<Registration<H>>,
        candidates: Vec<H::Node>,
    ) {
        for candidate in candidates {
            if !self.is_alive(id) {
                return;
            }

            let Some(found) = self.host.find_match(&candidate, &registration.selector) else {
                continue;
            };

            match registration.mode {
                Mode::Once => {
                    if registration.fired.replace(true) {
                        return;
                    }
                    self.invoke(registration, found);
                    let top = self.top_of(id);
                    self.terminate(top, Termination::Matched);
                    return;
                }
                Mode::Repeatedly => {
                    if registration.mark_reported(&found) {
                        self.invoke(registration, found);
                    }
                }
            }
        }
    }

    fn invoke(&self, registration: &Registration<H>, node: H::Node) {
        debug!(selector = %registration.selector, "invoking callback for {node:?}");
        if let Err(err) = callback::invoke(&registration.callback, node) {
            error!(selector = %registration.selector, "appearance callback failed: {err}");
        }
    }

    fn on_timeout(self: &Rc<Self>, id: TrackerId) {
        let fired = match self.trackers.borrow_mut().get_mut(id) {
            Some(entry) => entry.timer.take(),
            None => return,
        };
        drop(fired);

        if self.evaluating.get() > 0 {
            trace!("deferring timeout until the current evaluation finishes");
            self.deferred_timeouts.borrow_mut().push(id);
            return;
        }

        debug!("tracker timed out before a match");
        self.terminate(id, Termination::TimedOut);
    }

    fn apply_deferred_timeouts(self: &Rc<Self>) {
        let deferred = std::mem::take(&mut *self.deferred_timeouts.borrow_mut());
        for id in deferred {
            self.terminate(id, Termination::TimedOut);
        }
    }

    /// Terminate `id` and everything beneath it. Unknown or already terminated ids are ignored.
    pub(crate) fn terminate(&self, id: TrackerId, reason: Termination) {
        let removed = {
            let mut trackers = self.trackers.borrow_mut();
            let Some(parent) = trackers.get(id).map(|entry| entry.parent) else {
                return;
            };
            if let Some(parent) = parent.and_then(|parent| trackers.get_mut(parent)) {
                parent.children.retain(|child| *child != id);
            }

            let mut removed = Vec::new();
            let mut stack = vec![id];
            while let Some(next) = stack.pop() {
                if let Some(entry) = trackers.remove(next) {
                    stack.extend(entry.children.iter().copied());
                    removed.push(entry);
                }
            }
            removed
        };

        // The arena is released before calling back into the host.
        for mut entry in removed {
            entry.status.set(Some(reason));
            if let Some(mut subscription) = entry.subscription.take() {
                subscription.disconnect();
            }
            if let Some(mut timer) = entry.timer.take() {
                timer.cancel();
            }
            debug!(serial = entry.serial, ?reason, "tracker terminated");
        }
    }

    fn teardown(&self) {
        self.shut_down.set(true);
        let tops: Vec<TrackerId> = self
            .trackers
            .borrow()
            .iter()
            .filter(|(_, entry)| entry.parent.is_none())
            .map(|(id, _)| id)
            .collect();
        for id in tops {
            self.terminate(id, Termination::Disconnected);
        }
    }

    fn is_alive(&self, id: TrackerId) -> bool {
        self.trackers.borrow().contains_key(id)
    }

    fn top_of(&self, mut id: TrackerId) -> TrackerId {
        let trackers = self.trackers.borrow();
        while let Some(parent) = trackers.get(id).and_then(|entry| entry.parent) {
            id = parent;
        }
        id
    }
}
