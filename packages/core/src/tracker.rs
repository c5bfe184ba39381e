use std::cell::{Cell, RefCell};
use std::fmt;
use std::rc::{Rc, Weak};
use std::time::Duration;

use crate::callback::Callback;
use crate::host::{Dom, Host, NodeSet};
use crate::options::Mode;
use crate::runtime::RuntimeInner;

slotmap::new_key_type! {
    /// A generational key into a runtime's tracker arena.
    ///
    /// A handle to a terminated tracker can never address a tracker created later in the same slot.
    pub struct TrackerId;
}

/// Why a tracker stopped.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Termination {
    /// The callback fired in [`Mode::Once`].
    Matched,

    /// The timeout elapsed first.
    TimedOut,

    /// `terminate()` was called, or the runtime was torn down.
    Disconnected,
}

/// `None` while the tracker is active.
pub(crate) type Status = Rc<Cell<Option<Termination>>>;

/// State shared by every tracker created for one registration: the top-level tracker and all the
/// shadow-tree trackers beneath it.
pub(crate) struct Registration<D: Dom> {
    pub(crate) selector: D::Selector,
    pub(crate) callback: Callback<D::Node>,
    pub(crate) mode: Mode,
    pub(crate) timeout: Option<Duration>,

    /// Set before the single invocation in [`Mode::Once`].
    pub(crate) fired: Cell<bool>,

    /// Nodes already handed to the callback in [`Mode::Repeatedly`].
    pub(crate) reported: RefCell<D::Seen>,
}

impl<D: Dom> Registration<D> {
    /// Records `node` as reported, returning `false` if it already was.
    pub(crate) fn mark_reported(&self, node: &D::Node) -> bool {
        self.reported.borrow_mut().insert(node)
    }
}

/// One slot of the arena.
pub(crate) struct TrackerEntry<H: Host> {
    pub(crate) serial: u64,
    pub(crate) root: H::Node,
    pub(crate) parent: Option<TrackerId>,
    pub(crate) children: Vec<TrackerId>,
    pub(crate) registration: Rc<Registration<H>>,
    pub(crate) subscription: Option<H::Subscription>,
    pub(crate) timer: Option<H::Timer>,
    pub(crate) status: Status,
}

/// A handle to a registered tracker.
///
/// Dropping the handle does not stop the tracker; the runtime owns it until it terminates.
pub struct TrackerHandle<H: Host> {
    id: TrackerId,
    serial: u64,
    status: Status,
    runtime: Weak<RuntimeInner<H>>,
}

impl<H: Host> TrackerHandle<H> {
    pub(crate) fn new(
        id: TrackerId,
        serial: u64,
        status: Status,
        runtime: Weak<RuntimeInner<H>>,
    ) -> Self {
        Self {
            id,
            serial,
            status,
            runtime,
        }
    }

    /// Stop the tracker and every shadow-tree tracker it owns. Calling this more than once is a no-op.
    pub fn terminate(&self) {
        if self.is_terminated() {
            return;
        }
        if let Some(runtime) = self.runtime.upgrade() {
            runtime.terminate(self.id, Termination::Disconnected);
        }
    }

    pub fn is_active(&self) -> bool {
        self.status.get().is_none()
    }

    pub fn is_terminated(&self) -> bool {
        !self.is_active()
    }

    /// Why the tracker stopped, or `None` while it is still active.
    pub fn termination(&self) -> Option<Termination> {
        self.status.get()
    }

    pub fn id(&self) -> TrackerId {
        self.id
    }

    /// A process-unique number for log correlation.
    pub fn serial(&self) -> u64 {
        self.serial
    }
}

impl<H: Host> Clone for TrackerHandle<H> {
    fn clone(&self) -> Self {
        Self {
            id: self.id,
            serial: self.serial,
            status: self.status.clone(),
            runtime: self.runtime.clone(),
        }
    }
}

impl<H: Host> fmt::Debug for TrackerHandle<H> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TrackerHandle")
            .field("id", &self.id)
            .field("serial", &self.serial)
            .field("termination", &self.status.get())
            .finish()
    }
}
