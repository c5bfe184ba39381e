//! Appear: get told when an element matching a selector shows up in a live tree
//!
//! ## Overview
//! ------------
//! A page script often needs to act on an element that does not exist yet: a comments section rendered
//! lazily, a player injected by a framework, a widget that lives inside some component's shadow root.
//! This crate lets you register a CSS selector with a callback and a root. Every batch of child-list
//! changes under the root is checked, and the callback receives the first matching node inside each
//! inserted subtree.
//!
//! Shadow trees are not visible to a mutation subscription on the outer document, so every open shadow
//! root under the watched root gets a tracker of its own. Those trackers are owned by the one created
//! for the registration and die with it.
//!
//! ## Hosts
//! --------
//! The runtime never touches a real DOM directly. It talks to a [`Host`]: something that can read the
//! tree, deliver batched change notifications, and run deferred callbacks. `appear-web` implements it on
//! top of `web-sys`; [`MemoryDom`] implements it in memory with a virtual clock.
//!
//! ```rust
//! use appear_core::{MemoryDom, TrackOptions, TrackerRuntime};
//!
//! let dom = MemoryDom::new();
//! let runtime = TrackerRuntime::new(dom.clone());
//!
//! let handle = runtime
//!     .track_with(TrackOptions::new("ytd-comments").timeout_ms(10_000), |node| {
//!         println!("comments are here: {node:?}");
//!     })
//!     .unwrap();
//!
//! dom.append_child(dom.body(), dom.create_element("ytd-comments"));
//! dom.flush();
//! assert!(handle.is_terminated());
//! ```

mod callback;
mod error;
mod host;
mod memory;
mod options;
mod runtime;
mod selector;
mod tracker;

pub use crate::error::{CallbackError, Result, SelectorError, TrackError};
pub use crate::host::{
    BatchHandler, Dom, Host, MutationRecord, MutationSource, NodeKind, NodeSet, ObserveOptions,
    RecordKind, Subscription, Timer, TimerSource,
};
pub use crate::memory::{MemoryDom, MemorySubscription, MemoryTimer, NodeId};
pub use crate::options::{Mode, TrackOptions};
pub use crate::runtime::TrackerRuntime;
pub use crate::selector::Selector;
pub use crate::tracker::{Termination, TrackerHandle, TrackerId};

pub mod prelude {
    pub use crate::{Mode, TrackOptions, TrackerHandle, TrackerRuntime};
}
