//! Appear for the browser
//!
//! ## Overview
//! ------------
//! This crate runs the `appear-core` tracker against the live page. [`WebHost`] implements the host
//! traits with `web-sys`: nodes are `web_sys::Node`, change batches come from a `MutationObserver` per
//! tracker, and timeouts are `setTimeout`s through `gloo-timers`.
//!
//! Most userscripts only need the page-wide runtime:
//!
//! ```rust, ignore
//! appear_web::init(WebConfig::new().log_level(tracing::Level::INFO))?;
//!
//! appear_web::track_with(TrackOptions::new("ytd-comments#comments").timeout_ms(10_000), |comments| {
//!     // hide, restyle, or annotate the comments section
//! })?;
//! ```
//!
//! Selectors are compiled and matched by the browser itself (`Element.matches`), so anything the page's
//! CSS engine understands works, `:has(...)` included. A selector the engine rejects fails registration.
//!
//! Shadow roots are covered as long as they are open: the tracker can only see a shadow tree through
//! `Element.shadowRoot`.
//!
//! Panics abort on `wasm32-unknown-unknown`, so a callback that can fail should return an error through
//! [`try_track_with`] rather than panic.

mod cfg;
mod error;
mod host;
mod launch;

pub use crate::cfg::WebConfig;
pub use crate::error::WebError;
pub use crate::host::{WebHost, WebNodeSet, WebSelector, WebSubscription, WebTimer};
pub use crate::launch::{
    init, is_initialized, teardown, track_with, try_track_with, when_element_appears, with_runtime,
};

pub use appear_core::{Mode, Termination, TrackError, TrackOptions, TrackerHandle};
