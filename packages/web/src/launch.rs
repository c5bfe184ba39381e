//! The page-wide runtime: created once by [`init`], torn down by [`teardown`] (typically on unload).

use std::cell::RefCell;
use std::fmt::Display;
use std::rc::Rc;

use appear_core::{TrackError, TrackOptions, TrackerHandle, TrackerRuntime};
use appear_logger::LoggerConfig;
use web_sys::Node;

use crate::{WebConfig, WebError, WebHost};

thread_local! {
    static RUNTIME: RefCell<Option<Rc<TrackerRuntime<WebHost>>>> = const { RefCell::new(None) };
}

/// Create the page runtime, replacing (and tearing down) any previous one.
pub fn init(config: WebConfig) -> Result<(), WebError> {
    if let Some(level) = config.log_level {
        if let Err(err) = appear_logger::init(LoggerConfig::new().level(level)) {
            tracing::debug!("keeping the existing logger: {err}");
        }
    }

    let mut host = WebHost::new()?;
    if let Some(id) = &config.root_id {
        host = host.with_root_id(id)?;
    }

    let previous = RUNTIME.with(|slot| slot.borrow_mut().replace(Rc::new(TrackerRuntime::new(host))));
    if previous.is_some() {
        tracing::warn!("appear was initialised twice; the previous trackers were torn down");
    }
    drop(previous);

    tracing::debug!(root = ?config.root_id, "appear page runtime ready");
    Ok(())
}

/// Terminate every tracker and drop the page runtime. Later registrations fail until [`init`] runs again.
pub fn teardown() {
    let runtime = RUNTIME.with(|slot| slot.borrow_mut().take());
    if let Some(runtime) = runtime {
        runtime.teardown();
    }
}

pub fn is_initialized() -> bool {
    RUNTIME.with(|slot| slot.borrow().is_some())
}

/// Run `f` against the page runtime, or return `None` before [`init`].
///
/// The runtime is not borrowed while `f` runs, so `f` may register further trackers.
pub fn with_runtime<R>(f: impl FnOnce(&TrackerRuntime<WebHost>) -> R) -> Option<R> {
    let runtime = RUNTIME.with(|slot| slot.borrow().clone())?;
    Some(f(&runtime))
}

/// Call `callback` once with the first element matching `selector` that is inserted anywhere under the
/// page root, shadow trees included.
pub fn when_element_appears(
    selector: &str,
    callback: impl Fn(Node) + 'static,
) -> Result<TrackerHandle<WebHost>, TrackError> {
    with_runtime(|runtime| runtime.track(selector, callback))
        .unwrap_or(Err(TrackError::RuntimeShutdown))
}

pub fn track_with(
    options: TrackOptions<Node>,
    callback: impl Fn(Node) + 'static,
) -> Result<TrackerHandle<WebHost>, TrackError> {
    with_runtime(|runtime| runtime.track_with(options, callback))
        .unwrap_or(Err(TrackError::RuntimeShutdown))
}

pub fn try_track_with<E: Display>(
    options: TrackOptions<Node>,
    callback: impl Fn(Node) -> Result<(), E> + 'static,
) -> Result<TrackerHandle<WebHost>, TrackError> {
    with_runtime(|runtime| runtime.try_track_with(options, callback))
        .unwrap_or(Err(TrackError::RuntimeShutdown))
}
