//! Coverage of shadow trees, which a subscription on the outer tree never sees into.

use std::cell::RefCell;
use std::rc::Rc;

use appear_core::{MemoryDom, NodeId, Termination, TrackOptions, TrackerRuntime};
use appear_logger::LoggerConfig;
use pretty_assertions::assert_eq;
use tracing::Level;

fn init_logging() {
    let _ = appear_logger::init(LoggerConfig::new().level(Level::TRACE).test_writer(true));
}

fn recorder() -> (Rc<RefCell<Vec<NodeId>>>, impl Fn(NodeId) + 'static) {
    let calls = Rc::new(RefCell::new(Vec::new()));
    let sink = calls.clone();
    (calls, move |node| sink.borrow_mut().push(node))
}

fn element_with_id(dom: &MemoryDom, id: &str) -> NodeId {
    let node = dom.create_element("div");
    dom.set_attribute(node, "id", id);
    node
}

#[test]
fn detects_elements_inside_a_pre_existing_shadow_root() {
    init_logging();
    let dom = MemoryDom::new();
    let host = dom.create_element("div");
    let shadow = dom.attach_shadow(host);
    dom.append_child(dom.body(), host);
    dom.flush();

    let runtime = TrackerRuntime::new(dom.clone());
    let (calls, callback) = recorder();
    let handle = runtime.track("#testElement", callback).unwrap();
    assert_eq!(runtime.live_trackers(), 2);

    let element = element_with_id(&dom, "testElement");
    dom.append_child(shadow, element);
    dom.flush();

    assert_eq!(*calls.borrow(), vec![element]);
    assert_eq!(handle.termination(), Some(Termination::Matched));
    assert_eq!(runtime.live_trackers(), 0);
    assert_eq!(dom.observer_count(), 0);
}

#[test]
fn covers_shadow_hosts_inserted_later() {
    init_logging();
    let dom = MemoryDom::new();
    let runtime = TrackerRuntime::new(dom.clone());
    let (calls, callback) = recorder();
    runtime.track("video.player", callback).unwrap();

    // A host whose shadow tree holds a second, nested host.
    let outer = dom.create_element("my-app");
    let outer_shadow = dom.attach_shadow(outer);
    let inner = dom.create_element("my-player");
    let inner_shadow = dom.attach_shadow(inner);
    dom.append_child(outer_shadow, inner);

    let wrapper = dom.create_element("div");
    dom.append_child(wrapper, outer);
    dom.append_child(dom.body(), wrapper);
    dom.flush();
    assert_eq!(runtime.live_trackers(), 3);
    assert!(calls.borrow().is_empty());

    let video = dom.create_element("video");
    dom.set_attribute(video, "class", "player");
    dom.append_child(inner_shadow, video);
    dom.flush();

    assert_eq!(*calls.borrow(), vec![video]);
    assert_eq!(runtime.live_trackers(), 0);
}

#[test]
fn shadow_roots_attached_to_existing_hosts_are_found_through_later_records() {
    init_logging();
    let dom = MemoryDom::new();
    let host = dom.create_element("section");
    dom.append_child(dom.body(), host);

    let runtime = TrackerRuntime::new(dom.clone());
    let (calls, callback) = recorder();
    runtime.track("#late", callback).unwrap();

    // Attaching a shadow root is silent. The next child-list change on the host reveals it.
    let shadow = dom.attach_shadow(host);
    dom.append_child(host, dom.create_element("span"));
    dom.flush();
    assert_eq!(runtime.live_trackers(), 2);

    let late = element_with_id(&dom, "late");
    dom.append_child(shadow, late);
    dom.flush();

    assert_eq!(*calls.borrow(), vec![late]);
}

#[test]
fn a_shadow_root_is_watched_once_per_registration() {
    init_logging();
    let dom = MemoryDom::new();
    let host = dom.create_element("div");
    dom.attach_shadow(host);

    let runtime = TrackerRuntime::new(dom.clone());
    let (_calls, callback) = recorder();
    runtime
        .track_with(TrackOptions::new("#never").repeatedly(), callback)
        .unwrap();
    let (_other_calls, other) = recorder();
    runtime.track("#never", other).unwrap();

    dom.append_child(dom.body(), host);
    dom.flush();
    dom.remove(host);
    dom.append_child(dom.body(), host);
    dom.flush();

    // Two registrations, each with its own top-level tracker and one shadow tracker.
    assert_eq!(runtime.live_trackers(), 4);
}

#[test]
fn terminating_the_top_tracker_cascades() {
    init_logging();
    let dom = MemoryDom::new();
    let host = dom.create_element("div");
    let shadow = dom.attach_shadow(host);
    let nested = dom.create_element("div");
    dom.attach_shadow(nested);
    dom.append_child(shadow, nested);
    dom.append_child(dom.body(), host);

    let runtime = TrackerRuntime::new(dom.clone());
    let (calls, callback) = recorder();
    let handle = runtime
        .track_with(TrackOptions::new("#x").repeatedly(), callback)
        .unwrap();
    assert_eq!(runtime.live_trackers(), 3);
    assert_eq!(dom.observer_count(), 3);

    handle.terminate();
    assert_eq!(handle.termination(), Some(Termination::Disconnected));
    assert_eq!(runtime.live_trackers(), 0);
    assert_eq!(dom.observer_count(), 0);

    dom.append_child(shadow, element_with_id(&dom, "x"));
    dom.flush();
    assert!(calls.borrow().is_empty());
}

#[test]
fn repeated_matches_are_reported_from_every_tree() {
    init_logging();
    let dom = MemoryDom::new();
    let host = dom.create_element("div");
    let shadow = dom.attach_shadow(host);
    dom.append_child(dom.body(), host);

    let runtime = TrackerRuntime::new(dom.clone());
    let (calls, callback) = recorder();
    let handle = runtime
        .track_with(TrackOptions::new("button").repeatedly(), callback)
        .unwrap();

    let light = dom.create_element("button");
    let shadowed = dom.create_element("button");
    dom.append_child(dom.body(), light);
    dom.append_child(shadow, shadowed);
    dom.flush();

    let mut reported = calls.borrow().clone();
    reported.sort();
    let mut expected = vec![light, shadowed];
    expected.sort();
    assert_eq!(reported, expected);
    assert!(handle.is_active());
}

#[test]
fn content_already_inside_an_inserted_shadow_tree_is_reported() {
    init_logging();
    let dom = MemoryDom::new();
    let runtime = TrackerRuntime::new(dom.clone());
    let (calls, callback) = recorder();
    let handle = runtime.track("#x", callback).unwrap();

    // A component connected with its shadow tree already rendered.
    let widget = dom.create_element("my-widget");
    let shadow = dom.attach_shadow(widget);
    let inside = element_with_id(&dom, "x");
    dom.append_child(shadow, inside);
    dom.append_child(dom.body(), widget);
    dom.flush();

    assert_eq!(*calls.borrow(), vec![inside]);
    assert_eq!(handle.termination(), Some(Termination::Matched));
    assert_eq!(runtime.live_trackers(), 0);
    assert_eq!(dom.observer_count(), 0);
}

#[test]
fn pre_existing_shadow_content_is_reported_at_registration() {
    init_logging();
    let dom = MemoryDom::new();
    let widget = dom.create_element("my-widget");
    let shadow = dom.attach_shadow(widget);
    let inside = element_with_id(&dom, "x");
    dom.append_child(shadow, inside);
    dom.append_child(dom.body(), widget);
    dom.flush();

    let runtime = TrackerRuntime::new(dom.clone());
    let (calls, callback) = recorder();
    let handle = runtime.track("#x", callback).unwrap();

    assert_eq!(*calls.borrow(), vec![inside]);
    assert_eq!(handle.termination(), Some(Termination::Matched));
    assert_eq!(runtime.live_trackers(), 0);
    assert_eq!(dom.observer_count(), 0);
}

#[test]
fn nested_pre_filled_shadow_trees_report_each_node_once() {
    init_logging();
    let dom = MemoryDom::new();
    let runtime = TrackerRuntime::new(dom.clone());
    let (calls, callback) = recorder();
    let handle = runtime
        .track_with(TrackOptions::new(".hit").repeatedly(), callback)
        .unwrap();

    let outer = dom.create_element("my-app");
    let outer_shadow = dom.attach_shadow(outer);
    let first = dom.create_element("span");
    dom.set_attribute(first, "class", "hit");
    let inner = dom.create_element("my-panel");
    let inner_shadow = dom.attach_shadow(inner);
    let second = dom.create_element("span");
    dom.set_attribute(second, "class", "hit");
    dom.append_child(inner_shadow, second);
    dom.append_child(outer_shadow, first);
    dom.append_child(outer_shadow, inner);

    dom.append_child(dom.body(), outer);
    dom.flush();
    assert_eq!(*calls.borrow(), vec![first, second]);
    assert_eq!(runtime.live_trackers(), 3);

    // Reconnecting the component finds nothing new.
    dom.remove(outer);
    dom.append_child(dom.body(), outer);
    dom.flush();
    assert_eq!(*calls.borrow(), vec![first, second]);
    assert!(handle.is_active());
}

#[test]
fn a_match_in_one_shadow_tree_stops_its_siblings_in_the_same_flush() {
    init_logging();
    let dom = MemoryDom::new();
    let (left, right) = (dom.create_element("div"), dom.create_element("div"));
    let left_shadow = dom.attach_shadow(left);
    let right_shadow = dom.attach_shadow(right);
    dom.append_child(dom.body(), left);
    dom.append_child(dom.body(), right);

    let runtime = TrackerRuntime::new(dom.clone());
    let (calls, callback) = recorder();
    let handle = runtime.track("#x", callback).unwrap();
    assert_eq!(runtime.live_trackers(), 3);

    let (first, second) = (element_with_id(&dom, "x"), element_with_id(&dom, "x"));
    dom.append_child(left_shadow, first);
    dom.append_child(right_shadow, second);
    dom.flush();

    assert_eq!(*calls.borrow(), vec![first]);
    assert_eq!(handle.termination(), Some(Termination::Matched));
    assert_eq!(runtime.live_trackers(), 0);
    assert_eq!(dom.observer_count(), 0);
}

#[test]
fn scan_existing_reports_light_and_shadow_content_once() {
    init_logging();
    let dom = MemoryDom::new();
    let host = dom.create_element("div");
    let shadow = dom.attach_shadow(host);
    let shadowed = dom.create_element("button");
    dom.append_child(shadow, shadowed);
    let light = dom.create_element("button");
    dom.append_child(dom.body(), light);
    dom.append_child(dom.body(), host);

    let runtime = TrackerRuntime::new(dom.clone());
    let (calls, callback) = recorder();
    let handle = runtime
        .track_with(
            TrackOptions::new("button").repeatedly().scan_existing(true),
            callback,
        )
        .unwrap();
    dom.flush();

    assert_eq!(*calls.borrow(), vec![light, shadowed]);
    assert!(handle.is_active());
}
