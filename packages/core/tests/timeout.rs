use std::cell::RefCell;
use std::rc::Rc;
use std::time::Duration;

use appear_core::{MemoryDom, NodeId, Termination, TrackOptions, TrackerRuntime};
use pretty_assertions::assert_eq;

const TEST_INTERVAL: Duration = Duration::from_millis(1000);

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
fn a_match_before_the_deadline_cancels_the_timer() {
    let dom = MemoryDom::new();
    let runtime = TrackerRuntime::new(dom.clone());
    let (calls, callback) = recorder();
    let handle = runtime
        .track_with(
            TrackOptions::new("#testElement").timeout(TEST_INTERVAL),
            callback,
        )
        .unwrap();
    assert_eq!(dom.pending_timers(), 1);

    dom.advance(TEST_INTERVAL / 2);
    assert!(calls.borrow().is_empty());

    let element = element_with_id(&dom, "testElement");
    dom.append_child(dom.body(), element);
    dom.flush();

    assert_eq!(*calls.borrow(), vec![element]);
    assert_eq!(handle.termination(), Some(Termination::Matched));
    assert_eq!(dom.pending_timers(), 0);
}

#[test]
fn the_deadline_stops_an_unmatched_tracker() {
    let dom = MemoryDom::new();
    let runtime = TrackerRuntime::new(dom.clone());
    let (calls, callback) = recorder();
    let handle = runtime
        .track_with(TrackOptions::new("#ImpossibleElement").timeout_ms(1000), callback)
        .unwrap();

    dom.advance(TEST_INTERVAL / 2);
    assert!(handle.is_active());

    dom.append_child(dom.body(), element_with_id(&dom, "testElement"));
    dom.advance(TEST_INTERVAL / 2);

    assert!(calls.borrow().is_empty());
    assert_eq!(handle.termination(), Some(Termination::TimedOut));
    assert_eq!(dom.observer_count(), 0);

    // Late matches are ignored.
    dom.append_child(dom.body(), element_with_id(&dom, "ImpossibleElement"));
    dom.flush();
    assert!(calls.borrow().is_empty());
}

#[test]
fn a_zero_timeout_never_fires() {
    let dom = MemoryDom::new();
    let runtime = TrackerRuntime::new(dom.clone());
    let (_calls, callback) = recorder();
    let handle = runtime
        .track_with(TrackOptions::new("#x").timeout(Duration::ZERO), callback)
        .unwrap();

    assert_eq!(dom.pending_timers(), 0);
    dom.advance(Duration::from_secs(3600));
    assert!(handle.is_active());
}

#[test]
fn shadow_trackers_time_out_with_their_owner() {
    let dom = MemoryDom::new();
    let host = dom.create_element("div");
    dom.attach_shadow(host);
    dom.append_child(dom.body(), host);

    let runtime = TrackerRuntime::new(dom.clone());
    let (_calls, callback) = recorder();
    let handle = runtime
        .track_with(TrackOptions::new("#x").timeout(TEST_INTERVAL), callback)
        .unwrap();
    assert_eq!(runtime.live_trackers(), 2);
    assert_eq!(dom.pending_timers(), 2);

    dom.advance(TEST_INTERVAL);

    assert_eq!(handle.termination(), Some(Termination::TimedOut));
    assert_eq!(runtime.live_trackers(), 0);
    assert_eq!(dom.pending_timers(), 0);
    assert_eq!(dom.observer_count(), 0);
}

#[test]
fn a_late_shadow_tracker_keeps_its_own_deadline() {
    let dom = MemoryDom::new();
    let runtime = TrackerRuntime::new(dom.clone());
    let (calls, callback) = recorder();
    let handle = runtime
        .track_with(
            TrackOptions::new("#x").timeout(TEST_INTERVAL).repeatedly(),
            callback,
        )
        .unwrap();

    dom.advance(TEST_INTERVAL / 2);
    let host = dom.create_element("div");
    let shadow = dom.attach_shadow(host);
    dom.append_child(dom.body(), host);
    dom.flush();
    assert_eq!(runtime.live_trackers(), 2);

    // The owner times out and takes the shadow tracker with it.
    dom.advance(TEST_INTERVAL / 2);
    assert_eq!(handle.termination(), Some(Termination::TimedOut));
    assert_eq!(runtime.live_trackers(), 0);
    assert_eq!(dom.pending_timers(), 0);

    dom.append_child(shadow, element_with_id(&dom, "x"));
    dom.flush();
    assert!(calls.borrow().is_empty());
}

#[test]
fn a_timeout_during_evaluation_does_not_drop_the_batch() {
    let dom = MemoryDom::new();
    let runtime = TrackerRuntime::new(dom.clone());
    let calls = Rc::new(RefCell::new(Vec::new()));
    let handle = runtime
        .track_with(TrackOptions::new(".item").timeout(TEST_INTERVAL).repeatedly(), {
            let dom = dom.clone();
            let calls = calls.clone();
            move |node| {
                calls.borrow_mut().push(node);
                // The deadline passes while the first candidate is being handled.
                if calls.borrow().len() == 1 {
                    dom.advance(TEST_INTERVAL);
                }
            }
        })
        .unwrap();

    let (a, b) = (dom.create_element("li"), dom.create_element("li"));
    dom.set_attribute(a, "class", "item");
    dom.set_attribute(b, "class", "item");
    dom.append_child(dom.body(), a);
    dom.append_child(dom.body(), b);
    dom.flush();

    assert_eq!(*calls.borrow(), vec![a, b]);
    assert_eq!(handle.termination(), Some(Termination::TimedOut));
    assert_eq!(dom.observer_count(), 0);
}
