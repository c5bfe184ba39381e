//! [`Host`](appear_core::Host) implementation over the live page.

use std::fmt;
use std::time::Duration;

use appear_core::{
    BatchHandler, Dom, MutationRecord, MutationSource, NodeKind, NodeSet, ObserveOptions,
    SelectorError, Subscription, Timer, TimerSource, TrackError,
};
use gloo_timers::callback::Timeout;
use js_sys::{Array, Object, WeakSet};
use wasm_bindgen::{prelude::Closure, JsCast, JsValue};
use web_sys::{
    Document, DocumentFragment, Element, MutationObserver, MutationObserverInit, Node, NodeList,
    ShadowRoot,
};

use crate::WebError;

/// The browser's document, observed through `MutationObserver` and timed with `setTimeout`.
#[derive(Clone, Debug)]
pub struct WebHost {
    document: Document,
    root: Node,
}

impl WebHost {
    /// A host whose default root is the window's document.
    pub fn new() -> Result<Self, WebError> {
        let document = web_sys::window()
            .ok_or(WebError::NoWindow)?
            .document()
            .ok_or(WebError::NoDocument)?;
        let root = document.clone().into();
        Ok(Self { document, root })
    }

    /// Watch the element with this id instead of the whole document when a registration names no root.
    pub fn with_root_id(mut self, id: &str) -> Result<Self, WebError> {
        let element = self
            .document
            .get_element_by_id(id)
            .ok_or_else(|| WebError::RootNotFound(id.to_string()))?;
        self.root = element.into();
        Ok(self)
    }

    pub fn web_document(&self) -> &Document {
        &self.document
    }
}

/// A selector the page's own engine accepted. Any CSS the browser supports can be used.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct WebSelector(String);

impl WebSelector {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for WebSelector {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Reported nodes, held weakly so nodes the page drops can still be collected.
pub struct WebNodeSet(WeakSet);

impl Default for WebNodeSet {
    fn default() -> Self {
        Self(WeakSet::new())
    }
}

impl NodeSet<Node> for WebNodeSet {
    fn insert(&mut self, node: &Node) -> bool {
        let key: &Object = node.as_ref();
        if self.0.has(key) {
            return false;
        }
        self.0.add(key);
        true
    }
}

impl Dom for WebHost {
    type Node = Node;
    type Selector = WebSelector;
    type Seen = WebNodeSet;

    /// The selector is run once against the document so that syntax errors surface at registration.
    fn compile_selector(&self, source: &str) -> Result<WebSelector, SelectorError> {
        if source.trim().is_empty() {
            return Err(SelectorError::Empty(source.to_string()));
        }
        match self.document.query_selector(source) {
            Ok(_) => Ok(WebSelector(source.trim().to_string())),
            Err(err) => Err(SelectorError::Rejected {
                selector: source.to_string(),
                reason: describe_js_error(&err),
            }),
        }
    }

    fn matches(&self, node: &Node, selector: &WebSelector) -> bool {
        node.dyn_ref::<Element>()
            .is_some_and(|element| element.matches(&selector.0).unwrap_or(false))
    }

    fn find_match(&self, node: &Node, selector: &WebSelector) -> Option<Node> {
        let found = if let Some(element) = node.dyn_ref::<Element>() {
            if element.matches(&selector.0).unwrap_or(false) {
                return Some(node.clone());
            }
            element.query_selector(&selector.0)
        } else if let Some(fragment) = node.dyn_ref::<DocumentFragment>() {
            fragment.query_selector(&selector.0)
        } else {
            return None;
        };
        found.ok().flatten().map(Into::into)
    }

    fn document(&self) -> Node {
        self.root.clone()
    }

    fn kind(&self, node: &Node) -> Option<NodeKind> {
        let kind = match node.node_type() {
            Node::ELEMENT_NODE => NodeKind::Element,
            Node::TEXT_NODE | Node::CDATA_SECTION_NODE => NodeKind::Text,
            Node::COMMENT_NODE | Node::PROCESSING_INSTRUCTION_NODE => NodeKind::Comment,
            Node::DOCUMENT_NODE => NodeKind::Document,
            Node::DOCUMENT_FRAGMENT_NODE if node.dyn_ref::<ShadowRoot>().is_some() => {
                NodeKind::ShadowRoot
            }
            Node::DOCUMENT_FRAGMENT_NODE => NodeKind::Fragment,
            _ => return None,
        };
        Some(kind)
    }

    fn local_name(&self, node: &Node) -> Option<String> {
        node.dyn_ref::<Element>().map(|element| element.local_name())
    }

    fn attribute(&self, node: &Node, name: &str) -> Option<String> {
        node.dyn_ref::<Element>()?.get_attribute(name)
    }

    fn children(&self, node: &Node) -> Vec<Node> {
        collect_nodes(&node.child_nodes())
    }

    fn parent(&self, node: &Node) -> Option<Node> {
        node.parent_node()
    }

    fn shadow_root(&self, node: &Node) -> Option<Node> {
        node.dyn_ref::<Element>()?.shadow_root().map(Into::into)
    }
}

fn describe_js_error(err: &JsValue) -> String {
    err.dyn_ref::<js_sys::Error>()
        .map(|err| String::from(err.message()))
        .unwrap_or_else(|| format!("{err:?}"))
}

fn collect_nodes(list: &NodeList) -> Vec<Node> {
    (0..list.length()).filter_map(|idx| list.get(idx)).collect()
}

fn convert_record(record: web_sys::MutationRecord) -> Option<MutationRecord<Node>> {
    let target = record.target()?;
    match record.type_().as_str() {
        "childList" => Some(MutationRecord::child_list(
            target,
            collect_nodes(&record.added_nodes()),
            collect_nodes(&record.removed_nodes()),
        )),
        "attributes" => Some(MutationRecord::attributes(target)),
        _ => None,
    }
}

type ObserverCallback = Closure<dyn FnMut(Array, MutationObserver)>;

/// A connected `MutationObserver`. Dropping it disconnects the observer.
pub struct WebSubscription {
    observer: MutationObserver,
    connected: bool,
    _callback: ObserverCallback,
}

impl Subscription for WebSubscription {
    fn disconnect(&mut self) {
        if std::mem::take(&mut self.connected) {
            self.observer.disconnect();
        }
    }
}

impl Drop for WebSubscription {
    fn drop(&mut self) {
        self.disconnect();
    }
}

impl MutationSource for WebHost {
    type Subscription = WebSubscription;

    fn observe(
        &self,
        root: &Node,
        options: ObserveOptions,
        mut handler: BatchHandler<Node>,
    ) -> Result<WebSubscription, TrackError> {
        let callback: ObserverCallback =
            Closure::new(move |records: Array, _observer: MutationObserver| {
                let batch = records
                    .iter()
                    .filter_map(|record| record.dyn_into::<web_sys::MutationRecord>().ok())
                    .filter_map(convert_record)
                    .collect();
                handler(batch);
            });

        let observer = MutationObserver::new(callback.as_ref().unchecked_ref())
            .map_err(|err| TrackError::Subscribe(format!("{err:?}")))?;

        let init = MutationObserverInit::new();
        init.set_child_list(options.child_list);
        init.set_subtree(options.subtree);
        init.set_attributes(options.attributes);
        observer
            .observe_with_options(root, &init)
            .map_err(|err| TrackError::Subscribe(format!("{err:?}")))?;

        Ok(WebSubscription {
            observer,
            connected: true,
            _callback: callback,
        })
    }
}

/// A pending `setTimeout`. Dropping it clears the timeout.
pub struct WebTimer {
    timeout: Option<Timeout>,
}

impl Timer for WebTimer {
    fn cancel(&mut self) {
        if let Some(timeout) = self.timeout.take() {
            drop(timeout.cancel());
        }
    }
}

impl TimerSource for WebHost {
    type Timer = WebTimer;

    fn set_timeout(&self, delay: Duration, callback: Box<dyn FnOnce()>) -> WebTimer {
        let millis = u32::try_from(delay.as_millis()).unwrap_or(u32::MAX);
        WebTimer {
            timeout: Some(Timeout::new(millis, callback)),
        }
    }
}
