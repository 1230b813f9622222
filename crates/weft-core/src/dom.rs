//! The DOM surface the runtime patches.
//!
//! Nodes are addressed through opaque [`NodeId`] handles so the differ and the
//! orchestrator never hold backend objects directly. [`MemoryDom`](crate::MemoryDom)
//! is the headless backend; the `web` feature adds a `web_sys` one.

use std::fmt;
use std::rc::Rc;

use slotmap::new_key_type;

use crate::value::Value;

new_key_type! {
    pub struct NodeId;
    pub struct ListenerId;
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum NodeKind {
    Element(String),
    Text,
}

/// An event delivered to listeners.
#[derive(Clone)]
pub struct DomEvent {
    pub name: String,
    pub target: NodeId,
    /// Payload for custom events; backends may also stash the native event
    /// here as [`Value::Opaque`].
    pub detail: Value,
}

impl DomEvent {
    pub fn new(name: impl Into<String>, target: NodeId) -> Self {
        Self {
            name: name.into(),
            target,
            detail: Value::Null,
        }
    }

    pub fn with_detail(mut self, detail: impl Into<Value>) -> Self {
        self.detail = detail.into();
        self
    }
}

impl fmt::Debug for DomEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DomEvent")
            .field("name", &self.name)
            .field("target", &self.target)
            .field("detail", &self.detail)
            .finish()
    }
}

pub type Listener = Rc<dyn Fn(&DomEvent)>;

/// Backend operations. All methods take `&self`: listeners run re-entrantly
/// and may write signals or patch while a dispatch is in flight, so
/// implementations must not hold internal borrows across listener calls.
pub trait Dom {
    fn create_element(&self, tag: &str) -> NodeId;
    fn create_text(&self, text: &str) -> NodeId;

    fn kind(&self, node: NodeId) -> Option<NodeKind>;
    fn text(&self, node: NodeId) -> Option<String>;
    fn set_text(&self, node: NodeId, text: &str);

    fn attributes(&self, node: NodeId) -> Vec<(String, String)>;
    fn attribute(&self, node: NodeId, name: &str) -> Option<String>;
    fn set_attribute(&self, node: NodeId, name: &str, value: &str);
    fn remove_attribute(&self, node: NodeId, name: &str);
    /// Assigns a non-attribute property (the `:prop` binding fallback).
    fn set_property(&self, node: NodeId, name: &str, value: &Value);

    fn children(&self, node: NodeId) -> Vec<NodeId>;
    fn parent(&self, node: NodeId) -> Option<NodeId>;
    fn next_sibling(&self, node: NodeId) -> Option<NodeId>;
    /// Inserts `child` before `reference` (or appends). An attached `child`
    /// is moved, keeping its identity.
    fn insert_before(&self, parent: NodeId, child: NodeId, reference: Option<NodeId>);
    /// Detaches `node` from its parent.
    fn remove(&self, node: NodeId);
    /// Detaches every child of `node`.
    fn clear(&self, node: NodeId) {
        for child in self.children(node) {
            self.remove(child);
        }
    }

    fn add_listener(&self, node: NodeId, event: &str, listener: Listener) -> ListenerId;
    fn remove_listener(&self, id: ListenerId);
    /// Delivers `event` to `target` and bubbles it up through its ancestors.
    fn dispatch(&self, target: NodeId, event: &DomEvent);

    fn tag(&self, node: NodeId) -> Option<String> {
        match self.kind(node)? {
            NodeKind::Element(tag) => Some(tag),
            NodeKind::Text => None,
        }
    }

    /// True when `node` is `root` or one of its descendants.
    fn contains(&self, root: NodeId, node: NodeId) -> bool {
        let mut cur = Some(node);
        while let Some(n) = cur {
            if n == root {
                return true;
            }
            cur = self.parent(n);
        }
        false
    }
}
