//! Browser backend (wasm32, `web` feature): a [`Dom`] over `web_sys` nodes and
//! a spawner that runs render flushes as microtasks.

use std::cell::RefCell;
use std::collections::HashMap;
use std::rc::Rc;

use futures::task::{LocalFutureObj, LocalSpawn, SpawnError};
use slotmap::{Key, KeyData, SlotMap};
use wasm_bindgen::JsCast;
use wasm_bindgen::prelude::*;

use crate::dom::{Dom, DomEvent, Listener, ListenerId, NodeId, NodeKind};
use crate::value::Value;

const ID_PROPERTY: &str = "__weftId";

/// Installs the panic hook and routes `log` to the browser console.
pub fn init_logging(level: log::Level) {
    std::panic::set_hook(Box::new(console_error_panic_hook::hook));
    let _ = console_log::init_with_level(level);
}

/// Spawns onto the microtask queue, so a flush runs once the current
/// synchronous task has finished writing.
#[derive(Clone, Copy, Debug, Default)]
pub struct MicrotaskSpawner;

impl LocalSpawn for MicrotaskSpawner {
    fn spawn_local_obj(&self, future: LocalFutureObj<'static, ()>) -> Result<(), SpawnError> {
        wasm_bindgen_futures::spawn_local(future);
        Ok(())
    }
}

#[derive(Default)]
struct Nodes {
    nodes: RefCell<SlotMap<NodeId, web_sys::Node>>,
}

impl Nodes {
    /// The handle of `node`, registering it on first sight.
    fn id_of(&self, node: &web_sys::Node) -> NodeId {
        let stored = js_sys::Reflect::get(node, &JsValue::from_str(ID_PROPERTY))
            .ok()
            .and_then(|v| v.as_string())
            .and_then(|s| s.parse::<u64>().ok())
            .map(|ffi| NodeId::from(KeyData::from_ffi(ffi)));
        if let Some(id) = stored
            && self.nodes.borrow().contains_key(id)
        {
            return id;
        }
        let id = self.nodes.borrow_mut().insert(node.clone());
        let tag = JsValue::from_str(&id.data().as_ffi().to_string());
        if js_sys::Reflect::set(node, &JsValue::from_str(ID_PROPERTY), &tag).is_err() {
            log::warn!("could not tag node {id:?}");
        }
        id
    }

    fn get(&self, id: NodeId) -> Option<web_sys::Node> {
        self.nodes.borrow().get(id).cloned()
    }
}

struct WebListener {
    node: web_sys::Node,
    event: String,
    closure: Closure<dyn FnMut(web_sys::Event)>,
}

pub struct WebDom {
    document: web_sys::Document,
    nodes: Rc<Nodes>,
    listeners: RefCell<SlotMap<ListenerId, WebListener>>,
    properties: RefCell<HashMap<(NodeId, String), Value>>,
    /// Details of events currently being dispatched from Rust, innermost last.
    in_flight: Rc<RefCell<Vec<Value>>>,
}

impl WebDom {
    pub fn new() -> Option<Self> {
        let document = web_sys::window()?.document()?;
        Some(Self {
            document,
            nodes: Rc::new(Nodes::default()),
            listeners: RefCell::new(SlotMap::with_key()),
            properties: RefCell::new(HashMap::new()),
            in_flight: Rc::new(RefCell::new(Vec::new())),
        })
    }

    /// Hands out a handle for a node created outside the runtime, such as
    /// the mount container.
    pub fn adopt(&self, node: &web_sys::Node) -> NodeId {
        self.nodes.id_of(node)
    }

    pub fn body(&self) -> Option<NodeId> {
        let body: web_sys::Node = self.document.body()?.into();
        Some(self.adopt(&body))
    }

    pub fn element_by_id(&self, id: &str) -> Option<NodeId> {
        let el: web_sys::Node = self.document.get_element_by_id(id)?.into();
        Some(self.adopt(&el))
    }

    pub fn node(&self, id: NodeId) -> Option<web_sys::Node> {
        self.nodes.get(id)
    }

    pub fn property(&self, node: NodeId, name: &str) -> Option<Value> {
        self.properties
            .borrow()
            .get(&(node, name.to_string()))
            .cloned()
    }

    fn element(&self, id: NodeId) -> Option<web_sys::Element> {
        self.nodes.get(id)?.dyn_into::<web_sys::Element>().ok()
    }
}

fn to_js(value: &Value) -> JsValue {
    match value.resolved() {
        Value::Null => JsValue::NULL,
        Value::Bool(b) => JsValue::from_bool(b),
        Value::Number(n) => JsValue::from_f64(n),
        Value::Str(s) => JsValue::from_str(&s),
        Value::List(items) => items.iter().map(to_js).collect::<js_sys::Array>().into(),
        Value::Record(fields) => {
            let obj = js_sys::Object::new();
            for (k, v) in fields.iter() {
                let _ = js_sys::Reflect::set(&obj, &JsValue::from_str(k), &to_js(v));
            }
            obj.into()
        }
        Value::Signal(_) | Value::Handler(_) | Value::Opaque(_) => JsValue::UNDEFINED,
    }
}

fn from_js(value: JsValue) -> Value {
    if value.is_null() || value.is_undefined() {
        Value::Null
    } else if let Some(b) = value.as_bool() {
        Value::Bool(b)
    } else if let Some(n) = value.as_f64() {
        Value::Number(n)
    } else if let Some(s) = value.as_string() {
        Value::from(s)
    } else {
        Value::opaque(value)
    }
}

impl Dom for WebDom {
    fn create_element(&self, tag: &str) -> NodeId {
        match self.document.create_element(tag) {
            Ok(el) => self.nodes.id_of(&el.into()),
            Err(e) => {
                log::error!("create_element({tag}) failed: {e:?}");
                self.create_text("")
            }
        }
    }

    fn create_text(&self, text: &str) -> NodeId {
        let node: web_sys::Node = self.document.create_text_node(text).into();
        self.nodes.id_of(&node)
    }

    fn kind(&self, node: NodeId) -> Option<NodeKind> {
        let node = self.nodes.get(node)?;
        match node.node_type() {
            web_sys::Node::ELEMENT_NODE => {
                let el: &web_sys::Element = node.unchecked_ref();
                Some(NodeKind::Element(el.tag_name().to_ascii_lowercase()))
            }
            web_sys::Node::TEXT_NODE => Some(NodeKind::Text),
            _ => None,
        }
    }

    fn text(&self, node: NodeId) -> Option<String> {
        let node = self.nodes.get(node)?;
        (node.node_type() == web_sys::Node::TEXT_NODE)
            .then(|| node.text_content())
            .flatten()
    }

    fn set_text(&self, node: NodeId, text: &str) {
        if let Some(node) = self.nodes.get(node) {
            node.set_text_content(Some(text));
        }
    }

    fn attributes(&self, node: NodeId) -> Vec<(String, String)> {
        let Some(el) = self.element(node) else {
            return Vec::new();
        };
        el.get_attribute_names()
            .iter()
            .filter_map(|name| name.as_string())
            .map(|name| {
                let value = el.get_attribute(&name).unwrap_or_default();
                (name, value)
            })
            .collect()
    }

    fn attribute(&self, node: NodeId, name: &str) -> Option<String> {
        self.element(node)?.get_attribute(name)
    }

    fn set_attribute(&self, node: NodeId, name: &str, value: &str) {
        if let Some(el) = self.element(node)
            && let Err(e) = el.set_attribute(name, value)
        {
            log::warn!("set_attribute({name}) failed: {e:?}");
        }
    }

    fn remove_attribute(&self, node: NodeId, name: &str) {
        if let Some(el) = self.element(node) {
            let _ = el.remove_attribute(name);
        }
    }

    fn set_property(&self, node: NodeId, name: &str, value: &Value) {
        if let Some(n) = self.nodes.get(node) {
            let _ = js_sys::Reflect::set(&n, &JsValue::from_str(name), &to_js(value));
        }
        self.properties
            .borrow_mut()
            .insert((node, name.to_string()), value.clone());
    }

    fn children(&self, node: NodeId) -> Vec<NodeId> {
        let Some(node) = self.nodes.get(node) else {
            return Vec::new();
        };
        let list = node.child_nodes();
        (0..list.length())
            .filter_map(|i| list.get(i))
            .map(|child| self.nodes.id_of(&child))
            .collect()
    }

    fn parent(&self, node: NodeId) -> Option<NodeId> {
        let parent = self.nodes.get(node)?.parent_node()?;
        Some(self.nodes.id_of(&parent))
    }

    fn next_sibling(&self, node: NodeId) -> Option<NodeId> {
        let next = self.nodes.get(node)?.next_sibling()?;
        Some(self.nodes.id_of(&next))
    }

    fn insert_before(&self, parent: NodeId, child: NodeId, reference: Option<NodeId>) {
        let (Some(parent), Some(child)) = (self.nodes.get(parent), self.nodes.get(child)) else {
            return;
        };
        let reference = reference.and_then(|r| self.nodes.get(r));
        if let Err(e) = parent.insert_before(&child, reference.as_ref()) {
            log::warn!("insert_before failed: {e:?}");
        }
    }

    fn remove(&self, node: NodeId) {
        if let Some(node) = self.nodes.get(node)
            && let Some(parent) = node.parent_node()
        {
            let _ = parent.remove_child(&node);
        }
    }

    fn add_listener(&self, node: NodeId, event: &str, listener: Listener) -> ListenerId {
        let Some(target_node) = self.nodes.get(node) else {
            log::warn!("add_listener on unknown node {node:?}");
            return ListenerId::null();
        };
        let nodes = self.nodes.clone();
        let in_flight = self.in_flight.clone();
        let name = event.to_string();
        let closure = Closure::<dyn FnMut(web_sys::Event)>::new(move |ev: web_sys::Event| {
            let target = ev
                .target()
                .and_then(|t| t.dyn_into::<web_sys::Node>().ok())
                .map(|n| nodes.id_of(&n))
                .unwrap_or(node);
            let detail = match ev.dyn_ref::<web_sys::CustomEvent>() {
                Some(custom) => in_flight
                    .borrow()
                    .last()
                    .cloned()
                    .unwrap_or_else(|| from_js(custom.detail())),
                None => Value::opaque(ev.clone()),
            };
            listener(&DomEvent::new(name.clone(), target).with_detail(detail));
        });
        if let Err(e) =
            target_node.add_event_listener_with_callback(event, closure.as_ref().unchecked_ref())
        {
            log::warn!("add_event_listener({event}) failed: {e:?}");
        }
        self.listeners.borrow_mut().insert(WebListener {
            node: target_node,
            event: event.to_string(),
            closure,
        })
    }

    fn remove_listener(&self, id: ListenerId) {
        let Some(l) = self.listeners.borrow_mut().remove(id) else {
            return;
        };
        let _ = l
            .node
            .remove_event_listener_with_callback(&l.event, l.closure.as_ref().unchecked_ref());
    }

    fn dispatch(&self, target: NodeId, event: &DomEvent) {
        let Some(node) = self.nodes.get(target) else {
            return;
        };
        let init = web_sys::CustomEventInit::new();
        init.set_bubbles(true);
        init.set_detail(&to_js(&event.detail));
        let ev = match web_sys::CustomEvent::new_with_event_init_dict(&event.name, &init) {
            Ok(ev) => ev,
            Err(e) => {
                log::warn!("cannot create event '{}': {e:?}", event.name);
                return;
            }
        };
        self.in_flight.borrow_mut().push(event.detail.clone());
        let _ = node.dispatch_event(&ev);
        self.in_flight.borrow_mut().pop();
    }
}
