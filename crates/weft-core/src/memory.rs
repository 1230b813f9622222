use std::cell::{Cell, RefCell};
use std::collections::HashSet;
use std::fmt::Write as _;

use slotmap::SlotMap;
use smallvec::SmallVec;

use crate::dom::{Dom, DomEvent, ListenerId, Listener, NodeId, NodeKind};
use crate::html::{escape_attr, escape_text, is_void_element};
use crate::value::Value;

type Attrs = SmallVec<[(String, String); 4]>;

struct NodeData {
    kind: NodeKind,
    text: String,
    attrs: Attrs,
    props: Vec<(String, Value)>,
    parent: Option<NodeId>,
    children: Vec<NodeId>,
}

impl NodeData {
    fn new(kind: NodeKind) -> Self {
        Self {
            kind,
            text: String::new(),
            attrs: SmallVec::new(),
            props: Vec::new(),
            parent: None,
            children: Vec::new(),
        }
    }
}

struct ListenerEntry {
    node: NodeId,
    event: String,
    listener: Listener,
}

/// Counts of structural writes since creation (or the last reset).
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct MutationCounts {
    pub created: usize,
    pub inserted: usize,
    pub removed: usize,
    pub attributes: usize,
    pub texts: usize,
}

/// Arena-backed DOM for headless rendering and tests.
///
/// Detached nodes stay in the arena, so a removed node keeps its identity
/// and can still be inspected after a patch. The arena only shrinks through
/// [`collect`](Self::collect); long-running hosts should call it between
/// flushes.
#[derive(Default)]
pub struct MemoryDom {
    nodes: RefCell<SlotMap<NodeId, NodeData>>,
    listeners: RefCell<SlotMap<ListenerId, ListenerEntry>>,
    counts: Cell<MutationCounts>,
}

impl MemoryDom {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn mutations(&self) -> MutationCounts {
        self.counts.get()
    }

    pub fn reset_mutations(&self) {
        self.counts.set(MutationCounts::default());
    }

    fn count(&self, f: impl FnOnce(&mut MutationCounts)) {
        let mut c = self.counts.get();
        f(&mut c);
        self.counts.set(c);
    }

    pub fn node_count(&self) -> usize {
        self.nodes.borrow().len()
    }

    /// Frees every node outside the trees rooted at `roots`, together with
    /// its listeners. Returns the number of nodes dropped; their handles read
    /// as absent afterwards.
    pub fn collect(&self, roots: &[NodeId]) -> usize {
        let mut keep = HashSet::new();
        let mut stack = roots.to_vec();
        while let Some(node) = stack.pop() {
            if keep.insert(node) {
                stack.extend(self.children(node));
            }
        }
        let dropped = {
            let mut nodes = self.nodes.borrow_mut();
            let before = nodes.len();
            nodes.retain(|id, data| {
                if !keep.contains(&id) {
                    return false;
                }
                if data.parent.is_some_and(|p| !keep.contains(&p)) {
                    data.parent = None;
                }
                true
            });
            before - nodes.len()
        };
        self.listeners
            .borrow_mut()
            .retain(|_, l| keep.contains(&l.node));
        log::trace!("collected {dropped} detached node(s)");
        dropped
    }

    pub fn listener_count(&self) -> usize {
        self.listeners.borrow().len()
    }

    pub fn property(&self, node: NodeId, name: &str) -> Option<Value> {
        let nodes = self.nodes.borrow();
        let data = nodes.get(node)?;
        data.props
            .iter()
            .find(|(k, _)| k == name)
            .map(|(_, v)| v.clone())
    }

    /// Depth-first search for the first element with `tag`.
    pub fn find_tag(&self, root: NodeId, tag: &str) -> Option<NodeId> {
        self.find_all_tags(root, tag).into_iter().next()
    }

    pub fn find_all_tags(&self, root: NodeId, tag: &str) -> Vec<NodeId> {
        let mut out = Vec::new();
        let mut stack: Vec<NodeId> = self.children(root).into_iter().rev().collect();
        while let Some(n) = stack.pop() {
            if self.tag(n).as_deref() == Some(tag) {
                out.push(n);
            }
            stack.extend(self.children(n).into_iter().rev());
        }
        out
    }

    /// Concatenated text of every descendant text node.
    pub fn text_content(&self, node: NodeId) -> String {
        let mut out = String::new();
        self.collect_text(node, &mut out);
        out
    }

    fn collect_text(&self, node: NodeId, out: &mut String) {
        match self.kind(node) {
            Some(NodeKind::Text) => out.push_str(&self.text(node).unwrap_or_default()),
            Some(NodeKind::Element(_)) => {
                for child in self.children(node) {
                    self.collect_text(child, out);
                }
            }
            None => {}
        }
    }

    pub fn inner_html(&self, node: NodeId) -> String {
        let mut out = String::new();
        for child in self.children(node) {
            self.write_node(child, &mut out);
        }
        out
    }

    pub fn outer_html(&self, node: NodeId) -> String {
        let mut out = String::new();
        self.write_node(node, &mut out);
        out
    }

    fn write_node(&self, node: NodeId, out: &mut String) {
        match self.kind(node) {
            Some(NodeKind::Text) => out.push_str(&escape_text(&self.text(node).unwrap_or_default())),
            Some(NodeKind::Element(tag)) => {
                out.push('<');
                out.push_str(&tag);
                for (name, value) in self.attributes(node) {
                    if value.is_empty() {
                        let _ = write!(out, " {name}");
                    } else {
                        let _ = write!(out, " {name}=\"{}\"", escape_attr(&value));
                    }
                }
                out.push('>');
                if is_void_element(&tag) {
                    return;
                }
                for child in self.children(node) {
                    self.write_node(child, out);
                }
                let _ = write!(out, "</{tag}>");
            }
            None => {}
        }
    }

    fn detach(nodes: &mut SlotMap<NodeId, NodeData>, node: NodeId) -> bool {
        let Some(parent) = nodes.get_mut(node).and_then(|n| n.parent.take()) else {
            return false;
        };
        if let Some(p) = nodes.get_mut(parent) {
            p.children.retain(|c| *c != node);
        }
        true
    }
}

impl Dom for MemoryDom {
    fn create_element(&self, tag: &str) -> NodeId {
        self.count(|c| c.created += 1);
        self.nodes
            .borrow_mut()
            .insert(NodeData::new(NodeKind::Element(tag.to_ascii_lowercase())))
    }

    fn create_text(&self, text: &str) -> NodeId {
        self.count(|c| c.created += 1);
        let mut data = NodeData::new(NodeKind::Text);
        data.text = text.to_string();
        self.nodes.borrow_mut().insert(data)
    }

    fn kind(&self, node: NodeId) -> Option<NodeKind> {
        self.nodes.borrow().get(node).map(|n| n.kind.clone())
    }

    fn text(&self, node: NodeId) -> Option<String> {
        let nodes = self.nodes.borrow();
        let data = nodes.get(node)?;
        match data.kind {
            NodeKind::Text => Some(data.text.clone()),
            NodeKind::Element(_) => None,
        }
    }

    fn set_text(&self, node: NodeId, text: &str) {
        if let Some(data) = self.nodes.borrow_mut().get_mut(node) {
            data.text = text.to_string();
            self.count(|c| c.texts += 1);
        }
    }

    fn attributes(&self, node: NodeId) -> Vec<(String, String)> {
        self.nodes
            .borrow()
            .get(node)
            .map(|n| n.attrs.to_vec())
            .unwrap_or_default()
    }

    fn attribute(&self, node: NodeId, name: &str) -> Option<String> {
        let nodes = self.nodes.borrow();
        nodes
            .get(node)?
            .attrs
            .iter()
            .find(|(k, _)| k == name)
            .map(|(_, v)| v.clone())
    }

    fn set_attribute(&self, node: NodeId, name: &str, value: &str) {
        let mut nodes = self.nodes.borrow_mut();
        let Some(data) = nodes.get_mut(node) else {
            return;
        };
        match data.attrs.iter_mut().find(|(k, _)| k == name) {
            Some((_, v)) => *v = value.to_string(),
            None => data.attrs.push((name.to_string(), value.to_string())),
        }
        self.count(|c| c.attributes += 1);
    }

    fn remove_attribute(&self, node: NodeId, name: &str) {
        let mut nodes = self.nodes.borrow_mut();
        if let Some(data) = nodes.get_mut(node) {
            let before = data.attrs.len();
            data.attrs.retain(|(k, _)| k != name);
            if data.attrs.len() != before {
                self.count(|c| c.attributes += 1);
            }
        }
    }

    fn set_property(&self, node: NodeId, name: &str, value: &Value) {
        let mut nodes = self.nodes.borrow_mut();
        if let Some(data) = nodes.get_mut(node) {
            match data.props.iter_mut().find(|(k, _)| k == name) {
                Some((_, v)) => *v = value.clone(),
                None => data.props.push((name.to_string(), value.clone())),
            }
        }
    }

    fn children(&self, node: NodeId) -> Vec<NodeId> {
        self.nodes
            .borrow()
            .get(node)
            .map(|n| n.children.clone())
            .unwrap_or_default()
    }

    fn parent(&self, node: NodeId) -> Option<NodeId> {
        self.nodes.borrow().get(node).and_then(|n| n.parent)
    }

    fn next_sibling(&self, node: NodeId) -> Option<NodeId> {
        let nodes = self.nodes.borrow();
        let parent = nodes.get(node)?.parent?;
        let siblings = &nodes.get(parent)?.children;
        let idx = siblings.iter().position(|c| *c == node)?;
        siblings.get(idx + 1).copied()
    }

    fn insert_before(&self, parent: NodeId, child: NodeId, reference: Option<NodeId>) {
        let mut nodes = self.nodes.borrow_mut();
        if !nodes.contains_key(parent) || !nodes.contains_key(child) {
            log::warn!("insert_before: unknown node");
            return;
        }
        Self::detach(&mut nodes, child);
        let Some(p) = nodes.get_mut(parent) else {
            return;
        };
        let idx = reference
            .and_then(|r| p.children.iter().position(|c| *c == r))
            .unwrap_or(p.children.len());
        p.children.insert(idx, child);
        if let Some(c) = nodes.get_mut(child) {
            c.parent = Some(parent);
        }
        self.count(|c| c.inserted += 1);
    }

    fn remove(&self, node: NodeId) {
        if Self::detach(&mut self.nodes.borrow_mut(), node) {
            self.count(|c| c.removed += 1);
        }
    }

    fn add_listener(&self, node: NodeId, event: &str, listener: Listener) -> ListenerId {
        self.listeners.borrow_mut().insert(ListenerEntry {
            node,
            event: event.to_string(),
            listener,
        })
    }

    fn remove_listener(&self, id: ListenerId) {
        self.listeners.borrow_mut().remove(id);
    }

    fn dispatch(&self, target: NodeId, event: &DomEvent) {
        let mut path = Vec::new();
        let mut cur = Some(target);
        while let Some(n) = cur {
            path.push(n);
            cur = self.parent(n);
        }
        for node in path {
            // snapshot so listeners may add/remove listeners while running
            let batch: Vec<Listener> = self
                .listeners
                .borrow()
                .values()
                .filter(|l| l.node == node && l.event == event.name)
                .map(|l| l.listener.clone())
                .collect();
            for listener in batch {
                listener(event);
            }
        }
    }
}
