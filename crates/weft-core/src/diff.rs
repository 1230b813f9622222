//! Direct DOM diffing.
//!
//! The new markup is parsed into a transient fragment and compared against
//! the live children of the container. Nothing is retained between patches:
//! the live DOM is the only tree.
//!
//! Children are walked with two pointers from both ends first. Whatever is
//! left in the middle is reconciled by key (any position) or, for unkeyed
//! nodes, by position among the unkeyed siblings. Matched nodes that are
//! already in relative order (the longest increasing run of their old
//! indices) stay put; the rest are moved, never recreated.

use std::collections::{HashMap, VecDeque};

use bitflags::bitflags;

use crate::binding::{Binding, BindingKind};
use crate::dom::{Dom, NodeId, NodeKind};
use crate::html::{ParsedNode, parse_fragment};
use crate::runtime::RuntimeOptions;

bitflags! {
    /// Kinds of DOM writes a patch performed.
    #[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
    pub struct Mutations: u8 {
        const CREATE = 1 << 0;
        const REMOVE = 1 << 1;
        const MOVE = 1 << 2;
        const ATTRIBUTE = 1 << 3;
        const TEXT = 1 << 4;
    }
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct PatchStats {
    pub created: usize,
    pub removed: usize,
    pub moved: usize,
    pub attributes: usize,
    pub texts: usize,
    pub kinds: Mutations,
}

impl PatchStats {
    pub fn is_noop(&self) -> bool {
        self.kinds.is_empty()
    }
}

#[derive(Debug, Default)]
pub struct PatchOutcome {
    pub stats: PatchStats,
    /// Event and prop bindings found in the new markup, with the live node
    /// each one now belongs to.
    pub bindings: Vec<Binding>,
}

pub struct Differ<'a> {
    dom: &'a dyn Dom,
    options: &'a RuntimeOptions,
    boundary: Box<dyn Fn(NodeId) -> bool + 'a>,
    preserve: Box<dyn Fn(NodeId) -> bool + 'a>,
    out: PatchOutcome,
}

impl<'a> Differ<'a> {
    pub fn new(dom: &'a dyn Dom, options: &'a RuntimeOptions) -> Self {
        Self {
            dom,
            options,
            boundary: Box::new(|_| false),
            preserve: Box::new(|_| false),
            out: PatchOutcome::default(),
        }
    }

    /// Nodes whose subtree belongs to someone else (mounted child hosts).
    /// Their attributes are still patched.
    pub fn boundary(mut self, f: impl Fn(NodeId) -> bool + 'a) -> Self {
        self.boundary = Box::new(f);
        self
    }

    /// Live nodes the differ must neither match nor remove.
    pub fn preserve(mut self, f: impl Fn(NodeId) -> bool + 'a) -> Self {
        self.preserve = Box::new(f);
        self
    }

    pub fn patch(mut self, container: NodeId, html: &str) -> PatchOutcome {
        let fragment = parse_fragment(html);
        self.patch_children(container, &fragment);
        self.out
    }

    fn key_of_node(&self, node: NodeId) -> Option<String> {
        self.dom.attribute(node, &self.options.key_attribute)
    }

    fn key_of_parsed<'n>(&self, node: &'n ParsedNode) -> Option<&'n str> {
        node.attr(&self.options.key_attribute)
    }

    fn same(&self, old: NodeId, new: &ParsedNode) -> bool {
        match (self.dom.kind(old), new) {
            (Some(NodeKind::Text), ParsedNode::Text(_)) => true,
            (Some(NodeKind::Element(tag)), ParsedNode::Element { tag: new_tag, .. }) => {
                tag == *new_tag && self.key_of_node(old).as_deref() == self.key_of_parsed(new)
            }
            _ => false,
        }
    }

    fn patch_children(&mut self, parent: NodeId, new: &[ParsedNode]) {
        let old: Vec<NodeId> = self
            .dom
            .children(parent)
            .into_iter()
            .filter(|n| !(self.preserve)(*n))
            .collect();

        let (mut os, mut oe) = (0, old.len());
        let (mut ns, mut ne) = (0, new.len());

        while os < oe && ns < ne && self.same(old[os], &new[ns]) {
            self.patch_node(old[os], &new[ns]);
            os += 1;
            ns += 1;
        }
        while os < oe && ns < ne && self.same(old[oe - 1], &new[ne - 1]) {
            self.patch_node(old[oe - 1], &new[ne - 1]);
            oe -= 1;
            ne -= 1;
        }

        let anchor = old.get(oe).copied();
        if os == oe {
            for n in &new[ns..ne] {
                let node = self.create(n);
                self.dom.insert_before(parent, node, anchor);
            }
        } else if ns == ne {
            for &n in &old[os..oe] {
                self.remove(n);
            }
        } else {
            self.reconcile(parent, &old[os..oe], &new[ns..ne], anchor);
        }
    }

    fn reconcile(
        &mut self,
        parent: NodeId,
        old: &[NodeId],
        new: &[ParsedNode],
        anchor: Option<NodeId>,
    ) {
        let mut keyed: HashMap<String, usize> = HashMap::new();
        let mut unkeyed: VecDeque<usize> = VecDeque::new();
        for (j, &node) in old.iter().enumerate() {
            match self.key_of_node(node) {
                Some(k) => {
                    keyed.entry(k).or_insert(j);
                }
                None => unkeyed.push_back(j),
            }
        }

        let mut used = vec![false; old.len()];
        let mut sources: Vec<Option<usize>> = vec![None; new.len()];
        for (i, n) in new.iter().enumerate() {
            let candidate = match self.key_of_parsed(n) {
                Some(k) => keyed.remove(k),
                None => unkeyed.pop_front(),
            };
            if let Some(j) = candidate
                && self.same(old[j], n)
            {
                sources[i] = Some(j);
                used[j] = true;
            }
        }

        for (j, &node) in old.iter().enumerate() {
            if !used[j] {
                self.remove(node);
            }
        }
        for (i, src) in sources.iter().enumerate() {
            if let Some(j) = *src {
                self.patch_node(old[j], &new[i]);
            }
        }

        let stable = longest_increasing(&sources);
        let mut next = anchor;
        for i in (0..new.len()).rev() {
            let node = match sources[i] {
                Some(j) => {
                    let node = old[j];
                    if !stable[i] {
                        self.dom.insert_before(parent, node, next);
                        self.out.stats.moved += 1;
                        self.out.stats.kinds |= Mutations::MOVE;
                    }
                    node
                }
                None => {
                    let node = self.create(&new[i]);
                    self.dom.insert_before(parent, node, next);
                    node
                }
            };
            next = Some(node);
        }
    }

    fn patch_node(&mut self, old: NodeId, new: &ParsedNode) {
        match new {
            ParsedNode::Text(text) => {
                if self.dom.text(old).as_deref() != Some(text.as_str()) {
                    self.dom.set_text(old, text);
                    self.out.stats.texts += 1;
                    self.out.stats.kinds |= Mutations::TEXT;
                }
            }
            ParsedNode::Element {
                attrs, children, ..
            } => {
                self.patch_attributes(old, attrs);
                if !(self.boundary)(old) {
                    self.patch_children(old, children);
                }
            }
        }
    }

    /// Splits binding attributes off and returns the plain ones.
    fn split_attributes<'n>(
        &mut self,
        node: NodeId,
        attrs: &'n [(String, String)],
    ) -> Vec<(&'n str, &'n str)> {
        let mut plain = Vec::with_capacity(attrs.len());
        for (name, value) in attrs {
            let binding = if let Some(event) = name.strip_prefix(self.options.event_sigil) {
                Some((BindingKind::Event, event))
            } else if let Some(prop) = name.strip_prefix(self.options.prop_sigil) {
                Some((BindingKind::Prop, prop))
            } else {
                None
            };
            match binding {
                Some((_, "")) => log::warn!("ignoring binding attribute '{name}' without a name"),
                Some((kind, target)) => self.out.bindings.push(Binding {
                    node,
                    kind,
                    name: target.to_string(),
                    expression: value.clone(),
                }),
                None => plain.push((name.as_str(), value.as_str())),
            }
        }
        plain
    }

    fn patch_attributes(&mut self, node: NodeId, attrs: &[(String, String)]) {
        let wanted = self.split_attributes(node, attrs);
        let current = self.dom.attributes(node);

        for (name, value) in &wanted {
            let unchanged = current
                .iter()
                .any(|(k, v)| k == name && v == value);
            if !unchanged {
                self.dom.set_attribute(node, name, value);
                self.out.stats.attributes += 1;
                self.out.stats.kinds |= Mutations::ATTRIBUTE;
            }
        }
        for (name, _) in &current {
            if !wanted.iter().any(|(k, _)| k == name) {
                self.dom.remove_attribute(node, name);
                self.out.stats.attributes += 1;
                self.out.stats.kinds |= Mutations::ATTRIBUTE;
            }
        }
    }

    fn create(&mut self, new: &ParsedNode) -> NodeId {
        self.out.stats.created += 1;
        self.out.stats.kinds |= Mutations::CREATE;
        match new {
            ParsedNode::Text(text) => self.dom.create_text(text),
            ParsedNode::Element {
                tag,
                attrs,
                children,
            } => {
                let el = self.dom.create_element(tag);
                for (name, value) in self.split_attributes(el, attrs) {
                    self.dom.set_attribute(el, name, value);
                }
                for child in children {
                    let c = self.create(child);
                    self.dom.insert_before(el, c, None);
                }
                el
            }
        }
    }

    fn remove(&mut self, node: NodeId) {
        self.dom.remove(node);
        self.out.stats.removed += 1;
        self.out.stats.kinds |= Mutations::REMOVE;
    }
}

/// Marks the entries of `sources` that form a longest strictly increasing
/// run of old indices. Those nodes keep their place; the others move.
fn longest_increasing(sources: &[Option<usize>]) -> Vec<bool> {
    let mut tails: Vec<usize> = Vec::new();
    let mut prev: Vec<Option<usize>> = vec![None; sources.len()];
    for (i, src) in sources.iter().enumerate() {
        let Some(v) = *src else {
            continue;
        };
        let pos = tails.partition_point(|&t| sources[t].is_some_and(|x| x < v));
        if pos > 0 {
            prev[i] = Some(tails[pos - 1]);
        }
        if pos == tails.len() {
            tails.push(i);
        } else {
            tails[pos] = i;
        }
    }
    let mut stable = vec![false; sources.len()];
    let mut cur = tails.last().copied();
    while let Some(i) = cur {
        stable[i] = true;
        cur = prev[i];
    }
    stable
}
