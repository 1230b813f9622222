//! CSS selectors for children maps, matched against any [`Dom`].
//!
//! Parsing and matching are done by the `selectors` engine with scraper's
//! selector flavour. Pseudo-classes and pseudo-elements are rejected at
//! parse time; structural ones such as `:first-child` and `:not()` work.

use std::cell::RefCell;
use std::collections::HashMap;
use std::fmt;

use cssparser::ParserInput;
use scraper::selector::Simple;
use selectors::attr::{AttrSelectorOperation, CaseSensitivity, NamespaceConstraint};
use selectors::bloom::BloomFilter;
use selectors::matching::{self, ElementSelectorFlags, MatchingContext};
use selectors::parser::{self, ParseRelative, SelectorList, SelectorParseErrorKind};
use selectors::{Element, OpaqueElement, SelectorImpl};

use crate::dom::{Dom, NodeId};
use crate::error::SelectorError;

const HTML_NAMESPACE: &str = "http://www.w3.org/1999/xhtml";

struct SelectorParser;

impl<'i> parser::Parser<'i> for SelectorParser {
    type Impl = Simple;
    type Error = SelectorParseErrorKind<'i>;

    fn parse_is_and_where(&self) -> bool {
        true
    }
}

#[derive(Clone)]
pub struct Selector {
    source: String,
    list: SelectorList<Simple>,
}

impl fmt::Debug for Selector {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("Selector").field(&self.source).finish()
    }
}

impl Selector {
    pub fn parse(source: &str) -> Result<Self, SelectorError> {
        let mut input = ParserInput::new(source);
        let mut css = cssparser::Parser::new(&mut input);
        let list = SelectorList::parse(&SelectorParser, &mut css, ParseRelative::No).map_err(|e| {
            SelectorError {
                selector: source.to_string(),
                reason: format!("{:?}", e.kind),
            }
        })?;
        Ok(Self {
            source: source.to_string(),
            list,
        })
    }

    pub fn source(&self) -> &str {
        &self.source
    }

    /// Matches `node`, looking at ancestors no higher than `scope` (exclusive).
    pub fn matches(&self, dom: &dyn Dom, node: NodeId, scope: NodeId) -> bool {
        let view = ScopedDom {
            dom,
            scope,
            anchors: RefCell::new(HashMap::new()),
        };
        let element = DomElement { view: &view, node };
        let mut caches = matching::SelectorCaches::default();
        let mut cx = MatchingContext::new(
            matching::MatchingMode::Normal,
            None,
            &mut caches,
            matching::QuirksMode::NoQuirks,
            matching::NeedsSelectorFlags::No,
            matching::MatchingForInvalidation::No,
        );
        self.list
            .slice()
            .iter()
            .any(|s| matching::matches_selector(s, 0, None, &element, &mut cx))
    }
}

/// The subtree below `scope` as seen by one match.
struct ScopedDom<'a> {
    dom: &'a dyn Dom,
    scope: NodeId,
    /// Heap cells giving each visited node a stable address for
    /// [`OpaqueElement`].
    anchors: RefCell<HashMap<NodeId, Box<NodeId>>>,
}

impl ScopedDom<'_> {
    fn is_element(&self, node: NodeId) -> bool {
        self.dom.tag(node).is_some()
    }

    fn siblings(&self, node: NodeId) -> Option<(Vec<NodeId>, usize)> {
        let parent = self.dom.parent(node)?;
        let siblings = self.dom.children(parent);
        let at = siblings.iter().position(|n| *n == node)?;
        Some((siblings, at))
    }
}

#[derive(Clone, Copy)]
struct DomElement<'a> {
    view: &'a ScopedDom<'a>,
    node: NodeId,
}

impl fmt::Debug for DomElement<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "DomElement({:?})", self.node)
    }
}

impl<'a> DomElement<'a> {
    fn at(&self, node: NodeId) -> Self {
        Self {
            view: self.view,
            node,
        }
    }

    fn dom(&self) -> &'a dyn Dom {
        self.view.dom
    }

    fn attr(&self, name: &str) -> Option<String> {
        self.dom().attribute(self.node, name)
    }
}

impl Element for DomElement<'_> {
    type Impl = Simple;

    fn opaque(&self) -> OpaqueElement {
        let mut anchors = self.view.anchors.borrow_mut();
        let anchor = anchors
            .entry(self.node)
            .or_insert_with(|| Box::new(self.node));
        OpaqueElement::new::<NodeId>(&**anchor)
    }

    fn parent_element(&self) -> Option<Self> {
        let parent = self.dom().parent(self.node)?;
        (parent != self.view.scope && self.view.is_element(parent)).then(|| self.at(parent))
    }

    fn parent_node_is_shadow_root(&self) -> bool {
        false
    }

    fn containing_shadow_host(&self) -> Option<Self> {
        None
    }

    fn is_pseudo_element(&self) -> bool {
        false
    }

    fn prev_sibling_element(&self) -> Option<Self> {
        let (siblings, at) = self.view.siblings(self.node)?;
        siblings[..at]
            .iter()
            .rev()
            .find(|n| self.view.is_element(**n))
            .map(|n| self.at(*n))
    }

    fn next_sibling_element(&self) -> Option<Self> {
        let (siblings, at) = self.view.siblings(self.node)?;
        siblings[at + 1..]
            .iter()
            .find(|n| self.view.is_element(**n))
            .map(|n| self.at(*n))
    }

    fn first_element_child(&self) -> Option<Self> {
        self.dom()
            .children(self.node)
            .into_iter()
            .find(|n| self.view.is_element(*n))
            .map(|n| self.at(n))
    }

    fn is_html_element_in_html_document(&self) -> bool {
        true
    }

    fn has_local_name(&self, name: &<Simple as SelectorImpl>::BorrowedLocalName) -> bool {
        self.dom().tag(self.node).as_deref() == Some(&*name.0)
    }

    fn has_namespace(&self, ns: &<Simple as SelectorImpl>::BorrowedNamespaceUrl) -> bool {
        &**ns == HTML_NAMESPACE
    }

    fn is_same_type(&self, other: &Self) -> bool {
        self.dom().tag(self.node) == other.dom().tag(other.node)
    }

    fn attr_matches(
        &self,
        _ns: &NamespaceConstraint<&<Simple as SelectorImpl>::NamespaceUrl>,
        local_name: &<Simple as SelectorImpl>::LocalName,
        operation: &AttrSelectorOperation<&<Simple as SelectorImpl>::AttrValue>,
    ) -> bool {
        self.attr(&local_name.0)
            .is_some_and(|value| operation.eval_str(&value))
    }

    fn match_non_ts_pseudo_class(
        &self,
        _pc: &<Simple as SelectorImpl>::NonTSPseudoClass,
        _context: &mut MatchingContext<Simple>,
    ) -> bool {
        false
    }

    fn match_pseudo_element(
        &self,
        _pe: &<Simple as SelectorImpl>::PseudoElement,
        _context: &mut MatchingContext<Simple>,
    ) -> bool {
        false
    }

    fn apply_selector_flags(&self, _flags: ElementSelectorFlags) {}

    fn is_link(&self) -> bool {
        false
    }

    fn is_html_slot_element(&self) -> bool {
        false
    }

    fn has_id(
        &self,
        id: &<Simple as SelectorImpl>::Identifier,
        case_sensitivity: CaseSensitivity,
    ) -> bool {
        self.attr("id")
            .is_some_and(|v| case_sensitivity.eq(id.0.as_bytes(), v.as_bytes()))
    }

    fn has_class(
        &self,
        name: &<Simple as SelectorImpl>::Identifier,
        case_sensitivity: CaseSensitivity,
    ) -> bool {
        self.attr("class").is_some_and(|v| {
            v.split_whitespace()
                .any(|c| case_sensitivity.eq(name.0.as_bytes(), c.as_bytes()))
        })
    }

    fn has_custom_state(&self, _name: &<Simple as SelectorImpl>::Identifier) -> bool {
        false
    }

    fn imported_part(
        &self,
        _name: &<Simple as SelectorImpl>::Identifier,
    ) -> Option<<Simple as SelectorImpl>::Identifier> {
        None
    }

    fn is_part(&self, _name: &<Simple as SelectorImpl>::Identifier) -> bool {
        false
    }

    fn is_empty(&self) -> bool {
        !self.dom().children(self.node).into_iter().any(|n| {
            self.view.is_element(n) || self.dom().text(n).is_some_and(|t| !t.is_empty())
        })
    }

    fn is_root(&self) -> bool {
        false
    }

    fn add_element_unique_hashes(&self, _filter: &mut BloomFilter) -> bool {
        false
    }
}
