use std::cell::RefCell;
use std::collections::HashMap;
use std::fmt;
use std::rc::Rc;

use crate::context::{Context, Setup, SetupContext};
use crate::error::{Result, RuntimeError};

pub type TemplateFn = Rc<dyn Fn(&Context) -> String>;
pub type SetupFn = Rc<dyn Fn(&SetupContext) -> anyhow::Result<Setup>>;

/// Component CSS. Dynamic styles are recomputed after every render and
/// written only when the text changed.
#[derive(Clone)]
pub enum Style {
    Static(Rc<str>),
    Dynamic(Rc<dyn Fn(&Context) -> String>),
}

impl Style {
    pub(crate) fn text(&self, cx: &Context) -> String {
        match self {
            Style::Static(css) => css.to_string(),
            Style::Dynamic(f) => f(cx),
        }
    }
}

/// A child slot target: a registered name or an inline definition.
#[derive(Clone)]
pub enum ComponentRef {
    Name(String),
    Inline(Rc<ComponentDefinition>),
}

impl fmt::Debug for ComponentRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ComponentRef::Name(n) => write!(f, "ComponentRef::Name({n:?})"),
            ComponentRef::Inline(def) => write!(f, "ComponentRef::Inline({:?})", def.name()),
        }
    }
}

impl From<&str> for ComponentRef {
    fn from(name: &str) -> Self {
        ComponentRef::Name(name.to_string())
    }
}

impl From<String> for ComponentRef {
    fn from(name: String) -> Self {
        ComponentRef::Name(name)
    }
}

impl From<ComponentDefinition> for ComponentRef {
    fn from(def: ComponentDefinition) -> Self {
        ComponentRef::Inline(Rc::new(def))
    }
}

impl From<Rc<ComponentDefinition>> for ComponentRef {
    fn from(def: Rc<ComponentDefinition>) -> Self {
        ComponentRef::Inline(def)
    }
}

/// An immutable component description.
///
/// ```
/// use weft_core::*;
///
/// let counter = ComponentDefinition::new(|cx| {
///     format!("<button @click=\"inc\">{}</button>", cx.get("count"))
/// })
/// .setup(|cx| {
///     let count = cx.signal(0);
///     let inc = count.clone();
///     Ok(Setup::new()
///         .signal("count", count)
///         .handler("inc", move |_| inc.update(|n| n + 1)))
/// })
/// .style("button { font-weight: bold; }");
/// # let _ = counter;
/// ```
#[derive(Clone)]
pub struct ComponentDefinition {
    name: Option<Rc<str>>,
    setup: Option<SetupFn>,
    template: TemplateFn,
    style: Option<Style>,
    children: Vec<(String, ComponentRef)>,
}

impl ComponentDefinition {
    pub fn new(template: impl Fn(&Context) -> String + 'static) -> Self {
        Self {
            name: None,
            setup: None,
            template: Rc::new(template),
            style: None,
            children: Vec::new(),
        }
    }

    pub fn named(mut self, name: impl Into<Rc<str>>) -> Self {
        self.name = Some(name.into());
        self
    }

    pub fn setup(
        mut self,
        f: impl Fn(&SetupContext) -> anyhow::Result<Setup> + 'static,
    ) -> Self {
        self.setup = Some(Rc::new(f));
        self
    }

    pub fn style(mut self, css: impl Into<Rc<str>>) -> Self {
        self.style = Some(Style::Static(css.into()));
        self
    }

    pub fn style_with(mut self, f: impl Fn(&Context) -> String + 'static) -> Self {
        self.style = Some(Style::Dynamic(Rc::new(f)));
        self
    }

    /// Mounts `component` on every element matching `selector` in this
    /// component's rendered output. Earlier entries win when two selectors
    /// match the same element.
    pub fn child(mut self, selector: impl Into<String>, component: impl Into<ComponentRef>) -> Self {
        self.children.push((selector.into(), component.into()));
        self
    }

    pub fn name(&self) -> &str {
        self.name.as_deref().unwrap_or("anonymous")
    }

    pub(crate) fn name_rc(&self) -> Rc<str> {
        self.name.clone().unwrap_or_else(|| Rc::from("anonymous"))
    }

    pub(crate) fn run_setup(&self, cx: &SetupContext) -> anyhow::Result<Setup> {
        match &self.setup {
            Some(f) => f(cx),
            None => Ok(Setup::new()),
        }
    }

    pub(crate) fn render(&self, cx: &Context) -> String {
        (self.template)(cx)
    }

    pub(crate) fn style_def(&self) -> Option<&Style> {
        self.style.as_ref()
    }

    pub(crate) fn children(&self) -> &[(String, ComponentRef)] {
        &self.children
    }
}

impl fmt::Debug for ComponentDefinition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ComponentDefinition")
            .field("name", &self.name())
            .field("children", &self.children)
            .finish_non_exhaustive()
    }
}

#[derive(Default)]
pub(crate) struct Registry {
    components: RefCell<HashMap<String, Rc<ComponentDefinition>>>,
}

impl Registry {
    pub fn register(&self, name: &str, def: ComponentDefinition) -> Result<Rc<ComponentDefinition>> {
        let mut components = self.components.borrow_mut();
        if components.contains_key(name) {
            return Err(RuntimeError::DuplicateComponent(name.to_string()));
        }
        let def = Rc::new(if def.name.is_none() { def.named(name) } else { def });
        components.insert(name.to_string(), def.clone());
        Ok(def)
    }

    pub fn get(&self, name: &str) -> Option<Rc<ComponentDefinition>> {
        self.components.borrow().get(name).cloned()
    }

    pub fn resolve(&self, component: &ComponentRef) -> Result<Rc<ComponentDefinition>> {
        match component {
            ComponentRef::Name(name) => self
                .get(name)
                .ok_or_else(|| RuntimeError::UnknownComponent(name.clone())),
            ComponentRef::Inline(def) => Ok(def.clone()),
        }
    }

    pub fn clear(&self) {
        self.components.borrow_mut().clear();
    }
}
