//! What a component's setup sees, what it hands back, and the context its
//! template, hooks and bindings are evaluated against.

use std::fmt;
use std::future::Future;
use std::rc::Rc;

use futures::FutureExt;
use futures::future::LocalBoxFuture;
use indexmap::IndexMap;

use crate::dom::{Dom, DomEvent, ListenerId, NodeId};
use crate::instance::ComponentHandle;
use crate::signal::{Signal, signal};
use crate::value::{Handler, Props, Value};

/// Names setup may not use; the runtime provides them itself.
pub const RESERVED_NAMES: [&str; 3] = ["props", "emit", "signal"];

/// Dispatches bubbling custom events from a component's container.
#[derive(Clone)]
pub struct Emitter {
    dom: Rc<dyn Dom>,
    target: NodeId,
}

impl Emitter {
    pub fn new(dom: Rc<dyn Dom>, target: NodeId) -> Self {
        Self { dom, target }
    }

    pub fn target(&self) -> NodeId {
        self.target
    }

    pub fn emit(&self, name: &str, detail: impl Into<Value>) {
        log::trace!("emit '{name}' from {:?}", self.target);
        let event = DomEvent::new(name, self.target).with_detail(detail);
        self.dom.dispatch(self.target, &event);
    }
}

impl fmt::Debug for Emitter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Emitter").field("target", &self.target).finish()
    }
}

/// Argument to a component's setup function.
pub struct SetupContext {
    props: Rc<Props>,
    emitter: Emitter,
}

impl SetupContext {
    pub(crate) fn new(props: Rc<Props>, emitter: Emitter) -> Self {
        Self { props, emitter }
    }

    pub fn props(&self) -> &Props {
        &self.props
    }

    /// A single prop, `Null` when absent.
    pub fn prop(&self, name: &str) -> Value {
        self.props.get(name).cloned().unwrap_or_default()
    }

    pub fn emitter(&self) -> &Emitter {
        &self.emitter
    }

    pub fn emit(&self, name: &str, detail: impl Into<Value>) {
        self.emitter.emit(name, detail);
    }

    /// Signal factory. Only signals placed into the returned [`Setup`] are
    /// watched by the component.
    pub fn signal<T: 'static>(&self, initial: T) -> Signal<T> {
        signal(initial)
    }
}

/// Result of running a hook: finished already, or still running.
pub enum HookOutcome {
    Ready(anyhow::Result<()>),
    Pending(LocalBoxFuture<'static, anyhow::Result<()>>),
}

impl HookOutcome {
    pub(crate) async fn finish(self) -> anyhow::Result<()> {
        match self {
            HookOutcome::Ready(r) => r,
            HookOutcome::Pending(fut) => fut.await,
        }
    }
}

#[derive(Clone)]
pub struct Hook(Rc<dyn Fn(&Context) -> HookOutcome>);

impl Hook {
    pub fn sync(f: impl Fn(&Context) -> anyhow::Result<()> + 'static) -> Self {
        Hook(Rc::new(move |cx| HookOutcome::Ready(f(cx))))
    }

    pub fn future<F, Fut>(f: F) -> Self
    where
        F: Fn(&Context) -> Fut + 'static,
        Fut: Future<Output = anyhow::Result<()>> + 'static,
    {
        Hook(Rc::new(move |cx| HookOutcome::Pending(f(cx).boxed_local())))
    }

    pub(crate) fn invoke(&self, cx: &Context) -> HookOutcome {
        (self.0)(cx)
    }
}

/// What is about to be torn down, handed to `onUnmount`.
pub struct Cleanup {
    /// Names of the setup entries whose signals are watched.
    pub watchers: Vec<String>,
    pub listeners: Vec<ListenerId>,
    pub children: Vec<ComponentHandle>,
}

#[derive(Clone)]
pub struct UnmountHook(Rc<dyn Fn(&Context, &Cleanup) -> HookOutcome>);

impl UnmountHook {
    pub fn sync(f: impl Fn(&Context, &Cleanup) -> anyhow::Result<()> + 'static) -> Self {
        UnmountHook(Rc::new(move |cx, cleanup| HookOutcome::Ready(f(cx, cleanup))))
    }

    pub fn future<F, Fut>(f: F) -> Self
    where
        F: Fn(&Context, &Cleanup) -> Fut + 'static,
        Fut: Future<Output = anyhow::Result<()>> + 'static,
    {
        UnmountHook(Rc::new(move |cx, cleanup| {
            HookOutcome::Pending(f(cx, cleanup).boxed_local())
        }))
    }

    pub(crate) fn invoke(&self, cx: &Context, cleanup: &Cleanup) -> HookOutcome {
        (self.0)(cx, cleanup)
    }
}

#[derive(Clone, Default)]
pub(crate) struct Hooks {
    pub before_mount: Option<Hook>,
    pub mount: Option<Hook>,
    pub before_update: Option<Hook>,
    pub update: Option<Hook>,
    pub unmount: Option<UnmountHook>,
}

/// Returned from setup: named entries for templates and bindings, plus
/// lifecycle hooks.
///
/// Entries holding a signal are watched for the lifetime of the instance;
/// every write schedules a re-render.
#[derive(Default)]
pub struct Setup {
    entries: IndexMap<String, Value>,
    hooks: Hooks,
}

impl Setup {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn value(mut self, name: impl Into<String>, value: impl Into<Value>) -> Self {
        self.entries.insert(name.into(), value.into());
        self
    }

    pub fn signal<T>(self, name: impl Into<String>, signal: Signal<T>) -> Self
    where
        T: Clone + Into<Value> + 'static,
    {
        self.value(name, signal)
    }

    pub fn handler(self, name: impl Into<String>, f: impl Fn(&DomEvent) + 'static) -> Self {
        self.value(name, Handler::new(f))
    }

    pub fn on_before_mount(mut self, hook: Hook) -> Self {
        self.hooks.before_mount = Some(hook);
        self
    }

    pub fn on_mount(mut self, hook: Hook) -> Self {
        self.hooks.mount = Some(hook);
        self
    }

    pub fn on_before_update(mut self, hook: Hook) -> Self {
        self.hooks.before_update = Some(hook);
        self
    }

    pub fn on_update(mut self, hook: Hook) -> Self {
        self.hooks.update = Some(hook);
        self
    }

    pub fn on_unmount(mut self, hook: UnmountHook) -> Self {
        self.hooks.unmount = Some(hook);
        self
    }

    pub(crate) fn into_parts(self) -> (IndexMap<String, Value>, Hooks) {
        (self.entries, self.hooks)
    }
}

struct ContextInner {
    component: Rc<str>,
    props: Rc<Props>,
    entries: IndexMap<String, Value>,
    emitter: Emitter,
}

/// The per-instance context: setup entries layered over props.
#[derive(Clone)]
pub struct Context(Rc<ContextInner>);

impl Context {
    pub(crate) fn new(
        component: Rc<str>,
        props: Rc<Props>,
        entries: IndexMap<String, Value>,
        emitter: Emitter,
    ) -> Self {
        Context(Rc::new(ContextInner {
            component,
            props,
            entries,
            emitter,
        }))
    }

    pub fn component_name(&self) -> &str {
        &self.0.component
    }

    /// Setup entries shadow props of the same name.
    pub fn lookup(&self, name: &str) -> Option<Value> {
        self.0
            .entries
            .get(name)
            .or_else(|| self.0.props.get(name))
            .cloned()
    }

    /// Like [`lookup`](Self::lookup), `Null` when absent.
    pub fn get(&self, name: &str) -> Value {
        self.lookup(name).unwrap_or_default()
    }

    /// Typed access to a signal entry.
    pub fn signal<T: 'static>(&self, name: &str) -> Option<Signal<T>> {
        match self.lookup(name)? {
            Value::Signal(s) => s.downcast::<T>(),
            _ => None,
        }
    }

    pub fn props(&self) -> &Props {
        &self.0.props
    }

    pub(crate) fn props_rc(&self) -> Rc<Props> {
        self.0.props.clone()
    }

    pub fn prop(&self, name: &str) -> Value {
        self.0.props.get(name).cloned().unwrap_or_default()
    }

    pub fn entries(&self) -> impl Iterator<Item = (&str, &Value)> {
        self.0.entries.iter().map(|(k, v)| (k.as_str(), v))
    }

    pub fn emitter(&self) -> &Emitter {
        &self.0.emitter
    }

    pub fn emit(&self, name: &str, detail: impl Into<Value>) {
        self.0.emitter.emit(name, detail);
    }
}

impl fmt::Debug for Context {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Context")
            .field("component", &self.0.component)
            .field("props", &self.0.props)
            .field("entries", &self.0.entries)
            .finish()
    }
}
