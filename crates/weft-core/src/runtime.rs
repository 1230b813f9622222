use std::cell::{Cell, RefCell};
use std::collections::HashMap;
use std::rc::Rc;
use std::task::Poll;

use futures::FutureExt;
use futures::future::LocalBoxFuture;
use futures::task::LocalSpawn;
use slotmap::SlotMap;

use crate::binding::{self, Binding, Evaluator, PathEvaluator};
use crate::component::{ComponentDefinition, ComponentRef, Registry};
use crate::context::{Cleanup, Context, Emitter, Hook, HookOutcome, RESERVED_NAMES, SetupContext};
use crate::diff::{Differ, PatchOutcome};
use crate::dom::{Dom, NodeId};
use crate::error::{HookKind, Result, RuntimeError};
use crate::instance::{Child, ComponentHandle, Instance, InstanceId, LifecycleState, Watcher};
use crate::plugin::{
    Installer, MountFuture, MountNext, MountRequest, Plugin, PluginHost, RenderFuture, RenderNext,
};
use crate::scheduler::Scheduler;
use crate::selector::Selector;
use crate::value::{Props, Value};

/// Markup conventions the differ and binder follow.
#[derive(Clone, Debug)]
pub struct RuntimeOptions {
    /// Prefix of event binding attributes, `@click="save"`.
    pub event_sigil: char,
    /// Prefix of prop binding attributes, `:item="row"`.
    pub prop_sigil: char,
    /// Attribute carrying the reconciliation key of a sibling.
    pub key_attribute: String,
    /// Marker attribute on a component's injected `<style>` element.
    pub style_attribute: String,
}

impl Default for RuntimeOptions {
    fn default() -> Self {
        Self {
            event_sigil: '@',
            prop_sigil: ':',
            key_attribute: "key".into(),
            style_attribute: "data-weft-style".into(),
        }
    }
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct RuntimeStats {
    pub mounts: u64,
    /// Re-renders; the initial render of a mount is not counted.
    pub renders: u64,
    /// Differ passes, initial renders included.
    pub patches: u64,
    pub unmounts: u64,
    pub binding_errors: u64,
}

pub(crate) struct RuntimeInner {
    dom: Rc<dyn Dom>,
    evaluator: Rc<dyn Evaluator>,
    options: RuntimeOptions,
    registry: Registry,
    plugins: PluginHost,
    scheduler: Scheduler,
    instances: RefCell<SlotMap<InstanceId, Rc<Instance>>>,
    containers: RefCell<HashMap<NodeId, InstanceId>>,
    stats: Cell<RuntimeStats>,
    torn_down: Cell<bool>,
}

pub struct RuntimeBuilder {
    dom: Rc<dyn Dom>,
    spawner: Rc<dyn LocalSpawn>,
    evaluator: Rc<dyn Evaluator>,
    options: RuntimeOptions,
}

impl RuntimeBuilder {
    pub fn options(mut self, options: RuntimeOptions) -> Self {
        self.options = options;
        self
    }

    pub fn evaluator(mut self, evaluator: impl Evaluator + 'static) -> Self {
        self.evaluator = Rc::new(evaluator);
        self
    }

    pub fn build(self) -> Runtime {
        Runtime(Rc::new(RuntimeInner {
            dom: self.dom,
            evaluator: self.evaluator,
            options: self.options,
            registry: Registry::default(),
            plugins: PluginHost::default(),
            scheduler: Scheduler::new(self.spawner),
            instances: RefCell::new(SlotMap::with_key()),
            containers: RefCell::new(HashMap::new()),
            stats: Cell::new(RuntimeStats::default()),
            torn_down: Cell::new(false),
        }))
    }
}

/// Owns the component registry, the installed plugins and every mounted
/// instance. Cloning yields another handle to the same runtime.
///
/// Renders triggered by signal writes run on the spawner given at
/// construction; everything else runs inside the futures returned here.
#[derive(Clone)]
pub struct Runtime(Rc<RuntimeInner>);

impl Runtime {
    pub fn new(dom: Rc<dyn Dom>, spawner: impl LocalSpawn + 'static) -> Self {
        Self::builder(dom, spawner).build()
    }

    pub fn builder(dom: Rc<dyn Dom>, spawner: impl LocalSpawn + 'static) -> RuntimeBuilder {
        RuntimeBuilder {
            dom,
            spawner: Rc::new(spawner),
            evaluator: Rc::new(PathEvaluator),
            options: RuntimeOptions::default(),
        }
    }

    pub(crate) fn from_inner(inner: Rc<RuntimeInner>) -> Self {
        Runtime(inner)
    }

    pub fn dom(&self) -> &Rc<dyn Dom> {
        &self.0.dom
    }

    pub fn options(&self) -> &RuntimeOptions {
        &self.0.options
    }

    pub fn stats(&self) -> RuntimeStats {
        self.0.stats.get()
    }

    fn bump(&self, f: impl FnOnce(&mut RuntimeStats)) {
        let mut stats = self.0.stats.get();
        f(&mut stats);
        self.0.stats.set(stats);
    }

    pub(crate) fn plugin_host(&self) -> &PluginHost {
        &self.0.plugins
    }

    fn handle(&self, instance: &Rc<Instance>) -> ComponentHandle {
        ComponentHandle::new(instance.clone(), Rc::downgrade(&self.0))
    }

    // Registry

    pub fn register_component(&self, name: &str, definition: ComponentDefinition) -> Result<()> {
        self.0.registry.register(name, definition)?;
        log::debug!("registered component '{name}'");
        Ok(())
    }

    pub fn component(&self, name: &str) -> Option<Rc<ComponentDefinition>> {
        self.0.registry.get(name)
    }

    pub fn instance_for(&self, container: NodeId) -> Option<ComponentHandle> {
        let id = *self.0.containers.borrow().get(&container)?;
        let instance = self.0.instances.borrow().get(id).cloned()?;
        Some(self.handle(&instance))
    }

    pub fn instances(&self) -> Vec<ComponentHandle> {
        let instances: Vec<Rc<Instance>> = self.0.instances.borrow().values().cloned().collect();
        instances.iter().map(|i| self.handle(i)).collect()
    }

    pub fn pending_renders(&self) -> usize {
        self.0.scheduler.len()
    }

    // Entry points

    /// Mounts `component` on `container`. Mounting onto a container that
    /// already hosts a live instance returns that instance.
    ///
    /// A failing lifecycle hook does not roll the mount back: the error is
    /// returned, and the instance stays mounted with the steps that completed
    /// and keeps re-rendering on signal writes.
    pub async fn mount(
        &self,
        container: NodeId,
        component: impl Into<ComponentRef>,
        props: Props,
    ) -> Result<ComponentHandle> {
        self.dispatch_mount(MountRequest {
            container,
            component: component.into(),
            props,
            parent: None,
        })
        .await
    }

    /// Re-renders `handle` now, outside the batching scheduler.
    pub async fn render(&self, handle: &ComponentHandle) -> Result<()> {
        self.dispatch_render(handle.clone()).await
    }

    pub async fn unmount_container(&self, container: NodeId) -> Result<()> {
        let handle = self
            .instance_for(container)
            .ok_or(RuntimeError::NotMounted(container))?;
        self.unmount_instance(handle.instance).await
    }

    /// Renders everything pending right now, parents before children.
    /// Returns the first render error; the rest of the batch still runs.
    pub async fn flush(&self) -> Result<()> {
        let ids = self.0.scheduler.drain();
        if ids.is_empty() {
            return Ok(());
        }
        let mut batch: Vec<Rc<Instance>> = {
            let instances = self.0.instances.borrow();
            ids.iter().filter_map(|id| instances.get(*id).cloned()).collect()
        };
        batch.sort_by_key(|i| i.depth);
        log::trace!("flushing {} pending render(s)", batch.len());

        let mut first_error = None;
        for instance in batch {
            if !instance.is_live() {
                continue;
            }
            if let Err(e) = self.dispatch_render(self.handle(&instance)).await {
                log::error!("render of '{}' failed: {e}", instance.name());
                if first_error.is_none() {
                    first_error = Some(e);
                }
            }
        }
        first_error.map_or(Ok(()), Err)
    }

    pub(crate) fn schedule(&self, id: InstanceId) {
        if self.0.scheduler.enqueue(id) {
            let runtime = Rc::downgrade(&self.0);
            self.0.scheduler.spawn(async move {
                if let Some(inner) = runtime.upgrade() {
                    // Errors were logged per instance.
                    let _ = Runtime(inner).flush().await;
                }
            });
        }
    }

    fn dispatch_mount(&self, request: MountRequest) -> MountFuture {
        let runtime = self.clone();
        let core: MountNext = Rc::new(move |req: MountRequest| runtime.mount_core(req));
        let chain = self.0.plugins.mount_chain(core);
        chain(request)
    }

    fn dispatch_render(&self, handle: ComponentHandle) -> RenderFuture {
        let runtime = self.clone();
        let core: RenderNext = Rc::new(move |h: ComponentHandle| runtime.render_core(h));
        let chain = self.0.plugins.render_chain(core);
        chain(handle)
    }

    // Mount

    fn mount_core(&self, request: MountRequest) -> MountFuture {
        let runtime = self.clone();
        async move { runtime.mount_inner(request).await }.boxed_local()
    }

    async fn mount_inner(&self, request: MountRequest) -> Result<ComponentHandle> {
        let inner = &self.0;
        if inner.torn_down.get() {
            return Err(RuntimeError::TornDown);
        }
        if let Some(existing) = self.instance_for(request.container) {
            log::debug!(
                "{:?} already hosts '{}'; mount is a no-op",
                request.container,
                existing.name()
            );
            return Ok(existing);
        }

        let definition = inner.registry.resolve(&request.component)?;
        let name = definition.name_rc();
        let props = Rc::new(request.props);
        let emitter = Emitter::new(inner.dom.clone(), request.container);

        let setup = definition
            .run_setup(&SetupContext::new(props.clone(), emitter.clone()))
            .map_err(|source| RuntimeError::Setup {
                component: name.to_string(),
                source,
            })?;
        let (entries, hooks) = setup.into_parts();
        if let Some(reserved) = entries.keys().find(|k| RESERVED_NAMES.contains(&k.as_str())) {
            return Err(RuntimeError::ReservedName {
                component: name.to_string(),
                name: reserved.clone(),
            });
        }

        let context = Context::new(name.clone(), props, entries, emitter);
        let depth = request
            .parent
            .and_then(|p| inner.instances.borrow().get(p).map(|i| i.depth + 1))
            .unwrap_or(0);
        let instance = {
            let mut instances = inner.instances.borrow_mut();
            let id = instances.insert_with_key(|id| {
                Rc::new(Instance::new(
                    id,
                    request.container,
                    definition,
                    context,
                    hooks,
                    request.parent,
                    depth,
                ))
            });
            instances[id].clone()
        };
        inner
            .containers
            .borrow_mut()
            .insert(request.container, instance.id);
        log::debug!("mounting '{}' on {:?}", name, request.container);

        self.watch_signals(&instance);
        let result = self.mount_steps(&instance).await;

        if instance.state.get() == LifecycleState::Mounting {
            instance.state.set(LifecycleState::Mounted);
            self.bump(|s| s.mounts += 1);
        }
        if instance.rerun.take() && instance.state.get() == LifecycleState::Mounted {
            self.schedule(instance.id);
        }
        result.map(|()| self.handle(&instance))
    }

    fn watch_signals(&self, instance: &Instance) {
        let mut watchers = instance.watchers.borrow_mut();
        for (name, value) in instance.context.entries() {
            let Value::Signal(signal) = value else {
                continue;
            };
            let runtime = Rc::downgrade(&self.0);
            let id = instance.id;
            let dispose = signal.watch(move || {
                if let Some(inner) = runtime.upgrade() {
                    Runtime(inner).schedule(id);
                }
            });
            watchers.push(Watcher {
                name: name.to_string(),
                dispose,
            });
        }
    }

    async fn mount_steps(&self, instance: &Rc<Instance>) -> Result<()> {
        let cx = &instance.context;
        let before = begin_hook(instance.hooks.before_mount.as_ref(), cx)
            .await
            .map_err(|e| hook_failed(instance, HookKind::BeforeMount, e))?;
        if !instance.is_live() {
            return Ok(());
        }

        let outcome = self.patch(instance);

        if let Some(rest) = before {
            rest.await
                .map_err(|e| hook_failed(instance, HookKind::BeforeMount, e))?;
            // Unmounted while the hook was pending: the hook has finished,
            // the remaining steps do not run.
            if !instance.is_live() {
                return Ok(());
            }
        }

        let host_props = self.bind(instance, &outcome.bindings);
        self.apply_style(instance);
        self.mount_children(instance, &host_props).await?;
        if !instance.is_live() {
            return Ok(());
        }

        run_hook(instance.hooks.mount.as_ref(), cx)
            .await
            .map_err(|e| hook_failed(instance, HookKind::Mount, e))
    }

    // Render

    fn render_core(&self, handle: ComponentHandle) -> RenderFuture {
        let runtime = self.clone();
        async move { runtime.render_inner(handle.instance).await }.boxed_local()
    }

    async fn render_inner(&self, instance: Rc<Instance>) -> Result<()> {
        match instance.state.get() {
            LifecycleState::Mounted => {}
            LifecycleState::Mounting | LifecycleState::Updating => {
                instance.rerun.set(true);
                return Ok(());
            }
            LifecycleState::Unmounting | LifecycleState::Unmounted => return Ok(()),
        }

        instance.state.set(LifecycleState::Updating);
        let result = self.update_steps(&instance).await;
        if instance.state.get() == LifecycleState::Updating {
            instance.state.set(LifecycleState::Mounted);
        }
        if instance.state.get() == LifecycleState::Mounted && instance.rerun.take() {
            self.schedule(instance.id);
        }
        result
    }

    async fn update_steps(&self, instance: &Rc<Instance>) -> Result<()> {
        self.bump(|s| s.renders += 1);
        let cx = &instance.context;
        let before = begin_hook(instance.hooks.before_update.as_ref(), cx)
            .await
            .map_err(|e| hook_failed(instance, HookKind::BeforeUpdate, e))?;
        if !instance.is_live() {
            return Ok(());
        }

        let outcome = self.patch(instance);

        if let Some(rest) = before {
            rest.await
                .map_err(|e| hook_failed(instance, HookKind::BeforeUpdate, e))?;
            if !instance.is_live() {
                return Ok(());
            }
        }

        self.unmount_orphans(instance).await?;
        if !instance.is_live() {
            return Ok(());
        }
        let host_props = self.bind(instance, &outcome.bindings);
        self.apply_style(instance);
        self.mount_children(instance, &host_props).await?;
        if !instance.is_live() {
            return Ok(());
        }

        run_hook(instance.hooks.update.as_ref(), cx)
            .await
            .map_err(|e| hook_failed(instance, HookKind::Update, e))
    }

    /// Runs the template and patches the container. Child hosts are left to
    /// their own instances and the injected style element is kept.
    fn patch(&self, instance: &Instance) -> PatchOutcome {
        let html = instance.definition.render(&instance.context);
        let hosts = instance.child_hosts();
        let style = instance.style_node.get();
        let outcome = Differ::new(&*self.0.dom, &self.0.options)
            .boundary(move |n| hosts.contains(&n))
            .preserve(move |n| Some(n) == style)
            .patch(instance.container, &html);
        self.bump(|s| s.patches += 1);
        log::trace!("patched '{}': {:?}", instance.name(), outcome.stats);
        outcome
    }

    /// Drops the previous pass's listeners and applies `bindings` afresh.
    /// Returns evaluated `:prop` values per element.
    fn bind(&self, instance: &Instance, bindings: &[Binding]) -> HashMap<NodeId, Props> {
        let stale = std::mem::take(&mut *instance.listeners.borrow_mut());
        for id in stale {
            self.0.dom.remove_listener(id);
        }
        let result = binding::apply(
            &*self.0.dom,
            &*self.0.evaluator,
            &self.0.options,
            &instance.context,
            bindings,
        );
        if !result.errors.is_empty() {
            let n = result.errors.len() as u64;
            self.bump(|s| s.binding_errors += n);
        }
        *instance.listeners.borrow_mut() = result.listeners;
        result.props
    }

    fn apply_style(&self, instance: &Instance) {
        let Some(style) = instance.definition.style_def() else {
            return;
        };
        let css = style.text(&instance.context);
        if instance.style_text.borrow().as_deref() == Some(css.as_str()) {
            return;
        }
        let dom = &*self.0.dom;
        let node = match instance.style_node.get() {
            Some(node) => node,
            None => {
                let node = dom.create_element("style");
                dom.set_attribute(node, &self.0.options.style_attribute, instance.name());
                let first = dom.children(instance.container).first().copied();
                dom.insert_before(instance.container, node, first);
                instance.style_node.set(Some(node));
                node
            }
        };
        match dom.children(node).first() {
            Some(text) => dom.set_text(*text, &css),
            None => {
                let text = dom.create_text(&css);
                dom.insert_before(node, text, None);
            }
        }
        *instance.style_text.borrow_mut() = Some(css);
    }

    async fn mount_children(
        &self,
        instance: &Rc<Instance>,
        host_props: &HashMap<NodeId, Props>,
    ) -> Result<()> {
        let mut claimed = instance.child_hosts();
        for (slot, (source, component)) in instance.definition.children().iter().enumerate() {
            let selector = Selector::parse(source)?;
            for host in self.query(instance, &selector, &claimed) {
                claimed.push(host);
                let child = self
                    .dispatch_mount(MountRequest {
                        container: host,
                        component: component.clone(),
                        props: host_props.get(&host).cloned().unwrap_or_default(),
                        parent: Some(instance.id),
                    })
                    .await?;
                if !instance.is_live() {
                    log::debug!(
                        "'{}' finished mounting under unmounted '{}'",
                        child.name(),
                        instance.name()
                    );
                    return self.unmount_instance(child.instance).await;
                }
                instance.children.borrow_mut().push(Child {
                    host,
                    slot,
                    instance: child.instance,
                });
            }
        }
        Ok(())
    }

    /// Elements under the container matching `selector`, in document order.
    /// Does not look inside claimed hosts or the style element.
    fn query(&self, instance: &Instance, selector: &Selector, claimed: &[NodeId]) -> Vec<NodeId> {
        let dom = &*self.0.dom;
        let style = instance.style_node.get();
        let mut found = Vec::new();
        let mut stack: Vec<NodeId> = dom.children(instance.container).into_iter().rev().collect();
        while let Some(node) = stack.pop() {
            if Some(node) == style || claimed.contains(&node) || dom.tag(node).is_none() {
                continue;
            }
            if selector.matches(dom, node, instance.container) {
                found.push(node);
                continue;
            }
            stack.extend(dom.children(node).into_iter().rev());
        }
        found
    }

    /// Unmounts children whose host left the DOM or no longer matches the
    /// selector it was mounted under.
    async fn unmount_orphans(&self, instance: &Instance) -> Result<()> {
        let dom = &*self.0.dom;
        let selectors = instance
            .definition
            .children()
            .iter()
            .map(|(source, _)| Selector::parse(source))
            .collect::<std::result::Result<Vec<_>, _>>()?;
        let orphans: Vec<Rc<Instance>> = instance
            .children
            .borrow()
            .iter()
            .filter(|c| {
                !dom.contains(instance.container, c.host)
                    || !selectors
                        .get(c.slot)
                        .is_some_and(|s| s.matches(dom, c.host, instance.container))
            })
            .map(|c| c.instance.clone())
            .collect();
        for child in orphans {
            log::debug!("host of '{}' is no longer a mount point", child.name());
            self.unmount_instance(child).await?;
        }
        Ok(())
    }

    /// Children whose mount has started but which are not registered yet.
    fn mounting_children(&self, instance: &Instance) -> Vec<Rc<Instance>> {
        let registered: Vec<Rc<Instance>> = instance
            .children
            .borrow()
            .iter()
            .map(|c| c.instance.clone())
            .collect();
        let instances = self.0.instances.borrow();
        instances
            .values()
            .filter(|c| c.parent == Some(instance.id))
            .filter(|c| !registered.iter().any(|r| Rc::ptr_eq(r, c)))
            .cloned()
            .collect()
    }

    // Unmount

    pub(crate) fn unmount_instance(&self, instance: Rc<Instance>) -> LocalBoxFuture<'static, Result<()>> {
        let runtime = self.clone();
        async move { runtime.unmount_inner(instance).await }.boxed_local()
    }

    async fn unmount_inner(&self, instance: Rc<Instance>) -> Result<()> {
        let previous = instance.state.get();
        if matches!(
            previous,
            LifecycleState::Unmounting | LifecycleState::Unmounted
        ) {
            return Ok(());
        }
        instance.state.set(LifecycleState::Unmounting);
        log::debug!("unmounting '{}' from {:?}", instance.name(), instance.container);

        // Completed steps stay done; a retry picks up from the hook again.
        if let Err(e) = self.unmount_steps(&instance).await {
            instance.state.set(previous);
            return Err(e);
        }
        instance.state.set(LifecycleState::Unmounted);
        self.bump(|s| s.unmounts += 1);
        Ok(())
    }

    async fn unmount_steps(&self, instance: &Rc<Instance>) -> Result<()> {
        let mounting = self.mounting_children(instance);
        if let Some(hook) = &instance.hooks.unmount {
            let cleanup = Cleanup {
                watchers: instance.watchers.borrow().iter().map(|w| w.name.clone()).collect(),
                listeners: instance.listeners.borrow().clone(),
                children: instance
                    .children
                    .borrow()
                    .iter()
                    .map(|c| &c.instance)
                    .chain(&mounting)
                    .map(|c| self.handle(c))
                    .collect(),
            };
            hook.invoke(&instance.context, &cleanup)
                .finish()
                .await
                .map_err(|e| hook_failed(instance, HookKind::Unmount, e))?;
        }

        let watchers = std::mem::take(&mut *instance.watchers.borrow_mut());
        for watcher in watchers {
            watcher.dispose.run();
        }
        let listeners = std::mem::take(&mut *instance.listeners.borrow_mut());
        for id in listeners {
            self.0.dom.remove_listener(id);
        }

        let mut children = std::mem::take(&mut *instance.children.borrow_mut()).into_iter();
        while let Some(child) = children.next() {
            if let Err(e) = self.unmount_instance(child.instance.clone()).await {
                let mut list = instance.children.borrow_mut();
                list.push(child);
                list.extend(children);
                return Err(e);
            }
        }
        for child in mounting {
            self.unmount_instance(child).await?;
        }

        self.0.dom.clear(instance.container);
        instance.style_node.set(None);
        instance.style_text.borrow_mut().take();
        {
            let mut containers = self.0.containers.borrow_mut();
            if containers.get(&instance.container) == Some(&instance.id) {
                containers.remove(&instance.container);
            }
        }
        self.0.instances.borrow_mut().remove(instance.id);
        let parent = instance
            .parent
            .and_then(|p| self.0.instances.borrow().get(p).cloned());
        if let Some(parent) = parent {
            parent
                .children
                .borrow_mut()
                .retain(|c| !Rc::ptr_eq(&c.instance, instance));
        }
        Ok(())
    }

    // Plugins

    pub fn install(&self, plugin: impl Plugin + 'static, options: Value) -> Result<()> {
        if self.0.torn_down.get() {
            return Err(RuntimeError::TornDown);
        }
        let plugin: Rc<dyn Plugin> = Rc::new(plugin);
        let name: Rc<str> = Rc::from(plugin.name());
        if self.0.plugins.is_installed(&name) {
            return Err(RuntimeError::DuplicatePlugin(name.to_string()));
        }
        let mut installer = Installer::new(self, name.clone());
        if let Err(source) = plugin.install(&mut installer, &options) {
            self.0.plugins.remove_wrappers(&name);
            return Err(RuntimeError::Plugin {
                name: name.to_string(),
                source,
            });
        }
        log::info!("installed plugin {} {}", name, plugin.version());
        self.0.plugins.installed.borrow_mut().push((name, plugin));
        Ok(())
    }

    pub fn uninstall(&self, name: &str) -> Result<()> {
        let plugin = {
            let mut installed = self.0.plugins.installed.borrow_mut();
            let pos = installed
                .iter()
                .position(|(n, _)| &**n == name)
                .ok_or_else(|| RuntimeError::UnknownPlugin(name.to_string()))?;
            installed.remove(pos).1
        };
        self.0.plugins.remove_wrappers(name);
        plugin.uninstall(self);
        log::info!("uninstalled plugin {name}");
        Ok(())
    }

    /// `(name, version)` of installed plugins, in install order.
    pub fn plugins(&self) -> Vec<(String, String)> {
        self.0
            .plugins
            .installed
            .borrow()
            .iter()
            .map(|(n, p)| (n.to_string(), p.version().to_string()))
            .collect()
    }

    /// Unmounts every root instance, uninstalls plugins newest first and
    /// clears the registry. Later mounts fail with [`RuntimeError::TornDown`].
    pub async fn teardown(&self) -> Result<()> {
        let roots: Vec<Rc<Instance>> = self
            .0
            .instances
            .borrow()
            .values()
            .filter(|i| i.parent.is_none())
            .cloned()
            .collect();
        let mut first_error = None;
        for root in roots {
            if let Err(e) = self.unmount_instance(root).await {
                log::error!("teardown: {e}");
                if first_error.is_none() {
                    first_error = Some(e);
                }
            }
        }
        loop {
            let newest = self.0.plugins.installed.borrow().last().map(|(n, _)| n.clone());
            let Some(name) = newest else {
                break;
            };
            self.uninstall(&name)?;
        }
        self.0.registry.clear();
        self.0.torn_down.set(true);
        log::debug!("runtime torn down");
        first_error.map_or(Ok(()), Err)
    }
}

/// Starts `hook` and polls it once. A hook still pending after that is
/// handed back to be awaited once the DOM has been patched.
async fn begin_hook(
    hook: Option<&Hook>,
    cx: &Context,
) -> anyhow::Result<Option<LocalBoxFuture<'static, anyhow::Result<()>>>> {
    match hook.map(|h| h.invoke(cx)) {
        None => Ok(None),
        Some(HookOutcome::Ready(r)) => r.map(|()| None),
        Some(HookOutcome::Pending(mut fut)) => match futures::poll!(&mut fut) {
            Poll::Ready(r) => r.map(|()| None),
            Poll::Pending => Ok(Some(fut)),
        },
    }
}

async fn run_hook(hook: Option<&Hook>, cx: &Context) -> anyhow::Result<()> {
    match hook {
        Some(h) => h.invoke(cx).finish().await,
        None => Ok(()),
    }
}

fn hook_failed(instance: &Instance, hook: HookKind, source: anyhow::Error) -> RuntimeError {
    log::warn!("{hook} of '{}' failed: {source:#}", instance.name());
    RuntimeError::Hook {
        component: instance.name().to_string(),
        hook,
        source,
    }
}
