//! Plugins wrap the mount and render entry points.
//!
//! Each wrapper receives the request and a `next` continuation; the last
//! installed wrapper runs outermost. Uninstalling a plugin removes exactly
//! the wrappers it added.

use std::cell::RefCell;
use std::fmt;
use std::rc::Rc;

use futures::future::LocalBoxFuture;

use crate::component::ComponentRef;
use crate::dom::NodeId;
use crate::error::Result;
use crate::instance::{ComponentHandle, InstanceId};
use crate::runtime::Runtime;
use crate::value::{Props, Value};

#[derive(Clone)]
pub struct MountRequest {
    pub container: NodeId,
    pub component: ComponentRef,
    pub props: Props,
    /// Set for child mounts.
    pub parent: Option<InstanceId>,
}

impl fmt::Debug for MountRequest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MountRequest")
            .field("container", &self.container)
            .field("component", &self.component)
            .field("props", &self.props)
            .field("parent", &self.parent)
            .finish()
    }
}

pub type MountFuture = LocalBoxFuture<'static, Result<ComponentHandle>>;
pub type RenderFuture = LocalBoxFuture<'static, Result<()>>;

pub type MountNext = Rc<dyn Fn(MountRequest) -> MountFuture>;
pub type RenderNext = Rc<dyn Fn(ComponentHandle) -> RenderFuture>;

pub(crate) type MountWrapper = Rc<dyn Fn(MountRequest, MountNext) -> MountFuture>;
pub(crate) type RenderWrapper = Rc<dyn Fn(ComponentHandle, RenderNext) -> RenderFuture>;

pub trait Plugin {
    fn name(&self) -> &str;

    fn version(&self) -> &str {
        "0.0.0"
    }

    fn install(&self, installer: &mut Installer<'_>, options: &Value) -> anyhow::Result<()>;

    /// Called after the plugin's wrappers have been removed.
    fn uninstall(&self, _runtime: &Runtime) {}
}

/// Handed to [`Plugin::install`].
pub struct Installer<'a> {
    runtime: &'a Runtime,
    plugin: Rc<str>,
}

impl<'a> Installer<'a> {
    pub(crate) fn new(runtime: &'a Runtime, plugin: Rc<str>) -> Self {
        Self { runtime, plugin }
    }

    pub fn runtime(&self) -> &Runtime {
        self.runtime
    }

    pub fn wrap_mount(&mut self, f: impl Fn(MountRequest, MountNext) -> MountFuture + 'static) {
        self.runtime
            .plugin_host()
            .mount
            .borrow_mut()
            .push((self.plugin.clone(), Rc::new(f)));
    }

    pub fn wrap_render(&mut self, f: impl Fn(ComponentHandle, RenderNext) -> RenderFuture + 'static) {
        self.runtime
            .plugin_host()
            .render
            .borrow_mut()
            .push((self.plugin.clone(), Rc::new(f)));
    }
}

#[derive(Default)]
pub(crate) struct PluginHost {
    pub installed: RefCell<Vec<(Rc<str>, Rc<dyn Plugin>)>>,
    pub mount: RefCell<Vec<(Rc<str>, MountWrapper)>>,
    pub render: RefCell<Vec<(Rc<str>, RenderWrapper)>>,
}

impl PluginHost {
    pub fn is_installed(&self, name: &str) -> bool {
        self.installed.borrow().iter().any(|(n, _)| &**n == name)
    }

    pub fn remove_wrappers(&self, plugin: &str) {
        self.mount.borrow_mut().retain(|(n, _)| &**n != plugin);
        self.render.borrow_mut().retain(|(n, _)| &**n != plugin);
    }

    /// Folds the wrappers around `core`, first installed innermost.
    pub fn mount_chain(&self, core: MountNext) -> MountNext {
        let wrappers: Vec<MountWrapper> =
            self.mount.borrow().iter().map(|(_, w)| w.clone()).collect();
        wrappers.into_iter().fold(core, |next, wrapper| {
            let outer: MountNext = Rc::new(move |req: MountRequest| wrapper(req, next.clone()));
            outer
        })
    }

    pub fn render_chain(&self, core: RenderNext) -> RenderNext {
        let wrappers: Vec<RenderWrapper> =
            self.render.borrow().iter().map(|(_, w)| w.clone()).collect();
        wrappers.into_iter().fold(core, |next, wrapper| {
            let outer: RenderNext =
                Rc::new(move |handle: ComponentHandle| wrapper(handle, next.clone()));
            outer
        })
    }
}
