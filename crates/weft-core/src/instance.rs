use std::cell::{Cell, RefCell};
use std::fmt;
use std::rc::{Rc, Weak};

use slotmap::new_key_type;

use crate::component::ComponentDefinition;
use crate::context::{Context, Hooks};
use crate::dom::{ListenerId, NodeId};
use crate::effects::Dispose;
use crate::error::{Result, RuntimeError};
use crate::runtime::{Runtime, RuntimeInner};

new_key_type! {
    pub struct InstanceId;
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum LifecycleState {
    Mounting,
    Mounted,
    Updating,
    Unmounting,
    Unmounted,
}

pub(crate) struct Watcher {
    pub name: String,
    pub dispose: Dispose,
}

/// A mounted child and the host it was mounted on. `slot` indexes the
/// parent definition's children map.
#[derive(Clone)]
pub(crate) struct Child {
    pub host: NodeId,
    pub slot: usize,
    pub instance: Rc<Instance>,
}

pub(crate) struct Instance {
    pub id: InstanceId,
    pub container: NodeId,
    pub definition: Rc<ComponentDefinition>,
    pub context: Context,
    pub hooks: Hooks,
    pub parent: Option<InstanceId>,
    pub depth: usize,
    pub state: Cell<LifecycleState>,
    /// Set when a render was requested while a lifecycle pass was running.
    pub rerun: Cell<bool>,
    pub watchers: RefCell<Vec<Watcher>>,
    pub listeners: RefCell<Vec<ListenerId>>,
    pub children: RefCell<Vec<Child>>,
    pub style_node: Cell<Option<NodeId>>,
    pub style_text: RefCell<Option<String>>,
}

impl Instance {
    pub fn new(
        id: InstanceId,
        container: NodeId,
        definition: Rc<ComponentDefinition>,
        context: Context,
        hooks: Hooks,
        parent: Option<InstanceId>,
        depth: usize,
    ) -> Self {
        Self {
            id,
            container,
            definition,
            context,
            hooks,
            parent,
            depth,
            state: Cell::new(LifecycleState::Mounting),
            rerun: Cell::new(false),
            watchers: RefCell::new(Vec::new()),
            listeners: RefCell::new(Vec::new()),
            children: RefCell::new(Vec::new()),
            style_node: Cell::new(None),
            style_text: RefCell::new(None),
        }
    }

    pub fn name(&self) -> &str {
        self.context.component_name()
    }

    pub fn child_hosts(&self) -> Vec<NodeId> {
        self.children.borrow().iter().map(|c| c.host).collect()
    }

    pub fn is_live(&self) -> bool {
        !matches!(
            self.state.get(),
            LifecycleState::Unmounting | LifecycleState::Unmounted
        )
    }
}

/// A handle to a mounted component instance.
#[derive(Clone)]
pub struct ComponentHandle {
    pub(crate) instance: Rc<Instance>,
    pub(crate) runtime: Weak<RuntimeInner>,
}

impl ComponentHandle {
    pub(crate) fn new(instance: Rc<Instance>, runtime: Weak<RuntimeInner>) -> Self {
        Self { instance, runtime }
    }

    pub fn id(&self) -> InstanceId {
        self.instance.id
    }

    pub fn name(&self) -> &str {
        self.instance.name()
    }

    pub fn container(&self) -> NodeId {
        self.instance.container
    }

    /// The instance's context: setup entries over props.
    pub fn context(&self) -> &Context {
        &self.instance.context
    }

    pub fn state(&self) -> LifecycleState {
        self.instance.state.get()
    }

    pub fn is_mounted(&self) -> bool {
        self.instance.state.get() == LifecycleState::Mounted
    }

    pub fn parent(&self) -> Option<InstanceId> {
        self.instance.parent
    }

    pub fn children(&self) -> Vec<ComponentHandle> {
        self.instance
            .children
            .borrow()
            .iter()
            .map(|c| ComponentHandle::new(c.instance.clone(), self.runtime.clone()))
            .collect()
    }

    pub fn runtime(&self) -> Option<Runtime> {
        self.runtime.upgrade().map(Runtime::from_inner)
    }

    /// Unmounts this instance and its subtree. A second call is a no-op.
    pub async fn unmount(&self) -> Result<()> {
        let runtime = self.runtime().ok_or(RuntimeError::TornDown)?;
        runtime.unmount_instance(self.instance.clone()).await
    }

    pub fn ptr_eq(&self, other: &ComponentHandle) -> bool {
        Rc::ptr_eq(&self.instance, &other.instance)
    }
}

impl fmt::Debug for ComponentHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ComponentHandle")
            .field("id", &self.instance.id)
            .field("name", &self.name())
            .field("container", &self.instance.container)
            .field("state", &self.state())
            .finish()
    }
}
