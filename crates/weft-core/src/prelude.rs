pub use crate::binding::{Evaluator, PathEvaluator};
pub use crate::component::{ComponentDefinition, ComponentRef};
pub use crate::context::{Cleanup, Context, Emitter, Hook, Setup, SetupContext, UnmountHook};
pub use crate::dom::{Dom, DomEvent, NodeId};
pub use crate::effects::Dispose;
pub use crate::error::{Result, RuntimeError};
pub use crate::instance::{ComponentHandle, LifecycleState};
pub use crate::memory::MemoryDom;
pub use crate::plugin::{Installer, MountRequest, Plugin};
pub use crate::runtime::{Runtime, RuntimeOptions};
pub use crate::signal::{Signal, signal};
pub use crate::value::{Handler, Props, Value};
