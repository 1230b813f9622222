//! # Components, Signals, and Patching
//!
//! Weft renders components straight into a live DOM. There is no virtual
//! tree: each render produces an HTML string which is diffed against the
//! container's current children and patched in place.
//!
//! - `Signal<T>` is an observable value. Writes notify watchers synchronously.
//! - `Runtime` owns components, batches re-renders and runs lifecycles.
//! - `Differ` reconciles markup into existing nodes, keyed or positional.
//!
//! ## Signals
//!
//! ```rust
//! use weft_core::*;
//!
//! let count = signal(0);
//! count.set(1);
//! count.update(|v| v + 1);
//! assert_eq!(count.get(), 2);
//! ```
//!
//! Writing a value identical to the current one is a no-op.
//!
//! ## Components
//!
//! A component is a template plus an optional setup, style and children
//! map. Setup returns named entries; every entry holding a signal is watched
//! and a write schedules a re-render of that instance:
//!
//! ```rust
//! use std::rc::Rc;
//! use futures::executor::LocalPool;
//! use weft_core::*;
//!
//! let mut pool = LocalPool::new();
//! let dom = Rc::new(MemoryDom::new());
//! let root = dom.create_element("div");
//! let rt = Runtime::new(dom.clone(), pool.spawner());
//!
//! let counter = ComponentDefinition::new(|cx| format!("<p>{}</p>", cx.get("count")))
//!     .setup(|cx| Ok(Setup::new().signal("count", cx.signal(0))));
//!
//! let handle = pool.run_until(rt.mount(root, counter, Props::new())).unwrap();
//! handle.context().signal::<i32>("count").unwrap().set(5);
//! pool.run_until_stalled();
//! assert_eq!(dom.inner_html(root), "<p>5</p>");
//! ```
//!
//! Writes made in one synchronous run collapse into a single render per
//! instance, flushed on the spawner the runtime was built with.
//!
//! ## Bindings
//!
//! `@event="expr"` attaches the handler `expr` evaluates to; `:prop="expr"`
//! assigns a property and, on a child mount point, becomes that child's prop.
//! Listeners are rebound on every render. A binding that fails is logged and
//! skipped.
//!
//! ## Lifecycle
//!
//! Hooks may be sync or async. `onBeforeMount` and `onBeforeUpdate` start
//! before the patch but do not hold it back; the rest of the pass waits for
//! them. `onMount`, `onUpdate` and `onUnmount` are awaited in place.

pub mod binding;
pub mod component;
pub mod context;
pub mod diff;
pub mod dom;
pub mod effects;
pub mod error;
pub mod html;
pub mod instance;
pub mod memory;
pub mod plugin;
pub mod prelude;
pub mod runtime;
mod scheduler;
pub mod selector;
pub mod signal;
pub mod value;
#[cfg(all(feature = "web", target_arch = "wasm32"))]
pub mod web;

#[cfg(test)]
mod tests;

pub use binding::*;
pub use component::*;
pub use context::*;
pub use diff::*;
pub use dom::*;
pub use effects::*;
pub use error::*;
pub use instance::*;
pub use memory::*;
pub use plugin::*;
pub use prelude::*;
pub use runtime::*;
pub use signal::*;
pub use value::*;
