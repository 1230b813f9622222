use std::cell::{Cell, RefCell};
use std::rc::Rc;

use futures::FutureExt;
use web_time::Instant;

use weft_core::{Dom, Installer, NodeId, Plugin, Runtime, Value};

/// Render counters shared between an [`Inspector`] and its [`Hud`].
#[derive(Clone, Debug, Default)]
pub struct Metrics {
    pub mounts: u64,
    pub renders: u64,
    pub last_render_ms: f32,
    /// Exponential moving average of render time.
    pub avg_render_ms: f32,
}

impl Metrics {
    fn record_render(&mut self, ms: f32) {
        self.renders += 1;
        self.last_render_ms = ms;
        let a = 0.2;
        self.avg_render_ms = if self.renders == 1 {
            ms
        } else {
            (1.0 - a) * self.avg_render_ms + a * ms
        };
    }
}

/// A one-line text overlay of runtime activity.
pub struct Hud {
    pub enabled: bool,
    metrics: Rc<RefCell<Metrics>>,
    frame_count: u64,
}

impl Hud {
    pub fn new(metrics: Rc<RefCell<Metrics>>) -> Self {
        Self {
            enabled: true,
            metrics,
            frame_count: 0,
        }
    }

    pub fn toggle(&mut self) {
        self.enabled = !self.enabled;
    }

    pub fn overlay(&mut self, runtime: &Runtime) -> String {
        self.frame_count += 1;
        let m = self.metrics.borrow();
        let stats = runtime.stats();
        let lines = [
            format!("frame: {}", self.frame_count),
            format!("instances: {}", runtime.instances().len()),
            format!("mounts: {}", m.mounts),
            format!("renders: {}", m.renders),
            format!("render: {:.2} ms (avg {:.2})", m.last_render_ms, m.avg_render_ms),
            format!("pending: {}", runtime.pending_renders()),
            format!("binding errors: {}", stats.binding_errors),
        ];
        lines.join("  |  ")
    }

    /// Writes the overlay as the text of `node`.
    pub fn paint(&mut self, runtime: &Runtime, node: NodeId) {
        if !self.enabled {
            return;
        }
        let text = self.overlay(runtime);
        let dom = runtime.dom();
        match dom.children(node).first() {
            Some(t) => dom.set_text(*t, &text),
            None => {
                let t = dom.create_text(&text);
                dom.insert_before(node, t, None);
            }
        }
    }
}

/// Times every mount and render passing through the runtime. Clones share
/// the same metrics.
#[derive(Clone)]
pub struct Inspector {
    metrics: Rc<RefCell<Metrics>>,
    enabled: Rc<Cell<bool>>,
}

impl Default for Inspector {
    fn default() -> Self {
        Self::new()
    }
}

impl Inspector {
    pub const NAME: &'static str = "weft-inspector";

    pub fn new() -> Self {
        Self {
            metrics: Rc::new(RefCell::new(Metrics::default())),
            enabled: Rc::new(Cell::new(true)),
        }
    }

    pub fn metrics(&self) -> Metrics {
        self.metrics.borrow().clone()
    }

    pub fn hud(&self) -> Hud {
        Hud::new(self.metrics.clone())
    }

    /// Pauses or resumes recording without uninstalling.
    pub fn set_enabled(&self, on: bool) {
        self.enabled.set(on);
    }
}

impl Plugin for Inspector {
    fn name(&self) -> &str {
        Self::NAME
    }

    fn version(&self) -> &str {
        env!("CARGO_PKG_VERSION")
    }

    /// `options` may carry `{ enabled: bool }`.
    fn install(&self, installer: &mut Installer<'_>, options: &Value) -> anyhow::Result<()> {
        if let Some(on) = options.field("enabled").and_then(|v| v.as_bool()) {
            self.enabled.set(on);
        }

        let (metrics, enabled) = (self.metrics.clone(), self.enabled.clone());
        installer.wrap_mount(move |req, next| {
            let (metrics, enabled) = (metrics.clone(), enabled.clone());
            async move {
                let result = next(req).await;
                if let Ok(handle) = &result
                    && enabled.get()
                {
                    metrics.borrow_mut().mounts += 1;
                    log::debug!("mounted '{}' on {:?}", handle.name(), handle.container());
                }
                result
            }
            .boxed_local()
        });

        let (metrics, enabled) = (self.metrics.clone(), self.enabled.clone());
        installer.wrap_render(move |handle, next| {
            let (metrics, enabled) = (metrics.clone(), enabled.clone());
            async move {
                let name = handle.name().to_string();
                let start = Instant::now();
                let result = next(handle).await;
                if enabled.get() {
                    let ms = start.elapsed().as_secs_f32() * 1000.0;
                    metrics.borrow_mut().record_render(ms);
                    log::debug!("rendered '{name}' in {ms:.2} ms");
                }
                result
            }
            .boxed_local()
        });
        Ok(())
    }

    fn uninstall(&self, _runtime: &Runtime) {
        let m = self.metrics.borrow();
        log::info!("inspector: {} mounts, {} renders", m.mounts, m.renders);
    }
}
