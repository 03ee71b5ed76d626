//! Simulated contexts sharing one [`MemoryStore`].
//!
//! Each context owns a [`WindowRegistry`] and a [`SceneController`] and runs
//! as a local task, like a browser tab with its own event loop. The driver
//! talks to the contexts over a command channel and waits for every reply,
//! so a run is deterministic: notifications produced by one context's write
//! are queued before the next command reaches any other context, and every
//! context applies its queued notifications before handling a command.

use anyhow::{anyhow, Context, Result};
use serde::Serialize;
use std::cell::{Cell, RefCell};
use std::rc::Rc;
use std::sync::mpsc as std_mpsc;
use std::time::Duration;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};
use winsync_core::{
    ContextStore, GeometrySource, MemoryStore, MetaData, Rect, StoreChange, WindowEntry, WindowId,
    WindowRegistry,
};
use winsync_protocol::{COUNT_KEY, WINDOWS_KEY};
use winsync_scene::{Point, SceneConfig, SceneController};

use crate::config::SimulationConfig;

/// Commands a context task processes.
enum ContextCommand {
    /// Run one frame at the given scene time.
    Tick {
        time_secs: f64,
        responder: oneshot::Sender<ContextStatus>,
    },
    /// Apply pending notifications and report.
    Sync {
        responder: oneshot::Sender<ContextStatus>,
    },
    /// Leave the snapshot and stop.
    Unload {
        responder: oneshot::Sender<ContextStatus>,
    },
}

/// Screen geometry of a simulated window, moved by the driver.
#[derive(Clone)]
pub struct SimulatedWindow {
    shape: Rc<Cell<Rect>>,
}

impl SimulatedWindow {
    pub fn new(shape: Rect) -> Self {
        Self {
            shape: Rc::new(Cell::new(shape)),
        }
    }

    /// Move the window by `(dx, dy)`, stopping at the edge of the `i32` range.
    pub fn shift(&self, dx: i32, dy: i32) {
        let s = self.shape.get();
        self.shape.set(Rect::new(
            s.x.saturating_add(dx),
            s.y.saturating_add(dy),
            s.w,
            s.h,
        ));
    }
}

impl GeometrySource for SimulatedWindow {
    fn current_shape(&self) -> Rect {
        self.shape.get()
    }
}

/// What a context reports back after each command.
#[derive(Debug, Clone, Serialize)]
pub struct ContextStatus {
    /// Position of the context in start order.
    pub index: usize,
    /// Id the context registered with.
    pub id: WindowId,
    /// The context's view of the snapshot.
    pub windows: Vec<WindowEntry>,
    /// Times the windows-changed callback fired.
    pub windows_changed: usize,
    /// Times the shape-changed callback fired.
    pub shape_changes: usize,
    /// Number of cubes in the context's scene.
    pub cubes: usize,
    /// Current world offset of the context's scene.
    pub offset: Point,
}

/// Persisted store state after one step of a run.
#[derive(Debug, Clone, Serialize)]
pub struct Step {
    pub label: String,
    pub windows: Option<String>,
    pub count: Option<String>,
}

/// Outcome of a whole run.
#[derive(Debug, Clone, Default, Serialize)]
pub struct SimulationReport {
    /// Store state after every step, in order.
    pub steps: Vec<Step>,
    /// Last status of every context, taken when it was torn down.
    pub contexts: Vec<ContextStatus>,
}

impl SimulationReport {
    fn record(&mut self, label: impl Into<String>, store: &MemoryStore) {
        self.steps.push(Step {
            label: label.into(),
            windows: store.value(WINDOWS_KEY),
            count: store.value(COUNT_KEY),
        });
    }

    /// Store state after the last step.
    pub fn last_step(&self) -> Option<&Step> {
        self.steps.last()
    }
}

type SimRegistry = WindowRegistry<ContextStore, SimulatedWindow>;

/// Driver-side handle onto a running context.
struct ContextHandle {
    index: usize,
    window: SimulatedWindow,
    commands: mpsc::Sender<ContextCommand>,
    task: JoinHandle<()>,
}

impl ContextHandle {
    async fn request(
        &self,
        make: impl FnOnce(oneshot::Sender<ContextStatus>) -> ContextCommand,
    ) -> Result<ContextStatus> {
        let (tx, rx) = oneshot::channel();
        self.commands
            .send(make(tx))
            .await
            .map_err(|_| anyhow!("Context {} has stopped", self.index))?;
        rx.await
            .with_context(|| format!("Context {} dropped its reply", self.index))
    }
}

/// Per-context state owned by its task.
struct ContextState {
    index: usize,
    id: WindowId,
    registry: SimRegistry,
    scene: Rc<RefCell<SceneController>>,
    changes: std_mpsc::Receiver<StoreChange>,
    windows_changed: Rc<Cell<usize>>,
    shape_changes: Rc<Cell<usize>>,
}

impl ContextState {
    /// Apply every notification delivered so far.
    fn drain_changes(&mut self) {
        while let Ok(change) = self.changes.try_recv() {
            match self.registry.handle_store_change(&change) {
                Ok(true) => debug!(
                    "Context {} sees {} windows",
                    self.index,
                    self.registry.windows().len()
                ),
                Ok(false) => {}
                Err(e) => debug!("Context {} ignoring change: {}", self.index, e),
            }
        }
    }

    fn status(&self) -> ContextStatus {
        let scene = self.scene.borrow();
        ContextStatus {
            index: self.index,
            id: self.id,
            windows: self.registry.windows().to_vec(),
            windows_changed: self.windows_changed.get(),
            shape_changes: self.shape_changes.get(),
            cubes: scene.cubes().len(),
            offset: scene.offset(),
        }
    }

    async fn run(mut self, mut commands: mpsc::Receiver<ContextCommand>) {
        while let Some(command) = commands.recv().await {
            self.drain_changes();
            match command {
                ContextCommand::Tick {
                    time_secs,
                    responder,
                } => {
                    if let Err(e) = self.registry.update_geometry() {
                        warn!("Context {} failed to update geometry: {}", self.index, e);
                    }
                    self.scene
                        .borrow_mut()
                        .tick(time_secs, self.registry.windows());
                    let _ = responder.send(self.status());
                }
                ContextCommand::Sync { responder } => {
                    let _ = responder.send(self.status());
                }
                ContextCommand::Unload { responder } => {
                    if let Err(e) = self.registry.teardown() {
                        warn!("Context {} failed to tear down: {}", self.index, e);
                    }
                    let _ = responder.send(self.status());
                    break;
                }
            }
        }
        debug!("Context {} stopped", self.index);
    }
}

/// Open context `index`, register it and start its task.
///
/// Must be called from within a [`tokio::task::LocalSet`].
fn start_context(
    store: &MemoryStore,
    index: usize,
    config: &SimulationConfig,
    scene_config: &SceneConfig,
) -> Result<(ContextHandle, WindowId)> {
    let (context_store, changes) = store
        .open_context()
        .with_context(|| format!("Failed to open context {}", index))?;

    let window = SimulatedWindow::new(Rect::new(
        i32::try_from(index)
            .unwrap_or(i32::MAX)
            .saturating_mul(config.spacing),
        0,
        config.window_width,
        config.window_height,
    ));
    let scene = Rc::new(RefCell::new(SceneController::new(scene_config.clone())));
    scene
        .borrow_mut()
        .resize(config.window_width as f64, config.window_height as f64);

    let windows_changed = Rc::new(Cell::new(0));
    let shape_changes = Rc::new(Cell::new(0));
    let mut registry = WindowRegistry::new(context_store, window.clone());

    {
        let scene = Rc::clone(&scene);
        let counter = Rc::clone(&shape_changes);
        registry.set_on_shape_changed(move |shape: Rect| {
            counter.set(counter.get() + 1);
            debug!("Context {} moved to ({}, {})", index, shape.x, shape.y);
            scene
                .borrow_mut()
                .set_offset_target(shape.x as f64, shape.y as f64, true);
        });
    }
    {
        let scene = Rc::clone(&scene);
        let counter = Rc::clone(&windows_changed);
        registry.set_on_windows_changed(move |windows: &[WindowEntry]| {
            counter.set(counter.get() + 1);
            info!(
                "Context {} windows changed: {:?}",
                index,
                windows.iter().map(|w| w.id).collect::<Vec<_>>()
            );
            scene.borrow_mut().rebuild(windows);
        });
    }

    let mut meta = MetaData::new();
    meta.insert("context".to_string(), serde_json::Value::from(index));
    let id = registry
        .initialize(meta)
        .with_context(|| format!("Failed to initialize context {}", index))?;

    {
        let shape = window.current_shape();
        let mut scene = scene.borrow_mut();
        scene.rebuild(registry.windows());
        scene.set_offset_target(shape.x as f64, shape.y as f64, false);
    }

    let state = ContextState {
        index,
        id,
        registry,
        scene,
        changes,
        windows_changed,
        shape_changes,
    };
    let (tx, rx) = mpsc::channel(16);
    let task = tokio::task::spawn_local(state.run(rx));

    Ok((
        ContextHandle {
            index,
            window,
            commands: tx,
            task,
        },
        id,
    ))
}

/// Run a full simulation: register every context, run the frames, then
/// tear the contexts down in start order.
///
/// Must be awaited from within a [`tokio::task::LocalSet`].
pub async fn run_simulation(
    config: &SimulationConfig,
    scene_config: &SceneConfig,
) -> Result<SimulationReport> {
    let store = MemoryStore::new();
    let mut report = SimulationReport::default();
    let mut contexts = Vec::with_capacity(config.contexts);

    for index in 0..config.contexts {
        let (handle, id) = start_context(&store, index, config, scene_config)?;
        info!("Context {} registered as window {}", index, id);
        contexts.push(handle);
        report.record(format!("register context {}", index), &store);
    }

    for handle in &contexts {
        handle
            .request(|responder| ContextCommand::Sync { responder })
            .await?;
    }

    let interval = Duration::from_millis(config.tick_ms);
    for tick in 0..config.ticks {
        if let Some(first) = contexts.first() {
            first.window.shift(config.drift_x, config.drift_y);
        }

        let time_secs = tick as f64 * config.tick_ms as f64 / 1000.0;
        for handle in &contexts {
            handle
                .request(|responder| ContextCommand::Tick {
                    time_secs,
                    responder,
                })
                .await?;
        }
        report.record(format!("tick {}", tick), &store);

        if !interval.is_zero() {
            tokio::time::sleep(interval).await;
        }
    }

    for handle in contexts {
        let status = handle
            .request(|responder| ContextCommand::Unload { responder })
            .await?;
        info!(
            "Context {} deregistered ({} windows left)",
            status.index,
            status.windows.len()
        );
        report.contexts.push(status);
        report.record(format!("unload context {}", handle.index), &store);

        drop(handle.commands);
        if let Err(e) = handle.task.await {
            warn!("Context {} task failed: {}", handle.index, e);
        }
    }

    Ok(report)
}
