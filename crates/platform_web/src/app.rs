//! Page entry point: startup gating, registration and the render loop.

use std::cell::{Cell, RefCell};
use std::fmt::Display;
use std::rc::Rc;
use tracing::{debug, error, info, warn};
use wasm_bindgen::prelude::*;
use web_sys::{Event, Window};
use winsync_core::{GeometrySource, Rect, SharedStore, WindowEntry, WindowRegistry};
use winsync_scene::{SceneConfig, SceneController};

use crate::geometry::BrowserGeometry;
use crate::hooks::{install_registry_hooks, EventHookHandle, SharedRegistry};
use crate::render::CanvasRenderer;
use crate::storage::LocalStorageStore;
use crate::{clear_requested, default_meta_data, seconds_since, should_initialize, SETTLE_DELAY_MS};

/// Everything a running page owns once it has registered.
struct App {
    window: Window,
    geometry: BrowserGeometry,
    registry: SharedRegistry,
    scene: Rc<RefCell<SceneController>>,
    renderer: CanvasRenderer,
    epoch_ms: f64,
    _hooks: EventHookHandle,
}

impl App {
    fn resize(&self) {
        let (width, height) = self.geometry.viewport();
        if let Err(e) = self.renderer.resize(width, height) {
            warn!("Failed to resize canvas: {:?}", e);
        }
        self.scene.borrow_mut().resize(width, height);
    }

    /// Advance one frame. Returns `false` once the registry is torn down.
    fn frame(&self) -> bool {
        let time = seconds_since(self.epoch_ms, js_sys::Date::now());
        let Ok(mut registry) = self.registry.try_borrow_mut() else {
            return true;
        };
        if let Err(e) = registry.update_geometry() {
            debug!("Stopping render loop: {}", e);
            return false;
        }

        let mut scene = self.scene.borrow_mut();
        scene.tick(time, registry.windows());
        self.renderer.draw(&scene);
        true
    }
}

/// Module entry point.
///
/// With `?clear=<value>` in the URL the shared state is wiped and nothing
/// else happens. Otherwise registration waits until the page is visible,
/// then runs once after [`SETTLE_DELAY_MS`].
#[wasm_bindgen(start)]
pub fn start() -> Result<(), JsValue> {
    console_error_panic_hook::set_once();
    tracing_wasm::set_as_global_default();

    let window = web_sys::window().ok_or_else(|| JsValue::from_str("no global window"))?;
    let search = window.location().search().unwrap_or_default();
    if clear_requested(&search) {
        LocalStorageStore::from_window(&window)
            .and_then(|store| store.clear())
            .map_err(to_js)?;
        info!("Shared window state cleared");
        return Ok(());
    }

    let document = window
        .document()
        .ok_or_else(|| JsValue::from_str("window has no document"))?;
    let initialized = Rc::new(Cell::new(false));

    let on_visibility = {
        let window = window.clone();
        let initialized = Rc::clone(&initialized);
        Closure::<dyn FnMut(Event)>::new(move |_event: Event| schedule_launch(&window, &initialized))
    };
    document.add_event_listener_with_callback(
        "visibilitychange",
        on_visibility.as_ref().unchecked_ref(),
    )?;
    on_visibility.forget();

    let on_load = {
        let window = window.clone();
        let initialized = Rc::clone(&initialized);
        Closure::<dyn FnMut(Event)>::new(move |_event: Event| schedule_launch(&window, &initialized))
    };
    window.add_event_listener_with_callback("load", on_load.as_ref().unchecked_ref())?;
    on_load.forget();

    // The module may be instantiated after `load` has already fired.
    if document.ready_state() == "complete" {
        schedule_launch(&window, &initialized);
    }

    Ok(())
}

fn schedule_launch(window: &Window, initialized: &Cell<bool>) {
    let hidden = window.document().map_or(true, |document| document.hidden());
    if !should_initialize(hidden, initialized.get()) {
        return;
    }
    initialized.set(true);

    let target = window.clone();
    let callback = Closure::once_into_js(move || {
        if let Err(e) = launch(target) {
            error!("Failed to start window sync: {:?}", e);
        }
    });
    if let Err(e) = window.set_timeout_with_callback_and_timeout_and_arguments_0(
        callback.unchecked_ref(),
        SETTLE_DELAY_MS,
    ) {
        error!("Failed to schedule startup: {:?}", e);
    }
}

fn launch(window: Window) -> Result<(), JsValue> {
    let document = window
        .document()
        .ok_or_else(|| JsValue::from_str("window has no document"))?;
    let renderer = CanvasRenderer::new(&document, window.device_pixel_ratio())?;
    let geometry = BrowserGeometry::new(window.clone());
    let scene = Rc::new(RefCell::new(SceneController::new(SceneConfig::default())));
    let store = LocalStorageStore::from_window(&window).map_err(to_js)?;
    let registry: SharedRegistry = Rc::new(RefCell::new(WindowRegistry::new(
        store,
        geometry.clone(),
    )));

    {
        let mut registry = registry.borrow_mut();
        let target = Rc::clone(&scene);
        registry.set_on_shape_changed(move |shape: Rect| {
            target
                .borrow_mut()
                .set_offset_target(shape.x as f64, shape.y as f64, true)
        });
        let target = Rc::clone(&scene);
        registry.set_on_windows_changed(move |windows: &[WindowEntry]| {
            target.borrow_mut().rebuild(windows)
        });
        registry.initialize(default_meta_data()).map_err(to_js)?;
        scene.borrow_mut().rebuild(registry.windows());
    }

    let hooks = install_registry_hooks(&window, Rc::clone(&registry))?;
    let app = Rc::new(App {
        window: window.clone(),
        geometry,
        registry,
        scene,
        renderer,
        epoch_ms: local_midnight_ms(),
        _hooks: hooks,
    });

    app.resize();
    let shape = app.geometry.current_shape();
    app.scene
        .borrow_mut()
        .set_offset_target(shape.x as f64, shape.y as f64, false);

    let on_resize = {
        let app = Rc::clone(&app);
        Closure::<dyn FnMut(Event)>::new(move |_event: Event| app.resize())
    };
    window.add_event_listener_with_callback("resize", on_resize.as_ref().unchecked_ref())?;
    on_resize.forget();

    start_render_loop(app)
}

/// Drive [`App::frame`] from `requestAnimationFrame` until it reports the
/// registry is gone.
fn start_render_loop(app: Rc<App>) -> Result<(), JsValue> {
    let slot: Rc<RefCell<Option<Closure<dyn FnMut()>>>> = Rc::new(RefCell::new(None));
    let next = Rc::clone(&slot);
    let window = app.window.clone();

    *slot.borrow_mut() = Some(Closure::<dyn FnMut()>::new(move || {
        if !app.frame() {
            return;
        }
        if let Some(callback) = next.borrow().as_ref() {
            if let Err(e) = request_frame(&app.window, callback) {
                error!("Failed to request animation frame: {:?}", e);
            }
        }
    }));

    if let Some(callback) = slot.borrow().as_ref() {
        request_frame(&window, callback)?;
    }
    Ok(())
}

fn request_frame(window: &Window, callback: &Closure<dyn FnMut()>) -> Result<(), JsValue> {
    window
        .request_animation_frame(callback.as_ref().unchecked_ref())
        .map(|_| ())
}

/// Milliseconds timestamp of today's local midnight.
fn local_midnight_ms() -> f64 {
    let date = js_sys::Date::new_0();
    date.set_hours(0);
    date.set_minutes(0);
    date.set_seconds(0);
    date.set_milliseconds(0);
    date.get_time()
}

fn to_js(error: impl Display) -> JsValue {
    JsValue::from_str(&error.to_string())
}
