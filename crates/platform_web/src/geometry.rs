//! Window geometry as the browser reports it.

use wasm_bindgen::JsValue;
use web_sys::Window;
use winsync_core::{GeometrySource, Rect};

/// Reads the window's screen position and viewport size on every call.
#[derive(Clone)]
pub struct BrowserGeometry {
    window: Window,
}

impl BrowserGeometry {
    pub fn new(window: Window) -> Self {
        Self { window }
    }

    /// Inner viewport size in CSS pixels.
    pub fn viewport(&self) -> (f64, f64) {
        (
            js_pixels(self.window.inner_width()),
            js_pixels(self.window.inner_height()),
        )
    }
}

impl GeometrySource for BrowserGeometry {
    fn current_shape(&self) -> Rect {
        let (w, h) = self.viewport();
        // screenX/screenY are the standard aliases of screenLeft/screenTop.
        Rect::new(
            self.window.screen_x().unwrap_or(0),
            self.window.screen_y().unwrap_or(0),
            w as i32,
            h as i32,
        )
    }
}

fn js_pixels(value: Result<JsValue, JsValue>) -> f64 {
    value.ok().and_then(|v| v.as_f64()).unwrap_or(0.0)
}
