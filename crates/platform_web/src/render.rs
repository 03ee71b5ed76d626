//! 2D canvas renderer for the scene.

use wasm_bindgen::{JsCast, JsValue};
use web_sys::{CanvasRenderingContext2d, Document, HtmlCanvasElement};
use winsync_scene::SceneController;

const BACKGROUND: &str = "#000000";

/// Full-page canvas the cubes are drawn on.
pub struct CanvasRenderer {
    canvas: HtmlCanvasElement,
    context: CanvasRenderingContext2d,
    pixel_ratio: f64,
}

impl CanvasRenderer {
    /// Create the canvas and attach it to the document body.
    pub fn new(document: &Document, pixel_ratio: f64) -> Result<Self, JsValue> {
        let canvas = document
            .create_element("canvas")?
            .dyn_into::<HtmlCanvasElement>()
            .map_err(JsValue::from)?;
        canvas.set_id("scene");
        document
            .body()
            .ok_or_else(|| JsValue::from_str("document has no body"))?
            .append_child(&canvas)?;

        let context = canvas
            .get_context("2d")?
            .ok_or_else(|| JsValue::from_str("2d context unavailable"))?
            .dyn_into::<CanvasRenderingContext2d>()
            .map_err(JsValue::from)?;

        Ok(Self {
            canvas,
            context,
            pixel_ratio: if pixel_ratio > 0.0 { pixel_ratio } else { 1.0 },
        })
    }

    /// Match the backing store to a viewport of `width` x `height` CSS pixels.
    pub fn resize(&self, width: f64, height: f64) -> Result<(), JsValue> {
        self.canvas.set_width((width * self.pixel_ratio) as u32);
        self.canvas.set_height((height * self.pixel_ratio) as u32);
        let style = self.canvas.style();
        style.set_property("width", &format!("{}px", width))?;
        style.set_property("height", &format!("{}px", height))?;
        self.context
            .set_transform(self.pixel_ratio, 0.0, 0.0, self.pixel_ratio, 0.0, 0.0)
    }

    /// Draw one frame.
    pub fn draw(&self, scene: &SceneController) {
        let (width, height) = scene.viewport();
        self.context.set_fill_style_str(BACKGROUND);
        self.context.fill_rect(0.0, 0.0, width, height);
        self.context.set_line_width(1.0);

        for cube in scene.cubes() {
            self.context.set_stroke_style_str(&cube.css_color());
            self.context.begin_path();
            for (from, to) in scene.wireframe(cube) {
                self.context.move_to(from.x, from.y);
                self.context.line_to(to.x, to.y);
            }
            self.context.stroke();
        }
    }
}
