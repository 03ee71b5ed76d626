//! WinSync Scene
//!
//! Presentation state built on top of the window registry.
//!
//! Every registered window gets a cube centred on that window's screen
//! rectangle. All cubes live in one world that is shifted by the negated
//! screen position of the local window, so each browser window shows the
//! part of the shared scene that lies behind it. Positions are eased towards
//! their targets a fixed fraction per frame.

use serde::{Deserialize, Serialize};
use tracing::debug;
use winsync_protocol::{WindowEntry, WindowId};

/// Tunables for the scene.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SceneConfig {
    /// Fraction of the remaining distance covered each frame (0..=1).
    #[serde(default = "default_falloff")]
    pub falloff: f64,

    /// Edge length of the first window's cube in pixels.
    #[serde(default = "default_base_size")]
    pub base_size: f64,

    /// Edge length added per subsequent window.
    #[serde(default = "default_size_step")]
    pub size_step: f64,

    /// Hue offset between consecutive cubes (0..1 wraps around the wheel).
    #[serde(default = "default_hue_step")]
    pub hue_step: f64,

    /// Rotation around the x axis in radians per second.
    #[serde(default = "default_rotation_speed_x")]
    pub rotation_speed_x: f64,

    /// Rotation around the y axis in radians per second.
    #[serde(default = "default_rotation_speed_y")]
    pub rotation_speed_y: f64,
}

impl Default for SceneConfig {
    fn default() -> Self {
        Self {
            falloff: default_falloff(),
            base_size: default_base_size(),
            size_step: default_size_step(),
            hue_step: default_hue_step(),
            rotation_speed_x: default_rotation_speed_x(),
            rotation_speed_y: default_rotation_speed_y(),
        }
    }
}

fn default_falloff() -> f64 {
    0.05
}

fn default_base_size() -> f64 {
    100.0
}

fn default_size_step() -> f64 {
    50.0
}

fn default_hue_step() -> f64 {
    0.1
}

fn default_rotation_speed_x() -> f64 {
    0.5
}

fn default_rotation_speed_y() -> f64 {
    0.3
}

/// A point in scene or viewport space (pixels, y pointing down).
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Point {
    pub x: f64,
    pub y: f64,
}

impl Point {
    pub fn new(x: f64, y: f64) -> Self {
        Self { x, y }
    }

    /// Move a fraction of the way towards `target`.
    pub fn approach(self, target: Point, falloff: f64) -> Point {
        Point::new(
            approach(self.x, target.x, falloff),
            approach(self.y, target.y, falloff),
        )
    }
}

/// Move `current` by `falloff` of the remaining distance to `target`.
#[inline]
pub fn approach(current: f64, target: f64, falloff: f64) -> f64 {
    current + (target - current) * falloff
}

/// Convert an HSL colour (all components in 0..=1, hue wraps) to RGB bytes.
pub fn hsl_to_rgb(hue: f64, saturation: f64, lightness: f64) -> [u8; 3] {
    let h = hue.rem_euclid(1.0);
    let s = saturation.clamp(0.0, 1.0);
    let l = lightness.clamp(0.0, 1.0);

    if s == 0.0 {
        let v = (l * 255.0).round() as u8;
        return [v, v, v];
    }

    let q = if l <= 0.5 { l * (1.0 + s) } else { l + s - l * s };
    let p = 2.0 * l - q;

    let channel = |t: f64| {
        let t = t.rem_euclid(1.0);
        let v = if t < 1.0 / 6.0 {
            p + (q - p) * 6.0 * t
        } else if t < 0.5 {
            q
        } else if t < 2.0 / 3.0 {
            p + (q - p) * 6.0 * (2.0 / 3.0 - t)
        } else {
            p
        };
        (v * 255.0).round().clamp(0.0, 255.0) as u8
    };

    [channel(h + 1.0 / 3.0), channel(h), channel(h - 1.0 / 3.0)]
}

/// The visual stand-in for one registered window.
#[derive(Debug, Clone, PartialEq)]
pub struct CubeProxy {
    /// Window this cube represents.
    pub window_id: WindowId,
    /// Current centre in scene space.
    pub position: Point,
    /// Rotation around the x and y axes in radians.
    pub rotation: (f64, f64),
    /// Edge length in pixels.
    pub size: f64,
    /// Hue in 0..1.
    pub hue: f64,
}

impl CubeProxy {
    /// Fully saturated, mid-lightness colour of the cube.
    pub fn color(&self) -> [u8; 3] {
        hsl_to_rgb(self.hue, 1.0, 0.5)
    }

    /// CSS colour string for canvas renderers.
    pub fn css_color(&self) -> String {
        let [r, g, b] = self.color();
        format!("rgb({}, {}, {})", r, g, b)
    }
}

/// Index pairs of the 12 cube edges over the corner order produced by
/// `cube_corners`.
const CUBE_EDGES: [(usize, usize); 12] = [
    (0, 1),
    (1, 3),
    (3, 2),
    (2, 0),
    (4, 5),
    (5, 7),
    (7, 6),
    (6, 4),
    (0, 4),
    (1, 5),
    (2, 6),
    (3, 7),
];

fn cube_corners(half: f64) -> [[f64; 3]; 8] {
    let mut corners = [[0.0; 3]; 8];
    for (i, corner) in corners.iter_mut().enumerate() {
        corner[0] = if i & 1 == 0 { -half } else { half };
        corner[1] = if i & 2 == 0 { -half } else { half };
        corner[2] = if i & 4 == 0 { -half } else { half };
    }
    corners
}

/// Rotate around y, then around x (Euler XYZ with no z component).
fn rotate(v: [f64; 3], (rx, ry): (f64, f64)) -> [f64; 3] {
    let (sy, cy) = ry.sin_cos();
    let x1 = v[0] * cy + v[2] * sy;
    let z1 = -v[0] * sy + v[2] * cy;
    let y1 = v[1];

    let (sx, cx) = rx.sin_cos();
    [x1, y1 * cx - z1 * sx, y1 * sx + z1 * cx]
}

/// Scene state for one context.
#[derive(Debug, Clone)]
pub struct SceneController {
    config: SceneConfig,
    cubes: Vec<CubeProxy>,
    offset: Point,
    offset_target: Point,
    viewport: (f64, f64),
}

impl SceneController {
    /// Create an empty scene.
    pub fn new(config: SceneConfig) -> Self {
        Self {
            config,
            cubes: Vec::new(),
            offset: Point::default(),
            offset_target: Point::default(),
            viewport: (0.0, 0.0),
        }
    }

    /// Replace every cube with one per window, in snapshot order.
    pub fn rebuild(&mut self, windows: &[WindowEntry]) {
        self.cubes = windows
            .iter()
            .enumerate()
            .map(|(i, win)| {
                let (cx, cy) = win.shape.center();
                CubeProxy {
                    window_id: win.id,
                    position: Point::new(cx, cy),
                    rotation: (0.0, 0.0),
                    size: self.config.base_size + i as f64 * self.config.size_step,
                    hue: i as f64 * self.config.hue_step,
                }
            })
            .collect();
        debug!("Scene rebuilt with {} cubes", self.cubes.len());
    }

    /// Point the world offset at the local window's screen position.
    ///
    /// Without easing the offset jumps there immediately.
    pub fn set_offset_target(&mut self, screen_x: f64, screen_y: f64, easing: bool) {
        self.offset_target = Point::new(-screen_x, -screen_y);
        if !easing {
            self.offset = self.offset_target;
        }
    }

    /// Advance one frame.
    ///
    /// `windows` is the registry's current snapshot; cube `i` follows window
    /// `i`. Cubes beyond the end of the snapshot keep their position until
    /// the next rebuild.
    pub fn tick(&mut self, time_secs: f64, windows: &[WindowEntry]) {
        let falloff = self.config.falloff;
        self.offset = self.offset.approach(self.offset_target, falloff);

        let rotation = (
            time_secs * self.config.rotation_speed_x,
            time_secs * self.config.rotation_speed_y,
        );

        for (i, cube) in self.cubes.iter_mut().enumerate() {
            if let Some(win) = windows.get(i) {
                let (cx, cy) = win.shape.center();
                cube.position = cube.position.approach(Point::new(cx, cy), falloff);
            }
            cube.rotation = rotation;
        }
    }

    /// Record the viewport size in pixels.
    pub fn resize(&mut self, width: f64, height: f64) {
        self.viewport = (width, height);
    }

    /// Viewport size in pixels.
    pub fn viewport(&self) -> (f64, f64) {
        self.viewport
    }

    /// Cubes in snapshot order.
    pub fn cubes(&self) -> &[CubeProxy] {
        &self.cubes
    }

    /// Current world offset.
    pub fn offset(&self) -> Point {
        self.offset
    }

    /// Offset the world is easing towards.
    pub fn offset_target(&self) -> Point {
        self.offset_target
    }

    /// Map a scene-space point into viewport space.
    pub fn to_viewport(&self, p: Point) -> Point {
        Point::new(p.x + self.offset.x, p.y + self.offset.y)
    }

    /// Orthographic projection of a cube's 12 edges into viewport space.
    pub fn wireframe(&self, cube: &CubeProxy) -> [(Point, Point); 12] {
        let corners = cube_corners(cube.size * 0.5).map(|c| {
            let r = rotate(c, cube.rotation);
            self.to_viewport(Point::new(cube.position.x + r[0], cube.position.y + r[1]))
        });

        CUBE_EDGES.map(|(a, b)| (corners[a], corners[b]))
    }
}
