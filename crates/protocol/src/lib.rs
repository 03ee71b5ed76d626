//! WinSync Protocol
//!
//! Shared types for cross-context coordination through a shared key-value store.
//!
//! Every context of an origin reads and writes the same two keys:
//! - [`WINDOWS_KEY`]: the ordered snapshot of live windows, as a JSON array
//! - [`COUNT_KEY`]: the identity counter, as decimal text

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Key holding the serialized window snapshot.
pub const WINDOWS_KEY: &str = "windows";

/// Key holding the identity counter.
pub const COUNT_KEY: &str = "count";

/// Identifier assigned to a window at registration.
pub type WindowId = u64;

/// Arbitrary per-window metadata, carried opaquely.
pub type MetaData = serde_json::Map<String, serde_json::Value>;

/// Errors produced while decoding persisted values.
#[derive(Debug, Error)]
pub enum ProtocolError {
    #[error("Invalid window snapshot: {0}")]
    InvalidSnapshot(#[from] serde_json::Error),

    #[error("Invalid identity counter {0:?}")]
    InvalidCounter(String),
}

/// Screen geometry of a window: position on screen plus viewport size.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Rect {
    pub x: i32,
    pub y: i32,
    pub w: i32,
    pub h: i32,
}

impl Rect {
    /// Create a new rectangle.
    pub fn new(x: i32, y: i32, w: i32, h: i32) -> Self {
        Self { x, y, w, h }
    }

    /// Centre of the rectangle in screen coordinates.
    pub fn center(&self) -> (f64, f64) {
        (
            self.x as f64 + self.w as f64 * 0.5,
            self.y as f64 + self.h as f64 * 0.5,
        )
    }

    /// Check if this rectangle intersects with another.
    ///
    /// Edges are computed in `i64` so rectangles near the ends of the `i32`
    /// range compare correctly.
    pub fn intersects(&self, other: &Rect) -> bool {
        let (ax, ay, aw, ah) = (self.x as i64, self.y as i64, self.w as i64, self.h as i64);
        let (bx, by, bw, bh) = (other.x as i64, other.y as i64, other.w as i64, other.h as i64);
        ax < bx + bw && ax + aw > bx && ay < by + bh && ay + ah > by
    }
}

/// One registered window as persisted in the snapshot.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WindowEntry {
    /// Identity assigned from the shared counter.
    pub id: WindowId,
    /// Last geometry reported by the owning context.
    pub shape: Rect,
    /// Caller-supplied metadata.
    #[serde(rename = "metaData", default)]
    pub meta_data: MetaData,
}

impl WindowEntry {
    /// Create a new entry.
    pub fn new(id: WindowId, shape: Rect, meta_data: MetaData) -> Self {
        Self {
            id,
            shape,
            meta_data,
        }
    }
}

/// Serialize a snapshot for storage under [`WINDOWS_KEY`].
pub fn encode_snapshot(windows: &[WindowEntry]) -> Result<String, ProtocolError> {
    Ok(serde_json::to_string(windows)?)
}

/// Parse a value read from [`WINDOWS_KEY`].
///
/// A JSON `null` is accepted and yields an empty snapshot.
pub fn decode_snapshot(value: &str) -> Result<Vec<WindowEntry>, ProtocolError> {
    let windows: Option<Vec<WindowEntry>> = serde_json::from_str(value)?;
    Ok(windows.unwrap_or_default())
}

/// Serialize the identity counter for storage under [`COUNT_KEY`].
pub fn encode_count(count: u64) -> String {
    count.to_string()
}

/// Parse a value read from [`COUNT_KEY`]. Empty text counts as zero.
pub fn decode_count(value: &str) -> Result<u64, ProtocolError> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        return Ok(0);
    }
    trimmed
        .parse()
        .map_err(|_| ProtocolError::InvalidCounter(value.to_string()))
}

/// Position-sensitive identity comparison between two snapshots.
///
/// Reports a change when the lengths differ or when any position holds a
/// different id. Geometry and metadata are ignored.
pub fn identities_changed(previous: &[WindowEntry], next: &[WindowEntry]) -> bool {
    previous.len() != next.len()
        || previous
            .iter()
            .zip(next)
            .any(|(a, b)| a.id != b.id)
}
