//! WinSync Platform Web
//!
//! Browser integration for the window registry.
//!
//! This crate handles:
//! - `localStorage` as the [`SharedStore`](winsync_core::SharedStore) backend
//! - Window geometry from `screenX`/`screenY` and the inner viewport size
//! - `storage` and `beforeunload` hooks that feed the registry
//! - Page startup: `?clear` handling, visibility gating and the render loop
//!
//! Everything that touches the DOM is only compiled for `wasm32`. The pure
//! startup decisions below are shared so they can be tested natively.

#[cfg(target_arch = "wasm32")]
mod app;
#[cfg(target_arch = "wasm32")]
pub mod geometry;
#[cfg(target_arch = "wasm32")]
pub mod hooks;
#[cfg(target_arch = "wasm32")]
pub mod render;
#[cfg(target_arch = "wasm32")]
pub mod storage;

#[cfg(target_arch = "wasm32")]
pub use app::start;

use winsync_protocol::MetaData;

/// Delay between the page becoming visible and registration, in
/// milliseconds. Gives the browser time to settle the window position.
pub const SETTLE_DELAY_MS: i32 = 500;

/// Query parameter that wipes the shared state instead of starting up.
pub const CLEAR_PARAM: &str = "clear";

/// Whether a location search string (`?a=1&clear=1`) asks for a reset.
///
/// Only the first occurrence of the parameter counts, and it must carry a
/// non-empty value: `?clear=1` resets, `?clear` and `?clear=` do not.
pub fn clear_requested(search: &str) -> bool {
    search
        .trim_start_matches('?')
        .split('&')
        .filter(|pair| !pair.is_empty())
        .map(|pair| pair.split_once('=').unwrap_or((pair, "")))
        .find(|(key, _)| *key == CLEAR_PARAM)
        .is_some_and(|(_, value)| !value.is_empty())
}

/// Whether a visibility or load event should trigger registration.
pub fn should_initialize(hidden: bool, already_initialized: bool) -> bool {
    !hidden && !already_initialized
}

/// Metadata every page registers with.
pub fn default_meta_data() -> MetaData {
    let mut meta = MetaData::new();
    meta.insert("foo".to_string(), serde_json::Value::from("bar"));
    meta
}

/// Seconds elapsed between two millisecond timestamps.
pub fn seconds_since(epoch_ms: f64, now_ms: f64) -> f64 {
    (now_ms - epoch_ms) / 1000.0
}
