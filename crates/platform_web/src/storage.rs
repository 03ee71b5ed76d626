//! `localStorage` backend.

use wasm_bindgen::JsValue;
use web_sys::{Storage, StorageEvent, Window};
use winsync_core::{SharedStore, StoreChange, StoreError};

/// The origin's `localStorage`, shared by every tab and window.
///
/// The browser delivers change notifications to the other contexts as
/// `storage` events; see [`change_from_event`].
pub struct LocalStorageStore {
    storage: Storage,
}

impl LocalStorageStore {
    /// Open the `localStorage` of `window`.
    pub fn from_window(window: &Window) -> Result<Self, StoreError> {
        let storage = window
            .local_storage()
            .map_err(backend_error)?
            .ok_or_else(|| StoreError::Backend("localStorage is not available".to_string()))?;
        Ok(Self { storage })
    }
}

impl SharedStore for LocalStorageStore {
    fn get(&self, key: &str) -> Result<Option<String>, StoreError> {
        self.storage.get_item(key).map_err(backend_error)
    }

    fn set(&self, key: &str, value: &str) -> Result<(), StoreError> {
        self.storage.set_item(key, value).map_err(backend_error)
    }

    fn clear(&self) -> Result<(), StoreError> {
        self.storage.clear().map_err(backend_error)
    }
}

/// Translate a `storage` event into a [`StoreChange`].
///
/// A `null` key means the store was cleared.
pub fn change_from_event(event: &StorageEvent) -> StoreChange {
    StoreChange {
        key: event.key(),
        old_value: event.old_value(),
        new_value: event.new_value(),
    }
}

fn backend_error(value: JsValue) -> StoreError {
    StoreError::Backend(format!("{:?}", value))
}
