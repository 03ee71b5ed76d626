//! Browser event hooks that keep a registry in step with the other windows.

use std::cell::RefCell;
use std::rc::Rc;
use tracing::{debug, info, warn};
use wasm_bindgen::closure::Closure;
use wasm_bindgen::{JsCast, JsValue};
use web_sys::{Event, StorageEvent, Window};
use winsync_core::WindowRegistry;

use crate::geometry::BrowserGeometry;
use crate::storage::{change_from_event, LocalStorageStore};

/// Registry as shared between the page's event handlers.
pub type SharedRegistry = Rc<RefCell<WindowRegistry<LocalStorageStore, BrowserGeometry>>>;

/// Handle to the installed listeners.
///
/// Must be kept alive to receive events; dropping it removes the listeners.
pub struct EventHookHandle {
    window: Window,
    storage: Closure<dyn FnMut(StorageEvent)>,
    unload: Closure<dyn FnMut(Event)>,
}

impl Drop for EventHookHandle {
    fn drop(&mut self) {
        let _ = self.window.remove_event_listener_with_callback(
            "storage",
            self.storage.as_ref().unchecked_ref(),
        );
        let _ = self.window.remove_event_listener_with_callback(
            "beforeunload",
            self.unload.as_ref().unchecked_ref(),
        );
    }
}

/// Install the `storage` and `beforeunload` listeners for `registry`.
///
/// `storage` events from other windows are fed to
/// [`WindowRegistry::handle_store_change`]; `beforeunload` tears the
/// registry down so this window leaves the shared snapshot.
pub fn install_registry_hooks(
    window: &Window,
    registry: SharedRegistry,
) -> Result<EventHookHandle, JsValue> {
    let on_storage = Rc::clone(&registry);
    let storage = Closure::<dyn FnMut(StorageEvent)>::new(move |event: StorageEvent| {
        let change = change_from_event(&event);
        let Ok(mut registry) = on_storage.try_borrow_mut() else {
            warn!("Registry busy, dropping storage event for {:?}", change.key);
            return;
        };
        if let Err(e) = registry.handle_store_change(&change) {
            debug!("Ignoring storage event: {}", e);
        }
    });

    let on_unload = registry;
    let unload = Closure::<dyn FnMut(Event)>::new(move |_event: Event| {
        let Ok(mut registry) = on_unload.try_borrow_mut() else {
            warn!("Registry busy during unload, window entry may be orphaned");
            return;
        };
        match registry.teardown() {
            Ok(()) => info!("Window deregistered"),
            Err(e) => debug!("Skipping teardown: {}", e),
        }
    });

    window.add_event_listener_with_callback("storage", storage.as_ref().unchecked_ref())?;
    window.add_event_listener_with_callback("beforeunload", unload.as_ref().unchecked_ref())?;

    Ok(EventHookHandle {
        window: window.clone(),
        storage,
        unload,
    })
}
