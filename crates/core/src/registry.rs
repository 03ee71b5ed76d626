//! The window registry.
//!
//! One [`WindowRegistry`] lives in each context. It owns exactly one entry of
//! the shared snapshot (its own), rewrites the whole snapshot whenever that
//! entry changes, and adopts whatever snapshot other contexts write.
//!
//! Store failures never surface as errors here: a failed read falls back to
//! an empty snapshot or a zero counter, and a failed write is logged and
//! leaves the shared state stale until the next successful write.

use crate::store::{SharedStore, StoreChange};
use thiserror::Error;
use tracing::{debug, info, warn};
use winsync_protocol::{
    decode_count, decode_snapshot, encode_count, encode_snapshot, identities_changed, MetaData,
    Rect, WindowEntry, WindowId, COUNT_KEY, WINDOWS_KEY,
};

/// Errors caused by using the registry outside its lifecycle.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum RegistryError {
    #[error("Registry has not been initialized")]
    NotInitialized,

    #[error("Registry is already initialized")]
    AlreadyInitialized,

    #[error("Registry has been torn down")]
    Terminated,
}

/// Lifecycle state of a registry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RegistryState {
    /// Created, `initialize` not called yet.
    Uninitialized,
    /// Registered in the shared snapshot.
    Active,
    /// Removed from the shared snapshot; no further operations allowed.
    Terminated,
}

/// Source of this context's current geometry.
pub trait GeometrySource {
    /// Screen position and viewport size of the window right now.
    fn current_shape(&self) -> Rect;
}

impl<F> GeometrySource for F
where
    F: Fn() -> Rect,
{
    fn current_shape(&self) -> Rect {
        self()
    }
}

/// Called with the new geometry after this context's window moved or resized.
pub type ShapeChangedCallback = Box<dyn FnMut(Rect)>;

/// Called with the new snapshot after the set of window identities changed.
pub type WindowsChangedCallback = Box<dyn FnMut(&[WindowEntry])>;

enum Lifecycle {
    Uninitialized,
    Active(WindowEntry),
    Terminated,
}

/// Registry of the windows open on one origin, as seen from one context.
pub struct WindowRegistry<S, G> {
    store: S,
    geometry: G,
    windows: Vec<WindowEntry>,
    lifecycle: Lifecycle,
    on_shape_changed: Option<ShapeChangedCallback>,
    on_windows_changed: Option<WindowsChangedCallback>,
}

impl<S: SharedStore, G: GeometrySource> WindowRegistry<S, G> {
    /// Create an uninitialized registry.
    pub fn new(store: S, geometry: G) -> Self {
        Self {
            store,
            geometry,
            windows: Vec::new(),
            lifecycle: Lifecycle::Uninitialized,
            on_shape_changed: None,
            on_windows_changed: None,
        }
    }

    /// Register this context in the shared snapshot.
    ///
    /// Reads the snapshot and the identity counter, takes the next id, and
    /// writes both back. The counter update is a plain read-modify-write, so
    /// two contexts initializing at the same instant can end up with the
    /// same id.
    pub fn initialize(&mut self, meta_data: MetaData) -> Result<WindowId, RegistryError> {
        match self.lifecycle {
            Lifecycle::Uninitialized => {}
            Lifecycle::Active(_) => return Err(RegistryError::AlreadyInitialized),
            Lifecycle::Terminated => return Err(RegistryError::Terminated),
        }

        let mut windows = self.read_snapshot();
        let id = self.read_count().saturating_add(1);
        let entry = WindowEntry::new(id, self.geometry.current_shape(), meta_data);

        windows.push(entry.clone());
        self.windows = windows;
        self.lifecycle = Lifecycle::Active(entry);

        self.write(COUNT_KEY, &encode_count(id));
        self.persist_windows();

        info!("Registered window {} ({} windows open)", id, self.windows.len());
        Ok(id)
    }

    /// Re-read this window's geometry and publish it if it changed.
    ///
    /// Meant to be called once per frame. Returns `true` when the geometry
    /// changed; nothing is written and no callback fires otherwise.
    pub fn update_geometry(&mut self) -> Result<bool, RegistryError> {
        let shape = self.geometry.current_shape();
        let entry = match &mut self.lifecycle {
            Lifecycle::Active(entry) => entry,
            Lifecycle::Uninitialized => return Err(RegistryError::NotInitialized),
            Lifecycle::Terminated => return Err(RegistryError::Terminated),
        };

        if entry.shape == shape {
            return Ok(false);
        }
        entry.shape = shape;

        match self.windows.iter_mut().find(|w| w.id == entry.id) {
            Some(own) => own.shape = shape,
            None => {
                // Another context rewrote the snapshot without us; put our entry back.
                debug!("Window {} missing from snapshot, re-adding it", entry.id);
                self.windows.push(entry.clone());
            }
        }

        if let Some(callback) = self.on_shape_changed.as_mut() {
            callback(shape);
        }
        self.persist_windows();

        Ok(true)
    }

    /// Adopt a snapshot written by another context.
    ///
    /// The held snapshot is always replaced. The windows-changed callback
    /// fires only when the identities differ position by position; a
    /// geometry-only change is absorbed silently. Returns whether the
    /// identities changed.
    pub fn handle_external_change(
        &mut self,
        windows: Vec<WindowEntry>,
    ) -> Result<bool, RegistryError> {
        self.ensure_active()?;

        let changed = identities_changed(&self.windows, &windows);
        self.windows = windows;

        if changed {
            debug!("Window set changed ({} windows open)", self.windows.len());
            if let Some(callback) = self.on_windows_changed.as_mut() {
                callback(&self.windows);
            }
        }

        Ok(changed)
    }

    /// Apply a store notification.
    ///
    /// Only changes to the snapshot key are considered. A removed key or a
    /// cleared store reads as an empty snapshot; a value that does not parse
    /// is logged and ignored.
    pub fn handle_store_change(&mut self, change: &StoreChange) -> Result<bool, RegistryError> {
        self.ensure_active()?;

        if !change.affects(WINDOWS_KEY) {
            return Ok(false);
        }

        let windows = match change.new_value.as_deref() {
            Some(value) => match decode_snapshot(value) {
                Ok(windows) => windows,
                Err(e) => {
                    warn!("Ignoring unreadable snapshot from another window: {}", e);
                    return Ok(false);
                }
            },
            None => Vec::new(),
        };

        self.handle_external_change(windows)
    }

    /// Remove this window from the shared snapshot.
    ///
    /// Runs synchronously. If the write fails the entry stays behind in the
    /// shared snapshot; the registry is terminated either way.
    pub fn teardown(&mut self) -> Result<(), RegistryError> {
        let id = self.self_id()?;

        if let Some(index) = self.windows.iter().rposition(|w| w.id == id) {
            self.windows.remove(index);
        }
        self.lifecycle = Lifecycle::Terminated;

        if self.persist_windows() {
            info!("Unregistered window {}", id);
        } else {
            warn!("Window {} could not unregister; its entry is orphaned", id);
        }

        Ok(())
    }

    /// Replace the shape-changed callback.
    pub fn set_on_shape_changed(&mut self, callback: impl FnMut(Rect) + 'static) {
        self.on_shape_changed = Some(Box::new(callback));
    }

    /// Replace the windows-changed callback.
    pub fn set_on_windows_changed(&mut self, callback: impl FnMut(&[WindowEntry]) + 'static) {
        self.on_windows_changed = Some(Box::new(callback));
    }

    /// The snapshot as currently held by this context.
    pub fn windows(&self) -> &[WindowEntry] {
        &self.windows
    }

    /// This context's own entry.
    pub fn self_entry(&self) -> Result<&WindowEntry, RegistryError> {
        match &self.lifecycle {
            Lifecycle::Active(entry) => Ok(entry),
            Lifecycle::Uninitialized => Err(RegistryError::NotInitialized),
            Lifecycle::Terminated => Err(RegistryError::Terminated),
        }
    }

    /// This context's window id.
    pub fn self_id(&self) -> Result<WindowId, RegistryError> {
        self.self_entry().map(|entry| entry.id)
    }

    /// Current lifecycle state.
    pub fn state(&self) -> RegistryState {
        match self.lifecycle {
            Lifecycle::Uninitialized => RegistryState::Uninitialized,
            Lifecycle::Active(_) => RegistryState::Active,
            Lifecycle::Terminated => RegistryState::Terminated,
        }
    }

    /// The store this registry writes to.
    pub fn store(&self) -> &S {
        &self.store
    }

    fn ensure_active(&self) -> Result<(), RegistryError> {
        self.self_entry().map(|_| ())
    }

    fn read_snapshot(&self) -> Vec<WindowEntry> {
        match self.store.get(WINDOWS_KEY) {
            Ok(Some(value)) => decode_snapshot(&value).unwrap_or_else(|e| {
                warn!("Stored snapshot unreadable, starting from empty: {}", e);
                Vec::new()
            }),
            Ok(None) => Vec::new(),
            Err(e) => {
                warn!("Failed to read snapshot, starting from empty: {}", e);
                Vec::new()
            }
        }
    }

    fn read_count(&self) -> u64 {
        match self.store.get(COUNT_KEY) {
            Ok(Some(value)) => decode_count(&value).unwrap_or_else(|e| {
                warn!("Stored counter unreadable, starting from zero: {}", e);
                0
            }),
            Ok(None) => 0,
            Err(e) => {
                warn!("Failed to read counter, starting from zero: {}", e);
                0
            }
        }
    }

    fn persist_windows(&self) -> bool {
        match encode_snapshot(&self.windows) {
            Ok(value) => self.write(WINDOWS_KEY, &value),
            Err(e) => {
                warn!("Failed to serialize snapshot: {}", e);
                false
            }
        }
    }

    fn write(&self, key: &str, value: &str) -> bool {
        match self.store.set(key, value) {
            Ok(()) => true,
            Err(e) => {
                warn!("Failed to write {:?}: {}", key, e);
                false
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::{ContextStore, MemoryStore, StoreError};
    use std::cell::{Cell, RefCell};
    use std::rc::Rc;
    use std::sync::mpsc;

    type TestRegistry = WindowRegistry<ContextStore, Box<dyn Fn() -> Rect>>;

    /// A context wired to a shared store, with a handle to move its window.
    struct TestContext {
        registry: TestRegistry,
        changes: mpsc::Receiver<StoreChange>,
        shape: Rc<Cell<Rect>>,
    }

    impl TestContext {
        fn open(store: &MemoryStore, shape: Rect) -> Self {
            let (ctx, changes) = store.open_context().unwrap();
            let shape = Rc::new(Cell::new(shape));
            let source = Rc::clone(&shape);
            let geometry: Box<dyn Fn() -> Rect> = Box::new(move || source.get());
            Self {
                registry: WindowRegistry::new(ctx, geometry),
                changes,
                shape,
            }
        }

        /// Apply every pending notification, returning how many arrived.
        /// Notifications that arrive before registration are discarded.
        fn drain(&mut self) -> usize {
            let mut seen = 0;
            while let Ok(change) = self.changes.try_recv() {
                if self.registry.state() == RegistryState::Active {
                    self.registry.handle_store_change(&change).unwrap();
                }
                seen += 1;
            }
            seen
        }

        fn register(&mut self) -> WindowId {
            self.drain();
            self.registry.initialize(MetaData::new()).unwrap()
        }
    }

    fn ids(windows: &[WindowEntry]) -> Vec<WindowId> {
        windows.iter().map(|w| w.id).collect()
    }

    fn entry(id: WindowId, x: i32) -> WindowEntry {
        WindowEntry::new(id, Rect::new(x, 0, 800, 600), MetaData::new())
    }

    struct FailingStore;

    impl SharedStore for FailingStore {
        fn get(&self, _key: &str) -> Result<Option<String>, StoreError> {
            Err(StoreError::Backend("unavailable".to_string()))
        }

        fn set(&self, _key: &str, _value: &str) -> Result<(), StoreError> {
            Err(StoreError::Backend("quota exceeded".to_string()))
        }

        fn clear(&self) -> Result<(), StoreError> {
            Err(StoreError::Backend("unavailable".to_string()))
        }
    }

    #[test]
    fn test_first_window_gets_id_one() {
        let store = MemoryStore::new();
        let mut a = TestContext::open(&store, Rect::new(10, 20, 800, 600));

        let id = a.registry.initialize(MetaData::new()).unwrap();

        assert_eq!(id, 1);
        assert_eq!(store.value("count").as_deref(), Some("1"));
        assert_eq!(
            store.value("windows").as_deref(),
            Some(r#"[{"id":1,"shape":{"x":10,"y":20,"w":800,"h":600},"metaData":{}}]"#)
        );
        assert_eq!(a.registry.state(), RegistryState::Active);
        assert_eq!(a.registry.self_id().unwrap(), 1);
    }

    #[test]
    fn test_second_window_appends() {
        let store = MemoryStore::new();
        let mut a = TestContext::open(&store, Rect::new(0, 0, 800, 600));
        let mut b = TestContext::open(&store, Rect::new(900, 0, 800, 600));

        a.registry.initialize(MetaData::new()).unwrap();
        let id = b.registry.initialize(MetaData::new()).unwrap();

        assert_eq!(id, 2);
        assert_eq!(ids(b.registry.windows()), vec![1, 2]);
        let persisted = winsync_protocol::decode_snapshot(&store.value("windows").unwrap()).unwrap();
        assert_eq!(ids(&persisted), vec![1, 2]);
        assert_eq!(store.value("count").as_deref(), Some("2"));
    }

    #[test]
    fn test_n_windows_get_distinct_ids() {
        let store = MemoryStore::new();
        let mut contexts: Vec<_> = (0..5)
            .map(|i| TestContext::open(&store, Rect::new(i * 100, 0, 400, 300)))
            .collect();

        for ctx in contexts.iter_mut() {
            ctx.register();
        }
        for ctx in contexts.iter_mut() {
            ctx.drain();
        }

        let mut all: Vec<_> = contexts.iter().map(|c| c.registry.self_id().unwrap()).collect();
        all.sort_unstable();
        all.dedup();
        assert_eq!(all.len(), 5);
        for ctx in &contexts {
            assert_eq!(ids(ctx.registry.windows()), vec![1, 2, 3, 4, 5]);
        }
    }

    #[test]
    fn test_initialize_keeps_metadata() {
        let store = MemoryStore::new();
        let mut a = TestContext::open(&store, Rect::new(0, 0, 10, 10));
        let mut meta = MetaData::new();
        meta.insert("foo".to_string(), serde_json::json!("bar"));

        a.registry.initialize(meta.clone()).unwrap();

        assert_eq!(a.registry.self_entry().unwrap().meta_data, meta);
        let persisted = winsync_protocol::decode_snapshot(&store.value("windows").unwrap()).unwrap();
        assert_eq!(persisted[0].meta_data, meta);
    }

    #[test]
    fn test_initialize_twice_fails() {
        let store = MemoryStore::new();
        let mut a = TestContext::open(&store, Rect::default());
        a.registry.initialize(MetaData::new()).unwrap();
        assert_eq!(
            a.registry.initialize(MetaData::new()),
            Err(RegistryError::AlreadyInitialized)
        );
        assert_eq!(store.value("count").as_deref(), Some("1"));
    }

    #[test]
    fn test_operations_before_initialize_fail() {
        let store = MemoryStore::new();
        let mut a = TestContext::open(&store, Rect::default());

        assert_eq!(a.registry.state(), RegistryState::Uninitialized);
        assert_eq!(a.registry.update_geometry(), Err(RegistryError::NotInitialized));
        assert_eq!(
            a.registry.handle_external_change(Vec::new()),
            Err(RegistryError::NotInitialized)
        );
        assert_eq!(a.registry.teardown(), Err(RegistryError::NotInitialized));
        assert_eq!(a.registry.self_id(), Err(RegistryError::NotInitialized));
        assert_eq!(store.value("windows"), None);
    }

    #[test]
    fn test_operations_after_teardown_fail() {
        let store = MemoryStore::new();
        let mut a = TestContext::open(&store, Rect::default());
        a.registry.initialize(MetaData::new()).unwrap();
        a.registry.teardown().unwrap();

        assert_eq!(a.registry.state(), RegistryState::Terminated);
        assert_eq!(a.registry.update_geometry(), Err(RegistryError::Terminated));
        assert_eq!(a.registry.teardown(), Err(RegistryError::Terminated));
        assert_eq!(
            a.registry.initialize(MetaData::new()),
            Err(RegistryError::Terminated)
        );
    }

    #[test]
    fn test_missing_counter_with_existing_snapshot() {
        let store = MemoryStore::new();
        store.seed("windows", r#"[{"id":4,"shape":{"x":0,"y":0,"w":1,"h":1},"metaData":{}}]"#)
            .unwrap();
        let mut a = TestContext::open(&store, Rect::default());

        let id = a.registry.initialize(MetaData::new()).unwrap();

        assert_eq!(id, 1);
        assert_eq!(ids(a.registry.windows()), vec![4, 1]);
    }

    #[test]
    fn test_corrupt_state_falls_back_to_defaults() {
        let store = MemoryStore::new();
        store.seed("windows", "{{garbage").unwrap();
        store.seed("count", "NaN").unwrap();
        let mut a = TestContext::open(&store, Rect::default());

        let id = a.registry.initialize(MetaData::new()).unwrap();

        assert_eq!(id, 1);
        assert_eq!(ids(a.registry.windows()), vec![1]);
        assert_eq!(store.value("count").as_deref(), Some("1"));
    }

    #[test]
    fn test_update_geometry_idle_is_silent() {
        let store = MemoryStore::new();
        let mut a = TestContext::open(&store, Rect::new(0, 0, 800, 600));
        let (_observer, observer_rx) = store.open_context().unwrap();
        a.registry.initialize(MetaData::new()).unwrap();
        while observer_rx.try_recv().is_ok() {}

        let fired = Rc::new(Cell::new(0));
        let counter = Rc::clone(&fired);
        a.registry.set_on_shape_changed(move |_| counter.set(counter.get() + 1));

        assert!(!a.registry.update_geometry().unwrap());
        assert!(!a.registry.update_geometry().unwrap());

        assert_eq!(fired.get(), 0);
        assert!(observer_rx.try_recv().is_err());
    }

    #[test]
    fn test_update_geometry_publishes_change() {
        let store = MemoryStore::new();
        let mut a = TestContext::open(&store, Rect::new(0, 0, 800, 600));
        a.register();
        let mut b = TestContext::open(&store, Rect::new(900, 0, 800, 600));
        b.register();
        a.drain();

        let seen = Rc::new(RefCell::new(Vec::new()));
        let sink = Rc::clone(&seen);
        a.registry.set_on_shape_changed(move |shape| sink.borrow_mut().push(shape));

        a.shape.set(Rect::new(50, 0, 800, 600));
        assert!(a.registry.update_geometry().unwrap());

        assert_eq!(*seen.borrow(), vec![Rect::new(50, 0, 800, 600)]);
        assert_eq!(a.registry.self_entry().unwrap().shape.x, 50);
        assert_eq!(a.registry.windows()[0].shape.x, 50);

        assert_eq!(b.drain(), 1);
        assert_eq!(b.registry.windows()[0].shape.x, 50);
    }

    #[test]
    fn test_update_geometry_detects_each_component() {
        let store = MemoryStore::new();
        let mut a = TestContext::open(&store, Rect::new(1, 2, 3, 4));
        a.registry.initialize(MetaData::new()).unwrap();

        for next in [
            Rect::new(9, 2, 3, 4),
            Rect::new(9, 9, 3, 4),
            Rect::new(9, 9, 9, 4),
            Rect::new(9, 9, 9, 9),
        ] {
            a.shape.set(next);
            assert!(a.registry.update_geometry().unwrap());
        }
    }

    #[test]
    fn test_update_geometry_restores_lost_entry() {
        let store = MemoryStore::new();
        let mut a = TestContext::open(&store, Rect::new(0, 0, 800, 600));
        a.registry.initialize(MetaData::new()).unwrap();

        // Another context overwrote the snapshot without this window.
        a.registry.handle_external_change(vec![entry(7, 0)]).unwrap();

        a.shape.set(Rect::new(5, 0, 800, 600));
        a.registry.update_geometry().unwrap();

        assert_eq!(ids(a.registry.windows()), vec![7, 1]);
    }

    #[test]
    fn test_geometry_only_change_does_not_fire() {
        let store = MemoryStore::new();
        let mut a = TestContext::open(&store, Rect::new(0, 0, 800, 600));
        a.registry.initialize(MetaData::new()).unwrap();
        a.registry
            .handle_external_change(vec![entry(1, 0), entry(2, 0)])
            .unwrap();

        let fired = Rc::new(Cell::new(0));
        let counter = Rc::clone(&fired);
        a.registry.set_on_windows_changed(move |_| counter.set(counter.get() + 1));

        let changed = a
            .registry
            .handle_external_change(vec![entry(1, 0), entry(2, 333)])
            .unwrap();

        assert!(!changed);
        assert_eq!(fired.get(), 0);
        assert_eq!(a.registry.windows()[1].shape.x, 333);
    }

    #[test]
    fn test_length_change_fires_once() {
        let store = MemoryStore::new();
        let mut a = TestContext::open(&store, Rect::new(0, 0, 800, 600));
        a.registry.initialize(MetaData::new()).unwrap();

        let seen = Rc::new(RefCell::new(Vec::new()));
        let sink = Rc::clone(&seen);
        a.registry
            .set_on_windows_changed(move |windows| sink.borrow_mut().push(ids(windows)));

        assert!(a
            .registry
            .handle_external_change(vec![entry(1, 0), entry(2, 0)])
            .unwrap());

        assert_eq!(*seen.borrow(), vec![vec![1, 2]]);
    }

    #[test]
    fn test_reordered_ids_fire() {
        let store = MemoryStore::new();
        let mut a = TestContext::open(&store, Rect::default());
        a.registry.initialize(MetaData::new()).unwrap();
        a.registry
            .handle_external_change(vec![entry(1, 0), entry(2, 0)])
            .unwrap();

        assert!(a
            .registry
            .handle_external_change(vec![entry(2, 0), entry(1, 0)])
            .unwrap());
    }

    #[test]
    fn test_callback_registration_replaces_previous() {
        let store = MemoryStore::new();
        let mut a = TestContext::open(&store, Rect::default());
        a.registry.initialize(MetaData::new()).unwrap();

        let first = Rc::new(Cell::new(0));
        let second = Rc::new(Cell::new(0));
        let c1 = Rc::clone(&first);
        let c2 = Rc::clone(&second);
        a.registry.set_on_windows_changed(move |_| c1.set(c1.get() + 1));
        a.registry.set_on_windows_changed(move |_| c2.set(c2.get() + 1));

        a.registry.handle_external_change(Vec::new()).unwrap();

        assert_eq!(first.get(), 0);
        assert_eq!(second.get(), 1);
    }

    #[test]
    fn test_store_change_for_other_key_is_ignored() {
        let store = MemoryStore::new();
        let mut a = TestContext::open(&store, Rect::default());
        a.registry.initialize(MetaData::new()).unwrap();

        let change = StoreChange {
            key: Some("count".to_string()),
            old_value: Some("1".to_string()),
            new_value: Some("2".to_string()),
        };
        assert!(!a.registry.handle_store_change(&change).unwrap());
        assert_eq!(ids(a.registry.windows()), vec![1]);
    }

    #[test]
    fn test_store_change_with_garbage_keeps_snapshot() {
        let store = MemoryStore::new();
        let mut a = TestContext::open(&store, Rect::default());
        a.registry.initialize(MetaData::new()).unwrap();

        let change = StoreChange {
            key: Some("windows".to_string()),
            old_value: None,
            new_value: Some("not json".to_string()),
        };
        assert!(!a.registry.handle_store_change(&change).unwrap());
        assert_eq!(ids(a.registry.windows()), vec![1]);
    }

    #[test]
    fn test_cleared_store_empties_snapshot() {
        let store = MemoryStore::new();
        let mut a = TestContext::open(&store, Rect::default());
        let mut b = TestContext::open(&store, Rect::default());
        a.registry.initialize(MetaData::new()).unwrap();
        b.registry.initialize(MetaData::new()).unwrap();
        a.drain();

        b.registry.store().clear().unwrap();
        a.drain();

        assert!(a.registry.windows().is_empty());
    }

    #[test]
    fn test_teardown_removes_own_entry() {
        let store = MemoryStore::new();
        let mut a = TestContext::open(&store, Rect::default());
        let mut b = TestContext::open(&store, Rect::default());
        a.registry.initialize(MetaData::new()).unwrap();
        b.registry.initialize(MetaData::new()).unwrap();
        a.drain();

        a.registry.teardown().unwrap();

        let persisted = winsync_protocol::decode_snapshot(&store.value("windows").unwrap()).unwrap();
        assert_eq!(ids(&persisted), vec![2]);
    }

    #[test]
    fn test_teardown_propagates_to_others() {
        let store = MemoryStore::new();
        let mut contexts: Vec<_> = (0..4)
            .map(|_| TestContext::open(&store, Rect::default()))
            .collect();
        for ctx in contexts.iter_mut() {
            ctx.register();
        }
        for ctx in contexts.iter_mut() {
            ctx.drain();
        }

        let mut leaving = contexts.remove(1);
        let leaving_id = leaving.registry.self_id().unwrap();
        leaving.registry.teardown().unwrap();

        for ctx in contexts.iter_mut() {
            let before = ctx.registry.windows().len();
            ctx.drain();
            assert_eq!(ctx.registry.windows().len(), before - 1);
            assert!(ctx.registry.windows().iter().all(|w| w.id != leaving_id));
        }
    }

    #[test]
    fn test_teardown_with_duplicate_ids_removes_one() {
        let store = MemoryStore::new();
        let mut a = TestContext::open(&store, Rect::default());
        a.registry.initialize(MetaData::new()).unwrap();
        a.registry
            .handle_external_change(vec![entry(1, 0), entry(1, 100)])
            .unwrap();

        a.registry.teardown().unwrap();

        let persisted = winsync_protocol::decode_snapshot(&store.value("windows").unwrap()).unwrap();
        assert_eq!(persisted, vec![entry(1, 0)]);
    }

    #[test]
    fn test_failing_store_degrades_silently() {
        let shape = Rect::new(0, 0, 640, 480);
        let mut registry = WindowRegistry::new(FailingStore, move || shape);

        assert_eq!(registry.initialize(MetaData::new()), Ok(1));
        assert_eq!(registry.windows().len(), 1);
        assert_eq!(registry.teardown(), Ok(()));
        assert_eq!(registry.state(), RegistryState::Terminated);
    }
}

#[cfg(test)]
mod proptests {
    use super::*;
    use crate::store::MemoryStore;
    use proptest::prelude::*;

    proptest! {
        /// Any number of sequential registrations yields a snapshot of that
        /// length with distinct ids in registration order
        #[test]
        fn sequential_registrations_are_distinct(n in 1usize..12) {
            let store = MemoryStore::new();
            let mut registries = Vec::new();
            for i in 0..n {
                let (ctx, _rx) = store.open_context().unwrap();
                let x = i as i32 * 10;
                let mut registry = WindowRegistry::new(ctx, move || Rect::new(x, 0, 100, 100));
                registry.initialize(MetaData::new()).unwrap();
                registries.push(registry);
            }

            let last = registries.last().unwrap();
            let ids: Vec<_> = last.windows().iter().map(|w| w.id).collect();
            let expected: Vec<_> = (1..=n as u64).collect();
            prop_assert_eq!(ids, expected);
        }
    }
}
