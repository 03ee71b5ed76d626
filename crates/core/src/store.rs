//! Shared key-value store abstraction.
//!
//! A store is shared by every context of an origin. Writes replace the whole
//! value of a key, and every *other* context is told about the write
//! asynchronously. The writer never hears about its own writes.

use std::collections::BTreeMap;
use std::sync::mpsc;
use std::sync::{Arc, Mutex};
use thiserror::Error;

/// Errors reported by a store backend.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("Store backend failure: {0}")]
    Backend(String),

    #[error("Store state lock poisoned")]
    Poisoned,
}

/// Notification delivered to the other contexts after a write.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoreChange {
    /// The key that changed, or `None` when the whole store was cleared.
    pub key: Option<String>,
    /// Value before the write.
    pub old_value: Option<String>,
    /// Value after the write, `None` if the key no longer exists.
    pub new_value: Option<String>,
}

impl StoreChange {
    /// Whether this change concerns `key` (a clear concerns every key).
    pub fn affects(&self, key: &str) -> bool {
        self.key.as_deref().map_or(true, |k| k == key)
    }
}

/// Same-origin, cross-context persistent key-value store.
pub trait SharedStore {
    /// Last value written under `key`, if any.
    fn get(&self, key: &str) -> Result<Option<String>, StoreError>;

    /// Replace the value under `key` and notify the other contexts.
    fn set(&self, key: &str, value: &str) -> Result<(), StoreError>;

    /// Delete every key. Debug and reset paths only.
    fn clear(&self) -> Result<(), StoreError>;
}

/// Identifier of a context attached to a [`MemoryStore`].
pub type ContextId = u64;

#[derive(Default)]
struct Hub {
    values: BTreeMap<String, String>,
    subscribers: Vec<(ContextId, mpsc::Sender<StoreChange>)>,
    next_context: ContextId,
}

impl Hub {
    /// Deliver a change to every subscriber except `origin`, dropping the
    /// ones whose receiver is gone.
    fn broadcast(&mut self, origin: ContextId, change: StoreChange) {
        self.subscribers
            .retain(|(id, tx)| *id == origin || tx.send(change.clone()).is_ok());
    }
}

/// In-process store shared by any number of contexts.
///
/// Each context attaches with [`MemoryStore::open_context`] and receives
/// notifications for writes made through the other handles.
#[derive(Clone, Default)]
pub struct MemoryStore {
    hub: Arc<Mutex<Hub>>,
}

impl MemoryStore {
    /// Create an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Attach a new context.
    ///
    /// Returns the context's store handle and the receiving end of its
    /// change notifications.
    pub fn open_context(&self) -> Result<(ContextStore, mpsc::Receiver<StoreChange>), StoreError> {
        let (tx, rx) = mpsc::channel();
        let mut hub = self.hub.lock().map_err(|_| StoreError::Poisoned)?;
        hub.next_context += 1;
        let id = hub.next_context;
        hub.subscribers.push((id, tx));

        Ok((
            ContextStore {
                id,
                hub: Arc::clone(&self.hub),
            },
            rx,
        ))
    }

    /// Current value under `key`, read without going through a context.
    pub fn value(&self, key: &str) -> Option<String> {
        self.hub.lock().ok()?.values.get(key).cloned()
    }

    /// Write a value without notifying anyone, as if it had been left over
    /// from an earlier session.
    pub fn seed(&self, key: &str, value: &str) -> Result<(), StoreError> {
        let mut hub = self.hub.lock().map_err(|_| StoreError::Poisoned)?;
        hub.values.insert(key.to_string(), value.to_string());
        Ok(())
    }

    /// Number of contexts currently attached.
    pub fn context_count(&self) -> usize {
        self.hub.lock().map_or(0, |hub| hub.subscribers.len())
    }
}

/// One context's handle onto a [`MemoryStore`].
///
/// Dropping the handle detaches the context; it stops receiving changes.
pub struct ContextStore {
    id: ContextId,
    hub: Arc<Mutex<Hub>>,
}

impl ContextStore {
    /// Identifier of this context within its store.
    pub fn context_id(&self) -> ContextId {
        self.id
    }
}

impl SharedStore for ContextStore {
    fn get(&self, key: &str) -> Result<Option<String>, StoreError> {
        let hub = self.hub.lock().map_err(|_| StoreError::Poisoned)?;
        Ok(hub.values.get(key).cloned())
    }

    fn set(&self, key: &str, value: &str) -> Result<(), StoreError> {
        let mut hub = self.hub.lock().map_err(|_| StoreError::Poisoned)?;
        let old_value = hub.values.insert(key.to_string(), value.to_string());
        hub.broadcast(
            self.id,
            StoreChange {
                key: Some(key.to_string()),
                old_value,
                new_value: Some(value.to_string()),
            },
        );
        Ok(())
    }

    fn clear(&self) -> Result<(), StoreError> {
        let mut hub = self.hub.lock().map_err(|_| StoreError::Poisoned)?;
        hub.values.clear();
        hub.broadcast(
            self.id,
            StoreChange {
                key: None,
                old_value: None,
                new_value: None,
            },
        );
        Ok(())
    }
}

impl Drop for ContextStore {
    fn drop(&mut self) {
        if let Ok(mut hub) = self.hub.lock() {
            hub.subscribers.retain(|(id, _)| *id != self.id);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_get_missing_key() {
        let store = MemoryStore::new();
        let (ctx, _rx) = store.open_context().unwrap();
        assert_eq!(ctx.get("windows").unwrap(), None);
    }

    #[test]
    fn test_set_replaces_value() {
        let store = MemoryStore::new();
        let (ctx, _rx) = store.open_context().unwrap();
        ctx.set("count", "1").unwrap();
        ctx.set("count", "2").unwrap();
        assert_eq!(ctx.get("count").unwrap().as_deref(), Some("2"));
        assert_eq!(store.value("count").as_deref(), Some("2"));
    }

    #[test]
    fn test_writer_is_not_notified() {
        let store = MemoryStore::new();
        let (a, a_rx) = store.open_context().unwrap();
        let (_b, b_rx) = store.open_context().unwrap();

        a.set("windows", "[]").unwrap();

        assert!(a_rx.try_recv().is_err());
        let change = b_rx.try_recv().unwrap();
        assert_eq!(change.key.as_deref(), Some("windows"));
        assert_eq!(change.old_value, None);
        assert_eq!(change.new_value.as_deref(), Some("[]"));
    }

    #[test]
    fn test_change_carries_old_value() {
        let store = MemoryStore::new();
        let (a, _a_rx) = store.open_context().unwrap();
        let (_b, b_rx) = store.open_context().unwrap();

        a.set("count", "1").unwrap();
        a.set("count", "2").unwrap();

        let _first = b_rx.try_recv().unwrap();
        let second = b_rx.try_recv().unwrap();
        assert_eq!(second.old_value.as_deref(), Some("1"));
        assert_eq!(second.new_value.as_deref(), Some("2"));
    }

    #[test]
    fn test_clear_notifies_with_no_key() {
        let store = MemoryStore::new();
        let (a, _a_rx) = store.open_context().unwrap();
        let (_b, b_rx) = store.open_context().unwrap();
        a.set("count", "3").unwrap();
        let _ = b_rx.try_recv();

        a.clear().unwrap();

        assert_eq!(store.value("count"), None);
        let change = b_rx.try_recv().unwrap();
        assert_eq!(change.key, None);
        assert!(change.affects("windows"));
        assert!(change.affects("count"));
    }

    #[test]
    fn test_dropped_context_detaches() {
        let store = MemoryStore::new();
        let (a, _a_rx) = store.open_context().unwrap();
        let (b, b_rx) = store.open_context().unwrap();
        assert_eq!(store.context_count(), 2);

        drop(b);
        assert_eq!(store.context_count(), 1);

        a.set("windows", "[]").unwrap();
        assert!(b_rx.try_recv().is_err());
    }

    #[test]
    fn test_dead_receiver_is_pruned() {
        let store = MemoryStore::new();
        let (a, _a_rx) = store.open_context().unwrap();
        let (_b, b_rx) = store.open_context().unwrap();
        drop(b_rx);

        a.set("windows", "[]").unwrap();
        assert_eq!(store.context_count(), 1);
    }

    #[test]
    fn test_seed_is_silent() {
        let store = MemoryStore::new();
        let (ctx, rx) = store.open_context().unwrap();
        store.seed("count", "9").unwrap();

        assert!(rx.try_recv().is_err());
        assert_eq!(ctx.get("count").unwrap().as_deref(), Some("9"));
    }

    #[test]
    fn test_change_affects_only_its_key() {
        let change = StoreChange {
            key: Some("count".to_string()),
            old_value: None,
            new_value: Some("1".to_string()),
        };
        assert!(change.affects("count"));
        assert!(!change.affects("windows"));
    }
}
