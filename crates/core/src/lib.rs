//! WinSync Core
//!
//! Platform-agnostic registry of the windows open on one origin.
//!
//! Contexts never talk to each other directly. Each one keeps its own view of
//! the shared snapshot and:
//! - registers itself on start-up by appending to the snapshot
//! - rewrites its own entry when its geometry changes
//! - replaces its view whenever the store reports that another context wrote
//! - removes its entry right before it goes away
//!
//! The store is injected through [`SharedStore`], so the same registry runs
//! against browser local storage or the in-process [`MemoryStore`].

pub mod registry;
pub mod store;

pub use registry::{
    GeometrySource, RegistryError, RegistryState, ShapeChangedCallback, WindowRegistry,
    WindowsChangedCallback,
};
pub use store::{ContextStore, MemoryStore, SharedStore, StoreChange, StoreError};
pub use winsync_protocol::{MetaData, Rect, WindowEntry, WindowId};
