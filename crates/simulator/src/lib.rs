//! WinSync Simulator
//!
//! Runs several window registries against one in-memory store, the way
//! several browser windows of one origin share `localStorage`.
//!
//! Modules:
//! - [`config`]: TOML configuration and validation
//! - [`simulation`]: the simulated contexts and the run driver
//! - [`inspect`]: offline checks on dumped snapshots

pub mod config;
pub mod inspect;
pub mod simulation;

pub use config::Config;
pub use simulation::{run_simulation, ContextStatus, SimulationReport, Step};
