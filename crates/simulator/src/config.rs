//! Configuration management for the WinSync simulator.
//!
//! Configuration is loaded from TOML files in the following locations (in order):
//! 1. The platform config directory (`%APPDATA%/winsync/config.toml` on Windows)
//! 2. `~/.config/winsync/config.toml`
//! 3. `./config.toml` (current directory, for development)

use anyhow::{Context, Result};
use directories::ProjectDirs;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use winsync_scene::SceneConfig;

/// Upper bound on simulated contexts.
pub const MAX_CONTEXTS: usize = 64;

/// Upper bound on the tick interval in milliseconds.
pub const MAX_TICK_MS: u64 = 10_000;

const LOG_LEVELS: [&str; 5] = ["trace", "debug", "info", "warn", "error"];

/// Main configuration structure for the simulator.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Simulated contexts and their motion.
    pub simulation: SimulationConfig,
    /// Scene tunables applied to every context.
    pub scene: SceneConfig,
    /// Logging configuration.
    pub logging: LoggingConfig,
}

/// How many contexts to run and how they move.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SimulationConfig {
    /// Number of simulated windows.
    #[serde(default = "default_contexts")]
    pub contexts: usize,

    /// Number of frames to run.
    #[serde(default = "default_ticks")]
    pub ticks: u32,

    /// Delay between frames in milliseconds (0 runs as fast as possible).
    #[serde(default = "default_tick_ms")]
    pub tick_ms: u64,

    /// Horizontal distance between the initial window positions.
    #[serde(default = "default_spacing")]
    pub spacing: i32,

    /// Viewport width of every simulated window.
    #[serde(default = "default_window_width")]
    pub window_width: i32,

    /// Viewport height of every simulated window.
    #[serde(default = "default_window_height")]
    pub window_height: i32,

    /// Horizontal movement of the first window per frame.
    #[serde(default = "default_drift_x")]
    pub drift_x: i32,

    /// Vertical movement of the first window per frame.
    #[serde(default)]
    pub drift_y: i32,
}

impl Default for SimulationConfig {
    fn default() -> Self {
        Self {
            contexts: default_contexts(),
            ticks: default_ticks(),
            tick_ms: default_tick_ms(),
            spacing: default_spacing(),
            window_width: default_window_width(),
            window_height: default_window_height(),
            drift_x: default_drift_x(),
            drift_y: 0,
        }
    }
}

/// Logging configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Log level (trace, debug, info, warn, error).
    #[serde(default = "default_log_level")]
    pub level: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
        }
    }
}

// Default value functions for serde
fn default_contexts() -> usize {
    3
}

fn default_ticks() -> u32 {
    60
}

fn default_tick_ms() -> u64 {
    16
}

fn default_spacing() -> i32 {
    250
}

fn default_window_width() -> i32 {
    800
}

fn default_window_height() -> i32 {
    600
}

fn default_drift_x() -> i32 {
    4
}

fn default_log_level() -> String {
    "info".to_string()
}

/// A config value that was out of range and has been replaced.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConfigWarning {
    pub field: String,
    pub message: String,
}

impl ConfigWarning {
    fn new(field: &str, message: String) -> Self {
        Self {
            field: field.to_string(),
            message,
        }
    }
}

impl Config {
    /// Load configuration from standard locations.
    ///
    /// Returns default config if no file is found.
    pub fn load() -> Result<Self> {
        let paths = config_paths();

        for path in &paths {
            if path.exists() {
                tracing::info!("Loading config from: {}", path.display());
                return Self::load_from_path(path);
            }
        }

        tracing::info!("No config file found, using defaults");
        Ok(Self::default())
    }

    /// Load configuration from a specific path.
    pub fn load_from_path(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;

        let config: Config = toml::from_str(&content)
            .with_context(|| format!("Failed to parse config file: {}", path.display()))?;

        Ok(config)
    }

    /// Clamp out-of-range values, returning one warning per change.
    pub fn validate(&mut self) -> Vec<ConfigWarning> {
        let mut warnings = Vec::new();
        let sim = &mut self.simulation;

        if sim.contexts == 0 || sim.contexts > MAX_CONTEXTS {
            let clamped = sim.contexts.clamp(1, MAX_CONTEXTS);
            warnings.push(ConfigWarning::new(
                "simulation.contexts",
                format!("{} is out of range, using {}", sim.contexts, clamped),
            ));
            sim.contexts = clamped;
        }

        if sim.tick_ms > MAX_TICK_MS {
            warnings.push(ConfigWarning::new(
                "simulation.tick_ms",
                format!("{} is too long, using {}", sim.tick_ms, MAX_TICK_MS),
            ));
            sim.tick_ms = MAX_TICK_MS;
        }

        if sim.window_width <= 0 {
            warnings.push(ConfigWarning::new(
                "simulation.window_width",
                format!("{} must be positive, using {}", sim.window_width, default_window_width()),
            ));
            sim.window_width = default_window_width();
        }

        if sim.window_height <= 0 {
            warnings.push(ConfigWarning::new(
                "simulation.window_height",
                format!("{} must be positive, using {}", sim.window_height, default_window_height()),
            ));
            sim.window_height = default_window_height();
        }

        let falloff = self.scene.falloff;
        if !(falloff > 0.0 && falloff <= 1.0) {
            let fallback = SceneConfig::default().falloff;
            warnings.push(ConfigWarning::new(
                "scene.falloff",
                format!("{} must be in (0, 1], using {}", falloff, fallback),
            ));
            self.scene.falloff = fallback;
        }

        let level = self.logging.level.to_lowercase();
        if !LOG_LEVELS.contains(&level.as_str()) {
            warnings.push(ConfigWarning::new(
                "logging.level",
                format!("unknown level {:?}, using \"info\"", self.logging.level),
            ));
            self.logging.level = default_log_level();
        }

        warnings
    }
}

/// Get all possible config file paths in priority order.
pub fn config_paths() -> Vec<PathBuf> {
    let mut paths = Vec::new();

    if let Some(proj_dirs) = ProjectDirs::from("com", "winsync", "winsync") {
        paths.push(proj_dirs.config_dir().join("config.toml"));
    }

    if let Some(home) = dirs_home() {
        paths.push(home.join(".config").join("winsync").join("config.toml"));
    }

    paths.push(PathBuf::from("config.toml"));

    paths
}

/// Get the user's home directory.
fn dirs_home() -> Option<PathBuf> {
    directories::BaseDirs::new().map(|d| d.home_dir().to_path_buf())
}
