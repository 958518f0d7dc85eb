//! Minimal configuration loading for Spotter.
//!
//! Both peers (the wearable capture side and the companion session side)
//! import this crate, so it stays dependency-light.
//!
//! # Usage
//!
//! ```rust,no_run
//! use spotconf::SpotConfig;
//!
//! let config = SpotConfig::load().expect("Failed to load config");
//! println!("history at {}", config.paths.history_dir.display());
//! println!("rest default {}s", config.timers.default_rest_secs);
//! ```
//!
//! # Config File Locations
//!
//! Files are loaded in order (later wins):
//! 1. `/etc/spotter/config.toml` (system)
//! 2. `~/.config/spotter/config.toml` (user)
//! 3. `./spotter.toml` (local override, replaced by an explicit path)
//! 4. Environment variables (`SPOTTER_*`, `RUST_LOG`)
//!
//! # Example Config
//!
//! ```toml
//! [paths]
//! history_dir = "~/.local/share/spotter/history"
//!
//! [phase]
//! intensity_threshold = 0.015
//! confirmation_ms = 1000
//!
//! [timers]
//! default_rest_secs = 120
//! auto_advance_exercises = true
//!
//! [entitlement]
//! free_max_sets_per_exercise = 3
//! ```

pub mod loader;
pub mod sections;

pub use loader::{discover_config_files_with_override, ConfigSources};
pub use sections::{
    CaptureConfig, EntitlementConfig, PathsConfig, PhaseConfig, TelemetryConfig, TimersConfig,
    TransferConfig,
};

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use thiserror::Error;

/// Configuration loading errors.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config file {path}: {source}")]
    FileRead {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("Failed to parse config file {path}: {message}")]
    Parse { path: PathBuf, message: String },
}

/// Complete Spotter configuration.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SpotConfig {
    #[serde(default)]
    pub paths: PathsConfig,

    #[serde(default)]
    pub capture: CaptureConfig,

    #[serde(default)]
    pub phase: PhaseConfig,

    #[serde(default)]
    pub timers: TimersConfig,

    #[serde(default)]
    pub transfer: TransferConfig,

    #[serde(default)]
    pub entitlement: EntitlementConfig,

    #[serde(default)]
    pub telemetry: TelemetryConfig,
}

impl SpotConfig {
    /// Load configuration from all sources.
    pub fn load() -> Result<Self, ConfigError> {
        let (config, _sources) = Self::load_with_sources_from(None)?;
        Ok(config)
    }

    /// Load configuration with an explicit file taking the place of `./spotter.toml`.
    pub fn load_from(config_path: Option<&Path>) -> Result<Self, ConfigError> {
        let (config, _sources) = Self::load_with_sources_from(config_path)?;
        Ok(config)
    }

    /// Load configuration and report where values came from.
    pub fn load_with_sources_from(
        config_path: Option<&Path>,
    ) -> Result<(Self, ConfigSources), ConfigError> {
        let mut sources = ConfigSources::default();
        let mut merged = toml::Table::new();

        for path in loader::discover_config_files_with_override(config_path) {
            let table = loader::read_table(&path)?;
            loader::merge_tables(&mut merged, table);
            sources.files.push(path);
        }

        let mut config = loader::from_table(merged, Path::new("<merged>"))?;
        loader::apply_env_overrides(&mut config, &mut sources);

        Ok((config, sources))
    }

    /// Parse a single TOML document (no discovery, no env overlay).
    pub fn from_toml_str(contents: &str) -> Result<Self, ConfigError> {
        let table = loader::parse_table(contents, Path::new("<string>"))?;
        loader::from_table(table, Path::new("<string>"))
    }

    /// Render the effective configuration as TOML.
    pub fn to_toml(&self) -> String {
        let mut output = String::new();

        output.push_str("# Spotter Configuration\n\n");

        output.push_str("[paths]\n");
        output.push_str(&format!(
            "history_dir = \"{}\"\n",
            self.paths.history_dir.display()
        ));

        output.push_str("\n[capture]\n");
        output.push_str(&format!(
            "execution_interval_ms = {}\n",
            self.capture.execution_interval_ms
        ));
        output.push_str(&format!(
            "rest_interval_ms = {}\n",
            self.capture.rest_interval_ms
        ));
        output.push_str(&format!("chunk_size = {}\n", self.capture.chunk_size));

        output.push_str("\n[phase]\n");
        output.push_str(&format!(
            "intensity_threshold = {}\n",
            self.phase.intensity_threshold
        ));
        output.push_str(&format!("confirmation_ms = {}\n", self.phase.confirmation_ms));
        output.push_str(&format!("window_samples = {}\n", self.phase.window_samples));

        output.push_str("\n[timers]\n");
        output.push_str(&format!(
            "confirmation_secs = {}\n",
            self.timers.confirmation_secs
        ));
        output.push_str(&format!("warning_secs = {}\n", self.timers.warning_secs));
        output.push_str(&format!("tick_ms = {}\n", self.timers.tick_ms));
        output.push_str(&format!(
            "default_rest_secs = {}\n",
            self.timers.default_rest_secs
        ));
        output.push_str(&format!("inactivity_secs = {}\n", self.timers.inactivity_secs));
        output.push_str(&format!(
            "workout_limit_secs = {}\n",
            self.timers.workout_limit_secs
        ));
        output.push_str(&format!(
            "auto_advance_exercises = {}\n",
            self.timers.auto_advance_exercises
        ));

        output.push_str("\n[transfer]\n");
        output.push_str(&format!("ack_timeout_ms = {}\n", self.transfer.ack_timeout_ms));
        output.push_str(&format!(
            "backoff_base_ms = {}\n",
            self.transfer.backoff_base_ms
        ));
        output.push_str(&format!("backoff_max_ms = {}\n", self.transfer.backoff_max_ms));
        output.push_str(&format!("max_failures = {}\n", self.transfer.max_failures));
        output.push_str(&format!("heartbeat_secs = {}\n", self.transfer.heartbeat_secs));

        output.push_str("\n[entitlement]\n");
        output.push_str(&format!(
            "free_max_sets_per_exercise = {}\n",
            self.entitlement.free_max_sets_per_exercise
        ));

        output.push_str("\n[telemetry]\n");
        output.push_str(&format!("log_level = \"{}\"\n", self.telemetry.log_level));

        output
    }
}
