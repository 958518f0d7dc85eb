//! Configuration sections. Every field carries a serde default so a partial
//! (or empty) file is always valid.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

/// Filesystem paths for Spotter state.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PathsConfig {
    /// Directory of the history ledger (immutable workout records).
    /// Default: ~/.local/share/spotter/history
    #[serde(default = "PathsConfig::default_history_dir")]
    pub history_dir: PathBuf,
}

impl PathsConfig {
    fn default_history_dir() -> PathBuf {
        directories::BaseDirs::new()
            .map(|dirs| dirs.home_dir().join(".local/share/spotter/history"))
            .unwrap_or_else(|| PathBuf::from(".local/share/spotter/history"))
    }
}

impl Default for PathsConfig {
    fn default() -> Self {
        Self {
            history_dir: Self::default_history_dir(),
        }
    }
}

/// Sample capture on the wearable.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CaptureConfig {
    /// Sampling interval while lifting (50 Hz).
    #[serde(default = "CaptureConfig::default_execution_interval_ms")]
    pub execution_interval_ms: u64,

    /// Sampling interval while resting (20 Hz).
    #[serde(default = "CaptureConfig::default_rest_interval_ms")]
    pub rest_interval_ms: u64,

    /// Samples per emitted chunk. Clamped to the protocol maximum.
    #[serde(default = "CaptureConfig::default_chunk_size")]
    pub chunk_size: usize,
}

impl CaptureConfig {
    fn default_execution_interval_ms() -> u64 {
        20
    }

    fn default_rest_interval_ms() -> u64 {
        50
    }

    fn default_chunk_size() -> usize {
        100
    }

    pub fn execution_interval(&self) -> Duration {
        Duration::from_millis(self.execution_interval_ms.max(1))
    }

    pub fn rest_interval(&self) -> Duration {
        Duration::from_millis(self.rest_interval_ms.max(1))
    }
}

impl Default for CaptureConfig {
    fn default() -> Self {
        Self {
            execution_interval_ms: Self::default_execution_interval_ms(),
            rest_interval_ms: Self::default_rest_interval_ms(),
            chunk_size: Self::default_chunk_size(),
        }
    }
}

/// Execution/rest phase detection.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PhaseConfig {
    /// Motion intensity below which the wearer is considered still.
    #[serde(default = "PhaseConfig::default_intensity_threshold")]
    pub intensity_threshold: f64,

    /// How long intensity must stay below threshold before execution -> rest.
    #[serde(default = "PhaseConfig::default_confirmation_ms")]
    pub confirmation_ms: u64,

    /// Number of recent samples in the rolling intensity window.
    #[serde(default = "PhaseConfig::default_window_samples")]
    pub window_samples: usize,
}

impl PhaseConfig {
    fn default_intensity_threshold() -> f64 {
        0.015
    }

    fn default_confirmation_ms() -> u64 {
        1000
    }

    fn default_window_samples() -> usize {
        25
    }

    pub fn confirmation(&self) -> Duration {
        Duration::from_millis(self.confirmation_ms)
    }
}

impl Default for PhaseConfig {
    fn default() -> Self {
        Self {
            intensity_threshold: Self::default_intensity_threshold(),
            confirmation_ms: Self::default_confirmation_ms(),
            window_samples: Self::default_window_samples(),
        }
    }
}

/// Timer coordinator settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TimersConfig {
    /// Window the user has to confirm an auto-detected set end.
    #[serde(default = "TimersConfig::default_confirmation_secs")]
    pub confirmation_secs: u64,

    /// Remaining time at which a warning event fires.
    #[serde(default = "TimersConfig::default_warning_secs")]
    pub warning_secs: u64,

    /// Ticker period for all timer controllers.
    #[serde(default = "TimersConfig::default_tick_ms")]
    pub tick_ms: u64,

    /// Rest duration used when the plan does not specify one.
    #[serde(default = "TimersConfig::default_rest_secs")]
    pub default_rest_secs: u64,

    /// Inactivity prompt after this long without a lifecycle operation. 0 disables.
    #[serde(default = "TimersConfig::default_inactivity_secs")]
    pub inactivity_secs: u64,

    /// Hard cap on workout length, ending the workout automatically. 0 disables.
    #[serde(default)]
    pub workout_limit_secs: u64,

    /// Rest after the last planned set advances to the next exercise instead
    /// of proposing to complete the current one.
    #[serde(default)]
    pub auto_advance_exercises: bool,
}

impl TimersConfig {
    fn default_confirmation_secs() -> u64 {
        10
    }

    fn default_warning_secs() -> u64 {
        10
    }

    fn default_tick_ms() -> u64 {
        250
    }

    fn default_rest_secs() -> u64 {
        90
    }

    fn default_inactivity_secs() -> u64 {
        600
    }

    pub fn confirmation(&self) -> Duration {
        Duration::from_secs(self.confirmation_secs)
    }

    pub fn warning(&self) -> Duration {
        Duration::from_secs(self.warning_secs)
    }

    pub fn tick(&self) -> Duration {
        Duration::from_millis(self.tick_ms.max(1))
    }

    pub fn default_rest(&self) -> Duration {
        Duration::from_secs(self.default_rest_secs)
    }

    pub fn inactivity(&self) -> Option<Duration> {
        (self.inactivity_secs > 0).then(|| Duration::from_secs(self.inactivity_secs))
    }

    pub fn workout_limit(&self) -> Option<Duration> {
        (self.workout_limit_secs > 0).then(|| Duration::from_secs(self.workout_limit_secs))
    }
}

impl Default for TimersConfig {
    fn default() -> Self {
        Self {
            confirmation_secs: Self::default_confirmation_secs(),
            warning_secs: Self::default_warning_secs(),
            tick_ms: Self::default_tick_ms(),
            default_rest_secs: Self::default_rest_secs(),
            inactivity_secs: Self::default_inactivity_secs(),
            workout_limit_secs: 0,
            auto_advance_exercises: false,
        }
    }
}

/// Transfer channel retry and health tracking.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TransferConfig {
    /// How long a durable transfer waits for its ack before resending.
    #[serde(default = "TransferConfig::default_ack_timeout_ms")]
    pub ack_timeout_ms: u64,

    /// Initial backoff after a failed send.
    #[serde(default = "TransferConfig::default_backoff_base_ms")]
    pub backoff_base_ms: u64,

    /// Backoff cap.
    #[serde(default = "TransferConfig::default_backoff_max_ms")]
    pub backoff_max_ms: u64,

    /// Consecutive failures before the peer is considered dead.
    #[serde(default = "TransferConfig::default_max_failures")]
    pub max_failures: u32,

    /// Context heartbeat period.
    #[serde(default = "TransferConfig::default_heartbeat_secs")]
    pub heartbeat_secs: u64,
}

impl TransferConfig {
    fn default_ack_timeout_ms() -> u64 {
        2000
    }

    fn default_backoff_base_ms() -> u64 {
        100
    }

    fn default_backoff_max_ms() -> u64 {
        5000
    }

    fn default_max_failures() -> u32 {
        5
    }

    fn default_heartbeat_secs() -> u64 {
        5
    }

    pub fn heartbeat(&self) -> Duration {
        Duration::from_secs(self.heartbeat_secs.max(1))
    }
}

impl Default for TransferConfig {
    fn default() -> Self {
        Self {
            ack_timeout_ms: Self::default_ack_timeout_ms(),
            backoff_base_ms: Self::default_backoff_base_ms(),
            backoff_max_ms: Self::default_backoff_max_ms(),
            max_failures: Self::default_max_failures(),
            heartbeat_secs: Self::default_heartbeat_secs(),
        }
    }
}

/// Free-tier limits. The limit itself is enforced by a delegated policy.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct EntitlementConfig {
    /// Maximum live sets per exercise for free-tier owners. 0 disables.
    #[serde(default)]
    pub free_max_sets_per_exercise: u32,
}

/// Logging.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TelemetryConfig {
    /// Log level or EnvFilter directive (trace, debug, info, warn, error).
    /// Default: info
    #[serde(default = "TelemetryConfig::default_log_level")]
    pub log_level: String,
}

impl TelemetryConfig {
    fn default_log_level() -> String {
        "info".to_string()
    }
}

impl Default for TelemetryConfig {
    fn default() -> Self {
        Self {
            log_level: Self::default_log_level(),
        }
    }
}
