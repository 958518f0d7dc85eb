//! Spotter: the companion peer.
//!
//! Owns the authoritative workout state for each owner and everything
//! derived from it: the session/exercise/set lifecycle, named timers with
//! auto-actions, confirmation of auto-detected set ends, metric buffering,
//! and migration of finished workouts into immutable history records.
//!
//! ```text
//! wristband --(phase changes, chunks)--> Companion --> SessionMachine --> History
//!     ^                                     |              ^
//!     +---(context, timer commands)---------+-- TimerCoordinator (intents)
//! ```

pub mod detection;
pub mod engine;
pub mod history;
pub mod metrics;
pub mod plan;
pub mod session;
pub mod sim;
pub mod telemetry;
pub mod timers;

pub use detection::{AutoDetection, PendingDetection};
pub use engine::{Companion, EngineEvent};
pub use history::{Access, HistoryArchive, HistorySession};
pub use metrics::{MetricAggregator, MetricKind, MetricSample, RepPrediction};
pub use plan::{ExerciseTemplate, PlannedSet, WorkoutPlan};
pub use session::{EndTrigger, EntityStatus, NextStep, SessionError, SessionMachine, SessionRegistry};
pub use timers::{Intent, TimerCoordinator, TimerError, TimerEvent, TimerState};
