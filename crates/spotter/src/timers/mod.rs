//! Timer Coordinator.
//!
//! - [`controller`]: one timer's state machine on a monotonic clock
//! - [`coordinator`]: every named timer, ticking, mirroring to the wearable
//! - [`actions`]: decoding completions into engine intents

pub mod actions;
pub mod controller;
pub mod coordinator;

pub use actions::Intent;
pub use controller::{TimerController, TimerError, TimerEvent, TimerState};
pub use coordinator::{NullMirror, TimerCoordinator, TimerMirror};
