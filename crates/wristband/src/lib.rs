//! Wristband: the wearable peer.
//!
//! Samples motion at a phase-dependent rate (50 Hz lifting, 20 Hz resting),
//! detects execution/rest transitions, and ships fixed-size sample chunks to
//! the companion over the transfer channel. It holds no session authority:
//! everything it knows about the workout comes from the companion's context
//! snapshots.
//!
//! ```text
//! MotionSource -> CaptureCore (PhaseDetector + CaptureBuffer) -> TransferChannel
//!                      ^                                             |
//!                      +------- Wearable (PeerHandler) <-------------+
//! ```

pub mod capture;
pub mod detector;
pub mod mirror;
pub mod pipeline;
pub mod sensors;
pub mod wearable;

pub use capture::{spawn_capture_task, CaptureSink, SampleClock};
pub use detector::{PhaseDetector, PhaseTransition};
pub use mirror::{MirrorState, MirroredTimer};
pub use pipeline::{CaptureBuffer, CaptureCore, CaptureOutput};
pub use sensors::{CaptureError, Motion, MotionSource, ScriptedSource, UnavailableSource};
pub use wearable::Wearable;
