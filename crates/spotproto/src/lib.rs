//! Spotter wire protocol.
//!
//! Shared by the wearable (`wristband`) and the companion (`spotter`). The two
//! peers share no memory: everything that crosses between them is one of the
//! payloads in [`frame::Payload`].
//!
//! - [`chunk`]: sensor sample chunks, the only durable payload
//! - [`context`]: session context snapshots (companion -> wearable)
//! - [`messages`]: phase changes and timer commands
//! - [`frame`]: envelope codec
//! - `transfer` (feature `peer`): link, retry, health, transfer channel

pub mod chunk;
pub mod context;
pub mod frame;
pub mod ids;
pub mod messages;
pub mod phase;
pub mod sample;

#[cfg(feature = "peer")]
pub mod transfer;

pub use chunk::{ChunkError, SensorSampleChunk, MAX_CHUNK_SAMPLES};
pub use context::{CaptureTarget, SessionContext};
pub use frame::{Envelope, FrameError, MessageClass, Payload, PROTOCOL_VERSION};
pub use ids::{ExerciseId, OwnerId, PlanId, SessionId, SetId, TemplateId};
pub use messages::{
    AutoAction, CancelReason, PhaseChange, TimerCommand, TimerCommandKind, TimerType,
};
pub use phase::Phase;
pub use sample::MotionSample;
