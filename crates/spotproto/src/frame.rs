//! Frame codec for the peer link.
//!
//! Every frame is one JSON document:
//!
//! ```text
//! { "version": "SPOT01", "seq": 42, "sentAt": "...", "payload": { "kind": "...", ... } }
//! ```
//!
//! The payload is a tagged union so each peer can dispatch by message type
//! without sharing any in-memory state.

use crate::chunk::{ChunkError, SensorSampleChunk};
use crate::context::SessionContext;
use crate::messages::{PhaseChange, TimerCommand};
use bytes::Bytes;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Protocol version identifier
pub const PROTOCOL_VERSION: &str = "SPOT01";

#[derive(Debug, Error)]
pub enum FrameError {
    #[error("Invalid protocol version: expected {PROTOCOL_VERSION}, got {0}")]
    InvalidProtocol(String),
    #[error("JSON decode error: {0}")]
    Decode(#[source] serde_json::Error),
    #[error("JSON encode error: {0}")]
    Encode(#[source] serde_json::Error),
    #[error("Invalid chunk: {0}")]
    Chunk(#[from] ChunkError),
}

/// How the transfer channel treats a payload.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MessageClass {
    /// Dropped when the peer is unreachable; never retried.
    BestEffort,
    /// Queued and retried until acknowledged.
    Durable,
    /// Acknowledgements and heartbeats.
    Control,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Payload {
    Context(SessionContext),
    ContextAck {
        revision: u64,
    },
    PhaseChange(PhaseChange),
    TimerCommand(TimerCommand),
    Chunk {
        #[serde(rename = "transferId")]
        transfer_id: u64,
        chunk: SensorSampleChunk,
    },
    ChunkAck {
        #[serde(rename = "transferId")]
        transfer_id: u64,
    },
    Heartbeat,
}

impl Payload {
    pub fn class(&self) -> MessageClass {
        match self {
            Payload::Context(_) | Payload::PhaseChange(_) | Payload::TimerCommand(_) => {
                MessageClass::BestEffort
            }
            Payload::Chunk { .. } => MessageClass::Durable,
            Payload::ContextAck { .. } | Payload::ChunkAck { .. } | Payload::Heartbeat => {
                MessageClass::Control
            }
        }
    }

    pub fn kind(&self) -> &'static str {
        match self {
            Payload::Context(_) => "context",
            Payload::ContextAck { .. } => "context_ack",
            Payload::PhaseChange(_) => "phase_change",
            Payload::TimerCommand(_) => "timer_command",
            Payload::Chunk { .. } => "chunk",
            Payload::ChunkAck { .. } => "chunk_ack",
            Payload::Heartbeat => "heartbeat",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Envelope {
    pub version: String,
    pub seq: u64,
    pub sent_at: DateTime<Utc>,
    pub payload: Payload,
}

impl Envelope {
    pub fn new(seq: u64, payload: Payload) -> Self {
        Self {
            version: PROTOCOL_VERSION.to_string(),
            seq,
            sent_at: Utc::now(),
            payload,
        }
    }

    pub fn to_bytes(&self) -> Result<Bytes, FrameError> {
        serde_json::to_vec(self)
            .map(Bytes::from)
            .map_err(FrameError::Encode)
    }

    /// Decode a frame, rejecting foreign protocol versions and malformed chunks.
    pub fn from_bytes(data: &[u8]) -> Result<Self, FrameError> {
        let envelope: Envelope = serde_json::from_slice(data).map_err(FrameError::Decode)?;
        if envelope.version != PROTOCOL_VERSION {
            return Err(FrameError::InvalidProtocol(envelope.version));
        }
        if let Payload::Chunk { chunk, .. } = &envelope.payload {
            chunk.validate()?;
        }
        Ok(envelope)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::CaptureTarget;
    use crate::ids::{ExerciseId, SessionId, SetId};
    use crate::phase::Phase;
    use crate::sample::MotionSample;

    #[test]
    fn test_payload_tag() {
        let env = Envelope::new(1, Payload::ContextAck { revision: 4 });
        let json: serde_json::Value = serde_json::from_slice(&env.to_bytes().unwrap()).unwrap();
        assert_eq!(json["version"], PROTOCOL_VERSION);
        assert_eq!(json["payload"]["kind"], "context_ack");
        assert_eq!(json["payload"]["revision"], 4);
    }

    #[test]
    fn test_context_roundtrip_keeps_fields() {
        let ctx = SessionContext {
            revision: 9,
            session_id: Some(SessionId::new()),
            plan_title: Some("Push day".into()),
            is_active: true,
            ..SessionContext::default()
        };
        let bytes = Envelope::new(2, Payload::Context(ctx.clone())).to_bytes().unwrap();
        let decoded = Envelope::from_bytes(&bytes).unwrap();
        assert_eq!(decoded.payload, Payload::Context(ctx));
        assert_eq!(decoded.payload.class(), MessageClass::BestEffort);
    }

    #[test]
    fn test_rejects_foreign_version() {
        let mut env = Envelope::new(1, Payload::Heartbeat);
        env.version = "SPOT99".into();
        let bytes = serde_json::to_vec(&env).unwrap();
        assert!(matches!(
            Envelope::from_bytes(&bytes),
            Err(FrameError::InvalidProtocol(v)) if v == "SPOT99"
        ));
    }

    #[test]
    fn test_rejects_oversized_chunk_on_decode() {
        let target = CaptureTarget {
            session_id: SessionId::new(),
            exercise_id: ExerciseId::new(),
            set_id: SetId::new(),
            set_order: 1,
        };
        let mut chunk = SensorSampleChunk::new(
            &target,
            Phase::Execution,
            vec![MotionSample::at_rest(Utc::now())],
        )
        .unwrap();
        chunk.samples = vec![MotionSample::at_rest(Utc::now()); 101];
        chunk.sample_count = 101;

        let env = Envelope::new(
            3,
            Payload::Chunk {
                transfer_id: 1,
                chunk,
            },
        );
        let bytes = serde_json::to_vec(&env).unwrap();
        assert!(matches!(
            Envelope::from_bytes(&bytes),
            Err(FrameError::Chunk(ChunkError::TooLarge { count: 101 }))
        ));
    }

    #[test]
    fn test_garbage_is_decode_error() {
        assert!(matches!(
            Envelope::from_bytes(b"not json"),
            Err(FrameError::Decode(_))
        ));
    }
}
