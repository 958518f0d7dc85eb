//! Sensor sample chunks: the durable payload of the transfer channel.

use crate::context::CaptureTarget;
use crate::ids::{ExerciseId, SessionId, SetId};
use crate::phase::Phase;
use crate::sample::MotionSample;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Hard upper bound on samples per chunk.
pub const MAX_CHUNK_SAMPLES: usize = 100;

#[derive(Debug, Error, Clone, PartialEq)]
pub enum ChunkError {
    #[error("chunk has no samples")]
    Empty,
    #[error("chunk has {count} samples, maximum is {MAX_CHUNK_SAMPLES}")]
    TooLarge { count: usize },
    #[error("chunk declares {declared} samples but carries {actual}")]
    CountMismatch { declared: usize, actual: usize },
}

/// A bounded, ordered batch of samples attributed to one set.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SensorSampleChunk {
    pub session_id: SessionId,
    pub exercise_id: ExerciseId,
    pub set_id: SetId,
    pub phase: Phase,
    pub sample_count: usize,
    pub captured_at: DateTime<Utc>,
    pub samples: Vec<MotionSample>,
}

impl SensorSampleChunk {
    pub fn new(
        target: &CaptureTarget,
        phase: Phase,
        samples: Vec<MotionSample>,
    ) -> Result<Self, ChunkError> {
        let chunk = Self {
            session_id: target.session_id,
            exercise_id: target.exercise_id,
            set_id: target.set_id,
            phase,
            sample_count: samples.len(),
            captured_at: Utc::now(),
            samples,
        };
        chunk.validate()?;
        Ok(chunk)
    }

    /// Check the size bound and the declared count.
    pub fn validate(&self) -> Result<(), ChunkError> {
        if self.samples.is_empty() {
            return Err(ChunkError::Empty);
        }
        if self.samples.len() > MAX_CHUNK_SAMPLES {
            return Err(ChunkError::TooLarge {
                count: self.samples.len(),
            });
        }
        if self.sample_count != self.samples.len() {
            return Err(ChunkError::CountMismatch {
                declared: self.sample_count,
                actual: self.samples.len(),
            });
        }
        Ok(())
    }

    pub fn is_for(&self, target: &CaptureTarget) -> bool {
        self.session_id == target.session_id
            && self.exercise_id == target.exercise_id
            && self.set_id == target.set_id
    }

    /// Time between the first and last sample.
    pub fn span(&self) -> chrono::Duration {
        match (self.samples.first(), self.samples.last()) {
            (Some(first), Some(last)) => last.timestamp - first.timestamp,
            _ => chrono::Duration::zero(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn target() -> CaptureTarget {
        CaptureTarget {
            session_id: SessionId::new(),
            exercise_id: ExerciseId::new(),
            set_id: SetId::new(),
            set_order: 1,
        }
    }

    fn samples(n: usize) -> Vec<MotionSample> {
        let start = Utc::now();
        (0..n)
            .map(|i| MotionSample::at_rest(start + chrono::Duration::milliseconds(20 * i as i64)))
            .collect()
    }

    #[test]
    fn test_bounds() {
        let t = target();
        assert_eq!(
            SensorSampleChunk::new(&t, Phase::Execution, vec![]).unwrap_err(),
            ChunkError::Empty
        );
        assert_eq!(
            SensorSampleChunk::new(&t, Phase::Execution, samples(101)).unwrap_err(),
            ChunkError::TooLarge { count: 101 }
        );
        assert!(SensorSampleChunk::new(&t, Phase::Execution, samples(1)).is_ok());
        assert!(SensorSampleChunk::new(&t, Phase::Rest, samples(100)).is_ok());
    }

    #[test]
    fn test_count_mismatch_detected() {
        let mut chunk = SensorSampleChunk::new(&target(), Phase::Execution, samples(5)).unwrap();
        chunk.sample_count = 6;
        assert_eq!(
            chunk.validate().unwrap_err(),
            ChunkError::CountMismatch {
                declared: 6,
                actual: 5
            }
        );
    }

    #[test]
    fn test_stamped_from_target() {
        let t = target();
        let chunk = SensorSampleChunk::new(&t, Phase::Execution, samples(10)).unwrap();
        assert!(chunk.is_for(&t));
        assert!(!chunk.is_for(&target()));
        assert_eq!(chunk.span(), chrono::Duration::milliseconds(180));
    }
}
