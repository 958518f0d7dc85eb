//! Versioned binary timelines.
//!
//! Telemetry arrays are stored as JSON bytes behind a small version header so
//! a later reader can refuse, rather than misread, a format it does not know.

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use thiserror::Error;

pub const TIMELINE_VERSION: u16 = 1;

#[derive(Debug, Error)]
pub enum MigrationError {
    #[error("failed to serialize {field}: {source}")]
    Serialize {
        field: &'static str,
        #[source]
        source: serde_json::Error,
    },

    #[error("failed to decode timeline: {0}")]
    Decode(#[from] serde_json::Error),

    #[error("{field} has a non-finite value at index {index}")]
    NonFinite { field: &'static str, index: usize },

    #[error("unsupported timeline version {found} (this build reads {current})", current = TIMELINE_VERSION)]
    UnsupportedVersion { found: u16 },
}

/// Values that must be finite to be stored.
pub trait FiniteCheck {
    fn is_finite(&self) -> bool;
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EncodedTimeline {
    pub version: u16,
    pub points: usize,
    #[serde(with = "serde_bytes")]
    pub bytes: Vec<u8>,
}

impl EncodedTimeline {
    pub fn encode<T>(field: &'static str, points: &[T]) -> Result<Self, MigrationError>
    where
        T: Serialize + FiniteCheck,
    {
        if let Some(index) = points.iter().position(|p| !p.is_finite()) {
            return Err(MigrationError::NonFinite { field, index });
        }
        let bytes =
            serde_json::to_vec(points).map_err(|source| MigrationError::Serialize { field, source })?;
        Ok(Self {
            version: TIMELINE_VERSION,
            points: points.len(),
            bytes,
        })
    }

    /// Encode unless empty. Empty telemetry is stored as absent.
    pub fn encode_nonempty<T>(
        field: &'static str,
        points: &[T],
    ) -> Result<Option<Self>, MigrationError>
    where
        T: Serialize + FiniteCheck,
    {
        if points.is_empty() {
            return Ok(None);
        }
        Self::encode(field, points).map(Some)
    }

    pub fn decode<T: DeserializeOwned>(&self) -> Result<Vec<T>, MigrationError> {
        if self.version != TIMELINE_VERSION {
            return Err(MigrationError::UnsupportedVersion {
                found: self.version,
            });
        }
        Ok(serde_json::from_slice(&self.bytes)?)
    }

    pub fn len(&self) -> usize {
        self.points
    }

    pub fn is_empty(&self) -> bool {
        self.points == 0
    }
}

impl FiniteCheck for crate::metrics::MetricSample {
    fn is_finite(&self) -> bool {
        self.value.is_finite()
    }
}

impl FiniteCheck for crate::metrics::RepPrediction {
    fn is_finite(&self) -> bool {
        self.confidence.is_finite()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::metrics::MetricSample;
    use chrono::Utc;

    #[test]
    fn test_encode_decode() {
        let points = vec![
            MetricSample::new(Utc::now(), 98.0),
            MetricSample::new(Utc::now(), 101.5),
        ];
        let timeline = EncodedTimeline::encode("heart_rate", &points).unwrap();
        assert_eq!(timeline.version, TIMELINE_VERSION);
        assert_eq!(timeline.len(), 2);
        let back: Vec<MetricSample> = timeline.decode().unwrap();
        assert_eq!(back, points);
    }

    #[test]
    fn test_non_finite_is_rejected() {
        let points = vec![
            MetricSample::new(Utc::now(), 98.0),
            MetricSample::new(Utc::now(), f64::NAN),
        ];
        let err = EncodedTimeline::encode("heart_rate", &points).unwrap_err();
        assert!(matches!(
            err,
            MigrationError::NonFinite {
                field: "heart_rate",
                index: 1
            }
        ));
    }

    #[test]
    fn test_empty_is_absent() {
        let none = EncodedTimeline::encode_nonempty::<MetricSample>("energy", &[]).unwrap();
        assert!(none.is_none());
    }

    #[test]
    fn test_unknown_version_refused() {
        let mut timeline =
            EncodedTimeline::encode("energy", &[MetricSample::new(Utc::now(), 1.0)]).unwrap();
        timeline.version = 99;
        assert!(matches!(
            timeline.decode::<MetricSample>(),
            Err(MigrationError::UnsupportedVersion { found: 99 })
        ));
    }
}
