//! Metric Aggregator.
//!
//! Vital-sign samples pushed by the vitals collaborator are buffered for
//! every live scope at once (set, exercise, session) and handed over when
//! that scope is finalized. Rep predictions from the ML collaborator and the
//! motion summary built from consumed chunks belong to the live set only.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use spotproto::{ExerciseId, Phase, SensorSampleChunk, SessionId, SetId};
use std::fmt;
use tracing::debug;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum MetricKind {
    HeartRate,
    Energy,
}

impl MetricKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            MetricKind::HeartRate => "heart_rate",
            MetricKind::Energy => "energy",
        }
    }
}

impl fmt::Display for MetricKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One `{ timestamp, value }` reading.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct MetricSample {
    pub timestamp: DateTime<Utc>,
    pub value: f64,
}

impl MetricSample {
    pub fn new(timestamp: DateTime<Utc>, value: f64) -> Self {
        Self { timestamp, value }
    }
}

/// Rep count inferred from captured motion by the ML collaborator.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RepPrediction {
    pub timestamp: DateTime<Utc>,
    pub rep_count: u32,
    pub confidence: f64,
}

/// What the companion kept from the raw chunks of one set.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MotionSummary {
    pub chunks: u32,
    pub samples: u64,
    pub execution_samples: u64,
    pub rest_samples: u64,
    pub peak_acceleration: f64,
    pub first_sample: Option<DateTime<Utc>>,
    pub last_sample: Option<DateTime<Utc>>,
}

impl MotionSummary {
    pub fn absorb(&mut self, chunk: &SensorSampleChunk) {
        self.chunks += 1;
        let count = chunk.samples.len() as u64;
        self.samples += count;
        match chunk.phase {
            Phase::Execution => self.execution_samples += count,
            Phase::Rest => self.rest_samples += count,
        }
        for sample in &chunk.samples {
            let magnitude = sample.acceleration_magnitude();
            if magnitude.is_finite() && magnitude > self.peak_acceleration {
                self.peak_acceleration = magnitude;
            }
        }
        if let Some(first) = chunk.samples.first() {
            let earliest = self.first_sample.map_or(first.timestamp, |t| t.min(first.timestamp));
            self.first_sample = Some(earliest);
        }
        if let Some(last) = chunk.samples.last() {
            let latest = self.last_sample.map_or(last.timestamp, |t| t.max(last.timestamp));
            self.last_sample = Some(latest);
        }
    }
}

/// Buffered vital signs for one scope.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct VitalsBuffer {
    pub heart_rate: Vec<MetricSample>,
    pub energy: Vec<MetricSample>,
}

impl VitalsBuffer {
    pub fn push(&mut self, kind: MetricKind, sample: MetricSample) {
        match kind {
            MetricKind::HeartRate => self.heart_rate.push(sample),
            MetricKind::Energy => self.energy.push(sample),
        }
    }

    pub fn get(&self, kind: MetricKind) -> &[MetricSample] {
        match kind {
            MetricKind::HeartRate => &self.heart_rate,
            MetricKind::Energy => &self.energy,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.heart_rate.is_empty() && self.energy.is_empty()
    }
}

/// Everything buffered for one set, handed to migration on finalize.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SetTelemetry {
    pub vitals: VitalsBuffer,
    pub reps: Vec<RepPrediction>,
    pub motion: Option<MotionSummary>,
}

impl SetTelemetry {
    /// Most recent ML rep count, if any prediction arrived.
    pub fn predicted_reps(&self) -> Option<u32> {
        self.reps.last().map(|p| p.rep_count)
    }
}

#[derive(Debug)]
struct Scoped<I, T> {
    id: I,
    data: T,
}

#[derive(Debug, Default)]
pub struct MetricAggregator {
    accepting: bool,
    session: Option<Scoped<SessionId, VitalsBuffer>>,
    exercise: Option<Scoped<ExerciseId, VitalsBuffer>>,
    set: Option<Scoped<SetId, SetTelemetry>>,
}

impl MetricAggregator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_accepting(&self) -> bool {
        self.accepting
    }

    pub fn begin_session(&mut self, id: SessionId) {
        self.accepting = true;
        self.session = Some(Scoped {
            id,
            data: VitalsBuffer::default(),
        });
        self.exercise = None;
        self.set = None;
    }

    pub fn begin_exercise(&mut self, id: ExerciseId) {
        self.exercise = Some(Scoped {
            id,
            data: VitalsBuffer::default(),
        });
    }

    pub fn begin_set(&mut self, id: SetId) {
        self.set = Some(Scoped {
            id,
            data: SetTelemetry::default(),
        });
    }

    /// Stop buffering. Data already buffered stays available to `take_*`.
    pub fn stop(&mut self) {
        self.accepting = false;
    }

    /// Buffer a vital-sign sample into every live scope. Returns whether any
    /// scope took it.
    pub fn push(&mut self, kind: MetricKind, sample: MetricSample) -> bool {
        if !self.accepting {
            return false;
        }
        let mut taken = false;
        if let Some(scope) = &mut self.session {
            scope.data.push(kind, sample);
            taken = true;
        }
        if let Some(scope) = &mut self.exercise {
            scope.data.push(kind, sample);
        }
        if let Some(scope) = &mut self.set {
            scope.data.vitals.push(kind, sample);
        }
        taken
    }

    pub fn push_prediction(&mut self, set_id: SetId, prediction: RepPrediction) -> bool {
        match &mut self.set {
            Some(scope) if self.accepting && scope.id == set_id => {
                scope.data.reps.push(prediction);
                true
            }
            _ => false,
        }
    }

    /// Fold a consumed chunk into the live set's motion summary. Chunks for
    /// any other set are refused.
    pub fn absorb_chunk(&mut self, chunk: &SensorSampleChunk) -> bool {
        match &mut self.set {
            Some(scope) if self.accepting && scope.id == chunk.set_id => {
                scope
                    .data
                    .motion
                    .get_or_insert_with(MotionSummary::default)
                    .absorb(chunk);
                true
            }
            _ => false,
        }
    }

    pub fn take_set(&mut self, id: SetId) -> SetTelemetry {
        match self.set.take() {
            Some(scope) if scope.id == id => scope.data,
            other => {
                debug!(set_id = %id, "no telemetry buffered for set");
                self.set = other;
                SetTelemetry::default()
            }
        }
    }

    pub fn take_exercise(&mut self, id: ExerciseId) -> VitalsBuffer {
        match self.exercise.take() {
            Some(scope) if scope.id == id => scope.data,
            other => {
                self.exercise = other;
                VitalsBuffer::default()
            }
        }
    }

    pub fn take_session(&mut self, id: SessionId) -> VitalsBuffer {
        match self.session.take() {
            Some(scope) if scope.id == id => {
                self.accepting = false;
                scope.data
            }
            other => {
                self.session = other;
                VitalsBuffer::default()
            }
        }
    }
}
