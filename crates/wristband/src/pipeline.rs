//! Capture state shared by the sampling task and the peer handler.
//!
//! All mutations go through one mutex, so a chunk is always stamped with the
//! context applied at the moment it is emitted: a context switch flushes the
//! buffer under the old identifiers before the new ones take effect.

use crate::detector::{PhaseDetector, PhaseTransition};
use spotconf::{CaptureConfig, PhaseConfig};
use spotproto::{
    CaptureTarget, MotionSample, Phase, PhaseChange, SensorSampleChunk, SessionContext,
    MAX_CHUNK_SAMPLES,
};
use std::time::Duration;
use tracing::{debug, info, warn};

/// Work produced by a core mutation, published by the caller after the lock
/// is released.
#[derive(Debug, Default)]
pub struct CaptureOutput {
    pub chunks: Vec<SensorSampleChunk>,
    pub phase_change: Option<PhaseChange>,
    /// The sampling interval changed.
    pub retime: bool,
    /// A set this peer was capturing for has ended on the companion.
    pub finished_set: Option<spotproto::SetId>,
}

impl CaptureOutput {
    pub fn is_empty(&self) -> bool {
        self.chunks.is_empty()
            && self.phase_change.is_none()
            && !self.retime
            && self.finished_set.is_none()
    }
}

/// Fixed-capacity sample buffer.
#[derive(Debug, Clone)]
pub struct CaptureBuffer {
    chunk_size: usize,
    samples: Vec<MotionSample>,
}

impl CaptureBuffer {
    pub fn new(chunk_size: usize) -> Self {
        let chunk_size = chunk_size.clamp(1, MAX_CHUNK_SAMPLES);
        Self {
            chunk_size,
            samples: Vec::with_capacity(chunk_size),
        }
    }

    pub fn len(&self) -> usize {
        self.samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    /// Append a sample, emitting a full chunk when capacity is reached.
    pub fn push(
        &mut self,
        sample: MotionSample,
        target: &CaptureTarget,
        phase: Phase,
    ) -> Option<SensorSampleChunk> {
        self.samples.push(sample);
        if self.samples.len() >= self.chunk_size {
            return self.flush(target, phase);
        }
        None
    }

    /// Emit whatever is buffered, even a partial chunk.
    pub fn flush(&mut self, target: &CaptureTarget, phase: Phase) -> Option<SensorSampleChunk> {
        if self.samples.is_empty() {
            return None;
        }
        let samples = std::mem::replace(&mut self.samples, Vec::with_capacity(self.chunk_size));
        match SensorSampleChunk::new(target, phase, samples) {
            Ok(chunk) => Some(chunk),
            Err(e) => {
                warn!(error = %e, "dropping malformed chunk");
                None
            }
        }
    }

    pub fn clear(&mut self) {
        self.samples.clear();
    }
}

#[derive(Debug)]
pub struct CaptureCore {
    context: SessionContext,
    buffer: CaptureBuffer,
    detector: PhaseDetector,
    execution_interval: Duration,
    rest_interval: Duration,
}

impl CaptureCore {
    pub fn new(capture: &CaptureConfig, phase: &PhaseConfig) -> Self {
        Self {
            context: SessionContext::default(),
            buffer: CaptureBuffer::new(capture.chunk_size),
            detector: PhaseDetector::new(phase),
            execution_interval: capture.execution_interval(),
            rest_interval: capture.rest_interval(),
        }
    }

    pub fn context(&self) -> &SessionContext {
        &self.context
    }

    pub fn phase(&self) -> Phase {
        self.detector.phase()
    }

    pub fn detector(&self) -> &PhaseDetector {
        &self.detector
    }

    pub fn buffered(&self) -> usize {
        self.buffer.len()
    }

    pub fn is_capturing(&self) -> bool {
        self.context.capture_target().is_some()
    }

    /// Sampling interval for the current phase.
    pub fn interval(&self) -> Duration {
        match self.detector.phase() {
            Phase::Execution => self.execution_interval,
            Phase::Rest => self.rest_interval,
        }
    }

    /// Apply a context snapshot if it is newer than the one held.
    /// Returns the revision held afterwards.
    pub fn apply_context(&mut self, context: SessionContext, out: &mut CaptureOutput) -> u64 {
        if !context.is_newer_than(&self.context) && self.context.revision != 0 {
            debug!(
                held = self.context.revision,
                offered = context.revision,
                "ignoring stale context"
            );
            return self.context.revision;
        }

        let old_target = self.context.capture_target();
        let new_target = context.capture_target();
        let set_changed = old_target.map(|t| t.set_id) != new_target.map(|t| t.set_id);

        if set_changed {
            if let Some(old) = old_target {
                out.chunks.extend(self.buffer.flush(&old, self.detector.phase()));
                out.finished_set = Some(old.set_id);
            }
            self.buffer.clear();
            let before = self.detector.phase();
            self.detector.reset();
            out.retime |= before != self.detector.phase();
            match new_target {
                Some(t) => info!(set_id = %t.set_id, set_order = t.set_order, "capturing for set"),
                None => info!("capture idle"),
            }
        }

        self.context = context;
        self.context.revision
    }

    /// Feed one sample through the detector and the buffer.
    pub fn ingest(&mut self, sample: MotionSample, out: &mut CaptureOutput) {
        let Some(target) = self.context.capture_target() else {
            return;
        };

        let captured_in = self.detector.phase();
        let transition = self.detector.observe(&sample);
        out.chunks
            .extend(self.buffer.push(sample, &target, captured_in));

        if let Some(transition) = transition {
            self.on_transition(&target, transition, out);
        }
    }

    fn on_transition(
        &mut self,
        target: &CaptureTarget,
        transition: PhaseTransition,
        out: &mut CaptureOutput,
    ) {
        out.chunks
            .extend(self.buffer.flush(target, transition.from));
        out.retime = true;
        self.context.phase = transition.to;
        if transition.notify {
            out.phase_change = Some(PhaseChange::new(
                target,
                self.context.exercise_name.clone(),
                transition.to,
            ));
        }
    }

    /// Manual phase change requested by the companion.
    pub fn force_phase(&mut self, phase: Phase, out: &mut CaptureOutput) {
        let from = self.detector.phase();
        self.detector.force_phase(phase);
        self.context.phase = phase;
        if from != phase {
            if let Some(target) = self.context.capture_target() {
                out.chunks.extend(self.buffer.flush(&target, from));
            }
            out.retime = true;
        }
    }

    /// The user rejected an auto-detected set end: go back to execution and
    /// swallow the next rest notification.
    pub fn reject_detection(&mut self, out: &mut CaptureOutput) {
        self.force_phase(Phase::Execution, out);
        self.detector.suppress(Phase::Rest);
    }

    /// Flush everything (shutdown).
    pub fn drain(&mut self, out: &mut CaptureOutput) {
        if let Some(target) = self.context.capture_target() {
            out.chunks
                .extend(self.buffer.flush(&target, self.detector.phase()));
        }
    }
}
