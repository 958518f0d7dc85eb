//! The sampling task.
//!
//! Ticks at the phase-dependent interval, reads one sample per tick, and hands
//! the resulting chunks and phase changes to a [`CaptureSink`]. The sink must
//! not block: the transfer channel only enqueues.

use crate::pipeline::{CaptureCore, CaptureOutput};
use crate::sensors::{CaptureError, MotionSource};
use chrono::{DateTime, Utc};
use spotproto::transfer::TransferChannel;
use spotproto::{PhaseChange, SensorSampleChunk};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tokio::sync::Notify;
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// Where capture output goes.
pub trait CaptureSink: Send + Sync {
    fn chunk_ready(&self, chunk: SensorSampleChunk);
    fn phase_changed(&self, change: PhaseChange);
}

impl CaptureSink for TransferChannel {
    fn chunk_ready(&self, chunk: SensorSampleChunk) {
        let set_id = chunk.set_id;
        let samples = chunk.sample_count;
        match self.transfer(chunk) {
            Ok(transfer_id) => debug!(transfer_id, set_id = %set_id, samples, "chunk queued"),
            Err(e) => warn!(set_id = %set_id, error = %e, "failed to queue chunk"),
        }
    }

    fn phase_changed(&self, change: PhaseChange) {
        let delivery = self.send_phase_change(&change);
        debug!(phase = %change.new_phase, ?delivery, "phase change sent");
    }
}

pub(crate) fn lock(core: &Mutex<CaptureCore>) -> MutexGuard<'_, CaptureCore> {
    core.lock().unwrap_or_else(PoisonError::into_inner)
}

pub(crate) fn publish(sink: &dyn CaptureSink, out: CaptureOutput) {
    for chunk in out.chunks {
        sink.chunk_ready(chunk);
    }
    if let Some(change) = out.phase_change {
        sink.phase_changed(change);
    }
}

/// Wall-clock timestamps derived from the monotonic clock, so samples stay
/// evenly spaced across wall-clock adjustments.
#[derive(Debug, Clone, Copy)]
pub struct SampleClock {
    wall: DateTime<Utc>,
    mono: Instant,
}

impl SampleClock {
    pub fn new() -> Self {
        Self {
            wall: Utc::now(),
            mono: Instant::now(),
        }
    }

    pub fn now(&self) -> DateTime<Utc> {
        let elapsed = chrono::Duration::from_std(self.mono.elapsed())
            .unwrap_or_else(|_| chrono::Duration::zero());
        self.wall + elapsed
    }
}

impl Default for SampleClock {
    fn default() -> Self {
        Self::new()
    }
}

/// Start the source and spawn the sampling task.
///
/// If the source cannot start, no task is spawned and the error is returned;
/// the caller carries on without capture.
pub fn spawn_capture_task<S>(
    mut source: S,
    core: Arc<Mutex<CaptureCore>>,
    sink: Arc<dyn CaptureSink>,
    retime: Arc<Notify>,
    cancel: CancellationToken,
) -> Result<JoinHandle<()>, CaptureError>
where
    S: MotionSource + 'static,
{
    if let Err(e) = source.start() {
        warn!(error = %e, "motion capture unavailable, continuing without it");
        return Err(e);
    }

    Ok(tokio::spawn(async move {
        let clock = SampleClock::new();
        let mut period = lock(&core).interval();
        let mut ticker = tokio::time::interval(period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
        info!(interval_ms = period.as_millis() as u64, "motion capture started");

        loop {
            tokio::select! {
                _ = cancel.cancelled() => {
                    let mut out = CaptureOutput::default();
                    lock(&core).drain(&mut out);
                    publish(sink.as_ref(), out);
                    info!("motion capture stopped");
                    break;
                }
                _ = retime.notified() => {}
                _ = ticker.tick() => {
                    let mut out = CaptureOutput::default();
                    {
                        let mut core = lock(&core);
                        if core.is_capturing() {
                            if let Some(sample) = source.read(clock.now()) {
                                core.ingest(sample, &mut out);
                            }
                        }
                    }
                    publish(sink.as_ref(), out);
                }
            }

            let wanted = lock(&core).interval();
            if wanted != period {
                period = wanted;
                ticker = tokio::time::interval_at(Instant::now() + period, period);
                ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
                debug!(interval_ms = period.as_millis() as u64, "sampling interval changed");
            }
        }
    }))
}
