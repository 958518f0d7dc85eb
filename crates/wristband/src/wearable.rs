//! The wearable peer: applies companion state, mirrors timers, and owns the
//! capture pipeline.

use crate::capture::{lock, publish, spawn_capture_task, CaptureSink};
use crate::mirror::MirroredTimer;
use crate::pipeline::{CaptureCore, CaptureOutput};
use crate::sensors::{CaptureError, MotionSource};
use async_trait::async_trait;
use spotconf::SpotConfig;
use spotproto::transfer::{PeerHandler, TransferChannel};
use spotproto::{
    CancelReason, Phase, SessionContext, TimerCommand, TimerCommandKind, TimerType,
};
use std::collections::BTreeMap;
use std::sync::{Arc, Mutex, PoisonError};
use tokio::sync::Notify;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

pub struct Wearable {
    channel: Arc<TransferChannel>,
    core: Arc<Mutex<CaptureCore>>,
    retime: Arc<Notify>,
    timers: Mutex<BTreeMap<TimerType, MirroredTimer>>,
}

impl Wearable {
    pub fn new(channel: Arc<TransferChannel>, config: &SpotConfig) -> Self {
        Self {
            channel,
            core: Arc::new(Mutex::new(CaptureCore::new(&config.capture, &config.phase))),
            retime: Arc::new(Notify::new()),
            timers: Mutex::new(BTreeMap::new()),
        }
    }

    pub fn channel(&self) -> &Arc<TransferChannel> {
        &self.channel
    }

    /// Start sampling. On error the wearable keeps running without capture.
    pub fn start_capture<S>(
        &self,
        source: S,
        cancel: CancellationToken,
    ) -> Result<JoinHandle<()>, CaptureError>
    where
        S: MotionSource + 'static,
    {
        let sink: Arc<dyn CaptureSink> = self.channel.clone();
        spawn_capture_task(
            source,
            self.core.clone(),
            sink,
            self.retime.clone(),
            cancel,
        )
    }

    pub fn context(&self) -> SessionContext {
        lock(&self.core).context().clone()
    }

    pub fn phase(&self) -> Phase {
        lock(&self.core).phase()
    }

    /// The mirrored timer of a type, if it has ever been started.
    pub fn timer(&self, timer_type: TimerType) -> Option<MirroredTimer> {
        self.timers
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get(&timer_type)
            .cloned()
    }

    fn publish(&self, out: CaptureOutput) {
        if out.retime {
            self.retime.notify_one();
        }
        publish(self.channel.as_ref(), out);
    }
}

#[async_trait]
impl PeerHandler for Wearable {
    async fn on_context(&self, context: SessionContext) -> u64 {
        let mut out = CaptureOutput::default();
        let held = lock(&self.core).apply_context(context, &mut out);

        // Backlog of a finalized set no longer counts; the partial chunk
        // flushed just now still gets its delivery attempt.
        if let Some(set_id) = out.finished_set {
            self.channel.discard_chunks_for_set(set_id);
        }
        self.publish(out);
        debug!(revision = held, "context applied");
        held
    }

    async fn on_timer_command(&self, command: TimerCommand) {
        self.timers
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .entry(command.timer_type)
            .or_insert_with(|| MirroredTimer::new(command.timer_type))
            .apply(&command);

        let mut out = CaptureOutput::default();
        match (command.command, command.timer_type, command.reason) {
            (TimerCommandKind::Start, TimerType::Rest, _) => {
                info!("rest started on companion, switching to rest phase");
                lock(&self.core).force_phase(Phase::Rest, &mut out);
            }
            (TimerCommandKind::Cancel, TimerType::Confirmation, Some(CancelReason::Rejected)) => {
                info!("set end rejected, resuming execution phase");
                lock(&self.core).reject_detection(&mut out);
            }
            _ => {}
        }
        self.publish(out);
    }
}
