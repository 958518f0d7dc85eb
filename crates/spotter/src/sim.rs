//! In-process workout replay: a wearable and a companion over a memory link,
//! with a simulated lifter performing every planned set.
//!
//! The lifter lifts for as long as the set's reps take, then holds still and
//! lets the wearable detect the set end. Confirmation, rest and the next set
//! follow from the companion's own timers. Meant to run on a paused tokio
//! clock, where it completes in moments.

use crate::engine::{Companion, EngineEvent};
use crate::history::{HistoryArchive, HistorySession};
use crate::metrics::{MetricKind, MetricSample, RepPrediction};
use crate::plan::WorkoutPlan;
use crate::session::NextStep;
use crate::timers::Intent;
use anyhow::{bail, Context, Result};
use chrono::{DateTime, Utc};
use spotconf::SpotConfig;
use spotproto::transfer::{MemoryLink, RetryConfig, TransferChannel};
use spotproto::{MotionSample, OwnerId};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::broadcast;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};
use wristband::{CaptureError, Motion, MotionSource, Wearable};

const REP_PERIOD: Duration = Duration::from_millis(1500);
/// How long the lifter looks at the watch before confirming.
const CONFIRM_DELAY: Duration = Duration::from_secs(3);
/// Nothing in a workout waits this long without an event.
const STALL_TIMEOUT: Duration = Duration::from_secs(600);

/// Lifts while the switch is on, holds still otherwise.
#[derive(Debug, Clone)]
pub struct LifterSource {
    lifting: Arc<AtomicBool>,
    motion: Motion,
    since: Option<Instant>,
}

impl LifterSource {
    pub fn new(lifting: Arc<AtomicBool>) -> Self {
        Self {
            lifting,
            motion: Motion::Lifting {
                duration: Duration::MAX,
                amplitude: 0.6,
                period: REP_PERIOD,
            },
            since: None,
        }
    }
}

impl MotionSource for LifterSource {
    fn start(&mut self) -> Result<(), CaptureError> {
        Ok(())
    }

    fn read(&mut self, at: DateTime<Utc>) -> Option<MotionSample> {
        if !self.lifting.load(Ordering::Relaxed) {
            self.since = None;
            return Some(MotionSample::at_rest(at));
        }
        let since = *self.since.get_or_insert_with(Instant::now);
        Some(self.motion.sample(since.elapsed(), at))
    }
}

/// A finished simulated workout.
#[derive(Debug, Clone)]
pub struct SimulationReport {
    pub record: HistorySession,
    pub hash: Option<String>,
    pub migration_issues: usize,
    pub context_revisions_acked: u64,
}

async fn next_event(events: &mut broadcast::Receiver<EngineEvent>) -> Result<EngineEvent> {
    loop {
        let received = tokio::time::timeout(STALL_TIMEOUT, events.recv())
            .await
            .context("simulation stalled waiting for the engine")?;
        match received {
            Ok(event) => return Ok(event),
            Err(broadcast::error::RecvError::Lagged(missed)) => {
                warn!(missed, "simulation fell behind engine events");
            }
            Err(broadcast::error::RecvError::Closed) => bail!("engine event stream closed"),
        }
    }
}

struct Lifter {
    companion: Arc<Companion>,
    lifting: Arc<AtomicBool>,
    capturing: bool,
}

impl Lifter {
    /// Perform the active set: lift through its reps, report what the ML
    /// collaborator would, then stop.
    async fn perform_set(&self) -> Result<()> {
        let Some(set) = self.companion.snapshot().and_then(|s| s.set().cloned()) else {
            return Ok(());
        };
        info!(set_id = %set.id, order = set.order, target_reps = set.target_reps, "lifting");

        self.lifting.store(true, Ordering::Relaxed);
        for rep in 1..=set.target_reps {
            tokio::time::sleep(REP_PERIOD).await;
            let now = Utc::now();
            let heart_rate = 110.0 + f64::from(rep) * 2.5;
            self.companion
                .record_metric(MetricKind::HeartRate, MetricSample::new(now, heart_rate));
            self.companion.record_rep_prediction(RepPrediction {
                timestamp: now,
                rep_count: rep,
                confidence: 0.9,
            });
        }
        let energy = 0.4 * f64::from(set.target_reps);
        self.companion
            .record_metric(MetricKind::Energy, MetricSample::new(Utc::now(), energy));
        self.lifting.store(false, Ordering::Relaxed);

        if !self.capturing {
            // No motion data, so no detection: tap the checkmark instead.
            self.companion.end_set(Some(set.target_reps))?;
        }
        Ok(())
    }
}

/// Run `plan` end to end and archive it.
pub async fn simulate(
    config: &SpotConfig,
    plan: WorkoutPlan,
    archive: HistoryArchive,
) -> Result<SimulationReport> {
    let retry = RetryConfig::from(&config.transfer);
    let (wrist_link, companion_link) = MemoryLink::pair();
    let wrist_channel = Arc::new(TransferChannel::new(Arc::new(wrist_link), retry.clone()));
    let companion_channel = Arc::new(TransferChannel::new(Arc::new(companion_link), retry));

    let cancel = CancellationToken::new();
    let wearable = Arc::new(Wearable::new(wrist_channel.clone(), config));
    let mut tasks = vec![tokio::spawn(
        wrist_channel.run(wearable.clone(), cancel.clone()),
    )];

    let companion = Arc::new(Companion::new(
        OwnerId::new("simulator"),
        config,
        companion_channel,
        archive,
    ));
    tasks.extend(companion.clone().run(cancel.clone()));

    let lifting = Arc::new(AtomicBool::new(false));
    let source = LifterSource::new(lifting.clone());
    let capturing = match wearable.start_capture(source, cancel.clone()) {
        Ok(task) => {
            tasks.push(task);
            true
        }
        Err(e) => {
            warn!(error = %e, "simulating without motion capture");
            false
        }
    };
    let lifter = Lifter {
        companion: companion.clone(),
        lifting,
        capturing,
    };

    let mut events = companion.subscribe();
    let started = companion.start_workout(plan)?;
    info!(session_id = %started.session_id, "simulated workout started");
    lifter.perform_set().await?;

    let finalized = loop {
        match next_event(&mut events).await? {
            EngineEvent::SetStarted { .. } => lifter.perform_set().await?,
            EngineEvent::AwaitingConfirmation { .. } => {
                tokio::time::sleep(CONFIRM_DELAY).await;
                companion.confirm_set_end(None)?;
            }
            EngineEvent::Prompt {
                intent: Intent::ProposeCompleteExercise,
            } => {
                let done = companion.advance_exercise()?;
                if done.next == NextStep::WorkoutComplete {
                    break companion.end_workout()?;
                }
            }
            EngineEvent::ExerciseFinalized {
                next: NextStep::WorkoutComplete,
                ..
            } => break companion.end_workout()?,
            _ => {}
        }
    };

    let hash = companion
        .archive()
        .list()?
        .into_iter()
        .find(|entry| entry.key == finalized.record.id.to_string())
        .map(|entry| entry.hash.to_string());
    let report = SimulationReport {
        hash,
        migration_issues: finalized.issues.len(),
        context_revisions_acked: companion.acked_revision(),
        record: finalized.record,
    };

    cancel.cancel();
    for task in tasks {
        if let Err(e) = task.await {
            warn!(error = %e, "simulation task ended abnormally");
        }
    }
    Ok(report)
}
