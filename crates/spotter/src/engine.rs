//! The companion peer.
//!
//! [`Companion`] composes the session machine, timer coordinator, auto
//! detection and history archive for one owner, and is the transfer
//! channel's handler for everything the wearable sends. Lifecycle calls take
//! the owner's machine lock; context snapshots are built and sent under that
//! same lock so revisions go out in the order the state changed.
//!
//! Lock order: machine, then detection, then context. Timer calls never
//! hold a lock the engine needs.

use crate::detection::{ActiveSet, AutoDetection, Observed};
use crate::history::HistoryArchive;
use crate::metrics::{MetricKind, MetricSample, RepPrediction};
use crate::plan::WorkoutPlan;
use crate::session::{
    policy, EndTrigger, EntityStatus, ExerciseFinalized, ExerciseStarted, NextStep, Reordered,
    SessionError, SessionMachine, SessionRegistry, SessionSnapshot, SetFinalized, SetStarted,
    WorkoutFinalized, WorkoutStarted,
};
use crate::timers::{Intent, TimerCoordinator, TimerError};
use anyhow::{Context, Result};
use async_trait::async_trait;
use serde::Serialize;
use spotconf::{SpotConfig, TimersConfig};
use spotproto::transfer::{PeerHandler, TransferChannel};
use spotproto::{
    AutoAction, CancelReason, ExerciseId, OwnerId, Phase, PhaseChange, SensorSampleChunk,
    SessionContext, SessionId, SetId, TemplateId, TimerType,
};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;
use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

const EVENT_CAPACITY: usize = 128;

/// What the engine did, for UIs and drivers.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase", tag = "event")]
pub enum EngineEvent {
    WorkoutStarted {
        session_id: SessionId,
        exercise_id: ExerciseId,
        set_id: SetId,
    },
    ExerciseStarted {
        exercise_id: ExerciseId,
    },
    SetStarted {
        set_id: SetId,
        order: u32,
    },
    /// The wearable saw the set end; waiting for the user.
    AwaitingConfirmation {
        set_id: SetId,
    },
    /// The user kept lifting or rejected the detection.
    DetectionCleared {
        set_id: SetId,
    },
    SetFinalized {
        set_id: SetId,
        trigger: Option<EndTrigger>,
        achieved_reps: u32,
        rest: Duration,
        rest_action: AutoAction,
    },
    ExerciseFinalized {
        exercise_id: ExerciseId,
        #[serde(skip)]
        next: NextStep,
    },
    Reordered {
        started: ExerciseId,
    },
    WorkoutFinalized {
        session_id: SessionId,
        status: EntityStatus,
        issues: usize,
    },
    Archived {
        session_id: SessionId,
        hash: String,
    },
    /// A timer wants the user to decide something.
    Prompt {
        intent: Intent,
    },
    ContextAcked {
        revision: u64,
    },
}

#[derive(Debug, Default)]
struct ContextState {
    revision: u64,
    acked: u64,
    phase: Phase,
    last: Option<SessionContext>,
}

/// How long the rest after a finalized set should be.
#[derive(Debug, Clone, Copy)]
enum RestLength {
    Configured,
    Fixed(Duration),
    LessElapsed(Duration),
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

fn active_set(machine: &SessionMachine) -> Option<ActiveSet> {
    Some(ActiveSet {
        session_id: machine.active_session()?,
        exercise_id: machine.active_exercise()?,
        set_id: machine.active_set()?,
    })
}

fn build_context(
    snapshot: Option<SessionSnapshot>,
    plan_title: Option<String>,
    revision: u64,
    phase: Phase,
    is_premium: bool,
) -> SessionContext {
    let Some(snapshot) = snapshot else {
        return SessionContext {
            is_premium,
            ..SessionContext::inactive(revision)
        };
    };
    let exercise = snapshot.exercise();
    let set = snapshot.set();
    SessionContext {
        revision,
        session_id: Some(snapshot.session.id),
        plan_id: Some(snapshot.session.plan_id),
        plan_title,
        exercise_id: exercise.map(|e| e.id),
        exercise_name: exercise.map(|e| e.name.clone()),
        set_id: set.map(|s| s.id),
        set_order: set.map(|s| s.order),
        exercise_index: snapshot.exercise_index(),
        phase,
        is_active: true,
        is_premium,
    }
}

pub struct Companion {
    owner: OwnerId,
    timers_config: TimersConfig,
    heartbeat: Duration,
    registry: Arc<SessionRegistry>,
    timers: Arc<TimerCoordinator>,
    channel: Arc<TransferChannel>,
    archive: HistoryArchive,
    detection: Mutex<AutoDetection>,
    context: Mutex<ContextState>,
    events: broadcast::Sender<EngineEvent>,
}

impl Companion {
    pub fn new(
        owner: OwnerId,
        config: &SpotConfig,
        channel: Arc<TransferChannel>,
        archive: HistoryArchive,
    ) -> Self {
        let registry = SessionRegistry::new(
            policy::from_config(&config.entitlement),
            config.timers.default_rest(),
        );
        Self::with_registry(owner, config, Arc::new(registry), channel, archive)
    }

    /// Share a registry with other companions (one per owner).
    pub fn with_registry(
        owner: OwnerId,
        config: &SpotConfig,
        registry: Arc<SessionRegistry>,
        channel: Arc<TransferChannel>,
        archive: HistoryArchive,
    ) -> Self {
        let timers = TimerCoordinator::new(&config.timers, channel.clone());
        let (events, _) = broadcast::channel(EVENT_CAPACITY);
        Self {
            owner,
            timers_config: config.timers.clone(),
            heartbeat: config.transfer.heartbeat(),
            registry,
            timers: Arc::new(timers),
            channel,
            archive,
            detection: Mutex::new(AutoDetection::new()),
            context: Mutex::new(ContextState::default()),
            events,
        }
    }

    pub fn owner(&self) -> &OwnerId {
        &self.owner
    }

    pub fn timers(&self) -> &Arc<TimerCoordinator> {
        &self.timers
    }

    pub fn archive(&self) -> &HistoryArchive {
        &self.archive
    }

    pub fn registry(&self) -> &Arc<SessionRegistry> {
        &self.registry
    }

    pub fn subscribe(&self) -> broadcast::Receiver<EngineEvent> {
        self.events.subscribe()
    }

    pub fn snapshot(&self) -> Option<SessionSnapshot> {
        self.with_machine(|m| m.snapshot())
    }

    /// The last context sent to the wearable.
    pub fn context(&self) -> Option<SessionContext> {
        lock(&self.context).last.clone()
    }

    /// Highest context revision the wearable has acknowledged.
    pub fn acked_revision(&self) -> u64 {
        lock(&self.context).acked
    }

    pub fn is_awaiting_confirmation(&self) -> bool {
        lock(&self.detection).pending().is_some()
    }

    pub fn set_premium(&self, is_premium: bool) {
        self.with_machine(|m| {
            m.set_premium(is_premium);
            self.push_context(m, None);
        });
    }

    fn with_machine<R>(&self, f: impl FnOnce(&mut SessionMachine) -> R) -> R {
        self.registry.with(&self.owner, f)
    }

    fn emit(&self, event: EngineEvent) {
        let _ = self.events.send(event);
    }

    /// Bump the revision and send a fresh context. Called with the machine
    /// locked.
    fn push_context(&self, machine: &SessionMachine, phase: Option<Phase>) {
        let plan_title = machine.plan().map(|p| p.title.clone());
        let snapshot = machine.snapshot();
        let mut state = lock(&self.context);
        state.revision += 1;
        if let Some(phase) = phase {
            state.phase = phase;
        }
        let context = build_context(
            snapshot,
            plan_title,
            state.revision,
            state.phase,
            machine.is_premium(),
        );
        debug!(revision = context.revision, phase = %context.phase, active = context.is_active, "context pushed");
        self.channel.send_context(&context);
        state.last = Some(context);
    }

    /// Restart the inactivity timer. Called with the machine locked, so no
    /// timer is restarted once the workout has ended.
    fn touch(&self, machine: &SessionMachine) {
        if machine.active_session().is_none() {
            return;
        }
        if let Some(limit) = self.timers_config.inactivity() {
            self.timers
                .restart(TimerType::Inactivity, limit, AutoAction::PromptUser);
        }
    }

    /// Drop a pending detection and its confirmation timer.
    fn supersede_detection(&self) {
        if lock(&self.detection).supersede().is_some() {
            self.timers
                .cancel_if_active(TimerType::Confirmation, Some(CancelReason::Superseded));
        }
    }

    /// What the rest timer after a set should do when it runs out.
    fn rest_action(&self, machine: &SessionMachine, finalized: &SetFinalized) -> AutoAction {
        if finalized.planned_remaining > 0 {
            AutoAction::NextSet
        } else if self.timers_config.auto_advance_exercises && machine.pending().len() > 1 {
            AutoAction::NextExercise
        } else {
            AutoAction::ProposeCompleteExercise
        }
    }

    // --- lifecycle -------------------------------------------------------

    /// Start a workout: session, first exercise and its first planned set.
    pub fn start_workout(&self, plan: WorkoutPlan) -> Result<WorkoutStarted, SessionError> {
        let started = self.with_machine(|m| {
            let started = m.start_workout(plan)?;
            self.push_context(m, Some(Phase::Execution));
            if let Some(limit) = self.timers_config.workout_limit() {
                self.timers
                    .restart(TimerType::WorkoutTotal, limit, AutoAction::EndWorkout);
            }
            self.touch(m);
            Ok::<_, SessionError>(started)
        })?;
        lock(&self.detection).supersede();
        self.emit(EngineEvent::WorkoutStarted {
            session_id: started.session_id,
            exercise_id: started.exercise_id,
            set_id: started.set_id,
        });
        Ok(started)
    }

    /// Switch to another exercise. The previous one is finalized; no set is
    /// started.
    pub fn start_exercise(&self, template_id: TemplateId) -> Result<ExerciseStarted, SessionError> {
        let started = self.with_machine(|m| {
            let started = m.start_exercise(template_id)?;
            self.push_context(m, Some(Phase::Rest));
            self.touch(m);
            Ok::<_, SessionError>(started)
        })?;
        self.supersede_detection();
        self.timers
            .cancel_if_active(TimerType::Rest, Some(CancelReason::Superseded));

        if let Some(previous) = &started.finalized_previous {
            self.emit(EngineEvent::ExerciseFinalized {
                exercise_id: previous.exercise_id,
                next: previous.next,
            });
        }
        self.emit(EngineEvent::ExerciseStarted {
            exercise_id: started.exercise_id,
        });
        Ok(started)
    }

    pub fn start_set(&self, target_reps: u32, weight: f64) -> Result<SetStarted, SessionError> {
        self.open_set(|m| m.start_set(target_reps, weight))
    }

    /// Start the next set of the active exercise with its planned targets.
    pub fn start_next_set(&self) -> Result<SetStarted, SessionError> {
        self.open_set(SessionMachine::start_planned_set)
    }

    fn open_set(
        &self,
        start: impl FnOnce(&mut SessionMachine) -> Result<SetStarted, SessionError>,
    ) -> Result<SetStarted, SessionError> {
        let started = self.with_machine(|m| {
            let started = start(m)?;
            self.push_context(m, Some(Phase::Execution));
            self.touch(m);
            Ok::<_, SessionError>(started)
        })?;
        self.supersede_detection();
        self.timers
            .cancel_if_active(TimerType::Rest, Some(CancelReason::Superseded));
        self.emit(EngineEvent::SetStarted {
            set_id: started.set_id,
            order: started.order,
        });
        Ok(started)
    }

    /// Manual checkmark.
    pub fn end_set(&self, achieved_reps: Option<u32>) -> Result<SetFinalized, SessionError> {
        self.finish_set(None, achieved_reps, EndTrigger::ManualCheckmark, RestLength::Configured)
    }

    /// The user started a rest timer. An active set ends with
    /// [`EndTrigger::RestTimerStart`]; a pending detection for it is moot.
    /// Without an active set only the rest timer starts.
    pub fn start_rest(&self, duration: Option<Duration>) -> Result<Option<SetFinalized>, SessionError> {
        let active = self.with_machine(|m| {
            m.active_session().ok_or(SessionError::NoActiveSession)?;
            if let Some(set_id) = m.active_set() {
                return Ok(Some(set_id));
            }
            let action = if m.active_exercise().is_some() {
                AutoAction::NextSet
            } else {
                AutoAction::None
            };
            let duration = duration.unwrap_or_else(|| self.timers_config.default_rest());
            self.timers.restart(TimerType::Rest, duration, action);
            self.touch(m);
            Ok::<_, SessionError>(None)
        })?;

        let Some(set_id) = active else {
            return Ok(None);
        };
        let rest = duration.map_or(RestLength::Configured, RestLength::Fixed);
        self.finish_set(Some(set_id), None, EndTrigger::RestTimerStart, rest)
            .map(Some)
    }

    /// Confirm the detected set end. The rest timer is shortened by the time
    /// the confirmation took.
    pub fn confirm_set_end(&self, achieved_reps: Option<u32>) -> Result<SetFinalized, SessionError> {
        let confirmed = lock(&self.detection)
            .confirm(Instant::now())
            .ok_or(SessionError::NothingToConfirm)?;
        self.timers
            .cancel_if_active(TimerType::Confirmation, Some(CancelReason::Confirmed));
        info!(
            set_id = %confirmed.detection.set_id,
            elapsed_secs = confirmed.elapsed.as_secs_f64(),
            "set end confirmed"
        );
        self.finish_set(
            Some(confirmed.detection.set_id),
            achieved_reps,
            EndTrigger::AutoDetected,
            RestLength::LessElapsed(confirmed.elapsed),
        )
    }

    /// The set is not over. The wearable goes back to execution and swallows
    /// its next rest notice.
    pub fn reject_set_end(&self) -> Result<(), SessionError> {
        let rejected = lock(&self.detection)
            .reject()
            .ok_or(SessionError::NothingToConfirm)?;
        if self
            .timers
            .cancel(TimerType::Confirmation, Some(CancelReason::Rejected))
            .is_err()
        {
            debug!("confirmation timer already idle");
        }
        self.with_machine(|m| self.push_context(m, Some(Phase::Execution)));
        info!(set_id = %rejected.set_id, "set end rejected");
        self.emit(EngineEvent::DetectionCleared {
            set_id: rejected.set_id,
        });
        Ok(())
    }

    fn finish_set(
        &self,
        set_id: Option<SetId>,
        achieved_reps: Option<u32>,
        trigger: EndTrigger,
        rest: RestLength,
    ) -> Result<SetFinalized, SessionError> {
        let (finalized, rest, action) = self.with_machine(|m| {
            let finalized = match set_id {
                Some(set_id) => m.end_set_for(set_id, achieved_reps, trigger)?,
                None => m.end_set(achieved_reps, trigger)?,
            };
            let action = self.rest_action(m, &finalized);
            self.push_context(m, Some(Phase::Rest));

            let rest = match rest {
                RestLength::Configured => finalized.rest,
                RestLength::Fixed(duration) => duration,
                RestLength::LessElapsed(elapsed) => finalized.rest.saturating_sub(elapsed),
            };
            self.timers.restart(TimerType::Rest, rest, action);
            self.touch(m);
            Ok::<_, SessionError>((finalized, rest, action))
        })?;
        if trigger != EndTrigger::AutoDetected {
            self.supersede_detection();
        }

        for issue in &finalized.issues {
            warn!(%issue, "set finalized with migration issue");
        }
        self.emit(EngineEvent::SetFinalized {
            set_id: finalized.set_id,
            trigger: finalized.trigger,
            achieved_reps: finalized.record.achieved_reps,
            rest,
            rest_action: action,
        });
        Ok(finalized)
    }

    pub fn end_exercise(&self) -> Result<ExerciseFinalized, SessionError> {
        let finalized = self.with_machine(|m| {
            let finalized = m.end_exercise()?;
            self.push_context(m, Some(Phase::Rest));
            self.touch(m);
            Ok::<_, SessionError>(finalized)
        })?;
        self.supersede_detection();
        self.timers
            .cancel_if_active(TimerType::Rest, Some(CancelReason::Superseded));
        self.emit(EngineEvent::ExerciseFinalized {
            exercise_id: finalized.exercise_id,
            next: finalized.next,
        });
        Ok(finalized)
    }

    /// End the active exercise and, if the plan has a next one, start it
    /// with its first planned set.
    pub fn advance_exercise(&self) -> Result<ExerciseFinalized, SessionError> {
        let finalized = self.end_exercise()?;
        if let NextStep::NextExercise(template_id) = finalized.next {
            self.start_exercise(template_id)?;
            self.start_next_set()?;
        }
        Ok(finalized)
    }

    pub fn reorder_exercises(&self, order: Vec<TemplateId>) -> Result<Reordered, SessionError> {
        let reordered = self.with_machine(|m| {
            let reordered = m.reorder_exercises(order)?;
            self.push_context(m, Some(Phase::Rest));
            self.touch(m);
            Ok::<_, SessionError>(reordered)
        })?;
        self.supersede_detection();
        self.timers
            .cancel_if_active(TimerType::Rest, Some(CancelReason::Superseded));
        self.emit(EngineEvent::Reordered {
            started: reordered.started,
        });
        Ok(reordered)
    }

    pub fn end_workout(&self) -> Result<WorkoutFinalized> {
        self.close_workout(EntityStatus::Completed)
    }

    /// End the workout as abandoned. The record is still archived.
    pub fn abandon_workout(&self) -> Result<WorkoutFinalized> {
        self.close_workout(EntityStatus::Abandoned)
    }

    fn close_workout(&self, status: EntityStatus) -> Result<WorkoutFinalized> {
        let finalized = self.with_machine(|m| {
            m.active_session().ok_or(SessionError::NoActiveSession)?;
            // Nothing may fire into a finished workout. Timers are only
            // restarted under this lock while a session is active.
            self.timers.cancel_all();
            lock(&self.detection).supersede();

            let finalized = match status {
                EntityStatus::Abandoned => m.abandon_workout()?,
                _ => m.end_workout()?,
            };
            self.push_context(m, Some(Phase::Rest));
            Ok::<_, SessionError>(finalized)
        })?;
        self.archive_finalized(&finalized)?;
        Ok(finalized)
    }

    fn archive_finalized(&self, finalized: &WorkoutFinalized) -> Result<()> {
        let record = &finalized.record;
        self.emit(EngineEvent::WorkoutFinalized {
            session_id: record.id,
            status: record.status,
            issues: finalized.issues.len(),
        });
        let entry = self
            .archive
            .store(record)
            .with_context(|| format!("workout {} ended but could not be archived", record.id))?;
        self.emit(EngineEvent::Archived {
            session_id: record.id,
            hash: entry.hash.to_string(),
        });
        Ok(())
    }

    /// Log the owner out. A workout in progress is abandoned and archived,
    /// never discarded.
    pub fn logout(&self) -> Result<Option<WorkoutFinalized>> {
        let abandoned = self.registry.logout(&self.owner);
        // After the registry let go of the machine, so a racing call that
        // still held it cannot leave a timer behind.
        self.timers.cancel_all();
        lock(&self.detection).supersede();
        let Some(finalized) = abandoned else {
            return Ok(None);
        };
        self.with_machine(|m| self.push_context(m, Some(Phase::Rest)));
        self.archive_finalized(&finalized)?;
        Ok(Some(finalized))
    }

    // --- timers ----------------------------------------------------------

    pub fn pause_timer(&self) -> Result<Duration, TimerError> {
        let remaining = self.timers.pause_foreground()?;
        self.with_machine(|m| self.touch(m));
        Ok(remaining)
    }

    pub fn resume_timer(&self) -> Result<Duration, TimerError> {
        let remaining = self.timers.resume_foreground()?;
        self.with_machine(|m| self.touch(m));
        Ok(remaining)
    }

    /// Cancel the foreground timer. Cancelling a set-end confirmation is a
    /// rejection.
    pub fn cancel_timer(&self) -> Result<TimerType, TimerError> {
        if self.timers.foreground() == Some(TimerType::Confirmation)
            && self.reject_set_end().is_ok()
        {
            return Ok(TimerType::Confirmation);
        }
        let cancelled = self.timers.cancel_foreground()?;
        self.with_machine(|m| self.touch(m));
        Ok(cancelled)
    }

    /// Act on a completed timer's intent.
    pub fn handle_intent(&self, intent: Intent) -> Result<()> {
        match intent {
            Intent::StartNextSet => {
                self.start_next_set()
                    .context("rest finished but the next set could not start")?;
            }
            Intent::StartNextExercise => {
                self.advance_exercise()
                    .context("rest finished but the next exercise could not start")?;
            }
            Intent::EndWorkout => {
                self.end_workout()?;
            }
            intent => {
                info!(?intent, "waiting on user");
                self.emit(EngineEvent::Prompt { intent });
            }
        }
        Ok(())
    }

    // --- telemetry -------------------------------------------------------

    pub fn record_metric(&self, kind: MetricKind, sample: MetricSample) -> bool {
        self.with_machine(|m| m.record_metric(kind, sample))
    }

    /// Rep count from the ML collaborator for the active set.
    pub fn record_rep_prediction(&self, prediction: RepPrediction) -> bool {
        self.with_machine(|m| {
            m.active_set()
                .is_some_and(|set_id| m.record_prediction(set_id, prediction))
        })
    }

    // --- background ------------------------------------------------------

    /// Spawn the timer ticker, the channel loops, the auto-action dispatcher
    /// and the heartbeat.
    pub fn run(self: Arc<Self>, cancel: CancellationToken) -> Vec<JoinHandle<()>> {
        let handler: Arc<dyn PeerHandler> = self.clone();
        vec![
            self.timers.clone().spawn_ticker(cancel.clone()),
            tokio::spawn(self.channel.clone().run(handler, cancel.clone())),
            self.clone().spawn_dispatcher(cancel.clone()),
            self.spawn_heartbeat(cancel),
        ]
    }

    fn spawn_dispatcher(self: Arc<Self>, cancel: CancellationToken) -> JoinHandle<()> {
        let mut events = self.timers.subscribe();
        tokio::spawn(async move {
            loop {
                tokio::select! {
                    _ = cancel.cancelled() => break,
                    event = events.recv() => match event {
                        Ok(event) => {
                            let Some(intent) = Intent::from_event(&event) else {
                                continue;
                            };
                            if let Err(e) = self.handle_intent(intent) {
                                warn!(error = %format!("{e:#}"), ?intent, "auto-action failed");
                            }
                        }
                        Err(broadcast::error::RecvError::Lagged(missed)) => {
                            warn!(missed, "auto-action dispatcher lagged");
                        }
                        Err(broadcast::error::RecvError::Closed) => break,
                    },
                }
            }
            debug!("auto-action dispatcher stopped");
        })
    }

    fn spawn_heartbeat(self: Arc<Self>, cancel: CancellationToken) -> JoinHandle<()> {
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(self.heartbeat);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

            loop {
                tokio::select! {
                    _ = cancel.cancelled() => break,
                    _ = ticker.tick() => self.beat(),
                }
            }
            debug!("heartbeat stopped");
        })
    }

    /// Re-send the current context and every active timer.
    fn beat(&self) {
        self.channel.send_heartbeat();
        let Some(context) = self.context() else {
            return;
        };
        self.channel.send_context(&context);
        for command in self.timers.sync_commands() {
            self.channel.send_timer_command(&command);
        }
    }
}

#[async_trait]
impl PeerHandler for Companion {
    async fn on_context_ack(&self, revision: u64) {
        let mut state = lock(&self.context);
        if revision > state.acked {
            state.acked = revision;
            drop(state);
            debug!(revision, "context acknowledged");
            self.emit(EngineEvent::ContextAcked { revision });
        }
    }

    async fn on_phase_change(&self, change: PhaseChange) {
        let observed = self.with_machine(|m| {
            let observed = lock(&self.detection).observe(&change, active_set(m), Instant::now());
            match observed {
                Observed::Detected(_) => lock(&self.context).phase = Phase::Rest,
                Observed::Withdrawn(_) => lock(&self.context).phase = Phase::Execution,
                Observed::Ignored(_) => {}
            }
            observed
        });

        match observed {
            Observed::Detected(detection) => {
                self.timers.restart(
                    TimerType::Confirmation,
                    self.timers_config.confirmation(),
                    AutoAction::WaitForUser,
                );
                self.emit(EngineEvent::AwaitingConfirmation {
                    set_id: detection.set_id,
                });
            }
            Observed::Withdrawn(detection) => {
                self.timers
                    .cancel_if_active(TimerType::Confirmation, Some(CancelReason::Superseded));
                self.emit(EngineEvent::DetectionCleared {
                    set_id: detection.set_id,
                });
            }
            Observed::Ignored(reason) => {
                debug!(?reason, phase = %change.new_phase, set_id = %change.set_id, "phase change ignored");
            }
        }
    }

    async fn on_chunk(&self, chunk: SensorSampleChunk) {
        let absorbed = self.with_machine(|m| m.absorb_chunk(&chunk));
        if !absorbed {
            debug!(
                set_id = %chunk.set_id,
                samples = chunk.sample_count,
                "dropping chunk for inactive set"
            );
        }
    }
}

impl std::fmt::Debug for Companion {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Companion")
            .field("owner", &self.owner)
            .field("context", &*lock(&self.context))
            .finish_non_exhaustive()
    }
}
