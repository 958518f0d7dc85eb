//! Session State Machine.
//!
//! `NoSession -> SessionActive -> ExerciseActive -> SetActive`, for one owner.
//! Every method is synchronous and either completes its whole transition or
//! leaves the state untouched. Callers serialize access per owner (see
//! [`SessionRegistry`](crate::session::SessionRegistry)).

use crate::history::{
    migrate_exercise, migrate_session, migrate_set, HistoryExercise, HistorySession, HistorySet,
    MigrationIssue,
};
use crate::metrics::{MetricAggregator, MetricKind, MetricSample, RepPrediction};
use crate::plan::{ExerciseTemplate, PlannedSet, WorkoutPlan};
use crate::session::error::SessionError;
use crate::session::model::{
    Arena, EndTrigger, EntityStatus, LiveExercise, LiveSession, LiveSet, SessionSnapshot,
};
use crate::session::policy::{SetLimitPolicy, Unlimited};
use chrono::Utc;
use spotproto::{ExerciseId, OwnerId, SensorSampleChunk, SessionId, SetId, TemplateId};
use std::collections::BTreeSet;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info};

/// What the caller should do after an exercise ends.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NextStep {
    NextExercise(TemplateId),
    WorkoutComplete,
    /// The order was changed by hand; let the user pick.
    WaitingDecision,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WorkoutStarted {
    pub session_id: SessionId,
    pub exercise_id: ExerciseId,
    pub set_id: SetId,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ExerciseStarted {
    pub exercise_id: ExerciseId,
    /// The exercise that was active before, finalized implicitly.
    pub finalized_previous: Option<Box<ExerciseFinalized>>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SetStarted {
    pub set_id: SetId,
    pub exercise_id: ExerciseId,
    pub order: u32,
}

#[derive(Debug, Clone, PartialEq)]
pub struct SetFinalized {
    pub set_id: SetId,
    pub exercise_id: ExerciseId,
    pub trigger: Option<EndTrigger>,
    pub record: HistorySet,
    /// Configured rest after this set.
    pub rest: Duration,
    /// Planned sets of the exercise still to go.
    pub planned_remaining: usize,
    pub issues: Vec<MigrationIssue>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ExerciseFinalized {
    pub exercise_id: ExerciseId,
    pub record: HistoryExercise,
    pub next: NextStep,
    /// A set that was still active and got finalized on the way.
    pub finalized_set: Option<SetFinalized>,
    pub issues: Vec<MigrationIssue>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct WorkoutFinalized {
    pub record: HistorySession,
    pub issues: Vec<MigrationIssue>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Reordered {
    pub paused_exercise: Option<ExerciseId>,
    pub paused_set: Option<SetId>,
    pub started: ExerciseId,
}

#[derive(Debug)]
struct Live {
    session_id: SessionId,
    plan: WorkoutPlan,
    /// Templates not yet completed, in the order they should run.
    pending: Vec<TemplateId>,
    exercise: Option<ExerciseId>,
    set: Option<SetId>,
    last_finalized_set: Option<SetId>,
    finished_sets: Vec<HistorySet>,
    finished_exercises: Vec<HistoryExercise>,
    issues: Vec<MigrationIssue>,
    reordered: bool,
    next_sequence: usize,
}

pub struct SessionMachine {
    owner: OwnerId,
    policy: Arc<dyn SetLimitPolicy>,
    is_premium: bool,
    default_rest: Duration,
    arena: Arena,
    aggregator: MetricAggregator,
    live: Option<Live>,
}

impl SessionMachine {
    pub fn new(owner: OwnerId) -> Self {
        Self {
            owner,
            policy: Arc::new(Unlimited),
            is_premium: false,
            default_rest: Duration::from_secs(90),
            arena: Arena::default(),
            aggregator: MetricAggregator::new(),
            live: None,
        }
    }

    pub fn with_policy(mut self, policy: Arc<dyn SetLimitPolicy>) -> Self {
        self.policy = policy;
        self
    }

    pub fn with_default_rest(mut self, rest: Duration) -> Self {
        self.default_rest = rest;
        self
    }

    pub fn owner(&self) -> &OwnerId {
        &self.owner
    }

    pub fn is_premium(&self) -> bool {
        self.is_premium
    }

    pub fn set_premium(&mut self, is_premium: bool) {
        self.is_premium = is_premium;
    }

    pub fn active_session(&self) -> Option<SessionId> {
        self.live.as_ref().map(|l| l.session_id)
    }

    pub fn active_exercise(&self) -> Option<ExerciseId> {
        self.live.as_ref().and_then(|l| l.exercise)
    }

    pub fn active_set(&self) -> Option<SetId> {
        self.live.as_ref().and_then(|l| l.set)
    }

    pub fn plan(&self) -> Option<&WorkoutPlan> {
        self.live.as_ref().map(|l| &l.plan)
    }

    /// Templates still to be completed, in order.
    pub fn pending(&self) -> &[TemplateId] {
        self.live.as_ref().map_or(&[], |l| &l.pending)
    }

    /// Template of the active exercise.
    pub fn current_template(&self) -> Option<&ExerciseTemplate> {
        let live = self.live.as_ref()?;
        let exercise = self.arena.exercise(live.exercise?)?;
        live.plan.template(exercise.template_id)
    }

    /// Planned values for the next set of the active exercise. Past the end
    /// of the plan the last planned set repeats.
    pub fn next_planned_set(&self) -> Option<PlannedSet> {
        let exercise_id = self.active_exercise()?;
        let template = self.current_template()?;
        let order = self.arena.sets_of(exercise_id).len() as u32 + 1;
        template
            .planned(order)
            .or_else(|| template.planned_sets.last().copied())
    }

    /// Finalized sets of the active exercise.
    pub fn finalized_sets(&self) -> usize {
        self.active_exercise().map_or(0, |id| {
            self.arena
                .sets_of(id)
                .iter()
                .filter(|s| !s.status.is_active())
                .count()
        })
    }

    pub fn snapshot(&self) -> Option<SessionSnapshot> {
        let live = self.live.as_ref()?;
        let session = self.arena.session(live.session_id)?.clone();
        let exercises: Vec<LiveExercise> = self
            .arena
            .exercises_of(live.session_id)
            .into_iter()
            .cloned()
            .collect();
        let sets = exercises
            .iter()
            .flat_map(|e| self.arena.sets_of(e.id))
            .cloned()
            .collect();
        Some(SessionSnapshot {
            session,
            exercises,
            sets,
            active_exercise: live.exercise,
            active_set: live.set,
        })
    }

    /// At most one active session, one active exercise in it, one active
    /// set in that.
    pub fn invariants_hold(&self) -> bool {
        let sessions = self.arena.active_sessions();
        let Some(live) = &self.live else {
            return sessions == 0;
        };
        let exercises = self.arena.active_exercises_of(live.session_id);
        let sets = live.exercise.map_or(0, |e| self.arena.active_sets_of(e));
        sessions == 1
            && exercises == usize::from(live.exercise.is_some())
            && sets == usize::from(live.set.is_some())
            && (live.set.is_none() || live.exercise.is_some())
    }

    // --- lifecycle -------------------------------------------------------

    /// Start a workout and cascade into its first exercise and first set.
    pub fn start_workout(&mut self, plan: WorkoutPlan) -> Result<WorkoutStarted, SessionError> {
        if let Some(live) = &self.live {
            return Err(SessionError::SessionAlreadyActive {
                session_id: live.session_id,
            });
        }
        let Some(first) = plan.first().map(|t| t.id) else {
            return Err(SessionError::EmptyPlan);
        };

        let session = LiveSession {
            id: SessionId::new(),
            owner: self.owner.clone(),
            plan_id: plan.id,
            plan_title: plan.title.clone(),
            started_at: Utc::now(),
            ended_at: None,
            status: EntityStatus::Active,
            current_exercise_index: None,
        };
        let session_id = session.id;
        info!(session_id = %session_id, owner = %self.owner, plan = %plan.title, "workout started");

        self.live = Some(Live {
            session_id,
            pending: plan.exercises.iter().map(|t| t.id).collect(),
            plan,
            exercise: None,
            set: None,
            last_finalized_set: None,
            finished_sets: Vec::new(),
            finished_exercises: Vec::new(),
            issues: Vec::new(),
            reordered: false,
            next_sequence: 0,
        });
        self.arena.insert_session(session);
        self.aggregator.begin_session(session_id);

        let cascade = self
            .open_exercise(first)
            .and_then(|exercise_id| self.start_planned_set().map(|set| (exercise_id, set.set_id)));
        match cascade {
            Ok((exercise_id, set_id)) => Ok(WorkoutStarted {
                session_id,
                exercise_id,
                set_id,
            }),
            Err(e) => {
                self.reset();
                Err(e)
            }
        }
    }

    /// Make `template_id` the active exercise, finalizing the previous one.
    pub fn start_exercise(&mut self, template_id: TemplateId) -> Result<ExerciseStarted, SessionError> {
        let live = self.live.as_ref().ok_or(SessionError::NoActiveSession)?;
        if live.plan.template(template_id).is_none() {
            return Err(SessionError::UnknownTemplate(template_id));
        }

        let finalized_previous = if live.exercise.is_some() {
            Some(Box::new(self.close_exercise(EntityStatus::Completed)?))
        } else {
            None
        };
        let exercise_id = self.open_exercise(template_id)?;
        Ok(ExerciseStarted {
            exercise_id,
            finalized_previous,
        })
    }

    pub fn start_set(&mut self, target_reps: u32, weight: f64) -> Result<SetStarted, SessionError> {
        let live = self.live.as_ref().ok_or(SessionError::NoActiveSession)?;
        let exercise_id = live.exercise.ok_or(SessionError::NoActiveExercise)?;
        if let Some(set_id) = live.set {
            return Err(SessionError::SetAlreadyActive { set_id });
        }
        if !weight.is_finite() || weight < 0.0 {
            return Err(SessionError::InvalidWeight);
        }

        let existing = self.arena.sets_of(exercise_id).len();
        if let Some(limit) = self.policy.max_sets_per_exercise(self.is_premium) {
            if existing >= limit as usize {
                info!(exercise_id = %exercise_id, limit, "set limit reached");
                return Err(SessionError::SetLimitReached { limit });
            }
        }

        let rest = self
            .current_template()
            .map_or(self.default_rest, |t| t.rest(self.default_rest));
        let order = existing as u32 + 1;
        let set = LiveSet {
            id: SetId::new(),
            exercise_id,
            order,
            target_reps,
            achieved_reps: None,
            weight,
            started_at: Utc::now(),
            ended_at: None,
            rest_seconds: u32::try_from(rest.as_secs()).unwrap_or(u32::MAX),
            status: EntityStatus::Active,
            trigger: None,
        };
        let set_id = set.id;
        self.arena.insert_set(set);
        if let Some(exercise) = self.arena.exercise_mut(exercise_id) {
            exercise.current_set_index = Some(existing);
        }
        self.aggregator.begin_set(set_id);
        if let Some(live) = self.live.as_mut() {
            live.set = Some(set_id);
        }

        info!(set_id = %set_id, exercise_id = %exercise_id, order, target_reps, weight, "set started");
        Ok(SetStarted {
            set_id,
            exercise_id,
            order,
        })
    }

    /// Start the next set with its planned targets.
    pub fn start_planned_set(&mut self) -> Result<SetStarted, SessionError> {
        let planned = self.next_planned_set().unwrap_or_default();
        self.start_set(planned.target_reps, planned.weight)
    }

    /// Finalize the active set. A second call for the same set reports
    /// [`SessionError::SetAlreadyFinalized`] and changes nothing.
    pub fn end_set(
        &mut self,
        achieved_reps: Option<u32>,
        trigger: EndTrigger,
    ) -> Result<SetFinalized, SessionError> {
        let live = self.live.as_ref().ok_or(SessionError::NoActiveSession)?;
        if live.set.is_none() {
            return Err(match live.last_finalized_set {
                Some(set_id) if live.exercise.is_some() => {
                    SessionError::SetAlreadyFinalized { set_id }
                }
                _ => SessionError::NoActiveSet,
            });
        }
        self.close_set(EntityStatus::Completed, achieved_reps, Some(trigger))
    }

    /// Finalize a specific set. Used when the request was issued for a set
    /// that may already have been finalized by a racing action.
    pub fn end_set_for(
        &mut self,
        set_id: SetId,
        achieved_reps: Option<u32>,
        trigger: EndTrigger,
    ) -> Result<SetFinalized, SessionError> {
        let live = self.live.as_ref().ok_or(SessionError::NoActiveSession)?;
        if live.set != Some(set_id) {
            let finalized = self
                .arena
                .set(set_id)
                .is_some_and(|s| !s.status.is_active());
            return Err(if finalized {
                SessionError::SetAlreadyFinalized { set_id }
            } else {
                SessionError::NoActiveSet
            });
        }
        self.close_set(EntityStatus::Completed, achieved_reps, Some(trigger))
    }

    pub fn end_exercise(&mut self) -> Result<ExerciseFinalized, SessionError> {
        let live = self.live.as_ref().ok_or(SessionError::NoActiveSession)?;
        let exercise_id = live.exercise.ok_or(SessionError::NoActiveExercise)?;
        if self.finalized_sets() == 0 {
            return Err(SessionError::NoFinalizedSet { exercise_id });
        }
        self.close_exercise(EntityStatus::Completed)
    }

    /// End the workout, finalizing whatever is still active first.
    pub fn end_workout(&mut self) -> Result<WorkoutFinalized, SessionError> {
        self.close_session(EntityStatus::Completed)
    }

    /// End the workout as abandoned (logout, forced termination). Every live
    /// entity is recorded with [`EntityStatus::Abandoned`].
    pub fn abandon_workout(&mut self) -> Result<WorkoutFinalized, SessionError> {
        self.close_session(EntityStatus::Abandoned)
    }

    /// Apply a new order to the exercises still to do. Whatever is active is
    /// paused and the exercise now first in order becomes active.
    pub fn reorder_exercises(&mut self, order: Vec<TemplateId>) -> Result<Reordered, SessionError> {
        let live = self.live.as_ref().ok_or(SessionError::NoActiveSession)?;
        let wanted: BTreeSet<_> = order.iter().copied().collect();
        let have: BTreeSet<_> = live.pending.iter().copied().collect();
        if wanted.len() != order.len() {
            return Err(SessionError::InvalidOrder("duplicate exercise".into()));
        }
        if wanted != have {
            return Err(SessionError::InvalidOrder(
                "order must list exactly the exercises not yet completed".into(),
            ));
        }
        let Some(&first) = order.first() else {
            return Err(SessionError::InvalidOrder("nothing left to reorder".into()));
        };

        let paused_set = live.set;
        let paused_exercise = live.exercise;
        if paused_exercise.is_some() {
            self.close_exercise(EntityStatus::Paused)?;
        }

        if let Some(live) = self.live.as_mut() {
            live.pending = order;
            live.reordered = true;
        }
        let started = self.open_exercise(first)?;
        info!(
            started = %started,
            paused_exercise = ?paused_exercise.map(|id| id.short()),
            "exercises reordered"
        );
        Ok(Reordered {
            paused_exercise,
            paused_set,
            started,
        })
    }

    // --- telemetry -------------------------------------------------------

    pub fn record_metric(&mut self, kind: MetricKind, sample: MetricSample) -> bool {
        self.aggregator.push(kind, sample)
    }

    pub fn record_prediction(&mut self, set_id: SetId, prediction: RepPrediction) -> bool {
        self.aggregator.push_prediction(set_id, prediction)
    }

    /// Consume a chunk if it belongs to the active set.
    pub fn absorb_chunk(&mut self, chunk: &SensorSampleChunk) -> bool {
        let Some(live) = &self.live else {
            return false;
        };
        if live.session_id != chunk.session_id
            || live.exercise != Some(chunk.exercise_id)
            || live.set != Some(chunk.set_id)
        {
            return false;
        }
        self.aggregator.absorb_chunk(chunk)
    }

    // --- internals -------------------------------------------------------

    fn reset(&mut self) {
        self.live = None;
        self.arena.clear();
        self.aggregator = MetricAggregator::new();
    }

    fn open_exercise(&mut self, template_id: TemplateId) -> Result<ExerciseId, SessionError> {
        let live = self.live.as_mut().ok_or(SessionError::NoActiveSession)?;
        let template = live
            .plan
            .template(template_id)
            .ok_or(SessionError::UnknownTemplate(template_id))?;
        let exercise = LiveExercise {
            id: ExerciseId::new(),
            session_id: live.session_id,
            template_id,
            name: template.name.clone(),
            sequence: live.next_sequence,
            started_at: Utc::now(),
            ended_at: None,
            status: EntityStatus::Active,
            current_set_index: None,
        };
        let exercise_id = exercise.id;
        let sequence = exercise.sequence;
        info!(exercise_id = %exercise_id, name = %exercise.name, sequence, "exercise started");

        live.next_sequence += 1;
        live.exercise = Some(exercise_id);
        live.last_finalized_set = None;
        live.finished_sets.clear();
        let session_id = live.session_id;

        self.arena.insert_exercise(exercise);
        if let Some(session) = self.arena.session_mut(session_id) {
            session.current_exercise_index = Some(sequence);
        }
        self.aggregator.begin_exercise(exercise_id);
        Ok(exercise_id)
    }

    fn close_set(
        &mut self,
        status: EntityStatus,
        achieved_reps: Option<u32>,
        trigger: Option<EndTrigger>,
    ) -> Result<SetFinalized, SessionError> {
        let live = self.live.as_mut().ok_or(SessionError::NoActiveSession)?;
        let set_id = live.set.take().ok_or(SessionError::NoActiveSet)?;
        live.last_finalized_set = Some(set_id);

        let set = self.arena.set_mut(set_id).ok_or(SessionError::NoActiveSet)?;
        set.ended_at = Some(Utc::now());
        set.achieved_reps = achieved_reps;
        set.status = status;
        set.trigger = trigger;
        let set = set.clone();

        if let Some(exercise) = self.arena.exercise_mut(set.exercise_id) {
            exercise.current_set_index = None;
        }

        let telemetry = self.aggregator.take_set(set_id);
        let migrated = migrate_set(&set, telemetry);
        let planned_remaining = self
            .current_template()
            .map_or(0, |t| t.planned_sets.len().saturating_sub(set.order as usize));

        if let Some(live) = self.live.as_mut() {
            live.finished_sets.push(migrated.record.clone());
            live.issues.extend(migrated.issues.iter().cloned());
        }
        info!(
            set_id = %set_id,
            status = %status,
            trigger = ?trigger,
            achieved_reps = migrated.record.achieved_reps,
            "set finalized"
        );

        Ok(SetFinalized {
            set_id,
            exercise_id: set.exercise_id,
            trigger,
            record: migrated.record,
            rest: Duration::from_secs(u64::from(set.rest_seconds)),
            planned_remaining,
            issues: migrated.issues,
        })
    }

    /// Finalize the active exercise (and its active set). An exercise left
    /// without any set is recorded as paused so it stays pending.
    fn close_exercise(&mut self, status: EntityStatus) -> Result<ExerciseFinalized, SessionError> {
        let live = self.live.as_ref().ok_or(SessionError::NoActiveSession)?;
        let exercise_id = live.exercise.ok_or(SessionError::NoActiveExercise)?;
        let set_active = live.set.is_some();

        let finalized_set = if set_active {
            Some(self.close_set(status, None, None)?)
        } else {
            None
        };

        let has_sets = !self.arena.sets_of(exercise_id).is_empty();
        let status = match status {
            EntityStatus::Completed if !has_sets => EntityStatus::Paused,
            other => other,
        };

        let exercise = self
            .arena
            .exercise_mut(exercise_id)
            .ok_or(SessionError::NoActiveExercise)?;
        exercise.ended_at = Some(Utc::now());
        exercise.status = status;
        exercise.current_set_index = None;
        let exercise = exercise.clone();

        let vitals = self.aggregator.take_exercise(exercise_id);
        let live = self.live.as_mut().ok_or(SessionError::NoActiveSession)?;
        let sets = std::mem::take(&mut live.finished_sets);
        let migrated = migrate_exercise(&exercise, sets, &vitals);

        live.exercise = None;
        live.last_finalized_set = None;
        if status == EntityStatus::Completed {
            live.pending.retain(|t| *t != exercise.template_id);
        }
        let next = if live.pending.is_empty() {
            NextStep::WorkoutComplete
        } else if live.reordered {
            live.reordered = false;
            NextStep::WaitingDecision
        } else {
            NextStep::NextExercise(live.pending[0])
        };
        live.finished_exercises.push(migrated.record.clone());
        live.issues.extend(migrated.issues.iter().cloned());
        if let Some(session) = self.arena.session_mut(exercise.session_id) {
            session.current_exercise_index = None;
        }

        info!(exercise_id = %exercise_id, status = %status, ?next, "exercise finalized");
        Ok(ExerciseFinalized {
            exercise_id,
            record: migrated.record,
            next,
            finalized_set,
            issues: migrated.issues,
        })
    }

    fn close_session(&mut self, status: EntityStatus) -> Result<WorkoutFinalized, SessionError> {
        let live = self.live.as_ref().ok_or(SessionError::NoActiveSession)?;
        let session_id = live.session_id;

        // Nothing buffered after this point belongs to the workout.
        self.aggregator.stop();

        if live.exercise.is_some() {
            self.close_exercise(status)?;
        }

        let session = self
            .arena
            .session_mut(session_id)
            .ok_or(SessionError::NoActiveSession)?;
        session.ended_at = Some(Utc::now());
        session.status = status;
        session.current_exercise_index = None;
        let session = session.clone();

        let vitals = self.aggregator.take_session(session_id);
        let live = self.live.take().ok_or(SessionError::NoActiveSession)?;
        let migrated = migrate_session(&session, live.finished_exercises, &vitals);

        let mut issues = live.issues;
        issues.extend(migrated.issues);
        self.reset();

        info!(
            session_id = %session_id,
            status = %status,
            exercises = migrated.record.exercises.len(),
            total_reps = migrated.record.total_reps,
            "workout finalized"
        );
        if !issues.is_empty() {
            debug!(count = issues.len(), "workout finalized with migration issues");
        }
        Ok(WorkoutFinalized {
            record: migrated.record,
            issues,
        })
    }
}

impl std::fmt::Debug for SessionMachine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SessionMachine")
            .field("owner", &self.owner)
            .field("session", &self.active_session())
            .field("exercise", &self.active_exercise())
            .field("set", &self.active_set())
            .finish()
    }
}
