//! Live entities and the arena that holds them.
//!
//! Relationships are explicit foreign keys (`session_id`, `exercise_id`);
//! every traversal is an indexed lookup on the arena.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use spotproto::{ExerciseId, OwnerId, PlanId, SessionId, SetId, TemplateId};
use std::collections::BTreeMap;
use std::fmt;

/// Lifecycle status shared by live entities and their History counterparts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum EntityStatus {
    #[default]
    Active,
    Completed,
    /// Interrupted by a reorder; the exercise can be started again later.
    Paused,
    /// Ended by logout or forced termination.
    Abandoned,
}

impl EntityStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            EntityStatus::Active => "active",
            EntityStatus::Completed => "completed",
            EntityStatus::Paused => "paused",
            EntityStatus::Abandoned => "abandoned",
        }
    }

    pub fn is_active(&self) -> bool {
        matches!(self, EntityStatus::Active)
    }
}

impl fmt::Display for EntityStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// What ended a set. All triggers share one finalize path.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum EndTrigger {
    ManualCheckmark,
    AutoDetected,
    RestTimerStart,
}

impl EndTrigger {
    pub fn as_str(&self) -> &'static str {
        match self {
            EndTrigger::ManualCheckmark => "manual_checkmark",
            EndTrigger::AutoDetected => "auto_detected",
            EndTrigger::RestTimerStart => "rest_timer_start",
        }
    }
}

impl fmt::Display for EndTrigger {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LiveSession {
    pub id: SessionId,
    pub owner: OwnerId,
    pub plan_id: PlanId,
    pub plan_title: String,
    pub started_at: DateTime<Utc>,
    pub ended_at: Option<DateTime<Utc>>,
    pub status: EntityStatus,
    /// Position of the active exercise in the session's exercise list.
    pub current_exercise_index: Option<usize>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LiveExercise {
    pub id: ExerciseId,
    pub session_id: SessionId,
    pub template_id: TemplateId,
    pub name: String,
    /// Position within the session, in start order.
    pub sequence: usize,
    pub started_at: DateTime<Utc>,
    pub ended_at: Option<DateTime<Utc>>,
    pub status: EntityStatus,
    pub current_set_index: Option<usize>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LiveSet {
    pub id: SetId,
    pub exercise_id: ExerciseId,
    /// 1-based position within the exercise.
    pub order: u32,
    pub target_reps: u32,
    /// Unset until the set is finalized.
    pub achieved_reps: Option<u32>,
    pub weight: f64,
    pub started_at: DateTime<Utc>,
    pub ended_at: Option<DateTime<Utc>>,
    pub rest_seconds: u32,
    pub status: EntityStatus,
    pub trigger: Option<EndTrigger>,
}

/// Owner-scoped store of live entities. Entities stay in the arena after they
/// are finalized until the session itself ends.
#[derive(Debug, Clone, Default)]
pub struct Arena {
    sessions: BTreeMap<SessionId, LiveSession>,
    exercises: BTreeMap<ExerciseId, LiveExercise>,
    sets: BTreeMap<SetId, LiveSet>,
}

impl Arena {
    pub fn insert_session(&mut self, session: LiveSession) {
        self.sessions.insert(session.id, session);
    }

    pub fn insert_exercise(&mut self, exercise: LiveExercise) {
        self.exercises.insert(exercise.id, exercise);
    }

    pub fn insert_set(&mut self, set: LiveSet) {
        self.sets.insert(set.id, set);
    }

    pub fn session(&self, id: SessionId) -> Option<&LiveSession> {
        self.sessions.get(&id)
    }

    pub fn session_mut(&mut self, id: SessionId) -> Option<&mut LiveSession> {
        self.sessions.get_mut(&id)
    }

    pub fn exercise(&self, id: ExerciseId) -> Option<&LiveExercise> {
        self.exercises.get(&id)
    }

    pub fn exercise_mut(&mut self, id: ExerciseId) -> Option<&mut LiveExercise> {
        self.exercises.get_mut(&id)
    }

    pub fn set(&self, id: SetId) -> Option<&LiveSet> {
        self.sets.get(&id)
    }

    pub fn set_mut(&mut self, id: SetId) -> Option<&mut LiveSet> {
        self.sets.get_mut(&id)
    }

    /// Exercises of a session in the order they were started.
    pub fn exercises_of(&self, session_id: SessionId) -> Vec<&LiveExercise> {
        let mut found: Vec<_> = self
            .exercises
            .values()
            .filter(|e| e.session_id == session_id)
            .collect();
        found.sort_by_key(|e| e.sequence);
        found
    }

    /// Sets of an exercise by order.
    pub fn sets_of(&self, exercise_id: ExerciseId) -> Vec<&LiveSet> {
        let mut found: Vec<_> = self
            .sets
            .values()
            .filter(|s| s.exercise_id == exercise_id)
            .collect();
        found.sort_by_key(|s| s.order);
        found
    }

    pub fn active_sessions(&self) -> usize {
        self.sessions.values().filter(|s| s.status.is_active()).count()
    }

    pub fn active_exercises_of(&self, session_id: SessionId) -> usize {
        self.exercises
            .values()
            .filter(|e| e.session_id == session_id && e.status.is_active())
            .count()
    }

    pub fn active_sets_of(&self, exercise_id: ExerciseId) -> usize {
        self.sets
            .values()
            .filter(|s| s.exercise_id == exercise_id && s.status.is_active())
            .count()
    }

    pub fn clear(&mut self) {
        self.sessions.clear();
        self.exercises.clear();
        self.sets.clear();
    }
}

/// Read-only copy of the live state of one owner.
#[derive(Debug, Clone, PartialEq)]
pub struct SessionSnapshot {
    pub session: LiveSession,
    pub exercises: Vec<LiveExercise>,
    pub sets: Vec<LiveSet>,
    pub active_exercise: Option<ExerciseId>,
    pub active_set: Option<SetId>,
}

impl SessionSnapshot {
    pub fn exercise(&self) -> Option<&LiveExercise> {
        let id = self.active_exercise?;
        self.exercises.iter().find(|e| e.id == id)
    }

    pub fn set(&self) -> Option<&LiveSet> {
        let id = self.active_set?;
        self.sets.iter().find(|s| s.id == id)
    }

    /// Position of the active exercise in the session's exercise list.
    pub fn exercise_index(&self) -> Option<usize> {
        self.session.current_exercise_index
    }
}
