//! History Migration.
//!
//! Pure functions from finalized live entities plus their buffered telemetry
//! to History records. Migration always yields a record: a telemetry field
//! that fails to encode is left empty and reported as a [`MigrationIssue`].

use crate::history::records::{HistoryExercise, HistorySession, HistorySet, VitalsRecord};
use crate::history::timeline::{EncodedTimeline, MigrationError};
use crate::metrics::{MetricKind, SetTelemetry, VitalsBuffer};
use crate::session::{LiveExercise, LiveSession, LiveSet};
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::fmt;
use tracing::warn;

/// Which record a migration issue belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase", tag = "scope", content = "id")]
pub enum IssueScope {
    Set(spotproto::SetId),
    Exercise(spotproto::ExerciseId),
    Session(spotproto::SessionId),
}

impl fmt::Display for IssueScope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            IssueScope::Set(id) => write!(f, "set {id}"),
            IssueScope::Exercise(id) => write!(f, "exercise {id}"),
            IssueScope::Session(id) => write!(f, "session {id}"),
        }
    }
}

/// A telemetry field that could not be stored. The record was still created.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct MigrationIssue {
    pub scope: IssueScope,
    pub field: &'static str,
    pub message: String,
}

impl fmt::Display for MigrationIssue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}: {}", self.scope, self.field, self.message)
    }
}

/// A record plus whatever went wrong while building it.
#[derive(Debug, Clone, PartialEq)]
pub struct Migrated<T> {
    pub record: T,
    pub issues: Vec<MigrationIssue>,
}

struct Issues {
    scope: IssueScope,
    found: Vec<MigrationIssue>,
}

impl Issues {
    fn new(scope: IssueScope) -> Self {
        Self {
            scope,
            found: Vec::new(),
        }
    }

    fn keep<T>(&mut self, field: &'static str, result: Result<Option<T>, MigrationError>) -> Option<T> {
        match result {
            Ok(value) => value,
            Err(e) => {
                warn!(scope = %self.scope, field, error = %e, "telemetry dropped during migration");
                self.found.push(MigrationIssue {
                    scope: self.scope,
                    field,
                    message: e.to_string(),
                });
                None
            }
        }
    }

    fn vitals(&mut self, buffer: &VitalsBuffer) -> VitalsRecord {
        VitalsRecord {
            heart_rate: self.keep(
                MetricKind::HeartRate.as_str(),
                EncodedTimeline::encode_nonempty(
                    MetricKind::HeartRate.as_str(),
                    buffer.get(MetricKind::HeartRate),
                ),
            ),
            energy: self.keep(
                MetricKind::Energy.as_str(),
                EncodedTimeline::encode_nonempty(
                    MetricKind::Energy.as_str(),
                    buffer.get(MetricKind::Energy),
                ),
            ),
        }
    }
}

fn ended(ended_at: Option<DateTime<Utc>>) -> DateTime<Utc> {
    ended_at.unwrap_or_else(Utc::now)
}

/// Migrate a finalized set.
///
/// Achieved reps fall back to the last ML prediction, then to zero.
pub fn migrate_set(set: &LiveSet, telemetry: SetTelemetry) -> Migrated<HistorySet> {
    let mut issues = Issues::new(IssueScope::Set(set.id));
    let vitals = issues.vitals(&telemetry.vitals);
    let rep_timeline = issues.keep(
        "rep_timeline",
        EncodedTimeline::encode_nonempty("rep_timeline", &telemetry.reps),
    );
    let achieved_reps = set
        .achieved_reps
        .or_else(|| telemetry.predicted_reps())
        .unwrap_or(0);

    let record = HistorySet {
        id: set.id,
        exercise_id: set.exercise_id,
        order: set.order,
        target_reps: set.target_reps,
        achieved_reps,
        weight: set.weight,
        started_at: set.started_at,
        ended_at: ended(set.ended_at),
        rest_seconds: set.rest_seconds,
        status: set.status,
        trigger: set.trigger,
        vitals,
        rep_timeline,
        motion: telemetry.motion,
    };

    Migrated {
        record,
        issues: issues.found,
    }
}

/// Rep counts are caller-supplied; totals pin at `u32::MAX`.
fn saturating_total(reps: impl Iterator<Item = u32>) -> u32 {
    reps.fold(0, u32::saturating_add)
}

/// Migrate a finalized exercise from its already-migrated sets.
pub fn migrate_exercise(
    exercise: &LiveExercise,
    mut sets: Vec<HistorySet>,
    vitals: &VitalsBuffer,
) -> Migrated<HistoryExercise> {
    let mut issues = Issues::new(IssueScope::Exercise(exercise.id));
    sets.sort_by_key(|s| s.order);
    let total_reps = saturating_total(sets.iter().map(|s| s.achieved_reps));
    let total_volume = sets.iter().map(HistorySet::volume).sum();
    let vitals = issues.vitals(vitals);

    let record = HistoryExercise {
        id: exercise.id,
        template_id: exercise.template_id,
        name: exercise.name.clone(),
        started_at: exercise.started_at,
        ended_at: ended(exercise.ended_at),
        status: exercise.status,
        sets,
        total_reps,
        total_volume,
        vitals,
    };

    Migrated {
        record,
        issues: issues.found,
    }
}

/// Migrate a finalized session from its already-migrated exercises.
pub fn migrate_session(
    session: &LiveSession,
    exercises: Vec<HistoryExercise>,
    vitals: &VitalsBuffer,
) -> Migrated<HistorySession> {
    let mut issues = Issues::new(IssueScope::Session(session.id));
    let total_reps = saturating_total(exercises.iter().map(|e| e.total_reps));
    let total_volume = exercises.iter().map(|e| e.total_volume).sum();
    let vitals = issues.vitals(vitals);

    let record = HistorySession {
        id: session.id,
        owner: session.owner.clone(),
        plan_id: session.plan_id,
        plan_title: session.plan_title.clone(),
        started_at: session.started_at,
        ended_at: ended(session.ended_at),
        status: session.status,
        exercises,
        total_reps,
        total_volume,
        vitals,
    };

    Migrated {
        record,
        issues: issues.found,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::history::records::Access;
    use crate::metrics::{MetricSample, MotionSummary, RepPrediction};
    use crate::session::{EndTrigger, EntityStatus};
    use pretty_assertions::assert_eq;
    use spotproto::{ExerciseId, SetId};

    fn finalized_set(achieved: Option<u32>) -> LiveSet {
        let now = Utc::now();
        LiveSet {
            id: SetId::new(),
            exercise_id: ExerciseId::new(),
            order: 1,
            target_reps: 10,
            achieved_reps: achieved,
            weight: 20.0,
            started_at: now,
            ended_at: Some(now),
            rest_seconds: 90,
            status: EntityStatus::Completed,
            trigger: Some(EndTrigger::ManualCheckmark),
        }
    }

    #[test]
    fn test_set_without_any_telemetry() {
        let migrated = migrate_set(&finalized_set(None), SetTelemetry::default());
        assert!(migrated.issues.is_empty());
        let record = migrated.record;
        assert_eq!(record.achieved_reps, 0);
        assert!(record.vitals.is_empty());
        assert!(record.rep_timeline.is_none());
        assert!(record.motion.is_none());

        let json = serde_json::to_vec(&record).unwrap();
        let back: HistorySet = serde_json::from_slice(&json).unwrap();
        assert_eq!(back, record);
    }

    #[test]
    fn test_access_upgrade_exposes_same_fields() {
        let mut telemetry = SetTelemetry::default();
        telemetry.reps.push(RepPrediction {
            timestamp: Utc::now(),
            rep_count: 9,
            confidence: 0.75,
        });
        telemetry.motion = Some(MotionSummary {
            chunks: 3,
            samples: 250,
            execution_samples: 250,
            peak_acceleration: 0.5,
            ..MotionSummary::default()
        });
        let record = migrate_set(&finalized_set(None), telemetry).record;
        assert_eq!(record.achieved_reps, 9, "falls back to the ML count");
        let stored = serde_json::to_vec(&record).unwrap();

        let free = record.view(Access::Free);
        assert!(free.rep_timeline.is_none());
        assert!(free.motion.is_none());

        let premium = record.view(Access::Premium);
        assert_eq!(premium.rep_timeline, record.rep_timeline.as_ref());
        assert_eq!(premium.motion, record.motion.as_ref());
        assert_eq!(serde_json::to_vec(&record).unwrap(), stored);

        // Empty telemetry looks the same at every access level.
        let bare = migrate_set(&finalized_set(Some(5)), SetTelemetry::default()).record;
        let (free, premium) = (bare.view(Access::Free), bare.view(Access::Premium));
        assert_eq!(free.rep_timeline, premium.rep_timeline);
        assert_eq!(free.motion, premium.motion);
        assert_eq!(free.vitals, premium.vitals);
    }

    #[test]
    fn test_bad_telemetry_never_blocks_the_record() {
        let mut telemetry = SetTelemetry::default();
        telemetry
            .vitals
            .push(MetricKind::HeartRate, MetricSample::new(Utc::now(), f64::INFINITY));
        telemetry
            .vitals
            .push(MetricKind::Energy, MetricSample::new(Utc::now(), 2.0));

        let migrated = migrate_set(&finalized_set(Some(10)), telemetry);
        assert_eq!(migrated.record.achieved_reps, 10);
        assert!(migrated.record.vitals.heart_rate.is_none());
        assert!(migrated.record.vitals.energy.is_some());
        assert_eq!(migrated.issues.len(), 1);
        assert_eq!(migrated.issues[0].field, "heart_rate");
    }

    #[test]
    fn test_exercise_totals() {
        let a = migrate_set(&finalized_set(Some(10)), SetTelemetry::default()).record;
        let mut b_live = finalized_set(Some(8));
        b_live.order = 2;
        let b = migrate_set(&b_live, SetTelemetry::default()).record;

        let now = Utc::now();
        let exercise = LiveExercise {
            id: a.exercise_id,
            session_id: spotproto::SessionId::new(),
            template_id: spotproto::TemplateId::new(),
            name: "Row".into(),
            sequence: 0,
            started_at: now,
            ended_at: Some(now),
            status: EntityStatus::Completed,
            current_set_index: None,
        };
        let record = migrate_exercise(&exercise, vec![b, a], &VitalsBuffer::default()).record;
        assert_eq!(record.sets[0].order, 1);
        assert_eq!(record.total_reps, 18);
        assert_eq!(record.total_volume, 360.0);
    }
}
