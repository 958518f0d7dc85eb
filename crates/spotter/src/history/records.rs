//! Immutable History records.
//!
//! Every telemetry field is independently optional. Records never change
//! after migration; access levels only filter what a reader sees.

use crate::history::timeline::EncodedTimeline;
use crate::metrics::{MetricKind, MotionSummary};
use crate::session::{EndTrigger, EntityStatus};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use spotproto::{ExerciseId, OwnerId, PlanId, SessionId, SetId, TemplateId};

/// Vital-sign timelines for one scope.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VitalsRecord {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub heart_rate: Option<EncodedTimeline>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub energy: Option<EncodedTimeline>,
}

impl VitalsRecord {
    pub fn get(&self, kind: MetricKind) -> Option<&EncodedTimeline> {
        match kind {
            MetricKind::HeartRate => self.heart_rate.as_ref(),
            MetricKind::Energy => self.energy.as_ref(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.heart_rate.is_none() && self.energy.is_none()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HistorySet {
    pub id: SetId,
    pub exercise_id: ExerciseId,
    pub order: u32,
    pub target_reps: u32,
    pub achieved_reps: u32,
    pub weight: f64,
    pub started_at: DateTime<Utc>,
    pub ended_at: DateTime<Utc>,
    pub rest_seconds: u32,
    pub status: EntityStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub trigger: Option<EndTrigger>,
    #[serde(default)]
    pub vitals: VitalsRecord,
    /// ML-derived rep predictions.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rep_timeline: Option<EncodedTimeline>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub motion: Option<MotionSummary>,
}

impl HistorySet {
    pub fn volume(&self) -> f64 {
        self.weight * f64::from(self.achieved_reps)
    }

    /// The record as seen at an access level. The stored record is untouched.
    pub fn view(&self, access: Access) -> HistorySetView<'_> {
        let premium = access == Access::Premium;
        HistorySetView {
            record: self,
            vitals: &self.vitals,
            rep_timeline: self.rep_timeline.as_ref().filter(|_| premium),
            motion: self.motion.as_ref().filter(|_| premium),
        }
    }
}

/// Which stored fields a reader may see. ML-derived telemetry is premium.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum Access {
    Free,
    Premium,
}

impl Access {
    pub fn from_premium(is_premium: bool) -> Self {
        if is_premium {
            Access::Premium
        } else {
            Access::Free
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct HistorySetView<'a> {
    pub record: &'a HistorySet,
    pub vitals: &'a VitalsRecord,
    pub rep_timeline: Option<&'a EncodedTimeline>,
    pub motion: Option<&'a MotionSummary>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HistoryExercise {
    pub id: ExerciseId,
    pub template_id: TemplateId,
    pub name: String,
    pub started_at: DateTime<Utc>,
    pub ended_at: DateTime<Utc>,
    pub status: EntityStatus,
    pub sets: Vec<HistorySet>,
    pub total_reps: u32,
    pub total_volume: f64,
    #[serde(default)]
    pub vitals: VitalsRecord,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HistorySession {
    pub id: SessionId,
    pub owner: OwnerId,
    pub plan_id: PlanId,
    pub plan_title: String,
    pub started_at: DateTime<Utc>,
    pub ended_at: DateTime<Utc>,
    pub status: EntityStatus,
    pub exercises: Vec<HistoryExercise>,
    pub total_reps: u32,
    pub total_volume: f64,
    #[serde(default)]
    pub vitals: VitalsRecord,
}

impl HistorySession {
    pub fn sets(&self) -> impl Iterator<Item = &HistorySet> {
        self.exercises.iter().flat_map(|e| e.sets.iter())
    }

    pub fn duration(&self) -> chrono::Duration {
        self.ended_at - self.started_at
    }
}
