//! Session context snapshots pushed from the companion to the wearable.

use crate::ids::{ExerciseId, PlanId, SessionId, SetId};
use crate::phase::Phase;
use serde::{Deserialize, Serialize};

/// Denormalized view of the companion's authoritative state.
///
/// `revision` increases with every snapshot the companion produces. The
/// wearable applies a snapshot only if its revision is newer than the one it
/// holds, then acknowledges it.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionContext {
    pub revision: u64,
    pub session_id: Option<SessionId>,
    pub plan_id: Option<PlanId>,
    pub plan_title: Option<String>,
    pub exercise_id: Option<ExerciseId>,
    pub exercise_name: Option<String>,
    pub set_id: Option<SetId>,
    pub set_order: Option<u32>,
    pub exercise_index: Option<usize>,
    pub phase: Phase,
    pub is_active: bool,
    #[serde(default)]
    pub is_premium: bool,
}

/// Identifiers a chunk or phase change is stamped with.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CaptureTarget {
    pub session_id: SessionId,
    pub exercise_id: ExerciseId,
    pub set_id: SetId,
    pub set_order: u32,
}

impl SessionContext {
    /// Snapshot describing "no active session".
    pub fn inactive(revision: u64) -> Self {
        Self {
            revision,
            ..Self::default()
        }
    }

    /// The set capture should be attributed to, if a set is live.
    pub fn capture_target(&self) -> Option<CaptureTarget> {
        if !self.is_active {
            return None;
        }
        Some(CaptureTarget {
            session_id: self.session_id?,
            exercise_id: self.exercise_id?,
            set_id: self.set_id?,
            set_order: self.set_order.unwrap_or(0),
        })
    }

    pub fn is_newer_than(&self, other: &SessionContext) -> bool {
        self.revision > other.revision
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_inactive_has_no_target() {
        assert!(SessionContext::inactive(3).capture_target().is_none());
    }

    #[test]
    fn test_target_needs_set() {
        let mut ctx = SessionContext {
            revision: 1,
            session_id: Some(SessionId::new()),
            exercise_id: Some(ExerciseId::new()),
            is_active: true,
            ..SessionContext::default()
        };
        assert!(ctx.capture_target().is_none());

        let set_id = SetId::new();
        ctx.set_id = Some(set_id);
        ctx.set_order = Some(2);
        let target = ctx.capture_target().unwrap();
        assert_eq!(target.set_id, set_id);
        assert_eq!(target.set_order, 2);
    }

    #[test]
    fn test_wire_names_are_camel_case() {
        let json = serde_json::to_value(SessionContext::inactive(7)).unwrap();
        assert_eq!(json["revision"], 7);
        assert_eq!(json["isActive"], false);
        assert!(json.get("planTitle").is_some());
    }
}
