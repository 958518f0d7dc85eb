//! Auto-detected set ends awaiting the user's confirmation.
//!
//! The wearable reports `execution -> rest`; the engine holds that as a
//! pending detection until the user confirms, rejects, or overrides it with a
//! manual action. Phase changes are validated against the active set first:
//! late notices for a set that already ended are ignored.

use spotproto::{ExerciseId, Phase, PhaseChange, SessionId, SetId};
use std::time::Duration;
use tokio::time::Instant;
use tracing::{debug, info};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PendingDetection {
    pub session_id: SessionId,
    pub exercise_id: ExerciseId,
    pub set_id: SetId,
    pub set_order: u32,
    pub detected_at: Instant,
}

/// The set currently active on the companion.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ActiveSet {
    pub session_id: SessionId,
    pub exercise_id: ExerciseId,
    pub set_id: SetId,
}

/// What the engine should do with a phase change.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Observed {
    /// Rest detected; a confirmation should be requested.
    Detected(PendingDetection),
    /// Motion resumed while a detection was pending; it was dropped.
    Withdrawn(PendingDetection),
    Ignored(IgnoreReason),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IgnoreReason {
    NoActiveSet,
    /// Names a set, exercise or session that is no longer active.
    Stale,
    AlreadyPending,
    /// Motion resumed with nothing pending.
    NothingPending,
}

/// A confirmed detection and how long the user took to confirm it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Confirmed {
    pub detection: PendingDetection,
    pub elapsed: Duration,
}

impl Confirmed {
    /// Rest still owed after the time spent confirming.
    pub fn remaining_rest(&self, configured: Duration) -> Duration {
        configured.saturating_sub(self.elapsed)
    }
}

#[derive(Debug, Default)]
pub struct AutoDetection {
    pending: Option<PendingDetection>,
}

impl AutoDetection {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn pending(&self) -> Option<&PendingDetection> {
        self.pending.as_ref()
    }

    pub fn observe(&mut self, change: &PhaseChange, active: Option<ActiveSet>, now: Instant) -> Observed {
        let Some(active) = active else {
            debug!(set_id = %change.set_id, "phase change with no active set");
            return Observed::Ignored(IgnoreReason::NoActiveSet);
        };
        if !change.concerns(active.session_id, active.exercise_id, active.set_id) {
            debug!(
                set_id = %change.set_id,
                set_order = change.set_order,
                active = %active.set_id,
                "ignoring phase change for inactive set"
            );
            return Observed::Ignored(IgnoreReason::Stale);
        }

        match change.new_phase {
            Phase::Rest => {
                if self.pending.is_some() {
                    return Observed::Ignored(IgnoreReason::AlreadyPending);
                }
                let detection = PendingDetection {
                    session_id: active.session_id,
                    exercise_id: active.exercise_id,
                    set_id: active.set_id,
                    set_order: change.set_order,
                    detected_at: now,
                };
                info!(set_id = %detection.set_id, set_order = detection.set_order, "set end detected");
                self.pending = Some(detection);
                Observed::Detected(detection)
            }
            Phase::Execution => match self.pending.take() {
                Some(detection) => {
                    info!(set_id = %detection.set_id, "motion resumed, detection withdrawn");
                    Observed::Withdrawn(detection)
                }
                None => Observed::Ignored(IgnoreReason::NothingPending),
            },
        }
    }

    /// The user accepted the detection.
    pub fn confirm(&mut self, now: Instant) -> Option<Confirmed> {
        let detection = self.pending.take()?;
        Some(Confirmed {
            detection,
            elapsed: now.saturating_duration_since(detection.detected_at),
        })
    }

    /// The user said the set is not over.
    pub fn reject(&mut self) -> Option<PendingDetection> {
        self.pending.take()
    }

    /// A manual action ended or replaced the set first.
    pub fn supersede(&mut self) -> Option<PendingDetection> {
        let detection = self.pending.take();
        if let Some(d) = &detection {
            debug!(set_id = %d.set_id, "detection superseded by manual action");
        }
        detection
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use spotproto::CaptureTarget;

    fn active() -> (ActiveSet, CaptureTarget) {
        let set = ActiveSet {
            session_id: SessionId::new(),
            exercise_id: ExerciseId::new(),
            set_id: SetId::new(),
        };
        let target = CaptureTarget {
            session_id: set.session_id,
            exercise_id: set.exercise_id,
            set_id: set.set_id,
            set_order: 1,
        };
        (set, target)
    }

    #[test]
    fn test_rest_detection_then_confirm() {
        let (set, target) = active();
        let mut detection = AutoDetection::new();
        let t0 = Instant::now();

        let observed = detection.observe(&PhaseChange::new(&target, None, Phase::Rest), Some(set), t0);
        assert!(matches!(observed, Observed::Detected(_)));
        assert_eq!(
            detection.observe(&PhaseChange::new(&target, None, Phase::Rest), Some(set), t0),
            Observed::Ignored(IgnoreReason::AlreadyPending)
        );

        let confirmed = detection.confirm(t0 + Duration::from_secs(4)).unwrap();
        assert_eq!(confirmed.elapsed, Duration::from_secs(4));
        assert_eq!(
            confirmed.remaining_rest(Duration::from_secs(60)),
            Duration::from_secs(56)
        );
        assert_eq!(confirmed.remaining_rest(Duration::from_secs(3)), Duration::ZERO);
        assert!(detection.pending().is_none());
    }

    #[test]
    fn test_stale_and_orphan_changes_are_ignored() {
        let (set, target) = active();
        let mut detection = AutoDetection::new();
        let t0 = Instant::now();

        let mut late = target;
        late.set_id = SetId::new();
        assert_eq!(
            detection.observe(&PhaseChange::new(&late, None, Phase::Rest), Some(set), t0),
            Observed::Ignored(IgnoreReason::Stale)
        );
        assert_eq!(
            detection.observe(&PhaseChange::new(&target, None, Phase::Rest), None, t0),
            Observed::Ignored(IgnoreReason::NoActiveSet)
        );
        assert!(detection.pending().is_none());
    }

    #[test]
    fn test_resumed_motion_withdraws() {
        let (set, target) = active();
        let mut detection = AutoDetection::new();
        let t0 = Instant::now();
        detection.observe(&PhaseChange::new(&target, None, Phase::Rest), Some(set), t0);
        assert!(matches!(
            detection.observe(&PhaseChange::new(&target, None, Phase::Execution), Some(set), t0),
            Observed::Withdrawn(_)
        ));
        assert_eq!(
            detection.observe(&PhaseChange::new(&target, None, Phase::Execution), Some(set), t0),
            Observed::Ignored(IgnoreReason::NothingPending)
        );
        assert!(detection.confirm(t0).is_none());
    }
}
