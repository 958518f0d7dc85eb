//! Best-effort messages: phase changes and timer commands.

use crate::context::CaptureTarget;
use crate::ids::{ExerciseId, SessionId, SetId};
use crate::phase::Phase;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Duration;

/// Phase transition observed by the wearable's detector.
///
/// `set_order` lets the companion discard notices that arrive after the set
/// they describe has already ended.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PhaseChange {
    pub session_id: SessionId,
    pub exercise_id: ExerciseId,
    pub set_id: SetId,
    pub set_order: u32,
    pub exercise_name: Option<String>,
    pub new_phase: Phase,
    pub detected_at: DateTime<Utc>,
}

impl PhaseChange {
    pub fn new(target: &CaptureTarget, exercise_name: Option<String>, new_phase: Phase) -> Self {
        Self {
            session_id: target.session_id,
            exercise_id: target.exercise_id,
            set_id: target.set_id,
            set_order: target.set_order,
            exercise_name,
            new_phase,
            detected_at: Utc::now(),
        }
    }

    pub fn concerns(&self, session_id: SessionId, exercise_id: ExerciseId, set_id: SetId) -> bool {
        self.session_id == session_id && self.exercise_id == exercise_id && self.set_id == set_id
    }
}

/// Named timer kinds. Each has its own independent controller.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum TimerType {
    SetDuration,
    Rest,
    WorkoutTotal,
    Inactivity,
    Confirmation,
}

impl TimerType {
    pub const ALL: [TimerType; 5] = [
        TimerType::SetDuration,
        TimerType::Rest,
        TimerType::WorkoutTotal,
        TimerType::Inactivity,
        TimerType::Confirmation,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            TimerType::SetDuration => "set_duration",
            TimerType::Rest => "rest",
            TimerType::WorkoutTotal => "workout_total",
            TimerType::Inactivity => "inactivity",
            TimerType::Confirmation => "confirmation",
        }
    }

    /// Whether the timer is shown to the user as the foreground countdown.
    /// Background timers never take the foreground slot.
    pub fn is_foreground(&self) -> bool {
        !matches!(self, TimerType::WorkoutTotal | TimerType::Inactivity)
    }
}

impl fmt::Display for TimerType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Declarative follow-up a timer requests when it completes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum AutoAction {
    NextSet,
    NextExercise,
    EndWorkout,
    PromptUser,
    ProposeAddSet,
    ProposeCompleteExercise,
    WaitForUser,
    #[default]
    None,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum TimerCommandKind {
    Start,
    Pause,
    Resume,
    Cancel,
    Sync,
}

/// Why a timer was cancelled, when it matters to the peer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum CancelReason {
    /// The user accepted what the timer was waiting on.
    Confirmed,
    /// The user rejected it (e.g. "I'm not done with this set").
    Rejected,
    /// A manual action made the timer moot.
    Superseded,
}

/// Mirrors a companion timer transition to the wearable.
///
/// `duration` is the remaining time in milliseconds: the full duration on
/// start, the frozen remainder on pause, and the live remainder on resume and
/// sync.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TimerCommand {
    pub command: TimerCommandKind,
    #[serde(rename = "type")]
    pub timer_type: TimerType,
    #[serde(default, rename = "duration", skip_serializing_if = "Option::is_none")]
    pub duration_ms: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub auto_action: Option<AutoAction>,
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub paused: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reason: Option<CancelReason>,
}

impl TimerCommand {
    fn build(command: TimerCommandKind, timer_type: TimerType, remaining: Option<Duration>) -> Self {
        Self {
            command,
            timer_type,
            duration_ms: remaining.map(|d| d.as_millis() as u64),
            auto_action: None,
            paused: false,
            reason: None,
        }
    }

    pub fn start(timer_type: TimerType, duration: Duration, auto_action: AutoAction) -> Self {
        let mut cmd = Self::build(TimerCommandKind::Start, timer_type, Some(duration));
        cmd.auto_action = Some(auto_action);
        cmd
    }

    pub fn pause(timer_type: TimerType, remaining: Duration) -> Self {
        let mut cmd = Self::build(TimerCommandKind::Pause, timer_type, Some(remaining));
        cmd.paused = true;
        cmd
    }

    pub fn resume(timer_type: TimerType, remaining: Duration) -> Self {
        Self::build(TimerCommandKind::Resume, timer_type, Some(remaining))
    }

    pub fn cancel(timer_type: TimerType) -> Self {
        Self::build(TimerCommandKind::Cancel, timer_type, None)
    }

    pub fn cancel_because(timer_type: TimerType, reason: CancelReason) -> Self {
        let mut cmd = Self::cancel(timer_type);
        cmd.reason = Some(reason);
        cmd
    }

    pub fn sync(timer_type: TimerType, remaining: Duration, paused: bool) -> Self {
        let mut cmd = Self::build(TimerCommandKind::Sync, timer_type, Some(remaining));
        cmd.paused = paused;
        cmd
    }

    pub fn duration(&self) -> Option<Duration> {
        self.duration_ms.map(Duration::from_millis)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_timer_command_wire_shape() {
        let cmd = TimerCommand::start(TimerType::Rest, Duration::from_secs(90), AutoAction::NextSet);
        let json = serde_json::to_value(&cmd).unwrap();
        assert_eq!(
            json,
            serde_json::json!({
                "command": "start",
                "type": "rest",
                "duration": 90000,
                "autoAction": "nextSet"
            })
        );
    }

    #[test]
    fn test_cancel_has_no_duration() {
        let json = serde_json::to_value(TimerCommand::cancel(TimerType::Confirmation)).unwrap();
        assert!(json.get("duration").is_none());
        assert_eq!(json["type"], "confirmation");
    }

    #[test]
    fn test_cancel_reason_on_wire() {
        let cmd = TimerCommand::cancel_because(TimerType::Confirmation, CancelReason::Rejected);
        let json = serde_json::to_value(&cmd).unwrap();
        assert_eq!(json["reason"], "rejected");
        let back: TimerCommand = serde_json::from_value(json).unwrap();
        assert_eq!(back, cmd);
    }

    #[test]
    fn test_auto_action_none_spelling() {
        assert_eq!(serde_json::to_string(&AutoAction::None).unwrap(), "\"none\"");
        assert_eq!(
            serde_json::to_string(&AutoAction::ProposeCompleteExercise).unwrap(),
            "\"proposeCompleteExercise\""
        );
    }

    #[test]
    fn test_phase_change_relevance() {
        let target = CaptureTarget {
            session_id: SessionId::new(),
            exercise_id: ExerciseId::new(),
            set_id: SetId::new(),
            set_order: 3,
        };
        let change = PhaseChange::new(&target, Some("Squat".into()), Phase::Rest);
        assert!(change.concerns(target.session_id, target.exercise_id, target.set_id));
        assert!(!change.concerns(target.session_id, target.exercise_id, SetId::new()));
        assert_eq!(change.set_order, 3);
    }
}
