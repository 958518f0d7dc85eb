//! What a completed timer asks the engine to do.

use super::controller::TimerEvent;
use serde::Serialize;
use spotproto::{AutoAction, TimerType};

/// Engine-level follow-up decoded from a timer completion.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum Intent {
    /// Start the next planned set of the active exercise.
    StartNextSet,
    /// End the active exercise and open the next pending one.
    StartNextExercise,
    EndWorkout,
    /// Ask the user whether to continue (e.g. after inactivity).
    Prompt(TimerType),
    ProposeAddSet,
    ProposeCompleteExercise,
    /// Leave the pending decision with the user.
    AwaitUser(TimerType),
}

impl Intent {
    pub fn from_action(timer_type: TimerType, action: AutoAction) -> Option<Self> {
        match action {
            AutoAction::NextSet => Some(Intent::StartNextSet),
            AutoAction::NextExercise => Some(Intent::StartNextExercise),
            AutoAction::EndWorkout => Some(Intent::EndWorkout),
            AutoAction::PromptUser => Some(Intent::Prompt(timer_type)),
            AutoAction::ProposeAddSet => Some(Intent::ProposeAddSet),
            AutoAction::ProposeCompleteExercise => Some(Intent::ProposeCompleteExercise),
            AutoAction::WaitForUser => Some(Intent::AwaitUser(timer_type)),
            AutoAction::None => None,
        }
    }

    /// Decode a completion event. Other events carry no intent.
    pub fn from_event(event: &TimerEvent) -> Option<Self> {
        match *event {
            TimerEvent::Completed {
                timer_type,
                auto_action,
            } => Self::from_action(timer_type, auto_action),
            _ => None,
        }
    }

    /// Whether the engine acts on it without user input.
    pub fn is_automatic(&self) -> bool {
        matches!(
            self,
            Intent::StartNextSet | Intent::StartNextExercise | Intent::EndWorkout
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_only_completions_carry_intent() {
        let done = TimerEvent::Completed {
            timer_type: TimerType::Rest,
            auto_action: AutoAction::NextSet,
        };
        assert_eq!(Intent::from_event(&done), Some(Intent::StartNextSet));
        assert!(Intent::StartNextSet.is_automatic());

        let warning = TimerEvent::Warning {
            timer_type: TimerType::Rest,
            remaining: std::time::Duration::from_secs(10),
        };
        assert_eq!(Intent::from_event(&warning), None);
    }

    #[test]
    fn test_user_facing_actions() {
        let confirm = Intent::from_action(TimerType::Confirmation, AutoAction::WaitForUser);
        assert_eq!(confirm, Some(Intent::AwaitUser(TimerType::Confirmation)));
        assert!(!Intent::ProposeCompleteExercise.is_automatic());
        assert_eq!(Intent::from_action(TimerType::Rest, AutoAction::None), None);
    }
}
