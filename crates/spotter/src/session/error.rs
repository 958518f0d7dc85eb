use spotproto::{ExerciseId, SessionId, SetId, TemplateId};
use thiserror::Error;

/// Precondition violations of lifecycle operations. Never retried.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SessionError {
    #[error("a workout is already active ({session_id})")]
    SessionAlreadyActive { session_id: SessionId },

    #[error("no active workout")]
    NoActiveSession,

    #[error("no active exercise")]
    NoActiveExercise,

    #[error("set {set_id} is already active")]
    SetAlreadyActive { set_id: SetId },

    #[error("no active set")]
    NoActiveSet,

    #[error("set {set_id} is already finalized")]
    SetAlreadyFinalized { set_id: SetId },

    #[error("exercise {exercise_id} has no finalized set")]
    NoFinalizedSet { exercise_id: ExerciseId },

    #[error("weight must be a finite, non-negative number")]
    InvalidWeight,

    #[error("set limit of {limit} per exercise reached")]
    SetLimitReached { limit: u32 },

    #[error("workout plan has no exercises")]
    EmptyPlan,

    #[error("exercise {0} is not in the workout plan")]
    UnknownTemplate(TemplateId),

    #[error("invalid exercise order: {0}")]
    InvalidOrder(String),

    #[error("no detected set end is waiting for confirmation")]
    NothingToConfirm,
}
