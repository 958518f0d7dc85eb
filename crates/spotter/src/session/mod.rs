//! Session State Machine and its supporting types.

pub mod error;
pub mod machine;
pub mod model;
pub mod policy;
pub mod registry;

pub use error::SessionError;
pub use machine::{
    ExerciseFinalized, ExerciseStarted, NextStep, Reordered, SessionMachine, SetFinalized,
    SetStarted, WorkoutFinalized, WorkoutStarted,
};
pub use model::{
    Arena, EndTrigger, EntityStatus, LiveExercise, LiveSession, LiveSet, SessionSnapshot,
};
pub use policy::{FreeTierLimit, SetLimitPolicy, Unlimited};
pub use registry::SessionRegistry;
