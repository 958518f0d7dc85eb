//! Workout definitions.
//!
//! A plan is an ordered list of exercise templates, each with its planned
//! sets. Plans are read-only input to the session machine.
//!
//! ```toml
//! title = "Leg day"
//!
//! [[exercises]]
//! name = "Squat"
//! rest_seconds = 120
//! planned_sets = [{ target_reps = 5, weight = 100.0 }, { target_reps = 5, weight = 100.0 }]
//! ```

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use spotproto::{PlanId, TemplateId};
use std::path::Path;
use std::time::Duration;

#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct PlannedSet {
    #[serde(default)]
    pub target_reps: u32,
    #[serde(default)]
    pub weight: f64,
}

impl PlannedSet {
    pub fn new(target_reps: u32, weight: f64) -> Self {
        Self {
            target_reps,
            weight,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExerciseTemplate {
    #[serde(default)]
    pub id: TemplateId,
    pub name: String,
    #[serde(default)]
    pub planned_sets: Vec<PlannedSet>,
    /// Rest after each set. Falls back to the configured default when absent.
    #[serde(default)]
    pub rest_seconds: Option<u32>,
}

impl ExerciseTemplate {
    pub fn new(name: impl Into<String>, planned_sets: Vec<PlannedSet>) -> Self {
        Self {
            id: TemplateId::new(),
            name: name.into(),
            planned_sets,
            rest_seconds: None,
        }
    }

    pub fn with_rest(mut self, seconds: u32) -> Self {
        self.rest_seconds = Some(seconds);
        self
    }

    /// Planned values for the set at `order` (1-based), if the plan has one.
    pub fn planned(&self, order: u32) -> Option<PlannedSet> {
        let index = usize::try_from(order.checked_sub(1)?).ok()?;
        self.planned_sets.get(index).copied()
    }

    pub fn rest(&self, default: Duration) -> Duration {
        self.rest_seconds
            .map(|s| Duration::from_secs(u64::from(s)))
            .unwrap_or(default)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WorkoutPlan {
    #[serde(default)]
    pub id: PlanId,
    pub title: String,
    #[serde(default)]
    pub exercises: Vec<ExerciseTemplate>,
}

impl WorkoutPlan {
    pub fn new(title: impl Into<String>, exercises: Vec<ExerciseTemplate>) -> Self {
        Self {
            id: PlanId::new(),
            title: title.into(),
            exercises,
        }
    }

    pub fn from_toml_str(contents: &str) -> Result<Self> {
        toml::from_str(contents).context("failed to parse workout plan")
    }

    pub fn load(path: &Path) -> Result<Self> {
        let contents = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read plan {}", path.display()))?;
        Self::from_toml_str(&contents).with_context(|| format!("in {}", path.display()))
    }

    pub fn template(&self, id: TemplateId) -> Option<&ExerciseTemplate> {
        self.exercises.iter().find(|t| t.id == id)
    }

    pub fn first(&self) -> Option<&ExerciseTemplate> {
        self.exercises.first()
    }

    /// The plan `spotter simulate` runs when none is given.
    pub fn demo() -> Self {
        Self::new(
            "Demo push",
            vec![
                ExerciseTemplate::new(
                    "Bench press",
                    vec![PlannedSet::new(8, 60.0), PlannedSet::new(8, 60.0)],
                )
                .with_rest(60),
                ExerciseTemplate::new("Overhead press", vec![PlannedSet::new(10, 30.0)])
                    .with_rest(45),
            ],
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_plan_from_toml() {
        let plan = WorkoutPlan::from_toml_str(
            r#"
            title = "Leg day"

            [[exercises]]
            name = "Squat"
            rest_seconds = 120
            planned_sets = [{ target_reps = 5, weight = 100.0 }, { target_reps = 3 }]

            [[exercises]]
            name = "Lunge"
            "#,
        )
        .unwrap();

        assert_eq!(plan.title, "Leg day");
        assert_eq!(plan.exercises.len(), 2);
        let squat = &plan.exercises[0];
        assert_eq!(squat.planned(1), Some(PlannedSet::new(5, 100.0)));
        assert_eq!(squat.planned(2), Some(PlannedSet::new(3, 0.0)));
        assert_eq!(squat.planned(3), None);
        assert_eq!(squat.planned(0), None);
        assert_eq!(squat.rest(Duration::from_secs(90)), Duration::from_secs(120));
        assert_eq!(
            plan.exercises[1].rest(Duration::from_secs(90)),
            Duration::from_secs(90)
        );
        assert_ne!(squat.id, plan.exercises[1].id, "ids are generated when absent");
    }

    #[test]
    fn test_bad_plan_reports_context() {
        let err = WorkoutPlan::from_toml_str("exercises = 3").unwrap_err();
        assert!(format!("{err:#}").contains("failed to parse workout plan"));
    }
}
