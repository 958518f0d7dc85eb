//! Execution/rest phase detection.
//!
//! Intensity is the standard deviation of acceleration magnitude over a
//! rolling window of recent samples. Execution -> rest requires intensity to
//! stay below the threshold for the whole confirmation window; rest ->
//! execution fires on the first sample above it.
//!
//! Time is taken from sample timestamps, never from the wall clock, so the
//! detector is a pure function of the samples it sees.

use chrono::{DateTime, Utc};
use spotconf::PhaseConfig;
use spotproto::{MotionSample, Phase};
use std::collections::VecDeque;
use std::time::Duration;
use tracing::debug;

/// A phase change produced by the detector.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PhaseTransition {
    pub from: Phase,
    pub to: Phase,
    /// False when a manual change asked for this notification to be swallowed.
    pub notify: bool,
}

#[derive(Debug, Clone)]
pub struct PhaseDetector {
    threshold: f64,
    confirmation: Duration,
    window_size: usize,
    window: VecDeque<f64>,
    phase: Phase,
    below_since: Option<DateTime<Utc>>,
    suppressed: Option<Phase>,
}

impl PhaseDetector {
    pub fn new(config: &PhaseConfig) -> Self {
        let window_size = config.window_samples.max(2);
        Self {
            threshold: config.intensity_threshold,
            confirmation: config.confirmation(),
            window_size,
            window: VecDeque::with_capacity(window_size),
            phase: Phase::Execution,
            below_since: None,
            suppressed: None,
        }
    }

    pub fn phase(&self) -> Phase {
        self.phase
    }

    pub fn suppressed(&self) -> Option<Phase> {
        self.suppressed
    }

    /// Standard deviation of acceleration magnitude over the window.
    pub fn intensity(&self) -> f64 {
        let n = self.window.len();
        if n < 2 {
            return 0.0;
        }
        let mean = self.window.iter().sum::<f64>() / n as f64;
        let variance = self.window.iter().map(|m| (m - mean).powi(2)).sum::<f64>() / n as f64;
        variance.sqrt()
    }

    pub fn observe(&mut self, sample: &MotionSample) -> Option<PhaseTransition> {
        if self.window.len() == self.window_size {
            self.window.pop_front();
        }
        self.window.push_back(sample.acceleration_magnitude());
        if self.window.len() < self.window_size {
            return None;
        }

        let intensity = self.intensity();
        match self.phase {
            Phase::Execution if intensity < self.threshold => {
                let since = *self.below_since.get_or_insert(sample.timestamp);
                let still_for = (sample.timestamp - since).to_std().unwrap_or_default();
                if still_for >= self.confirmation {
                    return Some(self.transition(Phase::Rest, intensity));
                }
                None
            }
            Phase::Execution => {
                self.below_since = None;
                None
            }
            Phase::Rest if intensity >= self.threshold => {
                Some(self.transition(Phase::Execution, intensity))
            }
            Phase::Rest => None,
        }
    }

    fn transition(&mut self, to: Phase, intensity: f64) -> PhaseTransition {
        let from = self.phase;
        self.phase = to;
        self.below_since = None;
        // The marker only ever covers the next natural transition.
        let notify = self.suppressed.take() != Some(to);
        debug!(%from, %to, intensity, notify, "phase transition detected");
        PhaseTransition { from, to, notify }
    }

    /// Manual phase change: no notification is produced for it, and the next
    /// automatic notification into the same phase is suppressed.
    pub fn force_phase(&mut self, phase: Phase) {
        self.phase = phase;
        self.below_since = None;
        self.suppressed = Some(phase);
    }

    /// Swallow the next automatic notification into `phase`.
    pub fn suppress(&mut self, phase: Phase) {
        self.suppressed = Some(phase);
    }

    /// Start over for a new set.
    pub fn reset(&mut self) {
        self.window.clear();
        self.phase = Phase::Execution;
        self.below_since = None;
        self.suppressed = None;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config() -> PhaseConfig {
        PhaseConfig::default()
    }

    /// Feed `count` samples spaced `step_ms` apart, starting at `start`.
    fn feed(
        detector: &mut PhaseDetector,
        start: DateTime<Utc>,
        count: usize,
        step_ms: i64,
        moving: bool,
    ) -> (Vec<PhaseTransition>, DateTime<Utc>) {
        let mut transitions = Vec::new();
        let mut at = start;
        for i in 0..count {
            let accel = if moving && i % 2 == 0 { 0.5 } else { 0.0 };
            let sample = MotionSample::at_rest(at).with_acceleration(0.0, accel, 0.0);
            if let Some(t) = detector.observe(&sample) {
                transitions.push(t);
            }
            at += chrono::Duration::milliseconds(step_ms);
        }
        (transitions, at)
    }

    #[test]
    fn test_stillness_needs_full_confirmation_window() {
        let mut detector = PhaseDetector::new(&config());
        let start = Utc::now();
        let (t, at) = feed(&mut detector, start, 50, 20, true);
        assert!(t.is_empty());
        assert_eq!(detector.phase(), Phase::Execution);

        // 40 still samples at 20ms: window fills with zeros after 25, then
        // less than a second of stillness has been confirmed.
        let (t, at) = feed(&mut detector, at, 40, 20, false);
        assert!(t.is_empty());

        let (t, _) = feed(&mut detector, at, 60, 20, false);
        assert_eq!(
            t,
            vec![PhaseTransition {
                from: Phase::Execution,
                to: Phase::Rest,
                notify: true
            }]
        );
        assert_eq!(detector.phase(), Phase::Rest);
    }

    #[test]
    fn test_brief_pause_does_not_end_execution() {
        let mut detector = PhaseDetector::new(&config());
        let (_, at) = feed(&mut detector, Utc::now(), 50, 20, true);
        let (_, at) = feed(&mut detector, at, 60, 20, false);
        let (t, _) = feed(&mut detector, at, 30, 20, true);
        // 60 still samples: 24 to flush the window, then only ~0.7s confirmed.
        assert!(t.is_empty());
        assert_eq!(detector.phase(), Phase::Execution);
    }

    #[test]
    fn test_resumed_motion_is_immediate() {
        let mut detector = PhaseDetector::new(&config());
        detector.force_phase(Phase::Rest);
        detector.suppressed = None;

        let (_, at) = feed(&mut detector, Utc::now(), 25, 50, false);
        let (t, _) = feed(&mut detector, at, 2, 50, true);
        assert_eq!(t.len(), 1);
        assert_eq!(t[0].to, Phase::Execution);
        assert!(t[0].notify);
    }

    #[test]
    fn test_suppression_swallows_next_matching_transition_only() {
        let mut detector = PhaseDetector::new(&config());
        let (_, at) = feed(&mut detector, Utc::now(), 50, 20, true);
        detector.suppress(Phase::Rest);

        let (t, at) = feed(&mut detector, at, 100, 20, false);
        assert_eq!(t.len(), 1);
        assert!(!t[0].notify, "suppressed transition must not notify");
        assert_eq!(detector.suppressed(), None);

        let (t, at) = feed(&mut detector, at, 2, 20, true);
        assert!(t[0].notify);
        let (t, _) = feed(&mut detector, at, 100, 20, false);
        assert!(t[0].notify, "marker was cleared by the earlier transition");
    }

    #[test]
    fn test_marker_cleared_by_non_matching_transition() {
        let mut detector = PhaseDetector::new(&config());
        detector.force_phase(Phase::Rest);
        assert_eq!(detector.suppressed(), Some(Phase::Rest));

        let (t, _) = feed(&mut detector, Utc::now(), 30, 20, true);
        assert_eq!(t[0].to, Phase::Execution);
        assert!(t[0].notify);
        assert_eq!(detector.suppressed(), None);
    }
}
