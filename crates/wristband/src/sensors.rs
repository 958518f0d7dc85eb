//! Motion sources.
//!
//! A source is started once. If it cannot start (no hardware, no permission)
//! capture never begins and the rest of the peer keeps running.

use chrono::{DateTime, Utc};
use spotproto::MotionSample;
use std::f64::consts::TAU;
use std::time::Duration;
use thiserror::Error;
use tokio::time::Instant;

#[derive(Debug, Error, Clone, PartialEq)]
pub enum CaptureError {
    #[error("motion hardware unavailable: {0}")]
    Unavailable(String),
    #[error("motion permission denied")]
    PermissionDenied,
}

pub trait MotionSource: Send {
    fn start(&mut self) -> Result<(), CaptureError>;

    /// Read one sample. `None` means no reading this tick.
    fn read(&mut self, at: DateTime<Utc>) -> Option<MotionSample>;
}

/// One stretch of scripted motion.
#[derive(Debug, Clone, PartialEq)]
pub enum Motion {
    /// Wrist held still.
    Still(Duration),
    /// Periodic lifting: user acceleration swings with the given amplitude (g)
    /// and repetition period.
    Lifting {
        duration: Duration,
        amplitude: f64,
        period: Duration,
    },
}

impl Motion {
    pub fn lifting(duration: Duration) -> Self {
        Motion::Lifting {
            duration,
            amplitude: 0.6,
            period: Duration::from_millis(1500),
        }
    }

    fn duration(&self) -> Duration {
        match self {
            Motion::Still(d) => *d,
            Motion::Lifting { duration, .. } => *duration,
        }
    }

    /// The sample this motion produces `into` its stretch.
    pub fn sample(&self, into: Duration, at: DateTime<Utc>) -> MotionSample {
        let sample = MotionSample::at_rest(at);
        match self {
            Motion::Still(_) => sample,
            Motion::Lifting {
                amplitude, period, ..
            } => {
                let phase = TAU * into.as_secs_f64() / period.as_secs_f64().max(0.001);
                sample
                    .with_acceleration(0.0, amplitude * phase.sin(), 0.2 * amplitude * phase.cos())
                    .with_rotation(amplitude * phase.cos(), 0.0, 0.0)
            }
        }
    }
}

/// Deterministic source replaying a motion script against the monotonic clock.
/// After the script runs out the wrist stays still.
#[derive(Debug, Clone)]
pub struct ScriptedSource {
    script: Vec<Motion>,
    started: Option<Instant>,
}

impl ScriptedSource {
    pub fn new(script: Vec<Motion>) -> Self {
        Self {
            script,
            started: None,
        }
    }

    fn motion_at(&self, elapsed: Duration) -> Option<(&Motion, Duration)> {
        let mut offset = Duration::ZERO;
        for motion in &self.script {
            let end = offset + motion.duration();
            if elapsed < end {
                return Some((motion, elapsed - offset));
            }
            offset = end;
        }
        None
    }
}

impl MotionSource for ScriptedSource {
    fn start(&mut self) -> Result<(), CaptureError> {
        self.started = Some(Instant::now());
        Ok(())
    }

    fn read(&mut self, at: DateTime<Utc>) -> Option<MotionSample> {
        let started = self.started?;
        let sample = match self.motion_at(started.elapsed()) {
            Some((motion, into)) => motion.sample(into, at),
            None => MotionSample::at_rest(at),
        };
        Some(sample)
    }
}

/// Source for devices without motion hardware or permission.
#[derive(Debug, Clone)]
pub struct UnavailableSource(pub CaptureError);

impl MotionSource for UnavailableSource {
    fn start(&mut self) -> Result<(), CaptureError> {
        Err(self.0.clone())
    }

    fn read(&mut self, _at: DateTime<Utc>) -> Option<MotionSample> {
        None
    }
}
