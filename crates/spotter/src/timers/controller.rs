//! One named timer.
//!
//! Remaining time is recomputed from the start instant minus accumulated
//! paused time on every query, so missed ticks or a suspended process never
//! skew the countdown.

use serde::Serialize;
use spotproto::{AutoAction, TimerType};
use std::time::Duration;
use thiserror::Error;
use tokio::time::Instant;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TimerError {
    #[error("{timer_type} timer is already running")]
    AlreadyRunning { timer_type: TimerType },

    #[error("{timer_type} timer is not running")]
    NotRunning { timer_type: TimerType },

    #[error("{timer_type} timer is not paused")]
    NotPaused { timer_type: TimerType },

    #[error("{timer_type} timer is idle")]
    Idle { timer_type: TimerType },

    #[error("no timer is active")]
    NoneActive,
}

impl TimerError {
    /// What the caller can do about it.
    pub fn recovery_hint(&self) -> &'static str {
        match self {
            TimerError::AlreadyRunning { .. } => "cancel the running timer before starting it again",
            TimerError::NotRunning { .. } => "start or resume the timer first",
            TimerError::NotPaused { .. } => "only a paused timer can be resumed",
            TimerError::Idle { .. } => "start the timer first",
            TimerError::NoneActive => "start a timer first",
        }
    }
}

/// Observable state of a timer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase", tag = "state")]
pub enum TimerState {
    Idle,
    Running {
        remaining: Duration,
        timer_type: TimerType,
    },
    Paused {
        remaining: Duration,
        timer_type: TimerType,
    },
    Completed {
        timer_type: TimerType,
        auto_action: AutoAction,
    },
}

impl TimerState {
    pub fn is_idle(&self) -> bool {
        matches!(self, TimerState::Idle)
    }

    pub fn remaining(&self) -> Option<Duration> {
        match self {
            TimerState::Running { remaining, .. } | TimerState::Paused { remaining, .. } => {
                Some(*remaining)
            }
            _ => None,
        }
    }
}

/// Emitted on every transition, and by ticks.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase", tag = "event")]
pub enum TimerEvent {
    Started {
        timer_type: TimerType,
        duration: Duration,
        auto_action: AutoAction,
    },
    Paused {
        timer_type: TimerType,
        remaining: Duration,
    },
    Resumed {
        timer_type: TimerType,
        remaining: Duration,
    },
    Cancelled {
        timer_type: TimerType,
    },
    Warning {
        timer_type: TimerType,
        remaining: Duration,
    },
    Completed {
        timer_type: TimerType,
        auto_action: AutoAction,
    },
}

impl TimerEvent {
    pub fn timer_type(&self) -> TimerType {
        match self {
            TimerEvent::Started { timer_type, .. }
            | TimerEvent::Paused { timer_type, .. }
            | TimerEvent::Resumed { timer_type, .. }
            | TimerEvent::Cancelled { timer_type }
            | TimerEvent::Warning { timer_type, .. }
            | TimerEvent::Completed { timer_type, .. } => *timer_type,
        }
    }
}

#[derive(Debug, Clone, Copy)]
struct Countdown {
    started: Instant,
    duration: Duration,
    paused_total: Duration,
    paused_at: Option<Instant>,
    auto_action: AutoAction,
    warned: bool,
}

impl Countdown {
    fn elapsed(&self, now: Instant) -> Duration {
        let until = self.paused_at.unwrap_or(now);
        until
            .saturating_duration_since(self.started)
            .saturating_sub(self.paused_total)
    }

    fn remaining(&self, now: Instant) -> Duration {
        self.duration.saturating_sub(self.elapsed(now))
    }
}

#[derive(Debug, Clone, Copy)]
enum Phase {
    Idle,
    Counting(Countdown),
    Completed(AutoAction),
}

#[derive(Debug, Clone)]
pub struct TimerController {
    timer_type: TimerType,
    phase: Phase,
}

impl TimerController {
    pub fn new(timer_type: TimerType) -> Self {
        Self {
            timer_type,
            phase: Phase::Idle,
        }
    }

    pub fn timer_type(&self) -> TimerType {
        self.timer_type
    }

    pub fn start(
        &mut self,
        duration: Duration,
        auto_action: AutoAction,
        now: Instant,
    ) -> Result<TimerEvent, TimerError> {
        if let Phase::Counting(_) = self.phase {
            return Err(TimerError::AlreadyRunning {
                timer_type: self.timer_type,
            });
        }
        self.phase = Phase::Counting(Countdown {
            started: now,
            duration,
            paused_total: Duration::ZERO,
            paused_at: None,
            auto_action,
            warned: false,
        });
        Ok(TimerEvent::Started {
            timer_type: self.timer_type,
            duration,
            auto_action,
        })
    }

    pub fn pause(&mut self, now: Instant) -> Result<TimerEvent, TimerError> {
        match &mut self.phase {
            Phase::Counting(c) if c.paused_at.is_none() => {
                c.paused_at = Some(now);
                Ok(TimerEvent::Paused {
                    timer_type: self.timer_type,
                    remaining: c.remaining(now),
                })
            }
            _ => Err(TimerError::NotRunning {
                timer_type: self.timer_type,
            }),
        }
    }

    pub fn resume(&mut self, now: Instant) -> Result<TimerEvent, TimerError> {
        match &mut self.phase {
            Phase::Counting(c) => match c.paused_at.take() {
                Some(paused_at) => {
                    c.paused_total += now.saturating_duration_since(paused_at);
                    Ok(TimerEvent::Resumed {
                        timer_type: self.timer_type,
                        remaining: c.remaining(now),
                    })
                }
                None => Err(TimerError::NotPaused {
                    timer_type: self.timer_type,
                }),
            },
            _ => Err(TimerError::NotPaused {
                timer_type: self.timer_type,
            }),
        }
    }

    /// Back to idle. Cancelling an idle timer is an error; a completed one
    /// is simply cleared.
    pub fn cancel(&mut self) -> Result<TimerEvent, TimerError> {
        if let Phase::Idle = self.phase {
            return Err(TimerError::Idle {
                timer_type: self.timer_type,
            });
        }
        self.phase = Phase::Idle;
        Ok(TimerEvent::Cancelled {
            timer_type: self.timer_type,
        })
    }

    /// Advance. Emits the warning once when `warning` or less remains, and
    /// the completion exactly once.
    pub fn tick(&mut self, now: Instant, warning: Duration) -> Option<TimerEvent> {
        let Phase::Counting(c) = &mut self.phase else {
            return None;
        };
        if c.paused_at.is_some() {
            return None;
        }
        let remaining = c.remaining(now);
        if remaining.is_zero() {
            let auto_action = c.auto_action;
            self.phase = Phase::Completed(auto_action);
            return Some(TimerEvent::Completed {
                timer_type: self.timer_type,
                auto_action,
            });
        }
        if !c.warned && remaining <= warning && c.duration > warning {
            c.warned = true;
            return Some(TimerEvent::Warning {
                timer_type: self.timer_type,
                remaining,
            });
        }
        None
    }

    pub fn state(&self, now: Instant) -> TimerState {
        match &self.phase {
            Phase::Idle => TimerState::Idle,
            Phase::Counting(c) if c.paused_at.is_some() => TimerState::Paused {
                remaining: c.remaining(now),
                timer_type: self.timer_type,
            },
            Phase::Counting(c) => TimerState::Running {
                remaining: c.remaining(now),
                timer_type: self.timer_type,
            },
            Phase::Completed(auto_action) => TimerState::Completed {
                timer_type: self.timer_type,
                auto_action: *auto_action,
            },
        }
    }

    /// Running or paused.
    pub fn is_active(&self) -> bool {
        matches!(self.phase, Phase::Counting(_))
    }

    pub fn is_paused(&self) -> bool {
        matches!(self.phase, Phase::Counting(c) if c.paused_at.is_some())
    }

    /// Time counted so far, excluding pauses.
    pub fn elapsed(&self, now: Instant) -> Option<Duration> {
        match &self.phase {
            Phase::Counting(c) => Some(c.elapsed(now)),
            _ => None,
        }
    }

    pub fn auto_action(&self) -> Option<AutoAction> {
        match &self.phase {
            Phase::Counting(c) => Some(c.auto_action),
            Phase::Completed(action) => Some(*action),
            Phase::Idle => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const WARN: Duration = Duration::from_secs(10);

    #[test]
    fn test_start_pause_resume_cancel_ends_idle() {
        let t0 = Instant::now();
        let mut timer = TimerController::new(TimerType::Rest);
        timer.start(Duration::from_secs(60), AutoAction::NextSet, t0).unwrap();
        timer.pause(t0 + Duration::from_secs(20)).unwrap();
        assert_eq!(
            timer.state(t0 + Duration::from_secs(50)),
            TimerState::Paused {
                remaining: Duration::from_secs(40),
                timer_type: TimerType::Rest
            }
        );
        timer.resume(t0 + Duration::from_secs(50)).unwrap();
        assert_eq!(
            timer.state(t0 + Duration::from_secs(55)).remaining(),
            Some(Duration::from_secs(35))
        );
        timer.cancel().unwrap();
        assert!(timer.state(t0 + Duration::from_secs(56)).is_idle());
    }

    #[test]
    fn test_completion_fires_once() {
        let t0 = Instant::now();
        let mut timer = TimerController::new(TimerType::Rest);
        timer.start(Duration::from_secs(30), AutoAction::NextSet, t0).unwrap();

        let mut completions = 0;
        let mut warnings = 0;
        for s in 0..=45 {
            match timer.tick(t0 + Duration::from_secs(s), WARN) {
                Some(TimerEvent::Completed { auto_action, .. }) => {
                    assert_eq!(auto_action, AutoAction::NextSet);
                    completions += 1;
                }
                Some(TimerEvent::Warning { remaining, .. }) => {
                    assert_eq!(remaining, WARN);
                    warnings += 1;
                }
                _ => {}
            }
        }
        assert_eq!((completions, warnings), (1, 1));
        assert_eq!(
            timer.state(t0 + Duration::from_secs(60)),
            TimerState::Completed {
                timer_type: TimerType::Rest,
                auto_action: AutoAction::NextSet
            }
        );
    }

    #[test]
    fn test_missed_ticks_do_not_skew() {
        let t0 = Instant::now();
        let mut timer = TimerController::new(TimerType::WorkoutTotal);
        timer
            .start(Duration::from_secs(100), AutoAction::EndWorkout, t0)
            .unwrap();
        // One tick after a long suspension.
        assert!(matches!(
            timer.tick(t0 + Duration::from_secs(500), WARN),
            Some(TimerEvent::Completed { .. })
        ));
    }

    #[test]
    fn test_errors_and_hints() {
        let t0 = Instant::now();
        let mut timer = TimerController::new(TimerType::Inactivity);
        assert_eq!(
            timer.cancel(),
            Err(TimerError::Idle {
                timer_type: TimerType::Inactivity
            })
        );
        assert!(timer.resume(t0).is_err());

        timer.start(Duration::from_secs(5), AutoAction::PromptUser, t0).unwrap();
        let err = timer
            .start(Duration::from_secs(5), AutoAction::PromptUser, t0)
            .unwrap_err();
        assert_eq!(
            err,
            TimerError::AlreadyRunning {
                timer_type: TimerType::Inactivity
            }
        );
        assert!(!err.recovery_hint().is_empty());

        timer.pause(t0).unwrap();
        assert!(timer.pause(t0).is_err(), "already paused");
        assert!(timer.tick(t0 + Duration::from_secs(30), WARN).is_none(), "paused timers hold");
    }

    #[test]
    fn test_short_timer_skips_warning() {
        let t0 = Instant::now();
        let mut timer = TimerController::new(TimerType::Confirmation);
        timer
            .start(Duration::from_secs(10), AutoAction::WaitForUser, t0)
            .unwrap();
        assert_eq!(timer.tick(t0 + Duration::from_secs(1), WARN), None);
        assert!(matches!(
            timer.tick(t0 + Duration::from_secs(10), WARN),
            Some(TimerEvent::Completed { .. })
        ));
    }
}
