//! Wearable-side copies of the companion's timers, for display only.

use spotproto::{AutoAction, TimerCommand, TimerCommandKind, TimerType};
use std::time::Duration;
use tokio::time::Instant;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MirrorState {
    Idle,
    Running { ends_at: Instant },
    Paused { remaining: Duration },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MirroredTimer {
    pub timer_type: TimerType,
    pub state: MirrorState,
    pub auto_action: AutoAction,
}

impl MirroredTimer {
    pub fn new(timer_type: TimerType) -> Self {
        Self {
            timer_type,
            state: MirrorState::Idle,
            auto_action: AutoAction::None,
        }
    }

    pub fn apply(&mut self, command: &TimerCommand) {
        let remaining = command.duration().unwrap_or_default();
        self.state = match command.command {
            TimerCommandKind::Start => {
                self.auto_action = command.auto_action.unwrap_or_default();
                MirrorState::Running {
                    ends_at: Instant::now() + remaining,
                }
            }
            TimerCommandKind::Pause => MirrorState::Paused { remaining },
            TimerCommandKind::Resume => MirrorState::Running {
                ends_at: Instant::now() + remaining,
            },
            TimerCommandKind::Sync if command.paused => MirrorState::Paused { remaining },
            TimerCommandKind::Sync => MirrorState::Running {
                ends_at: Instant::now() + remaining,
            },
            TimerCommandKind::Cancel => MirrorState::Idle,
        };
    }

    pub fn remaining(&self) -> Option<Duration> {
        match self.state {
            MirrorState::Idle => None,
            MirrorState::Running { ends_at } => {
                Some(ends_at.saturating_duration_since(Instant::now()))
            }
            MirrorState::Paused { remaining } => Some(remaining),
        }
    }

    pub fn is_running(&self) -> bool {
        matches!(self.state, MirrorState::Running { .. })
    }
}
