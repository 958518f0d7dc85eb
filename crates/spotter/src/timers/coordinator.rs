//! Named timers with one independent controller per type.
//!
//! Every transition is mirrored to the wearable and published on a broadcast
//! channel. The coordinator never touches the session machine; completion
//! events carry the auto-action and the engine decides what to do with it.

use super::controller::{TimerController, TimerError, TimerEvent, TimerState};
use spotconf::TimersConfig;
use spotproto::transfer::{Delivery, TransferChannel};
use spotproto::{AutoAction, CancelReason, TimerCommand, TimerType};
use std::collections::BTreeMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;
use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

const EVENT_CAPACITY: usize = 64;

/// Foreground timers in display priority.
const FOREGROUND: [TimerType; 3] = [TimerType::Confirmation, TimerType::Rest, TimerType::SetDuration];

/// Where timer commands go so the peer can show the same countdown.
pub trait TimerMirror: Send + Sync {
    fn mirror(&self, command: &TimerCommand);
}

impl TimerMirror for TransferChannel {
    fn mirror(&self, command: &TimerCommand) {
        if self.send_timer_command(command) == Delivery::Dropped {
            debug!(timer = %command.timer_type, "timer command not mirrored, peer unreachable");
        }
    }
}

/// Mirror for a companion without a wearable.
#[derive(Debug, Default, Clone, Copy)]
pub struct NullMirror;

impl TimerMirror for NullMirror {
    fn mirror(&self, _command: &TimerCommand) {}
}

pub struct TimerCoordinator {
    controllers: Mutex<BTreeMap<TimerType, TimerController>>,
    warning: Duration,
    tick: Duration,
    events: broadcast::Sender<TimerEvent>,
    mirror: Arc<dyn TimerMirror>,
}

impl TimerCoordinator {
    pub fn new(config: &TimersConfig, mirror: Arc<dyn TimerMirror>) -> Self {
        let controllers = TimerType::ALL
            .into_iter()
            .map(|t| (t, TimerController::new(t)))
            .collect();
        let (events, _) = broadcast::channel(EVENT_CAPACITY);
        Self {
            controllers: Mutex::new(controllers),
            warning: config.warning(),
            tick: config.tick(),
            events,
            mirror,
        }
    }

    fn lock(&self) -> MutexGuard<'_, BTreeMap<TimerType, TimerController>> {
        self.controllers.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn with_controller<T>(
        &self,
        timer_type: TimerType,
        f: impl FnOnce(&mut TimerController) -> T,
    ) -> T {
        let mut controllers = self.lock();
        let controller = controllers
            .entry(timer_type)
            .or_insert_with(|| TimerController::new(timer_type));
        f(controller)
    }

    fn publish(&self, event: TimerEvent) {
        // No subscribers is fine.
        let _ = self.events.send(event);
    }

    pub fn subscribe(&self) -> broadcast::Receiver<TimerEvent> {
        self.events.subscribe()
    }

    pub fn start(
        &self,
        timer_type: TimerType,
        duration: Duration,
        auto_action: AutoAction,
    ) -> Result<(), TimerError> {
        let event = self.with_controller(timer_type, |c| c.start(duration, auto_action, Instant::now()))?;
        info!(timer = %timer_type, secs = duration.as_secs_f64(), ?auto_action, "timer started");
        self.mirror
            .mirror(&TimerCommand::start(timer_type, duration, auto_action));
        self.publish(event);
        Ok(())
    }

    /// Start, replacing whatever that timer was doing.
    pub fn restart(&self, timer_type: TimerType, duration: Duration, auto_action: AutoAction) {
        let now = Instant::now();
        let event = self.with_controller(timer_type, |c| {
            let _ = c.cancel();
            c.start(duration, auto_action, now)
        });
        if let Ok(event) = event {
            debug!(timer = %timer_type, secs = duration.as_secs_f64(), ?auto_action, "timer restarted");
            self.mirror
                .mirror(&TimerCommand::start(timer_type, duration, auto_action));
            self.publish(event);
        }
    }

    pub fn pause(&self, timer_type: TimerType) -> Result<Duration, TimerError> {
        let event = self.with_controller(timer_type, |c| c.pause(Instant::now()))?;
        let TimerEvent::Paused { remaining, .. } = event else {
            return Err(TimerError::NotRunning { timer_type });
        };
        info!(timer = %timer_type, remaining_secs = remaining.as_secs_f64(), "timer paused");
        self.mirror.mirror(&TimerCommand::pause(timer_type, remaining));
        self.publish(event);
        Ok(remaining)
    }

    pub fn resume(&self, timer_type: TimerType) -> Result<Duration, TimerError> {
        let event = self.with_controller(timer_type, |c| c.resume(Instant::now()))?;
        let TimerEvent::Resumed { remaining, .. } = event else {
            return Err(TimerError::NotPaused { timer_type });
        };
        info!(timer = %timer_type, remaining_secs = remaining.as_secs_f64(), "timer resumed");
        self.mirror.mirror(&TimerCommand::resume(timer_type, remaining));
        self.publish(event);
        Ok(remaining)
    }

    pub fn cancel(&self, timer_type: TimerType, reason: Option<CancelReason>) -> Result<(), TimerError> {
        let event = self.with_controller(timer_type, TimerController::cancel)?;
        info!(timer = %timer_type, ?reason, "timer cancelled");
        let command = match reason {
            Some(reason) => TimerCommand::cancel_because(timer_type, reason),
            None => TimerCommand::cancel(timer_type),
        };
        self.mirror.mirror(&command);
        self.publish(event);
        Ok(())
    }

    /// Cancel if running or paused. Returns whether anything was cancelled.
    pub fn cancel_if_active(&self, timer_type: TimerType, reason: Option<CancelReason>) -> bool {
        if !self.is_active(timer_type) {
            return false;
        }
        self.cancel(timer_type, reason).is_ok()
    }

    /// Cancel every running or paused timer. Completed timers are cleared
    /// without a command.
    pub fn cancel_all(&self) -> Vec<TimerType> {
        let mut cancelled = Vec::new();
        let events: Vec<_> = {
            let mut controllers = self.lock();
            controllers
                .values_mut()
                .filter_map(|c| {
                    let was_active = c.is_active();
                    let event = c.cancel().ok()?;
                    if was_active {
                        cancelled.push(c.timer_type());
                    }
                    Some(event)
                })
                .collect()
        };
        for timer_type in &cancelled {
            self.mirror.mirror(&TimerCommand::cancel(*timer_type));
        }
        for event in events {
            self.publish(event);
        }
        if !cancelled.is_empty() {
            info!(?cancelled, "all timers cancelled");
        }
        cancelled
    }

    pub fn state(&self, timer_type: TimerType) -> TimerState {
        self.with_controller(timer_type, |c| c.state(Instant::now()))
    }

    pub fn states(&self) -> Vec<TimerState> {
        let now = Instant::now();
        self.lock().values().map(|c| c.state(now)).collect()
    }

    pub fn is_active(&self, timer_type: TimerType) -> bool {
        self.with_controller(timer_type, |c| c.is_active())
    }

    /// Counted time of a running or paused timer.
    pub fn elapsed(&self, timer_type: TimerType) -> Option<Duration> {
        self.with_controller(timer_type, |c| c.elapsed(Instant::now()))
    }

    /// The active timer the user sees, by priority.
    pub fn foreground(&self) -> Option<TimerType> {
        let controllers = self.lock();
        FOREGROUND
            .into_iter()
            .find(|t| controllers.get(t).is_some_and(TimerController::is_active))
    }

    pub fn pause_foreground(&self) -> Result<Duration, TimerError> {
        let timer_type = self.foreground().ok_or(TimerError::NoneActive)?;
        self.pause(timer_type)
    }

    pub fn resume_foreground(&self) -> Result<Duration, TimerError> {
        let timer_type = self.foreground().ok_or(TimerError::NoneActive)?;
        self.resume(timer_type)
    }

    pub fn cancel_foreground(&self) -> Result<TimerType, TimerError> {
        let timer_type = self.foreground().ok_or(TimerError::NoneActive)?;
        self.cancel(timer_type, None)?;
        Ok(timer_type)
    }

    /// Advance every controller once and publish what happened.
    pub fn tick(&self) -> Vec<TimerEvent> {
        let now = Instant::now();
        let events: Vec<_> = self
            .lock()
            .values_mut()
            .filter_map(|c| c.tick(now, self.warning))
            .collect();
        for event in &events {
            match event {
                TimerEvent::Completed {
                    timer_type,
                    auto_action,
                } => info!(timer = %timer_type, ?auto_action, "timer completed"),
                TimerEvent::Warning {
                    timer_type,
                    remaining,
                } => debug!(timer = %timer_type, remaining_secs = remaining.as_secs_f64(), "timer warning"),
                _ => {}
            }
            self.publish(*event);
        }
        events
    }

    /// Snapshot commands for every running or paused timer, so a peer that
    /// missed commands can catch up.
    pub fn sync_commands(&self) -> Vec<TimerCommand> {
        let now = Instant::now();
        self.lock()
            .values()
            .filter_map(|c| match c.state(now) {
                TimerState::Running {
                    remaining,
                    timer_type,
                } => Some(TimerCommand::sync(timer_type, remaining, false)),
                TimerState::Paused {
                    remaining,
                    timer_type,
                } => Some(TimerCommand::sync(timer_type, remaining, true)),
                _ => None,
            })
            .collect()
    }

    /// Tick on a fixed interval until cancelled.
    pub fn spawn_ticker(self: Arc<Self>, cancel: CancellationToken) -> JoinHandle<()> {
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(self.tick);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

            loop {
                tokio::select! {
                    _ = cancel.cancelled() => {
                        debug!("timer ticker shutting down");
                        break;
                    }
                    _ = ticker.tick() => {
                        self.tick();
                    }
                }
            }
        })
    }
}

impl std::fmt::Debug for TimerCoordinator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TimerCoordinator")
            .field("controllers", &*self.lock())
            .field("warning", &self.warning)
            .finish_non_exhaustive()
    }
}
