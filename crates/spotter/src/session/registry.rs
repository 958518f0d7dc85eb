//! One mutation point per owner.

use crate::session::machine::{SessionMachine, WorkoutFinalized};
use crate::session::policy::{SetLimitPolicy, Unlimited};
use crate::session::SessionError;
use dashmap::DashMap;
use spotproto::OwnerId;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;
use tracing::info;

/// Owner -> session machine. Every lifecycle call for an owner runs under
/// that owner's lock, so racing calls see each other's completed transitions.
pub struct SessionRegistry {
    machines: DashMap<OwnerId, Arc<Mutex<SessionMachine>>>,
    policy: Arc<dyn SetLimitPolicy>,
    default_rest: Duration,
}

impl SessionRegistry {
    pub fn new(policy: Arc<dyn SetLimitPolicy>, default_rest: Duration) -> Self {
        Self {
            machines: DashMap::new(),
            policy,
            default_rest,
        }
    }

    pub fn machine(&self, owner: &OwnerId) -> Arc<Mutex<SessionMachine>> {
        self.machines
            .entry(owner.clone())
            .or_insert_with(|| {
                Arc::new(Mutex::new(
                    SessionMachine::new(owner.clone())
                        .with_policy(self.policy.clone())
                        .with_default_rest(self.default_rest),
                ))
            })
            .clone()
    }

    /// Run `f` with exclusive access to the owner's machine.
    pub fn with<R>(&self, owner: &OwnerId, f: impl FnOnce(&mut SessionMachine) -> R) -> R {
        let machine = self.machine(owner);
        let mut guard = machine.lock().unwrap_or_else(PoisonError::into_inner);
        f(&mut guard)
    }

    /// Owners with a workout in progress.
    pub fn active_owners(&self) -> Vec<OwnerId> {
        let machines: Vec<_> = self
            .machines
            .iter()
            .map(|e| (e.key().clone(), e.value().clone()))
            .collect();
        machines
            .into_iter()
            .filter(|(_, m)| {
                m.lock()
                    .unwrap_or_else(PoisonError::into_inner)
                    .active_session()
                    .is_some()
            })
            .map(|(owner, _)| owner)
            .collect()
    }

    /// Forget an owner. A workout still in progress is abandoned and its
    /// record returned, never dropped.
    pub fn logout(&self, owner: &OwnerId) -> Option<WorkoutFinalized> {
        let (_, machine) = self.machines.remove(owner)?;
        let mut guard = machine.lock().unwrap_or_else(PoisonError::into_inner);
        match guard.abandon_workout() {
            Ok(done) => {
                info!(owner = %owner, session_id = %done.record.id, "workout abandoned on logout");
                Some(done)
            }
            Err(SessionError::NoActiveSession) => None,
            Err(e) => {
                info!(owner = %owner, error = %e, "nothing to abandon on logout");
                None
            }
        }
    }
}

impl Default for SessionRegistry {
    fn default() -> Self {
        Self::new(Arc::new(Unlimited), Duration::from_secs(90))
    }
}
