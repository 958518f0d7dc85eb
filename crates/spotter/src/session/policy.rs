//! Live set limits.
//!
//! Entitlement itself is owned elsewhere; the machine only asks how many
//! sets an exercise may hold.

use spotconf::EntitlementConfig;
use std::sync::Arc;

pub trait SetLimitPolicy: Send + Sync {
    /// Maximum sets per exercise, or `None` for no limit.
    fn max_sets_per_exercise(&self, is_premium: bool) -> Option<u32>;
}

#[derive(Debug, Clone, Copy, Default)]
pub struct Unlimited;

impl SetLimitPolicy for Unlimited {
    fn max_sets_per_exercise(&self, _is_premium: bool) -> Option<u32> {
        None
    }
}

/// Caps free-tier owners; premium owners are never limited.
#[derive(Debug, Clone, Copy)]
pub struct FreeTierLimit {
    pub max_sets_per_exercise: u32,
}

impl SetLimitPolicy for FreeTierLimit {
    fn max_sets_per_exercise(&self, is_premium: bool) -> Option<u32> {
        (!is_premium).then_some(self.max_sets_per_exercise)
    }
}

/// Policy from configuration. Zero disables the free-tier limit.
pub fn from_config(config: &EntitlementConfig) -> Arc<dyn SetLimitPolicy> {
    match config.free_max_sets_per_exercise {
        0 => Arc::new(Unlimited),
        max => Arc::new(FreeTierLimit {
            max_sets_per_exercise: max,
        }),
    }
}
