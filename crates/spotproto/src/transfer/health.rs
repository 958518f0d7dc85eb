use std::sync::{Mutex, PoisonError};
use tokio::time::Instant;
use tracing::{info, warn};

/// Whether the peer is answering. Says nothing about the link itself.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ConnectionState {
    /// Nothing heard yet.
    #[default]
    Unknown,
    Connected,
    /// Too many unanswered transfers in a row.
    Dead,
}

impl ConnectionState {
    pub fn as_str(&self) -> &'static str {
        match self {
            ConnectionState::Unknown => "unknown",
            ConnectionState::Connected => "connected",
            ConnectionState::Dead => "dead",
        }
    }
}

impl std::fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Default)]
struct Health {
    state: ConnectionState,
    misses: u32,
    last_heard: Option<Instant>,
}

/// Peer health from inbound frames and unacknowledged transfers.
#[derive(Debug, Default)]
pub struct HealthTracker {
    inner: Mutex<Health>,
}

impl HealthTracker {
    pub fn new() -> Self {
        Self::default()
    }

    fn with<R>(&self, f: impl FnOnce(&mut Health) -> R) -> R {
        f(&mut self.inner.lock().unwrap_or_else(PoisonError::into_inner))
    }

    pub fn state(&self) -> ConnectionState {
        self.with(|h| h.state)
    }

    pub fn is_connected(&self) -> bool {
        self.state() == ConnectionState::Connected
    }

    /// Consecutive misses since the peer was last heard.
    pub fn misses(&self) -> u32 {
        self.with(|h| h.misses)
    }

    pub fn last_heard(&self) -> Option<Instant> {
        self.with(|h| h.last_heard)
    }

    /// Any frame from the peer revives it.
    pub fn heard(&self) {
        let revived = self.with(|h| {
            h.last_heard = Some(Instant::now());
            h.misses = 0;
            let was = std::mem::replace(&mut h.state, ConnectionState::Connected);
            was == ConnectionState::Dead
        });
        if revived {
            info!("peer answering again");
        }
    }

    /// Count a miss. The peer is declared dead at `max_misses`.
    pub fn missed(&self, max_misses: u32) -> u32 {
        let (misses, died) = self.with(|h| {
            h.misses = h.misses.saturating_add(1);
            let died = h.misses >= max_misses && h.state != ConnectionState::Dead;
            if died {
                h.state = ConnectionState::Dead;
            }
            (h.misses, died)
        });
        if died {
            warn!(misses, "peer stopped answering");
        }
        misses
    }
}
