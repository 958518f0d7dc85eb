//! The byte link between the two peers.

use async_trait::async_trait;
use bytes::Bytes;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::{mpsc, Mutex};

#[derive(Debug, Error, Clone, PartialEq)]
pub enum LinkError {
    #[error("peer unreachable")]
    Unreachable,
    #[error("link closed")]
    Closed,
}

/// A bidirectional frame link.
///
/// `send` never blocks: sample capture runs at up to 50 Hz and must not wait
/// on the radio.
#[async_trait]
pub trait Link: Send + Sync {
    fn send(&self, frame: Bytes) -> Result<(), LinkError>;

    /// Next inbound frame, or `None` once the link is closed.
    async fn recv(&self) -> Option<Bytes>;

    fn is_reachable(&self) -> bool;
}

/// In-process link. Both ends share one reachability switch so a test (or the
/// simulator) can take the peer out of range and bring it back.
#[derive(Debug)]
pub struct MemoryLink {
    outbound: mpsc::UnboundedSender<Bytes>,
    inbound: Mutex<mpsc::UnboundedReceiver<Bytes>>,
    reachable: Arc<AtomicBool>,
}

impl MemoryLink {
    pub fn pair() -> (MemoryLink, MemoryLink) {
        let (a_tx, b_rx) = mpsc::unbounded_channel();
        let (b_tx, a_rx) = mpsc::unbounded_channel();
        let reachable = Arc::new(AtomicBool::new(true));

        let a = MemoryLink {
            outbound: a_tx,
            inbound: Mutex::new(a_rx),
            reachable: reachable.clone(),
        };
        let b = MemoryLink {
            outbound: b_tx,
            inbound: Mutex::new(b_rx),
            reachable,
        };
        (a, b)
    }

    pub fn set_reachable(&self, reachable: bool) {
        self.reachable.store(reachable, Ordering::SeqCst);
    }

    /// Handle to the shared reachability switch.
    pub fn reachability(&self) -> Arc<AtomicBool> {
        self.reachable.clone()
    }
}

#[async_trait]
impl Link for MemoryLink {
    fn send(&self, frame: Bytes) -> Result<(), LinkError> {
        if !self.is_reachable() {
            return Err(LinkError::Unreachable);
        }
        self.outbound.send(frame).map_err(|_| LinkError::Closed)
    }

    async fn recv(&self) -> Option<Bytes> {
        self.inbound.lock().await.recv().await
    }

    fn is_reachable(&self) -> bool {
        self.reachable.load(Ordering::SeqCst)
    }
}
