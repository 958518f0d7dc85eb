//! Transfer channel: best-effort messages plus durable chunk transfers.
//!
//! Best-effort messages (context snapshots, phase changes, timer commands) go
//! out only when the peer is reachable and are dropped otherwise. Chunks are
//! queued in a FIFO outbox and sent stop-and-wait: the head is resent until
//! acknowledged, so chunks of one set arrive in capture order. The receiving
//! side deduplicates by transfer id.

use super::health::HealthTracker;
use super::link::Link;
use super::retry::RetryConfig;
use crate::chunk::SensorSampleChunk;
use crate::context::SessionContext;
use crate::frame::{Envelope, FrameError, Payload};
use crate::ids::SetId;
use crate::messages::{PhaseChange, TimerCommand};
use async_trait::async_trait;
use bytes::Bytes;
use std::collections::{HashSet, VecDeque};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tokio::sync::Notify;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// Outcome of a best-effort send.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Delivery {
    Sent,
    Dropped,
}

/// Receive callbacks, dispatched by message type.
///
/// Every method has a no-op default so each peer implements only what it
/// consumes.
#[async_trait]
pub trait PeerHandler: Send + Sync {
    /// Apply a context snapshot. Returns the revision the peer now holds,
    /// which is acknowledged back to the sender.
    async fn on_context(&self, context: SessionContext) -> u64 {
        context.revision
    }

    async fn on_context_ack(&self, _revision: u64) {}

    async fn on_phase_change(&self, _change: PhaseChange) {}

    async fn on_timer_command(&self, _command: TimerCommand) {}

    /// Called once per transfer id, however often the sender retried it.
    async fn on_chunk(&self, _chunk: SensorSampleChunk) {}
}

/// Transfer ids already handed to the handler. The sender is stop-and-wait,
/// so only recent ids can come back as retries; older ones are forgotten.
#[derive(Debug)]
struct DeliveredWindow {
    ids: HashSet<u64>,
    order: VecDeque<u64>,
    capacity: usize,
}

impl DeliveredWindow {
    const CAPACITY: usize = 1024;

    fn new(capacity: usize) -> Self {
        Self {
            ids: HashSet::with_capacity(capacity),
            order: VecDeque::with_capacity(capacity),
            capacity: capacity.max(1),
        }
    }

    /// Record `transfer_id`. False if it is already in the window.
    fn insert(&mut self, transfer_id: u64) -> bool {
        if !self.ids.insert(transfer_id) {
            return false;
        }
        self.order.push_back(transfer_id);
        while self.order.len() > self.capacity {
            if let Some(oldest) = self.order.pop_front() {
                self.ids.remove(&oldest);
            }
        }
        true
    }

    fn len(&self) -> usize {
        self.order.len()
    }
}

#[derive(Debug, Clone)]
struct PendingTransfer {
    transfer_id: u64,
    set_id: SetId,
    frame: Bytes,
}

pub struct TransferChannel {
    link: Arc<dyn Link>,
    retry: RetryConfig,
    seq: AtomicU64,
    next_transfer_id: AtomicU64,
    outbox: Mutex<VecDeque<PendingTransfer>>,
    delivered: Mutex<DeliveredWindow>,
    enqueued: Notify,
    acked: Notify,
    health: HealthTracker,
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

impl TransferChannel {
    pub fn new(link: Arc<dyn Link>, retry: RetryConfig) -> Self {
        Self {
            link,
            retry,
            seq: AtomicU64::new(0),
            next_transfer_id: AtomicU64::new(1),
            outbox: Mutex::new(VecDeque::new()),
            delivered: Mutex::new(DeliveredWindow::new(DeliveredWindow::CAPACITY)),
            enqueued: Notify::new(),
            acked: Notify::new(),
            health: HealthTracker::new(),
        }
    }

    pub fn health(&self) -> &HealthTracker {
        &self.health
    }

    pub fn is_reachable(&self) -> bool {
        self.link.is_reachable()
    }

    fn encode(&self, payload: Payload) -> Result<Bytes, FrameError> {
        let seq = self.seq.fetch_add(1, Ordering::Relaxed);
        Envelope::new(seq, payload).to_bytes()
    }

    fn send_best_effort(&self, payload: Payload) -> Delivery {
        let kind = payload.kind();
        if !self.link.is_reachable() {
            debug!(kind, "peer unreachable, dropping best-effort message");
            return Delivery::Dropped;
        }
        let frame = match self.encode(payload) {
            Ok(frame) => frame,
            Err(e) => {
                warn!(kind, error = %e, "failed to encode message");
                return Delivery::Dropped;
            }
        };
        match self.link.send(frame) {
            Ok(()) => Delivery::Sent,
            Err(e) => {
                debug!(kind, error = %e, "best-effort send failed, dropping");
                Delivery::Dropped
            }
        }
    }

    pub fn send_context(&self, context: &SessionContext) -> Delivery {
        self.send_best_effort(Payload::Context(context.clone()))
    }

    pub fn send_phase_change(&self, change: &PhaseChange) -> Delivery {
        self.send_best_effort(Payload::PhaseChange(change.clone()))
    }

    pub fn send_timer_command(&self, command: &TimerCommand) -> Delivery {
        self.send_best_effort(Payload::TimerCommand(command.clone()))
    }

    pub fn send_heartbeat(&self) -> Delivery {
        self.send_best_effort(Payload::Heartbeat)
    }

    /// Queue a chunk for durable delivery. Never blocks on the link.
    pub fn transfer(&self, chunk: SensorSampleChunk) -> Result<u64, FrameError> {
        chunk.validate()?;
        let transfer_id = self.next_transfer_id.fetch_add(1, Ordering::Relaxed);
        let set_id = chunk.set_id;
        let frame = self.encode(Payload::Chunk { transfer_id, chunk })?;

        lock(&self.outbox).push_back(PendingTransfer {
            transfer_id,
            set_id,
            frame,
        });
        self.enqueued.notify_one();
        Ok(transfer_id)
    }

    pub fn pending_transfers(&self) -> usize {
        lock(&self.outbox).len()
    }

    /// Drop undelivered chunks of a finalized set. Returns how many were dropped.
    pub fn discard_chunks_for_set(&self, set_id: SetId) -> usize {
        let mut outbox = lock(&self.outbox);
        let before = outbox.len();
        let head_before = outbox.front().map(|p| p.transfer_id);
        outbox.retain(|p| p.set_id != set_id);
        let dropped = before - outbox.len();
        let head_changed = outbox.front().map(|p| p.transfer_id) != head_before;
        drop(outbox);

        if dropped > 0 {
            info!(set_id = %set_id, dropped, "discarded undelivered chunks for finalized set");
        }
        if head_changed {
            self.acked.notify_one();
        }
        dropped
    }

    fn complete_transfer(&self, transfer_id: u64) {
        let mut outbox = lock(&self.outbox);
        if let Some(pos) = outbox.iter().position(|p| p.transfer_id == transfer_id) {
            outbox.remove(pos);
            drop(outbox);
            debug!(transfer_id, "transfer acknowledged");
            self.acked.notify_one();
        }
    }

    /// Run the receive loop and the retry pump until cancelled or the link closes.
    pub async fn run(self: Arc<Self>, handler: Arc<dyn PeerHandler>, cancel: CancellationToken) {
        let cancel = cancel.child_token();
        let pump = self.clone().pump(cancel.clone());
        let receive = self.clone().receive(handler, cancel);
        tokio::join!(pump, receive);
    }

    async fn receive(self: Arc<Self>, handler: Arc<dyn PeerHandler>, cancel: CancellationToken) {
        loop {
            let frame = tokio::select! {
                _ = cancel.cancelled() => break,
                frame = self.link.recv() => frame,
            };
            let Some(frame) = frame else {
                info!("peer link closed");
                cancel.cancel();
                break;
            };

            let envelope = match Envelope::from_bytes(&frame) {
                Ok(envelope) => envelope,
                Err(e) => {
                    warn!(error = %e, "dropping malformed frame");
                    continue;
                }
            };

            self.health.heard();
            self.dispatch(envelope.payload, handler.as_ref()).await;
        }
    }

    async fn dispatch(&self, payload: Payload, handler: &dyn PeerHandler) {
        match payload {
            Payload::Context(context) => {
                let held = handler.on_context(context).await;
                self.send_best_effort(Payload::ContextAck { revision: held });
            }
            Payload::ContextAck { revision } => handler.on_context_ack(revision).await,
            Payload::PhaseChange(change) => handler.on_phase_change(change).await,
            Payload::TimerCommand(command) => handler.on_timer_command(command).await,
            Payload::Chunk { transfer_id, chunk } => {
                let first = lock(&self.delivered).insert(transfer_id);
                if first {
                    handler.on_chunk(chunk).await;
                } else {
                    debug!(transfer_id, "duplicate chunk, re-acknowledging");
                }
                self.send_best_effort(Payload::ChunkAck { transfer_id });
            }
            Payload::ChunkAck { transfer_id } => self.complete_transfer(transfer_id),
            Payload::Heartbeat => {}
        }
    }

    async fn pump(self: Arc<Self>, cancel: CancellationToken) {
        let mut attempt = 0u32;
        loop {
            let head = lock(&self.outbox)
                .front()
                .map(|p| (p.transfer_id, p.frame.clone()));

            let Some((transfer_id, frame)) = head else {
                tokio::select! {
                    _ = cancel.cancelled() => return,
                    _ = self.enqueued.notified() => {}
                }
                continue;
            };

            match self.link.send(frame) {
                Ok(()) => {
                    attempt = 0;
                    tokio::select! {
                        _ = cancel.cancelled() => return,
                        _ = self.acked.notified() => {}
                        _ = tokio::time::sleep(self.retry.ack_timeout) => {
                            let failures = self.health.missed(self.retry.max_failures);
                            debug!(transfer_id, failures, "ack timeout, resending");
                        }
                    }
                }
                Err(e) => {
                    attempt = attempt.saturating_add(1);
                    let failures = self.health.missed(self.retry.max_failures);
                    let delay = self.retry.backoff_for_attempt(attempt);
                    debug!(
                        transfer_id,
                        attempt,
                        failures,
                        delay_ms = delay.as_millis() as u64,
                        error = %e,
                        "transfer send failed, backing off"
                    );
                    tokio::select! {
                        _ = cancel.cancelled() => return,
                        _ = tokio::time::sleep(delay) => {}
                    }
                }
            }
        }
    }
}

impl std::fmt::Debug for TransferChannel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TransferChannel")
            .field("pending", &self.pending_transfers())
            .field("health", &self.health.state())
            .field("delivered", &lock(&self.delivered).len())
            .finish()
    }
}
