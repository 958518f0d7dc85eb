//! Transfer channel behavior over an in-memory link.

use async_trait::async_trait;
use chrono::Utc;
use spotproto::transfer::{Delivery, Link, MemoryLink, PeerHandler, RetryConfig, TransferChannel};
use spotproto::{
    CaptureTarget, Envelope, ExerciseId, MotionSample, Payload, Phase, PhaseChange,
    SensorSampleChunk, SessionContext, SessionId, SetId,
};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

#[derive(Debug)]
enum Event {
    Context(SessionContext),
    ContextAck(u64),
    Phase(PhaseChange),
    Chunk(SensorSampleChunk),
}

struct Recorder {
    tx: mpsc::UnboundedSender<Event>,
}

impl Recorder {
    fn new() -> (Arc<Self>, mpsc::UnboundedReceiver<Event>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Arc::new(Self { tx }), rx)
    }
}

#[async_trait]
impl PeerHandler for Recorder {
    async fn on_context(&self, context: SessionContext) -> u64 {
        let revision = context.revision;
        let _ = self.tx.send(Event::Context(context));
        revision
    }

    async fn on_context_ack(&self, revision: u64) {
        let _ = self.tx.send(Event::ContextAck(revision));
    }

    async fn on_phase_change(&self, change: PhaseChange) {
        let _ = self.tx.send(Event::Phase(change));
    }

    async fn on_chunk(&self, chunk: SensorSampleChunk) {
        let _ = self.tx.send(Event::Chunk(chunk));
    }
}

fn target() -> CaptureTarget {
    CaptureTarget {
        session_id: SessionId::new(),
        exercise_id: ExerciseId::new(),
        set_id: SetId::new(),
        set_order: 1,
    }
}

fn chunk(target: &CaptureTarget, samples: usize) -> SensorSampleChunk {
    let now = Utc::now();
    SensorSampleChunk::new(
        target,
        Phase::Execution,
        (0..samples).map(|_| MotionSample::at_rest(now)).collect(),
    )
    .unwrap()
}

async fn next(events: &mut mpsc::UnboundedReceiver<Event>) -> Event {
    tokio::time::timeout(Duration::from_secs(60), events.recv())
        .await
        .expect("timed out waiting for event")
        .expect("event channel closed")
}

struct Pair {
    wearable: Arc<TransferChannel>,
    companion: Arc<TransferChannel>,
    link: Arc<MemoryLink>,
    wearable_events: mpsc::UnboundedReceiver<Event>,
    companion_events: mpsc::UnboundedReceiver<Event>,
    cancel: CancellationToken,
}

fn spawn_pair() -> Pair {
    let (w, c) = MemoryLink::pair();
    let w = Arc::new(w);
    let wearable = Arc::new(TransferChannel::new(w.clone(), RetryConfig::default()));
    let companion = Arc::new(TransferChannel::new(Arc::new(c), RetryConfig::default()));

    let (w_handler, wearable_events) = Recorder::new();
    let (c_handler, companion_events) = Recorder::new();
    let cancel = CancellationToken::new();
    tokio::spawn(wearable.clone().run(w_handler, cancel.clone()));
    tokio::spawn(companion.clone().run(c_handler, cancel.clone()));

    Pair {
        wearable,
        companion,
        link: w,
        wearable_events,
        companion_events,
        cancel,
    }
}

#[tokio::test(start_paused = true)]
async fn context_is_applied_and_acknowledged() {
    let mut pair = spawn_pair();
    let ctx = SessionContext {
        revision: 4,
        session_id: Some(SessionId::new()),
        is_active: true,
        ..SessionContext::default()
    };

    assert_eq!(pair.companion.send_context(&ctx), Delivery::Sent);

    match next(&mut pair.wearable_events).await {
        Event::Context(received) => assert_eq!(received, ctx),
        other => panic!("expected context, got {other:?}"),
    }
    match next(&mut pair.companion_events).await {
        Event::ContextAck(revision) => assert_eq!(revision, 4),
        other => panic!("expected ack, got {other:?}"),
    }
    assert!(pair.companion.health().is_connected());
    pair.cancel.cancel();
}

#[tokio::test(start_paused = true)]
async fn best_effort_is_dropped_when_unreachable() {
    let mut pair = spawn_pair();
    let t = target();
    pair.link.set_reachable(false);

    let change = PhaseChange::new(&t, None, Phase::Rest);
    assert_eq!(pair.wearable.send_phase_change(&change), Delivery::Dropped);

    // Reconnecting does not resurrect the dropped notice.
    pair.link.set_reachable(true);
    let later = PhaseChange::new(&t, None, Phase::Execution);
    assert_eq!(pair.wearable.send_phase_change(&later), Delivery::Sent);

    match next(&mut pair.companion_events).await {
        Event::Phase(received) => assert_eq!(received.new_phase, Phase::Execution),
        other => panic!("expected phase change, got {other:?}"),
    }
    pair.cancel.cancel();
}

#[tokio::test(start_paused = true)]
async fn chunks_survive_disconnection_in_order() {
    let mut pair = spawn_pair();
    let t = target();
    pair.link.set_reachable(false);

    for samples in 1..=3 {
        pair.wearable.transfer(chunk(&t, samples)).unwrap();
    }
    tokio::time::sleep(Duration::from_secs(3)).await;
    assert_eq!(pair.wearable.pending_transfers(), 3);
    assert!(pair.wearable.health().misses() > 0);

    pair.link.set_reachable(true);
    for expected in 1..=3 {
        match next(&mut pair.companion_events).await {
            Event::Chunk(received) => {
                assert_eq!(received.sample_count, expected);
                assert_eq!(received.set_id, t.set_id);
            }
            other => panic!("expected chunk, got {other:?}"),
        }
    }

    tokio::time::sleep(Duration::from_secs(1)).await;
    assert_eq!(pair.wearable.pending_transfers(), 0);
    pair.cancel.cancel();
}

#[tokio::test(start_paused = true)]
async fn finalized_set_chunks_are_discarded() {
    let pair = spawn_pair();
    let finished = target();
    let current = target();
    pair.link.set_reachable(false);

    pair.wearable.transfer(chunk(&finished, 10)).unwrap();
    pair.wearable.transfer(chunk(&finished, 20)).unwrap();
    pair.wearable.transfer(chunk(&current, 30)).unwrap();

    assert_eq!(pair.wearable.discard_chunks_for_set(finished.set_id), 2);
    assert_eq!(pair.wearable.pending_transfers(), 1);
    assert_eq!(pair.wearable.discard_chunks_for_set(finished.set_id), 0);
    pair.cancel.cancel();
}

#[tokio::test(start_paused = true)]
async fn duplicate_chunk_delivered_once_and_acked_twice() {
    let (raw, companion_end) = MemoryLink::pair();
    let companion = Arc::new(TransferChannel::new(
        Arc::new(companion_end),
        RetryConfig::default(),
    ));
    let (handler, mut events) = Recorder::new();
    let cancel = CancellationToken::new();
    tokio::spawn(companion.clone().run(handler, cancel.clone()));

    let frame = Envelope::new(
        0,
        Payload::Chunk {
            transfer_id: 7,
            chunk: chunk(&target(), 5),
        },
    )
    .to_bytes()
    .unwrap();
    raw.send(frame.clone()).unwrap();
    raw.send(frame).unwrap();

    for _ in 0..2 {
        let ack = tokio::time::timeout(Duration::from_secs(5), raw.recv())
            .await
            .unwrap()
            .unwrap();
        let envelope = Envelope::from_bytes(&ack).unwrap();
        assert_eq!(envelope.payload, Payload::ChunkAck { transfer_id: 7 });
    }

    assert!(matches!(next(&mut events).await, Event::Chunk(_)));
    assert!(events.try_recv().is_err());
    cancel.cancel();
}
