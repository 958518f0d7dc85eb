//! Companion engine end to end: lifecycle, detection confirmation, timers,
//! and the wearable round trip over an in-memory link.

use chrono::Utc;
use pretty_assertions::assert_eq;
use spotconf::SpotConfig;
use spotproto::transfer::{MemoryLink, PeerHandler, RetryConfig, TransferChannel};
use spotproto::{
    AutoAction, MotionSample, OwnerId, Phase, PhaseChange, SensorSampleChunk, SessionContext,
    SetId, TimerType,
};
use spotter::history::HistoryArchive;
use spotter::plan::{ExerciseTemplate, PlannedSet, WorkoutPlan};
use spotter::{
    Companion, EndTrigger, EngineEvent, EntityStatus, NextStep, SessionError, TimerState,
};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::broadcast;
use tokio_util::sync::CancellationToken;
use wristband::Wearable;

struct Harness {
    companion: Arc<Companion>,
    // Held so the companion's sends have somewhere to go.
    _peer: MemoryLink,
}

fn harness_with(config: SpotConfig) -> Harness {
    let (local, peer) = MemoryLink::pair();
    let channel = Arc::new(TransferChannel::new(
        Arc::new(local),
        RetryConfig::from(&config.transfer),
    ));
    let companion = Companion::new(
        OwnerId::new("ana"),
        &config,
        channel,
        HistoryArchive::in_memory(),
    );
    Harness {
        companion: Arc::new(companion),
        _peer: peer,
    }
}

fn harness() -> Harness {
    harness_with(SpotConfig::default())
}

fn bench_plan() -> WorkoutPlan {
    WorkoutPlan::new(
        "Bench day",
        vec![ExerciseTemplate::new("Bench press", vec![PlannedSet::new(8, 60.0); 2]).with_rest(60)],
    )
}

fn two_exercise_plan() -> WorkoutPlan {
    WorkoutPlan::new(
        "Push pull",
        vec![
            ExerciseTemplate::new("Squat", vec![PlannedSet::new(10, 20.0)]),
            ExerciseTemplate::new("Row", vec![PlannedSet::new(8, 15.0)]),
        ],
    )
}

fn rest_notice(context: &SessionContext) -> PhaseChange {
    let target = context.capture_target().expect("context names a set");
    PhaseChange::new(&target, context.exercise_name.clone(), Phase::Rest)
}

fn current_context(companion: &Companion) -> SessionContext {
    companion.context().expect("a context was pushed")
}

async fn wait_for(
    events: &mut broadcast::Receiver<EngineEvent>,
    mut wanted: impl FnMut(&EngineEvent) -> bool,
) -> EngineEvent {
    tokio::time::timeout(Duration::from_secs(300), async {
        loop {
            match events.recv().await {
                Ok(event) if wanted(&event) => return event,
                Ok(_) | Err(broadcast::error::RecvError::Lagged(_)) => {}
                Err(broadcast::error::RecvError::Closed) => panic!("engine events closed"),
            }
        }
    })
    .await
    .expect("event arrived")
}

#[tokio::test(start_paused = true)]
async fn two_exercise_workout_is_archived() {
    let h = harness();
    let plan = two_exercise_plan();
    let row = plan.exercises[1].id;
    let started = h.companion.start_workout(plan).unwrap();

    let first = h.companion.end_set(Some(10)).unwrap();
    assert_eq!(first.trigger, Some(EndTrigger::ManualCheckmark));
    assert_eq!(first.record.achieved_reps, 10);

    let squat = h.companion.end_exercise().unwrap();
    assert_eq!(squat.next, NextStep::NextExercise(row));

    h.companion.start_exercise(row).unwrap();
    let second = h.companion.start_next_set().unwrap();
    let snapshot = h.companion.snapshot().unwrap();
    let live = snapshot.set().unwrap();
    assert_eq!(live.id, second.set_id);
    assert_eq!((live.target_reps, live.weight), (8, 15.0));

    h.companion.end_set(Some(8)).unwrap();
    let rows = h.companion.end_exercise().unwrap();
    assert_eq!(rows.next, NextStep::WorkoutComplete);

    let finalized = h.companion.end_workout().unwrap();
    let record = &finalized.record;
    assert_eq!(record.id, started.session_id);
    assert_eq!(record.status, EntityStatus::Completed);
    assert_eq!(record.exercises.len(), 2);
    let reps: Vec<u32> = record.sets().map(|s| s.achieved_reps).collect();
    assert_eq!(reps, vec![10, 8]);
    assert_eq!(record.total_reps, 18);

    let archived = h.companion.archive().load(record.id).unwrap();
    assert_eq!(archived.as_ref(), Some(record));
    assert_eq!(h.companion.timers().foreground(), None);
    assert!(h.companion.snapshot().is_none());
    assert!(!current_context(&h.companion).is_active);
}

#[tokio::test(start_paused = true)]
async fn ending_right_away_records_one_empty_set() {
    let h = harness();
    h.companion.start_workout(bench_plan()).unwrap();

    let finalized = h.companion.end_workout().unwrap();
    assert_eq!(finalized.record.exercises.len(), 1);
    let sets: Vec<_> = finalized.record.sets().collect();
    assert_eq!(sets.len(), 1);
    assert_eq!(sets[0].achieved_reps, 0);

    assert!(matches!(
        h.companion.end_workout(),
        Err(e) if e.downcast_ref::<SessionError>() == Some(&SessionError::NoActiveSession)
    ));
}

#[tokio::test(start_paused = true)]
async fn second_checkmark_changes_nothing() {
    let h = harness();
    h.companion.start_workout(bench_plan()).unwrap();
    let done = h.companion.end_set(Some(8)).unwrap();

    assert_eq!(
        h.companion.end_set(Some(12)),
        Err(SessionError::SetAlreadyFinalized {
            set_id: done.set_id
        })
    );
    let record = h.companion.end_workout().unwrap().record;
    let reps: Vec<u32> = record.sets().map(|s| s.achieved_reps).collect();
    assert_eq!(reps, vec![8]);
}

#[tokio::test(start_paused = true)]
async fn confirmation_time_comes_off_the_rest() {
    let h = harness();
    let mut events = h.companion.subscribe();
    h.companion.start_workout(bench_plan()).unwrap();
    let context = current_context(&h.companion);

    h.companion.on_phase_change(rest_notice(&context)).await;
    assert!(h.companion.is_awaiting_confirmation());
    assert!(h.companion.timers().is_active(TimerType::Confirmation));
    wait_for(&mut events, |e| {
        matches!(e, EngineEvent::AwaitingConfirmation { set_id } if Some(*set_id) == context.set_id)
    })
    .await;

    tokio::time::advance(Duration::from_secs(4)).await;
    let done = h.companion.confirm_set_end(Some(7)).unwrap();
    assert_eq!(done.trigger, Some(EndTrigger::AutoDetected));
    assert_eq!(done.record.achieved_reps, 7);

    assert!(!h.companion.is_awaiting_confirmation());
    assert!(h.companion.timers().state(TimerType::Confirmation).is_idle());
    assert_eq!(
        h.companion.timers().state(TimerType::Rest),
        TimerState::Running {
            remaining: Duration::from_secs(56),
            timer_type: TimerType::Rest,
        }
    );
}

#[tokio::test(start_paused = true)]
async fn late_confirmation_leaves_no_rest() {
    let h = harness();
    h.companion.start_workout(bench_plan()).unwrap();
    let context = current_context(&h.companion);
    h.companion.on_phase_change(rest_notice(&context)).await;

    // The confirmation window runs out; the detection stays pending.
    tokio::time::advance(Duration::from_secs(12)).await;
    let events = h.companion.timers().tick();
    assert!(events.iter().any(|e| e.timer_type() == TimerType::Confirmation));
    assert!(h.companion.is_awaiting_confirmation());

    tokio::time::advance(Duration::from_secs(60)).await;
    h.companion.confirm_set_end(None).unwrap();
    assert_eq!(
        h.companion.timers().state(TimerType::Rest).remaining(),
        Some(Duration::ZERO)
    );
}

#[tokio::test(start_paused = true)]
async fn rest_notice_for_another_set_is_ignored() {
    let h = harness();
    h.companion.start_workout(bench_plan()).unwrap();
    let context = current_context(&h.companion);

    let stale = SessionContext {
        set_id: Some(SetId::new()),
        ..context.clone()
    };
    h.companion.on_phase_change(rest_notice(&stale)).await;
    assert!(!h.companion.is_awaiting_confirmation());
    assert_eq!(
        h.companion.confirm_set_end(None),
        Err(SessionError::NothingToConfirm)
    );
}

#[tokio::test(start_paused = true)]
async fn manual_rest_wins_over_pending_detection() {
    let h = harness();
    h.companion.start_workout(bench_plan()).unwrap();
    let context = current_context(&h.companion);
    h.companion.on_phase_change(rest_notice(&context)).await;

    let done = h
        .companion
        .start_rest(Some(Duration::from_secs(45)))
        .unwrap()
        .expect("active set finalized");
    assert_eq!(done.trigger, Some(EndTrigger::RestTimerStart));
    assert!(!h.companion.is_awaiting_confirmation());
    assert!(h.companion.timers().state(TimerType::Confirmation).is_idle());
    assert_eq!(
        h.companion.timers().state(TimerType::Rest).remaining(),
        Some(Duration::from_secs(45))
    );

    // The detection's confirmation arrives too late to end anything.
    assert_eq!(
        h.companion.confirm_set_end(None),
        Err(SessionError::NothingToConfirm)
    );
    let record = h.companion.end_workout().unwrap().record;
    assert_eq!(record.sets().count(), 1);
}

#[tokio::test(start_paused = true)]
async fn rejected_detection_keeps_the_set_open() {
    let h = harness();
    let mut events = h.companion.subscribe();
    let started = h.companion.start_workout(bench_plan()).unwrap();
    let context = current_context(&h.companion);
    h.companion.on_phase_change(rest_notice(&context)).await;

    h.companion.reject_set_end().unwrap();
    assert!(!h.companion.is_awaiting_confirmation());
    assert!(h.companion.timers().state(TimerType::Confirmation).is_idle());
    assert_eq!(h.companion.snapshot().unwrap().active_set, Some(started.set_id));
    assert_eq!(current_context(&h.companion).phase, Phase::Execution);
    wait_for(&mut events, |e| matches!(e, EngineEvent::DetectionCleared { .. })).await;

    assert_eq!(h.companion.reject_set_end(), Err(SessionError::NothingToConfirm));
}

#[tokio::test(start_paused = true)]
async fn resumed_motion_withdraws_the_detection() {
    let h = harness();
    h.companion.start_workout(bench_plan()).unwrap();
    let context = current_context(&h.companion);
    h.companion.on_phase_change(rest_notice(&context)).await;

    let target = context.capture_target().unwrap();
    h.companion
        .on_phase_change(PhaseChange::new(&target, None, Phase::Execution))
        .await;
    assert!(!h.companion.is_awaiting_confirmation());
    assert!(h.companion.timers().state(TimerType::Confirmation).is_idle());
}

#[tokio::test(start_paused = true)]
async fn foreground_timer_pause_resume_cancel() {
    let h = harness();
    h.companion.start_workout(bench_plan()).unwrap();
    h.companion.end_set(Some(8)).unwrap();
    assert_eq!(h.companion.timers().foreground(), Some(TimerType::Rest));

    tokio::time::advance(Duration::from_secs(10)).await;
    let remaining = h.companion.pause_timer().unwrap();
    assert_eq!(remaining, Duration::from_secs(50));

    // Paused time does not count.
    tokio::time::advance(Duration::from_secs(30)).await;
    assert_eq!(h.companion.resume_timer().unwrap(), Duration::from_secs(50));

    assert_eq!(h.companion.cancel_timer().unwrap(), TimerType::Rest);
    assert_eq!(h.companion.timers().foreground(), None);
    assert!(h.companion.cancel_timer().is_err());
}

#[tokio::test(start_paused = true)]
async fn cancelling_a_confirmation_rejects_it() {
    let h = harness();
    h.companion.start_workout(bench_plan()).unwrap();
    let context = current_context(&h.companion);
    h.companion.on_phase_change(rest_notice(&context)).await;

    assert_eq!(h.companion.cancel_timer().unwrap(), TimerType::Confirmation);
    assert!(!h.companion.is_awaiting_confirmation());
    assert!(h.companion.snapshot().unwrap().active_set.is_some());
}

#[tokio::test(start_paused = true)]
async fn rest_runs_out_into_the_next_set() {
    let h = harness();
    let cancel = CancellationToken::new();
    let tasks = h.companion.clone().run(cancel.clone());
    let mut events = h.companion.subscribe();

    h.companion.start_workout(bench_plan()).unwrap();
    h.companion.end_set(Some(8)).unwrap();
    let finalized = wait_for(&mut events, |e| matches!(e, EngineEvent::SetFinalized { .. })).await;
    assert!(matches!(
        finalized,
        EngineEvent::SetFinalized {
            rest_action: AutoAction::NextSet,
            ..
        }
    ));

    let started = wait_for(&mut events, |e| matches!(e, EngineEvent::SetStarted { .. })).await;
    assert!(matches!(started, EngineEvent::SetStarted { order: 2, .. }));

    // After the last planned set the rest only proposes moving on.
    h.companion.end_set(Some(8)).unwrap();
    let prompt = wait_for(&mut events, |e| matches!(e, EngineEvent::Prompt { .. })).await;
    assert_eq!(
        prompt,
        EngineEvent::Prompt {
            intent: spotter::Intent::ProposeCompleteExercise
        }
    );
    assert!(h.companion.snapshot().unwrap().active_set.is_none());

    cancel.cancel();
    for task in tasks {
        task.await.unwrap();
    }
}

#[tokio::test(start_paused = true)]
async fn workout_limit_ends_the_workout() {
    let mut config = SpotConfig::default();
    config.timers.workout_limit_secs = 120;
    let h = harness_with(config);
    let cancel = CancellationToken::new();
    let tasks = h.companion.clone().run(cancel.clone());
    let mut events = h.companion.subscribe();

    h.companion.start_workout(bench_plan()).unwrap();
    assert!(h.companion.timers().is_active(TimerType::WorkoutTotal));

    let ended = wait_for(&mut events, |e| matches!(e, EngineEvent::Archived { .. })).await;
    assert!(matches!(ended, EngineEvent::Archived { .. }));
    assert!(h.companion.snapshot().is_none());
    assert_eq!(h.companion.archive().list().unwrap().len(), 1);

    cancel.cancel();
    for task in tasks {
        task.await.unwrap();
    }
}

#[tokio::test(start_paused = true)]
async fn free_tier_set_limit() {
    let mut config = SpotConfig::default();
    config.entitlement.free_max_sets_per_exercise = 1;
    let h = harness_with(config);
    h.companion.start_workout(bench_plan()).unwrap();
    h.companion.end_set(Some(8)).unwrap();

    assert_eq!(
        h.companion.start_next_set(),
        Err(SessionError::SetLimitReached { limit: 1 })
    );

    h.companion.set_premium(true);
    assert!(current_context(&h.companion).is_premium);
    h.companion.start_next_set().unwrap();
}

#[tokio::test(start_paused = true)]
async fn chunks_land_only_in_the_active_set() {
    let h = harness();
    h.companion.start_workout(bench_plan()).unwrap();
    let target = current_context(&h.companion).capture_target().unwrap();

    let samples = vec![MotionSample::at_rest(Utc::now()); 5];
    let chunk = SensorSampleChunk::new(&target, Phase::Execution, samples).unwrap();
    h.companion.on_chunk(chunk.clone()).await;

    let done = h.companion.end_set(Some(8)).unwrap();
    let motion = done.record.motion.expect("motion summarized");
    assert_eq!(motion.chunks, 1);
    assert_eq!(motion.samples, 5);

    // A late chunk for the finished set is dropped, not attached elsewhere.
    h.companion.on_chunk(chunk).await;
    h.companion.start_next_set().unwrap();
    let second = h.companion.end_set(Some(8)).unwrap();
    assert!(second.record.motion.is_none());
}

#[tokio::test(start_paused = true)]
async fn logout_abandons_and_archives() {
    let h = harness();
    h.companion.start_workout(bench_plan()).unwrap();
    h.companion.end_set(Some(8)).unwrap();

    let finalized = h.companion.logout().unwrap().expect("workout was active");
    assert_eq!(finalized.record.status, EntityStatus::Abandoned);
    let archived = h.companion.archive().load(finalized.record.id).unwrap().unwrap();
    assert_eq!(archived.status, EntityStatus::Abandoned);
    assert_eq!(h.companion.timers().foreground(), None);

    assert!(h.companion.logout().unwrap().is_none());
}

#[tokio::test(start_paused = true)]
async fn wearable_follows_the_companion() {
    let config = SpotConfig::default();
    let retry = RetryConfig::from(&config.transfer);
    let (wrist_link, companion_link) = MemoryLink::pair();
    let wrist_channel = Arc::new(TransferChannel::new(Arc::new(wrist_link), retry.clone()));
    let companion_channel = Arc::new(TransferChannel::new(Arc::new(companion_link), retry));

    let cancel = CancellationToken::new();
    let wearable = Arc::new(Wearable::new(wrist_channel.clone(), &config));
    let mut tasks = vec![tokio::spawn(
        wrist_channel.run(wearable.clone(), cancel.clone()),
    )];
    let companion = Arc::new(Companion::new(
        OwnerId::new("ana"),
        &config,
        companion_channel,
        HistoryArchive::in_memory(),
    ));
    tasks.extend(companion.clone().run(cancel.clone()));
    let mut events = companion.subscribe();

    let started = companion.start_workout(bench_plan()).unwrap();
    let revision = current_context(&companion).revision;
    wait_for(&mut events, |e| {
        matches!(e, EngineEvent::ContextAcked { revision: r } if *r >= revision)
    })
    .await;
    assert_eq!(wearable.context().set_id, Some(started.set_id));
    assert!(wearable.context().is_active);

    companion.end_set(Some(8)).unwrap();
    tokio::time::sleep(Duration::from_millis(50)).await;
    let rest = wearable.timer(TimerType::Rest).expect("rest mirrored");
    assert!(rest.is_running());
    assert_eq!(rest.auto_action, AutoAction::NextSet);
    assert_eq!(wearable.phase(), Phase::Rest);
    assert_eq!(wearable.context().set_id, None);

    cancel.cancel();
    for task in tasks {
        task.await.unwrap();
    }
}

#[test]
fn racing_checkmark_leaves_no_timer_after_the_workout() {
    for _ in 0..200 {
        let h = harness();
        h.companion.start_workout(bench_plan()).unwrap();
        let barrier = std::sync::Barrier::new(2);

        std::thread::scope(|scope| {
            scope.spawn(|| {
                barrier.wait();
                let _ = h.companion.end_set(Some(8));
                let _ = h.companion.start_rest(None);
            });
            scope.spawn(|| {
                barrier.wait();
                h.companion.end_workout().unwrap();
            });
        });

        let timers = h.companion.timers();
        assert!(
            TimerType::ALL.iter().all(|t| !timers.is_active(*t)),
            "timer outlived the workout: {:?}",
            timers.states()
        );
        assert_eq!(h.companion.archive().list().unwrap().len(), 1);
    }
}
