//! Orchestrator integration tests.
//!
//! Admission, chains, delays, cancellation, durable resume and event ordering,
//! observed only through the public API.

use std::collections::HashSet;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use grainvisor::{
    AdmissionError, Event, EventKind, Grain, GrainError, GrainResult, GrainStream, Orchestrator,
    OrchestratorConfig, ResiliencePolicy, ResultCode, RuntimeError, Stage, Step, StepContext,
    Subscribe, TerminateError, Topic,
};
use serde_json::json;
use tokio::sync::Notify;
use tokio::time::{self, Instant};

fn config() -> OrchestratorConfig {
    OrchestratorConfig {
        resilience: ResiliencePolicy::no_retry(),
        stream_capacity: 1024,
        ..OrchestratorConfig::default()
    }
}

fn build(cfg: OrchestratorConfig) -> Arc<Orchestrator> {
    let orch = Orchestrator::builder(cfg).build();
    orch.registry().register_fn("echo", |ctx: StepContext| async move {
        Ok::<_, GrainError>(Step::Done(GrainResult::success((*ctx.payload).clone())))
    });
    orch.registry().register_fn("boom", |_ctx: StepContext| async move {
        Err::<Step, _>(GrainError::fatal("boom"))
    });
    orch
}

async fn next(stream: &mut GrainStream) -> Event {
    time::timeout(Duration::from_secs(5), stream.recv())
        .await
        .expect("event within 5s")
        .expect("stream still open")
}

/// Collects lifecycle events until `n` grains have completed.
async fn until_completed(stream: &mut GrainStream, n: usize) -> Vec<Event> {
    let mut out = Vec::new();
    let mut done = 0;
    while done < n {
        let ev = next(stream).await;
        if ev.is_terminal() {
            done += 1;
        }
        out.push(ev);
    }
    out
}

fn kinds_of(events: &[Event], id: &str) -> Vec<(EventKind, Option<Stage>)> {
    events
        .iter()
        .filter(|e| e.grain_id.as_deref() == Some(id))
        .map(|e| (e.kind, e.stage))
        .collect()
}

#[tokio::test]
async fn immediate_grain_is_queued_before_it_runs() {
    let orch = build(config());
    let mut stream = orch.subscribe(Topic::grain("a"));

    orch.submit(Grain::new("a", "echo").with_payload(json!({"n": 1})))
        .unwrap();
    assert_eq!(orch.stage("a"), Some(Stage::Queued));

    let events = until_completed(&mut stream, 1).await;
    assert_eq!(
        kinds_of(&events, "a"),
        vec![
            (EventKind::OnBegin, Some(Stage::Running)),
            (EventKind::OnCompleted, Some(Stage::Succeeded)),
        ]
    );
    let last = events.last().unwrap();
    assert_eq!(last.result_code, Some(ResultCode::Success));
    assert_eq!(last.payload.as_deref(), Some(&json!({"n": 1})));
    assert_eq!(orch.stage("a"), Some(Stage::Succeeded));
}

#[tokio::test]
async fn failed_head_skips_the_chain_without_running_it() {
    let orch = build(config());
    let calls = Arc::new(AtomicUsize::new(0));
    let counter = Arc::clone(&calls);
    orch.registry().register_fn("count", move |_ctx: StepContext| {
        let counter = Arc::clone(&counter);
        async move {
            counter.fetch_add(1, Ordering::SeqCst);
            Ok::<_, GrainError>(Step::Done(GrainResult::code(ResultCode::Success)))
        }
    });
    let mut stream = orch.subscribe(Topic::All);

    orch.submit(Grain::new("A", "boom").with_chain("k")).unwrap();
    orch.submit(Grain::new("B", "count").with_chain("k")).unwrap();
    orch.submit(Grain::new("C", "count").with_chain("k")).unwrap();

    let events = until_completed(&mut stream, 3).await;
    assert_eq!(calls.load(Ordering::SeqCst), 0);

    let order: Vec<(EventKind, &str)> = events
        .iter()
        .map(|e| (e.kind, e.grain_id.as_deref().unwrap_or("")))
        .collect();
    assert_eq!(
        order,
        vec![
            (EventKind::OnBegin, "A"),
            (EventKind::OnError, "A"),
            (EventKind::OnCompleted, "A"),
            (EventKind::OnCompleted, "B"),
            (EventKind::OnCompleted, "C"),
        ]
    );
    assert_eq!(events[1].result_code, Some(ResultCode::Error));
    assert!(events[1].reason.as_deref().unwrap_or("").contains("boom"));
    for ev in &events[3..] {
        assert_eq!(ev.stage, Some(Stage::SkippedDueToDependency));
        assert_eq!(ev.result_code, Some(ResultCode::Failed));
    }
}

#[tokio::test]
async fn warning_result_unblocks_the_successor() {
    let orch = build(config());
    orch.registry().register_fn("warn", |_ctx: StepContext| async move {
        Ok::<_, GrainError>(Step::Done(GrainResult::warning(json!("partial"))))
    });
    let mut stream = orch.subscribe(Topic::client("c"));

    orch.submit(Grain::new("w", "warn").with_chain("k").with_client_key("c"))
        .unwrap();
    orch.submit(Grain::new("next", "echo").with_chain("k").with_client_key("c"))
        .unwrap();

    let events = until_completed(&mut stream, 2).await;
    assert_eq!(
        kinds_of(&events, "w"),
        vec![
            (EventKind::OnBegin, Some(Stage::Running)),
            (EventKind::OnNext, Some(Stage::Succeeded)),
            (EventKind::OnCompleted, Some(Stage::Succeeded)),
        ]
    );
    let w_done = events
        .iter()
        .find(|e| e.is_terminal() && e.grain_id.as_deref() == Some("w"))
        .unwrap();
    assert_eq!(w_done.result_code, Some(ResultCode::Warning));
    assert_eq!(orch.stage("next"), Some(Stage::Succeeded));
}

#[tokio::test(start_paused = true)]
async fn delayed_grain_waits_for_its_delay() {
    let orch = build(config());
    let mut stream = orch.subscribe(Topic::grain("later"));

    let submitted = Instant::now();
    orch.submit(Grain::new("later", "echo").with_delay(Duration::from_millis(500)))
        .unwrap();
    assert_eq!(orch.stage("later"), Some(Stage::Delayed));

    let begin = next(&mut stream).await;
    assert_eq!(begin.kind, EventKind::OnBegin);
    let waited = submitted.elapsed();
    assert!(waited >= Duration::from_millis(500), "started after {waited:?}");
    assert!(waited < Duration::from_millis(510), "started after {waited:?}");

    let done = next(&mut stream).await;
    assert_eq!(done.stage, Some(Stage::Succeeded));
}

#[tokio::test(start_paused = true)]
async fn terminating_a_delayed_grain_cancels_it_once() {
    let orch = build(config());
    let mut stream = orch.subscribe(Topic::grain("d"));

    orch.submit(Grain::new("d", "echo").with_delay(Duration::from_secs(10)))
        .unwrap();
    orch.terminate("d").unwrap();

    let ev = next(&mut stream).await;
    assert_eq!(ev.kind, EventKind::OnCompleted);
    assert_eq!(ev.stage, Some(Stage::Cancelled));
    assert_eq!(ev.result_code, Some(ResultCode::Cancelled));
    assert!(stream.recv().await.is_none());

    // the delay elapsing later must not revive it
    time::sleep(Duration::from_secs(11)).await;
    assert_eq!(orch.stage("d"), Some(Stage::Cancelled));
    assert_eq!(
        orch.terminate("d"),
        Err(TerminateError::NotFound { id: "d".into() })
    );
}

#[tokio::test]
async fn running_grain_stops_at_the_step_boundary() {
    let orch = build(config());
    let entered = Arc::new(Notify::new());
    let signal = Arc::clone(&entered);
    orch.registry().register_fn("wait", move |ctx: StepContext| {
        let signal = Arc::clone(&signal);
        async move {
            signal.notify_one();
            ctx.token.cancelled().await;
            Err::<Step, _>(GrainError::Canceled)
        }
    });
    let mut stream = orch.subscribe(Topic::grain("r"));

    orch.submit(Grain::new("r", "wait")).unwrap();
    entered.notified().await;
    orch.terminate("r").unwrap();

    let events = until_completed(&mut stream, 1).await;
    assert_eq!(
        kinds_of(&events, "r"),
        vec![
            (EventKind::OnBegin, Some(Stage::Running)),
            (EventKind::OnCompleted, Some(Stage::Cancelled)),
        ]
    );
    assert!(stream.recv().await.is_none());
}

#[tokio::test]
async fn durable_grain_resumes_from_its_checkpoint() {
    let orch = build(config());
    let seen = Arc::new(Mutex::new(Vec::new()));
    let entered = Arc::new(Notify::new());
    let first_run = Arc::new(AtomicUsize::new(0));
    {
        let (seen, entered, first_run) = (seen.clone(), entered.clone(), first_run.clone());
        orch.registry().register_fn("durable", move |ctx: StepContext| {
            let (seen, entered, first_run) = (seen.clone(), entered.clone(), first_run.clone());
            async move {
                seen.lock().unwrap().push(ctx.step);
                match ctx.step {
                    0 | 1 => Ok(Step::Continue(json!(ctx.step + 1))),
                    _ if first_run.fetch_add(1, Ordering::SeqCst) == 0 => {
                        entered.notify_one();
                        ctx.token.cancelled().await;
                        Err(GrainError::Canceled)
                    }
                    _ => Ok(Step::Done(GrainResult::success(
                        ctx.state.unwrap_or_default(),
                    ))),
                }
            }
        });
    }

    let mut stream = orch.subscribe(Topic::grain("job"));
    orch.submit(Grain::new("job", "durable").durable()).unwrap();
    entered.notified().await;
    orch.terminate("job").unwrap();

    let first = until_completed(&mut stream, 1).await;
    let steps: Vec<u32> = first
        .iter()
        .filter(|e| e.kind == EventKind::OnNext)
        .filter_map(|e| e.step)
        .collect();
    assert_eq!(steps, vec![1, 2]);
    assert_eq!(first.last().unwrap().stage, Some(Stage::Cancelled));

    let saved = orch.checkpoint_store().load("job").await.unwrap().unwrap();
    assert_eq!(saved.step, 2);

    let mut stream = orch.subscribe(Topic::grain("job"));
    // the replayed terminal event of the previous lifecycle closes this stream
    assert_eq!(next(&mut stream).await.stage, Some(Stage::Cancelled));

    let mut stream = orch.subscribe(Topic::All);
    orch.submit(Grain::new("job", "durable").durable()).unwrap();
    let second = until_completed(&mut stream, 1).await;
    let done = second.last().unwrap();
    assert_eq!(done.stage, Some(Stage::Succeeded));
    assert_eq!(done.payload.as_deref(), Some(&json!(2)));

    assert_eq!(*seen.lock().unwrap(), vec![0, 1, 2, 2]);
    assert!(orch.checkpoint_store().load("job").await.unwrap().is_none());
}

#[tokio::test]
async fn transient_failures_are_retried() {
    let mut cfg = config();
    cfg.resilience = ResiliencePolicy::default()
        .with_max_retries(2)
        .with_backoff(grainvisor::BackoffPolicy {
            first: Duration::from_millis(1),
            ..grainvisor::BackoffPolicy::default()
        });
    let orch = build(cfg);
    let calls = Arc::new(AtomicUsize::new(0));
    let counter = Arc::clone(&calls);
    orch.registry().register_fn("flaky", move |_ctx: StepContext| {
        let counter = Arc::clone(&counter);
        async move {
            if counter.fetch_add(1, Ordering::SeqCst) < 2 {
                Err(GrainError::fail("not yet"))
            } else {
                Ok(Step::Done(GrainResult::code(ResultCode::Success)))
            }
        }
    });
    let mut raw = orch.bus().subscribe();
    let mut stream = orch.subscribe(Topic::grain("f"));

    orch.submit(Grain::new("f", "flaky")).unwrap();
    let events = until_completed(&mut stream, 1).await;
    assert_eq!(events.last().unwrap().stage, Some(Stage::Succeeded));
    assert_eq!(calls.load(Ordering::SeqCst), 3);

    let mut backoffs = 0;
    while let Ok(ev) = raw.try_recv() {
        if ev.kind == EventKind::BackoffScheduled {
            backoffs += 1;
        }
    }
    assert_eq!(backoffs, 2);
}

#[tokio::test(start_paused = true)]
async fn hundred_grains_complete_under_a_concurrency_limit() {
    const WORK: Duration = Duration::from_millis(100);
    let mut cfg = config();
    cfg.max_concurrent = 8;
    let orch = build(cfg);
    let in_flight = Arc::new(AtomicUsize::new(0));
    let peak = Arc::new(AtomicUsize::new(0));
    {
        let (in_flight, peak) = (in_flight.clone(), peak.clone());
        orch.registry().register_fn("work", move |_ctx: StepContext| {
            let (in_flight, peak) = (in_flight.clone(), peak.clone());
            async move {
                let now = in_flight.fetch_add(1, Ordering::SeqCst) + 1;
                peak.fetch_max(now, Ordering::SeqCst);
                time::sleep(WORK).await;
                in_flight.fetch_sub(1, Ordering::SeqCst);
                Ok::<_, GrainError>(Step::Done(GrainResult::code(ResultCode::Success)))
            }
        });
    }
    let mut stream = orch.subscribe(Topic::All);

    let started = Instant::now();
    let results = orch.submit_batch((0..100).map(|i| Grain::new(format!("g{i}"), "work")));
    assert!(results.iter().all(Result::is_ok));

    let events = until_completed(&mut stream, 100).await;
    let elapsed = started.elapsed();
    // 100 grains, 8 at a time: 13 rounds of WORK, far below 100 sequential runs
    assert!(elapsed >= WORK * 13, "finished after {elapsed:?}");
    assert!(elapsed < WORK * 20, "finished after {elapsed:?}");
    assert_eq!(peak.load(Ordering::SeqCst), 8);

    let succeeded = events
        .iter()
        .filter(|e| e.is_terminal() && e.stage == Some(Stage::Succeeded))
        .count();
    assert_eq!(succeeded, 100);
    for i in 0..100 {
        let id = format!("g{i}");
        let terminal = events
            .iter()
            .filter(|e| e.is_terminal() && e.grain_id.as_deref() == Some(id.as_str()))
            .count();
        assert_eq!(terminal, 1, "{id} completed {terminal} times");
    }
}

#[tokio::test]
async fn slow_stream_still_sees_every_completion() {
    let mut cfg = config();
    cfg.bus_capacity = 8;
    cfg.stream_capacity = 1;
    let orch = build(cfg);
    let mut stream = orch.subscribe(Topic::All);

    let results = orch.submit_batch((0..50).map(|i| Grain::new(format!("e{i}"), "echo")));
    assert!(results.iter().all(Result::is_ok));

    let mut done = HashSet::new();
    while done.len() < 50 {
        let ev = next(&mut stream).await;
        if ev.is_terminal() {
            assert_eq!(ev.stage, Some(Stage::Succeeded));
            let id = ev.grain_id.clone().unwrap();
            assert!(done.insert(id.to_string()), "{id} completed twice");
        }
        time::sleep(Duration::from_millis(1)).await;
    }
}

#[tokio::test(start_paused = true)]
async fn delayed_dependent_stays_delayed_until_its_dependency_finishes() {
    let orch = build(config());
    orch.registry().register_fn("slow", |_ctx: StepContext| async move {
        time::sleep(Duration::from_secs(1)).await;
        Ok::<_, GrainError>(Step::Done(GrainResult::code(ResultCode::Success)))
    });
    let mut stream = orch.subscribe(Topic::grain("B"));

    orch.submit(Grain::new("A", "slow")).unwrap();
    orch.submit(
        Grain::new("B", "echo")
            .depends_on_id("A")
            .with_delay(Duration::from_millis(100)),
    )
    .unwrap();
    assert_eq!(orch.stage("B"), Some(Stage::Delayed));

    time::sleep(Duration::from_millis(200)).await;
    assert_eq!(orch.stage("A"), Some(Stage::Running));
    assert_eq!(orch.stage("B"), Some(Stage::Delayed));

    let events = until_completed(&mut stream, 1).await;
    assert_eq!(
        kinds_of(&events, "B"),
        vec![
            (EventKind::OnBegin, Some(Stage::Running)),
            (EventKind::OnCompleted, Some(Stage::Succeeded)),
        ]
    );
    assert_eq!(orch.stage("A"), Some(Stage::Succeeded));
}

#[tokio::test]
async fn admission_rejections() {
    let orch = build(config());
    orch.submit(Grain::new("x", "echo").with_delay(Duration::from_secs(60)))
        .unwrap();

    assert_eq!(
        orch.submit(Grain::new("x", "echo")),
        Err(AdmissionError::Duplicate { id: "x".into() })
    );
    assert_eq!(
        orch.submit(Grain::new("y", "nope")),
        Err(AdmissionError::UnknownType {
            type_name: "nope".into()
        })
    );
    assert_eq!(
        orch.submit(Grain::new("", "echo")),
        Err(AdmissionError::EmptyId)
    );
    assert_eq!(orch.stage("y"), None);

    orch.submit(
        Grain::new("B", "echo")
            .depends_on_id("A")
            .with_delay(Duration::from_secs(60)),
    )
    .unwrap();
    let cycle = orch.submit(Grain::new("A", "echo").depends_on_id("B"));
    assert_eq!(
        cycle,
        Err(AdmissionError::Cycle {
            id: "A".into(),
            through: "B".into()
        })
    );
    assert_eq!(ResultCode::of(&cycle), ResultCode::InvalidObject);
    assert_eq!(orch.stage("A"), None);
}

#[tokio::test]
async fn json_requests_are_admitted() {
    let orch = build(config());
    let mut stream = orch.subscribe(Topic::client("api"));

    orch.submit_json(
        r#"{"id":"j1","type_name":"echo","client_key":"api","payload":{"k":"v"}}"#,
    )
    .unwrap();
    let events = until_completed(&mut stream, 1).await;
    assert_eq!(
        events.last().unwrap().payload.as_deref(),
        Some(&json!({"k": "v"}))
    );

    assert!(matches!(
        orch.submit_json("{not json"),
        Err(AdmissionError::Malformed { .. })
    ));
}

#[derive(Default)]
struct Recorder {
    kinds: Mutex<Vec<EventKind>>,
}

#[async_trait]
impl Subscribe for Recorder {
    async fn on_event(&self, event: &Event) {
        self.kinds.lock().unwrap().push(event.kind);
    }

    fn name(&self) -> &'static str {
        "recorder"
    }
}

#[tokio::test]
async fn shutdown_cancels_pending_grains_and_closes_admission() {
    let recorder = Arc::new(Recorder::default());
    let orch = Orchestrator::builder(config())
        .with_subscribers(vec![recorder.clone()])
        .build();
    orch.registry().register_fn("echo", |_ctx: StepContext| async move {
        Ok::<_, GrainError>(Step::Done(GrainResult::code(ResultCode::Success)))
    });
    let mut stream = orch.subscribe(Topic::grain("p"));

    orch.submit(Grain::new("p", "echo").with_delay(Duration::from_secs(60)))
        .unwrap();
    orch.shutdown().await.unwrap();

    let ev = next(&mut stream).await;
    assert_eq!(ev.stage, Some(Stage::Cancelled));
    assert_eq!(
        orch.submit(Grain::new("q", "echo")),
        Err(AdmissionError::Closed)
    );

    time::sleep(Duration::from_millis(50)).await;
    let kinds = recorder.kinds.lock().unwrap().clone();
    assert!(kinds.contains(&EventKind::OnCompleted));
    assert!(kinds.contains(&EventKind::AllStoppedWithin));
}

#[tokio::test(start_paused = true)]
async fn shutdown_reports_grains_that_ignore_cancellation() {
    let mut cfg = config();
    cfg.grace = Duration::from_millis(100);
    let orch = build(cfg);
    let entered = Arc::new(Notify::new());
    let signal = Arc::clone(&entered);
    orch.registry().register_fn("stubborn", move |_ctx: StepContext| {
        let signal = Arc::clone(&signal);
        async move {
            signal.notify_one();
            time::sleep(Duration::from_secs(3600)).await;
            Ok::<_, GrainError>(Step::Done(GrainResult::code(ResultCode::Success)))
        }
    });

    orch.submit(Grain::new("slow", "stubborn")).unwrap();
    entered.notified().await;

    match orch.shutdown().await {
        Err(RuntimeError::GraceExceeded { grace, stuck }) => {
            assert_eq!(grace, Duration::from_millis(100));
            assert_eq!(stuck, vec!["slow".to_string()]);
        }
        other => panic!("unexpected {other:?}"),
    }
}
