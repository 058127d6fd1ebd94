//! # Orchestrator: admission, chain ordering, execution and lifecycle events.
//!
//! The [`Orchestrator`] owns the scheduler table, the delay gate, the event
//! bus and the subscriber fan-out. It admits grains, spawns one actor per
//! grain that becomes `Queued`, turns each actor's outcome into terminal
//! events and chain consequences, and shuts everything down gracefully.
//!
//! ## High-level architecture
//! ```text
//! submit(grain)
//!   ├─ registry.contains(type)?            (UnknownType → rejected)
//!   ├─ scheduler.insert(grain, delayed)     (Duplicate / CrossChain → rejected)
//!   └─ delay > 0 ? gate.schedule(due) ──► gate loop ──┐
//!                : admit(id) ◄──────────────────────────┘
//!
//! admit(id) = scheduler.release(id)
//!   ├─ Ready   ─► launch(id): child token, tracker.spawn(drive)
//!   ├─ Waiting ─► (released later by a predecessor's completion)
//!   └─ Skipped ─► OnCompleted{SkippedDueToDependency} per grain
//!
//! drive(id)
//!   ├─ acquire permit (cancellable)          cancelled → Cancelled
//!   ├─ scheduler.start(id)                   Queued → Running (exclusive)
//!   ├─ GrainActor::run()                     OnBegin, OnNext*, retries
//!   └─ finish(outcome)
//!        ├─ scheduler.complete(id)  → Completion { ready, skipped } (None: nothing published)
//!        ├─ [OnNext (chain advances)] [OnError] OnCompleted
//!        ├─ OnCompleted for every skipped dependent
//!        └─ advance(ready)  → launch each, FIFO
//!
//! Background (hold a Weak, stop on the runtime token):
//!   gate loop:        sleep_until(gate.peek_due()) | Notify ─► pop_due ─► admit
//!   janitor:          every janitor_interval ─► purge terminal grains past retention
//!   subscriber list.: Bus ─► SubscriberSet::emit
//! ```
//!
//! ## Example
//! ```rust
//! use grainvisor::{
//!     Grain, GrainError, GrainResult, Orchestrator, OrchestratorConfig, Step, StepContext, Topic,
//! };
//!
//! #[tokio::main(flavor = "current_thread")]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let orch = Orchestrator::builder(OrchestratorConfig::default()).build();
//!     orch.registry().register_fn("greet", |ctx: StepContext| async move {
//!         Ok::<_, GrainError>(Step::Done(GrainResult::success((*ctx.payload).clone())))
//!     });
//!
//!     let mut events = orch.subscribe(Topic::grain("hello"));
//!     orch.submit(Grain::new("hello", "greet").with_payload(serde_json::json!("hi")))?;
//!     while let Some(ev) = events.recv().await {
//!         println!("{:?} {:?}", ev.kind, ev.stage);
//!     }
//!
//!     orch.shutdown().await?;
//!     Ok(())
//! }
//! ```

use std::sync::{Arc, Mutex, MutexGuard, PoisonError, Weak};

use tokio::sync::{Notify, Semaphore, broadcast::error::RecvError};
use tokio::time::{self, Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;
use tracing::{debug, info, warn};

use crate::{
    checkpoint::CheckpointStore,
    core::{
        actor::{GrainActor, Outcome},
        builder::OrchestratorBuilder,
        config::OrchestratorConfig,
        shutdown,
    },
    delay::DelayGate,
    error::RuntimeError,
    events::{Bus, Event, EventKind, GrainStream, Publisher, Topic},
    grains::{Grain, GrainRequest, HandlerRegistry, ResultCode, Stage},
    scheduler::{
        Admission, AdmissionError, CancelDecision, ChainScheduler, GrainSnapshot, Settled,
        TerminateError,
    },
    subscribers::SubscriberSet,
};

/// Admits, orders, executes and observes grains.
pub struct Orchestrator {
    cfg: OrchestratorConfig,
    events: Publisher,
    subs: Arc<SubscriberSet>,
    registry: Arc<HandlerRegistry>,
    store: Arc<dyn CheckpointStore>,
    scheduler: Arc<Mutex<ChainScheduler>>,
    gate: Mutex<DelayGate>,
    gate_wake: Arc<Notify>,
    semaphore: Option<Arc<Semaphore>>,
    token: CancellationToken,
    tracker: TaskTracker,
}

impl Orchestrator {
    /// Returns a builder; `build()` must run inside a Tokio runtime.
    pub fn builder(cfg: OrchestratorConfig) -> OrchestratorBuilder {
        OrchestratorBuilder::new(cfg)
    }

    pub(crate) fn new_internal(
        cfg: OrchestratorConfig,
        bus: Bus,
        subs: Arc<SubscriberSet>,
        registry: Arc<HandlerRegistry>,
        store: Arc<dyn CheckpointStore>,
    ) -> Self {
        let semaphore = cfg.concurrency_limit().map(Semaphore::new).map(Arc::new);
        Self {
            cfg,
            events: Publisher::new(bus),
            subs,
            registry,
            store,
            scheduler: Arc::new(Mutex::new(ChainScheduler::new())),
            gate: Mutex::new(DelayGate::new()),
            gate_wake: Arc::new(Notify::new()),
            semaphore,
            token: CancellationToken::new(),
            tracker: TaskTracker::new(),
        }
    }

    /// Spawns the subscriber listener, the gate loop and the janitor.
    pub(crate) fn start_background(self: &Arc<Self>) {
        self.subscriber_listener();
        tokio::spawn(gate_loop(
            Arc::downgrade(self),
            Arc::clone(&self.gate_wake),
            self.token.clone(),
        ));
        if let Some(period) = self.cfg.janitor_period() {
            tokio::spawn(janitor_loop(
                Arc::downgrade(self),
                period,
                self.token.clone(),
            ));
        }
    }

    /// Admits one grain.
    ///
    /// Returns synchronously; the grain's fate arrives through events.
    pub fn submit(self: &Arc<Self>, grain: Grain) -> Result<(), AdmissionError> {
        if self.token.is_cancelled() {
            return Err(AdmissionError::Closed);
        }
        if grain.id().is_empty() {
            return Err(AdmissionError::EmptyId);
        }
        if !self.registry.contains(grain.type_name()) {
            return Err(AdmissionError::UnknownType {
                type_name: grain.type_name().to_string(),
            });
        }

        let id = grain.id_arc();
        let delay = grain.delay();
        let stage = self.scheduler().insert(grain, !delay.is_zero())?;
        debug!(grain_id = %id, %stage, delay_ms = delay.as_millis() as u64, "grain admitted");

        if stage == Stage::Delayed {
            let earliest = self.gate().schedule(id, Instant::now() + delay);
            if earliest {
                self.gate_wake.notify_one();
            }
        } else {
            self.admit(&id);
        }
        Ok(())
    }

    /// Admits each grain independently, in order.
    pub fn submit_batch(
        self: &Arc<Self>,
        grains: impl IntoIterator<Item = Grain>,
    ) -> Vec<Result<(), AdmissionError>> {
        grains.into_iter().map(|g| self.submit(g)).collect()
    }

    /// Parses a JSON [`GrainRequest`] and admits it.
    pub fn submit_json(self: &Arc<Self>, text: &str) -> Result<(), AdmissionError> {
        let grain = GrainRequest::from_json(text)?.into_grain(self.cfg.resilience);
        self.submit(grain)
    }

    /// Cancels a grain.
    ///
    /// - `Seeded`/`Delayed`/`Queued`: `Cancelled` immediately, dependents skipped.
    /// - `Running`/`Checkpointed`: signalled; the actor stops at the next step
    ///   boundary and the grain ends `Cancelled`.
    /// - terminal or unknown: [`TerminateError::NotFound`].
    pub fn terminate(&self, id: &str) -> Result<(), TerminateError> {
        let decision = self.scheduler().cancel(id);
        match decision {
            CancelDecision::Immediate { cancelled, skipped } => {
                info!(grain_id = id, "grain cancelled before start");
                self.settle(std::iter::once(cancelled).chain(skipped));
                Ok(())
            }
            CancelDecision::Signal(token) => {
                info!(grain_id = id, "cancel signalled to running grain");
                token.cancel();
                Ok(())
            }
            CancelDecision::NothingToCancel => {
                debug!(grain_id = id, "nothing to terminate");
                Err(TerminateError::NotFound { id: id.to_string() })
            }
        }
    }

    pub fn terminate_batch<I, S>(&self, ids: I) -> Vec<Result<(), TerminateError>>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        ids.into_iter().map(|id| self.terminate(id.as_ref())).collect()
    }

    /// Current stage of a retained grain.
    pub fn stage(&self, id: &str) -> Option<Stage> {
        self.scheduler().stage(id)
    }

    pub fn snapshot(&self, id: &str) -> Option<GrainSnapshot> {
        self.scheduler().snapshot(id)
    }

    /// Opens a lifecycle stream for `topic`.
    pub fn subscribe(&self, topic: Topic) -> GrainStream {
        GrainStream::open(
            topic,
            self.events.bus(),
            self.events.latest(),
            self.cfg.stream_capacity_clamped(),
        )
    }

    /// Raw bus, including diagnostic events.
    pub fn bus(&self) -> &Bus {
        self.events.bus()
    }

    pub fn registry(&self) -> &Arc<HandlerRegistry> {
        &self.registry
    }

    pub fn checkpoint_store(&self) -> &Arc<dyn CheckpointStore> {
        &self.store
    }

    pub fn config(&self) -> &OrchestratorConfig {
        &self.cfg
    }

    /// Purges terminal grains older than `retention`; returns how many.
    pub async fn collect_garbage(&self) -> usize {
        let purged = self
            .scheduler()
            .purge_expired(Instant::now(), self.cfg.retention);
        for id in &purged {
            self.events.latest().forget(id);
            if let Err(e) = self.store.remove(id).await {
                warn!(grain_id = %id, error = %e, "checkpoint purge failed");
            }
        }
        if !purged.is_empty() {
            debug!(purged = purged.len(), "terminal grains collected");
        }
        purged.len()
    }

    /// Waits for an OS termination signal, then shuts down.
    pub async fn run_until_signal(&self) -> Result<(), RuntimeError> {
        match shutdown::wait_for_shutdown_signal().await {
            Ok(signal) => info!(signal, "shutdown signal received"),
            Err(e) => warn!(error = %e, "signal listener failed; shutting down"),
        }
        self.events
            .bus()
            .publish(Event::new(EventKind::ShutdownRequested));
        self.shutdown().await
    }

    /// Stops admission, cancels every unfinished grain and waits up to
    /// `grace` for executing grains to stop.
    ///
    /// Publishes `AllStoppedWithin` or `GraceExceeded`.
    pub async fn shutdown(&self) -> Result<(), RuntimeError> {
        self.token.cancel();
        self.tracker.close();

        let pending = self.scheduler().unfinished();
        for id in pending {
            self.cancel_pending(&id);
        }

        let grace = self.cfg.grace;
        match time::timeout(grace, self.tracker.wait()).await {
            Ok(()) => {
                self.events
                    .bus()
                    .publish(Event::new(EventKind::AllStoppedWithin));
                Ok(())
            }
            Err(_) => {
                let stuck = self.scheduler().executing();
                warn!(?stuck, ?grace, "grains still executing after grace");
                self.events
                    .bus()
                    .publish(Event::new(EventKind::GraceExceeded).with_reason(stuck.join(",")));
                Err(RuntimeError::GraceExceeded { grace, stuck })
            }
        }
    }

    /// Releases grains whose predecessor succeeded. Only reachable from
    /// completion handling, never from the public API.
    pub(crate) fn advance(self: &Arc<Self>, ready: Vec<Arc<str>>) {
        for id in ready {
            self.launch(id);
        }
    }

    fn admit(self: &Arc<Self>, id: &str) {
        let admission = self.scheduler().release(id);
        match admission {
            Admission::Ready => self.launch(Arc::from(id)),
            Admission::Waiting => debug!(grain_id = id, "grain waiting on dependencies"),
            Admission::Skipped(settled) => self.settle(settled),
            Admission::Stale => {}
        }
    }

    fn launch(self: &Arc<Self>, id: Arc<str>) {
        let token = self.token.child_token();
        self.scheduler().attach(&id, token.clone());
        let this = Arc::clone(self);
        self.tracker.spawn(async move { this.drive(id, token).await });
    }

    async fn drive(self: Arc<Self>, id: Arc<str>, token: CancellationToken) {
        let permit = match &self.semaphore {
            Some(sem) => {
                let acquire = Arc::clone(sem).acquire_owned();
                tokio::select! {
                    res = acquire => match res {
                        Ok(permit) => Some(permit),
                        Err(_closed) => {
                            self.cancel_pending(&id);
                            return;
                        }
                    },
                    _ = token.cancelled() => {
                        self.cancel_pending(&id);
                        return;
                    }
                }
            }
            None => None,
        };

        // None: cancelled while queued.
        let Some(grain) = self.scheduler().start(&id) else {
            return;
        };
        let handler = match self.registry.resolve(grain.type_name()) {
            Ok(h) => h,
            Err(e) => {
                warn!(grain_id = %id, error = %e, "handler vanished before start");
                drop(permit);
                self.finish(&grain, Outcome::failed(ResultCode::InvalidObject, e.to_string()));
                return;
            }
        };
        let resilience = grain.resilience().unwrap_or(self.cfg.resilience);
        let actor = GrainActor::new(
            grain.clone(),
            handler,
            resilience,
            self.events.clone(),
            Arc::clone(&self.store),
            Arc::clone(&self.scheduler),
        );
        let outcome = actor.run(token).await;
        drop(permit);
        self.finish(&grain, outcome);
    }

    /// Publishes the terminal events of an executed grain and applies the
    /// chain consequences.
    fn finish(self: &Arc<Self>, grain: &Grain, outcome: Outcome) {
        let code = outcome.result.code;
        let completed = self.scheduler().complete(grain.id(), outcome.stage, code);
        let Some(completion) = completed else {
            warn!(grain_id = grain.id(), stage = %outcome.stage, "grain no longer executing, outcome dropped");
            return;
        };
        let lifecycle = |kind: EventKind| {
            Event::new(kind)
                .with_grain(grain.id_arc())
                .with_client_key(grain.client_key().cloned())
                .with_stage(outcome.stage)
                .with_result_code(code)
                .with_payload(outcome.result.payload.clone())
        };

        match outcome.stage {
            Stage::Succeeded if !completion.ready.is_empty() => {
                self.events.publish(lifecycle(EventKind::OnNext));
            }
            Stage::Failed => {
                let reason = outcome.reason.as_deref().unwrap_or("failed");
                self.events
                    .publish(lifecycle(EventKind::OnError).with_reason(reason));
            }
            _ => {}
        }
        info!(grain_id = grain.id(), stage = %outcome.stage, %code, "grain finished");
        self.events.publish(lifecycle(EventKind::OnCompleted));

        self.settle(completion.skipped);
        self.advance(completion.ready);
    }

    /// Cancels a grain that never started (shutdown, closed semaphore).
    fn cancel_pending(&self, id: &str) {
        let decision = self.scheduler().cancel(id);
        match decision {
            CancelDecision::Immediate { cancelled, skipped } => {
                self.settle(std::iter::once(cancelled).chain(skipped));
            }
            CancelDecision::Signal(token) => token.cancel(),
            CancelDecision::NothingToCancel => {}
        }
    }

    /// Publishes `OnCompleted` for grains that ended without running.
    fn settle(&self, settled: impl IntoIterator<Item = Settled>) {
        for s in settled {
            self.gate().remove(&s.id);
            debug!(grain_id = %s.id, stage = %s.stage, "grain settled without running");
            self.events.publish(
                Event::new(EventKind::OnCompleted)
                    .with_grain(s.id)
                    .with_client_key(s.client_key)
                    .with_stage(s.stage)
                    .with_result_code(s.code),
            );
        }
    }

    fn subscriber_listener(&self) {
        if self.subs.is_empty() {
            return;
        }
        let mut rx = self.events.bus().subscribe();
        let set = Arc::clone(&self.subs);
        tokio::spawn(async move {
            loop {
                match rx.recv().await {
                    Ok(ev) => set.emit(&ev),
                    Err(RecvError::Lagged(skipped)) => {
                        warn!(skipped, "subscriber listener lagged behind the bus");
                    }
                    Err(RecvError::Closed) => break,
                }
            }
        });
    }

    fn scheduler(&self) -> MutexGuard<'_, ChainScheduler> {
        self.scheduler.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn gate(&self) -> MutexGuard<'_, DelayGate> {
        self.gate.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// Releases delayed grains when due. One task for the whole gate.
async fn gate_loop(orch: Weak<Orchestrator>, wake: Arc<Notify>, token: CancellationToken) {
    loop {
        let Some(this) = orch.upgrade() else {
            return;
        };
        let next = this.gate().peek_due();
        drop(this);
        let deadline = async {
            match next {
                Some(due) => time::sleep_until(due).await,
                None => std::future::pending::<()>().await,
            }
        };
        tokio::select! {
            _ = token.cancelled() => return,
            _ = wake.notified() => continue,
            _ = deadline => {}
        }

        let Some(this) = orch.upgrade() else {
            return;
        };
        let due = this.gate().pop_due(Instant::now());
        for id in due {
            debug!(grain_id = %id, "delay elapsed");
            this.admit(&id);
        }
    }
}

async fn janitor_loop(orch: Weak<Orchestrator>, period: std::time::Duration, token: CancellationToken) {
    let mut tick = time::interval(period);
    tick.set_missed_tick_behavior(MissedTickBehavior::Delay);
    tick.tick().await;
    loop {
        tokio::select! {
            _ = token.cancelled() => return,
            _ = tick.tick() => {}
        }
        let Some(this) = orch.upgrade() else {
            return;
        };
        this.collect_garbage().await;
    }
}
