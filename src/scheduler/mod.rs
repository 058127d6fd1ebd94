//! # Chain scheduler: grain table, dependency ordering and failure propagation.
//!
//! [`ChainScheduler`] is the single source of truth for grain stages. It is a
//! plain synchronous state machine; the orchestrator wraps it in a mutex that
//! is held only for bookkeeping, never across handler execution.
//!
//! ```text
//! insert ─► Seeded / Delayed
//!              │ release
//!              ├─► Queued ──── start ──► Running ⇄ Checkpointed ── complete ─► Succeeded
//!              ├─► unchanged (waiting on a dependency)                      ├─► Failed
//!              └─► SkippedDueToDependency (dependency failed / unknown)     └─► Cancelled
//!
//! complete(Succeeded) ─► dependents whose dependencies all succeeded ─► Queued (FIFO)
//! complete(otherwise) ─► every transitive dependent ─► SkippedDueToDependency
//! ```
//!
//! ## Chains
//! A grain with a `chain_key` and no declared dependency implicitly depends on
//! the previously submitted member of the same chain. Chains are independent of
//! each other; within a chain only one predecessor/successor edge is active.
//!
//! A `Delayed` grain released while a dependency is pending stays `Delayed`
//! until the dependency settles; stages never move backwards.
//!
//! ## Rules
//! - A non-terminal id cannot be inserted again; a terminal one is replaced.
//! - A grain that would close a dependency cycle is rejected.
//! - `Running` is exclusive: `start` succeeds once per lifecycle.
//! - Terminal stages are final.
//! - `Warning` results unblock dependents like `Success`.

mod entry;
mod error;

use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::Arc;
use std::time::Duration;

use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::debug;

use crate::grains::{Grain, ResultCode, Stage};

use entry::Entry;
pub use entry::Settled;
pub use error::{AdmissionError, TerminateError};

/// Result of releasing a grain into the scheduler.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Admission {
    /// Every dependency succeeded; the grain is `Queued`.
    Ready,
    /// At least one dependency is still pending; the grain keeps its stage.
    Waiting,
    /// A dependency failed or never existed. The grain comes first, followed by
    /// its transitive dependents.
    Skipped(Vec<Settled>),
    /// The grain is gone or no longer pending (cancelled meanwhile).
    Stale,
}

/// Consequences of a grain reaching a terminal stage.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct Completion {
    /// Dependents now `Queued`, in submission order.
    pub ready: Vec<Arc<str>>,
    /// Dependents moved to `SkippedDueToDependency`, in propagation order.
    pub skipped: Vec<Settled>,
}

/// What a terminate request did.
#[derive(Debug, Clone)]
pub enum CancelDecision {
    /// The grain had not started; it is `Cancelled` now.
    Immediate {
        cancelled: Settled,
        skipped: Vec<Settled>,
    },
    /// The grain is executing; cancel this token and let the actor stop.
    Signal(CancellationToken),
    /// Unknown or already terminal.
    NothingToCancel,
}

/// Read-only view of one grain.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GrainSnapshot {
    pub id: Arc<str>,
    pub type_name: String,
    pub stage: Stage,
    pub code: ResultCode,
    pub chain_key: Option<String>,
    pub client_key: Option<Arc<str>>,
    pub depends_on: Vec<String>,
}

/// Dependency state of a grain at one instant.
enum Readiness {
    Ready,
    Pending(Vec<String>),
    Broken,
}

/// Grain table with dependency and chain bookkeeping.
#[derive(Default)]
pub struct ChainScheduler {
    entries: HashMap<Arc<str>, Entry>,
    /// dependency id → ids that wait on it.
    dependents: HashMap<Arc<str>, Vec<Arc<str>>>,
    /// chain key → last submitted member.
    chain_tail: HashMap<String, Arc<str>>,
    next_seq: u64,
}

impl ChainScheduler {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a grain as `Delayed` (if `delayed`) or `Seeded`.
    ///
    /// Links the implicit chain predecessor and records dependency edges to
    /// already-known grains.
    pub fn insert(&mut self, mut grain: Grain, delayed: bool) -> Result<Stage, AdmissionError> {
        let id = grain.id_arc();
        if id.is_empty() {
            return Err(AdmissionError::EmptyId);
        }
        if grain.depends_on().iter().any(|d| **d == *id) {
            return Err(AdmissionError::SelfDependency { id: id.to_string() });
        }
        if let Some(old) = self.entries.get(&id)
            && !old.stage.is_terminal()
        {
            return Err(AdmissionError::Duplicate { id: id.to_string() });
        }
        self.check_chains(&grain)?;

        let chain_key = grain.chain_key().map(str::to_string);
        if let Some(tail) = chain_key.as_ref().and_then(|key| self.chain_tail.get(key))
            && **tail != *id
        {
            grain.link_predecessor(tail);
        }
        if let Some(through) = self.cycle_through(&id, grain.depends_on()) {
            return Err(AdmissionError::Cycle {
                id: id.to_string(),
                through,
            });
        }
        if let Some(key) = chain_key {
            self.chain_tail.insert(key, Arc::clone(&id));
        }

        for dep in grain.depends_on() {
            if let Some((dep_id, _)) = self.entries.get_key_value(dep.as_str()) {
                let dep_id = Arc::clone(dep_id);
                self.add_edge(dep_id, &id);
            }
        }

        let stage = if delayed { Stage::Delayed } else { Stage::Seeded };
        self.next_seq += 1;
        if self.entries.remove(&id).is_some() {
            debug!(grain_id = %id, "terminal grain resubmitted");
        }
        self.entries
            .insert(Arc::clone(&id), Entry::new(grain, stage, self.next_seq));
        Ok(stage)
    }

    /// Evaluates the dependencies of a grain leaving the delay gate (or
    /// admitted without delay).
    pub fn release(&mut self, id: &str) -> Admission {
        let Some(entry) = self.entries.get(id) else {
            return Admission::Stale;
        };
        if !entry.is_pending() {
            return Admission::Stale;
        }
        let id = entry.grain.id_arc();

        match self.readiness(&id) {
            Readiness::Ready => {
                self.set_stage(&id, Stage::Queued);
                Admission::Ready
            }
            Readiness::Pending(deps) => {
                for dep in deps {
                    if let Some((dep_id, _)) = self.entries.get_key_value(dep.as_str()) {
                        let dep_id = Arc::clone(dep_id);
                        self.add_edge(dep_id, &id);
                    }
                }
                if let Some(entry) = self.entries.get_mut(&id) {
                    entry.delay_elapsed = true;
                }
                Admission::Waiting
            }
            Readiness::Broken => {
                let now = Instant::now();
                let mut out = Vec::new();
                if let Some(entry) = self.entries.get_mut(&id)
                    && entry.finish(Stage::SkippedDueToDependency, ResultCode::Failed, now)
                {
                    out.push(entry.settled());
                }
                out.extend(self.skip_dependents(&id, now));
                Admission::Skipped(out)
            }
        }
    }

    /// Attaches the cancel token of the actor spawned for a `Queued` grain.
    pub fn attach(&mut self, id: &str, token: CancellationToken) {
        if let Some(entry) = self.entries.get_mut(id)
            && entry.stage == Stage::Queued
        {
            entry.token = Some(token);
        }
    }

    /// Exclusive `Queued → Running`. Returns the grain to execute.
    pub fn start(&mut self, id: &str) -> Option<Grain> {
        let entry = self.entries.get_mut(id)?;
        if entry.stage != Stage::Queued {
            return None;
        }
        entry.stage = Stage::Running;
        Some(entry.grain.clone())
    }

    /// `Running → Checkpointed`.
    pub fn checkpointed(&mut self, id: &str) -> bool {
        self.transition(id, Stage::Running, Stage::Checkpointed)
    }

    /// `Checkpointed → Running`.
    pub fn resumed(&mut self, id: &str) -> bool {
        self.transition(id, Stage::Checkpointed, Stage::Running)
    }

    /// Records the terminal stage of an executing grain and propagates it.
    ///
    /// Returns `None` if the grain is unknown or not executing; nothing changed.
    pub fn complete(&mut self, id: &str, stage: Stage, code: ResultCode) -> Option<Completion> {
        let now = Instant::now();
        let entry = self.entries.get_mut(id)?;
        if !entry.stage.is_executing() || !entry.finish(stage, code, now) {
            return None;
        }
        let id = entry.grain.id_arc();

        Some(if stage.unblocks_dependents() {
            self.unblock_dependents(&id, now)
        } else {
            Completion {
                ready: Vec::new(),
                skipped: self.skip_dependents(&id, now),
            }
        })
    }

    /// Cancels a grain that has not started, or hands back the token of an
    /// executing one.
    pub fn cancel(&mut self, id: &str) -> CancelDecision {
        let now = Instant::now();
        let Some(entry) = self.entries.get_mut(id) else {
            return CancelDecision::NothingToCancel;
        };
        let stage = entry.stage;
        match stage {
            Stage::Seeded | Stage::Delayed | Stage::Queued => {
                if let Some(token) = entry.token.take() {
                    token.cancel();
                }
                entry.finish(Stage::Cancelled, ResultCode::Cancelled, now);
                let cancelled = entry.settled();
                let id = entry.grain.id_arc();
                let skipped = self.skip_dependents(&id, now);
                CancelDecision::Immediate { cancelled, skipped }
            }
            Stage::Running | Stage::Checkpointed => match &entry.token {
                Some(token) => CancelDecision::Signal(token.clone()),
                None => CancelDecision::NothingToCancel,
            },
            _ => CancelDecision::NothingToCancel,
        }
    }

    pub fn stage(&self, id: &str) -> Option<Stage> {
        self.entries.get(id).map(|e| e.stage)
    }

    pub fn snapshot(&self, id: &str) -> Option<GrainSnapshot> {
        self.entries.get(id).map(|e| GrainSnapshot {
            id: e.grain.id_arc(),
            type_name: e.grain.type_name().to_string(),
            stage: e.stage,
            code: e.code,
            chain_key: e.grain.chain_key().map(str::to_string),
            client_key: e.grain.client_key().cloned(),
            depends_on: e.grain.depends_on().to_vec(),
        })
    }

    /// Sorted ids of grains with an execution attempt in flight.
    pub fn executing(&self) -> Vec<String> {
        let mut ids: Vec<String> = self
            .entries
            .values()
            .filter(|e| e.stage.is_executing())
            .map(|e| e.grain.id().to_string())
            .collect();
        ids.sort_unstable();
        ids
    }

    /// Ids of grains that never started, oldest submission first.
    pub fn unfinished(&self) -> Vec<Arc<str>> {
        let mut waiting: Vec<&Entry> = self
            .entries
            .values()
            .filter(|e| e.is_pending() || e.stage == Stage::Queued)
            .collect();
        waiting.sort_unstable_by_key(|e| e.seq);
        waiting.into_iter().map(|e| e.grain.id_arc()).collect()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Drops terminal grains that finished at least `retention` before `now`.
    ///
    /// Returns the purged ids; their checkpoints are the caller's to remove.
    pub fn purge_expired(&mut self, now: Instant, retention: Duration) -> Vec<Arc<str>> {
        let expired: Vec<Arc<str>> = self
            .entries
            .iter()
            .filter(|(_, e)| {
                e.finished_at
                    .is_some_and(|at| now.saturating_duration_since(at) >= retention)
            })
            .map(|(id, _)| Arc::clone(id))
            .collect();

        for id in &expired {
            self.entries.remove(id);
            self.dependents.remove(id);
        }
        if !expired.is_empty() {
            let gone: HashSet<&str> = expired.iter().map(|id| &**id).collect();
            self.chain_tail.retain(|_, tail| !gone.contains(&**tail));
        }
        expired
    }

    fn check_chains(&self, grain: &Grain) -> Result<(), AdmissionError> {
        let mut seen: Option<&str> = None;
        for dep in grain.depends_on() {
            let Some(chain) = self.entries.get(dep.as_str()).and_then(|e| e.grain.chain_key())
            else {
                continue;
            };
            match seen {
                Some(first) if first != chain => {
                    return Err(AdmissionError::CrossChainDependency {
                        id: grain.id().to_string(),
                        first: first.to_string(),
                        second: chain.to_string(),
                    });
                }
                _ => seen = Some(chain),
            }
        }
        Ok(())
    }

    /// Walks the pending dependencies reachable from `deps`. Returns the
    /// dependency of `id` through which the walk leads back to `id`.
    fn cycle_through(&self, id: &str, deps: &[String]) -> Option<String> {
        for first in deps {
            let mut seen: HashSet<&str> = HashSet::new();
            let mut stack: Vec<&str> = vec![first.as_str()];
            while let Some(cur) = stack.pop() {
                if cur == id {
                    return Some(first.clone());
                }
                if !seen.insert(cur) {
                    continue;
                }
                let Some(entry) = self.entries.get(cur) else {
                    continue;
                };
                if entry.stage.is_terminal() {
                    continue;
                }
                stack.extend(entry.grain.depends_on().iter().map(String::as_str));
            }
        }
        None
    }

    fn readiness(&self, id: &str) -> Readiness {
        let Some(entry) = self.entries.get(id) else {
            return Readiness::Broken;
        };
        let mut pending = Vec::new();
        for dep in entry.grain.depends_on() {
            match self.entries.get(dep.as_str()).map(|d| d.stage) {
                None => return Readiness::Broken,
                Some(s) if s.unblocks_dependents() => {}
                Some(s) if s.is_terminal() => return Readiness::Broken,
                Some(_) => pending.push(dep.clone()),
            }
        }
        if pending.is_empty() {
            Readiness::Ready
        } else {
            Readiness::Pending(pending)
        }
    }

    fn unblock_dependents(&mut self, id: &Arc<str>, now: Instant) -> Completion {
        let waiting = self.dependents.remove(id).unwrap_or_default();
        let mut ready: Vec<(u64, Arc<str>)> = Vec::new();
        let mut skipped = Vec::new();

        for dep_id in waiting {
            let Some(entry) = self.entries.get(&dep_id) else {
                continue;
            };
            // Delayed dependents still in the gate evaluate on release.
            if !entry.awaits_dependencies() || !entry.waits_on(id) {
                continue;
            }
            let seq = entry.seq;
            match self.readiness(&dep_id) {
                Readiness::Ready => {
                    self.set_stage(&dep_id, Stage::Queued);
                    ready.push((seq, dep_id));
                }
                Readiness::Pending(_) => {}
                Readiness::Broken => {
                    if let Some(entry) = self.entries.get_mut(&dep_id)
                        && entry.finish(Stage::SkippedDueToDependency, ResultCode::Failed, now)
                    {
                        skipped.push(entry.settled());
                    }
                    skipped.extend(self.skip_dependents(&dep_id, now));
                }
            }
        }

        ready.sort_unstable_by_key(|(seq, _)| *seq);
        Completion {
            ready: ready.into_iter().map(|(_, id)| id).collect(),
            skipped,
        }
    }

    /// Moves every transitive dependent of `root` that has not started to
    /// `SkippedDueToDependency` (breadth-first).
    fn skip_dependents(&mut self, root: &Arc<str>, now: Instant) -> Vec<Settled> {
        let mut out = Vec::new();
        let mut queue = VecDeque::from([Arc::clone(root)]);

        while let Some(cur) = queue.pop_front() {
            for dep_id in self.dependents.remove(&cur).unwrap_or_default() {
                let Some(entry) = self.entries.get_mut(&dep_id) else {
                    continue;
                };
                if !entry.waits_on(&cur) {
                    continue;
                }
                if entry.finish(Stage::SkippedDueToDependency, ResultCode::Failed, now) {
                    out.push(entry.settled());
                    queue.push_back(dep_id);
                }
            }
        }
        out
    }

    fn add_edge(&mut self, dep: Arc<str>, id: &Arc<str>) {
        let list = self.dependents.entry(dep).or_default();
        if !list.contains(id) {
            list.push(Arc::clone(id));
        }
    }

    fn set_stage(&mut self, id: &str, stage: Stage) {
        if let Some(entry) = self.entries.get_mut(id)
            && (entry.stage == stage || entry.stage.can_transition_to(stage))
        {
            entry.stage = stage;
        }
    }

    fn transition(&mut self, id: &str, from: Stage, to: Stage) -> bool {
        match self.entries.get_mut(id) {
            Some(entry) if entry.stage == from => {
                entry.stage = to;
                true
            }
            _ => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn grain(id: &str) -> Grain {
        Grain::new(id, "t")
    }

    fn ids(settled: &[Settled]) -> Vec<&str> {
        settled.iter().map(|s| &*s.id).collect()
    }

    fn run(s: &mut ChainScheduler, id: &str) {
        assert_eq!(s.release(id), Admission::Ready);
        assert!(s.start(id).is_some());
    }

    #[test]
    fn independent_grain_is_queued_on_release() {
        let mut s = ChainScheduler::new();
        assert_eq!(s.insert(grain("a"), false), Ok(Stage::Seeded));
        assert_eq!(s.release("a"), Admission::Ready);
        assert_eq!(s.stage("a"), Some(Stage::Queued));
    }

    #[test]
    fn start_is_exclusive() {
        let mut s = ChainScheduler::new();
        s.insert(grain("a"), false).unwrap();
        s.release("a");
        assert!(s.start("a").is_some());
        assert!(s.start("a").is_none());
        assert_eq!(s.stage("a"), Some(Stage::Running));
    }

    #[test]
    fn duplicate_non_terminal_is_rejected() {
        let mut s = ChainScheduler::new();
        s.insert(grain("a"), true).unwrap();
        assert_eq!(
            s.insert(grain("a"), false),
            Err(AdmissionError::Duplicate { id: "a".into() })
        );
    }

    #[test]
    fn terminal_grain_may_be_resubmitted() {
        let mut s = ChainScheduler::new();
        s.insert(grain("a"), false).unwrap();
        run(&mut s, "a");
        s.complete("a", Stage::Failed, ResultCode::Error);
        assert_eq!(s.insert(grain("a"), false), Ok(Stage::Seeded));
    }

    #[test]
    fn self_dependency_is_rejected() {
        let mut s = ChainScheduler::new();
        let err = s.insert(grain("a").depends_on_id("a"), false);
        assert_eq!(err, Err(AdmissionError::SelfDependency { id: "a".into() }));
        assert_eq!(s.insert(grain(""), false), Err(AdmissionError::EmptyId));
    }

    #[test]
    fn chain_members_run_in_submission_order() {
        let mut s = ChainScheduler::new();
        for id in ["a", "b", "c"] {
            s.insert(grain(id).with_chain("k"), false).unwrap();
        }
        assert_eq!(s.release("a"), Admission::Ready);
        assert_eq!(s.release("b"), Admission::Waiting);
        assert_eq!(s.release("c"), Admission::Waiting);

        s.start("a");
        let done = s.complete("a", Stage::Succeeded, ResultCode::Success).unwrap();
        assert_eq!(done.ready, vec![Arc::<str>::from("b")]);
        assert_eq!(s.stage("c"), Some(Stage::Seeded));
    }

    #[test]
    fn failure_skips_the_whole_chain_suffix() {
        let mut s = ChainScheduler::new();
        for id in ["a", "b", "c"] {
            s.insert(grain(id).with_chain("k"), false).unwrap();
            s.release(id);
        }
        s.start("a");
        let done = s.complete("a", Stage::Failed, ResultCode::Error).unwrap();
        assert!(done.ready.is_empty());
        assert_eq!(ids(&done.skipped), vec!["b", "c"]);
        assert_eq!(s.stage("c"), Some(Stage::SkippedDueToDependency));
        assert!(s.start("b").is_none());
    }

    #[test]
    fn warning_unblocks_dependents() {
        let mut s = ChainScheduler::new();
        s.insert(grain("a"), false).unwrap();
        s.insert(grain("b").depends_on_id("a"), false).unwrap();
        run(&mut s, "a");
        assert_eq!(s.release("b"), Admission::Waiting);
        let done = s.complete("a", Stage::Succeeded, ResultCode::Warning).unwrap();
        assert_eq!(done.ready, vec![Arc::<str>::from("b")]);
    }

    #[test]
    fn unknown_dependency_skips_on_release() {
        let mut s = ChainScheduler::new();
        s.insert(grain("b").depends_on_id("ghost"), false).unwrap();
        let Admission::Skipped(list) = s.release("b") else {
            panic!("expected skip");
        };
        assert_eq!(ids(&list), vec!["b"]);
        assert_eq!(list[0].code, ResultCode::Failed);
    }

    #[test]
    fn released_ties_are_fifo() {
        let mut s = ChainScheduler::new();
        s.insert(grain("root"), false).unwrap();
        for id in ["x", "y", "z"] {
            s.insert(grain(id).depends_on_id("root"), false).unwrap();
        }
        run(&mut s, "root");
        for id in ["z", "x", "y"] {
            assert_eq!(s.release(id), Admission::Waiting);
        }
        let done = s.complete("root", Stage::Succeeded, ResultCode::Success).unwrap();
        let ready: Vec<&str> = done.ready.iter().map(|i| &**i).collect();
        assert_eq!(ready, vec!["x", "y", "z"]);
    }

    #[test]
    fn cancel_by_stage() {
        let mut s = ChainScheduler::new();
        s.insert(grain("d"), true).unwrap();
        s.insert(grain("dep").depends_on_id("d"), false).unwrap();
        let CancelDecision::Immediate { cancelled, skipped } = s.cancel("d") else {
            panic!("expected immediate cancel");
        };
        assert_eq!(cancelled.stage, Stage::Cancelled);
        assert_eq!(ids(&skipped), vec!["dep"]);
        assert_eq!(s.stage("dep"), Some(Stage::SkippedDueToDependency));

        s.insert(grain("r"), false).unwrap();
        s.release("r");
        let token = CancellationToken::new();
        s.attach("r", token.clone());
        s.start("r");
        match s.cancel("r") {
            CancelDecision::Signal(t) => {
                t.cancel();
                assert!(token.is_cancelled());
            }
            other => panic!("unexpected {other:?}"),
        }
        assert!(matches!(s.cancel("d"), CancelDecision::NothingToCancel));
        assert!(matches!(s.cancel("nope"), CancelDecision::NothingToCancel));
    }

    #[test]
    fn cancelling_a_waiting_grain_skips_its_dependents() {
        let mut s = ChainScheduler::new();
        s.insert(grain("a"), false).unwrap();
        s.insert(grain("b").depends_on_id("a"), false).unwrap();
        s.insert(grain("c").depends_on_id("b"), false).unwrap();
        s.release("a");
        s.release("b");
        s.release("c");
        let CancelDecision::Immediate { skipped, .. } = s.cancel("b") else {
            panic!("expected immediate cancel");
        };
        assert_eq!(ids(&skipped), vec!["c"]);
    }

    #[test]
    fn cross_chain_dependencies_are_rejected() {
        let mut s = ChainScheduler::new();
        s.insert(grain("a").with_chain("k1"), false).unwrap();
        s.insert(grain("b").with_chain("k2"), false).unwrap();
        let err = s.insert(grain("c").with_depends_on(["a", "b"]), false);
        assert!(matches!(err, Err(AdmissionError::CrossChainDependency { .. })));
    }

    #[test]
    fn checkpoint_loop() {
        let mut s = ChainScheduler::new();
        s.insert(grain("a"), false).unwrap();
        run(&mut s, "a");
        assert!(s.checkpointed("a"));
        assert!(!s.checkpointed("a"));
        assert!(s.resumed("a"));
        assert_eq!(s.executing(), vec!["a".to_string()]);
    }

    #[test]
    fn unfinished_lists_grains_that_never_started() {
        let mut s = ChainScheduler::new();
        s.insert(grain("running"), false).unwrap();
        run(&mut s, "running");
        s.insert(grain("later"), true).unwrap();
        s.insert(grain("queued"), false).unwrap();
        s.release("queued");
        let unfinished = s.unfinished();
        let ids: Vec<&str> = unfinished.iter().map(|id| &**id).collect();
        assert_eq!(ids, vec!["later", "queued"]);
    }

    #[test]
    fn completing_a_grain_that_is_not_executing_changes_nothing() {
        let mut s = ChainScheduler::new();
        s.insert(grain("a"), false).unwrap();
        s.insert(grain("b").depends_on_id("a"), false).unwrap();
        s.release("a");
        assert!(s.complete("a", Stage::Failed, ResultCode::Error).is_none());
        assert_eq!(s.stage("a"), Some(Stage::Queued));

        s.start("a");
        assert!(s.complete("a", Stage::Succeeded, ResultCode::Success).is_some());
        assert!(s.complete("a", Stage::Failed, ResultCode::Error).is_none());
        assert_eq!(s.stage("a"), Some(Stage::Succeeded));
        assert!(s.complete("ghost", Stage::Succeeded, ResultCode::Success).is_none());
    }

    #[test]
    fn delayed_grain_stays_delayed_while_its_dependency_runs() {
        let mut s = ChainScheduler::new();
        s.insert(grain("a"), false).unwrap();
        run(&mut s, "a");
        s.insert(grain("b").depends_on_id("a"), true).unwrap();

        assert_eq!(s.release("b"), Admission::Waiting);
        assert_eq!(s.stage("b"), Some(Stage::Delayed));
        assert_eq!(s.unfinished(), vec![Arc::<str>::from("b")]);

        let done = s.complete("a", Stage::Succeeded, ResultCode::Success).unwrap();
        assert_eq!(done.ready, vec![Arc::<str>::from("b")]);
        assert_eq!(s.stage("b"), Some(Stage::Queued));
    }

    #[test]
    fn delayed_grain_still_in_the_gate_waits_for_release() {
        let mut s = ChainScheduler::new();
        s.insert(grain("a"), false).unwrap();
        run(&mut s, "a");
        s.insert(grain("b").depends_on_id("a"), true).unwrap();

        let done = s.complete("a", Stage::Succeeded, ResultCode::Success).unwrap();
        assert!(done.ready.is_empty());
        assert_eq!(s.stage("b"), Some(Stage::Delayed));
        assert_eq!(s.release("b"), Admission::Ready);
    }

    #[test]
    fn dependency_cycles_are_rejected() {
        let mut s = ChainScheduler::new();
        s.insert(grain("b").depends_on_id("a"), true).unwrap();
        assert_eq!(
            s.insert(grain("a").depends_on_id("b"), false),
            Err(AdmissionError::Cycle {
                id: "a".into(),
                through: "b".into()
            })
        );
        assert_eq!(s.stage("a"), None);

        // longer loop, closed by the implicit chain predecessor
        s.insert(grain("x").depends_on_id("z"), true).unwrap();
        s.insert(grain("y").depends_on_id("x").with_chain("k"), false).unwrap();
        let err = s.insert(grain("z").with_chain("k"), false);
        assert!(matches!(err, Err(AdmissionError::Cycle { .. })));

        // the rejected grain did not become the chain tail
        s.insert(grain("w").with_chain("k"), false).unwrap();
        assert_eq!(s.snapshot("w").unwrap().depends_on, vec!["y".to_string()]);
    }

    #[test]
    fn finished_grains_do_not_close_cycles() {
        let mut s = ChainScheduler::new();
        s.insert(grain("b").depends_on_id("a"), false).unwrap();
        let Admission::Skipped(_) = s.release("b") else {
            panic!("expected skip");
        };
        assert_eq!(s.insert(grain("a").depends_on_id("b"), false), Ok(Stage::Seeded));
    }

    #[tokio::test(start_paused = true)]
    async fn purge_drops_expired_terminal_grains() {
        let mut s = ChainScheduler::new();
        s.insert(grain("a").with_chain("k"), false).unwrap();
        run(&mut s, "a");
        s.complete("a", Stage::Succeeded, ResultCode::Success);
        s.insert(grain("live"), true).unwrap();

        let ttl = Duration::from_secs(60);
        assert!(s.purge_expired(Instant::now(), ttl).is_empty());
        tokio::time::advance(ttl).await;
        let purged = s.purge_expired(Instant::now(), ttl);
        assert_eq!(purged, vec![Arc::<str>::from("a")]);
        assert_eq!(s.len(), 1);

        // the retired chain starts over
        s.insert(grain("b").with_chain("k"), false).unwrap();
        assert_eq!(s.release("b"), Admission::Ready);
    }
}
