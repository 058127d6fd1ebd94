//! # Per-topic lifecycle streams.
//!
//! [`Orchestrator::subscribe`](crate::Orchestrator::subscribe) returns a
//! [`GrainStream`]: a bounded, ordered channel of lifecycle events for one
//! [`Topic`], fed by a forwarder task that filters the bus.
//!
//! ```text
//! Bus ──► forwarder(topic) ──► [bounded mpsc] ──► GrainStream (futures::Stream)
//!              ▲
//!  LatestTracker (replayed first, `replayed = true`)
//! ```
//!
//! ## Rules
//! - Only lifecycle events are delivered; diagnostics stay on the bus.
//! - A `Topic::Grain` stream ends after that grain's `OnCompleted`.
//! - Per grain, events arrive in `seq` order and at most once.
//! - A full stream applies backpressure to its forwarder only. If the forwarder
//!   falls behind the bus ring buffer, it resyncs from [`LatestTracker`]: the
//!   latest event of every grain in the gap is delivered (`replayed = true`),
//!   so no grain's `OnCompleted` is lost.

use std::collections::HashMap;
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};

use futures::Stream;
use tokio::sync::{broadcast::error::RecvError, mpsc};
use tracing::warn;

use super::{Bus, Event, LatestTracker};

/// Subscription target.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Topic {
    /// One grain by id.
    Grain(String),
    /// Every grain submitted with this client key.
    Client(String),
    /// Every grain.
    All,
}

impl Topic {
    pub fn grain(id: impl Into<String>) -> Self {
        Topic::Grain(id.into())
    }

    pub fn client(key: impl Into<String>) -> Self {
        Topic::Client(key.into())
    }

    fn matches(&self, ev: &Event) -> bool {
        if !ev.kind.is_lifecycle() {
            return false;
        }
        match self {
            Topic::Grain(id) => ev.grain_id.as_deref() == Some(id.as_str()),
            Topic::Client(key) => ev.client_key.as_deref() == Some(key.as_str()),
            Topic::All => true,
        }
    }

    fn closes_on(&self, ev: &Event) -> bool {
        matches!(self, Topic::Grain(_)) && ev.is_terminal()
    }

    /// Cached latest events for this topic. `All` only looks at events from
    /// `floor` on, so grains that finished before the subscription stay out.
    fn cached(&self, latest: &LatestTracker, floor: u64) -> Vec<Event> {
        match self {
            Topic::Grain(id) => latest.latest(id).into_iter().collect(),
            Topic::Client(key) => latest.latest_for_client(key),
            Topic::All => latest.latest_since(floor),
        }
    }
}

/// Ordered stream of lifecycle events for one topic.
pub struct GrainStream {
    rx: mpsc::Receiver<Event>,
}

/// Highest `seq` delivered per grain.
#[derive(Default)]
struct Delivered(HashMap<Arc<str>, u64>);

impl Delivered {
    fn fresh(&mut self, ev: &Event) -> bool {
        let Some(id) = &ev.grain_id else {
            return true;
        };
        match self.0.get(id) {
            Some(seq) if ev.seq <= *seq => false,
            _ => {
                self.0.insert(Arc::clone(id), ev.seq);
                true
            }
        }
    }
}

/// Sends the fresh cached events. Returns false once the stream is done.
async fn resync(
    tx: &mpsc::Sender<Event>,
    topic: &Topic,
    cached: Vec<Event>,
    delivered: &mut Delivered,
) -> bool {
    for ev in cached {
        if !delivered.fresh(&ev) {
            continue;
        }
        let closes = topic.closes_on(&ev);
        if tx.send(ev.replay()).await.is_err() || closes {
            return false;
        }
    }
    true
}

impl GrainStream {
    /// Subscribes to `bus` and spawns the forwarder task.
    ///
    /// The bus receiver is created before the cache is read, so nothing
    /// published in between is lost.
    pub(crate) fn open(
        topic: Topic,
        bus: &Bus,
        latest: &Arc<LatestTracker>,
        capacity: usize,
    ) -> Self {
        let floor = Event::next_seq();
        let mut live = bus.subscribe();
        let replay = match &topic {
            Topic::All => Vec::new(),
            _ => topic.cached(latest, floor),
        };
        let latest = Arc::clone(latest);
        let (tx, rx) = mpsc::channel(capacity.max(1));

        tokio::spawn(async move {
            let mut delivered = Delivered::default();
            if !resync(&tx, &topic, replay, &mut delivered).await {
                return;
            }

            loop {
                let ev = tokio::select! {
                    _ = tx.closed() => return,
                    res = live.recv() => match res {
                        Ok(ev) => ev,
                        Err(RecvError::Lagged(skipped)) => {
                            warn!(?topic, skipped, "grain stream lagged behind the bus, resyncing");
                            let cached = topic.cached(&latest, floor);
                            if !resync(&tx, &topic, cached, &mut delivered).await {
                                return;
                            }
                            continue;
                        }
                        Err(RecvError::Closed) => return,
                    },
                };
                if !topic.matches(&ev) || !delivered.fresh(&ev) {
                    continue;
                }
                let closes = topic.closes_on(&ev);
                if tx.send(ev).await.is_err() || closes {
                    return;
                }
            }
        });

        Self { rx }
    }

    /// Receives the next event; `None` once the stream has ended.
    pub async fn recv(&mut self) -> Option<Event> {
        self.rx.recv().await
    }
}

impl Stream for GrainStream {
    type Item = Event;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Event>> {
        self.rx.poll_recv(cx)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::events::EventKind;
    use futures::StreamExt;
    use std::collections::HashSet;

    fn lifecycle(kind: EventKind, id: &str) -> Event {
        Event::new(kind).with_grain(id)
    }

    #[tokio::test]
    async fn grain_stream_ends_after_completion() {
        let bus = Bus::new(16);
        let latest = Arc::new(LatestTracker::new());
        let mut stream = GrainStream::open(Topic::grain("a"), &bus, &latest, 8);

        bus.publish(lifecycle(EventKind::OnBegin, "a"));
        bus.publish(lifecycle(EventKind::OnBegin, "b"));
        bus.publish(lifecycle(EventKind::AttemptFailed, "a"));
        bus.publish(lifecycle(EventKind::OnCompleted, "a"));

        let kinds: Vec<EventKind> = (&mut stream).map(|e| e.kind).collect().await;
        assert_eq!(kinds, vec![EventKind::OnBegin, EventKind::OnCompleted]);
    }

    #[tokio::test]
    async fn late_subscriber_gets_replay_once() {
        let bus = Bus::new(16);
        let latest = Arc::new(LatestTracker::new());
        let done = lifecycle(EventKind::OnCompleted, "a");
        latest.update(&done);

        let mut stream = GrainStream::open(Topic::grain("a"), &bus, &latest, 8);
        let ev = stream.recv().await.unwrap();
        assert!(ev.replayed);
        assert_eq!(ev.seq, done.seq);
        assert!(stream.recv().await.is_none());
    }

    #[tokio::test]
    async fn client_topic_filters_by_key() {
        let bus = Bus::new(16);
        let latest = Arc::new(LatestTracker::new());
        let mut stream = GrainStream::open(Topic::client("c1"), &bus, &latest, 8);

        let key = Some(Arc::<str>::from("c1"));
        bus.publish(lifecycle(EventKind::OnBegin, "x"));
        bus.publish(lifecycle(EventKind::OnBegin, "y").with_client_key(key.clone()));
        bus.publish(lifecycle(EventKind::OnCompleted, "y").with_client_key(key));

        let first = stream.recv().await.unwrap();
        let second = stream.recv().await.unwrap();
        assert_eq!(first.grain_id.as_deref(), Some("y"));
        assert_eq!(second.kind, EventKind::OnCompleted);
    }

    #[tokio::test]
    async fn lagging_stream_still_sees_every_completion() {
        let bus = Bus::new(8);
        let latest = Arc::new(LatestTracker::new());
        let before = lifecycle(EventKind::OnCompleted, "old");
        latest.update(&before);

        let mut stream = GrainStream::open(Topic::All, &bus, &latest, 1);
        for n in 0..50 {
            let id = format!("g{n}");
            for kind in [EventKind::OnBegin, EventKind::OnCompleted] {
                let ev = lifecycle(kind, &id);
                latest.update(&ev);
                bus.publish(ev);
            }
        }

        let mut done = HashSet::new();
        while done.len() < 50 {
            let ev = stream.recv().await.unwrap();
            if ev.is_terminal() {
                assert!(done.insert(ev.grain_id.clone().unwrap()), "duplicate completion");
            }
        }
        assert!(!done.contains("old"));
    }
}
