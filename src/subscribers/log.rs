//! # Logging subscriber.
//!
//! [`LogWriter`] renders bus events through `tracing`: lifecycle at `info`,
//! retries at `debug`, failures and subscriber faults at `warn`. The host
//! application decides where the records go by installing a `tracing`
//! subscriber; the library never installs one.

use async_trait::async_trait;
use tracing::{debug, info, warn};

use crate::events::{Event, EventKind};
use crate::subscribers::Subscribe;

/// `tracing`-backed event logger.
#[derive(Debug, Default, Clone, Copy)]
pub struct LogWriter;

#[async_trait]
impl Subscribe for LogWriter {
    async fn on_event(&self, e: &Event) {
        let grain = e.grain_id.as_deref().unwrap_or("-");
        let stage = e.stage.map(|s| s.as_label()).unwrap_or("-");
        match e.kind {
            EventKind::OnBegin => info!(grain, attempt = ?e.attempt, "grain started"),
            EventKind::OnNext => info!(grain, step = ?e.step, code = ?e.result_code, "grain progressed"),
            EventKind::OnError => {
                warn!(grain, code = ?e.result_code, reason = ?e.reason, "grain failed")
            }
            EventKind::OnCompleted => {
                info!(grain, stage, code = ?e.result_code, replayed = e.replayed, "grain completed")
            }
            EventKind::AttemptFailed => {
                debug!(grain, attempt = ?e.attempt, step = ?e.step, reason = ?e.reason, "attempt failed")
            }
            EventKind::TimeoutHit => {
                debug!(grain, attempt = ?e.attempt, timeout_ms = ?e.timeout_ms, "attempt timed out")
            }
            EventKind::BackoffScheduled => {
                debug!(grain, delay_ms = ?e.delay_ms, after_attempt = ?e.attempt, "retry scheduled")
            }
            EventKind::SubscriberOverflow | EventKind::SubscriberPanicked => {
                warn!(kind = e.kind.as_label(), reason = ?e.reason, "subscriber fault")
            }
            EventKind::ShutdownRequested => info!("shutdown requested"),
            EventKind::AllStoppedWithin => info!("all grains stopped within grace"),
            EventKind::GraceExceeded => warn!(stuck = ?e.reason, "grace exceeded"),
        }
    }

    fn name(&self) -> &'static str {
        "log_writer"
    }
}
