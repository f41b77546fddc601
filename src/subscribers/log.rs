//! # LogWriter: event renderer over `tracing`
//!
//! A minimal subscriber that renders incoming [`Event`]s as `tracing` records
//! under the `relayvisor::events` target. Use it for tests or demos.
//!
//! ## Example output
//! ```text
//! [activating] source="prices"
//! [attached] source="prices" consumers=1
//! [draining] source="prices" grace_ms=500
//! [inactive] source="prices"
//! [task-launched] source="detail" key="42" id=3
//! [task-failed] source="detail" key="42" id=3 err="error: disk full"
//! ```

use async_trait::async_trait;

use crate::events::{Event, EventKind};
use crate::subscribers::Subscribe;

const TARGET: &str = "relayvisor::events";

/// Event writer subscriber.
#[derive(Default)]
pub struct LogWriter;

impl LogWriter {
    /// Construct a new [`LogWriter`].
    #[must_use]
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl Subscribe for LogWriter {
    async fn on_event(&self, e: &Event) {
        let source = e.source.as_deref().unwrap_or("-");
        let key = e.key.as_deref().unwrap_or("-");
        match e.kind {
            EventKind::ConsumerAttached => {
                tracing::info!(target: TARGET, "[attached] source={source:?} consumers={:?}", e.consumers);
            }
            EventKind::ConsumerDetached => {
                tracing::info!(target: TARGET, "[detached] source={source:?} consumers={:?}", e.consumers);
            }
            EventKind::ProducerActivating => {
                tracing::info!(target: TARGET, "[activating] source={source:?}");
            }
            EventKind::ProducerActive => {
                tracing::info!(target: TARGET, "[active] source={source:?} consumers={:?}", e.consumers);
            }
            EventKind::ProducerDraining => {
                tracing::info!(target: TARGET, "[draining] source={source:?} grace_ms={:?}", e.delay_ms);
            }
            EventKind::ProducerInactive => {
                tracing::info!(target: TARGET, "[inactive] source={source:?}");
            }
            EventKind::UpstreamCompleted => {
                tracing::info!(target: TARGET, "[completed] source={source:?} closed={:?}", e.consumers);
            }
            EventKind::UpstreamFailed => {
                tracing::warn!(
                    target: TARGET,
                    "[upstream-failed] source={source:?} delivered={:?} err={:?}",
                    e.consumers,
                    e.error
                );
            }
            EventKind::ErrorReported => {
                tracing::warn!(target: TARGET, "[reported] source={source:?} err={:?}", e.error);
            }
            EventKind::TaskLaunched
            | EventKind::TaskStarted
            | EventKind::TaskSkipped
            | EventKind::TaskCancelRequested
            | EventKind::TaskFinished
            | EventKind::TaskCancelled => {
                tracing::info!(
                    target: TARGET,
                    "[{}] source={source:?} key={key:?} id={:?}",
                    task_label(e.kind),
                    e.task_id
                );
            }
            EventKind::TaskFailed => {
                tracing::warn!(
                    target: TARGET,
                    "[task-failed] source={source:?} key={key:?} id={:?} err={:?}",
                    e.task_id,
                    e.error
                );
            }
            EventKind::SubscriberOverflow => {
                tracing::warn!(
                    target: TARGET,
                    "[subscriber-overflow] subscriber={source:?} reason={:?}",
                    e.error
                );
            }
            EventKind::SubscriberPanicked => {
                tracing::error!(
                    target: TARGET,
                    "[subscriber-panicked] subscriber={} info={}",
                    source,
                    e.error.as_deref().unwrap_or("unknown"),
                );
            }
        }
    }

    fn name(&self) -> &'static str {
        "LogWriter"
    }
}

fn task_label(kind: EventKind) -> &'static str {
    match kind {
        EventKind::TaskLaunched => "task-launched",
        EventKind::TaskStarted => "task-started",
        EventKind::TaskSkipped => "task-skipped",
        EventKind::TaskCancelRequested => "task-cancel-requested",
        EventKind::TaskFinished => "task-finished",
        EventKind::TaskCancelled => "task-cancelled",
        _ => "task",
    }
}
