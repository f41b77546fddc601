//! # Lifecycle events emitted by gates, relays and supervisors.
//!
//! The [`EventKind`] enum classifies event types across four categories:
//! - **Consumer events**: attach/detach on a gate or relay
//! - **Producer events**: activation state machine transitions
//! - **Task events**: keyed supervisor ownership changes
//! - **Subscriber events**: delivery problems inside [`SubscriberSet`](crate::SubscriberSet)
//!
//! The [`Event`] struct carries additional metadata such as timestamps, the
//! emitting component, the resource key and error messages.
//!
//! ## Ordering guarantees
//! [`Bus::publish`](crate::Bus::publish) stamps each event with a per-bus
//! sequence number (`seq`) that increases monotonically. Use `seq` to restore
//! the exact order when events are delivered out of order.
//!
//! ## Example
//! ```rust
//! use std::time::Duration;
//! use relayvisor::{Event, EventKind};
//!
//! let ev = Event::new(EventKind::ProducerDraining)
//!     .with_source("prices")
//!     .with_consumers(0)
//!     .with_delay(Duration::from_millis(500));
//!
//! assert_eq!(ev.kind, EventKind::ProducerDraining);
//! assert_eq!(ev.source.as_deref(), Some("prices"));
//! assert_eq!(ev.delay_ms, Some(500));
//! ```

use std::sync::Arc;
use std::time::{Duration, SystemTime};

/// Classification of runtime events.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EventKind {
    // === Subscriber events ===
    /// Subscriber panicked during event processing.
    ///
    /// Sets:
    /// - `source`: subscriber name
    /// - `error`: panic info/message
    SubscriberPanicked,

    /// Subscriber dropped an event (queue full or worker closed).
    ///
    /// Sets:
    /// - `source`: subscriber name
    /// - `error`: reason string (e.g., "full", "closed")
    SubscriberOverflow,

    // === Consumer events ===
    /// A consumer attached to a gate or relay.
    ///
    /// Sets:
    /// - `source`: gate/relay name
    /// - `consumers`: consumer count after the attach
    ConsumerAttached,

    /// A consumer detached from a gate or relay.
    ///
    /// Sets:
    /// - `source`: gate/relay name
    /// - `consumers`: consumer count after the detach
    ConsumerDetached,

    // === Producer events ===
    /// First consumer attached; activation routine is starting.
    ///
    /// Sets:
    /// - `source`: gate/relay name
    ProducerActivating,

    /// Activation routine returned successfully (or a drain was aborted by a reattach).
    ///
    /// Sets:
    /// - `source`: gate/relay name
    /// - `consumers`: consumer count
    ProducerActive,

    /// Last consumer detached; teardown is deferred by the grace period.
    ///
    /// Sets:
    /// - `source`: gate/relay name
    /// - `delay_ms`: grace period (ms)
    ProducerDraining,

    /// Producer was torn down.
    ///
    /// Sets:
    /// - `source`: gate/relay name
    ProducerInactive,

    /// Upstream signalled end-of-stream; consumer inboxes were closed.
    ///
    /// Sets:
    /// - `source`: gate/relay name
    /// - `consumers`: number of inboxes closed
    UpstreamCompleted,

    /// Activation or upstream failure.
    ///
    /// Sets:
    /// - `source`: gate/relay name
    /// - `consumers`: number of consumers the error was delivered to
    /// - `error`: failure message
    UpstreamFailed,

    /// A failure had no consumer to go to and was handed to the error reporter.
    ///
    /// Sets:
    /// - `source`: gate/relay/supervisor name
    /// - `error`: failure message
    ErrorReported,

    // === Task events ===
    /// A body was submitted as the new owner of a key.
    ///
    /// Sets:
    /// - `source`: supervisor name
    /// - `key`: resource key (debug formatted)
    /// - `task_id`: new owner id
    TaskLaunched,

    /// Predecessor unwound; body is starting.
    ///
    /// Sets:
    /// - `source`, `key`, `task_id`
    TaskStarted,

    /// Body never ran because its owner was cancelled while waiting for the predecessor.
    ///
    /// Sets:
    /// - `source`, `key`, `task_id`
    TaskSkipped,

    /// Cancellation of a key owner was requested.
    ///
    /// Sets:
    /// - `source`, `key`, `task_id`
    TaskCancelRequested,

    /// Body finished successfully.
    ///
    /// Sets:
    /// - `source`, `key`, `task_id`
    TaskFinished,

    /// Body unwound after cancellation.
    ///
    /// Sets:
    /// - `source`, `key`, `task_id`
    TaskCancelled,

    /// Body returned an error.
    ///
    /// Sets:
    /// - `source`, `key`, `task_id`
    /// - `error`: failure message
    TaskFailed,
}

/// Runtime event with optional metadata.
///
/// - `seq`: per-bus monotonic sequence (assigned on publish)
/// - `at`: wall-clock timestamp (for logs)
/// - other optional fields are set depending on the [`EventKind`]
#[derive(Clone, Debug)]
pub struct Event {
    /// Monotonically increasing sequence number (0 until published).
    pub seq: u64,
    /// Wall-clock timestamp.
    pub at: SystemTime,
    /// Event classification.
    pub kind: EventKind,

    /// Name of the emitting gate, relay, supervisor or subscriber.
    pub source: Option<Arc<str>>,
    /// Resource key (debug formatted), for task events.
    pub key: Option<Arc<str>>,
    /// Owner id, for task events.
    pub task_id: Option<u64>,
    /// Consumer count at the time of the event.
    pub consumers: Option<usize>,
    /// Grace period in milliseconds (compact).
    pub delay_ms: Option<u32>,
    /// Human-readable error (failures, overflow details, etc.).
    pub error: Option<Arc<str>>,
}

impl Event {
    /// Creates a new event of the given kind with current timestamp.
    pub fn new(kind: EventKind) -> Self {
        Self {
            seq: 0,
            at: SystemTime::now(),
            kind,
            source: None,
            key: None,
            task_id: None,
            consumers: None,
            delay_ms: None,
            error: None,
        }
    }

    /// Attaches the emitting component's name.
    #[inline]
    pub fn with_source(mut self, source: impl Into<Arc<str>>) -> Self {
        self.source = Some(source.into());
        self
    }

    /// Attaches a resource key.
    #[inline]
    pub fn with_key(mut self, key: impl Into<Arc<str>>) -> Self {
        self.key = Some(key.into());
        self
    }

    /// Attaches a task id.
    #[inline]
    pub fn with_task_id(mut self, id: u64) -> Self {
        self.task_id = Some(id);
        self
    }

    /// Attaches a consumer count.
    #[inline]
    pub fn with_consumers(mut self, n: usize) -> Self {
        self.consumers = Some(n);
        self
    }

    /// Attaches a grace delay (stored as milliseconds).
    #[inline]
    pub fn with_delay(mut self, d: Duration) -> Self {
        let ms = d.as_millis().min(u128::from(u32::MAX)) as u32;
        self.delay_ms = Some(ms);
        self
    }

    /// Attaches a human-readable error.
    #[inline]
    pub fn with_error(mut self, error: impl Into<Arc<str>>) -> Self {
        self.error = Some(error.into());
        self
    }

    /// Creates a subscriber overflow event.
    #[inline]
    pub fn subscriber_overflow(subscriber: &'static str, reason: &'static str) -> Self {
        Event::new(EventKind::SubscriberOverflow)
            .with_source(subscriber)
            .with_error(reason)
    }

    /// Creates a subscriber panic event.
    #[inline]
    pub fn subscriber_panicked(subscriber: &'static str, info: String) -> Self {
        Event::new(EventKind::SubscriberPanicked)
            .with_source(subscriber)
            .with_error(info)
    }

    #[inline]
    pub fn is_subscriber_overflow(&self) -> bool {
        matches!(self.kind, EventKind::SubscriberOverflow)
    }
}
