//! # Event bus for broadcasting lifecycle events.
//!
//! [`Bus`] is a thin wrapper around [`tokio::sync::broadcast`] that provides
//! non-blocking event publishing from multiple sources (gates, relays, supervisors).
//!
//! ## Architecture
//! ```text
//! Publishers (many):                 Receivers (any):
//!   Gate       ──┐
//!   Relay      ──┼──────► Bus ───────► SubscriberSet::listen ────► Subscribe impls
//!   Supervisor ──┘  (broadcast chan)  ─► tests (bus.subscribe())
//! ```
//!
//! ## Rules
//! - **Non-blocking publish**: `publish()` never blocks; it calls `broadcast::Sender::send`.
//! - **Bounded capacity**: a single ring buffer stores recent events for all receivers.
//! - **Lag handling**: slow receivers get `RecvError::Lagged(n)` and skip `n` oldest items.
//! - **No persistence**: events are lost if there are no active receivers at send time.
//! - **Ordered**: every receiver observes events in `seq` order, even with
//!   concurrent publishers.
//!
//! The bus is observability only. Failures that must not be lost go through
//! the [`ErrorReporter`](crate::ErrorReporter), never through the bus.

use std::sync::{Arc, Mutex};

use tokio::sync::broadcast;

use super::event::Event;
use crate::sync::lock;

/// Broadcast channel for lifecycle events.
///
/// ### Properties
/// - **Non-blocking**: `publish()` returns immediately (send clones internally).
/// - **Fire-and-forget**: no delivery or durability guarantees.
/// - **Cloneable**: cheap to clone; clones share the sequence counter.
#[derive(Clone, Debug)]
pub struct Bus {
    tx: broadcast::Sender<Event>,
    /// Next sequence number; held across the send.
    seq: Arc<Mutex<u64>>,
}

impl Bus {
    /// Creates a new bus with the given channel capacity.
    ///
    /// ### Notes
    /// - Capacity is **shared** across all receivers (not per-receiver).
    /// - The minimum capacity is 1 (clamped).
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        let (tx, _rx) = broadcast::channel::<Event>(capacity);
        Self {
            tx,
            seq: Arc::new(Mutex::new(1)),
        }
    }

    /// Stamps the next sequence number and publishes the event.
    ///
    /// If there are no receivers, the event is dropped (this function still returns immediately).
    pub fn publish(&self, mut ev: Event) {
        let mut next = lock(&self.seq);
        ev.seq = *next;
        *next += 1;
        let _ = self.tx.send(ev);
    }

    /// Creates a new receiver that will observe subsequent events.
    ///
    /// - Each call creates an **independent** receiver.
    /// - A receiver only gets events **sent after** it subscribes.
    pub fn subscribe(&self) -> broadcast::Receiver<Event> {
        self.tx.subscribe()
    }
}

impl Default for Bus {
    fn default() -> Self {
        Bus::new(1024)
    }
}
