use async_trait::async_trait;

use crate::error::RelayError;

use super::session::Session;

/// What a [`Gate`](crate::Gate) drives.
///
/// `activate`/`deactivate` run **outside** the gate lock and may suspend.
/// The synchronous hooks (`replay`, `fail`, `complete`) run **inside** the
/// lock so they observe a consistent consumer set; they must not block.
///
/// ## Example
/// ```rust
/// use async_trait::async_trait;
/// use relayvisor::{GateHooks, RelayError, Session};
///
/// struct Gps;
///
/// #[async_trait]
/// impl GateHooks for Gps {
///     type Consumer = ();
///     type Cache = ();
///
///     async fn activate(&self, _session: Session<Self>) -> Result<(), RelayError> {
///         // power the receiver up
///         Ok(())
///     }
///
///     async fn deactivate(&self) {
///         // power it down
///     }
/// }
/// ```
#[async_trait]
pub trait GateHooks: Sized + Send + Sync + 'static {
    /// Per-consumer payload stored in the [`ConsumerSet`](crate::ConsumerSet).
    type Consumer: Send + 'static;

    /// State reset on every teardown (for relays: the last value).
    type Cache: Default + Send + 'static;

    /// Starts the producer for a new session.
    ///
    /// Returning `Ok` moves the gate to `Active`. Returning `Err` delivers the
    /// error to attached consumers (or the reporter) and tears the session down.
    async fn activate(&self, session: Session<Self>) -> Result<(), RelayError>;

    /// Stops the producer after the session token has been cancelled.
    async fn deactivate(&self) {}

    /// A consumer is being attached; deliver cached state to it.
    fn replay(&self, _cache: &Self::Cache, _consumer: &Self::Consumer) {}

    /// Delivers a terminal error. Returns `true` if the consumer accepted it.
    fn fail(&self, _consumer: Self::Consumer, _error: &RelayError) -> bool {
        false
    }

    /// Closes a consumer after end-of-stream.
    fn complete(&self, _consumer: Self::Consumer) {}
}
