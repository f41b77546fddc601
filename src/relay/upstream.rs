use std::fmt;
use std::future::Future;
use std::marker::PhantomData;

use async_trait::async_trait;
use futures::{Stream, StreamExt};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::error::RelayError;
use crate::gate::Session;

use super::core::RelayHooks;

/// # The producer behind a [`Relay`](crate::Relay).
///
/// `start` is called when the first consumer attaches and should return once
/// the producer is running; values are pushed through the [`Emitter`] from
/// then on. `stop` is called after the last consumer has been gone for the
/// grace period. Calls never overlap: `stop` always runs after the matching
/// `start` has returned, and the next `start` waits for `stop`.
///
/// ## Example
/// ```rust
/// use async_trait::async_trait;
/// use relayvisor::{Emitter, RelayError, Upstream};
///
/// struct Ticker;
///
/// #[async_trait]
/// impl Upstream<u64> for Ticker {
///     async fn start(&self, emitter: Emitter<u64>) -> Result<(), RelayError> {
///         let tick = emitter.clone();
///         emitter.spawn(async move {
///             let mut n = 0;
///             while tick.emit(n).is_ok() {
///                 n += 1;
///                 tokio::time::sleep(std::time::Duration::from_secs(1)).await;
///             }
///         });
///         Ok(())
///     }
/// }
/// ```
#[async_trait]
pub trait Upstream<T>: Send + Sync + 'static
where
    T: Clone + Send + 'static,
{
    /// Subscribes to the source. An `Err` fails every attached consumer.
    async fn start(&self, emitter: Emitter<T>) -> Result<(), RelayError>;

    /// Releases the source. The emitter handed to `start` is already inactive.
    async fn stop(&self) {}
}

/// Push side of one producer session.
///
/// Cloneable; every clone goes stale together when the producer is torn
/// down, after which [`Emitter::emit`] returns [`RelayError::Inactive`].
pub struct Emitter<T: Clone + Send + 'static> {
    pub(crate) session: Session<RelayHooks<T>>,
    pub(crate) conflate: bool,
}

impl<T: Clone + Send + 'static> Clone for Emitter<T> {
    fn clone(&self) -> Self {
        Self {
            session: self.session.clone(),
            conflate: self.conflate,
        }
    }
}

impl<T: Clone + Send + 'static> fmt::Debug for Emitter<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Emitter")
            .field("session", &self.session)
            .field("conflate", &self.conflate)
            .finish()
    }
}

impl<T: Clone + Send + 'static> Emitter<T> {
    /// Delivers `value` to every attached consumer, in emission order.
    ///
    /// With conflation on, the value also replaces the cached last value.
    pub fn emit(&self, value: T) -> Result<(), RelayError> {
        let conflate = self.conflate;
        self.session
            .with_consumers(move |consumers, cache| {
                for inbox in consumers.iter() {
                    // A closed inbox belongs to a consumer mid-detach.
                    let _ = inbox.send(Ok(value.clone()));
                }
                if conflate {
                    cache.set(value);
                }
            })
            .ok_or(RelayError::Inactive)
    }

    /// Ends the stream: every inbox is closed and the producer torn down.
    ///
    /// Returns `false` if the producer was already torn down.
    pub fn complete(&self) -> bool {
        self.session.complete()
    }

    /// Fails the stream for every attached consumer (or the reporter when
    /// none is attached) and tears the producer down.
    pub fn fail(&self, error: RelayError) {
        self.session.fail(error);
    }

    /// True until the producer is torn down.
    pub fn is_active(&self) -> bool {
        self.session.is_current()
    }

    /// Token cancelled at teardown.
    pub fn token(&self) -> &CancellationToken {
        self.session.token()
    }

    /// Resolves at teardown.
    pub async fn cancelled(&self) {
        self.session.cancelled().await;
    }

    /// Spawns producer work that is aborted at teardown.
    pub fn spawn<F>(&self, fut: F) -> JoinHandle<()>
    where
        F: Future<Output = ()> + Send + 'static,
    {
        let token = self.session.token().clone();
        self.session.executor().spawn(async move {
            tokio::select! {
                _ = token.cancelled() => {}
                _ = fut => {}
            }
        })
    }
}

/// [`Upstream`] over a stream factory.
///
/// Each activation calls the factory for a fresh stream and pumps it until
/// teardown. `Ok` items are emitted, the first `Err` fails the relay and the
/// end of the stream completes it.
pub struct StreamUpstream<T, F> {
    factory: F,
    _marker: PhantomData<fn() -> T>,
}

impl<T, F, S> StreamUpstream<T, F>
where
    T: Clone + Send + 'static,
    F: Fn() -> S + Send + Sync + 'static,
    S: Stream<Item = Result<T, RelayError>> + Send + 'static,
{
    pub fn new(factory: F) -> Self {
        Self {
            factory,
            _marker: PhantomData,
        }
    }
}

#[async_trait]
impl<T, F, S> Upstream<T> for StreamUpstream<T, F>
where
    T: Clone + Send + 'static,
    F: Fn() -> S + Send + Sync + 'static,
    S: Stream<Item = Result<T, RelayError>> + Send + 'static,
{
    async fn start(&self, emitter: Emitter<T>) -> Result<(), RelayError> {
        let stream = (self.factory)();
        let pump = emitter.clone();
        emitter.spawn(async move {
            let mut stream = std::pin::pin!(stream);
            while let Some(item) = stream.next().await {
                match item {
                    Ok(value) => {
                        if pump.emit(value).is_err() {
                            return;
                        }
                    }
                    Err(error) => {
                        pump.fail(error);
                        return;
                    }
                }
            }
            pump.complete();
        });
        Ok(())
    }
}
