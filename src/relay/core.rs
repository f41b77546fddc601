use std::fmt;
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};

use async_trait::async_trait;
use futures::Stream;
use tokio::sync::mpsc;

use crate::config::RelayConfig;
use crate::error::RelayError;
use crate::events::Bus;
use crate::executor::Executor;
use crate::gate::{ConsumerId, Gate, GateHooks, Lease, ProducerState, Session};
use crate::reporting::ErrorReporter;

use super::upstream::{Emitter, StreamUpstream, Upstream};

/// Sending half of a consumer inbox.
pub type Inbox<T> = mpsc::UnboundedSender<Result<T, RelayError>>;

/// Single-slot cache of the most recent value, replayed to late attachers.
///
/// Only filled when conflation is on; reset at every teardown.
#[derive(Debug, Clone)]
pub struct LastValue<T>(Option<T>);

impl<T> Default for LastValue<T> {
    fn default() -> Self {
        Self(None)
    }
}

impl<T> LastValue<T> {
    pub fn get(&self) -> Option<&T> {
        self.0.as_ref()
    }

    pub(crate) fn set(&mut self, value: T) {
        self.0 = Some(value);
    }
}

/// Gate hooks of a relay: inboxes as consumers, [`LastValue`] as cache.
pub struct RelayHooks<T: Clone + Send + 'static> {
    upstream: Arc<dyn Upstream<T>>,
    conflate: bool,
}

#[async_trait]
impl<T: Clone + Send + 'static> GateHooks for RelayHooks<T> {
    type Consumer = Inbox<T>;
    type Cache = LastValue<T>;

    async fn activate(&self, session: Session<Self>) -> Result<(), RelayError> {
        let emitter = Emitter {
            session,
            conflate: self.conflate,
        };
        self.upstream.start(emitter).await
    }

    async fn deactivate(&self) {
        self.upstream.stop().await;
    }

    fn replay(&self, cache: &LastValue<T>, inbox: &Inbox<T>) {
        if let Some(value) = cache.get() {
            let _ = inbox.send(Ok(value.clone()));
        }
    }

    fn fail(&self, inbox: Inbox<T>, error: &RelayError) -> bool {
        inbox.send(Err(error.clone())).is_ok()
    }

    // Dropping the sender closes the inbox once its backlog is read.
    fn complete(&self, _inbox: Inbox<T>) {}
}

/// # Shared, reference-counted, debounced multicast over one [`Upstream`].
///
/// Every [`Consumer`] gets its own unbounded inbox, so a slow reader only
/// grows its own backlog. The upstream runs while at least one consumer is
/// attached and for `grace` after the last one leaves.
///
/// ## Example
/// ```rust
/// use std::time::Duration;
/// use futures::stream;
/// use relayvisor::{Relay, RelayConfig, RelayError, StreamUpstream};
///
/// # #[tokio::main(flavor = "current_thread")]
/// # async fn main() {
/// let relay = Relay::builder(StreamUpstream::new(|| stream::iter(vec![Ok::<_, RelayError>(1), Ok(2)])))
///     .config(RelayConfig { conflate: true, ..RelayConfig::named("numbers") })
///     .build();
///
/// let mut consumer = relay.attach();
/// assert_eq!(consumer.recv().await, Some(Ok(1)));
/// assert_eq!(consumer.recv().await, Some(Ok(2)));
/// assert_eq!(consumer.recv().await, None);
/// # }
/// ```
pub struct Relay<T: Clone + Send + 'static> {
    gate: Gate<RelayHooks<T>>,
}

impl<T: Clone + Send + 'static> Clone for Relay<T> {
    fn clone(&self) -> Self {
        Self {
            gate: self.gate.clone(),
        }
    }
}

impl<T: Clone + Send + 'static> fmt::Debug for Relay<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Relay").field("gate", &self.gate).finish()
    }
}

impl<T: Clone + Send + 'static> Relay<T> {
    /// Starts building a relay over `upstream`.
    pub fn builder<U: Upstream<T>>(upstream: U) -> RelayBuilder<T> {
        RelayBuilder::new(Arc::new(upstream))
    }

    /// Attaches a new consumer.
    ///
    /// With conflation on, the cached last value (if any) is already in the
    /// returned consumer's inbox, ahead of every live value.
    pub fn attach(&self) -> Consumer<T> {
        let (tx, rx) = mpsc::unbounded_channel();
        let lease = self.gate.attach(tx);
        Consumer { rx, lease }
    }

    pub fn state(&self) -> ProducerState {
        self.gate.state()
    }

    /// True while the upstream is running (including the grace period).
    pub fn is_active(&self) -> bool {
        self.gate.is_active()
    }

    pub fn consumer_count(&self) -> usize {
        self.gate.consumer_count()
    }

    pub fn name(&self) -> &str {
        self.gate.name()
    }
}

/// Builder for [`Relay`].
pub struct RelayBuilder<T: Clone + Send + 'static> {
    upstream: Arc<dyn Upstream<T>>,
    config: RelayConfig,
    executor: Option<Executor>,
    bus: Option<Bus>,
    reporter: Option<Arc<dyn ErrorReporter>>,
}

impl<T: Clone + Send + 'static> RelayBuilder<T> {
    fn new(upstream: Arc<dyn Upstream<T>>) -> Self {
        Self {
            upstream,
            config: RelayConfig::default(),
            executor: None,
            bus: None,
            reporter: None,
        }
    }

    pub fn config(mut self, config: RelayConfig) -> Self {
        self.config = config;
        self
    }

    pub fn executor(mut self, executor: Executor) -> Self {
        self.executor = Some(executor);
        self
    }

    pub fn bus(mut self, bus: Bus) -> Self {
        self.bus = Some(bus);
        self
    }

    pub fn reporter(mut self, reporter: Arc<dyn ErrorReporter>) -> Self {
        self.reporter = Some(reporter);
        self
    }

    /// Builds the relay.
    ///
    /// # Panics
    /// Panics outside a tokio runtime when no executor was given.
    pub fn build(self) -> Relay<T> {
        let hooks = RelayHooks {
            upstream: self.upstream,
            conflate: self.config.conflate,
        };
        let mut builder = Gate::builder(hooks).config(self.config);
        if let Some(executor) = self.executor {
            builder = builder.executor(executor);
        }
        if let Some(bus) = self.bus {
            builder = builder.bus(bus);
        }
        if let Some(reporter) = self.reporter {
            builder = builder.reporter(reporter);
        }
        Relay {
            gate: builder.build(),
        }
    }
}

/// One attached reader of a [`Relay`]. Detaches when dropped.
///
/// Yields `Ok` values in emission order. A terminal `Err` is followed by the
/// end of the stream; upstream completion ends it without an error.
pub struct Consumer<T: Clone + Send + 'static> {
    rx: mpsc::UnboundedReceiver<Result<T, RelayError>>,
    lease: Lease<RelayHooks<T>>,
}

impl<T: Clone + Send + 'static> Consumer<T> {
    /// Next item, or `None` once the relay completed or failed this consumer.
    pub async fn recv(&mut self) -> Option<Result<T, RelayError>> {
        self.rx.recv().await
    }

    /// Non-blocking variant of [`Consumer::recv`]; `None` when nothing is queued.
    pub fn try_recv(&mut self) -> Option<Result<T, RelayError>> {
        self.rx.try_recv().ok()
    }

    pub fn id(&self) -> ConsumerId {
        self.lease.id()
    }

    /// Detaches now instead of at drop.
    pub fn detach(self) {
        self.lease.detach();
    }
}

impl<T: Clone + Send + 'static> Stream for Consumer<T> {
    type Item = Result<T, RelayError>;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        self.rx.poll_recv(cx)
    }
}

impl<T: Clone + Send + 'static> fmt::Debug for Consumer<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Consumer").field("id", &self.lease.id()).finish()
    }
}

/// Shares one stream among any number of consumers.
///
/// `factory` is called on every activation; see [`StreamUpstream`].
///
/// # Panics
/// Panics outside a tokio runtime.
pub fn share<T, F, S>(factory: F, config: RelayConfig) -> Relay<T>
where
    T: Clone + Send + 'static,
    F: Fn() -> S + Send + Sync + 'static,
    S: Stream<Item = Result<T, RelayError>> + Send + 'static,
{
    Relay::builder(StreamUpstream::new(factory))
        .config(config)
        .build()
}
