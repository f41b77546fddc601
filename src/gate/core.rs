//! # Gate internals: the serialized producer state machine.
//!
//! ## Architecture
//! ```text
//! attach ──► lock ─► replay cache ─► insert ─► Inactive? ──► spawn activation task
//!                                              Draining? ──► Active (timer discarded)
//!
//! activation task:  await previous teardown ─► hooks.activate(session) ─► finish_activation
//!                                                                        ├─ Ok, consumers  ─► Active
//!                                                                        ├─ Ok, no one left ─► teardown now
//!                                                                        └─ Err ─► fail consumers | reporter
//!
//! detach ──► lock ─► remove ─► last one && Active? ─► grace == 0 ─► teardown now
//!                                                    └ grace > 0 ─► Draining + debounce(grace)
//!
//! teardown task:    await activation + previous teardown ─► hooks.deactivate() ─► done
//! ```
//!
//! ## Rules
//! - Every transition happens under the single `state` mutex.
//! - `activate`/`deactivate` run on the executor, outside the lock.
//! - Activations and teardowns are chained through done-tokens, so a new
//!   activation never overlaps the previous teardown. The tokens fire even
//!   when a hook panics; a panicking `activate` fails the session.
//! - A session's `generation` goes stale at teardown; stale emits are ignored
//!   and stale failures go to the reporter.

use std::fmt;
use std::panic::AssertUnwindSafe;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use futures::FutureExt;
use tokio_util::sync::CancellationToken;

use crate::config::{DebounceConfig, RelayConfig};
use crate::debounce::Debouncer;
use crate::error::RelayError;
use crate::events::{Bus, Event, EventKind};
use crate::executor::Executor;
use crate::reporting::{ErrorReporter, LogReporter, Report};
use crate::sync::{lock, panic_message};

use super::hooks::GateHooks;
use super::session::Session;
use super::state::{ConsumerId, ConsumerSet, ProducerState};

pub(crate) struct GateState<C, K> {
    pub(crate) phase: ProducerState,
    pub(crate) consumers: ConsumerSet<C>,
    pub(crate) cache: K,
    pub(crate) generation: u64,
    drain_epoch: u64,
    /// Token of the live session.
    producer: Option<CancellationToken>,
    /// Cancelled once the live session's `activate` returned.
    activation_done: Option<CancellationToken>,
    /// Cancelled once the most recent `deactivate` returned.
    teardown_done: Option<CancellationToken>,
}

struct Activation<H: GateHooks> {
    session: Session<H>,
    previous_teardown: Option<CancellationToken>,
    done: CancellationToken,
}

struct Teardown {
    activation: Option<CancellationToken>,
    previous: Option<CancellationToken>,
    done: CancellationToken,
}

pub(crate) struct GateInner<H: GateHooks> {
    pub(crate) hooks: H,
    pub(crate) name: Arc<str>,
    grace: Option<Duration>,
    executor: Executor,
    reporter: Arc<dyn ErrorReporter>,
    bus: Option<Bus>,
    debouncer: Debouncer,
    pub(crate) state: Mutex<GateState<H::Consumer, H::Cache>>,
}

impl<H: GateHooks> GateInner<H> {
    fn attach(this: &Arc<Self>, consumer: H::Consumer) -> ConsumerId {
        let (id, count, activation) = {
            let mut st = lock(&this.state);
            this.hooks.replay(&st.cache, &consumer);
            let id = st.consumers.insert(consumer);

            let activation = match st.phase {
                ProducerState::Inactive => Some(Self::begin_activation(this, &mut st)),
                ProducerState::DrainingToInactive => {
                    st.phase = ProducerState::Active;
                    st.drain_epoch += 1;
                    // Re-arming with a no-op is how a pending teardown is discarded.
                    this.debouncer.schedule_after(Duration::ZERO, || async {});
                    tracing::debug!(gate = %this.name, "reattached during grace period; producer reused");
                    this.publish(Event::new(EventKind::ProducerActive).with_consumers(st.consumers.len()));
                    None
                }
                ProducerState::Activating | ProducerState::Active => None,
            };
            (id, st.consumers.len(), activation)
        };

        tracing::debug!(gate = %this.name, consumers = count, "consumer attached");
        this.publish(Event::new(EventKind::ConsumerAttached).with_consumers(count));

        if let Some(activation) = activation {
            Self::spawn_activation(this, activation);
        }
        id
    }

    fn detach(this: &Arc<Self>, id: ConsumerId) {
        let (consumer, teardown) = {
            let mut st = lock(&this.state);
            let Some(consumer) = st.consumers.remove(id) else {
                return;
            };
            let remaining = st.consumers.len();

            let teardown = if remaining == 0 && st.phase == ProducerState::Active {
                match this.grace {
                    None => Some(this.teardown_locked(&mut st)),
                    Some(grace) => {
                        st.phase = ProducerState::DrainingToInactive;
                        st.drain_epoch += 1;
                        let epoch = st.drain_epoch;
                        // Holds the gate until the timer settles, so `deactivate`
                        // still runs if every handle is dropped while draining.
                        let gate = Arc::clone(this);
                        this.debouncer.schedule_after(grace, move || async move {
                            Self::drain_elapsed(&gate, epoch);
                        });
                        tracing::debug!(gate = %this.name, ?grace, "last consumer left; draining");
                        this.publish(Event::new(EventKind::ProducerDraining).with_delay(grace));
                        None
                    }
                }
            } else {
                None
            };

            tracing::debug!(gate = %this.name, consumers = remaining, "consumer detached");
            this.publish(Event::new(EventKind::ConsumerDetached).with_consumers(remaining));
            (consumer, teardown)
        };

        drop(consumer);
        if let Some(td) = teardown {
            Self::spawn_teardown(this, td);
        }
    }

    fn drain_elapsed(this: &Arc<Self>, epoch: u64) {
        let td = {
            let mut st = lock(&this.state);
            if st.phase != ProducerState::DrainingToInactive
                || st.drain_epoch != epoch
                || !st.consumers.is_empty()
            {
                return;
            }
            this.teardown_locked(&mut st)
        };
        tracing::debug!(gate = %this.name, "grace period elapsed");
        Self::spawn_teardown(this, td);
    }

    fn begin_activation(
        this: &Arc<Self>,
        st: &mut GateState<H::Consumer, H::Cache>,
    ) -> Activation<H> {
        st.phase = ProducerState::Activating;
        st.generation += 1;

        let token = CancellationToken::new();
        st.producer = Some(token.clone());
        let done = CancellationToken::new();
        st.activation_done = Some(done.clone());

        Activation {
            session: Session {
                gate: Arc::downgrade(this),
                generation: st.generation,
                token,
                executor: this.executor.clone(),
            },
            previous_teardown: st.teardown_done.clone(),
            done,
        }
    }

    fn spawn_activation(this: &Arc<Self>, activation: Activation<H>) {
        tracing::debug!(gate = %this.name, generation = activation.session.generation, "activating producer");
        this.publish(Event::new(EventKind::ProducerActivating));

        let gate = Arc::clone(this);
        this.executor.spawn(async move {
            let Activation {
                session,
                previous_teardown,
                done,
            } = activation;
            let done = done.drop_guard();

            if let Some(previous) = previous_teardown {
                previous.cancelled().await;
            }

            let generation = session.generation;
            let result = if session.token.is_cancelled() {
                Ok(())
            } else {
                match AssertUnwindSafe(gate.hooks.activate(session)).catch_unwind().await {
                    Ok(result) => result,
                    Err(panic) => {
                        let info = panic_message(&*panic);
                        tracing::error!(gate = %gate.name, %info, "activation panicked");
                        Err(RelayError::activation(format!("panicked: {info}")))
                    }
                }
            };
            drop(done);

            Self::finish_activation(&gate, generation, result);
        });
    }

    fn finish_activation(this: &Arc<Self>, generation: u64, result: Result<(), RelayError>) {
        let mut st = lock(&this.state);
        if st.generation != generation || st.phase != ProducerState::Activating {
            drop(st);
            // Torn down while `activate` was running; nobody is left to see the error.
            if let Err(error) = result {
                this.report(error);
            }
            return;
        }

        match result {
            Ok(()) if st.consumers.is_empty() => {
                let td = this.teardown_locked(&mut st);
                drop(st);
                tracing::debug!(gate = %this.name, "activated with no consumers left; tearing down");
                Self::spawn_teardown(this, td);
            }
            Ok(()) => {
                st.phase = ProducerState::Active;
                let count = st.consumers.len();
                drop(st);
                tracing::debug!(gate = %this.name, consumers = count, "producer active");
                this.publish(Event::new(EventKind::ProducerActive).with_consumers(count));
            }
            Err(error) => Self::fail_locked(this, st, error),
        }
    }

    pub(crate) fn complete(this: &Arc<Self>, generation: u64) -> bool {
        let (closed, td) = {
            let mut st = lock(&this.state);
            if st.generation != generation || !st.phase.is_live() {
                return false;
            }
            let consumers = st.consumers.drain();
            let closed = consumers.len();
            for consumer in consumers {
                this.hooks.complete(consumer);
            }
            (closed, this.teardown_locked(&mut st))
        };

        tracing::debug!(gate = %this.name, closed, "upstream completed");
        this.publish(Event::new(EventKind::UpstreamCompleted).with_consumers(closed));
        Self::spawn_teardown(this, td);
        true
    }

    pub(crate) fn fail(this: &Arc<Self>, generation: u64, error: RelayError) {
        let st = lock(&this.state);
        if st.generation != generation || !st.phase.is_live() {
            drop(st);
            this.report(error);
            return;
        }
        Self::fail_locked(this, st, error);
    }

    /// Delivers `error` to every consumer (or the reporter) and tears down.
    fn fail_locked(
        this: &Arc<Self>,
        mut st: std::sync::MutexGuard<'_, GateState<H::Consumer, H::Cache>>,
        error: RelayError,
    ) {
        let delivered = st
            .consumers
            .drain()
            .into_iter()
            .map(|consumer| this.hooks.fail(consumer, &error))
            .filter(|accepted| *accepted)
            .count();
        let td = this.teardown_locked(&mut st);
        drop(st);

        tracing::warn!(gate = %this.name, delivered, %error, "producer failed");
        this.publish(
            Event::new(EventKind::UpstreamFailed)
                .with_consumers(delivered)
                .with_error(error.to_string()),
        );
        if delivered == 0 {
            this.report(error);
        }
        Self::spawn_teardown(this, td);
    }

    fn teardown_locked(&self, st: &mut GateState<H::Consumer, H::Cache>) -> Teardown {
        st.phase = ProducerState::Inactive;
        st.generation += 1;
        st.drain_epoch += 1;
        st.cache = H::Cache::default();
        if let Some(producer) = st.producer.take() {
            producer.cancel();
        }

        let done = CancellationToken::new();
        Teardown {
            activation: st.activation_done.take(),
            previous: st.teardown_done.replace(done.clone()),
            done,
        }
    }

    fn spawn_teardown(this: &Arc<Self>, td: Teardown) {
        let gate = Arc::clone(this);
        this.executor.spawn(async move {
            let done = td.done.drop_guard();
            if let Some(activation) = td.activation {
                activation.cancelled().await;
            }
            if let Some(previous) = td.previous {
                previous.cancelled().await;
            }

            if let Err(panic) = AssertUnwindSafe(gate.hooks.deactivate()).catch_unwind().await {
                let info = panic_message(&*panic);
                tracing::error!(gate = %gate.name, %info, "deactivation panicked");
                gate.report(RelayError::upstream(format!("deactivation panicked: {info}")));
            }
            drop(done);

            tracing::debug!(gate = %gate.name, "producer inactive");
            gate.publish(Event::new(EventKind::ProducerInactive));
        });
    }

    fn report(&self, error: RelayError) {
        self.publish(Event::new(EventKind::ErrorReported).with_error(error.to_string()));
        self.reporter.report(Report::new(Arc::clone(&self.name), error));
    }

    fn publish(&self, ev: Event) {
        if let Some(bus) = &self.bus {
            bus.publish(ev.with_source(Arc::clone(&self.name)));
        }
    }
}

impl<H: GateHooks> Drop for GateInner<H> {
    fn drop(&mut self) {
        let st = self.state.get_mut().unwrap_or_else(PoisonError::into_inner);
        if let Some(producer) = st.producer.take() {
            producer.cancel();
        }
    }
}

/// Reference-counted activation gate.
///
/// Runs [`GateHooks::activate`] when the first consumer attaches and
/// [`GateHooks::deactivate`] once the last one has been gone for the
/// configured grace period. Cheap to clone; clones share one state machine.
///
/// ## Example
/// ```rust
/// use std::time::Duration;
/// use async_trait::async_trait;
/// use relayvisor::{Gate, GateHooks, ProducerState, RelayConfig, RelayError, Session};
///
/// struct Sensor;
///
/// #[async_trait]
/// impl GateHooks for Sensor {
///     type Consumer = ();
///     type Cache = ();
///     async fn activate(&self, _s: Session<Self>) -> Result<(), RelayError> { Ok(()) }
/// }
///
/// # #[tokio::main(flavor = "current_thread")]
/// # async fn main() {
/// let gate = Gate::builder(Sensor)
///     .config(RelayConfig { grace: Duration::ZERO, ..RelayConfig::named("sensor") })
///     .build();
///
/// let lease = gate.attach(());
/// assert_eq!(gate.state(), ProducerState::Activating);
/// lease.detach();
/// # }
/// ```
pub struct Gate<H: GateHooks> {
    inner: Arc<GateInner<H>>,
}

impl<H: GateHooks> Clone for Gate<H> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<H: GateHooks> fmt::Debug for Gate<H> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Gate")
            .field("name", &self.inner.name)
            .field("state", &self.state())
            .field("consumers", &self.consumer_count())
            .finish()
    }
}

impl<H: GateHooks> Gate<H> {
    /// Starts building a gate around `hooks`.
    pub fn builder(hooks: H) -> GateBuilder<H> {
        GateBuilder::new(hooks)
    }

    /// Attaches a consumer; the returned lease detaches it when dropped.
    pub fn attach(&self, consumer: H::Consumer) -> Lease<H> {
        let id = GateInner::attach(&self.inner, consumer);
        Lease {
            id,
            gate: Some(Arc::clone(&self.inner)),
        }
    }

    /// Current producer state.
    pub fn state(&self) -> ProducerState {
        lock(&self.inner.state).phase
    }

    /// True while a producer exists (activating, active or draining).
    pub fn is_active(&self) -> bool {
        self.state().is_live()
    }

    /// Number of attached consumers.
    pub fn consumer_count(&self) -> usize {
        lock(&self.inner.state).consumers.len()
    }

    pub fn name(&self) -> &str {
        &self.inner.name
    }

    pub fn hooks(&self) -> &H {
        &self.inner.hooks
    }
}

/// Attachment of one consumer to a [`Gate`]. Detaches on drop.
pub struct Lease<H: GateHooks> {
    id: ConsumerId,
    gate: Option<Arc<GateInner<H>>>,
}

impl<H: GateHooks> Lease<H> {
    pub fn id(&self) -> ConsumerId {
        self.id
    }

    /// Detaches now instead of at drop.
    pub fn detach(mut self) {
        self.release();
    }

    fn release(&mut self) {
        if let Some(gate) = self.gate.take() {
            GateInner::detach(&gate, self.id);
        }
    }
}

impl<H: GateHooks> Drop for Lease<H> {
    fn drop(&mut self) {
        self.release();
    }
}

impl<H: GateHooks> fmt::Debug for Lease<H> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Lease").field("id", &self.id).finish()
    }
}

/// Builder for [`Gate`].
pub struct GateBuilder<H: GateHooks> {
    hooks: H,
    config: RelayConfig,
    executor: Option<Executor>,
    bus: Option<Bus>,
    reporter: Option<Arc<dyn ErrorReporter>>,
}

impl<H: GateHooks> GateBuilder<H> {
    fn new(hooks: H) -> Self {
        Self {
            hooks,
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

    /// Execution context for activation, teardown and the grace timer.
    ///
    /// Defaults to the runtime `build()` is called from.
    pub fn executor(mut self, executor: Executor) -> Self {
        self.executor = Some(executor);
        self
    }

    /// Publishes lifecycle events to `bus`.
    pub fn bus(mut self, bus: Bus) -> Self {
        self.bus = Some(bus);
        self
    }

    /// Receives failures with no consumer attached. Defaults to [`LogReporter`].
    pub fn reporter(mut self, reporter: Arc<dyn ErrorReporter>) -> Self {
        self.reporter = Some(reporter);
        self
    }

    /// Builds the gate.
    ///
    /// # Panics
    /// Panics outside a tokio runtime when no executor was given.
    pub fn build(self) -> Gate<H> {
        let executor = self.executor.unwrap_or_else(Executor::current);
        let grace = self.config.grace_period();
        let debouncer = Debouncer::new(
            DebounceConfig {
                delay: grace.unwrap_or(Duration::ZERO),
                trigger_first_immediately: false,
            },
            executor.clone(),
        );

        let state = GateState {
            phase: ProducerState::Inactive,
            consumers: ConsumerSet::new(),
            cache: H::Cache::default(),
            generation: 0,
            drain_epoch: 0,
            producer: None,
            activation_done: None,
            teardown_done: None,
        };

        Gate {
            inner: Arc::new(GateInner {
                hooks: self.hooks,
                name: Arc::from(self.config.name.as_ref()),
                grace,
                executor,
                reporter: self.reporter.unwrap_or_else(|| Arc::new(LogReporter)),
                bus: self.bus,
                debouncer,
                state: Mutex::new(state),
            }),
        }
    }
}
