use std::fmt::{self, Debug};
use std::future::Future;
use std::hash::Hash;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::config::SupervisorConfig;
use crate::error::TaskError;
use crate::events::{Bus, Event, EventKind};
use crate::executor::Executor;

use super::handle::{Exit, TaskHandle};
use super::registry::Registry;

/// Bound for resource keys.
pub trait ResourceKey: Hash + Eq + Clone + Debug + Send + Sync + 'static {}

impl<K> ResourceKey for K where K: Hash + Eq + Clone + Debug + Send + Sync + 'static {}

struct Shared<K> {
    name: Arc<str>,
    registry: Registry<K>,
    bus: Option<Bus>,
}

impl<K: ResourceKey> Shared<K> {
    fn publish(&self, kind: EventKind, key: &K, id: u64) {
        if let Some(bus) = &self.bus {
            bus.publish(
                Event::new(kind)
                    .with_source(Arc::clone(&self.name))
                    .with_key(format!("{key:?}"))
                    .with_task_id(id),
            );
        }
    }
}

/// Signals termination and unregisters the owner, even if the body panicked
/// or the task was aborted.
struct Finish<K: ResourceKey> {
    shared: Arc<Shared<K>>,
    key: K,
    handle: TaskHandle,
    /// Predecessor not yet awaited.
    previous: Option<TaskHandle>,
    executor: Executor,
}

impl<K: ResourceKey> Finish<K> {
    fn release(shared: &Shared<K>, key: &K, handle: &TaskHandle) {
        shared.registry.remove_if_current(key, handle.id());
        handle.finish();
    }
}

impl<K: ResourceKey> Drop for Finish<K> {
    fn drop(&mut self) {
        match self.previous.take() {
            // Dropped while waiting: done must not fire before the predecessor's.
            Some(prev) if !prev.is_finished() => {
                let shared = Arc::clone(&self.shared);
                let key = self.key.clone();
                let handle = self.handle.clone();
                self.executor.spawn(async move {
                    prev.wait().await;
                    Self::release(&shared, &key, &handle);
                });
            }
            _ => Self::release(&self.shared, &self.key, &self.handle),
        }
    }
}

struct Inner<K> {
    shared: Arc<Shared<K>>,
    executor: Executor,
    root: CancellationToken,
    next_id: AtomicU64,
}

impl<K> Drop for Inner<K> {
    fn drop(&mut self) {
        self.root.cancel();
    }
}

/// # Per-key exclusive task runner.
///
/// Each key is owned by at most one task. Launching a new body for a key
/// cancels the current owner and holds the new body back until the old one
/// has fully unwound.
///
/// ```text
/// launch_exclusive(k, body)
///   │ lock: swap registry[k] ← new handle, capture old
///   │ old.cancel()
///   └─► spawn ─► old.wait() ─► new cancelled? ─ yes ─► Skipped
///                                 └ no ─► body(token) ─► Completed | Cancelled | Err
///                guard on exit: remove registry[k] if still ours, signal done
/// ```
///
/// Bodies receive a [`CancellationToken`] and are expected to return soon
/// after it fires; a body that ignores it delays every successor for its key.
///
/// Dropping the last clone of the supervisor cancels every owner.
///
/// ## Example
/// ```rust
/// use relayvisor::{Exit, Supervisor, SupervisorConfig};
///
/// # #[tokio::main(flavor = "current_thread")]
/// # async fn main() {
/// let sup = Supervisor::<&'static str>::new(SupervisorConfig::default());
///
/// let first = sup.launch_exclusive("detail", |token| async move {
///     token.cancelled().await;
///     Ok(())
/// });
/// tokio::task::yield_now().await;
/// let second = sup.launch_exclusive("detail", |_token| async { Ok(()) });
///
/// assert_eq!(first.await.unwrap(), Ok(Exit::Cancelled));
/// assert_eq!(second.await.unwrap(), Ok(Exit::Completed));
/// assert!(!sup.is_key_owned(&"detail"));
/// # }
/// ```
pub struct Supervisor<K: ResourceKey> {
    inner: Arc<Inner<K>>,
}

impl<K: ResourceKey> Clone for Supervisor<K> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<K: ResourceKey> Debug for Supervisor<K> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Supervisor")
            .field("name", &self.inner.shared.name)
            .field("owned", &self.len())
            .finish()
    }
}

impl<K: ResourceKey> Supervisor<K> {
    /// Creates a supervisor on the current runtime.
    ///
    /// # Panics
    /// Panics outside a tokio runtime.
    pub fn new(config: SupervisorConfig) -> Self {
        Self::builder(config).build()
    }

    pub fn builder(config: SupervisorConfig) -> SupervisorBuilder<K> {
        SupervisorBuilder::new(config)
    }

    pub fn name(&self) -> &str {
        &self.inner.shared.name
    }

    /// Submits `body` as the new owner of `key`.
    ///
    /// The previous owner (if any) is cancelled at once, and `body` only
    /// starts after it has terminated. The returned handle resolves to how
    /// the body ended; a body error is returned as-is, and a body panic
    /// surfaces as the `JoinError`.
    pub fn launch_exclusive<F, Fut>(&self, key: K, body: F) -> JoinHandle<Result<Exit, TaskError>>
    where
        F: FnOnce(CancellationToken) -> Fut + Send + 'static,
        Fut: Future<Output = Result<(), TaskError>> + Send + 'static,
    {
        let inner = &self.inner;
        let shared = Arc::clone(&inner.shared);
        let id = inner.next_id.fetch_add(1, Ordering::Relaxed) + 1;
        let handle = TaskHandle::with_token(id, inner.root.child_token());

        let previous = shared.registry.swap(key.clone(), handle.clone());
        if let Some(prev) = &previous {
            prev.cancel();
            tracing::debug!(supervisor = %shared.name, ?key, previous = prev.id(), id, "replacing owner");
            shared.publish(EventKind::TaskCancelRequested, &key, prev.id());
        }
        shared.publish(EventKind::TaskLaunched, &key, id);

        // Built before spawning: a task aborted before its first poll still
        // unregisters and signals done when its future is dropped.
        let token = handle.token().clone();
        let finish = Finish {
            shared,
            key,
            handle,
            previous,
            executor: inner.executor.clone(),
        };

        inner.executor.spawn(async move {
            let mut finish = finish;
            if let Some(prev) = &finish.previous {
                prev.wait().await;
            }
            finish.previous = None;

            let shared = &finish.shared;
            if token.is_cancelled() {
                tracing::debug!(supervisor = %shared.name, key = ?finish.key, id, "cancelled before start; skipping body");
                shared.publish(EventKind::TaskSkipped, &finish.key, id);
                return Ok(Exit::Skipped);
            }

            shared.publish(EventKind::TaskStarted, &finish.key, id);
            let result = body(token.clone()).await;

            match result {
                Ok(()) if token.is_cancelled() => {
                    shared.publish(EventKind::TaskCancelled, &finish.key, id);
                    Ok(Exit::Cancelled)
                }
                Ok(()) => {
                    shared.publish(EventKind::TaskFinished, &finish.key, id);
                    Ok(Exit::Completed)
                }
                Err(e) if e.is_cancellation() => {
                    shared.publish(EventKind::TaskCancelled, &finish.key, id);
                    Ok(Exit::Cancelled)
                }
                Err(e) => {
                    tracing::warn!(supervisor = %shared.name, key = ?finish.key, id, error = %e, "task failed");
                    if let Some(bus) = &shared.bus {
                        bus.publish(
                            Event::new(EventKind::TaskFailed)
                                .with_source(Arc::clone(&shared.name))
                                .with_key(format!("{:?}", finish.key))
                                .with_task_id(id)
                                .with_error(e.as_message()),
                        );
                    }
                    Err(e)
                }
            }
        })
    }

    /// True if a task is registered for `key` (running, waiting or unwinding).
    pub fn is_key_owned(&self, key: &K) -> bool {
        self.inner.shared.registry.contains(key)
    }

    /// Cancels the owner of `key` without launching a replacement.
    ///
    /// The entry stays registered until the owner has unwound.
    /// Returns `false` if nothing owned the key.
    pub fn cancel(&self, key: &K) -> bool {
        let shared = &self.inner.shared;
        match shared.registry.get(key) {
            Some(owner) => {
                owner.cancel();
                shared.publish(EventKind::TaskCancelRequested, key, owner.id());
                true
            }
            None => false,
        }
    }

    /// The task currently owning `key`.
    pub fn current_owner(&self, key: &K) -> Option<TaskHandle> {
        self.inner.shared.registry.get(key)
    }

    /// Keys with a registered owner, in no particular order.
    pub fn keys(&self) -> Vec<K> {
        self.inner.shared.registry.keys()
    }

    pub fn len(&self) -> usize {
        self.inner.shared.registry.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Cancels every owner and waits until all of them have unwound.
    pub async fn cancel_all(&self) {
        let owners = self.inner.shared.registry.snapshot();
        for (key, owner) in &owners {
            owner.cancel();
            self.inner
                .shared
                .publish(EventKind::TaskCancelRequested, key, owner.id());
        }
        for (_, owner) in owners {
            owner.wait().await;
        }
    }

    /// Waits until no key is owned.
    pub async fn wait_idle(&self) {
        loop {
            let owners = self.inner.shared.registry.snapshot();
            if owners.is_empty() {
                return;
            }
            for (_, owner) in owners {
                owner.wait().await;
            }
        }
    }
}

/// Builder for [`Supervisor`].
pub struct SupervisorBuilder<K> {
    config: SupervisorConfig,
    executor: Option<Executor>,
    bus: Option<Bus>,
    parent: Option<CancellationToken>,
    _key: std::marker::PhantomData<fn() -> K>,
}

impl<K: ResourceKey> SupervisorBuilder<K> {
    fn new(config: SupervisorConfig) -> Self {
        Self {
            config,
            executor: None,
            bus: None,
            parent: None,
            _key: std::marker::PhantomData,
        }
    }

    pub fn executor(mut self, executor: Executor) -> Self {
        self.executor = Some(executor);
        self
    }

    pub fn bus(mut self, bus: Bus) -> Self {
        self.bus = Some(bus);
        self
    }

    /// Ties every owner to `parent`: once it fires, waiting bodies are
    /// skipped and running ones see their token cancelled.
    pub fn parent(mut self, parent: CancellationToken) -> Self {
        self.parent = Some(parent);
        self
    }

    /// # Panics
    /// Panics outside a tokio runtime when no executor was given.
    pub fn build(self) -> Supervisor<K> {
        let root = match self.parent {
            Some(parent) => parent.child_token(),
            None => CancellationToken::new(),
        };
        Supervisor {
            inner: Arc::new(Inner {
                shared: Arc::new(Shared {
                    name: Arc::from(self.config.name.as_ref()),
                    registry: Registry::new(),
                    bus: self.bus,
                }),
                executor: self.executor.unwrap_or_else(Executor::current),
                root,
                next_id: AtomicU64::new(0),
            }),
        }
    }
}
