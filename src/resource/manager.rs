use std::fmt;
use std::future::Future;
use std::sync::Arc;

use futures::{Stream, StreamExt};
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::error::TaskError;
use crate::reporting::{ErrorReporter, Report};
use crate::supervisor::{Exit, ResourceKey, Supervisor, TaskHandle};

use super::outcome::Outcome;

/// Shared, observable [`Outcome`] cell.
///
/// Clones share the same cell. Readers subscribe through a
/// [`watch::Receiver`] and always see the latest outcome.
pub struct Resource<T> {
    tx: Arc<watch::Sender<Outcome<T>>>,
}

impl<T> Clone for Resource<T> {
    fn clone(&self) -> Self {
        Self {
            tx: Arc::clone(&self.tx),
        }
    }
}

impl<T: fmt::Debug> fmt::Debug for Resource<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("Resource").field(&*self.tx.borrow()).finish()
    }
}

impl<T> Default for Resource<T> {
    fn default() -> Self {
        Self::new(Outcome::default())
    }
}

impl<T> Resource<T> {
    pub fn new(initial: Outcome<T>) -> Self {
        let (tx, _) = watch::channel(initial);
        Self { tx: Arc::new(tx) }
    }

    /// Replaces the outcome, notifying every subscriber.
    pub fn set(&self, outcome: Outcome<T>) {
        self.tx.send_replace(outcome);
    }

    pub fn subscribe(&self) -> watch::Receiver<Outcome<T>> {
        self.tx.subscribe()
    }
}

impl<T: Clone> Resource<T> {
    pub fn get(&self) -> Outcome<T> {
        self.tx.borrow().clone()
    }

    pub fn data(&self) -> Option<T> {
        self.tx.borrow().data().cloned()
    }
}

/// Handle given to a resource task body.
///
/// Writes go to the managed [`Resource`]; `token` fires when the task is
/// replaced or cancelled.
pub struct ResourceControl<T> {
    resource: Resource<T>,
    token: CancellationToken,
    reporter: Arc<dyn ErrorReporter>,
    source: Arc<str>,
    key: Arc<str>,
}

impl<T: Clone + Send + Sync + 'static> ResourceControl<T> {
    pub fn set(&self, outcome: Outcome<T>) {
        self.resource.set(outcome);
    }

    pub fn get(&self) -> Outcome<T> {
        self.resource.get()
    }

    pub fn resource(&self) -> &Resource<T> {
        &self.resource
    }

    pub fn token(&self) -> &CancellationToken {
        &self.token
    }

    pub async fn cancelled(&self) {
        self.token.cancelled().await;
    }

    /// Hands `error` to the reporter, tagged with this task's key.
    pub fn report(&self, error: TaskError) {
        self.reporter.report(
            Report::new(Arc::clone(&self.source), error).with_key(Arc::clone(&self.key)),
        );
    }

    /// Forwards every outcome of `outcomes` into the resource until the
    /// stream ends or the task is cancelled. Each `Outcome::Error` is also
    /// reported.
    pub async fn emit_all<S>(&self, outcomes: S)
    where
        S: Stream<Item = Outcome<T>> + Send,
    {
        let mut outcomes = std::pin::pin!(outcomes);
        loop {
            let next = tokio::select! {
                _ = self.token.cancelled() => return,
                next = outcomes.next() => next,
            };
            let Some(outcome) = next else {
                return;
            };
            if let Some(error) = outcome.error() {
                self.report(error.clone());
            }
            self.resource.set(outcome);
        }
    }
}

/// Runs loaders for keyed resources, one at a time per key.
///
/// Built on [`Supervisor`]: a new task for a key cancels and awaits the old
/// one. Around the body it publishes `Progress` first and turns a body error
/// into `Outcome::Error` plus one report.
pub struct ResourceManager<K: ResourceKey> {
    supervisor: Supervisor<K>,
    reporter: Arc<dyn ErrorReporter>,
}

impl<K: ResourceKey> Clone for ResourceManager<K> {
    fn clone(&self) -> Self {
        Self {
            supervisor: self.supervisor.clone(),
            reporter: Arc::clone(&self.reporter),
        }
    }
}

impl<K: ResourceKey> fmt::Debug for ResourceManager<K> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ResourceManager")
            .field("supervisor", &self.supervisor)
            .finish()
    }
}

impl<K: ResourceKey> ResourceManager<K> {
    pub fn new(supervisor: Supervisor<K>, reporter: Arc<dyn ErrorReporter>) -> Self {
        Self {
            supervisor,
            reporter,
        }
    }

    pub fn supervisor(&self) -> &Supervisor<K> {
        &self.supervisor
    }

    /// Launches `block` for `key`, seeding `Progress` with the resource's
    /// current data and keeping that data on error.
    pub fn launch_resource_task<T, F, Fut>(
        &self,
        key: K,
        resource: &Resource<T>,
        block: F,
    ) -> JoinHandle<Result<Exit, TaskError>>
    where
        T: Clone + Send + Sync + 'static,
        F: FnOnce(ResourceControl<T>) -> Fut + Send + 'static,
        Fut: Future<Output = Result<(), TaskError>> + Send + 'static,
    {
        let current = resource.data();
        self.launch_resource_task_with(key, resource, current, true, block)
    }

    /// Like [`launch_resource_task`](Self::launch_resource_task) with an
    /// explicit `Progress` seed and error-data policy.
    pub fn launch_resource_task_with<T, F, Fut>(
        &self,
        key: K,
        resource: &Resource<T>,
        current: Option<T>,
        keep_data_on_error: bool,
        block: F,
    ) -> JoinHandle<Result<Exit, TaskError>>
    where
        T: Clone + Send + Sync + 'static,
        F: FnOnce(ResourceControl<T>) -> Fut + Send + 'static,
        Fut: Future<Output = Result<(), TaskError>> + Send + 'static,
    {
        let resource = resource.clone();
        let reporter = Arc::clone(&self.reporter);
        let source: Arc<str> = Arc::from(self.supervisor.name());
        let key_label: Arc<str> = Arc::from(format!("{key:?}"));

        self.supervisor.launch_exclusive(key, move |token| async move {
            resource.set(Outcome::Progress(current));

            let control = ResourceControl {
                resource: resource.clone(),
                token,
                reporter: Arc::clone(&reporter),
                source: Arc::clone(&source),
                key: Arc::clone(&key_label),
            };

            match block(control).await {
                Err(error) if !error.is_cancellation() => {
                    tracing::warn!(source = %source, key = %key_label, %error, "resource task failed");
                    reporter.report(Report::new(source, error.clone()).with_key(key_label));
                    let data = if keep_data_on_error {
                        resource.data()
                    } else {
                        None
                    };
                    resource.set(Outcome::Error { error, data });
                    Ok(())
                }
                other => other,
            }
        })
    }

    pub fn is_resource_taken(&self, key: &K) -> bool {
        self.supervisor.is_key_owned(key)
    }

    pub fn cancel_resource(&self, key: &K) -> bool {
        self.supervisor.cancel(key)
    }

    /// Read-only view of the task managing `key`.
    pub fn current_task(&self, key: &K) -> Option<TaskHandle> {
        self.supervisor.current_owner(key)
    }

    /// Reports `outcome`'s error, if it carries one.
    pub fn report_error<T>(&self, outcome: &Outcome<T>) {
        if let Some(error) = outcome.error() {
            self.reporter
                .report(Report::new(self.supervisor.name(), error.clone()));
        }
    }
}
