use tokio_util::sync::CancellationToken;

/// How a supervised body ended, when it did not fail.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Exit {
    /// Body returned `Ok` without being cancelled.
    Completed,
    /// Body unwound after its owner was cancelled or replaced.
    Cancelled,
    /// Owner was cancelled while waiting for its predecessor; body never ran.
    Skipped,
}

impl Exit {
    pub fn as_label(self) -> &'static str {
        match self {
            Exit::Completed => "completed",
            Exit::Cancelled => "cancelled",
            Exit::Skipped => "skipped",
        }
    }
}

/// Read-only view of the task owning a key.
///
/// Obtained from [`Supervisor::current_owner`](crate::Supervisor::current_owner).
/// It can be awaited but not cancelled; cancellation goes through
/// [`Supervisor::cancel`](crate::Supervisor::cancel) so ownership bookkeeping
/// stays consistent.
#[derive(Debug, Clone)]
pub struct TaskHandle {
    id: u64,
    cancel: CancellationToken,
    done: CancellationToken,
}

impl TaskHandle {
    #[cfg(test)]
    pub(crate) fn new(id: u64) -> Self {
        Self::with_token(id, CancellationToken::new())
    }

    pub(crate) fn with_token(id: u64, cancel: CancellationToken) -> Self {
        Self {
            id,
            cancel,
            done: CancellationToken::new(),
        }
    }

    /// Supervisor-unique task id, increasing with launch order.
    pub fn id(&self) -> u64 {
        self.id
    }

    /// True once cancellation has been requested.
    pub fn is_cancelled(&self) -> bool {
        self.cancel.is_cancelled()
    }

    /// True once the task terminated and its cleanup ran.
    pub fn is_finished(&self) -> bool {
        self.done.is_cancelled()
    }

    /// Waits until the task terminated and its cleanup ran.
    pub async fn wait(&self) {
        self.done.cancelled().await;
    }

    pub(crate) fn cancel(&self) {
        self.cancel.cancel();
    }

    pub(crate) fn token(&self) -> &CancellationToken {
        &self.cancel
    }

    pub(crate) fn finish(&self) {
        self.done.cancel();
    }
}
