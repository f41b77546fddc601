//! # Debouncer: one pending deferred action, restarted on every trigger.
//!
//! ```text
//! schedule(A) ──┐ t=0
//!               │ wait 500ms
//! schedule(B) ──┼──► A discarded (never runs), wait restarts   t=200
//!               │ wait 500ms
//!               └──► B runs                                    t=700
//! ```
//!
//! ## Rules
//! - At most **one** pending action per debouncer.
//! - A new `schedule` cancels the pending action before arming its own.
//! - Once an action has started it is never interrupted by a later `schedule`.
//! - A panic inside the action is not caught; it ends up in the spawned
//!   task's `JoinHandle` like any other tokio task panic.
//! - Dropping the debouncer discards the pending action.

use std::future::Future;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

use crate::config::DebounceConfig;
use crate::executor::Executor;
use crate::sync::lock;

#[derive(Default)]
struct DebounceState {
    /// Token of the currently armed action.
    pending: Option<CancellationToken>,
    /// Bumped on every `schedule`; lets a firing action know it is still current.
    generation: u64,
    /// When the last action started (drives `trigger_first_immediately`).
    last_start: Option<Instant>,
}

/// Runs only the last scheduled action once its quiet period elapses.
pub struct Debouncer {
    executor: Executor,
    config: DebounceConfig,
    state: Arc<Mutex<DebounceState>>,
}

impl Debouncer {
    /// Creates a debouncer that spawns its actions on `executor`.
    pub fn new(config: DebounceConfig, executor: Executor) -> Self {
        Self {
            executor,
            config,
            state: Arc::new(Mutex::new(DebounceState::default())),
        }
    }

    /// Configured default delay.
    pub fn delay(&self) -> Duration {
        self.config.delay
    }

    /// Schedules `action` after the configured delay.
    pub fn schedule<F, Fut>(&self, action: F)
    where
        F: FnOnce() -> Fut + Send + 'static,
        Fut: Future<Output = ()> + Send + 'static,
    {
        self.schedule_after(self.config.delay, action);
    }

    /// Cancels the pending action (if any) and arms `action` to run after `delay`.
    pub fn schedule_after<F, Fut>(&self, delay: Duration, action: F)
    where
        F: FnOnce() -> Fut + Send + 'static,
        Fut: Future<Output = ()> + Send + 'static,
    {
        let token = CancellationToken::new();
        let (generation, wait) = {
            let mut st = lock(&self.state);
            if let Some(prev) = st.pending.replace(token.clone()) {
                prev.cancel();
            }
            st.generation += 1;
            (st.generation, self.effective_wait(delay, st.last_start))
        };

        let state = Arc::clone(&self.state);
        self.executor.spawn(async move {
            if !wait.is_zero() {
                tokio::select! {
                    biased;
                    _ = token.cancelled() => return,
                    _ = tokio::time::sleep(wait) => {}
                }
            }

            {
                let mut st = lock(&state);
                if token.is_cancelled() || st.generation != generation {
                    return;
                }
                st.pending = None;
                st.last_start = Some(Instant::now());
            }

            action().await;
        });
    }

    /// True while an action is armed and has not started yet.
    pub fn is_pending(&self) -> bool {
        lock(&self.state).pending.is_some()
    }

    fn effective_wait(&self, delay: Duration, last_start: Option<Instant>) -> Duration {
        if !self.config.trigger_first_immediately {
            return delay;
        }
        match last_start {
            Some(at) if at.elapsed() < delay => delay,
            _ => Duration::ZERO,
        }
    }
}

impl Drop for Debouncer {
    fn drop(&mut self) {
        if let Some(pending) = lock(&self.state).pending.take() {
            pending.cancel();
        }
    }
}

impl std::fmt::Debug for Debouncer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Debouncer")
            .field("config", &self.config)
            .field("pending", &self.is_pending())
            .finish()
    }
}
