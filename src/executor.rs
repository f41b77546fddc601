//! # Execution context provider.
//!
//! [`Executor`] is the single seam through which every component spawns work,
//! sleeps and reads the clock. It wraps a [`tokio::runtime::Handle`], so the
//! clock is the runtime's clock: under `#[tokio::test(start_paused = true)]`
//! all debounce windows run on virtual time and advance deterministically.
//!
//! Components receive an `Executor` at construction; none of them reach for
//! a global runtime on their own.

use std::future::Future;
use std::time::Duration;

use tokio::runtime::Handle;
use tokio::task::JoinHandle;
use tokio::time::Instant;

/// Worker pool and clock used for suspension points and timers.
#[derive(Clone, Debug)]
pub struct Executor {
    handle: Handle,
}

impl Executor {
    /// Uses the runtime the caller is currently running in.
    ///
    /// # Panics
    /// Panics when called outside of a tokio runtime, like [`Handle::current`].
    pub fn current() -> Self {
        Self {
            handle: Handle::current(),
        }
    }

    /// Like [`Executor::current`], returning `None` outside of a runtime.
    pub fn try_current() -> Option<Self> {
        Handle::try_current().ok().map(|handle| Self { handle })
    }

    /// Uses an explicit runtime handle.
    pub fn from_handle(handle: Handle) -> Self {
        Self { handle }
    }

    /// Spawns a future onto the runtime's worker pool.
    pub fn spawn<F>(&self, fut: F) -> JoinHandle<F::Output>
    where
        F: Future + Send + 'static,
        F::Output: Send + 'static,
    {
        self.handle.spawn(fut)
    }

    /// Cancellable sleep on the runtime clock.
    pub async fn sleep(&self, delay: Duration) {
        tokio::time::sleep(delay).await;
    }

    /// Current instant on the runtime clock (virtual when the clock is paused).
    pub fn now(&self) -> Instant {
        Instant::now()
    }

    /// The wrapped runtime handle.
    pub fn handle(&self) -> &Handle {
        &self.handle
    }
}

impl From<Handle> for Executor {
    fn from(handle: Handle) -> Self {
        Self::from_handle(handle)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test(start_paused = true)]
    async fn test_sleep_follows_paused_clock() {
        let executor = Executor::current();
        let start = executor.now();

        executor.sleep(Duration::from_secs(30)).await;
        assert_eq!(executor.now() - start, Duration::from_secs(30));
    }

    #[test]
    fn test_try_current_outside_runtime() {
        assert!(Executor::try_current().is_none());

        let rt = tokio::runtime::Builder::new_current_thread()
            .build()
            .unwrap();
        let executor = Executor::from(rt.handle().clone());
        let out = rt.block_on(executor.spawn(async { 7 })).unwrap();
        assert_eq!(out, 7);
    }
}
