//! # Keyed task supervisor.
//!
//! [`Supervisor`] maps resource keys to at most one running body. A new
//! launch for a key cancels the current owner and waits for it to unwind
//! before its own body starts, so two bodies for the same key never overlap.
//!
//! ## Rules
//! - Registry mutations are serialized by one lock per supervisor.
//! - An owner unregisters itself on exit only if it is still the owner.
//! - Cancellation is cooperative and is not an error.
//! - Body errors and panics go back to the launcher through the `JoinHandle`.

mod core;
mod handle;
mod registry;

pub use self::core::{ResourceKey, Supervisor, SupervisorBuilder};
pub use handle::{Exit, TaskHandle};

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::SupervisorConfig;
    use crate::error::TaskError;

    use std::sync::{Arc, Mutex};
    use std::time::Duration;
    use tokio_util::sync::CancellationToken;

    type Log = Arc<Mutex<Vec<&'static str>>>;

    fn sup() -> Supervisor<&'static str> {
        Supervisor::new(SupervisorConfig::default())
    }

    async fn settle() {
        for _ in 0..8 {
            tokio::task::yield_now().await;
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_successor_starts_after_predecessor_cleanup() {
        let sup = sup();
        let log: Log = Arc::default();

        let a = sup.launch_exclusive("k", {
            let log = log.clone();
            move |token| async move {
                log.lock().unwrap().push("a:start");
                token.cancelled().await;
                tokio::time::sleep(Duration::from_millis(100)).await;
                log.lock().unwrap().push("a:cleanup");
                Err(TaskError::Canceled)
            }
        });
        settle().await;

        let b = sup.launch_exclusive("k", {
            let log = log.clone();
            move |_token| async move {
                log.lock().unwrap().push("b:start");
                Ok(())
            }
        });

        assert_eq!(a.await.unwrap(), Ok(Exit::Cancelled));
        assert_eq!(b.await.unwrap(), Ok(Exit::Completed));
        assert_eq!(*log.lock().unwrap(), vec!["a:start", "a:cleanup", "b:start"]);
        assert!(!sup.is_key_owned(&"k"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_late_finishing_predecessor_keeps_successor_registered() {
        let sup = sup();

        let a = sup.launch_exclusive("k", |token| async move {
            token.cancelled().await;
            tokio::time::sleep(Duration::from_millis(200)).await;
            Ok(())
        });
        settle().await;

        let b = sup.launch_exclusive("k", |_token| async { Ok(()) });
        tokio::time::sleep(Duration::from_millis(50)).await;
        let c = sup.launch_exclusive("k", |_token| async {
            tokio::time::sleep(Duration::from_secs(1)).await;
            Ok(())
        });
        let c_id = sup.current_owner(&"k").map(|h| h.id());

        assert_eq!(a.await.unwrap(), Ok(Exit::Cancelled));
        settle().await;
        assert_eq!(sup.current_owner(&"k").map(|h| h.id()), c_id);

        assert_eq!(b.await.unwrap(), Ok(Exit::Skipped));
        assert_eq!(c.await.unwrap(), Ok(Exit::Completed));
        assert!(sup.current_owner(&"k").is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn test_body_error_propagates_and_entry_is_removed() {
        let sup = sup();
        let h = sup.launch_exclusive("k", |_token| async { Err(TaskError::fail("disk full")) });

        assert_eq!(h.await.unwrap(), Err(TaskError::fail("disk full")));
        assert!(sup.is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_panicking_body_still_releases_key() {
        let sup = sup();
        async fn explode(_token: CancellationToken) -> Result<(), TaskError> {
            panic!("body blew up")
        }

        let a = sup.launch_exclusive("k", explode);
        settle().await;
        let b = sup.launch_exclusive("k", |_token| async { Ok(()) });

        assert!(a.await.unwrap_err().is_panic());
        assert_eq!(b.await.unwrap(), Ok(Exit::Completed));
        assert!(!sup.is_key_owned(&"k"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancel_keeps_entry_until_unwound() {
        let sup = sup();
        let h = sup.launch_exclusive("k", |token| async move {
            token.cancelled().await;
            tokio::time::sleep(Duration::from_millis(100)).await;
            Ok(())
        });
        settle().await;

        assert!(sup.cancel(&"k"));
        assert!(sup.is_key_owned(&"k"));
        assert!(sup.current_owner(&"k").is_some_and(|o| o.is_cancelled()));

        assert_eq!(h.await.unwrap(), Ok(Exit::Cancelled));
        assert!(!sup.is_key_owned(&"k"));
        assert!(!sup.cancel(&"k"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_keys_are_independent() {
        let sup = sup();
        let log: Log = Arc::default();

        let mut handles = Vec::new();
        for key in ["a", "b"] {
            let log = log.clone();
            handles.push(sup.launch_exclusive(key, move |_token| async move {
                log.lock().unwrap().push(key);
                tokio::time::sleep(Duration::from_millis(100)).await;
                Ok(())
            }));
        }
        settle().await;

        assert_eq!(log.lock().unwrap().len(), 2);
        let mut keys = sup.keys();
        keys.sort_unstable();
        assert_eq!(keys, vec!["a", "b"]);

        for h in handles {
            assert_eq!(h.await.unwrap(), Ok(Exit::Completed));
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancel_all_and_wait_idle() {
        let sup = sup();
        for key in ["a", "b", "c"] {
            sup.launch_exclusive(key, |token| async move {
                token.cancelled().await;
                Ok(())
            });
        }
        settle().await;
        assert_eq!(sup.len(), 3);

        sup.cancel_all().await;
        settle().await;
        assert!(sup.is_empty());
        sup.wait_idle().await;
    }

    #[tokio::test(start_paused = true)]
    async fn test_parent_cancellation_skips_waiting_body() {
        let parent = CancellationToken::new();
        let sup = Supervisor::<&'static str>::builder(SupervisorConfig::default())
            .parent(parent.clone())
            .build();

        let a = sup.launch_exclusive("k", |token| async move {
            token.cancelled().await;
            tokio::time::sleep(Duration::from_millis(50)).await;
            Ok(())
        });
        settle().await;
        let b = sup.launch_exclusive("k", |_token| async { Ok(()) });
        parent.cancel();

        assert_eq!(a.await.unwrap(), Ok(Exit::Cancelled));
        assert_eq!(b.await.unwrap(), Ok(Exit::Skipped));
    }

    #[tokio::test(start_paused = true)]
    async fn test_dropping_supervisor_cancels_owners() {
        let sup = sup();
        let h = sup.launch_exclusive("k", |token| async move {
            token.cancelled().await;
            Ok(())
        });
        settle().await;
        drop(sup);
        assert_eq!(h.await.unwrap(), Ok(Exit::Cancelled));
    }

    #[tokio::test(start_paused = true)]
    async fn test_owner_aborted_before_start_releases_key() {
        let sup = sup();
        let a = sup.launch_exclusive("k", |token| async move {
            token.cancelled().await;
            Ok(())
        });
        a.abort();
        assert!(a.await.unwrap_err().is_cancelled());
        assert!(!sup.is_key_owned(&"k"));

        let b = sup.launch_exclusive("k", |_token| async { Ok(()) });
        let out = tokio::time::timeout(Duration::from_secs(60), b)
            .await
            .expect("successor must not wait on the aborted owner");
        assert_eq!(out.unwrap(), Ok(Exit::Completed));
        assert!(!sup.is_key_owned(&"k"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_aborting_waiting_successor_keeps_chain_moving() {
        let sup = sup();
        let log: Arc<Mutex<Vec<&'static str>>> = Arc::default();

        let l = Arc::clone(&log);
        let a = sup.launch_exclusive("k", move |token| async move {
            token.cancelled().await;
            tokio::time::sleep(Duration::from_millis(100)).await;
            l.lock().unwrap().push("a:cleanup");
            Ok(())
        });
        settle().await;
        let b = sup.launch_exclusive("k", |_token| async { Ok(()) });
        settle().await;
        b.abort();
        settle().await;

        let l = Arc::clone(&log);
        let c = sup.launch_exclusive("k", move |_token| async move {
            l.lock().unwrap().push("c:start");
            Ok(())
        });

        assert_eq!(a.await.unwrap(), Ok(Exit::Cancelled));
        assert!(b.await.unwrap_err().is_cancelled());
        assert_eq!(c.await.unwrap(), Ok(Exit::Completed));
        assert_eq!(*log.lock().unwrap(), vec!["a:cleanup", "c:start"]);
        assert!(sup.is_empty());
    }
}
