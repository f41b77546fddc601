//! # Activation gate: reference-counted, debounced producer lifecycle.
//!
//! A [`Gate`] counts attached consumers. The first attach starts the
//! producer ([`GateHooks::activate`]); the last detach starts a grace timer
//! and, if nobody comes back before it fires, the producer is stopped
//! ([`GateHooks::deactivate`]). Reattaching inside the grace window reuses
//! the running producer and replays its cached state.
//!
//! The gate is generic over the consumer payload so the same state machine
//! backs both plain reference counting (`Consumer = ()`) and the
//! [`Relay`](crate::Relay) fan-out (`Consumer = inbox sender`).
//!
//! ## Failure routing
//! ```text
//! activate() Err / Session::fail(e)
//!        │
//!        ├── consumers attached ─► GateHooks::fail(consumer, e) for each
//!        └── none attached / stale session ─► ErrorReporter::report(e)   (exactly once)
//! ```

mod core;
mod hooks;
mod session;
mod state;

pub use self::core::{Gate, GateBuilder, Lease};
pub use hooks::GateHooks;
pub use session::Session;
pub use state::{ConsumerId, ConsumerSet, ProducerState};

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::RelayConfig;
    use crate::error::RelayError;
    use crate::reporting::{ErrorReporter, Report};

    use async_trait::async_trait;
    use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
    use std::sync::{Arc, Mutex};
    use std::time::Duration;
    use tokio::sync::Notify;

    #[derive(Default)]
    struct Counters {
        activations: AtomicUsize,
        deactivations: AtomicUsize,
        fail_with: Mutex<Option<RelayError>>,
        hold: Option<Arc<Notify>>,
        panic_on_activate: AtomicBool,
        panic_on_deactivate: bool,
    }

    #[derive(Clone, Default)]
    struct Counting(Arc<Counters>);

    #[async_trait]
    impl GateHooks for Counting {
        type Consumer = ();
        type Cache = ();

        async fn activate(&self, _session: Session<Self>) -> Result<(), RelayError> {
            self.0.activations.fetch_add(1, Ordering::SeqCst);
            if self.0.panic_on_activate.swap(false, Ordering::SeqCst) {
                panic!("gps driver crashed");
            }
            if let Some(hold) = &self.0.hold {
                hold.notified().await;
            }
            match self.0.fail_with.lock().unwrap().take() {
                Some(err) => Err(err),
                None => Ok(()),
            }
        }

        async fn deactivate(&self) {
            self.0.deactivations.fetch_add(1, Ordering::SeqCst);
            if self.0.panic_on_deactivate {
                panic!("gps driver stuck");
            }
        }
    }

    fn gate(hooks: Counting, grace_ms: u64) -> Gate<Counting> {
        Gate::builder(hooks)
            .config(RelayConfig {
                grace: Duration::from_millis(grace_ms),
                ..RelayConfig::named("test")
            })
            .build()
    }

    fn collecting() -> (Arc<dyn ErrorReporter>, Arc<Mutex<Vec<Report>>>) {
        let seen: Arc<Mutex<Vec<Report>>> = Arc::default();
        let sink = seen.clone();
        (Arc::new(move |r: Report| sink.lock().unwrap().push(r)), seen)
    }

    async fn settle() {
        for _ in 0..8 {
            tokio::task::yield_now().await;
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_first_attach_activates_and_grace_deactivates() {
        let hooks = Counting::default();
        let g = gate(hooks.clone(), 500);
        assert_eq!(g.state(), ProducerState::Inactive);

        let lease = g.attach(());
        settle().await;
        assert_eq!(g.state(), ProducerState::Active);
        assert_eq!(hooks.0.activations.load(Ordering::SeqCst), 1);

        lease.detach();
        assert_eq!(g.state(), ProducerState::DrainingToInactive);
        assert!(g.is_active());

        tokio::time::sleep(Duration::from_millis(499)).await;
        assert_eq!(g.state(), ProducerState::DrainingToInactive);

        tokio::time::sleep(Duration::from_millis(2)).await;
        settle().await;
        assert_eq!(g.state(), ProducerState::Inactive);
        assert_eq!(hooks.0.deactivations.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_reattach_within_grace_reuses_producer() {
        let hooks = Counting::default();
        let g = gate(hooks.clone(), 500);

        let first = g.attach(());
        settle().await;
        drop(first);

        tokio::time::sleep(Duration::from_millis(300)).await;
        let second = g.attach(());
        assert_eq!(g.state(), ProducerState::Active);

        tokio::time::sleep(Duration::from_secs(2)).await;
        assert_eq!(g.state(), ProducerState::Active);
        assert_eq!(hooks.0.activations.load(Ordering::SeqCst), 1);
        assert_eq!(hooks.0.deactivations.load(Ordering::SeqCst), 0);
        drop(second);
    }

    #[tokio::test(start_paused = true)]
    async fn test_counts_overlapping_consumers() {
        let hooks = Counting::default();
        let g = gate(hooks.clone(), 0);

        let a = g.attach(());
        let b = g.attach(());
        settle().await;
        assert_eq!(g.consumer_count(), 2);

        drop(a);
        settle().await;
        assert_eq!(g.state(), ProducerState::Active);

        drop(b);
        assert_eq!(g.state(), ProducerState::Inactive);
        settle().await;
        assert_eq!(hooks.0.deactivations.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_detach_during_activation_tears_down_when_activation_returns() {
        let hold = Arc::new(Notify::new());
        let hooks = Counting(Arc::new(Counters {
            hold: Some(hold.clone()),
            ..Counters::default()
        }));
        let g = gate(hooks.clone(), 500);

        let lease = g.attach(());
        settle().await;
        assert_eq!(g.state(), ProducerState::Activating);

        drop(lease);
        assert_eq!(g.state(), ProducerState::Activating);

        hold.notify_one();
        settle().await;
        assert_eq!(g.state(), ProducerState::Inactive);
        assert_eq!(hooks.0.deactivations.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_activation_failure_without_consumers_is_reported_once() {
        let hold = Arc::new(Notify::new());
        let hooks = Counting(Arc::new(Counters {
            hold: Some(hold.clone()),
            fail_with: Mutex::new(Some(RelayError::activation("no gps"))),
            ..Counters::default()
        }));
        let (reporter, seen) = collecting();
        let g = Gate::builder(hooks.clone())
            .config(RelayConfig::named("gps"))
            .reporter(reporter)
            .build();

        drop(g.attach(()));
        hold.notify_one();
        settle().await;

        let seen = seen.lock().unwrap();
        assert_eq!(seen.len(), 1);
        assert_eq!(&*seen[0].source, "gps");
        assert_eq!(seen[0].failure.as_label(), "relay_activation_failed");
        assert_eq!(g.state(), ProducerState::Inactive);
    }

    #[tokio::test(start_paused = true)]
    async fn test_reactivation_waits_for_previous_teardown() {
        let hooks = Counting::default();
        let g = gate(hooks.clone(), 0);

        let a = g.attach(());
        settle().await;
        drop(a);
        let b = g.attach(());
        settle().await;

        assert_eq!(hooks.0.activations.load(Ordering::SeqCst), 2);
        assert_eq!(hooks.0.deactivations.load(Ordering::SeqCst), 1);
        assert_eq!(g.state(), ProducerState::Active);
        drop(b);
    }

    #[tokio::test(start_paused = true)]
    async fn test_panicking_activation_fails_session_and_gate_recovers() {
        let hooks = Counting(Arc::new(Counters {
            panic_on_activate: AtomicBool::new(true),
            ..Counters::default()
        }));
        let (reporter, seen) = collecting();
        let g = Gate::builder(hooks.clone())
            .config(RelayConfig {
                grace: Duration::ZERO,
                ..RelayConfig::named("gps")
            })
            .reporter(reporter)
            .build();

        let first = g.attach(());
        settle().await;
        assert_eq!(g.state(), ProducerState::Inactive);
        assert_eq!(g.consumer_count(), 0);
        {
            let seen = seen.lock().unwrap();
            assert_eq!(seen.len(), 1);
            assert_eq!(seen[0].failure.as_label(), "relay_activation_failed");
        }
        assert_eq!(hooks.0.deactivations.load(Ordering::SeqCst), 1);
        drop(first);

        let second = g.attach(());
        settle().await;
        assert_eq!(g.state(), ProducerState::Active);
        assert_eq!(hooks.0.activations.load(Ordering::SeqCst), 2);
        drop(second);
    }

    #[tokio::test(start_paused = true)]
    async fn test_panicking_deactivation_does_not_block_reactivation() {
        let hooks = Counting(Arc::new(Counters {
            panic_on_deactivate: true,
            ..Counters::default()
        }));
        let (reporter, seen) = collecting();
        let g = Gate::builder(hooks.clone())
            .config(RelayConfig {
                grace: Duration::ZERO,
                ..RelayConfig::named("gps")
            })
            .reporter(reporter)
            .build();

        drop(g.attach(()));
        settle().await;
        let again = g.attach(());
        settle().await;

        assert_eq!(g.state(), ProducerState::Active);
        assert_eq!(hooks.0.activations.load(Ordering::SeqCst), 2);
        assert_eq!(hooks.0.deactivations.load(Ordering::SeqCst), 1);
        assert_eq!(seen.lock().unwrap().len(), 1);
        drop(again);
    }

    #[tokio::test(start_paused = true)]
    async fn test_dropping_every_handle_while_draining_still_deactivates() {
        let hooks = Counting::default();
        let g = gate(hooks.clone(), 500);

        let lease = g.attach(());
        settle().await;
        drop(lease);
        assert_eq!(g.state(), ProducerState::DrainingToInactive);
        drop(g);

        tokio::time::sleep(Duration::from_secs(5)).await;
        settle().await;
        assert_eq!(hooks.0.deactivations.load(Ordering::SeqCst), 1);
    }
}
