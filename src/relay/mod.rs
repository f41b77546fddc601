//! # Multicast relay: one upstream, many consumers.
//!
//! A [`Relay`] is a [`Gate`](crate::Gate) whose consumers are inboxes and
//! whose producer is an [`Upstream`]. The upstream subscribes once and every
//! value it pushes through its [`Emitter`] is copied into each attached
//! consumer's inbox.
//!
//! ```text
//!                        ┌──────────────┐
//!  Upstream::start ───►  │   Emitter    │ ── emit(v) ──► lock ─┬─► inbox#1 ─► Consumer
//!  (once per session)    └──────────────┘                      ├─► inbox#2 ─► Consumer
//!                                                              └─► LastValue (conflate)
//! ```
//!
//! ## Rules
//! - Delivery never blocks: inboxes are unbounded, one per consumer.
//! - Per-consumer order equals emission order; a replayed cached value always
//!   precedes live values.
//! - The cache is cleared at teardown, so a restarted producer never leaks
//!   values from the previous session.
//! - `complete` closes every inbox; `fail` ends every inbox with the error,
//!   or reports it when no consumer is attached.

mod core;
mod upstream;

pub use self::core::{Consumer, Inbox, LastValue, Relay, RelayBuilder, RelayHooks, share};
pub use upstream::{Emitter, StreamUpstream, Upstream};

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::RelayConfig;
    use crate::error::RelayError;
    use crate::gate::ProducerState;
    use crate::reporting::{ErrorReporter, Report};

    use async_trait::async_trait;
    use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
    use std::sync::{Arc, Mutex};
    use std::time::Duration;

    /// Upstream driven by hand from the test body.
    struct Manual<T: Clone + Send + 'static> {
        starts: AtomicUsize,
        stops: AtomicUsize,
        emitter: Mutex<Option<Emitter<T>>>,
        refuse: Option<RelayError>,
        crash_once: AtomicBool,
    }

    impl<T: Clone + Send + 'static> Manual<T> {
        fn new() -> Arc<Self> {
            Arc::new(Self {
                starts: AtomicUsize::new(0),
                stops: AtomicUsize::new(0),
                emitter: Mutex::new(None),
                refuse: None,
                crash_once: AtomicBool::new(false),
            })
        }

        fn emitter(&self) -> Emitter<T> {
            self.emitter.lock().unwrap().clone().expect("upstream not started")
        }
    }

    #[async_trait]
    impl<T: Clone + Send + 'static> Upstream<T> for Arc<Manual<T>> {
        async fn start(&self, emitter: Emitter<T>) -> Result<(), RelayError> {
            self.starts.fetch_add(1, Ordering::SeqCst);
            if self.crash_once.swap(false, Ordering::SeqCst) {
                panic!("socket driver crashed");
            }
            if let Some(err) = &self.refuse {
                return Err(err.clone());
            }
            *self.emitter.lock().unwrap() = Some(emitter);
            Ok(())
        }

        async fn stop(&self) {
            self.stops.fetch_add(1, Ordering::SeqCst);
        }
    }

    fn relay<T: Clone + Send + 'static>(
        upstream: &Arc<Manual<T>>,
        grace_ms: u64,
        conflate: bool,
    ) -> Relay<T> {
        Relay::builder(Arc::clone(upstream))
            .config(RelayConfig {
                grace: Duration::from_millis(grace_ms),
                conflate,
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
    async fn test_fan_out_preserves_order_per_consumer() {
        let up = Manual::new();
        let relay = relay(&up, 500, false);

        let mut a = relay.attach();
        let mut b = relay.attach();
        settle().await;

        let emitter = up.emitter();
        for n in 1..=3 {
            emitter.emit(n).unwrap();
        }

        for c in [&mut a, &mut b] {
            assert_eq!(c.try_recv(), Some(Ok(1)));
            assert_eq!(c.try_recv(), Some(Ok(2)));
            assert_eq!(c.try_recv(), Some(Ok(3)));
            assert_eq!(c.try_recv(), None);
        }
        assert_eq!(up.starts.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_reattach_in_grace_replays_last_value_without_restart() {
        let up = Manual::new();
        let relay = relay(&up, 500, true);

        let mut first = relay.attach();
        settle().await;
        up.emitter().emit("x").unwrap();
        assert_eq!(first.recv().await, Some(Ok("x")));
        first.detach();
        assert_eq!(relay.state(), ProducerState::DrainingToInactive);

        tokio::time::sleep(Duration::from_millis(200)).await;
        let mut second = relay.attach();
        assert_eq!(second.try_recv(), Some(Ok("x")));
        assert_eq!(relay.state(), ProducerState::Active);

        tokio::time::sleep(Duration::from_secs(1)).await;
        assert_eq!(up.starts.load(Ordering::SeqCst), 1);
        assert_eq!(up.stops.load(Ordering::SeqCst), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_zero_grace_restart_drops_cached_value() {
        let up = Manual::new();
        let relay = relay(&up, 0, true);

        let mut c1 = relay.attach();
        settle().await;
        let stale = up.emitter();
        stale.emit("x").unwrap();
        assert_eq!(c1.recv().await, Some(Ok("x")));
        c1.detach();
        assert_eq!(relay.state(), ProducerState::Inactive);

        let mut c2 = relay.attach();
        settle().await;
        assert_eq!(c2.try_recv(), None);
        assert_eq!(up.starts.load(Ordering::SeqCst), 2);
        assert_eq!(up.stops.load(Ordering::SeqCst), 1);
        assert_eq!(stale.emit("late"), Err(RelayError::Inactive));
        assert_eq!(c2.try_recv(), None);
    }

    #[tokio::test(start_paused = true)]
    async fn test_late_attacher_without_conflation_sees_only_live_values() {
        let up = Manual::new();
        let relay = relay(&up, 500, false);

        let _early = relay.attach();
        settle().await;
        up.emitter().emit(1).unwrap();

        let mut late = relay.attach();
        assert_eq!(late.try_recv(), None);
        up.emitter().emit(2).unwrap();
        assert_eq!(late.try_recv(), Some(Ok(2)));
    }

    #[tokio::test(start_paused = true)]
    async fn test_complete_closes_every_inbox() {
        let up = Manual::new();
        let relay = relay(&up, 500, false);

        let mut a = relay.attach();
        let mut b = relay.attach();
        settle().await;
        let emitter = up.emitter();
        emitter.emit(7).unwrap();
        assert!(emitter.complete());
        assert!(!emitter.complete());

        assert_eq!(a.recv().await, Some(Ok(7)));
        assert_eq!(a.recv().await, None);
        assert_eq!(b.recv().await, Some(Ok(7)));
        assert_eq!(b.recv().await, None);

        settle().await;
        assert_eq!(relay.state(), ProducerState::Inactive);
        assert_eq!(up.stops.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_failure_reaches_consumers_not_reporter() {
        let up = Manual::<u8>::new();
        let (reporter, seen) = collecting();
        let relay = Relay::builder(Arc::clone(&up))
            .config(RelayConfig::named("feed"))
            .reporter(reporter)
            .build();

        let mut c = relay.attach();
        settle().await;
        up.emitter().fail(RelayError::upstream("socket closed"));

        assert_eq!(c.recv().await, Some(Err(RelayError::upstream("socket closed"))));
        assert_eq!(c.recv().await, None);
        assert!(seen.lock().unwrap().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_failure_with_no_consumer_is_reported_exactly_once() {
        let up = Manual::<u8>::new();
        let (reporter, seen) = collecting();
        let relay = Relay::builder(Arc::clone(&up))
            .config(RelayConfig::named("feed"))
            .reporter(reporter)
            .build();

        let c = relay.attach();
        settle().await;
        let emitter = up.emitter();
        c.detach();
        assert_eq!(relay.state(), ProducerState::DrainingToInactive);

        emitter.fail(RelayError::upstream("boom"));
        assert_eq!(relay.state(), ProducerState::Inactive);

        tokio::time::sleep(Duration::from_secs(1)).await;
        let seen = seen.lock().unwrap();
        assert_eq!(seen.len(), 1);
        assert_eq!(&*seen[0].source, "feed");
        assert_eq!(seen[0].failure.as_label(), "relay_upstream_failed");
    }

    #[tokio::test(start_paused = true)]
    async fn test_activation_error_is_terminal_for_attached_consumer() {
        let up = Arc::new(Manual::<u8> {
            refuse: Some(RelayError::activation("permission denied")),
            ..Arc::into_inner(Manual::new()).unwrap()
        });
        let relay = relay(&up, 500, false);

        let mut c = relay.attach();
        assert_eq!(
            c.recv().await,
            Some(Err(RelayError::activation("permission denied")))
        );
        assert_eq!(c.recv().await, None);
        settle().await;
        assert_eq!(relay.state(), ProducerState::Inactive);
    }

    #[tokio::test(start_paused = true)]
    async fn test_stream_upstream_emits_then_completes() {
        let relay = share(
            || futures::stream::iter(vec![Ok::<_, RelayError>("a"), Ok("b")]),
            RelayConfig::named("letters"),
        );

        let mut c = relay.attach();
        assert_eq!(c.recv().await, Some(Ok("a")));
        assert_eq!(c.recv().await, Some(Ok("b")));
        assert_eq!(c.recv().await, None);
    }

    #[tokio::test(start_paused = true)]
    async fn test_stream_upstream_stops_at_first_error() {
        let relay = share(
            || futures::stream::iter(vec![Ok(1), Err(RelayError::upstream("eof")), Ok(2)]),
            RelayConfig::named("numbers"),
        );

        let mut c = relay.attach();
        assert_eq!(c.recv().await, Some(Ok(1)));
        assert_eq!(c.recv().await, Some(Err(RelayError::upstream("eof"))));
        assert_eq!(c.recv().await, None);
    }

    #[tokio::test(start_paused = true)]
    async fn test_panicking_start_fails_consumers_and_next_attach_restarts() {
        let up = Manual::<u32>::new();
        up.crash_once.store(true, Ordering::SeqCst);
        let relay = relay(&up, 0, false);

        let mut c = relay.attach();
        assert!(matches!(
            c.recv().await,
            Some(Err(RelayError::Activation { .. }))
        ));
        assert_eq!(c.recv().await, None);
        settle().await;
        assert_eq!(relay.state(), ProducerState::Inactive);
        drop(c);

        let mut again = relay.attach();
        settle().await;
        assert_eq!(up.starts.load(Ordering::SeqCst), 2);
        assert_eq!(relay.state(), ProducerState::Active);

        up.emitter().emit(5).unwrap();
        assert_eq!(again.recv().await, Some(Ok(5)));
    }

    #[tokio::test(start_paused = true)]
    async fn test_relay_dropped_during_grace_still_stops_upstream() {
        let up = Manual::<u32>::new();
        let relay = relay(&up, 500, true);

        let c = relay.attach();
        settle().await;
        drop(c);
        drop(relay);

        tokio::time::sleep(Duration::from_secs(5)).await;
        settle().await;
        assert_eq!(up.stops.load(Ordering::SeqCst), 1);
        assert_eq!(up.emitter().emit(1), Err(RelayError::Inactive));
    }
}
