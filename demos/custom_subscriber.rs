//! # Example: custom_subscriber
//!
//! Demonstrates how to observe lifecycle events.
//!
//! Shows how to:
//! - Implement the [`Subscribe`] trait.
//! - Inspect [`Event`] / [`EventKind`] for producer and task lifecycle.
//! - Wire a [`Bus`] into a relay and a supervisor and drive subscribers
//!   through [`SubscriberSet::listen`].
//!
//! ## Flow
//! ```text
//! Relay / Supervisor ── publish(Event) ──► Bus ──► SubscriberSet listener
//!                                                     └─► ConsoleSubscriber.on_event()
//! ```
//!
//! ## Run
//! ```bash
//! cargo run --example custom_subscriber
//! ```

use std::sync::Arc;
use std::time::Duration;

use futures::stream;
use relayvisor::{
    Bus, Event, EventKind, Relay, RelayConfig, RelayError, StreamUpstream, Subscribe, SubscriberSet,
    Supervisor, SupervisorConfig,
};

/// Prints selected events.
struct ConsoleSubscriber;

#[async_trait::async_trait]
impl Subscribe for ConsoleSubscriber {
    async fn on_event(&self, ev: &Event) {
        let source = ev.source.as_deref().unwrap_or("<unknown>");
        match ev.kind {
            EventKind::ProducerActivating | EventKind::ProducerActive | EventKind::ProducerInactive => {
                println!("[sub] #{} {:?} source={source}", ev.seq, ev.kind);
            }
            EventKind::ProducerDraining => {
                println!(
                    "[sub] #{} draining source={source} grace={}ms",
                    ev.seq,
                    ev.delay_ms.unwrap_or(0)
                );
            }
            EventKind::TaskLaunched | EventKind::TaskFinished | EventKind::TaskCancelled => {
                println!(
                    "[sub] #{} {:?} source={source} key={} id={}",
                    ev.seq,
                    ev.kind,
                    ev.key.as_deref().unwrap_or("-"),
                    ev.task_id.unwrap_or(0)
                );
            }
            _ => {}
        }
    }

    fn name(&self) -> &'static str {
        "console"
    }

    fn queue_capacity(&self) -> usize {
        256
    }
}

#[tokio::main(flavor = "current_thread")]
async fn main() {
    let bus = Bus::new(256);
    let subscribers: Vec<Arc<dyn Subscribe>> = vec![Arc::new(ConsoleSubscriber)];
    let subs = SubscriberSet::new(subscribers, bus.clone()).listen();

    let relay = Relay::builder(StreamUpstream::new(|| stream::iter(vec![Ok::<_, RelayError>("a"), Ok("b")])))
        .config(RelayConfig {
            grace: Duration::from_millis(100),
            ..RelayConfig::named("letters")
        })
        .bus(bus.clone())
        .build();

    let mut consumer = relay.attach();
    while let Some(item) = consumer.recv().await {
        println!("[main] got {item:?}");
    }

    let sup = Supervisor::<&'static str>::builder(SupervisorConfig::default())
        .bus(bus.clone())
        .build();
    let first = sup.launch_exclusive("job", |token| async move {
        token.cancelled().await;
        Ok(())
    });
    tokio::task::yield_now().await;
    let second = sup.launch_exclusive("job", |_token| async { Ok(()) });
    let _ = first.await;
    let _ = second.await;

    tokio::time::sleep(Duration::from_millis(200)).await;
    subs.shutdown().await;
}
