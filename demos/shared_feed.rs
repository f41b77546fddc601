//! # Example: shared_feed
//!
//! Demonstrates one expensive upstream shared by several consumers.
//!
//! Shows how to:
//! - Implement [`Upstream`] and push values through an [`Emitter`].
//! - Attach consumers to a conflating [`Relay`] and read from their inboxes.
//! - Reattach inside the grace period and receive the cached last value
//!   without restarting the upstream.
//! - Render lifecycle events with the built-in `LogWriter`.
//!
//! ## Flow
//! ```text
//! main()
//!   ├─► relay.attach()           ─► Ticker::start (once)
//!   ├─► read 3 ticks, detach     ─► DrainingToInactive (grace 300ms)
//!   ├─► sleep 100ms, attach      ─► Active again, last tick replayed, no restart
//!   ├─► detach, sleep 500ms      ─► grace elapsed ─► Ticker::stop
//!   └─► attach                   ─► Ticker::start (second session, empty cache)
//! ```
//!
//! ## Run
//! ```bash
//! RUST_LOG=info cargo run --example shared_feed --features logging
//! ```

use std::sync::Arc;
use std::sync::atomic::{AtomicU32, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use relayvisor::{
    Bus, Emitter, LogWriter, Relay, RelayConfig, RelayError, Subscribe, SubscriberSet,
    Upstream,
};

/// Emits an increasing counter every 50ms while active.
struct Ticker {
    sessions: AtomicU32,
}

#[async_trait]
impl Upstream<u64> for Ticker {
    async fn start(&self, emitter: Emitter<u64>) -> Result<(), RelayError> {
        let session = self.sessions.fetch_add(1, Ordering::SeqCst) + 1;
        println!("[ticker] start (session #{session})");

        let tick = emitter.clone();
        emitter.spawn(async move {
            let mut n = 0;
            loop {
                tokio::time::sleep(Duration::from_millis(50)).await;
                n += 1;
                if tick.emit(n).is_err() {
                    break;
                }
            }
        });
        Ok(())
    }

    async fn stop(&self) {
        println!("[ticker] stop");
    }
}

#[tokio::main(flavor = "current_thread")]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let bus = Bus::new(256);
    let writers: Vec<Arc<dyn Subscribe>> = vec![Arc::new(LogWriter::new())];
    let subs = SubscriberSet::new(writers, bus.clone()).listen();

    let relay = Relay::builder(Ticker {
        sessions: AtomicU32::new(0),
    })
    .config(RelayConfig {
        grace: Duration::from_millis(300),
        conflate: true,
        ..RelayConfig::named("ticker")
    })
    .bus(bus)
    .build();

    let mut first = relay.attach();
    for _ in 0..3 {
        if let Some(Ok(n)) = first.recv().await {
            println!("[first] tick {n}");
        }
    }
    first.detach();
    println!("[main] state after detach: {}", relay.state());

    tokio::time::sleep(Duration::from_millis(100)).await;
    let mut second = relay.attach();
    if let Some(Ok(n)) = second.recv().await {
        println!("[second] replayed tick {n}");
    }
    second.detach();

    tokio::time::sleep(Duration::from_millis(500)).await;
    println!("[main] state after grace: {}", relay.state());

    let mut third = relay.attach();
    if let Some(Ok(n)) = third.recv().await {
        println!("[third] fresh tick {n}");
    }
    third.detach();

    subs.shutdown().await;
}
