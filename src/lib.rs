//! # relayvisor
//!
//! **Relayvisor** is a small concurrency-coordination toolkit for tokio.
//!
//! It turns one expensive upstream producer into a shared, reference-counted,
//! debounced multi-consumer stream, and runs keyed work so that at most one
//! unit of work per resource key is ever in flight.
//!
//! ## Architecture
//! ### Overview
//! ```text
//!   Consumer   Consumer   Consumer                 launch_exclusive(k, body)
//!      ▲          ▲          ▲                                │
//!      │ inbox    │ inbox    │ inbox                          ▼
//! ┌────┴──────────┴──────────┴─────────┐         ┌────────────────────────────┐
//! │ Relay<T>                           │         │ Supervisor<K>              │
//! │  - fan-out, LastValue (conflate)   │         │  - Registry: key → handle  │
//! │ ┌────────────────────────────────┐ │         │  - cancel + join previous  │
//! │ │ Gate                           │ │         │  - remove-if-current       │
//! │ │  - ConsumerSet, ProducerState  │ │         └─────────────┬──────────────┘
//! │ │  - Debouncer (grace period)    │ │                       │
//! │ └────────────────────────────────┘ │         ┌─────────────┴──────────────┐
//! └────────────────┬───────────────────┘         │ ResourceManager<K>         │
//!                  │ start / stop                │  - Outcome cell per loader │
//!                  ▼                             └────────────────────────────┘
//!             Upstream<T>
//!
//!  undeliverable failures ──► ErrorReporter          lifecycle events ──► Bus ──► SubscriberSet
//! ```
//!
//! ### Producer lifecycle
//! ```text
//! Inactive ──first attach──► Activating ──start() Ok──► Active ──last detach──► DrainingToInactive
//!    ▲                           │                        ▲                          │
//!    │                      start() Err                   └────── attach ────────────┤
//!    │                           ▼                                                   │
//!    └──────────── fail consumers | report ◄──── grace elapsed, still empty ─────────┘
//! ```
//!
//! ## Features
//! | Area              | Description                                                      | Key types / traits                          |
//! |-------------------|------------------------------------------------------------------|---------------------------------------------|
//! | **Debounce**      | Delay-then-run with reset on retrigger.                          | [`Debouncer`], [`DebounceConfig`]           |
//! | **Gate**          | Reference-counted, debounced producer activation.               | [`Gate`], [`GateHooks`], [`ProducerState`]  |
//! | **Relay**         | Multicast of one upstream to many consumers, optional replay.   | [`Relay`], [`Upstream`], [`Consumer`]       |
//! | **Supervision**   | Per-key exclusive task execution.                                | [`Supervisor`], [`TaskHandle`], [`Exit`]    |
//! | **Resources**     | Loader tasks publishing [`Outcome`]s.                            | [`ResourceManager`], [`Resource`]           |
//! | **Errors**        | Typed errors and a side channel for undeliverable failures.      | [`RelayError`], [`TaskError`], [`ErrorReporter`] |
//! | **Events**        | Lifecycle events and non-blocking subscribers.                   | [`Bus`], [`Event`], [`Subscribe`]           |
//!
//! ## Optional features
//! - `logging`: exports a simple built-in [`LogWriter`] _(demo/reference only)_.
//!
//! ## Example
//! ```rust
//! use std::time::Duration;
//! use futures::stream;
//! use relayvisor::{RelayConfig, RelayError, Supervisor, SupervisorConfig, share};
//!
//! #[tokio::main(flavor = "current_thread")]
//! async fn main() {
//!     let prices = share(
//!         || stream::iter(vec![Ok::<_, RelayError>(101), Ok(102)]),
//!         RelayConfig { conflate: true, grace: Duration::from_millis(250), ..RelayConfig::named("prices") },
//!     );
//!
//!     let mut consumer = prices.attach();
//!     while let Some(Ok(price)) = consumer.recv().await {
//!         println!("price: {price}");
//!     }
//!
//!     let sup = Supervisor::new(SupervisorConfig::default());
//!     let job = sup.launch_exclusive("refresh", |_token| async { Ok(()) });
//!     job.await.unwrap().unwrap();
//! }
//! ```

mod config;
mod debounce;
mod error;
mod events;
mod executor;
mod gate;
mod relay;
mod reporting;
mod resource;
mod subscribers;
mod supervisor;
mod sync;

// ---- Public re-exports ----

pub use config::{DEFAULT_DEBOUNCE, DebounceConfig, RelayConfig, SupervisorConfig};
pub use debounce::Debouncer;
pub use error::{RelayError, TaskError};
pub use events::{Bus, Event, EventKind};
pub use executor::Executor;
pub use gate::{ConsumerId, ConsumerSet, Gate, GateBuilder, GateHooks, Lease, ProducerState, Session};
pub use relay::{
    Consumer, Emitter, Inbox, LastValue, Relay, RelayBuilder, RelayHooks, StreamUpstream, Upstream,
    share,
};
pub use reporting::{ErrorReporter, Failure, LogReporter, Report};
pub use resource::{Outcome, Resource, ResourceControl, ResourceManager};
pub use subscribers::{Subscribe, SubscriberSet};
pub use supervisor::{Exit, ResourceKey, Supervisor, SupervisorBuilder, TaskHandle};

// Optional: expose a simple built-in logger subscriber (demo/reference).
// Enable with: `--features logging`
#[cfg(feature = "logging")]
pub use subscribers::LogWriter;
