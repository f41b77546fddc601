//! # Keyed resource loading on top of the supervisor.
//!
//! A [`Resource`] is an observable [`Outcome`] cell. A [`ResourceManager`]
//! runs one loader per key through a [`Supervisor`](crate::Supervisor) and
//! wraps it in a fixed protocol:
//!
//! ```text
//! launch_resource_task(key, resource, block)
//!   └─► (after predecessor unwound) resource = Progress(current data)
//!         └─► block(control)
//!               ├─ Ok / cancelled ─► resource left as block set it
//!               └─ Err(e) ─► report(e) once ─► resource = Error { e, last data | None }
//! ```

mod manager;
mod outcome;

pub use manager::{Resource, ResourceControl, ResourceManager};
pub use outcome::Outcome;
