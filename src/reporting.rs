//! # Side error channel.
//!
//! A failure that has no attached consumer to go to (an upstream error during
//! a debounce window, a resource task error routed away from its resource)
//! is handed to an [`ErrorReporter`] exactly once. Unlike the [`Bus`](crate::Bus),
//! reporting is synchronous and never drops.
//!
//! ## Example
//! ```rust
//! use std::sync::{Arc, Mutex};
//! use relayvisor::{ErrorReporter, Report};
//!
//! let seen: Arc<Mutex<Vec<String>>> = Arc::default();
//! let sink = {
//!     let seen = seen.clone();
//!     move |r: Report| seen.lock().unwrap().push(r.failure.to_string())
//! };
//! let reporter: Arc<dyn ErrorReporter> = Arc::new(sink);
//! # let _ = reporter;
//! ```

use std::fmt;
use std::sync::Arc;
use std::time::SystemTime;

use crate::error::{RelayError, TaskError};

/// The failure carried by a [`Report`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Failure {
    Relay(RelayError),
    Task(TaskError),
}

impl Failure {
    pub fn as_label(&self) -> &'static str {
        match self {
            Failure::Relay(e) => e.as_label(),
            Failure::Task(e) => e.as_label(),
        }
    }
}

impl fmt::Display for Failure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Failure::Relay(e) => e.fmt(f),
            Failure::Task(e) => e.fmt(f),
        }
    }
}

impl From<RelayError> for Failure {
    fn from(e: RelayError) -> Self {
        Failure::Relay(e)
    }
}

impl From<TaskError> for Failure {
    fn from(e: TaskError) -> Self {
        Failure::Task(e)
    }
}

/// One undeliverable failure.
#[derive(Debug, Clone)]
pub struct Report {
    /// Name of the gate, relay or manager that produced it.
    pub source: Arc<str>,
    /// Resource key (debug formatted), when the failure belongs to a keyed task.
    pub key: Option<Arc<str>>,
    pub failure: Failure,
    pub at: SystemTime,
}

impl Report {
    pub fn new(source: impl Into<Arc<str>>, failure: impl Into<Failure>) -> Self {
        Self {
            source: source.into(),
            key: None,
            failure: failure.into(),
            at: SystemTime::now(),
        }
    }

    #[inline]
    pub fn with_key(mut self, key: impl Into<Arc<str>>) -> Self {
        self.key = Some(key.into());
        self
    }
}

/// Receives failures nobody else is positioned to handle.
///
/// Called inline from whichever task observed the failure; implementations
/// should hand off slow work instead of blocking.
pub trait ErrorReporter: Send + Sync + 'static {
    fn report(&self, report: Report);
}

impl<F> ErrorReporter for F
where
    F: Fn(Report) + Send + Sync + 'static,
{
    fn report(&self, report: Report) {
        self(report)
    }
}

/// Default reporter: logs through `tracing` at error level.
#[derive(Debug, Default, Clone, Copy)]
pub struct LogReporter;

impl ErrorReporter for LogReporter {
    fn report(&self, report: Report) {
        tracing::error!(
            source = %report.source,
            key = report.key.as_deref().unwrap_or("-"),
            label = report.failure.as_label(),
            "undeliverable failure: {}",
            report.failure
        );
    }
}
