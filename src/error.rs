//! Error types used by relays, gates and the keyed supervisor.
//!
//! This module defines two main error enums:
//!
//! - [`RelayError`]: failures raised while producing or broadcasting values.
//! - [`TaskError`]: failures raised by bodies run under a [`Supervisor`](crate::Supervisor).
//!
//! Both types are `Clone`: a single upstream failure is fanned out to every
//! attached consumer, so each one receives its own copy.
//! Both provide helper methods (`as_label`, `as_message`) for logging/metrics.

use thiserror::Error;

/// # Errors produced by an upstream producer or a relay.
///
/// Delivered to attached consumers as a terminal item, or to the
/// [`ErrorReporter`](crate::ErrorReporter) when nobody is attached.
#[non_exhaustive]
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum RelayError {
    /// The upstream `start` routine failed.
    #[error("activation failed: {error}")]
    Activation {
        /// The underlying error message.
        error: String,
    },

    /// The upstream failed after it was started.
    #[error("upstream failed: {error}")]
    Upstream {
        /// The underlying error message.
        error: String,
    },

    /// A value was emitted through an emitter whose producer was already torn down.
    #[error("cannot send data when producer is inactive")]
    Inactive,
}

impl RelayError {
    /// Shorthand for [`RelayError::Activation`].
    pub fn activation(error: impl std::fmt::Display) -> Self {
        RelayError::Activation {
            error: error.to_string(),
        }
    }

    /// Shorthand for [`RelayError::Upstream`].
    pub fn upstream(error: impl std::fmt::Display) -> Self {
        RelayError::Upstream {
            error: error.to_string(),
        }
    }

    /// Returns a short stable label (snake_case) for use in logs/metrics.
    ///
    /// # Example
    /// ```
    /// use relayvisor::RelayError;
    ///
    /// let err = RelayError::activation("socket refused");
    /// assert_eq!(err.as_label(), "relay_activation_failed");
    /// ```
    pub fn as_label(&self) -> &'static str {
        match self {
            RelayError::Activation { .. } => "relay_activation_failed",
            RelayError::Upstream { .. } => "relay_upstream_failed",
            RelayError::Inactive => "relay_inactive",
        }
    }

    /// Returns a human-readable message with details about the error.
    pub fn as_message(&self) -> String {
        match self {
            RelayError::Activation { error } => format!("activation: {error}"),
            RelayError::Upstream { error } => format!("upstream: {error}"),
            RelayError::Inactive => "producer inactive".to_string(),
        }
    }
}

/// # Errors produced by supervised task bodies.
///
/// [`TaskError::Canceled`] is not a failure: it is how a body acknowledges
/// that its [`CancellationToken`](tokio_util::sync::CancellationToken) fired.
#[non_exhaustive]
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum TaskError {
    /// Non-recoverable error.
    #[error("fatal error: {error}")]
    Fatal {
        /// The underlying error message.
        error: String,
    },

    /// Body failed; the caller decides whether to resubmit.
    #[error("execution failed: {error}")]
    Fail {
        /// The underlying error message.
        error: String,
    },

    /// Body observed cancellation and unwound.
    #[error("context cancelled")]
    Canceled,
}

impl TaskError {
    /// Shorthand for [`TaskError::Fail`].
    pub fn fail(error: impl std::fmt::Display) -> Self {
        TaskError::Fail {
            error: error.to_string(),
        }
    }

    /// Returns a short stable label (snake_case) for use in logs/metrics.
    ///
    /// # Example
    /// ```
    /// use relayvisor::TaskError;
    ///
    /// let err = TaskError::fail("boom");
    /// assert_eq!(err.as_label(), "task_failed");
    /// ```
    pub fn as_label(&self) -> &'static str {
        match self {
            TaskError::Fatal { .. } => "task_fatal",
            TaskError::Fail { .. } => "task_failed",
            TaskError::Canceled => "task_canceled",
        }
    }

    /// Returns a human-readable message with details about the error.
    pub fn as_message(&self) -> String {
        match self {
            TaskError::Fatal { error } => format!("fatal: {error}"),
            TaskError::Fail { error } => format!("error: {error}"),
            TaskError::Canceled => "context cancelled".to_string(),
        }
    }

    /// True for [`TaskError::Canceled`], which is treated as normal teardown.
    ///
    /// # Example
    /// ```
    /// use relayvisor::TaskError;
    ///
    /// assert!(TaskError::Canceled.is_cancellation());
    /// assert!(!TaskError::fail("nope").is_cancellation());
    /// ```
    pub fn is_cancellation(&self) -> bool {
        matches!(self, TaskError::Canceled)
    }
}

impl From<RelayError> for TaskError {
    fn from(err: RelayError) -> Self {
        TaskError::Fail {
            error: err.to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_only_canceled_is_cancellation() {
        assert!(TaskError::Canceled.is_cancellation());
        assert!(!TaskError::fail("x").is_cancellation());
        assert!(
            !TaskError::Fatal {
                error: "corrupt index".into()
            }
            .is_cancellation()
        );
    }

    #[test]
    fn test_relay_error_converts_to_task_failure() {
        let err: TaskError = RelayError::upstream("eof").into();
        assert_eq!(err.as_label(), "task_failed");
        assert_eq!(err.as_message(), "error: upstream failed: eof");
    }
}
