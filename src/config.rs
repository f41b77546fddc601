//! # Component configuration.
//!
//! Provides plain settings structs for the three runtime components:
//! - [`DebounceConfig`] for [`Debouncer`](crate::Debouncer)
//! - [`RelayConfig`] for [`Gate`](crate::Gate) and [`Relay`](crate::Relay)
//! - [`SupervisorConfig`] for [`Supervisor`](crate::Supervisor)
//!
//! ## Sentinel values
//! - `RelayConfig::grace = 0s` → teardown immediately on last detach (no grace window)
//! - `DebounceConfig::delay = 0s` → actions run on the next scheduler tick

use std::borrow::Cow;
use std::time::Duration;

/// Default debounce delay, shared by debouncers and relay grace periods.
pub const DEFAULT_DEBOUNCE: Duration = Duration::from_millis(500);

/// Settings for a [`Debouncer`](crate::Debouncer).
#[derive(Clone, Debug)]
pub struct DebounceConfig {
    /// Quiet period that must elapse after the last `schedule` before the action runs.
    pub delay: Duration,

    /// Run immediately when nothing started within the last `delay`.
    ///
    /// When `false` every action waits for the full `delay` (trailing edge only).
    pub trigger_first_immediately: bool,
}

impl Default for DebounceConfig {
    /// - `delay = 500ms`
    /// - `trigger_first_immediately = false`
    fn default() -> Self {
        Self {
            delay: DEFAULT_DEBOUNCE,
            trigger_first_immediately: false,
        }
    }
}

/// Settings for a [`Gate`](crate::Gate) or [`Relay`](crate::Relay).
///
/// ## Field semantics
/// - `name`: label used in logs and events
/// - `grace`: how long the producer stays alive after the last consumer leaves (`0s` = none)
/// - `conflate`: keep the most recent value and replay it to late attachers
#[derive(Clone, Debug)]
pub struct RelayConfig {
    /// Human-readable name (for logs/events).
    pub name: Cow<'static, str>,

    /// Debounce window between the last detach and teardown.
    pub grace: Duration,

    /// Whether the last value is cached for replay.
    pub conflate: bool,
}

impl RelayConfig {
    /// Creates a config with the given name and default settings.
    pub fn named(name: impl Into<Cow<'static, str>>) -> Self {
        Self {
            name: name.into(),
            ..Self::default()
        }
    }

    /// Returns the grace period as an `Option`.
    ///
    /// - `None` → tear down on last detach
    /// - `Some(d)` → tear down after `d` without consumers
    #[inline]
    pub fn grace_period(&self) -> Option<Duration> {
        if self.grace == Duration::ZERO {
            None
        } else {
            Some(self.grace)
        }
    }
}

impl Default for RelayConfig {
    /// Default configuration:
    ///
    /// - `name = "relay"`
    /// - `grace = 500ms`
    /// - `conflate = false`
    fn default() -> Self {
        Self {
            name: Cow::Borrowed("relay"),
            grace: DEFAULT_DEBOUNCE,
            conflate: false,
        }
    }
}

/// Settings for a [`Supervisor`](crate::Supervisor).
#[derive(Clone, Debug)]
pub struct SupervisorConfig {
    /// Human-readable name (for logs/events).
    pub name: Cow<'static, str>,
}

impl Default for SupervisorConfig {
    fn default() -> Self {
        Self {
            name: Cow::Borrowed("supervisor"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_zero_grace_is_immediate() {
        let cfg = RelayConfig {
            grace: Duration::ZERO,
            ..RelayConfig::default()
        };
        assert_eq!(cfg.grace_period(), None);
    }

    #[test]
    fn test_defaults() {
        let cfg = RelayConfig::named("prices");
        assert_eq!(cfg.name, "prices");
        assert_eq!(cfg.grace_period(), Some(Duration::from_millis(500)));
        assert!(!cfg.conflate);

        let deb = DebounceConfig::default();
        assert_eq!(deb.delay, Duration::from_millis(500));
        assert!(!deb.trigger_first_immediately);
    }
}
