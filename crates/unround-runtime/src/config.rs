#![forbid(unsafe_code)]

//! Engine tuning knobs.

use std::time::Duration;

/// Attributes whose change re-enqueues an armed element.
pub const OBSERVED_ATTRIBUTES: &[&str] = &["style", "class", "src"];

/// Configuration for an [`Engine`](crate::Engine).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EngineConfig {
    /// Longest the host may postpone an idle-time flush.
    /// Default: 100ms.
    pub idle_timeout: Duration,

    /// Timer delay used when the host has no idle scheduling.
    /// Default: 50ms.
    pub fallback_delay: Duration,

    /// Attribute names requested when arming an element.
    /// Default: [`OBSERVED_ATTRIBUTES`].
    pub attribute_filter: &'static [&'static str],
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            idle_timeout: Duration::from_millis(100),
            fallback_delay: Duration::from_millis(50),
            attribute_filter: OBSERVED_ATTRIBUTES,
        }
    }
}

impl EngineConfig {
    /// Override the idle timeout.
    #[must_use]
    pub const fn with_idle_timeout(mut self, timeout: Duration) -> Self {
        self.idle_timeout = timeout;
        self
    }

    /// Override the fallback timer delay.
    #[must_use]
    pub const fn with_fallback_delay(mut self, delay: Duration) -> Self {
        self.fallback_delay = delay;
        self
    }
}
