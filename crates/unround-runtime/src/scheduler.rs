#![forbid(unsafe_code)]

//! Deferred flush scheduling.
//!
//! The engine never sleeps or spawns. When work is pending it asks the host
//! to call [`Engine::flush`](crate::Engine::flush) later, preferably when the
//! host is idle. Hosts without an idle notion decline the idle request and
//! the engine falls back to a plain timer.

use std::time::Duration;

/// Host hook for requesting a deferred flush.
pub trait FlushScheduler {
    /// Request a flush at the host's next idle point, no later than
    /// `timeout`. Return `false` when idle scheduling is unavailable.
    fn request_idle(&mut self, timeout: Duration) -> bool;

    /// Request a flush after `delay`.
    fn request_timeout(&mut self, delay: Duration);
}

impl<S: FlushScheduler + ?Sized> FlushScheduler for Box<S> {
    fn request_idle(&mut self, timeout: Duration) -> bool {
        (**self).request_idle(timeout)
    }

    fn request_timeout(&mut self, delay: Duration) {
        (**self).request_timeout(delay);
    }
}

/// One recorded flush request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FlushRequest {
    Idle { timeout: Duration },
    Timeout { delay: Duration },
}

/// Scheduler that only records requests; the driver decides when to flush.
#[derive(Debug, Clone)]
pub struct ManualScheduler {
    idle_supported: bool,
    requests: Vec<FlushRequest>,
}

impl Default for ManualScheduler {
    fn default() -> Self {
        Self::new()
    }
}

impl ManualScheduler {
    /// A scheduler that accepts idle requests.
    #[must_use]
    pub const fn new() -> Self {
        Self {
            idle_supported: true,
            requests: Vec::new(),
        }
    }

    /// A scheduler that declines idle requests, forcing the timer fallback.
    #[must_use]
    pub const fn without_idle() -> Self {
        Self {
            idle_supported: false,
            requests: Vec::new(),
        }
    }

    /// Every request made so far, oldest first.
    #[must_use]
    pub fn requests(&self) -> &[FlushRequest] {
        &self.requests
    }

    /// Take and clear the recorded requests.
    pub fn drain(&mut self) -> Vec<FlushRequest> {
        std::mem::take(&mut self.requests)
    }
}

impl FlushScheduler for ManualScheduler {
    fn request_idle(&mut self, timeout: Duration) -> bool {
        if self.idle_supported {
            self.requests.push(FlushRequest::Idle { timeout });
        }
        self.idle_supported
    }

    fn request_timeout(&mut self, delay: Duration) {
        self.requests.push(FlushRequest::Timeout { delay });
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn declined_idle_is_not_recorded() {
        let mut scheduler = ManualScheduler::without_idle();
        assert!(!scheduler.request_idle(Duration::from_millis(100)));
        assert!(scheduler.requests().is_empty());
    }

    #[test]
    fn drain_clears() {
        let mut scheduler = ManualScheduler::new();
        assert!(scheduler.request_idle(Duration::from_millis(100)));
        scheduler.request_timeout(Duration::from_millis(50));
        assert_eq!(
            scheduler.drain(),
            vec![
                FlushRequest::Idle {
                    timeout: Duration::from_millis(100)
                },
                FlushRequest::Timeout {
                    delay: Duration::from_millis(50)
                },
            ]
        );
        assert!(scheduler.requests().is_empty());
    }

    #[test]
    fn boxed_scheduler_forwards() {
        let mut boxed: Box<dyn FlushScheduler> = Box::new(ManualScheduler::without_idle());
        assert!(!boxed.request_idle(Duration::from_millis(1)));
        boxed.request_timeout(Duration::from_millis(2));
    }
}
