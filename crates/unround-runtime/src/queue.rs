#![forbid(unsafe_code)]

//! Deduplicating batch queue with a single outstanding flush.
//!
//! # Invariants
//!
//! 1. An element appears in the pending set at most once, so any number of
//!    enqueues between two flushes costs one evaluation.
//! 2. At most one flush is requested from the scheduler at a time.
//! 3. [`BatchQueue::take_batch`] clears the scheduled flag before the caller
//!    runs the pass, so enqueues made during the pass schedule a new flush
//!    instead of being lost.

use std::hash::Hash;

use ahash::AHashSet;

use crate::config::EngineConfig;
use crate::scheduler::FlushScheduler;

/// Lifetime counters for a [`BatchQueue`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct QueueStats {
    /// `push` calls, duplicates included.
    pub enqueued: u64,
    /// Pushes that were already pending.
    pub coalesced: u64,
    /// Flushes requested from the scheduler.
    pub flushes_scheduled: u64,
    /// Requests that fell back to the timer.
    pub timer_fallbacks: u64,
    /// Batches handed out.
    pub batches: u64,
}

/// Pending elements plus the scheduled-flush flag.
#[derive(Debug, Clone)]
pub struct BatchQueue<N> {
    pending: AHashSet<N>,
    flush_scheduled: bool,
    stats: QueueStats,
}

impl<N> Default for BatchQueue<N> {
    fn default() -> Self {
        Self {
            pending: AHashSet::new(),
            flush_scheduled: false,
            stats: QueueStats::default(),
        }
    }
}

impl<N: Copy + Eq + Hash> BatchQueue<N> {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Add `node` to the pending set. Returns `false` if it was already there.
    pub fn push(&mut self, node: N) -> bool {
        self.stats.enqueued += 1;
        let fresh = self.pending.insert(node);
        if !fresh {
            self.stats.coalesced += 1;
        }
        fresh
    }

    /// Request a flush if work is pending and none is scheduled yet.
    ///
    /// Returns whether a new request was made.
    pub fn schedule<S: FlushScheduler + ?Sized>(
        &mut self,
        scheduler: &mut S,
        config: &EngineConfig,
    ) -> bool {
        if self.flush_scheduled || self.pending.is_empty() {
            return false;
        }
        self.flush_scheduled = true;
        self.stats.flushes_scheduled += 1;
        if !scheduler.request_idle(config.idle_timeout) {
            self.stats.timer_fallbacks += 1;
            scheduler.request_timeout(config.fallback_delay);
        }
        tracing::trace!(
            message = "queue.schedule",
            pending = self.pending.len(),
            fallback = self.stats.timer_fallbacks
        );
        true
    }

    /// Snapshot and clear the pending set and the scheduled flag.
    pub fn take_batch(&mut self) -> Vec<N> {
        self.flush_scheduled = false;
        self.stats.batches += 1;
        self.pending.drain().collect()
    }

    /// Drop a node from the pending set (it was removed from the tree).
    pub fn discard(&mut self, node: N) -> bool {
        self.pending.remove(&node)
    }

    #[must_use]
    pub fn contains(&self, node: N) -> bool {
        self.pending.contains(&node)
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.pending.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.pending.is_empty()
    }

    #[must_use]
    pub const fn is_flush_scheduled(&self) -> bool {
        self.flush_scheduled
    }

    #[must_use]
    pub const fn stats(&self) -> QueueStats {
        self.stats
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::scheduler::{FlushRequest, ManualScheduler};
    use std::time::Duration;

    #[test]
    fn duplicates_coalesce() {
        let mut queue = BatchQueue::new();
        for _ in 0..50 {
            queue.push(7_u32);
        }
        assert_eq!(queue.len(), 1);
        assert_eq!(queue.stats().enqueued, 50);
        assert_eq!(queue.stats().coalesced, 49);
        assert_eq!(queue.take_batch(), vec![7]);
        assert!(queue.is_empty());
    }

    #[test]
    fn one_flush_outstanding() {
        let config = EngineConfig::default();
        let mut scheduler = ManualScheduler::new();
        let mut queue = BatchQueue::new();

        assert!(!queue.schedule(&mut scheduler, &config), "nothing pending");
        queue.push(1_u32);
        assert!(queue.schedule(&mut scheduler, &config));
        queue.push(2);
        assert!(!queue.schedule(&mut scheduler, &config));
        assert_eq!(
            scheduler.requests(),
            &[FlushRequest::Idle {
                timeout: Duration::from_millis(100)
            }]
        );
    }

    #[test]
    fn falls_back_to_timer() {
        let config = EngineConfig::default();
        let mut scheduler = ManualScheduler::without_idle();
        let mut queue = BatchQueue::new();
        queue.push(1_u32);
        queue.schedule(&mut scheduler, &config);
        assert_eq!(
            scheduler.requests(),
            &[FlushRequest::Timeout {
                delay: Duration::from_millis(50)
            }]
        );
        assert_eq!(queue.stats().timer_fallbacks, 1);
    }

    #[test]
    fn take_batch_rearms_scheduling() {
        let config = EngineConfig::default();
        let mut scheduler = ManualScheduler::new();
        let mut queue = BatchQueue::new();
        queue.push(1_u32);
        queue.schedule(&mut scheduler, &config);

        let batch = queue.take_batch();
        assert_eq!(batch, vec![1]);
        assert!(!queue.is_flush_scheduled());

        // Re-entrant enqueue while the batch is being processed.
        queue.push(1);
        assert!(queue.schedule(&mut scheduler, &config));
        assert_eq!(scheduler.requests().len(), 2);
    }

    #[test]
    fn discard_removes_pending() {
        let mut queue = BatchQueue::new();
        queue.push(4_u32);
        assert!(queue.discard(4));
        assert!(!queue.contains(4));
        assert!(!queue.discard(4));
    }
}
