#![forbid(unsafe_code)]

//! The reactive correction engine.
//!
//! [`Engine`] owns the pending set, the correction cache, and the watch
//! registry. A host drives it with four kinds of calls:
//!
//! | Call | When |
//! |------|------|
//! | [`Engine::start`] | once, after settings are loaded |
//! | [`Engine::handle_mutations`] / [`Engine::handle_resize`] | when the host delivers notifications |
//! | [`Engine::flush`] | when a flush requested through the [`FlushScheduler`] comes due |
//!
//! Writes made by a flush produce `style` attribute records on armed
//! elements, which enqueue those elements again. The next flush finds the
//! desired value already in place and writes nothing, so the loop settles.
//! [`Engine::run_until_quiescent`] drives that loop to completion for hosts
//! that buffer notifications.

use std::sync::Arc;

use tracing::field::Empty;
use unround_core::host::{HostTree, MutationRecord, RecordSource, ResizeEntry};
use unround_core::settings::SettingsStore;
use web_time::Instant;

use crate::cache::CorrectionCache;
use crate::config::EngineConfig;
use crate::observers::{arm, route_mutations, route_resize};
use crate::pass::{CorrectionPass, PassReport};
use crate::queue::{BatchQueue, QueueStats};
use crate::registry::WatchRegistry;
use crate::scheduler::FlushScheduler;

/// Errors from driving the engine.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum EngineError {
    #[error("no fixed point after {rounds} flushes ({pending} elements still pending)")]
    NoFixedPoint { rounds: usize, pending: usize },
}

/// Lifetime counters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct EngineStats {
    /// Flushes that ran a pass.
    pub flushes: u64,
    /// Sum of every pass report.
    pub totals: PassReport,
    /// Elements armed for the first time.
    pub armed: u64,
    /// Encapsulated subtrees currently observed.
    pub shadow_roots: u64,
    /// Observation requests the host refused.
    pub observer_refusals: u64,
    /// Nodes purged after removal.
    pub purged: u64,
}

/// Batching, correction, and observer bookkeeping for one tree.
pub struct Engine<N, S> {
    config: EngineConfig,
    settings: Arc<SettingsStore>,
    scheduler: S,
    queue: BatchQueue<N>,
    cache: CorrectionCache<N>,
    registry: WatchRegistry<N>,
    stats: EngineStats,
}

impl<N, S> Engine<N, S>
where
    N: Copy + Eq + std::hash::Hash + std::fmt::Debug,
    S: FlushScheduler,
{
    /// Create an engine that reads settings from `settings`.
    pub fn new(config: EngineConfig, settings: Arc<SettingsStore>, scheduler: S) -> Self {
        Self {
            config,
            settings,
            scheduler,
            queue: BatchQueue::new(),
            cache: CorrectionCache::new(),
            registry: WatchRegistry::new(),
            stats: EngineStats::default(),
        }
    }

    // ── Inputs ───────────────────────────────────────────────────────────

    /// Observe the main tree's structure and enqueue every existing element.
    ///
    /// Returns the number of elements enqueued.
    pub fn start<H>(&mut self, host: &mut H) -> usize
    where
        H: HostTree<Node = N> + ?Sized,
    {
        let root = host.document_root();
        if let Err(err) = host.observe_child_list(root) {
            self.stats.observer_refusals += 1;
            tracing::warn!(message = "engine.start.observe_failed", error = %err);
        }
        let elements = host.descendant_elements(root);
        tracing::debug!(message = "engine.start", elements = elements.len());
        self.enqueue(host, elements)
    }

    /// Add elements to the pending set and schedule a flush.
    ///
    /// Non-element and dead handles are dropped. Returns how many handles
    /// were newly added.
    pub fn enqueue<H, I>(&mut self, host: &H, nodes: I) -> usize
    where
        H: HostTree<Node = N> + ?Sized,
        I: IntoIterator<Item = N>,
    {
        let mut added = 0;
        for node in nodes {
            if host.is_alive(node) && host.is_element(node) && self.queue.push(node) {
                added += 1;
            }
        }
        self.queue.schedule(&mut self.scheduler, &self.config);
        added
    }

    /// Route mutation records: purge removed nodes, enqueue changed ones.
    pub fn handle_mutations<H>(&mut self, host: &H, records: &[MutationRecord<N>]) -> usize
    where
        H: HostTree<Node = N> + ?Sized,
    {
        if records.is_empty() {
            return 0;
        }
        let routed = route_mutations(host, records);
        for node in routed.removed {
            self.purge(node);
        }
        self.enqueue(host, routed.enqueue)
    }

    /// Route resize entries.
    pub fn handle_resize<H>(&mut self, host: &H, entries: &[ResizeEntry<N>]) -> usize
    where
        H: HostTree<Node = N> + ?Sized,
    {
        if entries.is_empty() {
            return 0;
        }
        self.enqueue(host, route_resize(entries))
    }

    fn purge(&mut self, node: N) {
        self.cache.forget(node);
        self.registry.forget(node);
        self.queue.discard(node);
        self.stats.purged += 1;
    }

    // ── Flush ────────────────────────────────────────────────────────────

    /// Run one correction pass over everything pending, then arm the
    /// evaluated elements.
    ///
    /// Elements enqueued while this runs (including encapsulated-subtree
    /// contents found while arming) go into a fresh batch with its own
    /// scheduled flush.
    pub fn flush<H>(&mut self, host: &mut H) -> PassReport
    where
        H: HostTree<Node = N> + ?Sized,
    {
        let batch = self.queue.take_batch();
        if batch.is_empty() {
            return PassReport::default();
        }

        let span = tracing::debug_span!(
            "unround.flush",
            batch = batch.len(),
            elapsed_us = Empty
        );
        let _guard = span.enter();
        let started = Instant::now();

        let settings = self.settings.load();
        let outcome = CorrectionPass::new(&settings, &mut self.cache).apply(host, &batch);

        for node in outcome.arm {
            let armed = arm(host, &mut self.registry, self.config.attribute_filter, node);
            if armed.newly_armed {
                self.stats.armed += 1;
            }
            self.stats.observer_refusals += armed.refused as u64;
            if !armed.shadow_elements.is_empty() {
                self.enqueue(host, armed.shadow_elements);
            }
        }
        self.stats.shadow_roots = self.registry.shadow_root_len() as u64;

        self.stats.flushes += 1;
        self.stats.totals.merge(&outcome.report);
        span.record("elapsed_us", started.elapsed().as_micros() as u64);
        tracing::debug!(
            message = "engine.flush",
            examined = outcome.report.examined,
            written = outcome.report.written,
            deferred = outcome.report.deferred,
            pending = self.queue.len()
        );
        outcome.report
    }

    /// Pump buffered notifications and flush until nothing is pending.
    ///
    /// Returns the number of flushes run. Fails when work is still pending
    /// after `max_rounds` flushes.
    pub fn run_until_quiescent<H>(
        &mut self,
        host: &mut H,
        max_rounds: usize,
    ) -> Result<usize, EngineError>
    where
        H: RecordSource<Node = N> + ?Sized,
    {
        let mut rounds = 0;
        loop {
            let records = host.take_mutation_records();
            self.handle_mutations(host, &records);
            let entries = host.take_resize_entries();
            self.handle_resize(host, &entries);

            if self.queue.is_empty() {
                return Ok(rounds);
            }
            if rounds == max_rounds {
                return Err(EngineError::NoFixedPoint {
                    rounds,
                    pending: self.queue.len(),
                });
            }
            self.flush(host);
            rounds += 1;
        }
    }

    // ── Accessors ────────────────────────────────────────────────────────

    #[must_use]
    pub const fn config(&self) -> &EngineConfig {
        &self.config
    }

    #[must_use]
    pub fn settings(&self) -> &Arc<SettingsStore> {
        &self.settings
    }

    #[must_use]
    pub const fn cache(&self) -> &CorrectionCache<N> {
        &self.cache
    }

    #[must_use]
    pub const fn registry(&self) -> &WatchRegistry<N> {
        &self.registry
    }

    #[must_use]
    pub const fn scheduler(&self) -> &S {
        &self.scheduler
    }

    pub fn scheduler_mut(&mut self) -> &mut S {
        &mut self.scheduler
    }

    #[must_use]
    pub const fn stats(&self) -> EngineStats {
        self.stats
    }

    #[must_use]
    pub const fn queue_stats(&self) -> QueueStats {
        self.queue.stats()
    }

    #[must_use]
    pub fn pending_len(&self) -> usize {
        self.queue.len()
    }

    #[must_use]
    pub const fn is_flush_scheduled(&self) -> bool {
        self.queue.is_flush_scheduled()
    }
}

impl<N, S: std::fmt::Debug> std::fmt::Debug for Engine<N, S> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Engine")
            .field("config", &self.config)
            .field("scheduler", &self.scheduler)
            .field("stats", &self.stats)
            .finish_non_exhaustive()
    }
}
