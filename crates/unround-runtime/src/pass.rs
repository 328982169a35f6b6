#![forbid(unsafe_code)]

//! The correction pass: the only code path that writes to the host.
//!
//! A pass runs over one batch against one settings snapshot. Each element is
//! handled independently; a host error on one element is logged, counted in
//! [`PassReport::faults`], and does not affect the rest of the batch.
//!
//! # Per-element steps
//!
//! 1. Skip handles that are dead or not elements.
//! 2. Skip elements named by the exclusion lists (checked fresh every pass).
//! 3. Skip elements with no rounding unless `edit_all` is set.
//! 4. Evaluate the policy. `NoChange` and `Defer` write nothing.
//! 5. Skip the write when the cache and the live inline value both already
//!    hold the desired radius.
//! 6. Otherwise write with [`Priority::Important`] and update the cache.
//!
//! Every element that reaches step 4 is returned in [`PassOutcome::arm`] so
//! the caller can attach observers to it.

use std::hash::Hash;

use tracing::field::Empty;
use unround_core::host::{HostError, HostTree, Priority};
use unround_core::policy::{Evaluation, evaluate};
use unround_core::radius::has_rounding;
use unround_core::settings::Settings;

use crate::cache::CorrectionCache;

/// Counters for one pass.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PassReport {
    /// Handles taken from the batch.
    pub examined: usize,
    /// Dead handles and non-elements.
    pub skipped_invalid: usize,
    /// Elements named by an exclusion list.
    pub skipped_excluded: usize,
    /// Elements without rounding while `edit_all` is off.
    pub skipped_not_candidate: usize,
    /// Policy waited for geometry.
    pub deferred: usize,
    /// Policy asked for nothing.
    pub unchanged: usize,
    /// Desired value already in place.
    pub idempotent: usize,
    /// Inline writes performed.
    pub written: usize,
    /// Host errors.
    pub faults: usize,
}

impl PassReport {
    /// Accumulate another report into this one.
    pub fn merge(&mut self, other: &Self) {
        self.examined += other.examined;
        self.skipped_invalid += other.skipped_invalid;
        self.skipped_excluded += other.skipped_excluded;
        self.skipped_not_candidate += other.skipped_not_candidate;
        self.deferred += other.deferred;
        self.unchanged += other.unchanged;
        self.idempotent += other.idempotent;
        self.written += other.written;
        self.faults += other.faults;
    }

    /// Elements that reached policy evaluation.
    #[must_use]
    pub const fn evaluated(&self) -> usize {
        self.deferred + self.unchanged + self.idempotent + self.written
    }
}

/// Result of [`CorrectionPass::apply`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PassOutcome<N> {
    pub report: PassReport,
    /// Elements to arm, in batch order.
    pub arm: Vec<N>,
}

#[derive(Clone, Copy)]
enum Step {
    Invalid,
    Excluded,
    NotCandidate,
    Deferred,
    Unchanged,
    Idempotent,
    Written,
}

/// One pass over a batch.
pub struct CorrectionPass<'a, N> {
    settings: &'a Settings,
    cache: &'a mut CorrectionCache<N>,
}

impl<'a, N: Copy + Eq + Hash + std::fmt::Debug> CorrectionPass<'a, N> {
    pub fn new(settings: &'a Settings, cache: &'a mut CorrectionCache<N>) -> Self {
        Self { settings, cache }
    }

    /// Correct every element of `batch`.
    pub fn apply<H>(&mut self, host: &mut H, batch: &[N]) -> PassOutcome<N>
    where
        H: HostTree<Node = N> + ?Sized,
    {
        let span = tracing::debug_span!(
            "unround.pass",
            batch = batch.len(),
            mode = self.settings.mode.as_str(),
            written = Empty,
            deferred = Empty,
            faults = Empty
        );
        let _guard = span.enter();

        let mut report = PassReport::default();
        let mut arm = Vec::new();

        for &node in batch {
            report.examined += 1;
            match self.correct(host, node) {
                Ok(step) => {
                    match step {
                        Step::Invalid => report.skipped_invalid += 1,
                        Step::Excluded => report.skipped_excluded += 1,
                        Step::NotCandidate => report.skipped_not_candidate += 1,
                        Step::Deferred => report.deferred += 1,
                        Step::Unchanged => report.unchanged += 1,
                        Step::Idempotent => report.idempotent += 1,
                        Step::Written => report.written += 1,
                    }
                    if matches!(
                        step,
                        Step::Deferred | Step::Unchanged | Step::Idempotent | Step::Written
                    ) {
                        arm.push(node);
                    }
                }
                Err(HostError::Detached { .. }) => report.skipped_invalid += 1,
                Err(err) => {
                    report.faults += 1;
                    tracing::warn!(message = "pass.fault", node = ?node, error = %err);
                }
            }
        }

        span.record("written", report.written);
        span.record("deferred", report.deferred);
        span.record("faults", report.faults);
        PassOutcome { report, arm }
    }

    fn correct<H>(&mut self, host: &mut H, node: N) -> Result<Step, HostError>
    where
        H: HostTree<Node = N> + ?Sized,
    {
        if !host.is_alive(node) || !host.is_element(node) {
            return Ok(Step::Invalid);
        }
        if self.settings.excludes(&host.identity(node)?) {
            return Ok(Step::Excluded);
        }

        let style = host.computed_style(node)?;
        if !has_rounding(&style.border_radius) && !self.settings.edit_all {
            return Ok(Step::NotCandidate);
        }

        let desired = match evaluate(&style, host.bounding_box(node), self.settings) {
            Evaluation::Write(value) => value.to_css(),
            Evaluation::NoChange => return Ok(Step::Unchanged),
            Evaluation::Defer => return Ok(Step::Deferred),
        };

        if self.cache.get(node) == Some(desired.as_str())
            && host.inline_radius(node).as_deref() == Some(desired.as_str())
        {
            return Ok(Step::Idempotent);
        }

        host.set_inline_radius(node, &desired, Priority::Important)?;
        tracing::trace!(message = "pass.write", node = ?node, radius = %desired);
        self.cache.record(node, desired);
        Ok(Step::Written)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use unround_core::host::BoxSize;
    use unround_core::memory_tree::{ElementSpec, MemoryTree, NodeId};
    use unround_core::settings::Mode;

    fn absolute(amount: f64) -> Settings {
        Settings {
            mode: Mode::Absolute,
            round_amount: amount,
            ..Settings::default()
        }
    }

    fn run(
        tree: &mut MemoryTree,
        settings: &Settings,
        cache: &mut CorrectionCache<NodeId>,
        batch: &[NodeId],
    ) -> PassOutcome<NodeId> {
        CorrectionPass::new(settings, cache).apply(tree, batch)
    }

    #[test]
    fn writes_important_and_caches() {
        let mut tree = MemoryTree::new();
        let doc = tree.document();
        let card = tree
            .append_element(doc, ElementSpec::new("div").radius("12px"))
            .expect("append");
        let mut cache = CorrectionCache::new();

        let outcome = run(&mut tree, &absolute(8.0), &mut cache, &[card]);
        assert_eq!(outcome.report.written, 1);
        assert_eq!(outcome.arm, vec![card]);
        assert_eq!(tree.inline_declaration(card), Some(("8px", Priority::Important)));
        assert_eq!(cache.get(card), Some("8px"));
    }

    #[test]
    fn second_pass_is_idempotent() {
        let mut tree = MemoryTree::new();
        let doc = tree.document();
        let card = tree
            .append_element(doc, ElementSpec::new("div").radius("12px"))
            .expect("append");
        let mut cache = CorrectionCache::new();
        let settings = absolute(8.0);

        run(&mut tree, &settings, &mut cache, &[card]);
        let second = run(&mut tree, &settings, &mut cache, &[card]);
        assert_eq!(second.report.written, 0);
        assert_eq!(second.report.idempotent, 1);
        assert_eq!(tree.style_writes(card), 1);
    }

    #[test]
    fn external_overwrite_is_reapplied() {
        let mut tree = MemoryTree::new();
        let doc = tree.document();
        let card = tree
            .append_element(doc, ElementSpec::new("div").radius("12px"))
            .expect("append");
        let mut cache = CorrectionCache::new();
        let settings = absolute(8.0);

        run(&mut tree, &settings, &mut cache, &[card]);
        tree.set_page_inline_radius(card, Some("30px"))
            .expect("page write");
        let again = run(&mut tree, &settings, &mut cache, &[card]);
        assert_eq!(again.report.written, 1);
        assert_eq!(tree.inline_radius(card).as_deref(), Some("8px"));
    }

    #[test]
    fn skips_are_classified() {
        let mut tree = MemoryTree::new();
        let doc = tree.document();
        let flat = tree
            .append_element(doc, ElementSpec::new("div").radius("0px"))
            .expect("append");
        let excluded = tree
            .append_element(doc, ElementSpec::new("div").class("pill").radius("9px"))
            .expect("append");
        let text = tree.create_text().expect("text");
        tree.append_child(doc, text).expect("append text");
        let gone = tree
            .append_element(doc, ElementSpec::new("div").radius("9px"))
            .expect("append");
        tree.remove(gone).expect("remove");

        let settings = Settings {
            exclude_classes: vec!["pill".to_string()],
            ..absolute(8.0)
        };
        let mut cache = CorrectionCache::new();
        let outcome = run(&mut tree, &settings, &mut cache, &[flat, excluded, text, gone]);

        assert_eq!(
            outcome.report,
            PassReport {
                examined: 4,
                skipped_invalid: 2,
                skipped_excluded: 1,
                skipped_not_candidate: 1,
                ..PassReport::default()
            }
        );
        assert!(outcome.arm.is_empty());
        assert_eq!(tree.total_style_writes(), 0);
    }

    #[test]
    fn all_zero_shorthands_are_not_candidates() {
        let mut tree = MemoryTree::new();
        let doc = tree.document();
        let flat: Vec<NodeId> = ["0", "0px 0px", "0px 0px 0px 0px / 0px"]
            .into_iter()
            .map(|radius| {
                tree.append_element(doc, ElementSpec::new("div").radius(radius))
                    .expect("append")
            })
            .collect();
        let mixed = tree
            .append_element(doc, ElementSpec::new("div").radius("0px 6px"))
            .expect("append");
        let mut cache = CorrectionCache::new();

        let mut batch = flat.clone();
        batch.push(mixed);
        let outcome = run(&mut tree, &absolute(8.0), &mut cache, &batch);
        assert_eq!(outcome.report.skipped_not_candidate, 3);
        assert_eq!(outcome.report.written, 1);
        assert_eq!(outcome.arm, vec![mixed]);

        let forced = Settings {
            edit_all: true,
            ..absolute(8.0)
        };
        let outcome = run(&mut tree, &forced, &mut cache, &flat);
        assert_eq!(outcome.report.written, 3);
    }

    #[test]
    fn deferred_elements_are_armed_without_writing() {
        let mut tree = MemoryTree::new();
        let doc = tree.document();
        let lazy = tree
            .append_element(doc, ElementSpec::new("img").radius("6px"))
            .expect("append");
        let settings = Settings {
            mode: Mode::Ratio,
            ratio_amount: Some(0.5),
            ..Settings::default()
        };
        let mut cache = CorrectionCache::new();

        let outcome = run(&mut tree, &settings, &mut cache, &[lazy]);
        assert_eq!(outcome.report.deferred, 1);
        assert_eq!(outcome.arm, vec![lazy]);
        assert_eq!(tree.style_writes(lazy), 0);

        tree.resize(lazy, BoxSize::new(40.0, 30.0)).expect("resize");
        let later = run(&mut tree, &settings, &mut cache, &[lazy]);
        assert_eq!(later.report.written, 1);
        assert_eq!(tree.inline_radius(lazy).as_deref(), Some("15px"));
    }

    #[test]
    fn sums_merge() {
        let mut total = PassReport {
            written: 2,
            ..PassReport::default()
        };
        total.merge(&PassReport {
            written: 1,
            deferred: 4,
            ..PassReport::default()
        });
        assert_eq!(total.written, 3);
        assert_eq!(total.evaluated(), 7);
    }
}
