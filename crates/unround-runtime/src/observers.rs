#![forbid(unsafe_code)]

//! Turning host notifications into queue work, and arming elements.
//!
//! Routing never evaluates or writes; it only decides which elements become
//! pending and which side-table entries must be purged. Arming asks the host
//! for notifications on one element and, the first time an encapsulated
//! subtree is seen, on that subtree's structure.

use unround_core::host::{HostError, HostTree, MutationRecord, ObservationSource, ResizeEntry};

use crate::registry::WatchRegistry;

/// Work derived from a batch of mutation records.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Routed<N> {
    /// Elements to enqueue. May contain duplicates; the queue dedups.
    pub enqueue: Vec<N>,
    /// Nodes that no longer exist.
    pub removed: Vec<N>,
}

impl<N> Default for Routed<N> {
    fn default() -> Self {
        Self {
            enqueue: Vec::new(),
            removed: Vec::new(),
        }
    }
}

/// Route mutation records.
///
/// - Attribute records enqueue their target.
/// - Insertions enqueue each inserted element and every element below it.
/// - Removals are reported for purging.
pub fn route_mutations<H>(host: &H, records: &[MutationRecord<H::Node>]) -> Routed<H::Node>
where
    H: HostTree + ?Sized,
{
    let mut routed = Routed::default();
    for record in records {
        match record {
            MutationRecord::Attributes { target, .. } => routed.enqueue.push(*target),
            MutationRecord::ChildList { added, removed, .. } => {
                for &node in added {
                    if !host.is_element(node) {
                        continue;
                    }
                    routed.enqueue.push(node);
                    routed.enqueue.extend(host.descendant_elements(node));
                }
                routed.removed.extend(removed.iter().copied());
            }
        }
    }
    routed
}

/// Route resize entries: each target is enqueued.
pub fn route_resize<N: Copy>(entries: &[ResizeEntry<N>]) -> Vec<N> {
    entries.iter().map(|entry| entry.target).collect()
}

/// What [`arm`] did for one element.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Armed<N> {
    /// The element was not armed before this call.
    pub newly_armed: bool,
    /// Observation requests the host refused.
    pub refused: usize,
    /// Elements of a newly observed encapsulated subtree.
    pub shadow_elements: Vec<N>,
}

/// Arm `node`: attribute and resize observation once per element, and
/// structural observation once per encapsulated subtree.
///
/// A refused observation request is logged and counted; the element stays
/// marked so it is not retried on every pass.
pub fn arm<H>(
    host: &mut H,
    registry: &mut WatchRegistry<H::Node>,
    attribute_filter: &[&'static str],
    node: H::Node,
) -> Armed<H::Node>
where
    H: HostTree + ?Sized,
{
    let mut armed = Armed {
        newly_armed: registry.mark_armed(node),
        refused: 0,
        shadow_elements: Vec::new(),
    };

    if armed.newly_armed {
        if let Err(err) = host.observe_attributes(node, attribute_filter) {
            armed.refused += 1;
            log_refusal(node, ObservationSource::Attributes, &err);
        }
        if let Err(err) = host.observe_resize(node) {
            armed.refused += 1;
            log_refusal(node, ObservationSource::Resize, &err);
        }
    }

    // Checked on every call: a subtree may be attached after the host
    // element was first armed.
    if let Some(root) = host.shadow_root(node)
        && registry.mark_shadow_root(root)
    {
        if let Err(err) = host.observe_child_list(root) {
            armed.refused += 1;
            log_refusal(root, ObservationSource::ChildList, &err);
        }
        armed.shadow_elements = host.descendant_elements(root);
        tracing::debug!(
            message = "observe.shadow_root",
            host = ?node,
            elements = armed.shadow_elements.len()
        );
    }

    armed
}

fn log_refusal(node: impl std::fmt::Debug, source: ObservationSource, err: &HostError) {
    match err {
        HostError::UnsupportedTarget { .. } => {
            tracing::debug!(message = "observe.unsupported", node = ?node, source = %source);
        }
        _ => {
            tracing::warn!(message = "observe.failed", node = ?node, source = %source, error = %err);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use tracing_test::traced_test;
    use unround_core::host::{BoxSize, RecordSource};
    use unround_core::memory_tree::{ElementSpec, MemoryTree};

    #[test]
    fn insertion_routes_subtree() {
        let mut tree = MemoryTree::new();
        let doc = tree.document();
        tree.observe_child_list(doc).expect("observe");

        let container = tree
            .create_element(ElementSpec::new("section"))
            .expect("container");
        let a = tree
            .append_element(container, ElementSpec::new("div"))
            .expect("append");
        let b = tree.append_element(a, ElementSpec::new("span")).expect("append");
        tree.append_child(doc, container).expect("insert");

        let records = tree.take_mutation_records();
        let routed = route_mutations(&tree, &records);
        assert_eq!(routed.enqueue, vec![container, a, b]);
        assert!(routed.removed.is_empty());
    }

    #[test]
    fn text_insertions_are_ignored() {
        let mut tree = MemoryTree::new();
        let doc = tree.document();
        tree.observe_child_list(doc).expect("observe");
        let text = tree.create_text().expect("text");
        tree.append_child(doc, text).expect("insert");

        let records = tree.take_mutation_records();
        let routed = route_mutations(&tree, &records);
        assert!(routed.enqueue.is_empty());
    }

    #[test]
    fn removal_reports_whole_subtree() {
        let mut tree = MemoryTree::new();
        let doc = tree.document();
        let outer = tree.append_element(doc, ElementSpec::new("div")).expect("append");
        let inner = tree.append_element(outer, ElementSpec::new("p")).expect("append");
        tree.observe_child_list(doc).expect("observe");
        tree.remove(outer).expect("remove");

        let records = tree.take_mutation_records();
        let routed = route_mutations(&tree, &records);
        assert_eq!(routed.removed, vec![outer, inner]);
    }

    #[test]
    fn resize_routes_targets() {
        let entries = [
            ResizeEntry {
                target: 1_u32,
                size: BoxSize::new(1.0, 1.0),
            },
            ResizeEntry {
                target: 2,
                size: BoxSize::new(2.0, 2.0),
            },
        ];
        assert_eq!(route_resize(&entries), vec![1, 2]);
    }

    #[test]
    fn arm_observes_once() {
        let mut tree = MemoryTree::new();
        let doc = tree.document();
        let card = tree.append_element(doc, ElementSpec::new("div")).expect("append");
        let mut registry = WatchRegistry::new();

        let first = arm(&mut tree, &mut registry, &["style"], card);
        assert!(first.newly_armed);
        assert!(tree.is_attribute_observed(card));
        assert!(tree.is_resize_observed(card));

        let second = arm(&mut tree, &mut registry, &["style"], card);
        assert!(!second.newly_armed);
    }

    #[test]
    fn shadow_subtree_is_observed_once() {
        let mut tree = MemoryTree::new();
        let doc = tree.document();
        let widget = tree
            .append_element(doc, ElementSpec::new("x-widget"))
            .expect("append");
        let root = tree.attach_shadow(widget).expect("shadow");
        let inside = tree
            .append_element(root, ElementSpec::new("button"))
            .expect("append");
        let mut registry = WatchRegistry::new();

        let first = arm(&mut tree, &mut registry, &["style"], widget);
        assert_eq!(first.shadow_elements, vec![inside]);
        assert!(tree.is_child_list_root(root));

        let second = arm(&mut tree, &mut registry, &["style"], widget);
        assert!(second.shadow_elements.is_empty());
    }

    #[traced_test]
    #[test]
    fn refused_observation_keeps_element_marked() {
        let mut tree = MemoryTree::new();
        let doc = tree.document();
        let frame = tree
            .append_element(doc, ElementSpec::new("iframe").reject_observers())
            .expect("append");
        let mut registry = WatchRegistry::new();

        let armed = arm(&mut tree, &mut registry, &["style"], frame);
        assert!(armed.newly_armed);
        assert_eq!(armed.refused, 2);
        assert!(registry.is_armed(frame));
        assert!(logs_contain("observe.unsupported"));

        let again = arm(&mut tree, &mut registry, &["style"], frame);
        assert_eq!(again.refused, 0);
    }
}
