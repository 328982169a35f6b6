#![forbid(unsafe_code)]

//! Which elements are armed and which encapsulated subtrees are watched.

use std::hash::Hash;

use ahash::AHashSet;

/// Membership markers for armed elements and observed subtree roots.
///
/// Marking is idempotent: each `mark_*` call returns `true` only the first
/// time a node is marked, which is what callers use to attach observers
/// exactly once.
#[derive(Debug, Clone)]
pub struct WatchRegistry<N> {
    armed: AHashSet<N>,
    shadow_roots: AHashSet<N>,
}

impl<N> Default for WatchRegistry<N> {
    fn default() -> Self {
        Self {
            armed: AHashSet::new(),
            shadow_roots: AHashSet::new(),
        }
    }
}

impl<N: Copy + Eq + Hash> WatchRegistry<N> {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Mark `node` armed. `true` if it was not armed before.
    pub fn mark_armed(&mut self, node: N) -> bool {
        self.armed.insert(node)
    }

    #[must_use]
    pub fn is_armed(&self, node: N) -> bool {
        self.armed.contains(&node)
    }

    /// Mark an encapsulated subtree root as observed. `true` the first time.
    pub fn mark_shadow_root(&mut self, root: N) -> bool {
        self.shadow_roots.insert(root)
    }

    #[must_use]
    pub fn is_shadow_root_observed(&self, root: N) -> bool {
        self.shadow_roots.contains(&root)
    }

    /// Drop every marker for a removed node.
    pub fn forget(&mut self, node: N) {
        self.armed.remove(&node);
        self.shadow_roots.remove(&node);
    }

    /// Number of armed elements.
    #[must_use]
    pub fn armed_len(&self) -> usize {
        self.armed.len()
    }

    /// Number of observed subtree roots.
    #[must_use]
    pub fn shadow_root_len(&self) -> usize {
        self.shadow_roots.len()
    }
}
