#![forbid(unsafe_code)]

//! Last-applied radius per element.
//!
//! The cache is keyed by node handle and never keeps a node alive: entries
//! are dropped when the host reports the node removed.

use std::hash::Hash;

use ahash::AHashMap;

/// Maps an element to the radius text the engine last wrote to it.
#[derive(Debug, Clone)]
pub struct CorrectionCache<N> {
    applied: AHashMap<N, String>,
}

impl<N> Default for CorrectionCache<N> {
    fn default() -> Self {
        Self {
            applied: AHashMap::new(),
        }
    }
}

impl<N: Copy + Eq + Hash> CorrectionCache<N> {
    /// Create an empty cache.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Radius last written to `node`, if any.
    #[must_use]
    pub fn get(&self, node: N) -> Option<&str> {
        self.applied.get(&node).map(String::as_str)
    }

    /// Remember that `value` was written to `node`.
    pub fn record(&mut self, node: N, value: impl Into<String>) {
        self.applied.insert(node, value.into());
    }

    /// Drop the entry for a removed node. Returns whether one existed.
    pub fn forget(&mut self, node: N) -> bool {
        self.applied.remove(&node).is_some()
    }

    /// Number of tracked elements.
    #[must_use]
    pub fn len(&self) -> usize {
        self.applied.len()
    }

    /// Whether nothing is tracked.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.applied.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn record_overwrites_and_forget_purges() {
        let mut cache = CorrectionCache::new();
        cache.record(1_u32, "8px");
        cache.record(1, "5px");
        cache.record(2, "4px");
        assert_eq!(cache.get(1), Some("5px"));
        assert_eq!(cache.len(), 2);

        assert!(cache.forget(1));
        assert!(!cache.forget(1));
        assert_eq!(cache.get(1), None);
        assert_eq!(cache.len(), 1);
    }
}
