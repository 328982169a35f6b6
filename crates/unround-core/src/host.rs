#![forbid(unsafe_code)]

//! The host-tree contract.
//!
//! The engine never owns the element tree. It talks to a host through
//! [`HostTree`]: read-only style and geometry queries, one inline-style
//! write, and three ways to ask the host for change notifications.
//!
//! Notifications flow back as data, not callbacks: the host collects
//! [`MutationRecord`]s and [`ResizeEntry`]s and hands them to the runtime,
//! which only ever enqueues in response. That keeps every style write on a
//! single path (the correction pass) and out of notification delivery.
//!
//! # Node identity
//!
//! `HostTree::Node` is an opaque, copyable handle. Two handles compare equal
//! exactly when they name the same live node. A handle may outlive its node;
//! [`HostTree::is_alive`] reports whether it still resolves, and a host must
//! never hand out an equal handle for a different node later.
//!
//! # Failure Modes
//!
//! - **Unsupported target**: the host refuses to observe a node. The runtime
//!   logs and moves on; the node is still considered armed.
//! - **Detached node**: a query or write names a node that no longer exists.
//!   The runtime skips that node for the rest of the pass.

use std::fmt;
use std::hash::Hash;

/// Errors a host reports for a single node.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum HostError {
    #[error("host cannot observe {kind} on node {node}")]
    UnsupportedTarget { node: String, kind: ObservationSource },

    #[error("node {node} is no longer part of the tree")]
    Detached { node: String },

    #[error("node {node} is not an element")]
    NotAnElement { node: String },

    #[error("inline style write rejected on node {node}: {reason}")]
    StyleWrite { node: String, reason: String },

    #[error("node {node} already has an encapsulated subtree")]
    ShadowRootExists { node: String },

    #[error("node {node} cannot be inserted there")]
    HierarchyRequest { node: String },

    #[error("no free node slot left ({slots} in use)")]
    CapacityExhausted { slots: usize },
}

impl HostError {
    /// Build a [`HostError::Detached`] for any debuggable handle.
    #[must_use]
    pub fn detached(node: impl fmt::Debug) -> Self {
        Self::Detached {
            node: format!("{node:?}"),
        }
    }

    /// Build a [`HostError::UnsupportedTarget`] for any debuggable handle.
    #[must_use]
    pub fn unsupported(node: impl fmt::Debug, kind: ObservationSource) -> Self {
        Self::UnsupportedTarget {
            node: format!("{node:?}"),
            kind,
        }
    }
}

/// Which notification source an observation request or record belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ObservationSource {
    /// Attribute changes on one element.
    Attributes,
    /// Insertions and removals anywhere below a root.
    ChildList,
    /// Box size changes of one element.
    Resize,
}

impl fmt::Display for ObservationSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Attributes => "attributes",
            Self::ChildList => "child list",
            Self::Resize => "resize",
        })
    }
}

/// Precedence of an inline style write.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Priority {
    /// Ordinary inline declaration.
    #[default]
    Normal,
    /// `!important`: overrides page-authored important declarations.
    Important,
}

/// Rendered box dimensions in CSS pixels.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct BoxSize {
    pub width: f64,
    pub height: f64,
}

impl BoxSize {
    /// Create a size.
    #[must_use]
    pub const fn new(width: f64, height: f64) -> Self {
        Self { width, height }
    }

    /// `min(width, height)`.
    #[must_use]
    pub fn shortest_side(self) -> f64 {
        self.width.min(self.height)
    }
}

/// Resolved style values the policy needs, as the host reports them.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct ComputedStyle {
    /// Resolved `border-radius` (e.g. `"12px"`, `"0px"`).
    pub border_radius: String,
    /// Resolved `display` (e.g. `"block"`, `"none"`).
    pub display: String,
    /// Declared `width`, used when the box is not laid out yet.
    pub width: String,
    /// Declared `height`, used when the box is not laid out yet.
    pub height: String,
}

impl ComputedStyle {
    /// Whether the element takes part in rendering.
    #[must_use]
    pub fn is_rendered(&self) -> bool {
        self.display.trim() != "none"
    }
}

/// Classification tags and identifier of an element.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct ElementIdentity {
    pub classes: Vec<String>,
    pub id: Option<String>,
}

/// A structural or attribute change delivered by the host.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MutationRecord<N> {
    /// A filtered attribute changed on an observed element.
    Attributes { target: N, attribute: String },
    /// Nodes were inserted below `target` or removed from the tree.
    ///
    /// `added` lists the inserted nodes only (not their descendants).
    /// `removed` lists every node that stopped existing, descendants and
    /// encapsulated subtrees included, so side tables can be purged.
    ChildList {
        target: N,
        added: Vec<N>,
        removed: Vec<N>,
    },
}

/// A box-size change delivered by the host.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ResizeEntry<N> {
    pub target: N,
    pub size: BoxSize,
}

/// Everything the engine needs from the element tree.
pub trait HostTree {
    /// Opaque node handle.
    type Node: Copy + Eq + Hash + fmt::Debug;

    /// Root of the main tree.
    fn document_root(&self) -> Self::Node;

    /// Whether `node` still names a node of this tree.
    fn is_alive(&self, node: Self::Node) -> bool;

    /// Whether `node` is an element (as opposed to text, a document, or an
    /// encapsulated-subtree root).
    fn is_element(&self, node: Self::Node) -> bool;

    /// Classes and identifier of an element.
    fn identity(&self, node: Self::Node) -> Result<ElementIdentity, HostError>;

    /// Resolved style of an element.
    fn computed_style(&self, node: Self::Node) -> Result<ComputedStyle, HostError>;

    /// Live bounding box, or `None` when layout has not produced one.
    fn bounding_box(&self, node: Self::Node) -> Option<BoxSize>;

    /// Current inline `border-radius`, if any.
    fn inline_radius(&self, node: Self::Node) -> Option<String>;

    /// Set the inline `border-radius`.
    fn set_inline_radius(
        &mut self,
        node: Self::Node,
        value: &str,
        priority: Priority,
    ) -> Result<(), HostError>;

    /// Encapsulated subtree root attached to `node`, if any.
    fn shadow_root(&self, node: Self::Node) -> Option<Self::Node>;

    /// Every element below `root`, in document order. Does not descend into
    /// encapsulated subtrees.
    fn descendant_elements(&self, root: Self::Node) -> Vec<Self::Node>;

    /// Report changes to the named attributes of `node`.
    fn observe_attributes(
        &mut self,
        node: Self::Node,
        attributes: &[&'static str],
    ) -> Result<(), HostError>;

    /// Report box-size changes of `node`.
    fn observe_resize(&mut self, node: Self::Node) -> Result<(), HostError>;

    /// Report insertions and removals anywhere below `root`.
    fn observe_child_list(&mut self, root: Self::Node) -> Result<(), HostError>;
}

/// A host that buffers notifications until the driver collects them.
///
/// Deterministic hosts (tests, replay) implement this so a driver can pump
/// records into the runtime without real callbacks.
pub trait RecordSource: HostTree {
    /// Take every pending mutation record.
    fn take_mutation_records(&mut self) -> Vec<MutationRecord<Self::Node>>;

    /// Take every pending resize entry.
    fn take_resize_entries(&mut self) -> Vec<ResizeEntry<Self::Node>>;
}
