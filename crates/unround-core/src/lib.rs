#![forbid(unsafe_code)]

//! Core: settings, radius values, policy evaluation, and the host-tree contract.
//!
//! Nothing in this crate schedules work or keeps per-element state. The
//! runtime crate (`unround-runtime`) owns the reactive loop; this crate only
//! answers "what radius should this element have" and describes the host it
//! talks to.

pub mod host;
pub mod memory_tree;
pub mod policy;
pub mod radius;
pub mod reload;
pub mod settings;

pub use host::{
    BoxSize, ComputedStyle, ElementIdentity, HostError, HostTree, MutationRecord,
    ObservationSource, Priority, RecordSource, ResizeEntry,
};
pub use memory_tree::{ElementSpec, MemoryTree, NodeId};
pub use policy::{Evaluation, evaluate};
pub use radius::RadiusValue;
pub use reload::{ReloadDecision, ReloadGate, RuntimeMessage};
pub use settings::{Mode, Settings, SettingsError, SettingsStore};
