#![forbid(unsafe_code)]

//! unround public facade crate.
//!
//! Keeps the corner radii of a host's element tree corrected: a [`Session`]
//! owns the settings snapshot, the reactive engine, and the deferred-reload
//! state for one tree.

#[cfg(feature = "logging")]
pub mod logging;
pub mod session;

pub use session::Session;

pub mod prelude {
    pub use unround_core as core;
    pub use unround_runtime as runtime;

    pub use crate::session::Session;
    pub use unround_core::{
        HostTree, Mode, MutationRecord, RecordSource, ReloadDecision, ResizeEntry, Settings,
        SettingsStore,
    };
    pub use unround_runtime::{Engine, EngineConfig, FlushScheduler, ManualScheduler, PassReport};
}
