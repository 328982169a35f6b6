#![forbid(unsafe_code)]

//! Runtime: batching queue, correction pass, and notification routing.
//!
//! `unround-core` decides what radius an element should have; this crate
//! decides when to apply it. A host drives an [`Engine`] by forwarding its
//! notifications and calling [`Engine::flush`] when a flush it was asked for
//! through [`FlushScheduler`] comes due.

pub mod cache;
pub mod config;
pub mod engine;
pub mod observers;
pub mod pass;
pub mod queue;
pub mod registry;
pub mod scheduler;

pub use cache::CorrectionCache;
pub use config::{EngineConfig, OBSERVED_ATTRIBUTES};
pub use engine::{Engine, EngineError, EngineStats};
pub use pass::{CorrectionPass, PassOutcome, PassReport};
pub use queue::{BatchQueue, QueueStats};
pub use registry::WatchRegistry;
pub use scheduler::{FlushRequest, FlushScheduler, ManualScheduler};
