#![forbid(unsafe_code)]

//! Deferred reload signalling.
//!
//! Settings changes made elsewhere are not applied in place. Any change marks
//! the view as stale, and the host reloads it on its next focus transition so
//! an active view is never disrupted.

use serde::Deserialize;

/// A message on the one-way runtime channel.
///
/// Only one action is recognised; anything else decodes as
/// [`RuntimeMessage::Other`] and is ignored.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(tag = "action")]
pub enum RuntimeMessage {
    /// Settings changed in another context; reload when convenient.
    #[serde(rename = "reloadPage")]
    ReloadPage,
    #[serde(other)]
    Other,
}

impl RuntimeMessage {
    /// Decode a message from JSON text.
    pub fn from_json(text: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(text)
    }
}

/// What the host should do on a focus transition.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReloadDecision {
    /// Reload the tree; in-memory state will be rebuilt from scratch.
    Reload,
    /// Nothing changed since the last reload.
    Stay,
}

/// Tracks whether a reload is owed.
#[derive(Debug, Clone, Default)]
pub struct ReloadGate {
    pending: bool,
}

impl ReloadGate {
    /// Create a gate with nothing pending.
    #[must_use]
    pub const fn new() -> Self {
        Self { pending: false }
    }

    /// The settings provider reported a change. The payload is not inspected.
    pub fn on_settings_changed(&mut self) {
        tracing::debug!(message = "reload.pending", cause = "settings_changed");
        self.pending = true;
    }

    /// A runtime message arrived.
    pub fn on_message(&mut self, message: &RuntimeMessage) {
        if *message == RuntimeMessage::ReloadPage {
            tracing::debug!(message = "reload.pending", cause = "runtime_message");
            self.pending = true;
        }
    }

    /// The host view gained focus.
    pub fn on_focus(&mut self) -> ReloadDecision {
        if std::mem::take(&mut self.pending) {
            ReloadDecision::Reload
        } else {
            ReloadDecision::Stay
        }
    }

    /// Whether a reload is owed.
    #[must_use]
    pub const fn is_pending(&self) -> bool {
        self.pending
    }
}
