#![forbid(unsafe_code)]

//! One corrected tree plus its settings and reload state.
//!
//! A [`Session`] is what a host creates per document. It forwards provider
//! and runtime-channel events to the right place: the initial settings load
//! starts the engine, later settings changes only mark a reload as owed, and
//! the reload itself happens on the next focus transition.

use std::sync::Arc;

use unround_core::host::{HostTree, RecordSource};
use unround_core::reload::{ReloadDecision, ReloadGate, RuntimeMessage};
use unround_core::settings::{Settings, SettingsStore};
use unround_runtime::{Engine, EngineConfig, EngineError, FlushScheduler, PassReport};

/// Settings, engine, and reload gate for one tree.
pub struct Session<N, S> {
    settings: Arc<SettingsStore>,
    engine: Engine<N, S>,
    reload: ReloadGate,
    started: bool,
}

impl<N, S> Session<N, S>
where
    N: Copy + Eq + std::hash::Hash + std::fmt::Debug,
    S: FlushScheduler,
{
    /// Create a session running on default settings until the provider
    /// delivers a record.
    pub fn new(config: EngineConfig, scheduler: S) -> Self {
        Self::with_store(config, Arc::new(SettingsStore::default()), scheduler)
    }

    /// Create a session over an existing settings store.
    pub fn with_store(config: EngineConfig, settings: Arc<SettingsStore>, scheduler: S) -> Self {
        Self {
            engine: Engine::new(config, Arc::clone(&settings), scheduler),
            settings,
            reload: ReloadGate::new(),
            started: false,
        }
    }

    /// The provider delivered the stored settings record.
    ///
    /// A record that fails to decode is logged and the current settings are
    /// kept. The first call starts the engine; returns how many elements it
    /// enqueued.
    pub fn on_settings_loaded<H>(&mut self, host: &mut H, payload: &str) -> usize
    where
        H: HostTree<Node = N> + ?Sized,
    {
        match Settings::from_json(payload) {
            Ok(settings) => self.settings.store(settings),
            Err(err) => {
                tracing::warn!(message = "session.settings_rejected", error = %err);
            }
        }
        if self.started {
            return 0;
        }
        self.started = true;
        self.engine.start(host)
    }

    /// The provider reported that stored settings changed.
    pub fn on_storage_changed(&mut self) {
        self.reload.on_settings_changed();
    }

    /// A message arrived on the runtime channel. Undecodable messages are
    /// ignored.
    pub fn on_runtime_message(&mut self, payload: &str) {
        match RuntimeMessage::from_json(payload) {
            Ok(message) => self.reload.on_message(&message),
            Err(err) => tracing::debug!(message = "session.message_ignored", error = %err),
        }
    }

    /// The host view gained focus.
    pub fn on_focus(&mut self) -> ReloadDecision {
        let decision = self.reload.on_focus();
        if decision == ReloadDecision::Reload {
            tracing::info!(message = "session.reload");
        }
        decision
    }

    /// A scheduled flush came due.
    pub fn flush<H>(&mut self, host: &mut H) -> PassReport
    where
        H: HostTree<Node = N> + ?Sized,
    {
        self.engine.flush(host)
    }

    /// Pump buffered notifications and flush until the tree is settled.
    pub fn settle<H>(&mut self, host: &mut H, max_rounds: usize) -> Result<usize, EngineError>
    where
        H: RecordSource<Node = N> + ?Sized,
    {
        self.engine.run_until_quiescent(host, max_rounds)
    }

    #[must_use]
    pub const fn is_started(&self) -> bool {
        self.started
    }

    #[must_use]
    pub const fn is_reload_pending(&self) -> bool {
        self.reload.is_pending()
    }

    #[must_use]
    pub fn settings(&self) -> Arc<Settings> {
        self.settings.load()
    }

    #[must_use]
    pub const fn engine(&self) -> &Engine<N, S> {
        &self.engine
    }

    pub fn engine_mut(&mut self) -> &mut Engine<N, S> {
        &mut self.engine
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use tracing_test::traced_test;
    use unround_core::memory_tree::{ElementSpec, MemoryTree, NodeId};
    use unround_core::settings::Mode;
    use unround_runtime::ManualScheduler;

    fn session() -> Session<NodeId, ManualScheduler> {
        Session::new(EngineConfig::default(), ManualScheduler::new())
    }

    fn page() -> (MemoryTree, NodeId) {
        let mut tree = MemoryTree::new();
        let doc = tree.document();
        let card = tree
            .append_element(doc, ElementSpec::new("div").radius("12px"))
            .expect("append");
        (tree, card)
    }

    #[test]
    fn settings_load_starts_engine_once() {
        let (mut tree, card) = page();
        let mut session = session();

        let enqueued =
            session.on_settings_loaded(&mut tree, r#"{"mode": "1", "roundAmount": 8}"#);
        assert_eq!(enqueued, 1);
        assert!(session.is_started());
        assert_eq!(session.settings().mode, Mode::Absolute);

        session.settle(&mut tree, 8).expect("settles");
        assert_eq!(tree.inline_radius(card).as_deref(), Some("8px"));

        assert_eq!(session.on_settings_loaded(&mut tree, "{}"), 0);
    }

    #[test]
    fn null_record_keeps_defaults() {
        let (mut tree, _) = page();
        let mut session = session();
        session.on_settings_loaded(&mut tree, "null");
        assert_eq!(*session.settings(), Settings::default());
    }

    #[traced_test]
    #[test]
    fn malformed_record_is_logged_and_defaults_kept() {
        let (mut tree, _) = page();
        let mut session = session();
        let enqueued = session.on_settings_loaded(&mut tree, r#"{"mode": "squircle"}"#);

        assert_eq!(enqueued, 1);
        assert_eq!(*session.settings(), Settings::default());
        assert!(logs_contain("session.settings_rejected"));
    }

    #[test]
    fn storage_change_reloads_on_next_focus_only() {
        let mut session = session();
        assert_eq!(session.on_focus(), ReloadDecision::Stay);

        session.on_storage_changed();
        assert!(session.is_reload_pending());
        assert_eq!(session.on_focus(), ReloadDecision::Reload);
        assert_eq!(session.on_focus(), ReloadDecision::Stay);
    }

    #[test]
    fn runtime_messages_mark_reload() {
        let mut session = session();
        session.on_runtime_message(r#"{"action": "somethingElse"}"#);
        session.on_runtime_message("not json");
        assert!(!session.is_reload_pending());

        session.on_runtime_message(r#"{"action": "reloadPage"}"#);
        assert_eq!(session.on_focus(), ReloadDecision::Reload);
    }

    #[test]
    fn storage_change_does_not_touch_the_tree() {
        let (mut tree, card) = page();
        let mut session = session();
        session.on_settings_loaded(&mut tree, r#"{"roundAmount": 8}"#);
        session.settle(&mut tree, 8).expect("settles");

        session.on_storage_changed();
        session.settle(&mut tree, 8).expect("settles");
        assert_eq!(tree.style_writes(card), 1);
    }
}
