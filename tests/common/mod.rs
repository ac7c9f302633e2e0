//! Shared integration-test harness: an engine wired to an in-memory
//! store, an in-process provisioner, and a recording notification
//! sink.

#![allow(dead_code)]

use std::sync::{Arc, Mutex};

use tokio::sync::mpsc;

use timetrial::arena::{ArenaProvisioner, LocalArenas};
use timetrial::config::Settings;
use timetrial::notify::Notifier;
use timetrial::race::engine::RaceEngine;
use timetrial::race::runtime::EngineEvent;
use timetrial::race::state::PlayerId;
use timetrial::store::{MemoryStore, StateStore};

/// [`Notifier`] capturing everything for later assertions.
#[derive(Default)]
pub struct RecordingNotifier {
    pub broadcasts: Mutex<Vec<String>>,
    pub direct: Mutex<Vec<(PlayerId, String)>>,
    pub titles: Mutex<Vec<(PlayerId, String, String)>>,
    pub bars: Mutex<Vec<(PlayerId, String)>>,
}

impl RecordingNotifier {
    pub fn broadcasts(&self) -> Vec<String> {
        self.broadcasts.lock().unwrap().clone()
    }

    pub fn has_broadcast(&self, text: &str) -> bool {
        self.broadcasts.lock().unwrap().iter().any(|b| b == text)
    }

    pub fn broadcasts_containing(&self, needle: &str) -> usize {
        self.broadcasts
            .lock()
            .unwrap()
            .iter()
            .filter(|b| b.contains(needle))
            .count()
    }

    pub fn titles_for(&self, player: PlayerId) -> Vec<(String, String)> {
        self.titles
            .lock()
            .unwrap()
            .iter()
            .filter(|(p, _, _)| *p == player)
            .map(|(_, t, s)| (t.clone(), s.clone()))
            .collect()
    }

    pub fn clear(&self) {
        self.broadcasts.lock().unwrap().clear();
        self.direct.lock().unwrap().clear();
        self.titles.lock().unwrap().clear();
        self.bars.lock().unwrap().clear();
    }
}

impl Notifier for RecordingNotifier {
    fn broadcast(&self, text: &str) {
        self.broadcasts.lock().unwrap().push(text.to_string());
    }

    fn send_to_player(&self, player: PlayerId, text: &str) {
        self.direct.lock().unwrap().push((player, text.to_string()));
    }

    fn show_title(&self, player: PlayerId, title: &str, subtitle: &str) {
        self.titles
            .lock()
            .unwrap()
            .push((player, title.to_string(), subtitle.to_string()));
    }

    fn show_ephemeral_bar(&self, player: PlayerId, text: &str) {
        self.bars.lock().unwrap().push((player, text.to_string()));
    }
}

/// A directly-driven engine plus handles on all its collaborators.
pub struct Harness {
    pub engine: RaceEngine,
    pub store: Arc<MemoryStore>,
    pub arenas: Arc<LocalArenas>,
    pub notifier: Arc<RecordingNotifier>,
    /// Keeps the internal tick channel open; direct-drive tests do not
    /// consume it.
    pub events_rx: mpsc::UnboundedReceiver<EngineEvent>,
}

/// Settings for direct-drive tests: no countdown, no live clock.
pub fn quick_settings() -> Settings {
    let mut settings = Settings::default();
    settings.race.start_countdown_secs = 0;
    settings.clock.show_live_clock = false;
    settings
}

pub fn harness() -> Harness {
    harness_with(quick_settings())
}

pub fn harness_with(settings: Settings) -> Harness {
    harness_over(settings, Arc::new(MemoryStore::new()))
}

/// Builds a harness over an existing store, e.g. to simulate a
/// process restart against surviving state.
pub fn harness_over(settings: Settings, store: Arc<MemoryStore>) -> Harness {
    let arenas = Arc::new(LocalArenas::new());
    let notifier = Arc::new(RecordingNotifier::default());
    let (events_tx, events_rx) = mpsc::unbounded_channel();

    let engine = RaceEngine::new(
        settings,
        Arc::clone(&store) as Arc<dyn StateStore>,
        Arc::clone(&arenas) as Arc<dyn ArenaProvisioner>,
        Arc::clone(&notifier) as Arc<dyn Notifier>,
        events_tx,
    );

    Harness {
        engine,
        store,
        arenas,
        notifier,
        events_rx,
    }
}

/// Creates a team with `members` fresh players and a provisioned
/// arena; the seed must already be set.
pub async fn ready_team(h: &mut Harness, name: &str, members: usize) -> Vec<PlayerId> {
    h.engine.create_team(name).unwrap();
    let players: Vec<PlayerId> = (0..members).map(|_| PlayerId::random()).collect();
    for player in &players {
        h.engine.add_member(*player, name).unwrap();
    }
    h.engine.provision_arena(name).await.unwrap();
    players
}
