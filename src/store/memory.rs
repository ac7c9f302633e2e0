//! In-memory store.
//!
//! Used by the test suite and for ephemeral runs. The write-failure
//! knob lets tests prove that a failed persist leaves the caller's
//! in-memory state untouched.

use std::sync::Mutex;
use std::sync::atomic::{AtomicBool, Ordering};

use crate::error::StoreError;
use crate::race::state::{RaceState, Team};

use super::{GameDocument, StateStore};

/// [`StateStore`] with no durable backing.
#[derive(Default)]
pub struct MemoryStore {
    doc: Mutex<GameDocument>,
    fail_writes: AtomicBool,
}

impl MemoryStore {
    /// Creates an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a store seeded with an existing document.
    #[must_use]
    pub fn with_document(doc: GameDocument) -> Self {
        Self {
            doc: Mutex::new(doc),
            fail_writes: AtomicBool::new(false),
        }
    }

    /// Makes every subsequent mutator fail with
    /// [`StoreError::Unavailable`].
    pub fn set_fail_writes(&self, fail: bool) {
        self.fail_writes.store(fail, Ordering::SeqCst);
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, GameDocument> {
        self.doc
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
    }

    fn mutate(&self, apply: impl FnOnce(&mut GameDocument)) -> Result<(), StoreError> {
        if self.fail_writes.load(Ordering::SeqCst) {
            return Err(StoreError::Unavailable);
        }
        apply(&mut self.lock());
        Ok(())
    }
}

impl StateStore for MemoryStore {
    fn document(&self) -> GameDocument {
        self.lock().clone()
    }

    fn seed(&self) -> Option<i64> {
        self.lock().current_seed
    }

    fn set_seed(&self, seed: i64) -> Result<(), StoreError> {
        self.mutate(|doc| doc.current_seed = Some(seed))
    }

    fn game_state(&self) -> RaceState {
        self.lock().game_state
    }

    fn set_game_state(&self, state: RaceState) -> Result<(), StoreError> {
        self.mutate(|doc| doc.game_state = state)
    }

    fn start_ms(&self) -> Option<i64> {
        self.lock().game_start_time
    }

    fn set_start_ms(&self, start: Option<i64>) -> Result<(), StoreError> {
        self.mutate(|doc| doc.game_start_time = start)
    }

    fn save_team(&self, team: &Team) -> Result<(), StoreError> {
        self.mutate(|doc| {
            doc.teams.insert(team.name().to_string(), team.clone());
        })
    }

    fn delete_team(&self, name: &str) -> Result<(), StoreError> {
        self.mutate(|doc| {
            doc.teams.shift_remove(name);
        })
    }

    fn teams(&self) -> Vec<Team> {
        self.lock().teams.values().cloned().collect()
    }

    fn clear_all(&self) -> Result<(), StoreError> {
        self.mutate(|doc| *doc = GameDocument::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_round_trip() {
        let store = MemoryStore::new();
        store.set_seed(5).unwrap();
        store.set_game_state(RaceState::Running).unwrap();
        store.save_team(&Team::new("red")).unwrap();

        assert_eq!(store.seed(), Some(5));
        assert_eq!(store.game_state(), RaceState::Running);
        assert_eq!(store.teams().len(), 1);
    }

    #[test]
    fn test_failed_write_changes_nothing() {
        let store = MemoryStore::new();
        store.set_seed(5).unwrap();

        store.set_fail_writes(true);
        assert!(matches!(store.set_seed(9), Err(StoreError::Unavailable)));
        assert!(matches!(
            store.save_team(&Team::new("red")),
            Err(StoreError::Unavailable)
        ));

        store.set_fail_writes(false);
        assert_eq!(store.seed(), Some(5));
        assert!(store.teams().is_empty());
    }
}
