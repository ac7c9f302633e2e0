//! File-backed YAML store.
//!
//! The whole game document lives in one YAML file. Every mutation
//! rewrites it via a temp-file-then-rename, so a crash mid-write never
//! leaves a truncated document behind.

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use tracing::info;

use crate::error::StoreError;
use crate::race::state::{RaceState, Team};

use super::{GameDocument, StateStore};

/// [`StateStore`] backed by a single YAML file.
#[derive(Debug)]
pub struct YamlStore {
    path: PathBuf,
    doc: Mutex<GameDocument>,
}

impl YamlStore {
    /// Opens the store, loading the existing document if the file is
    /// present or starting from an empty one otherwise.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Read`] if the file exists but cannot be
    /// read, or [`StoreError::Decode`] if it does not parse.
    pub fn open(path: impl Into<PathBuf>) -> Result<Self, StoreError> {
        let path = path.into();
        let doc = if path.exists() {
            let raw = fs::read_to_string(&path).map_err(|source| StoreError::Read {
                path: path.clone(),
                source,
            })?;
            let doc: GameDocument =
                serde_yaml::from_str(&raw).map_err(|e| StoreError::Decode {
                    path: path.clone(),
                    message: e.to_string(),
                })?;
            info!(path = %path.display(), teams = doc.teams.len(), "loaded game data");
            doc
        } else {
            GameDocument::default()
        };

        Ok(Self {
            path,
            doc: Mutex::new(doc),
        })
    }

    /// Returns the path of the backing file.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, GameDocument> {
        self.doc
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
    }

    /// Mutates the document and persists it; the mutation is rolled
    /// back if the write fails, so memory and disk stay in step.
    fn mutate(&self, apply: impl FnOnce(&mut GameDocument)) -> Result<(), StoreError> {
        let mut doc = self.lock();
        let previous = doc.clone();
        apply(&mut doc);

        if let Err(e) = save_atomically(&self.path, &doc) {
            *doc = previous;
            return Err(e);
        }
        Ok(())
    }
}

fn save_atomically(path: &Path, doc: &GameDocument) -> Result<(), StoreError> {
    let raw = serde_yaml::to_string(doc)?;
    let tmp = path.with_extension("yml.tmp");

    fs::write(&tmp, raw).map_err(|source| StoreError::Write {
        path: tmp.clone(),
        source,
    })?;
    fs::rename(&tmp, path).map_err(|source| StoreError::Write {
        path: path.to_path_buf(),
        source,
    })
}

impl StateStore for YamlStore {
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
    use crate::race::state::PlayerId;

    fn store_in(dir: &tempfile::TempDir) -> YamlStore {
        YamlStore::open(dir.path().join("game-data.yml")).unwrap()
    }

    #[test]
    fn test_fresh_store_is_empty() {
        let dir = tempfile::tempdir().unwrap();
        let store = store_in(&dir);

        assert!(store.seed().is_none());
        assert_eq!(store.game_state(), RaceState::Waiting);
        assert!(store.start_ms().is_none());
        assert!(store.teams().is_empty());
    }

    #[test]
    fn test_document_survives_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("game-data.yml");

        {
            let store = YamlStore::open(&path).unwrap();
            store.set_seed(42).unwrap();
            store.set_game_state(RaceState::Running).unwrap();
            store.set_start_ms(Some(1_700_000_000_000)).unwrap();

            let mut team = Team::new("red");
            team.add_member(PlayerId::random());
            team.state = RaceState::Running;
            store.save_team(&team).unwrap();
        }

        let reopened = YamlStore::open(&path).unwrap();
        assert_eq!(reopened.seed(), Some(42));
        assert_eq!(reopened.game_state(), RaceState::Running);
        assert_eq!(reopened.start_ms(), Some(1_700_000_000_000));

        let teams = reopened.teams();
        assert_eq!(teams.len(), 1);
        assert_eq!(teams[0].name(), "red");
        assert_eq!(teams[0].state, RaceState::Running);
        assert_eq!(teams[0].member_count(), 1);
    }

    #[test]
    fn test_delete_team_removes_subtree() {
        let dir = tempfile::tempdir().unwrap();
        let store = store_in(&dir);

        store.save_team(&Team::new("red")).unwrap();
        store.save_team(&Team::new("blue")).unwrap();
        store.delete_team("red").unwrap();

        let names: Vec<_> = store.teams().iter().map(|t| t.name().to_string()).collect();
        assert_eq!(names, ["blue"]);
    }

    #[test]
    fn test_teams_keep_insertion_order() {
        let dir = tempfile::tempdir().unwrap();
        let store = store_in(&dir);

        for name in ["zebra", "alpha", "mid"] {
            store.save_team(&Team::new(name)).unwrap();
        }

        let names: Vec<_> = store.teams().iter().map(|t| t.name().to_string()).collect();
        assert_eq!(names, ["zebra", "alpha", "mid"]);
    }

    #[test]
    fn test_clear_all_resets_document() {
        let dir = tempfile::tempdir().unwrap();
        let store = store_in(&dir);

        store.set_seed(7).unwrap();
        store.save_team(&Team::new("red")).unwrap();
        store.clear_all().unwrap();

        assert!(store.seed().is_none());
        assert!(store.teams().is_empty());
    }

    #[test]
    fn test_corrupt_file_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("game-data.yml");
        fs::write(&path, "teams: [not, a, map]").unwrap();

        let err = YamlStore::open(&path).unwrap_err();
        assert!(matches!(err, StoreError::Decode { .. }));
    }

    #[test]
    fn test_no_temp_file_left_behind() {
        let dir = tempfile::tempdir().unwrap();
        let store = store_in(&dir);
        store.set_seed(1).unwrap();

        let leftovers: Vec<_> = fs::read_dir(dir.path())
            .unwrap()
            .filter_map(|e| e.ok())
            .filter(|e| e.path().extension().is_some_and(|ext| ext == "tmp"))
            .collect();
        assert!(leftovers.is_empty());
    }
}
