//! Persistence gateway.
//!
//! A durable key-value document holding the whole race state: one
//! subtree per team plus the top-level `current-seed`, `game-state`,
//! and `game-start-time` keys. Every mutating call persists
//! synchronously before returning, so the in-memory and durable views
//! never diverge after a successful call.

pub mod memory;
pub mod yaml;

pub use memory::MemoryStore;
pub use yaml::YamlStore;

use std::sync::Arc;

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

use crate::error::StoreError;
use crate::race::state::{RaceState, Team};

/// The persisted game document.
///
/// Field names mirror the on-disk layout; team subtrees are keyed by
/// team name and preserve insertion order.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case", default)]
pub struct GameDocument {
    /// Shared arena generation seed for the current race cycle
    #[serde(skip_serializing_if = "Option::is_none")]
    pub current_seed: Option<i64>,
    /// Global race state
    pub game_state: RaceState,
    /// Wall-clock start instant (UTC epoch milliseconds)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub game_start_time: Option<i64>,
    /// Per-team documents, keyed by team name
    pub teams: IndexMap<String, Team>,
}

/// Durable store for the game document.
///
/// Implementations use interior mutability; all calls arrive from the
/// engine's serialized runtime task. Mutators must complete the
/// durable write (or fail loudly) before returning; there is no
/// batching, and callers only commit their in-memory state after a
/// successful write.
pub trait StateStore: Send + Sync {
    /// Returns a snapshot of the whole document.
    fn document(&self) -> GameDocument;

    /// Returns the configured seed, if any.
    fn seed(&self) -> Option<i64>;

    /// Sets the seed.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] if the durable write fails.
    fn set_seed(&self, seed: i64) -> Result<(), StoreError>;

    /// Returns the persisted global race state.
    fn game_state(&self) -> RaceState;

    /// Sets the global race state.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] if the durable write fails.
    fn set_game_state(&self, state: RaceState) -> Result<(), StoreError>;

    /// Returns the persisted race start instant (epoch ms).
    fn start_ms(&self) -> Option<i64>;

    /// Sets or clears the race start instant.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] if the durable write fails.
    fn set_start_ms(&self, start: Option<i64>) -> Result<(), StoreError>;

    /// Writes a team's whole subtree.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] if the durable write fails.
    fn save_team(&self, team: &Team) -> Result<(), StoreError>;

    /// Deletes a team's subtree.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] if the durable write fails.
    fn delete_team(&self, name: &str) -> Result<(), StoreError>;

    /// Returns all persisted teams in insertion order.
    fn teams(&self) -> Vec<Team>;

    /// Clears the whole document.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] if the durable write fails.
    fn clear_all(&self) -> Result<(), StoreError>;
}

/// Shared handle to a [`StateStore`].
pub type SharedStore = Arc<dyn StateStore>;
