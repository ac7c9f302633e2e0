//! Arena provisioning abstraction.
//!
//! An *arena* is the isolated, team-private environment a race is
//! played in. The orchestration engine only ever talks to the
//! [`ArenaProvisioner`] trait; how arenas are actually materialized
//! (separate worlds, containers, shards) is the implementor's
//! business.

pub mod local;

pub use local::LocalArenas;

use serde::{Deserialize, Serialize};

use crate::error::ArenaError;
use crate::race::state::PlayerId;

/// Sub-environment within a provisioned arena.
///
/// Every arena carries all three zones; players start in [`Zone::Main`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Zone {
    /// Primary zone where the race starts
    Main,
    /// Linked side zone
    Side,
    /// Final depth zone
    Deep,
}

impl Zone {
    /// All zones, in provisioning order.
    pub const ALL: [Self; 3] = [Self::Main, Self::Side, Self::Deep];

    /// Instance-id suffix for this zone.
    #[must_use]
    pub const fn suffix(self) -> &'static str {
        match self {
            Self::Main => "",
            Self::Side => "_side",
            Self::Deep => "_deep",
        }
    }
}

/// Reference to a provisioned arena.
///
/// Opaque to the engine apart from `team` and membership checks; the
/// per-zone instance ids follow a fixed naming scheme so linked
/// tooling can find the siblings of any zone.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct ArenaRef {
    /// Owning team name
    pub team: String,
    /// Seed the arena was generated from
    pub seed: i64,
    /// Instance id of the main zone
    pub main_id: String,
    /// Instance id of the side zone
    pub side_id: String,
    /// Instance id of the deep zone
    pub deep_id: String,
}

impl ArenaRef {
    /// Derives the canonical arena reference for a team.
    #[must_use]
    pub fn for_team(team: &str, seed: i64) -> Self {
        Self {
            team: team.to_string(),
            seed,
            main_id: format!("{team}{}", Zone::Main.suffix()),
            side_id: format!("{team}{}", Zone::Side.suffix()),
            deep_id: format!("{team}{}", Zone::Deep.suffix()),
        }
    }

    /// Returns the instance id for a zone.
    #[must_use]
    pub fn zone_id(&self, zone: Zone) -> &str {
        match zone {
            Zone::Main => &self.main_id,
            Zone::Side => &self.side_id,
            Zone::Deep => &self.deep_id,
        }
    }

    /// Returns whether the given instance id belongs to this arena.
    #[must_use]
    pub fn contains(&self, instance_id: &str) -> bool {
        Zone::ALL.iter().any(|z| self.zone_id(*z) == instance_id)
    }
}

/// Provisioning collaborator for per-team race arenas.
///
/// All operations are driven from the engine's serialized runtime
/// task; implementations are free to block on their own backends but
/// must not call back into the engine.
#[async_trait::async_trait]
pub trait ArenaProvisioner: Send + Sync {
    /// Creates a full arena (all zones) for a team.
    ///
    /// On mid-creation failure the implementation must tear down any
    /// zones it already created before returning the error.
    ///
    /// # Errors
    ///
    /// Returns [`ArenaError::CreateFailed`] when any zone cannot be
    /// provisioned.
    async fn create_arena(&self, team: &str, seed: i64) -> Result<ArenaRef, ArenaError>;

    /// Tears down an arena. Returns `false` if any zone could not be
    /// removed; the arena stays registered in that case.
    async fn delete_arena(&self, arena: &ArenaRef) -> bool;

    /// Returns whether the arena can be safely torn down right now
    /// (e.g. no players inside).
    async fn can_delete(&self, arena: &ArenaRef) -> bool;

    /// Moves a player to the spawn point of the given zone.
    async fn teleport_to_spawn(&self, arena: &ArenaRef, zone: Zone, player: PlayerId);

    /// Resolves the owning team of any zone instance id.
    async fn resolve_team(&self, instance_id: &str) -> Option<String>;

    /// Registers an already-existing arena, used when reloading
    /// persisted state on startup.
    async fn register(&self, arena: ArenaRef);
}
