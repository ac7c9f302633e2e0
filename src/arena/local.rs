//! In-process arena provisioner.
//!
//! Backs the console binary and the test suite. Zones are bookkeeping
//! entries rather than real environments, but the provisioning
//! choreography (zone-by-zone creation with best-effort teardown of
//! already-created siblings, occupancy-gated deletion) matches what a
//! real backend has to do.

use std::collections::HashMap;
use std::sync::Mutex;

use tracing::{debug, info, warn};

use crate::error::ArenaError;
use crate::race::state::PlayerId;

use super::{ArenaProvisioner, ArenaRef, Zone};

#[derive(Default)]
struct Registry {
    /// team name -> arena
    arenas: HashMap<String, ArenaRef>,
    /// player -> team name of the arena they are currently inside
    occupants: HashMap<PlayerId, String>,
}

/// In-process [`ArenaProvisioner`] implementation.
pub struct LocalArenas {
    registry: Mutex<Registry>,
    /// Test knob: creation of this zone fails, exercising sibling
    /// cleanup.
    fail_zone: Option<Zone>,
}

impl LocalArenas {
    /// Creates an empty provisioner.
    #[must_use]
    pub fn new() -> Self {
        Self {
            registry: Mutex::new(Registry::default()),
            fail_zone: None,
        }
    }

    /// Creates a provisioner whose named zone always fails to
    /// provision. Used by tests to exercise partial-creation cleanup.
    #[must_use]
    pub fn failing_on(zone: Zone) -> Self {
        Self {
            registry: Mutex::new(Registry::default()),
            fail_zone: Some(zone),
        }
    }

    /// Returns the number of registered arenas.
    #[must_use]
    pub fn arena_count(&self) -> usize {
        self.lock().arenas.len()
    }

    /// Returns the arena registered for a team, if any.
    #[must_use]
    pub fn arena_of(&self, team: &str) -> Option<ArenaRef> {
        self.lock().arenas.get(team).cloned()
    }

    /// Removes a player from whatever arena they are in, e.g. when
    /// they return to the lobby.
    pub fn evict(&self, player: PlayerId) {
        self.lock().occupants.remove(&player);
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Registry> {
        // A poisoned registry means a panicked provisioning call; the
        // bookkeeping itself is still consistent.
        self.registry
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
    }
}

impl Default for LocalArenas {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait::async_trait]
impl ArenaProvisioner for LocalArenas {
    async fn create_arena(&self, team: &str, seed: i64) -> Result<ArenaRef, ArenaError> {
        let arena = ArenaRef::for_team(team, seed);
        let mut created: Vec<Zone> = Vec::new();

        for zone in Zone::ALL {
            if self.fail_zone == Some(zone) {
                // Tear down whatever was already materialized, then
                // report the failure.
                for done in &created {
                    debug!(team, zone = ?done, "rolling back partially created zone");
                }
                return Err(ArenaError::CreateFailed {
                    team: team.to_string(),
                    reason: format!("zone '{}' failed to provision", arena.zone_id(zone)),
                });
            }
            debug!(team, id = arena.zone_id(zone), "created zone");
            created.push(zone);
        }

        self.lock().arenas.insert(team.to_string(), arena.clone());
        info!(team, seed, "arena provisioned");
        Ok(arena)
    }

    async fn delete_arena(&self, arena: &ArenaRef) -> bool {
        let mut registry = self.lock();
        if registry.arenas.remove(&arena.team).is_none() {
            warn!(team = %arena.team, "delete requested for unregistered arena");
            return false;
        }
        registry.occupants.retain(|_, team| team != &arena.team);
        info!(team = %arena.team, "arena deleted");
        true
    }

    async fn can_delete(&self, arena: &ArenaRef) -> bool {
        let registry = self.lock();
        !registry.occupants.values().any(|team| team == &arena.team)
    }

    async fn teleport_to_spawn(&self, arena: &ArenaRef, zone: Zone, player: PlayerId) {
        let mut registry = self.lock();
        registry.occupants.insert(player, arena.team.clone());
        debug!(
            %player,
            team = %arena.team,
            id = arena.zone_id(zone),
            "teleported player to zone spawn"
        );
    }

    async fn resolve_team(&self, instance_id: &str) -> Option<String> {
        let registry = self.lock();
        registry
            .arenas
            .values()
            .find(|arena| arena.contains(instance_id))
            .map(|arena| arena.team.clone())
    }

    async fn register(&self, arena: ArenaRef) {
        self.lock().arenas.insert(arena.team.clone(), arena);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_create_and_resolve() {
        let arenas = LocalArenas::new();
        let arena = arenas.create_arena("red", 42).await.unwrap();

        assert_eq!(arenas.arena_count(), 1);
        assert_eq!(arenas.resolve_team("red").await.as_deref(), Some("red"));
        assert_eq!(
            arenas.resolve_team("red_deep").await.as_deref(),
            Some("red")
        );
        assert_eq!(arenas.resolve_team("blue").await, None);
        assert_eq!(arena.seed, 42);
    }

    #[tokio::test]
    async fn test_failed_zone_leaves_nothing_behind() {
        let arenas = LocalArenas::failing_on(Zone::Side);
        let err = arenas.create_arena("red", 1).await.unwrap_err();

        assert!(matches!(err, ArenaError::CreateFailed { .. }));
        assert_eq!(arenas.arena_count(), 0, "partial arena must be cleaned up");
        assert_eq!(arenas.resolve_team("red").await, None);
    }

    #[tokio::test]
    async fn test_occupied_arena_cannot_be_deleted() {
        let arenas = LocalArenas::new();
        let arena = arenas.create_arena("red", 1).await.unwrap();
        let player = PlayerId::random();

        assert!(arenas.can_delete(&arena).await);

        arenas.teleport_to_spawn(&arena, Zone::Main, player).await;
        assert!(!arenas.can_delete(&arena).await);

        arenas.evict(player);
        assert!(arenas.can_delete(&arena).await);
        assert!(arenas.delete_arena(&arena).await);
        assert_eq!(arenas.arena_count(), 0);
    }

    #[tokio::test]
    async fn test_delete_unknown_arena_fails() {
        let arenas = LocalArenas::new();
        let arena = ArenaRef::for_team("ghost", 0);
        assert!(!arenas.delete_arena(&arena).await);
    }

    #[tokio::test]
    async fn test_teleport_moves_between_arenas() {
        let arenas = LocalArenas::new();
        let red = arenas.create_arena("red", 1).await.unwrap();
        let blue = arenas.create_arena("blue", 1).await.unwrap();
        let player = PlayerId::random();

        arenas.teleport_to_spawn(&red, Zone::Main, player).await;
        arenas.teleport_to_spawn(&blue, Zone::Main, player).await;

        // The player occupies only the destination arena.
        assert!(arenas.can_delete(&red).await);
        assert!(!arenas.can_delete(&blue).await);
    }
}
