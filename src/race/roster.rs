//! Team roster.
//!
//! Owns the team collection and the player→team index. The two are
//! always updated in the same step, so a player is never absent from
//! both or present in both; and every mutation persists the affected
//! team document(s) *before* the in-memory commit, so a failed write
//! leaves memory untouched.

use std::collections::HashMap;

use indexmap::IndexMap;
use rand::seq::SliceRandom;
use tracing::{debug, info, warn};

use crate::arena::{ArenaProvisioner, ArenaRef};
use crate::config::TeamSettings;
use crate::error::{GuardRejection, OpError, StoreError};
use crate::store::SharedStore;

use super::state::{PlayerId, RaceState, Team};

/// Capacity-constrained team roster with fair assignment.
pub struct Roster {
    store: SharedStore,
    settings: TeamSettings,
    /// team name -> team, in creation order
    teams: IndexMap<String, Team>,
    /// player -> team name
    player_teams: HashMap<PlayerId, String>,
}

impl Roster {
    /// Creates an empty roster.
    #[must_use]
    pub fn new(store: SharedStore, settings: TeamSettings) -> Self {
        Self {
            store,
            settings,
            teams: IndexMap::new(),
            player_teams: HashMap::new(),
        }
    }

    /// Replaces the in-memory roster with the persisted teams,
    /// rebuilding the player index.
    pub fn load(&mut self) {
        self.teams.clear();
        self.player_teams.clear();

        for team in self.store.teams() {
            for member in team.members() {
                self.player_teams.insert(*member, team.name().to_string());
            }
            self.teams.insert(team.name().to_string(), team);
        }
        info!(teams = self.teams.len(), "loaded roster");
    }

    /// Creates a new team.
    ///
    /// A team created while the race is already running is created in
    /// the running state; it will never receive an arena teleport for
    /// this cycle, so the situation is warned about.
    ///
    /// # Errors
    ///
    /// Rejects duplicate names; fails if the team cannot be persisted.
    pub fn create_team(&mut self, name: &str, global: RaceState) -> Result<Team, OpError> {
        if self.teams.contains_key(name) {
            return Err(GuardRejection::NameTaken(name.to_string()).into());
        }

        let mut team = Team::new(name);
        if global == RaceState::Running {
            team.state = RaceState::Running;
            warn!(
                team = name,
                "team created mid-race; it has no arena and was never teleported in"
            );
        }

        self.store.save_team(&team)?;
        self.teams.insert(name.to_string(), team.clone());
        info!(team = name, "created team");
        Ok(team)
    }

    /// Deletes a team and its arena.
    ///
    /// Refused when the arena cannot be safely released (still
    /// occupied) or its teardown fails. On success every member's team
    /// association is removed along with the team itself.
    ///
    /// # Errors
    ///
    /// Rejects unknown teams and busy arenas; fails on store errors.
    pub async fn delete_team(
        &mut self,
        name: &str,
        arenas: &dyn ArenaProvisioner,
    ) -> Result<(), OpError> {
        let team = self
            .teams
            .get(name)
            .ok_or_else(|| GuardRejection::UnknownTeam(name.to_string()))?;

        if let Some(arena) = &team.arena {
            if !arenas.can_delete(arena).await {
                warn!(team = name, "cannot delete team: arena is occupied");
                return Err(GuardRejection::ArenaBusy(name.to_string()).into());
            }
            if !arenas.delete_arena(arena).await {
                warn!(team = name, "arena teardown failed");
                return Err(OpError::Arena(crate::error::ArenaError::DeleteFailed {
                    team: name.to_string(),
                    reason: "backend refused to delete the arena".to_string(),
                }));
            }
        }

        self.store.delete_team(name)?;

        let members: Vec<PlayerId> = team.members().iter().copied().collect();
        for member in members {
            self.player_teams.remove(&member);
        }
        self.teams.shift_remove(name);
        info!(team = name, "deleted team");
        Ok(())
    }

    /// Adds a player to a team, moving them off their previous team
    /// first. Re-adding a player to their current team is a no-op.
    ///
    /// # Errors
    ///
    /// Rejects unknown teams and full teams; fails on store errors (in
    /// which case no membership changed).
    pub fn add_member(&mut self, player: PlayerId, team_name: &str) -> Result<(), OpError> {
        if !self.teams.contains_key(team_name) {
            return Err(GuardRejection::UnknownTeam(team_name.to_string()).into());
        }

        let previous = self.player_teams.get(&player).cloned();
        if previous.as_deref() == Some(team_name) {
            return Ok(());
        }

        if self.is_team_full(team_name) {
            return Err(GuardRejection::TeamFull(team_name.to_string()).into());
        }

        // Stage both documents, persist them, then commit the maps in
        // one step.
        let staged_previous = previous.as_deref().and_then(|prev| {
            self.teams.get(prev).map(|team| {
                let mut staged = team.clone();
                staged.remove_member(player);
                staged
            })
        });
        let staged_target = self.teams.get(team_name).map(|team| {
            let mut staged = team.clone();
            staged.add_member(player);
            staged
        });

        if let Some(staged) = &staged_previous {
            self.store.save_team(staged)?;
        }
        if let Some(staged) = &staged_target {
            if let Err(e) = self.store.save_team(staged) {
                // Best-effort rollback of the first write.
                if let Some(prev) = previous.as_deref().and_then(|p| self.teams.get(p)) {
                    let _ = self.store.save_team(prev);
                }
                return Err(e.into());
            }
        }

        if let Some(staged) = staged_previous {
            self.teams.insert(staged.name().to_string(), staged);
        }
        if let Some(staged) = staged_target {
            self.teams.insert(staged.name().to_string(), staged);
        }
        self.player_teams.insert(player, team_name.to_string());
        debug!(%player, team = team_name, "added member");
        Ok(())
    }

    /// Removes a player from their team.
    ///
    /// # Errors
    ///
    /// Rejects players that are not on any team; fails on store
    /// errors.
    pub fn remove_member(&mut self, player: PlayerId) -> Result<(), OpError> {
        let team_name = self
            .player_teams
            .get(&player)
            .cloned()
            .ok_or(GuardRejection::NotOnTeam)?;

        if let Some(team) = self.teams.get(&team_name) {
            let mut staged = team.clone();
            staged.remove_member(player);
            self.store.save_team(&staged)?;
            self.teams.insert(team_name.clone(), staged);
        }
        self.player_teams.remove(&player);
        debug!(%player, team = %team_name, "removed member");
        Ok(())
    }

    /// Returns the non-full team with the fewest members; ties are
    /// broken by team creation order.
    #[must_use]
    pub fn team_with_fewest_members(&self) -> Option<&Team> {
        let mut fewest: Option<&Team> = None;
        for team in self.teams.values() {
            if self.is_full(team) {
                continue;
            }
            if fewest.is_none_or(|best| team.member_count() < best.member_count()) {
                fewest = Some(team);
            }
        }
        fewest
    }

    /// Automatically assigns a player to the fewest-member team.
    ///
    /// Returns the player's current team if already assigned. Refuses
    /// (returns `None`) when policy restricts auto-assignment to the
    /// waiting state and the race is not waiting, or when no team has
    /// room.
    pub fn auto_assign(&mut self, player: PlayerId, global: RaceState) -> Option<String> {
        if let Some(current) = self.player_teams.get(&player) {
            return Some(current.clone());
        }

        if self.settings.auto_assign.only_when_waiting && global != RaceState::Waiting {
            return None;
        }

        let target = self.team_with_fewest_members()?.name().to_string();
        match self.add_member(player, &target) {
            Ok(()) => Some(target),
            Err(e) => {
                debug!(%player, error = %e, "auto-assign failed");
                None
            }
        }
    }

    /// Randomly assigns every eligible, still-unassigned player.
    ///
    /// Players are shuffled into random order and then greedily placed
    /// on the *then-current* fewest-member team, so assignment keeps
    /// rebalancing as it proceeds. Players that no longer fit anywhere
    /// are left unassigned.
    pub fn random_assign_all(&mut self, eligible: &[PlayerId]) -> Vec<(PlayerId, String)> {
        let mut pool: Vec<PlayerId> = eligible
            .iter()
            .filter(|p| !self.player_teams.contains_key(p))
            .copied()
            .collect();
        pool.shuffle(&mut rand::thread_rng());

        let mut assignments = Vec::new();
        for player in pool {
            let Some(target) = self.team_with_fewest_members().map(|t| t.name().to_string())
            else {
                break;
            };
            if self.add_member(player, &target).is_ok() {
                assignments.push((player, target));
            }
        }
        assignments
    }

    /// Attaches a provisioned arena to a team.
    ///
    /// # Errors
    ///
    /// Rejects unknown teams; fails on store errors.
    pub fn set_arena(&mut self, team_name: &str, arena: ArenaRef) -> Result<(), OpError> {
        let team = self
            .teams
            .get(team_name)
            .ok_or_else(|| GuardRejection::UnknownTeam(team_name.to_string()))?;

        let mut staged = team.clone();
        staged.arena = Some(arena);
        self.store.save_team(&staged)?;
        self.teams.insert(team_name.to_string(), staged);
        Ok(())
    }

    /// Applies a mutation to one team, persisting before committing.
    ///
    /// # Errors
    ///
    /// Rejects unknown teams; fails on store errors, in which case the
    /// in-memory team is unchanged.
    pub fn update_team(
        &mut self,
        team_name: &str,
        mutate: impl FnOnce(&mut Team),
    ) -> Result<(), OpError> {
        let team = self
            .teams
            .get(team_name)
            .ok_or_else(|| GuardRejection::UnknownTeam(team_name.to_string()))?;

        let mut staged = team.clone();
        mutate(&mut staged);
        self.store.save_team(&staged)?;
        self.teams.insert(team_name.to_string(), staged);
        Ok(())
    }

    /// Resets every team's race progress, keeping membership and
    /// arenas.
    ///
    /// # Errors
    ///
    /// Fails on the first store error; teams already reset stay reset.
    pub fn reset_all(&mut self) -> Result<(), StoreError> {
        let names: Vec<String> = self.teams.keys().cloned().collect();
        for name in names {
            if let Some(team) = self.teams.get(&name) {
                let mut staged = team.clone();
                staged.reset();
                self.store.save_team(&staged)?;
                self.teams.insert(name, staged);
            }
        }
        Ok(())
    }

    /// Returns a team by name.
    #[must_use]
    pub fn team(&self, name: &str) -> Option<&Team> {
        self.teams.get(name)
    }

    /// Returns the team a player belongs to.
    #[must_use]
    pub fn team_of(&self, player: PlayerId) -> Option<&Team> {
        self.player_teams
            .get(&player)
            .and_then(|name| self.teams.get(name))
    }

    /// Returns whether the player belongs to any team.
    #[must_use]
    pub fn has_team(&self, player: PlayerId) -> bool {
        self.player_teams.contains_key(&player)
    }

    /// Iterates all teams in creation order.
    pub fn all_teams(&self) -> impl Iterator<Item = &Team> {
        self.teams.values()
    }

    /// Returns the number of teams.
    #[must_use]
    pub fn team_count(&self) -> usize {
        self.teams.len()
    }

    /// Returns whether the named team is at capacity. Unknown teams
    /// count as full.
    #[must_use]
    pub fn is_team_full(&self, name: &str) -> bool {
        self.teams.get(name).is_none_or(|team| self.is_full(team))
    }

    fn is_full(&self, team: &Team) -> bool {
        let max = self.settings.max_members as usize;
        max > 0 && team.member_count() >= max
    }
}
