//! Race orchestration engine.
//!
//! The `RaceEngine` owns one [`Roster`] and one [`RaceClock`] and
//! drives the global/per-team state machine: start-eligibility checks,
//! countdown sequencing, completion handling, the finishing-order
//! leaderboard, and reset. Everything here runs on the serialized
//! runtime task (`race::runtime`); no method is ever called
//! concurrently.

use std::fmt::Write as _;
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use metrics::counter;
use tokio::sync::mpsc;
use tracing::{error, info, warn};

use crate::arena::{ArenaProvisioner, ArenaRef, Zone};
use crate::config::Settings;
use crate::error::{GuardRejection, OpError, StartBlocked, StoreError};
use crate::notify::{Notifier, format_clock, format_hms, rank_label};
use crate::observability::events::{Event, EventEmitter};
use crate::store::SharedStore;

use super::clock::{RaceClock, Ticker};
use super::roster::Roster;
use super::runtime::EngineEvent;
use super::state::{CompletionRecord, PlayerId, RaceState, Team};

/// An in-flight start countdown.
struct Countdown {
    remaining: u32,
    ticker: Ticker,
}

/// Multi-team race orchestrator.
pub struct RaceEngine {
    settings: Settings,
    store: SharedStore,
    arenas: Arc<dyn ArenaProvisioner>,
    notifier: Arc<dyn Notifier>,
    events_tx: mpsc::UnboundedSender<EngineEvent>,
    emitter: Option<EventEmitter>,
    roster: Roster,
    clock: RaceClock,
    state: RaceState,
    countdown: Option<Countdown>,
    records: Vec<CompletionRecord>,
}

impl RaceEngine {
    /// Creates an engine over the given collaborators.
    ///
    /// `events_tx` is the sending side of the serialized runtime's
    /// internal event channel; the countdown and live-clock tickers
    /// feed it.
    #[must_use]
    pub fn new(
        settings: Settings,
        store: SharedStore,
        arenas: Arc<dyn ArenaProvisioner>,
        notifier: Arc<dyn Notifier>,
        events_tx: mpsc::UnboundedSender<EngineEvent>,
    ) -> Self {
        let roster = Roster::new(Arc::clone(&store), settings.teams.clone());
        let clock = RaceClock::new(
            Arc::clone(&store),
            events_tx.clone(),
            settings.clock.update_period(),
            settings.clock.show_live_clock,
        );
        Self {
            settings,
            store,
            arenas,
            notifier,
            events_tx,
            emitter: None,
            roster,
            clock,
            state: RaceState::Waiting,
            countdown: None,
            records: Vec::new(),
        }
    }

    /// Attaches a structured event emitter.
    #[must_use]
    pub fn with_emitter(mut self, emitter: EventEmitter) -> Self {
        self.emitter = Some(emitter);
        self
    }

    /// Loads persisted state: the roster, the global race state, and
    /// the provisioner's arena registry.
    pub async fn load(&mut self) {
        self.roster.load();
        self.state = self.store.game_state();

        let arenas: Vec<ArenaRef> = self
            .roster
            .all_teams()
            .filter_map(|team| team.arena.clone())
            .collect();
        for arena in arenas {
            self.arenas.register(arena).await;
        }
        info!(state = %self.state, "engine state loaded");
    }

    /// Resumes the live-clock broadcast after a restart if a start
    /// instant is persisted.
    pub fn resume_if_running(&mut self) {
        self.clock.resume_if_running();
    }

    /// Returns the global race state.
    #[must_use]
    pub const fn state(&self) -> RaceState {
        self.state
    }

    /// Returns the completion records in finishing order.
    #[must_use]
    pub fn records(&self) -> &[CompletionRecord] {
        &self.records
    }

    /// Returns the shared elapsed race time in milliseconds.
    #[must_use]
    pub fn elapsed_ms(&self) -> u64 {
        self.clock.elapsed_ms()
    }

    /// Returns a view of the roster.
    #[must_use]
    pub const fn roster(&self) -> &Roster {
        &self.roster
    }

    // ------------------------------------------------------------------
    // Roster facade
    // ------------------------------------------------------------------

    /// Creates a team; a team created mid-race starts running.
    ///
    /// # Errors
    ///
    /// Rejects duplicate names; fails on store errors.
    pub fn create_team(&mut self, name: &str) -> Result<Team, OpError> {
        self.roster.create_team(name, self.state)
    }

    /// Deletes a team, refusing while its arena cannot be safely
    /// released.
    ///
    /// # Errors
    ///
    /// Rejects unknown teams and busy arenas; fails on store or
    /// provisioning errors.
    pub async fn delete_team(&mut self, name: &str) -> Result<(), OpError> {
        self.roster.delete_team(name, self.arenas.as_ref()).await
    }

    /// Adds a player to a team.
    ///
    /// # Errors
    ///
    /// Rejects unknown or full teams; fails on store errors.
    pub fn add_member(&mut self, player: PlayerId, team: &str) -> Result<(), OpError> {
        self.roster.add_member(player, team)
    }

    /// Removes a player from their team.
    ///
    /// # Errors
    ///
    /// Rejects players without a team; fails on store errors.
    pub fn remove_member(&mut self, player: PlayerId) -> Result<(), OpError> {
        self.roster.remove_member(player)
    }

    /// Auto-assigns a player per the fewest-members policy.
    pub fn auto_assign(&mut self, player: PlayerId) -> Option<String> {
        self.roster.auto_assign(player, self.state)
    }

    /// Randomly distributes the eligible players over the teams.
    pub fn random_assign_all(&mut self, eligible: &[PlayerId]) -> Vec<(PlayerId, String)> {
        self.roster.random_assign_all(eligible)
    }

    /// Sets a team's display color tag. The tag is carried for the
    /// external identity layer and has no effect on orchestration.
    ///
    /// # Errors
    ///
    /// Rejects unknown teams; fails on store errors.
    pub fn set_team_color(&mut self, name: &str, color: &str) -> Result<(), OpError> {
        let color = color.to_string();
        self.roster.update_team(name, move |team| team.color = Some(color))
    }

    // ------------------------------------------------------------------
    // Setup
    // ------------------------------------------------------------------

    /// Sets the shared arena seed for the current race cycle.
    ///
    /// # Errors
    ///
    /// Fails if the seed cannot be persisted.
    pub fn set_seed(&mut self, seed: i64) -> Result<(), OpError> {
        self.store.set_seed(seed)?;
        info!(seed, "seed configured");
        Ok(())
    }

    /// Provisions an arena for a team using the configured seed.
    ///
    /// # Errors
    ///
    /// Rejects when no seed is set, the team is unknown, or it already
    /// has an arena; surfaces provisioning and store failures.
    pub async fn provision_arena(&mut self, team_name: &str) -> Result<ArenaRef, OpError> {
        let seed = self.store.seed().ok_or(GuardRejection::NoSeed)?;
        let team = self
            .roster
            .team(team_name)
            .ok_or_else(|| GuardRejection::UnknownTeam(team_name.to_string()))?;
        if team.has_arena() {
            return Err(GuardRejection::AlreadyProvisioned(team_name.to_string()).into());
        }

        let arena = self.arenas.create_arena(team_name, seed).await?;
        self.roster.set_arena(team_name, arena.clone())?;
        Ok(arena)
    }

    // ------------------------------------------------------------------
    // Start
    // ------------------------------------------------------------------

    /// Checks start eligibility, failing closed with the first reason
    /// found.
    ///
    /// # Errors
    ///
    /// Returns the blocking [`StartBlocked`] reason.
    pub fn can_start(&self) -> Result<(), StartBlocked> {
        if self.state != RaceState::Waiting {
            return Err(StartBlocked::AlreadyStarted);
        }
        // Global state stays `Waiting` until the countdown expires; a
        // second start must not stack a second countdown.
        if self.countdown.is_some() {
            return Err(StartBlocked::CountdownRunning);
        }
        if self.store.seed().is_none() {
            return Err(StartBlocked::NoSeed);
        }
        if self.roster.team_count() == 0 {
            return Err(StartBlocked::NoTeams);
        }
        for team in self.roster.all_teams() {
            if !team.has_arena() {
                return Err(StartBlocked::ArenaMissing(team.name().to_string()));
            }
            if team.member_count() == 0 {
                return Err(StartBlocked::EmptyTeam(team.name().to_string()));
            }
        }
        Ok(())
    }

    /// Starts the race, going through the configured countdown first.
    /// A zero-second countdown starts immediately.
    ///
    /// # Errors
    ///
    /// Rejects with the blocking reason when ineligible; fails on
    /// store errors during an immediate start.
    pub async fn start_race(&mut self) -> Result<(), OpError> {
        self.can_start()?;

        let seconds = self.settings.race.start_countdown_secs;
        if seconds == 0 {
            self.execute_start().await
        } else {
            self.begin_countdown(seconds);
            Ok(())
        }
    }

    fn begin_countdown(&mut self, seconds: u32) {
        self.notifier
            .broadcast(&format!("Race starts in {seconds} seconds!"));
        let ticker = Ticker::spawn(
            Duration::from_secs(1),
            self.events_tx.clone(),
            EngineEvent::CountdownTick,
        );
        self.countdown = Some(Countdown {
            remaining: seconds,
            ticker,
        });
        self.emit(Event::CountdownStarted {
            timestamp: Utc::now(),
            seconds,
        });
        info!(seconds, "countdown started");
    }

    /// Returns the remaining countdown seconds while a countdown is in
    /// flight.
    #[must_use]
    pub fn countdown_remaining(&self) -> Option<u32> {
        self.countdown.as_ref().map(|c| c.remaining)
    }

    pub(crate) async fn handle_event(&mut self, event: EngineEvent) {
        match event {
            EngineEvent::CountdownTick => self.countdown_tick().await,
            EngineEvent::ClockTick => self.clock_tick(),
        }
    }

    async fn countdown_tick(&mut self) {
        let Some(countdown) = &mut self.countdown else {
            return;
        };
        countdown.remaining = countdown.remaining.saturating_sub(1);
        let remaining = countdown.remaining;

        if remaining == 0 {
            if let Some(done) = self.countdown.take() {
                done.ticker.cancel();
            }
            if let Err(e) = self.execute_start().await {
                error!(error = %e, "race start failed after countdown");
            }
        } else if remaining <= 5 || remaining % 10 == 0 {
            self.notifier
                .broadcast(&format!("{remaining} seconds to go..."));

            if remaining <= 3 {
                for team in self.roster.all_teams() {
                    for member in team.members() {
                        self.notifier
                            .show_title(*member, &remaining.to_string(), "Get ready!");
                    }
                }
            }
        }
    }

    async fn execute_start(&mut self) -> Result<(), OpError> {
        self.set_global_state(RaceState::Running)?;
        self.records.clear();

        let names: Vec<String> = self
            .roster
            .all_teams()
            .map(|team| team.name().to_string())
            .collect();

        for name in &names {
            self.roster
                .update_team(name, |team| team.state = RaceState::Running)?;

            let teleport = self.roster.team(name).and_then(|team| {
                team.arena
                    .clone()
                    .map(|arena| (arena, team.members().iter().copied().collect::<Vec<_>>()))
            });
            if let Some((arena, members)) = teleport {
                for member in members {
                    self.arenas
                        .teleport_to_spawn(&arena, Zone::Main, member)
                        .await;
                }
            }
        }

        self.clock.start()?;
        self.notifier.broadcast("The race has started!");

        if self.settings.race.show_title_on_start {
            for team in self.roster.all_teams() {
                for member in team.members() {
                    self.notifier
                        .show_title(*member, "GO!", "Fastest clear wins!");
                }
            }
        }

        counter!("timetrial_races_started_total").increment(1);
        self.emit(Event::RaceStarted {
            timestamp: Utc::now(),
            seed: self.store.seed().unwrap_or_default(),
            teams: names.len(),
        });
        info!(teams = names.len(), "race started");
        Ok(())
    }

    // ------------------------------------------------------------------
    // Completion
    // ------------------------------------------------------------------

    /// Handles a completion signal keyed by race-instance identity.
    ///
    /// Returns `false` (with no side effects) when the race is not
    /// running, the instance id is unknown, or the resolved team is
    /// not currently running.
    pub async fn complete_by_arena(&mut self, instance_id: &str) -> bool {
        if self.state != RaceState::Running {
            return false;
        }
        let Some(team) = self.arenas.resolve_team(instance_id).await else {
            warn!(instance_id, "completion signal for unknown instance");
            return false;
        };
        self.complete_by_team(&team)
    }

    /// Marks a team as completed, assigning the next finishing rank.
    ///
    /// Idempotent: completing a team that is not currently running
    /// returns `false` with no side effects, so double signals never
    /// double-count.
    pub fn complete_by_team(&mut self, name: &str) -> bool {
        let Some(team) = self.roster.team(name) else {
            return false;
        };
        if team.state != RaceState::Running {
            return false;
        }

        // Freeze the time at the moment of completion.
        let elapsed = self.clock.elapsed_at_ms(RaceClock::now_ms());

        if let Err(e) = self.roster.update_team(name, |team| {
            team.state = RaceState::Completed;
            team.completion_time_ms = Some(elapsed);
        }) {
            error!(team = name, error = %e, "failed to persist completion");
            return false;
        }

        let rank = self.records.len() + 1;
        self.records.push(CompletionRecord {
            team: name.to_string(),
            elapsed_ms: elapsed,
            rank,
        });

        self.announce_completion(name, elapsed, rank);
        counter!("timetrial_completions_total").increment(1);
        self.emit(Event::TeamCompleted {
            timestamp: Utc::now(),
            team: name.to_string(),
            elapsed_ms: elapsed,
            rank,
        });
        info!(team = name, elapsed = %format_hms(elapsed), rank, "team completed");

        if self
            .roster
            .all_teams()
            .all(|team| team.state == RaceState::Completed)
        {
            self.finish_race();
        }
        true
    }

    /// Handles a goal-reached signal from the event layer: when the
    /// goal id is one of the configured completion goals, the player's
    /// team completes.
    pub fn goal_reached(&mut self, player: PlayerId, goal_id: &str) -> bool {
        if self.state != RaceState::Running {
            return false;
        }
        if !self
            .settings
            .race
            .completion_goals
            .iter()
            .any(|goal| goal == goal_id)
        {
            return false;
        }
        let Some(team) = self.roster.team_of(player) else {
            return false;
        };
        if team.state != RaceState::Running {
            return false;
        }
        let name = team.name().to_string();
        self.complete_by_team(&name)
    }

    fn announce_completion(&self, name: &str, elapsed: u64, rank: usize) {
        let time = format_hms(elapsed);
        self.notifier
            .broadcast(&format!("Team '{name}' finished in {time}!"));
        self.notifier
            .broadcast(&format!("That's {} place!", rank_label(rank)));

        if let Some(team) = self.roster.team(name) {
            for member in team.members() {
                self.notifier.show_title(*member, "Finished!", &time);
            }
        }
    }

    fn finish_race(&mut self) {
        if let Err(e) = self.set_global_state(RaceState::Completed) {
            error!(error = %e, "failed to persist final race state");
        }
        self.clock.stop();
        self.notifier.broadcast("=== Race finished ===");
        self.show_leaderboard();
        self.emit(Event::RaceFinished {
            timestamp: Utc::now(),
            teams_completed: self.records.len(),
        });
        info!("race finished");
    }

    /// Broadcasts the leaderboard ordered by finishing rank.
    pub fn show_leaderboard(&self) {
        if self.records.is_empty() {
            self.notifier.broadcast("No team has finished yet.");
            return;
        }
        self.notifier.broadcast("=== Final results ===");
        for record in &self.records {
            self.notifier.broadcast(&format!(
                "{} {} - {}",
                rank_label(record.rank),
                record.team,
                format_hms(record.elapsed_ms)
            ));
        }
    }

    // ------------------------------------------------------------------
    // Reset
    // ------------------------------------------------------------------

    /// Resets the whole race cycle back to waiting.
    ///
    /// Cancels any in-flight countdown, stops and clears the clock,
    /// resets every team's progress (membership and arenas are
    /// preserved), and clears the completion records.
    ///
    /// # Errors
    ///
    /// Fails on store errors.
    pub fn reset(&mut self) -> Result<(), OpError> {
        if let Some(countdown) = self.countdown.take() {
            countdown.ticker.cancel();
            info!("countdown cancelled by reset");
        }

        self.clock.stop();
        self.clock.reset()?;
        self.roster.reset_all()?;
        self.records.clear();
        self.set_global_state(RaceState::Waiting)?;

        self.notifier.broadcast("The race has been reset.");
        counter!("timetrial_resets_total").increment(1);
        self.emit(Event::RaceReset {
            timestamp: Utc::now(),
        });
        info!("race reset");
        Ok(())
    }

    // ------------------------------------------------------------------
    // Player events
    // ------------------------------------------------------------------

    /// Handles a player joining: welcome-back plus a mid-race
    /// re-teleport for members, policy-gated auto-assignment for
    /// everyone else.
    pub async fn player_joined(&mut self, player: PlayerId) {
        if let Some(team) = self.roster.team_of(player).cloned() {
            self.notifier.send_to_player(
                player,
                &format!("Welcome back! You are on team '{}'.", team.name()),
            );
            if self.state == RaceState::Running && team.state == RaceState::Running {
                if let Some(arena) = &team.arena {
                    self.arenas.teleport_to_spawn(arena, Zone::Main, player).await;
                    self.notifier.send_to_player(
                        player,
                        "The race is in progress; you were moved to your team's arena.",
                    );
                }
            }
            return;
        }

        if !self.settings.teams.auto_assign.enabled {
            return;
        }
        if self.settings.teams.auto_assign.only_when_waiting && self.state != RaceState::Waiting {
            return;
        }
        if self.roster.team_count() == 0 {
            return;
        }

        if let Some(team) = self.roster.auto_assign(player, self.state) {
            self.notifier
                .send_to_player(player, &format!("You were assigned to team '{team}'."));
        }
    }

    /// Handles a player disconnecting. Membership is kept so the
    /// player rejoins the same team later.
    pub fn player_quit(&self, player: PlayerId) {
        if let Some(team) = self.roster.team_of(player) {
            info!(%player, team = team.name(), "player disconnected");
        }
    }

    // ------------------------------------------------------------------
    // Status
    // ------------------------------------------------------------------

    /// Renders a plain-text status summary of the whole race.
    #[must_use]
    pub fn status(&self) -> String {
        let mut out = String::new();
        let _ = writeln!(out, "state: {}", self.state);
        match self.store.seed() {
            Some(seed) => {
                let _ = writeln!(out, "seed: {seed}");
            }
            None => {
                let _ = writeln!(out, "seed: unset");
            }
        }
        if self.clock.is_started() {
            let _ = writeln!(out, "elapsed: {}", format_hms(self.clock.elapsed_ms()));
        }
        let _ = writeln!(out, "teams: {}", self.roster.team_count());
        for team in self.roster.all_teams() {
            let arena = if team.has_arena() { "arena ready" } else { "no arena" };
            let _ = writeln!(
                out,
                "  {} [{}] {} member(s), {}",
                team.name(),
                team.state,
                team.member_count(),
                arena
            );
        }
        out
    }

    /// Renders a plain-text status summary for one team.
    #[must_use]
    pub fn team_status(&self, name: &str) -> Option<String> {
        let team = self.roster.team(name)?;
        let mut out = String::new();
        let _ = writeln!(out, "team: {}", team.name());
        let _ = writeln!(out, "state: {}", team.state);
        let _ = writeln!(out, "members: {}", team.member_count());
        let _ = writeln!(
            out,
            "arena: {}",
            if team.has_arena() { "created" } else { "not created" }
        );
        match team.state {
            RaceState::Running => {
                let _ = writeln!(out, "elapsed: {}", format_hms(self.clock.elapsed_ms()));
            }
            RaceState::Completed => {
                if let Some(time) = team.completion_time_ms {
                    let _ = writeln!(out, "clear time: {}", format_hms(time));
                }
            }
            RaceState::Waiting => {}
        }
        Some(out)
    }

    /// Broadcasts the live clock to every member of every team.
    fn clock_tick(&self) {
        let elapsed = self.clock.elapsed_ms();
        if elapsed == 0 {
            return;
        }
        let text = format!("⏱ {}", format_clock(elapsed));
        for team in self.roster.all_teams() {
            for member in team.members() {
                self.notifier.show_ephemeral_bar(*member, &text);
            }
        }
    }

    /// Cancels the tickers; called when the runtime winds down.
    pub fn shutdown(&mut self) {
        if let Some(countdown) = self.countdown.take() {
            countdown.ticker.cancel();
        }
        self.clock.stop();
    }

    fn set_global_state(&mut self, state: RaceState) -> Result<(), StoreError> {
        self.store.set_game_state(state)?;
        self.state = state;
        Ok(())
    }

    fn emit(&self, event: Event) {
        if let Some(emitter) = &self.emitter {
            emitter.emit(&event);
        }
    }
}

impl std::fmt::Debug for RaceEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RaceEngine")
            .field("state", &self.state)
            .field("teams", &self.roster.team_count())
            .field("records", &self.records.len())
            .field("countdown", &self.countdown.as_ref().map(|c| c.remaining))
            .finish_non_exhaustive()
    }
}
