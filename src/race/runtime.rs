//! Serialized engine runtime.
//!
//! All race state lives on one task: the runtime owns the
//! [`RaceEngine`](super::engine::RaceEngine) and drains two unbounded
//! channels in a single `select!` loop: external commands arriving
//! through an [`EngineHandle`], and internal tick events fed by the
//! countdown and live-clock tickers. External event sources therefore
//! enqueue work instead of mutating state from arbitrary tasks, and no
//! two mutations are ever concurrent.

use std::sync::Arc;

use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tracing::debug;

use crate::arena::{ArenaProvisioner, ArenaRef};
use crate::config::Settings;
use crate::error::OpError;
use crate::notify::Notifier;
use crate::observability::events::EventEmitter;
use crate::store::SharedStore;

use super::engine::RaceEngine;
use super::state::{CompletionRecord, PlayerId, RaceState, Team};

/// Internal tick events fed into the serialized loop by the repeating
/// timers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EngineEvent {
    /// One second of the start countdown elapsed
    CountdownTick,
    /// The live-clock broadcast period elapsed
    ClockTick,
}

type Reply<T> = oneshot::Sender<T>;

/// Commands accepted by the engine runtime.
enum EngineCommand {
    CreateTeam {
        name: String,
        reply: Reply<Result<Team, OpError>>,
    },
    DeleteTeam {
        name: String,
        reply: Reply<Result<(), OpError>>,
    },
    AddMember {
        player: PlayerId,
        team: String,
        reply: Reply<Result<(), OpError>>,
    },
    RemoveMember {
        player: PlayerId,
        reply: Reply<Result<(), OpError>>,
    },
    AutoAssign {
        player: PlayerId,
        reply: Reply<Option<String>>,
    },
    RandomAssignAll {
        eligible: Vec<PlayerId>,
        reply: Reply<Vec<(PlayerId, String)>>,
    },
    SetTeamColor {
        name: String,
        color: String,
        reply: Reply<Result<(), OpError>>,
    },
    SetSeed {
        seed: i64,
        reply: Reply<Result<(), OpError>>,
    },
    ProvisionArena {
        team: String,
        reply: Reply<Result<ArenaRef, OpError>>,
    },
    StartRace {
        reply: Reply<Result<(), OpError>>,
    },
    CompleteByArena {
        instance_id: String,
        reply: Reply<bool>,
    },
    CompleteByTeam {
        name: String,
        reply: Reply<bool>,
    },
    GoalReached {
        player: PlayerId,
        goal_id: String,
        reply: Reply<bool>,
    },
    PlayerJoined {
        player: PlayerId,
    },
    PlayerQuit {
        player: PlayerId,
    },
    Reset {
        reply: Reply<Result<(), OpError>>,
    },
    Status {
        reply: Reply<String>,
    },
    TeamStatus {
        name: String,
        reply: Reply<Option<String>>,
    },
    Teams {
        reply: Reply<Vec<Team>>,
    },
    GlobalState {
        reply: Reply<RaceState>,
    },
    Records {
        reply: Reply<Vec<CompletionRecord>>,
    },
    ElapsedMs {
        reply: Reply<u64>,
    },
    ShowLeaderboard,
    Shutdown,
}

/// Cloneable handle enqueuing commands onto the serialized runtime.
#[derive(Clone)]
pub struct EngineHandle {
    tx: mpsc::UnboundedSender<EngineCommand>,
}

macro_rules! ask {
    ($self:ident, $variant:ident { $($field:ident),* }) => {{
        let (reply, rx) = oneshot::channel();
        $self
            .tx
            .send(EngineCommand::$variant { $($field,)* reply })
            .map_err(|_| OpError::EngineStopped)?;
        rx.await.map_err(|_| OpError::EngineStopped)
    }};
}

impl EngineHandle {
    /// Creates a team.
    ///
    /// # Errors
    ///
    /// Engine rejections plus [`OpError::EngineStopped`] when the
    /// runtime is gone.
    pub async fn create_team(&self, name: &str) -> Result<Team, OpError> {
        let name = name.to_string();
        ask!(self, CreateTeam { name })?
    }

    /// Deletes a team.
    ///
    /// # Errors
    ///
    /// Engine rejections plus [`OpError::EngineStopped`].
    pub async fn delete_team(&self, name: &str) -> Result<(), OpError> {
        let name = name.to_string();
        ask!(self, DeleteTeam { name })?
    }

    /// Adds a player to a team.
    ///
    /// # Errors
    ///
    /// Engine rejections plus [`OpError::EngineStopped`].
    pub async fn add_member(&self, player: PlayerId, team: &str) -> Result<(), OpError> {
        let team = team.to_string();
        ask!(self, AddMember { player, team })?
    }

    /// Removes a player from their team.
    ///
    /// # Errors
    ///
    /// Engine rejections plus [`OpError::EngineStopped`].
    pub async fn remove_member(&self, player: PlayerId) -> Result<(), OpError> {
        ask!(self, RemoveMember { player })?
    }

    /// Auto-assigns a player.
    ///
    /// # Errors
    ///
    /// [`OpError::EngineStopped`] when the runtime is gone.
    pub async fn auto_assign(&self, player: PlayerId) -> Result<Option<String>, OpError> {
        ask!(self, AutoAssign { player })
    }

    /// Randomly distributes eligible players over the teams.
    ///
    /// # Errors
    ///
    /// [`OpError::EngineStopped`] when the runtime is gone.
    pub async fn random_assign_all(
        &self,
        eligible: Vec<PlayerId>,
    ) -> Result<Vec<(PlayerId, String)>, OpError> {
        ask!(self, RandomAssignAll { eligible })
    }

    /// Sets a team's display color tag.
    ///
    /// # Errors
    ///
    /// Engine rejections plus [`OpError::EngineStopped`].
    pub async fn set_team_color(&self, name: &str, color: &str) -> Result<(), OpError> {
        let name = name.to_string();
        let color = color.to_string();
        ask!(self, SetTeamColor { name, color })?
    }

    /// Sets the arena seed.
    ///
    /// # Errors
    ///
    /// Engine rejections plus [`OpError::EngineStopped`].
    pub async fn set_seed(&self, seed: i64) -> Result<(), OpError> {
        ask!(self, SetSeed { seed })?
    }

    /// Provisions an arena for a team.
    ///
    /// # Errors
    ///
    /// Engine rejections plus [`OpError::EngineStopped`].
    pub async fn provision_arena(&self, team: &str) -> Result<ArenaRef, OpError> {
        let team = team.to_string();
        ask!(self, ProvisionArena { team })?
    }

    /// Starts the race.
    ///
    /// # Errors
    ///
    /// Engine rejections plus [`OpError::EngineStopped`].
    pub async fn start_race(&self) -> Result<(), OpError> {
        ask!(self, StartRace {})?
    }

    /// Signals completion by race-instance identity.
    ///
    /// # Errors
    ///
    /// [`OpError::EngineStopped`] when the runtime is gone.
    pub async fn complete_by_arena(&self, instance_id: &str) -> Result<bool, OpError> {
        let instance_id = instance_id.to_string();
        ask!(self, CompleteByArena { instance_id })
    }

    /// Signals completion by team name.
    ///
    /// # Errors
    ///
    /// [`OpError::EngineStopped`] when the runtime is gone.
    pub async fn complete_by_team(&self, name: &str) -> Result<bool, OpError> {
        let name = name.to_string();
        ask!(self, CompleteByTeam { name })
    }

    /// Signals a goal reached by a player.
    ///
    /// # Errors
    ///
    /// [`OpError::EngineStopped`] when the runtime is gone.
    pub async fn goal_reached(&self, player: PlayerId, goal_id: &str) -> Result<bool, OpError> {
        let goal_id = goal_id.to_string();
        ask!(self, GoalReached { player, goal_id })
    }

    /// Notifies the engine of a player joining (fire-and-forget).
    pub fn player_joined(&self, player: PlayerId) {
        let _ = self.tx.send(EngineCommand::PlayerJoined { player });
    }

    /// Notifies the engine of a player disconnecting
    /// (fire-and-forget).
    pub fn player_quit(&self, player: PlayerId) {
        let _ = self.tx.send(EngineCommand::PlayerQuit { player });
    }

    /// Resets the race.
    ///
    /// # Errors
    ///
    /// Engine rejections plus [`OpError::EngineStopped`].
    pub async fn reset(&self) -> Result<(), OpError> {
        ask!(self, Reset {})?
    }

    /// Returns the overall status text.
    ///
    /// # Errors
    ///
    /// [`OpError::EngineStopped`] when the runtime is gone.
    pub async fn status(&self) -> Result<String, OpError> {
        ask!(self, Status {})
    }

    /// Returns the status text for one team.
    ///
    /// # Errors
    ///
    /// [`OpError::EngineStopped`] when the runtime is gone.
    pub async fn team_status(&self, name: &str) -> Result<Option<String>, OpError> {
        let name = name.to_string();
        ask!(self, TeamStatus { name })
    }

    /// Returns all teams.
    ///
    /// # Errors
    ///
    /// [`OpError::EngineStopped`] when the runtime is gone.
    pub async fn teams(&self) -> Result<Vec<Team>, OpError> {
        ask!(self, Teams {})
    }

    /// Returns the global race state.
    ///
    /// # Errors
    ///
    /// [`OpError::EngineStopped`] when the runtime is gone.
    pub async fn global_state(&self) -> Result<RaceState, OpError> {
        ask!(self, GlobalState {})
    }

    /// Returns the completion records in finishing order.
    ///
    /// # Errors
    ///
    /// [`OpError::EngineStopped`] when the runtime is gone.
    pub async fn records(&self) -> Result<Vec<CompletionRecord>, OpError> {
        ask!(self, Records {})
    }

    /// Returns the shared elapsed time in milliseconds.
    ///
    /// # Errors
    ///
    /// [`OpError::EngineStopped`] when the runtime is gone.
    pub async fn elapsed_ms(&self) -> Result<u64, OpError> {
        ask!(self, ElapsedMs {})
    }

    /// Broadcasts the leaderboard (fire-and-forget).
    pub fn show_leaderboard(&self) {
        let _ = self.tx.send(EngineCommand::ShowLeaderboard);
    }

    /// Stops the runtime loop.
    pub fn shutdown(&self) {
        let _ = self.tx.send(EngineCommand::Shutdown);
    }
}

/// Everything the runtime needs to build its engine.
pub struct RuntimeOptions {
    /// Parsed settings
    pub settings: Settings,
    /// Persistence gateway
    pub store: SharedStore,
    /// Arena provisioning collaborator
    pub arenas: Arc<dyn ArenaProvisioner>,
    /// Player-facing notification sink
    pub notifier: Arc<dyn Notifier>,
    /// Optional structured event stream
    pub emitter: Option<EventEmitter>,
}

/// Builds the engine, loads persisted state, resumes the clock, and
/// spawns the serialized runtime loop.
#[must_use]
pub fn spawn(opts: RuntimeOptions) -> (EngineHandle, JoinHandle<()>) {
    let (cmd_tx, cmd_rx) = mpsc::unbounded_channel();
    let (event_tx, event_rx) = mpsc::unbounded_channel();

    let mut engine = RaceEngine::new(
        opts.settings,
        opts.store,
        opts.arenas,
        opts.notifier,
        event_tx,
    );
    if let Some(emitter) = opts.emitter {
        engine = engine.with_emitter(emitter);
    }

    let task = tokio::spawn(run_loop(engine, cmd_rx, event_rx));
    (EngineHandle { tx: cmd_tx }, task)
}

async fn run_loop(
    mut engine: RaceEngine,
    mut commands: mpsc::UnboundedReceiver<EngineCommand>,
    mut events: mpsc::UnboundedReceiver<EngineEvent>,
) {
    engine.load().await;
    engine.resume_if_running();

    loop {
        tokio::select! {
            command = commands.recv() => {
                match command {
                    Some(command) => {
                        if dispatch(&mut engine, command).await {
                            break;
                        }
                    }
                    // All handles dropped: nothing can drive us anymore.
                    None => break,
                }
            }
            Some(event) = events.recv() => {
                engine.handle_event(event).await;
            }
        }
    }

    engine.shutdown();
    debug!("engine runtime stopped");
}

/// Handles one command; returns `true` on shutdown.
async fn dispatch(engine: &mut RaceEngine, command: EngineCommand) -> bool {
    match command {
        EngineCommand::CreateTeam { name, reply } => {
            let _ = reply.send(engine.create_team(&name));
        }
        EngineCommand::DeleteTeam { name, reply } => {
            let _ = reply.send(engine.delete_team(&name).await);
        }
        EngineCommand::AddMember {
            player,
            team,
            reply,
        } => {
            let _ = reply.send(engine.add_member(player, &team));
        }
        EngineCommand::RemoveMember { player, reply } => {
            let _ = reply.send(engine.remove_member(player));
        }
        EngineCommand::AutoAssign { player, reply } => {
            let _ = reply.send(engine.auto_assign(player));
        }
        EngineCommand::RandomAssignAll { eligible, reply } => {
            let _ = reply.send(engine.random_assign_all(&eligible));
        }
        EngineCommand::SetTeamColor { name, color, reply } => {
            let _ = reply.send(engine.set_team_color(&name, &color));
        }
        EngineCommand::SetSeed { seed, reply } => {
            let _ = reply.send(engine.set_seed(seed));
        }
        EngineCommand::ProvisionArena { team, reply } => {
            let _ = reply.send(engine.provision_arena(&team).await);
        }
        EngineCommand::StartRace { reply } => {
            let _ = reply.send(engine.start_race().await);
        }
        EngineCommand::CompleteByArena { instance_id, reply } => {
            let _ = reply.send(engine.complete_by_arena(&instance_id).await);
        }
        EngineCommand::CompleteByTeam { name, reply } => {
            let _ = reply.send(engine.complete_by_team(&name));
        }
        EngineCommand::GoalReached {
            player,
            goal_id,
            reply,
        } => {
            let _ = reply.send(engine.goal_reached(player, &goal_id));
        }
        EngineCommand::PlayerJoined { player } => {
            engine.player_joined(player).await;
        }
        EngineCommand::PlayerQuit { player } => {
            engine.player_quit(player);
        }
        EngineCommand::Reset { reply } => {
            let _ = reply.send(engine.reset());
        }
        EngineCommand::Status { reply } => {
            let _ = reply.send(engine.status());
        }
        EngineCommand::TeamStatus { name, reply } => {
            let _ = reply.send(engine.team_status(&name));
        }
        EngineCommand::Teams { reply } => {
            let _ = reply.send(engine.roster().all_teams().cloned().collect());
        }
        EngineCommand::GlobalState { reply } => {
            let _ = reply.send(engine.state());
        }
        EngineCommand::Records { reply } => {
            let _ = reply.send(engine.records().to_vec());
        }
        EngineCommand::ElapsedMs { reply } => {
            let _ = reply.send(engine.elapsed_ms());
        }
        EngineCommand::ShowLeaderboard => {
            engine.show_leaderboard();
        }
        EngineCommand::Shutdown => return true,
    }
    false
}
