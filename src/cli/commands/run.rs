//! `run` command: the interactive console.
//!
//! This is the external command/event layer around the orchestration
//! core: a plain command-name to handler mapping over stdin lines,
//! each translated into a call against the engine handle. Player
//! identity is faked with a name directory handing out stable
//! `PlayerId`s, standing in for a real session layer.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use tokio::io::{AsyncBufReadExt, BufReader};

use crate::arena::LocalArenas;
use crate::cli::args::RunArgs;
use crate::config::Settings;
use crate::error::{OpError, TimetrialError};
use crate::notify::Notifier;
use crate::observability::events::EventEmitter;
use crate::observability::metrics::init_metrics;
use crate::race::runtime::{self, EngineHandle, RuntimeOptions};
use crate::race::state::PlayerId;
use crate::store::YamlStore;

/// Name to player-id mapping for the console.
#[derive(Default)]
struct PlayerDirectory {
    ids: Mutex<HashMap<String, PlayerId>>,
    names: Mutex<HashMap<PlayerId, String>>,
}

impl PlayerDirectory {
    /// Returns the player id for a name, creating one on first use.
    fn id_for(&self, name: &str) -> PlayerId {
        let mut ids = self.ids.lock().expect("directory lock");
        if let Some(id) = ids.get(name) {
            return *id;
        }
        let id = PlayerId::random();
        ids.insert(name.to_string(), id);
        self.names
            .lock()
            .expect("directory lock")
            .insert(id, name.to_string());
        id
    }

    fn name_of(&self, id: PlayerId) -> String {
        self.names
            .lock()
            .expect("directory lock")
            .get(&id)
            .cloned()
            .unwrap_or_else(|| id.to_string())
    }

    fn known_ids(&self) -> Vec<PlayerId> {
        self.ids.lock().expect("directory lock").values().copied().collect()
    }
}

/// [`Notifier`] printing everything to the console.
struct ConsoleNotifier {
    directory: Arc<PlayerDirectory>,
}

impl Notifier for ConsoleNotifier {
    fn broadcast(&self, text: &str) {
        println!("[all] {text}");
    }

    fn send_to_player(&self, player: PlayerId, text: &str) {
        println!("[@{}] {text}", self.directory.name_of(player));
    }

    fn show_title(&self, player: PlayerId, title: &str, subtitle: &str) {
        println!("[@{}] == {title} == {subtitle}", self.directory.name_of(player));
    }

    fn show_ephemeral_bar(&self, player: PlayerId, text: &str) {
        println!("[@{}] {text}", self.directory.name_of(player));
    }
}

/// Runs the orchestrator with an interactive console on stdin.
///
/// # Errors
///
/// Returns an error when settings, persistence, metrics, or the event
/// stream cannot be initialized.
pub async fn run(args: &RunArgs) -> Result<(), TimetrialError> {
    let mut settings = match &args.config {
        Some(path) => Settings::load_validated(path)?,
        None => Settings::default(),
    };
    if let Some(countdown) = args.countdown {
        settings.race.start_countdown_secs = countdown;
    }

    init_metrics(args.metrics_port)?;

    let store = Arc::new(YamlStore::open(&args.data)?);
    let directory = Arc::new(PlayerDirectory::default());
    let notifier = Arc::new(ConsoleNotifier {
        directory: Arc::clone(&directory),
    });
    let arenas = Arc::new(LocalArenas::new());
    let emitter = match &args.events {
        Some(path) => Some(EventEmitter::to_file(path)?),
        None => None,
    };

    let (handle, task) = runtime::spawn(RuntimeOptions {
        settings,
        store,
        arenas,
        notifier,
        emitter,
    });

    println!("timetrial console ready; type 'help' for commands");

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    while let Ok(Some(line)) = lines.next_line().await {
        let words: Vec<&str> = line.split_whitespace().collect();
        if words.is_empty() {
            continue;
        }
        match handle_command(&handle, &directory, &words).await {
            Ok(true) => {}
            Ok(false) => break,
            Err(OpError::EngineStopped) => {
                eprintln!("engine stopped unexpectedly");
                break;
            }
            Err(e) => println!("{e}"),
        }
    }

    handle.shutdown();
    let _ = task.await;
    Ok(())
}

/// Executes one console command; `Ok(false)` ends the session.
#[allow(clippy::too_many_lines)]
async fn handle_command(
    handle: &EngineHandle,
    directory: &PlayerDirectory,
    words: &[&str],
) -> Result<bool, OpError> {
    match words {
        ["help"] => print_help(),
        ["status"] => print!("{}", handle.status().await?),
        ["board"] => handle.show_leaderboard(),

        ["team", "create", name] => {
            handle.create_team(name).await?;
            println!("created team '{name}'");
        }
        ["team", "delete", name] => {
            handle.delete_team(name).await?;
            println!("deleted team '{name}'");
        }
        ["team", "list"] => {
            for team in handle.teams().await? {
                println!(
                    "{} [{}] {} member(s)",
                    team.name(),
                    team.state,
                    team.member_count()
                );
            }
        }
        ["team", "info", name] => match handle.team_status(name).await? {
            Some(status) => print!("{status}"),
            None => println!("no team named '{name}'"),
        },
        ["team", "add", player, team] => {
            handle.add_member(directory.id_for(player), team).await?;
            println!("added {player} to '{team}'");
        }
        ["team", "remove", player] => {
            handle.remove_member(directory.id_for(player)).await?;
            println!("removed {player} from their team");
        }
        ["team", "color", name, color] => {
            handle.set_team_color(name, color).await?;
            println!("'{name}' now tagged {color}");
        }

        ["setup", seed] => {
            let seed = if *seed == "random" {
                rand::random::<i64>()
            } else {
                // Non-numeric seeds hash down to a number, like the
                // usual world-seed convention.
                seed.parse().unwrap_or_else(|_| {
                    use std::hash::{DefaultHasher, Hash, Hasher};
                    let mut hasher = DefaultHasher::new();
                    seed.hash(&mut hasher);
                    i64::from_ne_bytes(hasher.finish().to_ne_bytes())
                })
            };
            handle.set_seed(seed).await?;
            println!("seed set to {seed}");
        }
        ["create", team] => {
            let arena = handle.provision_arena(team).await?;
            println!("arena created for '{team}' (main zone '{}')", arena.main_id);
        }
        ["start"] => {
            handle.start_race().await?;
            println!("start issued");
        }
        ["reset"] => {
            handle.reset().await?;
        }

        ["join", player] => handle.player_joined(directory.id_for(player)),
        ["leave", player] => handle.player_quit(directory.id_for(player)),
        ["goal", player, goal_id] => {
            let completed = handle.goal_reached(directory.id_for(player), goal_id).await?;
            if !completed {
                println!("goal '{goal_id}' did not complete a team");
            }
        }
        ["finish", team] => {
            if !handle.complete_by_team(team).await? {
                println!("'{team}' is not a running team");
            }
        }
        ["signal", instance_id] => {
            if !handle.complete_by_arena(instance_id).await? {
                println!("no running team for instance '{instance_id}'");
            }
        }
        ["random"] => {
            let assigned = handle.random_assign_all(directory.known_ids()).await?;
            for (player, team) in assigned {
                println!("{} -> '{}'", directory.name_of(player), team);
            }
        }

        ["exit" | "quit"] => return Ok(false),
        _ => println!("unknown command; type 'help'"),
    }
    Ok(true)
}

fn print_help() {
    println!(
        "\
commands:
  status                     overall race status
  board                      broadcast the leaderboard
  team create <name>         create a team
  team delete <name>         delete a team (arena must be free)
  team list                  list teams
  team info <name>           one team's status
  team add <player> <team>   put a player on a team
  team remove <player>       take a player off their team
  team color <name> <color>  tag a team for the display layer
  setup <seed|random>        set the arena seed
  create <team>              provision a team's arena
  start                      start the race (countdown per settings)
  reset                      reset the race cycle
  join <player>              simulate a player joining
  leave <player>             simulate a player disconnecting
  goal <player> <goal-id>    simulate a completion goal
  finish <team>              complete a team by name
  signal <instance-id>       complete a team by instance id
  random                     randomly assign unassigned players
  exit                       leave the console"
    );
}
