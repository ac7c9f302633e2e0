//! Start-eligibility guards and start execution.

mod common;

use common::{harness, ready_team};

use timetrial::error::StartBlocked;
use timetrial::race::state::{PlayerId, RaceState};
use timetrial::store::StateStore;

#[tokio::test]
async fn guard_reports_each_missing_precondition() {
    let mut h = harness();

    assert_eq!(h.engine.can_start(), Err(StartBlocked::NoSeed));

    h.engine.set_seed(1).unwrap();
    assert_eq!(h.engine.can_start(), Err(StartBlocked::NoTeams));

    h.engine.create_team("red").unwrap();
    assert_eq!(
        h.engine.can_start(),
        Err(StartBlocked::ArenaMissing("red".to_string()))
    );

    h.engine.provision_arena("red").await.unwrap();
    assert_eq!(
        h.engine.can_start(),
        Err(StartBlocked::EmptyTeam("red".to_string()))
    );

    h.engine.add_member(PlayerId::random(), "red").unwrap();
    assert_eq!(h.engine.can_start(), Ok(()));
}

#[tokio::test]
async fn any_unready_team_blocks_the_whole_start() {
    let mut h = harness();
    h.engine.set_seed(1).unwrap();
    ready_team(&mut h, "red", 1).await;

    // A second team without an arena blocks everyone.
    h.engine.create_team("blue").unwrap();
    assert_eq!(
        h.engine.can_start(),
        Err(StartBlocked::ArenaMissing("blue".to_string()))
    );
}

#[tokio::test]
async fn start_moves_every_team_to_running_and_persists() {
    let mut h = harness();
    h.engine.set_seed(1).unwrap();
    let red = ready_team(&mut h, "red", 2).await;
    ready_team(&mut h, "blue", 1).await;

    h.engine.start_race().await.unwrap();

    assert_eq!(h.engine.state(), RaceState::Running);
    for team in h.engine.roster().all_teams() {
        assert_eq!(team.state, RaceState::Running);
    }

    // Durable view agrees on both levels.
    assert_eq!(h.store.game_state(), RaceState::Running);
    assert!(h.store.start_ms().is_some());
    for team in h.store.teams() {
        assert_eq!(team.state, RaceState::Running);
    }

    assert!(h.notifier.has_broadcast("The race has started!"));
    // Every member got the start title.
    assert!(!h.notifier.titles_for(red[0]).is_empty());
}

#[tokio::test]
async fn start_is_refused_while_running() {
    let mut h = harness();
    h.engine.set_seed(1).unwrap();
    ready_team(&mut h, "red", 1).await;

    h.engine.start_race().await.unwrap();
    let err = h.engine.start_race().await.unwrap_err();
    assert_eq!(err.to_string(), "a race is already in progress");
}

#[tokio::test]
async fn team_created_mid_race_is_marked_running() {
    let mut h = harness();
    h.engine.set_seed(1).unwrap();
    ready_team(&mut h, "red", 1).await;
    h.engine.start_race().await.unwrap();

    let late = h.engine.create_team("late").unwrap();
    assert_eq!(late.state, RaceState::Running);
    assert!(!late.has_arena());
}

#[tokio::test]
async fn completion_records_are_cleared_on_start() {
    let mut h = harness();
    h.engine.set_seed(1).unwrap();
    ready_team(&mut h, "red", 1).await;

    h.engine.start_race().await.unwrap();
    assert!(h.engine.complete_by_team("red"));
    assert_eq!(h.engine.records().len(), 1);

    h.engine.reset().unwrap();
    h.engine.start_race().await.unwrap();
    assert!(h.engine.records().is_empty());
}
