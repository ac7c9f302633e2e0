//! Completion handling: rank order, idempotency, global completion.

mod common;

use common::{harness, ready_team};

use timetrial::race::state::RaceState;
use timetrial::store::StateStore;

#[tokio::test]
async fn rank_is_assignment_order() {
    let mut h = harness();
    h.engine.set_seed(1).unwrap();
    for name in ["a", "b", "c"] {
        ready_team(&mut h, name, 1).await;
    }
    h.engine.start_race().await.unwrap();

    assert!(h.engine.complete_by_team("a"));
    assert!(h.engine.complete_by_team("b"));
    assert!(h.engine.complete_by_team("c"));

    let records = h.engine.records();
    let ranked: Vec<(usize, &str)> = records
        .iter()
        .map(|r| (r.rank, r.team.as_str()))
        .collect();
    // Strictly increasing by call order, whatever the elapsed values.
    assert_eq!(ranked, [(1, "a"), (2, "b"), (3, "c")]);
}

#[tokio::test]
async fn completing_a_completed_team_is_a_noop() {
    let mut h = harness();
    h.engine.set_seed(1).unwrap();
    ready_team(&mut h, "red", 1).await;
    ready_team(&mut h, "blue", 1).await;
    h.engine.start_race().await.unwrap();

    assert!(h.engine.complete_by_team("red"));
    let frozen_time = h.engine.roster().team("red").unwrap().completion_time_ms;
    let records_before = h.engine.records().to_vec();

    // Second signal: false, no duplicate record, time untouched.
    assert!(!h.engine.complete_by_team("red"));
    assert_eq!(h.engine.records(), &records_before[..]);
    assert_eq!(
        h.engine.roster().team("red").unwrap().completion_time_ms,
        frozen_time
    );
    assert_eq!(h.engine.state(), RaceState::Running);
}

#[tokio::test]
async fn global_state_completes_exactly_on_last_team() {
    let mut h = harness();
    h.engine.set_seed(1).unwrap();
    ready_team(&mut h, "a", 1).await;
    ready_team(&mut h, "b", 1).await;
    h.engine.start_race().await.unwrap();

    assert!(h.engine.complete_by_team("a"));
    assert_eq!(h.engine.state(), RaceState::Running);
    assert_eq!(h.store.game_state(), RaceState::Running);

    assert!(h.engine.complete_by_team("b"));
    assert_eq!(h.engine.state(), RaceState::Completed);
    assert_eq!(h.store.game_state(), RaceState::Completed);
    assert!(h.notifier.has_broadcast("=== Race finished ==="));
}

#[tokio::test]
async fn completion_sets_time_iff_completed() {
    let mut h = harness();
    h.engine.set_seed(1).unwrap();
    ready_team(&mut h, "red", 1).await;
    ready_team(&mut h, "blue", 1).await;
    h.engine.start_race().await.unwrap();

    h.engine.complete_by_team("red");

    let red = h.engine.roster().team("red").unwrap();
    assert!(red.is_completed());
    assert!(red.completion_time_ms.is_some());

    let blue = h.engine.roster().team("blue").unwrap();
    assert_eq!(blue.state, RaceState::Running);
    assert!(blue.completion_time_ms.is_none());

    // Persisted team document carries the frozen time.
    let stored = h
        .store
        .teams()
        .into_iter()
        .find(|t| t.name() == "red")
        .unwrap();
    assert_eq!(stored.completion_time_ms, red.completion_time_ms);
}

#[tokio::test]
async fn complete_by_arena_resolves_any_zone() {
    let mut h = harness();
    h.engine.set_seed(1).unwrap();
    ready_team(&mut h, "red", 1).await;
    ready_team(&mut h, "blue", 1).await;
    h.engine.start_race().await.unwrap();

    // The deep-zone instance id resolves back to the owning team.
    assert!(h.engine.complete_by_arena("red_deep").await);
    assert_eq!(
        h.engine.roster().team("red").unwrap().state,
        RaceState::Completed
    );

    // Unknown instance ids are rejected without side effects.
    assert!(!h.engine.complete_by_arena("purple_deep").await);
    assert_eq!(h.engine.records().len(), 1);
}

#[tokio::test]
async fn complete_by_arena_requires_running_race() {
    let mut h = harness();
    h.engine.set_seed(1).unwrap();
    ready_team(&mut h, "red", 1).await;

    assert!(!h.engine.complete_by_arena("red").await);
    assert!(h.engine.records().is_empty());
}

#[tokio::test]
async fn leaderboard_is_broadcast_in_finish_order() {
    let mut h = harness();
    h.engine.set_seed(1).unwrap();
    ready_team(&mut h, "slow", 1).await;
    ready_team(&mut h, "fast", 1).await;
    h.engine.start_race().await.unwrap();

    h.engine.complete_by_team("slow");
    h.engine.complete_by_team("fast");

    let broadcasts = h.notifier.broadcasts();
    let results_at = broadcasts
        .iter()
        .position(|b| b == "=== Final results ===")
        .expect("leaderboard header");
    assert!(broadcasts[results_at + 1].starts_with("1st slow"));
    assert!(broadcasts[results_at + 2].starts_with("2nd fast"));
}

#[tokio::test]
async fn completion_announces_medal_rank() {
    let mut h = harness();
    h.engine.set_seed(1).unwrap();
    let red = ready_team(&mut h, "red", 1).await;
    ready_team(&mut h, "blue", 1).await;
    h.engine.start_race().await.unwrap();

    h.engine.complete_by_team("red");

    assert_eq!(h.notifier.broadcasts_containing("finished in"), 1);
    assert!(h.notifier.has_broadcast("That's 1st place!"));
    // Members see a finish title carrying their time.
    let titles = h.notifier.titles_for(red[0]);
    assert!(titles.iter().any(|(t, _)| t == "Finished!"));
}
