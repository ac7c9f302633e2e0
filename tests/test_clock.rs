//! Clock semantics: restart continuity, reset, frozen completion
//! times.

mod common;

use std::sync::Arc;

use common::{harness, harness_over, quick_settings, ready_team};

use timetrial::race::clock::RaceClock;
use timetrial::race::state::RaceState;
use timetrial::store::{MemoryStore, StateStore};

#[tokio::test]
async fn elapsed_survives_a_process_restart() {
    // First process: start the race, which persists the start
    // instant.
    let store = Arc::new(MemoryStore::new());
    {
        let mut h = harness_over(quick_settings(), Arc::clone(&store));
        h.engine.load().await;
        h.engine.set_seed(1).unwrap();
        ready_team(&mut h, "red", 1).await;
        h.engine.start_race().await.unwrap();
    }

    // Simulate five seconds having passed while the process was down.
    let t0 = store.start_ms().unwrap();
    store.set_start_ms(Some(t0 - 5_000)).unwrap();

    // Second process over the same store.
    let mut h = harness_over(quick_settings(), store);
    h.engine.load().await;
    h.engine.resume_if_running();

    assert_eq!(h.engine.state(), RaceState::Running);
    let elapsed = h.engine.elapsed_ms();
    assert!(
        (5_000..6_000).contains(&elapsed),
        "expected ~5000ms elapsed across restart, got {elapsed}"
    );
}

#[tokio::test]
async fn restarted_engine_resumes_roster_and_arenas() {
    let store = Arc::new(MemoryStore::new());
    let (player, arena_main);
    {
        let mut h = harness_over(quick_settings(), Arc::clone(&store));
        h.engine.load().await;
        h.engine.set_seed(7).unwrap();
        let players = ready_team(&mut h, "red", 1).await;
        player = players[0];
        arena_main = h.engine.roster().team("red").unwrap().arena.clone().unwrap();
        h.engine.start_race().await.unwrap();
    }

    let mut h = harness_over(quick_settings(), store);
    h.engine.load().await;
    h.engine.resume_if_running();

    // Membership and arena attachments came back.
    assert_eq!(h.engine.roster().team_of(player).unwrap().name(), "red");
    assert_eq!(
        h.engine.roster().team("red").unwrap().arena.as_ref(),
        Some(&arena_main)
    );
    // The provisioner can resolve instance ids again, so completion
    // signals keyed by instance identity still work.
    assert!(h.engine.complete_by_arena("red_side").await);
}

#[tokio::test]
async fn reset_zeroes_the_clock_and_keeps_membership() {
    let mut h = harness();
    h.engine.set_seed(1).unwrap();
    let players = ready_team(&mut h, "red", 2).await;
    h.engine.start_race().await.unwrap();
    h.engine.complete_by_team("red");

    h.engine.reset().unwrap();

    assert_eq!(h.engine.elapsed_ms(), 0);
    assert_eq!(h.engine.state(), RaceState::Waiting);
    assert_eq!(h.store.game_state(), RaceState::Waiting);
    assert!(h.store.start_ms().is_none());
    assert!(h.engine.records().is_empty());

    let team = h.engine.roster().team("red").unwrap();
    assert_eq!(team.state, RaceState::Waiting);
    assert!(team.completion_time_ms.is_none());
    assert!(team.has_arena(), "reset must keep the arena");
    for player in players {
        assert!(team.has_member(player), "reset must keep membership");
    }
}

#[tokio::test]
async fn completion_time_is_frozen_at_the_moment_of_completion() {
    let store = Arc::new(MemoryStore::new());
    let mut h = harness_over(quick_settings(), Arc::clone(&store));
    h.engine.load().await;
    h.engine.set_seed(1).unwrap();
    ready_team(&mut h, "red", 1).await;
    ready_team(&mut h, "blue", 1).await;
    h.engine.start_race().await.unwrap();

    // Pretend the race started 90 seconds ago.
    let t0 = store.start_ms().unwrap();
    store.set_start_ms(Some(t0 - 90_000)).unwrap();

    h.engine.complete_by_team("red");
    let frozen = h
        .engine
        .roster()
        .team("red")
        .unwrap()
        .completion_time_ms
        .unwrap();
    assert!(
        (90_000..91_000).contains(&frozen),
        "expected ~90s frozen time, got {frozen}"
    );

    // The global clock keeps ticking past the frozen value.
    assert!(h.engine.elapsed_ms() >= frozen);
}

#[tokio::test]
async fn clock_without_start_reports_zero() {
    let h = harness();
    assert_eq!(h.engine.elapsed_ms(), 0);
    assert_eq!(RaceClock::now_ms().signum(), 1);
}
