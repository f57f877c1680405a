// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Session lifecycle tests: state machine, durability across restarts, and
//! the update/finalize race.

use chrono::Utc;
use std::sync::Arc;
use std::thread;
use tokio::sync::broadcast::error::TryRecvError;
use workout_live::error::AppError;
use workout_live::models::{ActiveSession, RoutePoint, SessionEvent, SessionState};
use workout_live::services::ExerciseSource;

mod common;
use common::{bench_press, test_controller};

#[test]
fn test_full_lifecycle_notifies_once() {
    let dir = tempfile::tempdir().unwrap();
    let controller = test_controller(&dir);
    let mut events = controller.subscribe();

    assert_eq!(controller.load_on_launch(), SessionState::Idle);
    controller.begin("run", Utc::now()).unwrap();
    assert_eq!(controller.state(), SessionState::Active);

    controller
        .update_with(|s| {
            s.accumulated_duration = 60;
            s.accumulated_distance = 210.5;
        })
        .unwrap();
    controller.pause().unwrap();
    assert_eq!(controller.state(), SessionState::Paused);
    controller.resume().unwrap();
    controller.finalize().unwrap();

    assert_eq!(controller.state(), SessionState::Idle);
    assert!(!dir.path().join("session.json").exists());
    assert_eq!(
        events.try_recv().unwrap(),
        SessionEvent::Finalized {
            activity_kind: Some("run".to_string())
        }
    );
    assert!(matches!(events.try_recv(), Err(TryRecvError::Empty)));
}

#[test]
fn test_only_one_session_at_a_time() {
    let dir = tempfile::tempdir().unwrap();
    let controller = test_controller(&dir);
    controller.begin("gym", Utc::now()).unwrap();
    controller.pause().unwrap();

    // Paused still counts as in progress
    let err = controller.begin("run", Utc::now()).unwrap_err();
    assert!(matches!(err, AppError::SessionAlreadyActive));
    assert_eq!(controller.snapshot().unwrap().activity_kind, "gym");
}

#[test]
fn test_session_survives_restart() {
    let dir = tempfile::tempdir().unwrap();
    let start = Utc::now();

    {
        let controller = test_controller(&dir);
        controller.begin("run", start).unwrap();
        controller
            .update_with(|s| {
                s.accumulated_duration = 125;
                s.route_points.push(RoutePoint {
                    lat: 37.3861,
                    lon: -122.0839,
                    timestamp: start,
                });
            })
            .unwrap();
        controller.pause().unwrap();
        // Process killed here: no finalize, no graceful shutdown
    }

    let restarted = test_controller(&dir);
    assert_eq!(restarted.load_on_launch(), SessionState::Paused);

    let session = restarted.snapshot().unwrap();
    assert_eq!(session.start_time, start);
    assert_eq!(session.accumulated_duration, 125);
    assert_eq!(session.route_points.len(), 1);

    // Restored sessions accept writes again
    restarted.resume().unwrap();
    assert_eq!(restarted.state(), SessionState::Active);
}

#[test]
fn test_strength_exercises_survive_restart() {
    let dir = tempfile::tempdir().unwrap();
    {
        let controller = test_controller(&dir);
        controller.begin("gym", Utc::now()).unwrap();
        controller
            .update_with(|s| s.exercises = Some(vec![bench_press(&[(8, 60.0), (6, 70.0)])]))
            .unwrap();
    }

    let restarted = test_controller(&dir);
    restarted.load_on_launch();
    let exercises = restarted.current_exercises();
    assert_eq!(exercises.len(), 1);
    assert_eq!(exercises[0].sets.len(), 2);
}

#[test]
fn test_finalized_session_stays_gone_after_restart() {
    let dir = tempfile::tempdir().unwrap();
    {
        let controller = test_controller(&dir);
        controller.begin("run", Utc::now()).unwrap();
        controller.finalize().unwrap();
    }

    let restarted = test_controller(&dir);
    assert_eq!(restarted.load_on_launch(), SessionState::Idle);
}

#[test]
fn test_corrupt_record_loads_as_idle() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("session.json");
    std::fs::write(&path, b"{\"has_active_session\": tru").unwrap();

    let controller = test_controller(&dir);
    assert_eq!(controller.load_on_launch(), SessionState::Idle);
    assert!(!path.exists(), "corrupt record should be discarded");

    controller.begin("gym", Utc::now()).unwrap();
    assert!(path.exists());
}

#[test]
fn test_stale_overwrite_does_not_lose_progress() {
    let dir = tempfile::tempdir().unwrap();
    let controller = test_controller(&dir);
    let start = Utc::now();
    controller.begin("run", start).unwrap();
    controller
        .update_with(|s| s.accumulated_duration = 300)
        .unwrap();

    let mut stale = ActiveSession::new("run", start + chrono::Duration::seconds(90));
    stale.accumulated_duration = 120;
    controller.update(stale).unwrap();

    let session = controller.snapshot().unwrap();
    assert_eq!(session.start_time, start);
    assert_eq!(session.accumulated_duration, 300);
}

#[test]
fn test_concurrent_update_cannot_resurrect_finalized_session() {
    for _ in 0..20 {
        let dir = tempfile::tempdir().unwrap();
        let controller = Arc::new(test_controller(&dir));
        controller.begin("run", Utc::now()).unwrap();

        let writer = {
            let controller = controller.clone();
            thread::spawn(move || {
                for tick in 1..=200u64 {
                    controller
                        .update_with(|s| s.accumulated_duration = tick)
                        .unwrap();
                }
            })
        };

        let finisher = {
            let controller = controller.clone();
            thread::spawn(move || {
                thread::yield_now();
                controller.finalize().unwrap();
            })
        };

        writer.join().unwrap();
        finisher.join().unwrap();

        assert!(!controller.has_active_session());
        assert!(!dir.path().join("session.json").exists());

        let restarted = common::test_controller(&dir);
        assert_eq!(restarted.load_on_launch(), SessionState::Idle);
    }
}

#[test]
fn test_background_hook_persists_mirror() {
    let dir = tempfile::tempdir().unwrap();
    let controller = test_controller(&dir);
    controller.on_background().unwrap();
    assert!(!dir.path().join("session.json").exists());

    controller.begin("run", Utc::now()).unwrap();
    std::fs::remove_file(dir.path().join("session.json")).unwrap();
    controller.on_background().unwrap();

    let restarted = test_controller(&dir);
    assert_eq!(restarted.load_on_launch(), SessionState::Active);
}
