// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Firestore integration tests.
//!
//! These tests require the Firestore emulator to be running and
//! FIRESTORE_EMULATOR_HOST to point at it; otherwise they are skipped.

use chrono::{DateTime, Duration as ChronoDuration, Utc};
use workout_live::db::{FirestoreStore, LiveStore};
use workout_live::models::{CheerEvent, PresenceRecord, SessionExerciseSnapshot};

mod common;
use common::{bench_press, test_firestore};

/// Generate a unique session ID for test isolation.
fn unique_session_id() -> String {
    format!("test-session-{}", uuid::Uuid::new_v4())
}

fn snapshot(session_id: &str, exercise_id: &str, order_index: u32) -> SessionExerciseSnapshot {
    let mut exercise = bench_press(&[(8, 60.0)]);
    exercise.exercise_id = exercise_id.to_string();
    SessionExerciseSnapshot::from_exercise(session_id, &exercise, order_index, Utc::now())
}

// ═══════════════════════════════════════════════════════════════════════════
// SNAPSHOT TESTS
// ═══════════════════════════════════════════════════════════════════════════

#[tokio::test]
async fn test_snapshot_insert_update_get() {
    require_emulator!();
    let store = test_firestore().await;
    let session_id = unique_session_id();

    let mut row = snapshot(&session_id, "bench", 0);
    store.insert_snapshot(&row).await.unwrap();
    assert!(
        store.insert_snapshot(&row).await.is_err(),
        "second insert must conflict"
    );

    row.sets.push(workout_live::models::SetEntry {
        reps: 6,
        weight: 70.0,
    });
    store.update_snapshot(&row).await.unwrap();

    let fetched = store
        .get_snapshot(&session_id, "bench")
        .await
        .unwrap()
        .expect("snapshot should exist");
    assert_eq!(fetched.sets.len(), 2);
    assert!(store
        .get_snapshot(&session_id, "missing")
        .await
        .unwrap()
        .is_none());
}

#[tokio::test]
async fn test_list_orders_and_delete_session() {
    require_emulator!();
    let store = test_firestore().await;
    let session_id = unique_session_id();

    store
        .insert_snapshot(&snapshot(&session_id, "deadlift", 2))
        .await
        .unwrap();
    store
        .insert_snapshot(&snapshot(&session_id, "squat", 0))
        .await
        .unwrap();
    store
        .insert_snapshot(&snapshot(&session_id, "row", 1))
        .await
        .unwrap();

    let listed = store.list_snapshots(&session_id).await.unwrap();
    let ids: Vec<&str> = listed.iter().map(|s| s.exercise_id.as_str()).collect();
    assert_eq!(ids, vec!["squat", "row", "deadlift"]);

    store.delete_snapshot(&session_id, "row").await.unwrap();
    assert_eq!(store.delete_session_snapshots(&session_id).await.unwrap(), 2);
    assert!(store.list_snapshots(&session_id).await.unwrap().is_empty());
}

// ═══════════════════════════════════════════════════════════════════════════
// PRESENCE AND CHEER TESTS
// ═══════════════════════════════════════════════════════════════════════════

#[tokio::test]
async fn test_presence_upsert_and_delete() {
    require_emulator!();
    let store = test_firestore().await;
    let session_id = unique_session_id();

    let mut presence = PresenceRecord {
        session_id: session_id.clone(),
        spectator_id: "viewer".to_string(),
        last_ping_at: Utc::now() - ChronoDuration::minutes(5),
    };
    store.upsert_presence(&presence).await.unwrap();
    presence.last_ping_at = Utc::now();
    store.upsert_presence(&presence).await.unwrap();

    let listed = store.list_presence(&session_id).await.unwrap();
    assert_eq!(listed.len(), 1);
    assert!(listed[0].is_active(Utc::now(), std::time::Duration::from_secs(90)));

    store.delete_presence(&session_id, "viewer").await.unwrap();
    assert!(store.list_presence(&session_id).await.unwrap().is_empty());
}

#[tokio::test]
async fn test_recent_cheers_newest_first_with_limit() {
    require_emulator!();
    let store = test_firestore().await;
    let session_id = unique_session_id();

    // Whole seconds, so the stored millisecond timestamps compare exactly
    let base = DateTime::from_timestamp(Utc::now().timestamp() - 60, 0).unwrap();
    for i in 0..5 {
        let mut cheer = CheerEvent::new(&session_id, "viewer", "owner", "🔥");
        cheer.created_at = base + ChronoDuration::seconds(i);
        store.insert_cheer(&cheer).await.unwrap();
    }

    let recent = store.recent_cheers(&session_id, 3).await.unwrap();
    assert_eq!(recent.len(), 3);
    assert!(recent
        .windows(2)
        .all(|w| w[0].created_at >= w[1].created_at));
    assert_eq!(recent[0].created_at, base + ChronoDuration::seconds(4));
}

#[tokio::test]
async fn test_offline_store_errors_instead_of_panicking() {
    let store = FirestoreStore::new_mock();
    let err = store.list_snapshots("any").await.unwrap_err();
    assert!(err.is_transient());
}
