mod common;

use assert_matches::assert_matches;
use chrono::Duration;

use appointment_cell::models::BookingError;
use appointment_cell::services::{HoldSweeper, SlotReservationStore, SweepReport};
use shared_config::BookingConfig;

use common::*;

#[tokio::test]
async fn test_overlapping_step_is_rejected() {
    let harness = Harness::new();
    let session = harness.workflow.start_session().await.unwrap();
    let id = harness.sessions.insert(session).await;

    let guard = harness.sessions.lock(id).await.unwrap();
    let second = harness.sessions.lock(id).await;
    assert_matches!(second, Err(BookingError::OperationInProgress));

    drop(guard);
    assert!(harness.sessions.lock(id).await.is_ok());
}

#[tokio::test]
async fn test_unknown_session_is_not_found() {
    let harness = Harness::new();
    let result = harness.sessions.lock(uuid::Uuid::new_v4()).await;
    assert_matches!(result, Err(BookingError::NotFound(_)));
}

#[tokio::test]
async fn test_snapshot_reflects_step_changes() {
    let harness = Harness::new();
    let session = harness.workflow.start_session().await.unwrap();
    let id = harness.sessions.insert(session).await;

    {
        let mut guard = harness.sessions.lock(id).await.unwrap();
        harness.workflow.select_doctor(&mut guard, harness.doctor_id()).await.unwrap();
    }

    let snapshot = harness.sessions.snapshot(id).await.unwrap();
    assert_eq!(snapshot.selected_doctor.map(|d| d.id), Some(harness.doctor_id()));
}

#[tokio::test]
async fn test_idle_sessions_are_pruned() {
    let harness = Harness::new();
    let idle = harness.workflow.start_session().await.unwrap();
    harness.sessions.insert(idle).await;

    harness.clock.advance(Duration::minutes(30));
    let recent = harness.workflow.start_session().await.unwrap();
    let recent_id = harness.sessions.insert(recent).await;

    harness.clock.advance(Duration::minutes(31));
    assert_eq!(harness.sessions.prune_idle().await, 1);
    assert_eq!(harness.sessions.len().await, 1);
    assert!(harness.sessions.snapshot(recent_id).await.is_ok());
}

#[tokio::test]
async fn test_sweep_releases_lapsed_holds_and_codes() {
    let harness = Harness::new();
    let mut session = harness.workflow.start_session().await.unwrap();
    harness.workflow.select_doctor(&mut session, harness.doctor_id()).await.unwrap();
    harness.workflow.select_date(&mut session, monday()).await.unwrap();
    harness.workflow.select_slot(&mut session, slot(10, 0)).await.unwrap();
    harness.workflow.submit_details(&mut session, patient_form()).await.unwrap();

    let sweeper = HoldSweeper::new(
        harness.store.clone(),
        harness.otp.clone(),
        harness.sessions.clone(),
        &BookingConfig::default(),
    );
    assert_eq!(sweeper.run_once().await, SweepReport::default());

    harness.clock.advance(Duration::minutes(20));
    let report = sweeper.run_once().await;

    assert_eq!(report.holds_released, 1);
    assert_eq!(report.codes_purged, 1);
    assert!(harness.store.list_appointments().await.unwrap().is_empty());
}

#[tokio::test]
async fn test_sweep_closes_abandoned_event_channels() {
    let harness = Harness::new();
    drop(harness.store.subscribe(harness.doctor_id(), monday()).await);
    let _live = harness.store.subscribe(harness.doctor_id(), sunday()).await;

    let sweeper = HoldSweeper::new(
        harness.store.clone(),
        harness.otp.clone(),
        harness.sessions.clone(),
        &BookingConfig::default(),
    );
    let report = sweeper.run_once().await;

    assert_eq!(report.channels_closed, 1);
    assert_eq!(harness.store.events().active_channels().await, 1);
}
