//! Isolation between providers and between attempts

use pretty_assertions::assert_eq;
use serde_json::json;
use tests::harness::TEST_POLL;
use tests::*;

use oauthlink_core::{ConnectedMessage, CorrelationToken, StorageRecord};

#[tokio::test]
async fn test_other_provider_signals_are_ignored() {
    let h = CoordinatorHarness::new();

    let handle = h.spawn_connect(Provider::StorageBackup);
    h.wait_for_listeners(Provider::StorageBackup).await;

    h.post_connected(Provider::SpreadsheetExport, true, None);
    h.post_connected(Provider::Calendar, false, None);
    h.write_record(Provider::Calendar, true, None, 0).await;
    tokio::time::sleep(TEST_POLL * 3).await;

    assert!(!handle.is_finished());
    // Not ours to consume
    assert!(h.stored_record(Provider::Calendar).await.is_some());

    h.post_connected(Provider::StorageBackup, true, None);
    assert!(h.finish(handle).await.is_connected());
}

#[tokio::test]
async fn test_providers_run_concurrently() {
    let h = CoordinatorHarness::new();

    let drive = h.spawn_connect(Provider::StorageBackup);
    let calendar = h.spawn_connect(Provider::Calendar);
    let coordinator = h.coordinator.clone();
    assert!(
        h.wait_until(|| {
            coordinator.is_pending(Provider::StorageBackup)
                && coordinator.is_pending(Provider::Calendar)
                && coordinator.ledger().active() == 6
        })
        .await
    );

    h.post_connected(Provider::Calendar, false, Some(json!({"error": "access_denied"})));
    assert!(matches!(
        h.finish(calendar).await,
        AttemptResolution::Denied { .. }
    ));
    assert!(h.coordinator.is_pending(Provider::StorageBackup));

    h.post_connected(Provider::StorageBackup, true, None);
    assert!(h.finish(drive).await.is_connected());
    assert_eq!(h.popups.open_count(), 2);
    assert_eq!(h.popups.live_windows(), 0);
}

#[tokio::test]
async fn test_signal_for_previous_attempt_is_ignored() {
    let h = CoordinatorHarness::new();

    let handle = h.spawn_connect(Provider::SpreadsheetExport);
    let token = h.wait_for_listeners(Provider::SpreadsheetExport).await;

    let previous = CorrelationToken::new();
    h.coordinator.message_bus().post_connected(
        &ConnectedMessage::new(Provider::SpreadsheetExport, true, None).with_attempt(previous),
    );
    h.write_storage_record(
        Provider::SpreadsheetExport,
        &StorageRecord::new(true, None, tests::harness::NOW_MS).with_attempt(previous),
    )
    .await;
    assert!(h.wait_record_taken(Provider::SpreadsheetExport).await);
    tokio::time::sleep(TEST_POLL * 2).await;
    assert!(!handle.is_finished());

    h.coordinator.message_bus().post_connected(
        &ConnectedMessage::new(Provider::SpreadsheetExport, false, None).with_attempt(token),
    );
    let resolution = h.finish(handle).await;
    assert!(matches!(resolution, AttemptResolution::Denied { .. }));
    assert_eq!(resolution.attempt(), token);
}

#[tokio::test]
async fn test_attempt_token_is_sent_to_backend() {
    let h = CoordinatorHarness::new();

    let handle = h.spawn_connect(Provider::Calendar);
    let token = h.wait_for_listeners(Provider::Calendar).await;

    assert_eq!(h.requester.calls(), vec![(Provider::Calendar, token)]);

    h.popups.last_window().unwrap().simulate_user_close();
    h.finish(handle).await;
}

#[tokio::test]
async fn test_new_attempt_supersedes_previous() {
    let mut h = CoordinatorHarness::new();

    let first = h.spawn_connect(Provider::StorageBackup);
    let first_token = h.wait_for_listeners(Provider::StorageBackup).await;

    let second = h.spawn_connect(Provider::StorageBackup);
    let first_resolution = h.finish(first).await;
    assert!(matches!(first_resolution, AttemptResolution::Abandoned { .. }));
    assert_eq!(first_resolution.attempt(), first_token);

    let coordinator = h.coordinator.clone();
    assert!(
        h.wait_until(|| {
            coordinator
                .pending_attempt(Provider::StorageBackup)
                .is_some_and(|t| t != first_token)
                && coordinator.ledger().active() == 3
                && coordinator.ledger().registered() == 6
        })
        .await
    );

    // Never two live popups for the same provider
    assert!(h.popups.window(0).unwrap().is_closed());
    assert_eq!(h.popups.live_windows(), 1);

    h.post_connected(Provider::StorageBackup, true, None);
    let second_resolution = h.finish(second).await;
    assert!(second_resolution.is_connected());
    assert_ne!(second_resolution.attempt(), first_token);

    let events = h.drain_events();
    assert!(events.iter().any(|e| matches!(
        e,
        ConnectionEvent::AttemptAbandoned { attempt, .. } if *attempt == first_token
    )));
    assert_eq!(resolved_events(&events).len(), 1);
}

#[tokio::test]
async fn test_superseded_popup_closed_before_new_one_opens() {
    let h = CoordinatorHarness::new();

    let first = h.spawn_connect(Provider::StorageBackup);
    let first_token = h.wait_for_listeners(Provider::StorageBackup).await;

    let second = h.spawn_connect(Provider::StorageBackup);
    assert!(matches!(
        h.finish(first).await,
        AttemptResolution::Abandoned { .. }
    ));

    let coordinator = h.coordinator.clone();
    assert!(
        h.wait_until(|| {
            coordinator
                .pending_attempt(Provider::StorageBackup)
                .is_some_and(|t| t != first_token)
                && coordinator.ledger().active() == 3
        })
        .await
    );
    let second_token = h
        .coordinator
        .pending_attempt(Provider::StorageBackup)
        .unwrap();

    assert_eq!(h.popups.live_at_open(), vec![0, 0]);
    assert_eq!(h.coordinator.ledger().registered(), 6);

    // Only the new attempt's poll is left to consume its record
    h.write_storage_record(
        Provider::StorageBackup,
        &StorageRecord::new(true, None, tests::harness::NOW_MS).with_attempt(second_token),
    )
    .await;
    let resolution = h.finish(second).await;
    assert!(matches!(
        resolution,
        AttemptResolution::Connected {
            source: SignalSource::Storage,
            ..
        }
    ));
    assert_eq!(resolution.attempt(), second_token);
}
