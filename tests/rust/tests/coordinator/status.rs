//! Status queries outside an attempt

use pretty_assertions::assert_eq;
use tests::*;

#[tokio::test]
async fn test_status_query_publishes_refresh() {
    let mut h = CoordinatorHarness::new();
    h.status.set_status(ConnectionStatus {
        has_token: Some(true),
        ..ConnectionStatus::connected()
    });

    let status = h.coordinator.status(Provider::StorageBackup).await.unwrap();
    assert_eq!(status.has_token, Some(true));
    assert_eq!(h.requester.call_count(), 0);

    let events = h.drain_events();
    assert!(matches!(
        events.as_slice(),
        [ConnectionEvent::StatusRefreshed {
            provider: Provider::StorageBackup,
            ..
        }]
    ));
}

#[tokio::test]
async fn test_disconnect_then_refresh() {
    let h = CoordinatorHarness::new();

    let status = h.coordinator.disconnect(Provider::Calendar).await.unwrap();

    assert!(!status.connected);
    assert_eq!(h.status.disconnect_count(), 1);
    assert_eq!(h.status.fetch_count(), 1);
}

#[tokio::test]
async fn test_bind_spreadsheet_after_success() {
    let h = CoordinatorHarness::new();

    let handle = h.spawn_connect(Provider::SpreadsheetExport);
    h.wait_for_listeners(Provider::SpreadsheetExport).await;
    h.post_connected(Provider::SpreadsheetExport, true, None);
    assert!(h.finish(handle).await.is_connected());

    let status = h.coordinator.bind_spreadsheet("1AbCdEf").await.unwrap();
    assert_eq!(status.spreadsheet_id.as_deref(), Some("1AbCdEf"));
    assert_eq!(h.status.bound_spreadsheets(), vec!["1AbCdEf".to_string()]);
}

#[tokio::test]
async fn test_status_failure_after_success_is_reported() {
    let mut h = CoordinatorHarness::new();
    h.status.fail_fetches();

    let handle = h.spawn_connect(Provider::StorageBackup);
    h.wait_for_listeners(Provider::StorageBackup).await;
    h.post_connected(Provider::StorageBackup, true, None);

    match h.finish(handle).await {
        AttemptResolution::Connected { status, .. } => assert_eq!(status, None),
        other => panic!("expected Connected, got {:?}", other),
    }

    let errors = h
        .drain_events()
        .into_iter()
        .filter(|e| {
            matches!(
                e,
                ConnectionEvent::Notification {
                    level: NotificationLevel::Error,
                    ..
                }
            )
        })
        .count();
    assert_eq!(errors, 1);
}
