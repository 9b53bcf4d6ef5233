//! Single-resolution rule and channel races

use pretty_assertions::assert_eq;
use serde_json::json;
use tests::harness::TEST_POLL;
use tests::*;

use oauthlink_core::SharedStore;

#[tokio::test]
async fn test_both_channels_deliver_resolves_once() {
    let mut h = CoordinatorHarness::new();

    let handle = h.spawn_connect(Provider::StorageBackup);
    h.wait_for_listeners(Provider::StorageBackup).await;

    // Redirect page uses both paths, as it does when it cannot tell which works
    h.write_record(Provider::StorageBackup, true, None, 0).await;
    h.post_connected(Provider::StorageBackup, true, None);

    let resolution = h.finish(handle).await;
    assert!(resolution.is_connected());

    // Give any straggler a chance to show up
    tokio::time::sleep(TEST_POLL * 3).await;

    let events = h.drain_events();
    assert_eq!(resolved_events(&events).len(), 1);
    assert_eq!(h.status.fetch_count(), 1);
    assert!(h.wait_idle().await);
}

#[tokio::test]
async fn test_storage_first_then_message_is_noop() {
    let mut h = CoordinatorHarness::new();

    let handle = h.spawn_connect(Provider::Calendar);
    h.wait_for_listeners(Provider::Calendar).await;

    h.write_record(Provider::Calendar, false, Some(json!("access_denied")), 0).await;
    let resolution = h.finish(handle).await;
    assert!(matches!(
        resolution,
        AttemptResolution::Denied {
            source: SignalSource::Storage,
            ..
        }
    ));

    // Late message after resolution: nobody is listening any more
    h.post_connected(Provider::Calendar, true, None);
    tokio::time::sleep(TEST_POLL * 2).await;

    assert_eq!(resolved_events(&h.drain_events()).len(), 1);
    assert_eq!(h.status.fetch_count(), 1);
}

#[tokio::test]
async fn test_outcome_posted_before_close_wins() {
    let h = CoordinatorHarness::new();

    let handle = h.spawn_connect(Provider::SpreadsheetExport);
    h.wait_for_listeners(Provider::SpreadsheetExport).await;

    // Redirect page posts its result, then closes itself
    h.post_connected(Provider::SpreadsheetExport, true, None);
    h.popups.last_window().unwrap().simulate_user_close();

    let resolution = h.finish(handle).await;
    assert!(resolution.is_connected());
}

#[tokio::test]
async fn test_record_at_window_edge_is_accepted() {
    let h = CoordinatorHarness::new();

    let handle = h.spawn_connect(Provider::StorageBackup);
    h.wait_for_listeners(Provider::StorageBackup).await;

    h.write_record(Provider::StorageBackup, true, None, 10_000).await;
    let resolution = h.finish(handle).await;

    assert!(matches!(
        resolution,
        AttemptResolution::Connected {
            source: SignalSource::Storage,
            ..
        }
    ));
}

#[tokio::test]
async fn test_record_just_outside_window_is_discarded() {
    let h = CoordinatorHarness::new();

    let handle = h.spawn_connect(Provider::StorageBackup);
    h.wait_for_listeners(Provider::StorageBackup).await;

    h.write_record(Provider::StorageBackup, true, None, 10_001).await;
    assert!(h.wait_record_taken(Provider::StorageBackup).await);
    tokio::time::sleep(TEST_POLL * 2).await;
    assert!(!handle.is_finished());

    // A fresh record afterwards still resolves the attempt
    h.write_record(Provider::StorageBackup, true, None, 500).await;
    assert!(h.finish(handle).await.is_connected());
}

#[tokio::test]
async fn test_malformed_inputs_are_ignored() {
    let h = CoordinatorHarness::new();

    let handle = h.spawn_connect(Provider::Calendar);
    h.wait_for_listeners(Provider::Calendar).await;

    h.post_raw(json!({"type": "CALENDAR_CONNECTED"}));
    h.post_raw(json!("webpackHotUpdate"));
    h.store
        .set(&Provider::Calendar.storage_key(), "{not json")
        .await
        .unwrap();
    assert!(h.wait_record_taken(Provider::Calendar).await);
    tokio::time::sleep(TEST_POLL * 2).await;
    assert!(!handle.is_finished());

    h.post_connected(Provider::Calendar, true, None);
    assert!(h.finish(handle).await.is_connected());
}
