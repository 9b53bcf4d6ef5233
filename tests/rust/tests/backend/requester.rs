//! Authorization URL requests

use std::sync::Arc;
use std::time::Duration;

use oauthlink_client::{AuthorizationRequester, BackendClient};
use oauthlink_core::CorrelationToken;
use pretty_assertions::assert_eq;
use serde_json::json;
use tests::*;
use wiremock::matchers::{method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

async fn client_for(server: &MockServer) -> BackendClient {
    let config = CoordinatorConfig::with_backend_url(&server.uri()).unwrap();
    BackendClient::new(&config).unwrap()
}

#[tokio::test]
async fn test_auth_url_request_carries_attempt_token() {
    let server = MockServer::start().await;
    let token = CorrelationToken::new();

    Mock::given(method("GET"))
        .and(path("/api/backup/google-drive/auth-url"))
        .and(query_param("attempt", token.to_string()))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "authUrl": "https://accounts.google.com/o/oauth2/v2/auth?client_id=abc&state=xyz"
        })))
        .expect(1)
        .mount(&server)
        .await;

    let client = client_for(&server).await;
    let url = client
        .request_authorization_url(Provider::StorageBackup, &token)
        .await
        .unwrap();

    assert_eq!(url.host_str(), Some("accounts.google.com"));
    assert_eq!(url.path(), "/o/oauth2/v2/auth");
}

#[tokio::test]
async fn test_server_error_is_request_failure() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/api/calendar/google/auth-url"))
        .respond_with(ResponseTemplate::new(500))
        .mount(&server)
        .await;

    let client = client_for(&server).await;
    let err = client
        .request_authorization_url(Provider::Calendar, &CorrelationToken::new())
        .await
        .unwrap_err();

    match err {
        RequestError::Status { endpoint, status } => {
            assert_eq!(status, 500);
            assert_eq!(endpoint, "/api/calendar/google/auth-url");
        }
        other => panic!("expected Status error, got {:?}", other),
    }
}

#[tokio::test]
async fn test_missing_auth_url_is_request_failure() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/api/export/google-sheets/auth-url"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "authUrl": "" })))
        .mount(&server)
        .await;

    let client = client_for(&server).await;
    let err = client
        .request_authorization_url(Provider::SpreadsheetExport, &CorrelationToken::new())
        .await
        .unwrap_err();
    assert!(matches!(err, RequestError::MissingUrl { .. }));
}

#[tokio::test]
async fn test_non_json_body_is_malformed() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/api/backup/google-drive/auth-url"))
        .respond_with(ResponseTemplate::new(200).set_body_string("<html>login</html>"))
        .mount(&server)
        .await;

    let client = client_for(&server).await;
    let err = client
        .request_authorization_url(Provider::StorageBackup, &CorrelationToken::new())
        .await
        .unwrap_err();
    assert!(matches!(err, RequestError::Malformed { .. }));
}

#[tokio::test]
async fn test_unreachable_backend_is_transport_failure() {
    // Nothing listens on the discard port
    let config = CoordinatorConfig::with_backend_url("http://127.0.0.1:9").unwrap();
    let client = BackendClient::new(&config).unwrap();

    let err = client
        .request_authorization_url(Provider::Calendar, &CorrelationToken::new())
        .await
        .unwrap_err();
    assert!(matches!(err, RequestError::Transport { .. }));
}

#[tokio::test]
async fn test_http_500_attempt_never_opens_popup() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/api/backup/google-drive/auth-url"))
        .respond_with(ResponseTemplate::new(500))
        .mount(&server)
        .await;

    let popups = Arc::new(MockPopupHost::new());
    let config = CoordinatorConfig::with_backend_url(&server.uri()).unwrap();
    let coordinator = ConnectionCoordinator::builder(config.clone())
        .with_backend(Arc::new(BackendClient::new(&config).unwrap()))
        .with_popup_host(popups.clone())
        .build()
        .unwrap();

    let resolution = coordinator.connect(Provider::StorageBackup).await;

    assert!(matches!(
        resolution,
        AttemptResolution::RequestFailed {
            error: RequestError::Status { status: 500, .. },
            ..
        }
    ));
    assert_eq!(popups.open_count(), 0);
    assert_eq!(coordinator.ledger().registered(), 0);
}

#[tokio::test]
async fn test_full_attempt_against_backend() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/api/export/google-sheets/auth-url"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "authUrl": "https://accounts.google.com/o/oauth2/v2/auth?scope=sheets"
        })))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/api/export/google-sheets/status"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "connected": true,
            "spreadsheetId": null
        })))
        .expect(1)
        .mount(&server)
        .await;

    let popups = Arc::new(MockPopupHost::new());
    let config = CoordinatorConfig::with_backend_url(&server.uri())
        .unwrap()
        .with_provider(
            oauthlink_core::ProviderConfig::spreadsheet_export()
                .with_poll_interval(Duration::from_millis(20)),
        );
    let coordinator = Arc::new(
        ConnectionCoordinator::builder(config.clone())
            .with_backend(Arc::new(BackendClient::new(&config).unwrap()))
            .with_popup_host(popups.clone())
            .build()
            .unwrap(),
    );

    let runner = coordinator.clone();
    let handle = tokio::spawn(async move { runner.connect(Provider::SpreadsheetExport).await });

    let ready = tokio::time::timeout(Duration::from_secs(3), async {
        while coordinator.ledger().active() < 3 {
            tokio::time::sleep(Duration::from_millis(2)).await;
        }
    })
    .await;
    assert!(ready.is_ok());

    let opened = popups.last_window().unwrap();
    assert_eq!(
        opened.url.as_ref().and_then(|u| u.query()),
        Some("scope=sheets")
    );

    coordinator.message_bus().post(json!({
        "type": "SHEETS_CONNECTED",
        "success": true
    }));

    let resolution = tokio::time::timeout(Duration::from_secs(3), handle)
        .await
        .unwrap()
        .unwrap();
    match resolution {
        AttemptResolution::Connected { status, .. } => {
            let status = status.unwrap();
            assert!(status.connected);
            assert_eq!(status.spreadsheet_id, None);
        }
        other => panic!("expected Connected, got {:?}", other),
    }
    assert!(opened.is_closed());
}
