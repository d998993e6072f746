//! Tests for login, logout and error translation.
//!
//! Uses wiremock to mock the MOLGENIS API.

use molgenis_client::{MolgenisError, Session, TOKEN_HEADER};
use serde_json::json;
use wiremock::matchers::{body_json, header, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

#[tokio::test]
async fn test_login_stores_token_and_sends_it() {
    let mock_server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/api/v1/login"))
        .and(body_json(json!({"username": "admin", "password": "secret"})))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "token": "abc123",
            "username": "admin"
        })))
        .expect(1)
        .mount(&mock_server)
        .await;

    Mock::given(method("GET"))
        .and(path("/api/v2/version"))
        .and(header(TOKEN_HEADER, "abc123"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"molgenisVersion": "8.7"})))
        .expect(1)
        .mount(&mock_server)
        .await;

    let mut session = Session::new(&mock_server.uri()).unwrap();
    assert!(!session.is_authenticated());

    session.login("admin", "secret").await.expect("login should succeed");
    assert_eq!(session.token(), Some("abc123"));

    let version = session.get_json("v2/version").await.unwrap();
    assert_eq!(version["molgenisVersion"], "8.7");
}

#[tokio::test]
async fn test_login_failure_is_authentication_error() {
    let mock_server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/api/v1/login"))
        .respond_with(ResponseTemplate::new(401).set_body_json(json!({
            "errors": [{"message": "Unknown username or bad password"}]
        })))
        .mount(&mock_server)
        .await;

    let mut session = Session::new(&mock_server.uri()).unwrap();
    let err = session.login("admin", "wrong").await.unwrap_err();

    match err {
        MolgenisError::Authentication {
            message,
            status_code,
        } => {
            assert_eq!(status_code, Some(401));
            assert!(message.ends_with(": Unknown username or bad password"), "{message}");
        }
        other => panic!("expected authentication error, got {other:?}"),
    }
    assert!(!session.is_authenticated());
}

#[tokio::test]
async fn test_logout_clears_token() {
    let mock_server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/api/v1/logout"))
        .and(header(TOKEN_HEADER, "t0k"))
        .respond_with(ResponseTemplate::new(200))
        .expect(1)
        .mount(&mock_server)
        .await;

    let mut session = Session::with_token(&mock_server.uri(), "t0k").unwrap();
    session.logout().await.unwrap();

    assert!(!session.is_authenticated());
    assert_eq!(session.token(), None);
}

#[tokio::test]
async fn test_error_message_includes_status_url_and_server_message() {
    let mock_server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/api/v1/Secret/meta"))
        .respond_with(ResponseTemplate::new(401).set_body_json(json!({
            "errors": [{"message": "No read permission on entity type 'Secret'"}]
        })))
        .mount(&mock_server)
        .await;

    let session = Session::new(&mock_server.uri()).unwrap();
    let err = session.get_entity_meta_data("Secret").await.unwrap_err();

    assert_eq!(err.status_code(), Some(401));
    let message = err.to_string();
    assert!(message.starts_with("401 Unauthorized for url: "), "{message}");
    assert!(message.contains("/api/v1/Secret/meta"), "{message}");
    assert!(
        message.ends_with(": No read permission on entity type 'Secret'"),
        "{message}"
    );
}

#[tokio::test]
async fn test_error_without_json_body_keeps_status_line() {
    let mock_server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/api/v2/Broken"))
        .respond_with(ResponseTemplate::new(500).set_body_string("<html>oops</html>"))
        .mount(&mock_server)
        .await;

    let session = Session::new(&mock_server.uri()).unwrap();
    let err = session.get_json("v2/Broken").await.unwrap_err();

    assert_eq!(err.status_code(), Some(500));
    let message = err.to_string();
    assert!(message.starts_with("500 Internal Server Error for url: "), "{message}");
    assert!(message.ends_with("/api/v2/Broken"), "{message}");
}

#[tokio::test]
async fn test_url_with_api_suffix_resolves_to_same_endpoints() {
    let mock_server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/api/v2/version"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({})))
        .expect(2)
        .mount(&mock_server)
        .await;

    for url in [format!("{}/api/", mock_server.uri()), mock_server.uri()] {
        let session = Session::new(&url).unwrap();
        session.get_json("v2/version").await.unwrap();
    }
}
