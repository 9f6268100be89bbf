//! Stateful mode: session ids are issued, reused and terminated

use std::sync::Arc;

use pretty_assertions::assert_eq;
use serde_json::json;
use tests::client::{connect_http, CLIENT_NAME};
use tests::fixtures::{http_config, server_with_api};
use tests::http::TestServer;
use tests::messages::{self, CLIENT_PROTOCOL_VERSION};
use tests::mocks::MockFalconApi;
use tests::SessionMode;

async fn stateful_server() -> TestServer {
    let server = server_with_api(http_config(), Arc::new(MockFalconApi::new()));
    assert_eq!(server.session_mode(), SessionMode::Stateful);
    TestServer::start(server).await
}

/// initialize + notifications/initialized, returning the issued session id
async fn open_session(server: &TestServer) -> String {
    let reply = server.post(&messages::initialize(1), None).await;
    assert_eq!(reply.status, 200);
    let session_id = reply.session_id.clone().expect("initialize issues a session id");
    assert_eq!(
        reply.message()["result"]["protocolVersion"],
        CLIENT_PROTOCOL_VERSION
    );

    let ack = server
        .post(&messages::initialized(), Some(&session_id))
        .await;
    assert_eq!(ack.status, 202);

    session_id
}

#[tokio::test]
async fn test_session_id_is_issued_and_reused() {
    let server = stateful_server().await;
    let session_id = open_session(&server).await;

    for id in 2..5 {
        let reply = server
            .post(&messages::request(id, "tools/list", json!({})), Some(&session_id))
            .await;
        assert_eq!(reply.status, 200);

        let body = reply.message();
        assert_eq!(body["id"], id);
        assert!(body["result"]["tools"].as_array().unwrap().len() >= 3);
    }

    let health = server.health().await;
    assert_eq!(health["session_mode"], "stateful");
    assert_eq!(health["active_sessions"], 1);

    let entry = server.server.sessions().session(&session_id).unwrap();
    assert_eq!(entry.requests_served(), 3);
}

#[tokio::test]
async fn test_later_requests_see_the_negotiated_client() {
    let server = stateful_server().await;
    let session_id = open_session(&server).await;

    server
        .post(&messages::request(2, "ping", json!({})), Some(&session_id))
        .await;

    let negotiated = server
        .server
        .sessions()
        .session(&session_id)
        .unwrap()
        .negotiated();
    assert!(negotiated.is_negotiated());
    assert!(!negotiated.implicit);
    assert_eq!(negotiated.client_info.unwrap().name, CLIENT_NAME);
}

#[tokio::test]
async fn test_separate_clients_get_separate_sessions() {
    let server = stateful_server().await;
    let a = open_session(&server).await;
    let b = open_session(&server).await;

    assert_ne!(a, b);
    assert_eq!(server.health().await["active_sessions"], 2);
}

#[tokio::test]
async fn test_request_without_session_creates_nothing() {
    let server = stateful_server().await;

    for id in 1..=3 {
        let reply = server
            .post(&messages::request(id, "tools/list", json!({})), None)
            .await;
        assert!((400..500).contains(&reply.status), "status {}", reply.status);
        assert_eq!(reply.session_id, None);
    }

    assert_eq!(server.server.sessions().active_sessions(), 0);
    assert_eq!(server.health().await["active_sessions"], 0);
}

#[tokio::test]
async fn test_delete_terminates_session() {
    let server = stateful_server().await;
    let session_id = open_session(&server).await;

    let deleted = server.delete(Some(&session_id)).await;
    assert!(deleted.status().is_success());
    assert_eq!(server.health().await["active_sessions"], 0);

    // Terminating twice is harmless
    let again = server.delete(Some(&session_id)).await;
    assert!(again.status().is_success());
    assert_eq!(server.health().await["active_sessions"], 0);
}

#[tokio::test]
async fn test_delete_without_session_header() {
    let server = stateful_server().await;
    assert!(server.delete(None).await.status().is_client_error());
}

#[tokio::test]
async fn test_unknown_session_id_is_served_under_that_id() {
    // Another replica issued this id; the request still succeeds here
    let server = stateful_server().await;
    let foreign = "0b5a3c1e-8f5e-4f0a-9b1d-2f3c4d5e6f70";

    let reply = server
        .post(&messages::request(7, "tools/list", json!({})), Some(foreign))
        .await;

    assert_eq!(reply.status, 200);
    assert!(reply.message()["result"]["tools"].is_array());
    assert_eq!(server.health().await["active_sessions"], 1);

    let entry = server.server.sessions().session(foreign).unwrap();
    assert!(entry.negotiated().implicit);
    assert_eq!(entry.requests_served(), 1);
}

#[tokio::test]
async fn test_terminated_session_id_starts_fresh() {
    let server = stateful_server().await;
    let session_id = open_session(&server).await;
    assert!(server.delete(Some(&session_id)).await.status().is_success());

    let reply = server
        .post(&messages::request(3, "ping", json!({})), Some(&session_id))
        .await;
    assert_eq!(reply.status, 200);
    assert_eq!(reply.message()["result"], json!({}));
    assert_eq!(server.health().await["active_sessions"], 1);
}

#[tokio::test]
async fn test_malformed_session_id_is_rejected() {
    let server = stateful_server().await;

    let reply = server
        .post(&messages::request(1, "ping", json!({})), Some("not a valid id"))
        .await;

    assert!((400..500).contains(&reply.status), "status {}", reply.status);
    assert_eq!(server.server.sessions().active_sessions(), 0);
}

#[tokio::test]
async fn test_sdk_client_round_trip() {
    let server = stateful_server().await;
    let client = connect_http(server.url("/mcp")).await;

    let info = client.peer_info().expect("server info after handshake");
    assert_eq!(info.server_info.name, "falcon-mcp");

    let tools = client.list_tools(Default::default()).await.unwrap();
    assert!(tools
        .tools
        .iter()
        .any(|t| t.name == "falcon_search_scheduled_reports"));
    assert_eq!(server.server.sessions().active_sessions(), 1);

    client.cancel().await.unwrap();
}
