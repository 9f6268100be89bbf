//! Identity exchange tests with a mock HTTP server

use std::sync::Arc;
use std::time::Duration;

use falcon_mcp_core::{branding, AuthError};
use falcon_mcp_gateway::credentials::{CredentialManager, FalconIdentityClient, TokenExchange};
use serde_json::json;
use tests::fixtures::{test_config, CLIENT_ID, CLIENT_SECRET};
use tests::ServerConfigBuilder;
use wiremock::matchers::{body_string_contains, header, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn identity_client(builder: ServerConfigBuilder, server: &MockServer) -> FalconIdentityClient {
    let config = builder.base_url(server.uri()).build().unwrap();
    FalconIdentityClient::from_config(reqwest::Client::new(), &config).unwrap()
}

fn token_body(access_token: &str) -> serde_json::Value {
    json!({
        "access_token": access_token,
        "token_type": "bearer",
        "expires_in": 1799
    })
}

// =============================================================================
// FalconIdentityClient
// =============================================================================

#[tokio::test]
async fn test_exchange_posts_form_encoded_credentials() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/oauth2/token"))
        .and(header("content-type", "application/x-www-form-urlencoded"))
        .and(header("accept", "application/json"))
        .and(body_string_contains(format!("client_id={}", CLIENT_ID)))
        .and(body_string_contains(format!("client_secret={}", CLIENT_SECRET)))
        .respond_with(ResponseTemplate::new(201).set_body_json(token_body("abc")))
        .expect(1)
        .mount(&server)
        .await;

    let client = identity_client(test_config(), &server);
    assert_eq!(client.token_url().path(), "/oauth2/token");

    let token = client.exchange().await.unwrap();
    assert_eq!(token.access_token, "abc");
    assert_eq!(token.expires_in, Some(1799));
}

#[tokio::test]
async fn test_exchange_sends_user_agent_comment() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/oauth2/token"))
        .and(header(
            "user-agent",
            format!("falcon-mcp/{} (bedrock-agentcore)", branding::VERSION).as_str(),
        ))
        .respond_with(ResponseTemplate::new(201).set_body_json(token_body("abc")))
        .expect(1)
        .mount(&server)
        .await;

    let client = identity_client(
        test_config().user_agent_comment(Some("bedrock-agentcore".to_string())),
        &server,
    );
    client.exchange().await.unwrap();
}

#[tokio::test]
async fn test_base_url_path_is_kept() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/gov/oauth2/token"))
        .respond_with(ResponseTemplate::new(200).set_body_json(token_body("abc")))
        .expect(1)
        .mount(&server)
        .await;

    let config = test_config()
        .base_url(format!("{}/gov", server.uri()))
        .build()
        .unwrap();
    let client = FalconIdentityClient::from_config(reqwest::Client::new(), &config).unwrap();

    assert_eq!(client.exchange().await.unwrap().access_token, "abc");
}

#[tokio::test]
async fn test_rejected_credentials() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/oauth2/token"))
        .respond_with(
            ResponseTemplate::new(403)
                .set_body_json(json!({"errors": [{"code": 403, "message": "access denied, invalid bearer token"}]})),
        )
        .mount(&server)
        .await;

    let err = identity_client(test_config(), &server)
        .exchange()
        .await
        .unwrap_err();

    match err {
        AuthError::Rejected { status, body } => {
            assert_eq!(status, 403);
            assert!(body.contains("access denied"));
        }
        other => panic!("Expected Rejected, got {:?}", other),
    }
}

#[tokio::test]
async fn test_empty_access_token_is_invalid() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/oauth2/token"))
        .respond_with(ResponseTemplate::new(201).set_body_json(json!({"access_token": ""})))
        .mount(&server)
        .await;

    let err = identity_client(test_config(), &server)
        .exchange()
        .await
        .unwrap_err();
    assert!(matches!(err, AuthError::InvalidResponse(_)));
}

#[tokio::test]
async fn test_slow_identity_endpoint_times_out() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/oauth2/token"))
        .respond_with(
            ResponseTemplate::new(201)
                .set_body_json(token_body("late"))
                .set_delay(Duration::from_secs(3)),
        )
        .mount(&server)
        .await;

    let err = identity_client(test_config().auth_timeout(Duration::from_secs(1)), &server)
        .exchange()
        .await
        .unwrap_err();
    assert_eq!(err, AuthError::Timeout(Duration::from_secs(1)));
}

// =============================================================================
// CredentialManager over the real exchange
// =============================================================================

fn manager(server: &MockServer) -> CredentialManager {
    let client = identity_client(test_config(), server);
    CredentialManager::new(
        Arc::new(client),
        Duration::from_secs(60),
        Duration::from_secs(10),
    )
}

#[tokio::test]
async fn test_token_is_cached_across_calls() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/oauth2/token"))
        .respond_with(ResponseTemplate::new(201).set_body_json(token_body("cached")))
        .expect(1)
        .mount(&server)
        .await;

    let manager = manager(&server);
    for _ in 0..5 {
        assert_eq!(manager.get_token().await.unwrap().access_token, "cached");
    }
}

#[tokio::test]
async fn test_missing_expires_in_uses_default_lifetime() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/oauth2/token"))
        .respond_with(ResponseTemplate::new(201).set_body_json(json!({"access_token": "abc"})))
        .mount(&server)
        .await;

    let token = manager(&server).get_token().await.unwrap();
    let remaining = token.remaining().num_seconds();
    assert!((1790..=1799).contains(&remaining), "remaining {}", remaining);
    assert_eq!(token.authorization_header(), "Bearer abc");
}

#[tokio::test]
async fn test_failed_exchange_is_retried_on_next_call() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/oauth2/token"))
        .respond_with(ResponseTemplate::new(500).set_body_string("upstream unavailable"))
        .up_to_n_times(1)
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/oauth2/token"))
        .respond_with(ResponseTemplate::new(201).set_body_json(token_body("recovered")))
        .mount(&server)
        .await;

    let manager = manager(&server);

    let err = manager.get_token().await.unwrap_err();
    assert!(matches!(err, AuthError::Rejected { status: 500, .. }));
    assert!(manager.cached_token().is_none());

    assert_eq!(manager.get_token().await.unwrap().access_token, "recovered");
}
