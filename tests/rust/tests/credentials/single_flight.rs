//! Concurrent token refresh tests

use std::sync::Arc;
use std::time::Duration;

use falcon_mcp_core::AuthError;
use falcon_mcp_gateway::credentials::CredentialManager;
use futures::future::join_all;
use serde_json::json;
use tests::fixtures::test_config;
use tests::mocks::MockTokenExchange;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn manager(exchange: Arc<MockTokenExchange>) -> CredentialManager {
    CredentialManager::new(exchange, Duration::from_secs(60), Duration::from_secs(10))
}

#[tokio::test]
async fn test_many_callers_trigger_one_exchange() {
    let exchange = MockTokenExchange::with_delay(1799, Duration::from_millis(100));
    let manager = manager(exchange.clone());

    let handles = (0..32).map(|_| {
        let manager = manager.clone();
        tokio::spawn(async move { manager.get_token().await })
    });
    let tokens: Vec<_> = join_all(handles)
        .await
        .into_iter()
        .map(|joined| joined.unwrap().unwrap())
        .collect();

    assert_eq!(exchange.calls(), 1);
    assert!(tokens.iter().all(|t| Arc::ptr_eq(t, &tokens[0])));
    assert!(!manager.refresh_in_flight());
}

#[tokio::test]
async fn test_waiters_share_a_failure() {
    let exchange = MockTokenExchange::with_delay(1799, Duration::from_millis(50));
    exchange.set_failing(true);
    let manager = manager(exchange.clone());

    let results = join_all((0..8).map(|_| manager.get_token())).await;

    assert_eq!(exchange.calls(), 1);
    for result in results {
        assert!(matches!(result, Err(AuthError::Rejected { status: 401, .. })));
    }

    exchange.set_failing(false);
    assert_eq!(manager.get_token().await.unwrap().access_token, "token-2");
    assert_eq!(exchange.calls(), 2);
}

#[tokio::test]
async fn test_expiring_token_refreshed_once_for_concurrent_callers() {
    // Every token lands inside the 60s margin, so each round refreshes
    let exchange = MockTokenExchange::with_delay(30, Duration::from_millis(50));
    let manager = manager(exchange.clone());

    let first = join_all((0..4).map(|_| manager.get_token())).await;
    assert!(first.iter().all(|r| r.as_ref().unwrap().access_token == "token-1"));

    let second = join_all((0..4).map(|_| manager.get_token())).await;
    assert!(second.iter().all(|r| r.as_ref().unwrap().access_token == "token-2"));

    assert_eq!(exchange.calls(), 2);
}

#[tokio::test]
async fn test_single_identity_request_under_load() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/oauth2/token"))
        .respond_with(
            ResponseTemplate::new(201)
                .set_body_json(json!({"access_token": "shared", "expires_in": 1799}))
                .set_delay(Duration::from_millis(200)),
        )
        .expect(1)
        .mount(&server)
        .await;

    let config = test_config().base_url(server.uri()).build().unwrap();
    let identity = falcon_mcp_gateway::FalconIdentityClient::from_config(
        reqwest::Client::new(),
        &config,
    )
    .unwrap();
    let manager = CredentialManager::new(
        Arc::new(identity),
        config.token_refresh_margin,
        config.auth_timeout,
    );

    let handles = (0..20).map(|_| {
        let manager = manager.clone();
        tokio::spawn(async move { manager.get_token().await })
    });
    for joined in join_all(handles).await {
        assert_eq!(joined.unwrap().unwrap().access_token, "shared");
    }
}
