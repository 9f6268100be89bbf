//! FalconClient tests: URL building, headers, body decoding and token handling

use std::sync::Arc;
use std::time::Duration;

use falcon_mcp_core::UpstreamError;
use falcon_mcp_gateway::credentials::CredentialManager;
use falcon_mcp_gateway::upstream::{CommandRequest, FalconApi, FalconClient, UpstreamBody};
use pretty_assertions::assert_eq;
use serde_json::{json, Map, Value};
use tests::fixtures::test_config;
use tests::mocks::MockTokenExchange;
use wiremock::matchers::{body_json, header, method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

const SCHEDULED_REPORTS_QUERY: &str = "/reports/queries/scheduled-reports/v1";

struct Harness {
    server: MockServer,
    exchange: Arc<MockTokenExchange>,
    credentials: CredentialManager,
    client: FalconClient,
}

async fn harness() -> Harness {
    harness_with_timeout(Duration::from_secs(30)).await
}

async fn harness_with_timeout(timeout: Duration) -> Harness {
    let server = MockServer::start().await;
    let config = test_config()
        .base_url(server.uri())
        .upstream_timeout(timeout)
        .build()
        .unwrap();

    let exchange = MockTokenExchange::new(1799);
    let credentials = CredentialManager::new(
        exchange.clone(),
        config.token_refresh_margin,
        config.auth_timeout,
    );
    let client = FalconClient::from_config(reqwest::Client::new(), &config, credentials.clone());

    Harness {
        server,
        exchange,
        credentials,
        client,
    }
}

fn params(value: Value) -> Map<String, Value> {
    match value {
        Value::Object(map) => map,
        _ => Map::new(),
    }
}

#[tokio::test]
async fn test_query_parameters_and_bearer_token() {
    let h = harness().await;
    Mock::given(method("GET"))
        .and(path(SCHEDULED_REPORTS_QUERY))
        .and(query_param("filter", "status:'ACTIVE'+type:'event_search'"))
        .and(query_param("limit", "10"))
        .and(header("authorization", "Bearer token-1"))
        .and(header("accept", "application/json"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"resources": ["a", "b"]})))
        .expect(1)
        .mount(&h.server)
        .await;

    let request = CommandRequest::new().with_parameters(params(json!({
        "filter": "status:'ACTIVE'+type:'event_search'",
        "limit": 10,
        "offset": null
    })));
    let response = h
        .client
        .command("scheduled_reports_query", request)
        .await
        .unwrap();

    assert_eq!(response.status_code, 200);
    assert_eq!(response.body, UpstreamBody::Json(json!({"resources": ["a", "b"]})));

    let received = h.server.received_requests().await.unwrap();
    let query = received[0].url.query().unwrap_or_default().to_string();
    assert!(!query.contains("offset"), "null parameters are skipped: {}", query);
}

#[tokio::test]
async fn test_array_parameters_repeat_the_key() {
    let h = harness().await;
    Mock::given(method("GET"))
        .and(path("/reports/entities/scheduled-reports/v1"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"resources": []})))
        .mount(&h.server)
        .await;

    let request =
        CommandRequest::new().with_parameters(params(json!({"ids": ["r-1", "r-2", "r-3"]})));
    h.client
        .command("scheduled_reports_get", request)
        .await
        .unwrap();

    let received = h.server.received_requests().await.unwrap();
    let ids: Vec<String> = received[0]
        .url
        .query_pairs()
        .filter(|(k, _)| k == "ids")
        .map(|(_, v)| v.into_owned())
        .collect();
    assert_eq!(ids, vec!["r-1", "r-2", "r-3"]);
}

#[tokio::test]
async fn test_post_sends_json_body() {
    let h = harness().await;
    Mock::given(method("POST"))
        .and(path("/reports/entities/scheduled-reports/execution/v1"))
        .and(body_json(json!({"id": "report-1"})))
        .respond_with(
            ResponseTemplate::new(200).set_body_json(json!({"resources": [{"id": "exec-1"}]})),
        )
        .expect(1)
        .mount(&h.server)
        .await;

    let response = h
        .client
        .command(
            "scheduled_reports_launch",
            CommandRequest::new().with_body(json!({"id": "report-1"})),
        )
        .await
        .unwrap();
    assert!(response.is_success());
}

#[tokio::test]
async fn test_non_success_status_is_returned_not_raised() {
    let h = harness().await;
    Mock::given(method("GET"))
        .and(path(SCHEDULED_REPORTS_QUERY))
        .respond_with(
            ResponseTemplate::new(403)
                .set_body_json(json!({"errors": [{"code": 403, "message": "access denied"}]})),
        )
        .mount(&h.server)
        .await;

    let response = h
        .client
        .command("scheduled_reports_query", CommandRequest::new())
        .await
        .unwrap();

    assert_eq!(response.status_code, 403);
    assert_eq!(response.json_body()["errors"][0]["message"], "access denied");
    // Only 401 touches the token cache
    assert!(h.credentials.cached_token().is_some());
}

#[tokio::test]
async fn test_unauthorized_invalidates_cached_token() {
    let h = harness().await;
    Mock::given(method("GET"))
        .and(path(SCHEDULED_REPORTS_QUERY))
        .and(header("authorization", "Bearer token-1"))
        .respond_with(ResponseTemplate::new(401).set_body_json(json!({"errors": []})))
        .mount(&h.server)
        .await;
    Mock::given(method("GET"))
        .and(path(SCHEDULED_REPORTS_QUERY))
        .and(header("authorization", "Bearer token-2"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"resources": ["ok"]})))
        .mount(&h.server)
        .await;

    let first = h
        .client
        .command("scheduled_reports_query", CommandRequest::new())
        .await
        .unwrap();
    assert_eq!(first.status_code, 401);
    assert!(h.credentials.cached_token().is_none());

    let second = h
        .client
        .command("scheduled_reports_query", CommandRequest::new())
        .await
        .unwrap();
    assert_eq!(second.status_code, 200);
    assert_eq!(h.exchange.calls(), 2);
}

#[tokio::test]
async fn test_non_json_body_is_binary() {
    let h = harness().await;
    Mock::given(method("GET"))
        .and(path("/reports/entities/report-executions-download/v1"))
        .and(query_param("id", "exec-1"))
        .respond_with(
            ResponseTemplate::new(200)
                .insert_header("content-type", "text/csv")
                .set_body_string("host,status\nh-1,online\n"),
        )
        .mount(&h.server)
        .await;

    let response = h
        .client
        .command(
            "report_executions_download_get",
            CommandRequest::new().with_parameters(params(json!({"id": "exec-1"}))),
        )
        .await
        .unwrap();

    assert_eq!(
        response.body,
        UpstreamBody::Binary(b"host,status\nh-1,online\n".to_vec())
    );
}

#[tokio::test]
async fn test_empty_body_is_null() {
    let h = harness().await;
    Mock::given(method("POST"))
        .and(path("/reports/entities/scheduled-reports/execution/v1"))
        .respond_with(ResponseTemplate::new(204))
        .mount(&h.server)
        .await;

    let response = h
        .client
        .command("scheduled_reports_launch", CommandRequest::new())
        .await
        .unwrap();
    assert_eq!(response.body, UpstreamBody::Json(Value::Null));
}

#[tokio::test]
async fn test_unknown_operation() {
    let h = harness().await;
    let err = h
        .client
        .command("QueryDevicesByFilter", CommandRequest::new())
        .await
        .unwrap_err();
    assert!(matches!(err, UpstreamError::UnknownOperation(op) if op == "QueryDevicesByFilter"));
    // Rejected before any token is fetched
    assert_eq!(h.exchange.calls(), 0);
}

#[tokio::test]
async fn test_auth_failure_surfaces_as_upstream_auth_error() {
    let h = harness().await;
    h.exchange.set_failing(true);

    let err = h
        .client
        .command("scheduled_reports_query", CommandRequest::new())
        .await
        .unwrap_err();
    assert!(err.is_auth());
    assert!(!h.client.check_connectivity().await);

    h.exchange.set_failing(false);
    assert!(h.client.check_connectivity().await);
}

#[tokio::test]
async fn test_slow_api_times_out() {
    let h = harness_with_timeout(Duration::from_secs(1)).await;
    Mock::given(method("GET"))
        .and(path(SCHEDULED_REPORTS_QUERY))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_json(json!({"resources": []}))
                .set_delay(Duration::from_secs(3)),
        )
        .mount(&h.server)
        .await;

    let err = h
        .client
        .command("scheduled_reports_query", CommandRequest::new())
        .await
        .unwrap_err();
    assert!(matches!(err, UpstreamError::Timeout(d) if d == Duration::from_secs(1)));
}
