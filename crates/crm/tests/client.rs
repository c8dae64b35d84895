//! HTTP behavior of `SalesforceClient` against a mocked Salesforce org.

use std::sync::Arc;
use std::time::Duration;

use impltrack_core::config::SalesforceConfig;
use impltrack_core::errors::{GatewayError, UpstreamError};
use impltrack_crm::{Record, SalesforceApi, SalesforceClient};
use secrecy::SecretString;
use serde_json::json;
use wiremock::matchers::{body_string_contains, header, method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

const TOKEN_PATH: &str = "/services/oauth2/token";
const QUERY_PATH: &str = "/services/data/v62.0/query/";

fn config(server: &MockServer) -> SalesforceConfig {
    SalesforceConfig {
        instance_url: server.uri(),
        client_id: "impltrack-client".to_string(),
        client_secret: SecretString::from("s3cret".to_string()),
        api_version: "v62.0".to_string(),
        timeout_secs: 5,
    }
}

fn token(value: &str) -> ResponseTemplate {
    ResponseTemplate::new(200).set_body_json(json!({
        "access_token": value,
        "instance_url": "https://acme.my.salesforce.com",
        "token_type": "Bearer",
    }))
}

fn rows(records: serde_json::Value) -> ResponseTemplate {
    let total = records.as_array().map_or(0, Vec::len);
    ResponseTemplate::new(200).set_body_json(json!({
        "totalSize": total,
        "done": true,
        "records": records,
    }))
}

async fn authenticated_client(server: &MockServer) -> SalesforceClient {
    let client = SalesforceClient::new(&config(server)).expect("client should build");
    client.authenticate().await.expect("authentication should succeed");
    client
}

#[tokio::test]
async fn authenticates_with_client_credentials_and_sends_bearer() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path(TOKEN_PATH))
        .and(body_string_contains("grant_type=client_credentials"))
        .and(body_string_contains("client_id=impltrack-client"))
        .and(body_string_contains("client_secret=s3cret"))
        .respond_with(token("token-1"))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path(QUERY_PATH))
        .and(header("authorization", "Bearer token-1"))
        .and(query_param("q", "SELECT Id FROM Implementation__c"))
        .respond_with(rows(json!([{"Id": "a0B5f000001abcD"}])))
        .expect(1)
        .mount(&server)
        .await;

    let client = authenticated_client(&server).await;
    let result = client.query("SELECT Id FROM Implementation__c").await.expect("query");

    assert_eq!(result.total_size, 1);
    assert_eq!(result.records[0]["Id"], "a0B5f000001abcD");
}

#[tokio::test]
async fn expired_token_triggers_exactly_one_reauthentication() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path(TOKEN_PATH))
        .respond_with(token("stale-token"))
        .up_to_n_times(1)
        .with_priority(1)
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path(TOKEN_PATH))
        .respond_with(token("fresh-token"))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path(QUERY_PATH))
        .and(header("authorization", "Bearer stale-token"))
        .respond_with(
            ResponseTemplate::new(401).set_body_string("[{\"errorCode\":\"INVALID_SESSION_ID\"}]"),
        )
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path(QUERY_PATH))
        .and(header("authorization", "Bearer fresh-token"))
        .respond_with(rows(json!([])))
        .expect(1)
        .mount(&server)
        .await;

    let client = authenticated_client(&server).await;
    let result = client.query("SELECT Id FROM Implementation__c").await.expect("retried query");

    assert_eq!(result.total_size, 0);
}

#[tokio::test]
async fn concurrent_expiries_share_one_reauthentication() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path(TOKEN_PATH))
        .respond_with(token("stale-token"))
        .up_to_n_times(1)
        .with_priority(1)
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path(TOKEN_PATH))
        .respond_with(token("fresh-token"))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path(QUERY_PATH))
        .and(header("authorization", "Bearer stale-token"))
        .respond_with(ResponseTemplate::new(401).set_delay(Duration::from_millis(200)))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path(QUERY_PATH))
        .and(header("authorization", "Bearer fresh-token"))
        .respond_with(rows(json!([])))
        .mount(&server)
        .await;

    let client = Arc::new(authenticated_client(&server).await);
    let tasks: Vec<_> = (0..8)
        .map(|_| {
            let client = Arc::clone(&client);
            tokio::spawn(async move { client.query("SELECT Id FROM Implementation__c").await })
        })
        .collect();
    for task in tasks {
        task.await.expect("task should not panic").expect("query should recover");
    }

    let requests = server.received_requests().await.expect("recording is enabled");
    let exchanges = requests
        .iter()
        .filter(|request| request.method.as_str() == "POST" && request.url.path() == TOKEN_PATH)
        .count();
    assert_eq!(exchanges, 2);
}

#[tokio::test]
async fn slow_responses_time_out_without_a_status() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path(TOKEN_PATH))
        .respond_with(token("token-1"))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path(QUERY_PATH))
        .respond_with(rows(json!([])).set_delay(Duration::from_secs(3)))
        .mount(&server)
        .await;

    let client = SalesforceClient::new(&SalesforceConfig { timeout_secs: 1, ..config(&server) })
        .expect("client should build");
    client.authenticate().await.expect("authentication should succeed");
    let error = client.query("SELECT Id FROM User").await.expect_err("request should time out");

    match error {
        GatewayError::Upstream(upstream) => assert_eq!(upstream.status, None),
        other => panic!("expected a transport failure, got {other:?}"),
    }
}

#[tokio::test]
async fn second_unauthorized_response_surfaces_as_upstream_error() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path(TOKEN_PATH))
        .respond_with(token("never-valid"))
        .expect(2)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path(QUERY_PATH))
        .respond_with(ResponseTemplate::new(401).set_body_string("session expired"))
        .expect(2)
        .mount(&server)
        .await;

    let client = authenticated_client(&server).await;
    let error = client.query("SELECT Id FROM User").await.expect_err("should give up");

    assert_eq!(error, GatewayError::Upstream(UpstreamError::status(401, "session expired")));
}

#[tokio::test]
async fn server_errors_are_not_retried() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path(TOKEN_PATH))
        .respond_with(token("token-1"))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path(QUERY_PATH))
        .respond_with(ResponseTemplate::new(500).set_body_string("boom"))
        .expect(1)
        .mount(&server)
        .await;

    let client = authenticated_client(&server).await;
    let error = client.query("SELECT Id FROM User").await.expect_err("500 should fail");

    assert_eq!(error, GatewayError::Upstream(UpstreamError::status(500, "boom")));
    assert_eq!(error.reason_code(), "upstream_error");
}

#[tokio::test]
async fn rejected_credentials_fail_authentication() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path(TOKEN_PATH))
        .respond_with(
            ResponseTemplate::new(400).set_body_json(json!({
                "error": "invalid_client",
                "error_description": "bad secret",
            })),
        )
        .mount(&server)
        .await;

    let client = SalesforceClient::new(&config(&server)).expect("client should build");
    let error = client.authenticate().await.expect_err("credentials are wrong");

    assert!(matches!(error, GatewayError::Authentication(_)));
    assert!(error.to_string().contains("invalid_client"), "{error}");
}

#[tokio::test]
async fn empty_access_token_is_rejected() {
    let server = MockServer::start().await;
    Mock::given(method("POST")).and(path(TOKEN_PATH)).respond_with(token("")).mount(&server).await;

    let client = SalesforceClient::new(&config(&server)).expect("client should build");
    let error = client.authenticate().await.expect_err("empty token");

    assert_eq!(
        error,
        GatewayError::Authentication("token endpoint returned empty access token".to_string())
    );
}

#[tokio::test]
async fn record_endpoints_use_sobject_paths() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path(TOKEN_PATH))
        .respond_with(token("token-1"))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/services/data/v62.0/sobjects/Implementation__c/a0B5f000001abcD"))
        .and(query_param("fields", "Name,CDE__c"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "attributes": {"type": "Implementation__c"},
            "Name": "Acme - New - 2026-01-05",
            "CDE__c": "005CDE",
        })))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/services/data/v62.0/sobjects/Implementation__c"))
        .and(body_string_contains("\"Name\":\"Acme - New - 2026-01-05\""))
        .respond_with(
            ResponseTemplate::new(201)
                .set_body_json(json!({"id": "a0B5f000002xyzQ", "success": true, "errors": []})),
        )
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("PATCH"))
        .and(path("/services/data/v62.0/sobjects/Implementation__c/a0B5f000001abcD"))
        .and(body_string_contains("\"Risks__c\":\"None\""))
        .respond_with(ResponseTemplate::new(204))
        .expect(1)
        .mount(&server)
        .await;

    let client = authenticated_client(&server).await;

    let record = client
        .get_record("Implementation__c", "a0B5f000001abcD", &["Name", "CDE__c"])
        .await
        .expect("get");
    assert_eq!(record["CDE__c"], "005CDE");

    let mut fields = Record::new();
    fields.insert("Name".to_string(), json!("Acme - New - 2026-01-05"));
    let created = client.create_record("Implementation__c", &fields).await.expect("create");
    assert_eq!(created.id, "a0B5f000002xyzQ");

    let mut update = Record::new();
    update.insert("Risks__c".to_string(), json!("None"));
    client.update_record("Implementation__c", "a0B5f000001abcD", &update).await.expect("update");
}

#[tokio::test]
async fn missing_record_keeps_the_404_status() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path(TOKEN_PATH))
        .respond_with(token("token-1"))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/services/data/v62.0/sobjects/Implementation__c/a0B000000000000"))
        .respond_with(ResponseTemplate::new(404).set_body_string("[{\"errorCode\":\"NOT_FOUND\"}]"))
        .mount(&server)
        .await;

    let client = authenticated_client(&server).await;
    let error = client
        .get_record("Implementation__c", "a0B000000000000", &[])
        .await
        .expect_err("record is missing");

    match error {
        GatewayError::Upstream(upstream) => assert!(upstream.is_not_found()),
        other => panic!("expected upstream 404, got {other:?}"),
    }
}
