//! The `reqwest` transports against a local mock server.

use lib_stats::{ClientConfig, ClientError, ErrorKind, QueryParams, RequestExecutor};
use pretty_assertions::assert_eq;
use serde_json::json;
use std::sync::Arc;
use std::time::Duration;
use wiremock::matchers::{header, method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn executor_for(server: &MockServer, max_retries: i64) -> RequestExecutor {
    let config = ClientConfig::builder(format!("{}/stats", server.uri()))
        .max_retries(max_retries)
        .backoff_secs(0.001, 0.002)
        .header("x-stats-client", "integration")
        .build()
        .unwrap();
    RequestExecutor::new(config)
}

#[tokio::test]
async fn async_get_sends_query_and_headers() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/stats/scoreboardv2"))
        .and(query_param("GameDate", "2024-01-15"))
        .and(query_param("LeagueID", "00"))
        .and(header("x-stats-client", "integration"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "resource": "scoreboard" })))
        .expect(1)
        .mount(&server)
        .await;

    let exec = executor_for(&server, 0);
    let params = QueryParams::new()
        .with("GameDate", "2024-01-15")
        .with("LeagueID", "00");

    let value = exec.get_async("scoreboardv2", &params).await.unwrap();
    assert_eq!(value, json!({ "resource": "scoreboard" }));
    exec.close_async().await;
}

#[tokio::test]
async fn server_errors_are_retried_over_http() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/stats/boxscoretraditionalv2"))
        .respond_with(ResponseTemplate::new(503).set_body_string("maintenance"))
        .expect(3)
        .mount(&server)
        .await;

    let exec = executor_for(&server, 2);
    let err = exec
        .get_async("boxscoretraditionalv2", &QueryParams::new())
        .await
        .unwrap_err();
    assert_eq!(err.status_code(), Some(503));
    assert_eq!(err.kind(), ErrorKind::Server);
}

#[tokio::test]
async fn slow_responses_time_out() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(200).set_delay(Duration::from_millis(500)))
        .expect(2)
        .mount(&server)
        .await;

    let config = ClientConfig::builder(server.uri())
        .timeout_secs(0.1)
        .max_retries(1)
        .backoff_secs(0.001, 0.001)
        .build()
        .unwrap();
    let exec = RequestExecutor::new(config);

    let err = exec.get_async("playercareerstats", &QueryParams::new()).await.unwrap_err();
    assert_eq!(
        err,
        ClientError::Timeout {
            endpoint: "playercareerstats".into(),
            timeout: Duration::from_millis(100),
        }
    );
}

#[tokio::test]
async fn blocking_get_runs_on_the_blocking_pool() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/stats/commonallplayers"))
        .respond_with(ResponseTemplate::new(200).set_body_string(r#"{"players":[]}"#))
        .expect(1)
        .mount(&server)
        .await;

    let exec = Arc::new(executor_for(&server, 0));
    let worker = Arc::clone(&exec);
    let value = tokio::task::spawn_blocking(move || {
        worker.get("commonallplayers", &QueryParams::new().with("IsOnlyCurrentSeason", 1))
    })
    .await
    .unwrap()
    .unwrap();

    assert_eq!(value, json!({ "players": [] }));
    exec.close_async().await;
}

#[test]
fn blocking_get_outside_a_runtime() {
    let runtime = tokio::runtime::Runtime::new().unwrap();
    let server = runtime.block_on(async {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/stats/teamdetails"))
            .respond_with(ResponseTemplate::new(404).set_body_string("no such team"))
            .expect(1)
            .mount(&server)
            .await;
        server
    });

    let exec = executor_for(&server, 3);
    let err = exec.get("teamdetails", &QueryParams::new()).unwrap_err();
    assert_eq!(
        err,
        ClientError::NotFound {
            endpoint: "teamdetails".into(),
            body: "no such team".into(),
        }
    );
    exec.close();
}

#[tokio::test]
async fn refused_connections_are_network_errors() {
    let config = ClientConfig::builder("http://127.0.0.1:1/")
        .max_retries(1)
        .backoff_secs(0.001, 0.001)
        .build()
        .unwrap();
    let exec = RequestExecutor::new(config);

    let err = exec.get_async("scoreboardv2", &QueryParams::new()).await.unwrap_err();
    assert!(err.is_network());
    assert_eq!(exec.attempts().len(), 2);
}
