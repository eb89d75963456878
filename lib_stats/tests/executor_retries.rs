//! Retry, classification and breaker behaviour of `RequestExecutor`, driven
//! through scripted transports in both calling styles.

mod common;

use common::{executor, fast_config, ok_json, throttled, Backend};
use lib_stats::retrieve::transport::{RawResponse, TransportError};
use lib_stats::{ClientError, ClientOptions, ErrorKind, OutcomeKind, QueryParams, RequestExecutor};
use pretty_assertions::assert_eq;
use serde::Deserialize;
use serde_json::{json, Value};
use std::sync::Arc;
use std::time::Duration;

fn params() -> QueryParams {
    QueryParams::new()
        .with("LeagueID", "00")
        .with("Season", "2023-24")
        .with("SeasonType", "Regular Season")
}

#[test]
fn transient_timeouts_are_retried_until_success() {
    let backend = Backend::new(|n| {
        if n <= 2 {
            Err(TransportError::Timeout)
        } else {
            ok_json(r#"{"resultSets":[]}"#)
        }
    });
    let exec = executor(fast_config(3), &backend);

    let value = exec.get("leaguegamelog", &params()).unwrap();
    assert_eq!(value, json!({ "resultSets": [] }));
    assert_eq!(backend.sends(), 3);
}

#[test]
fn not_found_is_not_retried() {
    let backend = Backend::always(404, "missing");
    let exec = executor(fast_config(3), &backend);

    let err = exec.get("nosuchendpoint", &params()).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::NotFound);
    assert_eq!(backend.sends(), 1);
}

#[test]
fn empty_success_body_fails_to_parse() {
    let backend = Backend::always(200, "");
    let exec = executor(fast_config(3), &backend);

    let err = exec.get("playergamelog", &params()).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Parse);
    assert_eq!(backend.sends(), 1);
    assert_eq!(
        exec.last_attempt().map(|r| r.outcome),
        Some(OutcomeKind::Failure(ErrorKind::Parse))
    );
}

#[test]
fn server_errors_exhaust_every_attempt() {
    let backend = Backend::always(500, "internal error");
    let exec = executor(fast_config(3), &backend);

    let err = exec.get("leaguegamelog", &params()).unwrap_err();
    assert_eq!(
        err,
        ClientError::Server {
            endpoint: "leaguegamelog".into(),
            status_code: 500,
            body: "internal error".into(),
        }
    );
    assert_eq!(backend.sends(), 4);
}

#[test]
fn zero_retries_means_one_attempt() {
    let backend = Backend::new(|_| Err(TransportError::Connect("connection refused".into())));
    let exec = executor(fast_config(0), &backend);

    let err = exec.get("leaguegamelog", &params()).unwrap_err();
    assert!(err.is_network());
    assert_eq!(backend.sends(), 1);
}

#[test]
fn invalid_options_fail_before_any_request() {
    for options in [
        ClientOptions {
            timeout_secs: Some(-1.0),
            ..ClientOptions::default()
        },
        ClientOptions {
            max_retries: Some(-2),
            ..ClientOptions::default()
        },
        ClientOptions {
            rate_limit_interval_secs: Some(-0.1),
            ..ClientOptions::default()
        },
    ] {
        let options = ClientOptions {
            base_url: Some(common::BASE_URL.into()),
            ..options
        };
        let err = RequestExecutor::from_options(options).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Configuration);
    }
}

#[test]
fn rate_limit_responses_are_retried_only_when_enabled() {
    let script = |n: u32| if n == 1 { throttled("0") } else { ok_json("[1]") };

    let backend = Backend::new(script);
    let exec = executor(fast_config(3), &backend);
    let err = exec.get("scoreboardv2", &params()).unwrap_err();
    assert_eq!(err.retry_after(), Some(Duration::ZERO));
    assert_eq!(backend.sends(), 1);

    let backend = Backend::new(script);
    let exec = executor(fast_config(3).retry_on_rate_limit(true), &backend);
    assert_eq!(exec.get("scoreboardv2", &params()).unwrap(), json!([1]));
    assert_eq!(backend.sends(), 2);
}

#[test]
fn breaker_opens_and_recovers_after_cooldown() {
    let backend = Backend::new(|n| {
        if n <= 2 {
            Ok(RawResponse::new(503, "unavailable"))
        } else {
            ok_json(r#"{"ok":true}"#)
        }
    });
    let exec = executor(
        fast_config(0).failure_threshold(2).reset_timeout_secs(0.05),
        &backend,
    );

    for _ in 0..2 {
        let err = exec.get("boxscore", &params()).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Server);
    }

    let err = exec.get("boxscore", &params()).unwrap_err();
    assert!(matches!(err, ClientError::CircuitOpen { failure_count: 2, .. }));
    assert_eq!(backend.sends(), 2);

    std::thread::sleep(Duration::from_millis(70));
    assert_eq!(exec.get("boxscore", &params()).unwrap(), json!({ "ok": true }));
    assert_eq!(backend.sends(), 3);
    assert_eq!(exec.circuit_breaker().unwrap().failure_count(), 0);
}

#[test]
fn exhausted_retries_count_once_against_the_breaker() {
    let backend = Backend::always(500, "");
    let exec = executor(fast_config(2).failure_threshold(2), &backend);

    exec.get("boxscore", &params()).unwrap_err();
    assert_eq!(backend.sends(), 3);
    assert_eq!(exec.circuit_breaker().unwrap().failure_count(), 1);
    assert!(!exec.circuit_breaker().unwrap().is_open());
}

#[test]
fn disabled_breaker_never_fails_fast() {
    let backend = Backend::always(500, "");
    let exec = executor(fast_config(0).circuit_breaker(false).failure_threshold(1), &backend);

    for _ in 0..3 {
        let err = exec.get("boxscore", &params()).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Server);
    }
    assert_eq!(backend.sends(), 3);
}

#[test]
fn headers_and_query_are_sent() {
    let backend = Backend::always(200, "{}");
    let exec = executor(
        fast_config(0).header("referer", "https://www.example.com/"),
        &backend,
    );

    let query = QueryParams::new()
        .with("PlayerID", 2544)
        .with("LeagueID", Option::<&str>::None);
    exec.get("/commonplayerinfo", &query).unwrap();

    let request = backend.requests().pop().unwrap();
    assert_eq!(request.url.as_str(), "https://stats.example.com/stats/commonplayerinfo");
    assert_eq!(
        request.query,
        vec![
            ("PlayerID".to_string(), "2544".to_string()),
            ("LeagueID".to_string(), String::new()),
        ]
    );
    assert_eq!(request.headers.get("referer").unwrap(), "https://www.example.com/");
    assert!(request.headers.get("user-agent").is_some());
    assert_eq!(request.timeout, Duration::from_secs(30));
}

#[test]
fn every_attempt_is_recorded() {
    let backend = Backend::new(|n| match n {
        1 => Err(TransportError::Timeout),
        _ => ok_json("{}"),
    });
    let exec = executor(fast_config(3), &backend);
    exec.get("teaminfocommon", &QueryParams::new().with("TeamID", 1610612747_i64))
        .unwrap();

    let attempts = exec.attempts();
    assert_eq!(attempts.len(), 2);
    assert_eq!(attempts[0].attempt, 1);
    assert_eq!(attempts[0].outcome, OutcomeKind::Failure(ErrorKind::Timeout));
    assert_eq!(attempts[0].status, None);
    assert_eq!(attempts[1].outcome, OutcomeKind::Success);
    assert_eq!(attempts[1].status, Some(200));
    assert_eq!(
        exec.last_attempt().unwrap().url,
        "https://stats.example.com/stats/teaminfocommon?TeamID=1610612747"
    );
}

#[derive(Debug, Deserialize, PartialEq)]
struct ResultSet {
    name: String,
    headers: Vec<String>,
}

#[test]
fn typed_results_are_decoded() {
    let backend = Backend::always(200, r#"{"name":"GameHeader","headers":["GAME_ID"]}"#);
    let exec = executor(fast_config(0), &backend);

    let set: ResultSet = exec.get_json("scoreboardv2", &params()).unwrap();
    assert_eq!(
        set,
        ResultSet {
            name: "GameHeader".into(),
            headers: vec!["GAME_ID".into()],
        }
    );

    let err = exec.get_json::<Vec<u8>>("scoreboardv2", &params()).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Parse);
}

#[tokio::test]
async fn async_calls_retry_the_same_way() {
    let backend = Backend::new(|n| match n {
        1 | 2 => Err(TransportError::Timeout),
        _ => ok_json("[]"),
    });
    let exec = executor(fast_config(3), &backend);

    assert_eq!(exec.get_async("leaguegamelog", &params()).await.unwrap(), json!([]));
    assert_eq!(backend.sends(), 3);

    let set: Vec<Value> = exec.get_json_async("leaguegamelog", &params()).await.unwrap();
    assert!(set.is_empty());
}

#[tokio::test]
async fn concurrent_async_callers_share_one_breaker() {
    let backend = Backend::always(500, "");
    let exec = Arc::new(executor(fast_config(0).failure_threshold(3), &backend));

    let tasks: Vec<_> = (0..6)
        .map(|_| {
            let exec = Arc::clone(&exec);
            tokio::spawn(async move { exec.get_async("boxscore", &params()).await })
        })
        .collect();

    let mut fast_failures = 0;
    for task in tasks {
        if let Err(ClientError::CircuitOpen { .. }) = task.await.unwrap() {
            fast_failures += 1;
        }
    }

    assert!(exec.circuit_breaker().unwrap().is_open());
    assert_eq!(backend.sends() + fast_failures, 6);
    assert!(backend.sends() >= 3);
}

/// Every scripted case yields the same value or error kind, after the same
/// number of transport calls, whichever style issues it.
#[test]
fn blocking_and_async_styles_agree() {
    type Script = fn(u32) -> Result<RawResponse, TransportError>;
    let cases: [(&str, Script); 8] = [
        ("success", |_| ok_json(r#"{"rows":[[1,"a"]]}"#)),
        ("timeouts then success", |n| match n {
            1 | 2 => Err(TransportError::Timeout),
            _ => ok_json("{}"),
        }),
        ("not found", |_| Ok(RawResponse::new(404, ""))),
        ("server error", |_| Ok(RawResponse::new(502, "bad gateway"))),
        ("client error", |_| Ok(RawResponse::new(400, "bad request"))),
        ("throttled", |_| throttled("5")),
        ("unparseable", |_| ok_json("<html>maintenance</html>")),
        ("refused", |_| Err(TransportError::Connect("connection refused".into()))),
    ];

    let runtime = tokio::runtime::Runtime::new().unwrap();

    for (name, script) in cases {
        let blocking_backend = Backend::new(script);
        let blocking = executor(fast_config(3), &blocking_backend);
        let blocking_result = blocking.get("leaguegamelog", &params());

        let async_backend = Backend::new(script);
        let non_blocking = executor(fast_config(3), &async_backend);
        let async_result = runtime.block_on(non_blocking.get_async("leaguegamelog", &params()));

        match (&blocking_result, &async_result) {
            (Ok(a), Ok(b)) => assert_eq!(a, b, "{name}"),
            (Err(a), Err(b)) => assert_eq!(a, b, "{name}"),
            _ => panic!("{name}: styles disagree: {blocking_result:?} vs {async_result:?}"),
        }
        assert_eq!(blocking_backend.sends(), async_backend.sends(), "{name}");
    }
}
