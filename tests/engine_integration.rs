//! End-to-end cycles: engine, real strategies, mock servers and state file.

mod common;

use common::{login_target, loopback_guard, LOGIN_PAGE};
use sitewatch::breaker::BreakerPhase;
use sitewatch::checks::StaticCredentials;
use sitewatch::config::WatchConfig;
use sitewatch::engine::CheckEngine;
use sitewatch::state::StateStore;
use sitewatch::{CheckKind, CheckStatus, Target};
use tempfile::TempDir;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn config(dir: &TempDir) -> WatchConfig {
    let mut config = WatchConfig::default();
    config.guard = loopback_guard();
    config.checks.max_attempts = 1;
    config.state.path = dir.path().join("state").join("monitor_state.json");
    config
}

fn read_state_json(config: &WatchConfig) -> serde_json::Value {
    let raw = std::fs::read_to_string(&config.state.path).unwrap();
    serde_json::from_str(&raw).unwrap()
}

#[tokio::test]
async fn test_healthy_cycle_persists_closed_breaker() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(200))
        .mount(&server)
        .await;

    let dir = TempDir::new().unwrap();
    let config = config(&dir);
    let engine = CheckEngine::new(&config).unwrap();
    let targets = vec![Target::new("A", server.uri())];

    let report = engine
        .run_cycle(&targets, &StaticCredentials::new())
        .await
        .unwrap();
    assert_eq!(report.results.len(), 1);
    assert_eq!(report.results[0].status, CheckStatus::Success);

    let json = read_state_json(&config);
    assert_eq!(json["targets"]["A"]["breaker_state"]["consecutive_failures"], 0);
    assert_eq!(json["targets"]["A"]["breaker_state"]["phase"], "closed");
    assert_eq!(json["global"]["total_cycles"], 1);
}

#[tokio::test]
async fn test_failing_target_opens_breaker_and_stops_requests() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(500))
        .mount(&server)
        .await;

    let dir = TempDir::new().unwrap();
    let mut config = config(&dir);
    config.breaker.failure_threshold = 2;
    let engine = CheckEngine::new(&config).unwrap();
    let targets = vec![Target::new("A", server.uri())];
    let credentials = StaticCredentials::new();

    engine.run_cycle(&targets, &credentials).await.unwrap();
    let second = engine.run_cycle(&targets, &credentials).await.unwrap();
    assert_eq!(second.transitions.len(), 1);
    assert_eq!(second.transitions[0].transition.to, BreakerPhase::Open);

    let third = engine.run_cycle(&targets, &credentials).await.unwrap();
    assert_eq!(third.skipped, vec!["A".to_string()]);
    assert_eq!(server.received_requests().await.unwrap().len(), 2);

    let stats = engine.get_statistics("A").unwrap();
    assert_eq!(stats.total_checks, 2);
    assert_eq!(stats.total_failures, 2);
    assert_eq!(stats.availability_pct, 0.0);

    // Breaker state survives a restart
    drop(engine);
    let restarted = CheckEngine::new(&config).unwrap();
    assert_eq!(
        restarted.get_breaker_state("A").unwrap().phase(),
        BreakerPhase::Open
    );
    let fourth = restarted.run_cycle(&targets, &credentials).await.unwrap();
    assert_eq!(fourth.skipped, vec!["A".to_string()]);
}

#[tokio::test]
async fn test_full_login_flow_through_engine() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/"))
        .respond_with(ResponseTemplate::new(200))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/login"))
        .respond_with(ResponseTemplate::new(200).set_body_string(LOGIN_PAGE))
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/login"))
        .respond_with(
            ResponseTemplate::new(200)
                .insert_header("Set-Cookie", "sid=live; Path=/")
                .set_body_string("<a href=\"/logout\">Sign out</a>"),
        )
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/account/alerts"))
        .respond_with(ResponseTemplate::new(200).set_body_string("3 alerts"))
        .mount(&server)
        .await;

    let dir = TempDir::new().unwrap();
    let config = config(&dir);
    let engine = CheckEngine::new(&config).unwrap();
    let targets = vec![login_target("portal", &server.uri())];
    let credentials = StaticCredentials::new().with("portal", "alice", "s3cret");

    let report = engine.run_cycle(&targets, &credentials).await.unwrap();

    let outcomes: Vec<_> = report.results.iter().map(|r| (r.kind, r.status)).collect();
    assert_eq!(
        outcomes,
        vec![
            (CheckKind::Uptime, CheckStatus::Success),
            (CheckKind::Authentication, CheckStatus::Success),
            (CheckKind::ProtectedResource, CheckStatus::Success),
        ]
    );
    // The session was reused: one login POST for the whole cycle
    let posts = server
        .received_requests()
        .await
        .unwrap()
        .iter()
        .filter(|r| r.method.as_str() == "POST")
        .count();
    assert_eq!(posts, 1);
}

#[tokio::test]
async fn test_missing_credentials_skip_protected_check() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(200))
        .mount(&server)
        .await;

    let dir = TempDir::new().unwrap();
    let config = config(&dir);
    let engine = CheckEngine::new(&config).unwrap();
    let targets = vec![login_target("portal", &server.uri())];

    let report = engine
        .run_cycle(&targets, &StaticCredentials::new())
        .await
        .unwrap();

    let kinds: Vec<_> = report.results.iter().map(|r| r.kind).collect();
    assert_eq!(kinds, vec![CheckKind::Uptime, CheckKind::Authentication]);
    assert_eq!(report.results[1].status, CheckStatus::Failure);
    // Only the uptime request reached the server
    assert_eq!(server.received_requests().await.unwrap().len(), 1);
}

#[tokio::test]
async fn test_blocked_target_recorded_as_failure() {
    let server = MockServer::start().await;
    let dir = TempDir::new().unwrap();
    let mut config = config(&dir);
    config.guard = Default::default();
    let engine = CheckEngine::new(&config).unwrap();
    let targets = vec![Target::new("internal", server.uri())];

    let report = engine
        .run_cycle(&targets, &StaticCredentials::new())
        .await
        .unwrap();

    assert_eq!(report.failures(), 1);
    assert!(server.received_requests().await.unwrap().is_empty());
    let history = engine.get_history("internal", CheckKind::Uptime, 5);
    assert_eq!(history.len(), 1);
    assert!(history[0].is_failure());
}

#[tokio::test]
async fn test_concurrent_targets_in_one_cycle() {
    let first = MockServer::start().await;
    let second = MockServer::start().await;
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(200))
        .mount(&first)
        .await;
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(404))
        .mount(&second)
        .await;

    let dir = TempDir::new().unwrap();
    let config = config(&dir);
    let engine = CheckEngine::new(&config).unwrap();
    let targets = vec![
        Target::new("up", first.uri()),
        Target::new("down", second.uri()),
    ];

    let report = engine
        .run_cycle(&targets, &StaticCredentials::new())
        .await
        .unwrap();
    assert_eq!(report.results.len(), 2);
    assert_eq!(report.failures(), 1);

    let persisted = StateStore::new(config.state.path.clone()).load();
    assert_eq!(persisted.targets.len(), 2);
    assert_eq!(persisted.global.total_checks, 2);
}
