//! Integration tests for the guarded executor against mock HTTP servers.

mod common;

use async_trait::async_trait;
use common::{executor_with, loopback_executor, loopback_guard};
use reqwest::cookie::Jar;
use sitewatch::executor::{BodyLimit, ExecutorError, GuardedExecutor, HttpConfig, Request};
use sitewatch::guard::{BlockedRange, GuardConfig, HostResolver, Rejection, UrlValidator};
use std::io;
use std::net::{IpAddr, Ipv4Addr};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use url::Url;
use wiremock::matchers::{header, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn url(server: &MockServer, p: &str) -> Url {
    Url::parse(&format!("{}{}", server.uri(), p)).unwrap()
}

#[tokio::test]
async fn test_default_policy_blocks_loopback_without_connecting() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(200))
        .mount(&server)
        .await;

    let executor = executor_with(&GuardConfig::default(), HttpConfig::default());
    let err = executor
        .execute(Request::get(url(&server, "/")))
        .await
        .unwrap_err();

    match err {
        ExecutorError::GuardRejected(Rejection::BlockedAddress { range, .. }) => {
            assert_eq!(range, BlockedRange::Loopback)
        }
        other => panic!("expected loopback rejection, got {:?}", other),
    }
    assert!(server.received_requests().await.unwrap().is_empty());
}

/// Answers with a public address first, then with loopback.
#[derive(Default)]
struct RebindingResolver {
    calls: AtomicUsize,
}

#[async_trait]
impl HostResolver for RebindingResolver {
    async fn resolve(&self, _host: &str) -> io::Result<Vec<IpAddr>> {
        let addr = if self.calls.fetch_add(1, Ordering::SeqCst) == 0 {
            Ipv4Addr::new(93, 184, 216, 34)
        } else {
            Ipv4Addr::LOCALHOST
        };
        Ok(vec![IpAddr::V4(addr)])
    }
}

#[tokio::test]
async fn test_dns_rebinding_caught_at_connect_time() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(200))
        .mount(&server)
        .await;

    let resolver = Arc::new(RebindingResolver::default());
    let validator = UrlValidator::with_resolver(&GuardConfig::default(), resolver.clone());
    let executor = GuardedExecutor::new(HttpConfig::default(), Arc::new(validator)).unwrap();
    let port = server.address().port();
    let target = Url::parse(&format!("http://rebind.example.com:{}/", port)).unwrap();

    let err = executor.execute(Request::get(target)).await.unwrap_err();

    match err {
        ExecutorError::GuardRejected(Rejection::BlockedAddress { range, .. }) => {
            assert_eq!(range, BlockedRange::Loopback)
        }
        other => panic!("expected loopback rejection, got {:?}", other),
    }
    assert!(resolver.calls.load(Ordering::SeqCst) >= 2);
    assert!(server.received_requests().await.unwrap().is_empty());
}

#[tokio::test]
async fn test_relative_redirect_followed() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/app/old"))
        .respond_with(ResponseTemplate::new(301).insert_header("Location", "new"))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/app/new"))
        .respond_with(ResponseTemplate::new(200).set_body_string("done"))
        .mount(&server)
        .await;

    let response = loopback_executor()
        .execute(Request::get(url(&server, "/app/old")))
        .await
        .unwrap();

    assert_eq!(response.status, 200);
    assert_eq!(response.redirects, 1);
    assert_eq!(response.final_url.path(), "/app/new");
    assert_eq!(response.text(), "done");
}

#[tokio::test]
async fn test_redirect_to_private_address_blocked() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/bounce"))
        .respond_with(
            ResponseTemplate::new(302).insert_header("Location", "http://10.0.0.1/admin"),
        )
        .mount(&server)
        .await;

    let err = loopback_executor()
        .execute(Request::get(url(&server, "/bounce")))
        .await
        .unwrap_err();

    assert!(matches!(
        err,
        ExecutorError::GuardRejected(Rejection::BlockedAddress {
            range: BlockedRange::Private,
            ..
        })
    ));
    assert_eq!(server.received_requests().await.unwrap().len(), 1);
}

#[tokio::test]
async fn test_redirect_to_metadata_blocked_even_when_allowed() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .respond_with(
            ResponseTemplate::new(302)
                .insert_header("Location", "http://169.254.169.254/latest/meta-data/"),
        )
        .mount(&server)
        .await;

    let mut guard = loopback_guard();
    guard.allowed_networks.push("169.254.0.0/16".parse().unwrap());
    let err = executor_with(&guard, HttpConfig::default())
        .execute(Request::get(url(&server, "/")))
        .await
        .unwrap_err();

    assert!(matches!(
        err,
        ExecutorError::GuardRejected(Rejection::BlockedAddress {
            range: BlockedRange::CloudMetadata,
            ..
        })
    ));
}

#[tokio::test]
async fn test_too_many_redirects() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/loop"))
        .respond_with(ResponseTemplate::new(302).insert_header("Location", "/loop"))
        .mount(&server)
        .await;

    let err = loopback_executor()
        .execute(Request::get(url(&server, "/loop")).max_redirects(2))
        .await
        .unwrap_err();

    assert_eq!(err, ExecutorError::TooManyRedirects(2));
    assert_eq!(server.received_requests().await.unwrap().len(), 3);
}

#[tokio::test]
async fn test_redirect_not_followed_when_disabled() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(302).insert_header("Location", "/elsewhere"))
        .mount(&server)
        .await;

    let response = loopback_executor()
        .execute(Request::get(url(&server, "/")).no_redirects())
        .await
        .unwrap();

    assert_eq!(response.status, 302);
    assert_eq!(response.redirects, 0);
}

#[tokio::test]
async fn test_body_over_limit_rejected() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(200).set_body_string("x".repeat(4096)))
        .mount(&server)
        .await;

    let err = loopback_executor()
        .execute(Request::get(url(&server, "/")).body_limit(BodyLimit::Bytes(1024)))
        .await
        .unwrap_err();

    assert_eq!(err, ExecutorError::SizeExceeded { limit: 1024 });
    assert!(!err.is_transient());
}

#[tokio::test]
async fn test_body_at_limit_accepted() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(200).set_body_string("x".repeat(1024)))
        .mount(&server)
        .await;

    let response = loopback_executor()
        .execute(Request::get(url(&server, "/")).body_limit(BodyLimit::Bytes(1024)))
        .await
        .unwrap();

    assert_eq!(response.body.len(), 1024);
}

#[tokio::test]
async fn test_slow_response_times_out() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(200).set_delay(Duration::from_secs(3)))
        .mount(&server)
        .await;

    let err = loopback_executor()
        .execute(Request::get(url(&server, "/")).timeout(Duration::from_millis(300)))
        .await
        .unwrap_err();

    assert!(err.is_timeout());
    assert!(err.is_transient());
}

#[tokio::test]
async fn test_session_cookies_carried_across_redirect() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/set"))
        .respond_with(
            ResponseTemplate::new(302)
                .insert_header("Location", "/check")
                .insert_header("Set-Cookie", "sid=abc123; Path=/"),
        )
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/check"))
        .and(header("cookie", "sid=abc123"))
        .respond_with(ResponseTemplate::new(200).set_body_string("has session"))
        .mount(&server)
        .await;

    let jar = Arc::new(Jar::default());
    let executor = loopback_executor();
    let response = executor
        .execute(Request::get(url(&server, "/set")).session(Arc::clone(&jar)))
        .await
        .unwrap();
    assert_eq!(response.status, 200);

    // The same jar keeps the session for later requests
    let again = executor
        .execute(Request::get(url(&server, "/check")).session(jar))
        .await
        .unwrap();
    assert_eq!(again.text(), "has session");
}

#[tokio::test]
async fn test_requests_without_session_send_no_cookies() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/set"))
        .respond_with(
            ResponseTemplate::new(200).insert_header("Set-Cookie", "sid=abc123; Path=/"),
        )
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/check"))
        .respond_with(ResponseTemplate::new(200))
        .mount(&server)
        .await;

    let executor = loopback_executor();
    executor
        .execute(Request::get(url(&server, "/set")))
        .await
        .unwrap();
    executor
        .execute(Request::get(url(&server, "/check")))
        .await
        .unwrap();

    let requests = server.received_requests().await.unwrap();
    assert!(requests[1].headers.get("cookie").is_none());
}

#[tokio::test]
async fn test_shutdown_rejects_new_requests() {
    let server = MockServer::start().await;
    let executor = loopback_executor();
    executor.shutdown();

    let err = executor
        .execute(Request::get(url(&server, "/")))
        .await
        .unwrap_err();
    assert_eq!(err, ExecutorError::Closed);
}
