//! Fetch session behaviour against a mock HTTP server.

use lnwcrawl::config::SessionConfig;
use lnwcrawl::error::{FetchError, LastOutcome};
use lnwcrawl::session::Session;
use reqwest::Url;
use reqwest::cookie::Jar;
use scraper::Selector;
use std::sync::Arc;
use std::time::{Duration, Instant};
use wiremock::matchers::{header, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn session_config(retries: u32) -> SessionConfig {
    SessionConfig {
        wait_sec: 0.0,
        wait_random_ms: 0,
        retries,
        retry_wait_sec: 0.0,
        timeout_sec: 5.0,
        ..SessionConfig::default()
    }
}

fn session(config: &SessionConfig) -> Session {
    Session::new(config, Arc::new(Jar::default())).unwrap()
}

fn html(body: &str) -> ResponseTemplate {
    ResponseTemplate::new(200)
        .set_body_string(format!("<html><head></head><body>{}</body></html>", body))
        .insert_header("content-type", "text/html")
}

#[tokio::test]
async fn test_fetch_document_uses_request_url_as_base() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/novel/foo"))
        .respond_with(html("<h1>Hello</h1>"))
        .expect(1)
        .mount(&server)
        .await;

    let url = format!("{}/novel/foo", server.uri());
    let doc = session(&session_config(0)).fetch_document(&url).await.unwrap();

    assert_eq!(doc.base, Url::parse(&url).unwrap());
    assert_eq!(
        doc.resolve("bar").unwrap().as_str(),
        format!("{}/novel/bar", server.uri())
    );
}

#[tokio::test]
async fn test_fetch_document_honours_base_href() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/page"))
        .respond_with(ResponseTemplate::new(200).set_body_string(
            r#"<html><head><base href="/mirror/"></head><body></body></html>"#,
        ))
        .mount(&server)
        .await;

    let doc = session(&session_config(0))
        .fetch_document(&format!("{}/page", server.uri()))
        .await
        .unwrap();

    assert_eq!(doc.base.as_str(), format!("{}/mirror/", server.uri()));
}

#[tokio::test]
async fn test_not_found_fails_on_first_attempt() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(404))
        .expect(1)
        .mount(&server)
        .await;

    let url = format!("{}/missing", server.uri());
    let err = session(&session_config(3))
        .fetch_document(&url)
        .await
        .err()
        .unwrap();

    assert!(matches!(
        err,
        FetchError::PermanentStatus { status: 404, .. }
    ));
    assert_eq!(err.to_string(), format!("failed completely 404 {}", url));
}

#[tokio::test]
async fn test_every_instant_fail_status_short_circuits() {
    for status in [400, 401, 402, 403, 410, 412, 414, 421, 505] {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(status))
            .expect(1)
            .mount(&server)
            .await;

        let err = session(&session_config(2))
            .fetch_bytes(&server.uri())
            .await
            .unwrap_err();
        assert!(
            matches!(err, FetchError::PermanentStatus { status: s, .. } if s == status),
            "status {} was retried",
            status
        );
    }
}

#[tokio::test]
async fn test_retry_bound_on_server_errors() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(503))
        .expect(3)
        .mount(&server)
        .await;

    let url = format!("{}/busy", server.uri());
    let err = session(&session_config(2)).fetch_bytes(&url).await.unwrap_err();

    match err {
        FetchError::ExhaustedRetries { last, attempts, .. } => {
            assert_eq!(last, LastOutcome::Status(503));
            assert_eq!(attempts, 3);
        }
        other => panic!("unexpected error: {other}"),
    }
}

#[tokio::test]
async fn test_retry_bound_on_timeouts() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .respond_with(html("slow").set_delay(Duration::from_secs(3)))
        .expect(2)
        .mount(&server)
        .await;

    let mut config = session_config(1);
    config.timeout_sec = 0.2;

    let err = session(&config).fetch_bytes(&server.uri()).await.unwrap_err();
    assert!(matches!(
        err,
        FetchError::ExhaustedRetries {
            last: LastOutcome::Connection,
            attempts: 2,
            ..
        }
    ));
    assert!(err.to_string().starts_with("failed connection "));
}

#[tokio::test]
async fn test_connection_refused_is_retried() {
    let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
    let port = listener.local_addr().unwrap().port();
    drop(listener);

    let err = session(&session_config(2))
        .fetch_bytes(&format!("http://127.0.0.1:{}/", port))
        .await
        .unwrap_err();

    assert!(matches!(
        err,
        FetchError::ExhaustedRetries {
            last: LastOutcome::Connection,
            attempts: 3,
            ..
        }
    ));
}

#[tokio::test]
async fn test_recovers_after_transient_status() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(500))
        .up_to_n_times(1)
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(200).set_body_string("ok"))
        .expect(1)
        .mount(&server)
        .await;

    let fetched = session(&session_config(1))
        .fetch_bytes(&server.uri())
        .await
        .unwrap();

    assert_eq!(fetched.status, 200);
    assert_eq!(fetched.body, b"ok");
}

#[tokio::test]
async fn test_duplicate_url_is_rejected_without_request() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .respond_with(html("once"))
        .expect(1)
        .mount(&server)
        .await;

    let mut config = session_config(0);
    config.dedupe = true;
    let mut session = session(&config);
    let url = format!("{}/chapter", server.uri());

    session.fetch_document(&url).await.unwrap();
    assert!(session.has_visited(&url));

    let err = session.fetch_document(&url).await.err().unwrap();
    assert!(matches!(err, FetchError::Duplicate(ref u) if *u == url));
}

#[tokio::test]
async fn test_without_dedupe_urls_can_repeat() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .respond_with(html("twice"))
        .expect(2)
        .mount(&server)
        .await;

    let mut session = session(&session_config(0));
    let url = format!("{}/chapter", server.uri());

    session.fetch_document(&url).await.unwrap();
    session.fetch_document(&url).await.unwrap();
    assert!(!session.has_visited(&url));
}

#[tokio::test]
async fn test_identity_headers_are_sent() {
    let server = MockServer::start().await;
    let base = Url::parse(&server.uri()).unwrap();

    Mock::given(method("GET"))
        .and(header("user-agent", "test-agent/1.0"))
        .and(header("cookie", "cf_clearance=abc"))
        .respond_with(html("welcome"))
        .expect(1)
        .mount(&server)
        .await;

    let jar = Arc::new(Jar::default());
    jar.add_cookie_str("cf_clearance=abc; Path=/", &base);

    let mut config = session_config(0);
    config.user_agent = "test-agent/1.0".to_string();
    let mut session = Session::new(&config, jar).unwrap();

    session.fetch_bytes(&server.uri()).await.unwrap();
}

#[tokio::test]
async fn test_response_cookies_are_returned() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .respond_with(html("cookies").insert_header("set-cookie", "token=xyz; Path=/"))
        .mount(&server)
        .await;

    let (doc, cookies) = session(&session_config(0))
        .fetch_document_with_cookies(&server.uri())
        .await
        .unwrap();

    assert_eq!(doc.base, Url::parse(&server.uri()).unwrap());
    assert_eq!(cookies.get("token").map(String::as_str), Some("xyz"));
}

#[tokio::test]
async fn test_invalid_url() {
    let err = session(&session_config(0))
        .fetch_bytes("not a url")
        .await
        .unwrap_err();
    assert!(matches!(err, FetchError::InvalidUrl { .. }));
}

#[tokio::test]
async fn test_retries_skip_pacing() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(503))
        .expect(3)
        .mount(&server)
        .await;

    let mut config = session_config(2);
    config.wait_sec = 0.3;

    let started = Instant::now();
    let err = session(&config).fetch_bytes(&server.uri()).await.unwrap_err();
    let elapsed = started.elapsed();

    assert!(matches!(err, FetchError::ExhaustedRetries { attempts: 3, .. }));
    assert!(elapsed >= Duration::from_millis(300), "elapsed {:?}", elapsed);
    assert!(elapsed < Duration::from_millis(600), "elapsed {:?}", elapsed);
}

#[tokio::test]
async fn test_first_attempt_waits_within_jitter_bounds() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .respond_with(html("paced"))
        .expect(1)
        .mount(&server)
        .await;

    let mut config = session_config(0);
    config.wait_sec = 0.1;
    config.wait_random_ms = 200;

    let started = Instant::now();
    session(&config).fetch_bytes(&server.uri()).await.unwrap();
    let elapsed = started.elapsed();

    // Upper bound allows for the round trip to the local mock server.
    assert!(elapsed >= Duration::from_millis(100), "elapsed {:?}", elapsed);
    assert!(elapsed < Duration::from_millis(300 + 150), "elapsed {:?}", elapsed);
}

#[tokio::test]
async fn test_document_decoded_with_declared_charset() {
    let server = MockServer::start().await;
    let mut body = b"<html><head></head><body><h1>caf".to_vec();
    body.push(0xe9);
    body.extend_from_slice(b"</h1></body></html>");
    Mock::given(method("GET"))
        .respond_with(
            ResponseTemplate::new(200).set_body_raw(body, "text/html; charset=windows-1252"),
        )
        .mount(&server)
        .await;

    let mut session = session(&session_config(0));
    let fetched = session.fetch_bytes(&server.uri()).await.unwrap();
    assert_eq!(fetched.charset.as_deref(), Some("windows-1252"));

    let doc = session.fetch_document(&server.uri()).await.unwrap();
    let h1 = Selector::parse("h1").unwrap();
    let title: String = doc.html.select(&h1).next().unwrap().text().collect();
    assert_eq!(title, "caf\u{e9}");
}
