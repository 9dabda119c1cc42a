//! End-to-end scrape sessions against a mock server

use crate::common::{html, listing_page, mount_page, test_target};
use async_trait::async_trait;
use pagesift::config::RendererConfig;
use pagesift::crawler::{
    Document, DynamicRenderer, RateLimiter, RenderError, ScrapeError, ScrapeSession,
    SessionStatus, WebDriverRenderer,
};
use pagesift::state::SessionState;
use pagesift::table::Value;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use url::Url;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

const SHELL_PAGE: &str = r#"<html><head><script src="/app.js"></script></head>
<body><div id="root"></div></body></html>"#;

#[tokio::test]
async fn test_single_page_session() {
    let server = MockServer::start().await;
    mount_page(
        &server,
        "/list",
        listing_page(&[("Tea", "3"), ("Coffee", "")], None),
        1,
    )
    .await;

    let outcome = ScrapeSession::new(test_target(&server, "/list"))
        .unwrap()
        .run()
        .await;

    assert!(outcome.is_completed());
    assert_eq!(outcome.stats.pages_fetched, 1);
    assert_eq!(outcome.stats.fetch_attempts, 1);
    assert_eq!(outcome.table.columns(), ["name", "price"]);
    assert_eq!(outcome.table.get(0, "name"), Some(&Value::Text("Tea".to_string())));
    assert_eq!(outcome.table.get(1, "price"), None);
    assert!(outcome.warnings.is_empty());
}

#[tokio::test]
async fn test_retries_then_succeeds() {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/flaky"))
        .respond_with(ResponseTemplate::new(503))
        .up_to_n_times(2)
        .expect(2)
        .mount(&server)
        .await;
    mount_page(&server, "/flaky", listing_page(&[("Tea", "3")], None), 1).await;

    let outcome = ScrapeSession::new(test_target(&server, "/flaky"))
        .unwrap()
        .run()
        .await;

    assert!(outcome.is_completed());
    assert_eq!(outcome.stats.retries, 2);
    assert_eq!(outcome.stats.fetch_attempts, 3);
    assert_eq!(outcome.attempts.len(), 3);
    assert_eq!(outcome.attempts[0].status_code, Some(503));
    assert_eq!(outcome.attempts[2].attempt, 3);
    assert_eq!(outcome.table.row_count(), 1);
}

#[tokio::test]
async fn test_retries_exhausted() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/down"))
        .respond_with(ResponseTemplate::new(500))
        .expect(2)
        .mount(&server)
        .await;

    let target = pagesift::config::Target {
        max_retries: 1,
        ..test_target(&server, "/down")
    };
    let outcome = ScrapeSession::new(target).unwrap().run().await;

    match outcome.status {
        SessionStatus::Failed(ScrapeError::RetriesExhausted { attempts, .. }) => {
            assert_eq!(attempts, 2)
        }
        other => panic!("unexpected status {:?}", other),
    }
    assert_eq!(outcome.stats.retries, 1);
    assert!(outcome.table.is_empty());
}

#[tokio::test]
async fn test_page_ceiling() {
    let server = MockServer::start().await;
    for i in 1..=10u64 {
        let next = format!("/page/{}", i + 1);
        let expected = if i <= 3 { 1 } else { 0 };
        mount_page(
            &server,
            &format!("/page/{}", i),
            listing_page(&[("item", "1"), ("other", "2")], Some(&next)),
            expected,
        )
        .await;
    }

    let target = pagesift::config::Target {
        max_pages: 3,
        ..test_target(&server, "/page/1")
    };
    let outcome = ScrapeSession::new(target).unwrap().run().await;

    assert!(outcome.is_completed());
    assert_eq!(outcome.stats.pages_fetched, 3);
    assert_eq!(outcome.stats.fetch_attempts, 3);
    assert_eq!(outcome.table.row_count(), 6);
}

#[tokio::test]
async fn test_self_link_is_not_refetched() {
    let server = MockServer::start().await;
    mount_page(
        &server,
        "/list",
        listing_page(&[("Tea", "3")], Some("/list#top")),
        1,
    )
    .await;

    let outcome = ScrapeSession::new(test_target(&server, "/list"))
        .unwrap()
        .run()
        .await;

    assert!(outcome.is_completed());
    assert_eq!(outcome.stats.pages_fetched, 1);
}

#[tokio::test]
async fn test_pagination_cycle_stops() {
    let server = MockServer::start().await;
    mount_page(&server, "/a", listing_page(&[("a", "1")], Some("/b")), 1).await;
    mount_page(&server, "/b", listing_page(&[("b", "2")], Some("/a")), 1).await;

    let outcome = ScrapeSession::new(test_target(&server, "/a"))
        .unwrap()
        .run()
        .await;

    assert!(outcome.is_completed());
    assert_eq!(outcome.stats.pages_fetched, 2);
    assert_eq!(outcome.table.row_count(), 2);
}

#[tokio::test]
async fn test_permanent_failure_keeps_partial_table() {
    let server = MockServer::start().await;
    mount_page(
        &server,
        "/page/1",
        listing_page(&[("Tea", "3"), ("Coffee", "4")], Some("/page/2")),
        1,
    )
    .await;
    Mock::given(method("GET"))
        .and(path("/page/2"))
        .respond_with(ResponseTemplate::new(404))
        .expect(1)
        .mount(&server)
        .await;

    let outcome = ScrapeSession::new(test_target(&server, "/page/1"))
        .unwrap()
        .run()
        .await;

    assert!(matches!(
        outcome.status,
        SessionStatus::Failed(ScrapeError::PermanentFailure { .. })
    ));
    assert_eq!(outcome.stats.pages_fetched, 1);
    assert_eq!(outcome.table.row_count(), 2);
    assert_eq!(outcome.stats.retries, 0);
}

#[tokio::test]
async fn test_cancel_mid_fetch() {
    let server = MockServer::start().await;
    mount_page(
        &server,
        "/page/1",
        listing_page(&[("Tea", "3"), ("Coffee", "4")], Some("/page/2")),
        1,
    )
    .await;
    Mock::given(method("GET"))
        .and(path("/page/2"))
        .respond_with(
            html(listing_page(&[("Late", "9")], None)).set_delay(Duration::from_secs(5)),
        )
        .mount(&server)
        .await;

    let started = Instant::now();
    let mut handle = ScrapeSession::start(test_target(&server, "/page/1")).unwrap();
    let mut progress = handle.progress();

    let mut last_state = None;
    while let Some(update) = progress.next().await {
        if update.state == SessionState::Fetching && update.pages_fetched == 1 {
            handle.cancel();
        }
        last_state = Some(update.state);
    }
    let outcome = handle.join().await;

    assert!(matches!(outcome.status, SessionStatus::Cancelled));
    assert_eq!(last_state, Some(SessionState::Cancelled));
    assert_eq!(outcome.stats.pages_fetched, 1);
    assert_eq!(outcome.table.row_count(), 2);
    assert!(outcome.table.rows().iter().all(|row| row[0] != Some(Value::Text("Late".to_string()))));
    assert!(started.elapsed() < Duration::from_secs(4));
}

#[tokio::test]
async fn test_progress_stream_ends_after_completion() {
    let server = MockServer::start().await;
    mount_page(&server, "/1", listing_page(&[("a", "1")], Some("/2")), 1).await;
    mount_page(&server, "/2", listing_page(&[("b", "2")], None), 1).await;

    let mut handle = ScrapeSession::start(test_target(&server, "/1")).unwrap();
    let mut progress = handle.progress();

    let mut states = Vec::new();
    while let Some(update) = progress.next().await {
        states.push(update.state);
    }
    assert!(progress.next().await.is_none());

    assert_eq!(states.first(), Some(&SessionState::Fetching));
    assert_eq!(states.last(), Some(&SessionState::Completed));
    assert_eq!(
        states
            .iter()
            .filter(|s| **s == SessionState::Extracting)
            .count(),
        2
    );

    let outcome = handle.join().await;
    assert!(outcome.is_completed());
    assert_eq!(outcome.table.row_count(), 2);
}

#[tokio::test]
async fn test_robots_disallowed_page_fails() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/robots.txt"))
        .respond_with(ResponseTemplate::new(200).set_body_string("User-agent: *\nDisallow: /private"))
        .expect(1)
        .mount(&server)
        .await;
    mount_page(&server, "/private/list", listing_page(&[("a", "1")], None), 0).await;

    let target = pagesift::config::Target {
        respect_robots_txt: true,
        ..test_target(&server, "/private/list")
    };
    let outcome = ScrapeSession::new(target).unwrap().run().await;

    assert!(matches!(
        outcome.status,
        SessionStatus::Failed(ScrapeError::RobotsDenied { .. })
    ));
    assert_eq!(outcome.stats.fetch_attempts, 0);
}

#[tokio::test]
async fn test_robots_fetched_once_per_session() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/robots.txt"))
        .respond_with(ResponseTemplate::new(200).set_body_string("User-agent: *\nDisallow: /admin"))
        .expect(1)
        .mount(&server)
        .await;
    mount_page(&server, "/1", listing_page(&[("a", "1")], Some("/2")), 1).await;
    mount_page(&server, "/2", listing_page(&[("b", "2")], None), 1).await;

    let target = pagesift::config::Target {
        respect_robots_txt: true,
        ..test_target(&server, "/1")
    };
    let outcome = ScrapeSession::new(target).unwrap().run().await;

    assert!(outcome.is_completed());
    assert_eq!(outcome.stats.pages_fetched, 2);
}

#[tokio::test]
async fn test_oversized_crawl_delay_is_clamped() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/robots.txt"))
        .respond_with(ResponseTemplate::new(200).set_body_string("User-agent: *\nCrawl-delay: 1e30"))
        .expect(1)
        .mount(&server)
        .await;
    mount_page(&server, "/list", listing_page(&[("a", "1"), ("b", "2")], None), 1).await;

    let target = pagesift::config::Target {
        respect_robots_txt: true,
        ..test_target(&server, "/list")
    };
    let host = pagesift::url::host_key(&Url::parse(&target.url).unwrap()).unwrap();
    let limiter = RateLimiter::new(Duration::ZERO);
    let handle = ScrapeSession::new(target)
        .unwrap()
        .with_rate_limiter(limiter.clone())
        .spawn();
    let outcome = handle.join().await;

    assert!(outcome.is_completed(), "status: {}", outcome.status.as_str());
    assert_eq!(outcome.table.row_count(), 2);
    assert_eq!(limiter.delay_for(&host).await, pagesift::robots::MAX_CRAWL_DELAY);
}

#[tokio::test]
async fn test_dynamic_target_without_renderer_fails() {
    let server = MockServer::start().await;
    mount_page(&server, "/app", listing_page(&[("a", "1")], None), 1).await;

    let target = pagesift::config::Target {
        dynamic: true,
        ..test_target(&server, "/app")
    };
    let outcome = ScrapeSession::new(target).unwrap().run().await;

    assert!(matches!(
        outcome.status,
        SessionStatus::Failed(ScrapeError::Render(RenderError::EnvironmentUnavailable(_)))
    ));
    assert_eq!(outcome.stats.pages_fetched, 0);
    assert!(outcome.table.is_empty());
}

#[tokio::test]
async fn test_script_shell_without_renderer_passes_through() {
    let server = MockServer::start().await;
    mount_page(&server, "/app", SHELL_PAGE.to_string(), 1).await;

    let outcome = ScrapeSession::new(test_target(&server, "/app"))
        .unwrap()
        .run()
        .await;

    assert!(outcome.is_completed());
    assert_eq!(outcome.stats.renders, 0);
    assert!(outcome.warnings.iter().any(|w| w.contains("no renderer")));
    assert!(outcome.warnings.iter().any(|w| w == "no records extracted"));
}

struct FakeRenderer {
    html: String,
    calls: AtomicU32,
}

#[async_trait]
impl DynamicRenderer for FakeRenderer {
    async fn render(&self, url: &Url, _timeout: Duration) -> Result<Document, RenderError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Ok(Document::new(url.clone(), self.html.clone()))
    }
}

struct BrokenRenderer;

#[async_trait]
impl DynamicRenderer for BrokenRenderer {
    async fn render(&self, url: &Url, timeout: Duration) -> Result<Document, RenderError> {
        Err(RenderError::Timeout {
            url: url.to_string(),
            timeout,
        })
    }
}

#[tokio::test]
async fn test_script_shell_is_rendered() {
    let server = MockServer::start().await;
    mount_page(&server, "/app", SHELL_PAGE.to_string(), 1).await;

    let renderer = Arc::new(FakeRenderer {
        html: listing_page(&[("Rendered", "1")], None),
        calls: AtomicU32::new(0),
    });
    let outcome = ScrapeSession::new(test_target(&server, "/app"))
        .unwrap()
        .with_renderer(renderer.clone())
        .run()
        .await;

    assert!(outcome.is_completed());
    assert_eq!(renderer.calls.load(Ordering::SeqCst), 1);
    assert_eq!(outcome.stats.renders, 1);
    assert_eq!(
        outcome.table.get(0, "name"),
        Some(&Value::Text("Rendered".to_string()))
    );
}

#[tokio::test]
async fn test_static_page_skips_renderer() {
    let server = MockServer::start().await;
    mount_page(&server, "/list", listing_page(&[("Tea", "3")], None), 1).await;

    let renderer = Arc::new(FakeRenderer {
        html: String::new(),
        calls: AtomicU32::new(0),
    });
    let outcome = ScrapeSession::new(test_target(&server, "/list"))
        .unwrap()
        .with_renderer(renderer.clone())
        .run()
        .await;

    assert!(outcome.is_completed());
    assert_eq!(renderer.calls.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn test_render_failure_fails_session() {
    let server = MockServer::start().await;
    mount_page(&server, "/app", SHELL_PAGE.to_string(), 1).await;

    let outcome = ScrapeSession::new(test_target(&server, "/app"))
        .unwrap()
        .with_renderer(Arc::new(BrokenRenderer))
        .run()
        .await;

    assert!(matches!(
        outcome.status,
        SessionStatus::Failed(ScrapeError::Render(RenderError::Timeout { .. }))
    ));
    assert_eq!(outcome.stats.renders, 1);
}

#[tokio::test]
async fn test_shared_limiter_spaces_sessions_on_one_host() {
    let server = MockServer::start().await;
    mount_page(&server, "/solo", listing_page(&[("a", "1")], None), 2).await;

    let limiter = RateLimiter::new(Duration::from_millis(300));
    let first = ScrapeSession::new(test_target(&server, "/solo"))
        .unwrap()
        .with_rate_limiter(limiter.clone());
    let second = ScrapeSession::new(test_target(&server, "/solo"))
        .unwrap()
        .with_rate_limiter(limiter.clone());

    let started = Instant::now();
    let (a, b) = tokio::join!(first.run(), second.run());

    assert!(a.is_completed());
    assert!(b.is_completed());
    assert!(started.elapsed() >= Duration::from_millis(300));
}

#[tokio::test]
async fn test_custom_headers_are_sent() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/list"))
        .and(wiremock::matchers::header("x-api-key", "secret"))
        .respond_with(html(listing_page(&[("Tea", "3")], None)))
        .expect(1)
        .mount(&server)
        .await;

    let mut target = test_target(&server, "/list");
    target
        .headers
        .insert("X-Api-Key".to_string(), "secret".to_string());
    let outcome = ScrapeSession::new(target).unwrap().run().await;

    assert!(outcome.is_completed());
}

#[tokio::test]
async fn test_cancel_during_render_closes_browser_session() {
    let server = MockServer::start().await;
    mount_page(&server, "/app", SHELL_PAGE.to_string(), 1).await;

    let driver = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/session"))
        .respond_with(ResponseTemplate::new(200).set_body_json(
            serde_json::json!({ "value": { "sessionId": "s1", "capabilities": {} } }),
        ))
        .expect(1)
        .mount(&driver)
        .await;
    Mock::given(method("POST"))
        .and(path("/session/s1/url"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_json(serde_json::json!({ "value": null }))
                .set_delay(Duration::from_secs(3)),
        )
        .mount(&driver)
        .await;
    Mock::given(method("DELETE"))
        .and(path("/session/s1"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({ "value": null })))
        .expect(1)
        .mount(&driver)
        .await;

    let target = pagesift::config::Target {
        dynamic: true,
        ..test_target(&server, "/app")
    };
    let mut config = RendererConfig::new(driver.uri());
    config.settle = Duration::ZERO;
    let renderer = WebDriverRenderer::new(config, &target).unwrap();

    let handle = ScrapeSession::new(target)
        .unwrap()
        .with_renderer(Arc::new(renderer))
        .spawn();
    tokio::time::sleep(Duration::from_millis(500)).await;
    handle.cancel();
    let outcome = handle.join().await;

    assert!(matches!(outcome.status, SessionStatus::Cancelled));
    assert_eq!(outcome.stats.renders, 0);

    let mut deletes = 0;
    for _ in 0..20 {
        deletes = driver
            .received_requests()
            .await
            .unwrap()
            .iter()
            .filter(|r| r.method == wiremock::http::Method::Delete)
            .count();
        if deletes > 0 {
            break;
        }
        tokio::time::sleep(Duration::from_millis(50)).await;
    }
    assert_eq!(deletes, 1);
}
