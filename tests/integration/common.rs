use pagesift::config::Target;
use std::time::Duration;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

/// A target on the mock server with test-friendly timings
pub fn test_target(server: &MockServer, page: &str) -> Target {
    Target {
        delay: Duration::ZERO,
        timeout: Duration::from_secs(2),
        max_retries: 2,
        backoff_base: Duration::from_millis(10),
        backoff_cap: Duration::from_millis(50),
        respect_robots_txt: false,
        ..Target::new(format!("{}{}", server.uri(), page))
    }
}

/// A listing page: one table row per item, plus an optional rel=next link
pub fn listing_page(items: &[(&str, &str)], next: Option<&str>) -> String {
    let rows: String = items
        .iter()
        .map(|(name, price)| format!("<tr><td>{}</td><td>{}</td></tr>", name, price))
        .collect();
    let next = next
        .map(|href| format!(r#"<a rel="next" href="{}">Next</a>"#, href))
        .unwrap_or_default();

    format!(
        r#"<html><head><title>Listing</title></head><body>
        <table><tr><th>Name</th><th>Price</th></tr>{}</table>
        {}
        </body></html>"#,
        rows, next
    )
}

pub fn html(body: String) -> ResponseTemplate {
    ResponseTemplate::new(200)
        .set_body_string(body)
        .insert_header("content-type", "text/html")
}

/// Mounts a GET mock for `route` answering with `body`, expected `times` times
pub async fn mount_page(server: &MockServer, route: &str, body: String, times: u64) {
    Mock::given(method("GET"))
        .and(path(route))
        .respond_with(html(body))
        .expect(times)
        .mount(server)
        .await;
}
