//! Robots.txt handling module
//!
//! This module provides functionality for fetching, parsing, and caching robots.txt files.

mod cache;
mod parser;

pub use cache::RobotsCache;
pub use parser::{RobotsRules, MAX_CRAWL_DELAY};

use std::time::Duration;
use url::Url;

/// Fetches robots.txt for the host of `url`
///
/// A missing file (any 4xx), a server error, or a network failure all yield
/// permissive rules; robots.txt never stops a session on its own.
///
/// # Arguments
///
/// * `client` - HTTP client to use
/// * `url` - Any URL on the host
/// * `timeout` - Hard cutoff for the request
pub async fn fetch_robots(client: &reqwest::Client, url: &Url, timeout: Duration) -> RobotsRules {
    let robots_url = match url.join("/robots.txt") {
        Ok(u) => u,
        Err(_) => return RobotsRules::allow_all(),
    };

    tracing::debug!("Fetching {}", robots_url);

    let request = client.get(robots_url.clone()).timeout(timeout).send();
    let response = match tokio::time::timeout(timeout, request).await {
        Ok(Ok(response)) => response,
        Ok(Err(e)) => {
            tracing::warn!("Could not fetch {}: {}", robots_url, e);
            return RobotsRules::allow_all();
        }
        Err(_) => {
            tracing::warn!("Timed out fetching {}", robots_url);
            return RobotsRules::allow_all();
        }
    };

    if !response.status().is_success() {
        tracing::debug!("{} returned {}, allowing all", robots_url, response.status());
        return RobotsRules::allow_all();
    }

    match response.text().await {
        Ok(body) => RobotsRules::parse(&body),
        Err(e) => {
            tracing::warn!("Could not read {}: {}", robots_url, e);
            RobotsRules::allow_all()
        }
    }
}
