//! HTTP fetcher implementation
//!
//! This module performs single HTTP retrievals for the scrape session:
//! - Building HTTP clients with the target's user agent and redirect limit
//! - Injecting the target's headers
//! - Enforcing a hard timeout over connect, headers, and body
//! - Classifying the outcome as success, retryable failure, or permanent failure
//!
//! Retrying is the session's job; the fetcher makes exactly one attempt.

use crate::config::Target;
use crate::url::parse_page_url;
use crate::ConfigError;
use reqwest::header::{HeaderMap, HeaderName, HeaderValue};
use reqwest::{redirect::Policy, Client, StatusCode};
use std::collections::BTreeMap;
use std::time::{Duration, Instant};
use url::Url;

/// Maximum redirect hops before a fetch fails permanently
const MAX_REDIRECTS: usize = 10;

/// Content types that can never hold a scrapeable document
const BINARY_CONTENT_TYPES: &[&str] = &[
    "image/",
    "audio/",
    "video/",
    "font/",
    "application/pdf",
    "application/octet-stream",
    "application/zip",
];

/// A fetched or rendered HTML document
#[derive(Debug, Clone, PartialEq)]
pub struct Document {
    /// Final URL after redirects; relative links resolve against it
    pub url: Url,
    pub html: String,
}

impl Document {
    pub fn new(url: Url, html: impl Into<String>) -> Self {
        Self {
            url,
            html: html.into(),
        }
    }
}

/// How a single fetch attempt ended
#[derive(Debug, Clone, PartialEq)]
pub enum FetchStatus {
    /// 2xx with a decodable text body
    Success(Document),

    /// Worth retrying: network errors, timeouts, 5xx, 429
    RetryableFailure(String),

    /// Never worth retrying: 4xx, bad URL, redirect limit, binary content
    PermanentFailure(String),
}

/// Result of one fetch attempt
#[derive(Debug, Clone, PartialEq)]
pub struct FetchResult {
    pub status: FetchStatus,
    pub elapsed: Duration,
    /// The URL as requested
    pub url: String,
    /// HTTP status code, when a response was received
    pub status_code: Option<u16>,
}

impl FetchResult {
    pub fn is_success(&self) -> bool {
        matches!(self.status, FetchStatus::Success(_))
    }
}

/// Builds an HTTP client for a target
///
/// # Arguments
///
/// * `target` - The scrape target supplying the user agent
///
/// # Returns
///
/// * `Ok(Client)` - Successfully built HTTP client
/// * `Err(reqwest::Error)` - Failed to build client
pub fn build_http_client(target: &Target) -> Result<Client, reqwest::Error> {
    Client::builder()
        .user_agent(target.user_agent.clone())
        .connect_timeout(target.timeout)
        .redirect(Policy::limited(MAX_REDIRECTS))
        .gzip(true)
        .brotli(true)
        .build()
}

/// Converts configured headers into a header map
pub fn header_map(headers: &BTreeMap<String, String>) -> Result<HeaderMap, ConfigError> {
    let mut map = HeaderMap::with_capacity(headers.len());
    for (name, value) in headers {
        let name = HeaderName::from_bytes(name.as_bytes())
            .map_err(|_| ConfigError::Validation(format!("Invalid header name '{}'", name)))?;
        let value = HeaderValue::from_str(value)
            .map_err(|_| ConfigError::Validation(format!("Invalid value for header '{}'", name)))?;
        map.insert(name, value);
    }
    Ok(map)
}

/// Fetches a URL once and classifies the outcome
///
/// # Classification
///
/// | Condition | Status |
/// |-----------|--------|
/// | HTTP 2xx, text body | Success |
/// | HTTP 429, HTTP 5xx | RetryableFailure |
/// | Timeout, connection error, body read error | RetryableFailure |
/// | HTTP 4xx (except 429), other non-2xx | PermanentFailure |
/// | Malformed URL, non-HTTP scheme | PermanentFailure |
/// | Redirect limit exceeded | PermanentFailure |
/// | Binary Content-Type | PermanentFailure |
///
/// # Arguments
///
/// * `client` - The HTTP client to use
/// * `url` - The URL to fetch
/// * `headers` - Extra request headers
/// * `timeout` - Hard cutoff covering connect, headers, and body
///
/// # Returns
///
/// A FetchResult; this function never fails
pub async fn fetch_url(
    client: &Client,
    url: &str,
    headers: &HeaderMap,
    timeout: Duration,
) -> FetchResult {
    let started = Instant::now();

    let (status, status_code) = match parse_page_url(url) {
        Err(e) => (FetchStatus::PermanentFailure(e.to_string()), None),
        Ok(parsed) => {
            match tokio::time::timeout(timeout, send_and_read(client, parsed, headers, timeout))
                .await
            {
                Ok(outcome) => outcome,
                Err(_) => (
                    FetchStatus::RetryableFailure(format!("timed out after {:?}", timeout)),
                    None,
                ),
            }
        }
    };

    let result = FetchResult {
        status,
        elapsed: started.elapsed(),
        url: url.to_string(),
        status_code,
    };

    match &result.status {
        FetchStatus::Success(_) => tracing::debug!(
            "Fetched {} ({:?}) in {:?}",
            url,
            status_code,
            result.elapsed
        ),
        FetchStatus::RetryableFailure(reason) | FetchStatus::PermanentFailure(reason) => {
            tracing::debug!("Fetch of {} failed: {}", url, reason)
        }
    }

    result
}

async fn send_and_read(
    client: &Client,
    url: Url,
    headers: &HeaderMap,
    timeout: Duration,
) -> (FetchStatus, Option<u16>) {
    let response = match client
        .get(url)
        .headers(headers.clone())
        .timeout(timeout)
        .send()
        .await
    {
        Ok(response) => response,
        Err(e) => return (classify_error(&e), None),
    };

    let status = response.status();
    let code = Some(status.as_u16());

    if status == StatusCode::TOO_MANY_REQUESTS || status.is_server_error() {
        return (FetchStatus::RetryableFailure(format!("HTTP {}", status)), code);
    }

    if !status.is_success() {
        return (FetchStatus::PermanentFailure(format!("HTTP {}", status)), code);
    }

    let content_type = response
        .headers()
        .get(reqwest::header::CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .unwrap_or("")
        .to_ascii_lowercase();

    if is_binary(&content_type) {
        return (
            FetchStatus::PermanentFailure(format!("binary content type '{}'", content_type)),
            code,
        );
    }

    let final_url = response.url().clone();
    match response.text().await {
        Ok(html) => (FetchStatus::Success(Document::new(final_url, html)), code),
        Err(e) => (
            FetchStatus::RetryableFailure(format!("failed to read body: {}", e)),
            code,
        ),
    }
}

/// Classifies a transport-level error
fn classify_error(e: &reqwest::Error) -> FetchStatus {
    if e.is_redirect() {
        FetchStatus::PermanentFailure(format!("redirect error: {}", e))
    } else if e.is_builder() {
        FetchStatus::PermanentFailure(format!("invalid request: {}", e))
    } else if e.is_timeout() {
        FetchStatus::RetryableFailure("request timeout".to_string())
    } else if e.is_connect() {
        FetchStatus::RetryableFailure(format!("connection failed: {}", e))
    } else {
        FetchStatus::RetryableFailure(e.to_string())
    }
}

fn is_binary(content_type: &str) -> bool {
    BINARY_CONTENT_TYPES
        .iter()
        .any(|prefix| content_type.starts_with(prefix))
}
