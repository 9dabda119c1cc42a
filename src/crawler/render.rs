//! Script rendering: when it is needed, and how it is done
//!
//! [`RenderPolicy`] decides from a statically fetched document whether the
//! page builds its content in the browser. [`DynamicRenderer`] loads a page in
//! a script-executing environment; [`WebDriverRenderer`] does so by driving a
//! running chromedriver or geckodriver over the W3C WebDriver protocol.

use super::fetcher::Document;
use crate::config::{RendererConfig, Target};
use async_trait::async_trait;
use reqwest::{Client, Method};
use scraper::{Html, Selector};
use serde_json::{json, Value};
use std::time::Duration;
use thiserror::Error;
use tokio::time::Instant;
use url::Url;

/// Visible text below this many characters counts as an empty shell
const NEAR_EMPTY_TEXT: usize = 64;

/// Elements client-side frameworks mount into
const MOUNT_POINTS: &str = "#root, #app, #__next, #__nuxt, [ng-app], [data-reactroot], [data-v-app]";

/// Errors raised while rendering a page
#[derive(Debug, Error)]
pub enum RenderError {
    #[error("Rendering {url} did not become ready within {timeout:?}")]
    Timeout { url: String, timeout: Duration },

    #[error("Render environment unavailable: {0}")]
    EnvironmentUnavailable(String),

    #[error("WebDriver protocol error: {0}")]
    Protocol(String),
}

/// Decides whether a statically fetched page needs script rendering
///
/// Mistakes are tolerated: a false positive costs a render, a false negative
/// yields fewer records.
pub trait RenderPolicy: Send + Sync {
    fn needs_rendering(&self, document: &Document, target: &Target) -> bool;
}

/// The built-in heuristic
///
/// Rendering is needed when the target is flagged dynamic, or when none of
/// the target's selectors match AND the page shows client-rendering markers:
/// near-empty visible text alongside scripts, a framework mount point, or a
/// `<noscript>` notice asking for JavaScript.
#[derive(Debug, Clone, Copy, Default)]
pub struct DefaultRenderPolicy;

impl RenderPolicy for DefaultRenderPolicy {
    fn needs_rendering(&self, document: &Document, target: &Target) -> bool {
        if target.dynamic {
            return true;
        }

        let html = Html::parse_document(&document.html);

        let any_match = target.selectors.iter().any(|rule| {
            Selector::parse(rule.selector())
                .map(|s| html.select(&s).next().is_some())
                .unwrap_or(false)
        });
        if any_match {
            return false;
        }

        has_script_shell(&html) || has_mount_point(&html) || has_noscript_notice(&html)
    }
}

fn has_script_shell(html: &Html) -> bool {
    let has_scripts = Selector::parse("script")
        .map(|s| html.select(&s).next().is_some())
        .unwrap_or(false);
    has_scripts && visible_text_len(html) < NEAR_EMPTY_TEXT
}

fn has_mount_point(html: &Html) -> bool {
    Selector::parse(MOUNT_POINTS)
        .map(|s| html.select(&s).next().is_some())
        .unwrap_or(false)
}

fn has_noscript_notice(html: &Html) -> bool {
    let Ok(selector) = Selector::parse("noscript") else {
        return false;
    };
    html.select(&selector).any(|el| {
        el.text()
            .collect::<String>()
            .to_lowercase()
            .contains("javascript")
    })
}

/// Characters of text outside script, style, noscript and template elements
fn visible_text_len(html: &Html) -> usize {
    html.root_element()
        .descendants()
        .filter_map(|node| {
            let text = node.value().as_text()?;
            let hidden = node
                .parent()
                .and_then(|p| p.value().as_element().map(|e| e.name().to_string()))
                .is_some_and(|name| {
                    matches!(name.as_str(), "script" | "style" | "noscript" | "template")
                });
            (!hidden).then(|| text.trim().chars().count())
        })
        .sum()
}

/// Loads a page in a script-executing environment
#[async_trait]
pub trait DynamicRenderer: Send + Sync {
    /// Renders `url` and returns the resulting document
    ///
    /// # Returns
    ///
    /// * `Ok(Document)` - The rendered page
    /// * `Err(RenderError::Timeout)` - The page never became ready within `timeout`
    /// * `Err(RenderError::EnvironmentUnavailable)` - No browser could be started
    async fn render(&self, url: &Url, timeout: Duration) -> Result<Document, RenderError>;
}

/// W3C WebDriver client rendering pages in a headless browser
#[derive(Debug, Clone)]
pub struct WebDriverRenderer {
    client: Client,
    base: String,
    config: RendererConfig,
    user_agent: String,
    ready_selector: Option<String>,
}

impl WebDriverRenderer {
    /// Creates a renderer for the WebDriver server in `config`
    ///
    /// No browser is started until the first render.
    pub fn new(config: RendererConfig, target: &Target) -> Result<Self, RenderError> {
        let client = Client::builder()
            .connect_timeout(target.timeout)
            .build()
            .map_err(|e| RenderError::EnvironmentUnavailable(e.to_string()))?;

        Ok(Self {
            client,
            base: config.webdriver_url.trim_end_matches('/').to_string(),
            config,
            user_agent: target.user_agent.clone(),
            ready_selector: target.ready_selector.clone(),
        })
    }

    fn capabilities(&self) -> Value {
        let user_agent = format!("--user-agent={}", self.user_agent);
        json!({
            "capabilities": {
                "alwaysMatch": {
                    "browserName": self.config.browser,
                    "goog:chromeOptions": {
                        "args": ["--headless=new", "--disable-gpu", "--no-sandbox", user_agent]
                    },
                    "moz:firefoxOptions": {
                        "args": ["-headless"],
                        "prefs": { "general.useragent.override": self.user_agent }
                    }
                }
            }
        })
    }

    /// Sends one WebDriver command and returns its `value` payload
    async fn command(
        &self,
        method: Method,
        path: &str,
        body: Option<Value>,
    ) -> Result<Value, RenderError> {
        let url = format!("{}{}", self.base, path);
        let mut request = self.client.request(method, &url);
        if let Some(body) = body {
            request = request.json(&body);
        }

        let response = request
            .send()
            .await
            .map_err(|e| RenderError::Protocol(format!("{}: {}", url, e)))?;
        let status = response.status();
        let mut payload: Value = response
            .json()
            .await
            .map_err(|e| RenderError::Protocol(format!("{}: invalid response: {}", url, e)))?;

        let value = payload
            .get_mut("value")
            .map(Value::take)
            .unwrap_or(Value::Null);

        if !status.is_success() {
            let error = value
                .get("error")
                .and_then(Value::as_str)
                .unwrap_or("unknown error");
            let message = value.get("message").and_then(Value::as_str).unwrap_or("");
            return Err(RenderError::Protocol(format!(
                "{} ({}): {} {}",
                path, status, error, message
            )));
        }

        Ok(value)
    }

    async fn start_session(&self) -> Result<BrowserSession, RenderError> {
        let value = self
            .command(Method::POST, "/session", Some(self.capabilities()))
            .await
            .map_err(|e| RenderError::EnvironmentUnavailable(e.to_string()))?;

        let id = value
            .get("sessionId")
            .and_then(Value::as_str)
            .ok_or_else(|| {
                RenderError::EnvironmentUnavailable("driver returned no session id".to_string())
            })?;

        Ok(BrowserSession {
            client: self.client.clone(),
            url: format!("{}/session/{}", self.base, id),
            id: id.to_string(),
            open: true,
        })
    }

    /// Navigates, waits for readiness, settles, and reads the page source
    async fn drive(
        &self,
        session: &str,
        url: &Url,
        timeout: Duration,
    ) -> Result<Document, RenderError> {
        let deadline = Instant::now() + timeout;
        let prefix = format!("/session/{}", session);

        self.command(
            Method::POST,
            &format!("{}/url", prefix),
            Some(json!({ "url": url.as_str() })),
        )
        .await?;

        let script = "const sel = arguments[0];\
             if (document.readyState !== 'complete') return false;\
             return sel ? document.querySelector(sel) !== null : true;";
        loop {
            let ready = self
                .command(
                    Method::POST,
                    &format!("{}/execute/sync", prefix),
                    Some(json!({ "script": script, "args": [self.ready_selector] })),
                )
                .await?;
            if ready.as_bool() == Some(true) {
                break;
            }
            if Instant::now() + self.config.poll_interval > deadline {
                return Err(RenderError::Timeout {
                    url: url.to_string(),
                    timeout,
                });
            }
            tokio::time::sleep(self.config.poll_interval).await;
        }

        tokio::time::sleep(self.config.settle).await;

        let source = self
            .command(Method::GET, &format!("{}/source", prefix), None)
            .await?;
        let html = source
            .as_str()
            .ok_or_else(|| RenderError::Protocol("page source is not a string".to_string()))?;

        let current = self
            .command(Method::GET, &format!("{}/url", prefix), None)
            .await
            .ok()
            .and_then(|v| v.as_str().and_then(|s| Url::parse(s).ok()))
            .unwrap_or_else(|| url.clone());

        Ok(Document::new(current, html))
    }
}

/// A browser session open on the driver
///
/// Dropping it without [`close`](Self::close), as happens when a render is
/// cancelled mid-flight, still deletes the session from a spawned task.
#[derive(Debug)]
struct BrowserSession {
    client: Client,
    url: String,
    id: String,
    open: bool,
}

impl BrowserSession {
    /// Deletes the session, giving the driver at most `grace` to answer
    async fn close(mut self, grace: Duration) {
        let request = self.client.delete(&self.url).timeout(grace).send();
        match request.await {
            Ok(response) if !response.status().is_success() => tracing::warn!(
                "Failed to close browser session {}: {}",
                self.id,
                response.status()
            ),
            Ok(_) => {}
            Err(e) => tracing::warn!("Failed to close browser session {}: {}", self.id, e),
        }
        self.open = false;
    }
}

impl Drop for BrowserSession {
    fn drop(&mut self) {
        if !self.open {
            return;
        }
        let Ok(runtime) = tokio::runtime::Handle::try_current() else {
            tracing::warn!("Browser session {} left open: no runtime to close it", self.id);
            return;
        };

        tracing::debug!("Closing abandoned browser session {}", self.id);
        let request = self.client.delete(&self.url).send();
        let id = std::mem::take(&mut self.id);
        runtime.spawn(async move {
            if let Err(e) = request.await {
                tracing::warn!("Failed to close browser session {}: {}", id, e);
            }
        });
    }
}

#[async_trait]
impl DynamicRenderer for WebDriverRenderer {
    async fn render(&self, url: &Url, timeout: Duration) -> Result<Document, RenderError> {
        let timed_out = || RenderError::Timeout {
            url: url.to_string(),
            timeout,
        };

        // Starting the browser and the settle delay both count against the budget
        let deadline = Instant::now() + timeout + self.config.settle;

        let session = tokio::time::timeout_at(deadline, self.start_session())
            .await
            .map_err(|_| timed_out())??;
        tracing::debug!("Browser session {} rendering {}", session.id, url);

        let result = match tokio::time::timeout_at(deadline, self.drive(&session.id, url, timeout))
            .await
        {
            Ok(result) => result,
            Err(_) => Err(timed_out()),
        };

        session.close(timeout).await;
        result
    }
}
