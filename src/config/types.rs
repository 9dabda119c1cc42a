use crate::cleaning::Operation;
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::time::Duration;

/// Browser-like user agent used when the target does not set one
pub const DEFAULT_USER_AGENT: &str =
    "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/120.0 Safari/537.36";

/// Main configuration structure for Pagesift
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    pub target: Target,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub renderer: Option<RendererConfig>,
    #[serde(default)]
    pub cleaning: Vec<Operation>,
}

/// One scrape configuration: where to start, what to extract, and how politely
///
/// A target is read-only once a session has started.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Target {
    /// First page to fetch
    pub url: String,

    /// Extraction rules, applied in declaration order
    #[serde(default = "default_selectors")]
    pub selectors: Vec<ExtractRule>,

    /// Maximum number of pages fetched in one session
    #[serde(rename = "max-pages", default = "default_max_pages")]
    pub max_pages: u32,

    /// Minimum time between requests to the same host (milliseconds)
    #[serde(rename = "delay-ms", with = "millis", default = "default_delay")]
    pub delay: Duration,

    /// Hard cutoff for a single fetch or render (milliseconds)
    #[serde(rename = "timeout-ms", with = "millis", default = "default_timeout")]
    pub timeout: Duration,

    /// Retries allowed per page after a transient failure
    #[serde(rename = "max-retries", default = "default_max_retries")]
    pub max_retries: u32,

    /// Extra request headers
    #[serde(default)]
    pub headers: BTreeMap<String, String>,

    #[serde(rename = "user-agent", default = "default_user_agent")]
    pub user_agent: String,

    /// Always render pages in the browser driver
    #[serde(default)]
    pub dynamic: bool,

    /// First retry delay; doubles per attempt (milliseconds)
    #[serde(
        rename = "backoff-base-ms",
        with = "millis",
        default = "default_backoff_base"
    )]
    pub backoff_base: Duration,

    /// Upper bound for a single retry delay (milliseconds)
    #[serde(
        rename = "backoff-cap-ms",
        with = "millis",
        default = "default_backoff_cap"
    )]
    pub backoff_cap: Duration,

    /// CSS selector of the "next page" link, overriding the built-in patterns
    #[serde(
        rename = "next-selector",
        default,
        skip_serializing_if = "Option::is_none"
    )]
    pub next_selector: Option<String>,

    /// CSS selector that must exist before a rendered page counts as ready
    #[serde(
        rename = "ready-selector",
        default,
        skip_serializing_if = "Option::is_none"
    )]
    pub ready_selector: Option<String>,

    #[serde(rename = "respect-robots-txt", default = "default_true")]
    pub respect_robots_txt: bool,
}

impl Target {
    /// Creates a target for `url` with default limits and the default extraction rules
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            selectors: default_selectors(),
            max_pages: default_max_pages(),
            delay: default_delay(),
            timeout: default_timeout(),
            max_retries: default_max_retries(),
            headers: BTreeMap::new(),
            user_agent: default_user_agent(),
            dynamic: false,
            backoff_base: default_backoff_base(),
            backoff_cap: default_backoff_cap(),
            next_selector: None,
            ready_selector: None,
            respect_robots_txt: true,
        }
    }

    /// Retry delay before retry number `attempt` (0-based): base × 2^attempt, capped
    pub fn backoff_for(&self, attempt: u32) -> Duration {
        let factor = 2u32.saturating_pow(attempt);
        self.backoff_base
            .checked_mul(factor)
            .unwrap_or(self.backoff_cap)
            .min(self.backoff_cap)
    }
}

/// How records are pulled out of a document
///
/// In TOML a rule is either a bare selector string, `{ table = "..." }`,
/// `{ list = "..." }`, or `{ selector = "...", fields = { name = "css" } }`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ExtractRule {
    /// One record per matching element: `text`, `element`, and `id`/`class`/`href` when present
    Selector(String),

    /// One record per data row of each matching table, keyed by header names
    Table { table: String },

    /// One `item` record per non-empty list entry of each matching `ul`/`ol`
    List { list: String },

    /// One record per matching element with named fields.
    ///
    /// Field specs are `css`, `css@attr`, `@attr`, or an empty string for the
    /// element's own text.
    Fields {
        selector: String,
        fields: IndexMap<String, String>,
    },
}

impl ExtractRule {
    /// The CSS selector locating the matched elements
    pub fn selector(&self) -> &str {
        match self {
            Self::Selector(selector) => selector,
            Self::Table { table } => table,
            Self::List { list } => list,
            Self::Fields { selector, .. } => selector,
        }
    }
}

/// Browser driver configuration for script-rendered pages
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RendererConfig {
    /// Base URL of a running WebDriver server (chromedriver, geckodriver)
    #[serde(rename = "webdriver-url")]
    pub webdriver_url: String,

    #[serde(default = "default_browser")]
    pub browser: String,

    /// Extra wait after the page reports ready (milliseconds)
    #[serde(rename = "settle-ms", with = "millis", default = "default_settle")]
    pub settle: Duration,

    /// Readiness polling interval (milliseconds)
    #[serde(
        rename = "poll-interval-ms",
        with = "millis",
        default = "default_poll_interval"
    )]
    pub poll_interval: Duration,
}

impl RendererConfig {
    /// Creates a renderer configuration for the WebDriver server at `webdriver_url`
    pub fn new(webdriver_url: impl Into<String>) -> Self {
        Self {
            webdriver_url: webdriver_url.into(),
            browser: default_browser(),
            settle: default_settle(),
            poll_interval: default_poll_interval(),
        }
    }
}

fn default_selectors() -> Vec<ExtractRule> {
    vec![ExtractRule::Table {
        table: "table".to_string(),
    }]
}

fn default_max_pages() -> u32 {
    10
}

fn default_delay() -> Duration {
    Duration::from_millis(1000)
}

fn default_timeout() -> Duration {
    Duration::from_secs(30)
}

fn default_max_retries() -> u32 {
    3
}

fn default_user_agent() -> String {
    DEFAULT_USER_AGENT.to_string()
}

fn default_backoff_base() -> Duration {
    Duration::from_millis(1000)
}

fn default_backoff_cap() -> Duration {
    Duration::from_secs(30)
}

fn default_true() -> bool {
    true
}

fn default_browser() -> String {
    "chrome".to_string()
}

fn default_settle() -> Duration {
    Duration::from_secs(2)
}

fn default_poll_interval() -> Duration {
    Duration::from_millis(100)
}

/// Serializes durations as whole milliseconds
mod millis {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S: Serializer>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_u64(duration.as_millis() as u64)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
        u64::deserialize(deserializer).map(Duration::from_millis)
    }
}
