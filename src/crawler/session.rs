//! Scrape session - fetch, render, extract and paginate one target
//!
//! A session walks the target's result pages one at a time through an
//! explicit state machine:
//!
//! ```text
//! Idle -> Fetching -> [Rendering] -> Extracting -> Paginating -> Fetching ...
//!                                                            \-> Completed
//! ```
//!
//! Any active state may end in Failed or Cancelled. The table accumulated
//! so far is returned however the session ends.

use super::extractor::extract_from_html;
use super::fetcher::{build_http_client, fetch_url, header_map, Document, FetchStatus};
use super::handle::{Progress, ProgressStream, SessionHandle};
use super::outcome::{AttemptOutcome, AttemptRecord, SessionOutcome, SessionStats, SessionStatus};
use super::pagination::PaginationWalker;
use super::rate_limiter::RateLimiter;
use super::render::{DefaultRenderPolicy, DynamicRenderer, RenderError, RenderPolicy, WebDriverRenderer};
use super::ScrapeError;
use crate::config::{validate_renderer, validate_target, Config, ExtractRule, Target};
use crate::robots::RobotsCache;
use crate::state::SessionState;
use crate::table::{Record, Table};
use crate::url::{host_key, parse_page_url};
use crate::ConfigError;
use chrono::Utc;
use reqwest::header::HeaderMap;
use reqwest::Client;
use scraper::Html;
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use url::Url;

/// A configured, not yet started scrape session
pub struct ScrapeSession {
    target: Target,
    client: Client,
    headers: HeaderMap,
    renderer: Option<Arc<dyn DynamicRenderer>>,
    policy: Arc<dyn RenderPolicy>,
    limiter: RateLimiter,
    cancel: CancellationToken,
    progress: Option<mpsc::UnboundedSender<Progress>>,
}

impl ScrapeSession {
    /// Creates a session for `target`
    ///
    /// The target is validated here; an invalid target never starts.
    ///
    /// # Returns
    ///
    /// * `Ok(ScrapeSession)` - Ready to run
    /// * `Err(ScrapeError::Config)` - The target was rejected
    /// * `Err(ScrapeError::Client)` - The HTTP client could not be built
    pub fn new(target: Target) -> Result<Self, ScrapeError> {
        validate_target(&target)?;
        let client = build_http_client(&target)?;
        let headers = header_map(&target.headers)?;
        let limiter = RateLimiter::new(target.delay);

        Ok(Self {
            target,
            client,
            headers,
            renderer: None,
            policy: Arc::new(DefaultRenderPolicy),
            limiter,
            cancel: CancellationToken::new(),
            progress: None,
        })
    }

    /// Creates a session from a loaded configuration, wiring up the
    /// WebDriver renderer when one is configured
    pub fn from_config(config: &Config) -> Result<Self, ScrapeError> {
        let session = Self::new(config.target.clone())?;

        match &config.renderer {
            Some(renderer) => {
                validate_renderer(renderer)?;
                let renderer = WebDriverRenderer::new(renderer.clone(), &config.target)?;
                Ok(session.with_renderer(Arc::new(renderer)))
            }
            None => Ok(session),
        }
    }

    pub fn with_renderer(mut self, renderer: Arc<dyn DynamicRenderer>) -> Self {
        self.renderer = Some(renderer);
        self
    }

    /// Replaces the built-in render detection heuristic
    pub fn with_render_policy(mut self, policy: Arc<dyn RenderPolicy>) -> Self {
        self.policy = policy;
        self
    }

    /// Shares a rate limiter with other sessions
    ///
    /// Sessions holding clones of one limiter never hit the same host closer
    /// together than its delay. This session's own `delay` still applies as
    /// a floor for the hosts it visits.
    pub fn with_rate_limiter(mut self, limiter: RateLimiter) -> Self {
        self.limiter = limiter;
        self
    }

    /// Token that cancels this session when triggered
    pub fn cancellation_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    pub fn target(&self) -> &Target {
        &self.target
    }

    /// Validates `target` and runs it on a new task
    ///
    /// Must be called from within a tokio runtime.
    pub fn start(target: Target) -> Result<SessionHandle, ScrapeError> {
        Ok(Self::new(target)?.spawn())
    }

    /// Runs this session on a new task
    ///
    /// Must be called from within a tokio runtime.
    pub fn spawn(mut self) -> SessionHandle {
        let (tx, rx) = mpsc::unbounded_channel();
        self.progress = Some(tx);
        let cancel = self.cancel.clone();
        let task = tokio::spawn(self.run());
        SessionHandle::new(cancel, ProgressStream::new(rx), task)
    }

    /// Runs the session to the end on the current task
    pub async fn run(self) -> SessionOutcome {
        let started = Instant::now();
        tracing::info!(
            "Starting session for {} (max {} pages)",
            self.target.url,
            self.target.max_pages
        );

        let mut run = SessionRun::new(&self);
        let status = match run.drive().await {
            Ok(()) => SessionStatus::Completed,
            Err(Halt::Cancelled) => {
                run.finish(SessionState::Cancelled);
                tracing::info!("Session for {} cancelled", self.target.url);
                SessionStatus::Cancelled
            }
            Err(Halt::Failed(e)) => {
                run.finish(SessionState::Failed);
                tracing::error!("Session for {} failed: {}", self.target.url, e);
                SessionStatus::Failed(e)
            }
        };

        let outcome = run.into_outcome(status, started.elapsed());
        tracing::info!(
            "Session {}: {} pages, {} records in {:?}",
            outcome.status.as_str(),
            outcome.stats.pages_fetched,
            outcome.stats.records,
            outcome.stats.elapsed
        );
        outcome
    }
}

/// Why the page loop stopped early
enum Halt {
    Cancelled,
    Failed(ScrapeError),
}

impl From<ScrapeError> for Halt {
    fn from(e: ScrapeError) -> Self {
        Halt::Failed(e)
    }
}

/// Mutable state of one running session
struct SessionRun<'a> {
    session: &'a ScrapeSession,
    state: SessionState,
    current_url: Option<String>,
    table: Table,
    stats: SessionStats,
    attempts: Vec<AttemptRecord>,
    warnings: Vec<String>,
    walker: PaginationWalker,
    robots: RobotsCache,
}

impl<'a> SessionRun<'a> {
    fn new(session: &'a ScrapeSession) -> Self {
        Self {
            session,
            state: SessionState::Idle,
            current_url: None,
            table: Table::new(),
            stats: SessionStats::default(),
            attempts: Vec::new(),
            warnings: Vec::new(),
            walker: PaginationWalker::new(
                session.target.max_pages,
                session.target.next_selector.clone(),
            ),
            robots: RobotsCache::new(),
        }
    }

    async fn drive(&mut self) -> Result<(), Halt> {
        let session = self.session;
        let target = &session.target;
        let mut url = parse_page_url(&target.url)
            .map_err(|e| ScrapeError::Config(ConfigError::InvalidUrl(e.to_string())))?;
        let mut index = 0u32;

        loop {
            self.current_url = Some(url.to_string());
            self.transition(SessionState::Fetching)?;
            self.check_cancelled()?;

            if target.respect_robots_txt {
                self.check_robots(&url).await?;
            }

            let document = self.fetch_with_retry(&url).await?;
            self.check_cancelled()?;
            self.walker.mark_visited(&url);
            self.walker.mark_visited(&document.url);

            let document = self.render_if_needed(document).await?;

            self.transition(SessionState::Extracting)?;
            let (records, next) = process_page(&document, &target.selectors, &mut self.walker, index);
            let found = records.len();
            self.table.extend_records(records);
            self.stats.pages_fetched += 1;
            self.stats.records = self.table.row_count();
            tracing::info!(
                "Page {} ({}): {} records, {} total",
                index + 1,
                document.url,
                found,
                self.stats.records
            );

            self.transition(SessionState::Paginating)?;
            match next {
                Some(next) => {
                    tracing::debug!("Next page: {}", next);
                    url = next;
                    index += 1;
                }
                None => {
                    self.transition(SessionState::Completed)?;
                    return Ok(());
                }
            }
        }
    }

    fn transition(&mut self, next: SessionState) -> Result<(), ScrapeError> {
        if !self.state.can_transition_to(next) {
            return Err(ScrapeError::InvalidTransition {
                from: self.state,
                to: next,
            });
        }

        tracing::debug!("Session state {} -> {}", self.state, next);
        self.state = next;
        self.report();
        Ok(())
    }

    /// Moves into a terminal state after the page loop stopped
    fn finish(&mut self, state: SessionState) {
        if let Err(e) = self.transition(state) {
            tracing::debug!("Not moving to {}: {}", state, e);
        }
    }

    fn report(&self) {
        if let Some(tx) = &self.session.progress {
            // The receiver may be gone; progress is best effort.
            let _ = tx.send(Progress {
                pages_fetched: self.stats.pages_fetched,
                records_so_far: self.table.row_count(),
                current_url: self.current_url.clone(),
                state: self.state,
            });
        }
    }

    fn check_cancelled(&self) -> Result<(), Halt> {
        if self.session.cancel.is_cancelled() {
            Err(Halt::Cancelled)
        } else {
            Ok(())
        }
    }

    async fn check_robots(&mut self, url: &Url) -> Result<(), Halt> {
        let session = self.session;
        let target = &session.target;

        let rules = tokio::select! {
            biased;
            _ = session.cancel.cancelled() => return Err(Halt::Cancelled),
            rules = self.robots.rules_for(&session.client, url, target.timeout) => rules,
        };

        if !rules.is_allowed(url, &target.user_agent) {
            tracing::warn!("robots.txt disallows {}", url);
            return Err(ScrapeError::RobotsDenied {
                url: url.to_string(),
            }
            .into());
        }

        if let (Some(delay), Some(host)) = (rules.crawl_delay(&target.user_agent), host_key(url)) {
            session.limiter.raise_delay(&host, delay).await;
        }

        Ok(())
    }

    /// Waits for the host's next request slot
    async fn pace(&self, host: &str) -> Result<(), Halt> {
        let session = self.session;
        if session.target.delay > session.limiter.base_delay() {
            session.limiter.raise_delay(host, session.target.delay).await;
        }

        tokio::select! {
            biased;
            _ = session.cancel.cancelled() => Err(Halt::Cancelled),
            _ = session.limiter.wait(host) => Ok(()),
        }
    }

    /// Fetches `url`, retrying transient failures with exponential backoff
    async fn fetch_with_retry(&mut self, url: &Url) -> Result<Document, Halt> {
        let session = self.session;
        let target = &session.target;
        let host = host_key(url).unwrap_or_default();
        let mut attempt = 0u32;

        loop {
            attempt += 1;
            self.pace(&host).await?;

            let result = tokio::select! {
                biased;
                _ = session.cancel.cancelled() => return Err(Halt::Cancelled),
                result = fetch_url(&session.client, url.as_str(), &session.headers, target.timeout) => result,
            };
            self.stats.fetch_attempts += 1;

            let outcome = match &result.status {
                FetchStatus::Success(_) => AttemptOutcome::Success,
                FetchStatus::RetryableFailure(reason) => AttemptOutcome::Retryable(reason.clone()),
                FetchStatus::PermanentFailure(reason) => AttemptOutcome::Permanent(reason.clone()),
            };
            self.attempts.push(AttemptRecord {
                url: result.url.clone(),
                attempt,
                status_code: result.status_code,
                outcome,
                elapsed: result.elapsed,
                at: Utc::now(),
            });

            match result.status {
                FetchStatus::Success(document) => return Ok(document),
                FetchStatus::PermanentFailure(reason) => {
                    return Err(ScrapeError::PermanentFailure {
                        url: url.to_string(),
                        reason,
                    }
                    .into());
                }
                FetchStatus::RetryableFailure(reason) => {
                    if attempt > target.max_retries {
                        return Err(ScrapeError::RetriesExhausted {
                            url: url.to_string(),
                            attempts: attempt,
                            last_reason: reason,
                        }
                        .into());
                    }

                    let backoff = target.backoff_for(attempt - 1);
                    tracing::warn!(
                        "Attempt {} for {} failed ({}), retrying in {:?}",
                        attempt,
                        url,
                        reason,
                        backoff
                    );
                    self.stats.retries += 1;

                    tokio::select! {
                        biased;
                        _ = session.cancel.cancelled() => return Err(Halt::Cancelled),
                        _ = tokio::time::sleep(backoff) => {}
                    }
                }
            }
        }
    }

    /// Swaps the static document for a rendered one when the policy asks for it
    async fn render_if_needed(&mut self, document: Document) -> Result<Document, Halt> {
        let session = self.session;
        let target = &session.target;

        if !session.policy.needs_rendering(&document, target) {
            return Ok(document);
        }

        let Some(renderer) = &session.renderer else {
            if target.dynamic {
                return Err(ScrapeError::Render(RenderError::EnvironmentUnavailable(
                    "target is marked dynamic but no renderer is configured".to_string(),
                ))
                .into());
            }
            let warning = format!(
                "{} looks script-rendered but no renderer is configured; using the static document",
                document.url
            );
            tracing::warn!("{}", warning);
            self.warnings.push(warning);
            return Ok(document);
        };

        self.transition(SessionState::Rendering)?;
        self.check_cancelled()?;

        let rendered = tokio::select! {
            biased;
            _ = session.cancel.cancelled() => return Err(Halt::Cancelled),
            rendered = renderer.render(&document.url, target.timeout) => rendered,
        };
        self.stats.renders += 1;

        let rendered = rendered.map_err(ScrapeError::from)?;
        tracing::debug!("Rendered {} ({} bytes)", rendered.url, rendered.html.len());
        Ok(rendered)
    }

    fn into_outcome(mut self, status: SessionStatus, elapsed: std::time::Duration) -> SessionOutcome {
        if self.table.is_empty() {
            self.warnings.push("no records extracted".to_string());
        }
        self.stats.records = self.table.row_count();
        self.stats.elapsed = elapsed;

        SessionOutcome {
            table: self.table,
            status,
            stats: self.stats,
            attempts: self.attempts,
            warnings: self.warnings,
        }
    }
}

/// Extracts records and finds the next page from one parsed document
fn process_page(
    document: &Document,
    rules: &[ExtractRule],
    walker: &mut PaginationWalker,
    index: u32,
) -> (Vec<Record>, Option<Url>) {
    let html = Html::parse_document(&document.html);
    let records = extract_from_html(&html, &document.url, rules);
    let next = walker.next_from_html(&html, &document.url, index);
    (records, next)
}
