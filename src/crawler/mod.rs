//! Crawler module for fetching pages and turning them into records
//!
//! This module contains the scrape pipeline, including:
//! - HTTP fetching with outcome classification
//! - Script-render detection and WebDriver rendering
//! - Record extraction from parsed documents
//! - Pagination discovery with page ceiling and cycle guard
//! - Per-host rate limiting
//! - The session state machine tying these together

mod extractor;
mod fetcher;
mod handle;
mod outcome;
mod pagination;
mod rate_limiter;
mod render;
mod session;

pub use extractor::{clean_column_names, extract, extract_from_html};
pub use fetcher::{build_http_client, fetch_url, header_map, Document, FetchResult, FetchStatus};
pub use handle::{Progress, ProgressStream, SessionHandle};
pub use outcome::{AttemptOutcome, AttemptRecord, SessionOutcome, SessionStats, SessionStatus};
pub use pagination::PaginationWalker;
pub use rate_limiter::RateLimiter;
pub use render::{
    DefaultRenderPolicy, DynamicRenderer, RenderError, RenderPolicy, WebDriverRenderer,
};
pub use session::ScrapeSession;

use crate::state::SessionState;
use crate::ConfigError;
use thiserror::Error;

/// Errors that end a scrape session
#[derive(Debug, Error)]
pub enum ScrapeError {
    #[error("Invalid target: {0}")]
    Config(#[from] ConfigError),

    #[error("Failed to build HTTP client: {0}")]
    Client(#[from] reqwest::Error),

    #[error("Permanent failure fetching {url}: {reason}")]
    PermanentFailure { url: String, reason: String },

    #[error("Gave up on {url} after {attempts} attempts: {last_reason}")]
    RetriesExhausted {
        url: String,
        attempts: u32,
        last_reason: String,
    },

    #[error("Render failed: {0}")]
    Render(#[from] RenderError),

    #[error("robots.txt disallows {url}")]
    RobotsDenied { url: String },

    #[error("Invalid state transition: {from} -> {to}")]
    InvalidTransition {
        from: SessionState,
        to: SessionState,
    },

    #[error("Session task failed: {0}")]
    TaskFailed(String),
}
