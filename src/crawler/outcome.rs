//! What a finished session hands back

use super::ScrapeError;
use crate::table::Table;
use chrono::{DateTime, Utc};
use std::time::Duration;

/// Final result of a scrape session
///
/// The table holds every record extracted before the session ended, whether
/// it completed, failed or was cancelled.
#[derive(Debug)]
pub struct SessionOutcome {
    pub table: Table,
    pub status: SessionStatus,
    pub stats: SessionStats,
    pub attempts: Vec<AttemptRecord>,
    pub warnings: Vec<String>,
}

impl SessionOutcome {
    pub fn is_completed(&self) -> bool {
        matches!(self.status, SessionStatus::Completed)
    }

    pub fn error(&self) -> Option<&ScrapeError> {
        match &self.status {
            SessionStatus::Failed(e) => Some(e),
            _ => None,
        }
    }
}

#[derive(Debug)]
pub enum SessionStatus {
    Completed,
    Failed(ScrapeError),
    Cancelled,
}

impl SessionStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Completed => "completed",
            Self::Failed(_) => "failed",
            Self::Cancelled => "cancelled",
        }
    }
}

/// Counters kept over a session
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SessionStats {
    /// Pages whose fetch succeeded and whose records were kept
    pub pages_fetched: u32,
    /// Every fetch attempt made, retries included
    pub fetch_attempts: u32,
    pub retries: u32,
    pub renders: u32,
    pub records: usize,
    pub elapsed: Duration,
}

/// One entry of the per-attempt log
#[derive(Debug, Clone, PartialEq)]
pub struct AttemptRecord {
    pub url: String,
    /// 1-based attempt number for this page
    pub attempt: u32,
    pub status_code: Option<u16>,
    pub outcome: AttemptOutcome,
    pub elapsed: Duration,
    pub at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum AttemptOutcome {
    Success,
    Retryable(String),
    Permanent(String),
}
