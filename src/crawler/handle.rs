//! Handle to a running scrape session

use super::outcome::{SessionOutcome, SessionStats, SessionStatus};
use super::ScrapeError;
use crate::state::SessionState;
use crate::table::Table;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

/// A progress report, sent on every state change
#[derive(Debug, Clone, PartialEq)]
pub struct Progress {
    pub pages_fetched: u32,
    pub records_so_far: usize,
    pub current_url: Option<String>,
    pub state: SessionState,
}

/// Finite stream of progress reports
///
/// Ends once the session has reached a terminal state and its last report
/// has been read.
#[derive(Debug, Default)]
pub struct ProgressStream {
    rx: Option<mpsc::UnboundedReceiver<Progress>>,
}

impl ProgressStream {
    pub(crate) fn new(rx: mpsc::UnboundedReceiver<Progress>) -> Self {
        Self { rx: Some(rx) }
    }

    /// Next report, or `None` when the session is over
    pub async fn next(&mut self) -> Option<Progress> {
        let rx = self.rx.as_mut()?;
        let progress = rx.recv().await;
        if progress.is_none() {
            self.rx = None;
        }
        progress
    }
}

/// Owns a session running on its own task
#[derive(Debug)]
pub struct SessionHandle {
    cancel: CancellationToken,
    progress: ProgressStream,
    task: JoinHandle<SessionOutcome>,
}

impl SessionHandle {
    pub(crate) fn new(
        cancel: CancellationToken,
        progress: ProgressStream,
        task: JoinHandle<SessionOutcome>,
    ) -> Self {
        Self {
            cancel,
            progress,
            task,
        }
    }

    /// Requests cancellation; the session stops at its next suspension point
    pub fn cancel(&self) {
        self.cancel.cancel();
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancel.is_cancelled()
    }

    /// Takes the progress stream
    ///
    /// Only the first call gets the live stream; later calls get an empty one.
    pub fn progress(&mut self) -> ProgressStream {
        std::mem::take(&mut self.progress)
    }

    /// Waits for the session to finish
    pub async fn join(self) -> SessionOutcome {
        match self.task.await {
            Ok(outcome) => outcome,
            Err(e) => {
                tracing::error!("Session task ended abnormally: {}", e);
                SessionOutcome {
                    table: Table::new(),
                    status: SessionStatus::Failed(ScrapeError::TaskFailed(e.to_string())),
                    stats: SessionStats::default(),
                    attempts: Vec::new(),
                    warnings: Vec::new(),
                }
            }
        }
    }
}
