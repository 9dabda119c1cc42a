//! Pagesift: paginated record extraction with undoable table cleaning
//!
//! This crate fetches pages for a scrape target, extracts structured records across
//! paginated result sets, and runs the resulting table through a reversible cleaning
//! pipeline whose every prior state can be restored.

pub mod cleaning;
pub mod config;
pub mod crawler;
pub mod output;
pub mod robots;
pub mod state;
pub mod storage;
pub mod table;
pub mod url;

use thiserror::Error;

/// Error type for a full scrape run: the session, then the snapshot write
#[derive(Debug, Error)]
pub enum PagesiftError {
    #[error("Scrape error: {0}")]
    Scrape(#[from] crawler::ScrapeError),

    #[error("Storage error: {0}")]
    Storage(#[from] storage::StorageError),
}

/// Configuration-specific errors
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    Io(#[from] std::io::Error),

    #[error("Failed to parse TOML: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Invalid URL in config: {0}")]
    InvalidUrl(String),

    #[error("Invalid selector: {0}")]
    InvalidSelector(String),
}

/// URL-specific errors
#[derive(Debug, Error)]
pub enum UrlError {
    #[error("Failed to parse URL: {0}")]
    Parse(String),

    #[error("Invalid URL scheme: {0}")]
    InvalidScheme(String),

    #[error("Missing host in URL")]
    MissingHost,
}

/// Result type alias for Pagesift operations
pub type Result<T> = std::result::Result<T, PagesiftError>;

// Re-export commonly used types
pub use cleaning::{CleaningEngine, Operation, OperationHistory};
pub use config::{Config, Target};
pub use crawler::{ScrapeSession, SessionHandle, SessionOutcome, SessionStatus};
pub use state::SessionState;
pub use table::{Record, Table, Value};
