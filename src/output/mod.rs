//! Output module for scrape reports
//!
//! This module handles printing the session summary, the data summary and
//! a preview of the cleaned table.

pub mod stats;

pub use stats::{print_preview, print_report, ScrapeReport};
