//! Integration tests for Pagesift
//!
//! These tests use wiremock to create mock HTTP servers and drive whole
//! scrape sessions end-to-end.

mod common;
mod pipeline_tests;
mod session_tests;
