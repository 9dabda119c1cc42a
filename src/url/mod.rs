//! URL handling module for Pagesift
//!
//! This module provides page URL validation, the canonical key used for
//! pagination cycle detection, and the host key used for rate limiting.

mod domain;
mod normalize;

// Re-export main functions
pub use domain::host_key;
pub use normalize::{canonical_key, parse_page_url};
