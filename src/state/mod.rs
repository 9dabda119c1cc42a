//! State module for tracking scrape progress
//!
//! # Components
//!
//! - `SessionState`: The state machine a scrape session walks through
//! - `HostState`: Per-host request spacing used by the rate limiter

mod host_state;
mod session_state;

// Re-export main types
pub use host_state::HostState;
pub use session_state::SessionState;
