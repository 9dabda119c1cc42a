//! Per-host request spacing
//!
//! The limiter is cheap to clone; clones share state, so sessions scraping
//! the same host serialize their requests while other hosts proceed
//! independently.

use crate::state::HostState;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;
use tokio::time::Instant;

#[derive(Debug, Clone)]
pub struct RateLimiter {
    inner: Arc<Inner>,
}

#[derive(Debug)]
struct Inner {
    base_delay: Duration,
    hosts: Mutex<HashMap<String, Arc<Mutex<HostState>>>>,
}

impl RateLimiter {
    /// Creates a limiter enforcing at least `delay` between requests to one host
    pub fn new(delay: Duration) -> Self {
        Self {
            inner: Arc::new(Inner {
                base_delay: delay,
                hosts: Mutex::new(HashMap::new()),
            }),
        }
    }

    pub fn base_delay(&self) -> Duration {
        self.inner.base_delay
    }

    async fn slot(&self, host: &str) -> Arc<Mutex<HostState>> {
        let mut hosts = self.inner.hosts.lock().await;
        Arc::clone(
            hosts
                .entry(host.to_string())
                .or_insert_with(|| Arc::new(Mutex::new(HostState::new(self.inner.base_delay)))),
        )
    }

    /// Waits until a request to `host` is allowed, then claims the slot
    ///
    /// Waiters for the same host are served in arrival order (the host lock
    /// is fair). Dropping the future before it completes gives up the place
    /// in line without claiming a slot.
    pub async fn wait(&self, host: &str) {
        let slot = self.slot(host).await;
        let mut state = slot.lock().await;

        if let Some(remaining) = state.time_until_next_request(Instant::now()) {
            tracing::trace!("Waiting {:?} before next request to {}", remaining, host);
            tokio::time::sleep(remaining).await;
        }

        state.record_request(Instant::now());
    }

    /// Raises the spacing for one host, e.g. from a robots.txt Crawl-delay
    ///
    /// The spacing never drops below the limiter's base delay.
    pub async fn raise_delay(&self, host: &str, delay: Duration) {
        let slot = self.slot(host).await;
        let mut state = slot.lock().await;
        if delay > state.delay {
            tracing::info!("Raising request spacing for {} to {:?}", host, delay);
        }
        state.raise_delay(delay);
    }

    /// Current spacing for `host`
    pub async fn delay_for(&self, host: &str) -> Duration {
        let slot = self.slot(host).await;
        let state = slot.lock().await;
        state.delay
    }

    /// Number of requests granted to `host` so far
    pub async fn request_count(&self, host: &str) -> u32 {
        let slot = self.slot(host).await;
        let state = slot.lock().await;
        state.request_count
    }
}
