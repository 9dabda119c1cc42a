use std::time::Duration;
use tokio::time::Instant;

/// Tracks request spacing for one host
///
/// The rate limiter keeps one of these per host and consults it before every
/// outbound request.
#[derive(Debug, Clone)]
pub struct HostState {
    /// Number of requests granted to this host
    pub request_count: u32,

    /// When the last request to this host was granted
    pub last_request_time: Option<Instant>,

    /// Minimum spacing between requests to this host
    pub delay: Duration,
}

impl HostState {
    /// Creates a HostState with the given minimum spacing
    pub fn new(delay: Duration) -> Self {
        Self {
            request_count: 0,
            last_request_time: None,
            delay,
        }
    }

    /// Checks if a request can be made to this host at `now`
    #[cfg(test)]
    pub(crate) fn can_request(&self, now: Instant) -> bool {
        self.time_until_next_request(now).is_none()
    }

    /// Calculates the time until the next request can be made
    ///
    /// Returns None if a request can be made now, or the duration to wait otherwise.
    pub fn time_until_next_request(&self, now: Instant) -> Option<Duration> {
        let last = self.last_request_time?;
        let elapsed = now.saturating_duration_since(last);
        (elapsed < self.delay).then(|| self.delay - elapsed)
    }

    /// Records that a request was granted at `now`
    pub fn record_request(&mut self, now: Instant) {
        self.request_count += 1;
        self.last_request_time = Some(now);
    }

    /// Raises the spacing to `delay` if it is longer than the current one
    ///
    /// Used for robots.txt Crawl-delay; the spacing never drops below what
    /// the host started with.
    pub fn raise_delay(&mut self, delay: Duration) {
        if delay > self.delay {
            self.delay = delay;
        }
    }
}
