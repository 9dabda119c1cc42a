//! Per-session robots.txt cache
//!
//! robots.txt is fetched at most once per host for the lifetime of a session.

use super::{fetch_robots, RobotsRules};
use crate::url::host_key;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use url::Url;

#[derive(Debug, Default)]
pub struct RobotsCache {
    hosts: HashMap<String, Arc<RobotsRules>>,
}

impl RobotsCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the rules for `url`'s host, fetching them on first use
    ///
    /// # Arguments
    ///
    /// * `client` - HTTP client used for the robots.txt request
    /// * `url` - Any URL on the host
    /// * `timeout` - Hard cutoff for the robots.txt request
    pub async fn rules_for(
        &mut self,
        client: &reqwest::Client,
        url: &Url,
        timeout: Duration,
    ) -> Arc<RobotsRules> {
        let Some(host) = host_key(url) else {
            return Arc::new(RobotsRules::allow_all());
        };

        if let Some(rules) = self.hosts.get(&host) {
            return Arc::clone(rules);
        }

        let rules = Arc::new(fetch_robots(client, url, timeout).await);
        self.hosts.insert(host, Arc::clone(&rules));
        rules
    }

    /// Number of hosts whose robots.txt has been fetched
    pub fn len(&self) -> usize {
        self.hosts.len()
    }

    pub fn is_empty(&self) -> bool {
        self.hosts.is_empty()
    }
}
