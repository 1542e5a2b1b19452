//! Connection settings for an Elasticsearch-compatible cluster

use std::time::Duration;

pub const DEFAULT_URL: &str = "http://localhost:9200";

/// Immutable connection configuration
#[derive(Clone)]
pub struct ElasticConfig {
    /// Base URL, e.g. `https://es.internal:9200`
    pub url: String,
    pub username: Option<String>,
    pub password: Option<String>,
    /// Accept invalid TLS certificates (self-signed clusters)
    pub insecure: bool,
    /// Per-request timeout; exceeding it is a transient failure
    pub request_timeout: Duration,
    pub connect_timeout: Duration,
    /// Scroll context keep-alive between pages, e.g. `5m`
    pub scroll_keepalive: String,
    /// Idle connections kept per host (shared by all slice workers)
    pub pool_size: usize,
}

impl Default for ElasticConfig {
    fn default() -> Self {
        Self {
            url: DEFAULT_URL.to_string(),
            username: None,
            password: None,
            insecure: true,
            request_timeout: Duration::from_secs(300),
            connect_timeout: Duration::from_secs(30),
            scroll_keepalive: "5m".to_string(),
            pool_size: 8,
        }
    }
}

impl std::fmt::Debug for ElasticConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ElasticConfig")
            .field("url", &self.url)
            .field("username", &self.username)
            .field("password", &self.password.as_ref().map(|_| "***"))
            .field("insecure", &self.insecure)
            .field("request_timeout", &self.request_timeout)
            .field("scroll_keepalive", &self.scroll_keepalive)
            .field("pool_size", &self.pool_size)
            .finish_non_exhaustive()
    }
}

impl ElasticConfig {
    /// Base URL without trailing slashes
    pub fn base_url(&self) -> &str {
        self.url.trim_end_matches('/')
    }
}
