//! Retrieval pipeline configuration

use crate::error::ConfigError;
use std::time::Duration;

/// Number of ranked results returned per search.
pub const DEFAULT_TOP_N: usize = 10;

/// Upper bound on candidates discovered and indexed per search.
pub const DEFAULT_MAX_CANDIDATES: usize = 30;

/// Parallel downloads per search.
pub const DEFAULT_CONCURRENCY: usize = 8;

/// Per-download timeout.
pub const DEFAULT_DOWNLOAD_TIMEOUT: Duration = Duration::from_secs(10);

/// Timeout for the provider query.
pub const DEFAULT_DISCOVERY_TIMEOUT: Duration = Duration::from_secs(15);

/// Images narrower or shorter than this are treated as thumbnails and dropped.
pub const DEFAULT_MIN_DIMENSION: u32 = 100;

/// Largest accepted image body: 50 MiB.
pub const DEFAULT_MAX_IMAGE_BYTES: u64 = 50 * 1024 * 1024;

/// Result pages requested from the provider before giving up on `max_candidates`.
pub const DEFAULT_MAX_DISCOVERY_PAGES: usize = 3;

/// Image hosts routinely refuse requests without a browser-like agent.
pub const DEFAULT_USER_AGENT: &str =
    "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/120.0 Safari/537.36";

/// Settings for discovery and download of candidate images.
#[derive(Debug, Clone)]
pub struct FetchConfig {
    pub concurrency: usize,
    pub download_timeout: Duration,
    pub discovery_timeout: Duration,
    pub min_dimension: u32,
    pub max_image_bytes: u64,
    pub max_discovery_pages: usize,
    pub user_agent: String,
}

impl Default for FetchConfig {
    fn default() -> Self {
        Self {
            concurrency: DEFAULT_CONCURRENCY,
            download_timeout: DEFAULT_DOWNLOAD_TIMEOUT,
            discovery_timeout: DEFAULT_DISCOVERY_TIMEOUT,
            min_dimension: DEFAULT_MIN_DIMENSION,
            max_image_bytes: DEFAULT_MAX_IMAGE_BYTES,
            max_discovery_pages: DEFAULT_MAX_DISCOVERY_PAGES,
            user_agent: DEFAULT_USER_AGENT.to_string(),
        }
    }
}

impl FetchConfig {
    pub fn with_concurrency(mut self, concurrency: usize) -> Self {
        self.concurrency = concurrency;
        self
    }

    pub fn with_download_timeout(mut self, timeout: Duration) -> Self {
        self.download_timeout = timeout;
        self
    }

    pub fn with_discovery_timeout(mut self, timeout: Duration) -> Self {
        self.discovery_timeout = timeout;
        self
    }

    pub fn with_min_dimension(mut self, min_dimension: u32) -> Self {
        self.min_dimension = min_dimension;
        self
    }

    pub fn with_max_image_bytes(mut self, max_image_bytes: u64) -> Self {
        self.max_image_bytes = max_image_bytes;
        self
    }

    pub fn with_user_agent(mut self, user_agent: impl Into<String>) -> Self {
        self.user_agent = user_agent.into();
        self
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.concurrency == 0 {
            return Err(ConfigError::Invalid {
                field: "concurrency",
                reason: "must be at least 1".to_string(),
            });
        }
        if self.download_timeout.is_zero() {
            return Err(ConfigError::Invalid {
                field: "download_timeout",
                reason: "must be non-zero".to_string(),
            });
        }
        if self.discovery_timeout.is_zero() {
            return Err(ConfigError::Invalid {
                field: "discovery_timeout",
                reason: "must be non-zero".to_string(),
            });
        }
        if self.max_image_bytes == 0 {
            return Err(ConfigError::Invalid {
                field: "max_image_bytes",
                reason: "must be non-zero".to_string(),
            });
        }
        if self.max_discovery_pages == 0 {
            return Err(ConfigError::Invalid {
                field: "max_discovery_pages",
                reason: "must be at least 1".to_string(),
            });
        }
        Ok(())
    }
}

/// Top-level search settings.
#[derive(Debug, Clone)]
pub struct RetrievalConfig {
    pub top_n: usize,
    pub max_candidates: usize,
    pub fetch: FetchConfig,
}

impl Default for RetrievalConfig {
    fn default() -> Self {
        Self {
            top_n: DEFAULT_TOP_N,
            max_candidates: DEFAULT_MAX_CANDIDATES,
            fetch: FetchConfig::default(),
        }
    }
}

impl RetrievalConfig {
    pub fn with_top_n(mut self, top_n: usize) -> Self {
        self.top_n = top_n;
        self
    }

    pub fn with_max_candidates(mut self, max_candidates: usize) -> Self {
        self.max_candidates = max_candidates;
        self
    }

    pub fn with_fetch(mut self, fetch: FetchConfig) -> Self {
        self.fetch = fetch;
        self
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.top_n == 0 {
            return Err(ConfigError::Invalid {
                field: "top_n",
                reason: "must be at least 1".to_string(),
            });
        }
        if self.max_candidates == 0 {
            return Err(ConfigError::Invalid {
                field: "max_candidates",
                reason: "must be at least 1".to_string(),
            });
        }
        self.fetch.validate()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_are_valid() {
        let config = RetrievalConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.top_n, 10);
        assert_eq!(config.fetch.min_dimension, 100);
        assert_eq!(config.fetch.download_timeout, Duration::from_secs(10));
    }

    #[test]
    fn test_zero_concurrency_rejected() {
        let config = RetrievalConfig::default().with_fetch(FetchConfig::default().with_concurrency(0));
        assert!(matches!(
            config.validate(),
            Err(ConfigError::Invalid { field: "concurrency", .. })
        ));
    }

    #[test]
    fn test_zero_top_n_rejected() {
        let config = RetrievalConfig::default().with_top_n(0);
        assert!(config.validate().is_err());
    }
}
