//! Image-search providers used for candidate discovery

use crate::error::DiscoveryError;
use async_trait::async_trait;

/// Something that turns a text query into candidate image URLs.
///
/// Implementations return URLs in the provider's ranking order and may
/// return duplicates or fewer than `limit`; the fetcher cleans up.
#[async_trait]
pub trait ImageSearchProvider: Send + Sync {
    fn name(&self) -> &str;

    async fn discover(&self, query: &str, limit: usize) -> Result<Vec<String>, DiscoveryError>;
}

/// A provider that answers every query with a fixed URL list.
#[derive(Debug, Clone, Default)]
pub struct StaticProvider {
    urls: Vec<String>,
}

impl StaticProvider {
    pub fn new<I, S>(urls: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            urls: urls.into_iter().map(Into::into).collect(),
        }
    }
}

#[async_trait]
impl ImageSearchProvider for StaticProvider {
    fn name(&self) -> &str {
        "static"
    }

    async fn discover(&self, query: &str, limit: usize) -> Result<Vec<String>, DiscoveryError> {
        if self.urls.is_empty() {
            return Err(DiscoveryError::NoResults {
                query: query.to_string(),
            });
        }
        Ok(self.urls.iter().take(limit).cloned().collect())
    }
}
