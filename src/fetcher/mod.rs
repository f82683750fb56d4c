//! Candidate fetching: discovery of image URLs plus bounded parallel download
//!
//! Per-image problems (timeouts, dead links, HTML error pages, thumbnails)
//! never fail the fetch; they are logged and collected in
//! [`FetchReport::failures`]. Only discovery failures are returned as errors.

pub mod duckduckgo;
pub mod provider;
pub mod validate;

pub use duckduckgo::DuckDuckGoProvider;
pub use provider::{ImageSearchProvider, StaticProvider};

use crate::config::FetchConfig;
use crate::error::{ConfigError, DiscoveryError, DownloadError};
use bytes::Bytes;
use futures::stream::{self, StreamExt};
use image::DynamicImage;
use reqwest::header::CONTENT_TYPE;
use reqwest::Client;
use std::collections::BTreeMap;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

const TRACING_TARGET: &str = "imgseek::fetcher";

/// A downloaded, decoded and validated candidate image.
#[derive(Clone)]
pub struct Candidate {
    /// Source URL; unique within one fetch
    pub url: String,
    /// Position in the discovery order (after URL cleanup)
    pub position: usize,
    pub content_type: Option<String>,
    /// Decoded pixels; the downloaded body is released after decoding
    pub image: DynamicImage,
}

impl std::fmt::Debug for Candidate {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Candidate")
            .field("url", &self.url)
            .field("position", &self.position)
            .field("content_type", &self.content_type)
            .field("width", &self.image.width())
            .field("height", &self.image.height())
            .finish()
    }
}

/// A candidate that was dropped, and why.
#[derive(Debug, Clone, PartialEq)]
pub struct ItemFailure {
    pub url: String,
    pub position: usize,
    pub error: DownloadError,
}

/// Outcome of one fetch: surviving candidates in discovery order plus the
/// per-item failure log.
#[derive(Debug, Default)]
pub struct FetchReport {
    /// URLs the provider returned, before cleanup
    pub discovered: usize,
    /// URLs discarded before download (invalid, duplicate, over the limit)
    pub discarded: usize,
    pub candidates: Vec<Candidate>,
    pub failures: Vec<ItemFailure>,
}

impl FetchReport {
    /// Failure counts keyed by [`DownloadError::kind`].
    pub fn failure_counts(&self) -> BTreeMap<&'static str, usize> {
        let mut counts = BTreeMap::new();
        for failure in &self.failures {
            *counts.entry(failure.error.kind()).or_insert(0) += 1;
        }
        counts
    }

    /// Number of URLs a download was attempted for
    pub fn attempted(&self) -> usize {
        self.candidates.len() + self.failures.len()
    }
}

/// Discovers candidate URLs through an [`ImageSearchProvider`] and downloads
/// them with bounded concurrency.
#[derive(Clone)]
pub struct CandidateFetcher {
    provider: Arc<dyn ImageSearchProvider>,
    http: Client,
    config: FetchConfig,
}

impl std::fmt::Debug for CandidateFetcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CandidateFetcher")
            .field("provider", &self.provider.name())
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

impl CandidateFetcher {
    pub fn new(provider: Arc<dyn ImageSearchProvider>, config: FetchConfig) -> Result<Self, ConfigError> {
        config.validate()?;
        let http = Client::builder()
            .user_agent(&config.user_agent)
            .connect_timeout(config.download_timeout)
            .build()?;

        tracing::debug!(
            target: TRACING_TARGET,
            provider = provider.name(),
            concurrency = config.concurrency,
            timeout_ms = config.download_timeout.as_millis(),
            "Created candidate fetcher"
        );
        Ok(Self {
            provider,
            http,
            config,
        })
    }

    /// Discover up to `max_candidates` images for `query` and download them.
    ///
    /// Fails only when discovery itself fails or yields no usable URL.
    pub async fn fetch(
        &self,
        query: &str,
        max_candidates: usize,
        cancel: &CancellationToken,
    ) -> Result<FetchReport, DiscoveryError> {
        let raw = self.discover(query, max_candidates, cancel).await?;
        let discovered = raw.len();
        let (urls, discarded) = validate::prepare_urls(raw, max_candidates);
        if urls.is_empty() {
            return Err(DiscoveryError::NoResults {
                query: query.to_string(),
            });
        }

        tracing::debug!(
            target: TRACING_TARGET,
            query,
            discovered,
            discarded,
            downloading = urls.len(),
            "Downloading candidates"
        );

        let outcomes: Vec<(usize, String, Result<Candidate, DownloadError>)> =
            stream::iter(urls.into_iter().enumerate())
                .map(|(position, url)| async move {
                    let outcome = self.download_candidate(position, &url, cancel).await;
                    (position, url, outcome)
                })
                .buffered(self.config.concurrency)
                .collect()
                .await;

        let mut report = FetchReport {
            discovered,
            discarded,
            ..FetchReport::default()
        };
        for (position, url, outcome) in outcomes {
            match outcome {
                Ok(candidate) => report.candidates.push(candidate),
                Err(error) => {
                    tracing::debug!(
                        target: TRACING_TARGET,
                        url = %url,
                        reason = %error,
                        "Dropping candidate"
                    );
                    report.failures.push(ItemFailure {
                        url,
                        position,
                        error,
                    });
                }
            }
        }

        tracing::info!(
            target: TRACING_TARGET,
            query,
            fetched = report.candidates.len(),
            failed = report.failures.len(),
            "Candidate fetch finished"
        );
        Ok(report)
    }

    async fn discover(
        &self,
        query: &str,
        limit: usize,
        cancel: &CancellationToken,
    ) -> Result<Vec<String>, DiscoveryError> {
        let timeout = self.config.discovery_timeout;
        let discovery = tokio::time::timeout(timeout, self.provider.discover(query, limit));
        tokio::select! {
            biased;
            _ = cancel.cancelled() => Err(DiscoveryError::Cancelled),
            result = discovery => result.unwrap_or(Err(DiscoveryError::Timeout(timeout))),
        }
    }

    async fn download_candidate(
        &self,
        position: usize,
        url: &str,
        cancel: &CancellationToken,
    ) -> Result<Candidate, DownloadError> {
        let timeout = self.config.download_timeout;
        let download = tokio::time::timeout(timeout, self.download(url));
        let (bytes, content_type) = tokio::select! {
            biased;
            _ = cancel.cancelled() => Err(DownloadError::Cancelled),
            result = download => result.unwrap_or(Err(DownloadError::Timeout(timeout))),
        }?;

        let min_dimension = self.config.min_dimension;
        let image = tokio::task::spawn_blocking(move || validate::decode_image(&bytes, min_dimension))
            .await
            .map_err(|e| DownloadError::Undecodable(e.to_string()))??;

        Ok(Candidate {
            url: url.to_string(),
            position,
            content_type,
            image,
        })
    }

    async fn download(&self, url: &str) -> Result<(Bytes, Option<String>), DownloadError> {
        let mut response = self
            .http
            .get(url)
            .send()
            .await
            .map_err(|e| DownloadError::Connection(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            return Err(DownloadError::HttpStatus(status.as_u16()));
        }

        let content_type = response
            .headers()
            .get(CONTENT_TYPE)
            .and_then(|value| value.to_str().ok())
            .map(str::to_string);
        validate::check_content_type(content_type.as_deref())?;

        let limit = self.config.max_image_bytes;
        if let Some(size) = response.content_length() {
            if size > limit {
                return Err(DownloadError::TooLarge { size, limit });
            }
        }

        let mut body = Vec::new();
        while let Some(chunk) = response
            .chunk()
            .await
            .map_err(|e| DownloadError::Connection(e.to_string()))?
        {
            let size = (body.len() + chunk.len()) as u64;
            if size > limit {
                return Err(DownloadError::TooLarge { size, limit });
            }
            body.extend_from_slice(&chunk);
        }

        Ok((Bytes::from(body), content_type))
    }
}
