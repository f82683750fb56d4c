//! DuckDuckGo image search provider
//!
//! Discovery is two steps: the HTML search page hands out a `vqd` token,
//! which then authorizes paging through the `i.js` JSON endpoint.

use super::provider::ImageSearchProvider;
use crate::config::FetchConfig;
use crate::error::{ConfigError, DiscoveryError};
use async_trait::async_trait;
use reqwest::header::REFERER;
use reqwest::{Client, Response, StatusCode};
use serde::Deserialize;
use url::Url;

const TRACING_TARGET: &str = "imgseek::fetcher::duckduckgo";

pub const DEFAULT_BASE_URL: &str = "https://duckduckgo.com/";

/// Region code sent with every query.
pub const DEFAULT_REGION: &str = "us-en";

#[derive(Debug, Deserialize)]
struct ImagePage {
    #[serde(default)]
    results: Vec<ImageHit>,
    next: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ImageHit {
    image: String,
}

/// Unauthenticated client for DuckDuckGo image search.
#[derive(Debug, Clone)]
pub struct DuckDuckGoProvider {
    http: Client,
    base_url: Url,
    region: String,
    max_pages: usize,
}

impl DuckDuckGoProvider {
    pub fn new(config: &FetchConfig) -> Result<Self, ConfigError> {
        Self::with_base_url(config, DEFAULT_BASE_URL)
    }

    /// Point the provider at another host (a mirror or a local stand-in).
    pub fn with_base_url(config: &FetchConfig, base_url: &str) -> Result<Self, ConfigError> {
        let base_url = Url::parse(base_url).map_err(|e| ConfigError::Invalid {
            field: "provider_url",
            reason: e.to_string(),
        })?;
        let http = Client::builder()
            .user_agent(&config.user_agent)
            .connect_timeout(config.discovery_timeout)
            .build()?;

        Ok(Self {
            http,
            base_url,
            region: DEFAULT_REGION.to_string(),
            max_pages: config.max_discovery_pages,
        })
    }

    pub fn with_region(mut self, region: impl Into<String>) -> Self {
        self.region = region.into();
        self
    }

    async fn token(&self, query: &str) -> Result<String, DiscoveryError> {
        let response = self
            .http
            .get(self.base_url.clone())
            .query(&[("q", query), ("iax", "images"), ("ia", "images")])
            .send()
            .await
            .map_err(request_error)?;
        let body = check_status(response)?
            .text()
            .await
            .map_err(request_error)?;

        extract_vqd(&body).ok_or_else(|| {
            DiscoveryError::MalformedResponse("search token (vqd) not found in page".to_string())
        })
    }

    async fn page(&self, url: Url) -> Result<ImagePage, DiscoveryError> {
        let response = self
            .http
            .get(url)
            .header(REFERER, self.base_url.as_str())
            .send()
            .await
            .map_err(request_error)?;
        check_status(response)?
            .json::<ImagePage>()
            .await
            .map_err(|e| DiscoveryError::MalformedResponse(e.to_string()))
    }

    fn first_page_url(&self, query: &str, vqd: &str) -> Result<Url, DiscoveryError> {
        let mut url = self
            .base_url
            .join("i.js")
            .map_err(|e| DiscoveryError::MalformedResponse(e.to_string()))?;
        url.query_pairs_mut()
            .append_pair("l", &self.region)
            .append_pair("o", "json")
            .append_pair("q", query)
            .append_pair("vqd", vqd)
            .append_pair("f", ",,,,,")
            .append_pair("p", "1");
        Ok(url)
    }

    fn next_page_url(&self, next: &str, vqd: &str) -> Option<Url> {
        let mut url = self.base_url.join(next).ok()?;
        if !url.query_pairs().any(|(key, _)| key == "vqd") {
            url.query_pairs_mut().append_pair("vqd", vqd);
        }
        Some(url)
    }
}

#[async_trait]
impl ImageSearchProvider for DuckDuckGoProvider {
    fn name(&self) -> &str {
        "duckduckgo"
    }

    async fn discover(&self, query: &str, limit: usize) -> Result<Vec<String>, DiscoveryError> {
        let vqd = self.token(query).await?;
        let mut next = Some(self.first_page_url(query, &vqd)?);
        let mut urls = Vec::new();
        let mut pages = 0;

        while let Some(url) = next.take() {
            if pages == self.max_pages || urls.len() >= limit {
                break;
            }
            let page = self.page(url).await?;
            pages += 1;
            urls.extend(page.results.into_iter().map(|hit| hit.image));
            next = page
                .next
                .as_deref()
                .and_then(|path| self.next_page_url(path, &vqd));
        }

        tracing::debug!(
            target: TRACING_TARGET,
            query,
            pages,
            found = urls.len(),
            "Image search finished"
        );

        if urls.is_empty() {
            return Err(DiscoveryError::NoResults {
                query: query.to_string(),
            });
        }
        urls.truncate(limit);
        Ok(urls)
    }
}

fn request_error(e: reqwest::Error) -> DiscoveryError {
    DiscoveryError::Unreachable(e.to_string())
}

fn check_status(response: Response) -> Result<Response, DiscoveryError> {
    let status = response.status();
    match status {
        StatusCode::FORBIDDEN | StatusCode::TOO_MANY_REQUESTS => {
            Err(DiscoveryError::RateLimited(status.as_u16()))
        }
        s if s.is_success() => Ok(response),
        s => Err(DiscoveryError::Unreachable(format!("HTTP {}", s.as_u16()))),
    }
}

/// Pull the `vqd` token out of the search page, in any of the quoting
/// styles the page has used (`vqd="…"`, `vqd='…'`, `vqd=…&`).
fn extract_vqd(body: &str) -> Option<String> {
    body.match_indices("vqd=").find_map(|(i, _)| {
        let rest = body[i + 4..].trim_start_matches(['"', '\'']);
        let token: String = rest
            .chars()
            .take_while(|c| c.is_ascii_digit() || *c == '-')
            .collect();
        (!token.is_empty()).then_some(token)
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_extract_vqd_variants() {
        assert_eq!(
            extract_vqd(r#"<script>vqd="4-1234567890123";</script>"#).as_deref(),
            Some("4-1234567890123")
        );
        assert_eq!(extract_vqd("vqd='4-99'").as_deref(), Some("4-99"));
        assert_eq!(
            extract_vqd("href=/?q=cat&vqd=3-555&ia=images").as_deref(),
            Some("3-555")
        );
        assert_eq!(extract_vqd("no token here"), None);
    }

    #[test]
    fn test_extract_vqd_skips_empty_match() {
        assert_eq!(extract_vqd("vqd=\"\" ... vqd=\"4-7\"").as_deref(), Some("4-7"));
    }

    #[test]
    fn test_first_page_url() {
        let provider = DuckDuckGoProvider::new(&FetchConfig::default()).unwrap();
        let url = provider.first_page_url("red car", "4-1").unwrap();
        assert_eq!(url.path(), "/i.js");
        let pairs: Vec<(String, String)> = url.query_pairs().into_owned().collect();
        assert!(pairs.contains(&("q".to_string(), "red car".to_string())));
        assert!(pairs.contains(&("vqd".to_string(), "4-1".to_string())));
        assert!(pairs.contains(&("o".to_string(), "json".to_string())));
    }

    #[test]
    fn test_next_page_url_carries_token() {
        let provider = DuckDuckGoProvider::new(&FetchConfig::default()).unwrap();
        let url = provider
            .next_page_url("i.js?q=cat&o=json&p=2&s=100", "4-1")
            .unwrap();
        assert!(url.query_pairs().any(|(k, v)| k == "vqd" && v == "4-1"));
        assert!(url.query_pairs().any(|(k, v)| k == "s" && v == "100"));
    }
}
