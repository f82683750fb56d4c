//! Error types for the retrieval pipeline
//!
//! Each boundary gets its own enum: per-item failures (`DownloadError`,
//! `ExtractionError` for candidates) are swallowed and counted by the
//! pipeline, while `SearchError` is what callers of the orchestrator see.

use crate::orchestrator::SearchStage;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Duration;
use thiserror::Error;

/// Result type alias for orchestrator-level operations
pub type Result<T> = std::result::Result<T, SearchError>;

/// Errors from vector construction and comparison
#[derive(Error, Debug, Clone, PartialEq)]
pub enum VectorError {
    #[error("Dimension mismatch: expected {expected}, got {actual}")]
    DimensionMismatch { expected: usize, actual: usize },

    #[error("Invalid vector: {reason}")]
    InvalidVector { reason: String },
}

/// Errors raised while turning an image into a feature vector.
///
/// `origin` identifies the image (candidate URL or query path).
#[derive(Error, Debug)]
pub enum ExtractionError {
    #[error("cannot decode image {origin}: {reason}")]
    Decode { origin: String, reason: String },

    #[error("cannot read image {origin}: {error}")]
    Io {
        origin: String,
        #[source]
        error: std::io::Error,
    },

    #[error("inference failed for {origin}: {reason}")]
    Inference { origin: String, reason: String },

    #[error("backbone produced {actual} features for {origin}, expected {expected}")]
    DimensionMismatch {
        origin: String,
        expected: usize,
        actual: usize,
    },

    #[error("degenerate feature vector for {origin}: {reason}")]
    Degenerate { origin: String, reason: String },

    #[error("failed to load model: {reason}")]
    ModelLoad { reason: String },
}

impl ExtractionError {
    /// The image this failure refers to, if any.
    pub fn origin(&self) -> Option<&str> {
        match self {
            ExtractionError::Decode { origin, .. }
            | ExtractionError::Io { origin, .. }
            | ExtractionError::Inference { origin, .. }
            | ExtractionError::DimensionMismatch { origin, .. }
            | ExtractionError::Degenerate { origin, .. } => Some(origin),
            ExtractionError::ModelLoad { .. } => None,
        }
    }
}

/// Why a single candidate download was dropped
#[derive(Error, Debug, Clone, PartialEq)]
pub enum DownloadError {
    #[error("timed out after {0:?}")]
    Timeout(Duration),

    #[error("cancelled")]
    Cancelled,

    #[error("connection failed: {0}")]
    Connection(String),

    #[error("HTTP status {0}")]
    HttpStatus(u16),

    #[error("not an image (content type {content_type})")]
    NotAnImage { content_type: String },

    #[error("body of {size} bytes exceeds limit of {limit}")]
    TooLarge { size: u64, limit: u64 },

    #[error("undecodable image: {0}")]
    Undecodable(String),

    #[error("image {width}x{height} below minimum dimension {min}")]
    TooSmall { width: u32, height: u32, min: u32 },
}

impl DownloadError {
    /// Short machine-readable reason, used to aggregate failure counts.
    pub fn kind(&self) -> &'static str {
        match self {
            DownloadError::Timeout(_) => "timeout",
            DownloadError::Cancelled => "cancelled",
            DownloadError::Connection(_) => "connection",
            DownloadError::HttpStatus(_) => "http_status",
            DownloadError::NotAnImage { .. } => "not_an_image",
            DownloadError::TooLarge { .. } => "too_large",
            DownloadError::Undecodable(_) => "undecodable",
            DownloadError::TooSmall { .. } => "too_small",
        }
    }
}

/// Failures of the discovery step (the provider query itself)
#[derive(Error, Debug, Clone, PartialEq)]
pub enum DiscoveryError {
    #[error("provider unreachable: {0}")]
    Unreachable(String),

    #[error("provider rate-limited the request (HTTP {0})")]
    RateLimited(u16),

    #[error("provider did not answer within {0:?}")]
    Timeout(Duration),

    #[error("malformed provider response: {0}")]
    MalformedResponse(String),

    #[error("provider returned no image results for {query:?}")]
    NoResults { query: String },

    #[error("discovery cancelled")]
    Cancelled,
}

/// Machine-checkable category of a fatal search failure
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ErrorCategory {
    NoResults,
    ExtractionFailed,
    ProviderUnreachable,
}

impl ErrorCategory {
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorCategory::NoResults => "no-results",
            ErrorCategory::ExtractionFailed => "extraction-failed",
            ErrorCategory::ProviderUnreachable => "provider-unreachable",
        }
    }
}

impl fmt::Display for ErrorCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Request-level failure returned by the orchestrator
#[derive(Error, Debug)]
pub enum SearchError {
    #[error("query image could not be processed: {0}")]
    QueryImage(#[source] ExtractionError),

    #[error("image search provider failed: {0}")]
    Provider(#[source] DiscoveryError),

    #[error("no results for {query:?}: {reason}")]
    NoResults { query: String, reason: String },

    #[error("none of the {attempted} downloaded candidates could be indexed")]
    NoIndexableCandidates { attempted: usize },

    #[error("search cancelled during {stage}")]
    Cancelled { stage: SearchStage },

    #[error("internal error during {stage}: {reason}")]
    Internal { stage: SearchStage, reason: String },
}

impl SearchError {
    /// Category reported to callers alongside the human-readable reason.
    pub fn category(&self) -> ErrorCategory {
        match self {
            SearchError::QueryImage(_)
            | SearchError::NoIndexableCandidates { .. }
            | SearchError::Internal { .. } => ErrorCategory::ExtractionFailed,
            SearchError::Provider(DiscoveryError::NoResults { .. })
            | SearchError::NoResults { .. } => ErrorCategory::NoResults,
            SearchError::Provider(_) | SearchError::Cancelled { .. } => {
                ErrorCategory::ProviderUnreachable
            }
        }
    }

    /// The pipeline stage the request was in when it failed.
    pub fn stage(&self) -> SearchStage {
        match self {
            SearchError::QueryImage(_) => SearchStage::Received,
            SearchError::Provider(_) | SearchError::NoResults { .. } => {
                SearchStage::FetchingCandidates
            }
            SearchError::NoIndexableCandidates { .. } => SearchStage::Indexing,
            SearchError::Cancelled { stage } | SearchError::Internal { stage, .. } => *stage,
        }
    }
}

/// Invalid configuration or client setup
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("invalid value for {field}: {reason}")]
    Invalid { field: &'static str, reason: String },

    #[error("HTTP client setup failed: {0}")]
    HttpClient(#[from] reqwest::Error),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_category_mapping() {
        let err = SearchError::Provider(DiscoveryError::RateLimited(429));
        assert_eq!(err.category(), ErrorCategory::ProviderUnreachable);

        let err = SearchError::Provider(DiscoveryError::NoResults {
            query: "cats".to_string(),
        });
        assert_eq!(err.category(), ErrorCategory::NoResults);

        let err = SearchError::NoIndexableCandidates { attempted: 3 };
        assert_eq!(err.category(), ErrorCategory::ExtractionFailed);
        assert_eq!(err.stage(), SearchStage::Indexing);
    }

    #[test]
    fn test_category_serializes_kebab_case() {
        let json = serde_json::to_string(&ErrorCategory::ProviderUnreachable).unwrap();
        assert_eq!(json, "\"provider-unreachable\"");
        assert_eq!(ErrorCategory::NoResults.to_string(), "no-results");
    }

    #[test]
    fn test_download_error_kind() {
        let err = DownloadError::TooSmall {
            width: 20,
            height: 400,
            min: 100,
        };
        assert_eq!(err.kind(), "too_small");
        assert!(err.to_string().contains("20x400"));
    }
}
