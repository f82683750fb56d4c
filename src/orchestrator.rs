//! Retrieval orchestrator: query image + query text -> ranked similar images
//!
//! One call to [`Retriever::search`] walks a request through
//! `Received -> FetchingCandidates -> ExtractingFeatures -> Indexing ->
//! Ranking -> Done`; any stage may end in `Failed`. Everything built along
//! the way (candidates, vectors, index) is owned by the call and dropped
//! when it returns.

use crate::config::RetrievalConfig;
use crate::error::{ConfigError, DiscoveryError, Result, SearchError};
use crate::extractor::FeatureExtractor;
use crate::fetcher::{Candidate, CandidateFetcher, ImageSearchProvider};
use crate::index::{Neighbor, SimilarityIndex};
use crate::vector::FeatureVector;
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio_util::sync::CancellationToken;

const TRACING_TARGET: &str = "imgseek::orchestrator";

/// Lifecycle stage of a single search request
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SearchStage {
    Received,
    FetchingCandidates,
    ExtractingFeatures,
    Indexing,
    Ranking,
    Done,
    Failed,
}

impl SearchStage {
    pub fn as_str(&self) -> &'static str {
        match self {
            SearchStage::Received => "received",
            SearchStage::FetchingCandidates => "fetching_candidates",
            SearchStage::ExtractingFeatures => "extracting_features",
            SearchStage::Indexing => "indexing",
            SearchStage::Ranking => "ranking",
            SearchStage::Done => "done",
            SearchStage::Failed => "failed",
        }
    }
}

impl fmt::Display for SearchStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One ranked hit
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RankedResult {
    pub url: String,
    /// Cosine similarity to the query in [0, 1], rounded to 3 decimals
    pub similarity: f32,
}

/// Per-request bookkeeping for observability
#[derive(Debug, Clone, Default, Serialize)]
pub struct SearchStats {
    pub discovered: usize,
    /// Discovered URLs skipped before download (invalid, duplicate, over the cap)
    pub discarded: usize,
    pub downloaded: usize,
    pub indexed: usize,
    pub download_failures: BTreeMap<String, usize>,
    pub extraction_failures: usize,
    #[serde(rename = "elapsed_ms", serialize_with = "serialize_millis")]
    pub elapsed: Duration,
}

fn serialize_millis<S: serde::Serializer>(d: &Duration, s: S) -> std::result::Result<S::Ok, S::Error> {
    s.serialize_u64(d.as_millis() as u64)
}

/// A successful search: a non-empty ranked list plus stats
#[derive(Debug, Clone, Serialize)]
pub struct SearchOutput {
    pub results: Vec<RankedResult>,
    pub stats: SearchStats,
}

/// Composes extractor, fetcher and a per-request index.
#[derive(Debug, Clone)]
pub struct Retriever {
    extractor: FeatureExtractor,
    fetcher: CandidateFetcher,
    config: RetrievalConfig,
}

impl Retriever {
    /// The candidate fetcher is built from `config.fetch`.
    pub fn new(
        extractor: FeatureExtractor,
        provider: Arc<dyn ImageSearchProvider>,
        config: RetrievalConfig,
    ) -> std::result::Result<Self, ConfigError> {
        config.validate()?;
        let fetcher = CandidateFetcher::new(provider, config.fetch.clone())?;
        Ok(Self {
            extractor,
            fetcher,
            config,
        })
    }

    /// Readiness check: the model is loaded and produces vectors.
    pub fn is_ready(&self) -> bool {
        self.extractor.dimension() > 0
    }

    pub fn backbone_name(&self) -> &str {
        self.extractor.backbone_name()
    }

    /// Rank images found for `query_text` by similarity to the image at `query_image`.
    pub async fn search(&self, query_image: &Path, query_text: &str) -> Result<SearchOutput> {
        self.search_with_cancel(query_image, query_text, &CancellationToken::new())
            .await
    }

    /// Like [`Retriever::search`], aborting outstanding network work once
    /// `cancel` fires.
    pub async fn search_with_cancel(
        &self,
        query_image: &Path,
        query_text: &str,
        cancel: &CancellationToken,
    ) -> Result<SearchOutput> {
        let started = Instant::now();
        tracing::debug!(
            target: TRACING_TARGET,
            stage = %SearchStage::Received,
            image = %query_image.display(),
            query = query_text,
            "Search received"
        );

        let outcome = self.run(query_image, query_text, cancel, started).await;
        match &outcome {
            Ok(output) => tracing::info!(
                target: TRACING_TARGET,
                stage = %SearchStage::Done,
                query = query_text,
                results = output.results.len(),
                indexed = output.stats.indexed,
                elapsed_ms = output.stats.elapsed.as_millis() as u64,
                "Search finished"
            ),
            Err(error) => tracing::warn!(
                target: TRACING_TARGET,
                stage = %SearchStage::Failed,
                failed_during = %error.stage(),
                category = %error.category(),
                query = query_text,
                error = %error,
                "Search failed"
            ),
        }
        outcome
    }

    async fn run(
        &self,
        query_image: &Path,
        query_text: &str,
        cancel: &CancellationToken,
        started: Instant,
    ) -> Result<SearchOutput> {
        let query = self.extract_query(query_image.to_path_buf()).await?;

        transition(SearchStage::FetchingCandidates);
        let report = self
            .fetcher
            .fetch(query_text, self.config.max_candidates, cancel)
            .await
            .map_err(|error| match error {
                DiscoveryError::Cancelled => SearchError::Cancelled {
                    stage: SearchStage::FetchingCandidates,
                },
                other => SearchError::Provider(other),
            })?;

        if cancel.is_cancelled() {
            return Err(SearchError::Cancelled {
                stage: SearchStage::FetchingCandidates,
            });
        }
        if report.candidates.is_empty() {
            return Err(SearchError::NoResults {
                query: query_text.to_string(),
                reason: format!(
                    "all {} candidate downloads failed validation",
                    report.attempted()
                ),
            });
        }

        let mut stats = SearchStats {
            discovered: report.discovered,
            discarded: report.discarded,
            downloaded: report.candidates.len(),
            download_failures: report
                .failure_counts()
                .into_iter()
                .map(|(kind, count)| (kind.to_string(), count))
                .collect(),
            ..SearchStats::default()
        };

        transition(SearchStage::ExtractingFeatures);
        let attempted = report.candidates.len();
        let extracted = self.extract_candidates(report.candidates).await?;
        stats.extraction_failures = attempted - extracted.len();

        transition(SearchStage::Indexing);
        if extracted.is_empty() {
            return Err(SearchError::NoIndexableCandidates { attempted });
        }
        let (urls, vectors): (Vec<String>, Vec<FeatureVector>) = extracted.into_iter().unzip();
        let index = SimilarityIndex::build(vectors.into_iter().enumerate()).map_err(|e| {
            SearchError::Internal {
                stage: SearchStage::Indexing,
                reason: e.to_string(),
            }
        })?;
        stats.indexed = index.len();

        transition(SearchStage::Ranking);
        let neighbors = index
            .search(&query, index.len())
            .map_err(|e| SearchError::Internal {
                stage: SearchStage::Ranking,
                reason: e.to_string(),
            })?;
        let results = rank(neighbors, &urls, self.config.top_n);

        stats.elapsed = started.elapsed();
        Ok(SearchOutput { results, stats })
    }

    async fn extract_query(&self, path: PathBuf) -> Result<FeatureVector> {
        let extractor = self.extractor.clone();
        tokio::task::spawn_blocking(move || extractor.extract_path(&path))
            .await
            .map_err(|e| SearchError::Internal {
                stage: SearchStage::Received,
                reason: e.to_string(),
            })?
            .map_err(SearchError::QueryImage)
    }

    /// Embed every candidate on the rayon pool; failures are logged and
    /// skipped. Output keeps discovery order.
    async fn extract_candidates(&self, candidates: Vec<Candidate>) -> Result<Vec<(String, FeatureVector)>> {
        let extractor = self.extractor.clone();
        let outcomes = tokio::task::spawn_blocking(move || {
            candidates
                .into_par_iter()
                .map(|candidate| {
                    let vector = extractor.extract(&candidate.url, &candidate.image);
                    (candidate.url, vector)
                })
                .collect::<Vec<_>>()
        })
        .await
        .map_err(|e| SearchError::Internal {
            stage: SearchStage::ExtractingFeatures,
            reason: e.to_string(),
        })?;

        Ok(outcomes
            .into_iter()
            .filter_map(|(url, outcome)| match outcome {
                Ok(vector) => Some((url, vector)),
                Err(error) => {
                    tracing::debug!(
                        target: TRACING_TARGET,
                        url = %url,
                        error = %error,
                        "Excluding candidate from index"
                    );
                    None
                }
            })
            .collect())
    }
}

fn transition(stage: SearchStage) {
    tracing::debug!(target: TRACING_TARGET, stage = %stage, "Search stage");
}

/// Round similarities for reporting, then order by the rounded value so that
/// scores reported as equal fall back to fetch order (the index ids).
fn rank(neighbors: Vec<Neighbor>, urls: &[String], top_n: usize) -> Vec<RankedResult> {
    let mut rounded: Vec<(usize, f32)> = neighbors
        .into_iter()
        .map(|neighbor| (neighbor.id, round_similarity(neighbor.similarity)))
        .collect();
    rounded.sort_by(|a, b| b.1.total_cmp(&a.1).then(a.0.cmp(&b.0)));
    rounded
        .into_iter()
        .take(top_n)
        .filter_map(|(id, similarity)| {
            urls.get(id).map(|url| RankedResult {
                url: url.clone(),
                similarity,
            })
        })
        .collect()
}

fn round_similarity(similarity: f32) -> f32 {
    (similarity * 1000.0).round() / 1000.0
}
