//! # imgseek
//!
//! Content-based image retrieval over a live, on-the-fly image corpus.
//!
//! A search takes a query image and a query text. The text is sent to an
//! image-search provider to discover candidate images, which are downloaded
//! in parallel, embedded with a frozen CNN backbone, and ranked against the
//! query image's embedding in a throwaway flat index.
//!
//! This library provides:
//! - Unit-normalized feature vectors and cosine similarity via L2 distance
//! - Feature extraction (ONNX backbone or a model-free pooled-pixel one)
//! - Candidate discovery and bounded, fault-tolerant download
//! - The per-request retrieval orchestrator and an HTTP API
//!
//! ## Example
//!
//! ```rust,no_run
//! use std::path::Path;
//! use std::sync::Arc;
//! use imgseek::{DuckDuckGoProvider, FeatureExtractor, Retriever};
//! use imgseek::config::RetrievalConfig;
//!
//! # async fn run() -> Result<(), Box<dyn std::error::Error>> {
//! let config = RetrievalConfig::default();
//! let provider = DuckDuckGoProvider::new(&config.fetch)?;
//! let retriever = Retriever::new(FeatureExtractor::thumbnail(), Arc::new(provider), config)?;
//!
//! let output = retriever.search(Path::new("query.jpg"), "red sports car").await?;
//! for hit in output.results {
//!     println!("{} {:.3}", hit.url, hit.similarity);
//! }
//! # Ok(())
//! # }
//! ```

pub mod config;
pub mod distance;
pub mod error;
pub mod extractor;
pub mod fetcher;
pub mod index;
pub mod metrics;
pub mod orchestrator;
pub mod server;
pub mod vector;

pub use config::{FetchConfig, RetrievalConfig};
pub use error::{ErrorCategory, Result, SearchError};
pub use extractor::{Backbone, FeatureExtractor};
pub use fetcher::{Candidate, CandidateFetcher, DuckDuckGoProvider, ImageSearchProvider, StaticProvider};
pub use index::{Neighbor, SimilarityIndex};
pub use orchestrator::{RankedResult, Retriever, SearchOutput, SearchStage};
pub use vector::FeatureVector;
