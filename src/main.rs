//! CLI interface for image retrieval

use anyhow::{bail, Context, Result};
use clap::{Args, Parser, Subcommand, ValueEnum};
use imgseek::config::{
    FetchConfig, RetrievalConfig, DEFAULT_CONCURRENCY, DEFAULT_MAX_CANDIDATES, DEFAULT_MIN_DIMENSION,
    DEFAULT_TOP_N,
};
use imgseek::extractor::{OnnxOptions, DEFAULT_INPUT_SIZE};
use imgseek::fetcher::duckduckgo::{DEFAULT_BASE_URL, DEFAULT_REGION};
use imgseek::{DuckDuckGoProvider, FeatureExtractor, Retriever};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

#[derive(Parser)]
#[command(name = "imgseek")]
#[command(about = "Find images on the web that look like a query image", long_about = None)]
struct Cli {
    #[command(flatten)]
    retrieval: RetrievalArgs,

    /// Log at debug level regardless of RUST_LOG
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(ValueEnum, Clone, Copy, PartialEq, Eq)]
enum BackboneKind {
    /// Frozen CNN loaded from --model
    Onnx,
    /// Pooled-pixel embedding, no model file needed
    Thumbnail,
}

#[derive(Args, Clone)]
struct RetrievalArgs {
    /// Feature backbone to use
    #[arg(long, value_enum, default_value = "onnx", env = "IMGSEEK_BACKBONE")]
    backbone: BackboneKind,

    /// Path to the ONNX model (e.g. a VGG19 export)
    #[arg(long, env = "IMGSEEK_MODEL")]
    model: Option<PathBuf>,

    /// Graph node to read embeddings from (e.g. the fc7 layer)
    #[arg(long, env = "IMGSEEK_OUTPUT_LAYER")]
    output_layer: Option<String>,

    /// Square input resolution of the model
    #[arg(long, default_value_t = DEFAULT_INPUT_SIZE)]
    input_size: u32,

    /// Image search endpoint
    #[arg(long, default_value = DEFAULT_BASE_URL, env = "IMGSEEK_PROVIDER_URL")]
    provider_url: String,

    /// Search region sent to the provider (e.g. us-en, de-de, wt-wt)
    #[arg(long, default_value = DEFAULT_REGION, env = "IMGSEEK_REGION")]
    region: String,

    /// Number of ranked results to return
    #[arg(long, default_value_t = DEFAULT_TOP_N, env = "IMGSEEK_TOP_N")]
    top_n: usize,

    /// Maximum candidate images fetched per search
    #[arg(long, default_value_t = DEFAULT_MAX_CANDIDATES, env = "IMGSEEK_MAX_CANDIDATES")]
    max_candidates: usize,

    /// Parallel downloads per search
    #[arg(long, default_value_t = DEFAULT_CONCURRENCY, env = "IMGSEEK_CONCURRENCY")]
    concurrency: usize,

    /// Per-download timeout in seconds
    #[arg(long, default_value = "10", env = "IMGSEEK_DOWNLOAD_TIMEOUT")]
    download_timeout_secs: u64,

    /// Discovery timeout in seconds
    #[arg(long, default_value = "15", env = "IMGSEEK_DISCOVERY_TIMEOUT")]
    discovery_timeout_secs: u64,

    /// Candidates smaller than this (either side, pixels) are dropped
    #[arg(long, default_value_t = DEFAULT_MIN_DIMENSION, env = "IMGSEEK_MIN_DIMENSION")]
    min_dimension: u32,
}

#[derive(Subcommand)]
enum Commands {
    /// Search for images similar to a local image
    Search {
        /// Query image
        image: PathBuf,
        /// Text used to discover candidate images
        #[arg(short, long, default_value = "similar images")]
        query: String,
        /// Print the full response as JSON
        #[arg(long)]
        json: bool,
    },
    /// Start the HTTP API server
    Serve {
        /// Address to bind to
        #[arg(long, default_value = "0.0.0.0:5000")]
        addr: String,
        /// Directory holding uploaded query images
        #[arg(long, default_value = "static/uploads", env = "IMGSEEK_UPLOADS_DIR")]
        uploads_dir: PathBuf,
    },
}

impl RetrievalArgs {
    fn config(&self) -> RetrievalConfig {
        let fetch = FetchConfig::default()
            .with_concurrency(self.concurrency)
            .with_download_timeout(Duration::from_secs(self.download_timeout_secs))
            .with_discovery_timeout(Duration::from_secs(self.discovery_timeout_secs))
            .with_min_dimension(self.min_dimension);
        RetrievalConfig::default()
            .with_top_n(self.top_n)
            .with_max_candidates(self.max_candidates)
            .with_fetch(fetch)
    }

    fn extractor(&self) -> Result<FeatureExtractor> {
        match self.backbone {
            BackboneKind::Thumbnail => Ok(FeatureExtractor::thumbnail()),
            BackboneKind::Onnx => {
                let Some(model) = &self.model else {
                    bail!("--model is required with the onnx backbone (or use --backbone thumbnail)");
                };
                let options = OnnxOptions {
                    input_size: self.input_size,
                    output_layer: self.output_layer.clone(),
                };
                FeatureExtractor::from_onnx(model, &options)
                    .with_context(|| format!("loading model {}", model.display()))
            }
        }
    }

    fn build(&self) -> Result<Retriever> {
        let config = self.config();
        config.validate()?;
        let provider = DuckDuckGoProvider::with_base_url(&config.fetch, &self.provider_url)?
            .with_region(&self.region);
        Ok(Retriever::new(self.extractor()?, Arc::new(provider), config)?)
    }
}

fn init_tracing(verbose: bool) {
    let filter = if verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"))
    };

    tracing_subscriber::registry()
        .with(fmt::layer().with_target(true))
        .with(filter)
        .init();
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    match cli.command {
        Commands::Serve { addr, uploads_dir } => {
            let retrieval = cli.retrieval.clone();
            imgseek::server::start(&addr, uploads_dir, move || retrieval.build()).await
        }
        Commands::Search { image, query, json } => {
            let retrieval = cli.retrieval.clone();
            let retriever = tokio::task::spawn_blocking(move || retrieval.build()).await??;

            let output = match retriever.search(&image, &query).await {
                Ok(output) => output,
                Err(e) => bail!("search failed [{}]: {}", e.category(), e),
            };

            if json {
                println!("{}", serde_json::to_string_pretty(&output)?);
                return Ok(());
            }

            println!(
                "Top {} results ({} candidates indexed):",
                output.results.len(),
                output.stats.indexed
            );
            for (i, result) in output.results.iter().enumerate() {
                println!("{}. {} (similarity: {:.3})", i + 1, result.url, result.similarity);
            }
            Ok(())
        }
    }
}
