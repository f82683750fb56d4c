//! HTTP API server for image retrieval.

pub mod routes;
pub mod uploads;

use crate::metrics::MetricsCollector;
use crate::orchestrator::Retriever;
use std::path::PathBuf;
use std::sync::{Arc, OnceLock, RwLock};

const TRACING_TARGET: &str = "imgseek::server";

/// Largest accepted upload, matching the request body limit.
pub const DEFAULT_MAX_UPLOAD_BYTES: usize = 50 * 1024 * 1024;

/// Shared application state for the HTTP server.
///
/// Exactly one of `retriever` and `load_error` is set once the background
/// model load finishes; until then the server reports `loading`.
pub struct AppState {
    pub retriever: OnceLock<Retriever>,
    pub load_error: OnceLock<String>,
    pub metrics: RwLock<MetricsCollector>,
    /// Directory uploads are written to and query images are read from
    pub uploads_dir: PathBuf,
    pub max_upload_bytes: usize,
}

/// Where the model load stands
pub enum LoadState<'a> {
    Loading,
    Ready(&'a Retriever),
    Failed(&'a str),
}

impl AppState {
    pub fn new(uploads_dir: impl Into<PathBuf>) -> Self {
        Self {
            retriever: OnceLock::new(),
            load_error: OnceLock::new(),
            metrics: RwLock::new(MetricsCollector::new()),
            uploads_dir: uploads_dir.into(),
            max_upload_bytes: DEFAULT_MAX_UPLOAD_BYTES,
        }
    }

    /// State with an already-loaded retriever.
    pub fn ready(uploads_dir: impl Into<PathBuf>, retriever: Retriever) -> Self {
        let state = Self::new(uploads_dir);
        state.finish_loading(Ok(retriever));
        state
    }

    pub fn with_max_upload_bytes(mut self, max_upload_bytes: usize) -> Self {
        self.max_upload_bytes = max_upload_bytes;
        self
    }

    /// Record the outcome of the model load. Later calls are ignored.
    pub fn finish_loading(&self, outcome: anyhow::Result<Retriever>) {
        if self.retriever.get().is_some() || self.load_error.get().is_some() {
            return;
        }
        match outcome {
            Ok(retriever) => {
                tracing::info!(
                    target: TRACING_TARGET,
                    model = retriever.backbone_name(),
                    "Model loaded, ready to serve searches"
                );
                let _ = self.retriever.set(retriever);
            }
            Err(e) => {
                let reason = format!("{e:#}");
                tracing::error!(target: TRACING_TARGET, error = %reason, "Failed to load model");
                let _ = self.load_error.set(reason);
            }
        }
    }

    pub fn load_state(&self) -> LoadState<'_> {
        if let Some(retriever) = self.retriever.get() {
            LoadState::Ready(retriever)
        } else if let Some(error) = self.load_error.get() {
            LoadState::Failed(error)
        } else {
            LoadState::Loading
        }
    }
}

/// Start the HTTP server. The listener comes up immediately; `load` builds
/// the retriever (model load included) on a blocking thread meanwhile.
pub async fn start<F>(addr: &str, uploads_dir: PathBuf, load: F) -> anyhow::Result<()>
where
    F: FnOnce() -> anyhow::Result<Retriever> + Send + 'static,
{
    tokio::fs::create_dir_all(&uploads_dir).await?;
    let state = Arc::new(AppState::new(uploads_dir));

    let loading = Arc::clone(&state);
    tokio::task::spawn_blocking(move || loading.finish_loading(load()));

    let app = routes::create_router(state);
    let listener = tokio::net::TcpListener::bind(addr).await?;
    tracing::info!(target: TRACING_TARGET, %addr, "Server listening");
    axum::serve(listener, app).await?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::RetrievalConfig;
    use crate::extractor::FeatureExtractor;
    use crate::fetcher::StaticProvider;

    fn retriever() -> Retriever {
        Retriever::new(
            FeatureExtractor::thumbnail(),
            Arc::new(StaticProvider::default()),
            RetrievalConfig::default(),
        )
        .unwrap()
    }

    #[test]
    fn test_load_state_transitions() {
        let state = AppState::new("/tmp");
        assert!(matches!(state.load_state(), LoadState::Loading));

        state.finish_loading(Err(anyhow::anyhow!("model file missing")));
        match state.load_state() {
            LoadState::Failed(reason) => assert!(reason.contains("model file missing")),
            _ => panic!("expected failed state"),
        }

        // the first outcome sticks
        state.finish_loading(Ok(retriever()));
        assert!(matches!(state.load_state(), LoadState::Failed(_)));
    }

    #[test]
    fn test_ready_state() {
        let state = AppState::ready("/tmp", retriever());
        assert!(matches!(state.load_state(), LoadState::Ready(_)));
    }
}
