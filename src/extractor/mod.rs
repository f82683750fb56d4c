//! Feature extraction: image -> unit-norm dense vector
//!
//! A [`FeatureExtractor`] pairs one [`Preprocessing`] with one frozen
//! [`Backbone`]. It is cheap to clone and safe to call from many threads;
//! the backbone is loaded once and only read afterwards.

pub mod onnx;
pub mod preprocess;
pub mod thumbnail;

pub use onnx::{OnnxBackbone, OnnxOptions};
pub use preprocess::{Preprocessing, DEFAULT_INPUT_SIZE, IMAGENET_MEAN, IMAGENET_STD};
pub use thumbnail::ThumbnailBackbone;

use crate::error::ExtractionError;
use crate::vector::FeatureVector;
use image::DynamicImage;
use ndarray::Array3;
use std::path::Path;
use std::sync::Arc;
use thiserror::Error;

const TRACING_TARGET: &str = "imgseek::extractor";

/// Inference failure reported by a backbone
#[derive(Error, Debug, Clone)]
#[error("{0}")]
pub struct BackboneError(String);

impl BackboneError {
    pub fn new(message: impl Into<String>) -> Self {
        Self(message.into())
    }
}

/// A frozen network mapping a preprocessed `(3, H, W)` tensor to raw features.
///
/// Implementations must be reentrant: `forward` is called concurrently.
pub trait Backbone: Send + Sync {
    /// Human-readable model name, surfaced by the health check.
    fn name(&self) -> &str;

    /// Length of the vectors `forward` returns.
    fn output_dim(&self) -> usize;

    /// Run a single forward pass.
    fn forward(&self, input: &Array3<f32>) -> Result<Vec<f32>, BackboneError>;
}

/// Stateless image embedder shared by the query and every candidate.
#[derive(Clone)]
pub struct FeatureExtractor {
    backbone: Arc<dyn Backbone>,
    preprocessing: Preprocessing,
}

impl std::fmt::Debug for FeatureExtractor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FeatureExtractor")
            .field("backbone", &self.backbone.name())
            .field("dimension", &self.backbone.output_dim())
            .field("preprocessing", &self.preprocessing)
            .finish()
    }
}

impl FeatureExtractor {
    pub fn new(backbone: Arc<dyn Backbone>, preprocessing: Preprocessing) -> Self {
        Self {
            backbone,
            preprocessing,
        }
    }

    /// Extractor over the model-free [`ThumbnailBackbone`].
    pub fn thumbnail() -> Self {
        Self::new(Arc::new(ThumbnailBackbone::default()), Preprocessing::default())
    }

    /// Load an ONNX backbone and pair it with matching preprocessing.
    pub fn from_onnx(path: impl AsRef<Path>, options: &OnnxOptions) -> Result<Self, ExtractionError> {
        let backbone = OnnxBackbone::load(path, options)?;
        let preprocessing = Preprocessing::default().with_input_size(options.input_size);
        Ok(Self::new(Arc::new(backbone), preprocessing))
    }

    /// Dimension of every vector this extractor produces
    pub fn dimension(&self) -> usize {
        self.backbone.output_dim()
    }

    pub fn backbone_name(&self) -> &str {
        self.backbone.name()
    }

    pub fn preprocessing(&self) -> &Preprocessing {
        &self.preprocessing
    }

    /// Embed a decoded image. `origin` names the image in errors and logs.
    pub fn extract(&self, origin: &str, image: &DynamicImage) -> Result<FeatureVector, ExtractionError> {
        let input = self.preprocessing.apply(origin, image)?;
        let raw = self
            .backbone
            .forward(&input)
            .map_err(|e| ExtractionError::Inference {
                origin: origin.to_string(),
                reason: e.to_string(),
            })?;

        let expected = self.dimension();
        if raw.len() != expected {
            return Err(ExtractionError::DimensionMismatch {
                origin: origin.to_string(),
                expected,
                actual: raw.len(),
            });
        }

        let vector = FeatureVector::from_raw(raw).map_err(|e| ExtractionError::Degenerate {
            origin: origin.to_string(),
            reason: e.to_string(),
        })?;
        tracing::trace!(target: TRACING_TARGET, origin, dim = vector.dimension(), "Extracted features");
        Ok(vector)
    }

    /// Decode `bytes` and embed the result.
    pub fn extract_bytes(&self, origin: &str, bytes: &[u8]) -> Result<FeatureVector, ExtractionError> {
        let image = image::load_from_memory(bytes).map_err(|e| ExtractionError::Decode {
            origin: origin.to_string(),
            reason: e.to_string(),
        })?;
        self.extract(origin, &image)
    }

    /// Read, decode and embed an image file.
    pub fn extract_path(&self, path: impl AsRef<Path>) -> Result<FeatureVector, ExtractionError> {
        let path = path.as_ref();
        let origin = path.display().to_string();
        let bytes = std::fs::read(path).map_err(|error| ExtractionError::Io {
            origin: origin.clone(),
            error,
        })?;
        self.extract_bytes(&origin, &bytes)
    }
}
