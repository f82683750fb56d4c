//! Frozen CNN backbone loaded from an ONNX export (e.g. VGG19 cut at `fc7`)

use super::{Backbone, BackboneError};
use crate::error::ExtractionError;
use ndarray::Array3;
use std::path::Path;
use tract_onnx::prelude::*;

const TRACING_TARGET: &str = "imgseek::extractor::onnx";

/// How to load an ONNX backbone
#[derive(Debug, Clone)]
pub struct OnnxOptions {
    /// Square input resolution the graph is specialized for
    pub input_size: u32,
    /// Named node to read the embedding from instead of the graph output.
    ///
    /// Classification exports should point this at a late fully-connected
    /// layer so the vector is an embedding rather than class scores.
    pub output_layer: Option<String>,
}

impl Default for OnnxOptions {
    fn default() -> Self {
        Self {
            input_size: super::DEFAULT_INPUT_SIZE,
            output_layer: None,
        }
    }
}

/// An optimized, read-only inference plan. `run` takes `&self`, so one
/// instance serves concurrent extractions without locking.
pub struct OnnxBackbone {
    plan: TypedRunnableModel<TypedModel>,
    name: String,
    output_dim: usize,
}

impl std::fmt::Debug for OnnxBackbone {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OnnxBackbone")
            .field("name", &self.name)
            .field("output_dim", &self.output_dim)
            .finish_non_exhaustive()
    }
}

impl OnnxBackbone {
    /// Load and optimize the model, then run one blank warm-up pass that
    /// fixes the output dimension.
    pub fn load(path: impl AsRef<Path>, options: &OnnxOptions) -> Result<Self, ExtractionError> {
        let path = path.as_ref();
        let size = options.input_size as usize;
        tracing::info!(
            target: TRACING_TARGET,
            path = %path.display(),
            input_size = size,
            output_layer = ?options.output_layer,
            "Loading ONNX backbone"
        );

        let plan = build_plan(path, size, options.output_layer.as_deref()).map_err(|e| {
            ExtractionError::ModelLoad {
                reason: format!("{}: {e:#}", path.display()),
            }
        })?;

        let name = path
            .file_stem()
            .map(|s| s.to_string_lossy().into_owned())
            .unwrap_or_else(|| "onnx".to_string());

        let mut backbone = Self {
            plan,
            name,
            output_dim: 0,
        };
        let warmup = backbone
            .run(&Array3::zeros((3, size, size)))
            .map_err(|e| ExtractionError::ModelLoad {
                reason: format!("warm-up pass failed: {e}"),
            })?;
        backbone.output_dim = warmup.len();

        tracing::info!(
            target: TRACING_TARGET,
            name = %backbone.name,
            output_dim = backbone.output_dim,
            "ONNX backbone ready"
        );
        Ok(backbone)
    }

    fn run(&self, input: &Array3<f32>) -> Result<Vec<f32>, BackboneError> {
        let (channels, height, width) = input.dim();
        let data = input
            .as_slice()
            .ok_or_else(|| BackboneError::new("input tensor is not contiguous"))?;
        let tensor = Tensor::from_shape(&[1, channels, height, width], data)
            .map_err(|e| BackboneError::new(format!("{e:#}")))?;

        let outputs = self
            .plan
            .run(tvec!(tensor.into()))
            .map_err(|e| BackboneError::new(format!("{e:#}")))?;
        let output = outputs
            .first()
            .ok_or_else(|| BackboneError::new("model produced no outputs"))?;
        let view = output
            .to_array_view::<f32>()
            .map_err(|e| BackboneError::new(format!("{e:#}")))?;

        Ok(pool_features(view.shape(), view.iter().copied()))
    }
}

fn build_plan(
    path: &Path,
    size: usize,
    output_layer: Option<&str>,
) -> TractResult<TypedRunnableModel<TypedModel>> {
    let mut model = tract_onnx::onnx()
        .model_for_path(path)?
        .with_input_fact(0, f32::fact([1, 3, size, size]).into())?;
    if let Some(layer) = output_layer {
        model.set_output_names([layer])?;
    }
    model.into_optimized()?.into_runnable()
}

/// Flatten a batch-of-one output. Convolutional feature maps
/// (`[1, C, H, W]`) are global-average-pooled to `C` values first.
fn pool_features(shape: &[usize], values: impl Iterator<Item = f32>) -> Vec<f32> {
    match shape {
        [1, channels, height, width] if height * width > 1 => {
            let plane = height * width;
            let values: Vec<f32> = values.collect();
            values
                .chunks(plane)
                .take(*channels)
                .map(|cell| cell.iter().sum::<f32>() / plane as f32)
                .collect()
        }
        _ => values.collect(),
    }
}

impl Backbone for OnnxBackbone {
    fn name(&self) -> &str {
        &self.name
    }

    fn output_dim(&self) -> usize {
        self.output_dim
    }

    fn forward(&self, input: &Array3<f32>) -> Result<Vec<f32>, BackboneError> {
        self.run(input)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_pool_fully_connected_output() {
        let out = pool_features(&[1, 4], vec![1.0, 2.0, 3.0, 4.0].into_iter());
        assert_eq!(out, vec![1.0, 2.0, 3.0, 4.0]);
    }

    #[test]
    fn test_pool_feature_map() {
        // two channels of 2x2
        let values = vec![1.0, 1.0, 3.0, 3.0, 0.0, 4.0, 0.0, 4.0];
        let out = pool_features(&[1, 2, 2, 2], values.into_iter());
        assert_eq!(out, vec![2.0, 2.0]);
    }

    #[test]
    fn test_pool_already_pooled_map() {
        let out = pool_features(&[1, 3, 1, 1], vec![0.5, 0.25, 1.0].into_iter());
        assert_eq!(out, vec![0.5, 0.25, 1.0]);
    }

    #[test]
    fn test_missing_model_file() {
        let err = OnnxBackbone::load("/nonexistent/vgg19.onnx", &OnnxOptions::default()).unwrap_err();
        assert!(matches!(err, ExtractionError::ModelLoad { .. }));
    }
}
