//! Pooled-pixel backbone: a model-free embedding for offline runs and tests

use super::{Backbone, BackboneError};
use ndarray::{s, Array3};

pub const DEFAULT_GRID: usize = 8;

/// Average-pools the preprocessed tensor into a `grid x grid` cell layout per
/// channel, giving a `3 * grid²` vector.
///
/// It captures coarse color layout only, but it is deterministic and needs
/// no model file.
#[derive(Debug, Clone)]
pub struct ThumbnailBackbone {
    grid: usize,
}

impl ThumbnailBackbone {
    pub fn new(grid: usize) -> Self {
        Self { grid: grid.max(1) }
    }
}

impl Default for ThumbnailBackbone {
    fn default() -> Self {
        Self::new(DEFAULT_GRID)
    }
}

impl Backbone for ThumbnailBackbone {
    fn name(&self) -> &str {
        "thumbnail"
    }

    fn output_dim(&self) -> usize {
        3 * self.grid * self.grid
    }

    fn forward(&self, input: &Array3<f32>) -> Result<Vec<f32>, BackboneError> {
        let (channels, height, width) = input.dim();
        if channels != 3 {
            return Err(BackboneError::new(format!(
                "expected 3 channels, got {channels}"
            )));
        }
        if height < self.grid || width < self.grid {
            return Err(BackboneError::new(format!(
                "input {width}x{height} smaller than pooling grid {}",
                self.grid
            )));
        }

        let g = self.grid;
        let mut features = Vec::with_capacity(self.output_dim());
        for c in 0..channels {
            for gy in 0..g {
                let (y0, y1) = (gy * height / g, (gy + 1) * height / g);
                for gx in 0..g {
                    let (x0, x1) = (gx * width / g, (gx + 1) * width / g);
                    let cell = input.slice(s![c, y0..y1, x0..x1]);
                    features.push(cell.mean().unwrap_or(0.0));
                }
            }
        }
        Ok(features)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn test_output_dimension() {
        let backbone = ThumbnailBackbone::new(4);
        let out = backbone.forward(&Array3::ones((3, 16, 16))).unwrap();
        assert_eq!(out.len(), 48);
        assert_eq!(backbone.output_dim(), 48);
    }

    #[test]
    fn test_cells_are_averaged() {
        let input = Array3::from_shape_fn((3, 4, 4), |(c, y, _)| if y < 2 { c as f32 } else { 10.0 });
        let out = ThumbnailBackbone::new(2).forward(&input).unwrap();
        // channel 1: top cells average 1.0, bottom cells 10.0
        assert_relative_eq!(out[4], 1.0);
        assert_relative_eq!(out[5], 1.0);
        assert_relative_eq!(out[6], 10.0);
        assert_relative_eq!(out[7], 10.0);
    }

    #[test]
    fn test_input_smaller_than_grid() {
        let backbone = ThumbnailBackbone::new(8);
        assert!(backbone.forward(&Array3::zeros((3, 4, 4))).is_err());
    }
}
