//! Image preprocessing shared by query and candidate images

use crate::error::ExtractionError;
use image::imageops::FilterType;
use image::DynamicImage;
use ndarray::Array3;

/// Side length of the square network input.
pub const DEFAULT_INPUT_SIZE: u32 = 224;

/// Per-channel mean of the ImageNet training set (RGB, [0, 1] scale).
pub const IMAGENET_MEAN: [f32; 3] = [0.485, 0.456, 0.406];

/// Per-channel standard deviation of the ImageNet training set.
pub const IMAGENET_STD: [f32; 3] = [0.229, 0.224, 0.225];

/// Resize + color conversion + normalization applied before inference.
///
/// Query and candidates must go through the same instance, otherwise their
/// vectors are not comparable.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Preprocessing {
    pub input_size: u32,
    pub mean: [f32; 3],
    pub std: [f32; 3],
}

impl Default for Preprocessing {
    fn default() -> Self {
        Self {
            input_size: DEFAULT_INPUT_SIZE,
            mean: IMAGENET_MEAN,
            std: IMAGENET_STD,
        }
    }
}

impl Preprocessing {
    pub fn with_input_size(mut self, input_size: u32) -> Self {
        self.input_size = input_size;
        self
    }

    /// Produce a normalized `(3, size, size)` CHW tensor.
    pub fn apply(&self, origin: &str, image: &DynamicImage) -> Result<Array3<f32>, ExtractionError> {
        if image.width() == 0 || image.height() == 0 {
            return Err(ExtractionError::Decode {
                origin: origin.to_string(),
                reason: "image has zero width or height".to_string(),
            });
        }

        let size = self.input_size;
        let rgb = image.resize_exact(size, size, FilterType::Triangle).to_rgb8();
        let side = size as usize;

        Ok(Array3::from_shape_fn((3, side, side), |(c, y, x)| {
            let value = f32::from(rgb.get_pixel(x as u32, y as u32).0[c]) / 255.0;
            (value - self.mean[c]) / self.std[c]
        }))
    }
}
