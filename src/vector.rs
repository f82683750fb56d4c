//! Unit-normalized feature vectors

use crate::error::VectorError;
use serde::Serialize;

/// A dense image embedding with unit L2 norm.
///
/// The only way to build one is through [`FeatureVector::from_raw`], which
/// normalizes the input, so every value of this type can be compared with
/// Euclidean distance as a proxy for cosine similarity.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FeatureVector {
    data: Vec<f32>,
}

impl FeatureVector {
    /// Normalize raw backbone output into a feature vector.
    pub fn from_raw(mut data: Vec<f32>) -> Result<Self, VectorError> {
        if data.is_empty() {
            return Err(VectorError::InvalidVector {
                reason: "Cannot build an empty feature vector".to_string(),
            });
        }
        if data.iter().any(|x| !x.is_finite()) {
            return Err(VectorError::InvalidVector {
                reason: "Feature vector contains non-finite values".to_string(),
            });
        }

        let norm = l2_norm(&data);
        if norm == 0.0 || !norm.is_finite() {
            return Err(VectorError::InvalidVector {
                reason: "Cannot normalize zero vector".to_string(),
            });
        }
        for x in &mut data {
            *x /= norm;
        }
        Ok(Self { data })
    }

    /// Get the dimension of the vector
    pub fn dimension(&self) -> usize {
        self.data.len()
    }

    /// Get the underlying data as a slice
    pub fn as_slice(&self) -> &[f32] {
        &self.data
    }

    /// Check if this vector has the same dimension as another
    pub fn has_same_dimension(&self, other: &FeatureVector) -> bool {
        self.dimension() == other.dimension()
    }

    /// Compute the L2 norm (1.0 up to rounding)
    pub fn norm(&self) -> f32 {
        l2_norm(&self.data)
    }
}

fn l2_norm(data: &[f32]) -> f32 {
    // Accumulate in f64: 4096-wide fc7 outputs lose precision otherwise.
    data.iter()
        .map(|&x| f64::from(x) * f64::from(x))
        .sum::<f64>()
        .sqrt() as f32
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use proptest::prelude::*;

    #[test]
    fn test_from_raw_normalizes() {
        let v = FeatureVector::from_raw(vec![3.0, 4.0]).unwrap();
        assert_eq!(v.dimension(), 2);
        assert_relative_eq!(v.norm(), 1.0, epsilon = 1e-6);
        assert_relative_eq!(v.as_slice()[0], 0.6, epsilon = 1e-6);
        assert_relative_eq!(v.as_slice()[1], 0.8, epsilon = 1e-6);
    }

    #[test]
    fn test_zero_vector_rejected() {
        let result = FeatureVector::from_raw(vec![0.0, 0.0, 0.0]);
        assert!(matches!(result, Err(VectorError::InvalidVector { .. })));
    }

    #[test]
    fn test_empty_vector_rejected() {
        assert!(FeatureVector::from_raw(Vec::new()).is_err());
    }

    #[test]
    fn test_non_finite_rejected() {
        assert!(FeatureVector::from_raw(vec![1.0, f32::NAN]).is_err());
        assert!(FeatureVector::from_raw(vec![f32::INFINITY, 1.0]).is_err());
    }

    #[test]
    fn test_already_unit_vector_unchanged() {
        let v = FeatureVector::from_raw(vec![0.0, 1.0, 0.0]).unwrap();
        assert_eq!(v.as_slice(), &[0.0, 1.0, 0.0]);
    }

    proptest! {
        #[test]
        fn prop_norm_is_one(data in prop::collection::vec(-1000.0f32..1000.0, 1..512)) {
            prop_assume!(data.iter().any(|x| x.abs() > 1e-3));
            let v = FeatureVector::from_raw(data).unwrap();
            prop_assert!((v.norm() - 1.0).abs() < 1e-5);
        }
    }
}
