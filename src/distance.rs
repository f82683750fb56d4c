//! Distance and similarity between feature vectors
//!
//! For unit vectors `a` and `b`, `|a - b|² = 2 - 2·cos(a, b)`, so the flat
//! index only ever computes squared Euclidean distance and derives cosine
//! similarity from it.

use crate::error::VectorError;
use crate::vector::FeatureVector;

/// Squared Euclidean (L2²) distance between two vectors
pub fn squared_euclidean(v1: &FeatureVector, v2: &FeatureVector) -> Result<f32, VectorError> {
    check_dimensions(v1, v2)?;
    Ok(v1
        .as_slice()
        .iter()
        .zip(v2.as_slice().iter())
        .map(|(a, b)| (a - b).powi(2))
        .sum())
}

/// Compute dot product of two vectors
pub fn dot_product(v1: &FeatureVector, v2: &FeatureVector) -> Result<f32, VectorError> {
    check_dimensions(v1, v2)?;
    Ok(v1
        .as_slice()
        .iter()
        .zip(v2.as_slice().iter())
        .map(|(a, b)| a * b)
        .sum())
}

/// Convert a squared distance between unit vectors into a similarity in [0, 1].
///
/// Opposed vectors (negative cosine) are reported as 0.
pub fn similarity_from_squared_distance(distance_sq: f32) -> f32 {
    (1.0 - distance_sq / 2.0).clamp(0.0, 1.0)
}

/// Cosine similarity of two feature vectors, clamped to [0, 1].
pub fn cosine_similarity(v1: &FeatureVector, v2: &FeatureVector) -> Result<f32, VectorError> {
    Ok(similarity_from_squared_distance(squared_euclidean(v1, v2)?))
}

fn check_dimensions(v1: &FeatureVector, v2: &FeatureVector) -> Result<(), VectorError> {
    if !v1.has_same_dimension(v2) {
        return Err(VectorError::DimensionMismatch {
            expected: v1.dimension(),
            actual: v2.dimension(),
        });
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use proptest::prelude::*;

    fn unit(data: Vec<f32>) -> FeatureVector {
        FeatureVector::from_raw(data).unwrap()
    }

    #[test]
    fn test_squared_euclidean_same_vector() {
        let v = unit(vec![1.0, 2.0, 3.0]);
        assert_relative_eq!(squared_euclidean(&v, &v).unwrap(), 0.0, epsilon = 1e-6);
    }

    #[test]
    fn test_orthogonal_vectors() {
        let v1 = unit(vec![1.0, 0.0, 0.0]);
        let v2 = unit(vec![0.0, 1.0, 0.0]);
        assert_relative_eq!(squared_euclidean(&v1, &v2).unwrap(), 2.0, epsilon = 1e-6);
        assert_relative_eq!(cosine_similarity(&v1, &v2).unwrap(), 0.0, epsilon = 1e-6);
    }

    #[test]
    fn test_opposite_vectors_clamped_to_zero() {
        let v1 = unit(vec![1.0, 0.0]);
        let v2 = unit(vec![-1.0, 0.0]);
        assert_relative_eq!(squared_euclidean(&v1, &v2).unwrap(), 4.0, epsilon = 1e-6);
        assert_eq!(cosine_similarity(&v1, &v2).unwrap(), 0.0);
    }

    #[test]
    fn test_similarity_matches_dot_product() {
        let v1 = unit(vec![0.8, 0.6, 0.0]);
        let v2 = unit(vec![0.6, 0.8, 0.0]);
        let dot = dot_product(&v1, &v2).unwrap();
        assert_relative_eq!(dot, 0.96, epsilon = 1e-6);
        assert_relative_eq!(cosine_similarity(&v1, &v2).unwrap(), dot, epsilon = 1e-5);
    }

    #[test]
    fn test_drift_above_one_is_clamped() {
        assert_eq!(similarity_from_squared_distance(-1e-7), 1.0);
    }

    #[test]
    fn test_dimension_mismatch() {
        let v1 = unit(vec![1.0, 2.0]);
        let v2 = unit(vec![1.0, 2.0, 3.0]);
        assert!(matches!(
            squared_euclidean(&v1, &v2),
            Err(VectorError::DimensionMismatch { expected: 2, actual: 3 })
        ));
    }

    proptest! {
        #[test]
        fn prop_similarity_in_unit_interval(
            a in prop::collection::vec(-10.0f32..10.0, 16),
            b in prop::collection::vec(-10.0f32..10.0, 16),
        ) {
            prop_assume!(a.iter().any(|x| x.abs() > 1e-3));
            prop_assume!(b.iter().any(|x| x.abs() > 1e-3));
            let s = cosine_similarity(&unit(a), &unit(b)).unwrap();
            prop_assert!((0.0..=1.0).contains(&s));
        }
    }
}
