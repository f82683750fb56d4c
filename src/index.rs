//! Ephemeral flat similarity index: exhaustive k-NN over one request's candidates

use crate::distance::{similarity_from_squared_distance, squared_euclidean};
use crate::error::VectorError;
use crate::vector::FeatureVector;

/// One hit from [`SimilarityIndex::search`]
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Neighbor {
    /// Identifier supplied at build time
    pub id: usize,
    /// Squared Euclidean distance to the query
    pub distance: f32,
    /// Cosine similarity derived from `distance`, in [0, 1]
    pub similarity: f32,
}

/// A flat index that compares the query against every stored vector.
///
/// Entries keep their insertion order, which is also the tie-break order
/// for equal similarities. At a few dozen candidates per request an
/// approximate structure would not pay for itself.
#[derive(Debug, Default)]
pub struct SimilarityIndex {
    entries: Vec<(usize, FeatureVector)>,
    dimension: Option<usize>,
}

impl SimilarityIndex {
    /// Build an index from `(id, vector)` pairs; all vectors must share a dimension.
    pub fn build<I>(vectors: I) -> Result<Self, VectorError>
    where
        I: IntoIterator<Item = (usize, FeatureVector)>,
    {
        let mut index = Self::default();
        for (id, vector) in vectors {
            index.add(id, vector)?;
        }
        Ok(index)
    }

    fn add(&mut self, id: usize, vector: FeatureVector) -> Result<(), VectorError> {
        let dim = vector.dimension();
        match self.dimension {
            Some(expected) if expected != dim => {
                return Err(VectorError::DimensionMismatch {
                    expected,
                    actual: dim,
                });
            }
            Some(_) => {}
            None => self.dimension = Some(dim),
        }
        self.entries.push((id, vector));
        Ok(())
    }

    /// Return up to `k` nearest entries, most similar first.
    pub fn search(&self, query: &FeatureVector, k: usize) -> Result<Vec<Neighbor>, VectorError> {
        if self.entries.is_empty() || k == 0 {
            return Ok(Vec::new());
        }

        let mut results: Vec<Neighbor> = self
            .entries
            .iter()
            .map(|(id, vector)| {
                let distance = squared_euclidean(vector, query)?;
                Ok(Neighbor {
                    id: *id,
                    distance,
                    similarity: similarity_from_squared_distance(distance),
                })
            })
            .collect::<Result<Vec<_>, VectorError>>()?;

        // Rank on the clamped similarity: every anti-correlated entry scores 0
        // and must keep insertion order. sort_by is stable.
        results.sort_by(|a, b| b.similarity.total_cmp(&a.similarity));
        results.truncate(k);
        Ok(results)
    }

    /// The number of vectors in this index.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Dimension shared by all entries, `None` while empty
    pub fn dimension(&self) -> Option<usize> {
        self.dimension
    }
}
