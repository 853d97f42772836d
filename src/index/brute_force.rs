//! BruteForceIndex (component E): dense (n×D) matrix, exhaustive cosine
//! scan. Row layout and the unrolled dot product follow the same
//! structure-of-arrays design as [`crate::vector`] — one flat `Vec<f32>`
//! with vector `i` at `data[i*dim .. (i+1)*dim]`, not `Vec<Vec<f32>>`.

use uuid::Uuid;

use super::{Index, IndexKind};
use crate::error::{Result, VectorStoreError};
use crate::vector::{dot_product_unrolled, l2_norm};

/// State: dense matrix, parallel id vector, row norms, and the
/// `normalize` flag from spec §4.E.
pub struct BruteForceIndex {
    dim: usize,
    data: Vec<f32>,
    ids: Vec<Uuid>,
    row_norms: Vec<f32>,
    normalize: bool,
    built: bool,
}

impl BruteForceIndex {
    /// `normalize`: if true, rows are L2-normalized at build time and the
    /// query is normalized at search time, so similarity is a plain dot
    /// product. If false, rows keep their raw norm and similarity divides
    /// by `row_norm * query_norm` at search time.
    pub fn new(normalize: bool) -> Self {
        Self {
            dim: 0,
            data: Vec::new(),
            ids: Vec::new(),
            row_norms: Vec::new(),
            normalize,
            built: false,
        }
    }

    fn n_vecs(&self) -> usize {
        self.ids.len()
    }

    fn row(&self, i: usize) -> &[f32] {
        &self.data[i * self.dim..(i + 1) * self.dim]
    }
}

impl Index for BruteForceIndex {
    fn build(&mut self, vectors: &[Vec<f32>], ids: &[Uuid]) -> Result<()> {
        if vectors.len() != ids.len() {
            return Err(VectorStoreError::Invariant(
                "vectors and ids length mismatch".to_string(),
            ));
        }
        self.data.clear();
        self.ids.clear();
        self.row_norms.clear();
        self.built = true;

        if vectors.is_empty() {
            self.dim = 0;
            return Ok(());
        }

        let dim = vectors[0].len();
        for v in vectors {
            if v.len() != dim {
                return Err(VectorStoreError::BadDimension {
                    expected: dim,
                    got: v.len(),
                });
            }
        }
        self.dim = dim;

        for v in vectors {
            // Zero rows are treated as norm 1: the row stays zero, so its
            // dot product with any query is zero (no divide-by-zero).
            let norm = l2_norm(v);
            let safe_norm = if norm == 0.0 { 1.0 } else { norm };
            if self.normalize {
                let inv = 1.0 / safe_norm;
                self.data.extend(v.iter().map(|x| x * inv));
                self.row_norms.push(1.0);
            } else {
                self.data.extend_from_slice(v);
                self.row_norms.push(safe_norm);
            }
        }
        self.ids.extend_from_slice(ids);
        Ok(())
    }

    fn search(&self, query: &[f32], k: usize) -> Result<Vec<(Uuid, f32)>> {
        if !self.built {
            return Err(VectorStoreError::NotBuilt);
        }
        let n = self.n_vecs();
        if k == 0 || n == 0 {
            return Ok(Vec::new());
        }
        if query.len() != self.dim {
            return Err(VectorStoreError::BadDimension {
                expected: self.dim,
                got: query.len(),
            });
        }

        let query_norm = l2_norm(query);
        let safe_query_norm = if query_norm == 0.0 { 1.0 } else { query_norm };

        let mut scored: Vec<(usize, f32)> = (0..n)
            .map(|i| {
                let row = self.row(i);
                let raw = dot_product_unrolled(query, row);
                let score = if self.normalize {
                    // Query must be normalized too when rows are unit vectors.
                    raw / safe_query_norm
                } else {
                    raw / (self.row_norms[i] * safe_query_norm)
                };
                (i, score)
            })
            .collect();

        let k = k.min(scored.len());
        scored.select_nth_unstable_by(k - 1, |a, b| b.1.partial_cmp(&a.1).unwrap());
        scored.truncate(k);
        scored.sort_by(|a, b| b.1.partial_cmp(&a.1).unwrap());

        Ok(scored.into_iter().map(|(i, s)| (self.ids[i], s)).collect())
    }

    fn kind(&self) -> IndexKind {
        IndexKind::BruteForceIndex
    }

    fn len(&self) -> usize {
        self.n_vecs()
    }
}
