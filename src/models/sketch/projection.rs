//! Random projection from the growing feature space down to `k` dimensions.
use ndarray::{Array1, Array2, ArrayView1};
use rand::Rng;
use rand_distr::StandardNormal;

/// A dense `k × p` Gaussian projection that grows by column insertion.
///
/// Columns are stored contiguously (column-major), so inserting the column
/// of a new entity is a single splice and every other column keeps its
/// contents.
#[derive(Clone, Debug)]
pub struct DynamicProjection {
    k: usize,
    scale: f64,
    columns: Vec<f64>,
}

impl DynamicProjection {
    /// Draw a `k × dim` projection with i.i.d. `N(0, 1/k)` entries.
    pub fn new<R: Rng>(k: usize, dim: usize, rng: &mut R) -> Self {
        let mut projection = DynamicProjection {
            k,
            scale: 1.0 / (k as f64).sqrt(),
            columns: Vec::with_capacity(k * dim),
        };

        for offset in 0..dim {
            projection.insert_column(offset, rng);
        }

        projection
    }

    /// Output dimension `k`.
    pub fn k(&self) -> usize {
        self.k
    }

    /// Input dimension `p`.
    pub fn dim(&self) -> usize {
        if self.k == 0 {
            0
        } else {
            self.columns.len() / self.k
        }
    }

    /// Insert a freshly drawn column so that it becomes column `offset`;
    /// columns previously at `offset..` move one to the right.
    pub fn insert_column<R: Rng>(&mut self, offset: usize, rng: &mut R) {
        debug_assert!(offset <= self.dim());

        let scale = self.scale;
        let column: Vec<f64> = (0..self.k)
            .map(|_| scale * rng.sample::<f64, _>(StandardNormal))
            .collect();

        let start = offset * self.k;
        self.columns.splice(start..start, column);
    }

    /// Column `idx`.
    pub fn column(&self, idx: usize) -> ArrayView1<f64> {
        let start = idx * self.k;
        ArrayView1::from(&self.columns[start..start + self.k])
    }

    /// Project a sparse feature vector given as `(position, value)` pairs.
    pub fn project(&self, features: &[(usize, f64)]) -> Array1<f64> {
        let mut projected = Array1::zeros(self.k);

        for &(idx, value) in features {
            projected.scaled_add(value, &self.column(idx));
        }

        projected
    }

    /// Project a dense feature vector of width `dim()`.
    #[cfg(test)]
    pub fn project_dense(&self, features: &[f64]) -> Array1<f64> {
        debug_assert_eq!(features.len(), self.dim());

        let sparse: Vec<(usize, f64)> = features
            .iter()
            .cloned()
            .enumerate()
            .filter(|&(_, value)| value != 0.0)
            .collect();

        self.project(&sparse)
    }

    /// Copy the projection into a `k × p` matrix.
    pub fn to_array(&self) -> Array2<f64> {
        let k = self.k;
        Array2::from_shape_fn((k, self.dim()), |(row, col)| self.columns[col * k + row])
    }
}
