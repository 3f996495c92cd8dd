//! Frequent Directions sketch of a stream of `k`-dimensional observations.
//!
//! The sketch `B` is a `k × ℓ` matrix. Every observation overwrites the
//! left-most all-zero column of `B` (or the last one when there is none),
//! after which the singular values of `B` are shrunk by the square of the
//! smallest one:
//!
//! ```text
//! U, s, _ = svd(B)
//! δ       = s[ℓ-1]²
//! B       = U · diag(sqrt(max(s² - δ, 0)))
//! ```
//!
//! The shrink zeroes at least one column, so the next observation always
//! has room. For the stream `A` of observations fed so far,
//! `0 ≼ AᵀA - BBᵀ` and `‖AᵀA - BBᵀ‖₂ ≤ ‖A‖²_F / ℓ`.
use std::cmp::Ordering;

use nalgebra::DMatrix;
use ndarray::{Array1, Array2, ArrayView1, Axis};

use crate::ModelError;

/// Entries with absolute value below this are treated as zero when looking
/// for a free column.
const ZERO_TOLERANCE: f64 = 1e-8;

/// Convergence threshold of the SVD iterations, nalgebra's own default.
const SVD_EPSILON: f64 = 5.0 * ::std::f64::EPSILON;

/// Cap on the SVD iterations; exceeding it is a numerical failure.
const MAX_SVD_ITERATIONS: usize = 10_000;

/// Largest entrywise error allowed between `U·diag(s)·Vᵀ` and the
/// decomposed matrix, relative to its largest entry.
const RECONSTRUCTION_TOLERANCE: f64 = 1e-8;

/// What a single insertion did to the sketch.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Shrink {
    /// Column of `B` that received the observation.
    pub column: usize,
    /// Squared smallest singular value subtracted from every squared
    /// singular value.
    pub delta: f64,
    /// Squared Frobenius norm of `B` after insertion, before shrinking.
    pub energy_before: f64,
    /// Squared Frobenius norm of `B` after shrinking.
    pub energy_after: f64,
}

/// A rank-`ℓ` streaming sketch together with its orthonormal basis.
#[derive(Clone, Debug)]
pub struct FrequentDirections {
    sketch: Array2<f64>,
    basis: Array2<f64>,
}

impl FrequentDirections {
    /// An empty `k × ell` sketch. The basis starts out all zero.
    pub fn new(k: usize, ell: usize) -> Self {
        FrequentDirections {
            sketch: Array2::zeros((k, ell)),
            basis: Array2::zeros((k, ell)),
        }
    }

    /// Observation dimension `k`.
    pub fn k(&self) -> usize {
        self.sketch.nrows()
    }

    /// Sketch size `ℓ`.
    pub fn ell(&self) -> usize {
        self.sketch.ncols()
    }

    /// The sketch matrix `B`.
    pub fn sketch(&self) -> &Array2<f64> {
        &self.sketch
    }

    /// The leading left singular vectors of `B`, ordered by decreasing
    /// singular value.
    pub fn basis(&self) -> &Array2<f64> {
        &self.basis
    }

    /// Squared Frobenius norm of `B`.
    pub fn energy(&self) -> f64 {
        self.sketch.iter().map(|x| x * x).sum()
    }

    /// The column the next observation will overwrite: the left-most
    /// all-zero column, or the last column if every column is in use.
    pub fn free_column(&self) -> usize {
        self.sketch
            .axis_iter(Axis(1))
            .position(|column| column.iter().all(|x| x.abs() <= ZERO_TOLERANCE))
            .unwrap_or(self.ell() - 1)
    }

    /// Number of singular values of `B` above `tolerance`.
    pub fn rank(&self, tolerance: f64) -> Result<usize, ModelError> {
        let (_, singular_values) = decompose(&self.sketch)?;

        Ok(singular_values.iter().filter(|&&s| s > tolerance).count())
    }

    /// Feed one observation into the sketch. The observation is expected
    /// to be unit-norm.
    ///
    /// The sketch is left untouched if the decomposition fails.
    pub fn insert(&mut self, observation: ArrayView1<f64>) -> Result<Shrink, ModelError> {
        if observation.len() != self.k() {
            return Err(ModelError::numerical(format!(
                "observation has dimension {}, sketch expects {}",
                observation.len(),
                self.k()
            )));
        }

        if observation.iter().any(|x| !x.is_finite()) {
            return Err(ModelError::numerical("non-finite observation"));
        }

        let column = self.free_column();

        let mut sketch = self.sketch.clone();
        sketch.column_mut(column).assign(&observation);

        let (basis, singular_values) = decompose(&sketch)?;

        let delta = singular_values[self.ell() - 1].powi(2);
        let energy_before: f64 = singular_values.iter().map(|s| s * s).sum();

        let shrunk: Array1<f64> = singular_values.mapv(|s| (s * s - delta).max(0.0).sqrt());
        let energy_after: f64 = shrunk.iter().map(|s| s * s).sum();

        self.sketch = &basis * &shrunk;
        self.basis = basis;

        Ok(Shrink {
            column,
            delta,
            energy_before,
            energy_after,
        })
    }
}

/// Reduced SVD of `matrix`, returning the left singular vectors and the
/// singular values sorted by decreasing singular value.
fn decompose(matrix: &Array2<f64>) -> Result<(Array2<f64>, Array1<f64>), ModelError> {
    decompose_with(matrix, MAX_SVD_ITERATIONS)
}

fn decompose_with(
    matrix: &Array2<f64>,
    max_iterations: usize,
) -> Result<(Array2<f64>, Array1<f64>), ModelError> {
    let (rows, cols) = matrix.dim();
    let dense = DMatrix::from_fn(rows, cols, |row, col| matrix[[row, col]]);

    let svd = dense
        .clone()
        .try_svd(true, true, SVD_EPSILON, max_iterations)
        .ok_or_else(|| {
            ModelError::numerical(format!(
                "SVD did not converge in {} iterations",
                max_iterations
            ))
        })?;
    let u = svd
        .u
        .ok_or_else(|| ModelError::numerical("SVD did not return left singular vectors"))?;
    let v_t = svd
        .v_t
        .ok_or_else(|| ModelError::numerical("SVD did not return right singular vectors"))?;
    let s = svd.singular_values;

    if s.iter().chain(u.iter()).chain(v_t.iter()).any(|x| !x.is_finite()) {
        return Err(ModelError::numerical("SVD produced non-finite values"));
    }

    let error = (&u * DMatrix::from_diagonal(&s) * &v_t - &dense).amax();
    if error > RECONSTRUCTION_TOLERANCE * (1.0 + dense.amax()) {
        return Err(ModelError::numerical(format!(
            "SVD does not reconstruct the sketch (error {:e})",
            error
        )));
    }

    let mut order: Vec<usize> = (0..s.len()).collect();
    order.sort_by(|&a, &b| s[b].partial_cmp(&s[a]).unwrap_or(Ordering::Equal));

    let basis = Array2::from_shape_fn((rows, order.len()), |(row, col)| u[(row, order[col])]);
    let singular_values = order.iter().map(|&idx| s[idx]).collect();

    Ok((basis, singular_values))
}
