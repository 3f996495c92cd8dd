//! Residual-subspace scoring of candidate items.
use ndarray::{Array1, Array2, Axis};

use super::item_store::ItemStore;
use super::layout::FeatureLayout;
use super::projection::DynamicProjection;
use crate::Slot;

/// Project the candidate feature vectors of `item_slots` for a single user.
///
/// Column `j` of the result is the L2-normalized projection of the user
/// half `user_features` stacked on top of column `item_slots[j]` of the
/// item store. Candidates projecting to zero stay zero.
pub fn project_candidates(
    layout: &FeatureLayout,
    projection: &DynamicProjection,
    items: &ItemStore,
    user_features: &[(usize, f64)],
    item_slots: &[Slot],
) -> Array2<f64> {
    // The user half is shared by every candidate.
    let user_projection = projection.project(user_features);
    let item_start = layout.user_dim();

    let mut candidates = Array2::zeros((projection.k(), item_slots.len()));

    for (&slot, mut column) in izip!(item_slots, candidates.axis_iter_mut(Axis(1))) {
        let item_features: Vec<(usize, f64)> = items
            .column(slot)
            .into_iter()
            .map(|(row, value)| (item_start + row, value))
            .collect();

        let mut projected = projection.project(&item_features);
        projected += &user_projection;

        column.assign(&normalize(projected));
    }

    candidates
}

/// Scale `vector` to unit L2 norm. Zero vectors are returned unchanged.
pub fn normalize(vector: Array1<f64>) -> Array1<f64> {
    let norm = vector.dot(&vector).sqrt();

    if norm > 0.0 {
        vector / norm
    } else {
        vector
    }
}

/// Norm of each candidate column after projecting out the span of `basis`,
/// i.e. the column norms of `(I - U Uᵀ) Y`.
///
/// Larger scores are further away from the learned subspace.
pub fn residual_scores(basis: &Array2<f64>, candidates: &Array2<f64>) -> Vec<f64> {
    let residual = candidates - &basis.dot(&basis.t().dot(candidates));

    residual
        .axis_iter(Axis(1))
        .map(|column| column.dot(&column).sqrt())
        .collect()
}
