//! Models module.
use std::cmp::Ordering;

use super::data::{Event, UserContext};
use super::{ItemId, ModelError};

pub mod popular;
pub mod random;
pub mod sketch;

/// Trait describing models that learn from a stream of events, one
/// event at a time.
///
/// For every event the driver calls `register` first, then (optionally)
/// `recommend`, then `update`.
pub trait OnlineModel {
    /// Make sure the user and item of `event` are known to the model.
    /// Registering an already-known entity is a no-op.
    fn register(&mut self, event: &Event) -> Result<(), ModelError>;
    /// Learn from a single event. Updates are not idempotent: every
    /// call consumes one observation.
    fn update(&mut self, event: &Event) -> Result<(), ModelError>;
    /// Rank `item_ids` for `user` and return at most `at` of them,
    /// best first, together with their scores.
    fn recommend(
        &self,
        user: &UserContext,
        item_ids: &[ItemId],
        at: usize,
    ) -> Result<Vec<(ItemId, f64)>, ModelError>;
}

/// Sort `(item, score)` pairs by descending score and keep the first `at`.
///
/// The sort is stable, so ties keep their input order.
pub fn top_at(mut scores: Vec<(ItemId, f64)>, at: usize) -> Result<Vec<(ItemId, f64)>, ModelError> {
    if scores.iter().any(|&(_, score)| !score.is_finite()) {
        return Err(ModelError::numerical("non-finite recommendation score"));
    }

    scores.sort_by(|a, b| b.1.partial_cmp(&a.1).unwrap_or(Ordering::Equal));
    scores.truncate(at);

    Ok(scores)
}
