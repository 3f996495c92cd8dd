//! Non-personalized popularity baseline: items are scored by how often
//! they have been observed so far.
use std::collections::HashMap;

use super::{top_at, OnlineModel};
use crate::data::{Event, UserContext};
use crate::{ItemId, ModelError};

/// Popularity model.
#[derive(Clone, Debug, Default)]
pub struct PopularModel {
    counts: HashMap<ItemId, usize>,
}

impl PopularModel {
    /// An empty model.
    pub fn new() -> Self {
        PopularModel::default()
    }

    /// Number of observations of `item_id`.
    pub fn count(&self, item_id: ItemId) -> usize {
        self.counts.get(&item_id).cloned().unwrap_or(0)
    }
}

impl OnlineModel for PopularModel {
    fn register(&mut self, event: &Event) -> Result<(), ModelError> {
        self.counts.entry(event.item_id()).or_insert(0);
        Ok(())
    }

    fn update(&mut self, event: &Event) -> Result<(), ModelError> {
        *self.counts.entry(event.item_id()).or_insert(0) += 1;
        Ok(())
    }

    fn recommend(
        &self,
        _user: &UserContext,
        item_ids: &[ItemId],
        at: usize,
    ) -> Result<Vec<(ItemId, f64)>, ModelError> {
        let scores = item_ids
            .iter()
            .filter_map(|&item_id| {
                self.counts
                    .get(&item_id)
                    .map(|&count| (item_id, count as f64))
            })
            .collect();

        top_at(scores, at)
    }
}
