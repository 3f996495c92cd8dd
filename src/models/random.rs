//! Uniform random baseline.
//!
//! Scores are derived from a keyed hash of the user, the item and the number
//! of updates seen so far: they look uniformly random, change after every
//! update, and stay fixed while the model is not updated.
use std::collections::HashSet;
use std::hash::Hasher;

use rand::Rng;
use siphasher::sip::SipHasher;

use super::{top_at, OnlineModel};
use crate::data::{Event, UserContext};
use crate::{ItemId, ModelError};

/// Random model.
#[derive(Clone, Debug)]
pub struct RandomModel {
    key_0: u64,
    key_1: u64,
    items: HashSet<ItemId>,
    num_updates: u64,
}

impl RandomModel {
    /// Build a model with hash keys drawn from `rng`.
    pub fn new<R: Rng>(rng: &mut R) -> Self {
        RandomModel {
            key_0: rng.gen(),
            key_1: rng.gen(),
            items: HashSet::new(),
            num_updates: 0,
        }
    }

    fn score(&self, user: &UserContext, item_id: ItemId) -> f64 {
        let mut hasher = SipHasher::new_with_keys(self.key_0, self.key_1);
        hasher.write_usize(user.user_id);
        hasher.write_usize(item_id);
        hasher.write_u64(self.num_updates);

        (hasher.finish() >> 11) as f64 / (1u64 << 53) as f64
    }
}

impl OnlineModel for RandomModel {
    fn register(&mut self, event: &Event) -> Result<(), ModelError> {
        self.items.insert(event.item_id());
        Ok(())
    }

    fn update(&mut self, _event: &Event) -> Result<(), ModelError> {
        self.num_updates += 1;
        Ok(())
    }

    fn recommend(
        &self,
        user: &UserContext,
        item_ids: &[ItemId],
        at: usize,
    ) -> Result<Vec<(ItemId, f64)>, ModelError> {
        let scores = item_ids
            .iter()
            .filter(|&&item_id| self.items.contains(&item_id))
            .map(|&item_id| (item_id, self.score(user, item_id)))
            .collect();

        top_at(scores, at)
    }
}

#[cfg(test)]
mod tests {
    use rand::SeedableRng;
    use rand_xorshift::XorShiftRng;

    use super::*;

    #[test]
    fn scores_are_stable_between_updates() {
        let mut rng = XorShiftRng::seed_from_u64(9);
        let mut model = RandomModel::new(&mut rng);

        for item_id in 0..10 {
            model.register(&Event::new(0, item_id, item_id)).unwrap();
        }

        let query = Event::new(0, 0, 10);
        let targets: Vec<ItemId> = (0..12).collect();

        let first = model.recommend(&query.user_context(), &targets, 10).unwrap();
        let second = model.recommend(&query.user_context(), &targets, 10).unwrap();
        assert_eq!(first, second);
        assert_eq!(first.len(), 10);

        for &(_, score) in &first {
            assert!(score >= 0.0 && score < 1.0);
        }

        model.update(&query).unwrap();
        let third = model.recommend(&query.user_context(), &targets, 10).unwrap();
        assert!(first != third);
    }
}
