//! Logical ordering of the full feature vector.
//!
//! ```text
//! [user identity (n_user)][user context][other context][item identity (n_item)][item context]
//! ```
//!
//! Every offset is derived from the current block sizes on each call.
use crate::data::Contexts;
use crate::Slot;

/// Block sizes of the feature vector.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct FeatureLayout {
    contexts: Contexts,
    n_user: usize,
    n_item: usize,
}

impl FeatureLayout {
    /// An empty layout: no users, no items.
    pub fn new(contexts: Contexts) -> Self {
        FeatureLayout {
            contexts,
            n_user: 0,
            n_item: 0,
        }
    }

    /// Context block sizes.
    pub fn contexts(&self) -> &Contexts {
        &self.contexts
    }

    /// Number of user slots.
    pub fn n_user(&self) -> usize {
        self.n_user
    }

    /// Number of item slots.
    pub fn n_item(&self) -> usize {
        self.n_item
    }

    /// Total width `p` of the feature vector.
    pub fn dim(&self) -> usize {
        self.n_user + self.contexts.total() + self.n_item
    }

    /// Position of the identity feature of user `slot`.
    pub fn user_identity(&self, slot: Slot) -> usize {
        debug_assert!(slot < self.n_user);
        slot
    }

    /// First position of the user-context block.
    pub fn user_context_start(&self) -> usize {
        self.n_user
    }

    /// First position of the other-context block.
    pub fn others_start(&self) -> usize {
        self.user_context_start() + self.contexts.user
    }

    /// Position of the identity feature of item `slot`.
    pub fn item_identity(&self, slot: Slot) -> usize {
        debug_assert!(slot < self.n_item);
        self.item_identity_start() + slot
    }

    /// First position of the item-context block.
    pub fn item_context_start(&self) -> usize {
        self.item_identity_start() + self.n_item
    }

    /// Width of the user half of the vector (everything before the item
    /// identity block).
    pub fn user_dim(&self) -> usize {
        self.item_identity_start()
    }

    /// Width of the item half of the vector.
    pub fn item_dim(&self) -> usize {
        self.n_item + self.contexts.item
    }

    fn item_identity_start(&self) -> usize {
        self.others_start() + self.contexts.others
    }

    /// Allocate the next user slot. Returns the slot and the offset at
    /// which its projection column must be inserted.
    pub fn push_user(&mut self) -> (Slot, usize) {
        self.n_user += 1;
        let slot = self.n_user - 1;

        (slot, self.user_identity(slot))
    }

    /// Allocate the next item slot. Returns the slot and the offset at
    /// which its projection column must be inserted.
    pub fn push_item(&mut self) -> (Slot, usize) {
        self.n_item += 1;
        let slot = self.n_item - 1;

        (slot, self.item_identity(slot))
    }

    /// Materialize a sparse feature vector as a dense one of width `dim()`.
    #[cfg(test)]
    pub fn densify(&self, features: &[(usize, f64)]) -> Vec<f64> {
        let mut dense = vec![0.0; self.dim()];

        for &(idx, value) in features {
            dense[idx] += value;
        }

        dense
    }

    /// Assemble the user half of a feature vector: identity (if the user
    /// has a slot), user context, and other context.
    pub fn user_features(
        &self,
        user_slot: Option<Slot>,
        user: &[f64],
        others: &[f64],
    ) -> Vec<(usize, f64)> {
        let mut features = Vec::with_capacity(1 + user.len() + others.len());

        if let Some(slot) = user_slot {
            features.push((self.user_identity(slot), 1.0));
        }

        push_block(&mut features, self.user_context_start(), user);
        push_block(&mut features, self.others_start(), others);

        features
    }

    /// Assemble the full feature vector of an observation as
    /// `(position, value)` pairs in layout order. Zero context entries
    /// are skipped.
    pub fn assemble(
        &self,
        user_slot: Slot,
        user: &[f64],
        others: &[f64],
        item_slot: Slot,
        item: &[f64],
    ) -> Vec<(usize, f64)> {
        let mut features = self.user_features(Some(user_slot), user, others);

        features.push((self.item_identity(item_slot), 1.0));
        push_block(&mut features, self.item_context_start(), item);

        features
    }
}

fn push_block(features: &mut Vec<(usize, f64)>, start: usize, block: &[f64]) {
    features.extend(
        block
            .iter()
            .enumerate()
            .filter(|&(_, &value)| value != 0.0)
            .map(|(idx, &value)| (start + idx, value)),
    );
}
