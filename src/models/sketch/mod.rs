//! Online matrix sketching model.
//!
//! Every event is encoded as a feature vector
//!
//! ```text
//! [user one-hot][user context][other context][item one-hot][item context]
//! ```
//!
//! whose width grows by one for each newly seen user or item. The vector
//! is projected to `k` dimensions with a Gaussian random projection that
//! grows alongside it, normalized, and fed to a Frequent Directions sketch
//! of size `ℓ = floor(sqrt(k))`.
//!
//! Candidate items are scored by the norm of their projected feature
//! vector after removing its component in the span of the sketch's
//! leading left singular vectors:
//!
//! ```text
//! score(i) = ‖(I - U Uᵀ) normalize(R x_i)‖
//! ```
//!
//! Items are ranked by decreasing score.
use std::collections::HashMap;

use ndarray::Array2;
use rand::{Rng, SeedableRng};
use rand_xorshift::XorShiftRng;

use super::{top_at, OnlineModel};
use crate::data::{Contexts, Event, UserContext};
use crate::{ItemId, ModelError, Slot, UserId};

pub mod frequent_directions;
pub mod item_store;
pub mod layout;
pub mod projection;
pub mod scorer;

use self::frequent_directions::{FrequentDirections, Shrink};
use self::item_store::ItemStore;
use self::layout::FeatureLayout;
use self::projection::DynamicProjection;

/// Hyperparameters describing the sketching model.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Hyperparameters {
    contexts: Contexts,
    sketch_dim: usize,
    rng: XorShiftRng,
}

impl Hyperparameters {
    /// Build new hyperparameters for events with the given context blocks.
    pub fn new(contexts: Contexts) -> Self {
        Hyperparameters {
            contexts,
            sketch_dim: 40,
            rng: XorShiftRng::from_seed(rand::thread_rng().gen()),
        }
    }

    /// Set the dimension `k` of the projected feature space. The sketch
    /// keeps `floor(sqrt(k))` directions. Values below 1 are raised to 1.
    pub fn sketch_dim(mut self, sketch_dim: usize) -> Self {
        self.sketch_dim = sketch_dim.max(1);
        self
    }

    /// Set the random number generator.
    pub fn rng(mut self, rng: XorShiftRng) -> Self {
        self.rng = rng;
        self
    }

    /// Set the random number generator from seed.
    pub fn from_seed(mut self, seed: u64) -> Self {
        self.rng = XorShiftRng::seed_from_u64(seed);
        self
    }

    /// Number of sketched directions for the current `k`.
    pub fn ell(&self) -> usize {
        ((self.sketch_dim as f64).sqrt() as usize).max(1)
    }

    /// Build the sketching model.
    pub fn build(mut self) -> OnlineSketchModel {
        let layout = FeatureLayout::new(self.contexts);
        let projection = DynamicProjection::new(self.sketch_dim, layout.dim(), &mut self.rng);
        let sketch = FrequentDirections::new(self.sketch_dim, self.ell());
        let item_store = ItemStore::new(self.contexts.item);

        OnlineSketchModel {
            hyper: self,
            layout,
            users: HashMap::new(),
            items: HashMap::new(),
            projection,
            item_store,
            sketch,
            last_shrink: None,
            num_updates: 0,
        }
    }
}

/// Streaming recommender backed by a Frequent Directions sketch.
#[derive(Clone, Debug)]
pub struct OnlineSketchModel {
    hyper: Hyperparameters,
    layout: FeatureLayout,
    users: HashMap<UserId, Slot>,
    items: HashMap<ItemId, Slot>,
    projection: DynamicProjection,
    item_store: ItemStore,
    sketch: FrequentDirections,
    last_shrink: Option<Shrink>,
    num_updates: usize,
}

impl OnlineSketchModel {
    /// Number of registered users.
    pub fn num_users(&self) -> usize {
        self.layout.n_user()
    }

    /// Number of registered items.
    pub fn num_items(&self) -> usize {
        self.layout.n_item()
    }

    /// Current feature dimension `p`.
    pub fn dim(&self) -> usize {
        self.layout.dim()
    }

    /// Projected dimension `k`.
    pub fn sketch_dim(&self) -> usize {
        self.projection.k()
    }

    /// Number of sketched directions `ℓ`.
    pub fn ell(&self) -> usize {
        self.sketch.ell()
    }

    /// Number of observations consumed by `update`.
    pub fn num_updates(&self) -> usize {
        self.num_updates
    }

    /// What the most recent successful `update` did to the sketch.
    pub fn last_shrink(&self) -> Option<&Shrink> {
        self.last_shrink.as_ref()
    }

    /// The feature layout.
    pub fn layout(&self) -> &FeatureLayout {
        &self.layout
    }

    /// The random projection.
    pub fn projection(&self) -> &DynamicProjection {
        &self.projection
    }

    /// The item feature store.
    pub fn item_store(&self) -> &ItemStore {
        &self.item_store
    }

    /// The sketch matrix `B`.
    pub fn sketch(&self) -> &Array2<f64> {
        self.sketch.sketch()
    }

    /// The current orthonormal basis `U`.
    pub fn basis(&self) -> &Array2<f64> {
        self.sketch.basis()
    }

    /// Slot of a registered user.
    pub fn user_slot(&self, user_id: UserId) -> Option<Slot> {
        self.users.get(&user_id).cloned()
    }

    /// Slot of a registered item.
    pub fn item_slot(&self, item_id: ItemId) -> Option<Slot> {
        self.items.get(&item_id).cloned()
    }

    fn registered_slots(&self, event: &Event) -> Result<(Slot, Slot), ModelError> {
        let user_slot = self.user_slot(event.user_id()).ok_or_else(|| {
            ModelError::malformed(format!("user {} is not registered", event.user_id()))
        })?;
        let item_slot = self.item_slot(event.item_id()).ok_or_else(|| {
            ModelError::malformed(format!("item {} is not registered", event.item_id()))
        })?;

        Ok((user_slot, item_slot))
    }
}

impl OnlineModel for OnlineSketchModel {
    fn register(&mut self, event: &Event) -> Result<(), ModelError> {
        event.validate(&self.hyper.contexts)?;

        if !self.users.contains_key(&event.user_id()) {
            let (slot, offset) = self.layout.push_user();
            self.projection.insert_column(offset, &mut self.hyper.rng);
            self.users.insert(event.user_id(), slot);

            debug!(
                "Registered user {} at slot {} (p = {})",
                event.user_id(),
                slot,
                self.layout.dim()
            );
        }

        if !self.items.contains_key(&event.item_id()) {
            let (slot, offset) = self.layout.push_item();
            let stored = self.item_store.push(event.item());
            debug_assert_eq!(slot, stored);

            self.projection.insert_column(offset, &mut self.hyper.rng);
            self.items.insert(event.item_id(), slot);

            debug!(
                "Registered item {} at slot {} (p = {}, {} stored item entries)",
                event.item_id(),
                slot,
                self.layout.dim(),
                self.item_store.nnz()
            );
        }

        Ok(())
    }

    fn update(&mut self, event: &Event) -> Result<(), ModelError> {
        event.validate(&self.hyper.contexts)?;
        let (user_slot, item_slot) = self.registered_slots(event)?;

        let features = self.layout.assemble(
            user_slot,
            event.user(),
            event.others(),
            item_slot,
            event.item(),
        );
        let projected = self.projection.project(&features);

        let norm = projected.dot(&projected).sqrt();
        if !(norm.is_finite() && norm > 0.0) {
            return Err(ModelError::numerical(format!(
                "projected observation has norm {}",
                norm
            )));
        }

        let shrink = self.sketch.insert((projected / norm).view())?;
        self.last_shrink = Some(shrink);
        self.num_updates += 1;

        trace!(
            "Update {}: column {}, delta {:.6}, energy {:.6} -> {:.6}",
            self.num_updates,
            shrink.column,
            shrink.delta,
            shrink.energy_before,
            shrink.energy_after
        );

        Ok(())
    }

    fn recommend(
        &self,
        user: &UserContext,
        item_ids: &[ItemId],
        at: usize,
    ) -> Result<Vec<(ItemId, f64)>, ModelError> {
        user.validate(&self.hyper.contexts)?;

        let (known_ids, slots): (Vec<ItemId>, Vec<Slot>) = item_ids
            .iter()
            .filter_map(|&item_id| self.item_slot(item_id).map(|slot| (item_id, slot)))
            .unzip();

        if known_ids.len() < item_ids.len() {
            debug!(
                "Skipping {} unregistered target items",
                item_ids.len() - known_ids.len()
            );
        }

        if known_ids.is_empty() {
            return Ok(Vec::new());
        }

        let user_slot = self.user_slot(user.user_id);
        let user_features = self
            .layout
            .user_features(user_slot, user.user, user.others);

        let candidates = scorer::project_candidates(
            &self.layout,
            &self.projection,
            &self.item_store,
            &user_features,
            &slots,
        );
        let scores = scorer::residual_scores(self.sketch.basis(), &candidates);

        top_at(known_ids.into_iter().zip(scores).collect(), at)
    }
}

#[cfg(test)]
mod tests {
    use ndarray::{Array1, Axis};
    use proptest::prelude::*;

    use super::*;

    fn model(contexts: Contexts, sketch_dim: usize) -> OnlineSketchModel {
        Hyperparameters::new(contexts)
            .sketch_dim(sketch_dim)
            .from_seed(42)
            .build()
    }

    fn observe(model: &mut OnlineSketchModel, event: &Event) {
        model.register(event).unwrap();
        model.update(event).unwrap();
    }

    #[test]
    fn sketch_size_follows_dimension() {
        let model = model(Contexts::default(), 40);

        assert_eq!(model.sketch_dim(), 40);
        assert_eq!(model.ell(), 6);
        assert_eq!(model.sketch().dim(), (40, 6));
        assert_eq!(model.basis().dim(), (40, 6));
    }

    #[test]
    fn single_event_grows_empty_model() {
        let contexts = Contexts::new(2, 1, 3);
        let mut model = model(contexts, 16);
        let initial_dim = model.dim();

        assert_eq!(initial_dim, 6);
        assert_eq!(model.projection().dim(), 6);
        assert_eq!(model.item_store().shape(), (3, 0));

        let event = Event::new(100, 200, 0).with_contexts(
            vec![0.1, 0.2],
            vec![1.0],
            vec![0.0, 0.5, 0.0],
        );
        model.register(&event).unwrap();

        assert_eq!(model.num_users(), 1);
        assert_eq!(model.num_items(), 1);
        assert_eq!(model.dim(), initial_dim + 2);
        assert_eq!(model.projection().dim(), initial_dim + 2);
        assert_eq!(model.item_store().shape(), (4, 1));
        // The identity entry plus the single non-zero context value.
        assert_eq!(model.item_store().nnz(), 2);
        assert_eq!(model.user_slot(100), Some(0));
        assert_eq!(model.item_slot(200), Some(0));

        // Registering again is a no-op.
        let projection = model.projection().to_array();
        model.register(&event).unwrap();
        assert_eq!(model.dim(), initial_dim + 2);
        assert_eq!(model.projection().to_array(), projection);
    }

    #[test]
    fn malformed_events_do_not_register() {
        let mut model = model(Contexts::new(1, 0, 0), 16);
        let event = Event::new(0, 0, 0);

        match model.register(&event) {
            Err(ModelError::MalformedEvent { .. }) => {}
            other => panic!("Expected a malformed event, got {:?}", other),
        }

        assert_eq!(model.num_users(), 0);
        assert_eq!(model.num_items(), 0);
        assert_eq!(model.projection().dim(), 1);
    }

    #[test]
    fn update_requires_registration() {
        let mut model = model(Contexts::default(), 16);

        assert!(model.update(&Event::new(0, 0, 0)).is_err());
        assert_eq!(model.num_updates(), 0);
    }

    #[test]
    fn observations_enter_the_sketch_normalized() {
        let mut model = model(Contexts::new(1, 1, 1), 25);
        assert!(model.last_shrink().is_none());

        for t in 0..12 {
            let event = Event::new(t % 3, t % 4, t).with_contexts(
                vec![10.0 * (t + 1) as f64],
                vec![-3.0],
                vec![7.0 + t as f64],
            );
            model.register(&event).unwrap();

            let user_slot = model.user_slot(event.user_id()).unwrap();
            let item_slot = model.item_slot(event.item_id()).unwrap();
            let features = model.layout().assemble(
                user_slot,
                event.user(),
                event.others(),
                item_slot,
                event.item(),
            );
            let projected = model.projection().project(&features);
            // The raw projection is far from unit norm.
            assert!((projected.dot(&projected) - 1.0).abs() > 1e-3);

            let energy = model.sketch().iter().map(|x| x * x).sum::<f64>();
            let free = model
                .sketch()
                .axis_iter(Axis(1))
                .position(|column| column.iter().all(|x| x.abs() <= 1e-8))
                .unwrap();

            model.update(&event).unwrap();
            let shrink = *model.last_shrink().unwrap();

            // The observation went into an empty column and added exactly
            // its squared norm to the sketch.
            assert_eq!(shrink.column, free);
            assert!((shrink.energy_before - energy - 1.0).abs() < 1e-9);
        }

        // After a single update, B holds the normalized projection alone.
        let mut fresh = Hyperparameters::new(Contexts::new(1, 1, 1))
            .sketch_dim(25)
            .from_seed(42)
            .build();
        let event = Event::new(3, 4, 0).with_contexts(vec![10.0], vec![-3.0], vec![7.0]);
        observe(&mut fresh, &event);

        let first = fresh.sketch().column(0).to_owned();
        let features = fresh.layout().assemble(0, &[10.0], &[-3.0], 0, &[7.0]);
        let projected = fresh.projection().project(&features);
        let expected: Array1<f64> = &projected / projected.dot(&projected).sqrt();

        assert!((first.dot(&first) - 1.0).abs() < 1e-9);
        assert!((first.dot(&expected).abs() - 1.0).abs() < 1e-9);
    }

    #[test]
    fn repeated_event_accumulates_energy() {
        let mut model = model(Contexts::default(), 16);
        assert_eq!(model.ell(), 4);

        for count in 1..=10 {
            observe(&mut model, &Event::new(3, 6, count));

            let shrink = *model.last_shrink().unwrap();
            let energy = model.sketch().iter().map(|x| x * x).sum::<f64>();

            // One repeated direction keeps the sketch at rank one, so
            // nothing is shrunk away.
            assert!((shrink.energy_before - count as f64).abs() < 1e-9);
            assert!(shrink.delta.abs() < 1e-12);
            assert!((energy - count as f64).abs() < 1e-9);
        }

        // The learned direction is the event itself, so it scores zero.
        model.register(&Event::new(3, 7, 11)).unwrap();
        let recommendations = model
            .recommend(&Event::new(3, 6, 11).user_context(), &[6, 7], 2)
            .unwrap();

        assert_eq!(recommendations[0].0, 7);
        assert_eq!(recommendations[1].0, 6);
        assert!(recommendations[1].1.abs() < 1e-6);
    }

    #[test]
    fn end_to_end_recommendation() {
        let mut model = model(Contexts::default(), 40);
        assert_eq!(model.ell(), 6);

        for t in 0..10 {
            observe(&mut model, &Event::new(t % 3, t % 5, t));
        }

        assert_eq!(model.num_users(), 3);
        assert_eq!(model.num_items(), 5);

        let query = Event::new(0, 0, 10);
        let targets: Vec<ItemId> = (0..5).collect();
        let recommendations = model.recommend(&query.user_context(), &targets, 3).unwrap();

        assert_eq!(recommendations.len(), 3);

        let mut ids: Vec<ItemId> = recommendations.iter().map(|&(id, _)| id).collect();
        ids.sort();
        ids.dedup();
        assert_eq!(ids.len(), 3);
        assert!(ids.iter().all(|id| targets.contains(id)));

        for &(_, score) in &recommendations {
            assert!(score.is_finite());
            assert!(score >= 0.0);
        }
        for pair in recommendations.windows(2) {
            assert!(pair[0].1 >= pair[1].1);
        }
    }

    #[test]
    fn scoring_is_deterministic() {
        let mut model = model(Contexts::new(1, 0, 2), 16);

        for t in 0..20 {
            let event = Event::new(t % 4, t % 7, t).with_contexts(
                vec![t as f64 / 20.0],
                vec![],
                vec![(t % 2) as f64, 1.0],
            );
            observe(&mut model, &event);
        }

        let user = vec![0.3];
        let query = UserContext::new(1, &user, &[]);
        let targets: Vec<ItemId> = (0..7).collect();

        let first = model.recommend(&query, &targets, 5).unwrap();
        let second = model.recommend(&query, &targets, 5).unwrap();

        assert_eq!(first, second);
    }

    #[test]
    fn unknown_targets_are_skipped() {
        let mut model = model(Contexts::default(), 16);
        observe(&mut model, &Event::new(0, 0, 0));
        observe(&mut model, &Event::new(0, 1, 1));

        let query = Event::new(0, 0, 2);
        let recommendations = model
            .recommend(&query.user_context(), &[1, 99, 0, 100], 10)
            .unwrap();

        let mut ids: Vec<ItemId> = recommendations.iter().map(|&(id, _)| id).collect();
        ids.sort();
        assert_eq!(ids, vec![0, 1]);

        let none = model
            .recommend(&query.user_context(), &[99, 100], 10)
            .unwrap();
        assert!(none.is_empty());
    }

    #[test]
    fn scores_before_any_update_are_one() {
        let mut model = model(Contexts::default(), 16);
        let event = Event::new(0, 0, 0);
        model.register(&event).unwrap();
        model.register(&Event::new(1, 1, 1)).unwrap();

        let recommendations = model.recommend(&event.user_context(), &[0, 1], 2).unwrap();

        for (_, score) in recommendations {
            assert!((score - 1.0).abs() < 1e-9);
        }
    }

    #[test]
    fn unregistered_user_can_be_scored() {
        let mut model = model(Contexts::default(), 16);
        observe(&mut model, &Event::new(0, 0, 0));

        let stranger = Event::new(42, 0, 1);
        let recommendations = model.recommend(&stranger.user_context(), &[0], 1).unwrap();

        assert_eq!(recommendations.len(), 1);
        assert!(recommendations[0].1.is_finite());
    }

    proptest! {
        #[test]
        fn projection_columns_stay_attached(new_users in prop::collection::vec(any::<bool>(), 1..40)) {
            let contexts = Contexts::new(2, 1, 2);
            let mut model = model(contexts, 9);
            let initial_dim = model.dim();

            let mut user_columns = Vec::new();
            let mut item_columns = Vec::new();

            for (t, &new_user) in new_users.iter().enumerate() {
                let user_id = if new_user { user_columns.len() } else { 0 };
                let item_id = if new_user { 0 } else { item_columns.len() };

                let event = Event::new(user_id, item_id, t)
                    .with_contexts(vec![0.0, 1.0], vec![0.5], vec![1.0, 0.0]);
                model.register(&event).unwrap();

                let layout = *model.layout();
                if user_columns.len() < model.num_users() {
                    let slot = model.user_slot(user_id).unwrap();
                    user_columns.push(model.projection().column(layout.user_identity(slot)).to_owned());
                }
                if item_columns.len() < model.num_items() {
                    let slot = model.item_slot(item_id).unwrap();
                    item_columns.push(model.projection().column(layout.item_identity(slot)).to_owned());
                }
            }

            let layout = *model.layout();
            prop_assert_eq!(model.dim(), initial_dim + model.num_users() + model.num_items());
            prop_assert_eq!(model.projection().dim(), model.dim());

            for (slot, column) in user_columns.iter().enumerate() {
                prop_assert_eq!(&model.projection().column(layout.user_identity(slot)).to_owned(), column);
            }
            for (slot, column) in item_columns.iter().enumerate() {
                prop_assert_eq!(&model.projection().column(layout.item_identity(slot)).to_owned(), column);
            }
        }

        #[test]
        fn sketch_rank_is_bounded(pairs in prop::collection::vec((0usize..6, 0usize..8), 1..30)) {
            let mut model = model(Contexts::default(), 16);

            for (t, &(user_id, item_id)) in pairs.iter().enumerate() {
                observe(&mut model, &Event::new(user_id, item_id, t));

                let energy = model.sketch().iter().map(|x| x * x).sum::<f64>();
                prop_assert!(energy <= (t + 1) as f64 + 1e-9);

                let nonzero_columns = model
                    .sketch()
                    .axis_iter(Axis(1))
                    .filter(|column| column.iter().any(|x| x.abs() > 1e-8))
                    .count();
                // The shrink always zeroes the weakest direction.
                prop_assert!(nonzero_columns < model.ell());
            }
        }
    }
}
