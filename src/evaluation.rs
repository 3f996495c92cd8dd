//! Streaming evaluation: batch pre-training followed by test-then-update
//! over the rest of the stream, measuring a moving average of recall.
use std::collections::{HashMap, HashSet, VecDeque};
use std::time::Instant;

use super::data::{Event, Events};
use super::models::OnlineModel;
use super::{ItemId, ModelError, UserId};

/// Settings of the evaluation protocol.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct Protocol {
    window_size: usize,
    n_epoch: usize,
    at: usize,
    batch_train_fraction: f64,
    batch_test_fraction: f64,
}

impl Default for Protocol {
    fn default() -> Self {
        Protocol {
            window_size: 5000,
            n_epoch: 1,
            at: 10,
            batch_train_fraction: 0.2,
            batch_test_fraction: 0.1,
        }
    }
}

impl Protocol {
    /// Default protocol: 20% batch training, 10% batch holdout, recall@10
    /// averaged over a window of 5000 events.
    pub fn new() -> Self {
        Protocol::default()
    }

    /// Set the moving-average window.
    pub fn window_size(mut self, window_size: usize) -> Self {
        self.window_size = window_size.max(1);
        self
    }

    /// Set the number of passes over the batch-training segment.
    pub fn n_epoch(mut self, n_epoch: usize) -> Self {
        self.n_epoch = n_epoch;
        self
    }

    /// Set the size of each recommendation list.
    pub fn at(mut self, at: usize) -> Self {
        self.at = at;
        self
    }

    /// Set the fractions of the stream used for batch training and the
    /// batch holdout.
    pub fn fractions(mut self, batch_train: f64, batch_test: f64) -> Self {
        self.batch_train_fraction = batch_train;
        self.batch_test_fraction = batch_test;
        self
    }
}

/// Outcome of a streaming evaluation.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Report {
    /// Moving average of recall after each test event.
    pub recalls: Vec<f64>,
    /// Mean seconds spent per recommendation.
    pub avg_recommend: f64,
    /// Mean seconds spent per update.
    pub avg_update: f64,
}

/// Items seen so far, in first-seen order, and which users observed them.
#[derive(Clone, Debug, Default)]
pub struct History {
    items: Vec<ItemId>,
    seen: HashSet<ItemId>,
    observed: HashMap<UserId, HashSet<ItemId>>,
}

impl History {
    /// Empty history.
    pub fn new() -> Self {
        History::default()
    }

    /// Record that the event's user interacted with its item.
    pub fn observe(&mut self, event: &Event) {
        self.see(event.item_id());
        self.observed
            .entry(event.user_id())
            .or_insert_with(HashSet::new)
            .insert(event.item_id());
    }

    fn see(&mut self, item_id: ItemId) {
        if self.seen.insert(item_id) {
            self.items.push(item_id);
        }
    }

    /// Known items `user_id` has not interacted with yet.
    pub fn candidates(&self, user_id: UserId) -> Vec<ItemId> {
        match self.observed.get(&user_id) {
            Some(observed) => self
                .items
                .iter()
                .filter(|&&item_id| !observed.contains(&item_id))
                .cloned()
                .collect(),
            None => self.items.clone(),
        }
    }
}

/// Pre-train `model`: `n_epoch` passes over `train`, then a single pass
/// over `holdout`. Events are fed one at a time.
pub fn fit<T: OnlineModel>(
    model: &mut T,
    train: &[Event],
    holdout: &[Event],
    n_epoch: usize,
) -> Result<History, ModelError> {
    let mut history = History::new();

    for epoch in 0..n_epoch {
        for event in train {
            model.register(event)?;
            model.update(event)?;
            history.observe(event);
        }

        debug!("Finished batch epoch {}", epoch + 1);
    }

    for event in holdout {
        model.register(event)?;
        model.update(event)?;
        history.observe(event);
    }

    Ok(history)
}

/// Test-then-update evaluation over `test`.
///
/// For each event the model is asked for its top `at` items among the
/// known items the user has not interacted with; a hit is recorded if the
/// event's item is among them. The model is updated afterwards.
pub fn evaluate<T: OnlineModel>(
    model: &mut T,
    history: &mut History,
    test: &[Event],
    window_size: usize,
    at: usize,
) -> Result<Report, ModelError> {
    let window_size = window_size.max(1);
    let mut window = VecDeque::with_capacity(window_size);
    let mut hits = 0.0;

    let mut recalls = Vec::with_capacity(test.len());
    let mut recommend_time = 0.0;
    let mut update_time = 0.0;

    for event in test {
        model.register(event)?;
        history.see(event.item_id());

        let candidates = history.candidates(event.user_id());

        let start = Instant::now();
        let recommendations = model.recommend(&event.user_context(), &candidates, at)?;
        recommend_time += start.elapsed().as_secs_f64();

        let hit = if recommendations
            .iter()
            .any(|&(item_id, _)| item_id == event.item_id())
        {
            1.0
        } else {
            0.0
        };

        window.push_back(hit);
        hits += hit;
        if window.len() > window_size {
            hits -= window.pop_front().unwrap_or(0.0);
        }
        recalls.push(hits / window.len() as f64);

        history.observe(event);

        let start = Instant::now();
        model.update(event)?;
        update_time += start.elapsed().as_secs_f64();
    }

    let n = test.len().max(1) as f64;

    Ok(Report {
        recalls,
        avg_recommend: recommend_time / n,
        avg_update: update_time / n,
    })
}

/// Split `events` according to `protocol`, pre-train and evaluate.
pub fn run<T: OnlineModel>(
    model: &mut T,
    events: &Events,
    protocol: &Protocol,
) -> Result<Report, ModelError> {
    let (train, holdout, test) =
        events.protocol_split(protocol.batch_train_fraction, protocol.batch_test_fraction);

    info!(
        "Samples: {} batch train, {} batch holdout, {} test",
        train.len(),
        holdout.len(),
        test.len()
    );

    let mut history = fit(model, train.data(), holdout.data(), protocol.n_epoch)?;
    let report = evaluate(
        model,
        &mut history,
        test.data(),
        protocol.window_size,
        protocol.at,
    )?;

    info!(
        "Final recall {:.4}; {:.6}s per recommendation, {:.6}s per update",
        report.recalls.last().cloned().unwrap_or(0.0),
        report.avg_recommend,
        report.avg_update
    );

    Ok(report)
}
