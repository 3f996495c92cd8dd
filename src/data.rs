//! Streaming events and the containers used to hold them.
use std::collections::HashSet;
use std::io::Read;
use std::path::Path;

use super::{ItemId, ModelError, Timestamp, UserId};

/// Sizes of the dense context blocks carried by every event.
///
/// These fix the feature layout of a model before any event arrives.
#[derive(Clone, Copy, Serialize, Deserialize, Debug, Default, PartialEq, Eq)]
pub struct Contexts {
    /// Number of user-context features.
    pub user: usize,
    /// Number of features describing neither the user nor the item
    /// (time of day, device and so on).
    pub others: usize,
    /// Number of item-context features.
    pub item: usize,
}

impl Contexts {
    /// Build a new context description.
    pub fn new(user: usize, others: usize, item: usize) -> Self {
        Contexts {
            user,
            others,
            item,
        }
    }

    /// Total width of the context blocks.
    pub fn total(&self) -> usize {
        self.user + self.others + self.item
    }
}

/// A single observed interaction together with its context.
#[derive(Clone, Serialize, Deserialize, Debug, PartialEq)]
pub struct Event {
    user_id: UserId,
    item_id: ItemId,
    timestamp: Timestamp,
    #[serde(default)]
    user: Vec<f64>,
    #[serde(default)]
    others: Vec<f64>,
    #[serde(default)]
    item: Vec<f64>,
}

impl Event {
    /// Build an event with empty context blocks.
    pub fn new(user_id: UserId, item_id: ItemId, timestamp: Timestamp) -> Self {
        Event {
            user_id,
            item_id,
            timestamp,
            user: Vec::new(),
            others: Vec::new(),
            item: Vec::new(),
        }
    }

    /// Attach dense context blocks to the event.
    pub fn with_contexts(mut self, user: Vec<f64>, others: Vec<f64>, item: Vec<f64>) -> Self {
        self.user = user;
        self.others = others;
        self.item = item;
        self
    }

    /// The user key.
    pub fn user_id(&self) -> UserId {
        self.user_id
    }
    /// The item key.
    pub fn item_id(&self) -> ItemId {
        self.item_id
    }
    /// The timestamp.
    pub fn timestamp(&self) -> Timestamp {
        self.timestamp
    }
    /// User-context block.
    pub fn user(&self) -> &[f64] {
        &self.user
    }
    /// Other-context block.
    pub fn others(&self) -> &[f64] {
        &self.others
    }
    /// Item-context block.
    pub fn item(&self) -> &[f64] {
        &self.item
    }

    /// The user half of the event, as consumed by `recommend`.
    pub fn user_context(&self) -> UserContext {
        UserContext {
            user_id: self.user_id,
            user: &self.user,
            others: &self.others,
        }
    }

    /// Check the event against the declared layout.
    pub fn validate(&self, contexts: &Contexts) -> Result<(), ModelError> {
        self.user_context().validate(contexts)?;
        check_block("item", &self.item, contexts.item)
    }
}

/// The user-side features of a recommendation request.
#[derive(Clone, Copy, Debug)]
pub struct UserContext<'a> {
    /// The user key.
    pub user_id: UserId,
    /// User-context block.
    pub user: &'a [f64],
    /// Other-context block.
    pub others: &'a [f64],
}

impl<'a> UserContext<'a> {
    /// Build a user context from borrowed blocks.
    pub fn new(user_id: UserId, user: &'a [f64], others: &'a [f64]) -> Self {
        UserContext {
            user_id,
            user,
            others,
        }
    }

    /// Check the context blocks against the declared layout.
    pub fn validate(&self, contexts: &Contexts) -> Result<(), ModelError> {
        check_block("user", self.user, contexts.user)?;
        check_block("others", self.others, contexts.others)
    }
}

fn check_block(name: &str, block: &[f64], expected: usize) -> Result<(), ModelError> {
    if block.len() != expected {
        return Err(ModelError::malformed(format!(
            "{} context has {} features, expected {}",
            name,
            block.len(),
            expected
        )));
    }

    if block.iter().any(|x| !x.is_finite()) {
        return Err(ModelError::malformed(format!(
            "{} context contains a non-finite value",
            name
        )));
    }

    Ok(())
}

/// An ordered stream of events sharing one context layout.
#[derive(Clone, Serialize, Deserialize, Debug)]
pub struct Events {
    contexts: Contexts,
    events: Vec<Event>,
}

impl Events {
    /// Build a new stream.
    pub fn new(contexts: Contexts, events: Vec<Event>) -> Self {
        Events { contexts, events }
    }

    /// Read a JSON-encoded stream.
    pub fn from_json_reader<R: Read>(reader: R) -> Result<Self, failure::Error> {
        let events: Events = serde_json::from_reader(reader)?;

        for event in &events.events {
            event.validate(&events.contexts)?;
        }

        Ok(events)
    }

    /// The context layout shared by all events.
    pub fn contexts(&self) -> &Contexts {
        &self.contexts
    }

    /// The events, in stream order.
    pub fn data(&self) -> &[Event] {
        &self.events
    }

    /// Number of events.
    pub fn len(&self) -> usize {
        self.events.len()
    }

    /// Whether the stream is empty.
    pub fn is_empty(&self) -> bool {
        self.events.is_empty()
    }

    /// Number of distinct users in the stream.
    pub fn num_users(&self) -> usize {
        self.events
            .iter()
            .map(|x| x.user_id())
            .collect::<HashSet<_>>()
            .len()
    }

    /// Number of distinct items in the stream.
    pub fn num_items(&self) -> usize {
        self.events
            .iter()
            .map(|x| x.item_id())
            .collect::<HashSet<_>>()
            .len()
    }

    /// Split the stream into a head and a tail at `idx`.
    pub fn split_at(&self, idx: usize) -> (Self, Self) {
        let idx = idx.min(self.events.len());

        let head = Events {
            contexts: self.contexts,
            events: self.events[..idx].to_owned(),
        };
        let tail = Events {
            contexts: self.contexts,
            events: self.events[idx..].to_owned(),
        };

        (head, tail)
    }

    /// Split the stream into batch-training, batch-holdout, and incremental
    /// test segments, preserving stream order.
    pub fn protocol_split(
        &self,
        batch_train_fraction: f64,
        batch_test_fraction: f64,
    ) -> (Self, Self, Self) {
        let n_batch_train = (batch_train_fraction * self.len() as f64) as usize;
        let n_batch_test = (batch_test_fraction * self.len() as f64) as usize;

        let (train, rest) = self.split_at(n_batch_train);
        let (holdout, test) = rest.split_at(n_batch_test);

        (train, holdout, test)
    }
}

#[derive(Deserialize)]
struct InteractionRecord {
    user_id: UserId,
    item_id: ItemId,
    timestamp: Timestamp,
}

/// Load a context-free `user_id,item_id,timestamp` interaction log.
///
/// Rows are sorted by timestamp (stably) to form the stream.
pub fn load_interaction_csv<P: AsRef<Path>>(path: P) -> Result<Events, failure::Error> {
    let mut reader = csv::Reader::from_path(path)?;
    let mut records: Vec<InteractionRecord> =
        reader.deserialize().collect::<Result<Vec<_>, _>>()?;

    records.sort_by_key(|x| x.timestamp);

    let events = records
        .into_iter()
        .map(|x| Event::new(x.user_id, x.item_id, x.timestamp))
        .collect();

    Ok(Events::new(Contexts::default(), events))
}
