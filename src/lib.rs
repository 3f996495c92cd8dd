#![deny(missing_docs)]
//! # sketchrec
//!
//! `sketchrec` implements streaming recommender models which learn from
//! one user-item interaction at a time over populations of users and
//! items that keep growing while the stream is consumed.
//!
//! The main model is an online matrix sketch: every interaction is turned
//! into a feature vector, randomly projected to a fixed low dimension, and
//! folded into a Frequent Directions sketch. Candidate items are scored by
//! their residual distance from the subspace the sketch has learned.
//!
//! ## Example
//!
//! ```rust
//! # extern crate sketchrec;
//! use sketchrec::data::{Contexts, Event};
//! use sketchrec::models::sketch::Hyperparameters;
//! use sketchrec::models::OnlineModel;
//!
//! let mut model = Hyperparameters::new(Contexts::default())
//!     .sketch_dim(40)
//!     .from_seed(42)
//!     .build();
//!
//! for (timestamp, (user_id, item_id)) in [(0, 0), (1, 1), (2, 2), (0, 3)].iter().enumerate() {
//!     let event = Event::new(*user_id, *item_id, timestamp);
//!     model.register(&event).unwrap();
//!     model.update(&event).unwrap();
//! }
//!
//! let query = Event::new(0, 0, 4);
//! let recommendations = model
//!     .recommend(&query.user_context(), &[0, 1, 2, 3], 2)
//!     .unwrap();
//!
//! assert_eq!(recommendations.len(), 2);
//! ```
#[macro_use]
extern crate serde_derive;

#[macro_use]
extern crate itertools;

#[macro_use]
extern crate failure;

#[macro_use]
extern crate log;

extern crate csv;
extern crate nalgebra;
extern crate ndarray;
extern crate rand;
extern crate rand_distr;
extern crate rand_xorshift;
extern crate serde;
extern crate serde_json;
extern crate siphasher;

pub mod data;
pub mod evaluation;
pub mod models;

/// Alias for user keys.
pub type UserId = usize;
/// Alias for item keys.
pub type ItemId = usize;
/// Alias for timestamps.
pub type Timestamp = usize;
/// Alias for the dense slot index assigned to an entity on first sight.
pub type Slot = usize;

/// Errors raised while registering, updating or scoring.
#[derive(Debug, Fail, Clone, PartialEq)]
pub enum ModelError {
    /// The event does not match the declared feature layout. Raised
    /// before any state is touched.
    #[fail(display = "Malformed event: {}", reason)]
    MalformedEvent {
        /// What was wrong with the event.
        reason: String,
    },
    /// A decomposition failed to converge or produced non-finite values.
    /// The model state must be considered lost.
    #[fail(display = "Numerical failure: {}", reason)]
    NumericalFailure {
        /// Where the failure happened.
        reason: String,
    },
}

impl ModelError {
    pub(crate) fn malformed<S: Into<String>>(reason: S) -> Self {
        ModelError::MalformedEvent {
            reason: reason.into(),
        }
    }

    pub(crate) fn numerical<S: Into<String>>(reason: S) -> Self {
        ModelError::NumericalFailure {
            reason: reason.into(),
        }
    }
}
