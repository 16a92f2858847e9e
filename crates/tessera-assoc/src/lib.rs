//! Candidate-event association over the populated grid.
//!
//! # Modules
//!
//! - [`generator`] -- [`CandidateEventGenerator`]: pairs detections from
//!   different stations at the grid nodes both stations point to.
//! - [`candidate`] -- [`CandidateEvent`] and the slowness and travel-time
//!   screening checks.
//! - [`associator`] -- Whole-batch association: corroboration and
//!   [`EventHypothesis`] output.
//! - [`definition`] -- [`AssociatorDefinition`] tuning parameters.
//! - [`error`] -- [`AssociationError`].

pub mod associator;
pub mod candidate;
pub mod definition;
pub mod error;
pub mod generator;

pub use associator::{EventHypothesis, associate, associate_corroborators};
pub use candidate::{CandidateEvent, passes_slowness_constraint};
pub use definition::AssociatorDefinition;
pub use error::AssociationError;
pub use generator::CandidateEventGenerator;
