//! Error types for the `tessera-predict` crate.

use tessera_types::PhaseType;

use crate::service::PredictionFeature;

/// Errors a [`PredictionService`](crate::PredictionService) can raise.
///
/// A missing prediction for a phase or geometry the model does not cover is
/// not an error; services return `Ok(None)` for that.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum PredictionError {
    /// The named earth model is not known to the service.
    #[error("unknown earth model '{model}' for {feature} prediction")]
    UnknownEarthModel {
        /// The model name that failed to resolve.
        model: String,
        /// The feature that was requested.
        feature: PredictionFeature,
    },

    /// The request geometry contains a non-finite coordinate.
    #[error("invalid geometry for {phase} prediction: {reason}")]
    InvalidGeometry {
        /// The requested phase.
        phase: PhaseType,
        /// What was wrong.
        reason: String,
    },
}
