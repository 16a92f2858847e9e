//! Error types for the `tessera-assoc` crate.

use tessera_grid::GridModelError;
use tessera_types::{DetectionId, GridNodeId, StationId};

/// Errors raised while building or screening candidate events.
#[derive(Debug, thiserror::Error)]
pub enum AssociationError {
    /// `generate()` was called before every required field was set.
    #[error("candidate event generator is not fully configured; missing: {}", missing.join(", "))]
    NotConfigured {
        /// Names of the unset fields.
        missing: Vec<&'static str>,
    },

    /// A detection lacks a feature measurement the check needs.
    #[error("detection {detection} has no {feature} measurement")]
    MissingFeatureMeasurement {
        /// The detection.
        detection: DetectionId,
        /// Feature name, e.g. `ARRIVAL_TIME`.
        feature: &'static str,
    },

    /// A grid node has no predictions for a station it was matched against.
    #[error("grid node {node} has no predictions for station {station}")]
    MissingNodeStation {
        /// The grid node.
        node: GridNodeId,
        /// The station.
        station: StationId,
    },

    /// A node station does not carry exactly one P prediction.
    #[error("expected exactly one P phase for station {station} at grid node {node}, saw {count}")]
    UnexpectedPhases {
        /// The grid node.
        node: GridNodeId,
        /// The station.
        station: StationId,
        /// Number of P predictions found.
        count: usize,
    },

    /// A tolerance or definition value is outside its valid range.
    #[error("invalid {name}: {reason}")]
    InvalidParameter {
        /// Field name.
        name: &'static str,
        /// What was wrong.
        reason: String,
    },

    /// The populated model's index could not be built or queried.
    #[error("grid model error: {0}")]
    Model(#[from] GridModelError),
}
