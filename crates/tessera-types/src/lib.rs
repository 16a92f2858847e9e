//! Shared value types for the Tessera global-grid associator.
//!
//! # Modules
//!
//! - [`ids`] -- Type-safe UUID wrappers for grid nodes, stations and detections
//! - [`enums`] -- Phase labels
//! - [`structs`] -- Prediction tree (`PhaseInfo`, `NodeStation`, `GridNode`)
//!   and association inputs (`Station`, `Detection`, `SdhStationAssociation`)
//! - [`error`] -- Construction and parse errors

pub mod enums;
pub mod error;
pub mod ids;
pub mod structs;

pub use enums::PhaseType;
pub use error::TypeError;
pub use ids::{DetectionId, GridNodeId, StationId};
pub use structs::{
    Detection, GridNode, InstantMeasurement, NodeStation, NumericMeasurement, PhaseInfo,
    SdhStationAssociation, Station,
};
