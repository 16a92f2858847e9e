//! Grid population and the first-arrival index.
//!
//! # Modules
//!
//! - [`generator`] -- Phase-info, node-station and grid-node builders that
//!   query a prediction service for one grid point.
//! - [`payload`] -- [`GridNodeData`], the mesh payload holding one grid node
//!   or EMPTY, with its binary and text encodings.
//! - [`populator`] -- [`ModelPopulator`]: fills every vertex/layer slot of a
//!   mesh in parallel, one worker per prediction service.
//! - [`model`] -- [`PopulatedGridModel`] and its station-to-grid-node
//!   first-arrival index.
//! - [`config`] -- YAML configuration for a population job.
//! - [`error`] -- Generation, population and model errors.

pub mod config;
pub mod error;
pub mod generator;
pub mod model;
pub mod payload;
pub mod populator;

pub use config::{ConfigError, PopulatorConfig};
pub use error::{GenerationError, GridModelError, PopulationError};
pub use generator::{GridNodeGenerator, NodeStationGenerator, PhaseInfoGenerator};
pub use model::{FirstArrivalMap, GridNodeSet, PopulatedGridModel};
pub use payload::GridNodeData;
pub use populator::{MeshSource, ModelPopulator, ModelPopulatorBuilder};
