//! Error types for the `tessera-grid` crate.
//!
//! [`GenerationError`] covers a single generator call, [`PopulationError`] a
//! whole population job, and [`GridModelError`] queries and I/O on a
//! populated model.

use tessera_mesh::MeshError;
use tessera_predict::PredictionError;
use tessera_types::TypeError;

/// Errors from the phase-info, node-station and grid-node generators.
#[derive(Debug, thiserror::Error)]
pub enum GenerationError {
    /// `generate()` was called before every required field was set.
    #[error("{generator} is not fully configured; missing: {}", missing.join(", "))]
    NotConfigured {
        /// Which generator.
        generator: &'static str,
        /// Names of the unset fields.
        missing: Vec<&'static str>,
    },

    /// A configured value is outside its valid range.
    #[error("invalid {name}: {value}")]
    InvalidParameter {
        /// Field name.
        name: &'static str,
        /// Offending value, rendered.
        value: String,
    },

    /// The prediction service failed hard (for example an unknown model).
    #[error("prediction failed: {0}")]
    Prediction(#[from] PredictionError),

    /// A generated value violated a construction invariant.
    #[error("invalid generated value: {0}")]
    Type(#[from] TypeError),
}

/// Errors from [`ModelPopulator`](crate::ModelPopulator).
#[derive(Debug, thiserror::Error)]
pub enum PopulationError {
    /// `build()` was called before every required field was set.
    #[error("model populator is not fully configured; missing: {}", missing.join(", "))]
    NotConfigured {
        /// Names of the unset fields.
        missing: Vec<&'static str>,
    },

    /// A configured value is outside its valid range.
    #[error("invalid {name}: {reason}")]
    InvalidParameter {
        /// Field name.
        name: &'static str,
        /// What was wrong.
        reason: String,
    },

    /// The mesh could not be loaded or written.
    #[error("mesh error: {0}")]
    Mesh(#[from] MeshError),

    /// Generating one slot failed; the whole job is aborted.
    #[error("grid node generation failed at vertex {vertex}, layer {layer}: {source}")]
    Generation {
        /// Vertex being populated.
        vertex: usize,
        /// Layer being populated.
        layer: usize,
        /// Underlying failure.
        #[source]
        source: GenerationError,
    },

    /// Every slot came out empty.
    #[error("gridnode data could not be computed for any of {slots} vertex/layer slots")]
    NoUsablePredictions {
        /// Number of slots visited.
        slots: usize,
    },

    /// The populated mesh could not be wrapped as a grid model.
    #[error("grid model error: {0}")]
    Model(#[from] GridModelError),

    /// The worker pool could not be created.
    #[error("failed to build worker pool: {0}")]
    ThreadPool(#[from] rayon::ThreadPoolBuildError),
}

/// Errors from [`PopulatedGridModel`](crate::PopulatedGridModel).
#[derive(Debug, thiserror::Error)]
pub enum GridModelError {
    /// The model could not be read, written or queried.
    #[error("mesh error: {0}")]
    Mesh(#[from] MeshError),

    /// The first-arrival index was queried before it was built.
    #[error("first-arrival map has not been initialized")]
    IndexNotInitialized,

    /// The index-building pool could not be created.
    #[error("failed to build index pool: {0}")]
    ThreadPool(#[from] rayon::ThreadPoolBuildError),
}
