//! Spherical mesh substrate for grid population.
//!
//! # Modules
//!
//! - [`grid`] -- [`TessellatedGrid`]: multi-resolution icosahedral
//!   triangulation with binary and text encodings.
//! - [`model`] -- [`GeoModel`]: grid plus named depth layers and one opaque
//!   payload slot per vertex and layer; whole-model file formats.
//! - [`custom`] -- The [`CustomData`] payload trait and the process-wide
//!   registry of payload decoders.
//! - [`codec`] -- Little-endian primitives and a line-oriented text reader.
//! - [`error`] -- [`MeshError`].

pub mod codec;
pub mod custom;
pub mod error;
pub mod grid;
pub mod model;

pub use custom::{
    CustomData, CustomDataRef, CustomDataType, custom_data_type, register_custom_data_type,
    require_custom_data_type,
};
pub use error::MeshError;
pub use grid::{TessellatedGrid, lat_lon_to_vector, vector_to_lat_lon};
pub use model::{GeoModel, Layer, ModelMetadata, VertexRangeMut};
