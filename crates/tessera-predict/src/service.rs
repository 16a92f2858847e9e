//! The prediction service seam.
//!
//! Grid population asks a [`PredictionService`] for travel time, slowness and
//! magnitude attenuation at many perturbed source positions. Implementations
//! hold mutable state (caches, counters, model handles) and are not safe for
//! concurrent use, so the trait takes `&mut self` and the populator hands each
//! worker its own instance.

use core::fmt;

use serde::{Deserialize, Serialize};
use tessera_types::PhaseType;

use crate::error::PredictionError;

/// The quantity being predicted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum PredictionFeature {
    /// Source-to-receiver travel time, seconds.
    TravelTime,
    /// Horizontal slowness at the receiver, seconds per degree.
    Slowness,
    /// Magnitude attenuation correction, magnitude units.
    MagnitudeCorrection,
}

impl fmt::Display for PredictionFeature {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::TravelTime => "travel-time",
            Self::Slowness => "slowness",
            Self::MagnitudeCorrection => "magnitude-correction",
        };
        f.write_str(name)
    }
}

/// A source position: geographic point plus depth below the surface.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SourceGeometry {
    /// Latitude in degrees.
    pub latitude_degrees: f64,
    /// Longitude in degrees.
    pub longitude_degrees: f64,
    /// Depth in kilometres, positive down.
    pub depth_km: f64,
}

/// A receiver position.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ReceiverGeometry {
    /// Latitude in degrees.
    pub latitude_degrees: f64,
    /// Longitude in degrees.
    pub longitude_degrees: f64,
    /// Elevation in kilometres, positive up.
    pub elevation_km: f64,
}

/// One prediction query.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PredictionRequest<'a> {
    /// The quantity requested.
    pub feature: PredictionFeature,
    /// Phase to predict.
    pub phase: PhaseType,
    /// Earth model to evaluate. Travel-time and slowness requests name a
    /// velocity model; magnitude requests name an attenuation model.
    pub earth_model: &'a str,
    /// Source position.
    pub source: SourceGeometry,
    /// Receiver position.
    pub receiver: ReceiverGeometry,
}

/// A source of phase predictions.
pub trait PredictionService: Send {
    /// Evaluate one prediction.
    ///
    /// Returns `Ok(None)` when the model has no answer for this phase and
    /// geometry (for example the phase does not exist at that distance).
    ///
    /// # Errors
    ///
    /// Returns [`PredictionError::UnknownEarthModel`] when `earth_model`
    /// cannot be resolved. Callers treat that as fatal to the whole job.
    fn predict(&mut self, request: &PredictionRequest<'_>) -> Result<Option<f64>, PredictionError>;
}

impl<T: PredictionService + ?Sized> PredictionService for Box<T> {
    fn predict(&mut self, request: &PredictionRequest<'_>) -> Result<Option<f64>, PredictionError> {
        (**self).predict(request)
    }
}
