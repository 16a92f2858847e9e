//! Phase prediction for grid population.
//!
//! # Modules
//!
//! - [`service`] -- The [`PredictionService`] trait and request types. One
//!   instance is owned by one worker at a time.
//! - [`analytic`] -- [`AnalyticPredictor`], a deterministic closed-form
//!   implementation with `ak135`-shaped curves.
//! - [`geo`] -- Great-circle distance, azimuth and destination helpers.
//! - [`error`] -- [`PredictionError`].

pub mod analytic;
pub mod error;
pub mod geo;
pub mod service;

pub use analytic::{AK135, AnalyticPredictor, MagnitudeModel, PhaseCurve, TravelTimeModel, VEITH_CLAWSON_72};
pub use error::PredictionError;
pub use service::{
    PredictionFeature, PredictionRequest, PredictionService, ReceiverGeometry, SourceGeometry,
};
