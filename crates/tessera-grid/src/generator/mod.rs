//! Builders that turn prediction-service answers into the grid's
//! prediction tree.
//!
//! The three generators nest: [`GridNodeGenerator`] runs one
//! [`NodeStationGenerator`] per station, which runs one
//! [`PhaseInfoGenerator`] per phase. Each level checks its own configuration
//! when `generate()` is called, so a missing field is reported by whichever
//! generator the caller invoked, before any prediction is requested.

mod grid_node;
mod node_station;
mod phase_info;

pub use grid_node::GridNodeGenerator;
pub use node_station::NodeStationGenerator;
pub use phase_info::PhaseInfoGenerator;

use tessera_predict::PredictionService;

use crate::error::GenerationError;

/// Slack allowed on latitude/longitude bounds checks.
const COORDINATE_TOLERANCE: f64 = 1e-12;

/// Settings shared by every generator level.
#[derive(Default)]
pub(crate) struct Settings<'a> {
    pub service: Option<&'a mut dyn PredictionService>,
    pub travel_time_model: Option<&'a str>,
    pub magnitude_model: Option<&'a str>,
    pub radius_degrees: Option<f64>,
    pub height_km: Option<f64>,
    pub latitude_degrees: Option<f64>,
    pub longitude_degrees: Option<f64>,
    pub depth_km: Option<f64>,
    pub minimum_magnitude: Option<f64>,
}

/// A fully configured copy of [`Settings`], minus the service handle.
#[derive(Debug, Clone, Copy)]
pub(crate) struct Resolved<'a> {
    pub travel_time_model: &'a str,
    pub magnitude_model: &'a str,
    pub radius_degrees: f64,
    pub height_km: f64,
    pub latitude_degrees: f64,
    pub longitude_degrees: f64,
    pub depth_km: f64,
    pub minimum_magnitude: f64,
}

impl<'a> Settings<'a> {
    /// Names of unset fields, in setter order.
    pub fn missing(&self) -> Vec<&'static str> {
        [
            ("prediction_service", self.service.is_none()),
            ("travel_time_model", self.travel_time_model.is_none()),
            ("magnitude_model", self.magnitude_model.is_none()),
            ("radius_degrees", self.radius_degrees.is_none()),
            ("height_km", self.height_km.is_none()),
            ("latitude_degrees", self.latitude_degrees.is_none()),
            ("longitude_degrees", self.longitude_degrees.is_none()),
            ("depth_km", self.depth_km.is_none()),
            ("minimum_magnitude", self.minimum_magnitude.is_none()),
        ]
        .into_iter()
        .filter_map(|(name, unset)| unset.then_some(name))
        .collect()
    }

    /// Validate ranges and split out the service handle.
    ///
    /// Callers check [`missing`](Self::missing) first; an unset field here is
    /// still reported as `NotConfigured`.
    pub fn resolve(
        &mut self,
        generator: &'static str,
    ) -> Result<(&mut dyn PredictionService, Resolved<'a>), GenerationError> {
        let not_configured = || GenerationError::NotConfigured {
            generator,
            missing: self.missing(),
        };
        let resolved = Resolved {
            travel_time_model: self.travel_time_model.ok_or_else(not_configured)?,
            magnitude_model: self.magnitude_model.ok_or_else(not_configured)?,
            radius_degrees: self.radius_degrees.ok_or_else(not_configured)?,
            height_km: self.height_km.ok_or_else(not_configured)?,
            latitude_degrees: self.latitude_degrees.ok_or_else(not_configured)?,
            longitude_degrees: self.longitude_degrees.ok_or_else(not_configured)?,
            depth_km: self.depth_km.ok_or_else(not_configured)?,
            minimum_magnitude: self.minimum_magnitude.ok_or_else(not_configured)?,
        };
        if self.service.is_none() {
            return Err(not_configured());
        }
        resolved.validate()?;
        let service = self
            .service
            .as_deref_mut()
            .ok_or_else(|| GenerationError::NotConfigured {
                generator,
                missing: vec!["prediction_service"],
            })?;
        Ok((service, resolved))
    }
}

impl Resolved<'_> {
    fn validate(&self) -> Result<(), GenerationError> {
        let invalid = |name: &'static str, value: f64| GenerationError::InvalidParameter {
            name,
            value: value.to_string(),
        };
        if !(self.radius_degrees.is_finite() && self.radius_degrees > 0.0) {
            return Err(invalid("radius_degrees", self.radius_degrees));
        }
        if !(self.height_km.is_finite() && self.height_km > 0.0) {
            return Err(invalid("height_km", self.height_km));
        }
        if !(self.latitude_degrees.abs() <= 90.0 + COORDINATE_TOLERANCE) {
            return Err(invalid("latitude_degrees", self.latitude_degrees));
        }
        if !(self.longitude_degrees.abs() <= 180.0 + COORDINATE_TOLERANCE) {
            return Err(invalid("longitude_degrees", self.longitude_degrees));
        }
        if !self.depth_km.is_finite() {
            return Err(invalid("depth_km", self.depth_km));
        }
        if !(self.minimum_magnitude.is_finite() && self.minimum_magnitude >= 0.0) {
            return Err(invalid("minimum_magnitude", self.minimum_magnitude));
        }
        Ok(())
    }
}

/// Expands the setters every generator shares into an `impl` block.
macro_rules! shared_setters {
    ($lt:lifetime) => {
        /// Prediction service used for every query. Borrowed exclusively for
        /// the generator's lifetime.
        #[must_use]
        pub const fn prediction_service(mut self, service: &$lt mut dyn tessera_predict::PredictionService) -> Self {
            self.settings.service = Some(service);
            self
        }

        /// Velocity model for travel-time and slowness predictions.
        #[must_use]
        pub const fn travel_time_model(mut self, model: &$lt str) -> Self {
            self.settings.travel_time_model = Some(model);
            self
        }

        /// Attenuation model for magnitude corrections.
        #[must_use]
        pub const fn magnitude_model(mut self, model: &$lt str) -> Self {
            self.settings.magnitude_model = Some(model);
            self
        }

        /// Horizontal half-width of the grid cell, degrees.
        #[must_use]
        pub const fn radius_degrees(mut self, radius: f64) -> Self {
            self.settings.radius_degrees = Some(radius);
            self
        }

        /// Vertical extent of the grid cell, km.
        #[must_use]
        pub const fn height_km(mut self, height: f64) -> Self {
            self.settings.height_km = Some(height);
            self
        }

        /// Latitude of the grid point, degrees.
        #[must_use]
        pub const fn latitude_degrees(mut self, latitude: f64) -> Self {
            self.settings.latitude_degrees = Some(latitude);
            self
        }

        /// Longitude of the grid point, degrees.
        #[must_use]
        pub const fn longitude_degrees(mut self, longitude: f64) -> Self {
            self.settings.longitude_degrees = Some(longitude);
            self
        }

        /// Depth of the grid point center, km.
        #[must_use]
        pub const fn depth_km(mut self, depth: f64) -> Self {
            self.settings.depth_km = Some(depth);
            self
        }

        /// Smallest magnitude the grid should detect.
        #[must_use]
        pub const fn minimum_magnitude(mut self, magnitude: f64) -> Self {
            self.settings.minimum_magnitude = Some(magnitude);
            self
        }
    };
}

pub(crate) use shared_setters;
