//! Prediction bundle for one phase at one (grid point, station) pair.
//!
//! The grid cell is a cylinder around the grid point: `radius` degrees
//! horizontally and `height` km vertically. Travel time is sampled at the
//! center, at the top and bottom of the cell, and at the near and far edges
//! along the great circle to the station (each at center, top and bottom
//! depth). Bounds and finite-difference derivatives come from those samples.

use tessera_predict::{
    PredictionFeature, PredictionRequest, PredictionService, ReceiverGeometry, SourceGeometry, geo,
};
use tessera_types::{PhaseInfo, PhaseType, Station};
use tracing::debug;

use super::{Resolved, Settings, shared_setters};
use crate::error::GenerationError;

/// Floor on the reported slowness cell width, seconds per degree.
///
/// Phases whose slowness does not vary across the cell still need a
/// strictly positive tolerance during association.
pub const MIN_SLOWNESS_CELL_WIDTH: f64 = 1e-3;

/// Builds one [`PhaseInfo`].
#[derive(Default)]
pub struct PhaseInfoGenerator<'a> {
    settings: Settings<'a>,
    station: Option<&'a Station>,
    phase: Option<PhaseType>,
}

impl<'a> PhaseInfoGenerator<'a> {
    /// Start an unconfigured generator.
    pub fn new() -> Self {
        Self::default()
    }

    shared_setters!('a);

    /// The receiving station.
    #[must_use]
    pub const fn station(mut self, station: &'a Station) -> Self {
        self.station = Some(station);
        self
    }

    /// The phase to predict.
    #[must_use]
    pub const fn phase(mut self, phase: PhaseType) -> Self {
        self.phase = Some(phase);
        self
    }

    /// Names of the fields still unset.
    pub fn missing_parameter_names(&self) -> Vec<&'static str> {
        let mut missing = self.settings.missing();
        if self.station.is_none() {
            missing.push("station");
        }
        if self.phase.is_none() {
            missing.push("phase");
        }
        missing
    }

    /// Compute the bundle.
    ///
    /// Returns `Ok(None)` when the model has no prediction for some sample
    /// point, when the station lies inside the cell footprint, or when the
    /// derivatives come out with the wrong sign.
    ///
    /// # Errors
    ///
    /// [`GenerationError::NotConfigured`] if any field is unset,
    /// [`GenerationError::InvalidParameter`] for out-of-range settings, and
    /// [`GenerationError::Prediction`] when the service fails hard.
    pub fn generate(&mut self) -> Result<Option<PhaseInfo>, GenerationError> {
        const GENERATOR: &str = "PhaseInfoGenerator";
        let missing = self.missing_parameter_names();
        let (Some(station), Some(phase), true) = (self.station, self.phase, missing.is_empty()) else {
            return Err(GenerationError::NotConfigured {
                generator: GENERATOR,
                missing,
            });
        };
        let (service, cfg) = self.settings.resolve(GENERATOR)?;
        compute(service, &cfg, station, phase)
    }
}

/// Horizontal and vertical sample positions within one cell.
struct Cell {
    center: (f64, f64),
    near: (f64, f64),
    far: (f64, f64),
    depth: f64,
    top: f64,
    bottom: f64,
}

/// Issues prediction requests against one station for one phase.
struct Sampler<'s, 'c> {
    service: &'s mut dyn PredictionService,
    cfg: &'c Resolved<'c>,
    phase: PhaseType,
    receiver: ReceiverGeometry,
}

impl Sampler<'_, '_> {
    fn query(
        &mut self,
        feature: PredictionFeature,
        (latitude_degrees, longitude_degrees): (f64, f64),
        depth_km: f64,
    ) -> Result<Option<f64>, GenerationError> {
        let earth_model = match feature {
            PredictionFeature::MagnitudeCorrection => self.cfg.magnitude_model,
            PredictionFeature::TravelTime | PredictionFeature::Slowness => self.cfg.travel_time_model,
        };
        let request = PredictionRequest {
            feature,
            phase: self.phase,
            earth_model,
            source: SourceGeometry {
                latitude_degrees,
                longitude_degrees,
                depth_km,
            },
            receiver: self.receiver,
        };
        Ok(self.service.predict(&request)?)
    }
}

/// Unwraps a sample or returns `Ok(None)` from the enclosing function.
macro_rules! sample {
    ($expr:expr) => {
        match $expr? {
            Some(value) => value,
            None => return Ok(None),
        }
    };
}

fn compute(
    service: &mut dyn PredictionService,
    cfg: &Resolved<'_>,
    station: &Station,
    phase: PhaseType,
) -> Result<Option<PhaseInfo>, GenerationError> {
    let (lat, lon) = (cfg.latitude_degrees, cfg.longitude_degrees);
    let (st_lat, st_lon) = (station.latitude_degrees, station.longitude_degrees);

    let distance = geo::distance_degrees(lat, lon, st_lat, st_lon);
    if distance <= cfg.radius_degrees {
        debug!(
            station = %station.name,
            %phase,
            distance,
            "Station inside cell footprint; no phase info"
        );
        return Ok(None);
    }

    let toward_station = geo::azimuth_degrees(lat, lon, st_lat, st_lon);
    let half_height = cfg.height_km * 0.5;
    let cell = Cell {
        center: (lat, lon),
        near: geo::destination(lat, lon, toward_station, cfg.radius_degrees),
        far: geo::destination(lat, lon, toward_station + 180.0, cfg.radius_degrees),
        depth: cfg.depth_km,
        top: cfg.depth_km - half_height,
        bottom: cfg.depth_km + half_height,
    };

    let mut sampler = Sampler {
        service,
        cfg,
        phase,
        receiver: ReceiverGeometry {
            latitude_degrees: st_lat,
            longitude_degrees: st_lon,
            elevation_km: station.elevation_km,
        },
    };

    // Travel time over the cylinder.
    let tt = PredictionFeature::TravelTime;
    let travel_time = sample!(sampler.query(tt, cell.center, cell.depth));
    let tt_center_top = sample!(sampler.query(tt, cell.center, cell.top));
    let tt_center_bottom = sample!(sampler.query(tt, cell.center, cell.bottom));
    let tt_near = sample!(sampler.query(tt, cell.near, cell.depth));
    let tt_far = sample!(sampler.query(tt, cell.far, cell.depth));
    let tt_near_top = sample!(sampler.query(tt, cell.near, cell.top));
    let tt_near_bottom = sample!(sampler.query(tt, cell.near, cell.bottom));
    let tt_far_top = sample!(sampler.query(tt, cell.far, cell.top));
    let tt_far_bottom = sample!(sampler.query(tt, cell.far, cell.bottom));

    let samples = [
        travel_time,
        tt_center_top,
        tt_center_bottom,
        tt_near,
        tt_far,
        tt_near_top,
        tt_near_bottom,
        tt_far_top,
        tt_far_bottom,
    ];
    let travel_time_minimum = samples.iter().copied().fold(f64::INFINITY, f64::min);
    let travel_time_maximum = samples.iter().copied().fold(f64::NEG_INFINITY, f64::max);

    let radial_travel_time_derivative = (tt_near - tt_far) / (2.0 * cfg.radius_degrees);
    let vertical_travel_time_derivative = (tt_center_bottom - tt_center_top) / cfg.height_km;
    if !(radial_travel_time_derivative < 0.0 && vertical_travel_time_derivative > 0.0) {
        debug!(
            station = %station.name,
            %phase,
            radial_travel_time_derivative,
            vertical_travel_time_derivative,
            "Travel-time derivatives have unexpected sign; no phase info"
        );
        return Ok(None);
    }

    // Slowness across the footprint.
    let sl = PredictionFeature::Slowness;
    let slowness = sample!(sampler.query(sl, cell.center, cell.depth));
    let slowness_near = sample!(sampler.query(sl, cell.near, cell.depth));
    let slowness_far = sample!(sampler.query(sl, cell.far, cell.depth));
    let slowness_cell_width = ((slowness_near - slowness_far).abs() * 0.5).max(MIN_SLOWNESS_CELL_WIDTH);

    // Magnitude attenuation.
    let mc = PredictionFeature::MagnitudeCorrection;
    let magnitude_correction = sample!(sampler.query(mc, cell.center, cell.depth));
    let mc_near = sample!(sampler.query(mc, cell.near, cell.depth));
    let mc_far = sample!(sampler.query(mc, cell.far, cell.depth));
    let mc_top = sample!(sampler.query(mc, cell.center, cell.top));
    let mc_bottom = sample!(sampler.query(mc, cell.center, cell.bottom));

    let back_azimuth_degrees = geo::azimuth_degrees(st_lat, st_lon, lat, lon);
    let azimuth_degrees = geo::normalize_azimuth(back_azimuth_degrees + 180.0);

    Ok(Some(PhaseInfo {
        phase_type: phase,
        primary: false,
        travel_time_seconds: travel_time,
        travel_time_minimum,
        travel_time_maximum,
        azimuth_degrees,
        back_azimuth_degrees,
        radial_travel_time_derivative,
        vertical_travel_time_derivative,
        slowness_cell_width,
        slowness,
        minimum_magnitude: cfg.minimum_magnitude,
        magnitude_correction,
        radial_magnitude_correction_derivative: (mc_near - mc_far) / (2.0 * cfg.radius_degrees),
        vertical_magnitude_correction_derivative: (mc_bottom - mc_top) / cfg.height_km,
    }))
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used)]

    use tessera_predict::{AK135, AnalyticPredictor, PredictionError, VEITH_CLAWSON_72};

    use super::*;

    fn make_station() -> Station {
        Station::new("TXAR", 29.33, -103.67)
    }

    fn configured<'a>(svc: &'a mut AnalyticPredictor, station: &'a Station) -> PhaseInfoGenerator<'a> {
        PhaseInfoGenerator::new()
            .prediction_service(svc)
            .travel_time_model(AK135)
            .magnitude_model(VEITH_CLAWSON_72)
            .radius_degrees(1.0)
            .height_km(20.0)
            .latitude_degrees(10.0)
            .longitude_degrees(-80.0)
            .depth_km(15.0)
            .minimum_magnitude(3.5)
            .station(station)
            .phase(PhaseType::P)
    }

    // -----------------------------------------------------------------------
    // Configuration
    // -----------------------------------------------------------------------

    #[test]
    fn unconfigured_lists_every_field() {
        let generator = PhaseInfoGenerator::new();
        let missing = generator.missing_parameter_names();
        assert_eq!(missing.len(), 11);
        assert!(missing.contains(&"prediction_service"));
        assert!(missing.contains(&"phase"));
    }

    #[test]
    fn each_missing_field_is_reported() {
        let station = make_station();
        let mut svc = AnalyticPredictor::new();
        let mut generator = PhaseInfoGenerator::new()
            .prediction_service(&mut svc)
            .travel_time_model(AK135)
            .magnitude_model(VEITH_CLAWSON_72)
            .radius_degrees(1.0)
            .height_km(20.0)
            .latitude_degrees(10.0)
            .longitude_degrees(-80.0)
            .depth_km(15.0)
            .station(&station)
            .phase(PhaseType::P);
        let err = generator.generate().unwrap_err();
        assert!(err.to_string().contains("not fully configured"));
        assert!(matches!(err, GenerationError::NotConfigured { ref missing, .. } if missing == &vec!["minimum_magnitude"]));
    }

    #[test]
    fn invalid_radius_is_rejected() {
        let station = make_station();
        let mut svc = AnalyticPredictor::new();
        let mut generator = configured(&mut svc, &station).radius_degrees(0.0);
        assert!(matches!(
            generator.generate(),
            Err(GenerationError::InvalidParameter { name: "radius_degrees", .. })
        ));
    }

    #[test]
    fn invalid_latitude_is_rejected() {
        let station = make_station();
        let mut svc = AnalyticPredictor::new();
        let mut generator = configured(&mut svc, &station).latitude_degrees(91.0);
        assert!(matches!(
            generator.generate(),
            Err(GenerationError::InvalidParameter { name: "latitude_degrees", .. })
        ));
    }

    // -----------------------------------------------------------------------
    // Values
    // -----------------------------------------------------------------------

    #[test]
    fn generated_values_respect_invariants() {
        let station = make_station();
        let mut svc = AnalyticPredictor::new();
        let info = configured(&mut svc, &station).generate().unwrap().unwrap();

        assert_eq!(info.phase_type, PhaseType::P);
        assert!(!info.primary);
        assert!(info.travel_time_minimum <= info.travel_time_seconds);
        assert!(info.travel_time_seconds <= info.travel_time_maximum);
        assert!(info.radial_travel_time_derivative < 0.0);
        assert!(info.vertical_travel_time_derivative > 0.0);
        assert!(info.slowness_cell_width > 0.0);
        assert!(info.slowness > 0.0);
        assert!((info.minimum_magnitude - 3.5).abs() < f64::EPSILON);

        let diff = (info.azimuth_degrees - info.back_azimuth_degrees).rem_euclid(360.0);
        assert!((diff - 180.0).abs() < 1e-9);
    }

    #[test]
    fn generation_is_deterministic() {
        let station = make_station();
        let mut svc = AnalyticPredictor::new();
        let a = configured(&mut svc, &station).generate().unwrap().unwrap();
        let b = configured(&mut svc, &station).generate().unwrap().unwrap();
        assert!(a.bitwise_eq(&b));
    }

    #[test]
    fn uncovered_phase_is_empty() {
        let station = make_station();
        let mut svc = AnalyticPredictor::new();
        // Pg does not reach ~40 degrees.
        let result = configured(&mut svc, &station).phase(PhaseType::Pg).generate().unwrap();
        assert!(result.is_none());
    }

    #[test]
    fn station_inside_cell_is_empty() {
        let station = Station::new("NEAR", 10.2, -80.1);
        let mut svc = AnalyticPredictor::new();
        assert!(configured(&mut svc, &station).generate().unwrap().is_none());
    }

    #[test]
    fn unknown_model_is_an_error() {
        let station = make_station();
        let mut svc = AnalyticPredictor::new();
        let err = configured(&mut svc, &station)
            .travel_time_model("no-such-model")
            .generate()
            .unwrap_err();
        assert!(matches!(
            err,
            GenerationError::Prediction(PredictionError::UnknownEarthModel { .. })
        ));
    }
}
