//! A deterministic closed-form prediction service.
//!
//! Each phase of a travel-time model is a quadratic travel-time curve in
//! epicentral distance plus a linear depth delay. Slowness is the curve's
//! distance derivative. Magnitude attenuation follows a log-distance law.
//! The curves are fitted loosely to the shapes of the `ak135` tables and the
//! Veith and Clawson (1972) P-wave attenuation curve; they are adequate for
//! exercising grid population and association but are not a physics engine.

use std::collections::BTreeMap;

use tessera_types::PhaseType;
use tracing::trace;

use crate::error::PredictionError;
use crate::geo;
use crate::service::{PredictionFeature, PredictionRequest, PredictionService};

/// Name of the built-in velocity model.
pub const AK135: &str = "ak135";

/// Name of the built-in attenuation model.
pub const VEITH_CLAWSON_72: &str = "VeithClawson72";

// ---------------------------------------------------------------------------
// Travel-time curves
// ---------------------------------------------------------------------------

/// Travel-time curve for one phase.
///
/// `t(d, h) = intercept + p0 * d - gradient * d^2 / 2 + delay * h`
/// for `d` in `[min_distance, max_distance]` degrees and depth `h` in km.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PhaseCurve {
    /// Travel time extrapolated to zero distance, seconds.
    pub intercept_seconds: f64,
    /// Slowness at zero distance, seconds per degree.
    pub initial_slowness: f64,
    /// Decrease of slowness per degree of distance.
    pub slowness_gradient: f64,
    /// Extra travel time per kilometre of source depth.
    pub depth_delay_per_km: f64,
    /// Nearest distance at which the phase is observed.
    pub min_distance_degrees: f64,
    /// Farthest distance at which the phase is observed.
    pub max_distance_degrees: f64,
}

impl PhaseCurve {
    /// Whether the phase exists at this distance.
    pub fn covers(&self, distance: f64) -> bool {
        (self.min_distance_degrees..=self.max_distance_degrees).contains(&distance)
    }

    /// Travel time at a distance and depth.
    pub fn travel_time(&self, distance: f64, depth_km: f64) -> f64 {
        self.intercept_seconds + self.initial_slowness * distance
            - 0.5 * self.slowness_gradient * distance * distance
            + self.depth_delay_per_km * depth_km
    }

    /// Horizontal slowness at a distance.
    pub fn slowness(&self, distance: f64) -> f64 {
        self.initial_slowness - self.slowness_gradient * distance
    }
}

/// A named set of phase curves.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TravelTimeModel {
    curves: BTreeMap<PhaseType, PhaseCurve>,
}

impl TravelTimeModel {
    /// Add or replace the curve for a phase.
    #[must_use]
    pub fn with_curve(mut self, phase: PhaseType, curve: PhaseCurve) -> Self {
        self.curves.insert(phase, curve);
        self
    }

    /// The curve for a phase, if the model has one.
    pub fn curve(&self, phase: PhaseType) -> Option<&PhaseCurve> {
        self.curves.get(&phase)
    }

    /// Curves shaped after the `ak135` reference model.
    pub fn ak135() -> Self {
        const fn curve(
            intercept_seconds: f64,
            initial_slowness: f64,
            slowness_gradient: f64,
            depth_delay_per_km: f64,
            min_distance_degrees: f64,
            max_distance_degrees: f64,
        ) -> PhaseCurve {
            PhaseCurve {
                intercept_seconds,
                initial_slowness,
                slowness_gradient,
                depth_delay_per_km,
                min_distance_degrees,
                max_distance_degrees,
            }
        }

        Self::default()
            .with_curve(PhaseType::P, curve(2.0, 13.7, 0.098, 0.12, 0.0, 98.0))
            .with_curve(PhaseType::Pn, curve(5.0, 13.8, 0.02, 0.13, 1.5, 18.0))
            .with_curve(PhaseType::Pg, curve(0.5, 17.8, 0.01, 0.16, 0.0, 10.0))
            .with_curve(PhaseType::Pkp, curve(1050.0, 2.2, 0.005, 0.12, 110.0, 180.0))
            .with_curve(PhaseType::S, curve(3.5, 24.0, 0.16, 0.22, 0.0, 98.0))
            .with_curve(PhaseType::Sn, curve(8.0, 24.5, 0.03, 0.23, 1.5, 18.0))
            .with_curve(PhaseType::Lg, curve(1.0, 28.5, 0.01, 0.28, 0.0, 25.0))
            .with_curve(PhaseType::Lr, curve(0.0, 36.0, 0.004, 0.01, 0.0, 180.0))
            .with_curve(PhaseType::I, curve(0.0, 370.0, 0.05, 0.003, 0.0, 180.0))
    }
}

// ---------------------------------------------------------------------------
// Attenuation
// ---------------------------------------------------------------------------

/// Log-distance magnitude attenuation law.
///
/// `q(d, h) = base + distance_coefficient * log10(d) + depth_coefficient * h`
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MagnitudeModel {
    /// Correction at one degree and zero depth.
    pub base: f64,
    /// Growth per decade of distance.
    pub distance_coefficient: f64,
    /// Change per kilometre of depth.
    pub depth_coefficient: f64,
}

impl MagnitudeModel {
    /// Closest distance the log law is evaluated at.
    const MIN_DISTANCE_DEGREES: f64 = 0.1;

    /// Curve shaped after Veith and Clawson (1972).
    pub const fn veith_clawson_72() -> Self {
        Self {
            base: 2.4,
            distance_coefficient: 1.2,
            depth_coefficient: -0.0012,
        }
    }

    /// Correction at a distance and depth.
    pub fn correction(&self, distance: f64, depth_km: f64) -> f64 {
        self.base
            + self.distance_coefficient * distance.max(Self::MIN_DISTANCE_DEGREES).log10()
            + self.depth_coefficient * depth_km
    }
}

// ---------------------------------------------------------------------------
// Service
// ---------------------------------------------------------------------------

/// Closed-form [`PredictionService`] over named models.
#[derive(Debug, Clone)]
pub struct AnalyticPredictor {
    travel_time_models: BTreeMap<String, TravelTimeModel>,
    magnitude_models: BTreeMap<String, MagnitudeModel>,
    evaluations: u64,
}

impl AnalyticPredictor {
    /// A predictor knowing `ak135` and `VeithClawson72`.
    pub fn new() -> Self {
        Self::empty()
            .with_travel_time_model(AK135, TravelTimeModel::ak135())
            .with_magnitude_model(VEITH_CLAWSON_72, MagnitudeModel::veith_clawson_72())
    }

    /// A predictor with no models registered.
    pub const fn empty() -> Self {
        Self {
            travel_time_models: BTreeMap::new(),
            magnitude_models: BTreeMap::new(),
            evaluations: 0,
        }
    }

    /// Register a travel-time model under a name.
    #[must_use]
    pub fn with_travel_time_model(mut self, name: &str, model: TravelTimeModel) -> Self {
        self.travel_time_models.insert(name.to_owned(), model);
        self
    }

    /// Register a magnitude model under a name.
    #[must_use]
    pub fn with_magnitude_model(mut self, name: &str, model: MagnitudeModel) -> Self {
        self.magnitude_models.insert(name.to_owned(), model);
        self
    }

    /// Number of successful evaluations served so far.
    pub const fn evaluations(&self) -> u64 {
        self.evaluations
    }

    fn unknown(request: &PredictionRequest<'_>) -> PredictionError {
        PredictionError::UnknownEarthModel {
            model: request.earth_model.to_owned(),
            feature: request.feature,
        }
    }
}

impl Default for AnalyticPredictor {
    fn default() -> Self {
        Self::new()
    }
}

impl PredictionService for AnalyticPredictor {
    fn predict(&mut self, request: &PredictionRequest<'_>) -> Result<Option<f64>, PredictionError> {
        let coords = [
            request.source.latitude_degrees,
            request.source.longitude_degrees,
            request.source.depth_km,
            request.receiver.latitude_degrees,
            request.receiver.longitude_degrees,
        ];
        if coords.iter().any(|c| !c.is_finite()) {
            return Err(PredictionError::InvalidGeometry {
                phase: request.phase,
                reason: String::from("non-finite coordinate"),
            });
        }

        let distance = geo::distance_degrees(
            request.source.latitude_degrees,
            request.source.longitude_degrees,
            request.receiver.latitude_degrees,
            request.receiver.longitude_degrees,
        );
        let depth = request.source.depth_km;

        let value = match request.feature {
            PredictionFeature::TravelTime | PredictionFeature::Slowness => {
                let model = self
                    .travel_time_models
                    .get(request.earth_model)
                    .ok_or_else(|| Self::unknown(request))?;
                model
                    .curve(request.phase)
                    .filter(|curve| curve.covers(distance))
                    .map(|curve| {
                        if request.feature == PredictionFeature::TravelTime {
                            curve.travel_time(distance, depth)
                        } else {
                            curve.slowness(distance)
                        }
                    })
            }
            PredictionFeature::MagnitudeCorrection => {
                let model = self
                    .magnitude_models
                    .get(request.earth_model)
                    .ok_or_else(|| Self::unknown(request))?;
                Some(model.correction(distance, depth))
            }
        };

        if value.is_some() {
            self.evaluations = self.evaluations.saturating_add(1);
        } else {
            trace!(
                phase = %request.phase,
                feature = %request.feature,
                distance,
                "No prediction at this distance"
            );
        }
        Ok(value)
    }
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used)]

    use super::*;
    use crate::service::{ReceiverGeometry, SourceGeometry};

    fn make_request(
        feature: PredictionFeature,
        phase: PhaseType,
        model: &str,
        distance: f64,
        depth: f64,
    ) -> PredictionRequest<'_> {
        PredictionRequest {
            feature,
            phase,
            earth_model: model,
            source: SourceGeometry {
                latitude_degrees: 0.0,
                longitude_degrees: 0.0,
                depth_km: depth,
            },
            receiver: ReceiverGeometry {
                latitude_degrees: 0.0,
                longitude_degrees: distance,
                elevation_km: 0.0,
            },
        }
    }

    #[test]
    fn travel_time_grows_with_distance_and_depth() {
        let mut p = AnalyticPredictor::new();
        let tt = |p: &mut AnalyticPredictor, d: f64, h: f64| {
            p.predict(&make_request(PredictionFeature::TravelTime, PhaseType::P, AK135, d, h))
                .unwrap()
                .unwrap()
        };
        let near = tt(&mut p, 30.0, 10.0);
        let far = tt(&mut p, 31.0, 10.0);
        let deep = tt(&mut p, 30.0, 60.0);
        assert!(far > near);
        assert!(deep > near);
        assert_eq!(p.evaluations(), 3);
    }

    #[test]
    fn slowness_is_positive_over_range() {
        let model = TravelTimeModel::ak135();
        for phase in [PhaseType::P, PhaseType::S, PhaseType::Pkp, PhaseType::Lg] {
            let curve = model.curve(phase).unwrap();
            assert!(curve.slowness(curve.max_distance_degrees) > 0.0, "{phase}");
        }
    }

    #[test]
    fn out_of_range_phase_is_a_gap() {
        let mut p = AnalyticPredictor::new();
        let result = p
            .predict(&make_request(PredictionFeature::TravelTime, PhaseType::Pn, AK135, 40.0, 0.0))
            .unwrap();
        assert!(result.is_none());
        let result = p
            .predict(&make_request(PredictionFeature::Slowness, PhaseType::ScS, AK135, 40.0, 0.0))
            .unwrap();
        assert!(result.is_none());
    }

    #[test]
    fn unknown_model_is_an_error() {
        let mut p = AnalyticPredictor::new();
        let err = p
            .predict(&make_request(PredictionFeature::TravelTime, PhaseType::P, "iasp2000", 10.0, 0.0))
            .unwrap_err();
        assert!(matches!(err, PredictionError::UnknownEarthModel { ref model, .. } if model == "iasp2000"));

        // Attenuation models live in their own namespace.
        let err = p
            .predict(&make_request(PredictionFeature::MagnitudeCorrection, PhaseType::P, AK135, 10.0, 0.0))
            .unwrap_err();
        assert!(matches!(err, PredictionError::UnknownEarthModel { .. }));
    }

    #[test]
    fn magnitude_correction_increases_with_distance() {
        let mut p = AnalyticPredictor::new();
        let q = |p: &mut AnalyticPredictor, d: f64| {
            p.predict(&make_request(
                PredictionFeature::MagnitudeCorrection,
                PhaseType::P,
                VEITH_CLAWSON_72,
                d,
                0.0,
            ))
            .unwrap()
            .unwrap()
        };
        assert!(q(&mut p, 60.0) > q(&mut p, 20.0));
    }

    #[test]
    fn non_finite_geometry_is_rejected() {
        let mut p = AnalyticPredictor::new();
        let mut request = make_request(PredictionFeature::TravelTime, PhaseType::P, AK135, 10.0, 0.0);
        request.source.depth_km = f64::NAN;
        assert!(matches!(
            p.predict(&request),
            Err(PredictionError::InvalidGeometry { .. })
        ));
    }
}
