//! All requested phases for one (grid point, station) pair.

use std::collections::BTreeSet;

use tessera_predict::geo;
use tessera_types::{NodeStation, PhaseInfo, PhaseType, Station};

use super::{PhaseInfoGenerator, Settings, shared_setters};
use crate::error::GenerationError;

/// Builds one [`NodeStation`].
#[derive(Default)]
pub struct NodeStationGenerator<'a> {
    settings: Settings<'a>,
    station: Option<&'a Station>,
    phases: Option<&'a [PhaseType]>,
}

impl<'a> NodeStationGenerator<'a> {
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

    /// Phases to predict. Must be non-empty; duplicates are ignored.
    #[must_use]
    pub const fn phases(mut self, phases: &'a [PhaseType]) -> Self {
        self.phases = Some(phases);
        self
    }

    /// Names of the fields still unset.
    pub fn missing_parameter_names(&self) -> Vec<&'static str> {
        let mut missing = self.settings.missing();
        if self.station.is_none() {
            missing.push("station");
        }
        if self.phases.is_none_or(<[PhaseType]>::is_empty) {
            missing.push("phases");
        }
        missing
    }

    /// Generate every phase and flag the earliest arrival as primary.
    ///
    /// Returns `Ok(None)` when no phase produced a prediction.
    ///
    /// # Errors
    ///
    /// As [`PhaseInfoGenerator::generate`], checked at this level first.
    pub fn generate(&mut self) -> Result<Option<NodeStation>, GenerationError> {
        const GENERATOR: &str = "NodeStationGenerator";
        let missing = self.missing_parameter_names();
        let (Some(station), Some(phases), true) = (self.station, self.phases, missing.is_empty()) else {
            return Err(GenerationError::NotConfigured {
                generator: GENERATOR,
                missing,
            });
        };
        let (service, cfg) = self.settings.resolve(GENERATOR)?;

        let mut infos: Vec<PhaseInfo> = Vec::with_capacity(phases.len());
        for phase in phases.iter().copied().collect::<BTreeSet<_>>() {
            let generated = PhaseInfoGenerator::new()
                .prediction_service(&mut *service)
                .travel_time_model(cfg.travel_time_model)
                .magnitude_model(cfg.magnitude_model)
                .radius_degrees(cfg.radius_degrees)
                .height_km(cfg.height_km)
                .latitude_degrees(cfg.latitude_degrees)
                .longitude_degrees(cfg.longitude_degrees)
                .depth_km(cfg.depth_km)
                .minimum_magnitude(cfg.minimum_magnitude)
                .station(station)
                .phase(phase)
                .generate()?;
            if let Some(info) = generated {
                infos.push(info);
            }
        }

        let Some(first) = infos
            .iter()
            .enumerate()
            .min_by(|(_, a), (_, b)| a.arrival_order(b))
            .map(|(idx, _)| idx)
        else {
            return Ok(None);
        };
        if let Some(info) = infos.get_mut(first) {
            info.primary = true;
        }

        let distance = geo::distance_degrees(
            cfg.latitude_degrees,
            cfg.longitude_degrees,
            station.latitude_degrees,
            station.longitude_degrees,
        );
        Ok(Some(NodeStation::new(station.id, distance, infos)?))
    }
}
