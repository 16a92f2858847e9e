//! All requested stations for one grid point.

use std::collections::BTreeSet;

use tessera_types::{GridNode, GridNodeId, PhaseType, Station};

use super::{NodeStationGenerator, Settings, shared_setters};
use crate::error::GenerationError;

/// Builds one [`GridNode`] with a fresh identifier.
#[derive(Default)]
pub struct GridNodeGenerator<'a> {
    settings: Settings<'a>,
    stations: Option<&'a [Station]>,
    phases: Option<&'a [PhaseType]>,
}

impl<'a> GridNodeGenerator<'a> {
    /// Start an unconfigured generator.
    pub fn new() -> Self {
        Self::default()
    }

    shared_setters!('a);

    /// Candidate stations. Must be non-empty; repeated station ids are ignored.
    #[must_use]
    pub const fn stations(mut self, stations: &'a [Station]) -> Self {
        self.stations = Some(stations);
        self
    }

    /// Phases to predict for every station. Must be non-empty.
    #[must_use]
    pub const fn phases(mut self, phases: &'a [PhaseType]) -> Self {
        self.phases = Some(phases);
        self
    }

    /// Names of the fields still unset.
    pub fn missing_parameter_names(&self) -> Vec<&'static str> {
        let mut missing = self.settings.missing();
        if self.stations.is_none_or(<[Station]>::is_empty) {
            missing.push("stations");
        }
        if self.phases.is_none_or(<[PhaseType]>::is_empty) {
            missing.push("phases");
        }
        missing
    }

    /// Generate every station's predictions.
    ///
    /// Returns `Ok(None)` when no station produced a usable result.
    ///
    /// # Errors
    ///
    /// As [`NodeStationGenerator::generate`], checked at this level first.
    pub fn generate(&mut self) -> Result<Option<GridNode>, GenerationError> {
        const GENERATOR: &str = "GridNodeGenerator";
        let missing = self.missing_parameter_names();
        let (Some(stations), Some(phases), true) = (self.stations, self.phases, missing.is_empty()) else {
            return Err(GenerationError::NotConfigured {
                generator: GENERATOR,
                missing,
            });
        };
        let (service, cfg) = self.settings.resolve(GENERATOR)?;

        let mut node_stations = Vec::with_capacity(stations.len());
        let mut seen = BTreeSet::new();
        for station in stations.iter().filter(|s| seen.insert(s.id)) {
            let generated = NodeStationGenerator::new()
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
                .phases(phases)
                .generate()?;
            node_stations.extend(generated);
        }

        if node_stations.is_empty() {
            return Ok(None);
        }
        Ok(Some(GridNode::new(
            GridNodeId::new(),
            cfg.latitude_degrees,
            cfg.longitude_degrees,
            cfg.depth_km,
            cfg.height_km,
            node_stations,
        )?))
    }
}
