//! [`CandidateEventGenerator`]: pairs up detections from different stations
//! at the grid nodes both stations' first arrivals point to.

use std::sync::Arc;

use tessera_grid::FirstArrivalMap;
use tessera_types::SdhStationAssociation;
use tracing::{debug, info, warn};

use crate::candidate::{CandidateEvent, passes_slowness_constraint};
use crate::definition::{AssociatorDefinition, non_negative};
use crate::error::AssociationError;

/// Builds the candidate events for one batch of detections.
#[derive(Debug, Default, Clone, Copy)]
pub struct CandidateEventGenerator<'a> {
    definition: Option<&'a AssociatorDefinition>,
    sigma_time: Option<f64>,
    grid_node_map: Option<&'a FirstArrivalMap>,
    associations: Option<&'a [SdhStationAssociation]>,
}

impl<'a> CandidateEventGenerator<'a> {
    /// Start an unconfigured generator.
    pub fn new() -> Self {
        Self::default()
    }

    /// Association parameters; supplies `sigmaSlowness`.
    #[must_use]
    pub const fn definition(mut self, definition: &'a AssociatorDefinition) -> Self {
        self.definition = Some(definition);
        self
    }

    /// Multiplier on arrival-time uncertainty.
    #[must_use]
    pub const fn sigma_time(mut self, sigma_time: f64) -> Self {
        self.sigma_time = Some(sigma_time);
        self
    }

    /// Station to candidate grid nodes, usually restricted to the batch's
    /// stations with
    /// [`PopulatedGridModel::first_arrival_map_for`](tessera_grid::PopulatedGridModel::first_arrival_map_for).
    #[must_use]
    pub const fn grid_node_map(mut self, map: &'a FirstArrivalMap) -> Self {
        self.grid_node_map = Some(map);
        self
    }

    /// The batch to fuse.
    #[must_use]
    pub const fn sdh_station_associations(mut self, associations: &'a [SdhStationAssociation]) -> Self {
        self.associations = Some(associations);
        self
    }

    /// Names of the fields still unset.
    pub fn missing_parameter_names(&self) -> Vec<&'static str> {
        [
            ("definition", self.definition.is_none()),
            ("sigma_time", self.sigma_time.is_none()),
            ("grid_node_map", self.grid_node_map.is_none()),
            ("sdh_station_associations", self.associations.is_none()),
        ]
        .into_iter()
        .filter_map(|(name, unset)| unset.then_some(name))
        .collect()
    }

    /// Search the batch for mutually consistent detection pairs.
    ///
    /// For every ordered pair of associations from different stations, every
    /// grid node present in both stations' sets is screened: both detections
    /// must pass the slowness check, then the second must arrive no earlier
    /// than the first and fit the origin time it implies. Each surviving
    /// (driver, other, node) becomes its own [`CandidateEvent`]; nothing is
    /// merged or selected across nodes or directions.
    ///
    /// A pair that cannot be screened, such as a driver without an arrival
    /// time, is logged and skipped.
    ///
    /// Returns `Ok(None)` when no station in the batch has grid-node data.
    ///
    /// # Errors
    ///
    /// [`AssociationError::NotConfigured`] or
    /// [`AssociationError::InvalidParameter`] before any work is done.
    pub fn generate(&self) -> Result<Option<Vec<CandidateEvent>>, AssociationError> {
        let missing = self.missing_parameter_names();
        let (Some(definition), Some(sigma_time), Some(map), Some(associations), true) = (
            self.definition,
            self.sigma_time,
            self.grid_node_map,
            self.associations,
            missing.is_empty(),
        ) else {
            return Err(AssociationError::NotConfigured { missing });
        };
        definition.validate()?;
        non_negative("sigma_time", sigma_time)?;

        let has_data = associations
            .iter()
            .any(|a| map.get(&a.station.id).is_some_and(|nodes| !nodes.is_empty()));
        if !has_data {
            debug!(associations = associations.len(), "No grid node data for any station in the batch");
            return Ok(None);
        }

        let mut events = Vec::new();
        let mut screened = 0usize;
        for driver in associations {
            let Some(driver_nodes) = map.get(&driver.station.id) else {
                continue;
            };
            for other in associations {
                if other.station.id == driver.station.id {
                    continue;
                }
                let Some(other_nodes) = map.get(&other.station.id) else {
                    continue;
                };
                for (node_id, node) in driver_nodes {
                    if !other_nodes.contains_key(node_id) {
                        continue;
                    }
                    screened = screened.saturating_add(1);
                    if !passes_slowness_constraint(driver, definition.sigma_slowness, node)
                        || !passes_slowness_constraint(other, definition.sigma_slowness, node)
                    {
                        continue;
                    }
                    let screened = CandidateEvent::new(driver.clone(), Arc::clone(node), sigma_time)
                        .and_then(|event| Ok((event.passes_travel_time_constraint(other)?, event)));
                    match screened {
                        Ok((true, mut event)) => {
                            event.add_corroborating(other.clone());
                            events.push(event);
                        }
                        Ok((false, _)) => {}
                        Err(err) => warn!(
                            driver = %driver.detection.id,
                            detection = %other.detection.id,
                            grid_node = %node_id,
                            error = %err,
                            "Skipping pair that cannot be screened"
                        ),
                    }
                }
            }
        }

        info!(
            associations = associations.len(),
            shared_nodes_screened = screened,
            candidates = events.len(),
            "Candidate events generated"
        );
        Ok(Some(events))
    }
}
