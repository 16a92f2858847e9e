//! Full association pass over one detection batch: index lookup, candidate
//! generation, corroboration, and conversion to event hypotheses.

use std::collections::BTreeSet;

use chrono::{DateTime, Utc};
use serde::Serialize;
use tessera_grid::PopulatedGridModel;
use tessera_types::{DetectionId, GridNodeId, SdhStationAssociation};
use tracing::{info, warn};
use uuid::Uuid;

use crate::candidate::{CandidateEvent, passes_slowness_constraint};
use crate::definition::AssociatorDefinition;
use crate::error::AssociationError;
use crate::generator::CandidateEventGenerator;

/// A located event hypothesis: one candidate's grid node, origin time and
/// every detection associated with it.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct EventHypothesis {
    /// Fresh hypothesis identifier.
    pub id: Uuid,
    /// The grid node the event is located at.
    pub grid_node_id: GridNodeId,
    /// Grid node latitude.
    pub latitude_degrees: f64,
    /// Grid node longitude.
    pub longitude_degrees: f64,
    /// Grid node depth.
    pub depth_km: f64,
    /// Implied origin time.
    pub origin_time: DateTime<Utc>,
    /// The driver detection.
    pub driver: DetectionId,
    /// Every associated detection, the driver included.
    pub detection_ids: BTreeSet<DetectionId>,
}

impl From<&CandidateEvent> for EventHypothesis {
    fn from(event: &CandidateEvent) -> Self {
        let node = event.grid_node();
        Self {
            id: Uuid::now_v7(),
            grid_node_id: node.id(),
            latitude_degrees: node.center_latitude_degrees(),
            longitude_degrees: node.center_longitude_degrees(),
            depth_km: node.center_depth_km(),
            origin_time: event.origin_time(),
            driver: event.driver().detection.id,
            detection_ids: event.detection_ids(),
        }
    }
}

/// Extend each candidate with every association in the batch that arrives
/// after the driver, carries one of the definition's phases, and passes both
/// the travel-time and slowness checks at the candidate's node.
///
/// An association that cannot be screened (no arrival time, no prediction
/// for its station) is logged and skipped.
pub fn associate_corroborators(
    candidates: Vec<CandidateEvent>,
    associations: &[SdhStationAssociation],
    definition: &AssociatorDefinition,
) -> Vec<CandidateEvent> {
    candidates
        .into_iter()
        .map(|mut candidate| {
            for association in associations {
                let later = association
                    .detection
                    .arrival_time
                    .is_some_and(|arrival| arrival.value > candidate.arrival_time());
                if !later || !definition.phases.contains(&association.detection.phase) {
                    continue;
                }
                let screened = candidate
                    .passes_travel_time_constraint(association)
                    .map(|fits| {
                        fits && passes_slowness_constraint(
                            association,
                            definition.sigma_slowness,
                            candidate.grid_node(),
                        )
                    });
                match screened {
                    Ok(true) => {
                        candidate.add_corroborating(association.clone());
                    }
                    Ok(false) => {}
                    Err(err) => warn!(
                        detection = %association.detection.id,
                        grid_node = %candidate.grid_node().id(),
                        error = %err,
                        "Skipping corroborator that cannot be screened"
                    ),
                }
            }
            candidate
        })
        .collect()
}

/// Associate one batch against a populated model.
///
/// Builds the first-arrival index with `numFirstSta` threads if it is not
/// built yet, generates candidates for the batch's stations, adds
/// corroborators, and returns one hypothesis per candidate. A batch whose
/// stations have no grid-node data yields no hypotheses.
///
/// # Errors
///
/// Index construction failures and the errors of
/// [`CandidateEventGenerator::generate`].
pub fn associate(
    model: &mut PopulatedGridModel,
    associations: &[SdhStationAssociation],
    definition: &AssociatorDefinition,
) -> Result<Vec<EventHypothesis>, AssociationError> {
    definition.validate()?;
    if model.first_arrival_map().is_none() {
        model.initialize_first_arrival_map(definition.num_first_sta)?;
    }
    let grid_node_map = model.first_arrival_map_for(associations.iter().map(|a| &a.station))?;

    let candidates = CandidateEventGenerator::new()
        .definition(definition)
        .sigma_time(definition.sigma_time)
        .grid_node_map(&grid_node_map)
        .sdh_station_associations(associations)
        .generate()?;
    let Some(candidates) = candidates else {
        info!(associations = associations.len(), "Batch has no grid node coverage");
        return Ok(Vec::new());
    };

    let events = associate_corroborators(candidates, associations, definition);
    info!(
        associations = associations.len(),
        hypotheses = events.len(),
        "Batch associated"
    );
    Ok(events.iter().map(EventHypothesis::from).collect())
}
