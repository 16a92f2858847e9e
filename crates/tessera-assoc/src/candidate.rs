//! [`CandidateEvent`] and the screening checks that decide whether a
//! detection fits a grid node.

use std::collections::BTreeSet;
use std::sync::Arc;

use chrono::{DateTime, TimeDelta, Utc};
use tessera_types::{DetectionId, GridNode, PhaseInfo, PhaseType, SdhStationAssociation, StationId};
use tracing::debug;

use crate::definition::non_negative;
use crate::error::AssociationError;

/// Feature name reported when an arrival time is missing.
const ARRIVAL_TIME: &str = "ARRIVAL_TIME";

/// A driver detection hypothesized to originate at one grid node, with the
/// detections that corroborate it.
///
/// Candidates have no identity beyond their contents: the same detections at
/// the same node, driven from different detections, are separate candidates.
#[derive(Debug, Clone)]
pub struct CandidateEvent {
    driver: SdhStationAssociation,
    corroborating: BTreeSet<SdhStationAssociation>,
    grid_node: Arc<GridNode>,
    sigma_time: f64,
    arrival_time: DateTime<Utc>,
    origin_time: DateTime<Utc>,
}

impl CandidateEvent {
    /// Hypothesize that `driver` originated at `grid_node`.
    ///
    /// The origin time is the driver's arrival time minus the node's P travel
    /// time to the driver's station.
    ///
    /// # Errors
    ///
    /// - [`AssociationError::InvalidParameter`] for a negative `sigma_time`.
    /// - [`AssociationError::MissingFeatureMeasurement`] when the driver has
    ///   no arrival time.
    /// - [`AssociationError::MissingNodeStation`] or
    ///   [`AssociationError::UnexpectedPhases`] when the node has no single P
    ///   prediction for the driver's station.
    pub fn new(
        driver: SdhStationAssociation,
        grid_node: Arc<GridNode>,
        sigma_time: f64,
    ) -> Result<Self, AssociationError> {
        non_negative("sigma_time", sigma_time)?;
        let arrival_time = driver
            .detection
            .arrival_time
            .ok_or(AssociationError::MissingFeatureMeasurement {
                detection: driver.detection.id,
                feature: ARRIVAL_TIME,
            })?
            .value;
        let p = required_p_phase(&grid_node, driver.station.id)?;
        let origin_time = shift(arrival_time, -p.travel_time_seconds)?;
        Ok(Self {
            driver,
            corroborating: BTreeSet::new(),
            grid_node,
            sigma_time,
            arrival_time,
            origin_time,
        })
    }

    /// The detection this candidate was built around.
    pub const fn driver(&self) -> &SdhStationAssociation {
        &self.driver
    }

    /// Station of the driver detection.
    pub const fn station_id(&self) -> StationId {
        self.driver.station.id
    }

    /// Detections that agree with the driver at this node.
    pub const fn corroborating(&self) -> &BTreeSet<SdhStationAssociation> {
        &self.corroborating
    }

    /// Driver followed by every corroborating association.
    pub fn associations(&self) -> impl Iterator<Item = &SdhStationAssociation> {
        core::iter::once(&self.driver).chain(&self.corroborating)
    }

    /// Ids of every contributing detection, ascending.
    pub fn detection_ids(&self) -> BTreeSet<DetectionId> {
        self.associations().map(|a| a.detection.id).collect()
    }

    /// The hypothesized source location.
    pub const fn grid_node(&self) -> &Arc<GridNode> {
        &self.grid_node
    }

    /// Multiplier on arrival-time uncertainty used by
    /// [`passes_travel_time_constraint`](Self::passes_travel_time_constraint).
    pub const fn sigma_time(&self) -> f64 {
        self.sigma_time
    }

    /// Arrival time of the driver detection.
    pub const fn arrival_time(&self) -> DateTime<Utc> {
        self.arrival_time
    }

    /// Implied event origin time.
    pub const fn origin_time(&self) -> DateTime<Utc> {
        self.origin_time
    }

    /// Add a corroborating association. Returns `false` if it was already
    /// present or is the driver.
    pub fn add_corroborating(&mut self, association: SdhStationAssociation) -> bool {
        if association == self.driver {
            return false;
        }
        self.corroborating.insert(association)
    }

    /// Whether `association`'s arrival fits this candidate's origin time.
    ///
    /// An arrival earlier than the driver's never fits. Otherwise the residual is the predicted arrival at the association's station
    /// (origin + P travel time) minus the observed arrival. It must satisfy
    /// `residual² < (ttMax − ttMin + sigma_time·δt)²`, `δt` being the
    /// observed arrival's standard deviation.
    ///
    /// # Errors
    ///
    /// [`AssociationError::MissingFeatureMeasurement`] without an arrival time;
    /// [`AssociationError::MissingNodeStation`] or
    /// [`AssociationError::UnexpectedPhases`] when the node lacks a single P
    /// prediction for the association's station.
    pub fn passes_travel_time_constraint(
        &self,
        association: &SdhStationAssociation,
    ) -> Result<bool, AssociationError> {
        let observed = association
            .detection
            .arrival_time
            .ok_or(AssociationError::MissingFeatureMeasurement {
                detection: association.detection.id,
                feature: ARRIVAL_TIME,
            })?;
        if observed.value < self.arrival_time {
            return Ok(false);
        }
        let p = required_p_phase(&self.grid_node, association.station.id)?;

        let residual = p.travel_time_seconds - seconds_between(observed.value, self.origin_time);
        let cross_cell = p.travel_time_maximum - p.travel_time_minimum;
        let upper = cross_cell + self.sigma_time * observed.standard_deviation_seconds;
        Ok(residual * residual < upper * upper)
    }

}

/// Whether `association`'s slowness vector fits `grid_node`.
///
/// Compares the predicted P slowness `sT`, pointing along the station-to-node
/// azimuth, with the observed slowness `sO` along the observed azimuth. The
/// squared length of their difference must not exceed
/// `(slownessCellWidth + sigma_slowness·δs)²`, `δs` being the observed
/// slowness' standard deviation. Without an observed azimuth the scalar
/// difference `sT − sO` is used instead.
///
/// Returns `false` when the node has no predictions for the station, when
/// those predictions do not hold exactly one P phase, or when the detection
/// has no slowness measurement.
pub fn passes_slowness_constraint(
    association: &SdhStationAssociation,
    sigma_slowness: f64,
    grid_node: &GridNode,
) -> bool {
    let Some(node_station) = grid_node.node_station(association.station.id) else {
        return false;
    };
    let p = match single_p_phase(grid_node, node_station.station_id(), node_station.phase_infos_of(PhaseType::P)) {
        Ok(p) => p,
        Err(err) => {
            debug!(
                detection = %association.detection.id,
                error = %err,
                "No single P prediction at node; not a slowness match"
            );
            return false;
        }
    };
    let Some(observed) = association.detection.slowness else {
        return false;
    };

    let predicted = p.slowness;
    let difference_squared = association.detection.azimuth.map_or_else(
        || (predicted - observed.value).powi(2),
        |azimuth| {
            let angle = (p.back_azimuth_degrees - azimuth.value).to_radians();
            (2.0 * predicted * observed.value).mul_add(
                -angle.cos(),
                predicted.mul_add(predicted, observed.value * observed.value),
            )
        },
    );
    let upper = sigma_slowness.mul_add(observed.standard_deviation, p.slowness_cell_width);
    difference_squared <= upper * upper
}

fn required_p_phase(grid_node: &GridNode, station: StationId) -> Result<&PhaseInfo, AssociationError> {
    let node_station = grid_node
        .node_station(station)
        .ok_or(AssociationError::MissingNodeStation {
            node: grid_node.id(),
            station,
        })?;
    single_p_phase(grid_node, station, node_station.phase_infos_of(PhaseType::P))
}

fn single_p_phase<'n>(
    grid_node: &GridNode,
    station: StationId,
    mut p_phases: impl Iterator<Item = &'n PhaseInfo>,
) -> Result<&'n PhaseInfo, AssociationError> {
    match (p_phases.next(), p_phases.count()) {
        (Some(p), 0) => Ok(p),
        (first, rest) => Err(AssociationError::UnexpectedPhases {
            node: grid_node.id(),
            station,
            count: usize::from(first.is_some()).saturating_add(rest),
        }),
    }
}

/// `instant + seconds`, to the nanosecond.
fn shift(instant: DateTime<Utc>, seconds: f64) -> Result<DateTime<Utc>, AssociationError> {
    let out_of_range = || AssociationError::InvalidParameter {
        name: "travel_time_seconds",
        reason: format!("{seconds} s cannot be applied to {instant}"),
    };
    let magnitude = std::time::Duration::try_from_secs_f64(seconds.abs()).map_err(|err| {
        AssociationError::InvalidParameter {
            name: "travel_time_seconds",
            reason: err.to_string(),
        }
    })?;
    let delta = TimeDelta::from_std(magnitude).map_err(|err| AssociationError::InvalidParameter {
        name: "travel_time_seconds",
        reason: err.to_string(),
    })?;
    let shifted = if seconds < 0.0 {
        instant.checked_sub_signed(delta)
    } else {
        instant.checked_add_signed(delta)
    };
    shifted.ok_or_else(out_of_range)
}

/// `later − earlier` in fractional seconds.
#[allow(clippy::cast_precision_loss)]
fn seconds_between(later: DateTime<Utc>, earlier: DateTime<Utc>) -> f64 {
    let delta = later.signed_duration_since(earlier);
    delta.num_seconds() as f64 + f64::from(delta.subsec_nanos()) * 1e-9
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used)]

    use super::*;
    use chrono::TimeZone;
    use tessera_types::{Detection, GridNodeId, InstantMeasurement, NodeStation, NumericMeasurement, Station};

    fn make_p(travel_time: f64, slowness: f64, back_azimuth: f64) -> PhaseInfo {
        PhaseInfo {
            phase_type: PhaseType::P,
            primary: true,
            travel_time_seconds: travel_time,
            travel_time_minimum: travel_time - 2.0,
            travel_time_maximum: travel_time + 2.0,
            azimuth_degrees: (back_azimuth + 180.0) % 360.0,
            back_azimuth_degrees: back_azimuth,
            radial_travel_time_derivative: -slowness,
            vertical_travel_time_derivative: 0.12,
            slowness_cell_width: 0.5,
            slowness,
            minimum_magnitude: 3.5,
            magnitude_correction: 4.0,
            radial_magnitude_correction_derivative: 0.01,
            vertical_magnitude_correction_derivative: -0.001,
        }
    }

    fn make_node(entries: Vec<(StationId, Vec<PhaseInfo>)>) -> Arc<GridNode> {
        let stations = entries
            .into_iter()
            .map(|(id, infos)| NodeStation::new(id, 20.0, infos).unwrap())
            .collect();
        Arc::new(GridNode::new(GridNodeId::new(), 0.0, 0.0, 50.0, 100.0, stations).unwrap())
    }

    fn t0() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 3, 1, 12, 0, 0).unwrap()
    }

    fn make_association(
        station: &Station,
        arrival_offset: Option<f64>,
        slowness: Option<f64>,
        azimuth: Option<f64>,
    ) -> SdhStationAssociation {
        let detection = Detection {
            id: DetectionId::new(),
            station_id: station.id,
            phase: PhaseType::P,
            arrival_time: arrival_offset.map(|s| InstantMeasurement {
                value: shift(t0(), s).unwrap(),
                standard_deviation_seconds: 1.0,
            }),
            slowness: slowness.map(|value| NumericMeasurement {
                value,
                standard_deviation: 0.2,
            }),
            azimuth: azimuth.map(|value| NumericMeasurement {
                value,
                standard_deviation: 5.0,
            }),
        };
        SdhStationAssociation::new(detection, station.clone())
    }

    // -----------------------------------------------------------------------
    // Construction
    // -----------------------------------------------------------------------

    #[test]
    fn origin_time_is_arrival_minus_travel_time() {
        let asar = Station::new("ASAR", -23.67, 133.90);
        let node = make_node(vec![(asar.id, vec![make_p(300.25, 8.0, 45.0)])]);
        let event = CandidateEvent::new(make_association(&asar, Some(310.0), None, None), node, 1.0).unwrap();
        assert_eq!(event.origin_time(), shift(t0(), 9.75).unwrap());
        assert_eq!(event.arrival_time(), shift(t0(), 310.0).unwrap());
        assert_eq!(event.station_id(), asar.id);
    }

    #[test]
    fn driver_without_arrival_is_an_error() {
        let asar = Station::new("ASAR", -23.67, 133.90);
        let node = make_node(vec![(asar.id, vec![make_p(300.0, 8.0, 45.0)])]);
        let result = CandidateEvent::new(make_association(&asar, None, None, None), node, 1.0);
        assert!(matches!(
            result,
            Err(AssociationError::MissingFeatureMeasurement { feature: "ARRIVAL_TIME", .. })
        ));
    }

    #[test]
    fn driver_station_absent_from_node_is_an_error() {
        let asar = Station::new("ASAR", -23.67, 133.90);
        let node = make_node(vec![(StationId::new(), vec![make_p(300.0, 8.0, 45.0)])]);
        let result = CandidateEvent::new(make_association(&asar, Some(300.0), None, None), node, 1.0);
        assert!(matches!(result, Err(AssociationError::MissingNodeStation { .. })));
    }

    #[test]
    fn node_station_without_p_is_an_error() {
        let asar = Station::new("ASAR", -23.67, 133.90);
        let mut s = make_p(500.0, 14.0, 45.0);
        s.phase_type = PhaseType::S;
        let node = make_node(vec![(asar.id, vec![s])]);
        let result = CandidateEvent::new(make_association(&asar, Some(300.0), None, None), node, 1.0);
        assert!(matches!(result, Err(AssociationError::UnexpectedPhases { count: 0, .. })));
    }

    #[test]
    fn negative_sigma_time_is_rejected() {
        let asar = Station::new("ASAR", -23.67, 133.90);
        let node = make_node(vec![(asar.id, vec![make_p(300.0, 8.0, 45.0)])]);
        let result = CandidateEvent::new(make_association(&asar, Some(300.0), None, None), node, -1.0);
        assert!(matches!(result, Err(AssociationError::InvalidParameter { .. })));
    }

    // -----------------------------------------------------------------------
    // Travel-time check
    // -----------------------------------------------------------------------

    #[test]
    fn travel_time_check_uses_cell_spread_and_uncertainty() {
        let asar = Station::new("ASAR", -23.67, 133.90);
        let wra = Station::new("WRA", -19.94, 134.34);
        let node = make_node(vec![
            (asar.id, vec![make_p(300.0, 8.0, 45.0)]),
            (wra.id, vec![make_p(400.0, 7.0, 90.0)]),
        ]);
        let event = CandidateEvent::new(make_association(&asar, Some(300.0), None, None), node, 1.0).unwrap();

        // Cell spread 4 s plus 1.0 * 1 s: anything under 5 s passes.
        assert!(event.passes_travel_time_constraint(&make_association(&wra, Some(404.9), None, None)).unwrap());
        assert!(event.passes_travel_time_constraint(&make_association(&wra, Some(395.1), None, None)).unwrap());
        assert!(!event.passes_travel_time_constraint(&make_association(&wra, Some(405.0), None, None)).unwrap());
        assert!(!event.passes_travel_time_constraint(&make_association(&wra, Some(460.0), None, None)).unwrap());
    }

    #[test]
    fn arrivals_before_the_driver_never_fit() {
        let asar = Station::new("ASAR", -23.67, 133.90);
        let wra = Station::new("WRA", -19.94, 134.34);
        let node = make_node(vec![
            (asar.id, vec![make_p(400.0, 8.0, 45.0)]),
            (wra.id, vec![make_p(300.0, 7.0, 90.0)]),
        ]);
        let event = CandidateEvent::new(make_association(&asar, Some(400.0), None, None), node, 1.0).unwrap();
        // Residual is only 1 s, but WRA arrives 99 s before the driver.
        assert!(!event.passes_travel_time_constraint(&make_association(&wra, Some(301.0), None, None)).unwrap());
    }

    #[test]
    fn simultaneous_arrival_is_evaluated() {
        let asar = Station::new("ASAR", -23.67, 133.90);
        let wra = Station::new("WRA", -19.94, 134.34);
        let node = make_node(vec![
            (asar.id, vec![make_p(300.0, 8.0, 45.0)]),
            (wra.id, vec![make_p(300.0, 7.0, 90.0)]),
        ]);
        let event = CandidateEvent::new(make_association(&asar, Some(300.0), None, None), node, 1.0).unwrap();
        assert!(event.passes_travel_time_constraint(&make_association(&wra, Some(300.0), None, None)).unwrap());
    }

    #[test]
    fn corroborator_without_arrival_is_an_error() {
        let asar = Station::new("ASAR", -23.67, 133.90);
        let wra = Station::new("WRA", -19.94, 134.34);
        let node = make_node(vec![
            (asar.id, vec![make_p(300.0, 8.0, 45.0)]),
            (wra.id, vec![make_p(400.0, 7.0, 90.0)]),
        ]);
        let event = CandidateEvent::new(make_association(&asar, Some(300.0), None, None), node, 1.0).unwrap();
        assert!(event.passes_travel_time_constraint(&make_association(&wra, None, None, None)).is_err());
    }

    // -----------------------------------------------------------------------
    // Slowness check
    // -----------------------------------------------------------------------

    #[test]
    fn slowness_vector_within_tolerance_passes() {
        let asar = Station::new("ASAR", -23.67, 133.90);
        let node = make_node(vec![(asar.id, vec![make_p(300.0, 8.0, 45.0)])]);
        // Tolerance 0.5 + 1.0 * 0.2 = 0.7 s/deg.
        let close = make_association(&asar, Some(300.0), Some(8.1), Some(46.0));
        let rotated = make_association(&asar, Some(300.0), Some(8.0), Some(60.0));
        assert!(passes_slowness_constraint(&close, 1.0, &node));
        assert!(!passes_slowness_constraint(&rotated, 1.0, &node));
    }

    #[test]
    fn slowness_without_azimuth_compares_magnitudes() {
        let asar = Station::new("ASAR", -23.67, 133.90);
        let node = make_node(vec![(asar.id, vec![make_p(300.0, 8.0, 45.0)])]);
        assert!(passes_slowness_constraint(&make_association(&asar, None, Some(8.6), None), 1.0, &node));
        assert!(!passes_slowness_constraint(&make_association(&asar, None, Some(8.8), None), 1.0, &node));
    }

    #[test]
    fn slowness_check_is_false_without_data() {
        let asar = Station::new("ASAR", -23.67, 133.90);
        let node = make_node(vec![(asar.id, vec![make_p(300.0, 8.0, 45.0)])]);
        let other = Station::new("WRA", -19.94, 134.34);
        assert!(!passes_slowness_constraint(&make_association(&asar, None, None, None), 1.0, &node));
        assert!(!passes_slowness_constraint(&make_association(&other, None, Some(8.0), None), 1.0, &node));
    }

    #[test]
    fn node_station_without_single_p_is_not_a_slowness_match() {
        let asar = Station::new("ASAR", -23.67, 133.90);
        let mut pkp = make_p(1150.0, 1.9, 45.0);
        pkp.phase_type = PhaseType::Pkp;
        let node = make_node(vec![(asar.id, vec![pkp])]);
        let association = make_association(&asar, Some(1150.0), Some(1.9), Some(45.0));
        assert!(!passes_slowness_constraint(&association, 1.0, &node));
    }

    // -----------------------------------------------------------------------
    // Corroborators
    // -----------------------------------------------------------------------

    #[test]
    fn driver_and_repeats_are_not_added_twice() {
        let asar = Station::new("ASAR", -23.67, 133.90);
        let wra = Station::new("WRA", -19.94, 134.34);
        let node = make_node(vec![
            (asar.id, vec![make_p(300.0, 8.0, 45.0)]),
            (wra.id, vec![make_p(400.0, 7.0, 90.0)]),
        ]);
        let a = make_association(&asar, Some(300.0), None, None);
        let b = make_association(&wra, Some(400.0), None, None);

        let mut event = CandidateEvent::new(a.clone(), node, 1.0).unwrap();
        assert!(event.add_corroborating(b.clone()));
        assert!(!event.add_corroborating(b.clone()));
        assert!(!event.add_corroborating(a.clone()));

        assert_eq!(event.detection_ids(), [a.detection.id, b.detection.id].into_iter().collect());
        assert_eq!(event.associations().count(), 2);
    }
}
