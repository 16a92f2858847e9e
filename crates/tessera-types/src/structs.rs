//! Core value structs: grid predictions, stations and detections.
//!
//! [`PhaseInfo`], [`NodeStation`] and [`GridNode`] form the precomputed
//! prediction tree stored at every mesh slot. [`Station`], [`Detection`] and
//! [`SdhStationAssociation`] are the inputs to candidate-event association.

use core::cmp::Ordering;
use std::collections::BTreeSet;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::enums::PhaseType;
use crate::error::TypeError;
use crate::ids::{DetectionId, GridNodeId, StationId};

// ---------------------------------------------------------------------------
// PhaseInfo
// ---------------------------------------------------------------------------

/// Prediction bundle for one phase between one grid point and one station.
///
/// Travel times are in seconds, derivatives are per degree (radial) and per
/// kilometre (vertical), slownesses are in seconds per degree.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PhaseInfo {
    /// The phase this bundle predicts.
    pub phase_type: PhaseType,
    /// Whether this is the earliest-arriving configured phase for the station.
    pub primary: bool,
    /// Travel time from the grid point center.
    pub travel_time_seconds: f64,
    /// Smallest travel time over the grid cell.
    pub travel_time_minimum: f64,
    /// Largest travel time over the grid cell.
    pub travel_time_maximum: f64,
    /// Propagation direction of the arrival at the station, clockwise from north.
    pub azimuth_degrees: f64,
    /// Direction from the station back toward the grid point.
    pub back_azimuth_degrees: f64,
    /// Change in travel time as the source moves toward the station.
    pub radial_travel_time_derivative: f64,
    /// Change in travel time as the source moves deeper.
    pub vertical_travel_time_derivative: f64,
    /// Half the spread of predicted slowness across the cell footprint.
    pub slowness_cell_width: f64,
    /// Predicted horizontal slowness at the grid point center.
    pub slowness: f64,
    /// Smallest magnitude the grid is configured to detect.
    pub minimum_magnitude: f64,
    /// Magnitude attenuation correction at the grid point center.
    pub magnitude_correction: f64,
    /// Radial derivative of the magnitude correction.
    pub radial_magnitude_correction_derivative: f64,
    /// Vertical derivative of the magnitude correction.
    pub vertical_magnitude_correction_derivative: f64,
}

impl PhaseInfo {
    /// Return a copy with the primary flag replaced.
    #[must_use]
    pub fn with_primary(mut self, primary: bool) -> Self {
        self.primary = primary;
        self
    }

    /// Ordering used inside a [`NodeStation`]: earliest arrival first,
    /// phase precedence on ties.
    pub fn arrival_order(&self, other: &Self) -> Ordering {
        self.travel_time_seconds
            .total_cmp(&other.travel_time_seconds)
            .then(self.phase_type.cmp(&other.phase_type))
    }

    /// Bitwise equality of every field, so `-0.0 != 0.0` and `NaN == NaN`.
    pub fn bitwise_eq(&self, other: &Self) -> bool {
        self.phase_type == other.phase_type
            && self.primary == other.primary
            && self
                .numeric_fields()
                .iter()
                .zip(other.numeric_fields().iter())
                .all(|(a, b)| a.to_bits() == b.to_bits())
    }

    /// The thirteen numeric fields in their serialized order.
    pub const fn numeric_fields(&self) -> [f64; 13] {
        [
            self.travel_time_seconds,
            self.azimuth_degrees,
            self.back_azimuth_degrees,
            self.travel_time_minimum,
            self.travel_time_maximum,
            self.radial_travel_time_derivative,
            self.vertical_travel_time_derivative,
            self.slowness_cell_width,
            self.slowness,
            self.minimum_magnitude,
            self.magnitude_correction,
            self.radial_magnitude_correction_derivative,
            self.vertical_magnitude_correction_derivative,
        ]
    }

    /// Rebuild a bundle from the thirteen numeric fields in serialized order.
    pub const fn from_numeric_fields(phase_type: PhaseType, primary: bool, v: [f64; 13]) -> Self {
        let [
            travel_time_seconds,
            azimuth_degrees,
            back_azimuth_degrees,
            travel_time_minimum,
            travel_time_maximum,
            radial_travel_time_derivative,
            vertical_travel_time_derivative,
            slowness_cell_width,
            slowness,
            minimum_magnitude,
            magnitude_correction,
            radial_magnitude_correction_derivative,
            vertical_magnitude_correction_derivative,
        ] = v;
        Self {
            phase_type,
            primary,
            travel_time_seconds,
            travel_time_minimum,
            travel_time_maximum,
            azimuth_degrees,
            back_azimuth_degrees,
            radial_travel_time_derivative,
            vertical_travel_time_derivative,
            slowness_cell_width,
            slowness,
            minimum_magnitude,
            magnitude_correction,
            radial_magnitude_correction_derivative,
            vertical_magnitude_correction_derivative,
        }
    }
}

// ---------------------------------------------------------------------------
// NodeStation
// ---------------------------------------------------------------------------

/// All configured phase predictions for one station at one grid node.
///
/// Phase infos are kept sorted by arrival so the first entry is the
/// earliest-arriving phase.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct NodeStation {
    station_id: StationId,
    distance_from_grid_point_degrees: f64,
    phase_infos: Vec<PhaseInfo>,
}

impl NodeStation {
    /// Build a node station, sorting `phase_infos` into arrival order.
    ///
    /// # Errors
    ///
    /// Returns [`TypeError::EmptyPhaseInfos`] when `phase_infos` is empty and
    /// [`TypeError::DuplicatePhase`] when a phase type appears twice.
    pub fn new(
        station_id: StationId,
        distance_from_grid_point_degrees: f64,
        mut phase_infos: Vec<PhaseInfo>,
    ) -> Result<Self, TypeError> {
        if phase_infos.is_empty() {
            return Err(TypeError::EmptyPhaseInfos(station_id));
        }
        let mut seen = BTreeSet::new();
        if let Some(info) = phase_infos.iter().find(|info| !seen.insert(info.phase_type)) {
            return Err(TypeError::DuplicatePhase {
                station: station_id,
                phase: info.phase_type,
            });
        }
        phase_infos.sort_by(PhaseInfo::arrival_order);
        Ok(Self {
            station_id,
            distance_from_grid_point_degrees,
            phase_infos,
        })
    }

    /// The station these predictions are for.
    pub const fn station_id(&self) -> StationId {
        self.station_id
    }

    /// Great-circle distance between the grid point and the station.
    pub const fn distance_from_grid_point_degrees(&self) -> f64 {
        self.distance_from_grid_point_degrees
    }

    /// Phase predictions, earliest arrival first.
    pub fn phase_infos(&self) -> &[PhaseInfo] {
        &self.phase_infos
    }

    /// The first phase info, if it is flagged primary.
    pub fn primary_phase_info(&self) -> Option<&PhaseInfo> {
        self.phase_infos.first().filter(|info| info.primary)
    }

    /// All phase infos of the given phase type.
    pub fn phase_infos_of(&self, phase: PhaseType) -> impl Iterator<Item = &PhaseInfo> {
        self.phase_infos.iter().filter(move |info| info.phase_type == phase)
    }

    /// Bitwise content equality.
    pub fn bitwise_eq(&self, other: &Self) -> bool {
        self.station_id == other.station_id
            && self.distance_from_grid_point_degrees.to_bits()
                == other.distance_from_grid_point_degrees.to_bits()
            && self.phase_infos.len() == other.phase_infos.len()
            && self
                .phase_infos
                .iter()
                .zip(&other.phase_infos)
                .all(|(a, b)| a.bitwise_eq(b))
    }
}

// ---------------------------------------------------------------------------
// GridNode
// ---------------------------------------------------------------------------

/// One candidate source location: a mesh vertex at one depth layer,
/// with predictions for every station in range.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct GridNode {
    id: GridNodeId,
    center_latitude_degrees: f64,
    center_longitude_degrees: f64,
    center_depth_km: f64,
    grid_cell_height_km: f64,
    node_stations: Vec<NodeStation>,
}

impl GridNode {
    /// Build a grid node, sorting `node_stations` by station id.
    ///
    /// # Errors
    ///
    /// Returns [`TypeError::EmptyNodeStations`] when `node_stations` is empty
    /// and [`TypeError::DuplicateStation`] when a station appears twice.
    pub fn new(
        id: GridNodeId,
        center_latitude_degrees: f64,
        center_longitude_degrees: f64,
        center_depth_km: f64,
        grid_cell_height_km: f64,
        mut node_stations: Vec<NodeStation>,
    ) -> Result<Self, TypeError> {
        if node_stations.is_empty() {
            return Err(TypeError::EmptyNodeStations(id));
        }
        node_stations.sort_by_key(NodeStation::station_id);
        if let Some(station) = node_stations
            .windows(2)
            .find_map(|pair| match pair {
                [a, b] if a.station_id == b.station_id => Some(a.station_id),
                _ => None,
            })
        {
            return Err(TypeError::DuplicateStation { node: id, station });
        }
        Ok(Self {
            id,
            center_latitude_degrees,
            center_longitude_degrees,
            center_depth_km,
            grid_cell_height_km,
            node_stations,
        })
    }

    /// Unique identifier of this node.
    pub const fn id(&self) -> GridNodeId {
        self.id
    }

    /// Geographic latitude of the cell center.
    pub const fn center_latitude_degrees(&self) -> f64 {
        self.center_latitude_degrees
    }

    /// Geographic longitude of the cell center.
    pub const fn center_longitude_degrees(&self) -> f64 {
        self.center_longitude_degrees
    }

    /// Depth of the cell center below the surface.
    pub const fn center_depth_km(&self) -> f64 {
        self.center_depth_km
    }

    /// Vertical extent of the cell.
    pub const fn grid_cell_height_km(&self) -> f64 {
        self.grid_cell_height_km
    }

    /// Stations with usable predictions, ordered by station id.
    pub fn node_stations(&self) -> &[NodeStation] {
        &self.node_stations
    }

    /// Predictions for one station, if it is in range of this node.
    pub fn node_station(&self, station_id: StationId) -> Option<&NodeStation> {
        self.node_stations
            .binary_search_by_key(&station_id, NodeStation::station_id)
            .ok()
            .and_then(|idx| self.node_stations.get(idx))
    }

    /// Value equality ignoring the node identifier.
    ///
    /// Floating-point fields compare bitwise, which is the guarantee the
    /// model codecs give.
    pub fn same_content(&self, other: &Self) -> bool {
        self.center_latitude_degrees.to_bits() == other.center_latitude_degrees.to_bits()
            && self.center_longitude_degrees.to_bits() == other.center_longitude_degrees.to_bits()
            && self.center_depth_km.to_bits() == other.center_depth_km.to_bits()
            && self.grid_cell_height_km.to_bits() == other.grid_cell_height_km.to_bits()
            && self.node_stations.len() == other.node_stations.len()
            && self
                .node_stations
                .iter()
                .zip(&other.node_stations)
                .all(|(a, b)| a.bitwise_eq(b))
    }
}

// ---------------------------------------------------------------------------
// Stations and detections
// ---------------------------------------------------------------------------

/// A recording station.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Station {
    /// Unique station identifier.
    pub id: StationId,
    /// Network code or site name, e.g. `ASAR`.
    pub name: String,
    /// Geographic latitude.
    pub latitude_degrees: f64,
    /// Geographic longitude.
    pub longitude_degrees: f64,
    /// Elevation above sea level.
    #[serde(default)]
    pub elevation_km: f64,
}

impl Station {
    /// Create a station with a fresh identifier.
    pub fn new(name: impl Into<String>, latitude_degrees: f64, longitude_degrees: f64) -> Self {
        Self {
            id: StationId::new(),
            name: name.into(),
            latitude_degrees,
            longitude_degrees,
            elevation_km: 0.0,
        }
    }
}

/// A time-valued feature measurement with its uncertainty.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct InstantMeasurement {
    /// Measured instant.
    pub value: DateTime<Utc>,
    /// One standard deviation, in seconds.
    pub standard_deviation_seconds: f64,
}

/// A scalar feature measurement with its uncertainty.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct NumericMeasurement {
    /// Measured value.
    pub value: f64,
    /// One standard deviation, in the units of `value`.
    pub standard_deviation: f64,
}

/// A signal detection hypothesis with the feature measurements the
/// associator reads.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Detection {
    /// Unique detection identifier.
    pub id: DetectionId,
    /// The station that produced the detection.
    pub station_id: StationId,
    /// Phase label assigned by the detector.
    pub phase: PhaseType,
    /// `ARRIVAL_TIME` feature measurement.
    pub arrival_time: Option<InstantMeasurement>,
    /// `SLOWNESS` feature measurement, seconds per degree.
    pub slowness: Option<NumericMeasurement>,
    /// `RECEIVER_TO_SOURCE_AZIMUTH` feature measurement, degrees.
    pub azimuth: Option<NumericMeasurement>,
}

/// A detection paired with the station that observed it.
///
/// Identity is the pair of ids; measurement values do not take part in
/// equality or ordering.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SdhStationAssociation {
    /// The detection.
    pub detection: Detection,
    /// The station that recorded it.
    pub station: Station,
}

impl SdhStationAssociation {
    /// Pair a detection with its station.
    pub const fn new(detection: Detection, station: Station) -> Self {
        Self { detection, station }
    }

    fn key(&self) -> (DetectionId, StationId) {
        (self.detection.id, self.station.id)
    }
}

impl PartialEq for SdhStationAssociation {
    fn eq(&self, other: &Self) -> bool {
        self.key() == other.key()
    }
}

impl Eq for SdhStationAssociation {}

impl PartialOrd for SdhStationAssociation {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for SdhStationAssociation {
    fn cmp(&self, other: &Self) -> Ordering {
        self.key().cmp(&other.key())
    }
}
