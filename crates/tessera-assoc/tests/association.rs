//! Association against a freshly populated grid: detections synthesized
//! from one grid node's own predictions must be recovered at that node.

#![allow(clippy::unwrap_used)]

use std::collections::BTreeSet;
use std::sync::Arc;

use chrono::{TimeDelta, TimeZone, Utc};
use tessera_assoc::{AssociatorDefinition, CandidateEventGenerator, associate};
use tessera_grid::{MeshSource, ModelPopulatorBuilder, PopulatedGridModel};
use tessera_mesh::TessellatedGrid;
use tessera_predict::{AnalyticPredictor, PredictionService};
use tessera_types::{
    Detection, DetectionId, GridNode, InstantMeasurement, NumericMeasurement, PhaseType,
    SdhStationAssociation, Station,
};

fn make_model(stations: &[Station]) -> PopulatedGridModel {
    ModelPopulatorBuilder::new()
        .mesh(MeshSource::InMemory(Arc::new(TessellatedGrid::icosahedral(3).unwrap())))
        .height_km(100.0)
        .radius_degrees(2.0)
        .minimum_magnitude(3.5)
        .phases(vec![PhaseType::P])
        .stations(stations.to_vec())
        .prediction_services(
            (0..2).map(|_| Box::new(AnalyticPredictor::new()) as Box<dyn PredictionService>),
        )
        .build()
        .unwrap()
        .call()
        .unwrap()
}

/// A detection at `station` that exactly matches `node`'s P prediction for
/// an event at `origin_offset` seconds.
fn synthesize(node: &GridNode, station: &Station, origin_offset: i64) -> SdhStationAssociation {
    let p = node
        .node_station(station.id)
        .unwrap()
        .phase_infos_of(PhaseType::P)
        .next()
        .unwrap();
    let origin = Utc.with_ymd_and_hms(2024, 3, 1, 12, 0, 0).unwrap() + TimeDelta::seconds(origin_offset);
    let travel = TimeDelta::from_std(std::time::Duration::from_secs_f64(p.travel_time_seconds)).unwrap();
    let detection = Detection {
        id: DetectionId::new(),
        station_id: station.id,
        phase: PhaseType::P,
        arrival_time: Some(InstantMeasurement {
            value: origin + travel,
            standard_deviation_seconds: 0.5,
        }),
        slowness: Some(NumericMeasurement {
            value: p.slowness,
            standard_deviation: 0.1,
        }),
        azimuth: Some(NumericMeasurement {
            value: p.back_azimuth_degrees,
            standard_deviation: 3.0,
        }),
    };
    SdhStationAssociation::new(detection, station.clone())
}

fn stations() -> Vec<Station> {
    vec![
        Station::new("ASAR", -23.67, 133.90),
        Station::new("WRA", -19.94, 134.34),
    ]
}

#[test]
fn synthetic_pair_is_recovered_at_its_source_node() {
    let stations = stations();
    let mut model = make_model(&stations);
    model.initialize_first_arrival_map(2).unwrap();
    let map = model.first_arrival_map_for(&stations).unwrap();

    let (asar, wra) = (stations.first().unwrap(), stations.get(1).unwrap());
    let asar_nodes = map.get(&asar.id).unwrap();
    let wra_nodes = map.get(&wra.id).unwrap();
    let source = asar_nodes
        .iter()
        .find(|(id, _)| wra_nodes.contains_key(id))
        .map(|(_, node)| Arc::clone(node))
        .unwrap();

    let batch = vec![synthesize(&source, asar, 0), synthesize(&source, wra, 0)];
    let definition = AssociatorDefinition::default();
    let events = CandidateEventGenerator::new()
        .definition(&definition)
        .sigma_time(definition.sigma_time)
        .grid_node_map(&map)
        .sdh_station_associations(&batch)
        .generate()
        .unwrap()
        .unwrap();

    let expected: BTreeSet<DetectionId> = batch.iter().map(|a| a.detection.id).collect();
    let at_source: Vec<_> = events.iter().filter(|e| e.grid_node().id() == source.id()).collect();
    assert_eq!(at_source.len(), 1);
    let event = at_source.first().unwrap();
    assert_eq!(event.detection_ids(), expected);
    assert!(events.iter().all(|e| e.detection_ids() == expected));
}

#[test]
fn whole_batch_association_yields_located_hypotheses() {
    let stations = stations();
    let mut model = make_model(&stations);
    model.initialize_first_arrival_map(1).unwrap();
    let map = model.first_arrival_map_for(&stations).unwrap();
    let (asar, wra) = (stations.first().unwrap(), stations.get(1).unwrap());
    let source = map
        .get(&asar.id)
        .unwrap()
        .iter()
        .find(|(id, _)| map.get(&wra.id).unwrap().contains_key(id))
        .map(|(_, node)| Arc::clone(node))
        .unwrap();
    let batch = vec![synthesize(&source, asar, 30), synthesize(&source, wra, 30)];

    let hypotheses = associate(&mut model, &batch, &AssociatorDefinition::default()).unwrap();

    let located = hypotheses.iter().find(|h| h.grid_node_id == source.id()).unwrap();
    assert!((located.latitude_degrees - source.center_latitude_degrees()).abs() < f64::EPSILON);
    assert_eq!(located.detection_ids.len(), 2);
    let json = serde_json::to_string(located).unwrap();
    assert!(json.contains("\"originTime\""));
}

#[test]
fn batch_outside_the_grid_yields_nothing() {
    let stations = stations();
    let mut model = make_model(&stations);
    let unknown = Station::new("ESDC", 39.67, -3.96);
    let detection = Detection {
        id: DetectionId::new(),
        station_id: unknown.id,
        phase: PhaseType::P,
        arrival_time: None,
        slowness: None,
        azimuth: None,
    };
    let batch = vec![SdhStationAssociation::new(detection, unknown)];

    let hypotheses = associate(&mut model, &batch, &AssociatorDefinition::default()).unwrap();
    assert!(hypotheses.is_empty());
}
