//! JSON inputs: station lists and detection batches.

use std::collections::BTreeMap;
use std::path::Path;

use anyhow::Context;
use serde::de::DeserializeOwned;
use tessera_types::{Detection, SdhStationAssociation, Station, StationId};

use crate::error::CliError;

/// Read a JSON array of records.
pub fn read_json_list<T: DeserializeOwned>(path: &Path, what: &'static str) -> anyhow::Result<Vec<T>> {
    let contents = std::fs::read_to_string(path).with_context(|| format!("reading {what} from {}", path.display()))?;
    let records: Vec<T> =
        serde_json::from_str(&contents).with_context(|| format!("parsing {what} in {}", path.display()))?;
    if records.is_empty() {
        return Err(CliError::EmptyInput {
            path: path.to_path_buf(),
            what,
        }
        .into());
    }
    Ok(records)
}

/// Pair every detection with the station that recorded it.
pub fn pair_with_stations(
    detections: Vec<Detection>,
    stations: &[Station],
) -> Result<Vec<SdhStationAssociation>, CliError> {
    let by_id: BTreeMap<StationId, &Station> = stations.iter().map(|s| (s.id, s)).collect();
    detections
        .into_iter()
        .map(|detection| {
            let station = by_id
                .get(&detection.station_id)
                .copied()
                .ok_or(CliError::UnknownStation {
                    detection: detection.id,
                    station: detection.station_id,
                })?
                .clone();
            Ok(SdhStationAssociation::new(detection, station))
        })
        .collect()
}
