//! [`GridNodeData`]: the mesh payload holding one grid node, or nothing.
//!
//! Binary layout, little-endian:
//!
//! ```text
//! str   type tag ("GridNodeData")
//! u32   format version
//! u8    1 = grid node follows, 0 = EMPTY
//! [16]  node id
//! f64 x4  latitude, longitude, depth, cell height
//! u32   station count, then per station:
//!   [16]  station id
//!   f64   distance (degrees)
//!   u32   phase count, then per phase:
//!     str   phase label
//!     u8    primary flag
//!     f64 x13  PhaseInfo numeric fields
//! ```
//!
//! The text form carries the same fields, one record per line.

use std::any::Any;
use std::io::{Read, Write};
use std::sync::Arc;

use once_cell::sync::Lazy;
use tessera_mesh::codec::{self, TextReader};
use tessera_mesh::{CustomData, CustomDataRef, CustomDataType, MeshError, register_custom_data_type};
use tessera_types::{GridNode, GridNodeId, NodeStation, PhaseInfo, PhaseType, StationId};

/// Registered type name of [`GridNodeData`].
pub const GRID_NODE_DATA_TYPE: &str = "GridNodeData";

/// Payload format version written by this build.
pub const GRID_NODE_DATA_VERSION: u32 = 1;

static REGISTRATION: Lazy<()> = Lazy::new(|| {
    register_custom_data_type(CustomDataType {
        name: GRID_NODE_DATA_TYPE,
        read_binary: read_binary_payload,
        read_text: read_text_payload,
    });
});

/// Register [`GridNodeData`] with the mesh payload registry.
///
/// Runs once per process; every constructor calls it, so a model can only
/// hold grid node payloads after registration has happened.
pub fn ensure_registered() {
    Lazy::force(&REGISTRATION);
}

/// Mesh payload: a shared [`GridNode`] or the EMPTY sentinel.
#[derive(Debug, Clone)]
pub struct GridNodeData {
    node: Option<Arc<GridNode>>,
}

impl GridNodeData {
    /// Wrap a grid node.
    pub fn new(node: GridNode) -> Self {
        Self::from_shared(Arc::new(node))
    }

    /// Wrap an already shared grid node.
    pub fn from_shared(node: Arc<GridNode>) -> Self {
        ensure_registered();
        Self { node: Some(node) }
    }

    /// The EMPTY sentinel: this slot has no usable predictions.
    pub fn empty() -> Self {
        ensure_registered();
        Self { node: None }
    }

    /// Wrap a generator result, mapping `None` to EMPTY.
    pub fn from_generated(node: Option<GridNode>) -> Self {
        node.map_or_else(Self::empty, Self::new)
    }

    /// The held grid node, if any.
    pub const fn grid_node(&self) -> Option<&Arc<GridNode>> {
        self.node.as_ref()
    }

    /// Whether this is the EMPTY sentinel.
    pub const fn is_empty(&self) -> bool {
        self.node.is_none()
    }

    /// Value equality ignoring grid node identifiers.
    pub fn same_content(&self, other: &Self) -> bool {
        match (&self.node, &other.node) {
            (None, None) => true,
            (Some(a), Some(b)) => a.same_content(b),
            _ => false,
        }
    }

    /// Downcast a mesh payload.
    pub fn from_payload(payload: &CustomDataRef) -> Option<&Self> {
        payload.as_any().downcast_ref::<Self>()
    }
}

impl CustomData for GridNodeData {
    fn data_type(&self) -> &'static str {
        GRID_NODE_DATA_TYPE
    }

    fn write_binary(&self, out: &mut dyn Write) -> Result<(), MeshError> {
        codec::write_str(out, GRID_NODE_DATA_TYPE)?;
        codec::write_u32(out, GRID_NODE_DATA_VERSION)?;
        let Some(node) = &self.node else {
            return codec::write_u8(out, 0);
        };
        codec::write_u8(out, 1)?;
        codec::write_bytes16(out, node.id().as_bytes())?;
        codec::write_f64(out, node.center_latitude_degrees())?;
        codec::write_f64(out, node.center_longitude_degrees())?;
        codec::write_f64(out, node.center_depth_km())?;
        codec::write_f64(out, node.grid_cell_height_km())?;
        codec::write_count(out, node.node_stations().len())?;
        for ns in node.node_stations() {
            codec::write_bytes16(out, ns.station_id().as_bytes())?;
            codec::write_f64(out, ns.distance_from_grid_point_degrees())?;
            codec::write_count(out, ns.phase_infos().len())?;
            for info in ns.phase_infos() {
                codec::write_str(out, info.phase_type.label())?;
                codec::write_u8(out, u8::from(info.primary))?;
                for value in info.numeric_fields() {
                    codec::write_f64(out, value)?;
                }
            }
        }
        Ok(())
    }

    fn write_text(&self, out: &mut dyn Write) -> Result<(), MeshError> {
        let Some(node) = &self.node else {
            writeln!(out, "{GRID_NODE_DATA_TYPE} {GRID_NODE_DATA_VERSION} empty")?;
            return Ok(());
        };
        writeln!(
            out,
            "{GRID_NODE_DATA_TYPE} {GRID_NODE_DATA_VERSION} node {} {} {} {} {} {}",
            node.id(),
            node.center_latitude_degrees(),
            node.center_longitude_degrees(),
            node.center_depth_km(),
            node.grid_cell_height_km(),
            node.node_stations().len(),
        )?;
        for ns in node.node_stations() {
            writeln!(
                out,
                "station {} {} {}",
                ns.station_id(),
                ns.distance_from_grid_point_degrees(),
                ns.phase_infos().len(),
            )?;
            for info in ns.phase_infos() {
                write!(out, "phase {} {}", info.phase_type, u8::from(info.primary))?;
                for value in info.numeric_fields() {
                    write!(out, " {value}")?;
                }
                writeln!(out)?;
            }
        }
        Ok(())
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}

// ---------------------------------------------------------------------------
// Decoders
// ---------------------------------------------------------------------------

fn check_header(tag: &str, version: u32) -> Result<(), MeshError> {
    if tag != GRID_NODE_DATA_TYPE {
        return Err(MeshError::DataTypeMismatch {
            expected: GRID_NODE_DATA_TYPE.to_owned(),
            found: tag.to_owned(),
        });
    }
    if version != GRID_NODE_DATA_VERSION {
        return Err(MeshError::UnsupportedVersion {
            what: GRID_NODE_DATA_TYPE,
            found: version,
            supported: GRID_NODE_DATA_VERSION,
        });
    }
    Ok(())
}

fn invalid(err: impl core::fmt::Display) -> MeshError {
    MeshError::Format(format!("invalid grid node: {err}"))
}

/// Decode the output of [`GridNodeData::write_binary`].
pub fn read_binary(input: &mut dyn Read) -> Result<GridNodeData, MeshError> {
    let tag = codec::read_str(input)?;
    let version = codec::read_u32(input)?;
    check_header(&tag, version)?;
    match codec::read_u8(input)? {
        0 => return Ok(GridNodeData::empty()),
        1 => {}
        flag => return Err(MeshError::Format(format!("bad grid node presence flag {flag}"))),
    }

    let id = GridNodeId::from_bytes(codec::read_bytes16(input)?);
    let latitude = codec::read_f64(input)?;
    let longitude = codec::read_f64(input)?;
    let depth = codec::read_f64(input)?;
    let height = codec::read_f64(input)?;
    let n_stations = codec::read_count(input)?;
    let mut node_stations = Vec::with_capacity(n_stations.min(4096));
    for _ in 0..n_stations {
        let station_id = StationId::from_bytes(codec::read_bytes16(input)?);
        let distance = codec::read_f64(input)?;
        let n_phases = codec::read_count(input)?;
        let mut infos = Vec::with_capacity(n_phases.min(64));
        for _ in 0..n_phases {
            let phase: PhaseType = codec::read_str(input)?.parse().map_err(invalid)?;
            let primary = codec::read_u8(input)? != 0;
            let mut values = [0.0; 13];
            for value in &mut values {
                *value = codec::read_f64(input)?;
            }
            infos.push(PhaseInfo::from_numeric_fields(phase, primary, values));
        }
        node_stations.push(NodeStation::new(station_id, distance, infos).map_err(invalid)?);
    }
    let node = GridNode::new(id, latitude, longitude, depth, height, node_stations).map_err(invalid)?;
    Ok(GridNodeData::new(node))
}

/// Decode the output of [`GridNodeData::write_text`].
pub fn read_text(reader: &mut TextReader<'_>) -> Result<GridNodeData, MeshError> {
    let header = reader.keyword(GRID_NODE_DATA_TYPE)?;
    let mut fields = header.split_whitespace();
    let mut next = |what: &str| {
        fields
            .next()
            .ok_or_else(|| reader.error(format!("missing {what}")))
    };
    let version: u32 = reader.parse(next("version")?, "version")?;
    check_header(GRID_NODE_DATA_TYPE, version)?;
    match next("presence")? {
        "empty" => return Ok(GridNodeData::empty()),
        "node" => {}
        other => return Err(reader.error(format!("expected 'node' or 'empty', found '{other}'"))),
    }
    let [id, latitude, longitude, depth, height, n_stations] =
        [next("id")?, next("latitude")?, next("longitude")?, next("depth")?, next("height")?, next("station count")?];

    let id: GridNodeId = reader.parse(id, "grid node id")?;
    let latitude: f64 = reader.parse(latitude, "latitude")?;
    let longitude: f64 = reader.parse(longitude, "longitude")?;
    let depth: f64 = reader.parse(depth, "depth")?;
    let height: f64 = reader.parse(height, "height")?;
    let n_stations: usize = reader.parse(n_stations, "station count")?;

    let mut node_stations = Vec::with_capacity(n_stations.min(4096));
    for _ in 0..n_stations {
        let line = reader.keyword("station")?;
        let [station_id, distance, n_phases]: [&str; 3] = split_exact(reader, line, "station")?;
        let station_id: StationId = reader.parse(station_id, "station id")?;
        let distance: f64 = reader.parse(distance, "distance")?;
        let n_phases: usize = reader.parse(n_phases, "phase count")?;

        let mut infos = Vec::with_capacity(n_phases.min(64));
        for _ in 0..n_phases {
            let line = reader.keyword("phase")?;
            let (phase, rest) = line
                .split_once(' ')
                .ok_or_else(|| reader.error("truncated phase record"))?;
            let (primary, rest) = rest
                .split_once(' ')
                .ok_or_else(|| reader.error("truncated phase record"))?;
            let phase: PhaseType = reader.parse(phase, "phase")?;
            let primary = match primary {
                "1" => true,
                "0" => false,
                other => return Err(reader.error(format!("invalid primary flag '{other}'"))),
            };
            let values: [f64; 13] = reader.parse_fields(rest, "phase value")?;
            infos.push(PhaseInfo::from_numeric_fields(phase, primary, values));
        }
        node_stations.push(NodeStation::new(station_id, distance, infos).map_err(|e| reader.error(e.to_string()))?);
    }
    let node = GridNode::new(id, latitude, longitude, depth, height, node_stations)
        .map_err(|e| reader.error(e.to_string()))?;
    Ok(GridNodeData::new(node))
}

fn split_exact<'t, const N: usize>(
    reader: &TextReader<'_>,
    line: &'t str,
    what: &str,
) -> Result<[&'t str; N], MeshError> {
    let mut out = [""; N];
    let mut fields = line.split_whitespace();
    for slot in &mut out {
        *slot = fields
            .next()
            .ok_or_else(|| reader.error(format!("too few {what} fields")))?;
    }
    if fields.next().is_some() {
        return Err(reader.error(format!("too many {what} fields")));
    }
    Ok(out)
}

fn read_binary_payload(input: &mut dyn Read) -> Result<CustomDataRef, MeshError> {
    Ok(Arc::new(read_binary(input)?))
}

fn read_text_payload(reader: &mut TextReader<'_>) -> Result<CustomDataRef, MeshError> {
    Ok(Arc::new(read_text(reader)?))
}
