//! [`PopulatedGridModel`]: a mesh whose slots hold [`GridNodeData`], plus the
//! station-to-grid-node first-arrival index the associator queries.

use std::collections::BTreeMap;
use std::io::{Read, Write};
use std::ops::Range;
use std::path::Path;
use std::sync::Arc;

use rayon::prelude::*;
use tessera_mesh::{GeoModel, MeshError};
use tessera_types::{GridNode, GridNodeId, Station, StationId};
use tracing::{debug, info};

use crate::error::GridModelError;
use crate::payload::{GRID_NODE_DATA_TYPE, GridNodeData, ensure_registered};

/// Grid nodes keyed by id. Nodes are shared with the model, not copied.
pub type GridNodeSet = BTreeMap<GridNodeId, Arc<GridNode>>;

/// For each station, every grid node at which that station records a
/// primary (first-arriving) phase.
pub type FirstArrivalMap = BTreeMap<StationId, GridNodeSet>;

/// A populated mesh and its lazily built first-arrival index.
#[derive(Debug, Clone)]
pub struct PopulatedGridModel {
    model: GeoModel,
    first_arrivals: Option<FirstArrivalMap>,
}

impl PopulatedGridModel {
    /// Wrap a model whose payload type is [`GridNodeData`].
    ///
    /// # Errors
    ///
    /// Returns [`MeshError::DataTypeMismatch`] for any other payload type.
    pub fn new(model: GeoModel) -> Result<Self, GridModelError> {
        let found = &model.metadata().data_type;
        if found != GRID_NODE_DATA_TYPE {
            return Err(MeshError::DataTypeMismatch {
                expected: GRID_NODE_DATA_TYPE.to_owned(),
                found: found.clone(),
            }
            .into());
        }
        Ok(Self {
            model,
            first_arrivals: None,
        })
    }

    /// The underlying mesh model.
    pub const fn geo_model(&self) -> &GeoModel {
        &self.model
    }

    /// Number of vertices.
    pub fn vertex_count(&self) -> usize {
        self.model.vertex_count()
    }

    /// Number of depth layers.
    pub fn layer_count(&self) -> usize {
        self.model.layer_count()
    }

    /// Payload at one slot. Unset slots read as `None`.
    pub fn grid_node_data(&self, vertex: usize, layer: usize) -> Option<&GridNodeData> {
        self.model
            .payload(vertex, layer)
            .and_then(GridNodeData::from_payload)
    }

    /// Grid node at one slot; `None` for EMPTY, unset or out-of-range slots.
    pub fn grid_node(&self, vertex: usize, layer: usize) -> Option<Arc<GridNode>> {
        self.grid_node_data(vertex, layer)
            .and_then(GridNodeData::grid_node)
            .cloned()
    }

    /// Every non-empty grid node, in vertex-major order.
    pub fn grid_nodes(&self) -> impl Iterator<Item = &Arc<GridNode>> {
        let layers = self.layer_count();
        (0..self.vertex_count())
            .flat_map(move |v| (0..layers).map(move |l| (v, l)))
            .filter_map(|(v, l)| self.grid_node_data(v, l))
            .filter_map(GridNodeData::grid_node)
    }

    // -----------------------------------------------------------------------
    // First-arrival index
    // -----------------------------------------------------------------------

    /// Build the first-arrival index. Calling it again rebuilds it with the
    /// same result.
    ///
    /// `num_threads <= 1` scans sequentially; larger values split the
    /// vertices into `num_threads` contiguous ranges, scan them on a
    /// dedicated pool of that size and merge the partial maps.
    ///
    /// # Errors
    ///
    /// Returns [`GridModelError::ThreadPool`] if the pool cannot be created.
    pub fn initialize_first_arrival_map(&mut self, num_threads: usize) -> Result<(), GridModelError> {
        let map = if num_threads <= 1 {
            self.scan_vertices(0..self.vertex_count())
        } else {
            let pool = rayon::ThreadPoolBuilder::new()
                .num_threads(num_threads)
                .thread_name(|i| format!("tessera-index-{i}"))
                .build()?;
            let ranges = vertex_ranges(self.vertex_count(), num_threads);
            pool.install(|| {
                ranges
                    .into_par_iter()
                    .map(|range| self.scan_vertices(range))
                    .reduce(FirstArrivalMap::new, |mut a, b| {
                        merge_into(&mut a, b);
                        a
                    })
            })
        };
        info!(
            stations = map.len(),
            entries = map.values().map(BTreeMap::len).sum::<usize>(),
            threads = num_threads.max(1),
            "First-arrival map initialized"
        );
        self.first_arrivals = Some(map);
        Ok(())
    }

    fn scan_vertices(&self, vertices: Range<usize>) -> FirstArrivalMap {
        let mut map = FirstArrivalMap::new();
        for vertex in vertices {
            for layer in 0..self.layer_count() {
                let Some(node) = self.grid_node(vertex, layer) else {
                    continue;
                };
                for ns in node.node_stations() {
                    if ns.primary_phase_info().is_some() {
                        map.entry(ns.station_id())
                            .or_default()
                            .insert(node.id(), Arc::clone(&node));
                    }
                }
            }
        }
        map
    }

    /// The full index, if it has been built.
    pub const fn first_arrival_map(&self) -> Option<&FirstArrivalMap> {
        self.first_arrivals.as_ref()
    }

    /// The index restricted to the given stations. Stations with no entry
    /// are absent from the result.
    ///
    /// # Errors
    ///
    /// Returns [`GridModelError::IndexNotInitialized`] before
    /// [`initialize_first_arrival_map`](Self::initialize_first_arrival_map).
    pub fn first_arrival_map_for<'s, I>(&self, stations: I) -> Result<FirstArrivalMap, GridModelError>
    where
        I: IntoIterator<Item = &'s Station>,
    {
        let index = self
            .first_arrivals
            .as_ref()
            .ok_or(GridModelError::IndexNotInitialized)?;
        Ok(stations
            .into_iter()
            .filter_map(|s| index.get(&s.id).map(|nodes| (s.id, nodes.clone())))
            .collect())
    }

    // -----------------------------------------------------------------------
    // Comparison and I/O
    // -----------------------------------------------------------------------

    /// Slot-by-slot value equality, ignoring grid node ids.
    pub fn same_content(&self, other: &Self) -> bool {
        if self.model.metadata() != other.model.metadata()
            || self.model.grid().grid_id() != other.model.grid().grid_id()
        {
            return false;
        }
        let layers = self.layer_count();
        (0..self.vertex_count()).all(|v| {
            (0..layers).all(|l| match (self.grid_node_data(v, l), other.grid_node_data(v, l)) {
                (None, None) => true,
                (Some(a), Some(b)) => a.same_content(b),
                _ => false,
            })
        })
    }

    /// Write in the binary model format.
    pub fn write_binary(&self, out: &mut dyn Write) -> Result<(), GridModelError> {
        Ok(self.model.write_binary(out)?)
    }

    /// Write in the text model format.
    pub fn write_text(&self, out: &mut dyn Write) -> Result<(), GridModelError> {
        Ok(self.model.write_text(out)?)
    }

    /// Read the binary model format. The index starts uninitialized.
    pub fn read_binary(input: &mut dyn Read) -> Result<Self, GridModelError> {
        ensure_registered();
        Self::new(GeoModel::read_binary(input)?)
    }

    /// Read the text model format. The index starts uninitialized.
    pub fn read_text(input: &mut dyn Read) -> Result<Self, GridModelError> {
        ensure_registered();
        Self::new(GeoModel::read_text(input)?)
    }

    /// Save to a file; `.txt` and `.ascii` select the text form.
    pub fn save<P: AsRef<Path>>(&self, path: P) -> Result<(), GridModelError> {
        Ok(self.model.save(path)?)
    }

    /// Load a file written by [`save`](Self::save).
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self, GridModelError> {
        ensure_registered();
        let model = Self::new(GeoModel::load(path.as_ref())?)?;
        debug!(path = %path.as_ref().display(), "Populated grid model loaded");
        Ok(model)
    }
}

/// Split `0..total` into at most `parts` contiguous, disjoint ranges.
fn vertex_ranges(total: usize, parts: usize) -> Vec<Range<usize>> {
    let chunk = total.div_ceil(parts.max(1)).max(1);
    (0..total)
        .step_by(chunk)
        .map(|start| start..start.saturating_add(chunk).min(total))
        .collect()
}

fn merge_into(into: &mut FirstArrivalMap, from: FirstArrivalMap) {
    for (station, nodes) in from {
        into.entry(station).or_default().extend(nodes);
    }
}
