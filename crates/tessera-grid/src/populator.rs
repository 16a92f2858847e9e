//! [`ModelPopulator`]: fills every vertex/layer slot of a mesh with a
//! [`GridNodeData`], one worker per prediction service.
//!
//! The vertex indices are split into contiguous shares, one per worker. Each
//! worker owns one [`PredictionService`] and an exclusive view of its share's
//! slots, so no locking is needed and the result does not depend on how many
//! workers ran.

use std::path::PathBuf;
use std::sync::Arc;

use rayon::prelude::*;
use tessera_mesh::{GeoModel, Layer, MeshError, ModelMetadata, TessellatedGrid, VertexRangeMut};
use tessera_predict::{AK135, PredictionService, VEITH_CLAWSON_72};
use tessera_types::{PhaseType, Station};
use tracing::{debug, error, info};

use crate::config::PopulatorConfig;
use crate::error::PopulationError;
use crate::generator::GridNodeGenerator;
use crate::model::PopulatedGridModel;
use crate::payload::{GRID_NODE_DATA_TYPE, GridNodeData, ensure_registered};

/// Where the mesh to populate comes from. Resolved when the job runs.
#[derive(Debug, Clone)]
pub enum MeshSource {
    /// A grid already in memory.
    InMemory(Arc<TessellatedGrid>),
    /// A grid file written by [`TessellatedGrid::save`].
    Resource(PathBuf),
    /// An icosahedral grid generated at the given subdivision depth.
    Icosahedral {
        /// Subdivision depth.
        subdivisions: u32,
    },
}

impl MeshSource {
    fn resolve(&self) -> Result<Arc<TessellatedGrid>, PopulationError> {
        Ok(match self {
            Self::InMemory(grid) => Arc::clone(grid),
            Self::Resource(path) => Arc::new(TessellatedGrid::load(path)?),
            Self::Icosahedral { subdivisions } => Arc::new(TessellatedGrid::icosahedral(*subdivisions)?),
        })
    }
}

/// Collects the configuration of a [`ModelPopulator`].
#[derive(Default)]
pub struct ModelPopulatorBuilder {
    mesh: Option<MeshSource>,
    height_km: Option<f64>,
    radius_degrees: Option<f64>,
    minimum_magnitude: Option<f64>,
    phases: Option<Vec<PhaseType>>,
    stations: Option<Vec<Station>>,
    predictors: Vec<Box<dyn PredictionService>>,
    layers: Option<Vec<Layer>>,
    travel_time_model: Option<String>,
    magnitude_model: Option<String>,
    description: Option<String>,
    thread_pool: Option<Arc<rayon::ThreadPool>>,
}

impl ModelPopulatorBuilder {
    /// Start an unconfigured builder.
    pub fn new() -> Self {
        Self::default()
    }

    /// Pre-fill everything a [`PopulatorConfig`] describes. Stations and
    /// prediction services still have to be supplied.
    pub fn from_config(config: &PopulatorConfig) -> Self {
        let mesh = config.mesh.path.as_ref().map_or(
            MeshSource::Icosahedral {
                subdivisions: config.mesh.subdivisions,
            },
            |path| MeshSource::Resource(path.clone()),
        );
        Self::new()
            .mesh(mesh)
            .height_km(config.grid.height_km)
            .radius_degrees(config.grid.radius_degrees)
            .minimum_magnitude(config.grid.minimum_magnitude)
            .phases(config.phases.clone())
            .layers(config.grid.layers.iter().map(Layer::from).collect())
            .travel_time_model(config.models.travel_time.clone())
            .magnitude_model(config.models.magnitude.clone())
            .description(config.mesh.description.clone())
    }

    /// Mesh to populate.
    #[must_use]
    pub fn mesh(mut self, mesh: MeshSource) -> Self {
        self.mesh = Some(mesh);
        self
    }

    /// Grid cell height, km.
    #[must_use]
    pub const fn height_km(mut self, height: f64) -> Self {
        self.height_km = Some(height);
        self
    }

    /// Grid cell radius, degrees.
    #[must_use]
    pub const fn radius_degrees(mut self, radius: f64) -> Self {
        self.radius_degrees = Some(radius);
        self
    }

    /// Smallest magnitude the grid should detect.
    #[must_use]
    pub const fn minimum_magnitude(mut self, magnitude: f64) -> Self {
        self.minimum_magnitude = Some(magnitude);
        self
    }

    /// Phases predicted for every station.
    #[must_use]
    pub fn phases(mut self, phases: Vec<PhaseType>) -> Self {
        self.phases = Some(phases);
        self
    }

    /// Stations considered at every grid point.
    #[must_use]
    pub fn stations(mut self, stations: Vec<Station>) -> Self {
        self.stations = Some(stations);
        self
    }

    /// Add one prediction service. Each one backs one worker.
    #[must_use]
    pub fn prediction_service(mut self, service: Box<dyn PredictionService>) -> Self {
        self.predictors.push(service);
        self
    }

    /// Add several prediction services.
    #[must_use]
    pub fn prediction_services<I>(mut self, services: I) -> Self
    where
        I: IntoIterator<Item = Box<dyn PredictionService>>,
    {
        self.predictors.extend(services);
        self
    }

    /// Depth layers. Defaults to a single `CRUST` layer at 50 km.
    #[must_use]
    pub fn layers(mut self, layers: Vec<Layer>) -> Self {
        self.layers = Some(layers);
        self
    }

    /// Travel-time model name. Defaults to `ak135`.
    #[must_use]
    pub fn travel_time_model(mut self, model: impl Into<String>) -> Self {
        self.travel_time_model = Some(model.into());
        self
    }

    /// Magnitude model name. Defaults to `VeithClawson72`.
    #[must_use]
    pub fn magnitude_model(mut self, model: impl Into<String>) -> Self {
        self.magnitude_model = Some(model.into());
        self
    }

    /// Description stored in the model file.
    #[must_use]
    pub fn description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    /// Run shares on a caller-owned pool instead of a job-local one.
    #[must_use]
    pub fn thread_pool(mut self, pool: Arc<rayon::ThreadPool>) -> Self {
        self.thread_pool = Some(pool);
        self
    }

    /// Names of the required fields still unset.
    pub fn missing_parameter_names(&self) -> Vec<&'static str> {
        [
            ("mesh", self.mesh.is_none()),
            ("height_km", self.height_km.is_none()),
            ("radius_degrees", self.radius_degrees.is_none()),
            ("minimum_magnitude", self.minimum_magnitude.is_none()),
            ("phases", self.phases.as_ref().is_none_or(Vec::is_empty)),
            ("stations", self.stations.as_ref().is_none_or(Vec::is_empty)),
            ("prediction_services", self.predictors.is_empty()),
        ]
        .into_iter()
        .filter_map(|(name, unset)| unset.then_some(name))
        .collect()
    }

    /// Validate and freeze the configuration. The mesh is not touched yet.
    ///
    /// # Errors
    ///
    /// [`PopulationError::NotConfigured`] when a required field is unset, or
    /// [`PopulationError::InvalidParameter`] for an out-of-range value.
    pub fn build(self) -> Result<ModelPopulator, PopulationError> {
        let missing = self.missing_parameter_names();
        let (Some(mesh), Some(height_km), Some(radius_degrees), Some(minimum_magnitude), Some(phases), Some(stations), true) = (
            self.mesh,
            self.height_km,
            self.radius_degrees,
            self.minimum_magnitude,
            self.phases,
            self.stations,
            missing.is_empty(),
        ) else {
            return Err(PopulationError::NotConfigured { missing });
        };

        let invalid = |name: &'static str, reason: String| PopulationError::InvalidParameter { name, reason };
        if !(height_km.is_finite() && height_km > 0.0) {
            return Err(invalid("height_km", format!("{height_km} is not a positive length")));
        }
        if !(radius_degrees.is_finite() && radius_degrees > 0.0) {
            return Err(invalid("radius_degrees", format!("{radius_degrees} is not a positive angle")));
        }
        if !(minimum_magnitude.is_finite() && minimum_magnitude >= 0.0) {
            return Err(invalid("minimum_magnitude", format!("{minimum_magnitude} is negative")));
        }
        let layers = self.layers.unwrap_or_else(|| vec![Layer::new("CRUST", 50.0)]);
        if layers.is_empty() {
            return Err(invalid("layers", String::from("at least one layer is required")));
        }
        if let Some(layer) = layers.iter().find(|l| !l.center_depth_km.is_finite()) {
            return Err(invalid("layers", format!("layer {} has no finite depth", layer.name)));
        }

        let mut phases = phases;
        phases.sort_unstable();
        phases.dedup();

        Ok(ModelPopulator {
            mesh,
            settings: CellSettings {
                height_km,
                radius_degrees,
                minimum_magnitude,
                travel_time_model: self.travel_time_model.unwrap_or_else(|| AK135.to_owned()),
                magnitude_model: self.magnitude_model.unwrap_or_else(|| VEITH_CLAWSON_72.to_owned()),
            },
            layers,
            description: self.description.unwrap_or_default(),
            phases,
            stations,
            predictors: self.predictors,
            thread_pool: self.thread_pool,
        })
    }
}

impl core::fmt::Debug for ModelPopulatorBuilder {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("ModelPopulatorBuilder")
            .field("mesh", &self.mesh)
            .field("missing", &self.missing_parameter_names())
            .field("prediction_services", &self.predictors.len())
            .finish_non_exhaustive()
    }
}

/// Per-cell parameters forwarded to every generator.
#[derive(Debug, Clone)]
struct CellSettings {
    height_km: f64,
    radius_degrees: f64,
    minimum_magnitude: f64,
    travel_time_model: String,
    magnitude_model: String,
}

/// A configured population job. Run it with [`call`](Self::call).
pub struct ModelPopulator {
    mesh: MeshSource,
    settings: CellSettings,
    layers: Vec<Layer>,
    description: String,
    phases: Vec<PhaseType>,
    stations: Vec<Station>,
    predictors: Vec<Box<dyn PredictionService>>,
    thread_pool: Option<Arc<rayon::ThreadPool>>,
}

impl core::fmt::Debug for ModelPopulator {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("ModelPopulator")
            .field("mesh", &self.mesh)
            .field("settings", &self.settings)
            .field("layers", &self.layers)
            .field("phases", &self.phases)
            .field("stations", &self.stations.len())
            .field("prediction_services", &self.predictors.len())
            .field("external_pool", &self.thread_pool.is_some())
            .finish_non_exhaustive()
    }
}

/// Slot counts from one worker's share.
#[derive(Debug, Default, Clone, Copy)]
struct ShareOutcome {
    slots: usize,
    filled: usize,
}

/// Read-only state every worker sees.
struct Job<'a> {
    grid: &'a TessellatedGrid,
    settings: &'a CellSettings,
    layers: &'a [Layer],
    phases: &'a [PhaseType],
    stations: &'a [Station],
}

impl Job<'_> {
    fn populate(
        &self,
        share: usize,
        mut range: VertexRangeMut<'_>,
        service: &mut dyn PredictionService,
    ) -> Result<ShareOutcome, PopulationError> {
        let vertices = range.vertices();
        debug!(share, first = vertices.start, end = vertices.end, "Share started");
        let mut outcome = ShareOutcome::default();
        for vertex in vertices {
            let (latitude, longitude) = self
                .grid
                .lat_lon(vertex)
                .ok_or(MeshError::IndexOutOfRange { vertex, layer: 0 })?;
            for (layer_index, layer) in self.layers.iter().enumerate() {
                let node = GridNodeGenerator::new()
                    .prediction_service(&mut *service)
                    .travel_time_model(&self.settings.travel_time_model)
                    .magnitude_model(&self.settings.magnitude_model)
                    .radius_degrees(self.settings.radius_degrees)
                    .height_km(self.settings.height_km)
                    .latitude_degrees(latitude)
                    .longitude_degrees(longitude)
                    .depth_km(layer.center_depth_km)
                    .minimum_magnitude(self.settings.minimum_magnitude)
                    .stations(self.stations)
                    .phases(self.phases)
                    .generate()
                    .map_err(|source| PopulationError::Generation {
                        vertex,
                        layer: layer_index,
                        source,
                    })?;
                outcome.slots = outcome.slots.saturating_add(1);
                if node.is_some() {
                    outcome.filled = outcome.filled.saturating_add(1);
                }
                range.set_payload(vertex, layer_index, Arc::new(GridNodeData::from_generated(node)))?;
            }
        }
        debug!(share, slots = outcome.slots, filled = outcome.filled, "Share finished");
        Ok(outcome)
    }
}

impl ModelPopulator {
    /// Number of prediction services, which bounds the worker count.
    pub fn worker_count(&self) -> usize {
        self.predictors.len()
    }

    /// Populate the mesh.
    ///
    /// Uses one worker per prediction service, capped at the vertex count.
    /// A single worker runs on the calling thread. Several workers run on the
    /// caller's pool when one was supplied, otherwise on a pool created for
    /// this call and released before it returns.
    ///
    /// # Errors
    ///
    /// Any worker failure fails the whole job; every failure is logged and
    /// the one for the lowest vertex is returned.
    /// [`PopulationError::NoUsablePredictions`] when every slot came out empty.
    pub fn call(&mut self) -> Result<PopulatedGridModel, PopulationError> {
        ensure_registered();
        let grid = self.mesh.resolve()?;
        let mut model = GeoModel::new(
            Arc::clone(&grid),
            ModelMetadata {
                description: self.description.clone(),
                layers: self.layers.clone(),
                data_type: GRID_NODE_DATA_TYPE.to_owned(),
            },
        )?;

        let vertex_count = model.vertex_count();
        let workers = self.predictors.len().min(vertex_count).max(1);
        let shares = partition(vertex_count, workers);
        info!(
            vertices = vertex_count,
            layers = self.layers.len(),
            stations = self.stations.len(),
            phases = self.phases.len(),
            workers,
            "Population started"
        );

        let job = Job {
            grid: &grid,
            settings: &self.settings,
            layers: &self.layers,
            phases: &self.phases,
            stations: &self.stations,
        };
        let results: Vec<Result<ShareOutcome, PopulationError>> = {
            let work: Vec<_> = model
                .split_vertex_ranges(&shares)?
                .into_iter()
                .zip(self.predictors.iter_mut())
                .enumerate()
                .collect();
            let run = |(share, (range, service)): (usize, (VertexRangeMut<'_>, &mut Box<dyn PredictionService>))| {
                job.populate(share, range, service.as_mut())
            };
            match (&self.thread_pool, work.len()) {
                (None, 0 | 1) => work.into_iter().map(run).collect(),
                (Some(pool), _) => pool.install(|| work.into_par_iter().map(run).collect()),
                (None, threads) => {
                    let pool = rayon::ThreadPoolBuilder::new()
                        .num_threads(threads)
                        .thread_name(|i| format!("tessera-populate-{i}"))
                        .build()?;
                    pool.install(|| work.into_par_iter().map(run).collect())
                }
            }
        };

        let mut first_error = None;
        let mut total = ShareOutcome::default();
        for result in results {
            match result {
                Ok(outcome) => {
                    total.slots = total.slots.saturating_add(outcome.slots);
                    total.filled = total.filled.saturating_add(outcome.filled);
                }
                Err(err) => {
                    error!(error = %err, "Population worker failed");
                    first_error.get_or_insert(err);
                }
            }
        }
        if let Some(err) = first_error {
            return Err(err);
        }
        if total.filled == 0 {
            error!(slots = total.slots, "No grid node could be computed");
            return Err(PopulationError::NoUsablePredictions { slots: total.slots });
        }
        info!(slots = total.slots, filled = total.filled, "Population finished");
        Ok(PopulatedGridModel::new(model)?)
    }
}

/// Split `total` into `shares` contiguous sizes that differ by at most one,
/// the larger ones first.
fn partition(total: usize, shares: usize) -> Vec<usize> {
    let base = total.checked_div(shares).unwrap_or(0);
    let remainder = total.checked_rem(shares).unwrap_or(total);
    (0..shares)
        .map(|i| base.saturating_add(usize::from(i < remainder)))
        .collect()
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used)]

    use super::*;
    use crate::error::GridModelError;
    use tessera_predict::AnalyticPredictor;

    fn make_stations() -> Vec<Station> {
        vec![
            Station::new("ASAR", -23.67, 133.90),
            Station::new("TXAR", 29.33, -103.67),
        ]
    }

    fn make_builder(workers: usize) -> ModelPopulatorBuilder {
        ModelPopulatorBuilder::new()
            .mesh(MeshSource::Icosahedral { subdivisions: 0 })
            .height_km(100.0)
            .radius_degrees(2.0)
            .minimum_magnitude(3.5)
            .phases(vec![PhaseType::P])
            .stations(make_stations())
            .prediction_services((0..workers).map(|_| Box::new(AnalyticPredictor::new()) as Box<dyn PredictionService>))
    }

    // -----------------------------------------------------------------------
    // Partitioning
    // -----------------------------------------------------------------------

    #[test]
    fn partition_sums_to_total_with_remainder_first() {
        assert_eq!(partition(10, 3), vec![4, 3, 3]);
        assert_eq!(partition(12, 4), vec![3, 3, 3, 3]);
        assert_eq!(partition(2, 2), vec![1, 1]);
        assert_eq!(partition(0, 1), vec![0]);
        assert_eq!(partition(642, 7).iter().sum::<usize>(), 642);
    }

    // -----------------------------------------------------------------------
    // Builder
    // -----------------------------------------------------------------------

    #[test]
    fn empty_builder_reports_every_required_field() {
        let err = ModelPopulatorBuilder::new().build().err().unwrap();
        let PopulationError::NotConfigured { missing } = &err else {
            panic!("unexpected error: {err}");
        };
        assert_eq!(
            missing,
            &[
                "mesh",
                "height_km",
                "radius_degrees",
                "minimum_magnitude",
                "phases",
                "stations",
                "prediction_services"
            ]
        );
        assert!(err.to_string().contains("not fully configured"));
    }

    #[test]
    fn empty_station_list_counts_as_missing() {
        let err = make_builder(1).stations(Vec::new()).build().err().unwrap();
        assert!(matches!(err, PopulationError::NotConfigured { missing } if missing == ["stations"]));
    }

    #[test]
    fn non_positive_radius_is_rejected() {
        let err = make_builder(1).radius_degrees(0.0).build().err().unwrap();
        assert!(matches!(err, PopulationError::InvalidParameter { name: "radius_degrees", .. }));
    }

    #[test]
    fn build_does_not_touch_the_mesh() {
        let populator = make_builder(1)
            .mesh(MeshSource::Resource(PathBuf::from("/nonexistent/grid.tess")))
            .build();
        assert!(populator.is_ok());
    }

    #[test]
    fn from_config_fills_everything_but_stations_and_services() {
        let config = PopulatorConfig::default();
        let builder = ModelPopulatorBuilder::from_config(&config);
        assert_eq!(builder.missing_parameter_names(), vec!["stations", "prediction_services"]);
    }

    // -----------------------------------------------------------------------
    // Running
    // -----------------------------------------------------------------------

    #[test]
    fn single_worker_populates_every_slot() {
        let mut populator = make_builder(1).build().unwrap();
        let model = populator.call().unwrap();
        assert_eq!(model.vertex_count(), 12);
        assert_eq!(model.layer_count(), 1);
        for v in 0..model.vertex_count() {
            assert!(model.grid_node_data(v, 0).is_some(), "vertex {v} has no payload");
        }
        assert!(model.grid_nodes().count() > 0);
    }

    #[test]
    fn model_wrapping_errors_surface_as_population_errors() {
        let err = PopulationError::from(GridModelError::IndexNotInitialized);
        assert!(matches!(err, PopulationError::Model(GridModelError::IndexNotInitialized)));
        assert!(err.to_string().starts_with("grid model error"));
    }

    #[test]
    fn more_services_than_vertices_is_capped() {
        let mut populator = make_builder(20).build().unwrap();
        assert_eq!(populator.worker_count(), 20);
        assert!(populator.call().is_ok());
    }

    #[test]
    fn missing_resource_is_a_mesh_error() {
        let mut populator = make_builder(1)
            .mesh(MeshSource::Resource(PathBuf::from("/nonexistent/grid.tess")))
            .build()
            .unwrap();
        assert!(matches!(populator.call(), Err(PopulationError::Mesh(_))));
    }

    #[test]
    fn external_pool_is_used_and_left_running() {
        let pool = Arc::new(rayon::ThreadPoolBuilder::new().num_threads(2).build().unwrap());
        let mut populator = make_builder(3).thread_pool(Arc::clone(&pool)).build().unwrap();
        assert!(populator.call().is_ok());
        assert_eq!(pool.install(|| 40 + 2), 42);
    }
}
