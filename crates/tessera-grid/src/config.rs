//! YAML configuration for a population job.
//!
//! A minimal file only needs the fields that differ from the defaults:
//!
//! ```yaml
//! mesh:
//!   subdivisions: 4
//! grid:
//!   radius_degrees: 1.5
//! phases: [P, Pn, S]
//! ```

use std::path::{Path, PathBuf};

use serde::Deserialize;
use tessera_mesh::Layer;
use tessera_predict::{AK135, VEITH_CLAWSON_72};
use tessera_types::PhaseType;

/// Errors that can occur when loading configuration.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// Failed to read the configuration file from disk.
    #[error("failed to read config file: {source}")]
    Io {
        /// The underlying I/O error.
        #[from]
        source: std::io::Error,
    },

    /// Failed to parse YAML content.
    #[error("failed to parse config YAML: {source}")]
    Yaml {
        /// The underlying YAML parse error.
        source: serde_yml::Error,
    },
}

impl From<serde_yml::Error> for ConfigError {
    fn from(source: serde_yml::Error) -> Self {
        Self::Yaml { source }
    }
}

/// Top-level population configuration.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct PopulatorConfig {
    /// Which mesh to populate.
    #[serde(default)]
    pub mesh: MeshConfig,

    /// Grid cell geometry and detection threshold.
    #[serde(default)]
    pub grid: GridConfig,

    /// Earth models handed to the prediction service.
    #[serde(default)]
    pub models: ModelsConfig,

    /// Phases predicted for every station.
    #[serde(default = "default_phases")]
    pub phases: Vec<PhaseType>,

    /// Worker count. `0` means one per available CPU.
    #[serde(default)]
    pub workers: usize,
}

impl Default for PopulatorConfig {
    fn default() -> Self {
        Self {
            mesh: MeshConfig::default(),
            grid: GridConfig::default(),
            models: ModelsConfig::default(),
            phases: default_phases(),
            workers: 0,
        }
    }
}

impl PopulatorConfig {
    /// Load configuration from a YAML file.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Io`] if the file cannot be read, or
    /// [`ConfigError::Yaml`] if the content is not valid YAML.
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let contents = std::fs::read_to_string(path)?;
        let config: Self = serde_yml::from_str(&contents)?;
        Ok(config)
    }

    /// Parse configuration from a YAML string.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Yaml`] if the string is not valid YAML.
    pub fn parse(yaml: &str) -> Result<Self, ConfigError> {
        let config: Self = serde_yml::from_str(yaml)?;
        Ok(config)
    }

    /// Resolved worker count: the configured value, or the machine's
    /// available parallelism when it is `0`.
    pub fn effective_workers(&self) -> usize {
        if self.workers > 0 {
            return self.workers;
        }
        std::thread::available_parallelism().map_or(1, std::num::NonZeroUsize::get)
    }
}

/// Mesh selection.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct MeshConfig {
    /// Grid file to load. When unset, an icosahedral grid is generated.
    #[serde(default)]
    pub path: Option<PathBuf>,

    /// Subdivision depth of the generated icosahedral grid.
    #[serde(default = "default_subdivisions")]
    pub subdivisions: u32,

    /// Description written into the model file.
    #[serde(default = "default_description")]
    pub description: String,
}

impl Default for MeshConfig {
    fn default() -> Self {
        Self {
            path: None,
            subdivisions: default_subdivisions(),
            description: default_description(),
        }
    }
}

/// Grid cell geometry.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct GridConfig {
    /// Cylinder height, km.
    #[serde(default = "default_height_km")]
    pub height_km: f64,

    /// Cylinder radius, degrees.
    #[serde(default = "default_radius_degrees")]
    pub radius_degrees: f64,

    /// Smallest magnitude the grid should detect.
    #[serde(default = "default_minimum_magnitude")]
    pub minimum_magnitude: f64,

    /// Depth layers, shallowest first.
    #[serde(default = "default_layers")]
    pub layers: Vec<LayerConfig>,
}

impl Default for GridConfig {
    fn default() -> Self {
        Self {
            height_km: default_height_km(),
            radius_degrees: default_radius_degrees(),
            minimum_magnitude: default_minimum_magnitude(),
            layers: default_layers(),
        }
    }
}

/// One depth layer.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct LayerConfig {
    /// Layer name.
    pub name: String,
    /// Depth of the layer center, km.
    pub depth_km: f64,
}

impl From<&LayerConfig> for Layer {
    fn from(config: &LayerConfig) -> Self {
        Self::new(config.name.clone(), config.depth_km)
    }
}

/// Earth model names.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct ModelsConfig {
    /// Travel-time and slowness model.
    #[serde(default = "default_travel_time_model")]
    pub travel_time: String,

    /// Magnitude attenuation model.
    #[serde(default = "default_magnitude_model")]
    pub magnitude: String,
}

impl Default for ModelsConfig {
    fn default() -> Self {
        Self {
            travel_time: default_travel_time_model(),
            magnitude: default_magnitude_model(),
        }
    }
}

fn default_phases() -> Vec<PhaseType> {
    vec![PhaseType::P]
}

const fn default_subdivisions() -> u32 {
    3
}

fn default_description() -> String {
    String::from("tessera global association grid")
}

const fn default_height_km() -> f64 {
    100.0
}

const fn default_radius_degrees() -> f64 {
    2.0
}

const fn default_minimum_magnitude() -> f64 {
    3.5
}

fn default_layers() -> Vec<LayerConfig> {
    vec![LayerConfig {
        name: String::from("CRUST"),
        depth_km: 50.0,
    }]
}

fn default_travel_time_model() -> String {
    AK135.to_owned()
}

fn default_magnitude_model() -> String {
    VEITH_CLAWSON_72.to_owned()
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used)]

    use super::*;

    #[test]
    fn empty_yaml_gives_defaults() {
        let config = PopulatorConfig::parse("").ok().unwrap_or_default();
        assert_eq!(config.mesh.subdivisions, 3);
        assert!(config.mesh.path.is_none());
        assert!((config.grid.height_km - 100.0).abs() < f64::EPSILON);
        assert!((config.grid.radius_degrees - 2.0).abs() < f64::EPSILON);
        assert_eq!(config.grid.layers.len(), 1);
        assert_eq!(config.phases, vec![PhaseType::P]);
        assert_eq!(config.models.travel_time, AK135);
        assert_eq!(config.models.magnitude, VEITH_CLAWSON_72);
    }

    #[test]
    fn partial_yaml_overrides_only_named_fields() {
        let yaml = "grid:\n  radius_degrees: 1.5\nphases: [P, Pn, S]\nworkers: 3\n";
        let config = PopulatorConfig::parse(yaml).unwrap();
        assert!((config.grid.radius_degrees - 1.5).abs() < f64::EPSILON);
        assert!((config.grid.minimum_magnitude - 3.5).abs() < f64::EPSILON);
        assert_eq!(config.phases, vec![PhaseType::P, PhaseType::Pn, PhaseType::S]);
        assert_eq!(config.effective_workers(), 3);
    }

    #[test]
    fn layers_and_mesh_path_parse() {
        let yaml = r"
mesh:
  path: /data/grids/global.tess
grid:
  layers:
    - name: CRUST
      depth_km: 10.0
    - name: MANTLE
      depth_km: 300.0
";
        let config = PopulatorConfig::parse(yaml).unwrap();
        assert_eq!(config.mesh.path, Some(PathBuf::from("/data/grids/global.tess")));
        let layers: Vec<Layer> = config.grid.layers.iter().map(Layer::from).collect();
        assert_eq!(layers.get(1).map(|l| l.name.as_str()), Some("MANTLE"));
    }

    #[test]
    fn unknown_phase_is_a_yaml_error() {
        let result = PopulatorConfig::parse("phases: [Q]\n");
        assert!(matches!(result, Err(ConfigError::Yaml { .. })));
    }

    #[test]
    fn zero_workers_means_available_parallelism() {
        assert!(PopulatorConfig::default().effective_workers() >= 1);
    }

    #[test]
    fn missing_file_is_io_error() {
        let result = PopulatorConfig::from_file(Path::new("/nonexistent/populator.yaml"));
        assert!(matches!(result, Err(ConfigError::Io { .. })));
    }
}
