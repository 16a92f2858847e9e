//! `tessera`: populate a global association grid, then associate detection
//! batches against it.
//!
//! ```text
//! tessera populate  --config populator.yaml --stations stations.json --output grid.tess
//! tessera associate --model grid.tess --stations stations.json \
//!                   --detections batch.json [--definition definition.json]
//! ```
//!
//! `associate` prints one JSON event hypothesis per line on stdout. Logging
//! goes to stderr and is controlled by `RUST_LOG` (default `info`).

mod error;
mod input;

use std::path::{Path, PathBuf};

use anyhow::Context;
use clap::{Parser, Subcommand};
use tessera_assoc::{AssociatorDefinition, associate};
use tessera_grid::{ModelPopulatorBuilder, PopulatedGridModel, PopulatorConfig};
use tessera_predict::{AnalyticPredictor, PredictionService};
use tessera_types::{Detection, Station};
use tracing::info;
use tracing_subscriber::EnvFilter;

#[derive(Debug, Parser)]
#[command(name = "tessera", version, about = "Global-grid seismic association")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Compute grid node predictions for every vertex and layer of a mesh.
    Populate {
        /// Populator YAML. Defaults apply when omitted.
        #[arg(long, env = "TESSERA_CONFIG")]
        config: Option<PathBuf>,

        /// JSON array of stations.
        #[arg(long)]
        stations: PathBuf,

        /// Model file to write; `.txt` or `.ascii` selects the text format.
        #[arg(long)]
        output: PathBuf,

        /// Worker count, overriding the config file.
        #[arg(long)]
        workers: Option<usize>,
    },

    /// Associate one detection batch against a populated model.
    Associate {
        /// Model file written by `populate`.
        #[arg(long, env = "TESSERA_MODEL")]
        model: PathBuf,

        /// JSON array of stations the detections refer to.
        #[arg(long)]
        stations: PathBuf,

        /// JSON array of detections.
        #[arg(long)]
        detections: PathBuf,

        /// Associator definition JSON. Defaults apply when omitted.
        #[arg(long)]
        definition: Option<PathBuf>,
    },
}

fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with_target(true)
        .with_writer(std::io::stderr)
        .init();

    match Cli::parse().command {
        Command::Populate {
            config,
            stations,
            output,
            workers,
        } => populate(config.as_deref(), &stations, &output, workers),
        Command::Associate {
            model,
            stations,
            detections,
            definition,
        } => run_association(&model, &stations, &detections, definition.as_deref()),
    }
}

fn populate(
    config_path: Option<&Path>,
    stations_path: &Path,
    output: &Path,
    workers: Option<usize>,
) -> anyhow::Result<()> {
    let config = match config_path {
        Some(path) => PopulatorConfig::from_file(path).with_context(|| format!("loading {}", path.display()))?,
        None => PopulatorConfig::default(),
    };
    let stations: Vec<Station> = input::read_json_list(stations_path, "stations")?;
    let workers = workers.filter(|&n| n > 0).unwrap_or_else(|| config.effective_workers());
    info!(
        stations = stations.len(),
        workers,
        phases = ?config.phases,
        "Configuration loaded"
    );

    let services = (0..workers).map(|_| Box::new(AnalyticPredictor::new()) as Box<dyn PredictionService>);
    let model = ModelPopulatorBuilder::from_config(&config)
        .stations(stations)
        .prediction_services(services)
        .build()?
        .call()?;
    model
        .save(output)
        .with_context(|| format!("writing {}", output.display()))?;
    info!(path = %output.display(), "Model written");
    Ok(())
}

fn run_association(
    model_path: &Path,
    stations_path: &Path,
    detections_path: &Path,
    definition_path: Option<&Path>,
) -> anyhow::Result<()> {
    let definition = match definition_path {
        Some(path) => {
            let contents =
                std::fs::read_to_string(path).with_context(|| format!("reading {}", path.display()))?;
            serde_json::from_str::<AssociatorDefinition>(&contents)
                .with_context(|| format!("parsing {}", path.display()))?
        }
        None => AssociatorDefinition::default(),
    };
    let stations: Vec<Station> = input::read_json_list(stations_path, "stations")?;
    let detections: Vec<Detection> = input::read_json_list(detections_path, "detections")?;
    let batch = input::pair_with_stations(detections, &stations)?;

    let mut model = PopulatedGridModel::load(model_path)
        .with_context(|| format!("loading {}", model_path.display()))?;
    let hypotheses = associate(&mut model, &batch, &definition)?;

    let mut out = std::io::stdout().lock();
    for hypothesis in &hypotheses {
        serde_json::to_writer(&mut out, hypothesis)?;
        std::io::Write::write_all(&mut out, b"\n")?;
    }
    info!(hypotheses = hypotheses.len(), "Association finished");
    Ok(())
}
