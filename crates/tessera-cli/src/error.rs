//! Error types for the `tessera` command-line tool.

use std::path::PathBuf;

use tessera_types::{DetectionId, StationId};

/// Input problems the CLI reports before any domain crate is called.
#[derive(Debug, thiserror::Error)]
pub enum CliError {
    /// A detection refers to a station missing from the station list.
    #[error("detection {detection} was recorded at unknown station {station}")]
    UnknownStation {
        /// The detection.
        detection: DetectionId,
        /// Its station id.
        station: StationId,
    },

    /// An input file holds no records.
    #[error("{path} contains no {what}")]
    EmptyInput {
        /// The file.
        path: PathBuf,
        /// What was expected, e.g. `stations`.
        what: &'static str,
    },
}
