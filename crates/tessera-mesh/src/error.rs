//! Error types for the `tessera-mesh` crate.

/// Errors raised by mesh construction, payload access and model I/O.
#[derive(Debug, thiserror::Error)]
pub enum MeshError {
    /// Wrapper for standard I/O errors.
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    /// The stream does not start with the expected magic bytes.
    #[error("bad magic: not a {expected} stream")]
    BadMagic {
        /// What kind of stream was expected.
        expected: &'static str,
    },

    /// The stream was written by an unsupported format version.
    #[error("unsupported {what} format version {found} (supported: {supported})")]
    UnsupportedVersion {
        /// Which format.
        what: &'static str,
        /// Version found in the stream.
        found: u32,
        /// Version this build reads.
        supported: u32,
    },

    /// Structurally invalid binary content.
    #[error("malformed data: {0}")]
    Format(String),

    /// Structurally invalid text content.
    #[error("parse error at line {line}: {message}")]
    Parse {
        /// One-based line number.
        line: usize,
        /// What was wrong.
        message: String,
    },

    /// A payload type name has no registered reader.
    #[error("custom data type '{0}' is not registered")]
    UnregisteredDataType(String),

    /// A payload of the wrong type was stored in a model.
    #[error("model holds '{expected}' payloads, got '{found}'")]
    DataTypeMismatch {
        /// The model's declared payload type.
        expected: String,
        /// The payload's type.
        found: String,
    },

    /// Vertex or layer index outside the model.
    #[error("slot ({vertex}, {layer}) is outside the model")]
    IndexOutOfRange {
        /// Requested vertex.
        vertex: usize,
        /// Requested layer.
        layer: usize,
    },

    /// Invalid tessellation parameters or topology.
    #[error("invalid tessellation: {0}")]
    InvalidTessellation(String),

    /// A model file's grid does not hash to its recorded grid id.
    #[error("grid id mismatch: header says {expected}, vertices hash to {found}")]
    GridIdMismatch {
        /// Id recorded in the file.
        expected: String,
        /// Id computed from the loaded grid.
        found: String,
    },
}
