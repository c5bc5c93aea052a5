use std::path::PathBuf;

use thiserror::Error;

/// Errors from building, loading, training, or driving a network.
#[derive(Debug, Error)]
pub enum Error {
    #[error("malformed vocabulary: {0}")]
    Configuration(#[from] ConfigurationError),

    #[error("failed to load model: {0}")]
    Load(#[from] LoadError),

    #[error("song source: {0}")]
    Source(#[from] SourceError),

    #[error("invalid model config: {0}")]
    Config(#[from] melodyconf::ConfigError),

    #[error("{what}: expected width {expected}, got {actual}")]
    ShapeMismatch {
        what: &'static str,
        expected: usize,
        actual: usize,
    },

    /// A normalization denominator was zero or not finite. Valid vocabularies
    /// and configs never produce this.
    #[error("degenerate normalization in {what} (sum = {sum})")]
    DegenerateNormalization { what: String, sum: f32 },

    #[error("I/O error writing {path}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },
}

/// The chord-to-note table cannot produce a complete fixed-weight matrix.
#[derive(Debug, Error)]
pub enum ConfigurationError {
    #[error("chord table has no entry for {chord}")]
    MissingChord { chord: String },

    #[error("chord table entry for {chord} has no notes")]
    EmptyChord { chord: String },

    #[error("chord {chord} lists unrecognized note {note:?}")]
    UnknownNote { chord: String, note: String },

    #[error("chord table has {actual} entries, expected {expected}")]
    VocabularySize { expected: usize, actual: usize },
}

/// A serialized network could not be turned back into a usable model.
#[derive(Debug, Error)]
pub enum LoadError {
    #[error("reading {path}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("parsing {path}: {message}")]
    Parse { path: PathBuf, message: String },

    #[error("unsupported model format version {found} (expected {expected})")]
    Version { found: u32, expected: u32 },

    #[error("unsupported compute device {0:?}")]
    UnsupportedDevice(String),

    #[error("tensor {tensor} has shape {actual:?}, expected {expected:?}")]
    Shape {
        tensor: &'static str,
        expected: Vec<usize>,
        actual: Vec<usize>,
    },

    #[error("tensor {tensor} is not a valid fixed weight: {message}")]
    Invariant {
        tensor: &'static str,
        message: String,
    },
}

/// Song symbols could not be produced.
#[derive(Debug, Error)]
pub enum SourceError {
    #[error("reading {path}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("parsing {path}: {message}")]
    Parse { path: PathBuf, message: String },

    #[error("no song at index {index} ({count} songs available)")]
    NoSuchSong { index: usize, count: usize },
}

pub type Result<T> = std::result::Result<T, Error>;
