//! Error types.

use std::path::PathBuf;
use thiserror::Error;

/// Error type.
#[derive(Error, Debug)]
pub enum Error {
    /// A parameter or parameter combination violates a segment, track or channel invariant.
    #[error("Invalid parameter: {0}")]
    InvalidParameter(String),

    #[error("File not found: {}", .0.display())]
    FileNotFound(PathBuf),

    #[error("Unsupported format in {}: {reason}", path.display())]
    UnsupportedFormat { path: PathBuf, reason: String },

    #[error("Sample rate mismatch in {}: file {file_rate} Hz, engine {engine_rate} Hz", path.display())]
    SampleRateMismatch {
        path: PathBuf,
        file_rate: u32,
        engine_rate: u32,
    },

    #[error("Read failed in {}: {reason}", path.display())]
    ReadFailed { path: PathBuf, reason: String },

    /// The read-ahead buffer was empty when the audio thread needed it.
    #[error("Stream buffer underrun at sample {position}")]
    Underrun { position: usize },

    #[error("Stream did not refill within {timeout_ms} ms after seek")]
    SeekTimeout { timeout_ms: u64 },

    #[error("Track already holds an endless loop; clear it before loading more data")]
    EndlessLoopActive,

    #[error("Record file cannot change while recording")]
    RecordingActive,

    #[error("Failed to spawn {0} thread")]
    ThreadSpawn(&'static str),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Hound error: {0}")]
    Hound(#[from] hound::Error),
}

/// Result type alias.
pub type Result<T> = std::result::Result<T, Error>;
