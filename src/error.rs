//! Centralized error type for the divisi umbrella crate.
//!
//! Wraps all subsystem errors so `?` propagates naturally across crate boundaries.

use thiserror::Error;

#[derive(Error, Debug)]
pub enum Error {
    #[error(transparent)]
    Core(#[from] divisi_core::Error),

    #[error("Sampler: {0}")]
    Sampler(#[from] divisi_sampler::Error),

    #[error("Plugin: {0}")]
    Plugin(#[from] divisi_plugin::PluginError),

    #[error("DSP: {0}")]
    Dsp(#[from] divisi_dsp::Error),

    #[error("Invalid channel {index} ({count} available)")]
    InvalidChannel { index: usize, count: usize },

    #[error("Invalid track {index} ({count} available)")]
    InvalidTrack { index: usize, count: usize },

    /// The engine stopped after a realtime fault and must be reset.
    #[error("Engine halted: {0}")]
    Fatal(String),

    #[error("Engine is not running")]
    NotRunning,

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, Error>;
