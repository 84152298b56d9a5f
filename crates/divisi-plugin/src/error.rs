//! Error types for the plugin host

use crate::PluginId;
use std::path::PathBuf;
use thiserror::Error;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoadStage {
    Routing,
    Opening,
    Instantiation,
    Configuration,
    Activation,
    Threading,
}

impl std::fmt::Display for LoadStage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            LoadStage::Routing => write!(f, "validating routing"),
            LoadStage::Opening => write!(f, "opening library"),
            LoadStage::Instantiation => write!(f, "creating instance"),
            LoadStage::Configuration => write!(f, "configuring audio"),
            LoadStage::Activation => write!(f, "activating"),
            LoadStage::Threading => write!(f, "starting worker"),
        }
    }
}

#[derive(Error, Debug)]
pub enum PluginError {
    #[error("Plugin load failed at {stage} stage: {path}\n  Reason: {reason}")]
    LoadFailed {
        path: PathBuf,
        stage: LoadStage,
        reason: String,
    },

    #[error("Invalid routing: {0}")]
    InvalidRouting(String),

    #[error("Channel {channel} of layer {layer} already feeds a plugin")]
    ChannelInUse { layer: usize, channel: usize },

    #[error("Layer {layer} already hosts the maximum of {max} threaded plugins")]
    TooManyPlugins { layer: usize, max: usize },

    #[error("Unknown plugin {0}")]
    UnknownPlugin(PluginId),

    #[error("Plugin '{plugin}' failed: {reason}")]
    Process { plugin: String, reason: String },

    #[error("Block of {frames} frames exceeds the host block size of {max}")]
    BlockTooLong { frames: usize, max: usize },

    #[error("Timeout after {duration_ms}ms: {operation}")]
    Timeout { operation: String, duration_ms: u64 },

    #[error("Plugin worker disconnected: {0}")]
    WorkerDisconnected(String),
}

impl PluginError {
    /// Failures after which the host cannot continue processing.
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            PluginError::Timeout { .. } | PluginError::WorkerDisconnected(_)
        )
    }
}

pub type Result<T> = std::result::Result<T, PluginError>;
