//! Host configuration.

use divisi_core::PluginThreading;
use std::time::Duration;

/// Maximum real plugins per layer when each runs on its own thread.
pub const MAX_PLUGINS_PER_LAYER: usize = 64;

/// Dimensions and execution mode of a [`PluginHost`](crate::PluginHost).
#[derive(Debug, Clone)]
pub struct HostConfig {
    pub layers: usize,
    pub channels: usize,
    /// Largest block passed to `process`.
    pub block_size: usize,
    pub sample_rate: f64,
    pub threading: PluginThreading,
    /// How long a layer waits for its plugin threads (default: 10s).
    pub join_timeout: Duration,
    pub max_plugins_per_layer: usize,
}

impl Default for HostConfig {
    fn default() -> Self {
        Self {
            layers: 1,
            channels: 2,
            block_size: 512,
            sample_rate: 44100.0,
            threading: PluginThreading::Single,
            join_timeout: Duration::from_secs(10),
            max_plugins_per_layer: MAX_PLUGINS_PER_LAYER,
        }
    }
}

impl HostConfig {
    pub fn new(layers: usize, channels: usize, block_size: usize, sample_rate: f64) -> Self {
        Self {
            layers,
            channels,
            block_size,
            sample_rate,
            ..Default::default()
        }
    }

    pub fn threading(mut self, threading: PluginThreading) -> Self {
        self.threading = threading;
        self
    }

    pub fn join_timeout(mut self, timeout: Duration) -> Self {
        self.join_timeout = timeout;
        self
    }
}
