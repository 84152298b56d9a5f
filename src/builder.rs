//! Builder for configuring and constructing an `Engine`.

use crate::{Engine, Result};
use divisi_core::{EngineConfig, PluginThreading, TrackConfig};
use divisi_plugin::PluginLoader;
use std::sync::Arc;
use std::time::Duration;

/// Without explicit tracks, one additive track per output channel is created.
///
/// # Example
///
/// ```ignore
/// use divisi::prelude::*;
///
/// let engine = Engine::builder()
///     .sample_rate(48000.0)
///     .outputs(4)
///     .inputs(2)
///     .track(TrackConfig::new(0).named("Music"))
///     .track(TrackConfig::new(0).multiply().named("Envelope"))
///     .plugin_layers(2)
///     .build()?;
/// ```
pub struct EngineBuilder {
    config: EngineConfig,
    tracks: Option<Vec<TrackConfig>>,
    loader: Option<Arc<dyn PluginLoader>>,

    #[cfg(feature = "device")]
    device: Option<divisi_core::DeviceConfig>,
}

impl Default for EngineBuilder {
    fn default() -> Self {
        Self {
            config: EngineConfig::default(),
            tracks: None,
            loader: None,

            #[cfg(feature = "device")]
            device: None,
        }
    }
}

impl EngineBuilder {
    /// Start from a complete configuration, e.g. one deserialized from disk.
    pub fn from_config(config: EngineConfig) -> Self {
        Self {
            tracks: Some(config.tracks.clone()),
            config,
            ..Default::default()
        }
    }

    /// Default: 44100
    pub fn sample_rate(mut self, sample_rate: f64) -> Self {
        self.config.sample_rate = sample_rate;
        self
    }

    /// Frames per driver callback. Default: 512
    pub fn buffer_size(mut self, frames: usize) -> Self {
        self.config.buffer_size = frames;
        self
    }

    /// Default: 2
    pub fn outputs(mut self, count: usize) -> Self {
        self.config.output_channels = count;
        self
    }

    /// Default: 0
    pub fn inputs(mut self, count: usize) -> Self {
        self.config.input_channels = count;
        self
    }

    pub fn track(mut self, track: TrackConfig) -> Self {
        self.tracks.get_or_insert_with(Vec::new).push(track);
        self
    }

    pub fn tracks(mut self, tracks: Vec<TrackConfig>) -> Self {
        self.tracks = Some(tracks);
        self
    }

    /// Samples kept per input channel. Default: 44100
    pub fn input_buffer_len(mut self, samples: usize) -> Self {
        self.config.input_buffer_len = samples;
        self
    }

    /// Frames per read-ahead half of streamed files. Default: 32768
    pub fn file_buffer_size(mut self, frames: usize) -> Self {
        self.config.file_buffer_size = frames;
        self
    }

    /// Gain, mute, solo and pause ramp in samples. Default: 441
    pub fn fade_length(mut self, samples: u32) -> Self {
        self.config.fade_length = samples;
        self
    }

    /// Default: 1
    pub fn plugin_layers(mut self, layers: usize) -> Self {
        self.config.plugin_layers = layers;
        self
    }

    pub fn plugin_threading(mut self, threading: PluginThreading) -> Self {
        self.config.plugin_threading = threading;
        self
    }

    /// Longest a threaded plugin layer may take before the engine halts. Default: 10s
    pub fn plugin_join_timeout(mut self, timeout: Duration) -> Self {
        self.config.plugin_join_timeout = timeout;
        self
    }

    /// Used by [`Engine::load_plugin`].
    pub fn plugin_loader(mut self, loader: Arc<dyn PluginLoader>) -> Self {
        self.loader = Some(loader);
        self
    }

    /// Realtime faults tolerated before the engine halts. Default: 16
    pub fn fault_threshold(mut self, faults: u32) -> Self {
        self.config.fault_threshold = faults;
        self
    }

    /// Default: true
    pub fn auto_cleanup(mut self, enabled: bool) -> Self {
        self.config.auto_cleanup = enabled;
        self
    }

    /// Render through a CPAL device once started. `None` picks the default devices.
    #[cfg(feature = "device")]
    pub fn audio_device(mut self, output: Option<usize>, input: Option<usize>) -> Self {
        self.device = Some(divisi_core::DeviceConfig {
            output_device_index: output,
            input_device_index: input,
            ..Default::default()
        });
        self
    }

    pub fn build(self) -> Result<Engine> {
        let mut config = self.config;
        config.tracks = match self.tracks {
            Some(tracks) => tracks,
            None => (0..config.output_channels).map(TrackConfig::new).collect(),
        };

        #[cfg(feature = "device")]
        let device = self.device.map(|device| divisi_core::DeviceConfig {
            output_channels: config.output_channels,
            input_channels: config.input_channels,
            sample_rate: config.sample_rate.round() as u32,
            buffer_size: config.buffer_size,
            ..device
        });

        Engine::from_parts(
            config,
            self.loader,
            #[cfg(feature = "device")]
            device,
        )
    }
}
