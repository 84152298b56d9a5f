//! Engine configuration.

use crate::{Error, Result};
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// How a track's buffer is combined into its destination channel.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum TrackMode {
    /// Summed into the channel. Gaps render as silence.
    #[default]
    Add,
    /// Multiplied into the channel after all additive tracks. Gaps render as unity.
    Multiply,
}

/// How plugins inside one layer are executed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum PluginThreading {
    /// Sequentially on the audio thread.
    #[default]
    Single,
    /// One worker thread per plugin, joined per layer.
    PerPlugin,
}

/// One logical playback track.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TrackConfig {
    /// Destination output channel.
    pub channel: usize,
    pub mode: TrackMode,
    pub name: Option<String>,
}

impl TrackConfig {
    pub fn new(channel: usize) -> Self {
        Self {
            channel,
            ..Default::default()
        }
    }

    pub fn multiply(mut self) -> Self {
        self.mode = TrackMode::Multiply;
        self
    }

    pub fn named(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }
}

/// Configuration for the audio engine.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EngineConfig {
    pub sample_rate: f64,
    /// Frames per device callback.
    pub buffer_size: usize,
    pub output_channels: usize,
    pub input_channels: usize,
    pub tracks: Vec<TrackConfig>,
    /// Capacity of each input channel's ring buffer, in samples.
    pub input_buffer_len: usize,
    /// Frames per read-ahead half of a streaming file reader.
    pub file_buffer_size: usize,
    /// Gain, mute, solo and pause ramp length in samples.
    pub fade_length: u32,
    pub plugin_layers: usize,
    pub plugin_threading: PluginThreading,
    /// How long a threaded plugin layer may take before the engine halts.
    pub plugin_join_timeout: Duration,
    /// Realtime faults tolerated before the engine enters its fatal state.
    pub fault_threshold: u32,
    /// Reclaim finished segments before each load.
    pub auto_cleanup: bool,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            sample_rate: 44100.0,
            buffer_size: 512,
            output_channels: 2,
            input_channels: 0,
            tracks: vec![TrackConfig::new(0), TrackConfig::new(1)],
            input_buffer_len: 44100,
            file_buffer_size: 32768,
            fade_length: 441,
            plugin_layers: 1,
            plugin_threading: PluginThreading::Single,
            plugin_join_timeout: Duration::from_secs(10),
            fault_threshold: 16,
            auto_cleanup: true,
        }
    }
}

impl EngineConfig {
    /// One additive track per output channel.
    pub fn one_track_per_channel(mut self) -> Self {
        self.tracks = (0..self.output_channels).map(TrackConfig::new).collect();
        self
    }

    pub fn validate(&self) -> Result<()> {
        if self.sample_rate < 8000.0 || self.sample_rate > 384000.0 {
            return Err(Error::InvalidConfig(format!(
                "sample_rate {} out of range (8000-384000 Hz)",
                self.sample_rate
            )));
        }
        if !(16..=16384).contains(&self.buffer_size) {
            return Err(Error::InvalidConfig(format!(
                "buffer_size {} out of range (16-16384)",
                self.buffer_size
            )));
        }
        if self.output_channels == 0 {
            return Err(Error::InvalidConfig(
                "at least one output channel is required".into(),
            ));
        }
        if let Some((index, track)) = self
            .tracks
            .iter()
            .enumerate()
            .find(|(_, t)| t.channel >= self.output_channels)
        {
            return Err(Error::InvalidConfig(format!(
                "track {index} targets channel {} but only {} output channels exist",
                track.channel, self.output_channels
            )));
        }
        if self.input_channels > 0 && self.input_buffer_len < self.buffer_size {
            return Err(Error::InvalidConfig(format!(
                "input_buffer_len {} smaller than buffer_size {}",
                self.input_buffer_len, self.buffer_size
            )));
        }
        if self.file_buffer_size < self.buffer_size {
            return Err(Error::InvalidConfig(format!(
                "file_buffer_size {} smaller than buffer_size {}",
                self.file_buffer_size, self.buffer_size
            )));
        }
        if self.plugin_join_timeout.is_zero() {
            return Err(Error::InvalidConfig("plugin_join_timeout must be positive".into()));
        }
        if self.fault_threshold == 0 {
            return Err(Error::InvalidConfig("fault_threshold must be at least 1".into()));
        }
        Ok(())
    }
}
