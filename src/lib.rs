//! # Divisi - Real-time Multichannel Playback and Mixing Engine
//!
//! Sample-accurate playback of scheduled audio segments, input capture and recording, and
//! layered plugin processing, driven one device buffer at a time.
//!
//! ## Architecture
//!
//! Divisi is an umbrella crate that coordinates:
//! - **divisi-core** - Hanning fades, ramped gains, meters, configuration, device I/O
//! - **divisi-sampler** - Segments, tracks, threaded file streaming, input recording
//! - **divisi-plugin** - Plugin layers with recursion buffers and per-plugin threads
//! - **divisi-dsp** - Partitioned convolution and overlap-add filtering
//!
//! Each driver callback runs: inputs into their ring buffers and record files, tracks into
//! their output channels (additive first, then multiplying), the plugin layers, then the
//! gain, mute, solo and pause ramps and the meters.
//!
//! ## Quick Start
//!
//! ```ignore
//! use divisi::prelude::*;
//!
//! let engine = Engine::builder()
//!     .sample_rate(48000.0)
//!     .outputs(2)
//!     .build()?;
//!
//! engine.load_file(0, "intro.wav", 0, SegmentParams::default().ramp(256))?;
//! engine.load_audio(1, samples, SegmentParams::default().loops(0))?;
//! engine.start()?;
//! ```
//!
//! ## Feature Flags
//!
//! - `device` - Render through CPAL
//! - `vst2` - Load VST2 plugins

/// Re-export of divisi-core for direct access
pub use divisi_core as core;

pub use divisi_core::{
    amplitude_to_db, hanning_down, hanning_up, AtomicFlag, AtomicFloat, AudioCallback,
    ChannelMeter, EngineConfig, FadeState, FadeWindow, PluginThreading, RampedGain, TrackConfig,
    TrackMode, SILENCE_DB,
};

#[cfg(feature = "device")]
pub use divisi_core::{AudioDevice, DeviceConfig};

// Sampler subsystem
pub use divisi_sampler as sampler;

pub use divisi_sampler::{
    AudioFileInfo, BufferedFileReader, InputChannel, LoopLayout, PlaybackSegment, RecordFile,
    RecordStatus, SegmentId, SegmentParams, StreamConfig, Track, TrackEvent, MAX_CROSSFADE_LENGTH,
};

// Plugin hosting
pub use divisi_plugin as plugin;

pub use divisi_plugin::{
    AudioPlugin, Cell, HostConfig, ParameterInfo, PluginHost, PluginId, PluginInfo, PluginInput,
    PluginLoader, PluginRouting, Vst2Loader,
};

// DSP
pub use divisi_dsp as dsp;

pub use divisi_dsp::{OlaFilter, PartitionedConvolution};

mod error;
pub use error::{Error, Result};

mod faults;
pub use faults::{FaultCounters, FaultSnapshot};

mod builder;
mod engine;
mod plugins;

pub use builder::EngineBuilder;
pub use engine::{Engine, EngineCallback};
pub use plugins::{ConvolverPlugin, SpectralFilterPlugin};

/// Convenience prelude for common imports
pub mod prelude {
    pub use crate::{
        AudioPlugin, ConvolverPlugin, Engine, EngineBuilder, EngineConfig, Error, PluginId,
        PluginInput, PluginRouting, PluginThreading, Result, SegmentParams, SpectralFilterPlugin,
        TrackConfig, TrackEvent, TrackMode,
    };
}
