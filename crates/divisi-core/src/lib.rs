//! Real-time primitives shared by every divisi subsystem.
//!
//! # Primary API
//!
//! - [`FadeWindow`]: Hanning ramp state machine driving gain, mute and pause fades
//! - [`RampedGain`]: click-free gain changes built on [`FadeWindow`]
//! - [`ChannelMeter`]: lock-free peak level and clip counting
//! - [`EngineConfig`]: validated engine configuration
//! - [`AudioCallback`]: the per-buffer driver boundary
//!
//! # Feature-gated APIs
//!
//! - `"device"`: [`AudioDevice`] opens CPAL streams and drives an [`AudioCallback`]
//!
//! # Example
//!
//! ```ignore
//! use divisi_core::{FadeState, FadeWindow};
//!
//! let mut fade = FadeWindow::new(441, FadeState::Up);
//! fade.set_state(FadeState::RunDown);
//! for sample in buffer.iter_mut() {
//!     *sample *= fade.value();
//! }
//! ```

pub mod error;
pub use error::{Error, Result};

mod fade;
pub use fade::{hanning_down, hanning_up, FadeState, FadeWindow};

mod gain;
pub use gain::RampedGain;

mod lockfree;
pub use lockfree::{AtomicFlag, AtomicFloat};

mod meter;
pub use meter::{amplitude_to_db, ChannelMeter, SILENCE_DB};

mod config;
pub use config::{EngineConfig, PluginThreading, TrackConfig, TrackMode};

mod callback;
pub use callback::AudioCallback;

#[cfg(feature = "device")]
mod device;
#[cfg(feature = "device")]
pub use device::{AudioDevice, DeviceConfig};

pub use std::sync::atomic::Ordering;
pub use std::sync::Arc;

pub mod prelude {
    pub use crate::{
        AudioCallback, ChannelMeter, EngineConfig, Error, FadeState, FadeWindow, RampedGain,
        Result, TrackConfig, TrackMode,
    };
}
