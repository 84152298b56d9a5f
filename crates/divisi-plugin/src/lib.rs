//! Layered plugin hosting for divisi
//!
//! A [`PluginHost`] arranges plugins in a `layers × channels` matrix. Layers run in order;
//! every plugin of a layer reads the same snapshot of the channel buffers plus the recursion
//! buffers, and the outputs of a layer are summed before the next one runs.
//!
//! Plugins implement [`AudioPlugin`]. Native libraries are opened through a
//! [`PluginLoader`]; [`Vst2Loader`] covers VST2 when the `vst2` feature is enabled.
//!
//! ## Usage
//!
//! ```ignore
//! use divisi_plugin::{HostConfig, PluginHost, PluginRouting, Vst2Loader};
//!
//! let mut host = PluginHost::new(HostConfig::new(2, 8, 512, 48000.0));
//! host.set_loader(Arc::new(Vst2Loader));
//!
//! // channel 0 in, channels 0 and 1 out, first layer
//! let id = host.load_plugin("/plugins/reverb.so", PluginRouting::new(
//!     vec![PluginInput::Channel(0)],
//!     vec![0, 1],
//! ), 0)?;
//!
//! host.process(&mut buffers)?;
//! ```

pub mod error;
pub use error::{LoadStage, PluginError, Result};

mod config;
pub use config::{HostConfig, MAX_PLUGINS_PER_LAYER};

mod metadata;
pub use metadata::{ParameterInfo, PluginInfo};

mod plugin;
pub use plugin::{AudioPlugin, PluginLoader};

mod routing;
pub use routing::{PluginInput, PluginRouting};

mod worker;

mod host;
pub use host::{Cell, PluginHost, PluginId};

mod vst2;
pub use vst2::{ParameterChange, Vst2Loader, Vst2Plugin, MAX_VST_CHANNELS};
