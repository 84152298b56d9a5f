//! Adapter trait for hosted processors.

use crate::metadata::{ParameterInfo, PluginInfo};
use crate::Result;
use std::path::Path;

/// A processor the host can run inside a layer.
///
/// Buffers are one vector per channel. `inputs` follow the plugin's routing inputs in order,
/// `outputs` its routing outputs; all have the block length passed to the current `process`
/// call, never longer than the block size given to [`configure`](Self::configure).
pub trait AudioPlugin: Send {
    fn info(&self) -> &PluginInfo;

    /// Set sample rate and maximum block size. Called before [`start`](Self::start).
    fn configure(&mut self, sample_rate: f64, block_size: usize) -> Result<()>;

    fn start(&mut self) -> Result<()> {
        Ok(())
    }

    /// Render one block. Outputs arrive zeroed.
    fn process(&mut self, inputs: &[Vec<f32>], outputs: &mut [Vec<f32>]) -> Result<()>;

    fn stop(&mut self) {}

    /// Release native resources. No call follows.
    fn close(&mut self) {}

    fn parameter_count(&self) -> usize {
        0
    }

    /// Normalized 0..1.
    fn parameter(&mut self, _index: usize) -> f32 {
        0.0
    }

    /// Normalized 0..1.
    fn set_parameter(&mut self, _index: usize, _value: f32) {}

    fn parameter_name(&mut self, _index: usize) -> String {
        String::new()
    }

    fn parameter_display(&mut self, index: usize) -> String {
        format!("{:.3}", self.parameter(index))
    }

    fn program_names(&mut self) -> Vec<String> {
        Vec::new()
    }

    fn program(&mut self) -> usize {
        0
    }

    fn set_program(&mut self, _index: usize) -> Result<()> {
        Ok(())
    }

    fn parameter_list(&mut self) -> Vec<ParameterInfo> {
        (0..self.parameter_count())
            .map(|index| ParameterInfo {
                index,
                name: self.parameter_name(index),
                value: self.parameter(index),
                display: self.parameter_display(index),
            })
            .collect()
    }
}

/// Opens plugins from a path, e.g. a native shared library.
pub trait PluginLoader: Send + Sync {
    fn open(&self, path: &Path) -> Result<Box<dyn AudioPlugin>>;
}
