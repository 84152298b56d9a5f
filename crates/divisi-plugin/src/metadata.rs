//! Plugin and parameter descriptions.

use serde::{Deserialize, Serialize};

/// Static description of a loaded plugin.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct PluginInfo {
    pub id: String,
    pub name: String,
    pub vendor: String,
    pub version: String,
    /// Audio inputs the plugin declares.
    pub inputs: usize,
    /// Audio outputs the plugin declares.
    pub outputs: usize,
    pub parameters: usize,
    pub programs: usize,
}

impl PluginInfo {
    pub fn new(id: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            version: "1.0.0".to_string(),
            inputs: 1,
            outputs: 1,
            ..Default::default()
        }
    }

    pub fn vendor(mut self, vendor: impl Into<String>) -> Self {
        self.vendor = vendor.into();
        self
    }

    pub fn version(mut self, version: impl Into<String>) -> Self {
        self.version = version.into();
        self
    }

    pub fn audio_io(mut self, inputs: usize, outputs: usize) -> Self {
        self.inputs = inputs;
        self.outputs = outputs;
        self
    }

    pub fn parameters(mut self, count: usize) -> Self {
        self.parameters = count;
        self
    }

    pub fn programs(mut self, count: usize) -> Self {
        self.programs = count;
        self
    }
}

/// Snapshot of one parameter.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ParameterInfo {
    pub index: usize,
    pub name: String,
    /// Normalized 0..1.
    pub value: f32,
    /// Value as the plugin formats it.
    pub display: String,
}
