//! Channel routing of a hosted plugin.

use crate::{PluginError, Result};

/// Where a plugin input reads from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PluginInput {
    /// A channel of the layer's input snapshot. Claims the channel in that layer.
    Channel(usize),
    /// A recursion buffer: the accumulated output of `channel` after `layer` ran in the
    /// previous cycle, or in this cycle for earlier layers. `None` means the plugin's own
    /// layer.
    Recursion { layer: Option<usize>, channel: usize },
}

/// Inputs and outputs of one plugin.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PluginRouting {
    pub inputs: Vec<PluginInput>,
    pub outputs: Vec<usize>,
}

impl PluginRouting {
    pub fn new(inputs: Vec<PluginInput>, outputs: Vec<usize>) -> Self {
        Self { inputs, outputs }
    }

    /// Same channels in and out.
    pub fn channels(channels: &[usize]) -> Self {
        Self {
            inputs: channels.iter().map(|&c| PluginInput::Channel(c)).collect(),
            outputs: channels.to_vec(),
        }
    }

    /// Build from index lists: negative inputs take the next `(layer, channel)` recursion
    /// descriptor in order, a recursion layer of `-1` naming the plugin's own layer.
    pub fn from_raw(inputs: &[i32], outputs: &[usize], recursions: &[(i32, usize)]) -> Result<Self> {
        let mut pending = recursions.iter();
        let mut resolved = Vec::with_capacity(inputs.len());
        for &input in inputs {
            if input >= 0 {
                resolved.push(PluginInput::Channel(input as usize));
                continue;
            }
            let &(layer, channel) = pending.next().ok_or_else(|| {
                PluginError::InvalidRouting(format!(
                    "{} recursive inputs but only {} recursion descriptors",
                    inputs.iter().filter(|&&i| i < 0).count(),
                    recursions.len()
                ))
            })?;
            let layer = match layer {
                -1 => None,
                l if l >= 0 => Some(l as usize),
                l => {
                    return Err(PluginError::InvalidRouting(format!(
                        "recursion layer {l} out of range"
                    )))
                }
            };
            resolved.push(PluginInput::Recursion { layer, channel });
        }
        Ok(Self {
            inputs: resolved,
            outputs: outputs.to_vec(),
        })
    }

    /// Channels claimed as direct inputs.
    pub fn input_channels(&self) -> impl Iterator<Item = usize> + '_ {
        self.inputs.iter().filter_map(|input| match input {
            PluginInput::Channel(c) => Some(*c),
            PluginInput::Recursion { .. } => None,
        })
    }

    /// Check indices against the host dimensions and resolve own-layer recursions.
    pub(crate) fn resolve(&self, layer: usize, layers: usize, channels: usize) -> Result<Self> {
        let mut inputs = Vec::with_capacity(self.inputs.len());
        for input in &self.inputs {
            inputs.push(match *input {
                PluginInput::Channel(c) if c >= channels => {
                    return Err(PluginError::InvalidRouting(format!(
                        "input channel {c} out of range ({channels} channels)"
                    )))
                }
                PluginInput::Channel(c) => PluginInput::Channel(c),
                PluginInput::Recursion { layer: l, channel } => {
                    let l = l.unwrap_or(layer);
                    if l >= layers {
                        return Err(PluginError::InvalidRouting(format!(
                            "recursion layer {l} out of range ({layers} layers)"
                        )));
                    }
                    if channel >= channels {
                        return Err(PluginError::InvalidRouting(format!(
                            "recursion channel {channel} out of range ({channels} channels)"
                        )));
                    }
                    PluginInput::Recursion {
                        layer: Some(l),
                        channel,
                    }
                }
            });
        }
        if let Some(&c) = self.outputs.iter().find(|&&c| c >= channels) {
            return Err(PluginError::InvalidRouting(format!(
                "output channel {c} out of range ({channels} channels)"
            )));
        }
        let mut claimed: Vec<usize> = self.input_channels().collect();
        claimed.sort_unstable();
        if claimed.windows(2).any(|w| w[0] == w[1]) {
            return Err(PluginError::InvalidRouting(
                "input channel listed twice".into(),
            ));
        }
        Ok(Self {
            inputs,
            outputs: self.outputs.clone(),
        })
    }
}
