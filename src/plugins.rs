//! In-process plugins built on divisi-dsp.
//!
//! Both run inside a [`PluginHost`](divisi_plugin::PluginHost) like any native plugin.
//! Output `k` processes input `k`; outputs beyond the inputs reuse the last input.

use divisi_dsp::{OlaFilter, PartitionedConvolution};
use divisi_plugin::{AudioPlugin, PluginError, PluginInfo, Result};

fn dsp_error(plugin: &PluginInfo, e: divisi_dsp::Error) -> PluginError {
    PluginError::Process {
        plugin: plugin.name.clone(),
        reason: e.to_string(),
    }
}

fn input_for(inputs: &[Vec<f32>], output: usize) -> Option<&[f32]> {
    inputs
        .get(output)
        .or_else(|| inputs.last())
        .map(Vec::as_slice)
}

/// Convolves each channel with an impulse response.
///
/// Partitions default to the host block size, which is also the latency.
///
/// Parameters: 0 `Wet`, 1 `Dry`, both linear 0..1.
pub struct ConvolverPlugin {
    info: PluginInfo,
    ir: Vec<f32>,
    channels: usize,
    partition_size: Option<usize>,
    convolvers: Vec<PartitionedConvolution>,
    wet: f32,
    dry: f32,
}

impl ConvolverPlugin {
    pub fn new(ir: Vec<f32>, channels: usize) -> crate::Result<Self> {
        if ir.is_empty() || channels == 0 {
            return Err(divisi_dsp::Error::InvalidParameter(
                "convolver needs an impulse response and at least one channel".into(),
            )
            .into());
        }
        Ok(Self {
            info: PluginInfo::new("divisi.convolver", "Convolver")
                .vendor("divisi")
                .version(env!("CARGO_PKG_VERSION"))
                .audio_io(channels, channels)
                .parameters(2),
            ir,
            channels,
            partition_size: None,
            convolvers: Vec::new(),
            wet: 1.0,
            dry: 0.0,
        })
    }

    /// Fix the partition size instead of following the block size.
    pub fn partition_size(mut self, samples: usize) -> Self {
        self.partition_size = Some(samples);
        self
    }

    /// Latency in samples once configured.
    pub fn latency(&self) -> usize {
        self.convolvers
            .first()
            .map_or(0, PartitionedConvolution::latency)
    }
}

impl AudioPlugin for ConvolverPlugin {
    fn info(&self) -> &PluginInfo {
        &self.info
    }

    fn configure(&mut self, _sample_rate: f64, block_size: usize) -> Result<()> {
        let partition = self.partition_size.unwrap_or(block_size.max(1));
        self.convolvers = (0..self.channels)
            .map(|_| PartitionedConvolution::new(&self.ir, partition))
            .collect::<divisi_dsp::Result<_>>()
            .map_err(|e| dsp_error(&self.info, e))?;
        Ok(())
    }

    fn process(&mut self, inputs: &[Vec<f32>], outputs: &mut [Vec<f32>]) -> Result<()> {
        for (k, (output, convolver)) in outputs
            .iter_mut()
            .zip(self.convolvers.iter_mut())
            .enumerate()
        {
            let Some(input) = input_for(inputs, k) else {
                continue;
            };
            convolver.process(input, output);
            for (out, dry) in output.iter_mut().zip(input) {
                *out = *out * self.wet + dry * self.dry;
            }
        }
        Ok(())
    }

    fn stop(&mut self) {
        for convolver in &mut self.convolvers {
            convolver.reset();
        }
    }

    fn parameter_count(&self) -> usize {
        2
    }

    fn parameter(&mut self, index: usize) -> f32 {
        match index {
            0 => self.wet,
            1 => self.dry,
            _ => 0.0,
        }
    }

    fn set_parameter(&mut self, index: usize, value: f32) {
        match index {
            0 => self.wet = value,
            1 => self.dry = value,
            _ => {}
        }
    }

    fn parameter_name(&mut self, index: usize) -> String {
        match index {
            0 => "Wet",
            1 => "Dry",
            _ => "",
        }
        .to_string()
    }
}

/// Overlap-add filter with a pass band and an optional per-bin shape.
///
/// Parameters: 0 `Low cut` and 1 `High cut` as fractions of the bin range; bins outside
/// `[low, high]` are removed. Programs: `Flat`, `Low pass`, `High pass`.
pub struct SpectralFilterPlugin {
    info: PluginInfo,
    fft_size: usize,
    channels: usize,
    filters: Vec<OlaFilter>,
    shape: Vec<f32>,
    low: f32,
    high: f32,
    program: usize,
}

const PROGRAMS: [(&str, f32, f32); 3] = [
    ("Flat", 0.0, 1.0),
    ("Low pass", 0.0, 0.25),
    ("High pass", 0.25, 1.0),
];

impl SpectralFilterPlugin {
    pub fn new(fft_size: usize, channels: usize) -> crate::Result<Self> {
        let probe = OlaFilter::new(fft_size)?;
        if channels == 0 {
            return Err(divisi_dsp::Error::InvalidParameter(
                "spectral filter needs at least one channel".into(),
            )
            .into());
        }
        Ok(Self {
            info: PluginInfo::new("divisi.spectral-filter", "Spectral Filter")
                .vendor("divisi")
                .version(env!("CARGO_PKG_VERSION"))
                .audio_io(channels, channels)
                .parameters(2)
                .programs(PROGRAMS.len()),
            fft_size,
            channels,
            shape: vec![1.0; probe.num_bins()],
            filters: Vec::new(),
            low: 0.0,
            high: 1.0,
            program: 0,
        })
    }

    /// Per-bin gains multiplied into the pass band.
    pub fn with_shape(mut self, gains: Vec<f32>) -> crate::Result<Self> {
        if gains.len() != self.shape.len() {
            return Err(divisi_dsp::Error::InvalidParameter(format!(
                "expected {} bin gains, got {}",
                self.shape.len(),
                gains.len()
            ))
            .into());
        }
        self.shape = gains;
        Ok(self)
    }

    pub fn latency(&self) -> usize {
        self.fft_size
    }

    /// Effective gain of every bin.
    pub fn bin_gains(&self) -> Vec<f32> {
        let last = (self.shape.len() - 1).max(1) as f32;
        self.shape
            .iter()
            .enumerate()
            .map(|(bin, gain)| {
                let fraction = bin as f32 / last;
                if fraction >= self.low && fraction <= self.high {
                    *gain
                } else {
                    0.0
                }
            })
            .collect()
    }

    fn push_gains(&mut self) {
        let gains = self.bin_gains();
        for filter in &mut self.filters {
            // lengths always match the shape
            let _ = filter.set_gains(&gains);
        }
    }
}

impl AudioPlugin for SpectralFilterPlugin {
    fn info(&self) -> &PluginInfo {
        &self.info
    }

    fn configure(&mut self, _sample_rate: f64, _block_size: usize) -> Result<()> {
        self.filters = (0..self.channels)
            .map(|_| OlaFilter::new(self.fft_size))
            .collect::<divisi_dsp::Result<_>>()
            .map_err(|e| dsp_error(&self.info, e))?;
        self.push_gains();
        Ok(())
    }

    fn process(&mut self, inputs: &[Vec<f32>], outputs: &mut [Vec<f32>]) -> Result<()> {
        for (k, (output, filter)) in outputs
            .iter_mut()
            .zip(self.filters.iter_mut())
            .enumerate()
        {
            if let Some(input) = input_for(inputs, k) {
                filter.process(input, output);
            }
        }
        Ok(())
    }

    fn stop(&mut self) {
        for filter in &mut self.filters {
            filter.reset();
        }
    }

    fn parameter_count(&self) -> usize {
        2
    }

    fn parameter(&mut self, index: usize) -> f32 {
        match index {
            0 => self.low,
            1 => self.high,
            _ => 0.0,
        }
    }

    fn set_parameter(&mut self, index: usize, value: f32) {
        match index {
            0 => self.low = value,
            1 => self.high = value,
            _ => return,
        }
        self.push_gains();
    }

    fn parameter_name(&mut self, index: usize) -> String {
        match index {
            0 => "Low cut",
            1 => "High cut",
            _ => "",
        }
        .to_string()
    }

    fn program_names(&mut self) -> Vec<String> {
        PROGRAMS.iter().map(|(name, _, _)| name.to_string()).collect()
    }

    fn program(&mut self) -> usize {
        self.program
    }

    fn set_program(&mut self, index: usize) -> Result<()> {
        let (_, low, high) = PROGRAMS.get(index).ok_or_else(|| PluginError::Process {
            plugin: self.info.name.clone(),
            reason: format!("program {index} out of range ({})", PROGRAMS.len()),
        })?;
        self.program = index;
        self.low = *low;
        self.high = *high;
        self.push_gains();
        Ok(())
    }
}
