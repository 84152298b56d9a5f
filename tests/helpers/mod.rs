//! Test helpers and fixtures for divisi integration tests
//!
//! Engines are driven by hand, one `process` call per simulated device buffer, so no test
//! needs audio hardware.
//!
//! ## Tolerance Levels
//!
//! Use the appropriate tolerance from [`tolerances`] module:
//! - `FLOAT_EPSILON` (1e-6): Exact operations (passthrough, unity gain)
//! - `DSP_EPSILON` (1e-4): DSP processing (FFT, ramps)
//! - `PERCEPTUAL_EPSILON` (0.001): Perceptual equivalence (-60dB)
//! - `SILENCE_THRESHOLD` (0.0001): Silence detection (-80dB)

#![allow(dead_code)]

pub mod tolerances;

use divisi::prelude::*;
use std::path::{Path, PathBuf};

/// Default test sample rate (matches common hardware)
pub const TEST_SAMPLE_RATE: f64 = 48000.0;

/// Standard buffer size for deterministic testing
pub const TEST_BUFFER_SIZE: usize = 256;

/// Route engine logs to the test output. Safe to call from every test.
pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_test_writer()
        .with_max_level(tracing::Level::DEBUG)
        .try_init();
}

/// Stereo engine, one additive track per channel, short fades, already started.
pub fn test_engine() -> Engine {
    let engine = test_builder().build().expect("Failed to create test engine");
    engine.start().expect("Failed to start test engine");
    engine
}

/// Builder with the test rate and block size.
pub fn test_builder() -> EngineBuilder {
    Engine::builder()
        .sample_rate(TEST_SAMPLE_RATE)
        .buffer_size(TEST_BUFFER_SIZE)
        .fade_length(32)
}

/// Output buffers for one cycle.
pub fn output_buffers(channels: usize, frames: usize) -> Vec<Vec<f32>> {
    vec![vec![0.0; frames]; channels]
}

/// Run `cycles` buffers of silence through `engine`, returning each output channel
/// concatenated.
pub fn render(engine: &Engine, cycles: usize) -> Vec<Vec<f32>> {
    let inputs = vec![vec![0.0; TEST_BUFFER_SIZE]; engine.input_channels()];
    render_with_inputs(engine, cycles, |_| inputs.clone())
}

/// Like [`render`], with `input_for(cycle)` providing each cycle's input buffers.
pub fn render_with_inputs(
    engine: &Engine,
    cycles: usize,
    mut input_for: impl FnMut(usize) -> Vec<Vec<f32>>,
) -> Vec<Vec<f32>> {
    let channels = engine.output_channels();
    let mut rendered = vec![Vec::with_capacity(cycles * TEST_BUFFER_SIZE); channels];
    let mut outputs = output_buffers(channels, TEST_BUFFER_SIZE);
    for cycle in 0..cycles {
        let inputs = input_for(cycle);
        engine.process(&inputs, &mut outputs);
        for (all, block) in rendered.iter_mut().zip(&outputs) {
            all.extend_from_slice(block);
        }
    }
    rendered
}

/// Generate a test signal: sine wave at given frequency for specified samples.
pub fn generate_sine(frequency: f64, sample_rate: f64, num_samples: usize) -> Vec<f32> {
    (0..num_samples)
        .map(|i| {
            let t = i as f64 / sample_rate;
            (2.0 * std::f64::consts::PI * frequency * t).sin() as f32
        })
        .collect()
}

/// Generate white noise (random samples in -1..1).
pub fn generate_noise(num_samples: usize, seed: u64) -> Vec<f32> {
    // Simple LCG for reproducible "random" noise
    let mut rng = seed;
    (0..num_samples)
        .map(|_| {
            rng = rng.wrapping_mul(6364136223846793005).wrapping_add(1);
            ((rng >> 33) as f32 / u32::MAX as f32) * 4.0 - 1.0
        })
        .collect()
}

/// Integer staircase [0, 1, 2, ...] for exact routing checks.
pub fn generate_staircase(num_samples: usize) -> Vec<f32> {
    (0..num_samples).map(|i| i as f32).collect()
}

/// Calculate RMS of a signal.
pub fn rms(samples: &[f32]) -> f32 {
    if samples.is_empty() {
        return 0.0;
    }
    let sum_sq: f32 = samples.iter().map(|s| s * s).sum();
    (sum_sq / samples.len() as f32).sqrt()
}

/// Calculate peak amplitude of a signal.
pub fn peak(samples: &[f32]) -> f32 {
    samples
        .iter()
        .map(|s| s.abs())
        .fold(0.0_f32, |a, b| a.max(b))
}

/// Assert that a signal is approximately silent (all values near zero).
pub fn assert_silence(samples: &[f32], tolerance: f32) {
    let max = peak(samples);
    assert!(
        max <= tolerance,
        "Expected silence, but peak amplitude was {}",
        max
    );
}

/// Assert two signals match sample for sample.
pub fn assert_signals_eq(actual: &[f32], expected: &[f32], tolerance: f32) {
    assert_eq!(actual.len(), expected.len(), "length mismatch");
    for (i, (a, e)) in actual.iter().zip(expected).enumerate() {
        assert!(
            (a - e).abs() <= tolerance,
            "sample {i}: got {a}, expected {e}"
        );
    }
}

/// Write a 32-bit float wave fixture, samples interleaved.
pub fn write_wav(dir: &Path, name: &str, channels: u16, samples: &[f32]) -> PathBuf {
    let path = dir.join(name);
    let spec = hound::WavSpec {
        channels,
        sample_rate: TEST_SAMPLE_RATE as u32,
        bits_per_sample: 32,
        sample_format: hound::SampleFormat::Float,
    };
    let mut writer = hound::WavWriter::create(&path, spec).expect("create fixture");
    for &s in samples {
        writer.write_sample(s).expect("write fixture sample");
    }
    writer.finalize().expect("finalize fixture");
    path
}

/// Read every sample of a float wave file.
pub fn read_wav(path: &Path) -> (hound::WavSpec, Vec<f32>) {
    let mut reader = hound::WavReader::open(path).expect("open wav");
    let spec = reader.spec();
    let samples = reader
        .samples::<f32>()
        .collect::<std::result::Result<Vec<_>, _>>()
        .expect("read wav samples");
    (spec, samples)
}

// ==================== Test plugins ====================

use divisi::plugin::{PluginError, Result as PluginResult};
use divisi::{AudioPlugin, PluginInfo};
use std::time::Duration;

/// Scales every input into the matching output. Parameter 0 is the gain over 4.
pub struct GainPlugin {
    info: PluginInfo,
    gain: f32,
}

impl GainPlugin {
    pub fn boxed(gain: f32) -> Box<dyn AudioPlugin> {
        Box::new(Self {
            info: PluginInfo::new("test.gain", "Gain").parameters(1),
            gain,
        })
    }
}

impl AudioPlugin for GainPlugin {
    fn info(&self) -> &PluginInfo {
        &self.info
    }

    fn configure(&mut self, _sample_rate: f64, _block_size: usize) -> PluginResult<()> {
        Ok(())
    }

    fn process(&mut self, inputs: &[Vec<f32>], outputs: &mut [Vec<f32>]) -> PluginResult<()> {
        for (output, input) in outputs.iter_mut().zip(inputs.iter().cycle()) {
            for (o, &i) in output.iter_mut().zip(input) {
                *o = i * self.gain;
            }
        }
        Ok(())
    }

    fn parameter_count(&self) -> usize {
        1
    }

    fn parameter(&mut self, _index: usize) -> f32 {
        self.gain / 4.0
    }

    fn set_parameter(&mut self, _index: usize, value: f32) {
        self.gain = value * 4.0;
    }

    fn parameter_name(&mut self, _index: usize) -> String {
        "Gain".into()
    }
}

/// Writes the sum of its inputs to every output.
pub struct SumPlugin(PluginInfo);

impl SumPlugin {
    pub fn boxed() -> Box<dyn AudioPlugin> {
        Box::new(Self(PluginInfo::new("test.sum", "Sum").audio_io(2, 1)))
    }
}

impl AudioPlugin for SumPlugin {
    fn info(&self) -> &PluginInfo {
        &self.0
    }

    fn configure(&mut self, _sample_rate: f64, _block_size: usize) -> PluginResult<()> {
        Ok(())
    }

    fn process(&mut self, inputs: &[Vec<f32>], outputs: &mut [Vec<f32>]) -> PluginResult<()> {
        for output in outputs.iter_mut() {
            for (n, o) in output.iter_mut().enumerate() {
                *o = inputs.iter().map(|i| i[n]).sum();
            }
        }
        Ok(())
    }
}

/// Fails every block.
pub struct FailingPlugin(PluginInfo);

impl FailingPlugin {
    pub fn boxed() -> Box<dyn AudioPlugin> {
        Box::new(Self(PluginInfo::new("test.fail", "Failing")))
    }
}

impl AudioPlugin for FailingPlugin {
    fn info(&self) -> &PluginInfo {
        &self.0
    }

    fn configure(&mut self, _sample_rate: f64, _block_size: usize) -> PluginResult<()> {
        Ok(())
    }

    fn process(&mut self, _inputs: &[Vec<f32>], _outputs: &mut [Vec<f32>]) -> PluginResult<()> {
        Err(PluginError::Process {
            plugin: self.0.name.clone(),
            reason: "always fails".into(),
        })
    }
}

/// Blocks for a fixed time every block.
pub struct SleepPlugin(PluginInfo, Duration);

impl SleepPlugin {
    pub fn boxed(duration: Duration) -> Box<dyn AudioPlugin> {
        Box::new(Self(PluginInfo::new("test.sleep", "Sleep"), duration))
    }
}

impl AudioPlugin for SleepPlugin {
    fn info(&self) -> &PluginInfo {
        &self.0
    }

    fn configure(&mut self, _sample_rate: f64, _block_size: usize) -> PluginResult<()> {
        Ok(())
    }

    fn process(&mut self, _inputs: &[Vec<f32>], _outputs: &mut [Vec<f32>]) -> PluginResult<()> {
        std::thread::sleep(self.1);
        Ok(())
    }
}
