//! Overlap-add spectral filter
//!
//! Frames of `N` samples are taken every `N/2` samples, weighted with a
//! periodic Hann window, scaled per FFT bin and summed back. The periodic
//! Hann window at 50% overlap sums to exactly one, so unity gains reproduce
//! the input delayed by `N` samples.

use std::f32::consts::PI;
use std::sync::Arc;

use realfft::{ComplexToReal, RealFftPlanner, RealToComplex};
use rustfft::num_complex::Complex;

use crate::{Error, Result};

const MIN_FFT_SIZE: usize = 4;
const MAX_FFT_SIZE: usize = 65536;

pub struct OlaFilter {
    fft_size: usize,
    hop: usize,
    window: Vec<f32>,
    gains: Vec<f32>,
    fft_forward: Arc<dyn RealToComplex<f32>>,
    fft_inverse: Arc<dyn ComplexToReal<f32>>,
    /// Last `N` input samples.
    input: Vec<f32>,
    /// Overlap-add accumulator, aligned with `input`.
    accum: Vec<f32>,
    frame: Vec<f32>,
    spectrum: Vec<Complex<f32>>,
    scratch_forward: Vec<Complex<f32>>,
    scratch_inverse: Vec<Complex<f32>>,
    /// Finished output hop.
    ready: Vec<f32>,
    pos: usize,
}

impl OlaFilter {
    /// Create a filter with an even `fft_size` and all bin gains at unity.
    pub fn new(fft_size: usize) -> Result<Self> {
        if !(MIN_FFT_SIZE..=MAX_FFT_SIZE).contains(&fft_size) || fft_size % 2 != 0 {
            return Err(Error::InvalidParameter(format!(
                "FFT size {fft_size} must be even and within {MIN_FFT_SIZE}..={MAX_FFT_SIZE}"
            )));
        }

        let mut planner = RealFftPlanner::<f32>::new();
        let fft_forward = planner.plan_fft_forward(fft_size);
        let fft_inverse = planner.plan_fft_inverse(fft_size);
        let hop = fft_size / 2;

        let window = (0..fft_size)
            .map(|n| 0.5 - 0.5 * (2.0 * PI * n as f32 / fft_size as f32).cos())
            .collect();

        Ok(Self {
            fft_size,
            hop,
            window,
            gains: vec![1.0; hop + 1],
            scratch_forward: fft_forward.make_scratch_vec(),
            scratch_inverse: fft_inverse.make_scratch_vec(),
            spectrum: fft_forward.make_output_vec(),
            frame: fft_forward.make_input_vec(),
            fft_forward,
            fft_inverse,
            input: vec![0.0; fft_size],
            accum: vec![0.0; fft_size],
            ready: vec![0.0; hop],
            pos: 0,
        })
    }

    pub fn fft_size(&self) -> usize {
        self.fft_size
    }

    /// Number of gain bins, `N/2 + 1`.
    pub fn num_bins(&self) -> usize {
        self.gains.len()
    }

    pub fn latency(&self) -> usize {
        self.fft_size
    }

    pub fn gains(&self) -> &[f32] {
        &self.gains
    }

    /// Replace every bin gain. `gains` must hold exactly [`num_bins`](Self::num_bins) values.
    pub fn set_gains(&mut self, gains: &[f32]) -> Result<()> {
        if gains.len() != self.gains.len() {
            return Err(Error::InvalidParameter(format!(
                "expected {} bin gains, got {}",
                self.gains.len(),
                gains.len()
            )));
        }
        self.gains.copy_from_slice(gains);
        Ok(())
    }

    pub fn set_gain(&mut self, bin: usize, gain: f32) -> Result<()> {
        let slot = self.gains.get_mut(bin).ok_or_else(|| {
            Error::InvalidParameter(format!("bin {bin} out of range"))
        })?;
        *slot = gain;
        Ok(())
    }

    /// Bin index nearest to `frequency` at `sample_rate`.
    pub fn bin_for_frequency(&self, frequency: f32, sample_rate: f32) -> usize {
        let bin = (frequency * self.fft_size as f32 / sample_rate).round();
        (bin.max(0.0) as usize).min(self.gains.len() - 1)
    }

    pub fn process(&mut self, input: &[f32], output: &mut [f32]) {
        for (x, y) in input.iter().zip(output.iter_mut()) {
            *y = self.push(*x);
        }
    }

    pub fn process_in_place(&mut self, buffer: &mut [f32]) {
        for sample in buffer.iter_mut() {
            *sample = self.push(*sample);
        }
    }

    pub fn reset(&mut self) {
        self.input.fill(0.0);
        self.accum.fill(0.0);
        self.ready.fill(0.0);
        self.pos = 0;
    }

    #[inline]
    fn push(&mut self, x: f32) -> f32 {
        self.input[self.hop + self.pos] = x;
        let y = self.ready[self.pos];
        self.pos += 1;
        if self.pos == self.hop {
            self.process_frame();
            self.pos = 0;
        }
        y
    }

    fn process_frame(&mut self) {
        for ((f, x), w) in self.frame.iter_mut().zip(&self.input).zip(&self.window) {
            *f = x * w;
        }
        let result = self.fft_forward.process_with_scratch(
            &mut self.frame,
            &mut self.spectrum,
            &mut self.scratch_forward,
        );
        debug_assert!(result.is_ok(), "fft buffers sized by the plan");

        for (bin, gain) in self.spectrum.iter_mut().zip(&self.gains) {
            *bin *= *gain;
        }

        let result = self.fft_inverse.process_with_scratch(
            &mut self.spectrum,
            &mut self.frame,
            &mut self.scratch_inverse,
        );
        debug_assert!(result.is_ok(), "fft buffers sized by the plan");

        let scale = 1.0 / self.fft_size as f32;
        for (acc, v) in self.accum.iter_mut().zip(&self.frame) {
            *acc += v * scale;
        }

        self.ready.copy_from_slice(&self.accum[..self.hop]);
        self.accum.copy_within(self.hop.., 0);
        self.accum[self.hop..].fill(0.0);
        self.input.copy_within(self.hop.., 0);
    }
}

impl std::fmt::Debug for OlaFilter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OlaFilter")
            .field("fft_size", &self.fft_size)
            .field("hop", &self.hop)
            .finish()
    }
}
