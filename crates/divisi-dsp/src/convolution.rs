//! Uniform partitioned convolution
//!
//! The impulse response is cut into equal partitions of `P` samples, each
//! transformed once with a `2P` real FFT. Every `P` input samples the newest
//! `2P` input window is transformed and pushed into a frequency delay line;
//! the output block is the inverse transform of the sum of delay-line slots
//! multiplied by their partitions (overlap-save, keeping the last `P` samples).
//!
//! Input is gathered sample by sample, so the processor accepts any buffer
//! length at the price of a fixed latency of one partition.

use std::sync::Arc;

use realfft::{ComplexToReal, RealFftPlanner, RealToComplex};
use rustfft::num_complex::Complex;

use crate::{Error, Result};

/// Largest accepted partition.
const MAX_PARTITION_SIZE: usize = 65536;

pub struct PartitionedConvolution {
    partition_size: usize,
    ir_len: usize,
    /// IR partition spectra, `P + 1` bins each.
    partitions: Vec<Vec<Complex<f32>>>,
    /// Input spectra, newest at `fdl_pos`.
    fdl: Vec<Vec<Complex<f32>>>,
    fdl_pos: usize,
    fft_forward: Arc<dyn RealToComplex<f32>>,
    fft_inverse: Arc<dyn ComplexToReal<f32>>,
    /// Last `2P` input samples (previous block, current block).
    window: Vec<f32>,
    time_buf: Vec<f32>,
    spectrum: Vec<Complex<f32>>,
    accum: Vec<Complex<f32>>,
    scratch_forward: Vec<Complex<f32>>,
    scratch_inverse: Vec<Complex<f32>>,
    /// Output of the last completed block.
    output_block: Vec<f32>,
    pos: usize,
}

impl PartitionedConvolution {
    /// Build a convolver for `ir` with partitions of `partition_size` samples.
    pub fn new(ir: &[f32], partition_size: usize) -> Result<Self> {
        if ir.is_empty() {
            return Err(Error::InvalidParameter(
                "impulse response must not be empty".into(),
            ));
        }
        if partition_size == 0 || partition_size > MAX_PARTITION_SIZE {
            return Err(Error::InvalidParameter(format!(
                "partition size {partition_size} outside 1..={MAX_PARTITION_SIZE}"
            )));
        }

        let fft_size = partition_size * 2;
        let mut planner = RealFftPlanner::<f32>::new();
        let fft_forward = planner.plan_fft_forward(fft_size);
        let fft_inverse = planner.plan_fft_inverse(fft_size);

        let mut scratch_forward = fft_forward.make_scratch_vec();
        let mut time_buf = fft_forward.make_input_vec();
        let partitions: Vec<Vec<Complex<f32>>> = ir
            .chunks(partition_size)
            .map(|chunk| {
                time_buf.fill(0.0);
                time_buf[..chunk.len()].copy_from_slice(chunk);
                let mut spectrum = fft_forward.make_output_vec();
                let result = fft_forward.process_with_scratch(
                    &mut time_buf,
                    &mut spectrum,
                    &mut scratch_forward,
                );
                debug_assert!(result.is_ok(), "fft buffers sized by the plan");
                spectrum
            })
            .collect();

        let bins = partition_size + 1;
        let fdl = vec![vec![Complex::new(0.0, 0.0); bins]; partitions.len()];

        tracing::debug!(
            ir_len = ir.len(),
            partition_size,
            partitions = partitions.len(),
            "Built partitioned convolution"
        );

        Ok(Self {
            partition_size,
            ir_len: ir.len(),
            partitions,
            fdl,
            fdl_pos: 0,
            scratch_inverse: fft_inverse.make_scratch_vec(),
            fft_forward,
            fft_inverse,
            window: vec![0.0; fft_size],
            time_buf,
            spectrum: vec![Complex::new(0.0, 0.0); bins],
            accum: vec![Complex::new(0.0, 0.0); bins],
            scratch_forward,
            output_block: vec![0.0; partition_size],
            pos: 0,
        })
    }

    pub fn partition_size(&self) -> usize {
        self.partition_size
    }

    pub fn num_partitions(&self) -> usize {
        self.partitions.len()
    }

    pub fn ir_len(&self) -> usize {
        self.ir_len
    }

    /// Delay in samples between an input sample and its first contribution.
    pub fn latency(&self) -> usize {
        self.partition_size
    }

    /// Convolve `input` into `output`. Lengths may differ; the shorter one wins.
    pub fn process(&mut self, input: &[f32], output: &mut [f32]) {
        let p = self.partition_size;
        for (x, y) in input.iter().zip(output.iter_mut()) {
            self.window[p + self.pos] = *x;
            *y = self.output_block[self.pos];
            self.pos += 1;
            if self.pos == p {
                self.process_block();
                self.pos = 0;
            }
        }
    }

    /// In-place variant of [`process`](Self::process).
    pub fn process_in_place(&mut self, buffer: &mut [f32]) {
        let p = self.partition_size;
        for sample in buffer.iter_mut() {
            self.window[p + self.pos] = *sample;
            *sample = self.output_block[self.pos];
            self.pos += 1;
            if self.pos == p {
                self.process_block();
                self.pos = 0;
            }
        }
    }

    /// Clear all history, keeping the impulse response.
    pub fn reset(&mut self) {
        self.window.fill(0.0);
        self.output_block.fill(0.0);
        for slot in &mut self.fdl {
            slot.fill(Complex::new(0.0, 0.0));
        }
        self.fdl_pos = 0;
        self.pos = 0;
    }

    fn process_block(&mut self) {
        let p = self.partition_size;
        let count = self.partitions.len();

        self.time_buf.copy_from_slice(&self.window);
        let result = self.fft_forward.process_with_scratch(
            &mut self.time_buf,
            &mut self.spectrum,
            &mut self.scratch_forward,
        );
        debug_assert!(result.is_ok(), "fft buffers sized by the plan");

        self.fdl_pos = (self.fdl_pos + count - 1) % count;
        self.fdl[self.fdl_pos].copy_from_slice(&self.spectrum);

        self.accum.fill(Complex::new(0.0, 0.0));
        for (k, partition) in self.partitions.iter().enumerate() {
            let slot = &self.fdl[(self.fdl_pos + k) % count];
            for ((acc, x), h) in self.accum.iter_mut().zip(slot).zip(partition) {
                *acc += x * h;
            }
        }

        // DC and Nyquist of a product of real spectra stay real
        let result = self.fft_inverse.process_with_scratch(
            &mut self.accum,
            &mut self.time_buf,
            &mut self.scratch_inverse,
        );
        debug_assert!(result.is_ok(), "fft buffers sized by the plan");

        let scale = 1.0 / (2 * p) as f32;
        for (out, v) in self.output_block.iter_mut().zip(&self.time_buf[p..]) {
            *out = v * scale;
        }

        self.window.copy_within(p.., 0);
    }
}

impl std::fmt::Debug for PartitionedConvolution {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PartitionedConvolution")
            .field("partition_size", &self.partition_size)
            .field("ir_len", &self.ir_len)
            .field("partitions", &self.partitions.len())
            .finish()
    }
}
