//! CPAL device driver (requires the `device` feature).
//!
//! Opens an output stream, and an input stream when input channels are requested, and drives
//! an [`AudioCallback`] with de-interleaved per-channel buffers. Captured input travels to the
//! output callback through a lock-free ring.

use crate::{AudioCallback, Error, Result};
use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use ringbuf::traits::{Consumer, Producer, Split};
use ringbuf::{HeapCons, HeapRb};

/// Blocks of input latency the capture ring can absorb.
const INPUT_RING_BLOCKS: usize = 8;

#[derive(Debug, Clone, Default)]
pub struct DeviceConfig {
    pub output_device_index: Option<usize>,
    pub input_device_index: Option<usize>,
    pub output_channels: usize,
    pub input_channels: usize,
    pub sample_rate: u32,
    pub buffer_size: usize,
}

/// Wrapper to hold a `cpal::Stream` in a `Send` context.
///
/// `cpal::Stream` is `!Send` due to platform internals. The handle is only touched by its
/// owning `AudioDevice`, which the engine keeps behind a mutex, and it is dropped there.
struct StreamHandle(#[allow(dead_code)] cpal::Stream);

// SAFETY: see `StreamHandle`; the stream is never accessed concurrently.
unsafe impl Send for StreamHandle {}

pub struct AudioDevice {
    config: DeviceConfig,
    is_running: bool,
    output: Option<StreamHandle>,
    input: Option<StreamHandle>,
}

impl AudioDevice {
    pub fn new(config: DeviceConfig) -> Self {
        Self {
            config,
            is_running: false,
            output: None,
            input: None,
        }
    }

    pub fn start<C: AudioCallback>(&mut self, callback: C) -> Result<()> {
        if self.is_running {
            return Ok(());
        }

        let stream_config = |channels: usize| cpal::StreamConfig {
            channels: channels as u16,
            sample_rate: cpal::SampleRate(self.config.sample_rate),
            buffer_size: cpal::BufferSize::Fixed(self.config.buffer_size as u32),
        };

        let input_consumer = if self.config.input_channels > 0 {
            let device = input_device(self.config.input_device_index)?;
            let format = device.default_input_config()?.sample_format();
            let capacity = self.config.input_channels * self.config.buffer_size * INPUT_RING_BLOCKS;
            let (producer, consumer) = HeapRb::<f32>::new(capacity).split();
            let config = stream_config(self.config.input_channels);

            let stream = match format {
                cpal::SampleFormat::F32 => build_input::<f32>(&device, &config, producer)?,
                cpal::SampleFormat::I16 => build_input::<i16>(&device, &config, producer)?,
                cpal::SampleFormat::U16 => build_input::<u16>(&device, &config, producer)?,
                format => {
                    return Err(Error::InvalidConfig(format!(
                        "Unsupported input sample format: {format:?}"
                    )));
                }
            };
            stream.play()?;
            self.input = Some(StreamHandle(stream));
            Some(consumer)
        } else {
            None
        };

        let device = output_device(self.config.output_device_index)?;
        let format = device.default_output_config()?.sample_format();
        let config = stream_config(self.config.output_channels);
        let inputs = self.config.input_channels;

        let stream = match format {
            cpal::SampleFormat::F32 => {
                build_output::<f32, C>(&device, &config, inputs, input_consumer, callback)?
            }
            cpal::SampleFormat::I16 => {
                build_output::<i16, C>(&device, &config, inputs, input_consumer, callback)?
            }
            cpal::SampleFormat::U16 => {
                build_output::<u16, C>(&device, &config, inputs, input_consumer, callback)?
            }
            format => {
                self.input = None;
                return Err(Error::InvalidConfig(format!(
                    "Unsupported output sample format: {format:?}"
                )));
            }
        };

        stream.play()?;
        self.output = Some(StreamHandle(stream));
        self.is_running = true;
        tracing::info!(
            "audio device started: {} out / {} in @ {} Hz, {} frames",
            self.config.output_channels,
            self.config.input_channels,
            self.config.sample_rate,
            self.config.buffer_size
        );
        Ok(())
    }

    pub fn stop(&mut self) {
        self.output = None;
        self.input = None;
        if self.is_running {
            tracing::info!("audio device stopped");
        }
        self.is_running = false;
    }

    pub fn is_running(&self) -> bool {
        self.is_running
    }

    pub fn config(&self) -> &DeviceConfig {
        &self.config
    }

    pub fn list_output_devices() -> Result<Vec<String>> {
        cpal::default_host()
            .output_devices()?
            .enumerate()
            .map(|(i, d)| Ok(format!("{i}: {}", d.name()?)))
            .collect()
    }

    pub fn list_input_devices() -> Result<Vec<String>> {
        cpal::default_host()
            .input_devices()?
            .enumerate()
            .map(|(i, d)| Ok(format!("{i}: {}", d.name()?)))
            .collect()
    }

    pub fn output_device_name(&self) -> Result<String> {
        Ok(output_device(self.config.output_device_index)?.name()?)
    }
}

impl Drop for AudioDevice {
    fn drop(&mut self) {
        self.stop();
    }
}

fn output_device(index: Option<usize>) -> Result<cpal::Device> {
    let host = cpal::default_host();
    match index {
        Some(i) => {
            let devices: Vec<_> = host.output_devices()?.collect();
            let count = devices.len();
            devices.into_iter().nth(i).ok_or_else(|| {
                Error::InvalidDevice(format!(
                    "Output device index {i} out of range ({count} available)"
                ))
            })
        }
        None => host
            .default_output_device()
            .ok_or_else(|| Error::InvalidDevice("No output device available".into())),
    }
}

fn input_device(index: Option<usize>) -> Result<cpal::Device> {
    let host = cpal::default_host();
    match index {
        Some(i) => {
            let devices: Vec<_> = host.input_devices()?.collect();
            let count = devices.len();
            devices.into_iter().nth(i).ok_or_else(|| {
                Error::InvalidDevice(format!(
                    "Input device index {i} out of range ({count} available)"
                ))
            })
        }
        None => host
            .default_input_device()
            .ok_or_else(|| Error::InvalidDevice("No input device available".into())),
    }
}

fn build_input<T>(
    device: &cpal::Device,
    config: &cpal::StreamConfig,
    mut producer: ringbuf::HeapProd<f32>,
) -> Result<cpal::Stream>
where
    T: cpal::SizedSample,
    f32: cpal::FromSample<T>,
{
    let mut scratch = Vec::<f32>::new();

    let stream = device.build_input_stream(
        config,
        move |data: &[T], _: &cpal::InputCallbackInfo| {
            if scratch.len() < data.len() {
                scratch.resize(data.len(), 0.0);
            }
            for (dst, &src) in scratch.iter_mut().zip(data) {
                *dst = <f32 as cpal::Sample>::from_sample(src);
            }
            // Overflow drops the newest samples; the output side catches up next block.
            producer.push_slice(&scratch[..data.len()]);
        },
        |err| tracing::error!("audio input stream error: {err}"),
        None,
    )?;

    Ok(stream)
}

fn build_output<T, C>(
    device: &cpal::Device,
    config: &cpal::StreamConfig,
    input_channels: usize,
    mut input: Option<HeapCons<f32>>,
    mut callback: C,
) -> Result<cpal::Stream>
where
    T: cpal::SizedSample + cpal::FromSample<f32>,
    C: AudioCallback,
{
    let channels = config.channels as usize;

    // Pre-allocated buffers (resized only when the driver changes its block size)
    let mut inputs: Vec<Vec<f32>> = vec![Vec::new(); input_channels];
    let mut outputs: Vec<Vec<f32>> = vec![Vec::new(); channels];
    let mut interleaved = Vec::<f32>::new();

    let stream = device.build_output_stream(
        config,
        move |data: &mut [T], _: &cpal::OutputCallbackInfo| {
            let result = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| {
                let frames = data.len() / channels;
                resize_channels(&mut outputs, frames);
                resize_channels(&mut inputs, frames);

                if let Some(consumer) = input.as_mut() {
                    let needed = frames * input_channels;
                    if interleaved.len() < needed {
                        interleaved.resize(needed, 0.0);
                    }
                    let read = consumer.pop_slice(&mut interleaved[..needed]);
                    interleaved[read..needed].fill(0.0);
                    for (ch, buffer) in inputs.iter_mut().enumerate() {
                        for (frame, sample) in buffer.iter_mut().enumerate() {
                            *sample = interleaved[frame * input_channels + ch];
                        }
                    }
                }

                callback.process(&inputs, &mut outputs);

                for (i, sample) in data.iter_mut().enumerate() {
                    *sample = T::from_sample(outputs[i % channels][i / channels]);
                }
            }));

            if result.is_err() {
                for sample in data.iter_mut() {
                    *sample = T::from_sample(0.0);
                }
            }
        },
        |err| tracing::error!("audio output stream error: {err}"),
        None,
    )?;

    Ok(stream)
}

fn resize_channels(buffers: &mut [Vec<f32>], frames: usize) {
    for buffer in buffers.iter_mut() {
        if buffer.len() != frames {
            buffer.resize(frames, 0.0);
        }
    }
}
