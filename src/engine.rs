//! Engine that owns every track, input channel and the plugin host

use crate::faults::{FaultCounters, FaultSnapshot};
use crate::{Error, Result};
use crossbeam_channel::{bounded, Receiver};
use divisi_core::{
    AtomicFlag, AudioCallback, ChannelMeter, EngineConfig, FadeState, FadeWindow, RampedGain,
    TrackMode,
};
use divisi_plugin::{
    AudioPlugin, HostConfig, ParameterInfo, PluginHost, PluginId, PluginInfo, PluginLoader,
    PluginRouting,
};
use divisi_sampler::{
    InputChannel, PlaybackSegment, RecordFile, RecordStatus, SegmentId, SegmentParams,
    StreamConfig, Track, TrackEvent,
};
use parking_lot::Mutex;
use std::ops::Range;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

/// Segment completions buffered for the control side before new ones are dropped.
const EVENT_CAPACITY: usize = 1024;

/// State readable without the processing lock.
struct Shared {
    config: EngineConfig,
    running: AtomicFlag,
    position: AtomicU64,
    output_meters: Vec<ChannelMeter>,
    input_meters: Vec<ChannelMeter>,
    faults: FaultCounters,
}

struct OutputChannel {
    name: String,
    gain: RampedGain,
    mute: FadeWindow,
    muted: bool,
    solo: bool,
    /// Silences the channel while another one is soloed.
    solo_gate: FadeWindow,
}

struct TrackControl {
    gain: RampedGain,
    mute: FadeWindow,
    muted: bool,
}

/// Everything the audio callback touches, guarded by the processing lock.
struct EngineState {
    tracks: Vec<Track>,
    track_controls: Vec<TrackControl>,
    inputs: Vec<InputChannel>,
    outputs: Vec<OutputChannel>,
    host: PluginHost,
    loader: Option<Arc<dyn PluginLoader>>,
    buffers: Vec<Vec<f32>>,
    scratch: Vec<f32>,
    pause: FadeWindow,
    paused: bool,
    recording: bool,
    position: u64,
}

/// The part of `samples` inside `range`, cut short where `samples` ends.
fn clamp_range<'a>(samples: &'a [f32], range: &Range<usize>) -> &'a [f32] {
    let end = range.end.min(samples.len());
    &samples[range.start.min(end)..end]
}

/// Drive a mute-style window towards audible or silent.
fn fade_towards(fade: &mut FadeWindow, audible: bool) {
    match (audible, fade.state()) {
        (true, FadeState::Down) => fade.set_state(FadeState::RunUp),
        (false, FadeState::Up) => fade.set_state(FadeState::RunDown),
        (true, FadeState::RunDown) | (false, FadeState::RunUp) => fade.reverse(),
        _ => {}
    }
}

fn host_config(config: &EngineConfig) -> HostConfig {
    HostConfig::new(
        config.plugin_layers,
        config.output_channels,
        config.buffer_size,
        config.sample_rate,
    )
    .threading(config.plugin_threading)
    .join_timeout(config.plugin_join_timeout)
}

impl EngineState {
    /// One driver cycle. Blocks longer than the configured buffer size are rendered in
    /// buffer-size pieces.
    fn process(&mut self, shared: &Shared, inputs: &[Vec<f32>], outputs: &mut [Vec<f32>]) {
        if !shared.running.get() || shared.faults.is_fatal() {
            for output in outputs.iter_mut() {
                output.fill(0.0);
            }
            return;
        }
        let frames = outputs.first().map_or(0, Vec::len);
        let block = shared.config.buffer_size;
        let mut start = 0;
        while start < frames {
            let end = (start + block).min(frames);
            self.render_block(shared, inputs, outputs, start..end);
            start = end;
        }
    }

    /// Capture, tracks, plugins, ramps and meters for the driver frames in `range`.
    fn render_block(
        &mut self,
        shared: &Shared,
        inputs: &[Vec<f32>],
        outputs: &mut [Vec<f32>],
        range: Range<usize>,
    ) {
        let frames = range.len();

        for ((channel, input), meter) in self
            .inputs
            .iter_mut()
            .zip(inputs)
            .zip(&shared.input_meters)
        {
            let input = clamp_range(input, &range);
            channel.save_buffer(input, self.recording);
            meter.process(input);
        }

        for buffer in self.buffers.iter_mut() {
            buffer.clear();
            buffer.resize(frames, 0.0);
        }
        self.scratch.resize(frames, 0.0);

        if self.pause.state() != FadeState::Down {
            self.render_tracks(&shared.faults, frames);
            self.position += frames as u64;
            shared.position.store(self.position, Ordering::Relaxed);
        }

        if let Err(e) = self.host.process(&mut self.buffers) {
            if e.is_fatal() {
                shared.faults.plugin_hang(&e);
            } else {
                shared.faults.plugin_error(&e);
            }
        }

        let pause = self.pause.state();
        if pause.is_running() {
            for value in self.scratch[..frames].iter_mut() {
                *value = self.pause.value();
            }
        }

        for (index, (channel, buffer)) in self
            .outputs
            .iter_mut()
            .zip(self.buffers.iter_mut())
            .enumerate()
        {
            channel.gain.apply(buffer);
            channel.mute.apply(buffer);
            channel.solo_gate.apply(buffer);
            match pause {
                FadeState::Up => {}
                FadeState::Down => buffer.fill(0.0),
                _ => {
                    for (sample, factor) in buffer.iter_mut().zip(&self.scratch) {
                        *sample *= factor;
                    }
                }
            }
            shared.output_meters[index].process(buffer);
        }

        for (index, output) in outputs.iter_mut().enumerate() {
            let end = range.end.min(output.len());
            let output = &mut output[range.start.min(end)..end];
            match self.buffers.get(index) {
                Some(buffer) => {
                    let n = output.len().min(buffer.len());
                    output[..n].copy_from_slice(&buffer[..n]);
                    output[n..].fill(0.0);
                }
                None => output.fill(0.0),
            }
        }
    }

    /// Additive tracks are summed first, multiplying tracks then scale the sums.
    fn render_tracks(&mut self, faults: &FaultCounters, frames: usize) {
        let scratch = &mut self.scratch[..frames];
        for mode in [TrackMode::Add, TrackMode::Multiply] {
            for (track, control) in self.tracks.iter_mut().zip(self.track_controls.iter_mut()) {
                if track.mode() != mode {
                    continue;
                }
                if let Err(e) = track.get_buffer(scratch) {
                    faults.stream_underrun(&e);
                }
                let Some(buffer) = self.buffers.get_mut(track.channel()) else {
                    continue;
                };
                match mode {
                    TrackMode::Add => {
                        control.gain.apply(scratch);
                        control.mute.apply(scratch);
                        for (out, s) in buffer.iter_mut().zip(scratch.iter()) {
                            *out += s;
                        }
                    }
                    TrackMode::Multiply => {
                        for (out, s) in buffer.iter_mut().zip(scratch.iter()) {
                            *out *= s;
                        }
                    }
                }
            }
        }
    }

    fn update_solo(&mut self) {
        let any_solo = self.outputs.iter().any(|c| c.solo);
        for channel in self.outputs.iter_mut() {
            fade_towards(&mut channel.solo_gate, !any_solo || channel.solo);
        }
    }
}

/// The audio driver's view of an [`Engine`].
#[derive(Clone)]
pub struct EngineCallback {
    shared: Arc<Shared>,
    state: Arc<Mutex<EngineState>>,
}

impl AudioCallback for EngineCallback {
    fn process(&mut self, inputs: &[Vec<f32>], outputs: &mut [Vec<f32>]) {
        self.state.lock().process(&self.shared, inputs, outputs);
    }
}

/// Explicitly constructed engine context.
///
/// Control methods take `&self` and synchronize through the processing lock, the same lock
/// the audio callback holds for one cycle. Meters and fault counters are read lock-free.
///
/// # Example
///
/// ```ignore
/// use divisi::prelude::*;
///
/// let engine = Engine::builder()
///     .sample_rate(48000.0)
///     .outputs(2)
///     .build()?;
///
/// engine.load_audio(0, samples, SegmentParams::default().loops(2))?;
/// engine.start()?;
///
/// // one driver cycle
/// engine.process(&inputs, &mut outputs);
/// ```
pub struct Engine {
    shared: Arc<Shared>,
    state: Arc<Mutex<EngineState>>,
    records: Vec<Arc<Mutex<RecordFile>>>,
    record_status: Vec<Arc<RecordStatus>>,
    events: Receiver<TrackEvent>,

    #[cfg(feature = "device")]
    device_config: Option<divisi_core::DeviceConfig>,

    #[cfg(feature = "device")]
    device: Mutex<Option<divisi_core::AudioDevice>>,
}

impl Engine {
    pub fn builder() -> crate::EngineBuilder {
        crate::EngineBuilder::default()
    }

    pub(crate) fn from_parts(
        config: EngineConfig,
        loader: Option<Arc<dyn PluginLoader>>,
        #[cfg(feature = "device")] device_config: Option<divisi_core::DeviceConfig>,
    ) -> Result<Self> {
        config.validate()?;
        let sample_rate = config.sample_rate.round() as u32;
        let fade = config.fade_length;
        let (event_tx, events) = bounded(EVENT_CAPACITY);

        let tracks: Vec<Track> = config
            .tracks
            .iter()
            .enumerate()
            .map(|(index, track_config)| {
                let mut track = Track::new(index, track_config, config.auto_cleanup);
                track.set_event_sender(event_tx.clone());
                track
            })
            .collect();
        let track_controls = tracks
            .iter()
            .map(|_| TrackControl {
                gain: RampedGain::new(1.0, fade),
                mute: FadeWindow::new(fade, FadeState::Up),
                muted: false,
            })
            .collect();

        let inputs = (0..config.input_channels)
            .map(|index| {
                let record = RecordFile::new(default_record_path(index), sample_rate);
                InputChannel::new(index, config.input_buffer_len, record)
            })
            .collect::<divisi_sampler::Result<Vec<_>>>()?;
        let records = inputs.iter().map(InputChannel::record_file).collect();
        let record_status = inputs.iter().map(InputChannel::record_status).collect();

        let outputs = (0..config.output_channels)
            .map(|index| OutputChannel {
                name: format!("Output {}", index + 1),
                gain: RampedGain::new(1.0, fade),
                mute: FadeWindow::new(fade, FadeState::Up),
                muted: false,
                solo: false,
                solo_gate: FadeWindow::new(fade, FadeState::Up),
            })
            .collect();

        let mut host = PluginHost::new(host_config(&config));
        if let Some(loader) = &loader {
            host.set_loader(Arc::clone(loader));
        }

        tracing::info!(
            "engine created: {} out / {} in, {} tracks, {} plugin layers @ {} Hz, {} frames",
            config.output_channels,
            config.input_channels,
            tracks.len(),
            config.plugin_layers,
            config.sample_rate,
            config.buffer_size
        );

        let state = EngineState {
            tracks,
            track_controls,
            inputs,
            outputs,
            host,
            loader,
            buffers: vec![vec![0.0; config.buffer_size]; config.output_channels],
            scratch: vec![0.0; config.buffer_size],
            pause: FadeWindow::new(fade, FadeState::Up),
            paused: false,
            recording: false,
            position: 0,
        };

        let shared = Shared {
            running: AtomicFlag::new(false),
            position: AtomicU64::new(0),
            output_meters: (0..config.output_channels)
                .map(|_| ChannelMeter::new())
                .collect(),
            input_meters: (0..config.input_channels)
                .map(|_| ChannelMeter::new())
                .collect(),
            faults: FaultCounters::new(config.fault_threshold),
            config,
        };

        Ok(Self {
            shared: Arc::new(shared),
            state: Arc::new(Mutex::new(state)),
            records,
            record_status,
            events,
            #[cfg(feature = "device")]
            device_config,
            #[cfg(feature = "device")]
            device: Mutex::new(None),
        })
    }

    // ==================== Lifecycle ====================

    pub fn config(&self) -> &EngineConfig {
        &self.shared.config
    }

    pub fn sample_rate(&self) -> f64 {
        self.shared.config.sample_rate
    }

    pub fn buffer_size(&self) -> usize {
        self.shared.config.buffer_size
    }

    /// Start rendering. Refused while the engine is in its fatal state.
    pub fn start(&self) -> Result<()> {
        if let Some(message) = self.fatal_error() {
            return Err(Error::Fatal(message));
        }
        self.shared.running.set(true);

        #[cfg(feature = "device")]
        if let Err(e) = self.start_device() {
            self.shared.running.set(false);
            return Err(e);
        }

        tracing::info!("engine started");
        Ok(())
    }

    /// Stop rendering and finalize any open record files.
    pub fn stop(&self) -> Result<()> {
        #[cfg(feature = "device")]
        if let Some(mut device) = self.device.lock().take() {
            device.stop();
        }

        let was_running = self.shared.running.swap(false);
        self.stop_recording()?;
        if was_running {
            tracing::info!("engine stopped");
        }
        Ok(())
    }

    pub fn is_running(&self) -> bool {
        self.shared.running.get()
    }

    #[cfg(feature = "device")]
    fn start_device(&self) -> Result<()> {
        let Some(config) = self.device_config.clone() else {
            return Ok(());
        };
        let mut slot = self.device.lock();
        if slot.is_none() {
            let mut device = divisi_core::AudioDevice::new(config);
            device.start(self.callback())?;
            *slot = Some(device);
        }
        Ok(())
    }

    /// Handle for a driver to render through.
    pub fn callback(&self) -> EngineCallback {
        EngineCallback {
            shared: Arc::clone(&self.shared),
            state: Arc::clone(&self.state),
        }
    }

    /// Run one driver cycle: one input vector per input channel in, one output vector per
    /// output channel filled. All output vectors must share the block length.
    ///
    /// Renders silence while stopped or halted.
    pub fn process(&self, inputs: &[Vec<f32>], outputs: &mut [Vec<f32>]) {
        self.state.lock().process(&self.shared, inputs, outputs);
    }

    /// Samples rendered since start or the last seek.
    pub fn position(&self) -> u64 {
        self.shared.position.load(Ordering::Relaxed)
    }

    /// Seek every track to timeline sample `position`.
    ///
    /// All tracks are seeked even if one fails; the first failure is returned.
    pub fn set_position(&self, position: u64) -> Result<()> {
        let mut state = self.state.lock();
        let mut first_error = None;
        for track in state.tracks.iter_mut() {
            if let Err(e) = track.set_position(position) {
                tracing::warn!("seeking track {} failed: {e}", track.index());
                first_error.get_or_insert(e);
            }
        }
        state.position = position;
        self.shared.position.store(position, Ordering::Relaxed);
        first_error.map_or(Ok(()), |e| Err(e.into()))
    }

    /// Ramp every output to silence and hold the timeline, or resume.
    pub fn set_paused(&self, paused: bool) {
        let mut state = self.state.lock();
        state.paused = paused;
        fade_towards(&mut state.pause, !paused);
    }

    pub fn is_paused(&self) -> bool {
        self.state.lock().paused
    }

    /// Segment completions, in render order.
    pub fn events(&self) -> Receiver<TrackEvent> {
        self.events.clone()
    }

    // ==================== Faults ====================

    pub fn faults(&self) -> FaultSnapshot {
        self.shared.faults.snapshot()
    }

    pub fn is_fatal(&self) -> bool {
        self.shared.faults.is_fatal()
    }

    /// Why the engine halted, if it did.
    pub fn fatal_error(&self) -> Option<String> {
        if !self.shared.faults.is_fatal() {
            return None;
        }
        Some(
            self.shared
                .faults
                .message()
                .unwrap_or_else(|| "realtime fault".to_string()),
        )
    }

    /// Leave the fatal state. A hung plugin host is rebuilt empty.
    pub fn reset_fault(&self) {
        let mut state = self.state.lock();
        if state.host.is_hung() {
            tracing::warn!("discarding hung plugin host");
            let mut host = PluginHost::new(host_config(&self.shared.config));
            if let Some(loader) = &state.loader {
                host.set_loader(Arc::clone(loader));
            }
            state.host = host;
        }
        self.shared.faults.reset();
        tracing::info!("fault state cleared");
    }

    // ==================== Tracks ====================

    pub fn track_count(&self) -> usize {
        self.shared.config.tracks.len()
    }

    /// Schedule an in-memory segment on `track`.
    pub fn load_audio(
        &self,
        track: usize,
        data: Vec<f32>,
        params: SegmentParams,
    ) -> Result<SegmentId> {
        let channel = self.track_channel(track)?;
        let segment = PlaybackSegment::from_memory(channel, data, params)?;
        self.load_segment(track, segment)
    }

    /// Schedule `file_channel` of the wave file at `path` on `track`.
    ///
    /// The read-ahead is filled before the processing lock is taken.
    pub fn load_file(
        &self,
        track: usize,
        path: impl AsRef<Path>,
        file_channel: usize,
        params: SegmentParams,
    ) -> Result<SegmentId> {
        let channel = self.track_channel(track)?;
        let config = &self.shared.config;
        let segment = PlaybackSegment::from_file(
            channel,
            path,
            file_channel,
            params,
            config.sample_rate.round() as u32,
            StreamConfig::with_buffer_frames(config.file_buffer_size),
        )?;
        self.load_segment(track, segment)
    }

    /// Schedule a prepared segment on `track`.
    pub fn load_segment(&self, track: usize, segment: PlaybackSegment) -> Result<SegmentId> {
        self.check_track(track)?;
        let mut state = self.state.lock();
        Ok(state.tracks[track].load_audio(segment)?)
    }

    pub fn clear_track(&self, track: usize) -> Result<()> {
        self.with_track(track, Track::clear_data)
    }

    /// Reclaim finished segments; `force` drops every segment.
    pub fn cleanup_track(&self, track: usize, force: bool) -> Result<()> {
        self.with_track(track, |t| t.cleanup(force))
    }

    pub fn track_name(&self, track: usize) -> Result<String> {
        self.with_track(track, |t| t.name().to_string())
    }

    pub fn set_track_name(&self, track: usize, name: impl Into<String>) -> Result<()> {
        let name = name.into();
        self.with_track(track, |t| t.set_name(name))
    }

    pub fn track_names(&self) -> Vec<String> {
        let state = self.state.lock();
        state.tracks.iter().map(|t| t.name().to_string()).collect()
    }

    pub fn track_underruns(&self, track: usize) -> Result<u64> {
        self.with_track(track, |t| t.underruns())
    }

    pub fn reset_track_underruns(&self, track: usize) -> Result<()> {
        self.with_track(track, Track::reset_underruns)
    }

    pub fn track_segment_count(&self, track: usize) -> Result<usize> {
        self.with_track(track, |t| t.segment_count())
    }

    /// Whether `track` is audible: the engine runs and it still has data, or its first
    /// underrun lies beyond the rendered position.
    pub fn is_track_playing(&self, track: usize) -> Result<bool> {
        let running = self.is_running();
        let position = self.position();
        self.with_track(track, |t| t.is_playing(running, position))
    }

    /// Ramped gain of an additive track. Multiplying tracks are envelopes and ignore it.
    pub fn set_track_gain(&self, track: usize, gain: f32) -> Result<()> {
        self.check_track(track)?;
        self.state.lock().track_controls[track].gain.set_target(gain);
        Ok(())
    }

    pub fn track_gain(&self, track: usize) -> Result<f32> {
        self.check_track(track)?;
        Ok(self.state.lock().track_controls[track].gain.target())
    }

    pub fn set_track_mute(&self, track: usize, muted: bool) -> Result<()> {
        self.check_track(track)?;
        let mut state = self.state.lock();
        let control = &mut state.track_controls[track];
        control.muted = muted;
        fade_towards(&mut control.mute, !muted);
        Ok(())
    }

    pub fn track_mutes(&self) -> Vec<bool> {
        let state = self.state.lock();
        state.track_controls.iter().map(|c| c.muted).collect()
    }

    fn track_channel(&self, track: usize) -> Result<usize> {
        self.check_track(track)?;
        Ok(self.shared.config.tracks[track].channel)
    }

    fn check_track(&self, track: usize) -> Result<()> {
        let count = self.track_count();
        if track >= count {
            return Err(Error::InvalidTrack {
                index: track,
                count,
            });
        }
        Ok(())
    }

    fn with_track<R>(&self, track: usize, f: impl FnOnce(&mut Track) -> R) -> Result<R> {
        self.check_track(track)?;
        let mut state = self.state.lock();
        Ok(f(&mut state.tracks[track]))
    }

    // ==================== Output channels ====================

    pub fn output_channels(&self) -> usize {
        self.shared.config.output_channels
    }

    pub fn channel_name(&self, channel: usize) -> Result<String> {
        self.check_output(channel)?;
        Ok(self.state.lock().outputs[channel].name.clone())
    }

    pub fn set_channel_name(&self, channel: usize, name: impl Into<String>) -> Result<()> {
        self.check_output(channel)?;
        self.state.lock().outputs[channel].name = name.into();
        Ok(())
    }

    pub fn channel_names(&self) -> Vec<String> {
        let state = self.state.lock();
        state.outputs.iter().map(|c| c.name.clone()).collect()
    }

    /// Ramp output `channel` to `gain` over the fade length.
    pub fn set_gain(&self, channel: usize, gain: f32) -> Result<()> {
        self.check_output(channel)?;
        self.state.lock().outputs[channel].gain.set_target(gain);
        Ok(())
    }

    /// Target gain of every output channel.
    pub fn gains(&self) -> Vec<f32> {
        let state = self.state.lock();
        state.outputs.iter().map(|c| c.gain.target()).collect()
    }

    pub fn set_channel_mute(&self, channel: usize, muted: bool) -> Result<()> {
        self.check_output(channel)?;
        let mut state = self.state.lock();
        let output = &mut state.outputs[channel];
        output.muted = muted;
        fade_towards(&mut output.mute, !muted);
        Ok(())
    }

    pub fn mutes(&self) -> Vec<bool> {
        let state = self.state.lock();
        state.outputs.iter().map(|c| c.muted).collect()
    }

    /// While any channel is soloed, every channel that is not ramps to silence.
    pub fn set_solo(&self, channel: usize, solo: bool) -> Result<()> {
        self.check_output(channel)?;
        let mut state = self.state.lock();
        state.outputs[channel].solo = solo;
        state.update_solo();
        Ok(())
    }

    pub fn solos(&self) -> Vec<bool> {
        let state = self.state.lock();
        state.outputs.iter().map(|c| c.solo).collect()
    }

    /// Peak level since the last [`take_level`](Self::take_level), linear.
    pub fn level(&self, channel: usize) -> Result<f32> {
        Ok(self.output_meter(channel)?.peak())
    }

    pub fn level_db(&self, channel: usize) -> Result<f32> {
        Ok(self.output_meter(channel)?.peak_db())
    }

    /// Read and reset the peak level.
    pub fn take_level(&self, channel: usize) -> Result<f32> {
        Ok(self.output_meter(channel)?.take_peak())
    }

    pub fn levels(&self) -> Vec<f32> {
        self.shared.output_meters.iter().map(ChannelMeter::peak).collect()
    }

    pub fn clip_count(&self, channel: usize) -> Result<u64> {
        Ok(self.output_meter(channel)?.clip_count())
    }

    pub fn reset_clip_count(&self, channel: usize) -> Result<()> {
        self.output_meter(channel)?.reset_clip_count();
        Ok(())
    }

    pub fn reset_clip_counts(&self) {
        for meter in self
            .shared
            .output_meters
            .iter()
            .chain(&self.shared.input_meters)
        {
            meter.reset_clip_count();
        }
    }

    fn output_meter(&self, channel: usize) -> Result<&ChannelMeter> {
        self.check_output(channel)?;
        Ok(&self.shared.output_meters[channel])
    }

    fn check_output(&self, channel: usize) -> Result<()> {
        let count = self.output_channels();
        if channel >= count {
            return Err(Error::InvalidChannel {
                index: channel,
                count,
            });
        }
        Ok(())
    }

    // ==================== Input channels ====================

    pub fn input_channels(&self) -> usize {
        self.shared.config.input_channels
    }

    pub fn input_name(&self, channel: usize) -> Result<String> {
        self.check_input(channel)?;
        Ok(self.state.lock().inputs[channel].name().to_string())
    }

    pub fn set_input_name(&self, channel: usize, name: impl Into<String>) -> Result<()> {
        self.check_input(channel)?;
        self.state.lock().inputs[channel].set_name(name);
        Ok(())
    }

    /// The last `input_buffer_len` samples of `channel`, oldest first.
    pub fn input_buffer(&self, channel: usize) -> Result<Vec<f32>> {
        self.check_input(channel)?;
        Ok(self.state.lock().inputs[channel].get_buffer().to_vec())
    }

    pub fn input_level(&self, channel: usize) -> Result<f32> {
        Ok(self.input_meter(channel)?.peak())
    }

    pub fn input_level_db(&self, channel: usize) -> Result<f32> {
        Ok(self.input_meter(channel)?.peak_db())
    }

    pub fn input_clip_count(&self, channel: usize) -> Result<u64> {
        Ok(self.input_meter(channel)?.clip_count())
    }

    pub fn reset_input_clip_count(&self, channel: usize) -> Result<()> {
        self.input_meter(channel)?.reset_clip_count();
        Ok(())
    }

    fn input_meter(&self, channel: usize) -> Result<&ChannelMeter> {
        self.check_input(channel)?;
        Ok(&self.shared.input_meters[channel])
    }

    fn check_input(&self, channel: usize) -> Result<()> {
        let count = self.input_channels();
        if channel >= count {
            return Err(Error::InvalidChannel {
                index: channel,
                count,
            });
        }
        Ok(())
    }

    // ==================== Recording ====================

    fn record(&self, channel: usize) -> Result<&Arc<Mutex<RecordFile>>> {
        self.check_input(channel)?;
        Ok(&self.records[channel])
    }

    fn status(&self, channel: usize) -> Result<&RecordStatus> {
        self.check_input(channel)?;
        Ok(&self.record_status[channel])
    }

    pub fn record_path(&self, channel: usize) -> Result<PathBuf> {
        Ok(self.status(channel)?.path())
    }

    /// Rename the record file of `channel`. Rejected while it records.
    pub fn set_record_file(&self, channel: usize, path: impl AsRef<Path>) -> Result<()> {
        Ok(self.record(channel)?.lock().set_path(path)?)
    }

    /// Enabling opens the file; disabling finalizes it.
    pub fn set_record_enabled(&self, channel: usize, enabled: bool) -> Result<()> {
        Ok(self.record(channel)?.lock().set_enabled(enabled)?)
    }

    pub fn is_record_enabled(&self, channel: usize) -> Result<bool> {
        Ok(self.status(channel)?.is_enabled())
    }

    /// Stop the take after `samples` file samples. `None` records without limit.
    pub fn set_record_max_length(&self, channel: usize, samples: Option<u64>) -> Result<()> {
        self.record(channel)?.lock().set_max_length(samples);
        Ok(())
    }

    pub fn set_record_paused(&self, channel: usize, paused: bool) -> Result<()> {
        self.record(channel)?.lock().set_paused(paused);
        Ok(())
    }

    /// Keep every `factor`-th input sample in the file.
    pub fn set_record_downsample(&self, channel: usize, factor: usize) -> Result<()> {
        Ok(self.record(channel)?.lock().set_downsample(factor)?)
    }

    /// Samples queued to the open file of `channel`.
    pub fn record_written(&self, channel: usize) -> Result<u64> {
        Ok(self.status(channel)?.written())
    }

    /// Samples of the current take lost because the file writer fell behind.
    pub fn record_dropped(&self, channel: usize) -> Result<u64> {
        Ok(self.status(channel)?.dropped())
    }

    /// Open every enabled record file and start writing input to it.
    pub fn start_recording(&self) -> Result<()> {
        if !self.is_running() {
            return Err(Error::NotRunning);
        }
        for record in &self.records {
            record.lock().prepare()?;
        }
        self.state.lock().recording = true;
        tracing::info!("recording started on {} inputs", self.records.len());
        Ok(())
    }

    /// Stop writing and finalize every open record file. Returns the samples per channel.
    pub fn stop_recording(&self) -> Result<Vec<u64>> {
        let was_recording = std::mem::replace(&mut self.state.lock().recording, false);
        let mut written = Vec::with_capacity(self.records.len());
        for record in &self.records {
            written.push(record.lock().close()?);
        }
        if was_recording {
            tracing::info!("recording stopped");
        }
        Ok(written)
    }

    pub fn is_recording(&self) -> bool {
        self.state.lock().recording
    }

    // ==================== Plugins ====================

    pub fn set_plugin_loader(&self, loader: Arc<dyn PluginLoader>) {
        let mut state = self.state.lock();
        state.host.set_loader(Arc::clone(&loader));
        state.loader = Some(loader);
    }

    /// Open a plugin through the installed loader and place it in `layer`.
    pub fn load_plugin(
        &self,
        path: impl AsRef<Path>,
        routing: PluginRouting,
        layer: usize,
    ) -> Result<PluginId> {
        Ok(self.state.lock().host.load_plugin(path, routing, layer)?)
    }

    /// Place an in-process plugin in `layer`.
    pub fn insert_plugin(
        &self,
        plugin: Box<dyn AudioPlugin>,
        routing: PluginRouting,
        layer: usize,
    ) -> Result<PluginId> {
        Ok(self.state.lock().host.insert_plugin(plugin, routing, layer)?)
    }

    pub fn unload_plugin(&self, id: PluginId) -> Result<()> {
        Ok(self.state.lock().host.unload_plugin(id)?)
    }

    pub fn plugin_ids(&self) -> Vec<PluginId> {
        self.state.lock().host.plugin_ids()
    }

    pub fn plugin_info(&self, id: PluginId) -> Result<PluginInfo> {
        Ok(self.state.lock().host.plugin_info(id)?.clone())
    }

    pub fn plugin_parameter(&self, id: PluginId, index: usize) -> Result<f32> {
        Ok(self.state.lock().host.parameter(id, index)?)
    }

    pub fn set_plugin_parameter(&self, id: PluginId, index: usize, value: f32) -> Result<()> {
        Ok(self.state.lock().host.set_parameter(id, index, value)?)
    }

    pub fn plugin_parameters(&self, id: PluginId) -> Result<Vec<ParameterInfo>> {
        Ok(self.state.lock().host.parameters(id)?)
    }

    pub fn plugin_program_names(&self, id: PluginId) -> Result<Vec<String>> {
        Ok(self.state.lock().host.program_names(id)?)
    }

    pub fn plugin_program(&self, id: PluginId) -> Result<usize> {
        Ok(self.state.lock().host.program(id)?)
    }

    pub fn set_plugin_program(&self, id: PluginId, index: usize) -> Result<()> {
        Ok(self.state.lock().host.set_program(id, index)?)
    }

    /// How many plugins read the recursion buffer of `layer`/`channel`.
    pub fn recursion_usage(&self, layer: usize, channel: usize) -> usize {
        self.state.lock().host.recursion_usage(layer, channel)
    }
}

impl Drop for Engine {
    fn drop(&mut self) {
        if let Err(e) = self.stop() {
            tracing::warn!("stopping engine failed: {e}");
        }
    }
}

impl std::fmt::Debug for Engine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Engine")
            .field("config", &self.shared.config)
            .field("running", &self.is_running())
            .field("position", &self.position())
            .field("fatal", &self.is_fatal())
            .finish()
    }
}

fn default_record_path(index: usize) -> PathBuf {
    PathBuf::from(format!("input_{}.wav", index + 1))
}
