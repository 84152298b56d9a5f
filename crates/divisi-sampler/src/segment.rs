//! Scheduled playback segments.
//!
//! A [`PlaybackSegment`] is one chunk of audio on a track's timeline, backed by memory or by
//! a [`BufferedFileReader`]. It produces one sample per call with, in order: the begin/end
//! ramp, the crossfade ramps towards neighbouring segments, the loop seam ramp (plus the
//! pre-ramped head of the loop when loop crossfading) and the static gain.

use crate::config::StreamConfig;
use crate::file::{AudioFileInfo, WavSource};
use crate::layout::{LoopLayout, LoopPosition};
use crate::stream::BufferedFileReader;
use crate::{Error, Result};
use divisi_core::{hanning_down, hanning_up};
use std::path::Path;
use std::sync::Arc;

/// Longest crossfade between neighbouring segments, in samples.
pub const MAX_CROSSFADE_LENGTH: usize = 1_000_000;

/// Scheduling and shaping parameters for a new segment.
#[derive(Debug, Clone, PartialEq)]
pub struct SegmentParams {
    /// Passes over the data; 0 loops forever.
    pub loop_count: usize,
    /// Silence inserted between the end of the previous segment and this one.
    pub offset: usize,
    /// Where in the data the first pass starts.
    pub start_offset: usize,
    /// First file frame of the snippet (file-backed only).
    pub file_offset: u64,
    /// Snippet length in frames (file-backed only); `None` runs to the end of the file.
    pub length: Option<usize>,
    pub gain: f32,
    pub name: Option<String>,
    /// Hanning fade-in and fade-out length.
    pub ramp_length: usize,
    /// Ramp length at every loop seam.
    pub loop_ramp_length: usize,
    /// Overlap consecutive passes by `loop_ramp_length` instead of ramping each to silence.
    pub loop_crossfade: bool,
    /// Overlap with the previous segment on the track.
    pub crossfade_length: usize,
}

impl Default for SegmentParams {
    fn default() -> Self {
        Self {
            loop_count: 1,
            offset: 0,
            start_offset: 0,
            file_offset: 0,
            length: None,
            gain: 1.0,
            name: None,
            ramp_length: 0,
            loop_ramp_length: 0,
            loop_crossfade: false,
            crossfade_length: 0,
        }
    }
}

impl SegmentParams {
    pub fn loops(mut self, count: usize) -> Self {
        self.loop_count = count;
        self
    }

    pub fn offset(mut self, samples: usize) -> Self {
        self.offset = samples;
        self
    }

    pub fn start_offset(mut self, samples: usize) -> Self {
        self.start_offset = samples;
        self
    }

    pub fn snippet(mut self, file_offset: u64, length: usize) -> Self {
        self.file_offset = file_offset;
        self.length = Some(length);
        self
    }

    pub fn gain(mut self, gain: f32) -> Self {
        self.gain = gain;
        self
    }

    pub fn name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    pub fn ramp(mut self, samples: usize) -> Self {
        self.ramp_length = samples;
        self
    }

    pub fn loop_ramp(mut self, samples: usize, crossfade: bool) -> Self {
        self.loop_ramp_length = samples;
        self.loop_crossfade = crossfade;
        self
    }

    pub fn crossfade(mut self, samples: usize) -> Self {
        self.crossfade_length = samples;
        self
    }

    /// Check every invariant against a loop of `loop_length` samples and derive the layout.
    fn layout(&self, loop_length: usize) -> Result<LoopLayout> {
        if loop_length == 0 {
            return Err(Error::InvalidParameter("segment holds no samples".into()));
        }
        if self.start_offset >= loop_length {
            return Err(Error::InvalidParameter(format!(
                "start offset {} not inside {loop_length} samples",
                self.start_offset
            )));
        }
        if self.loop_ramp_length > loop_length / 2 {
            return Err(Error::InvalidParameter(format!(
                "loop ramp {} longer than half a loop ({loop_length} samples)",
                self.loop_ramp_length
            )));
        }
        if self.crossfade_length > MAX_CROSSFADE_LENGTH {
            return Err(Error::InvalidParameter(format!(
                "crossfade {} exceeds {MAX_CROSSFADE_LENGTH} samples",
                self.crossfade_length
            )));
        }
        if self.offset > 0 && self.crossfade_length > 0 {
            return Err(Error::InvalidParameter(
                "offset and crossfade are mutually exclusive".into(),
            ));
        }
        if !self.gain.is_finite() {
            return Err(Error::InvalidParameter(format!("gain {} not finite", self.gain)));
        }

        let crossfade_offset = if self.loop_crossfade {
            self.loop_ramp_length
        } else {
            0
        };
        let layout = LoopLayout::new(
            loop_length,
            self.loop_count,
            self.start_offset,
            crossfade_offset,
        );

        let span = if layout.is_endless() {
            loop_length
        } else {
            layout.total_length()
        };
        if self.ramp_length > span / 2 {
            return Err(Error::InvalidParameter(format!(
                "ramp {} longer than half the segment ({span} samples)",
                self.ramp_length
            )));
        }
        if !layout.is_endless() && self.crossfade_length > span {
            return Err(Error::InvalidParameter(format!(
                "crossfade {} longer than the segment ({span} samples)",
                self.crossfade_length
            )));
        }
        Ok(layout)
    }
}

enum SegmentData {
    Memory(Vec<f32>),
    File(Box<BufferedFileReader>),
}

/// One scheduled chunk of audio.
pub struct PlaybackSegment {
    channel: usize,
    name: Arc<str>,
    layout: LoopLayout,
    total_length: usize,
    offset: usize,
    gain: f32,
    ramp_length: usize,
    loop_ramp_length: usize,
    loop_crossfade: bool,
    crossfade_left: usize,
    crossfade_right: usize,
    global_position: u64,
    total_position: usize,
    in_use: bool,
    ready: bool,
    /// Head of the loop pre-multiplied by the rising seam ramp.
    crossfade_buffer: Vec<f32>,
    data: SegmentData,
}

impl PlaybackSegment {
    /// Segment over an in-memory vector for track `channel`.
    pub fn from_memory(channel: usize, data: Vec<f32>, params: SegmentParams) -> Result<Self> {
        let layout = params.layout(data.len())?;
        let crossfade_buffer = ramped_head(&data, &params);
        Ok(Self::assemble(
            channel,
            layout,
            params,
            crossfade_buffer,
            SegmentData::Memory(data),
        ))
    }

    /// Segment streaming `file_channel` of the wave file at `path` for track `channel`.
    ///
    /// The file must run at `sample_rate`.
    pub fn from_file(
        channel: usize,
        path: impl AsRef<Path>,
        file_channel: usize,
        params: SegmentParams,
        sample_rate: u32,
        config: StreamConfig,
    ) -> Result<Self> {
        let path = path.as_ref();
        let info = AudioFileInfo::probe(path)?;
        if info.sample_rate != sample_rate {
            return Err(Error::SampleRateMismatch {
                path: path.to_path_buf(),
                file_rate: info.sample_rate,
                engine_rate: sample_rate,
            });
        }
        if params.file_offset >= info.frames {
            return Err(Error::InvalidParameter(format!(
                "file offset {} beyond end of {} ({} frames)",
                params.file_offset,
                path.display(),
                info.frames
            )));
        }
        let available = (info.frames - params.file_offset) as usize;
        let loop_length = params.length.unwrap_or(available);
        if loop_length > available {
            return Err(Error::InvalidParameter(format!(
                "snippet of {loop_length} frames exceeds the {available} frames after offset {}",
                params.file_offset
            )));
        }
        let layout = params.layout(loop_length)?;

        let crossfade_buffer = if params.loop_crossfade && params.loop_ramp_length > 0 {
            let mut source = WavSource::open(path, file_channel)?;
            source.seek(params.file_offset)?;
            let mut head = vec![0.0; params.loop_ramp_length];
            source.read(&mut head)?;
            ramped_head(&head, &params)
        } else {
            Vec::new()
        };

        let reader =
            BufferedFileReader::open(path, file_channel, layout, params.file_offset, config)?;
        tracing::debug!(
            "file segment {} ({} samples, {} loops)",
            path.display(),
            layout.total_length(),
            layout.loop_count
        );

        let mut segment = Self::assemble(
            channel,
            layout,
            params,
            crossfade_buffer,
            SegmentData::File(Box::new(reader)),
        );
        if segment.name.is_empty() {
            segment.name = Arc::from(path.display().to_string());
        }
        Ok(segment)
    }

    fn assemble(
        channel: usize,
        layout: LoopLayout,
        params: SegmentParams,
        crossfade_buffer: Vec<f32>,
        data: SegmentData,
    ) -> Self {
        Self {
            channel,
            name: Arc::from(params.name.unwrap_or_default()),
            layout,
            total_length: layout.total_length(),
            offset: params.offset,
            gain: params.gain,
            ramp_length: params.ramp_length,
            loop_ramp_length: params.loop_ramp_length,
            loop_crossfade: params.loop_crossfade,
            crossfade_left: params.crossfade_length,
            crossfade_right: 0,
            global_position: 0,
            total_position: 0,
            in_use: true,
            ready: true,
            crossfade_buffer,
            data,
        }
    }

    /// Next output sample. `no_ramp` skips the begin/end and neighbour crossfade ramps.
    ///
    /// Returns 0.0 once the segment is done. Fails only when a file-backed segment's
    /// read-ahead ran dry.
    #[inline]
    pub fn next_sample(&mut self, no_ramp: bool) -> Result<f32> {
        if !self.in_use {
            return Ok(0.0);
        }
        let index = self.total_position;
        let position = self.layout.locate(index);
        let raw = match &mut self.data {
            SegmentData::Memory(data) => data[position.offset],
            SegmentData::File(reader) => reader.next_sample()?,
        };
        self.total_position += 1;

        let mut value = raw;
        if !no_ramp {
            value *= self.envelope(index);
        }
        value = self.apply_loop_seam(position, value);
        value *= self.gain;

        if !self.is_endless() && self.total_position >= self.total_length {
            self.in_use = false;
        }
        Ok(value)
    }

    /// Begin/end ramp and neighbour crossfade factor at stream `index`.
    fn envelope(&self, index: usize) -> f32 {
        let remaining = if self.is_endless() {
            usize::MAX
        } else {
            self.total_length - index
        };
        let mut factor = 1.0;
        if index < self.ramp_length {
            factor *= hanning_up(index, self.ramp_length);
        }
        if remaining <= self.ramp_length {
            factor *= hanning_down(self.ramp_length - remaining, self.ramp_length);
        }
        if index < self.crossfade_left {
            factor *= hanning_up(index, self.crossfade_left);
        }
        if remaining <= self.crossfade_right {
            factor *= hanning_down(self.crossfade_right - remaining, self.crossfade_right);
        }
        factor
    }

    fn apply_loop_seam(&self, position: LoopPosition, value: f32) -> f32 {
        let ramp = self.loop_ramp_length;
        if ramp == 0 {
            return value;
        }
        let seam = self.layout.loop_length - ramp;
        let mut value = value;
        if self.layout.has_following_pass(position.pass) && position.offset >= seam {
            let j = position.offset - seam;
            value *= hanning_down(j, ramp);
            if self.loop_crossfade {
                value += self.crossfade_buffer[j];
            }
        }
        if !self.loop_crossfade && position.pass > 0 && position.offset < ramp {
            value *= hanning_up(position.offset, ramp);
        }
        value
    }

    /// Stop the read-ahead thread, leaving only the chunks already delivered.
    #[cfg(test)]
    pub(crate) fn stop_stream(&mut self) {
        if let SegmentData::File(reader) = &mut self.data {
            reader.stop();
        }
    }

    /// Move the cursor to stream index `position`. File-backed segments block until their
    /// read-ahead is refilled.
    pub fn set_position(&mut self, position: usize) -> Result<()> {
        let position = if self.is_endless() {
            position
        } else {
            position.min(self.total_length)
        };
        self.total_position = position;
        self.in_use = self.is_endless() || position < self.total_length;
        if let SegmentData::File(reader) = &mut self.data {
            if let Err(e) = reader.set_position(position) {
                self.ready = false;
                return Err(e);
            }
            self.ready = true;
        }
        Ok(())
    }

    /// Track index this segment was loaded for.
    pub fn channel(&self) -> usize {
        self.channel
    }

    pub fn name(&self) -> &Arc<str> {
        &self.name
    }

    pub fn is_file(&self) -> bool {
        matches!(self.data, SegmentData::File(_))
    }

    #[inline]
    pub fn is_endless(&self) -> bool {
        self.layout.is_endless()
    }

    /// Samples produced in total; 0 when endless.
    pub fn total_length(&self) -> usize {
        self.total_length
    }

    pub fn single_loop_length(&self) -> usize {
        self.layout.loop_length
    }

    pub fn layout(&self) -> &LoopLayout {
        &self.layout
    }

    pub fn offset(&self) -> usize {
        self.offset
    }

    pub fn gain(&self) -> f32 {
        self.gain
    }

    /// Samples produced so far.
    pub fn total_position(&self) -> usize {
        self.total_position
    }

    /// Offset of the next sample inside the loop data.
    pub fn position(&self) -> usize {
        self.layout.locate(self.total_position).offset
    }

    /// Samples left; `usize::MAX` when endless.
    pub fn remaining(&self) -> usize {
        if self.is_endless() {
            usize::MAX
        } else {
            self.total_length - self.total_position
        }
    }

    #[inline]
    pub fn in_use(&self) -> bool {
        self.in_use
    }

    #[inline]
    pub fn is_ready(&self) -> bool {
        self.ready
    }

    /// Track timeline sample of this segment's first output sample.
    pub fn global_position(&self) -> u64 {
        self.global_position
    }

    pub fn crossfade_left(&self) -> usize {
        self.crossfade_left
    }

    pub fn crossfade_right(&self) -> usize {
        self.crossfade_right
    }

    pub(crate) fn set_global_position(&mut self, position: u64) {
        self.global_position = position;
    }

    pub(crate) fn set_crossfade_right(&mut self, samples: usize) {
        self.crossfade_right = samples;
    }

    pub(crate) fn clear_crossfade_left(&mut self) {
        self.crossfade_left = 0;
    }

    pub(crate) fn finish(&mut self) {
        self.in_use = false;
    }
}

impl std::fmt::Debug for PlaybackSegment {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PlaybackSegment")
            .field("name", &self.name)
            .field("channel", &self.channel)
            .field("layout", &self.layout)
            .field("global_position", &self.global_position)
            .field("total_position", &self.total_position)
            .field("in_use", &self.in_use)
            .field("file", &self.is_file())
            .finish()
    }
}

fn ramped_head(data: &[f32], params: &SegmentParams) -> Vec<f32> {
    if !params.loop_crossfade || params.loop_ramp_length == 0 {
        return Vec::new();
    }
    let ramp = params.loop_ramp_length;
    data[..ramp]
        .iter()
        .enumerate()
        .map(|(j, &s)| s * hanning_up(j, ramp))
        .collect()
}
