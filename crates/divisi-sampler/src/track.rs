//! Tracks: chains of segments scheduled for one output channel.
//!
//! Segments live in a [`SegmentArena`] and link forward by [`SegmentId`]. The audio thread
//! pulls samples with [`Track::get_buffer`]; loads, seeks and cleanup run on control threads
//! while the caller holds the engine's processing lock.

use crate::segment::PlaybackSegment;
use crate::{Error, Result};
use crossbeam_channel::Sender;
use divisi_core::{TrackConfig, TrackMode};
use std::sync::Arc;

/// Handle to a segment inside a track's arena.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SegmentId(usize);

struct Node {
    segment: PlaybackSegment,
    next: Option<SegmentId>,
}

/// Slot storage for segments with free-list reuse.
#[derive(Default)]
pub struct SegmentArena {
    slots: Vec<Option<Node>>,
    free: Vec<usize>,
}

impl SegmentArena {
    fn insert(&mut self, segment: PlaybackSegment) -> SegmentId {
        let node = Some(Node {
            segment,
            next: None,
        });
        match self.free.pop() {
            Some(index) => {
                self.slots[index] = node;
                SegmentId(index)
            }
            None => {
                self.slots.push(node);
                SegmentId(self.slots.len() - 1)
            }
        }
    }

    fn remove(&mut self, id: SegmentId) -> Option<PlaybackSegment> {
        let node = self.slots.get_mut(id.0)?.take()?;
        self.free.push(id.0);
        Some(node.segment)
    }

    fn node(&self, id: SegmentId) -> Option<&Node> {
        self.slots.get(id.0)?.as_ref()
    }

    fn node_mut(&mut self, id: SegmentId) -> Option<&mut Node> {
        self.slots.get_mut(id.0)?.as_mut()
    }

    pub fn get(&self, id: SegmentId) -> Option<&PlaybackSegment> {
        self.node(id).map(|n| &n.segment)
    }

    pub fn get_mut(&mut self, id: SegmentId) -> Option<&mut PlaybackSegment> {
        self.node_mut(id).map(|n| &mut n.segment)
    }

    pub fn len(&self) -> usize {
        self.slots.len() - self.free.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn clear(&mut self) {
        self.slots.clear();
        self.free.clear();
    }
}

/// Notifications from the audio thread.
#[derive(Debug, Clone, PartialEq)]
pub enum TrackEvent {
    /// A segment played its last sample.
    SegmentDone { track: usize, name: Arc<str> },
}

/// One virtual output channel.
pub struct Track {
    index: usize,
    channel: usize,
    mode: TrackMode,
    name: String,
    arena: SegmentArena,
    head: Option<SegmentId>,
    current: Option<SegmentId>,
    tail: Option<SegmentId>,
    auto_cleanup: bool,
    endless_loop: bool,
    underruns: u64,
    first_underrun: Option<u64>,
    /// Next sample of the track timeline to render.
    position: u64,
    /// End of the scheduled data on the timeline.
    scheduled_end: u64,
    events: Option<Sender<TrackEvent>>,
}

impl Track {
    pub fn new(index: usize, config: &TrackConfig, auto_cleanup: bool) -> Self {
        Self {
            index,
            channel: config.channel,
            mode: config.mode,
            name: config
                .name
                .clone()
                .unwrap_or_else(|| format!("Track {}", index + 1)),
            arena: SegmentArena::default(),
            head: None,
            current: None,
            tail: None,
            auto_cleanup,
            endless_loop: false,
            underruns: 0,
            first_underrun: None,
            position: 0,
            scheduled_end: 0,
            events: None,
        }
    }

    /// Forward segment completions to `sender`. Sends never block; a full channel drops the
    /// event.
    pub fn set_event_sender(&mut self, sender: Sender<TrackEvent>) {
        self.events = Some(sender);
    }

    /// Append `segment` to the chain and schedule it after the current data.
    pub fn load_audio(&mut self, mut segment: PlaybackSegment) -> Result<SegmentId> {
        if self.auto_cleanup {
            self.cleanup(false);
        }
        if self.endless_loop {
            return Err(Error::EndlessLoopActive);
        }

        let crossfade = segment.crossfade_left();
        match self.tail.and_then(|id| self.arena.get_mut(id)) {
            Some(previous) if previous.in_use() => {
                if previous.is_endless() {
                    return Err(Error::EndlessLoopActive);
                }
                let room = previous.total_length() - previous.crossfade_left();
                if crossfade > room {
                    return Err(Error::InvalidParameter(format!(
                        "crossfade {crossfade} longer than the {room} free samples of the previous segment"
                    )));
                }
                previous.set_crossfade_right(crossfade);
            }
            _ => segment.clear_crossfade_left(),
        }

        let start = self.num_track_samples() + segment.offset() as u64
            - segment.crossfade_left() as u64;
        segment.set_global_position(start);
        if segment.is_endless() {
            self.endless_loop = true;
        } else {
            self.scheduled_end = start + segment.total_length() as u64;
        }

        tracing::debug!(
            "track {} loaded '{}' at {start} ({} samples)",
            self.index,
            segment.name(),
            segment.total_length()
        );

        let id = self.arena.insert(segment);
        if let Some(node) = self.tail.and_then(|t| self.arena.node_mut(t)) {
            node.next = Some(id);
        }
        self.tail = Some(id);
        if self.head.is_none() {
            self.head = Some(id);
        }
        if self.current.is_none() {
            self.current = Some(id);
        }
        Ok(id)
    }

    /// Timeline sample where the next appended segment starts, before its offset.
    ///
    /// A track that ran out of data resumes at the playback position.
    pub fn num_track_samples(&self) -> u64 {
        if self.has_ready_data() {
            self.scheduled_end
        } else {
            self.scheduled_end.max(self.position)
        }
    }

    /// Render the next `buffer.len()` samples of the track.
    ///
    /// Slots without data hold 0.0, or 1.0 in multiply mode, and count as underruns. A
    /// failing file stream silences its slot and the first error is returned after the whole
    /// buffer has been rendered.
    pub fn get_buffer(&mut self, buffer: &mut [f32]) -> Result<()> {
        buffer.fill(match self.mode {
            TrackMode::Add => 0.0,
            TrackMode::Multiply => 1.0,
        });

        let mut first_error = None;
        for slot in buffer.iter_mut() {
            let position = self.position;
            self.position += 1;
            match self.draw(position) {
                Ok(Some(value)) => {
                    *slot = value;
                    self.first_underrun = None;
                }
                Ok(None) => {}
                Err(e) => {
                    self.underrun(position);
                    first_error.get_or_insert(e);
                }
            }
        }
        first_error.map_or(Ok(()), Err)
    }

    /// Sample for timeline slot `position`. `None` leaves the slot at its fill value.
    #[inline]
    fn draw(&mut self, position: u64) -> Result<Option<f32>> {
        let Some(current_id) = self.current else {
            self.underrun(position);
            return Ok(None);
        };
        let Some(node) = self.arena.node_mut(current_id) else {
            self.current = None;
            self.underrun(position);
            return Ok(None);
        };
        let current = &mut node.segment;
        if !current.is_ready() || !current.in_use() {
            self.underrun(position);
            return Ok(None);
        }
        if position < current.global_position() {
            self.underrun(position);
            return Ok(None);
        }

        let overlap = current.crossfade_right() > 0
            && current.remaining() <= current.crossfade_right();
        let mut value = current.next_sample(false)?;
        let done = !current.in_use();
        let next = node.next;

        let mut overlap_result = Ok(());
        if overlap {
            if let Some(next_segment) = next.and_then(|id| self.arena.get_mut(id)) {
                if next_segment.is_ready() {
                    match next_segment.next_sample(false) {
                        Ok(sample) => value += sample,
                        Err(e) => overlap_result = Err(e),
                    }
                }
            }
        }
        // the finished segment hands over even when the incoming stream failed
        if done {
            self.advance(current_id, next);
        }
        overlap_result.map(|()| Some(value))
    }

    fn advance(&mut self, finished: SegmentId, next: Option<SegmentId>) {
        if let (Some(events), Some(segment)) = (&self.events, self.arena.get(finished)) {
            let _ = events.try_send(TrackEvent::SegmentDone {
                track: self.index,
                name: Arc::clone(segment.name()),
            });
        }
        self.current = next;
    }

    fn underrun(&mut self, position: u64) {
        self.underruns += 1;
        self.first_underrun.get_or_insert(position);
    }

    /// Whether the track is audibly playing: the device runs and either no underrun has
    /// reached `audible_position` yet or ready data remains.
    pub fn is_playing(&self, device_running: bool, audible_position: u64) -> bool {
        if !device_running {
            return false;
        }
        let underrun_audible = self
            .first_underrun
            .is_some_and(|first| first <= audible_position);
        !underrun_audible || self.has_ready_data()
    }

    /// A current segment exists and can deliver samples.
    pub fn has_ready_data(&self) -> bool {
        self.current
            .and_then(|id| self.arena.get(id))
            .is_some_and(|s| s.is_ready() && s.in_use())
    }

    /// Seek the track timeline to `position`.
    ///
    /// Segments ending before `position` are marked done, the segment containing it is
    /// seeked into place and later segments restart from their beginning. Past the end of
    /// finite data every segment is done.
    pub fn set_position(&mut self, position: u64) -> Result<()> {
        self.position = position;
        self.first_underrun = None;

        if !self.endless_loop && position >= self.scheduled_end {
            let mut cursor = self.head;
            while let Some(id) = cursor {
                let Some(node) = self.arena.node_mut(id) else {
                    break;
                };
                node.segment.finish();
                cursor = node.next;
            }
            self.current = None;
            return Ok(());
        }

        let mut found = None;
        let mut cursor = self.head;
        while let Some(id) = cursor {
            let Some(node) = self.arena.node_mut(id) else {
                break;
            };
            let segment = &mut node.segment;
            let start = segment.global_position();
            let end = if segment.is_endless() {
                u64::MAX
            } else {
                start + segment.total_length() as u64
            };

            if position >= end {
                segment.finish();
            } else {
                // later segments restart at 0 unless a crossfade overlap already began
                segment.set_position(position.saturating_sub(start) as usize)?;
                found.get_or_insert(id);
            }
            cursor = node.next;
        }
        self.current = found;
        Ok(())
    }

    /// Drop finished segments from the head of the chain. `force` drops every segment,
    /// including an endless loop.
    pub fn cleanup(&mut self, force: bool) {
        if force {
            self.arena.clear();
            self.head = None;
            self.current = None;
            self.tail = None;
            self.endless_loop = false;
            return;
        }

        while let Some(id) = self.head {
            let Some(node) = self.arena.node(id) else {
                self.head = None;
                break;
            };
            if node.segment.in_use() || Some(id) == self.current {
                break;
            }
            self.head = node.next;
            self.arena.remove(id);
        }
        if self.head.is_none() {
            self.tail = None;
            self.current = None;
        }
    }

    /// Drop all data and reset underrun bookkeeping.
    pub fn clear_data(&mut self) {
        self.cleanup(true);
        self.scheduled_end = self.position;
        self.underruns = 0;
        self.first_underrun = None;
    }

    pub fn index(&self) -> usize {
        self.index
    }

    /// Destination output channel.
    pub fn channel(&self) -> usize {
        self.channel
    }

    pub fn mode(&self) -> TrackMode {
        self.mode
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn set_name(&mut self, name: impl Into<String>) {
        self.name = name.into();
    }

    pub fn position(&self) -> u64 {
        self.position
    }

    pub fn underruns(&self) -> u64 {
        self.underruns
    }

    pub fn first_underrun(&self) -> Option<u64> {
        self.first_underrun
    }

    pub fn reset_underruns(&mut self) {
        self.underruns = 0;
        self.first_underrun = None;
    }

    pub fn has_endless_loop(&self) -> bool {
        self.endless_loop
    }

    pub fn segment_count(&self) -> usize {
        self.arena.len()
    }

    pub fn segment(&self, id: SegmentId) -> Option<&PlaybackSegment> {
        self.arena.get(id)
    }

    pub fn current_segment(&self) -> Option<SegmentId> {
        self.current
    }

    /// Segment ids in playback order.
    pub fn segment_ids(&self) -> Vec<SegmentId> {
        let mut ids = Vec::with_capacity(self.arena.len());
        let mut cursor = self.head;
        while let Some(id) = cursor {
            ids.push(id);
            cursor = self.arena.node(id).and_then(|n| n.next);
        }
        ids
    }
}

impl std::fmt::Debug for Track {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Track")
            .field("index", &self.index)
            .field("name", &self.name)
            .field("channel", &self.channel)
            .field("mode", &self.mode)
            .field("segments", &self.arena.len())
            .field("position", &self.position)
            .field("underruns", &self.underruns)
            .finish()
    }
}
