//! Consumer side of a streamed file channel.

use super::chunk::{Chunk, FillSignal};
use super::thread::{reader_loop, ReaderCommand, ReaderState};
use crate::config::StreamConfig;
use crate::file::WavSource;
use crate::layout::{LoopLayout, LoopPosition};
use crate::{Error, Result};
use crossbeam_channel::{bounded, Sender};
use parking_lot::Mutex;
use ringbuf::traits::{Consumer, Observer, Producer, Split};
use ringbuf::{HeapCons, HeapProd, HeapRb};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Instant;
use thread_priority::ThreadPriority;

/// Chunks in flight per reader (the ping-pong pair).
const CHUNKS: usize = 2;

/// Read-ahead reader for one channel of a wave file.
///
/// The stream it delivers is the raw sample sequence of a looped snippet: `layout.loop_length`
/// frames starting at `file_offset`, repeated according to `layout`. Ramps are applied by the
/// owning segment.
///
/// [`next_sample`](Self::next_sample) is realtime safe. [`set_position`](Self::set_position)
/// blocks until both chunks are refilled and must not run concurrently with sample retrieval.
pub struct BufferedFileReader {
    state: Arc<Mutex<ReaderState>>,
    filled: HeapCons<Chunk>,
    recycle: HeapProd<Chunk>,
    commands: Sender<ReaderCommand>,
    signal: Arc<FillSignal>,
    handle: Option<JoinHandle<()>>,
    layout: LoopLayout,
    path: PathBuf,
    config: StreamConfig,
    active: Option<Chunk>,
    active_pos: usize,
    standby: Option<Chunk>,
    generation: u64,
    consumed: usize,
    last_sample: f32,
}

impl BufferedFileReader {
    /// Open `channel` of `path`, start the reader thread and prime both chunks from the start
    /// of the stream.
    pub fn open(
        path: impl AsRef<Path>,
        channel: usize,
        layout: LoopLayout,
        file_offset: u64,
        config: StreamConfig,
    ) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        let source = WavSource::open(&path, channel)?;
        let frames = source.info().frames;

        if layout.loop_length == 0 {
            return Err(Error::InvalidParameter(format!(
                "empty snippet in {}",
                path.display()
            )));
        }
        if file_offset + layout.loop_length as u64 > frames {
            return Err(Error::InvalidParameter(format!(
                "snippet {}..{} exceeds {} ({} frames)",
                file_offset,
                file_offset + layout.loop_length as u64,
                path.display(),
                frames
            )));
        }

        let (mut recycle, empty) = HeapRb::<Chunk>::new(CHUNKS).split();
        let (filled_tx, filled) = HeapRb::<Chunk>::new(CHUNKS).split();
        for _ in 0..CHUNKS {
            let _ = recycle.try_push(Chunk::new(config.buffer_frames));
        }

        let state = Arc::new(Mutex::new(ReaderState {
            source,
            layout,
            file_offset,
            cursor: 0,
            generation: 0,
            failure: None,
        }));
        let signal = Arc::new(FillSignal::default());
        let (tx, rx) = bounded(CHUNKS * 4);

        let thread_state = Arc::clone(&state);
        let thread_signal = Arc::clone(&signal);
        let idle_wait = config.idle_wait;
        let handle = thread::Builder::new()
            .name("divisi-reader".into())
            .spawn(move || {
                let _ = thread_priority::set_current_thread_priority(ThreadPriority::Max);
                reader_loop(thread_state, empty, filled_tx, rx, thread_signal, idle_wait);
            })
            .map_err(|_| Error::ThreadSpawn("stream reader"))?;

        let mut reader = Self {
            state,
            filled,
            recycle,
            commands: tx,
            signal,
            handle: Some(handle),
            layout,
            path,
            config,
            active: None,
            active_pos: 0,
            standby: None,
            generation: 0,
            consumed: 0,
            last_sample: 0.0,
        };
        reader.set_position(0)?;
        tracing::debug!(
            "streaming {} channel {channel} ({} frames per chunk)",
            reader.path.display(),
            config.buffer_frames
        );
        Ok(reader)
    }

    /// Next raw stream sample. Returns 0.0 once the stream is done.
    #[inline]
    pub fn next_sample(&mut self) -> Result<f32> {
        if self.is_done() {
            return Ok(0.0);
        }
        let exhausted = match &self.active {
            Some(chunk) => self.active_pos >= chunk.len,
            None => true,
        };
        if exhausted {
            self.flip()?;
        }
        let Some(chunk) = self.active.as_ref() else {
            return Err(Error::Underrun {
                position: self.consumed,
            });
        };
        let value = chunk.data[self.active_pos];
        self.active_pos += 1;
        self.consumed += 1;
        self.last_sample = value;
        Ok(value)
    }

    /// Hand the spent chunk back for refilling and switch to the other one.
    fn flip(&mut self) -> Result<()> {
        if let Some(spent) = self.active.take() {
            let _ = self.recycle.try_push(spent);
            let _ = self.commands.try_send(ReaderCommand::Load);
        }
        self.active_pos = 0;

        let next = match self.standby.take() {
            Some(chunk) => Some(chunk),
            None => self.filled.try_pop(),
        };
        match next {
            Some(chunk) if chunk.generation == self.generation && chunk.len > 0 => {
                self.active = Some(chunk);
                Ok(())
            }
            Some(chunk) => {
                let _ = self.recycle.try_push(chunk);
                let _ = self.commands.try_send(ReaderCommand::Load);
                Err(Error::Underrun {
                    position: self.consumed,
                })
            }
            None => Err(Error::Underrun {
                position: self.consumed,
            }),
        }
    }

    /// Re-seek to stream index `position` and wait until both chunks hold fresh data.
    ///
    /// Fails with [`Error::SeekTimeout`] if the reader thread does not deliver within the
    /// configured timeout.
    pub fn set_position(&mut self, position: usize) -> Result<()> {
        let position = if self.layout.is_endless() {
            position
        } else {
            position.min(self.layout.total_length())
        };

        {
            let mut state = self.state.lock();
            state.generation += 1;
            state.cursor = position;
            state.failure = None;
            if !state.at_end() {
                let frame = state.file_offset + self.layout.locate(position).offset as u64;
                state.source.seek(frame)?;
            }
            self.generation = state.generation;
        }

        for chunk in [self.active.take(), self.standby.take()].into_iter().flatten() {
            let _ = self.recycle.try_push(chunk);
        }
        self.active_pos = 0;
        self.consumed = position;
        self.last_sample = 0.0;
        let _ = self.commands.try_send(ReaderCommand::Load);

        let deadline = Instant::now() + self.config.seek_timeout;
        loop {
            let seen = self.signal.count();
            self.collect();
            if self.is_primed() {
                return Ok(());
            }
            if let Some(reason) = self.state.lock().failure.clone() {
                return Err(Error::ReadFailed {
                    path: self.path.clone(),
                    reason,
                });
            }
            if !self.signal.wait_past(seen, deadline) {
                return Err(Error::SeekTimeout {
                    timeout_ms: self.config.seek_timeout.as_millis() as u64,
                });
            }
        }
    }

    /// Move delivered chunks into the active and standby slots, recycling stale ones.
    fn collect(&mut self) {
        while let Some(chunk) = self.filled.try_pop() {
            if chunk.generation != self.generation {
                let _ = self.recycle.try_push(chunk);
                let _ = self.commands.try_send(ReaderCommand::Load);
            } else if self.active.is_none() {
                self.active = Some(chunk);
                self.active_pos = 0;
            } else if self.standby.is_none() {
                self.standby = Some(chunk);
            } else {
                let _ = self.recycle.try_push(chunk);
            }
        }
    }

    fn is_primed(&self) -> bool {
        if self.is_done() {
            return true;
        }
        let total = self.layout.total_length();
        match (&self.active, &self.standby) {
            (Some(_), Some(_)) => true,
            (Some(active), None) => !self.layout.is_endless() && active.end() >= total,
            _ => false,
        }
    }

    /// The stream has delivered its last sample.
    #[inline]
    pub fn is_done(&self) -> bool {
        !self.layout.is_endless() && self.consumed >= self.layout.total_length()
    }

    /// Whether a sample can be delivered without touching the ring.
    pub fn has_data(&self) -> bool {
        if self.is_done() {
            return true;
        }
        let active_left = self
            .active
            .as_ref()
            .is_some_and(|chunk| self.active_pos < chunk.len);
        active_left || self.standby.is_some() || self.filled.occupied_len() > 0
    }

    /// Samples the stream delivers in total; 0 when endless.
    pub fn used_length(&self) -> usize {
        self.layout.total_length()
    }

    /// Samples delivered since the last seek origin.
    pub fn position(&self) -> usize {
        self.consumed
    }

    pub fn loop_position(&self) -> LoopPosition {
        self.layout.locate(self.consumed)
    }

    pub fn last_sample(&self) -> f32 {
        self.last_sample
    }

    pub fn layout(&self) -> &LoopLayout {
        &self.layout
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn stop(&mut self) {
        let _ = self.commands.send(ReaderCommand::Stop);
        if let Some(handle) = self.handle.take() {
            let _ = handle.join();
        }
    }
}

impl Drop for BufferedFileReader {
    fn drop(&mut self) {
        self.stop();
    }
}

impl std::fmt::Debug for BufferedFileReader {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BufferedFileReader")
            .field("path", &self.path)
            .field("layout", &self.layout)
            .field("position", &self.consumed)
            .finish()
    }
}
