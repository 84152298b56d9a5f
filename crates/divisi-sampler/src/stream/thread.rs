//! Reader thread: refills recycled chunks from the file.

use super::chunk::{Chunk, FillSignal};
use crate::file::WavSource;
use crate::layout::LoopLayout;
use crate::{Error, Result};
use crossbeam_channel::{Receiver, RecvTimeoutError};
use parking_lot::Mutex;
use ringbuf::traits::{Consumer, Producer};
use ringbuf::{HeapCons, HeapProd};
use std::sync::Arc;
use std::time::Duration;

pub(super) enum ReaderCommand {
    /// A chunk was recycled and wants refilling.
    Load,
    Stop,
}

/// File handle and write cursor, shared between the thread and seeks.
pub(super) struct ReaderState {
    pub(super) source: WavSource,
    pub(super) layout: LoopLayout,
    /// Frame of the snippet's first sample in the file.
    pub(super) file_offset: u64,
    /// Stream index of the next sample to read.
    pub(super) cursor: usize,
    pub(super) generation: u64,
    pub(super) failure: Option<String>,
}

impl ReaderState {
    pub(super) fn at_end(&self) -> bool {
        !self.layout.is_endless() && self.cursor >= self.layout.total_length()
    }

    /// Fill `chunk` from the cursor, re-seeking at every loop seam.
    pub(super) fn fill(&mut self, chunk: &mut Chunk) -> Result<()> {
        chunk.generation = self.generation;
        chunk.start = self.cursor;
        chunk.len = 0;

        let capacity = chunk.data.len();
        while chunk.len < capacity && !self.at_end() {
            let position = self.layout.locate(self.cursor);
            let mut wanted = (capacity - chunk.len).min(self.layout.loop_length - position.offset);
            if !self.layout.is_endless() {
                wanted = wanted.min(self.layout.total_length() - self.cursor);
            }

            let frame = self.file_offset + position.offset as u64;
            if self.source.position() != frame {
                self.source.seek(frame)?;
            }

            let read = self
                .source
                .read(&mut chunk.data[chunk.len..chunk.len + wanted])?;
            if read == 0 {
                return Err(Error::ReadFailed {
                    path: self.source.path().to_path_buf(),
                    reason: format!("unexpected end of file at frame {frame}"),
                });
            }
            chunk.len += read;
            self.cursor += read;
        }
        Ok(())
    }
}

pub(super) fn reader_loop(
    state: Arc<Mutex<ReaderState>>,
    mut empty: HeapCons<Chunk>,
    mut filled: HeapProd<Chunk>,
    commands: Receiver<ReaderCommand>,
    signal: Arc<FillSignal>,
    idle_wait: Duration,
) {
    loop {
        match commands.recv_timeout(idle_wait) {
            Ok(ReaderCommand::Load) | Err(RecvTimeoutError::Timeout) => {}
            Ok(ReaderCommand::Stop) | Err(RecvTimeoutError::Disconnected) => break,
        }

        // Held across fill and push so a seek never interleaves with a half-built chunk.
        let mut guard = state.lock();
        if guard.failure.is_some() {
            continue;
        }
        while !guard.at_end() {
            let Some(mut chunk) = empty.try_pop() else {
                break;
            };
            if let Err(e) = guard.fill(&mut chunk) {
                tracing::warn!("stream read failed: {e}");
                guard.failure = Some(e.to_string());
            }
            // Ring capacity equals the chunk count, so this cannot overflow.
            let _ = filled.try_push(chunk);
            signal.notify();
            if guard.failure.is_some() {
                break;
            }
        }
    }
    tracing::debug!("stream reader thread exiting");
}
