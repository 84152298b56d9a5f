//! Read-ahead chunk and fill notification.

use parking_lot::{Condvar, Mutex};
use std::time::Instant;

/// One half of the ping-pong pair.
pub(super) struct Chunk {
    pub(super) data: Vec<f32>,
    pub(super) len: usize,
    /// Stream index of `data[0]`.
    pub(super) start: usize,
    /// Seek generation the chunk was filled for.
    pub(super) generation: u64,
}

impl Chunk {
    pub(super) fn new(frames: usize) -> Self {
        Self {
            data: vec![0.0; frames],
            len: 0,
            start: 0,
            generation: 0,
        }
    }

    #[inline]
    pub(super) fn end(&self) -> usize {
        self.start + self.len
    }
}

/// Counts completed fills so a seeking consumer can sleep until the next one.
#[derive(Default)]
pub(super) struct FillSignal {
    fills: Mutex<u64>,
    condvar: Condvar,
}

impl FillSignal {
    pub(super) fn notify(&self) {
        let mut fills = self.fills.lock();
        *fills += 1;
        self.condvar.notify_all();
    }

    pub(super) fn count(&self) -> u64 {
        *self.fills.lock()
    }

    /// Wait until the count moves past `seen`. Returns `false` on timeout.
    pub(super) fn wait_past(&self, seen: u64, deadline: Instant) -> bool {
        let mut fills = self.fills.lock();
        while *fills == seen {
            if self.condvar.wait_until(&mut fills, deadline).timed_out() {
                return *fills != seen;
            }
        }
        true
    }
}
