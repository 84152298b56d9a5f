//! Input channels: a ring of recent input plus an optional record file.

use crate::record::{RecordFile, RecordStatus};
use crate::{Error, Result};
use parking_lot::Mutex;
use std::path::Path;
use std::sync::Arc;

/// One device input channel.
///
/// The audio thread calls [`save_buffer`](Self::save_buffer) once per callback. The record
/// file sits behind its own lock, held by control threads only to open, close, rename or
/// reconfigure it; the audio thread waits for the lock so no input is lost. Queries go
/// through [`RecordStatus`] and never take the lock.
pub struct InputChannel {
    index: usize,
    name: String,
    ring: Vec<f32>,
    write_pos: usize,
    /// Time-ordered copy handed out by `get_buffer`.
    flip: Vec<f32>,
    record: Arc<Mutex<RecordFile>>,
    status: Arc<RecordStatus>,
}

impl InputChannel {
    pub fn new(index: usize, capacity: usize, record: RecordFile) -> Result<Self> {
        if capacity == 0 {
            return Err(Error::InvalidParameter(
                "input buffer capacity must be positive".into(),
            ));
        }
        Ok(Self {
            index,
            name: format!("Input {}", index + 1),
            ring: vec![0.0; capacity],
            write_pos: 0,
            flip: vec![0.0; capacity],
            status: record.status(),
            record: Arc::new(Mutex::new(record)),
        })
    }

    /// Append `samples` to the ring and, if `save_to_file`, to the record file.
    ///
    /// A record file that hits its length limit is closed and immediately re-enabled, so the
    /// next [`prepare_recording`](Self::prepare_recording) starts a fresh take.
    pub fn save_buffer(&mut self, samples: &[f32], save_to_file: bool) {
        let capacity = self.ring.len();
        let tail = &samples[samples.len().saturating_sub(capacity)..];

        let first = tail.len().min(capacity - self.write_pos);
        self.ring[self.write_pos..self.write_pos + first].copy_from_slice(&tail[..first]);
        let rest = tail.len() - first;
        self.ring[..rest].copy_from_slice(&tail[first..]);
        self.write_pos = (self.write_pos + tail.len()) % capacity;

        if !save_to_file {
            return;
        }
        let mut record = self.record.lock();
        if record.write(samples) {
            record.mark_enabled();
        }
    }

    /// The last `capacity` input samples, oldest first.
    pub fn get_buffer(&mut self) -> &[f32] {
        let (newer, older) = self.ring.split_at(self.write_pos);
        self.flip[..older.len()].copy_from_slice(older);
        self.flip[older.len()..].copy_from_slice(newer);
        &self.flip
    }

    /// Change the record file path. Rejected while recording.
    pub fn set_file_name(&self, path: impl AsRef<Path>) -> Result<()> {
        self.record.lock().set_path(path)
    }

    /// Open the record file if recording is enabled but no file is open.
    pub fn prepare_recording(&self) -> Result<()> {
        self.record.lock().prepare()
    }

    /// Shared handle to the record file for control-side configuration.
    pub fn record_file(&self) -> Arc<Mutex<RecordFile>> {
        Arc::clone(&self.record)
    }

    pub fn index(&self) -> usize {
        self.index
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn set_name(&mut self, name: impl Into<String>) {
        self.name = name.into();
    }

    pub fn capacity(&self) -> usize {
        self.ring.len()
    }

    /// Record file state readable without the lock.
    pub fn record_status(&self) -> Arc<RecordStatus> {
        Arc::clone(&self.status)
    }

    /// Zero the ring.
    pub fn clear(&mut self) {
        self.ring.fill(0.0);
        self.write_pos = 0;
    }
}

impl std::fmt::Debug for InputChannel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("InputChannel")
            .field("index", &self.index)
            .field("name", &self.name)
            .field("capacity", &self.ring.len())
            .field("write_pos", &self.write_pos)
            .finish()
    }
}
