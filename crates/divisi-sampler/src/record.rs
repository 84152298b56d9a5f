//! Recording of one input channel to a 32-bit float wave file.
//!
//! The audio thread pushes samples into a ring drained by a writer thread, so file I/O never
//! runs inside the callback. Opening and closing happen on control threads. Path, enabled
//! flag and counters are mirrored into a [`RecordStatus`] that queries read without the
//! record file's lock.

use crate::{Error, Result};
use crossbeam_channel::{bounded, Receiver, RecvTimeoutError, Sender};
use divisi_core::AtomicFlag;
use hound::{SampleFormat, WavSpec, WavWriter};
use parking_lot::Mutex;
use ringbuf::traits::{Consumer, Producer, Split};
use ringbuf::{HeapCons, HeapProd, HeapRb};
use std::fs::File;
use std::io::BufWriter;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;
use thread_priority::ThreadPriority;

/// Minimum ring capacity between the audio thread and the writer, in samples.
const MIN_RING_SAMPLES: usize = 16384;
const WRITER_IDLE_WAIT: Duration = Duration::from_millis(100);

enum WriterCommand {
    Flush,
    Stop,
}

struct Writer {
    samples: HeapProd<f32>,
    commands: Sender<WriterCommand>,
    handle: JoinHandle<Result<u64>>,
}

/// Record file state shared with query threads.
#[derive(Debug)]
pub struct RecordStatus {
    path: Mutex<PathBuf>,
    enabled: AtomicFlag,
    written: AtomicU64,
    dropped: AtomicU64,
}

impl RecordStatus {
    fn new(path: PathBuf) -> Self {
        Self {
            path: Mutex::new(path),
            enabled: AtomicFlag::new(false),
            written: AtomicU64::new(0),
            dropped: AtomicU64::new(0),
        }
    }

    pub fn path(&self) -> PathBuf {
        self.path.lock().clone()
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled.get()
    }

    /// Samples queued to the current file.
    pub fn written(&self) -> u64 {
        self.written.load(Ordering::Relaxed)
    }

    /// Samples lost because the writer fell behind.
    pub fn dropped(&self) -> u64 {
        self.dropped.load(Ordering::Relaxed)
    }
}

/// Record target of an input channel.
pub struct RecordFile {
    path: PathBuf,
    sample_rate: u32,
    downsample: usize,
    max_length: Option<u64>,
    enabled: bool,
    paused: bool,
    phase: usize,
    written: u64,
    dropped: u64,
    writer: Option<Writer>,
    /// Writer finalizing after the length limit was hit on the audio thread.
    pending: Option<JoinHandle<Result<u64>>>,
    status: Arc<RecordStatus>,
}

impl RecordFile {
    /// Closed, disabled record target at `path` for a stream at `sample_rate`.
    pub fn new(path: impl Into<PathBuf>, sample_rate: u32) -> Self {
        let path = path.into();
        Self {
            status: Arc::new(RecordStatus::new(path.clone())),
            path,
            sample_rate,
            downsample: 1,
            max_length: None,
            enabled: false,
            paused: false,
            phase: 0,
            written: 0,
            dropped: 0,
            writer: None,
            pending: None,
        }
    }

    /// Enable opens the file, disable finalizes it.
    pub fn set_enabled(&mut self, enabled: bool) -> Result<()> {
        self.store_enabled(enabled);
        if enabled {
            self.prepare()
        } else {
            self.close().map(|_| ())
        }
    }

    /// Open the file if recording is enabled and no file is open.
    pub fn prepare(&mut self) -> Result<()> {
        if self.enabled && self.writer.is_none() {
            self.open()?;
        }
        Ok(())
    }

    fn open(&mut self) -> Result<()> {
        self.join_pending();

        let spec = WavSpec {
            channels: 1,
            sample_rate: (self.sample_rate / self.downsample as u32).max(1),
            bits_per_sample: 32,
            sample_format: SampleFormat::Float,
        };
        let wav = WavWriter::create(&self.path, spec)?;

        let capacity = (self.sample_rate as usize).max(MIN_RING_SAMPLES);
        let (samples, consumer) = HeapRb::<f32>::new(capacity).split();
        let (commands, rx) = bounded(16);
        let handle = thread::Builder::new()
            .name("divisi-recorder".into())
            .spawn(move || {
                let _ = thread_priority::set_current_thread_priority(ThreadPriority::Max);
                writer_loop(wav, consumer, rx)
            })
            .map_err(|_| Error::ThreadSpawn("record writer"))?;

        self.writer = Some(Writer {
            samples,
            commands,
            handle,
        });
        self.phase = 0;
        self.written = 0;
        self.dropped = 0;
        self.publish_counts();
        tracing::info!(
            "recording to {} at {} Hz",
            self.path.display(),
            spec.sample_rate
        );
        Ok(())
    }

    /// Queue `samples` for the file. Realtime safe.
    ///
    /// Returns `true` when the length limit was reached: the file then disables itself and
    /// finalizes in the background.
    pub fn write(&mut self, samples: &[f32]) -> bool {
        if !self.enabled || self.paused {
            return false;
        }
        let Some(writer) = self.writer.as_mut() else {
            return false;
        };

        let mut limit_reached = false;
        for &sample in samples {
            let keep = self.phase == 0;
            self.phase = (self.phase + 1) % self.downsample;
            if !keep {
                continue;
            }
            if self.max_length.is_some_and(|max| self.written >= max) {
                limit_reached = true;
                break;
            }
            if writer.samples.try_push(sample).is_ok() {
                self.written += 1;
            } else {
                self.dropped += 1;
            }
        }
        if self.max_length.is_some_and(|max| self.written >= max) {
            limit_reached = true;
        }
        let _ = writer.commands.try_send(WriterCommand::Flush);
        self.publish_counts();

        if limit_reached {
            self.store_enabled(false);
            self.detach();
        }
        limit_reached
    }

    /// Stop the writer without waiting for it to finalize.
    pub(crate) fn detach(&mut self) {
        if let Some(writer) = self.writer.take() {
            let _ = writer.commands.try_send(WriterCommand::Stop);
            // dropping the sender also stops the thread if the command did not fit
            drop(writer.commands);
            // an older finalizer still running is left detached
            let _ = self.pending.replace(writer.handle);
        }
    }

    /// Set the enabled flag without touching the file.
    pub(crate) fn mark_enabled(&mut self) {
        self.store_enabled(true);
    }

    fn store_enabled(&mut self, enabled: bool) {
        self.enabled = enabled;
        self.status.enabled.set(enabled);
    }

    fn publish_counts(&self) {
        self.status.written.store(self.written, Ordering::Relaxed);
        self.status.dropped.store(self.dropped, Ordering::Relaxed);
    }

    /// Finalize the open file. Returns the samples written to it.
    pub fn close(&mut self) -> Result<u64> {
        self.join_pending();
        let Some(writer) = self.writer.take() else {
            return Ok(0);
        };
        let _ = writer.commands.send(WriterCommand::Stop);
        drop(writer.commands);
        let written = writer
            .handle
            .join()
            .map_err(|_| Error::Io(std::io::Error::other("record writer panicked")))??;
        tracing::info!("closed {} ({written} samples)", self.path.display());
        Ok(written)
    }

    fn join_pending(&mut self) {
        if let Some(handle) = self.pending.take() {
            match handle.join() {
                Ok(Ok(written)) => {
                    tracing::info!(
                        "finalized {} at length limit ({written} samples)",
                        self.path.display()
                    );
                }
                Ok(Err(e)) => tracing::warn!("finalizing {} failed: {e}", self.path.display()),
                Err(_) => tracing::warn!("record writer for {} panicked", self.path.display()),
            }
        }
    }

    /// Change the target file. Rejected while recording; otherwise the current file is
    /// finalized and the new one opened if recording is enabled.
    pub fn set_path(&mut self, path: impl AsRef<Path>) -> Result<()> {
        if self.is_recording() {
            return Err(Error::RecordingActive);
        }
        self.close()?;
        self.path = path.as_ref().to_path_buf();
        *self.status.path.lock() = self.path.clone();
        self.prepare()
    }

    /// Keep every `factor`-th sample. Takes effect at the next open.
    pub fn set_downsample(&mut self, factor: usize) -> Result<()> {
        if factor == 0 {
            return Err(Error::InvalidParameter("downsample factor must be at least 1".into()));
        }
        if self.writer.is_some() {
            return Err(Error::RecordingActive);
        }
        self.downsample = factor;
        Ok(())
    }

    /// Limit the file to `samples` samples after downsampling. `None` records without limit.
    pub fn set_max_length(&mut self, samples: Option<u64>) {
        self.max_length = samples;
    }

    pub fn set_paused(&mut self, paused: bool) {
        self.paused = paused;
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    pub fn is_paused(&self) -> bool {
        self.paused
    }

    pub fn is_open(&self) -> bool {
        self.writer.is_some()
    }

    /// A file is open and samples are being written.
    pub fn is_recording(&self) -> bool {
        self.enabled && !self.paused && self.writer.is_some()
    }

    pub fn downsample(&self) -> usize {
        self.downsample
    }

    pub fn max_length(&self) -> Option<u64> {
        self.max_length
    }

    /// Samples queued to the current file.
    pub fn written(&self) -> u64 {
        self.written
    }

    /// Samples lost because the writer fell behind.
    pub fn dropped(&self) -> u64 {
        self.dropped
    }

    /// Lock-free view of path, enabled flag and counters.
    pub fn status(&self) -> Arc<RecordStatus> {
        Arc::clone(&self.status)
    }
}

impl Drop for RecordFile {
    fn drop(&mut self) {
        if let Err(e) = self.close() {
            tracing::warn!("closing {} failed: {e}", self.path.display());
        }
    }
}

impl std::fmt::Debug for RecordFile {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RecordFile")
            .field("path", &self.path)
            .field("enabled", &self.enabled)
            .field("paused", &self.paused)
            .field("open", &self.is_open())
            .field("written", &self.written)
            .finish()
    }
}

fn writer_loop(
    mut wav: WavWriter<BufWriter<File>>,
    mut samples: HeapCons<f32>,
    commands: Receiver<WriterCommand>,
) -> Result<u64> {
    let mut scratch = vec![0.0f32; 4096];
    let mut written = 0u64;
    loop {
        let stop = match commands.recv_timeout(WRITER_IDLE_WAIT) {
            Ok(WriterCommand::Flush) | Err(RecvTimeoutError::Timeout) => false,
            Ok(WriterCommand::Stop) | Err(RecvTimeoutError::Disconnected) => true,
        };
        loop {
            let count = samples.pop_slice(&mut scratch);
            if count == 0 {
                break;
            }
            for &sample in &scratch[..count] {
                wav.write_sample(sample)?;
            }
            written += count as u64;
        }
        if stop {
            break;
        }
    }
    wav.finalize()?;
    Ok(written)
}
