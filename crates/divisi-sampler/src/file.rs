//! Wave file access.
//!
//! [`AudioFileInfo::probe`] reads a file's header without opening a stream.
//! [`WavSource`] reads one channel of a file as `f32` frames from an arbitrary frame position.

use crate::{Error, Result};
use hound::{SampleFormat, WavReader};
use std::fs::File;
use std::io::BufReader;
use std::path::{Path, PathBuf};

/// Static properties of a wave file.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AudioFileInfo {
    pub channels: usize,
    pub frames: u64,
    pub sample_rate: u32,
    pub bits_per_sample: u16,
    pub float: bool,
}

impl AudioFileInfo {
    pub fn probe(path: impl AsRef<Path>) -> Result<Self> {
        let reader = open_reader(path.as_ref())?;
        Ok(Self::from_reader(&reader))
    }

    fn from_reader(reader: &WavReader<BufReader<File>>) -> Self {
        let spec = reader.spec();
        Self {
            channels: spec.channels as usize,
            frames: reader.duration() as u64,
            sample_rate: spec.sample_rate,
            bits_per_sample: spec.bits_per_sample,
            float: spec.sample_format == SampleFormat::Float,
        }
    }

    /// Length in seconds.
    pub fn duration_secs(&self) -> f64 {
        self.frames as f64 / self.sample_rate as f64
    }
}

fn open_reader(path: &Path) -> Result<WavReader<BufReader<File>>> {
    if !path.exists() {
        return Err(Error::FileNotFound(path.to_path_buf()));
    }
    WavReader::open(path).map_err(|e| match e {
        hound::Error::FormatError(reason) => Error::UnsupportedFormat {
            path: path.to_path_buf(),
            reason: reason.to_string(),
        },
        hound::Error::Unsupported => Error::UnsupportedFormat {
            path: path.to_path_buf(),
            reason: "unsupported wave feature".into(),
        },
        hound::Error::IoError(io) => Error::Io(io),
        other => Error::Hound(other),
    })
}

/// Sequential reader for one channel of a wave file.
pub struct WavSource {
    reader: WavReader<BufReader<File>>,
    info: AudioFileInfo,
    path: PathBuf,
    channel: usize,
    frame: u64,
    int_scale: f32,
}

impl WavSource {
    pub fn open(path: impl AsRef<Path>, channel: usize) -> Result<Self> {
        let path = path.as_ref();
        let reader = open_reader(path)?;
        let info = AudioFileInfo::from_reader(&reader);
        if channel >= info.channels {
            return Err(Error::InvalidParameter(format!(
                "channel {channel} out of range, {} has {} channels",
                path.display(),
                info.channels
            )));
        }
        let int_scale = if info.float {
            1.0
        } else {
            1.0 / (1u64 << (info.bits_per_sample.saturating_sub(1))) as f32
        };

        Ok(Self {
            reader,
            info,
            path: path.to_path_buf(),
            channel,
            frame: 0,
            int_scale,
        })
    }

    pub fn info(&self) -> &AudioFileInfo {
        &self.info
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Frame the next [`read`](Self::read) starts at.
    pub fn position(&self) -> u64 {
        self.frame
    }

    pub fn seek(&mut self, frame: u64) -> Result<()> {
        if frame > self.info.frames {
            return Err(Error::InvalidParameter(format!(
                "seek to frame {frame} beyond end of {} ({} frames)",
                self.path.display(),
                self.info.frames
            )));
        }
        self.reader.seek(frame as u32)?;
        self.frame = frame;
        Ok(())
    }

    /// Fill `out` with consecutive frames of the selected channel. Returns the frames read,
    /// short only at end of file.
    pub fn read(&mut self, out: &mut [f32]) -> Result<usize> {
        let channels = self.info.channels;
        let channel = self.channel;
        let remaining = (self.info.frames - self.frame) as usize;
        let wanted = out.len().min(remaining);
        let mut read = 0;

        if self.info.float {
            let mut samples = self.reader.samples::<f32>();
            'frames: for slot in out[..wanted].iter_mut() {
                for ch in 0..channels {
                    let Some(sample) = samples.next() else {
                        break 'frames;
                    };
                    let sample = sample?;
                    if ch == channel {
                        *slot = sample;
                    }
                }
                read += 1;
            }
        } else {
            let scale = self.int_scale;
            let mut samples = self.reader.samples::<i32>();
            'frames: for slot in out[..wanted].iter_mut() {
                for ch in 0..channels {
                    let Some(sample) = samples.next() else {
                        break 'frames;
                    };
                    let sample = sample?;
                    if ch == channel {
                        *slot = sample as f32 * scale;
                    }
                }
                read += 1;
            }
        }

        self.frame += read as u64;
        Ok(read)
    }
}

impl std::fmt::Debug for WavSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WavSource")
            .field("path", &self.path)
            .field("channel", &self.channel)
            .field("frame", &self.frame)
            .field("info", &self.info)
            .finish()
    }
}
