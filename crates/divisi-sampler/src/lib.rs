//! Playback and capture for the divisi engine.
//!
//! # Primary API
//!
//! - [`PlaybackSegment`]: one scheduled chunk of memory- or file-backed audio with loops,
//!   ramps and crossfades, configured through [`SegmentParams`]
//! - [`Track`]: a chain of segments rendered into one output channel
//! - [`BufferedFileReader`]: ping-pong read-ahead of a wave file on a background thread
//! - [`InputChannel`]: ring of recent input plus an optional [`RecordFile`]
//! - [`AudioFileInfo`]: static probe of a wave file
//!
//! # Example
//!
//! ```ignore
//! use divisi_sampler::{PlaybackSegment, SegmentParams, Track};
//!
//! let mut track = Track::new(0, &TrackConfig::new(0), true);
//! let params = SegmentParams::default().loops(2).loop_ramp(100, true);
//! track.load_audio(PlaybackSegment::from_memory(0, samples, params)?)?;
//! track.get_buffer(&mut output)?;
//! ```

pub mod error;
pub use error::{Error, Result};

mod config;
pub use config::StreamConfig;

mod file;
pub use file::{AudioFileInfo, WavSource};

mod layout;
pub use layout::{LoopLayout, LoopPosition};

mod stream;
pub use stream::BufferedFileReader;

mod segment;
pub use segment::{PlaybackSegment, SegmentParams, MAX_CROSSFADE_LENGTH};

mod track;
pub use track::{SegmentArena, SegmentId, Track, TrackEvent};

mod record;
pub use record::{RecordFile, RecordStatus};

mod input;
pub use input::InputChannel;

pub mod prelude {
    pub use crate::{
        AudioFileInfo, Error, InputChannel, PlaybackSegment, RecordFile, Result, SegmentParams,
        StreamConfig, Track, TrackEvent,
    };
}
