//! Streaming configuration.

use std::time::Duration;

/// Configuration for threaded file streaming.
#[derive(Debug, Clone, Copy)]
pub struct StreamConfig {
    /// Frames per read-ahead half (default: 32768)
    pub buffer_frames: usize,
    /// How long a seek waits for both halves to refill (default: 2s)
    pub seek_timeout: Duration,
    /// Idle wake-up interval of the reader thread (default: 1s)
    pub idle_wait: Duration,
}

impl Default for StreamConfig {
    fn default() -> Self {
        Self {
            buffer_frames: 32768,
            seek_timeout: Duration::from_secs(2),
            idle_wait: Duration::from_secs(1),
        }
    }
}

impl StreamConfig {
    pub fn with_buffer_frames(frames: usize) -> Self {
        Self {
            buffer_frames: frames.max(1),
            ..Default::default()
        }
    }
}
