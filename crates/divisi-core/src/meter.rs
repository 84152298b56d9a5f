//! Per-channel level metering.
//!
//! The audio callback feeds every processed block through [`ChannelMeter::process`]; control
//! threads read the held peak and the clip counter without locking.

use crate::AtomicFloat;
use std::sync::atomic::{AtomicU64, Ordering};

/// Floor reported for silent channels.
pub const SILENCE_DB: f32 = -100.0;

/// Convert a linear amplitude to dBFS, floored at [`SILENCE_DB`].
#[inline]
pub fn amplitude_to_db(amplitude: f32) -> f32 {
    if amplitude <= 1e-5 {
        SILENCE_DB
    } else {
        (20.0 * amplitude.log10()).max(SILENCE_DB)
    }
}

/// Lock-free peak level and clip counter for one channel.
#[derive(Debug, Default)]
pub struct ChannelMeter {
    peak: AtomicFloat,
    clips: AtomicU64,
}

impl ChannelMeter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record one block. Samples with magnitude at or above full scale count as clipped.
    pub fn process(&self, buffer: &[f32]) {
        let mut peak = 0.0f32;
        let mut clipped = 0u64;
        for &sample in buffer {
            let magnitude = sample.abs();
            if magnitude >= 1.0 {
                clipped += 1;
            }
            peak = peak.max(magnitude);
        }
        self.peak.fetch_max(peak);
        if clipped > 0 {
            self.clips.fetch_add(clipped, Ordering::Relaxed);
        }
    }

    /// Peak since the last [`take_peak`](Self::take_peak).
    pub fn peak(&self) -> f32 {
        self.peak.get()
    }

    pub fn peak_db(&self) -> f32 {
        amplitude_to_db(self.peak())
    }

    /// Read and reset the held peak, for meters that poll once per display frame.
    pub fn take_peak(&self) -> f32 {
        self.peak.take()
    }

    pub fn clip_count(&self) -> u64 {
        self.clips.load(Ordering::Relaxed)
    }

    pub fn reset_clip_count(&self) {
        self.clips.store(0, Ordering::Relaxed);
    }

    pub fn reset(&self) {
        self.peak.set(0.0);
        self.reset_clip_count();
    }
}
