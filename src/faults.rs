//! Realtime fault accounting.
//!
//! The audio callback never returns errors. Stream underruns and plugin failures are counted
//! here instead; past the configured threshold, or at once for a plugin hang, the engine
//! enters its fatal state and renders silence until reset.

use divisi_core::AtomicFlag;
use parking_lot::Mutex;
use std::sync::atomic::{AtomicU64, Ordering};

/// Snapshot of the fault counters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FaultSnapshot {
    /// File streams that ran dry on the audio thread.
    pub stream_underruns: u64,
    pub plugin_errors: u64,
    pub plugin_hangs: u64,
}

impl FaultSnapshot {
    pub fn total(&self) -> u64 {
        self.stream_underruns + self.plugin_errors + self.plugin_hangs
    }
}

#[derive(Debug)]
pub struct FaultCounters {
    threshold: u64,
    stream_underruns: AtomicU64,
    plugin_errors: AtomicU64,
    plugin_hangs: AtomicU64,
    fatal: AtomicFlag,
    message: Mutex<Option<String>>,
}

impl FaultCounters {
    pub fn new(threshold: u32) -> Self {
        Self {
            threshold: u64::from(threshold),
            stream_underruns: AtomicU64::new(0),
            plugin_errors: AtomicU64::new(0),
            plugin_hangs: AtomicU64::new(0),
            fatal: AtomicFlag::new(false),
            message: Mutex::new(None),
        }
    }

    pub fn stream_underrun(&self, reason: &dyn std::fmt::Display) {
        self.stream_underruns.fetch_add(1, Ordering::Relaxed);
        self.check_threshold(reason);
    }

    pub fn plugin_error(&self, reason: &dyn std::fmt::Display) {
        self.plugin_errors.fetch_add(1, Ordering::Relaxed);
        self.check_threshold(reason);
    }

    /// Hangs are fatal immediately.
    pub fn plugin_hang(&self, reason: &dyn std::fmt::Display) {
        self.plugin_hangs.fetch_add(1, Ordering::Relaxed);
        self.escalate(reason);
    }

    pub fn is_fatal(&self) -> bool {
        self.fatal.get()
    }

    pub fn message(&self) -> Option<String> {
        self.message.lock().clone()
    }

    pub fn snapshot(&self) -> FaultSnapshot {
        FaultSnapshot {
            stream_underruns: self.stream_underruns.load(Ordering::Relaxed),
            plugin_errors: self.plugin_errors.load(Ordering::Relaxed),
            plugin_hangs: self.plugin_hangs.load(Ordering::Relaxed),
        }
    }

    pub fn reset(&self) {
        self.stream_underruns.store(0, Ordering::Relaxed);
        self.plugin_errors.store(0, Ordering::Relaxed);
        self.plugin_hangs.store(0, Ordering::Relaxed);
        *self.message.lock() = None;
        self.fatal.set(false);
    }

    fn check_threshold(&self, reason: &dyn std::fmt::Display) {
        let snapshot = self.snapshot();
        if snapshot.stream_underruns + snapshot.plugin_errors > self.threshold {
            self.escalate(&format_args!(
                "{} realtime faults exceeded the threshold of {}; last: {reason}",
                snapshot.stream_underruns + snapshot.plugin_errors,
                self.threshold
            ));
        }
    }

    fn escalate(&self, reason: &dyn std::fmt::Display) {
        if self.fatal.swap(true) {
            return;
        }
        let message = reason.to_string();
        tracing::error!("engine halted: {message}");
        // the control side may hold the lock while reading; the flag alone already halts
        if let Some(mut slot) = self.message.try_lock() {
            *slot = Some(message);
        }
    }
}
