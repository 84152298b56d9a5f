//! Click-free gain changes.

use crate::{FadeState, FadeWindow, Result};

/// Gain value that crossfades from the old to the new setting over a Hanning ramp.
///
/// The embedded [`FadeWindow`] weights the previous gain: it runs down from 1.0 to 0.0 while
/// the output moves from `previous` to `target`.
#[derive(Debug, Clone)]
pub struct RampedGain {
    previous: f32,
    target: f32,
    current: f32,
    fade: FadeWindow,
}

impl RampedGain {
    pub fn new(gain: f32, fade_length: u32) -> Self {
        Self {
            previous: gain,
            target: gain,
            current: gain,
            fade: FadeWindow::new(fade_length, FadeState::Down),
        }
    }

    /// Start a ramp from the current value towards `gain`.
    pub fn set_target(&mut self, gain: f32) {
        if gain == self.target && !self.fade.is_running() {
            return;
        }
        self.previous = self.current;
        self.target = gain;
        self.fade.set_state(FadeState::RunDown);
    }

    /// Jump to `gain` without a ramp.
    pub fn set_immediate(&mut self, gain: f32) {
        self.previous = gain;
        self.target = gain;
        self.current = gain;
        self.fade.set_state(FadeState::Down);
    }

    /// Fails while a ramp is running.
    pub fn set_fade_length(&mut self, length: u32) -> Result<()> {
        self.fade.set_length(length)
    }

    #[inline]
    pub fn target(&self) -> f32 {
        self.target
    }

    #[inline]
    pub fn current(&self) -> f32 {
        self.current
    }

    #[inline]
    pub fn is_ramping(&self) -> bool {
        self.fade.is_running()
    }

    #[inline]
    pub fn next_value(&mut self) -> f32 {
        if self.fade.is_running() {
            let weight = self.fade.value();
            self.current = self.target + (self.previous - self.target) * weight;
        } else {
            self.current = self.target;
        }
        self.current
    }

    pub fn apply(&mut self, buffer: &mut [f32]) {
        if !self.fade.is_running() {
            if self.target != 1.0 {
                for sample in buffer.iter_mut() {
                    *sample *= self.target;
                }
            }
            self.current = self.target;
            return;
        }
        for sample in buffer.iter_mut() {
            *sample *= self.next_value();
        }
    }
}

impl Default for RampedGain {
    fn default() -> Self {
        Self::new(1.0, 0)
    }
}
