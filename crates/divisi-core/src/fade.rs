//! Hanning ramp state machine.
//!
//! A [`FadeWindow`] produces one gain factor per call. It rests at 1.0 ([`FadeState::Up`]) or
//! 0.0 ([`FadeState::Down`]) and walks a raised-cosine half period of `length` samples while
//! running. Every gain, mute and pause control in the engine owns one.

use crate::{Error, Result};
use std::f64::consts::PI;

/// State of a [`FadeWindow`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FadeState {
    /// Fully open, factor 1.0.
    Up,
    /// Fully closed, factor 0.0.
    Down,
    /// Ramping towards [`FadeState::Up`].
    RunUp,
    /// Ramping towards [`FadeState::Down`].
    RunDown,
}

impl FadeState {
    #[inline]
    pub fn is_running(self) -> bool {
        matches!(self, Self::RunUp | Self::RunDown)
    }
}

/// Raised-cosine rising ramp value at `index` of a ramp `length` samples long.
///
/// `hanning_up(0, n) == 0.0`, rising towards 1.0 at `index == length`.
#[inline]
pub fn hanning_up(index: usize, length: usize) -> f32 {
    if length == 0 {
        return 1.0;
    }
    (0.5 - 0.5 * (PI * index as f64 / length as f64).cos()) as f32
}

/// Complement of [`hanning_up`]: `hanning_up(i, n) + hanning_down(i, n) == 1.0`.
#[inline]
pub fn hanning_down(index: usize, length: usize) -> f32 {
    1.0 - hanning_up(index, length)
}

/// Per-sample Hanning fade.
///
/// Position 0 maps to factor 1.0 and position `length` to 0.0. `RunDown` walks the position
/// upwards from 0, `RunUp` walks it downwards from `length`. The value is computed before the
/// position advances, so a ramp started with [`set_state`](Self::set_state) returns its start
/// value (0.0 for `RunUp`, 1.0 for `RunDown`) on the first call and settles into the terminal
/// state after `length` calls.
#[derive(Debug, Clone)]
pub struct FadeWindow {
    state: FadeState,
    position: u32,
    length: u32,
}

impl FadeWindow {
    pub fn new(length: u32, state: FadeState) -> Self {
        let mut window = Self {
            state,
            position: 0,
            length,
        };
        window.set_state(state);
        window
    }

    /// Change the half period. Fails with [`Error::RampActive`] while a ramp is running.
    pub fn set_length(&mut self, length: u32) -> Result<()> {
        if self.state.is_running() {
            return Err(Error::RampActive);
        }
        self.length = length;
        self.reset_position();
        Ok(())
    }

    /// Switch state and reset the position for it.
    pub fn set_state(&mut self, state: FadeState) {
        self.state = state;
        self.reset_position();
    }

    /// Turn a running ramp around from where it stands. Settled windows are left alone.
    pub fn reverse(&mut self) {
        self.state = match self.state {
            FadeState::RunUp => FadeState::RunDown,
            FadeState::RunDown => FadeState::RunUp,
            settled => settled,
        };
    }

    #[inline]
    pub fn state(&self) -> FadeState {
        self.state
    }

    #[inline]
    pub fn length(&self) -> u32 {
        self.length
    }

    #[inline]
    pub fn position(&self) -> u32 {
        self.position
    }

    #[inline]
    pub fn is_running(&self) -> bool {
        self.state.is_running()
    }

    /// Next gain factor.
    #[inline]
    pub fn value(&mut self) -> f32 {
        if self.length == 0 {
            match self.state {
                FadeState::RunUp => self.set_state(FadeState::Up),
                FadeState::RunDown => self.set_state(FadeState::Down),
                _ => {}
            }
        }

        match self.state {
            FadeState::Down => 0.0,
            FadeState::Up => 1.0,
            FadeState::RunDown => {
                let value = self.current();
                self.position = (self.position + 1).min(self.length);
                if self.position == self.length {
                    self.state = FadeState::Down;
                }
                value
            }
            FadeState::RunUp => {
                let value = self.current();
                self.position = self.position.saturating_sub(1);
                if self.position == 0 {
                    self.state = FadeState::Up;
                }
                value
            }
        }
    }

    /// Multiply `buffer` in place, one [`value`](Self::value) per sample.
    pub fn apply(&mut self, buffer: &mut [f32]) {
        match self.state {
            FadeState::Up => {}
            FadeState::Down => buffer.fill(0.0),
            _ => {
                for sample in buffer.iter_mut() {
                    *sample *= self.value();
                }
            }
        }
    }

    #[inline]
    fn current(&self) -> f32 {
        let length = self.length as f64;
        (0.5 - 0.5 * (PI * (length - self.position as f64) / length).cos()) as f32
    }

    fn reset_position(&mut self) {
        self.position = match self.state {
            FadeState::Up | FadeState::RunDown => 0,
            FadeState::Down | FadeState::RunUp => self.length,
        };
    }
}

impl Default for FadeWindow {
    fn default() -> Self {
        Self::new(0, FadeState::Up)
    }
}
