//! Loop arithmetic shared by memory- and file-backed segments.
//!
//! A segment plays `loop_count` passes over `loop_length` samples of source data (0 passes
//! means forever). The first pass starts at `start_offset`. With loop crossfading the first
//! `crossfade_offset` samples of each following pass were already mixed into the tail of the
//! pass before it, so later passes resume at `crossfade_offset`:
//!
//! ```text
//! total = (loop_length - start_offset) + (loop_count - 1) * (loop_length - crossfade_offset)
//! ```

/// Where a stream sample comes from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LoopPosition {
    /// Zero-based pass.
    pub pass: usize,
    /// Index into the loop's source data.
    pub offset: usize,
}

/// Static loop geometry of a segment.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LoopLayout {
    pub loop_length: usize,
    pub loop_count: usize,
    pub start_offset: usize,
    pub crossfade_offset: usize,
}

impl LoopLayout {
    /// Callers guarantee `start_offset < loop_length` and `crossfade_offset < loop_length`.
    pub fn new(
        loop_length: usize,
        loop_count: usize,
        start_offset: usize,
        crossfade_offset: usize,
    ) -> Self {
        Self {
            loop_length,
            loop_count,
            start_offset,
            crossfade_offset,
        }
    }

    #[inline]
    pub fn is_endless(&self) -> bool {
        self.loop_count == 0
    }

    /// Samples the segment produces; 0 when endless.
    pub fn total_length(&self) -> usize {
        if self.is_endless() {
            return 0;
        }
        self.first_pass_length() + (self.loop_count - 1) * self.later_pass_length()
    }

    #[inline]
    fn first_pass_length(&self) -> usize {
        self.loop_length - self.start_offset
    }

    #[inline]
    fn later_pass_length(&self) -> usize {
        self.loop_length - self.crossfade_offset
    }

    /// Map a stream index to its pass and source offset.
    pub fn locate(&self, index: usize) -> LoopPosition {
        let first = self.first_pass_length();
        if index < first {
            return LoopPosition {
                pass: 0,
                offset: self.start_offset + index,
            };
        }
        let rest = index - first;
        let span = self.later_pass_length();
        LoopPosition {
            pass: 1 + rest / span,
            offset: self.crossfade_offset + rest % span,
        }
    }

    /// Whether another pass follows `pass`.
    #[inline]
    pub fn has_following_pass(&self, pass: usize) -> bool {
        self.is_endless() || pass + 1 < self.loop_count
    }
}
