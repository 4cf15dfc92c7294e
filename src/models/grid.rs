//! Discrete time grid over the scheduling window.

use serde::{Deserialize, Serialize};

use super::TimeWindow;

/// Uniform time grid: slot `i` covers `[start + i*res, start + (i+1)*res)`.
///
/// Score rows and the timeline are both indexed by this grid. The last
/// slot may extend past the window end when the window length is not a
/// multiple of the resolution.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub struct TimeGrid {
    /// Time of slot 0 (ms).
    pub start_ms: i64,
    /// End of the scheduling window (ms, exclusive).
    pub end_ms: i64,
    /// Slot width (ms).
    pub resolution_ms: i64,
    /// Number of slots.
    pub len: usize,
}

impl TimeGrid {
    /// Creates a grid over [start, end) with the given resolution.
    ///
    /// A non-positive resolution or empty range yields an empty grid.
    pub fn new(start_ms: i64, end_ms: i64, resolution_ms: i64) -> Self {
        let len = if resolution_ms > 0 && end_ms > start_ms {
            ceil_div(end_ms.saturating_sub(start_ms), resolution_ms) as usize
        } else {
            0
        };
        Self {
            start_ms,
            end_ms,
            resolution_ms,
            len,
        }
    }

    /// Whether the grid has no slots.
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Start time of slot `idx` (ms). Saturates instead of overflowing.
    #[inline]
    pub fn time_at(&self, idx: usize) -> i64 {
        let idx = i64::try_from(idx).unwrap_or(i64::MAX);
        self.start_ms
            .saturating_add(idx.saturating_mul(self.resolution_ms))
    }

    /// Index of the slot containing `time_ms`, clamped to `[0, len]`.
    pub fn index_floor(&self, time_ms: i64) -> usize {
        if time_ms <= self.start_ms || self.resolution_ms <= 0 {
            return 0;
        }
        ((time_ms.saturating_sub(self.start_ms) / self.resolution_ms) as usize).min(self.len)
    }

    /// Index of the first slot starting at or after `time_ms`, clamped to `[0, len]`.
    pub fn index_ceil(&self, time_ms: i64) -> usize {
        if time_ms <= self.start_ms || self.resolution_ms <= 0 {
            return 0;
        }
        let offset = time_ms.saturating_sub(self.start_ms);
        (ceil_div(offset, self.resolution_ms) as usize).min(self.len)
    }

    /// Number of slots a span of `duration_ms` occupies (rounded up).
    #[inline]
    pub fn slots_for(&self, duration_ms: i64) -> usize {
        if duration_ms <= 0 || self.resolution_ms <= 0 {
            return 0;
        }
        usize::try_from(ceil_div(duration_ms, self.resolution_ms)).unwrap_or(usize::MAX)
    }

    /// Iterator over slot start times.
    pub fn times(&self) -> impl Iterator<Item = i64> + '_ {
        (0..self.len).map(|i| self.time_at(i))
    }

    /// 1.0 for slots whose start lies inside `window`, 0.0 elsewhere.
    pub fn indicator(&self, window: &TimeWindow) -> Vec<f64> {
        self.times()
            .map(|t| if window.contains(t) { 1.0 } else { 0.0 })
            .collect()
    }

    /// Slot range `[from, to)` covering a window, clamped to the grid.
    pub fn slot_range(&self, window: &TimeWindow) -> (usize, usize) {
        (self.index_floor(window.start_ms), self.index_ceil(window.end_ms))
    }
}

/// `a / b` rounded up, for `a >= 0` and `b > 0`.
#[inline]
fn ceil_div(a: i64, b: i64) -> i64 {
    a / b + i64::from(a % b != 0)
}
