//! Discretized occupancy model of the scheduling window.
//!
//! One slot per grid step. Slots start out free, exclusion ranges are
//! applied up front, and the engine claims slots tier by tier. A claimed
//! slot is never released during a run.

use crate::error::{Result, SchedulingError};
use crate::models::{TimeGrid, TimeWindow};

/// State of one timeline slot.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SlotState {
    /// Available for placement.
    Free,
    /// Blocked by a caller exclusion range.
    Excluded,
    /// Claimed by an entry scheduled in the given tier.
    Claimed(i32),
}

/// Slot occupancy over a [`TimeGrid`].
#[derive(Debug, Clone)]
pub struct Timeline {
    grid: TimeGrid,
    slots: Vec<SlotState>,
}

impl Timeline {
    /// Creates an all-free timeline over `grid`.
    pub fn new(grid: TimeGrid) -> Self {
        Self {
            grid,
            slots: vec![SlotState::Free; grid.len],
        }
    }

    /// Creates a timeline with the given exclusion ranges applied.
    ///
    /// Every slot that overlaps an exclusion range is marked excluded,
    /// including partially covered ones.
    pub fn with_exclusions(grid: TimeGrid, exclusions: &[TimeWindow]) -> Self {
        let mut timeline = Self::new(grid);
        for window in exclusions {
            let (from, to) = grid.slot_range(window);
            if from >= to {
                continue;
            }
            for slot in &mut timeline.slots[from..to] {
                *slot = SlotState::Excluded;
            }
        }
        timeline
    }

    /// The underlying grid.
    pub fn grid(&self) -> &TimeGrid {
        &self.grid
    }

    /// Number of slots.
    pub fn len(&self) -> usize {
        self.slots.len()
    }

    /// Whether the timeline has no slots.
    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }

    /// State of slot `idx`. Out-of-range slots read as excluded.
    pub fn state(&self, idx: usize) -> SlotState {
        self.slots.get(idx).copied().unwrap_or(SlotState::Excluded)
    }

    /// Whether every slot in `[start, end)` is free.
    ///
    /// Ranges reaching past the last slot are never free. An empty range
    /// is free.
    pub fn is_free(&self, start: usize, end: usize) -> bool {
        if end > self.slots.len() {
            return false;
        }
        start >= end || self.slots[start..end].iter().all(|s| *s == SlotState::Free)
    }

    /// Claims `[start, end)` for `tier`.
    ///
    /// Fails without modifying anything if any slot in the range is not free.
    pub fn occupy(&mut self, start: usize, end: usize, tier: i32) -> Result<()> {
        if !self.is_free(start, end) {
            return Err(SchedulingError::SlotConflict { start, end });
        }
        if start >= end {
            return Ok(());
        }
        for slot in &mut self.slots[start..end] {
            *slot = SlotState::Claimed(tier);
        }
        Ok(())
    }
}
