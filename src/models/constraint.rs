//! Global score constraints.
//!
//! A constraint maps a block onto a multiplicative factor per grid slot.
//! Constraints supplied with a request apply to every candidate: they
//! multiply each category's score row, and on their own (together with
//! the observability window) form the fallback score when a category
//! scorer fails.

use std::fmt::Debug;

use super::{CandidateBlock, TimeGrid, TimeWindow};

/// A constraint applied to the score rows of all candidates.
///
/// Returned rows must have one entry per grid slot. `0.0` forbids the
/// slot; values between 0 and 1 soften it.
pub trait ScoreConstraint: Send + Sync + Debug {
    /// Constraint name, used in log output.
    fn name(&self) -> &str;

    /// Evaluates the constraint for `block` over `grid`.
    fn evaluate(&self, block: &CandidateBlock, grid: &TimeGrid) -> Vec<f64>;
}

/// Allows observation only inside a set of windows.
///
/// Typical use: astronomical night, or dome-open periods.
#[derive(Debug, Clone)]
pub struct WindowConstraint {
    name: String,
    windows: Vec<TimeWindow>,
}

impl WindowConstraint {
    /// Creates a constraint with no windows (forbids everything).
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            windows: Vec::new(),
        }
    }

    /// Adds an allowed window.
    pub fn with_window(mut self, start_ms: i64, end_ms: i64) -> Self {
        self.windows.push(TimeWindow::new(start_ms, end_ms));
        self
    }
}

impl ScoreConstraint for WindowConstraint {
    fn name(&self) -> &str {
        &self.name
    }

    fn evaluate(&self, _block: &CandidateBlock, grid: &TimeGrid) -> Vec<f64> {
        grid.times()
            .map(|t| {
                if self.windows.iter().any(|w| w.contains(t)) {
                    1.0
                } else {
                    0.0
                }
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_window_constraint() {
        let grid = TimeGrid::new(0, 6_000, 1_000);
        let night = WindowConstraint::new("night")
            .with_window(1_000, 3_000)
            .with_window(4_000, 5_000);
        let block = CandidateBlock::new("A", "c");

        assert_eq!(night.name(), "night");
        assert_eq!(
            night.evaluate(&block, &grid),
            vec![0.0, 1.0, 1.0, 0.0, 1.0, 0.0]
        );
    }

    #[test]
    fn test_empty_window_constraint_forbids_all() {
        let grid = TimeGrid::new(0, 3_000, 1_000);
        let c = WindowConstraint::new("closed");
        let row = c.evaluate(&CandidateBlock::new("A", "c"), &grid);
        assert!(row.iter().all(|&v| v == 0.0));
    }
}
