//! Error types.
//!
//! Two families:
//! - [`SchedulingError`]: fatal, raised before any tier is processed.
//! - [`ScoreError`]: raised by a [`TypePolicy`](crate::models::TypePolicy)
//!   scorer; the engine recovers from it by falling back to the generic score.

use thiserror::Error;

/// Result type for engine construction and runs.
pub type Result<T> = std::result::Result<T, SchedulingError>;

/// Fatal errors that abort a scheduling run.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum SchedulingError {
    /// No candidate survived filtering.
    #[error("no candidates to schedule")]
    NoCandidates,

    /// A candidate references a category without a registered policy.
    #[error("candidate '{candidate}' has category '{category}' with no registered policy")]
    UnknownCategory { candidate: String, category: String },

    /// A registered policy has out-of-range parameters.
    #[error("invalid policy for category '{category}': {reason}")]
    InvalidPolicy { category: String, reason: String },

    /// A candidate block is malformed (duration, window, duplicate name).
    #[error("invalid candidate '{candidate}': {reason}")]
    InvalidCandidate { candidate: String, reason: String },

    /// The scheduler configuration is invalid.
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    /// A slot range was claimed twice. Indicates an engine bug.
    #[error("slot range {start}..{end} is not free")]
    SlotConflict { start: usize, end: usize },
}

/// Errors reported by a category scorer.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ScoreError {
    /// The scorer lacks data it needs for this block (e.g. an ephemeris).
    #[error("missing data for '{block}': {reason}")]
    MissingData { block: String, reason: String },

    /// The scorer produced a row whose length does not match the grid.
    #[error("score row for '{block}' has {actual} entries, grid has {expected}")]
    RowLength {
        block: String,
        expected: usize,
        actual: usize,
    },

    /// Any other scorer failure.
    #[error("scorer failed: {0}")]
    Failed(String),
}
