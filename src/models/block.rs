//! Candidate block model.
//!
//! A candidate block is one schedulable observation: a target, the
//! category whose policy governs it, a priority tier, a fixed duration
//! and the window in which it may be observed.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;

use super::TimeWindow;

/// A candidate observation to be scheduled.
///
/// Immutable once handed to the engine. Repeat observations of the same
/// candidate are created by the engine and share this block's `name` as
/// their base name (see [`CandidateBlock::instance_name`]).
///
/// # Time Representation
/// All times are in milliseconds relative to a scheduling epoch (t=0).
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct CandidateBlock {
    /// Unique candidate name (designation).
    pub name: String,
    /// Category key into the policy registry.
    pub category: String,
    /// Priority tier (lower = scheduled first).
    pub priority_tier: i32,
    /// Time on target (ms). Must be positive.
    pub duration_ms: i64,
    /// Window the whole observation must fit in.
    pub observability: TimeWindow,
    /// Opaque payload (coordinates, exposure settings, ...).
    pub payload: HashMap<String, String>,
}

impl CandidateBlock {
    /// Creates a new block with the given name and category.
    ///
    /// Defaults: tier 0, zero duration, empty window. Callers are expected
    /// to set the duration and window before scheduling.
    pub fn new(name: impl Into<String>, category: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            category: category.into(),
            priority_tier: 0,
            duration_ms: 0,
            observability: TimeWindow::new(0, 0),
            payload: HashMap::new(),
        }
    }

    /// Sets the priority tier.
    pub fn with_tier(mut self, tier: i32) -> Self {
        self.priority_tier = tier;
        self
    }

    /// Sets the duration (ms).
    pub fn with_duration(mut self, duration_ms: i64) -> Self {
        self.duration_ms = duration_ms;
        self
    }

    /// Sets the observability window [start, end).
    pub fn with_window(mut self, start_ms: i64, end_ms: i64) -> Self {
        self.observability = TimeWindow::new(start_ms, end_ms);
        self
    }

    /// Adds a payload attribute.
    pub fn with_payload(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.payload.insert(key.into(), value.into());
        self
    }

    /// Label of the `repeat_index`-th instance (1-based).
    ///
    /// Candidates observed once keep their plain name; repeated ones get
    /// a `_<n>` suffix on every instance, including the first.
    pub fn instance_name(&self, repeat_index: u32, required_repeats: u32) -> String {
        if required_repeats > 1 {
            format!("{}_{}", self.name, repeat_index)
        } else {
            self.name.clone()
        }
    }

    /// Whether the block could fit inside its window at all.
    pub fn fits_window(&self) -> bool {
        self.duration_ms > 0 && self.duration_ms <= self.observability.duration_ms()
    }
}
