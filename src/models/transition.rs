//! Transition cost matrices.
//!
//! A transition is the unavoidable overhead between two consecutive
//! activities: slewing and settling between targets, moving to the
//! focus field before a maintenance loop, and so on. Costs depend on the
//! categories on both sides.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;

use super::MAINTENANCE_CATEGORY;

/// Sequence-dependent transition time matrix.
///
/// Maps (from_category, to_category) → transition time in ms.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TransitionMatrix {
    /// Transition times: from_category → to_category → milliseconds.
    transitions: HashMap<String, HashMap<String, i64>>,
    /// Default transition time when no explicit pair is defined.
    pub default_ms: i64,
}

impl TransitionMatrix {
    /// Creates an empty matrix (every transition costs 0).
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the default transition time.
    pub fn with_default(mut self, default_ms: i64) -> Self {
        self.default_ms = default_ms;
        self
    }

    /// Builder: defines a transition time between two categories.
    pub fn with_transition(
        mut self,
        from: impl Into<String>,
        to: impl Into<String>,
        time_ms: i64,
    ) -> Self {
        self.set_transition(from, to, time_ms);
        self
    }

    /// Defines a transition time between two categories.
    pub fn set_transition(&mut self, from: impl Into<String>, to: impl Into<String>, time_ms: i64) {
        self.transitions
            .entry(from.into())
            .or_default()
            .insert(to.into(), time_ms);
    }

    /// Gets the transition time between two categories.
    ///
    /// Returns the explicit time if defined. Otherwise leaving a
    /// maintenance loop is free and any other move, including one between
    /// two targets of the same category, costs the default.
    pub fn get_transition(&self, from: &str, to: &str) -> i64 {
        match self.transitions.get(from).and_then(|row| row.get(to)) {
            Some(&ms) => ms,
            None if from == MAINTENANCE_CATEGORY => 0,
            None => self.default_ms,
        }
    }

    /// Number of explicitly defined transitions.
    pub fn transition_count(&self) -> usize {
        self.transitions.values().map(HashMap::len).sum()
    }

    /// Smallest cost in the matrix (explicit entries and default).
    pub(crate) fn min_cost_ms(&self) -> i64 {
        self.transitions
            .values()
            .flat_map(|row| row.values().copied())
            .chain(std::iter::once(self.default_ms))
            .min()
            .unwrap_or(0)
    }
}
