//! Schedule quality metrics (KPIs).
//!
//! Computes the indicators used to compare nights and trials from a
//! finished schedule and the policy registry.
//!
//! # Metrics
//!
//! | Metric | Definition |
//! |--------|-----------|
//! | Fullness | 1 - idle / (window - excluded) |
//! | Repeat fulfilment | placed / required, over scheduled multi-visit candidates |
//! | Under-fulfilled | Scheduled candidates with fewer visits than required |
//! | Overheads | Time spent in transitions and maintenance loops |

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use crate::models::{EntryKind, PolicyRegistry, ScheduleResult};

/// Schedule performance indicators.
///
/// All time values are in milliseconds.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScheduleKpi {
    /// Fraction of usable time not left idle (0.0..1.0).
    pub fullness: f64,
    /// Placed / required observations over scheduled candidates that
    /// need more than one visit. 1.0 if there are none.
    pub repeat_fulfillment: f64,
    /// Number of observation entries.
    pub observation_count: usize,
    /// Number of distinct candidates observed at least once.
    pub scheduled_candidates: usize,
    /// Number of maintenance loops.
    pub maintenance_count: usize,
    /// Number of transition entries.
    pub transition_count: usize,
    /// Time on target.
    pub observing_ms: i64,
    /// Time in transitions.
    pub transition_ms: i64,
    /// Time in maintenance loops.
    pub maintenance_ms: i64,
    /// Unused time.
    pub idle_ms: i64,
    /// Excluded time.
    pub excluded_ms: i64,
    /// Scheduled candidates observed fewer times than required, by name.
    pub under_fulfilled: Vec<String>,
}

impl ScheduleKpi {
    /// Computes KPIs from a finished schedule.
    ///
    /// # Arguments
    /// * `result` - The schedule.
    /// * `registry` - Policies, for required repeat counts.
    pub fn calculate(result: &ScheduleResult, registry: &PolicyRegistry) -> Self {
        let mut observation_count = 0;
        let mut maintenance_count = 0;
        let mut transition_count = 0;
        let mut observing_ms = 0;
        let mut transition_ms = 0;
        let mut maintenance_ms = 0;
        // name → (category, placed)
        let mut placed: HashMap<&str, (&str, u32)> = HashMap::new();

        for entry in &result.entries {
            match &entry.kind {
                EntryKind::Observation {
                    candidate,
                    category,
                    ..
                } => {
                    observation_count += 1;
                    observing_ms += entry.duration_ms();
                    placed
                        .entry(candidate.as_str())
                        .or_insert((category.as_str(), 0))
                        .1 += 1;
                }
                EntryKind::Maintenance => {
                    maintenance_count += 1;
                    maintenance_ms += entry.duration_ms();
                }
                EntryKind::Transition { .. } => {
                    transition_count += 1;
                    transition_ms += entry.duration_ms();
                }
                EntryKind::Idle | EntryKind::Excluded => {}
            }
        }

        let idle_ms = result.idle_ms();
        let excluded_ms = result.excluded_ms();
        let usable = result.window.duration_ms() - excluded_ms;
        let fullness = if usable <= 0 {
            0.0
        } else {
            (1.0 - idle_ms as f64 / usable as f64).clamp(0.0, 1.0)
        };

        let mut total_required: u64 = 0;
        let mut total_placed: u64 = 0;
        let mut under_fulfilled = Vec::new();
        for (&name, &(category, count)) in &placed {
            let required = registry
                .get(category)
                .map(|p| p.required_repeat_count())
                .unwrap_or(1);
            if required > 1 {
                total_required += u64::from(required);
                total_placed += u64::from(count.min(required));
            }
            if count < required {
                under_fulfilled.push(name.to_string());
            }
        }
        under_fulfilled.sort_unstable();

        let repeat_fulfillment = if total_required == 0 {
            1.0
        } else {
            total_placed as f64 / total_required as f64
        };

        Self {
            fullness,
            repeat_fulfillment,
            observation_count,
            scheduled_candidates: placed.len(),
            maintenance_count,
            transition_count,
            observing_ms,
            transition_ms,
            maintenance_ms,
            idle_ms,
            excluded_ms,
            under_fulfilled,
        }
    }

    /// Whether the schedule meets the given quality thresholds.
    pub fn meets_thresholds(&self, min_fullness: f64, min_repeat_fulfillment: f64) -> bool {
        self.fullness >= min_fullness && self.repeat_fulfillment >= min_repeat_fulfillment
    }
}
