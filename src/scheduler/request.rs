//! Scheduling request and candidate preparation.

use std::collections::{BTreeMap, HashSet};
use std::sync::Arc;

use crate::models::{CandidateBlock, ScoreConstraint, TimeWindow};

/// Input container for one night.
///
/// Holds the candidates plus the per-night operator choices: which
/// targets to drop (blacklist), which to force in first (whitelist),
/// time ranges the telescope is unavailable (exclusions), and
/// constraints applied to every candidate's score.
#[derive(Debug, Clone, Default)]
pub struct ScheduleRequest {
    /// Candidates to schedule.
    pub candidates: Vec<CandidateBlock>,
    /// Candidate names to drop.
    pub blacklist: HashSet<String>,
    /// Candidate names placed before every tier.
    pub whitelist: HashSet<String>,
    /// Time ranges no entry may overlap.
    pub exclusions: Vec<TimeWindow>,
    /// Constraints multiplied into every score row.
    pub constraints: Vec<Arc<dyn ScoreConstraint>>,
}

impl ScheduleRequest {
    /// Creates a new schedule request.
    pub fn new(candidates: Vec<CandidateBlock>) -> Self {
        Self {
            candidates,
            ..Self::default()
        }
    }

    /// Adds a blacklisted candidate name.
    pub fn with_blacklisted(mut self, name: impl Into<String>) -> Self {
        self.blacklist.insert(name.into());
        self
    }

    /// Adds a whitelisted candidate name.
    pub fn with_whitelisted(mut self, name: impl Into<String>) -> Self {
        self.whitelist.insert(name.into());
        self
    }

    /// Adds an exclusion range.
    pub fn with_exclusion(mut self, start_ms: i64, end_ms: i64) -> Self {
        self.exclusions.push(TimeWindow::new(start_ms, end_ms));
        self
    }

    /// Adds a global score constraint.
    pub fn with_constraint<C: ScoreConstraint + 'static>(mut self, constraint: C) -> Self {
        self.constraints.push(Arc::new(constraint));
        self
    }

    /// Candidates that survive the blacklist, in input order.
    pub fn active_candidates(&self) -> Vec<&CandidateBlock> {
        self.candidates
            .iter()
            .filter(|c| !self.blacklist.contains(&c.name))
            .collect()
    }

    /// Groups the surviving candidates by tier, ascending.
    ///
    /// Whitelisted candidates form their own tier, one below the lowest
    /// tier present, so they are placed before anything else. Input order
    /// is kept within every tier.
    pub fn tiers(&self) -> Vec<(i32, Vec<CandidateBlock>)> {
        let active = self.active_candidates();
        let Some(lowest) = active.iter().map(|c| c.priority_tier).min() else {
            return Vec::new();
        };
        let forced_tier = lowest.saturating_sub(1);

        let mut tiers: BTreeMap<i32, Vec<CandidateBlock>> = BTreeMap::new();
        for c in active {
            if self.whitelist.contains(&c.name) {
                tiers
                    .entry(forced_tier)
                    .or_default()
                    .push(c.clone().with_tier(forced_tier));
            } else {
                tiers.entry(c.priority_tier).or_default().push(c.clone());
            }
        }
        tiers.into_iter().collect()
    }
}
