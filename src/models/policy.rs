//! Per-category scheduling policies.
//!
//! Every candidate category (MPC NEO, TESS, Sentry, ...) is governed by a
//! [`TypePolicy`]: how its candidates are scored over the night, what it
//! costs to move to and from them, how often the instrument must be
//! refocused while observing them, and how repeat observations work.
//!
//! Policies are registered once at startup in a [`PolicyRegistry`].

use std::collections::HashMap;
use std::fmt::Debug;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use super::{CandidateBlock, TimeGrid, TransitionMatrix};
use crate::error::ScoreError;

/// Category label of engine-inserted maintenance (focus) loops.
pub const MAINTENANCE_CATEGORY: &str = "Maintenance";

/// Pluggable policy for one candidate category.
///
/// # Score Convention
/// **Higher score = more desirable.** `0.0` at a slot means the block
/// must not occupy that slot.
pub trait TypePolicy: Send + Sync + Debug {
    /// Longest stretch (ms) a candidate of this category may end after the
    /// most recent maintenance loop. `None` = no limit.
    fn max_ms_without_maintenance(&self) -> Option<i64>;

    /// How many times each candidate should be observed.
    fn required_repeat_count(&self) -> u32 {
        1
    }

    /// Minimum time (ms) between the starts of two observations of the
    /// same candidate.
    fn min_ms_between_repeats(&self) -> i64 {
        0
    }

    /// Transition time (ms) from an activity of `from_category` to one of
    /// `to_category`. Either side may be [`MAINTENANCE_CATEGORY`].
    fn transition_ms(&self, from_category: &str, to_category: &str) -> i64;

    /// Score row for `block`, one entry per grid slot.
    fn score(&self, block: &CandidateBlock, grid: &TimeGrid) -> Result<Vec<f64>, ScoreError>;

    /// Score row for the next observation of a candidate whose previous
    /// row was `previous`. `repeat_index` is the number of observations
    /// already placed; `now_ms` the end of the latest one.
    fn next_repeat_score(
        &self,
        previous: &[f64],
        _repeat_index: u32,
        _now_ms: i64,
        _grid: &TimeGrid,
    ) -> Vec<f64> {
        previous.to_vec()
    }

    /// Policy-specific consistency checks, run at registration time.
    fn validate(&self) -> Result<(), String> {
        Ok(())
    }
}

/// Lookup table: category → policy.
#[derive(Debug, Clone, Default)]
pub struct PolicyRegistry {
    policies: HashMap<String, Arc<dyn TypePolicy>>,
}

impl PolicyRegistry {
    /// Creates an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a policy for a category, replacing any previous one.
    pub fn register<P: TypePolicy + 'static>(&mut self, category: impl Into<String>, policy: P) {
        self.policies.insert(category.into(), Arc::new(policy));
    }

    /// Builder: registers a policy and returns self.
    pub fn with_policy<P: TypePolicy + 'static>(
        mut self,
        category: impl Into<String>,
        policy: P,
    ) -> Self {
        self.register(category, policy);
        self
    }

    /// Looks up the policy for a category.
    pub fn get(&self, category: &str) -> Option<&Arc<dyn TypePolicy>> {
        self.policies.get(category)
    }

    /// Whether a policy is registered for `category`.
    pub fn contains(&self, category: &str) -> bool {
        self.policies.contains_key(category)
    }

    /// Registered categories, sorted.
    pub fn categories(&self) -> Vec<&str> {
        let mut cats: Vec<&str> = self.policies.keys().map(|s| s.as_str()).collect();
        cats.sort_unstable();
        cats
    }

    /// Number of registered policies.
    pub fn len(&self) -> usize {
        self.policies.len()
    }

    /// Whether the registry is empty.
    pub fn is_empty(&self) -> bool {
        self.policies.is_empty()
    }

    /// Checks every policy's limits. Returns `(category, reason)` of the
    /// first malformed one, in category order.
    pub fn validate(&self) -> Result<(), (String, String)> {
        for category in self.categories() {
            let Some(policy) = self.policies.get(category) else {
                continue;
            };
            check_limits(policy.as_ref()).map_err(|reason| (category.to_string(), reason))?;
        }
        Ok(())
    }
}

fn check_limits(policy: &dyn TypePolicy) -> Result<(), String> {
    if policy.required_repeat_count() < 1 {
        return Err("required_repeat_count must be at least 1".into());
    }
    if policy.min_ms_between_repeats() < 0 {
        return Err(format!(
            "min_ms_between_repeats must be non-negative, got {}",
            policy.min_ms_between_repeats()
        ));
    }
    if let Some(max) = policy.max_ms_without_maintenance() {
        if max < 0 {
            return Err(format!(
                "max_ms_without_maintenance must be non-negative, got {max}"
            ));
        }
    }
    policy.validate()
}

/// Shape of a [`StaticPolicy`] score row inside the observability window.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub enum ScoreShape {
    /// Constant value over the whole window.
    Flat(f64),
    /// Linear decrease from 1.0 at the window start towards 0.0 at its
    /// end, favoring targets whose window is about to close.
    Declining,
}

/// How a [`StaticPolicy`] derives the score of a repeat observation.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub enum RepeatShape {
    /// Reuse the previous row unchanged.
    Same,
    /// Multiply the previous row by a factor.
    Scaled(f64),
    /// Reverse the non-zero run of the previous row, then multiply by a
    /// coefficient. With a declining row this makes later slots
    /// preferable, spreading repeats across the window.
    ReversedRun(f64),
}

/// Configurable policy covering the common category setups.
///
/// # Example
/// ```
/// use nightplan::models::{StaticPolicy, ScoreShape, RepeatShape, TransitionMatrix, TypePolicy};
///
/// let neo = StaticPolicy::new()
///     .with_max_minutes_without_maintenance(70)
///     .with_repeats(2, 35 * 60_000)
///     .with_score_shape(ScoreShape::Declining)
///     .with_repeat_shape(RepeatShape::ReversedRun(0.9))
///     .with_transitions(TransitionMatrix::new().with_default(3 * 60_000));
///
/// assert_eq!(neo.required_repeat_count(), 2);
/// assert_eq!(neo.max_ms_without_maintenance(), Some(70 * 60_000));
/// ```
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StaticPolicy {
    /// Maintenance interval limit (ms). `None` = no limit.
    pub max_ms_without_maintenance: Option<i64>,
    /// Observations wanted per candidate.
    pub required_repeat_count: u32,
    /// Minimum spacing between observation starts (ms).
    pub min_ms_between_repeats: i64,
    /// Transition costs.
    pub transitions: TransitionMatrix,
    /// In-window score shape.
    pub score_shape: ScoreShape,
    /// Repeat score rule.
    pub repeat_shape: RepeatShape,
}

impl StaticPolicy {
    /// Single observation, flat score of 1.0, free transitions, no
    /// maintenance limit.
    pub fn new() -> Self {
        Self {
            max_ms_without_maintenance: None,
            required_repeat_count: 1,
            min_ms_between_repeats: 0,
            transitions: TransitionMatrix::new(),
            score_shape: ScoreShape::Flat(1.0),
            repeat_shape: RepeatShape::Same,
        }
    }

    /// Sets the maintenance interval limit (ms).
    pub fn with_max_ms_without_maintenance(mut self, max_ms: i64) -> Self {
        self.max_ms_without_maintenance = Some(max_ms);
        self
    }

    /// Sets the maintenance interval limit in minutes.
    pub fn with_max_minutes_without_maintenance(self, minutes: i64) -> Self {
        self.with_max_ms_without_maintenance(minutes * 60_000)
    }

    /// Sets the repeat count and the spacing between repeats (ms).
    pub fn with_repeats(mut self, count: u32, min_spacing_ms: i64) -> Self {
        self.required_repeat_count = count;
        self.min_ms_between_repeats = min_spacing_ms;
        self
    }

    /// Sets the transition matrix.
    pub fn with_transitions(mut self, transitions: TransitionMatrix) -> Self {
        self.transitions = transitions;
        self
    }

    /// Sets the score shape.
    pub fn with_score_shape(mut self, shape: ScoreShape) -> Self {
        self.score_shape = shape;
        self
    }

    /// Sets the repeat rule.
    pub fn with_repeat_shape(mut self, shape: RepeatShape) -> Self {
        self.repeat_shape = shape;
        self
    }
}

impl Default for StaticPolicy {
    fn default() -> Self {
        Self::new()
    }
}

impl TypePolicy for StaticPolicy {
    fn max_ms_without_maintenance(&self) -> Option<i64> {
        self.max_ms_without_maintenance
    }

    fn required_repeat_count(&self) -> u32 {
        self.required_repeat_count
    }

    fn min_ms_between_repeats(&self) -> i64 {
        self.min_ms_between_repeats
    }

    fn transition_ms(&self, from_category: &str, to_category: &str) -> i64 {
        self.transitions.get_transition(from_category, to_category)
    }

    fn score(&self, block: &CandidateBlock, grid: &TimeGrid) -> Result<Vec<f64>, ScoreError> {
        let window = block.observability;
        let row = grid
            .times()
            .map(|t| {
                if !window.contains(t) {
                    return 0.0;
                }
                match self.score_shape {
                    ScoreShape::Flat(v) => v,
                    ScoreShape::Declining => {
                        (window.end_ms - t) as f64 / window.duration_ms() as f64
                    }
                }
            })
            .collect();
        Ok(row)
    }

    fn next_repeat_score(
        &self,
        previous: &[f64],
        _repeat_index: u32,
        _now_ms: i64,
        _grid: &TimeGrid,
    ) -> Vec<f64> {
        match self.repeat_shape {
            RepeatShape::Same => previous.to_vec(),
            RepeatShape::Scaled(factor) => previous.iter().map(|v| v * factor).collect(),
            RepeatShape::ReversedRun(coefficient) => {
                let mut row = reverse_nonzero_run(previous);
                row.iter_mut().for_each(|v| *v *= coefficient);
                row
            }
        }
    }

    fn validate(&self) -> Result<(), String> {
        if self.transitions.min_cost_ms() < 0 {
            return Err("transition costs must be non-negative".into());
        }
        if let ScoreShape::Flat(v) = self.score_shape {
            if !(v.is_finite() && v >= 0.0) {
                return Err(format!("flat score must be finite and non-negative, got {v}"));
            }
        }
        Ok(())
    }
}

/// Reverses the order of the non-zero values while keeping their positions.
///
/// `[0, 3, 2, 1, 0]` becomes `[0, 1, 2, 3, 0]`.
pub fn reverse_nonzero_run(row: &[f64]) -> Vec<f64> {
    let positions: Vec<usize> = (0..row.len()).filter(|&i| row[i] != 0.0).collect();
    let mut out = row.to_vec();
    for (&dst, &src) in positions.iter().zip(positions.iter().rev()) {
        out[dst] = row[src];
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    const MIN: i64 = 60_000;

    #[derive(Debug)]
    struct ZeroRepeats;

    impl TypePolicy for ZeroRepeats {
        fn max_ms_without_maintenance(&self) -> Option<i64> {
            None
        }
        fn required_repeat_count(&self) -> u32 {
            0
        }
        fn transition_ms(&self, _from: &str, _to: &str) -> i64 {
            0
        }
        fn score(&self, _b: &CandidateBlock, g: &TimeGrid) -> Result<Vec<f64>, ScoreError> {
            Ok(vec![1.0; g.len])
        }
    }

    #[test]
    fn test_registry_lookup() {
        let registry = PolicyRegistry::new()
            .with_policy("MPC NEO", StaticPolicy::new())
            .with_policy("TESS", StaticPolicy::new());

        assert_eq!(registry.len(), 2);
        assert!(registry.contains("TESS"));
        assert!(registry.get("Sentry").is_none());
        assert_eq!(registry.categories(), vec!["MPC NEO", "TESS"]);
        assert!(registry.validate().is_ok());
    }

    #[test]
    fn test_registry_rejects_malformed_policy() {
        let registry = PolicyRegistry::new().with_policy("bad", ZeroRepeats);
        let (category, reason) = registry.validate().unwrap_err();
        assert_eq!(category, "bad");
        assert!(reason.contains("required_repeat_count"));

        let negative = PolicyRegistry::new()
            .with_policy("neg", StaticPolicy::new().with_max_ms_without_maintenance(-1));
        assert!(negative.validate().is_err());

        let bad_matrix = PolicyRegistry::new().with_policy(
            "tm",
            StaticPolicy::new().with_transitions(TransitionMatrix::new().with_default(-10)),
        );
        assert!(bad_matrix.validate().is_err());
    }

    #[test]
    fn test_flat_score_masks_window() {
        let grid = TimeGrid::new(0, 5 * MIN, MIN);
        let block = CandidateBlock::new("A", "c")
            .with_duration(MIN)
            .with_window(MIN, 4 * MIN);
        let row = StaticPolicy::new()
            .with_score_shape(ScoreShape::Flat(2.0))
            .score(&block, &grid)
            .unwrap();
        assert_eq!(row, vec![0.0, 2.0, 2.0, 2.0, 0.0]);
    }

    #[test]
    fn test_declining_score() {
        let grid = TimeGrid::new(0, 4 * MIN, MIN);
        let block = CandidateBlock::new("A", "c")
            .with_duration(MIN)
            .with_window(0, 4 * MIN);
        let row = StaticPolicy::new()
            .with_score_shape(ScoreShape::Declining)
            .score(&block, &grid)
            .unwrap();
        assert_eq!(row, vec![1.0, 0.75, 0.5, 0.25]);
    }

    #[test]
    fn test_reverse_nonzero_run() {
        assert_eq!(
            reverse_nonzero_run(&[0.0, 3.0, 2.0, 1.0, 0.0]),
            vec![0.0, 1.0, 2.0, 3.0, 0.0]
        );
        assert_eq!(reverse_nonzero_run(&[]), Vec::<f64>::new());
    }

    #[test]
    fn test_repeat_shapes() {
        let grid = TimeGrid::new(0, 3 * MIN, MIN);
        let prev = [1.0, 0.5, 0.0];

        let same = StaticPolicy::new();
        assert_eq!(same.next_repeat_score(&prev, 1, 0, &grid), prev.to_vec());

        let scaled = StaticPolicy::new().with_repeat_shape(RepeatShape::Scaled(0.5));
        assert_eq!(scaled.next_repeat_score(&prev, 1, 0, &grid), vec![0.5, 0.25, 0.0]);

        let reversed = StaticPolicy::new().with_repeat_shape(RepeatShape::ReversedRun(2.0));
        assert_eq!(reversed.next_repeat_score(&prev, 1, 0, &grid), vec![1.0, 2.0, 0.0]);
    }

    #[test]
    fn test_policy_serde() {
        let p = StaticPolicy::new()
            .with_max_minutes_without_maintenance(60)
            .with_repeats(3, 30 * MIN);
        let json = serde_json::to_string(&p).unwrap();
        let back: StaticPolicy = serde_json::from_str(&json).unwrap();
        assert_eq!(back.required_repeat_count, 3);
        assert_eq!(back.max_ms_without_maintenance, Some(60 * MIN));
    }
}
