//! Priority-tiered greedy scheduling engine.
//!
//! # Algorithm
//!
//! Tiers are processed in ascending order. For each tier:
//!
//! 1. Score every block of the tier over the grid.
//! 2. Walk the grid slot by slot. At a free slot, consider every
//!    unplaced pool entry: prune it if its best score over its own span
//!    cannot beat the best placement found so far, otherwise lay it out
//!    (maintenance loop or transition first, as required) and check the
//!    layout against the timeline, the grid end, its observability window,
//!    its scores and its repeat spacing.
//! 3. Commit the layout with the highest score at its start slot (first
//!    in pool order on ties), claim its slots and jump past it.
//! 4. If the committed candidate needs more visits, derive the next
//!    visit's score row and append it to the tier's pool.
//!
//! A tier never revisits slots behind the walk. Time left free after the
//! last tier is reported as idle (or excluded) gaps.
//!
//! # Complexity
//! O(s * p * d) per tier where s=slots, p=pool size, d=slots per block.

use std::collections::HashMap;

use rand::rngs::StdRng;
use rand::SeedableRng;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use super::{ScheduleRequest, SchedulerConfig};
use crate::error::{Result, SchedulingError};
use crate::models::{
    CandidateBlock, EntryKind, PolicyRegistry, ScheduleResult, ScheduledEntry, TimeGrid,
    TimeWindow, TypePolicy, MAINTENANCE_CATEGORY,
};
use crate::scoring::{clamp, ScoreArrayBuilder, ScoreMatrix, ScoreRow};
use crate::timeline::Timeline;
use crate::validation::validate_candidates;

/// Output of one engine run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScheduleRun {
    /// The finished timeline.
    pub result: ScheduleResult,
    /// Score matrices per tier, including derived repeat rows.
    pub score_matrices: Vec<ScoreMatrix>,
    /// Seed the jitter was drawn with.
    pub seed: u64,
}

/// Greedy tiered scheduler for one night.
///
/// # Example
///
/// ```
/// use nightplan::models::{CandidateBlock, PolicyRegistry, StaticPolicy};
/// use nightplan::scheduler::{ScheduleRequest, SchedulerConfig, SchedulingEngine};
///
/// const MIN: i64 = 60_000;
///
/// let registry = PolicyRegistry::new().with_policy("TESS", StaticPolicy::new());
/// let config = SchedulerConfig::new(0, 120 * MIN);
/// let engine = SchedulingEngine::new(registry, config).unwrap();
///
/// let request = ScheduleRequest::new(vec![
///     CandidateBlock::new("TOI-700", "TESS")
///         .with_tier(1)
///         .with_duration(10 * MIN)
///         .with_window(0, 120 * MIN),
/// ]);
/// let run = engine.run(&request).unwrap();
/// let obs = run.result.entry("TOI-700").unwrap();
/// assert_eq!((obs.start_ms, obs.end_ms), (0, 10 * MIN));
/// ```
#[derive(Debug, Clone)]
pub struct SchedulingEngine {
    registry: PolicyRegistry,
    config: SchedulerConfig,
}

impl SchedulingEngine {
    /// Creates an engine.
    ///
    /// # Errors
    /// [`SchedulingError::InvalidConfig`] or [`SchedulingError::InvalidPolicy`].
    pub fn new(registry: PolicyRegistry, config: SchedulerConfig) -> Result<Self> {
        config.validate().map_err(SchedulingError::InvalidConfig)?;
        registry
            .validate()
            .map_err(|(category, reason)| SchedulingError::InvalidPolicy { category, reason })?;
        Ok(Self { registry, config })
    }

    /// The engine configuration.
    pub fn config(&self) -> &SchedulerConfig {
        &self.config
    }

    /// The policy registry.
    pub fn registry(&self) -> &PolicyRegistry {
        &self.registry
    }

    /// Runs the engine with the configured seed (random if unset).
    pub fn run(&self, request: &ScheduleRequest) -> Result<ScheduleRun> {
        let seed = self.config.seed.unwrap_or_else(rand::random);
        self.run_with_seed(request, seed)
    }

    /// Runs the engine with an explicit jitter seed.
    ///
    /// # Errors
    /// - [`SchedulingError::NoCandidates`] if nothing survives the blacklist.
    /// - [`SchedulingError::UnknownCategory`] / [`SchedulingError::InvalidCandidate`]
    ///   for the first malformed candidate.
    pub fn run_with_seed(&self, request: &ScheduleRequest, seed: u64) -> Result<ScheduleRun> {
        let active = request.active_candidates();
        if active.is_empty() {
            return Err(SchedulingError::NoCandidates);
        }
        if let Err(errors) = validate_candidates(active.iter().copied(), &self.registry) {
            if let Some(first) = errors.into_iter().next() {
                return Err(first.into());
            }
        }

        let grid = self.config.grid();
        let mut rng = StdRng::seed_from_u64(seed);
        let builder = ScoreArrayBuilder::new(grid, &self.registry)
            .with_constraints(&request.constraints)
            .with_temperature(self.config.temperature);
        let mut state = RunState::new(
            grid,
            Timeline::with_exclusions(grid, &request.exclusions),
            &self.config,
        );

        info!(
            candidates = active.len(),
            slots = grid.len,
            seed,
            "starting scheduling run"
        );

        let mut score_matrices = Vec::new();
        for (tier, blocks) in request.tiers() {
            let matrix = self.run_tier(tier, &blocks, &builder, &mut state, &mut rng)?;
            score_matrices.push(matrix);
        }

        let result = state.finish(&request.exclusions);
        info!(
            observations = result.observations().count(),
            idle_ms = result.idle_ms(),
            "scheduling run finished"
        );
        Ok(ScheduleRun {
            result,
            score_matrices,
            seed,
        })
    }

    fn required_repeats(&self, block: &CandidateBlock) -> u32 {
        self.registry
            .get(&block.category)
            .map(|p| p.required_repeat_count())
            .unwrap_or(1)
    }

    fn run_tier(
        &self,
        tier: i32,
        blocks: &[CandidateBlock],
        builder: &ScoreArrayBuilder<'_>,
        state: &mut RunState<'_>,
        rng: &mut StdRng,
    ) -> Result<ScoreMatrix> {
        let labels: Vec<String> = blocks
            .iter()
            .map(|b| b.instance_name(1, self.required_repeats(b)))
            .collect();
        let mut matrix = builder.build_tier(tier, blocks, &labels, rng)?;

        // pool[i] pairs with matrix.rows[i]
        let mut pool: Vec<PoolEntry> = (0..blocks.len())
            .map(|block| PoolEntry {
                block,
                repeat_index: 1,
                placed: false,
            })
            .collect();

        debug!(tier, pool = pool.len(), "processing tier");

        let grid = state.grid;
        let mut committed = 0usize;
        let mut cur = 0usize;
        while cur < grid.len {
            if !state.timeline.is_free(cur, cur + 1) {
                cur += 1;
                continue;
            }

            let mut best: Option<(usize, Placement)> = None;
            let mut best_score = 0.0;
            for (i, entry) in pool.iter().enumerate() {
                if entry.placed {
                    continue;
                }
                let block = &blocks[entry.block];
                if !block.fits_window() {
                    continue;
                }
                let row = &matrix.rows[i].values;
                let hi = cur
                    .saturating_add(grid.slots_for(block.duration_ms))
                    .min(row.len());
                let peak = row
                    .get(cur..hi)
                    .map(|span| span.iter().copied().fold(0.0, f64::max))
                    .unwrap_or(0.0);
                if peak <= best_score {
                    continue;
                }

                let Some(policy) = self.registry.get(&block.category) else {
                    continue;
                };
                let previous_start = if entry.repeat_index > 1 {
                    state.last_visit(&block.name)
                } else {
                    None
                };
                let Some(placement) =
                    state.layout(cur, block, policy.as_ref(), row, previous_start)
                else {
                    continue;
                };
                if placement.score > best_score {
                    best_score = placement.score;
                    best = Some((i, placement));
                }
            }

            let Some((i, placement)) = best else {
                cur += 1;
                continue;
            };

            let block_idx = pool[i].block;
            let block = &blocks[block_idx];
            let repeat_index = pool[i].repeat_index;
            let label = matrix.rows[i].name.clone();
            let obs_end = placement.obs_end_ms;
            cur = placement.end_slot;
            state.commit(tier, block, repeat_index, &label, placement)?;
            pool[i].placed = true;
            committed += 1;

            let required = self.required_repeats(block);
            if repeat_index < required {
                if let Some(policy) = self.registry.get(&block.category) {
                    let parent = &matrix.rows[i];
                    let mut values =
                        policy.next_repeat_score(&parent.values, repeat_index, obs_end, &grid);
                    values.resize(grid.len, 0.0);
                    let row = ScoreRow {
                        name: block.instance_name(repeat_index + 1, required),
                        category: block.category.clone(),
                        jitter: parent.jitter,
                        fallback: parent.fallback,
                        values: clamp(values),
                    };
                    debug!(tier, label = %row.name, "queued repeat visit");
                    matrix.rows.push(row);
                    pool.push(PoolEntry {
                        block: block_idx,
                        repeat_index: repeat_index + 1,
                        placed: false,
                    });
                }
            }
        }

        debug!(tier, committed, pool = pool.len(), "tier done");
        Ok(matrix)
    }
}

/// One pool slot of a tier: a block's next visit.
#[derive(Debug, Clone)]
struct PoolEntry {
    block: usize,
    repeat_index: u32,
    placed: bool,
}

/// A preamble segment (transition or maintenance) with its slot range.
#[derive(Debug, Clone)]
struct Segment {
    entry: ScheduledEntry,
    start_slot: usize,
    end_slot: usize,
}

/// A checked layout of one candidate at one walk position.
#[derive(Debug, Clone)]
struct Placement {
    preamble: Vec<Segment>,
    obs_slot: usize,
    end_slot: usize,
    obs_start_ms: i64,
    obs_end_ms: i64,
    score: f64,
}

/// Mutable state of one run.
#[derive(Debug)]
struct RunState<'c> {
    grid: TimeGrid,
    timeline: Timeline,
    entries: Vec<ScheduledEntry>,
    visits: HashMap<String, Vec<i64>>,
    config: &'c SchedulerConfig,
}

impl<'c> RunState<'c> {
    fn new(grid: TimeGrid, timeline: Timeline, config: &'c SchedulerConfig) -> Self {
        Self {
            grid,
            timeline,
            entries: Vec::new(),
            visits: HashMap::new(),
            config,
        }
    }

    /// The latest-ending entry that ends at or before `t`.
    fn preceding(&self, t: i64) -> Option<&ScheduledEntry> {
        self.entries
            .iter()
            .filter(|e| e.end_ms <= t)
            .max_by_key(|e| (e.end_ms, e.start_ms))
    }

    fn last_maintenance(&self, t: i64) -> i64 {
        self.entries
            .iter()
            .filter(|e| e.is_maintenance() && e.end_ms <= t)
            .map(|e| e.end_ms)
            .max()
            .unwrap_or_else(|| self.config.initial_maintenance_ms())
    }

    fn last_visit(&self, name: &str) -> Option<i64> {
        self.visits.get(name).and_then(|starts| starts.last().copied())
    }

    fn push_segment(
        &self,
        preamble: &mut Vec<Segment>,
        slot: usize,
        kind: EntryKind,
        label: &str,
        duration_ms: i64,
    ) -> usize {
        let start_ms = self.grid.time_at(slot);
        let end_slot = slot.saturating_add(self.grid.slots_for(duration_ms));
        preamble.push(Segment {
            entry: ScheduledEntry::new(
                kind,
                label,
                start_ms,
                start_ms.saturating_add(duration_ms.max(0)),
            ),
            start_slot: slot,
            end_slot,
        });
        end_slot
    }

    fn transition(
        &self,
        preamble: &mut Vec<Segment>,
        slot: usize,
        policy: &dyn TypePolicy,
        from: Option<&str>,
        to: &str,
    ) -> usize {
        let Some(from) = from else {
            return slot;
        };
        let cost = policy.transition_ms(from, to);
        if cost <= 0 {
            return slot;
        }
        let kind = EntryKind::Transition {
            from: from.to_string(),
            to: to.to_string(),
        };
        self.push_segment(preamble, slot, kind, "Transition", cost)
    }

    /// Lays out `block` at walk position `cur`, or `None` if it does not fit.
    fn layout(
        &self,
        cur: usize,
        block: &CandidateBlock,
        policy: &dyn TypePolicy,
        row: &[f64],
        previous_start: Option<i64>,
    ) -> Option<Placement> {
        let t0 = self.grid.time_at(cur);
        let from = self.preceding(t0).map(entry_category);
        let last_maintenance = self.last_maintenance(t0);
        let limit = policy.max_ms_without_maintenance();

        let mut preamble = Vec::new();
        let mut slot = self.transition(&mut preamble, cur, policy, from, &block.category);
        let overdue = limit.is_some_and(|max| {
            self.grid
                .time_at(slot)
                .saturating_add(block.duration_ms)
                .saturating_sub(last_maintenance)
                > max
        });

        if overdue {
            preamble.clear();
            slot = self.transition(&mut preamble, cur, policy, from, MAINTENANCE_CATEGORY);
            slot = self.push_segment(
                &mut preamble,
                slot,
                EntryKind::Maintenance,
                MAINTENANCE_CATEGORY,
                self.config.maintenance_duration_ms,
            );
            let maintenance_end = preamble.last().map_or(t0, |s| s.entry.end_ms);
            let obs_end = self.grid.time_at(slot).saturating_add(block.duration_ms);
            if let Some(max) = limit {
                // Candidates longer than the limit go straight after a loop.
                if block.duration_ms <= max && obs_end.saturating_sub(maintenance_end) > max {
                    return None;
                }
            }
        }

        let obs_start_ms = self.grid.time_at(slot);
        let obs_end_ms = obs_start_ms.saturating_add(block.duration_ms);
        let end_slot = slot.saturating_add(self.grid.slots_for(block.duration_ms));
        if end_slot > self.grid.len || obs_end_ms > self.grid.end_ms {
            return None;
        }
        if !block.observability.contains_span(obs_start_ms, obs_end_ms) {
            return None;
        }
        match row.get(slot..end_slot) {
            Some(span) if !span.is_empty() && span.iter().all(|&v| v > 0.0) => {}
            _ => return None,
        }
        if !self.timeline.is_free(cur, end_slot) {
            return None;
        }
        if let Some(previous) = previous_start {
            if obs_start_ms.saturating_sub(previous) < policy.min_ms_between_repeats() {
                return None;
            }
        }

        Some(Placement {
            preamble,
            obs_slot: slot,
            end_slot,
            obs_start_ms,
            obs_end_ms,
            score: row[slot],
        })
    }

    fn commit(
        &mut self,
        tier: i32,
        block: &CandidateBlock,
        repeat_index: u32,
        label: &str,
        placement: Placement,
    ) -> Result<()> {
        for segment in &placement.preamble {
            self.timeline
                .occupy(segment.start_slot, segment.end_slot, tier)?;
        }
        self.timeline
            .occupy(placement.obs_slot, placement.end_slot, tier)?;

        debug!(
            tier,
            label,
            start_ms = placement.obs_start_ms,
            end_ms = placement.obs_end_ms,
            score = placement.score,
            preamble = placement.preamble.len(),
            "committed observation"
        );

        self.entries
            .extend(placement.preamble.into_iter().map(|s| s.entry));
        self.entries.push(ScheduledEntry::new(
            EntryKind::Observation {
                candidate: block.name.clone(),
                category: block.category.clone(),
                repeat_index,
                tier,
                score: placement.score,
            },
            label,
            placement.obs_start_ms,
            placement.obs_end_ms,
        ));
        self.visits
            .entry(block.name.clone())
            .or_default()
            .push(placement.obs_start_ms);
        Ok(())
    }

    /// Sorts the entries and fills the gaps with idle/excluded spans.
    fn finish(self, exclusions: &[TimeWindow]) -> ScheduleResult {
        let window = self.config.window();
        let mut entries = self.entries;
        entries.sort_by_key(|e| (e.start_ms, e.end_ms));

        let mut out = Vec::with_capacity(entries.len() * 2 + 1);
        let mut cursor = window.start_ms;
        for entry in entries {
            if entry.start_ms > cursor {
                fill_gap(cursor, entry.start_ms, exclusions, &mut out);
            }
            cursor = cursor.max(entry.end_ms);
            out.push(entry);
        }
        if cursor < window.end_ms {
            fill_gap(cursor, window.end_ms, exclusions, &mut out);
        }
        ScheduleResult::new(window, out)
    }
}

fn entry_category(entry: &ScheduledEntry) -> &str {
    match &entry.kind {
        EntryKind::Observation { category, .. } => category,
        EntryKind::Transition { to, .. } => to,
        _ => MAINTENANCE_CATEGORY,
    }
}

/// Splits `[start, end)` into idle and excluded spans.
fn fill_gap(start: i64, end: i64, exclusions: &[TimeWindow], out: &mut Vec<ScheduledEntry>) {
    let mut clipped: Vec<(i64, i64)> = exclusions
        .iter()
        .map(|w| (w.start_ms.max(start), w.end_ms.min(end)))
        .filter(|(s, e)| e > s)
        .collect();
    clipped.sort_unstable();

    let mut cursor = start;
    for (s, e) in clipped {
        if e <= cursor {
            continue;
        }
        let s = s.max(cursor);
        if s > cursor {
            out.push(ScheduledEntry::new(EntryKind::Idle, "Idle", cursor, s));
        }
        match out.last_mut() {
            Some(last) if matches!(last.kind, EntryKind::Excluded) && last.end_ms == s => {
                last.end_ms = e;
            }
            _ => out.push(ScheduledEntry::new(EntryKind::Excluded, "Excluded", s, e)),
        }
        cursor = e;
    }
    if cursor < end {
        out.push(ScheduledEntry::new(EntryKind::Idle, "Idle", cursor, end));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ScoreError;
    use crate::models::{
        RepeatShape, ScoreShape, StaticPolicy, TransitionMatrix, WindowConstraint,
    };
    use crate::scheduler::ScheduleKpi;
    use crate::validation::check_schedule;
    use proptest::prelude::*;

    const MIN: i64 = 60_000;

    fn cand(name: &str, category: &str, tier: i32, duration_min: i64) -> CandidateBlock {
        CandidateBlock::new(name, category)
            .with_tier(tier)
            .with_duration(duration_min * MIN)
            .with_window(0, 120 * MIN)
    }

    fn engine(registry: PolicyRegistry) -> SchedulingEngine {
        SchedulingEngine::new(registry, SchedulerConfig::new(0, 120 * MIN)).unwrap()
    }

    fn span(run: &ScheduleRun, label: &str) -> (i64, i64) {
        let e = run.result.entry(label).unwrap();
        (e.start_ms / MIN, e.end_ms / MIN)
    }

    fn assert_clean(engine: &SchedulingEngine, request: &ScheduleRequest, run: &ScheduleRun) {
        let violations = check_schedule(
            &run.result,
            &request.candidates,
            &request.exclusions,
            engine.registry(),
            engine.config(),
        );
        assert!(violations.is_empty(), "violations: {violations:?}");
    }

    #[derive(Debug)]
    struct Broken;

    impl TypePolicy for Broken {
        fn max_ms_without_maintenance(&self) -> Option<i64> {
            None
        }
        fn transition_ms(&self, _from: &str, _to: &str) -> i64 {
            0
        }
        fn score(
            &self,
            block: &CandidateBlock,
            _grid: &TimeGrid,
        ) -> std::result::Result<Vec<f64>, ScoreError> {
            Err(ScoreError::Failed(format!("no ephemeris for {}", block.name)))
        }
    }

    #[test]
    fn test_back_to_back_placement() {
        let e = engine(PolicyRegistry::new().with_policy("c", StaticPolicy::new()));
        let request = ScheduleRequest::new(vec![cand("A", "c", 1, 10), cand("B", "c", 1, 10)]);
        let run = e.run_with_seed(&request, 0).unwrap();

        assert_eq!(span(&run, "A"), (0, 10));
        assert_eq!(span(&run, "B"), (10, 20));
        assert_eq!(run.result.total_ms(|e| e.is_maintenance()), 0);
        assert_eq!(run.result.idle_ms(), 100 * MIN);
        assert_clean(&e, &request, &run);
    }

    #[test]
    fn test_long_candidate_gets_maintenance_first() {
        let e = engine(PolicyRegistry::new().with_policy(
            "c",
            StaticPolicy::new().with_max_minutes_without_maintenance(60),
        ));
        let request = ScheduleRequest::new(vec![cand("L", "c", 1, 70)]);
        let run = e.run_with_seed(&request, 0).unwrap();

        assert_eq!(span(&run, "Maintenance"), (0, 5));
        assert_eq!(span(&run, "L"), (5, 75));
        assert_clean(&e, &request, &run);
    }

    #[test]
    fn test_periodic_maintenance() {
        let e = engine(PolicyRegistry::new().with_policy(
            "c",
            StaticPolicy::new().with_max_minutes_without_maintenance(30),
        ));
        let request = ScheduleRequest::new(
            (1..=5).map(|i| cand(&format!("X{i}"), "c", 1, 10)).collect(),
        );
        let run = e.run_with_seed(&request, 0).unwrap();

        assert_eq!(span(&run, "X3"), (20, 30));
        assert_eq!(span(&run, "Maintenance"), (30, 35));
        assert_eq!(span(&run, "X4"), (35, 45));
        assert_eq!(span(&run, "X5"), (45, 55));
        assert_clean(&e, &request, &run);
    }

    #[test]
    fn test_transition_between_categories() {
        let registry = PolicyRegistry::new()
            .with_policy("a", StaticPolicy::new())
            .with_policy(
                "b",
                StaticPolicy::new().with_transitions(TransitionMatrix::new().with_default(2 * MIN)),
            );
        let e = engine(registry);
        let request = ScheduleRequest::new(vec![cand("A", "a", 1, 10), cand("B", "b", 2, 10)]);
        let run = e.run_with_seed(&request, 0).unwrap();

        assert_eq!(span(&run, "A"), (0, 10));
        assert_eq!(span(&run, "Transition"), (10, 12));
        assert_eq!(span(&run, "B"), (12, 22));
        let t = run.result.entry("Transition").unwrap();
        assert_eq!(
            t.kind,
            EntryKind::Transition {
                from: "a".into(),
                to: "b".into()
            }
        );
        assert_clean(&e, &request, &run);
    }

    #[test]
    fn test_repeats_respect_spacing() {
        let e = engine(PolicyRegistry::new().with_policy(
            "neo",
            StaticPolicy::new().with_repeats(2, 30 * MIN),
        ));
        let request = ScheduleRequest::new(vec![cand("A", "neo", 1, 10)]);
        let run = e.run_with_seed(&request, 0).unwrap();

        assert_eq!(span(&run, "A_1"), (0, 10));
        assert_eq!(span(&run, "A_2"), (30, 40));
        assert_eq!(run.result.observation_count("A"), 2);
        assert!(run.score_matrices[0].row("A_2").is_some());
        assert_clean(&e, &request, &run);
    }

    #[test]
    fn test_reversed_repeat_prefers_late_slots() {
        let e = engine(PolicyRegistry::new().with_policy(
            "neo",
            StaticPolicy::new()
                .with_repeats(2, 0)
                .with_score_shape(ScoreShape::Declining)
                .with_repeat_shape(RepeatShape::ReversedRun(1.0)),
        ));
        let request = ScheduleRequest::new(vec![
            cand("A", "neo", 1, 10).with_window(0, 60 * MIN),
            cand("F", "neo", 2, 10),
        ]);
        let run = e.run_with_seed(&request, 0).unwrap();

        assert_eq!(span(&run, "A_1"), (0, 10));
        // Second visit is placed as soon as possible with the reversed row.
        let a2 = run.result.entry("A_2").unwrap();
        assert!(a2.start_ms >= 10 * MIN);
        assert_clean(&e, &request, &run);
    }

    #[test]
    fn test_lower_tier_wins_contested_slot() {
        let e = engine(PolicyRegistry::new().with_policy("c", StaticPolicy::new()));
        let request = ScheduleRequest::new(vec![
            cand("low", "c", 5, 30),
            cand("high", "c", 1, 20).with_window(10 * MIN, 30 * MIN),
        ]);
        let run = e.run_with_seed(&request, 0).unwrap();

        assert_eq!(span(&run, "high"), (10, 30));
        // Tier 5 cannot fit in [0, 10) and goes after.
        assert_eq!(span(&run, "low"), (30, 60));
        assert_eq!(run.score_matrices.len(), 2);
        assert_eq!(run.score_matrices[0].tier, 1);
        assert_clean(&e, &request, &run);
    }

    #[test]
    fn test_later_tier_fills_gaps() {
        let e = engine(PolicyRegistry::new().with_policy("c", StaticPolicy::new()));
        let request = ScheduleRequest::new(vec![
            cand("late", "c", 1, 10).with_window(50 * MIN, 60 * MIN),
            cand("filler", "c", 2, 10),
        ]);
        let run = e.run_with_seed(&request, 0).unwrap();
        assert_eq!(span(&run, "late"), (50, 60));
        assert_eq!(span(&run, "filler"), (0, 10));
    }

    #[test]
    fn test_higher_score_wins_and_ties_keep_pool_order() {
        let registry = PolicyRegistry::new()
            .with_policy("lo", StaticPolicy::new())
            .with_policy("hi", StaticPolicy::new().with_score_shape(ScoreShape::Flat(2.0)));
        let e = engine(registry);
        let request = ScheduleRequest::new(vec![
            cand("first", "lo", 1, 10),
            cand("second", "lo", 1, 10),
            cand("best", "hi", 1, 10),
        ]);
        let run = e.run_with_seed(&request, 0).unwrap();
        assert_eq!(span(&run, "best"), (0, 10));
        assert_eq!(span(&run, "first"), (10, 20));
        assert_eq!(span(&run, "second"), (20, 30));
    }

    #[test]
    fn test_exclusions_and_constraints() {
        let e = engine(PolicyRegistry::new().with_policy("c", StaticPolicy::new()));
        let request = ScheduleRequest::new(vec![cand("A", "c", 1, 10), cand("B", "c", 1, 10)])
            .with_exclusion(0, 30 * MIN)
            .with_constraint(WindowConstraint::new("night").with_window(0, 45 * MIN));
        let run = e.run_with_seed(&request, 0).unwrap();

        assert_eq!(span(&run, "A"), (30, 40));
        assert!(run.result.entry("B").is_none());
        assert_eq!(run.result.excluded_ms(), 30 * MIN);
        assert_eq!(run.result.entries[0].kind, EntryKind::Excluded);
        assert_clean(&e, &request, &run);
    }

    #[test]
    fn test_whitelist_and_blacklist() {
        let e = engine(PolicyRegistry::new().with_policy("c", StaticPolicy::new()));
        let request = ScheduleRequest::new(vec![
            cand("A", "c", 1, 10),
            cand("B", "c", 3, 10),
            cand("C", "c", 1, 10),
        ])
        .with_whitelisted("B")
        .with_blacklisted("C");
        let run = e.run_with_seed(&request, 0).unwrap();

        assert_eq!(span(&run, "B"), (0, 10));
        assert_eq!(span(&run, "A"), (10, 20));
        assert!(run.result.entry("C").is_none());
    }

    #[test]
    fn test_whitelist_beats_higher_score_in_top_tier() {
        let registry = PolicyRegistry::new()
            .with_policy("tess", StaticPolicy::new().with_score_shape(ScoreShape::Flat(1.0)))
            .with_policy("neo", StaticPolicy::new().with_score_shape(ScoreShape::Flat(0.2)));
        let e = engine(registry);
        let request = ScheduleRequest::new(vec![
            cand("T", "tess", 1, 15).with_window(0, 20 * MIN),
            cand("W", "neo", 4, 15).with_window(0, 20 * MIN),
        ])
        .with_whitelisted("W");
        let run = e.run_with_seed(&request, 0).unwrap();

        assert_eq!(span(&run, "W"), (0, 15));
        assert!(run.result.entry("T").is_none());
        assert_eq!(run.score_matrices[0].tier, 0);
        assert_clean(&e, &request, &run);
    }

    #[test]
    fn test_transition_between_targets_of_one_category() {
        let e = engine(PolicyRegistry::new().with_policy(
            "neo",
            StaticPolicy::new().with_transitions(TransitionMatrix::new().with_default(3 * MIN)),
        ));
        let request = ScheduleRequest::new(vec![cand("A", "neo", 1, 10), cand("B", "neo", 1, 10)]);
        let run = e.run_with_seed(&request, 0).unwrap();

        assert_eq!(span(&run, "A"), (0, 10));
        assert_eq!(span(&run, "Transition"), (10, 13));
        assert_eq!(span(&run, "B"), (13, 23));
        assert_eq!(
            run.result.entry("Transition").unwrap().kind,
            EntryKind::Transition {
                from: "neo".into(),
                to: "neo".into()
            }
        );
        assert_clean(&e, &request, &run);
    }

    #[test]
    fn test_transition_into_maintenance_then_observation() {
        let e = engine(PolicyRegistry::new().with_policy(
            "c",
            StaticPolicy::new()
                .with_max_minutes_without_maintenance(30)
                .with_transitions(TransitionMatrix::new().with_default(2 * MIN)),
        ));
        let request = ScheduleRequest::new(vec![cand("X1", "c", 1, 20), cand("X2", "c", 1, 20)]);
        let run = e.run_with_seed(&request, 0).unwrap();

        let sequence: Vec<(&str, i64, i64)> = run
            .result
            .entries
            .iter()
            .filter(|e| !e.is_gap())
            .map(|e| (e.label.as_str(), e.start_ms / MIN, e.end_ms / MIN))
            .collect();
        assert_eq!(
            sequence,
            vec![
                ("X1", 0, 20),
                ("Transition", 20, 22),
                ("Maintenance", 22, 27),
                ("X2", 27, 47),
            ]
        );
        assert_eq!(
            run.result.entry("Transition").unwrap().kind,
            EntryKind::Transition {
                from: "c".into(),
                to: MAINTENANCE_CATEGORY.into()
            }
        );
        // Walk reached X2 at minute 20; delay = transition + maintenance
        let x2 = run.result.entry("X2").unwrap();
        assert_eq!(x2.start_ms - 20 * MIN, 2 * MIN + e.config().maintenance_duration_ms);
        assert_clean(&e, &request, &run);
    }

    #[test]
    fn test_scorer_failure_uses_fallback() {
        let registry = PolicyRegistry::new().with_policy("broken", Broken);
        let e = engine(registry);
        let request = ScheduleRequest::new(vec![cand("A", "broken", 1, 10)]);
        let run = e.run_with_seed(&request, 0).unwrap();

        assert_eq!(span(&run, "A"), (0, 10));
        assert!(run.score_matrices[0].rows[0].fallback);
    }

    #[test]
    fn test_huge_duration_is_skipped() {
        let e = engine(PolicyRegistry::new().with_policy(
            "c",
            StaticPolicy::new().with_max_minutes_without_maintenance(60),
        ));
        let request = ScheduleRequest::new(vec![
            CandidateBlock::new("Huge", "c")
                .with_duration(i64::MAX)
                .with_window(0, i64::MAX),
            cand("A", "c", 0, 10),
        ]);
        let run = e.run_with_seed(&request, 0).unwrap();
        assert!(run.result.entry("Huge").is_none());
        assert_eq!(span(&run, "A"), (0, 10));
    }

    #[test]
    fn test_unplaceable_is_not_an_error() {
        let e = engine(PolicyRegistry::new().with_policy("c", StaticPolicy::new()));
        let request =
            ScheduleRequest::new(vec![cand("A", "c", 1, 30).with_window(0, 20 * MIN)]);
        let run = e.run_with_seed(&request, 0).unwrap();
        assert_eq!(run.result.observations().count(), 0);
        assert_eq!(run.result.idle_ms(), 120 * MIN);
    }

    #[test]
    fn test_fatal_errors() {
        let e = engine(PolicyRegistry::new().with_policy("c", StaticPolicy::new()));

        let all_blacklisted =
            ScheduleRequest::new(vec![cand("A", "c", 1, 10)]).with_blacklisted("A");
        assert_eq!(
            e.run_with_seed(&all_blacklisted, 0).unwrap_err(),
            SchedulingError::NoCandidates
        );
        assert_eq!(
            e.run_with_seed(&ScheduleRequest::default(), 0).unwrap_err(),
            SchedulingError::NoCandidates
        );

        let unknown = ScheduleRequest::new(vec![cand("A", "comet", 1, 10)]);
        assert!(matches!(
            e.run_with_seed(&unknown, 0).unwrap_err(),
            SchedulingError::UnknownCategory { .. }
        ));

        let bad = ScheduleRequest::new(vec![cand("A", "c", 1, 0)]);
        assert!(matches!(
            e.run_with_seed(&bad, 0).unwrap_err(),
            SchedulingError::InvalidCandidate { .. }
        ));

        let bad_config = SchedulerConfig::new(0, 10).with_temperature(2.0);
        assert!(matches!(
            SchedulingEngine::new(PolicyRegistry::new(), bad_config).unwrap_err(),
            SchedulingError::InvalidConfig(_)
        ));

        let bad_policy = PolicyRegistry::new()
            .with_policy("c", StaticPolicy::new().with_repeats(1, -5));
        assert!(matches!(
            SchedulingEngine::new(bad_policy, SchedulerConfig::new(0, 10)).unwrap_err(),
            SchedulingError::InvalidPolicy { .. }
        ));
    }

    #[test]
    fn test_deterministic_at_zero_temperature() {
        let e = engine(PolicyRegistry::new().with_policy(
            "c",
            StaticPolicy::new().with_score_shape(ScoreShape::Declining),
        ));
        let request = ScheduleRequest::new(
            (0..8).map(|i| cand(&format!("T{i}"), "c", i % 3, 5 + i as i64)).collect(),
        );
        let a = e.run_with_seed(&request, 1).unwrap();
        let b = e.run_with_seed(&request, 12_345).unwrap();
        assert_eq!(a.result, b.result);
        assert_eq!(
            serde_json::to_string(&a.result).unwrap(),
            serde_json::to_string(&b.result).unwrap()
        );
    }

    #[test]
    fn test_same_seed_same_result_with_jitter() {
        let registry = PolicyRegistry::new().with_policy(
            "c",
            StaticPolicy::new().with_score_shape(ScoreShape::Declining),
        );
        let config = SchedulerConfig::new(0, 120 * MIN).with_temperature(0.5);
        let e = SchedulingEngine::new(registry, config).unwrap();
        let request = ScheduleRequest::new(
            (0..6).map(|i| cand(&format!("T{i}"), "c", 1, 10)).collect(),
        );
        let a = e.run_with_seed(&request, 42).unwrap();
        let b = e.run_with_seed(&request, 42).unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn test_result_covers_window() {
        let e = engine(PolicyRegistry::new().with_policy(
            "c",
            StaticPolicy::new().with_transitions(TransitionMatrix::new().with_default(90_000)),
        ));
        let request = ScheduleRequest::new(vec![cand("A", "c", 1, 10), cand("B", "c", 2, 10)]);
        let run = e.run_with_seed(&request, 0).unwrap();

        let mut cursor = 0;
        for entry in &run.result.entries {
            assert_eq!(entry.start_ms, cursor);
            cursor = entry.end_ms;
        }
        assert_eq!(cursor, 120 * MIN);

        let kpi = ScheduleKpi::calculate(&run.result, e.registry());
        assert_eq!(kpi.observation_count, 2);
    }

    fn arb_candidate(idx: usize) -> impl Strategy<Value = CandidateBlock> {
        (0..3i32, 1..40i64, 0..100i64, 10..120i64, 0..2usize).prop_map(
            move |(tier, dur, start, len, cat)| {
                let category = ["neo", "tess"][cat];
                CandidateBlock::new(format!("C{idx}"), category)
                    .with_tier(tier)
                    .with_duration(dur * MIN)
                    .with_window(start * MIN, (start + len) * MIN)
            },
        )
    }

    fn arb_request() -> impl Strategy<Value = Vec<CandidateBlock>> {
        (1..12usize).prop_flat_map(|n| (0..n).map(arb_candidate).collect::<Vec<_>>())
    }

    proptest! {
        #[test]
        fn prop_schedule_is_valid(
            candidates in arb_request(),
            excl_start in 0..150i64,
            excl_len in 0..30i64,
            seed in 0..1000u64,
        ) {
            let registry = PolicyRegistry::new()
                .with_policy(
                    "neo",
                    StaticPolicy::new()
                        .with_repeats(3, 20 * MIN)
                        .with_max_minutes_without_maintenance(45)
                        .with_score_shape(ScoreShape::Declining)
                        .with_repeat_shape(RepeatShape::ReversedRun(0.9))
                        .with_transitions(TransitionMatrix::new().with_default(90_000)),
                )
                .with_policy(
                    "tess",
                    StaticPolicy::new()
                        .with_max_minutes_without_maintenance(60)
                        .with_transitions(TransitionMatrix::new().with_default(2 * MIN)),
                );
            let config = SchedulerConfig::new(0, 180 * MIN)
                .with_temperature(0.3)
                .with_maintenance_duration_ms(4 * MIN);
            let engine = SchedulingEngine::new(registry, config).unwrap();
            let request = ScheduleRequest::new(candidates)
                .with_exclusion(excl_start * MIN, (excl_start + excl_len) * MIN);

            let run = engine.run_with_seed(&request, seed).unwrap();
            let violations = check_schedule(
                &run.result,
                &request.candidates,
                &request.exclusions,
                engine.registry(),
                engine.config(),
            );
            prop_assert!(violations.is_empty(), "violations: {:?}", violations);

            let mut cursor = 0;
            for entry in &run.result.entries {
                prop_assert_eq!(entry.start_ms, cursor);
                cursor = entry.end_ms;
            }
            prop_assert_eq!(cursor, 180 * MIN);
        }

        #[test]
        fn prop_zero_temperature_ignores_seed(
            candidates in arb_request(),
            seed_a in 0..1000u64,
            seed_b in 0..1000u64,
        ) {
            let registry = PolicyRegistry::new()
                .with_policy("neo", StaticPolicy::new().with_repeats(2, 15 * MIN))
                .with_policy("tess", StaticPolicy::new());
            let engine = SchedulingEngine::new(registry, SchedulerConfig::new(0, 180 * MIN)).unwrap();
            let request = ScheduleRequest::new(candidates);
            let a = engine.run_with_seed(&request, seed_a).unwrap();
            let b = engine.run_with_seed(&request, seed_b).unwrap();
            prop_assert_eq!(a.result, b.result);
        }
    }
}
