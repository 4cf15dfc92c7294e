//! Score array computation.
//!
//! For the blocks of one tier, computes `score[block][slot]` over the
//! shared [`TimeGrid`], category by category, using each category's
//! [`TypePolicy`]. Every row is then:
//!
//! 1. masked with the block's observability indicator,
//! 2. multiplied by every global [`ScoreConstraint`],
//! 3. multiplied by a per-block temperature jitter,
//! 4. clamped so negative and non-finite values become 0.
//!
//! A category whose scorer fails (or returns a malformed row) does not
//! abort the run: the whole batch falls back to the generic score, the
//! product of the observability indicator and the global constraints.

use std::sync::Arc;

use rand::Rng;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::error::{Result, ScoreError, SchedulingError};
use crate::models::{CandidateBlock, PolicyRegistry, ScoreConstraint, TimeGrid};

/// Score row of one block (or repeat instance).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScoreRow {
    /// Instance label.
    pub name: String,
    /// Candidate category.
    pub category: String,
    /// Jitter factor applied to this row.
    pub jitter: f64,
    /// Whether the generic fallback score was used.
    pub fallback: bool,
    /// One value per grid slot.
    pub values: Vec<f64>,
}

/// All score rows computed for one tier, in pool order.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScoreMatrix {
    /// Tier these rows belong to.
    pub tier: i32,
    /// Rows, one per pool entry.
    pub rows: Vec<ScoreRow>,
}

impl ScoreMatrix {
    /// Row for an instance label.
    pub fn row(&self, name: &str) -> Option<&ScoreRow> {
        self.rows.iter().find(|r| r.name == name)
    }
}

/// Draws the multiplicative jitter for one block.
///
/// Uniform in `[1 - T, 1 + T]`, rounded to 3 decimals. A temperature of
/// 0 returns exactly 1.0 without touching the RNG.
pub fn draw_jitter<R: Rng + ?Sized>(rng: &mut R, temperature: f64) -> f64 {
    if temperature <= 0.0 {
        return 1.0;
    }
    let t = temperature.min(1.0);
    let value: f64 = rng.random_range((1.0 - t)..=(1.0 + t));
    (value * 1000.0).round() / 1000.0
}

/// Builds score matrices for tiers.
#[derive(Debug)]
pub struct ScoreArrayBuilder<'a> {
    grid: TimeGrid,
    registry: &'a PolicyRegistry,
    constraints: &'a [Arc<dyn ScoreConstraint>],
    temperature: f64,
}

impl<'a> ScoreArrayBuilder<'a> {
    /// Creates a builder with no global constraints and zero temperature.
    pub fn new(grid: TimeGrid, registry: &'a PolicyRegistry) -> Self {
        Self {
            grid,
            registry,
            constraints: &[],
            temperature: 0.0,
        }
    }

    /// Sets the global constraints.
    pub fn with_constraints(mut self, constraints: &'a [Arc<dyn ScoreConstraint>]) -> Self {
        self.constraints = constraints;
        self
    }

    /// Sets the jitter temperature.
    pub fn with_temperature(mut self, temperature: f64) -> Self {
        self.temperature = temperature;
        self
    }

    /// The grid rows are computed over.
    pub fn grid(&self) -> &TimeGrid {
        &self.grid
    }

    /// Computes the score matrix for the blocks of one tier.
    ///
    /// Jitter is drawn once per block, in block order, before any
    /// category is scored. `labels` gives each block's instance label.
    ///
    /// # Errors
    /// [`SchedulingError::UnknownCategory`] if a block's category has no
    /// registered policy.
    pub fn build_tier<R: Rng + ?Sized>(
        &self,
        tier: i32,
        blocks: &[CandidateBlock],
        labels: &[String],
        rng: &mut R,
    ) -> Result<ScoreMatrix> {
        let jitters: Vec<f64> = blocks
            .iter()
            .map(|_| draw_jitter(rng, self.temperature))
            .collect();

        let mut rows: Vec<Option<ScoreRow>> = vec![None; blocks.len()];
        for category in categories_in_order(blocks) {
            let indices: Vec<usize> = (0..blocks.len())
                .filter(|&i| blocks[i].category == category)
                .collect();

            let (raw, fallback) = match self.score_category(category, &indices, blocks)? {
                Ok(raw) => (raw, false),
                Err(e) => {
                    warn!(
                        tier,
                        category,
                        error = %e,
                        "scorer failed; using fallback score for category batch"
                    );
                    let raw = indices
                        .iter()
                        .map(|&i| self.fallback_row(&blocks[i]))
                        .collect();
                    (raw, true)
                }
            };

            for (&i, values) in indices.iter().zip(raw) {
                let block = &blocks[i];
                let values = scale(self.mask(block, values), jitters[i]);
                rows[i] = Some(ScoreRow {
                    name: labels.get(i).cloned().unwrap_or_else(|| block.name.clone()),
                    category: block.category.clone(),
                    jitter: jitters[i],
                    fallback,
                    values,
                });
            }
        }

        let rows: Vec<ScoreRow> = rows.into_iter().flatten().collect();
        debug!(tier, blocks = rows.len(), "computed score matrix");
        Ok(ScoreMatrix { tier, rows })
    }

    /// Scores one category batch with its policy.
    ///
    /// The outer result is fatal; the inner one is the scorer's outcome.
    fn score_category(
        &self,
        category: &str,
        indices: &[usize],
        blocks: &[CandidateBlock],
    ) -> Result<std::result::Result<Vec<Vec<f64>>, ScoreError>> {
        let Some(policy) = self.registry.get(category) else {
            let candidate = indices
                .first()
                .map(|&i| blocks[i].name.clone())
                .unwrap_or_default();
            return Err(SchedulingError::UnknownCategory {
                candidate,
                category: category.to_string(),
            });
        };

        let mut raw = Vec::with_capacity(indices.len());
        for &i in indices {
            let block = &blocks[i];
            let row = match policy.score(block, &self.grid) {
                Ok(row) => row,
                Err(e) => return Ok(Err(e)),
            };
            if row.len() != self.grid.len {
                return Ok(Err(ScoreError::RowLength {
                    block: block.name.clone(),
                    expected: self.grid.len,
                    actual: row.len(),
                }));
            }
            raw.push(row);
        }
        Ok(Ok(raw))
    }

    /// Generic score: observability indicator times the global constraints.
    pub fn fallback_row(&self, block: &CandidateBlock) -> Vec<f64> {
        self.mask(block, vec![1.0; self.grid.len])
    }

    /// Applies the observability indicator and global constraints, and
    /// clamps invalid values to 0.
    pub fn mask(&self, block: &CandidateBlock, mut row: Vec<f64>) -> Vec<f64> {
        let indicator = self.grid.indicator(&block.observability);
        for (v, ind) in row.iter_mut().zip(&indicator) {
            *v *= ind;
        }
        for constraint in self.constraints {
            let factors = constraint.evaluate(block, &self.grid);
            for (i, v) in row.iter_mut().enumerate() {
                // A short constraint row forbids the slots it does not cover.
                *v *= factors.get(i).copied().unwrap_or(0.0);
            }
        }
        clamp(row)
    }
}

fn scale(row: Vec<f64>, factor: f64) -> Vec<f64> {
    if factor == 1.0 {
        return row;
    }
    clamp(row.into_iter().map(|v| v * factor).collect())
}

/// Replaces negative and non-finite values with 0.
pub(crate) fn clamp(mut row: Vec<f64>) -> Vec<f64> {
    for v in &mut row {
        if !v.is_finite() || *v < 0.0 {
            *v = 0.0;
        }
    }
    row
}

fn categories_in_order(blocks: &[CandidateBlock]) -> Vec<&str> {
    let mut seen: Vec<&str> = Vec::new();
    for b in blocks {
        if !seen.contains(&b.category.as_str()) {
            seen.push(&b.category);
        }
    }
    seen
}
