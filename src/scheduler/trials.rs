//! Multi-trial runs.
//!
//! With a non-zero temperature every seed yields a slightly different
//! night. [`TrialRunner`] runs the engine with seeds `base_seed + i` and
//! keeps the best result by a [`TrialObjective`].
//!
//! Trials share nothing mutable. With the `parallel` feature they run on
//! the rayon pool; the winner is still picked by scanning in trial order,
//! so the outcome does not depend on thread scheduling.

#[cfg(feature = "parallel")]
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use tracing::info;

use super::{ScheduleKpi, ScheduleRequest, ScheduleRun, SchedulingEngine};
use crate::error::{Result, SchedulingError};

/// Metric used to pick the best trial.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum TrialObjective {
    /// Fraction of usable time filled.
    Fullness,
    /// Fraction of required repeat visits placed.
    RepeatFulfillment,
    /// Product of fullness and repeat fulfilment.
    #[default]
    Combined,
}

impl TrialObjective {
    /// Evaluates the objective on a KPI set. Higher is better.
    pub fn evaluate(&self, kpi: &ScheduleKpi) -> f64 {
        match self {
            TrialObjective::Fullness => kpi.fullness,
            TrialObjective::RepeatFulfillment => kpi.repeat_fulfillment,
            TrialObjective::Combined => kpi.fullness * kpi.repeat_fulfillment,
        }
    }
}

/// Configuration of a multi-trial run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrialConfig {
    /// Number of trials.
    pub trials: usize,
    /// Selection metric.
    #[serde(default)]
    pub objective: TrialObjective,
    /// Seed of trial 0; trial `i` uses `base_seed + i`.
    #[serde(default)]
    pub base_seed: u64,
}

impl Default for TrialConfig {
    fn default() -> Self {
        Self {
            trials: 10,
            objective: TrialObjective::default(),
            base_seed: 0,
        }
    }
}

impl TrialConfig {
    /// Sets the number of trials.
    pub fn with_trials(mut self, trials: usize) -> Self {
        self.trials = trials;
        self
    }

    /// Sets the selection metric.
    pub fn with_objective(mut self, objective: TrialObjective) -> Self {
        self.objective = objective;
        self
    }

    /// Sets the base seed.
    pub fn with_base_seed(mut self, seed: u64) -> Self {
        self.base_seed = seed;
        self
    }

    /// Validates the configuration.
    pub fn validate(&self) -> std::result::Result<(), String> {
        if self.trials == 0 {
            return Err("trials must be at least 1".into());
        }
        Ok(())
    }
}

/// Summary of one trial.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrialOutcome {
    /// Trial index.
    pub trial: usize,
    /// Jitter seed.
    pub seed: u64,
    /// Objective value.
    pub metric: f64,
    /// Full KPI set.
    pub kpi: ScheduleKpi,
}

/// Result of a multi-trial run.
#[derive(Debug, Clone)]
pub struct TrialReport {
    /// The winning run.
    pub best: ScheduleRun,
    /// Index of the winning trial.
    pub best_trial: usize,
    /// Every trial, in trial order.
    pub outcomes: Vec<TrialOutcome>,
}

impl TrialReport {
    /// Outcome of the winning trial.
    pub fn best_outcome(&self) -> Option<&TrialOutcome> {
        self.outcomes.get(self.best_trial)
    }
}

/// Runs the engine several times and keeps the best night.
///
/// # Example
/// ```
/// use nightplan::models::{CandidateBlock, PolicyRegistry, StaticPolicy};
/// use nightplan::scheduler::{
///     ScheduleRequest, SchedulerConfig, SchedulingEngine, TrialConfig, TrialRunner,
/// };
///
/// let registry = PolicyRegistry::new().with_policy("TESS", StaticPolicy::new());
/// let config = SchedulerConfig::new(0, 3_600_000).with_temperature(0.2);
/// let engine = SchedulingEngine::new(registry, config).unwrap();
/// let request = ScheduleRequest::new(vec![
///     CandidateBlock::new("TOI-270", "TESS")
///         .with_duration(600_000)
///         .with_window(0, 3_600_000),
/// ]);
///
/// let runner = TrialRunner::new(&engine, TrialConfig::default().with_trials(4)).unwrap();
/// let report = runner.run(&request).unwrap();
/// assert_eq!(report.outcomes.len(), 4);
/// ```
#[derive(Debug, Clone)]
pub struct TrialRunner<'e> {
    engine: &'e SchedulingEngine,
    config: TrialConfig,
}

impl<'e> TrialRunner<'e> {
    /// Creates a runner.
    ///
    /// # Errors
    /// [`SchedulingError::InvalidConfig`] if the trial configuration is invalid.
    pub fn new(engine: &'e SchedulingEngine, config: TrialConfig) -> Result<Self> {
        config.validate().map_err(SchedulingError::InvalidConfig)?;
        Ok(Self { engine, config })
    }

    /// Runs all trials and returns the best.
    ///
    /// Ties go to the lowest trial index. The first fatal error of any
    /// trial (in trial order) is returned.
    pub fn run(&self, request: &ScheduleRequest) -> Result<TrialReport> {
        let runs = self.run_all(request)?;

        let mut outcomes = Vec::with_capacity(runs.len());
        let mut best: Option<(usize, f64, ScheduleRun)> = None;
        for (trial, run) in runs.into_iter().enumerate() {
            let kpi = ScheduleKpi::calculate(&run.result, self.engine.registry());
            let metric = self.config.objective.evaluate(&kpi);
            outcomes.push(TrialOutcome {
                trial,
                seed: run.seed,
                metric,
                kpi,
            });
            if best.as_ref().map_or(true, |(_, m, _)| metric > *m) {
                best = Some((trial, metric, run));
            }
        }

        let Some((best_trial, best_metric, best)) = best else {
            return Err(SchedulingError::InvalidConfig("no trials were run".into()));
        };
        info!(
            trials = outcomes.len(),
            best_trial,
            metric = best_metric,
            "trials finished"
        );
        Ok(TrialReport {
            best,
            best_trial,
            outcomes,
        })
    }

    fn seed(&self, trial: usize) -> u64 {
        self.config.base_seed.wrapping_add(trial as u64)
    }

    #[cfg(feature = "parallel")]
    fn run_all(&self, request: &ScheduleRequest) -> Result<Vec<ScheduleRun>> {
        (0..self.config.trials)
            .into_par_iter()
            .map(|trial| self.engine.run_with_seed(request, self.seed(trial)))
            .collect::<Vec<_>>()
            .into_iter()
            .collect()
    }

    #[cfg(not(feature = "parallel"))]
    fn run_all(&self, request: &ScheduleRequest) -> Result<Vec<ScheduleRun>> {
        (0..self.config.trials)
            .map(|trial| self.engine.run_with_seed(request, self.seed(trial)))
            .collect()
    }
}
