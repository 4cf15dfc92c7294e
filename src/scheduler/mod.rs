//! Tiered greedy scheduling and KPI evaluation.
//!
//! Provides the scheduling engine, its inputs, multi-trial runs and
//! schedule quality metrics.
//!
//! # Algorithm
//!
//! `SchedulingEngine` fills the night tier by tier. Within a tier it walks
//! the time grid and commits, at each free slot, the candidate with the
//! best score there, inserting maintenance loops and transitions as the
//! category policies require. It is not optimal, but it is fast and
//! deterministic for a given seed.
//!
//! # KPI
//!
//! `ScheduleKpi` computes fullness, repeat fulfilment and overhead totals.
//! `TrialRunner` uses them to pick the best of several jittered runs.

mod config;
mod engine;
mod kpi;
mod request;
mod trials;

pub use config::SchedulerConfig;
pub use engine::{ScheduleRun, SchedulingEngine};
pub use kpi::ScheduleKpi;
pub use request::ScheduleRequest;
pub use trials::{TrialConfig, TrialObjective, TrialOutcome, TrialReport, TrialRunner};
