//! Priority-tiered observation scheduling for a robotic telescope.
//!
//! Builds one night's timeline (science observations, instrument
//! maintenance loops and transitions between targets) from scored
//! candidates, tier by tier, without ever overlapping two entries.
//!
//! # Modules
//!
//! - **`models`**: Domain types: `CandidateBlock`, `TypePolicy`,
//!   `PolicyRegistry`, `TimeGrid`, `TimeWindow`, `TransitionMatrix`,
//!   `ScheduleResult`
//! - **`scoring`**: Per-tier score matrices with jitter and fallback
//! - **`timeline`**: Slot occupancy over the night
//! - **`scheduler`**: The greedy engine, requests, trials and KPIs
//! - **`validation`**: Candidate checks and finished-schedule checks
//!
//! # Example
//!
//! ```
//! use nightplan::models::{CandidateBlock, PolicyRegistry, StaticPolicy};
//! use nightplan::scheduler::{ScheduleRequest, SchedulerConfig, SchedulingEngine};
//!
//! const MIN: i64 = 60_000;
//!
//! let registry = PolicyRegistry::new().with_policy(
//!     "TESS",
//!     StaticPolicy::new().with_max_minutes_without_maintenance(60),
//! );
//! let engine = SchedulingEngine::new(registry, SchedulerConfig::new(0, 120 * MIN)).unwrap();
//!
//! let request = ScheduleRequest::new(vec![CandidateBlock::new("TOI-1338", "TESS")
//!     .with_duration(70 * MIN)
//!     .with_window(0, 120 * MIN)]);
//! let run = engine.run_with_seed(&request, 0).unwrap();
//!
//! // Too long for the focus limit: a maintenance loop goes first.
//! let maintenance = run.result.entry("Maintenance").unwrap();
//! assert_eq!((maintenance.start_ms, maintenance.end_ms), (0, 5 * MIN));
//! ```
//!
//! # Logging
//!
//! Emits `tracing` events (`info` per run, `debug` per tier and commit,
//! `warn` on scorer fallback). Installing a subscriber is up to the caller.

pub mod error;
pub mod models;
pub mod scheduler;
pub mod scoring;
pub mod timeline;
pub mod validation;

pub use error::{Result, ScoreError, SchedulingError};
