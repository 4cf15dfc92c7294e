//! Scheduling domain models.
//!
//! Provides the data types for one night's scheduling problem and its
//! solution.
//!
//! # Domain Mappings
//!
//! | nightplan | Meaning at the telescope |
//! |-----------|--------------------------|
//! | CandidateBlock | One target observation (exposure sequence) |
//! | TypePolicy | Rules of a survey/category (NEO, TESS, ...) |
//! | TimeGrid | The night, discretized at the gap resolution |
//! | ScheduleResult | The night plan handed to the sequencer |

mod block;
mod constraint;
mod grid;
mod policy;
mod schedule;
mod transition;
mod window;

pub use block::CandidateBlock;
pub use constraint::{ScoreConstraint, WindowConstraint};
pub use grid::TimeGrid;
pub use policy::{
    reverse_nonzero_run, PolicyRegistry, RepeatShape, ScoreShape, StaticPolicy, TypePolicy,
    MAINTENANCE_CATEGORY,
};
pub use schedule::{EntryKind, ScheduleResult, ScheduledEntry, Violation, ViolationType};
pub use transition::TransitionMatrix;
pub use window::TimeWindow;
