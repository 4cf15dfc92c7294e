//! Schedule (solution) model.
//!
//! A schedule result is the night's timeline: observations, maintenance
//! loops and transitions in chronological order, with the leftover time
//! reported as idle or excluded gaps. It may be checked for rule
//! violations with [`check_schedule`](crate::validation::check_schedule).

use serde::{Deserialize, Serialize};

use super::TimeWindow;

/// What occupies a span of the timeline.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum EntryKind {
    /// A science observation of a candidate.
    Observation {
        /// Base candidate name (without repeat suffix).
        candidate: String,
        /// Candidate category.
        category: String,
        /// 1-based repeat index.
        repeat_index: u32,
        /// Tier the candidate was scheduled in.
        tier: i32,
        /// Score at the chosen start slot.
        score: f64,
    },
    /// An instrument maintenance (focus) loop.
    Maintenance,
    /// Overhead between two activities.
    Transition {
        /// Category being left.
        from: String,
        /// Category being entered.
        to: String,
    },
    /// Unused time.
    Idle,
    /// Time excluded by the caller.
    Excluded,
}

/// One span of the schedule.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScheduledEntry {
    /// What happens during this span.
    pub kind: EntryKind,
    /// Display label (instance name, "Maintenance", "Transition", ...).
    pub label: String,
    /// Start time (ms).
    pub start_ms: i64,
    /// End time (ms, exclusive).
    pub end_ms: i64,
}

impl ScheduledEntry {
    /// Creates a new entry.
    pub fn new(kind: EntryKind, label: impl Into<String>, start_ms: i64, end_ms: i64) -> Self {
        Self {
            kind,
            label: label.into(),
            start_ms,
            end_ms,
        }
    }

    /// Duration (ms).
    #[inline]
    pub fn duration_ms(&self) -> i64 {
        self.end_ms - self.start_ms
    }

    /// Span as a window.
    pub fn span(&self) -> TimeWindow {
        TimeWindow::new(self.start_ms, self.end_ms)
    }

    /// Whether this entry is an observation.
    pub fn is_observation(&self) -> bool {
        matches!(self.kind, EntryKind::Observation { .. })
    }

    /// Whether this entry is a maintenance loop.
    pub fn is_maintenance(&self) -> bool {
        matches!(self.kind, EntryKind::Maintenance)
    }

    /// Whether this entry is a gap (idle or excluded).
    pub fn is_gap(&self) -> bool {
        matches!(self.kind, EntryKind::Idle | EntryKind::Excluded)
    }

    /// Base candidate name for observations.
    pub fn candidate(&self) -> Option<&str> {
        match &self.kind {
            EntryKind::Observation { candidate, .. } => Some(candidate),
            _ => None,
        }
    }
}

/// The finished timeline of one engine run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScheduleResult {
    /// The scheduling window.
    pub window: TimeWindow,
    /// Entries in chronological order, covering the window without overlap.
    pub entries: Vec<ScheduledEntry>,
}

impl ScheduleResult {
    /// Creates a result from entries, sorting them by start time.
    pub fn new(window: TimeWindow, mut entries: Vec<ScheduledEntry>) -> Self {
        entries.sort_by_key(|e| (e.start_ms, e.end_ms));
        Self { window, entries }
    }

    /// Observation entries, in order.
    pub fn observations(&self) -> impl Iterator<Item = &ScheduledEntry> {
        self.entries.iter().filter(|e| e.is_observation())
    }

    /// Observations of one base candidate, in order.
    pub fn observations_of<'a>(
        &'a self,
        candidate: &'a str,
    ) -> impl Iterator<Item = &'a ScheduledEntry> + 'a {
        self.observations()
            .filter(move |e| e.candidate() == Some(candidate))
    }

    /// Number of observations of one base candidate.
    pub fn observation_count(&self, candidate: &str) -> usize {
        self.observations_of(candidate).count()
    }

    /// Base names of scheduled candidates, in first-appearance order.
    pub fn scheduled_candidates(&self) -> Vec<&str> {
        let mut seen: Vec<&str> = Vec::new();
        for name in self.observations().filter_map(|e| e.candidate()) {
            if !seen.contains(&name) {
                seen.push(name);
            }
        }
        seen
    }

    /// Finds the entry with a given label.
    pub fn entry(&self, label: &str) -> Option<&ScheduledEntry> {
        self.entries.iter().find(|e| e.label == label)
    }

    /// Entries that are not gaps.
    pub fn activities(&self) -> impl Iterator<Item = &ScheduledEntry> {
        self.entries.iter().filter(|e| !e.is_gap())
    }

    /// Total time (ms) of entries matching a predicate.
    pub fn total_ms(&self, pred: impl Fn(&ScheduledEntry) -> bool) -> i64 {
        self.entries
            .iter()
            .filter(|e| pred(e))
            .map(|e| e.duration_ms())
            .sum()
    }

    /// Total idle time (ms).
    pub fn idle_ms(&self) -> i64 {
        self.total_ms(|e| matches!(e.kind, EntryKind::Idle))
    }

    /// Total excluded time (ms).
    pub fn excluded_ms(&self) -> i64 {
        self.total_ms(|e| matches!(e.kind, EntryKind::Excluded))
    }

    /// Number of entries.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether the result has no entries.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// A rule violation found when checking a schedule.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Violation {
    /// Type of violation.
    pub violation_type: ViolationType,
    /// Label of the offending entry.
    pub entity_id: String,
    /// Human-readable description.
    pub message: String,
    /// Severity (0-100, higher = worse).
    pub severity: i32,
}

/// Classification of schedule violations.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum ViolationType {
    /// Two entries overlap.
    Overlap,
    /// Entries are not in chronological order.
    ChronologicalOrder,
    /// An observation leaves its observability window.
    OutsideWindow,
    /// An entry overlaps an exclusion range.
    ExclusionOverlap,
    /// A candidate was observed more often than required.
    RepeatCountExceeded,
    /// Two observations of a candidate start too close together.
    RepeatSpacing,
    /// An observation ends too long after the last maintenance loop.
    MaintenanceOverdue,
    /// Domain-specific violation.
    Custom(String),
}

impl Violation {
    /// Creates a violation.
    pub fn new(
        violation_type: ViolationType,
        entity_id: impl Into<String>,
        message: impl Into<String>,
    ) -> Self {
        let severity = match violation_type {
            ViolationType::Overlap | ViolationType::ExclusionOverlap => 95,
            ViolationType::OutsideWindow => 90,
            ViolationType::ChronologicalOrder => 85,
            ViolationType::MaintenanceOverdue => 70,
            ViolationType::RepeatCountExceeded | ViolationType::RepeatSpacing => 60,
            ViolationType::Custom(_) => 50,
        };
        Self {
            violation_type,
            entity_id: entity_id.into(),
            message: message.into(),
            severity,
        }
    }
}
