//! Input validation and schedule checking.
//!
//! [`validate_candidates`] checks the structural integrity of the
//! candidates before scheduling. Detects:
//! - Duplicate names
//! - Non-positive durations
//! - Empty or inverted observability windows
//! - Categories with no registered policy
//!
//! [`check_schedule`] re-verifies a finished [`ScheduleResult`] against
//! the hard rules of the night: no overlap, chronological order, window
//! containment, exclusions, repeat bounds and maintenance timing.

use std::collections::{HashMap, HashSet};

use crate::error::SchedulingError;
use crate::models::{
    CandidateBlock, EntryKind, PolicyRegistry, ScheduleResult, ScheduledEntry, TimeWindow,
    Violation, ViolationType,
};
use crate::scheduler::SchedulerConfig;

/// Validation result.
pub type ValidationResult = Result<(), Vec<ValidationError>>;

/// A validation error.
#[derive(Debug, Clone, PartialEq)]
pub struct ValidationError {
    /// Error category.
    pub kind: ValidationErrorKind,
    /// Name of the offending candidate.
    pub candidate: String,
    /// Human-readable description.
    pub message: String,
}

/// Categories of validation errors.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ValidationErrorKind {
    /// Two candidates share the same name.
    DuplicateName,
    /// Duration is zero or negative.
    InvalidDuration,
    /// Observability window is empty or inverted.
    InvalidWindow,
    /// The category has no registered policy.
    UnknownCategory(String),
}

impl ValidationError {
    fn new(kind: ValidationErrorKind, candidate: &str, message: impl Into<String>) -> Self {
        Self {
            kind,
            candidate: candidate.to_string(),
            message: message.into(),
        }
    }
}

impl From<ValidationError> for SchedulingError {
    fn from(e: ValidationError) -> Self {
        match e.kind {
            ValidationErrorKind::UnknownCategory(category) => SchedulingError::UnknownCategory {
                candidate: e.candidate,
                category,
            },
            _ => SchedulingError::InvalidCandidate {
                candidate: e.candidate,
                reason: e.message,
            },
        }
    }
}

/// Validates the candidates of a scheduling problem.
///
/// # Returns
/// `Ok(())` if all checks pass, `Err(errors)` with all detected issues.
pub fn validate_candidates<'a, I>(candidates: I, registry: &PolicyRegistry) -> ValidationResult
where
    I: IntoIterator<Item = &'a CandidateBlock>,
{
    let mut errors = Vec::new();
    let mut names = HashSet::new();

    for c in candidates {
        if !names.insert(c.name.as_str()) {
            errors.push(ValidationError::new(
                ValidationErrorKind::DuplicateName,
                &c.name,
                format!("Duplicate candidate name: {}", c.name),
            ));
        }
        if c.duration_ms <= 0 {
            errors.push(ValidationError::new(
                ValidationErrorKind::InvalidDuration,
                &c.name,
                format!("duration must be positive, got {} ms", c.duration_ms),
            ));
        }
        if !c.observability.is_valid() {
            errors.push(ValidationError::new(
                ValidationErrorKind::InvalidWindow,
                &c.name,
                format!(
                    "observability window [{}, {}) is empty",
                    c.observability.start_ms, c.observability.end_ms
                ),
            ));
        }
        if !registry.contains(&c.category) {
            errors.push(ValidationError::new(
                ValidationErrorKind::UnknownCategory(c.category.clone()),
                &c.name,
                format!("no policy registered for category '{}'", c.category),
            ));
        }
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}

/// Checks a finished schedule for rule violations.
///
/// `candidates` supplies observability windows by name and `exclusions`
/// the ranges no entry may touch. The maintenance bound is not enforced
/// for a candidate longer than its category's limit that directly
/// follows a maintenance loop, since no placement could satisfy it.
pub fn check_schedule(
    result: &ScheduleResult,
    candidates: &[CandidateBlock],
    exclusions: &[TimeWindow],
    registry: &PolicyRegistry,
    config: &SchedulerConfig,
) -> Vec<Violation> {
    let mut violations = Vec::new();
    let by_name: HashMap<&str, &CandidateBlock> =
        candidates.iter().map(|c| (c.name.as_str(), c)).collect();

    check_sequence(result, &mut violations);

    let activities: Vec<&ScheduledEntry> = result.activities().collect();
    for (i, entry) in activities.iter().enumerate() {
        if !result.window.contains_span(entry.start_ms, entry.end_ms) {
            violations.push(Violation::new(
                ViolationType::OutsideWindow,
                &entry.label,
                "entry lies outside the scheduling window",
            ));
        }
        if exclusions
            .iter()
            .any(|w| w.is_valid() && w.overlaps(&entry.span()))
        {
            violations.push(Violation::new(
                ViolationType::ExclusionOverlap,
                &entry.label,
                "entry overlaps an exclusion range",
            ));
        }

        let EntryKind::Observation {
            candidate,
            category,
            ..
        } = &entry.kind
        else {
            continue;
        };

        if let Some(block) = by_name.get(candidate.as_str()) {
            if !block.observability.contains_span(entry.start_ms, entry.end_ms) {
                violations.push(Violation::new(
                    ViolationType::OutsideWindow,
                    &entry.label,
                    format!(
                        "observation [{}, {}) leaves window [{}, {})",
                        entry.start_ms,
                        entry.end_ms,
                        block.observability.start_ms,
                        block.observability.end_ms
                    ),
                ));
            }
        }

        let Some(max) = registry
            .get(category)
            .and_then(|p| p.max_ms_without_maintenance())
        else {
            continue;
        };
        let last_maintenance = activities[..i]
            .iter()
            .filter(|e| e.is_maintenance() && e.end_ms <= entry.start_ms)
            .map(|e| e.end_ms)
            .max()
            .unwrap_or_else(|| config.initial_maintenance_ms());
        let follows_maintenance = i > 0 && activities[i - 1].is_maintenance();
        let exempt = entry.duration_ms() > max && follows_maintenance;
        if entry.end_ms - last_maintenance > max && !exempt {
            violations.push(Violation::new(
                ViolationType::MaintenanceOverdue,
                &entry.label,
                format!(
                    "ends {} ms after the last maintenance, limit {} ms",
                    entry.end_ms - last_maintenance,
                    max
                ),
            ));
        }
    }

    check_repeats(result, registry, &mut violations);
    violations
}

fn check_sequence(result: &ScheduleResult, violations: &mut Vec<Violation>) {
    for pair in result.entries.windows(2) {
        let (a, b) = (&pair[0], &pair[1]);
        if b.start_ms < a.start_ms {
            violations.push(Violation::new(
                ViolationType::ChronologicalOrder,
                &b.label,
                format!("starts before preceding entry '{}'", a.label),
            ));
        } else if b.start_ms < a.end_ms {
            violations.push(Violation::new(
                ViolationType::Overlap,
                &b.label,
                format!("overlaps '{}'", a.label),
            ));
        }
    }
}

fn check_repeats(
    result: &ScheduleResult,
    registry: &PolicyRegistry,
    violations: &mut Vec<Violation>,
) {
    let mut starts: HashMap<&str, (&str, Vec<&ScheduledEntry>)> = HashMap::new();
    for entry in result.observations() {
        if let EntryKind::Observation {
            candidate,
            category,
            ..
        } = &entry.kind
        {
            starts
                .entry(candidate.as_str())
                .or_insert_with(|| (category.as_str(), Vec::new()))
                .1
                .push(entry);
        }
    }

    let mut names: Vec<&str> = starts.keys().copied().collect();
    names.sort_unstable();
    for name in names {
        let Some((category, entries)) = starts.get(name) else {
            continue;
        };
        let Some(policy) = registry.get(category) else {
            continue;
        };
        if entries.len() > policy.required_repeat_count() as usize {
            violations.push(Violation::new(
                ViolationType::RepeatCountExceeded,
                name,
                format!(
                    "observed {} times, required {}",
                    entries.len(),
                    policy.required_repeat_count()
                ),
            ));
        }
        let spacing = policy.min_ms_between_repeats();
        for pair in entries.windows(2) {
            if pair[1].start_ms - pair[0].start_ms < spacing {
                violations.push(Violation::new(
                    ViolationType::RepeatSpacing,
                    &pair[1].label,
                    format!(
                        "starts {} ms after '{}', minimum {} ms",
                        pair[1].start_ms - pair[0].start_ms,
                        pair[0].label,
                        spacing
                    ),
                ));
            }
        }
    }
}
