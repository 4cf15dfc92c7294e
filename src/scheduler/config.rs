//! Engine configuration.

use serde::{Deserialize, Serialize};

use crate::models::{TimeGrid, TimeWindow};

fn default_gap_resolution_ms() -> i64 {
    60_000
}

fn default_maintenance_duration_ms() -> i64 {
    300_000
}

/// Configuration of one scheduling night.
///
/// # Example
/// ```
/// use nightplan::scheduler::SchedulerConfig;
///
/// let config = SchedulerConfig::new(0, 8 * 3_600_000)
///     .with_gap_resolution_ms(30_000)
///     .with_temperature(0.1)
///     .with_seed(7);
/// assert!(config.validate().is_ok());
/// assert_eq!(config.grid().len, 960);
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SchedulerConfig {
    /// Start of the scheduling window (ms).
    pub start_ms: i64,

    /// End of the scheduling window (ms, exclusive).
    pub end_ms: i64,

    /// Grid step (ms). Placement decisions happen on this grid.
    #[serde(default = "default_gap_resolution_ms")]
    pub gap_resolution_ms: i64,

    /// Duration of an inserted maintenance loop (ms).
    #[serde(default = "default_maintenance_duration_ms")]
    pub maintenance_duration_ms: i64,

    /// End of the last maintenance loop before the window (ms).
    ///
    /// `None` treats the instrument as freshly maintained at `start_ms`.
    #[serde(default)]
    pub last_maintenance_ms: Option<i64>,

    /// Score jitter temperature in `[0, 1]`. 0 disables jitter.
    #[serde(default)]
    pub temperature: f64,

    /// Random seed for the jitter.
    ///
    /// `None` uses a random seed.
    #[serde(default)]
    pub seed: Option<u64>,
}

impl SchedulerConfig {
    /// Creates a configuration for the window `[start_ms, end_ms)` with
    /// default resolution (1 min) and maintenance duration (5 min).
    pub fn new(start_ms: i64, end_ms: i64) -> Self {
        Self {
            start_ms,
            end_ms,
            gap_resolution_ms: default_gap_resolution_ms(),
            maintenance_duration_ms: default_maintenance_duration_ms(),
            last_maintenance_ms: None,
            temperature: 0.0,
            seed: None,
        }
    }

    /// Sets the grid step (ms).
    pub fn with_gap_resolution_ms(mut self, ms: i64) -> Self {
        self.gap_resolution_ms = ms;
        self
    }

    /// Sets the maintenance loop duration (ms).
    pub fn with_maintenance_duration_ms(mut self, ms: i64) -> Self {
        self.maintenance_duration_ms = ms;
        self
    }

    /// Sets the end of the last maintenance loop (ms).
    pub fn with_last_maintenance_ms(mut self, ms: i64) -> Self {
        self.last_maintenance_ms = Some(ms);
        self
    }

    /// Sets the jitter temperature.
    pub fn with_temperature(mut self, temperature: f64) -> Self {
        self.temperature = temperature;
        self
    }

    /// Sets the random seed for reproducibility.
    pub fn with_seed(mut self, seed: u64) -> Self {
        self.seed = Some(seed);
        self
    }

    /// The scheduling window.
    pub fn window(&self) -> TimeWindow {
        TimeWindow::new(self.start_ms, self.end_ms)
    }

    /// The time grid over the window.
    pub fn grid(&self) -> TimeGrid {
        TimeGrid::new(self.start_ms, self.end_ms, self.gap_resolution_ms)
    }

    /// End of the most recent maintenance before the window starts.
    pub fn initial_maintenance_ms(&self) -> i64 {
        self.last_maintenance_ms.unwrap_or(self.start_ms)
    }

    /// Validates the configuration.
    ///
    /// Returns `Err` with a description if any parameter is invalid.
    pub fn validate(&self) -> Result<(), String> {
        if self.start_ms >= self.end_ms {
            return Err(format!(
                "window start ({}) must be before end ({})",
                self.start_ms, self.end_ms
            ));
        }
        if self.gap_resolution_ms <= 0 {
            return Err("gap_resolution_ms must be positive".into());
        }
        if self.maintenance_duration_ms < 0 {
            return Err("maintenance_duration_ms must be non-negative".into());
        }
        if !(0.0..=1.0).contains(&self.temperature) {
            return Err(format!(
                "temperature must be in [0, 1], got {}",
                self.temperature
            ));
        }
        if let Some(last) = self.last_maintenance_ms {
            if last > self.end_ms {
                return Err("last_maintenance_ms lies after the window end".into());
            }
        }
        Ok(())
    }
}
