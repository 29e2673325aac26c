//! Run-count projection model
//!
//! Forecasts how many active run days (or runs) an athlete will have logged by
//! a target date, by extrapolating their observed activity density forward.
//! The daily variant additionally discounts the forecast by a consistency
//! factor derived from the athlete's longest inactivity gap.

use chrono::Utc;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Seconds in one UTC calendar day
pub const SECONDS_PER_DAY: i64 = 86_400;

/// Seconds in one week
pub const SECONDS_PER_WEEK: i64 = 604_800;

/// Lowest consistency factor any gap can produce
pub const CONSISTENCY_FLOOR: f64 = 0.3;

/// Gap length (days) at which the consistency factor reaches one half
const GAP_HALVING_DAYS: f64 = 7.0;

/// Time unit used to measure activity density
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProjectionUnit {
    /// Active calendar days, with the inactivity-gap penalty
    #[default]
    Day,
    /// Active Monday-anchored weeks, no gap penalty
    Week,
}

impl ProjectionUnit {
    /// Length of one unit in seconds
    pub fn seconds(&self) -> i64 {
        match self {
            ProjectionUnit::Day => SECONDS_PER_DAY,
            ProjectionUnit::Week => SECONDS_PER_WEEK,
        }
    }

    /// Whether the longest-gap consistency penalty is applied.
    ///
    /// Weekly density already smooths over short daily gaps, so only the
    /// daily variant is penalized.
    pub fn applies_gap_penalty(&self) -> bool {
        matches!(self, ProjectionUnit::Day)
    }
}

impl fmt::Display for ProjectionUnit {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ProjectionUnit::Day => write!(f, "days"),
            ProjectionUnit::Week => write!(f, "weeks"),
        }
    }
}

impl FromStr for ProjectionUnit {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "day" | "days" | "daily" => Ok(ProjectionUnit::Day),
            "week" | "weeks" | "weekly" => Ok(ProjectionUnit::Week),
            _ => Err(format!("Invalid projection unit: {}", s)),
        }
    }
}

/// Aggregate activity-density statistics for one athlete
#[derive(Debug, Clone, PartialEq)]
pub struct DensityStats {
    /// Qualifying units already observed (active days or raw runs)
    pub runs: u32,

    /// Distinct active days or weeks, depending on the projection unit
    pub active_units: u32,

    /// Earliest qualifying activity in milliseconds since epoch, `f64::INFINITY` if none
    pub first_activity_at_ms: f64,

    /// Explicit measurement start in epoch seconds; overrides the first activity
    pub explicit_start_epoch: Option<i64>,

    /// Date being projected to, in epoch seconds
    pub target_epoch: i64,

    /// Injectable "now" in epoch seconds; the wall clock is read when absent
    pub now_epoch: Option<i64>,

    /// Longest run of consecutive inactive days between active days
    pub longest_gap_days: Option<i64>,
}

impl DensityStats {
    /// Stats with no observed activity, projecting to `target_epoch`
    pub fn new(target_epoch: i64) -> Self {
        DensityStats {
            runs: 0,
            active_units: 0,
            first_activity_at_ms: f64::INFINITY,
            explicit_start_epoch: None,
            target_epoch,
            now_epoch: None,
            longest_gap_days: None,
        }
    }

    /// Resolve the density-measurement start in epoch seconds.
    ///
    /// An explicit start wins over the first activity, even when it is not
    /// usable. A resolved start of exactly 0 means no start.
    pub fn start_epoch(&self) -> Option<i64> {
        let resolved = match self.explicit_start_epoch {
            Some(epoch) => Some(epoch),
            None => {
                let ms = self.first_activity_at_ms;
                (ms.is_finite() && ms > 0.0).then(|| (ms / 1000.0).floor() as i64)
            }
        };

        resolved.filter(|&epoch| epoch != 0)
    }
}

/// Consistency factor in `[0.3, 1.0]` for a longest inactivity gap.
///
/// Inverse decay: no gap gives 1.0, a 7-day gap halves the projection.
pub fn consistency_factor(longest_gap_days: i64) -> f64 {
    let gap = longest_gap_days.max(0) as f64;
    (1.0 / (1.0 + gap / GAP_HALVING_DAYS)).max(CONSISTENCY_FLOOR)
}

/// Project the cumulative count by the target date using `unit` density.
///
/// Never returns less than `stats.runs`. Without a usable start, or with a
/// target at or before the start, the observed count is returned unchanged.
pub fn project(stats: &DensityStats, unit: ProjectionUnit) -> u32 {
    if stats.runs == 0 {
        return 0;
    }

    let start = match stats.start_epoch() {
        Some(start) if stats.target_epoch > start => start,
        _ => return stats.runs,
    };

    let now = stats.now_epoch.unwrap_or_else(|| Utc::now().timestamp());
    let unit_seconds = unit.seconds();

    let units_elapsed = (now - start).div_euclid(unit_seconds).max(1);
    let units_total = (stats.target_epoch - start)
        .div_euclid(unit_seconds)
        .max(units_elapsed);

    let safe_active = f64::from(stats.active_units.max(1));
    let active_rate = safe_active / units_elapsed as f64;
    let projected_active = (active_rate * units_total as f64).round();

    let runs_per_active = f64::from(stats.runs) / safe_active;
    let mut projected = projected_active * runs_per_active;

    if unit.applies_gap_penalty() {
        projected *= consistency_factor(stats.longest_gap_days.unwrap_or(0));
    }

    // `as` saturates, so absurd horizons clamp to u32::MAX
    (projected.round() as u32).max(stats.runs)
}

/// Daily-density projection with the inactivity-gap penalty
pub fn project_by_active_days(stats: &DensityStats) -> u32 {
    project(stats, ProjectionUnit::Day)
}

/// Weekly-density projection, no gap penalty
pub fn project_by_active_weeks(stats: &DensityStats) -> u32 {
    project(stats, ProjectionUnit::Week)
}
