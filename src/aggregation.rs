//! Per-athlete running statistics
//!
//! Folds an athlete's activity list into lifetime totals, campaign active
//! day/week sets, the longest inactivity gap, and a per-month breakdown.

use chrono::{DateTime, NaiveDate, Utc};
use std::collections::{BTreeMap, BTreeSet};

use crate::campaign::{month_key, week_start, CampaignWindow};
use crate::models::Activity;
use crate::projection::{DensityStats, ProjectionUnit};

/// Running totals shared by the lifetime and monthly views
#[derive(Debug, Clone, PartialEq)]
pub struct RunTotals {
    /// Total distance in meters
    pub total_distance_m: f64,

    /// Longest single run in meters
    pub max_distance_m: f64,

    /// Total moving time in seconds
    pub total_time_s: i64,

    /// Best pace in minutes per kilometre, `f64::INFINITY` if none
    pub best_pace_min_per_km: f64,

    /// Most recent run start in milliseconds, 0 if none
    pub last_run_at_ms: i64,
}

impl Default for RunTotals {
    fn default() -> Self {
        RunTotals {
            total_distance_m: 0.0,
            max_distance_m: 0.0,
            total_time_s: 0,
            best_pace_min_per_km: f64::INFINITY,
            last_run_at_ms: 0,
        }
    }
}

impl RunTotals {
    /// Fold one run into the totals
    pub fn add(&mut self, run: &Activity) {
        let distance = run.distance.max(0.0);
        self.total_distance_m += distance;
        self.max_distance_m = self.max_distance_m.max(distance);
        self.total_time_s += run.moving_seconds();

        if let Some(pace) = run.pace_min_per_km() {
            if pace < self.best_pace_min_per_km {
                self.best_pace_min_per_km = pace;
            }
        }

        if let Some(ts) = run.start_ms() {
            if ts > self.last_run_at_ms {
                self.last_run_at_ms = ts;
            }
        }
    }

    /// Best pace, or `None` when no run had both distance and time
    pub fn best_pace(&self) -> Option<f64> {
        self.best_pace_min_per_km
            .is_finite()
            .then_some(self.best_pace_min_per_km)
    }

    /// Most recent run start, if any
    pub fn last_run(&self) -> Option<DateTime<Utc>> {
        if self.last_run_at_ms > 0 {
            DateTime::from_timestamp_millis(self.last_run_at_ms)
        } else {
            None
        }
    }
}

/// One athlete's runs within a calendar month
#[derive(Debug, Clone, Default, PartialEq)]
pub struct MonthlyAggregate {
    pub totals: RunTotals,

    /// Distinct UTC days with at least one run
    pub days: BTreeSet<NaiveDate>,
}

impl MonthlyAggregate {
    /// Active run days in the month
    pub fn runs(&self) -> u32 {
        self.days.len() as u32
    }
}

/// Aggregated statistics for one athlete
#[derive(Debug, Clone, PartialEq)]
pub struct AthleteAggregate {
    /// Lifetime totals over every run
    pub totals: RunTotals,

    /// Earliest run start in milliseconds, `f64::INFINITY` if none
    pub first_run_at_ms: f64,

    /// Distinct run days inside the campaign window
    pub active_days: BTreeSet<NaiveDate>,

    /// Distinct Monday-anchored run weeks inside the campaign window
    pub active_weeks: BTreeSet<NaiveDate>,

    /// Longest inactive stretch between campaign run days
    pub longest_gap_days: Option<i64>,

    /// Lifetime runs keyed by `YYYY-MM`
    pub monthly: BTreeMap<String, MonthlyAggregate>,
}

impl AthleteAggregate {
    /// Build the aggregate from raw activities; non-runs are ignored
    pub fn from_activities(activities: &[Activity], window: &CampaignWindow) -> Self {
        let mut totals = RunTotals::default();
        let mut first_run_at_ms = f64::INFINITY;
        let mut active_days = BTreeSet::new();
        let mut active_weeks = BTreeSet::new();
        let mut monthly: BTreeMap<String, MonthlyAggregate> = BTreeMap::new();

        for run in activities.iter().filter(|a| a.is_run()) {
            totals.add(run);

            let (Some(ts), Some(day)) = (run.start_ms(), run.start_day()) else {
                continue;
            };

            first_run_at_ms = first_run_at_ms.min(ts as f64);

            let month = monthly.entry(month_key(day)).or_default();
            month.totals.add(run);
            month.days.insert(day);

            if window.contains(ts) {
                active_days.insert(day);
                active_weeks.insert(week_start(day));
            }
        }

        let longest_gap_days = longest_gap_days(&active_days);

        AthleteAggregate {
            totals,
            first_run_at_ms,
            active_days,
            active_weeks,
            longest_gap_days,
            monthly,
        }
    }

    /// Campaign run count: distinct active days
    pub fn runs(&self) -> u32 {
        self.active_days.len() as u32
    }

    /// Active days summed across every month of history
    pub fn lifetime_active_days(&self) -> u32 {
        self.monthly.values().map(MonthlyAggregate::runs).sum()
    }

    /// Mean active days per month with any run, 0 without history
    pub fn avg_runs_per_month(&self) -> f64 {
        if self.monthly.is_empty() {
            0.0
        } else {
            f64::from(self.lifetime_active_days()) / self.monthly.len() as f64
        }
    }

    /// Projection input for this athlete at the given granularity
    pub fn density_stats(
        &self,
        unit: ProjectionUnit,
        explicit_start_epoch: Option<i64>,
        target_epoch: i64,
        now_epoch: Option<i64>,
    ) -> DensityStats {
        let (active_units, longest_gap_days) = match unit {
            ProjectionUnit::Day => (self.active_days.len() as u32, self.longest_gap_days),
            ProjectionUnit::Week => (self.active_weeks.len() as u32, None),
        };

        DensityStats {
            runs: self.runs(),
            active_units,
            first_activity_at_ms: self.first_run_at_ms,
            explicit_start_epoch,
            target_epoch,
            now_epoch,
            longest_gap_days,
        }
    }
}

/// Longest run of inactive days between consecutive active days.
///
/// `None` without active days; 0 for a single day or back-to-back days.
pub fn longest_gap_days(days: &BTreeSet<NaiveDate>) -> Option<i64> {
    if days.is_empty() {
        return None;
    }

    let longest = days
        .iter()
        .zip(days.iter().skip(1))
        .map(|(prev, next)| (*next - *prev).num_days() - 1)
        .max()
        .unwrap_or(0);

    Some(longest.max(0))
}
