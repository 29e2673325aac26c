//! Club leaderboard assembly
//!
//! Turns per-athlete activity lists into ranked leaderboard rows, each with a
//! run-count projection, plus a month-by-month breakdown.

use chrono::{DateTime, Utc};
use rayon::prelude::*;
use rust_decimal::prelude::*;
use rust_decimal::{Decimal, RoundingStrategy};
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::collections::BTreeSet;
use std::fmt;

use crate::aggregation::{AthleteAggregate, RunTotals};
use crate::campaign::{current_month_key, month_label, CampaignWindow};
use crate::export::text::hms;
use crate::models::{Activity, AthleteRecord};
use crate::projection::{self, ProjectionUnit};

/// Podium medal for the top three positions
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Medal {
    Gold,
    Silver,
    Bronze,
}

impl Medal {
    /// Medal for a 1-based position
    pub fn for_position(position: usize) -> Option<Self> {
        match position {
            1 => Some(Medal::Gold),
            2 => Some(Medal::Silver),
            3 => Some(Medal::Bronze),
            _ => None,
        }
    }

    pub fn glyph(&self) -> &'static str {
        match self {
            Medal::Gold => "🥇",
            Medal::Silver => "🥈",
            Medal::Bronze => "🥉",
        }
    }
}

impl fmt::Display for Medal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Medal::Gold => write!(f, "gold"),
            Medal::Silver => write!(f, "silver"),
            Medal::Bronze => write!(f, "bronze"),
        }
    }
}

/// One athlete's leaderboard entry
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LeaderboardRow {
    pub athlete_id: i64,
    pub athlete_name: String,

    /// Avatar URL
    pub profile: Option<String>,

    /// 1-based rank
    pub position: usize,
    pub medal: Option<Medal>,

    /// Active run days inside the campaign window
    pub total_runs: u32,

    /// Projected active run days by the target date
    pub projected_runs: u32,

    /// Mean active run days per month over the athlete's history
    pub avg_runs_per_month: Decimal,

    pub total_distance_km: Decimal,
    pub max_distance_km: Decimal,
    pub total_run_time_hms: String,
    pub average_run_time_mins: Decimal,
    pub average_pace_min_per_km: Decimal,

    /// 0 when no run had both distance and time
    pub best_pace_min_per_km: Decimal,

    pub last_run: Option<DateTime<Utc>>,
}

/// One athlete's runs within a month
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MonthlyRunner {
    pub athlete_id: i64,
    pub athlete_name: String,
    pub profile: Option<String>,

    /// Active run days in the month
    pub runs: u32,

    pub total_distance_km: Decimal,
    pub max_distance_km: Decimal,
    pub total_run_time_hms: String,
    pub average_run_time_mins: Decimal,
    pub average_pace_min_per_km: Decimal,
    pub best_pace_min_per_km: Decimal,
    pub last_run: Option<DateTime<Utc>>,
}

/// Ranked runners for one calendar month
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MonthlyBreakdown {
    /// `YYYY-MM`
    pub month: String,

    /// e.g. "March 2026"
    pub label: String,

    pub runners: Vec<MonthlyRunner>,
}

/// Complete leaderboard output
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Leaderboard {
    pub leaderboard: Vec<LeaderboardRow>,

    /// Newest month first
    pub monthly: Vec<MonthlyBreakdown>,
}

impl Leaderboard {
    /// Rows ordered by position
    pub fn ranked(&self) -> Vec<&LeaderboardRow> {
        let mut rows: Vec<&LeaderboardRow> = self.leaderboard.iter().collect();
        rows.sort_by_key(|row| row.position);
        rows
    }
}

/// An athlete together with the activities fetched for them
#[derive(Debug, Clone)]
pub struct AthleteActivities {
    pub athlete: AthleteRecord,
    pub activities: Vec<Activity>,
}

/// Inputs that shape the leaderboard
#[derive(Debug, Clone)]
pub struct LeaderboardOptions {
    /// Runs counted towards `total_runs`
    pub window: CampaignWindow,

    /// Projection granularity
    pub unit: ProjectionUnit,

    /// Projection target in epoch seconds
    pub target_epoch: i64,

    /// Earliest `YYYY-MM` month shown in the monthly breakdown
    pub monthly_floor: String,

    /// Reference time for projections and the monthly cut-off
    pub now: DateTime<Utc>,
}

/// Build the leaderboard and monthly breakdown
pub fn build_leaderboard(entries: &[AthleteActivities], options: &LeaderboardOptions) -> Leaderboard {
    if entries.is_empty() {
        return Leaderboard::default();
    }

    let aggregates: Vec<AthleteAggregate> = entries
        .par_iter()
        .map(|entry| AthleteAggregate::from_activities(&entry.activities, &options.window))
        .collect();

    let mut rows: Vec<LeaderboardRow> = entries
        .iter()
        .zip(&aggregates)
        .map(|(entry, agg)| build_row(&entry.athlete, agg, options))
        .collect();

    assign_positions(&mut rows);

    let monthly = build_monthly(entries, &aggregates, options);

    tracing::debug!(
        athletes = rows.len(),
        months = monthly.len(),
        "Leaderboard built"
    );

    Leaderboard {
        leaderboard: rows,
        monthly,
    }
}

fn build_row(athlete: &AthleteRecord, agg: &AthleteAggregate, options: &LeaderboardOptions) -> LeaderboardRow {
    let totals = &agg.totals;
    let total_km = totals.total_distance_m / 1000.0;
    let total_min = totals.total_time_s as f64 / 60.0;
    let active_days = agg.lifetime_active_days();

    let average_run_time = if active_days > 0 {
        total_min / f64::from(active_days)
    } else {
        0.0
    };
    let average_pace = if total_km > 0.0 { total_min / total_km } else { 0.0 };

    let stats = agg.density_stats(
        options.unit,
        options.window.after,
        options.target_epoch,
        Some(options.now.timestamp()),
    );

    LeaderboardRow {
        athlete_id: athlete.athlete_id,
        athlete_name: athlete.display_name(),
        profile: athlete.profile.clone(),
        position: 0,
        medal: None,
        total_runs: agg.runs(),
        projected_runs: projection::project(&stats, options.unit),
        avg_runs_per_month: rounded(agg.avg_runs_per_month(), 1),
        total_distance_km: rounded(total_km, 2),
        max_distance_km: rounded(totals.max_distance_m / 1000.0, 2),
        total_run_time_hms: hms(totals.total_time_s),
        average_run_time_mins: rounded(average_run_time, 2),
        average_pace_min_per_km: rounded(average_pace, 2),
        best_pace_min_per_km: rounded(totals.best_pace().unwrap_or(0.0), 2),
        last_run: totals.last_run(),
    }
}

/// Rank by runs, then distance, both descending; row order is left unchanged
pub fn assign_positions(rows: &mut [LeaderboardRow]) {
    let mut order: Vec<usize> = (0..rows.len()).collect();
    order.sort_by(|&a, &b| compare_rank(rows[a].total_runs, rows[a].total_distance_km, rows[b].total_runs, rows[b].total_distance_km));

    for (rank, index) in order.into_iter().enumerate() {
        let position = rank + 1;
        rows[index].position = position;
        rows[index].medal = Medal::for_position(position);
    }
}

fn compare_rank(runs_a: u32, km_a: Decimal, runs_b: u32, km_b: Decimal) -> Ordering {
    runs_b.cmp(&runs_a).then(km_b.cmp(&km_a))
}

fn build_monthly(
    entries: &[AthleteActivities],
    aggregates: &[AthleteAggregate],
    options: &LeaderboardOptions,
) -> Vec<MonthlyBreakdown> {
    let current = current_month_key(options.now);

    let months: BTreeSet<&String> = aggregates
        .iter()
        .flat_map(|agg| agg.monthly.keys())
        .filter(|key| key.as_str() >= options.monthly_floor.as_str() && key.as_str() <= current.as_str())
        .collect();

    months
        .into_iter()
        .rev()
        .map(|month| {
            let mut runners: Vec<MonthlyRunner> = entries
                .iter()
                .zip(aggregates)
                .filter_map(|(entry, agg)| {
                    let month_agg = agg.monthly.get(month)?;
                    if month_agg.runs() == 0 {
                        return None;
                    }
                    Some(monthly_runner(&entry.athlete, month_agg.runs(), &month_agg.totals))
                })
                .collect();

            runners.sort_by(|a, b| compare_rank(a.runs, a.total_distance_km, b.runs, b.total_distance_km));

            MonthlyBreakdown {
                month: month.clone(),
                label: month_label(month),
                runners,
            }
        })
        .collect()
}

fn monthly_runner(athlete: &AthleteRecord, runs: u32, totals: &RunTotals) -> MonthlyRunner {
    let total_km = totals.total_distance_m / 1000.0;
    let total_min = totals.total_time_s as f64 / 60.0;

    MonthlyRunner {
        athlete_id: athlete.athlete_id,
        athlete_name: athlete.display_name(),
        profile: athlete.profile.clone(),
        runs,
        total_distance_km: rounded(total_km, 2),
        max_distance_km: rounded(totals.max_distance_m / 1000.0, 2),
        total_run_time_hms: hms(totals.total_time_s),
        average_run_time_mins: rounded(if runs > 0 { total_min / f64::from(runs) } else { 0.0 }, 2),
        average_pace_min_per_km: rounded(if total_km > 0.0 { total_min / total_km } else { 0.0 }, 2),
        best_pace_min_per_km: rounded(totals.best_pace().unwrap_or(0.0), 2),
        last_run: totals.last_run(),
    }
}

/// Round half away from zero to `dp` places; non-finite values become 0
fn rounded(value: f64, dp: u32) -> Decimal {
    Decimal::from_f64(value)
        .unwrap_or(Decimal::ZERO)
        .round_dp_with_strategy(dp, RoundingStrategy::MidpointAwayFromZero)
}
