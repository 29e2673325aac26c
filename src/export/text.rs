//! Human-readable rendering of leaderboard data
//!
//! Shared formatters (durations, paces, dates) plus tabled terminal tables
//! for the ranked leaderboard and the monthly breakdown.

use super::ExportError;
use crate::leaderboard::{Leaderboard, LeaderboardRow, MonthlyBreakdown};
use chrono::{DateTime, Utc};
use rust_decimal::prelude::*;
use std::io::Write;
use std::path::Path;
use tabled::settings::Style;
use tabled::{Table, Tabled};

/// `HH:MM:SS`, hours not wrapped at 24
pub fn hms(total_seconds: i64) -> String {
    let total = total_seconds.max(0);
    let h = total / 3600;
    let m = (total % 3600) / 60;
    let s = total % 60;
    format!("{:02}:{:02}:{:02}", h, m, s)
}

/// Minutes per kilometre as `m:ss`; `-` when there is no pace
pub fn format_pace(min_per_km: Decimal) -> String {
    if min_per_km <= Decimal::ZERO {
        return "-".to_string();
    }

    let total_seconds = (min_per_km * Decimal::from(60))
        .round_dp_with_strategy(0, RoundingStrategy::MidpointAwayFromZero)
        .to_i64()
        .unwrap_or(0);

    format!("{}:{:02}", total_seconds / 60, total_seconds % 60)
}

/// Last run date as `DD/MM/YYYY`, `-` when unknown
pub fn format_last_run(last_run: Option<DateTime<Utc>>) -> String {
    last_run
        .map(|dt| dt.format("%d/%m/%Y").to_string())
        .unwrap_or_else(|| "-".to_string())
}

/// Medal glyph for the podium, otherwise the position number
pub fn position_label(row: &LeaderboardRow) -> String {
    match row.medal {
        Some(medal) => medal.glyph().to_string(),
        None => row.position.to_string(),
    }
}

/// Remaining time to `target_epoch`, e.g. "12d 03h 25m 09s"
pub fn countdown(now: DateTime<Utc>, target_epoch: i64) -> String {
    let remaining = target_epoch - now.timestamp();
    if remaining <= 0 {
        return "Target reached".to_string();
    }

    let days = remaining / 86_400;
    let hours = (remaining % 86_400) / 3600;
    let minutes = (remaining % 3600) / 60;
    let seconds = remaining % 60;
    format!("{}d {:02}h {:02}m {:02}s", days, hours, minutes, seconds)
}

#[derive(Tabled)]
struct LeaderboardLine {
    #[tabled(rename = "#")]
    position: String,
    #[tabled(rename = "Athlete")]
    athlete: String,
    #[tabled(rename = "Runs")]
    runs: u32,
    #[tabled(rename = "Projected")]
    projected: u32,
    #[tabled(rename = "Runs/Month")]
    per_month: String,
    #[tabled(rename = "Distance (km)")]
    distance: String,
    #[tabled(rename = "Longest (km)")]
    longest: String,
    #[tabled(rename = "Time")]
    time: String,
    #[tabled(rename = "Avg Run (min)")]
    average_run: String,
    #[tabled(rename = "Avg Pace")]
    average_pace: String,
    #[tabled(rename = "Best Pace")]
    best_pace: String,
    #[tabled(rename = "Last Run")]
    last_run: String,
}

#[derive(Tabled)]
struct MonthlyLine {
    #[tabled(rename = "#")]
    rank: usize,
    #[tabled(rename = "Athlete")]
    athlete: String,
    #[tabled(rename = "Runs")]
    runs: u32,
    #[tabled(rename = "Distance (km)")]
    distance: String,
    #[tabled(rename = "Longest (km)")]
    longest: String,
    #[tabled(rename = "Time")]
    time: String,
    #[tabled(rename = "Avg Pace")]
    average_pace: String,
    #[tabled(rename = "Best Pace")]
    best_pace: String,
    #[tabled(rename = "Last Run")]
    last_run: String,
}

/// Ranked leaderboard as a terminal table
pub fn render_leaderboard(board: &Leaderboard) -> String {
    let lines = board.ranked().into_iter().map(|row| LeaderboardLine {
        position: position_label(row),
        athlete: row.athlete_name.clone(),
        runs: row.total_runs,
        projected: row.projected_runs,
        per_month: row.avg_runs_per_month.to_string(),
        distance: row.total_distance_km.to_string(),
        longest: row.max_distance_km.to_string(),
        time: row.total_run_time_hms.clone(),
        average_run: row.average_run_time_mins.to_string(),
        average_pace: format_pace(row.average_pace_min_per_km),
        best_pace: format_pace(row.best_pace_min_per_km),
        last_run: format_last_run(row.last_run),
    });

    Table::new(lines).with(Style::rounded()).to_string()
}

/// One month's runners as a titled terminal table
pub fn render_month(month: &MonthlyBreakdown) -> String {
    let lines = month.runners.iter().enumerate().map(|(i, runner)| MonthlyLine {
        rank: i + 1,
        athlete: runner.athlete_name.clone(),
        runs: runner.runs,
        distance: runner.total_distance_km.to_string(),
        longest: runner.max_distance_km.to_string(),
        time: runner.total_run_time_hms.clone(),
        average_pace: format_pace(runner.average_pace_min_per_km),
        best_pace: format_pace(runner.best_pace_min_per_km),
        last_run: format_last_run(runner.last_run),
    });

    format!("{}\n{}", month.label, Table::new(lines).with(Style::rounded()))
}

/// Every month's table, newest first, each titled once
pub fn render_monthly(months: &[MonthlyBreakdown]) -> String {
    months
        .iter()
        .map(render_month)
        .collect::<Vec<_>>()
        .join("\n\n")
}

/// Export the leaderboard and monthly tables to a text file
pub fn export_leaderboard<P: AsRef<Path>>(
    board: &Leaderboard,
    output_path: P,
) -> Result<(), ExportError> {
    let mut file = std::fs::File::create(output_path)?;

    writeln!(file, "LEADERBOARD")?;
    writeln!(file, "{}", render_leaderboard(board))?;

    if !board.monthly.is_empty() {
        writeln!(file)?;
        writeln!(file, "MONTHLY BREAKDOWN")?;
        writeln!(file)?;
        writeln!(file, "{}", render_monthly(&board.monthly))?;
    }

    Ok(())
}
