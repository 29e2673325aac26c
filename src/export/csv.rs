use super::text::{format_last_run, format_pace};
use super::ExportError;
use crate::leaderboard::{LeaderboardRow, MonthlyBreakdown};
use csv::Writer;
use std::fs::File;
use std::io::Write;
use std::path::Path;

const LEADERBOARD_HEADER: [&str; 15] = [
    "position",
    "medal",
    "athlete_id",
    "athlete_name",
    "total_runs",
    "projected_runs",
    "avg_runs_per_month",
    "total_distance_km",
    "max_distance_km",
    "total_run_time",
    "average_run_time_mins",
    "average_pace",
    "best_pace",
    "last_run",
    "profile",
];

/// Export leaderboard rows to CSV, ordered by position
pub fn export_leaderboard_rows<P: AsRef<Path>>(
    rows: &[LeaderboardRow],
    output_path: P,
) -> Result<(), ExportError> {
    let file = File::create(output_path)?;
    write_leaderboard_rows(rows, file)
}

/// Write leaderboard rows as CSV to any writer
pub fn write_leaderboard_rows<W: Write>(rows: &[LeaderboardRow], out: W) -> Result<(), ExportError> {
    let mut writer = Writer::from_writer(out);
    writer.write_record(LEADERBOARD_HEADER)?;

    let mut ranked: Vec<&LeaderboardRow> = rows.iter().collect();
    ranked.sort_by_key(|row| row.position);

    for row in ranked {
        writer.write_record(&[
            row.position.to_string(),
            row.medal.map_or(String::new(), |m| m.to_string()),
            row.athlete_id.to_string(),
            row.athlete_name.clone(),
            row.total_runs.to_string(),
            row.projected_runs.to_string(),
            row.avg_runs_per_month.to_string(),
            row.total_distance_km.to_string(),
            row.max_distance_km.to_string(),
            row.total_run_time_hms.clone(),
            row.average_run_time_mins.to_string(),
            format_pace(row.average_pace_min_per_km),
            format_pace(row.best_pace_min_per_km),
            format_last_run(row.last_run),
            row.profile.clone().unwrap_or_default(),
        ])?;
    }

    writer.flush()?;
    Ok(())
}

/// Export the monthly breakdown to CSV, one line per month and runner
pub fn export_monthly<P: AsRef<Path>>(
    months: &[MonthlyBreakdown],
    output_path: P,
) -> Result<(), ExportError> {
    let file = File::create(output_path)?;
    let mut writer = Writer::from_writer(file);

    writer.write_record([
        "month",
        "athlete_id",
        "athlete_name",
        "runs",
        "total_distance_km",
        "max_distance_km",
        "total_run_time",
        "average_run_time_mins",
        "average_pace",
        "best_pace",
        "last_run",
    ])?;

    for month in months {
        for runner in &month.runners {
            writer.write_record(&[
                month.month.clone(),
                runner.athlete_id.to_string(),
                runner.athlete_name.clone(),
                runner.runs.to_string(),
                runner.total_distance_km.to_string(),
                runner.max_distance_km.to_string(),
                runner.total_run_time_hms.clone(),
                runner.average_run_time_mins.to_string(),
                format_pace(runner.average_pace_min_per_km),
                format_pace(runner.best_pace_min_per_km),
                format_last_run(runner.last_run),
            ])?;
        }
    }

    writer.flush()?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::leaderboard::{Medal, MonthlyRunner};
    use chrono::{TimeZone, Utc};
    use rust_decimal_macros::dec;
    use tempfile::NamedTempFile;

    fn row(id: i64, position: usize, name: &str) -> LeaderboardRow {
        LeaderboardRow {
            athlete_id: id,
            athlete_name: name.to_string(),
            profile: None,
            position,
            medal: Medal::for_position(position),
            total_runs: 10,
            projected_runs: 100,
            avg_runs_per_month: dec!(5.0),
            total_distance_km: dec!(50.00),
            max_distance_km: dec!(10.00),
            total_run_time_hms: "04:10:00".to_string(),
            average_run_time_mins: dec!(25.00),
            average_pace_min_per_km: dec!(5.00),
            best_pace_min_per_km: dec!(4.50),
            last_run: Some(Utc.with_ymd_and_hms(2025, 11, 3, 7, 0, 0).unwrap()),
        }
    }

    #[test]
    fn test_export_leaderboard_rows() {
        let rows = vec![row(2, 2, "Bob"), row(1, 1, "Smith, Ann")];

        let temp_file = NamedTempFile::new().unwrap();
        export_leaderboard_rows(&rows, temp_file.path()).unwrap();

        let content = std::fs::read_to_string(temp_file.path()).unwrap();
        let lines: Vec<&str> = content.lines().collect();

        assert_eq!(lines.len(), 3);
        assert!(lines[0].starts_with("position,medal,athlete_id"));
        assert!(lines[1].starts_with("1,gold,1,\"Smith, Ann\",10,100"));
        assert!(lines[1].contains(",5:00,4:30,03/11/2025,"));
        assert!(lines[2].starts_with("2,silver,2,Bob"));
    }

    #[test]
    fn test_export_monthly() {
        let months = vec![MonthlyBreakdown {
            month: "2025-11".to_string(),
            label: "November 2025".to_string(),
            runners: vec![MonthlyRunner {
                athlete_id: 1,
                athlete_name: "Ann".to_string(),
                profile: None,
                runs: 4,
                total_distance_km: dec!(20.00),
                max_distance_km: dec!(8.00),
                total_run_time_hms: "01:40:00".to_string(),
                average_run_time_mins: dec!(25.00),
                average_pace_min_per_km: dec!(5.00),
                best_pace_min_per_km: dec!(0),
                last_run: None,
            }],
        }];

        let temp_file = NamedTempFile::new().unwrap();
        export_monthly(&months, temp_file.path()).unwrap();

        let content = std::fs::read_to_string(temp_file.path()).unwrap();
        assert!(content.contains("2025-11,1,Ann,4,20.00,8.00,01:40:00,25.00,5:00,-,-"));
    }
}
