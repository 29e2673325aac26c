use anyhow::{bail, Context, Result};
use chrono::{DateTime, Utc};
use clap::{Parser, Subcommand};
use colored::*;
use std::io::{self, BufRead, Write};
use std::path::{Path, PathBuf};

use runboard::auth::{self, RefreshOptions, RefreshOutcome};
use runboard::campaign::{parse_date_to_epoch, parse_target_to_epoch, CampaignWindow};
use runboard::config::AppConfig;
use runboard::database::Database;
use runboard::export::{self, text, ExportFormat};
use runboard::leaderboard::{build_leaderboard, LeaderboardOptions};
use runboard::logging::{init_logging, LogLevel};
use runboard::projection::{project, DensityStats, ProjectionUnit};
use runboard::session::SessionSigner;
use runboard::strava::DEFAULT_SCOPE;
use runboard::sync::{collect_activities, FetchOptions};
use runboard::RunBoardError;

/// RunBoard - Club Running Leaderboard CLI
///
/// Ranks the members of a Strava club by how many days they ran during the
/// campaign and projects where each runner will finish by the target date.
#[derive(Parser)]
#[command(name = "runboard")]
#[command(author = "RunBoard Contributors")]
#[command(version = "0.1.0")]
#[command(about = "Club running leaderboard CLI", long_about = None)]
struct Cli {
    /// Sets a custom config file
    #[arg(short, long, value_name = "FILE", global = true)]
    config: Option<PathBuf>,

    /// Increase verbosity of output
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Connect a Strava account
    Login {
        /// Authorization code, or the full redirect URL containing it
        #[arg(long)]
        code: Option<String>,
    },

    /// Forget the stored session
    Logout,

    /// Show the club leaderboard
    Leaderboard {
        /// Count runs from this date (YYYY-MM-DD or DD-MM-YYYY)
        #[arg(long)]
        after: Option<String>,

        /// Count runs before this date
        #[arg(long)]
        before: Option<String>,

        /// Projection target date or RFC 3339 timestamp
        #[arg(long)]
        target: Option<String>,

        /// Projection granularity (days, weeks)
        #[arg(long)]
        unit: Option<ProjectionUnit>,

        /// Also print the monthly breakdown
        #[arg(short, long)]
        monthly: bool,

        /// Write the leaderboard to this file
        #[arg(short, long, value_name = "FILE")]
        export: Option<PathBuf>,

        /// Export format (json, csv, text); inferred from the file name when omitted
        #[arg(short = 'f', long)]
        format: Option<ExportFormat>,
    },

    /// Project a run count from explicit numbers
    Project {
        /// Qualifying runs so far
        #[arg(long)]
        runs: u32,

        /// Distinct active days or weeks
        #[arg(long)]
        active: u32,

        /// Date of the first run
        #[arg(long)]
        first_run: Option<String>,

        /// Explicit measurement start date
        #[arg(long)]
        start: Option<String>,

        /// Projection target date; the configured target when omitted
        #[arg(long)]
        target: Option<String>,

        /// Evaluate as of this date instead of now
        #[arg(long)]
        now: Option<String>,

        /// Longest gap between active days
        #[arg(long)]
        gap: Option<i64>,

        /// Projection granularity (days, weeks)
        #[arg(long, default_value = "days")]
        unit: ProjectionUnit,
    },

    /// Refresh stored Strava tokens that are about to expire
    RefreshTokens {
        /// Only this athlete
        #[arg(long)]
        athlete_id: Option<i64>,

        /// Refresh regardless of expiry
        #[arg(long)]
        force: bool,

        /// Refresh tokens expiring within this many milliseconds
        #[arg(long)]
        buffer_ms: Option<i64>,

        /// Print the report as JSON
        #[arg(long)]
        json: bool,
    },

    /// List stored athletes
    Athletes {
        /// Delete this athlete and their tokens
        #[arg(long, value_name = "ATHLETE_ID")]
        remove: Option<i64>,
    },

    /// List the Strava clubs of the logged-in athlete
    Clubs,

    /// Manage configuration
    Config {
        /// Write a default configuration file
        #[arg(long)]
        init: bool,

        /// Print the effective configuration
        #[arg(long)]
        show: bool,
    },
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    if let Err(err) = run(cli).await {
        match err.downcast_ref::<RunBoardError>() {
            Some(e) => {
                e.log();
                eprintln!("{} {}", "✗".red().bold(), e.user_message().red());
            }
            None => eprintln!("{} {:#}", "✗".red().bold(), err),
        }
        std::process::exit(1);
    }
}

async fn run(cli: Cli) -> Result<()> {
    dotenvy::dotenv().ok();

    let config = AppConfig::load(cli.config.as_deref())?;

    let mut log_config = config.logging.clone();
    log_config.level = LogLevel::from_verbosity(log_config.level, cli.verbose);
    init_logging(&log_config)?;

    match cli.command {
        Commands::Login { code } => login(&config, code).await,
        Commands::Logout => logout(&config),
        Commands::Leaderboard {
            after,
            before,
            target,
            unit,
            monthly,
            export,
            format,
        } => {
            let args = LeaderboardArgs {
                after,
                before,
                target,
                unit,
                monthly,
                export,
                format,
            };
            leaderboard(&config, args).await
        }
        Commands::Project {
            runs,
            active,
            first_run,
            start,
            target,
            now,
            gap,
            unit,
        } => {
            let mut stats = DensityStats::new(match target {
                Some(t) => parse_target_to_epoch(Some(t.as_str()), config.target_epoch()),
                None => config.target_epoch(),
            });
            stats.runs = runs;
            stats.active_units = active;
            stats.first_activity_at_ms = match first_run {
                Some(d) => parse_date_arg(&d, "--first-run")? as f64 * 1000.0,
                None => f64::INFINITY,
            };
            stats.explicit_start_epoch = start
                .map(|d| parse_date_arg(&d, "--start"))
                .transpose()?;
            stats.now_epoch = now.map(|d| parse_date_arg(&d, "--now")).transpose()?;
            stats.longest_gap_days = gap;

            println!("{}", project(&stats, unit).to_string().green().bold());
            Ok(())
        }
        Commands::RefreshTokens {
            athlete_id,
            force,
            buffer_ms,
            json,
        } => {
            let options = RefreshOptions {
                athlete_id,
                force,
                buffer_ms: buffer_ms.unwrap_or(config.campaign.refresh_buffer_ms),
            };
            refresh_tokens(&config, &options, json).await
        }
        Commands::Athletes { remove: Some(id) } => remove_athlete(&config, id),
        Commands::Athletes { remove: None } => athletes(&config),
        Commands::Clubs => clubs(&config).await,
        Commands::Config { init, show } => manage_config(&config, cli.config.as_deref(), init, show),
    }
}

struct LeaderboardArgs {
    after: Option<String>,
    before: Option<String>,
    target: Option<String>,
    unit: Option<ProjectionUnit>,
    monthly: bool,
    export: Option<PathBuf>,
    format: Option<ExportFormat>,
}

fn parse_date_arg(value: &str, flag: &str) -> Result<i64> {
    match parse_date_to_epoch(value) {
        Some(epoch) => Ok(epoch),
        None => bail!("{} expects YYYY-MM-DD or DD-MM-YYYY, got {:?}", flag, value),
    }
}

fn signer(config: &AppConfig) -> Result<SessionSigner> {
    let signer = SessionSigner::new(config.session_secret(), config.session_max_age_secs())
        .map_err(RunBoardError::from)?;
    Ok(signer)
}

fn open_database(config: &AppConfig) -> Result<Database> {
    let path = config.database_path();
    Database::new(&path).with_context(|| format!("Failed to open database {}", path.display()))
}

/// Accept either a bare code or a redirect URL carrying `?code=`
fn extract_code(input: &str) -> Result<String> {
    let input = input.trim();
    if !input.contains("://") {
        return Ok(input.to_string());
    }

    let url = url::Url::parse(input).context("Invalid redirect URL")?;
    if let Some((_, error)) = url.query_pairs().find(|(k, _)| k == "error") {
        bail!("Strava denied access: {}", error);
    }
    match url.query_pairs().find(|(k, _)| k == "code") {
        Some((_, code)) => Ok(code.into_owned()),
        None => bail!("Redirect URL has no code parameter"),
    }
}

async fn login(config: &AppConfig, code: Option<String>) -> Result<()> {
    config.require_valid()?;
    let client = config.strava_client().map_err(RunBoardError::from)?;
    let signer = signer(config)?;

    let code = match code {
        Some(code) => code,
        None => {
            let url = client
                .authorize_url(DEFAULT_SCOPE)
                .map_err(RunBoardError::from)?;
            println!("{}", "Open this URL to connect your Strava account:".cyan().bold());
            println!("  {}", url);
            print!("Paste the code or redirect URL: ");
            io::stdout().flush()?;

            let mut line = String::new();
            io::stdin().lock().read_line(&mut line)?;
            line
        }
    };
    let code = extract_code(&code)?;

    let db = open_database(config)?;
    let outcome = auth::complete_login(
        &db,
        &client,
        &signer,
        &code,
        config.strava.club_id,
        Utc::now(),
    )
    .await?;

    config
        .session_store()
        .save(&outcome.session_token)
        .map_err(RunBoardError::from)?;

    println!(
        "{} Logged in as {}",
        "✓".green(),
        outcome.athlete.display_name().bold()
    );
    Ok(())
}

fn logout(config: &AppConfig) -> Result<()> {
    let removed = config
        .session_store()
        .clear()
        .map_err(RunBoardError::from)?;

    if removed {
        println!("{} Logged out", "✓".green());
    } else {
        println!("{}", "No active session".dimmed());
    }
    Ok(())
}

async fn leaderboard(config: &AppConfig, args: LeaderboardArgs) -> Result<()> {
    config.require_valid()?;
    let now = Utc::now();
    let client = config.strava_client().map_err(RunBoardError::from)?;
    let signer = signer(config)?;
    let db = open_database(config)?;

    let session = config.session_store().load().map_err(RunBoardError::from)?;
    let caller = auth::authorize_request(
        &db,
        &client,
        &signer,
        session.as_deref(),
        config.strava.club_id,
        now,
    )
    .await?;
    tracing::info!(athlete_id = caller.athlete.athlete_id, "Leaderboard requested");

    let after = args.after.map(|d| parse_date_arg(&d, "--after")).transpose()?;
    let before = args.before.map(|d| parse_date_arg(&d, "--before")).transpose()?;
    let target_epoch = match args.target {
        Some(t) => parse_target_to_epoch(Some(t.as_str()), config.target_epoch()),
        None => config.target_epoch(),
    };

    let entries = collect_activities(
        &db,
        &client,
        FetchOptions {
            before,
            per_page: config.strava.per_page,
        },
        now,
    )
    .await?;

    let options = LeaderboardOptions {
        window: CampaignWindow::resolve(after, before, config.campaign_start_epoch()),
        unit: args.unit.unwrap_or(config.campaign.projection),
        target_epoch,
        monthly_floor: config.campaign.monthly_floor.clone(),
        now,
    };
    let board = build_leaderboard(&entries, &options);

    println!("{}", "Club Leaderboard".cyan().bold());
    println!(
        "{} {}",
        "Countdown:".dimmed(),
        text::countdown(now, target_epoch).yellow()
    );
    if board.leaderboard.is_empty() {
        println!("{}", "No runners yet".dimmed());
    } else {
        println!("{}", text::render_leaderboard(&board));
    }

    if args.monthly && !board.monthly.is_empty() {
        println!("{}", "Monthly Breakdown".magenta().bold());
        println!("{}", text::render_monthly(&board.monthly));
    }

    if let Some(path) = args.export {
        let format = resolve_format(args.format, &path);
        export::export_leaderboard(&board, format, &path).map_err(RunBoardError::from)?;
        println!("{} Exported to {}", "✓".green(), path.display());

        // JSON and text already carry the months
        if args.monthly && format == ExportFormat::Csv {
            let monthly_path = monthly_csv_path(&path);
            export::csv::export_monthly(&board.monthly, &monthly_path)
                .map_err(RunBoardError::from)?;
            println!("{} Exported to {}", "✓".green(), monthly_path.display());
        }
    }

    Ok(())
}

fn resolve_format(format: Option<ExportFormat>, path: &Path) -> ExportFormat {
    format
        .or_else(|| ExportFormat::from_path(path))
        .unwrap_or(ExportFormat::Json)
}

fn monthly_csv_path(path: &Path) -> PathBuf {
    let stem = path
        .file_stem()
        .and_then(|s| s.to_str())
        .unwrap_or("leaderboard");
    path.with_file_name(format!("{}_monthly.csv", stem))
}

async fn refresh_tokens(config: &AppConfig, options: &RefreshOptions, json: bool) -> Result<()> {
    config.require_valid()?;
    let client = config.strava_client().map_err(RunBoardError::from)?;
    let db = open_database(config)?;

    let report = auth::refresh_expiring(&db, &client, options, Utc::now()).await?;

    if json {
        println!("{}", serde_json::to_string_pretty(&report)?);
        return Ok(());
    }

    println!(
        "{} {} of {} athletes due (buffer {} ms{})",
        "Token refresh:".blue().bold(),
        report.candidates,
        report.total_athletes,
        report.buffer_ms,
        if report.force { ", forced" } else { "" }
    );
    for result in &report.results {
        let line = match &result.outcome {
            RefreshOutcome::Refreshed { expires_at } => format!(
                "refreshed, expires {}",
                expires_at.map_or("-".to_string(), |t| t.to_rfc3339())
            )
            .green(),
            RefreshOutcome::Skipped { reason } => format!("skipped: {}", reason).dimmed(),
            RefreshOutcome::Failed { message, retryable: true } => {
                format!("failed: {} (retry later)", message).red()
            }
            RefreshOutcome::Failed { message, .. } => format!("failed: {}", message).red(),
        };
        println!("  {:>12}  {}", result.athlete_id, line);
    }
    println!(
        "{} refreshed, {} skipped, {} failed",
        report.refreshed(),
        report.skipped(),
        report.failed()
    );

    Ok(())
}

fn athletes(config: &AppConfig) -> Result<()> {
    let db = open_database(config)?;
    let athletes = db.list_athletes().map_err(RunBoardError::from)?;

    if athletes.is_empty() {
        println!("{}", "No athletes stored".dimmed());
        return Ok(());
    }

    let now = Utc::now();
    for athlete in &athletes {
        let token = match athlete.expires_at {
            Some(t) if t > now => format!("token until {}", format_time(t)).green(),
            Some(t) => format!("token expired {}", format_time(t)).yellow(),
            None => "no token".red(),
        };
        println!(
            "  {:>12}  {:<30} {}",
            athlete.athlete_id,
            athlete.display_name(),
            token
        );
    }
    println!("{} athletes", athletes.len());
    Ok(())
}

fn remove_athlete(config: &AppConfig, athlete_id: i64) -> Result<()> {
    let db = open_database(config)?;

    if db.remove_athlete(athlete_id).map_err(RunBoardError::from)? {
        println!("{} Removed athlete {}", "✓".green(), athlete_id);
    } else {
        println!("{}", format!("No athlete {}", athlete_id).dimmed());
    }
    Ok(())
}

async fn clubs(config: &AppConfig) -> Result<()> {
    config.require_valid()?;
    let client = config.strava_client().map_err(RunBoardError::from)?;
    let signer = signer(config)?;
    let db = open_database(config)?;

    let session = config.session_store().load().map_err(RunBoardError::from)?;
    let clubs = auth::caller_clubs(&db, &client, &signer, session.as_deref(), Utc::now()).await?;

    if clubs.is_empty() {
        println!("{}", "Not a member of any club".dimmed());
        return Ok(());
    }

    for club in &clubs {
        let marker = if config.strava.club_id == Some(club.id) {
            "*".green().bold()
        } else {
            " ".normal()
        };
        println!(
            "{} {:>12}  {}",
            marker,
            club.id,
            club.name.as_deref().unwrap_or("-")
        );
    }
    println!("{} clubs", clubs.len());
    Ok(())
}

fn format_time(t: DateTime<Utc>) -> String {
    t.format("%Y-%m-%d %H:%M UTC").to_string()
}

fn manage_config(config: &AppConfig, path: Option<&Path>, init: bool, show: bool) -> Result<()> {
    if init {
        let path = path
            .map(Path::to_path_buf)
            .unwrap_or_else(AppConfig::default_config_path);
        if path.exists() {
            bail!("{} already exists", path.display());
        }
        AppConfig::default().save_to_file(&path)?;
        println!("{} Wrote {}", "✓".green(), path.display());
    }

    if show || !init {
        println!("{}", toml::to_string_pretty(&config.redacted())?);
        for problem in config.validate() {
            println!("{} {}", "!".yellow().bold(), problem.yellow());
        }
    }

    Ok(())
}
