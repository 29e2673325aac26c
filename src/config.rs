use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

use crate::campaign::{parse_date_to_epoch, parse_target_to_epoch};
use crate::error::RunBoardError;
use crate::logging::{mask_secret, LogConfig};
use crate::projection::ProjectionUnit;
use crate::session::{SessionStore, DEFAULT_MAX_AGE_SECS};
use crate::strava::{StravaClient, StravaCredentials, StravaError, DEFAULT_API_BASE, DEFAULT_OAUTH_BASE};

/// Campaign start used when none is configured
pub const DEFAULT_START_DATE: &str = "2026-03-01";

/// Projection target used when none is configured
pub const DEFAULT_TARGET_DATE: &str = "2026-12-31";

/// Earliest month shown in the monthly breakdown
pub const DEFAULT_MONTHLY_FLOOR: &str = "2025-10";

/// Tokens expiring within this window are refreshed by the batch job
pub const DEFAULT_REFRESH_BUFFER_MS: i64 = 300_000;

/// Main application configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AppConfig {
    /// Application metadata
    pub metadata: ConfigMetadata,

    /// General application settings
    #[serde(default)]
    pub settings: AppSettings,

    /// Strava API credentials and endpoints
    #[serde(default)]
    pub strava: StravaSettings,

    /// Campaign window and projection target
    #[serde(default)]
    pub campaign: CampaignSettings,

    /// Session token signing
    #[serde(default)]
    pub session: SessionSettings,

    /// Logging output
    #[serde(default)]
    pub logging: LogConfig,
}

/// Configuration metadata
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConfigMetadata {
    /// Configuration format version
    pub version: String,

    /// Creation timestamp
    pub created_at: DateTime<Utc>,

    /// Last modification timestamp
    pub updated_at: DateTime<Utc>,
}

/// General application settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AppSettings {
    /// Directory holding the database and session file
    pub data_dir: PathBuf,

    /// Database file name inside `data_dir`
    pub database_file: String,
}

/// Strava application settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StravaSettings {
    pub client_id: String,
    pub client_secret: String,
    pub redirect_uri: String,

    /// Leaderboard access requires membership of this club
    pub club_id: Option<i64>,

    pub api_base: String,
    pub oauth_base: String,

    /// Activities requested per athlete
    pub per_page: u32,
}

/// Campaign settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CampaignSettings {
    /// Runs before this date (`YYYY-MM-DD` or `DD-MM-YYYY`) do not count
    pub start_date: Option<String>,

    /// Date the projection forecasts to
    pub target_date: String,

    /// Earliest `YYYY-MM` in the monthly breakdown
    pub monthly_floor: String,

    /// Projection granularity
    pub projection: ProjectionUnit,

    /// Refresh window for the batch token refresh
    pub refresh_buffer_ms: i64,
}

/// Session settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionSettings {
    /// Signing secret; the Strava client secret is used when empty
    pub secret: String,

    /// Session lifetime in days
    pub max_age_days: i64,
}

impl Default for AppConfig {
    fn default() -> Self {
        let now = Utc::now();
        AppConfig {
            metadata: ConfigMetadata {
                version: "1.0".to_string(),
                created_at: now,
                updated_at: now,
            },
            settings: AppSettings::default(),
            strava: StravaSettings::default(),
            campaign: CampaignSettings::default(),
            session: SessionSettings::default(),
            logging: LogConfig::default(),
        }
    }
}

impl Default for AppSettings {
    fn default() -> Self {
        AppSettings {
            data_dir: AppConfig::default_home().join("data"),
            database_file: "runboard.db".to_string(),
        }
    }
}

impl Default for StravaSettings {
    fn default() -> Self {
        StravaSettings {
            client_id: String::new(),
            client_secret: String::new(),
            redirect_uri: "http://localhost:3000/api/auth/strava/callback".to_string(),
            club_id: None,
            api_base: DEFAULT_API_BASE.to_string(),
            oauth_base: DEFAULT_OAUTH_BASE.to_string(),
            per_page: 200,
        }
    }
}

impl Default for CampaignSettings {
    fn default() -> Self {
        CampaignSettings {
            start_date: Some(DEFAULT_START_DATE.to_string()),
            target_date: DEFAULT_TARGET_DATE.to_string(),
            monthly_floor: DEFAULT_MONTHLY_FLOOR.to_string(),
            projection: ProjectionUnit::Day,
            refresh_buffer_ms: DEFAULT_REFRESH_BUFFER_MS,
        }
    }
}

impl Default for SessionSettings {
    fn default() -> Self {
        SessionSettings {
            secret: String::new(),
            max_age_days: DEFAULT_MAX_AGE_SECS / 86_400,
        }
    }
}

/// Configuration management implementation
impl AppConfig {
    /// Load configuration from TOML file
    pub fn load_from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = fs::read_to_string(&path)
            .with_context(|| format!("Failed to read config file: {}", path.as_ref().display()))?;

        let config: AppConfig = toml::from_str(&content)
            .with_context(|| "Failed to parse TOML configuration")?;

        Ok(config)
    }

    /// Save configuration to TOML file
    pub fn save_to_file<P: AsRef<Path>>(&mut self, path: P) -> Result<()> {
        self.metadata.updated_at = Utc::now();

        if let Some(parent) = path.as_ref().parent() {
            fs::create_dir_all(parent)
                .with_context(|| format!("Failed to create config directory: {}", parent.display()))?;
        }

        let toml_content = toml::to_string_pretty(self)
            .with_context(|| "Failed to serialize configuration to TOML")?;

        fs::write(&path, toml_content)
            .with_context(|| format!("Failed to write config file: {}", path.as_ref().display()))?;

        Ok(())
    }

    fn default_home() -> PathBuf {
        dirs::home_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join(".runboard")
    }

    /// Get default configuration file path
    pub fn default_config_path() -> PathBuf {
        Self::default_home().join("config.toml")
    }

    /// Load `path` (or the default path); a missing file yields defaults.
    ///
    /// Environment overrides are applied on top either way.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let path = path
            .map(Path::to_path_buf)
            .unwrap_or_else(Self::default_config_path);

        let mut config = if path.exists() {
            Self::load_from_file(&path)?
        } else {
            Self::default()
        };

        config.apply_env_overrides(|key| std::env::var(key).ok());
        Ok(config)
    }

    /// Apply overrides from environment-style lookups
    pub fn apply_env_overrides<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).map(|v| v.trim().to_string()).filter(|v| !v.is_empty());

        if let Some(v) = get("STRAVA_CLIENT_ID") {
            self.strava.client_id = v;
        }
        if let Some(v) = get("STRAVA_CLIENT_SECRET") {
            self.strava.client_secret = v;
        }
        if let Some(v) = get("STRAVA_REDIRECT_URI") {
            self.strava.redirect_uri = v;
        }
        if let Some(v) = get("STRAVA_CLUB_ID") {
            match v.parse() {
                Ok(id) => self.strava.club_id = Some(id),
                Err(_) => tracing::warn!(value = %v, "Ignoring non-numeric STRAVA_CLUB_ID"),
            }
        }
        if let Some(v) = get("SESSION_SECRET") {
            self.session.secret = v;
        }
        if let Some(v) = get("RUNBOARD_START_DATE") {
            self.campaign.start_date = Some(v);
        }
        if let Some(v) = get("RUNBOARD_TARGET_DATE") {
            self.campaign.target_date = v;
        }
    }

    /// Problems that prevent talking to Strava
    pub fn validate(&self) -> Vec<String> {
        let mut problems = Vec::new();

        if self.strava.client_id.is_empty() {
            problems.push("Strava client id is not set (STRAVA_CLIENT_ID)".to_string());
        }
        if self.strava.client_secret.is_empty() {
            problems.push("Strava client secret is not set (STRAVA_CLIENT_SECRET)".to_string());
        }
        if self.session_secret().is_empty() {
            problems.push("Session secret is not set (SESSION_SECRET)".to_string());
        }
        if let Some(start) = &self.campaign.start_date {
            if parse_date_to_epoch(start).is_none() {
                problems.push(format!("Campaign start date is not a valid date: {}", start));
            }
        }
        if self.strava.per_page == 0 {
            problems.push("strava.per_page must be positive".to_string());
        }

        problems
    }

    /// Fail with a `Configuration` error listing every problem `validate` reports
    pub fn require_valid(&self) -> std::result::Result<(), RunBoardError> {
        let problems = self.validate();
        if problems.is_empty() {
            Ok(())
        } else {
            Err(RunBoardError::Configuration(problems.join("; ")))
        }
    }

    /// Session secret, falling back to the Strava client secret
    pub fn session_secret(&self) -> &str {
        if self.session.secret.is_empty() {
            &self.strava.client_secret
        } else {
            &self.session.secret
        }
    }

    pub fn session_max_age_secs(&self) -> i64 {
        self.session.max_age_days * 86_400
    }

    /// Campaign start at midnight UTC, if configured and valid
    pub fn campaign_start_epoch(&self) -> Option<i64> {
        self.campaign
            .start_date
            .as_deref()
            .and_then(parse_date_to_epoch)
    }

    /// Projection target; an invalid target falls back to the default date
    pub fn target_epoch(&self) -> i64 {
        let fallback = parse_date_to_epoch(DEFAULT_TARGET_DATE).unwrap_or_default();
        parse_target_to_epoch(Some(self.campaign.target_date.as_str()), fallback)
    }

    pub fn database_path(&self) -> PathBuf {
        self.settings.data_dir.join(&self.settings.database_file)
    }

    pub fn session_store(&self) -> SessionStore {
        SessionStore::in_dir(&self.settings.data_dir)
    }

    /// Strava client for the configured application and endpoints
    pub fn strava_client(&self) -> Result<StravaClient, StravaError> {
        let client = StravaClient::new(StravaCredentials {
            client_id: self.strava.client_id.clone(),
            client_secret: self.strava.client_secret.clone(),
            redirect_uri: self.strava.redirect_uri.clone(),
        })?;

        Ok(client
            .with_api_base(self.strava.api_base.clone())
            .with_oauth_base(self.strava.oauth_base.clone()))
    }

    /// Copy suitable for display, secrets masked when configured
    pub fn redacted(&self) -> AppConfig {
        let mut shown = self.clone();
        if self.logging.filter_sensitive {
            shown.strava.client_secret = mask_secret(&self.strava.client_secret);
            shown.session.secret = mask_secret(&self.session.secret);
        }
        shown
    }
}
