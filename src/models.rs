use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

/// Summary activity as returned by the Strava activities endpoint
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Activity {
    /// Strava activity identifier
    pub id: i64,

    /// Activity title
    #[serde(default)]
    pub name: String,

    /// Legacy activity type, e.g. "Run" or "Ride"
    #[serde(rename = "type", default)]
    pub activity_type: Option<String>,

    /// Newer sport type, e.g. "TrailRun" or "VirtualRun"
    #[serde(default)]
    pub sport_type: Option<String>,

    /// Start time in UTC
    #[serde(default)]
    pub start_date: Option<DateTime<Utc>>,

    /// Start time in the athlete's local zone, as reported
    #[serde(default)]
    pub start_date_local: Option<String>,

    /// Distance in meters
    #[serde(default)]
    pub distance: f64,

    /// Moving time in seconds
    #[serde(default)]
    pub moving_time: i64,

    /// Elapsed time in seconds
    #[serde(default)]
    pub elapsed_time: i64,
}

impl Activity {
    /// Sport type when present, otherwise the legacy type
    pub fn kind(&self) -> &str {
        self.sport_type
            .as_deref()
            .or(self.activity_type.as_deref())
            .unwrap_or("")
    }

    /// Any kind containing "run" counts (Run, TrailRun, VirtualRun)
    pub fn is_run(&self) -> bool {
        self.kind().to_lowercase().contains("run")
    }

    /// Start time in milliseconds since epoch
    pub fn start_ms(&self) -> Option<i64> {
        self.start_date.map(|dt| dt.timestamp_millis())
    }

    /// UTC calendar day of the start time
    pub fn start_day(&self) -> Option<NaiveDate> {
        self.start_date.map(|dt| dt.date_naive())
    }

    /// Distance in kilometres, negative values treated as zero
    pub fn distance_km(&self) -> f64 {
        self.distance.max(0.0) / 1000.0
    }

    /// Moving time in seconds, negative values treated as zero
    pub fn moving_seconds(&self) -> i64 {
        self.moving_time.max(0)
    }

    /// Pace in minutes per kilometre, when both distance and time are positive
    pub fn pace_min_per_km(&self) -> Option<f64> {
        let km = self.distance_km();
        let minutes = self.moving_seconds() as f64 / 60.0;
        if km > 0.0 && minutes > 0.0 {
            Some(minutes / km)
        } else {
            None
        }
    }
}

/// Stored athlete with Strava credentials
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AthleteRecord {
    /// Strava athlete identifier
    pub athlete_id: i64,

    pub firstname: Option<String>,
    pub lastname: Option<String>,
    pub username: Option<String>,

    /// Avatar URL
    pub profile: Option<String>,

    /// Current access token
    #[serde(skip_serializing)]
    pub access_token: Option<String>,

    /// Refresh token used to obtain new access tokens
    #[serde(skip_serializing)]
    pub refresh_token: Option<String>,

    /// Access token expiry
    pub expires_at: Option<DateTime<Utc>>,

    /// Last time this record was written
    pub updated_at: DateTime<Utc>,
}

impl AthleteRecord {
    /// New record without credentials
    pub fn new(athlete_id: i64) -> Self {
        AthleteRecord {
            athlete_id,
            firstname: None,
            lastname: None,
            username: None,
            profile: None,
            access_token: None,
            refresh_token: None,
            expires_at: None,
            updated_at: Utc::now(),
        }
    }

    /// "First Last", or "Athlete {id}" when no name is known
    pub fn display_name(&self) -> String {
        let name = format!(
            "{} {}",
            self.firstname.as_deref().unwrap_or(""),
            self.lastname.as_deref().unwrap_or("")
        );
        let name = name.trim();

        if name.is_empty() {
            format!("Athlete {}", self.athlete_id)
        } else {
            name.to_string()
        }
    }
}
