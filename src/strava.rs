//! Strava API client
//!
//! OAuth authorization and token exchange, plus the two read endpoints the
//! leaderboard needs: the athlete's activity list and club memberships.

use chrono::{DateTime, Utc};
use reqwest::{Client, Response, StatusCode};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use url::Url;

use crate::models::Activity;

pub const DEFAULT_API_BASE: &str = "https://www.strava.com/api/v3";
pub const DEFAULT_OAUTH_BASE: &str = "https://www.strava.com/oauth";

/// Scope requested during authorization
pub const DEFAULT_SCOPE: &str = "read,activity:read_all";

const REQUEST_TIMEOUT_SECS: u64 = 30;

#[derive(Debug, thiserror::Error)]
pub enum StravaError {
    #[error("Missing configuration: {0}")]
    MissingConfig(String),

    #[error("HTTP request failed: {0}")]
    Request(#[from] reqwest::Error),

    #[error("Invalid URL: {0}")]
    InvalidUrl(#[from] url::ParseError),

    #[error("Strava API error {status}: {body}")]
    Api { status: u16, body: String },

    #[error("Failed to parse Strava response: {0}")]
    Parse(String),

    #[error("Not authenticated with Strava")]
    NotAuthenticated,
}

impl StravaError {
    /// HTTP status behind the error, when there is one
    pub fn status(&self) -> Option<u16> {
        match self {
            StravaError::Api { status, .. } => Some(*status),
            StravaError::NotAuthenticated => Some(401),
            StravaError::Request(e) => e.status().map(|s| s.as_u16()),
            _ => None,
        }
    }
}

/// OAuth application credentials
#[derive(Debug, Clone, Default)]
pub struct StravaCredentials {
    pub client_id: String,
    pub client_secret: String,
    pub redirect_uri: String,
}

/// Athlete summary returned alongside tokens
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SummaryAthlete {
    pub id: i64,
    #[serde(default)]
    pub firstname: Option<String>,
    #[serde(default)]
    pub lastname: Option<String>,
    #[serde(default)]
    pub username: Option<String>,
    #[serde(default)]
    pub profile: Option<String>,
}

/// Response from the token endpoint
#[derive(Debug, Clone, Deserialize)]
pub struct TokenResponse {
    pub access_token: String,
    #[serde(default)]
    pub refresh_token: Option<String>,

    /// Expiry in epoch seconds
    #[serde(default)]
    pub expires_at: Option<i64>,

    /// Only present on the authorization-code exchange
    #[serde(default)]
    pub athlete: Option<SummaryAthlete>,
}

impl TokenResponse {
    pub fn expires_at_utc(&self) -> Option<DateTime<Utc>> {
        self.expires_at
            .and_then(|secs| DateTime::from_timestamp(secs, 0))
    }
}

/// Club summary; only the id matters for membership
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct Club {
    pub id: i64,
    #[serde(default)]
    pub name: Option<String>,
}

/// Async Strava client with configurable endpoints
#[derive(Debug, Clone)]
pub struct StravaClient {
    http: Client,
    credentials: StravaCredentials,
    api_base: String,
    oauth_base: String,
}

impl StravaClient {
    pub fn new(credentials: StravaCredentials) -> Result<Self, StravaError> {
        let http = Client::builder()
            .timeout(Duration::from_secs(REQUEST_TIMEOUT_SECS))
            .build()?;

        Ok(StravaClient {
            http,
            credentials,
            api_base: DEFAULT_API_BASE.to_string(),
            oauth_base: DEFAULT_OAUTH_BASE.to_string(),
        })
    }

    /// Point API calls at another base URL
    pub fn with_api_base(mut self, base: impl Into<String>) -> Self {
        self.api_base = base.into().trim_end_matches('/').to_string();
        self
    }

    /// Point OAuth calls at another base URL
    pub fn with_oauth_base(mut self, base: impl Into<String>) -> Self {
        self.oauth_base = base.into().trim_end_matches('/').to_string();
        self
    }

    pub fn credentials(&self) -> &StravaCredentials {
        &self.credentials
    }

    /// URL the athlete opens to grant access
    pub fn authorize_url(&self, scope: &str) -> Result<String, StravaError> {
        if self.credentials.client_id.is_empty() {
            return Err(StravaError::MissingConfig("STRAVA_CLIENT_ID".into()));
        }

        let mut url = Url::parse(&format!("{}/authorize", self.oauth_base))?;
        url.query_pairs_mut()
            .append_pair("client_id", &self.credentials.client_id)
            .append_pair("redirect_uri", &self.credentials.redirect_uri)
            .append_pair("response_type", "code")
            .append_pair("approval_prompt", "auto")
            .append_pair("scope", scope);

        Ok(url.to_string())
    }

    /// Exchange an authorization code for tokens and the athlete summary
    pub async fn exchange_code(&self, code: &str) -> Result<TokenResponse, StravaError> {
        tracing::debug!("Exchanging authorization code");

        let mut form = vec![
            ("client_id", self.credentials.client_id.as_str()),
            ("client_secret", self.credentials.client_secret.as_str()),
            ("code", code),
            ("grant_type", "authorization_code"),
        ];
        if !self.credentials.redirect_uri.is_empty() {
            form.push(("redirect_uri", self.credentials.redirect_uri.as_str()));
        }

        let response = self
            .http
            .post(format!("{}/token", self.oauth_base))
            .form(&form)
            .send()
            .await?;

        read_json(response).await
    }

    /// Obtain a fresh access token from a refresh token
    pub async fn refresh_token(&self, refresh_token: &str) -> Result<TokenResponse, StravaError> {
        tracing::debug!("Refreshing access token");

        let response = self
            .http
            .post(format!("{}/token", self.oauth_base))
            .form(&[
                ("client_id", self.credentials.client_id.as_str()),
                ("client_secret", self.credentials.client_secret.as_str()),
                ("grant_type", "refresh_token"),
                ("refresh_token", refresh_token),
            ])
            .send()
            .await?;

        read_json(response).await
    }

    /// One page of the authenticated athlete's activities, newest first
    pub async fn fetch_activities(
        &self,
        access_token: &str,
        before: Option<i64>,
        per_page: u32,
    ) -> Result<Vec<Activity>, StravaError> {
        let mut url = Url::parse(&format!("{}/athlete/activities", self.api_base))?;
        {
            let mut query = url.query_pairs_mut();
            query.append_pair("per_page", &per_page.to_string());
            if let Some(before) = before {
                query.append_pair("before", &before.to_string());
            }
        }

        tracing::debug!(per_page, before = ?before, "Fetching activities");

        let response = self
            .http
            .get(url)
            .bearer_auth(access_token)
            .header(reqwest::header::ACCEPT, "application/json")
            .send()
            .await?;

        read_json(response).await
    }

    /// Clubs the authenticated athlete belongs to
    pub async fn fetch_clubs(&self, access_token: &str) -> Result<Vec<Club>, StravaError> {
        let response = self
            .http
            .get(format!("{}/athlete/clubs", self.api_base))
            .bearer_auth(access_token)
            .header(reqwest::header::ACCEPT, "application/json")
            .send()
            .await?;

        read_json(response).await
    }

    pub async fn is_club_member(&self, access_token: &str, club_id: i64) -> Result<bool, StravaError> {
        let clubs = self.fetch_clubs(access_token).await?;
        Ok(clubs.iter().any(|club| club.id == club_id))
    }
}

async fn read_json<T: DeserializeOwned>(response: Response) -> Result<T, StravaError> {
    let status = response.status();

    if status == StatusCode::UNAUTHORIZED {
        return Err(StravaError::NotAuthenticated);
    }

    if !status.is_success() {
        let body = response.text().await.unwrap_or_default();
        tracing::warn!(status = status.as_u16(), "Strava request failed");
        return Err(StravaError::Api {
            status: status.as_u16(),
            body,
        });
    }

    let text = response.text().await?;
    serde_json::from_str(&text).map_err(|e| StravaError::Parse(e.to_string()))
}
