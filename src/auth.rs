//! Token lifecycle and request authorization
//!
//! Keeps stored Strava access tokens usable, turns an OAuth callback code into
//! a stored athlete plus a session token, and checks that the caller of a
//! leaderboard command is a logged-in club member.

use chrono::{DateTime, Duration, Utc};
use serde::Serialize;

use crate::database::Database;
use crate::error::{Result, RunBoardError};
use crate::models::AthleteRecord;
use crate::session::SessionSigner;
use crate::strava::{Club, StravaClient, StravaError};

/// Stored access tokens are reused until this close to expiry
pub const ACCESS_TOKEN_BUFFER_SECS: i64 = 60;

/// Whether the stored access token can be used as is
pub fn has_fresh_token(athlete: &AthleteRecord, now: DateTime<Utc>) -> bool {
    match (&athlete.access_token, athlete.expires_at) {
        (Some(_), Some(expires_at)) => {
            expires_at - Duration::seconds(ACCESS_TOKEN_BUFFER_SECS) > now
        }
        _ => false,
    }
}

/// A missing expiry counts as expiring
pub fn is_expiring(expires_at: Option<DateTime<Utc>>, now: DateTime<Utc>, buffer_ms: i64) -> bool {
    match expires_at {
        Some(expires_at) => expires_at <= now + Duration::milliseconds(buffer_ms),
        None => true,
    }
}

/// Usable access token for `athlete`, refreshing and persisting when needed.
///
/// A failed refresh falls back to the stored token, which may be `None`.
pub async fn ensure_access_token(
    db: &Database,
    client: &StravaClient,
    athlete: &AthleteRecord,
    now: DateTime<Utc>,
) -> Option<String> {
    if has_fresh_token(athlete, now) {
        return athlete.access_token.clone();
    }

    let Some(refresh_token) = athlete.refresh_token.as_deref() else {
        return athlete.access_token.clone();
    };

    let response = match client.refresh_token(refresh_token).await {
        Ok(response) => response,
        Err(e) => {
            tracing::warn!(athlete_id = athlete.athlete_id, error = %e, "Token refresh failed");
            return athlete.access_token.clone();
        }
    };

    let kept_refresh = response.refresh_token.as_deref().unwrap_or(refresh_token);
    if let Err(e) = db.update_tokens(
        athlete.athlete_id,
        &response.access_token,
        Some(kept_refresh),
        response.expires_at_utc(),
        now,
    ) {
        tracing::warn!(athlete_id = athlete.athlete_id, error = %e, "Failed to store refreshed token");
    }

    tracing::info!(athlete_id = athlete.athlete_id, "Access token refreshed");
    Some(response.access_token)
}

/// Batch refresh options
#[derive(Debug, Clone)]
pub struct RefreshOptions {
    /// Restrict the run to one athlete
    pub athlete_id: Option<i64>,

    /// Refresh every athlete holding a refresh token, regardless of expiry
    pub force: bool,

    /// Tokens expiring within this many milliseconds are refreshed
    pub buffer_ms: i64,
}

impl Default for RefreshOptions {
    fn default() -> Self {
        RefreshOptions {
            athlete_id: None,
            force: false,
            buffer_ms: crate::config::DEFAULT_REFRESH_BUFFER_MS,
        }
    }
}

/// What happened to one athlete during a batch refresh
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "status", rename_all = "lowercase")]
pub enum RefreshOutcome {
    Refreshed { expires_at: Option<DateTime<Utc>> },
    Skipped { reason: String },
    Failed { message: String, retryable: bool },
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RefreshResult {
    pub athlete_id: i64,
    #[serde(flatten)]
    pub outcome: RefreshOutcome,
}

/// Summary of a batch refresh
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RefreshReport {
    pub total_athletes: usize,
    pub candidates: usize,
    pub force: bool,

    /// Buffer actually applied; 0 when forced
    pub buffer_ms: i64,

    pub results: Vec<RefreshResult>,
}

impl RefreshReport {
    pub fn refreshed(&self) -> usize {
        self.count(|o| matches!(o, RefreshOutcome::Refreshed { .. }))
    }

    pub fn skipped(&self) -> usize {
        self.count(|o| matches!(o, RefreshOutcome::Skipped { .. }))
    }

    pub fn failed(&self) -> usize {
        self.count(|o| matches!(o, RefreshOutcome::Failed { .. }))
    }

    fn count(&self, pred: impl Fn(&RefreshOutcome) -> bool) -> usize {
        self.results.iter().filter(|r| pred(&r.outcome)).count()
    }
}

/// Refresh tokens that are expired or about to expire
pub async fn refresh_expiring(
    db: &Database,
    client: &StravaClient,
    options: &RefreshOptions,
    now: DateTime<Utc>,
) -> Result<RefreshReport> {
    let athletes = match options.athlete_id {
        Some(id) => db.get_athlete(id)?.into_iter().collect(),
        None => db.list_athletes()?,
    };
    let buffer_ms = if options.force { 0 } else { options.buffer_ms };

    let mut results = Vec::with_capacity(athletes.len());
    let mut candidates = 0;

    for athlete in &athletes {
        let Some(refresh_token) = athlete.refresh_token.as_deref() else {
            results.push(RefreshResult {
                athlete_id: athlete.athlete_id,
                outcome: RefreshOutcome::Skipped {
                    reason: "no refresh token".to_string(),
                },
            });
            continue;
        };

        if !options.force && !is_expiring(athlete.expires_at, now, buffer_ms) {
            results.push(RefreshResult {
                athlete_id: athlete.athlete_id,
                outcome: RefreshOutcome::Skipped {
                    reason: "token still valid".to_string(),
                },
            });
            continue;
        }

        candidates += 1;
        let outcome = match refresh_one(db, client, athlete, refresh_token, now).await {
            Ok(expires_at) => RefreshOutcome::Refreshed { expires_at },
            Err(e) => {
                tracing::warn!(athlete_id = athlete.athlete_id, error = %e, "Token refresh failed");
                RefreshOutcome::Failed {
                    message: e.to_string(),
                    retryable: e.is_retryable(),
                }
            }
        };

        results.push(RefreshResult {
            athlete_id: athlete.athlete_id,
            outcome,
        });
    }

    let report = RefreshReport {
        total_athletes: athletes.len(),
        candidates,
        force: options.force,
        buffer_ms,
        results,
    };

    tracing::info!(
        total = report.total_athletes,
        refreshed = report.refreshed(),
        failed = report.failed(),
        "Token refresh finished"
    );

    Ok(report)
}

async fn refresh_one(
    db: &Database,
    client: &StravaClient,
    athlete: &AthleteRecord,
    refresh_token: &str,
    now: DateTime<Utc>,
) -> Result<Option<DateTime<Utc>>> {
    let response = client.refresh_token(refresh_token).await?;
    let expires_at = response.expires_at_utc();

    db.update_tokens(
        athlete.athlete_id,
        &response.access_token,
        Some(response.refresh_token.as_deref().unwrap_or(refresh_token)),
        expires_at,
        now,
    )?;

    Ok(expires_at)
}

/// Result of a completed OAuth login
#[derive(Debug, Clone)]
pub struct LoginOutcome {
    pub athlete: AthleteRecord,
    pub session_token: String,
}

/// Exchange an authorization code, check club membership, store the athlete
/// and issue a session token
pub async fn complete_login(
    db: &Database,
    client: &StravaClient,
    signer: &SessionSigner,
    code: &str,
    club_id: Option<i64>,
    now: DateTime<Utc>,
) -> Result<LoginOutcome> {
    let code = code.trim();
    if code.is_empty() {
        return Err(RunBoardError::Unauthorized(
            "missing authorization code".to_string(),
        ));
    }

    let token = client.exchange_code(code).await?;
    let summary = token.athlete.clone().ok_or_else(|| {
        RunBoardError::Internal("token response did not include the athlete".to_string())
    })?;

    if let Some(club_id) = club_id {
        if !client.is_club_member(&token.access_token, club_id).await? {
            tracing::warn!(athlete_id = summary.id, club_id, "Login refused: not a club member");
            return Err(RunBoardError::NotInClub { club_id });
        }
    }

    let athlete = AthleteRecord {
        athlete_id: summary.id,
        firstname: summary.firstname,
        lastname: summary.lastname,
        username: summary.username,
        profile: summary.profile,
        access_token: Some(token.access_token.clone()),
        refresh_token: token.refresh_token.clone(),
        expires_at: token.expires_at_utc(),
        updated_at: now,
    };
    db.upsert_athlete(&athlete)?;

    let session_token = signer.issue(athlete.athlete_id, now);
    tracing::info!(athlete_id = athlete.athlete_id, "Athlete logged in");

    Ok(LoginOutcome {
        athlete,
        session_token,
    })
}

/// Strava rejecting the clubs request means the caller's token is bad (401);
/// a transport or decoding failure means membership is unknown (403)
fn club_check_error(err: &StravaError) -> RunBoardError {
    match err {
        StravaError::NotAuthenticated | StravaError::Api { .. } => {
            RunBoardError::Unauthorized("Strava rejected the club check".to_string())
        }
        _ => RunBoardError::Forbidden("could not verify club membership".to_string()),
    }
}

/// Caller identity after authorization
#[derive(Debug, Clone)]
pub struct AuthorizedAthlete {
    pub athlete: AthleteRecord,
    pub access_token: String,
}

/// Verify the session, load the athlete and enforce club membership
pub async fn authorize_request(
    db: &Database,
    client: &StravaClient,
    signer: &SessionSigner,
    session_token: Option<&str>,
    club_id: Option<i64>,
    now: DateTime<Utc>,
) -> Result<AuthorizedAthlete> {
    let token = session_token
        .ok_or_else(|| RunBoardError::Unauthorized("no session".to_string()))?;

    let claims = signer
        .verify(token, now)
        .ok_or_else(|| RunBoardError::Unauthorized("invalid or expired session".to_string()))?;

    let athlete = db.get_athlete(claims.athlete_id)?.ok_or_else(|| {
        RunBoardError::Unauthorized(format!("unknown athlete {}", claims.athlete_id))
    })?;

    let access_token = ensure_access_token(db, client, &athlete, now)
        .await
        .ok_or_else(|| RunBoardError::Unauthorized("no Strava access token".to_string()))?;

    if let Some(club_id) = club_id {
        match client.is_club_member(&access_token, club_id).await {
            Ok(true) => {}
            Ok(false) => return Err(RunBoardError::NotInClub { club_id }),
            Err(e) => {
                tracing::warn!(athlete_id = athlete.athlete_id, error = %e, "Club check failed");
                return Err(club_check_error(&e));
            }
        }
    }

    Ok(AuthorizedAthlete {
        athlete,
        access_token,
    })
}

/// Clubs the logged-in caller belongs to, without enforcing membership
///
/// Strava failures keep their status so a rejected request reads the same as
/// it did upstream.
pub async fn caller_clubs(
    db: &Database,
    client: &StravaClient,
    signer: &SessionSigner,
    session_token: Option<&str>,
    now: DateTime<Utc>,
) -> Result<Vec<Club>> {
    let caller = authorize_request(db, client, signer, session_token, None, now).await?;
    let clubs = client.fetch_clubs(&caller.access_token).await?;

    tracing::debug!(
        athlete_id = caller.athlete.athlete_id,
        clubs = clubs.len(),
        "Listed caller clubs"
    );
    Ok(clubs)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 3, 10, 12, 0, 0).unwrap()
    }

    #[test]
    fn test_has_fresh_token() {
        let mut athlete = AthleteRecord::new(1);
        assert!(!has_fresh_token(&athlete, now()));

        athlete.access_token = Some("a".to_string());
        assert!(!has_fresh_token(&athlete, now()));

        athlete.expires_at = Some(now() + Duration::seconds(61));
        assert!(has_fresh_token(&athlete, now()));

        athlete.expires_at = Some(now() + Duration::seconds(60));
        assert!(!has_fresh_token(&athlete, now()));
    }

    #[test]
    fn test_is_expiring() {
        assert!(is_expiring(None, now(), 300_000));
        assert!(is_expiring(Some(now() + Duration::minutes(5)), now(), 300_000));
        assert!(!is_expiring(Some(now() + Duration::minutes(6)), now(), 300_000));
        assert!(is_expiring(Some(now() - Duration::minutes(1)), now(), 0));
    }

    #[test]
    fn test_club_check_error_status() {
        assert_eq!(club_check_error(&StravaError::NotAuthenticated).status_code(), Some(401));
        let api = StravaError::Api {
            status: 500,
            body: String::new(),
        };
        assert_eq!(club_check_error(&api).status_code(), Some(401));
        let parse = StravaError::Parse("expected value".to_string());
        assert!(matches!(club_check_error(&parse), RunBoardError::Forbidden(_)));
    }

    #[test]
    fn test_report_counts_and_json() {
        let report = RefreshReport {
            total_athletes: 3,
            candidates: 2,
            force: false,
            buffer_ms: 300_000,
            results: vec![
                RefreshResult {
                    athlete_id: 1,
                    outcome: RefreshOutcome::Refreshed { expires_at: None },
                },
                RefreshResult {
                    athlete_id: 2,
                    outcome: RefreshOutcome::Failed {
                        message: "boom".to_string(),
                        retryable: true,
                    },
                },
                RefreshResult {
                    athlete_id: 3,
                    outcome: RefreshOutcome::Skipped {
                        reason: "token still valid".to_string(),
                    },
                },
            ],
        };

        assert_eq!(report.refreshed(), 1);
        assert_eq!(report.failed(), 1);
        assert_eq!(report.skipped(), 1);

        let json = serde_json::to_value(&report).unwrap();
        assert_eq!(json["results"][1]["status"], "failed");
        assert_eq!(json["results"][1]["athlete_id"], 2);
        assert_eq!(json["results"][1]["retryable"], true);
        assert_eq!(json["results"][2]["reason"], "token still valid");
    }
}
