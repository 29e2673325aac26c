//! Collect activities for every stored athlete

use chrono::{DateTime, Utc};

use crate::auth::ensure_access_token;
use crate::database::Database;
use crate::error::Result;
use crate::leaderboard::AthleteActivities;
use crate::strava::StravaClient;

/// Fetch settings for one collection pass
#[derive(Debug, Clone, Copy)]
pub struct FetchOptions {
    /// Only activities started before this epoch second
    pub before: Option<i64>,

    /// Page size passed to Strava
    pub per_page: u32,
}

impl Default for FetchOptions {
    fn default() -> Self {
        FetchOptions {
            before: None,
            per_page: 200,
        }
    }
}

/// Activities for every athlete with a usable token.
///
/// Athletes without a token, or whose fetch fails, are left out so that one
/// broken account does not hide the whole board.
pub async fn collect_activities(
    db: &Database,
    client: &StravaClient,
    options: FetchOptions,
    now: DateTime<Utc>,
) -> Result<Vec<AthleteActivities>> {
    let athletes = db.list_athletes()?;
    let mut collected = Vec::with_capacity(athletes.len());

    for athlete in athletes {
        let Some(token) = ensure_access_token(db, client, &athlete, now).await else {
            tracing::info!(athlete_id = athlete.athlete_id, "Skipping athlete without token");
            continue;
        };

        match client
            .fetch_activities(&token, options.before, options.per_page)
            .await
        {
            Ok(activities) => {
                tracing::debug!(
                    athlete_id = athlete.athlete_id,
                    count = activities.len(),
                    "Activities fetched"
                );
                collected.push(AthleteActivities {
                    athlete,
                    activities,
                });
            }
            Err(e) => {
                tracing::warn!(
                    athlete_id = athlete.athlete_id,
                    error = %e,
                    "Skipping athlete after failed fetch"
                );
            }
        }
    }

    Ok(collected)
}
