use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, OptionalExtension, Row};
use std::path::Path;

use crate::models::AthleteRecord;

/// Database error types
#[derive(Debug, thiserror::Error)]
pub enum DatabaseError {
    #[error("SQLite error: {0}")]
    SqliteError(#[from] rusqlite::Error),
    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),
    #[error("Data not found: {0}")]
    NotFound(String),
}

/// Athlete store backed by SQLite
pub struct Database {
    conn: Connection,
}

const ATHLETE_COLUMNS: &str = "athlete_id, firstname, lastname, username, profile, \
     access_token, refresh_token, expires_at, updated_at";

impl Database {
    /// Create or open a database at the specified path
    pub fn new<P: AsRef<Path>>(db_path: P) -> Result<Self, DatabaseError> {
        if let Some(parent) = db_path.as_ref().parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }

        let conn = Connection::open(db_path)?;
        let db = Self { conn };
        db.init_schema()?;
        Ok(db)
    }

    /// Throwaway database, used by tests and dry runs
    pub fn in_memory() -> Result<Self, DatabaseError> {
        let db = Self {
            conn: Connection::open_in_memory()?,
        };
        db.init_schema()?;
        Ok(db)
    }

    fn init_schema(&self) -> Result<(), DatabaseError> {
        // journal_mode reports the resulting mode as a row
        let _mode: String = self
            .conn
            .query_row("PRAGMA journal_mode=WAL", [], |row| row.get(0))?;
        self.conn.execute_batch("PRAGMA synchronous=NORMAL;")?;

        self.conn.execute(
            r#"
            CREATE TABLE IF NOT EXISTS athletes (
                athlete_id INTEGER PRIMARY KEY,
                firstname TEXT,
                lastname TEXT,
                username TEXT,
                profile TEXT,
                access_token TEXT,
                refresh_token TEXT,
                expires_at TEXT,
                updated_at TEXT NOT NULL
            )
            "#,
            [],
        )?;

        self.conn.execute(
            "CREATE INDEX IF NOT EXISTS idx_athletes_expires_at ON athletes (expires_at)",
            [],
        )?;

        Ok(())
    }

    /// Insert an athlete or replace every column of the existing record
    pub fn upsert_athlete(&self, athlete: &AthleteRecord) -> Result<(), DatabaseError> {
        self.conn.execute(
            r#"
            INSERT INTO athletes (
                athlete_id, firstname, lastname, username, profile,
                access_token, refresh_token, expires_at, updated_at
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)
            ON CONFLICT(athlete_id) DO UPDATE SET
                firstname = excluded.firstname,
                lastname = excluded.lastname,
                username = excluded.username,
                profile = excluded.profile,
                access_token = excluded.access_token,
                refresh_token = excluded.refresh_token,
                expires_at = excluded.expires_at,
                updated_at = excluded.updated_at
            "#,
            params![
                athlete.athlete_id,
                athlete.firstname,
                athlete.lastname,
                athlete.username,
                athlete.profile,
                athlete.access_token,
                athlete.refresh_token,
                athlete.expires_at,
                athlete.updated_at,
            ],
        )?;

        tracing::debug!(athlete_id = athlete.athlete_id, "Athlete stored");
        Ok(())
    }

    pub fn get_athlete(&self, athlete_id: i64) -> Result<Option<AthleteRecord>, DatabaseError> {
        let athlete = self
            .conn
            .query_row(
                &format!("SELECT {} FROM athletes WHERE athlete_id = ?1", ATHLETE_COLUMNS),
                params![athlete_id],
                athlete_from_row,
            )
            .optional()?;

        Ok(athlete)
    }

    /// All athletes ordered by id
    pub fn list_athletes(&self) -> Result<Vec<AthleteRecord>, DatabaseError> {
        let mut stmt = self.conn.prepare(&format!(
            "SELECT {} FROM athletes ORDER BY athlete_id",
            ATHLETE_COLUMNS
        ))?;

        let athletes = stmt
            .query_map([], athlete_from_row)?
            .collect::<Result<Vec<_>, _>>()?;

        Ok(athletes)
    }

    /// Replace an athlete's tokens
    pub fn update_tokens(
        &self,
        athlete_id: i64,
        access_token: &str,
        refresh_token: Option<&str>,
        expires_at: Option<DateTime<Utc>>,
        updated_at: DateTime<Utc>,
    ) -> Result<(), DatabaseError> {
        let changed = self.conn.execute(
            r#"
            UPDATE athletes
            SET access_token = ?2, refresh_token = ?3, expires_at = ?4, updated_at = ?5
            WHERE athlete_id = ?1
            "#,
            params![athlete_id, access_token, refresh_token, expires_at, updated_at],
        )?;

        if changed == 0 {
            return Err(DatabaseError::NotFound(format!("athlete {}", athlete_id)));
        }

        Ok(())
    }

    /// Delete an athlete; returns whether a record existed
    pub fn remove_athlete(&self, athlete_id: i64) -> Result<bool, DatabaseError> {
        let changed = self
            .conn
            .execute("DELETE FROM athletes WHERE athlete_id = ?1", params![athlete_id])?;
        Ok(changed > 0)
    }

    pub fn athlete_count(&self) -> Result<usize, DatabaseError> {
        let count: i64 = self
            .conn
            .query_row("SELECT COUNT(*) FROM athletes", [], |row| row.get(0))?;
        Ok(count as usize)
    }
}

fn athlete_from_row(row: &Row) -> rusqlite::Result<AthleteRecord> {
    Ok(AthleteRecord {
        athlete_id: row.get("athlete_id")?,
        firstname: row.get("firstname")?,
        lastname: row.get("lastname")?,
        username: row.get("username")?,
        profile: row.get("profile")?,
        access_token: row.get("access_token")?,
        refresh_token: row.get("refresh_token")?,
        expires_at: row.get("expires_at")?,
        updated_at: row.get("updated_at")?,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use tempfile::TempDir;

    fn athlete(id: i64) -> AthleteRecord {
        AthleteRecord {
            firstname: Some("Ada".to_string()),
            lastname: Some("Lovelace".to_string()),
            access_token: Some("access".to_string()),
            refresh_token: Some("refresh".to_string()),
            expires_at: Some(Utc.with_ymd_and_hms(2026, 3, 1, 12, 0, 0).unwrap()),
            updated_at: Utc.with_ymd_and_hms(2026, 3, 1, 6, 0, 0).unwrap(),
            ..AthleteRecord::new(id)
        }
    }

    #[test]
    fn test_upsert_and_get() {
        let db = Database::in_memory().unwrap();
        assert_eq!(db.get_athlete(1).unwrap(), None);

        db.upsert_athlete(&athlete(1)).unwrap();
        assert_eq!(db.get_athlete(1).unwrap(), Some(athlete(1)));

        let mut renamed = athlete(1);
        renamed.firstname = Some("Augusta".to_string());
        renamed.refresh_token = None;
        db.upsert_athlete(&renamed).unwrap();

        let stored = db.get_athlete(1).unwrap().unwrap();
        assert_eq!(stored.firstname.as_deref(), Some("Augusta"));
        assert_eq!(stored.refresh_token, None);
        assert_eq!(db.athlete_count().unwrap(), 1);
    }

    #[test]
    fn test_list_is_ordered() {
        let db = Database::in_memory().unwrap();
        for id in [30, 10, 20] {
            db.upsert_athlete(&athlete(id)).unwrap();
        }

        let ids: Vec<i64> = db.list_athletes().unwrap().iter().map(|a| a.athlete_id).collect();
        assert_eq!(ids, vec![10, 20, 30]);
    }

    #[test]
    fn test_update_tokens() {
        let db = Database::in_memory().unwrap();
        db.upsert_athlete(&athlete(1)).unwrap();

        let expires = Utc.with_ymd_and_hms(2026, 3, 2, 12, 0, 0).unwrap();
        let updated = Utc.with_ymd_and_hms(2026, 3, 2, 6, 0, 0).unwrap();
        db.update_tokens(1, "new-access", Some("new-refresh"), Some(expires), updated)
            .unwrap();

        let stored = db.get_athlete(1).unwrap().unwrap();
        assert_eq!(stored.access_token.as_deref(), Some("new-access"));
        assert_eq!(stored.refresh_token.as_deref(), Some("new-refresh"));
        assert_eq!(stored.expires_at, Some(expires));
        assert_eq!(stored.updated_at, updated);

        assert!(matches!(
            db.update_tokens(99, "x", None, None, updated),
            Err(DatabaseError::NotFound(_))
        ));
    }

    #[test]
    fn test_remove_athlete() {
        let db = Database::in_memory().unwrap();
        db.upsert_athlete(&athlete(1)).unwrap();

        assert!(db.remove_athlete(1).unwrap());
        assert!(!db.remove_athlete(1).unwrap());
        assert_eq!(db.athlete_count().unwrap(), 0);
    }

    #[test]
    fn test_file_database_persists() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("data").join("runboard.db");

        {
            let db = Database::new(&path).unwrap();
            db.upsert_athlete(&athlete(7)).unwrap();
        }

        let reopened = Database::new(&path).unwrap();
        assert_eq!(reopened.get_athlete(7).unwrap(), Some(athlete(7)));
    }
}
