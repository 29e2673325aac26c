//! Signed session tokens
//!
//! A token has the form `{athlete_id}.{issued_at}.{signature}` where the
//! signature is the hex HMAC-SHA256 of `{athlete_id}.{issued_at}` under the
//! session secret. Tokens are not encrypted; the athlete id is readable.

use chrono::{DateTime, Utc};
use ring::hmac;
use std::fs;
use std::path::{Path, PathBuf};
use subtle::ConstantTimeEq;
use thiserror::Error;

/// Default session lifetime: 30 days
pub const DEFAULT_MAX_AGE_SECS: i64 = 30 * 24 * 60 * 60;

const SESSION_FILE_NAME: &str = "session";

#[derive(Error, Debug)]
pub enum SessionError {
    #[error("Session secret is not configured")]
    MissingSecret,
    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),
}

/// Identity carried by a valid token
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SessionClaims {
    pub athlete_id: i64,

    /// Issue time in epoch seconds
    pub issued_at: i64,
}

/// Issues and verifies session tokens
pub struct SessionSigner {
    key: hmac::Key,
    max_age_secs: i64,
}

impl SessionSigner {
    pub fn new(secret: &str, max_age_secs: i64) -> Result<Self, SessionError> {
        if secret.is_empty() {
            return Err(SessionError::MissingSecret);
        }

        Ok(SessionSigner {
            key: hmac::Key::new(hmac::HMAC_SHA256, secret.as_bytes()),
            max_age_secs,
        })
    }

    fn sign(&self, payload: &str) -> String {
        let tag = hmac::sign(&self.key, payload.as_bytes());
        hex::encode(tag.as_ref())
    }

    /// New token for `athlete_id`, issued at `now`
    pub fn issue(&self, athlete_id: i64, now: DateTime<Utc>) -> String {
        let payload = format!("{}.{}", athlete_id, now.timestamp());
        let signature = self.sign(&payload);
        format!("{}.{}", payload, signature)
    }

    /// Claims of a valid, unexpired token; `None` for anything else
    pub fn verify(&self, token: &str, now: DateTime<Utc>) -> Option<SessionClaims> {
        let parts: Vec<&str> = token.trim().split('.').collect();
        let [athlete_part, issued_part, signature] = parts.as_slice() else {
            return None;
        };

        let provided = hex::decode(signature).ok()?;
        let expected = hex::decode(self.sign(&format!("{}.{}", athlete_part, issued_part))).ok()?;
        if !bool::from(provided.as_slice().ct_eq(expected.as_slice())) {
            return None;
        }

        let athlete_id: i64 = athlete_part.parse().ok()?;
        let issued_at: i64 = issued_part.parse().ok()?;

        if now.timestamp() - issued_at > self.max_age_secs {
            tracing::debug!(athlete_id, "Session token expired");
            return None;
        }

        Some(SessionClaims {
            athlete_id,
            issued_at,
        })
    }
}

/// On-disk holder for the current session token
#[derive(Debug, Clone)]
pub struct SessionStore {
    path: PathBuf,
}

impl SessionStore {
    /// Store the session file inside `data_dir`
    pub fn in_dir<P: AsRef<Path>>(data_dir: P) -> Self {
        SessionStore {
            path: data_dir.as_ref().join(SESSION_FILE_NAME),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn save(&self, token: &str) -> Result<(), SessionError> {
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent)?;
        }
        fs::write(&self.path, token)?;
        Ok(())
    }

    /// Stored token, `None` when no session file exists
    pub fn load(&self) -> Result<Option<String>, SessionError> {
        match fs::read_to_string(&self.path) {
            Ok(token) => {
                let token = token.trim().to_string();
                Ok((!token.is_empty()).then_some(token))
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    /// Remove the session file; returns whether one existed
    pub fn clear(&self) -> Result<bool, SessionError> {
        match fs::remove_file(&self.path) {
            Ok(()) => Ok(true),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(false),
            Err(e) => Err(e.into()),
        }
    }
}
