//! Unified error hierarchy for RunBoard
//!
//! Each subsystem keeps its own error enum; `RunBoardError` wraps them and
//! adds the authorization outcomes shared by the command layer.

use thiserror::Error;

use crate::database::DatabaseError;
use crate::export::ExportError;
use crate::session::SessionError;
use crate::strava::StravaError;

/// Top-level error type for all RunBoard operations
#[derive(Debug, Error)]
pub enum RunBoardError {
    /// Strava API errors
    #[error("Strava error: {0}")]
    Strava(#[from] StravaError),

    /// Database operation errors
    #[error("Database error: {0}")]
    Database(#[from] DatabaseError),

    /// Session token storage errors
    #[error("Session error: {0}")]
    Session(#[from] SessionError),

    /// Export errors
    #[error("Export error: {0}")]
    Export(#[from] ExportError),

    /// Configuration errors
    #[error("Configuration error: {0}")]
    Configuration(String),

    /// No valid session or Strava rejected the credentials
    #[error("Unauthorized: {0}")]
    Unauthorized(String),

    /// Authenticated but not allowed
    #[error("Forbidden: {0}")]
    Forbidden(String),

    /// Athlete is not a member of the required club
    #[error("Athlete is not a member of club {club_id}")]
    NotInClub { club_id: i64 },

    /// IO errors
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Generic internal error
    #[error("Internal error: {0}")]
    Internal(String),
}

/// Result type alias for RunBoard operations
pub type Result<T> = std::result::Result<T, RunBoardError>;

impl RunBoardError {
    /// Check if error is retryable
    pub fn is_retryable(&self) -> bool {
        match self {
            RunBoardError::Strava(StravaError::Request(e)) => e.is_timeout() || e.is_connect(),
            RunBoardError::Strava(StravaError::Api { status, .. }) => {
                *status == 429 || *status >= 500
            }
            RunBoardError::Io(_) => true,
            _ => false,
        }
    }

    /// HTTP-style status for authorization outcomes
    pub fn status_code(&self) -> Option<u16> {
        match self {
            RunBoardError::Unauthorized(_) => Some(401),
            RunBoardError::Forbidden(_) | RunBoardError::NotInClub { .. } => Some(403),
            RunBoardError::Strava(e) => e.status(),
            _ => None,
        }
    }

    /// Get error severity level
    pub fn severity(&self) -> ErrorSeverity {
        match self {
            RunBoardError::Unauthorized(_) => ErrorSeverity::Warning,
            RunBoardError::Forbidden(_) => ErrorSeverity::Warning,
            RunBoardError::NotInClub { .. } => ErrorSeverity::Warning,
            RunBoardError::Database(DatabaseError::NotFound(_)) => ErrorSeverity::Warning,
            RunBoardError::Configuration(_) => ErrorSeverity::Error,
            RunBoardError::Database(_) => ErrorSeverity::Error,
            RunBoardError::Internal(_) => ErrorSeverity::Critical,
            _ => ErrorSeverity::Error,
        }
    }

    /// Log the error at the level its severity calls for
    pub fn log(&self) {
        let level = self.severity().to_tracing_level();
        if level == tracing::Level::ERROR {
            tracing::error!(error = %self, retryable = self.is_retryable(), "Command failed");
        } else {
            tracing::warn!(error = %self, retryable = self.is_retryable(), "Command failed");
        }
    }

    /// Get user-friendly error message
    pub fn user_message(&self) -> String {
        match self {
            RunBoardError::Unauthorized(_)
            | RunBoardError::Strava(StravaError::NotAuthenticated)
            | RunBoardError::Session(SessionError::MissingSecret) => {
                "You are not logged in. Run `runboard login` to connect your Strava account."
                    .to_string()
            }
            RunBoardError::NotInClub { club_id } => {
                format!("Your Strava account is not a member of club {}.", club_id)
            }
            RunBoardError::Strava(StravaError::Api { status: 429, .. }) => {
                "Strava rate limit reached. Please try again in a few minutes.".to_string()
            }
            RunBoardError::Strava(StravaError::MissingConfig(key)) => {
                format!("Strava is not configured: set {} or run `runboard config --init`.", key)
            }
            RunBoardError::Configuration(reason) => {
                format!("Configuration problem: {}", reason)
            }
            _ => self.to_string(),
        }
    }
}

/// Error severity levels
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorSeverity {
    /// Critical system error requiring immediate attention
    Critical,
    /// Error that prevents operation but system can continue
    Error,
    /// Warning that doesn't prevent operation
    Warning,
}

impl ErrorSeverity {
    /// Convert to tracing level
    pub fn to_tracing_level(&self) -> tracing::Level {
        match self {
            ErrorSeverity::Critical => tracing::Level::ERROR,
            ErrorSeverity::Error => tracing::Level::ERROR,
            ErrorSeverity::Warning => tracing::Level::WARN,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_severity() {
        let err = RunBoardError::NotInClub { club_id: 1 };
        assert_eq!(err.severity(), ErrorSeverity::Warning);

        let err = RunBoardError::Internal("test".to_string());
        assert_eq!(err.severity(), ErrorSeverity::Critical);
        assert_eq!(err.severity().to_tracing_level(), tracing::Level::ERROR);

        let err = RunBoardError::Forbidden("could not verify club membership".to_string());
        assert_eq!(err.severity().to_tracing_level(), tracing::Level::WARN);

        let err = RunBoardError::Configuration("Strava client id is not set".to_string());
        assert_eq!(err.severity().to_tracing_level(), tracing::Level::ERROR);
        assert_eq!(
            err.user_message(),
            "Configuration problem: Strava client id is not set"
        );
    }

    #[test]
    fn test_error_retryable() {
        let err = RunBoardError::Strava(StravaError::Api {
            status: 503,
            body: String::new(),
        });
        assert!(err.is_retryable());

        let err = RunBoardError::Strava(StravaError::Api {
            status: 404,
            body: String::new(),
        });
        assert!(!err.is_retryable());

        assert!(!RunBoardError::Unauthorized("no session".to_string()).is_retryable());
    }

    #[test]
    fn test_status_codes() {
        assert_eq!(RunBoardError::Unauthorized("x".into()).status_code(), Some(401));
        assert_eq!(RunBoardError::Forbidden("x".into()).status_code(), Some(403));
        assert_eq!(RunBoardError::NotInClub { club_id: 9 }.status_code(), Some(403));
        assert_eq!(
            RunBoardError::from(StravaError::NotAuthenticated).status_code(),
            Some(401)
        );
        assert_eq!(RunBoardError::Internal("x".into()).status_code(), None);
    }

    #[test]
    fn test_user_messages() {
        let err = RunBoardError::NotInClub { club_id: 4242 };
        assert!(err.user_message().contains("club 4242"));

        let err = RunBoardError::Unauthorized("session expired".to_string());
        assert!(err.user_message().contains("runboard login"));

        let err = RunBoardError::from(ExportError::UnsupportedFormat("xlsx".to_string()));
        assert_eq!(err.user_message(), "Export error: Unsupported format: xlsx");
    }
}
