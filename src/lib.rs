// Library interface for RunBoard modules
// This allows integration tests and benches to access the core functionality

pub mod aggregation;
pub mod auth;
pub mod campaign;
pub mod config;
pub mod database;
pub mod error;
pub mod export;
pub mod leaderboard;
pub mod logging;
pub mod models;
pub mod projection;
pub mod session;
pub mod strava;
pub mod sync;

// Re-export commonly used types for convenience
pub use models::*;
pub use projection::{project, project_by_active_days, project_by_active_weeks, DensityStats, ProjectionUnit};
pub use leaderboard::{build_leaderboard, AthleteActivities, Leaderboard, LeaderboardOptions, LeaderboardRow};
pub use config::AppConfig;
pub use error::{RunBoardError, Result};
pub use logging::{LogConfig, LogLevel, LogFormat};
