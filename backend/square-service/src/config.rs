//! Configuration management for Square Service
//!
//! Loads configuration from environment variables with per-field defaults.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    pub app: AppConfig,
    pub database: DatabaseConfig,
    pub square: SquareConfig,
}

/// Application settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    pub env: String,
    pub host: String,
    pub port: u16,
    pub log_level: String,
}

/// Database configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatabaseConfig {
    pub url: String,
    pub max_connections: u32,
}

/// Stream assembly configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SquareConfig {
    /// Upper bound on candidate rows fetched from the store per subtype query.
    #[serde(default = "default_candidate_window")]
    pub candidate_window: i64,
}

impl Default for SquareConfig {
    fn default() -> Self {
        Self {
            candidate_window: default_candidate_window(),
        }
    }
}

impl Config {
    pub fn from_env() -> Result<Self, Box<dyn std::error::Error>> {
        Ok(Config {
            app: AppConfig {
                env: std::env::var("APP_ENV").unwrap_or_else(|_| "development".to_string()),
                host: std::env::var("APP_HOST").unwrap_or_else(|_| "0.0.0.0".to_string()),
                port: std::env::var("APP_PORT")
                    .unwrap_or_else(|_| "8000".to_string())
                    .parse()?,
                log_level: std::env::var("LOG_LEVEL").unwrap_or_else(|_| "info".to_string()),
            },
            database: DatabaseConfig {
                url: std::env::var("DATABASE_URL")?,
                max_connections: std::env::var("DATABASE_MAX_CONNECTIONS")
                    .unwrap_or_else(|_| "10".to_string())
                    .parse()?,
            },
            square: SquareConfig {
                candidate_window: std::env::var("SQUARE_CANDIDATE_WINDOW")
                    .ok()
                    .and_then(|v| v.parse().ok())
                    .unwrap_or_else(default_candidate_window),
            },
        })
    }
}

fn default_candidate_window() -> i64 {
    200
}
