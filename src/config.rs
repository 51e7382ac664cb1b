// src/config.rs

use std::{env, fmt};

use dotenvy::dotenv;

/// Achievable marks for an exam created without an explicit `total_score`.
pub const DEFAULT_TOTAL_SCORE: i64 = 10;

/// Exams created without a window open this many minutes in the past...
pub const DEFAULT_WINDOW_LEAD_MINUTES: i64 = 5;

/// ...and stay open this many days.
pub const DEFAULT_WINDOW_DAYS: i64 = 7;

/// Assessment type label that feeds the terminal-exam slot of a report card.
pub const EXAM_ASSESSMENT_TYPE: &str = "exam";

#[derive(Debug, Clone)]
pub struct Config {
    pub database_url: String,
    pub jwt_secret: String,
    pub jwt_expiration: u64,
    pub rust_log: String,
    pub bind_addr: String,
    /// Seconds past an attempt's deadline during which answers are still accepted.
    pub attempt_grace_seconds: i64,
}

#[derive(Debug)]
pub enum ConfigError {
    Missing(&'static str),
    Invalid(&'static str, String),
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConfigError::Missing(key) => write!(f, "{} must be set", key),
            ConfigError::Invalid(key, value) => write!(f, "{} has an invalid value: {}", key, value),
        }
    }
}

impl std::error::Error for ConfigError {}

impl Config {
    pub fn from_env() -> Result<Self, ConfigError> {
        dotenv().ok();

        let database_url =
            env::var("DATABASE_URL").map_err(|_| ConfigError::Missing("DATABASE_URL"))?;

        let jwt_secret = env::var("JWT_SECRET").map_err(|_| ConfigError::Missing("JWT_SECRET"))?;

        let jwt_expiration = parse_or("JWT_EXPIRATION", 86_400)?;

        let rust_log = env::var("RUST_LOG").unwrap_or_else(|_| "info".to_string());

        let bind_addr = env::var("BIND_ADDR").unwrap_or_else(|_| "0.0.0.0:3000".to_string());

        let attempt_grace_seconds = parse_or("ATTEMPT_GRACE_SECONDS", 30)?;

        Ok(Self {
            database_url,
            jwt_secret,
            jwt_expiration,
            rust_log,
            bind_addr,
            attempt_grace_seconds,
        })
    }
}

fn parse_or<T: std::str::FromStr>(key: &'static str, default: T) -> Result<T, ConfigError> {
    match env::var(key) {
        Ok(raw) => raw
            .trim()
            .parse()
            .map_err(|_| ConfigError::Invalid(key, raw)),
        Err(_) => Ok(default),
    }
}
