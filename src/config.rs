use std::env;

use crate::error::AppError;

#[derive(Debug, Clone)]
pub struct Config {
    pub http_port: u16,
    pub log_level: String,
    /// The signed-in rider this session serves.
    pub rider_id: String,
    pub rider_email: Option<String>,
    /// Optional JSON file of documents to load into the store at startup.
    pub seed_file: Option<String>,
}

impl Config {
    pub fn from_env() -> Result<Self, AppError> {
        let _ = dotenvy::dotenv();

        Ok(Self {
            http_port: parse_or_default("HTTP_PORT", 3000)?,
            log_level: env::var("LOG_LEVEL").unwrap_or_else(|_| "info".to_string()),
            rider_id: env::var("RIDER_ID")
                .map_err(|_| AppError::Internal("RIDER_ID must be set".to_string()))?,
            rider_email: env::var("RIDER_EMAIL").ok(),
            seed_file: env::var("SEED_FILE").ok(),
        })
    }
}

fn parse_or_default<T>(key: &str, default: T) -> Result<T, AppError>
where
    T: std::str::FromStr,
    T::Err: std::fmt::Display,
{
    match env::var(key) {
        Ok(raw) => raw
            .parse::<T>()
            .map_err(|err| AppError::Internal(format!("invalid {key}: {err}"))),
        Err(_) => Ok(default),
    }
}
