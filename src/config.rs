use std::env;
use std::time::Duration;

use crate::error::AppError;

#[derive(Debug, Clone)]
pub struct Config {
    pub http_port: u16,
    pub log_level: String,
    pub dispatch_queue_size: usize,
    pub event_buffer_size: usize,
    pub position_buffer_size: usize,
    pub dispatch: DispatchConfig,
    pub tracker: TrackerConfig,
}

/// Tunables for one matching attempt.
#[derive(Debug, Clone)]
pub struct DispatchConfig {
    /// How many candidates a session works through: one primary plus
    /// `selection_size - 1` backups.
    pub selection_size: usize,
    pub offer_timeout: Duration,
    pub directory_timeout: Duration,
    pub search_retry_backoff: Duration,
}

impl Default for DispatchConfig {
    fn default() -> Self {
        Self {
            selection_size: 3,
            offer_timeout: Duration::from_secs(180),
            directory_timeout: Duration::from_secs(5),
            search_retry_backoff: Duration::from_millis(500),
        }
    }
}

#[derive(Debug, Clone)]
pub struct TrackerConfig {
    pub staleness_window: Duration,
    pub arrival_threshold_km: f64,
    pub avg_speed_kmh: f64,
    pub reconnect_base: Duration,
    pub reconnect_max: Duration,
}

impl Default for TrackerConfig {
    fn default() -> Self {
        Self {
            staleness_window: Duration::from_secs(30),
            arrival_threshold_km: 0.1,
            avg_speed_kmh: 30.0,
            reconnect_base: Duration::from_secs(1),
            reconnect_max: Duration::from_secs(30),
        }
    }
}

impl Config {
    pub fn from_env() -> Result<Self, AppError> {
        let _ = dotenvy::dotenv();

        Ok(Self {
            http_port: parse_or_default("HTTP_PORT", 3000)?,
            log_level: env::var("LOG_LEVEL").unwrap_or_else(|_| "info".to_string()),
            dispatch_queue_size: parse_or_default("DISPATCH_QUEUE_SIZE", 1024)?,
            event_buffer_size: parse_or_default("EVENT_BUFFER_SIZE", 1024)?,
            position_buffer_size: parse_or_default("POSITION_BUFFER_SIZE", 1024)?,
            dispatch: DispatchConfig {
                selection_size: parse_or_default("DISPATCH_SELECTION_SIZE", 3)?,
                offer_timeout: Duration::from_secs(parse_or_default("OFFER_TIMEOUT_SECS", 180)?),
                directory_timeout: Duration::from_millis(parse_or_default(
                    "DIRECTORY_TIMEOUT_MS",
                    5_000,
                )?),
                search_retry_backoff: Duration::from_millis(parse_or_default(
                    "SEARCH_RETRY_BACKOFF_MS",
                    500,
                )?),
            },
            tracker: TrackerConfig {
                staleness_window: Duration::from_secs(parse_or_default(
                    "TRACK_STALENESS_SECS",
                    30,
                )?),
                arrival_threshold_km: parse_or_default("ARRIVAL_THRESHOLD_KM", 0.1)?,
                avg_speed_kmh: parse_or_default("AVG_SPEED_KMH", 30.0)?,
                reconnect_base: Duration::from_millis(parse_or_default(
                    "TRACK_RECONNECT_BASE_MS",
                    1_000,
                )?),
                reconnect_max: Duration::from_millis(parse_or_default(
                    "TRACK_RECONNECT_MAX_MS",
                    30_000,
                )?),
            },
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
