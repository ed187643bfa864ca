//! Application configuration loading from TOML.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Application configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    /// Application version
    pub version: String,
    /// Data directory path
    #[serde(skip)]
    pub data_dir: PathBuf,
    /// Database file name, relative to the data directory
    pub database_file: String,
    /// Event dispatcher settings
    pub dispatcher: DispatcherSettings,
    /// Scheduled job settings
    pub jobs: JobSettings,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            version: env!("CARGO_PKG_VERSION").to_string(),
            data_dir: PathBuf::new(),
            database_file: "runtrack.db".to_string(),
            dispatcher: DispatcherSettings::default(),
            jobs: JobSettings::default(),
        }
    }
}

impl AppConfig {
    /// Full path to the database file.
    pub fn database_path(&self) -> PathBuf {
        self.data_dir.join(&self.database_file)
    }
}

/// Event dispatcher settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DispatcherSettings {
    /// Number of worker tasks (clamped to 2-5 at startup)
    pub workers: usize,
    /// Pending task queue capacity; a full queue blocks the producer
    pub queue_capacity: usize,
    /// Maximum handler attempts for transient failures
    pub retry_attempts: u32,
    /// Delay between retry attempts in milliseconds
    pub retry_delay_ms: u64,
    /// Outbox poll interval in milliseconds (fallback when no nudge arrives)
    pub poll_interval_ms: u64,
}

impl Default for DispatcherSettings {
    fn default() -> Self {
        Self {
            workers: 2,
            queue_capacity: 100,
            retry_attempts: 3,
            retry_delay_ms: 1000,
            poll_interval_ms: 500,
        }
    }
}

/// Scheduled job settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JobSettings {
    /// Hour of the daily challenge expiry run
    pub expiry_hour: u32,
    /// Minute of the daily challenge expiry run
    pub expiry_minute: u32,
    /// Hour of the weekly stats rollover run (Mondays)
    pub rollover_hour: u32,
    /// Minute of the weekly stats rollover run (Mondays)
    pub rollover_minute: u32,
}

impl Default for JobSettings {
    fn default() -> Self {
        // Off-peak times: expiry daily at 00:05, rollover Mondays at 00:30
        Self {
            expiry_hour: 0,
            expiry_minute: 5,
            rollover_hour: 0,
            rollover_minute: 30,
        }
    }
}

/// Get the application data directory.
pub fn get_data_dir() -> PathBuf {
    directories::ProjectDirs::from("com", "runtrack", "RunTrack")
        .map(|dirs| dirs.data_dir().to_path_buf())
        .unwrap_or_else(|| PathBuf::from("."))
}

/// Get the configuration file path.
pub fn get_config_path() -> PathBuf {
    get_data_dir().join("config.toml")
}

/// Load application configuration from file.
pub fn load_config() -> Result<AppConfig, ConfigError> {
    let path = get_config_path();

    if !path.exists() {
        let config = AppConfig {
            data_dir: get_data_dir(),
            ..Default::default()
        };
        return Ok(config);
    }

    let content = std::fs::read_to_string(&path).map_err(|e| ConfigError::IoError(e.to_string()))?;

    let mut config: AppConfig =
        toml::from_str(&content).map_err(|e| ConfigError::ParseError(e.to_string()))?;

    config.data_dir = get_data_dir();

    Ok(config)
}

/// Save application configuration to file.
pub fn save_config(config: &AppConfig) -> Result<(), ConfigError> {
    let path = get_config_path();

    // Ensure parent directory exists
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent).map_err(|e| ConfigError::IoError(e.to_string()))?;
    }

    let content =
        toml::to_string_pretty(config).map_err(|e| ConfigError::SerializeError(e.to_string()))?;

    std::fs::write(&path, content).map_err(|e| ConfigError::IoError(e.to_string()))?;

    Ok(())
}

/// Configuration errors.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    IoError(String),

    #[error("Parse error: {0}")]
    ParseError(String),

    #[error("Serialize error: {0}")]
    SerializeError(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_dispatcher_settings() {
        let settings = DispatcherSettings::default();
        assert_eq!(settings.workers, 2);
        assert_eq!(settings.queue_capacity, 100);
        assert_eq!(settings.retry_attempts, 3);
        assert_eq!(settings.retry_delay_ms, 1000);
    }

    #[test]
    fn test_config_round_trip() {
        let config = AppConfig::default();
        let toml = toml::to_string_pretty(&config).unwrap();
        let parsed: AppConfig = toml::from_str(&toml).unwrap();
        assert_eq!(parsed.dispatcher.queue_capacity, config.dispatcher.queue_capacity);
        assert_eq!(parsed.jobs.expiry_minute, 5);
    }
}
