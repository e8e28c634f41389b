//! Engine configuration loading and defaults.
//!
//! Every threshold and timeout the detectors consume lives here, in one
//! immutable struct with explicit defaults. Nothing inside detector logic
//! is allowed to hard-code a tunable.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Complete configuration surface for the detection engine.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EngineConfig {
    /// Trip is considered stale after this many seconds without a reading
    pub trip_timeout_secs: u32,
    /// Charging session is considered stale after this many seconds without a reading
    pub charging_timeout_secs: u32,
    /// Speed at or below this (km/h) counts as stationary
    pub stationary_epsilon_kmh: f64,
    /// Stationary-and-quiet period (seconds) that closes a trip normally
    pub stationary_dwell_secs: u32,
    /// Smoothed fuel-level rise (percent) below which changes are sensor noise
    pub fuel_noise_threshold_pct: f64,
    /// SOC change (percent) below which changes are sensor noise
    pub soc_noise_threshold_pct: f64,
    /// Smoothed fuel-level decline per reading (percent) that marks the engine as burning gas
    pub gas_burn_threshold_pct: f64,
    /// Consecutive readings required before committing a propulsion-mode switch
    pub mode_dwell_count: u32,
    /// Consecutive rising-SOC readings required before opening a charging session
    pub charge_trend_count: u32,
    /// SOC plateau longer than this (seconds) ends a charging session
    pub charge_grace_secs: u32,
    /// Sweep period for the staleness reconciler (seconds)
    pub sweep_interval_secs: u32,
    /// Usable battery pack capacity in kWh (SOC percent -> energy)
    pub pack_capacity_kwh: f64,
    /// Fuel tank capacity in gallons (fuel percent -> volume)
    pub tank_capacity_gal: f64,
    /// Window size for fuel-level smoothing (readings)
    pub fuel_smoothing_window: usize,
    /// Enrichment collaborator settings
    pub enrichment: EnrichmentSettings,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            trip_timeout_secs: 600,
            charging_timeout_secs: 1800,
            stationary_epsilon_kmh: 1.0,
            stationary_dwell_secs: 300,
            fuel_noise_threshold_pct: 2.0,
            soc_noise_threshold_pct: 1.0,
            gas_burn_threshold_pct: 0.15,
            mode_dwell_count: 3,
            charge_trend_count: 3,
            charge_grace_secs: 300,
            sweep_interval_secs: 60,
            pack_capacity_kwh: 16.0,
            tank_capacity_gal: 9.3,
            fuel_smoothing_window: 5,
            enrichment: EnrichmentSettings::default(),
        }
    }
}

/// Settings for the external weather/elevation collaborators.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EnrichmentSettings {
    /// Whether enrichment is attempted at all
    pub enabled: bool,
    /// Attempts per call before giving up
    pub max_retries: u32,
    /// Delay between attempts in milliseconds
    pub backoff_ms: u64,
    /// Hard cap on a single enrichment call in seconds
    pub timeout_secs: u64,
    /// Weather archive endpoint
    pub weather_url: String,
    /// Elevation lookup endpoint
    pub elevation_url: String,
}

impl Default for EnrichmentSettings {
    fn default() -> Self {
        Self {
            enabled: true,
            max_retries: 3,
            backoff_ms: 500,
            timeout_secs: 10,
            weather_url: "https://archive-api.open-meteo.com/v1/archive".to_string(),
            elevation_url: "https://api.open-elevation.com/api/v1/lookup".to_string(),
        }
    }
}

/// Get the application data directory.
pub fn get_data_dir() -> PathBuf {
    directories::ProjectDirs::from("com", "voltrace", "Voltrace")
        .map(|dirs| dirs.data_dir().to_path_buf())
        .unwrap_or_else(|| PathBuf::from("."))
}

/// Get the configuration file path.
pub fn get_config_path() -> PathBuf {
    get_data_dir().join("config.toml")
}

/// Load engine configuration from file, falling back to defaults when absent.
pub fn load_config() -> Result<EngineConfig, ConfigError> {
    let path = get_config_path();

    if !path.exists() {
        return Ok(EngineConfig::default());
    }

    let content = std::fs::read_to_string(&path).map_err(|e| ConfigError::IoError(e.to_string()))?;

    let config: EngineConfig =
        toml::from_str(&content).map_err(|e| ConfigError::ParseError(e.to_string()))?;

    Ok(config)
}

/// Save engine configuration to file.
pub fn save_config(config: &EngineConfig) -> Result<(), ConfigError> {
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
