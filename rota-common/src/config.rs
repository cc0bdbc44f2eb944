//! Configuration loading
//!
//! Resolution order, highest priority first:
//! 1. Command-line argument (applied by the binary)
//! 2. Environment variable (`ROTA_*`)
//! 3. TOML config file
//! 4. Compiled default
//!
//! A missing or unreadable config file is not fatal: a warning is logged and
//! the remaining tiers apply.

use crate::{Error, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{info, warn};

/// Hour cap handed to the solver for volunteers without one
pub const DEFAULT_UNLIMITED_HOURS: f64 = 999.0;

/// Service configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RotaConfig {
    /// SQLite database file
    pub database_path: PathBuf,
    /// HTTP listen address
    pub bind_address: String,
    /// Scheduling solver endpoint (POST)
    pub solver_url: String,
    /// Bearer token for the solver, if it requires one
    pub solver_api_key: Option<String>,
    pub solver_timeout_secs: u64,
    /// Stand-in for "no hour cap" in solver requests
    pub unlimited_hours_sentinel: f64,
    /// Delay before a finished kiosk screen resets to search
    pub kiosk_reset_secs: u64,
    pub kiosk_search_limit: usize,
    /// Quiet period before the live view refreshes after store changes
    pub live_debounce_ms: u64,
    /// Minutes after shift start before an absent volunteer counts as late
    pub late_grace_minutes: i64,
    /// Back-to-back allowance: a shift ending this close before excuses lateness
    pub late_leeway_minutes: i64,
}

impl Default for RotaConfig {
    fn default() -> Self {
        Self {
            database_path: default_database_path(),
            bind_address: "127.0.0.1:5810".to_string(),
            solver_url: "http://127.0.0.1:8000/api/schedule".to_string(),
            solver_api_key: None,
            solver_timeout_secs: 30,
            unlimited_hours_sentinel: DEFAULT_UNLIMITED_HOURS,
            kiosk_reset_secs: 3,
            kiosk_search_limit: 20,
            live_debounce_ms: 500,
            late_grace_minutes: 5,
            late_leeway_minutes: 15,
        }
    }
}

impl RotaConfig {
    /// Parse a TOML document; absent keys keep their defaults
    pub fn from_toml_str(content: &str) -> Result<Self> {
        toml::from_str(content).map_err(|e| Error::Config(format!("Invalid config TOML: {}", e)))
    }

    /// Load a TOML config file
    pub fn load_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        Self::from_toml_str(&content)
    }

    /// Resolve configuration from file (explicit path or platform default) and environment
    pub fn resolve(explicit_file: Option<&Path>) -> Result<Self> {
        let file = explicit_file.map(Path::to_path_buf).or_else(default_config_file);

        let mut config = match file {
            Some(path) if path.exists() => {
                info!("Loading config file: {}", path.display());
                Self::load_file(&path)?
            }
            Some(path) => {
                if explicit_file.is_some() {
                    return Err(Error::Config(format!(
                        "Config file not found: {}",
                        path.display()
                    )));
                }
                Self::default()
            }
            None => {
                warn!("No config file found, using compiled defaults");
                Self::default()
            }
        };

        config.apply_env()?;
        config.validate()?;
        Ok(config)
    }

    /// Override fields from `ROTA_*` environment variables
    pub fn apply_env(&mut self) -> Result<()> {
        if let Ok(v) = std::env::var("ROTA_DATABASE_PATH") {
            self.database_path = PathBuf::from(v);
        }
        if let Ok(v) = std::env::var("ROTA_BIND_ADDRESS") {
            self.bind_address = v;
        }
        if let Ok(v) = std::env::var("ROTA_SOLVER_URL") {
            self.solver_url = v;
        }
        if let Ok(v) = std::env::var("ROTA_SOLVER_API_KEY") {
            if !v.trim().is_empty() {
                self.solver_api_key = Some(v);
            }
        }
        if let Ok(v) = std::env::var("ROTA_SOLVER_TIMEOUT_SECS") {
            self.solver_timeout_secs = v.parse().map_err(|_| {
                Error::Config(format!("ROTA_SOLVER_TIMEOUT_SECS is not a number: {}", v))
            })?;
        }
        Ok(())
    }

    pub fn validate(&self) -> Result<()> {
        if self.solver_timeout_secs == 0 {
            return Err(Error::Config("solver_timeout_secs must be positive".to_string()));
        }
        if self.kiosk_search_limit == 0 {
            return Err(Error::Config("kiosk_search_limit must be positive".to_string()));
        }
        if self.unlimited_hours_sentinel.is_nan() || self.unlimited_hours_sentinel <= 0.0 {
            return Err(Error::Config(
                "unlimited_hours_sentinel must be a positive number".to_string(),
            ));
        }
        Ok(())
    }

    pub fn solver_timeout(&self) -> Duration {
        Duration::from_secs(self.solver_timeout_secs)
    }

    pub fn kiosk_reset_delay(&self) -> Duration {
        Duration::from_secs(self.kiosk_reset_secs)
    }

    pub fn live_debounce(&self) -> Duration {
        Duration::from_millis(self.live_debounce_ms)
    }
}

/// Platform config file location, if one exists
fn default_config_file() -> Option<PathBuf> {
    let user_config = dirs::config_dir().map(|d| d.join("rota").join("config.toml"));
    if let Some(path) = user_config {
        if path.exists() {
            return Some(path);
        }
    }
    let system_config = PathBuf::from("/etc/rota/config.toml");
    if cfg!(unix) && system_config.exists() {
        return Some(system_config);
    }
    None
}

/// OS-dependent default database location
fn default_database_path() -> PathBuf {
    dirs::data_local_dir()
        .map(|d| d.join("rota"))
        .unwrap_or_else(|| PathBuf::from("./rota_data"))
        .join("rota.db")
}
