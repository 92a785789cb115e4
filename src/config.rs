use std::env;
use std::fs;
use std::path::Path;

use serde::Deserialize;

const DEFAULT_LISTEN_ADDR: &str = "0.0.0.0:3001";
const DEFAULT_RETENTION_DAYS: i64 = 30;
const DEFAULT_SWEEP_INTERVAL_HOURS: u64 = 24;
const DEFAULT_CERT_EXPIRY_THRESHOLD_DAYS: i64 = 14;

#[derive(Clone, Debug)]
pub struct ServerConfig {
    pub listen_addr: String,
    /// Status history older than this many days is pruned.
    pub retention_days: i64,
    pub sweep_interval_hours: u64,
    /// `notifyCertExpiry` reports DOWN when the certificate expires within
    /// this many days.
    pub cert_expiry_threshold_days: i64,
}

impl ServerConfig {
    /// Loads configuration by layering sources: file -> environment
    /// variables. Environment variables have the highest priority.
    pub fn load(config_path: Option<&str>) -> Result<Self, String> {
        let mut file_config: PartialServerConfig = if let Some(path_str) = config_path {
            let path = Path::new(path_str);
            let contents = fs::read_to_string(path)
                .map_err(|e| format!("Failed to read config file at {path:?}: {e}"))?;
            toml::from_str(&contents)
                .map_err(|e| format!("Failed to parse TOML from config file at {path:?}: {e}"))?
        } else {
            PartialServerConfig::default()
        };

        if let Ok(val) = env::var("LISTEN_ADDR") {
            file_config.listen_addr = Some(val);
        }
        if let Ok(val) = env::var("RETENTION_DAYS") {
            let parsed = val
                .parse()
                .map_err(|e| format!("Invalid RETENTION_DAYS: {e}"))?;
            file_config.retention_days = Some(parsed);
        }
        if let Ok(val) = env::var("SWEEP_INTERVAL_HOURS") {
            let parsed = val
                .parse()
                .map_err(|e| format!("Invalid SWEEP_INTERVAL_HOURS: {e}"))?;
            file_config.sweep_interval_hours = Some(parsed);
        }
        if let Ok(val) = env::var("CERT_EXPIRY_THRESHOLD_DAYS") {
            let parsed = val
                .parse()
                .map_err(|e| format!("Invalid CERT_EXPIRY_THRESHOLD_DAYS: {e}"))?;
            file_config.cert_expiry_threshold_days = Some(parsed);
        }

        Ok(file_config.into())
    }
}

#[derive(Deserialize, Default)]
struct PartialServerConfig {
    listen_addr: Option<String>,
    retention_days: Option<i64>,
    sweep_interval_hours: Option<u64>,
    cert_expiry_threshold_days: Option<i64>,
}

impl From<PartialServerConfig> for ServerConfig {
    fn from(partial: PartialServerConfig) -> Self {
        ServerConfig {
            listen_addr: partial
                .listen_addr
                .unwrap_or_else(|| DEFAULT_LISTEN_ADDR.to_string()),
            retention_days: partial.retention_days.unwrap_or(DEFAULT_RETENTION_DAYS),
            sweep_interval_hours: partial
                .sweep_interval_hours
                .unwrap_or(DEFAULT_SWEEP_INTERVAL_HOURS),
            cert_expiry_threshold_days: partial
                .cert_expiry_threshold_days
                .unwrap_or(DEFAULT_CERT_EXPIRY_THRESHOLD_DAYS),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_apply_without_a_file() {
        let config = ServerConfig::load(None).unwrap();
        assert_eq!(config.retention_days, DEFAULT_RETENTION_DAYS);
        assert_eq!(config.cert_expiry_threshold_days, 14);
    }
}
