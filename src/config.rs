//! Runtime configuration from the environment (and an optional `.env` file).

use std::env;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::time::Duration;

use thiserror::Error;

use crate::ai;
use crate::autosave::DEFAULT_QUIET_PERIOD;
use crate::dispatch::DEFAULT_SEND_LATENCY;
use crate::session::DEFAULT_DEMO_PASSWORD;

const DEFAULT_DATA_DIR: &str = "surprise_sender_data";
const DEFAULT_ADDR: &str = "0.0.0.0:11111";
const DEV_JWT_SECRET: &str = "surprise_sender_dev_secret"; // override in any shared deployment

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("invalid value for {name}: '{value}'")]
    Invalid { name: &'static str, value: String },
}

#[derive(Debug, Clone)]
pub struct LogConfig {
    pub json: bool,
    pub dir: Option<PathBuf>,
}

#[derive(Debug, Clone)]
pub struct AiConfig {
    pub api_key: Option<String>,
    pub model: String,
    pub base_url: String,
}

#[derive(Debug, Clone)]
pub struct AppConfig {
    pub data_dir: String,
    pub addr: SocketAddr,
    pub jwt_secret: String,
    pub demo_password: String,
    pub send_latency: Duration,
    pub autosave_quiet_period: Duration,
    pub ai: AiConfig,
    pub log: LogConfig,
}

impl AppConfig {
    /// Load `.env` if present, then read the process environment.
    pub fn from_env() -> Result<Self, ConfigError> {
        let _ = dotenvy::dotenv();
        Self::from_lookup(|name| env::var(name).ok())
    }

    /// Build from any variable source. Unset and empty values fall back to defaults.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let get = |name: &str| lookup(name).filter(|v| !v.trim().is_empty());

        let addr_raw = get("SURPRISE_SENDER_ADDR").unwrap_or_else(|| DEFAULT_ADDR.to_string());
        let addr = addr_raw.parse().map_err(|_| ConfigError::Invalid {
            name: "SURPRISE_SENDER_ADDR",
            value: addr_raw.clone(),
        })?;

        Ok(Self {
            data_dir: get("SURPRISE_SENDER_DATA_DIR").unwrap_or_else(|| DEFAULT_DATA_DIR.to_string()),
            addr,
            jwt_secret: get("SURPRISE_SENDER_JWT_SECRET").unwrap_or_else(|| DEV_JWT_SECRET.to_string()),
            demo_password: get("SURPRISE_SENDER_DEMO_PASSWORD")
                .unwrap_or_else(|| DEFAULT_DEMO_PASSWORD.to_string()),
            send_latency: millis(
                "SURPRISE_SENDER_SEND_LATENCY_MS",
                get("SURPRISE_SENDER_SEND_LATENCY_MS"),
                DEFAULT_SEND_LATENCY,
            )?,
            autosave_quiet_period: millis(
                "SURPRISE_SENDER_AUTOSAVE_MS",
                get("SURPRISE_SENDER_AUTOSAVE_MS"),
                DEFAULT_QUIET_PERIOD,
            )?,
            ai: AiConfig {
                api_key: get("GEMINI_API_KEY").or_else(|| get("API_KEY")),
                model: get("GEMINI_MODEL").unwrap_or_else(|| ai::DEFAULT_MODEL.to_string()),
                base_url: get("GEMINI_BASE_URL").unwrap_or_else(|| ai::DEFAULT_BASE_URL.to_string()),
            },
            log: LogConfig {
                json: get("SURPRISE_SENDER_LOG_JSON")
                    .map(|v| matches!(v.to_ascii_lowercase().as_str(), "1" | "true" | "yes"))
                    .unwrap_or(false),
                dir: get("SURPRISE_SENDER_LOG_DIR").map(PathBuf::from),
            },
        })
    }
}

fn millis(name: &'static str, raw: Option<String>, default: Duration) -> Result<Duration, ConfigError> {
    match raw {
        Some(value) => value
            .trim()
            .parse::<u64>()
            .map(Duration::from_millis)
            .map_err(|_| ConfigError::Invalid { name, value }),
        None => Ok(default),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn config_from(pairs: &[(&str, &str)]) -> Result<AppConfig, ConfigError> {
        let vars: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        AppConfig::from_lookup(|name| vars.get(name).cloned())
    }

    #[test]
    fn test_defaults() {
        let config = config_from(&[]).unwrap();
        assert_eq!(config.data_dir, "surprise_sender_data");
        assert_eq!(config.addr.port(), 11111);
        assert_eq!(config.demo_password, "password");
        assert_eq!(config.send_latency, Duration::from_millis(2000));
        assert_eq!(config.autosave_quiet_period, Duration::from_millis(3500));
        assert!(config.ai.api_key.is_none());
        assert!(!config.log.json);
    }

    #[test]
    fn test_overrides_and_api_key_fallback() {
        let config = config_from(&[
            ("SURPRISE_SENDER_ADDR", "127.0.0.1:8080"),
            ("SURPRISE_SENDER_SEND_LATENCY_MS", "10"),
            ("API_KEY", "k-123"),
            ("SURPRISE_SENDER_LOG_JSON", "TRUE"),
        ])
        .unwrap();
        assert_eq!(config.addr.port(), 8080);
        assert_eq!(config.send_latency, Duration::from_millis(10));
        assert_eq!(config.ai.api_key.as_deref(), Some("k-123"));
        assert!(config.log.json);
    }

    #[test]
    fn test_invalid_values_are_rejected() {
        assert!(matches!(
            config_from(&[("SURPRISE_SENDER_ADDR", "nowhere")]),
            Err(ConfigError::Invalid { name: "SURPRISE_SENDER_ADDR", .. })
        ));
        assert!(matches!(
            config_from(&[("SURPRISE_SENDER_AUTOSAVE_MS", "soon")]),
            Err(ConfigError::Invalid { name: "SURPRISE_SENDER_AUTOSAVE_MS", .. })
        ));
    }
}
