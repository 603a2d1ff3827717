//! Runtime configuration from environment variables (optionally seeded from a `.env` file).

use std::num::{NonZeroU32, NonZeroUsize};
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;
use thiserror::Error;

use crate::client::InventorySettings;

pub const DEFAULT_SQLITE_PATH: &str = "middleware.db";
pub const DEFAULT_PUSH_INTERVAL_MS: u64 = 100;
pub const DEFAULT_MAX_REQUEST_RETRIES: u32 = 3;
pub const DEFAULT_MAX_PAGE_SIZE: u32 = 100;
pub const DEFAULT_MAX_PARALLEL_REQUESTS: usize = 30;
pub const DEFAULT_REQUEST_TIMEOUT_SECS: u64 = 15;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("missing environment variable {0}")]
    Missing(&'static str),
    #[error("invalid {var}={value:?}: {reason}")]
    Invalid {
        var: &'static str,
        value: String,
        reason: String,
    },
}

/// Base URL and credentials of one HTTP service.
#[derive(Clone)]
pub struct Endpoint {
    pub base_url: String,
    pub username: String,
    pub password: String,
}

impl std::fmt::Debug for Endpoint {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Endpoint")
            .field("base_url", &self.base_url)
            .field("username", &self.username)
            .field("password", &"<redacted>")
            .finish()
    }
}

#[derive(Debug, Clone)]
pub struct Config {
    /// Inventory API (`GWTDADOS_*`); only `sync` and `collect` need it.
    pub inventory: Option<Endpoint>,
    /// `GATEWAY_NAME`; `None` selects every gateway.
    pub gateway_name: Option<String>,
    pub sqlite_path: PathBuf,
    /// SCADA-LTS (`SCADALTS_*`); forwarding is off when unset.
    pub scada: Option<Endpoint>,
    pub scada_push_interval: Duration,
    pub max_request_retries: NonZeroU32,
    pub max_page_size: NonZeroU32,
    pub max_parallel_requests: NonZeroUsize,
    pub request_timeout: Duration,
    /// Visit only the first hardware unit and sensor of each level.
    pub debug: bool,
}

impl Config {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let get = |key: &str| lookup(key).map(|v| v.trim().to_string()).filter(|v| !v.is_empty());

        let endpoint = |host: &'static str, user: &'static str, pass: &'static str| -> Result<Option<Endpoint>, ConfigError> {
            let Some(base_url) = get(host) else {
                return Ok(None);
            };
            Ok(Some(Endpoint {
                base_url: base_url.trim_end_matches('/').to_string(),
                username: get(user).ok_or(ConfigError::Missing(user))?,
                password: lookup(pass).filter(|v| !v.is_empty()).ok_or(ConfigError::Missing(pass))?,
            }))
        };

        let inventory = endpoint("GWTDADOS_HOST", "GWTDADOS_USERNAME", "GWTDADOS_PASSWORD")?;
        let scada = endpoint("SCADALTS_HOST", "SCADALTS_USERNAME", "SCADALTS_PASSWORD")?;

        let gateway_name = get("GATEWAY_NAME").filter(|n| n != "*");
        let sqlite_path = PathBuf::from(get("SQLITE_MIDDLEWARE_PATH").unwrap_or_else(|| DEFAULT_SQLITE_PATH.to_string()));

        let push_ms: u64 = parse_or(&get, "SCADA_PUSH_INTERVAL_MS", DEFAULT_PUSH_INTERVAL_MS)?;
        let timeout_secs: u64 = parse_or(&get, "REQUEST_TIMEOUT_SECS", DEFAULT_REQUEST_TIMEOUT_SECS)?;
        if timeout_secs == 0 {
            return Err(ConfigError::Invalid {
                var: "REQUEST_TIMEOUT_SECS",
                value: "0".into(),
                reason: "must be at least 1".into(),
            });
        }

        let debug = match get("DEBUG") {
            None => false,
            Some(v) => parse_flag(&v).ok_or_else(|| ConfigError::Invalid {
                var: "DEBUG",
                value: v.clone(),
                reason: "expected true or false".into(),
            })?,
        };

        Ok(Config {
            inventory,
            gateway_name,
            sqlite_path,
            scada,
            scada_push_interval: Duration::from_millis(push_ms),
            max_request_retries: parse_or(&get, "MAX_REQUEST_RETRIES", nonzero_u32(DEFAULT_MAX_REQUEST_RETRIES))?,
            max_page_size: parse_or(&get, "MAX_PAGE_SIZE", nonzero_u32(DEFAULT_MAX_PAGE_SIZE))?,
            max_parallel_requests: parse_or(
                &get,
                "MAX_PARALLEL_REQUESTS",
                NonZeroUsize::new(DEFAULT_MAX_PARALLEL_REQUESTS).unwrap_or(NonZeroUsize::MIN),
            )?,
            request_timeout: Duration::from_secs(timeout_secs),
            debug,
        })
    }

    /// Settings for [`crate::client::InventoryClient::connect`]; fails when `GWTDADOS_HOST` is unset.
    pub fn inventory_settings(&self) -> Result<InventorySettings, ConfigError> {
        let endpoint = self.inventory.as_ref().ok_or(ConfigError::Missing("GWTDADOS_HOST"))?;
        Ok(InventorySettings {
            base_url: endpoint.base_url.clone(),
            username: endpoint.username.clone(),
            password: endpoint.password.clone(),
            timeout: self.request_timeout,
            max_attempts: self.max_request_retries,
        })
    }
}

fn nonzero_u32(n: u32) -> NonZeroU32 {
    NonZeroU32::new(n).unwrap_or(NonZeroU32::MIN)
}

fn parse_or<T>(get: &impl Fn(&str) -> Option<String>, var: &'static str, default: T) -> Result<T, ConfigError>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    match get(var) {
        None => Ok(default),
        Some(value) => value.parse::<T>().map_err(|e| ConfigError::Invalid {
            var,
            reason: e.to_string(),
            value,
        }),
    }
}

fn parse_flag(value: &str) -> Option<bool> {
    match value.to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Some(true),
        "0" | "false" | "no" | "off" => Some(false),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn config(vars: &[(&str, &str)]) -> Result<Config, ConfigError> {
        let env: HashMap<String, String> = vars.iter().map(|(k, v)| (k.to_string(), v.to_string())).collect();
        Config::from_lookup(|k| env.get(k).cloned())
    }

    #[test]
    fn defaults_apply_when_unset() {
        let cfg = config(&[]).unwrap();
        assert!(cfg.inventory.is_none());
        assert!(cfg.scada.is_none());
        assert_eq!(cfg.gateway_name, None);
        assert_eq!(cfg.sqlite_path, PathBuf::from("middleware.db"));
        assert_eq!(cfg.scada_push_interval, Duration::from_millis(100));
        assert_eq!(cfg.max_request_retries.get(), 3);
        assert_eq!(cfg.max_page_size.get(), 100);
        assert_eq!(cfg.max_parallel_requests.get(), 30);
        assert_eq!(cfg.request_timeout, Duration::from_secs(15));
        assert!(!cfg.debug);
        assert_eq!(cfg.inventory_settings().unwrap_err(), ConfigError::Missing("GWTDADOS_HOST"));
    }

    #[test]
    fn endpoints_need_credentials() {
        let cfg = config(&[
            ("GWTDADOS_HOST", "https://inventory.local/api/"),
            ("GWTDADOS_USERNAME", "etl"),
            ("GWTDADOS_PASSWORD", " secret "),
            ("GATEWAY_NAME", "*"),
            ("DEBUG", "TRUE"),
        ])
        .unwrap();
        let settings = cfg.inventory_settings().unwrap();
        assert_eq!(settings.base_url, "https://inventory.local/api");
        // passwords are taken verbatim
        assert_eq!(settings.password, " secret ");
        assert_eq!(cfg.gateway_name, None);
        assert!(cfg.debug);
        assert!(!format!("{:?}", cfg).contains("secret"));

        assert_eq!(
            config(&[("SCADALTS_HOST", "http://scada:8080")]).unwrap_err(),
            ConfigError::Missing("SCADALTS_USERNAME")
        );
    }

    #[test]
    fn bad_numbers_and_zero_counts_are_rejected() {
        assert!(matches!(
            config(&[("MAX_PAGE_SIZE", "lots")]),
            Err(ConfigError::Invalid { var: "MAX_PAGE_SIZE", .. })
        ));
        assert!(matches!(
            config(&[("MAX_PARALLEL_REQUESTS", "0")]),
            Err(ConfigError::Invalid {
                var: "MAX_PARALLEL_REQUESTS",
                ..
            })
        ));
        assert!(matches!(
            config(&[("REQUEST_TIMEOUT_SECS", "0")]),
            Err(ConfigError::Invalid { .. })
        ));
        assert!(matches!(config(&[("DEBUG", "maybe")]), Err(ConfigError::Invalid { var: "DEBUG", .. })));
        assert_eq!(config(&[("GATEWAY_NAME", " GW-07 ")]).unwrap().gateway_name.as_deref(), Some("GW-07"));
    }
}
