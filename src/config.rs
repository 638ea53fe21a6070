//! Configuration types.

use std::path::PathBuf;
use std::time::Duration;

use secrecy::SecretString;

use crate::error::ConfigError;
use crate::wizard::controller::ControllerConfig;
use crate::wizard::fields::BlankPolicy;

/// Where finished applications are sent.
#[derive(Debug, Clone)]
pub enum GatewayConfig {
    /// Log the application and acknowledge after a simulated latency.
    Logging { latency: Duration },
    /// POST the application to an intake endpoint.
    Http {
        url: String,
        token: Option<SecretString>,
    },
}

/// Service configuration, built from environment variables.
#[derive(Debug, Clone)]
pub struct AppConfig {
    pub port: u16,
    pub controller: ControllerConfig,
    pub gateway: GatewayConfig,
    /// Allowed CORS origin for the landing page. `None` allows any origin.
    pub cors_origin: Option<String>,
    /// Directory for daily rolling log files, in addition to stderr.
    pub log_dir: Option<PathBuf>,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            port: 8080,
            controller: ControllerConfig::default(),
            gateway: GatewayConfig::Logging {
                latency: Duration::ZERO,
            },
            cors_origin: None,
            log_dir: None,
        }
    }
}

impl AppConfig {
    /// Build config from `CONCIERGE_*` environment variables.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build config from any key lookup. Unset keys fall back to defaults;
    /// set but unparseable keys are errors.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let defaults = Self::default();

        let port = parse_or(&lookup, "CONCIERGE_PORT", defaults.port)?;

        let teardown_ms: u64 = parse_or(
            &lookup,
            "CONCIERGE_TEARDOWN_DELAY_MS",
            defaults.controller.teardown_delay.as_millis() as u64,
        )?;

        let submit_timeout_secs: u64 = parse_or(
            &lookup,
            "CONCIERGE_SUBMIT_TIMEOUT_SECS",
            defaults.controller.submit_timeout.as_secs(),
        )?;
        if submit_timeout_secs == 0 {
            return Err(ConfigError::InvalidValue {
                key: "CONCIERGE_SUBMIT_TIMEOUT_SECS".into(),
                message: "must be greater than zero".into(),
            });
        }

        let blank_policy = match lookup("CONCIERGE_BLANK_POLICY") {
            Some(raw) => raw
                .parse::<BlankPolicy>()
                .map_err(|message| ConfigError::InvalidValue {
                    key: "CONCIERGE_BLANK_POLICY".into(),
                    message,
                })?,
            None => defaults.controller.blank_policy,
        };

        let gateway = match lookup("CONCIERGE_GATEWAY_URL").filter(|s| !s.trim().is_empty()) {
            Some(url) => GatewayConfig::Http {
                url,
                token: lookup("CONCIERGE_GATEWAY_TOKEN")
                    .filter(|s| !s.is_empty())
                    .map(SecretString::from),
            },
            None => GatewayConfig::Logging {
                latency: Duration::from_millis(parse_or(
                    &lookup,
                    "CONCIERGE_SIMULATED_LATENCY_MS",
                    0u64,
                )?),
            },
        };

        Ok(Self {
            port,
            controller: ControllerConfig {
                teardown_delay: Duration::from_millis(teardown_ms),
                submit_timeout: Duration::from_secs(submit_timeout_secs),
                blank_policy,
            },
            gateway,
            cors_origin: lookup("CONCIERGE_CORS_ORIGIN").filter(|s| !s.is_empty()),
            log_dir: lookup("CONCIERGE_LOG_DIR")
                .filter(|s| !s.is_empty())
                .map(PathBuf::from),
        })
    }
}

fn parse_or<T: std::str::FromStr>(
    lookup: &impl Fn(&str) -> Option<String>,
    key: &str,
    default: T,
) -> Result<T, ConfigError>
where
    T::Err: std::fmt::Display,
{
    match lookup(key) {
        Some(raw) => raw.trim().parse().map_err(|e: T::Err| ConfigError::InvalidValue {
            key: key.to_string(),
            message: e.to_string(),
        }),
        None => Ok(default),
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use secrecy::ExposeSecret;

    use super::*;

    fn from(pairs: &[(&str, &str)]) -> Result<AppConfig, ConfigError> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        AppConfig::from_lookup(|key| map.get(key).cloned())
    }

    #[test]
    fn defaults_when_nothing_set() {
        let config = from(&[]).unwrap();
        assert_eq!(config.port, 8080);
        assert_eq!(config.controller.teardown_delay, Duration::from_secs(3));
        assert_eq!(config.controller.submit_timeout, Duration::from_secs(30));
        assert_eq!(config.controller.blank_policy, BlankPolicy::Trim);
        assert!(matches!(
            config.gateway,
            GatewayConfig::Logging { latency } if latency.is_zero()
        ));
        assert!(config.cors_origin.is_none());
        assert!(config.log_dir.is_none());
    }

    #[test]
    fn reads_overrides() {
        let config = from(&[
            ("CONCIERGE_PORT", "9000"),
            ("CONCIERGE_TEARDOWN_DELAY_MS", "500"),
            ("CONCIERGE_SUBMIT_TIMEOUT_SECS", "10"),
            ("CONCIERGE_BLANK_POLICY", "literal"),
            ("CONCIERGE_SIMULATED_LATENCY_MS", "1200"),
            ("CONCIERGE_CORS_ORIGIN", "https://example.com"),
            ("CONCIERGE_LOG_DIR", "/var/log/concierge"),
        ])
        .unwrap();
        assert_eq!(config.port, 9000);
        assert_eq!(config.controller.teardown_delay, Duration::from_millis(500));
        assert_eq!(config.controller.submit_timeout, Duration::from_secs(10));
        assert_eq!(config.controller.blank_policy, BlankPolicy::Literal);
        assert!(matches!(
            config.gateway,
            GatewayConfig::Logging { latency } if latency == Duration::from_millis(1200)
        ));
        assert_eq!(config.cors_origin.as_deref(), Some("https://example.com"));
        assert_eq!(config.log_dir, Some(PathBuf::from("/var/log/concierge")));
    }

    #[test]
    fn gateway_url_selects_http() {
        let config = from(&[
            ("CONCIERGE_GATEWAY_URL", "https://intake.example.com/applications"),
            ("CONCIERGE_GATEWAY_TOKEN", "tok"),
        ])
        .unwrap();
        match config.gateway {
            GatewayConfig::Http { url, token } => {
                assert_eq!(url, "https://intake.example.com/applications");
                assert_eq!(token.unwrap().expose_secret(), "tok");
            }
            other => panic!("Expected Http gateway, got {other:?}"),
        }
    }

    #[test]
    fn bad_values_are_errors() {
        assert!(matches!(
            from(&[("CONCIERGE_PORT", "eighty")]),
            Err(ConfigError::InvalidValue { .. })
        ));
        assert!(matches!(
            from(&[("CONCIERGE_BLANK_POLICY", "sometimes")]),
            Err(ConfigError::InvalidValue { .. })
        ));
        assert!(matches!(
            from(&[("CONCIERGE_SUBMIT_TIMEOUT_SECS", "0")]),
            Err(ConfigError::InvalidValue { .. })
        ));
    }
}
