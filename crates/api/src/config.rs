use std::str::FromStr;
use std::time::Duration;

use fetchline_core::delivery::PUSH_TIMEOUT_SECS;

/// Configuration error raised at startup.
#[derive(Debug, thiserror::Error)]
#[error("{key} must be a valid {expected}, got '{value}'")]
pub struct ConfigError {
    pub key: &'static str,
    pub value: String,
    pub expected: &'static str,
}

/// Server configuration loaded from environment variables.
///
/// All fields have defaults suitable for local development.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    /// Allowed CORS origins, from comma-separated `CORS_ORIGINS`.
    pub cors_origins: Vec<String>,
    pub request_timeout_secs: u64,
    /// How long to wait for background tasks after the listener stops.
    pub shutdown_timeout_secs: u64,
    /// Push sessions fall back to polling after this long.
    pub push_timeout_secs: u64,
    /// Jobs are removed this long after creation.
    pub job_retention_secs: u64,
    pub retention_sweep_interval_secs: u64,
    /// Prefix for signed artifact URLs.
    pub artifact_base_url: String,
    pub artifact_signing_secret: String,
    pub artifact_url_ttl_secs: u64,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".into(),
            port: 3000,
            cors_origins: vec!["http://localhost:5173".into()],
            request_timeout_secs: 30,
            shutdown_timeout_secs: 30,
            push_timeout_secs: PUSH_TIMEOUT_SECS,
            job_retention_secs: 3600,
            retention_sweep_interval_secs: 60,
            artifact_base_url: "https://downloads.example.com".into(),
            artifact_signing_secret: "dev-secret".into(),
            artifact_url_ttl_secs: 900,
        }
    }
}

impl ServerConfig {
    /// Load configuration from environment variables with defaults.
    ///
    /// | Env Var                         | Default                          |
    /// |---------------------------------|----------------------------------|
    /// | `HOST`                          | `0.0.0.0`                        |
    /// | `PORT`                          | `3000`                           |
    /// | `CORS_ORIGINS`                  | `http://localhost:5173`          |
    /// | `REQUEST_TIMEOUT_SECS`          | `30`                             |
    /// | `SHUTDOWN_TIMEOUT_SECS`         | `30`                             |
    /// | `PUSH_TIMEOUT_SECS`             | `90`                             |
    /// | `JOB_RETENTION_SECS`            | `3600`                           |
    /// | `RETENTION_SWEEP_INTERVAL_SECS` | `60`                             |
    /// | `ARTIFACT_BASE_URL`             | `https://downloads.example.com`  |
    /// | `ARTIFACT_SIGNING_SECRET`       | `dev-secret`                     |
    /// | `ARTIFACT_URL_TTL_SECS`         | `900`                            |
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build from an arbitrary key lookup; `from_env` uses the process
    /// environment.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let defaults = Self::default();

        let cors_origins = match lookup("CORS_ORIGINS") {
            Some(raw) => raw
                .split(',')
                .map(|s| s.trim().to_string())
                .filter(|s| !s.is_empty())
                .collect(),
            None => defaults.cors_origins,
        };

        Ok(Self {
            host: lookup("HOST").unwrap_or(defaults.host),
            port: parse(&lookup, "PORT", defaults.port, "u16")?,
            cors_origins,
            request_timeout_secs: parse(
                &lookup,
                "REQUEST_TIMEOUT_SECS",
                defaults.request_timeout_secs,
                "u64",
            )?,
            shutdown_timeout_secs: parse(
                &lookup,
                "SHUTDOWN_TIMEOUT_SECS",
                defaults.shutdown_timeout_secs,
                "u64",
            )?,
            push_timeout_secs: parse(&lookup, "PUSH_TIMEOUT_SECS", defaults.push_timeout_secs, "u64")?,
            job_retention_secs: parse(
                &lookup,
                "JOB_RETENTION_SECS",
                defaults.job_retention_secs,
                "u64",
            )?,
            retention_sweep_interval_secs: parse(
                &lookup,
                "RETENTION_SWEEP_INTERVAL_SECS",
                defaults.retention_sweep_interval_secs,
                "u64",
            )?,
            artifact_base_url: lookup("ARTIFACT_BASE_URL").unwrap_or(defaults.artifact_base_url),
            artifact_signing_secret: lookup("ARTIFACT_SIGNING_SECRET")
                .unwrap_or(defaults.artifact_signing_secret),
            artifact_url_ttl_secs: parse(
                &lookup,
                "ARTIFACT_URL_TTL_SECS",
                defaults.artifact_url_ttl_secs,
                "u64",
            )?,
        })
    }

    pub fn push_timeout(&self) -> Duration {
        Duration::from_secs(self.push_timeout_secs)
    }

    pub fn job_retention(&self) -> Duration {
        Duration::from_secs(self.job_retention_secs)
    }

    pub fn retention_sweep_interval(&self) -> Duration {
        Duration::from_secs(self.retention_sweep_interval_secs.max(1))
    }

    pub fn artifact_url_ttl(&self) -> Duration {
        Duration::from_secs(self.artifact_url_ttl_secs)
    }
}

fn parse<T: FromStr>(
    lookup: &impl Fn(&str) -> Option<String>,
    key: &'static str,
    default: T,
    expected: &'static str,
) -> Result<T, ConfigError> {
    match lookup(key) {
        None => Ok(default),
        Some(value) => value.trim().parse().map_err(|_| ConfigError {
            key,
            value,
            expected,
        }),
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use super::*;

    fn config(vars: &[(&str, &str)]) -> Result<ServerConfig, ConfigError> {
        let vars: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        ServerConfig::from_lookup(|key| vars.get(key).cloned())
    }

    #[test]
    fn defaults_apply_when_unset() {
        let cfg = config(&[]).unwrap();
        assert_eq!(cfg.port, 3000);
        assert_eq!(cfg.push_timeout(), Duration::from_secs(90));
        assert_eq!(cfg.job_retention(), Duration::from_secs(3600));
        assert_eq!(cfg.cors_origins, vec!["http://localhost:5173"]);
    }

    #[test]
    fn overrides_are_parsed() {
        let cfg = config(&[
            ("PORT", "8080"),
            ("PUSH_TIMEOUT_SECS", "5"),
            ("CORS_ORIGINS", "https://a.test, https://b.test,"),
        ])
        .unwrap();
        assert_eq!(cfg.port, 8080);
        assert_eq!(cfg.push_timeout_secs, 5);
        assert_eq!(cfg.cors_origins, vec!["https://a.test", "https://b.test"]);
    }

    #[test]
    fn invalid_number_fails_fast() {
        let err = config(&[("JOB_RETENTION_SECS", "soon")]).unwrap_err();
        assert_eq!(err.key, "JOB_RETENTION_SECS");
        assert!(err.to_string().contains("soon"));
    }
}
