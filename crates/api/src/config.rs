//! API server configuration loaded from environment variables.
//!
//! # Environment Variables
//!
//! ## Required
//! - `AUTH_URL` - Identity provider base URL; keys are read from `<AUTH_URL>/.well-known/jwks.json`
//!
//! ## Optional
//! - `HOST` - Bind address (default: 0.0.0.0)
//! - `SERVER_PORT` - Listen port (default: 3002)
//! - `ENABLE_CORS` - `*` or a comma separated list of origins (default: `*`)
//! - `ENVIRONMENT_NAME` - `dev`, `qa` or `prod` (default: dev)
//! - `DATABASE_URL` - `PostgreSQL` connection string; orders are kept in memory when unset
//! - `RUN_MIGRATIONS` - Apply pending migrations at startup (default: true)
//! - `JWKS_CACHE_SECONDS` - JWKS cache lifetime, 0 disables caching (default: 300)
//!
//! Stripe settings are read separately by the billing crate.

use std::fmt;
use std::net::{IpAddr, SocketAddr};
use std::str::FromStr;
use std::time::Duration;

use thiserror::Error;
use url::Url;

const DEFAULT_HOST: &str = "0.0.0.0";
const DEFAULT_PORT: u16 = 3002;
const DEFAULT_JWKS_CACHE_SECONDS: u64 = 300;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Missing environment variable: {0}")]
    MissingEnvVar(String),
    #[error("Invalid environment variable {0}: {1}")]
    InvalidEnvVar(String, String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Environment {
    #[default]
    Dev,
    Qa,
    Prod,
}

impl Environment {
    pub fn as_str(&self) -> &'static str {
        match self {
            Environment::Dev => "dev",
            Environment::Qa => "qa",
            Environment::Prod => "prod",
        }
    }

    pub fn is_prod(&self) -> bool {
        matches!(self, Environment::Prod)
    }
}

impl fmt::Display for Environment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Environment {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "dev" | "development" => Ok(Environment::Dev),
            "qa" => Ok(Environment::Qa),
            "prod" | "production" => Ok(Environment::Prod),
            other => Err(format!("unknown environment '{}' (expected dev, qa or prod)", other)),
        }
    }
}

/// Allowed browser origins
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CorsOrigins {
    Any,
    List(Vec<String>),
}

impl CorsOrigins {
    fn parse(raw: &str) -> Self {
        let origins: Vec<String> = raw
            .split(',')
            .map(str::trim)
            .filter(|o| !o.is_empty())
            .map(String::from)
            .collect();

        if origins.is_empty() || origins.iter().any(|o| o == "*") {
            CorsOrigins::Any
        } else {
            CorsOrigins::List(origins)
        }
    }
}

#[derive(Debug, Clone)]
pub struct Config {
    pub host: IpAddr,
    pub port: u16,
    pub cors_origins: CorsOrigins,
    pub environment: Environment,
    /// Contains the database password; never log it.
    pub database_url: Option<String>,
    pub run_migrations: bool,
    pub auth_url: Url,
    pub jwks_cache_ttl: Duration,
}

impl Config {
    /// Load configuration from the process environment.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build the config from any key lookup. Empty values count as unset.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        let host = parse_or("HOST", get("HOST"), DEFAULT_HOST.parse().ok())?;
        let port = parse_or("SERVER_PORT", get("SERVER_PORT"), Some(DEFAULT_PORT))?;
        let environment = parse_or(
            "ENVIRONMENT_NAME",
            get("ENVIRONMENT_NAME"),
            Some(Environment::default()),
        )?;
        let run_migrations = match get("RUN_MIGRATIONS") {
            Some(raw) => parse_bool("RUN_MIGRATIONS", &raw)?,
            None => true,
        };
        let jwks_cache_seconds = parse_or(
            "JWKS_CACHE_SECONDS",
            get("JWKS_CACHE_SECONDS"),
            Some(DEFAULT_JWKS_CACHE_SECONDS),
        )?;

        let raw_auth_url = get("AUTH_URL")
            .ok_or_else(|| ConfigError::MissingEnvVar("AUTH_URL".to_string()))?;
        let auth_url = Url::parse(raw_auth_url.trim())
            .map_err(|e| ConfigError::InvalidEnvVar("AUTH_URL".to_string(), e.to_string()))?;

        Ok(Self {
            host,
            port,
            cors_origins: CorsOrigins::parse(&get("ENABLE_CORS").unwrap_or_else(|| "*".to_string())),
            environment,
            database_url: get("DATABASE_URL"),
            run_migrations,
            auth_url,
            jwks_cache_ttl: Duration::from_secs(jwks_cache_seconds),
        })
    }

    pub fn socket_addr(&self) -> SocketAddr {
        SocketAddr::new(self.host, self.port)
    }

    /// `<AUTH_URL>/.well-known/jwks.json`, tolerating a trailing slash on the base.
    pub fn jwks_url(&self) -> String {
        format!(
            "{}/.well-known/jwks.json",
            self.auth_url.as_str().trim_end_matches('/')
        )
    }
}

fn parse_or<T>(key: &str, raw: Option<String>, default: Option<T>) -> Result<T, ConfigError>
where
    T: FromStr,
    T::Err: fmt::Display,
{
    match raw {
        Some(raw) => raw
            .trim()
            .parse()
            .map_err(|e: T::Err| ConfigError::InvalidEnvVar(key.to_string(), e.to_string())),
        None => default.ok_or_else(|| ConfigError::MissingEnvVar(key.to_string())),
    }
}

fn parse_bool(key: &str, raw: &str) -> Result<bool, ConfigError> {
    match raw.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" => Ok(false),
        other => Err(ConfigError::InvalidEnvVar(
            key.to_string(),
            format!("'{}' is not a boolean", other),
        )),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;
    use std::collections::HashMap;

    fn config_from(vars: &[(&str, &str)]) -> Result<Config, ConfigError> {
        let map: HashMap<&str, &str> = vars.iter().copied().collect();
        Config::from_lookup(|key| map.get(key).map(|v| v.to_string()))
    }

    #[test]
    fn test_defaults() {
        let config = config_from(&[("AUTH_URL", "https://auth.example.com")]).unwrap();

        assert_eq!(config.socket_addr().to_string(), "0.0.0.0:3002");
        assert_eq!(config.cors_origins, CorsOrigins::Any);
        assert_eq!(config.environment, Environment::Dev);
        assert!(config.database_url.is_none());
        assert!(config.run_migrations);
        assert_eq!(config.jwks_cache_ttl, Duration::from_secs(300));
    }

    #[test]
    fn test_auth_url_is_required_and_validated() {
        assert!(matches!(
            config_from(&[]),
            Err(ConfigError::MissingEnvVar(key)) if key == "AUTH_URL"
        ));
        assert!(matches!(
            config_from(&[("AUTH_URL", "not a url")]),
            Err(ConfigError::InvalidEnvVar(key, _)) if key == "AUTH_URL"
        ));
    }

    #[test]
    fn test_jwks_url_handles_trailing_slash() {
        let plain = config_from(&[("AUTH_URL", "https://tenant.auth.example.com")]).unwrap();
        let slashed = config_from(&[("AUTH_URL", "https://tenant.auth.example.com/")]).unwrap();

        assert_eq!(plain.jwks_url(), "https://tenant.auth.example.com/.well-known/jwks.json");
        assert_eq!(plain.jwks_url(), slashed.jwks_url());
    }

    #[test]
    fn test_overrides() {
        let config = config_from(&[
            ("AUTH_URL", "https://auth.example.com"),
            ("HOST", "127.0.0.1"),
            ("SERVER_PORT", "8080"),
            ("ENABLE_CORS", "http://localhost:3000, https://app.example.com"),
            ("ENVIRONMENT_NAME", "prod"),
            ("RUN_MIGRATIONS", "false"),
            ("JWKS_CACHE_SECONDS", "0"),
        ])
        .unwrap();

        assert_eq!(config.socket_addr().to_string(), "127.0.0.1:8080");
        assert_eq!(
            config.cors_origins,
            CorsOrigins::List(vec![
                "http://localhost:3000".to_string(),
                "https://app.example.com".to_string()
            ])
        );
        assert!(config.environment.is_prod());
        assert!(!config.run_migrations);
        assert_eq!(config.jwks_cache_ttl, Duration::ZERO);
    }

    #[test]
    fn test_invalid_values_are_reported_by_name() {
        for (key, value) in [
            ("SERVER_PORT", "70000"),
            ("ENVIRONMENT_NAME", "staging"),
            ("RUN_MIGRATIONS", "maybe"),
            ("JWKS_CACHE_SECONDS", "-1"),
            ("HOST", "localhost:80"),
        ] {
            let err = config_from(&[("AUTH_URL", "https://auth.example.com"), (key, value)])
                .unwrap_err();
            assert!(
                matches!(&err, ConfigError::InvalidEnvVar(k, _) if k == key),
                "{} should be rejected, got {:?}",
                key,
                err
            );
        }
    }

    #[test]
    fn test_wildcard_anywhere_means_any_origin() {
        assert_eq!(CorsOrigins::parse("https://a.example.com,*"), CorsOrigins::Any);
        assert_eq!(CorsOrigins::parse(" , "), CorsOrigins::Any);
    }

    #[test]
    #[serial]
    fn test_from_env_reads_process_environment() {
        for key in ["HOST", "ENVIRONMENT_NAME", "RUN_MIGRATIONS", "JWKS_CACHE_SECONDS", "DATABASE_URL"] {
            std::env::remove_var(key);
        }
        std::env::set_var("AUTH_URL", "https://env.auth.example.com");
        std::env::set_var("SERVER_PORT", "4010");

        let config = Config::from_env().unwrap();
        assert_eq!(config.port, 4010);
        assert_eq!(config.auth_url.host_str(), Some("env.auth.example.com"));

        std::env::remove_var("AUTH_URL");
        std::env::remove_var("SERVER_PORT");
    }
}
