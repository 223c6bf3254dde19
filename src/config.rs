//! Server configuration
//!
//! Layered with the `config` crate: built-in defaults, then an optional TOML
//! file, then `MNEMO_*` environment variables (e.g. `MNEMO_BIND_ADDR`).

use crate::backend::memory::DEFAULT_SEARCH_LIMIT_MAX;
use crate::error::{MnemoError, Result};
use crate::session::{store::DEFAULT_CALL_TIMEOUT, SESSION_RETENTION};
use crate::types::Namespace;
use config::{Config, Environment, File};
use serde::{Deserialize, Serialize};
use std::net::SocketAddr;
use std::path::Path;
use std::time::Duration;
use tracing::debug;

/// Environment variable prefix
const ENV_PREFIX: &str = "MNEMO";

/// Runtime configuration for the HTTP transport
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ServerConfig {
    /// Address to bind
    pub bind_addr: SocketAddr,
    /// Successive ports tried when `bind_addr` is taken
    pub port_fallbacks: u16,
    /// Namespace served by the un-prefixed `/mcp` endpoint
    pub default_namespace: String,
    /// Idle sessions older than this are swept
    pub session_retention_secs: u64,
    /// Period of the expiry sweep
    pub sweep_interval_secs: u64,
    /// Bound on a single session store round trip
    pub store_timeout_ms: u64,
    /// Upper bound on `search` results
    pub search_limit_max: usize,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_addr: ([127, 0, 0, 1], 8787).into(),
            port_fallbacks: 10,
            default_namespace: "default".to_string(),
            session_retention_secs: SESSION_RETENTION.as_secs(),
            sweep_interval_secs: 60 * 60,
            store_timeout_ms: DEFAULT_CALL_TIMEOUT.as_millis() as u64,
            search_limit_max: DEFAULT_SEARCH_LIMIT_MAX,
        }
    }
}

impl ServerConfig {
    /// Load defaults, then `path` (if given), then the environment
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let defaults = Self::default();
        let mut builder = Config::builder()
            .set_default("bind_addr", defaults.bind_addr.to_string())?
            .set_default("port_fallbacks", i64::from(defaults.port_fallbacks))?
            .set_default("default_namespace", defaults.default_namespace.clone())?
            .set_default("session_retention_secs", defaults.session_retention_secs as i64)?
            .set_default("sweep_interval_secs", defaults.sweep_interval_secs as i64)?
            .set_default("store_timeout_ms", defaults.store_timeout_ms as i64)?
            .set_default("search_limit_max", defaults.search_limit_max as i64)?;

        if let Some(path) = path {
            debug!("Loading configuration from {}", path.display());
            builder = builder.add_source(File::from(path).required(true));
        }

        let config: ServerConfig = builder
            .add_source(Environment::with_prefix(ENV_PREFIX).try_parsing(true))
            .build()?
            .try_deserialize()?;
        config.validate()?;
        Ok(config)
    }

    /// Reject values the server cannot run with
    pub fn validate(&self) -> Result<()> {
        if self.session_retention_secs == 0 {
            return Err(invalid("session_retention_secs must be positive"));
        }
        if self.sweep_interval_secs == 0 {
            return Err(invalid("sweep_interval_secs must be positive"));
        }
        if self.store_timeout_ms == 0 {
            return Err(invalid("store_timeout_ms must be positive"));
        }
        if self.search_limit_max == 0 {
            return Err(invalid("search_limit_max must be positive"));
        }
        Namespace::parse(&self.default_namespace)?;
        Ok(())
    }

    pub fn default_namespace(&self) -> Result<Namespace> {
        Namespace::parse(&self.default_namespace)
    }

    pub fn session_retention(&self) -> Duration {
        Duration::from_secs(self.session_retention_secs)
    }

    pub fn sweep_interval(&self) -> Duration {
        Duration::from_secs(self.sweep_interval_secs)
    }

    pub fn store_timeout(&self) -> Duration {
        Duration::from_millis(self.store_timeout_ms)
    }
}

fn invalid(message: &str) -> MnemoError {
    MnemoError::Config(config::ConfigError::Message(message.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;
    use std::env;
    use std::io::Write;

    #[test]
    #[serial]
    fn test_defaults() {
        let config = ServerConfig::load(None).unwrap();
        assert_eq!(config, ServerConfig::default());
        assert_eq!(config.session_retention(), Duration::from_secs(86_400));
    }

    #[test]
    #[serial]
    fn test_file_then_env_precedence() {
        let mut file = tempfile::Builder::new().suffix(".toml").tempfile().unwrap();
        writeln!(
            file,
            "bind_addr = \"0.0.0.0:9000\"\ndefault_namespace = \"team-a\"\nsweep_interval_secs = 30"
        )
        .unwrap();

        env::set_var("MNEMO_SWEEP_INTERVAL_SECS", "5");
        let config = ServerConfig::load(Some(file.path()));
        env::remove_var("MNEMO_SWEEP_INTERVAL_SECS");
        let config = config.unwrap();

        assert_eq!(config.bind_addr, "0.0.0.0:9000".parse().unwrap());
        assert_eq!(config.default_namespace, "team-a");
        assert_eq!(config.sweep_interval_secs, 5);
        assert_eq!(config.store_timeout_ms, 2_000);
    }

    #[test]
    #[serial]
    fn test_invalid_values_rejected() {
        env::set_var("MNEMO_SESSION_RETENTION_SECS", "0");
        let result = ServerConfig::load(None);
        env::remove_var("MNEMO_SESSION_RETENTION_SECS");
        assert!(matches!(result, Err(MnemoError::Config(_))));

        let config = ServerConfig {
            default_namespace: "not valid".to_string(),
            ..ServerConfig::default()
        };
        assert!(matches!(
            config.validate(),
            Err(MnemoError::InvalidNamespace(_))
        ));
    }

    #[test]
    #[serial]
    fn test_missing_file_is_an_error() {
        let result = ServerConfig::load(Some(Path::new("/nonexistent/mnemo.toml")));
        assert!(result.is_err());
    }
}
