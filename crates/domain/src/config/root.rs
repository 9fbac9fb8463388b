use serde::{Deserialize, Serialize};

use super::auth::AuthConfig;
use super::errors::ConfigError;
use super::logging::LoggingConfig;
use super::options::OptionsConfig;
use super::server::ServerConfig;
use super::upstream::UpstreamConfig;

/// Main configuration structure for Fleet DNS
#[derive(Debug, Clone, Deserialize, Serialize, Default)]
pub struct Config {
    /// Listener configuration (ports, bind address, TLS material)
    #[serde(default)]
    pub server: ServerConfig,

    /// Upstream resolver configuration
    #[serde(default)]
    pub upstream: UpstreamConfig,

    /// HTTPS listener basic-auth credentials
    #[serde(default)]
    pub auth: AuthConfig,

    /// Resolution policy knobs (block-list, client subnet, TTL clamps)
    #[serde(default)]
    pub options: OptionsConfig,

    /// Logging configuration
    #[serde(default)]
    pub logging: LoggingConfig,
}

impl Config {
    /// Load configuration from file or use defaults
    ///
    /// Priority order:
    /// 1. Explicitly provided path
    /// 2. fleet-dns.toml in current directory
    /// 3. /etc/fleet-dns/config.toml
    /// 4. Default configuration
    pub fn load(path: Option<&str>, cli_overrides: CliOverrides) -> Result<Self, ConfigError> {
        let mut config = if let Some(path) = path {
            Self::from_file(path)?
        } else if std::path::Path::new("fleet-dns.toml").exists() {
            Self::from_file("fleet-dns.toml")?
        } else if std::path::Path::new("/etc/fleet-dns/config.toml").exists() {
            Self::from_file("/etc/fleet-dns/config.toml")?
        } else {
            Self::default()
        };

        config.apply_cli_overrides(cli_overrides);
        Ok(config)
    }

    /// Load configuration from a specific file
    fn from_file(path: &str) -> Result<Self, ConfigError> {
        let contents = std::fs::read_to_string(path)
            .map_err(|e| ConfigError::FileRead(path.to_string(), e.to_string()))?;
        toml::from_str(&contents).map_err(|e| ConfigError::Parse(e.to_string()))
    }

    /// Apply command-line overrides to configuration
    fn apply_cli_overrides(&mut self, overrides: CliOverrides) {
        if let Some(port) = overrides.dns_port {
            self.server.dns_port = port;
        }
        if let Some(bind) = overrides.bind_address {
            self.server.bind_address = bind;
        }
        if let Some(level) = overrides.log_level {
            self.logging.level = level;
        }
    }

    /// Validate configuration
    ///
    /// Any failure here is fatal: the process must not start in a
    /// partially-configured state.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.server.dns_port == 0 {
            return Err(ConfigError::Validation("DNS port cannot be 0".to_string()));
        }

        if self.upstream.servers.is_empty() {
            return Err(ConfigError::Validation(
                "No upstream servers configured".to_string(),
            ));
        }

        if self.upstream.query_timeout == 0 {
            return Err(ConfigError::Validation(
                "Upstream query timeout cannot be 0".to_string(),
            ));
        }

        if self.upstream.bootstrap.parse::<std::net::IpAddr>().is_err() {
            return Err(ConfigError::Validation(format!(
                "Invalid bootstrap address '{}': expected an IP address",
                self.upstream.bootstrap
            )));
        }

        if self.server.any_encrypted_listener()
            && (self.server.cert_file.is_empty() || self.server.key_file.is_empty())
        {
            return Err(ConfigError::Validation(
                "cert_file and key_file are required when TLS, QUIC, or HTTPS listeners are enabled"
                    .to_string(),
            ));
        }

        Ok(())
    }
}

/// Command-line overrides for configuration
#[derive(Debug, Default)]
pub struct CliOverrides {
    pub dns_port: Option<u16>,
    pub bind_address: Option<String>,
    pub log_level: Option<String>,
}
