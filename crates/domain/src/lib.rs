//! Fleet DNS Domain Layer
pub mod config;
pub mod endpoint;
pub mod errors;

pub use config::{
    AuthConfig, CliOverrides, Config, ConfigError, LoggingConfig, OptionsConfig, ServerConfig,
    UpstreamConfig,
};
pub use endpoint::{Endpoint, UpstreamAddr};
pub use errors::DomainError;
