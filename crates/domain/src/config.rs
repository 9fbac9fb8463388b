pub mod auth;
pub mod errors;
pub mod logging;
pub mod options;
pub mod root;
pub mod server;
pub mod upstream;

pub use auth::AuthConfig;
pub use errors::ConfigError;
pub use logging::LoggingConfig;
pub use options::OptionsConfig;
pub use root::{CliOverrides, Config};
pub use server::ServerConfig;
pub use upstream::UpstreamConfig;
