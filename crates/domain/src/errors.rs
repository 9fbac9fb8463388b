use thiserror::Error;

#[derive(Error, Debug, Clone)]
pub enum DomainError {
    #[error("Failed to decode DNS message: {0}")]
    MessageDecode(String),

    #[error("Failed to encode DNS message: {0}")]
    MessageEncode(String),

    #[error("I/O error: {0}")]
    IoError(String),

    #[error("Query timeout")]
    QueryTimeout,

    #[error("Transport timeout connecting to {server}")]
    TransportTimeout { server: String },

    #[error("Transport connection refused by {server}")]
    TransportConnectionRefused { server: String },

    #[error("Transport connection reset by {server}")]
    TransportConnectionReset { server: String },

    #[error("Configuration error: {0}")]
    ConfigError(String),

    #[error("All upstream servers are unreachable")]
    TransportAllServersUnreachable,
}
