//! Fleet DNS Infrastructure Layer
//!
//! Network adapters around the application core: outbound exchange
//! transports with the racing resolver pool, and the inbound proxy server
//! with one listener per supported transport.

pub mod server;
pub mod upstream;

pub use server::{ProxyServer, TlsIdentity};
pub use upstream::{BootstrapResolve, ResolverPool, StaticResolver};
