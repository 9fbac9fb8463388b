//! Bootstrap resolution for upstream hostnames
//!
//! Encrypted upstreams are usually configured by name (for certificate
//! verification) but the proxy cannot ask itself to resolve that name.
//! The bootstrap resolver answers those lookups from a single statically
//! configured address, without any network round trip.

use async_trait::async_trait;
use fleet_dns_domain::DomainError;
use std::net::IpAddr;
use tracing::debug;

#[async_trait]
pub trait BootstrapResolve: Send + Sync {
    /// Resolve an upstream hostname to one address.
    async fn lookup(&self, hostname: &str) -> Result<IpAddr, DomainError>;
}

/// Resolver that answers every lookup with the same fixed address.
pub struct StaticResolver {
    ip: IpAddr,
}

impl StaticResolver {
    pub fn new(ip: IpAddr) -> Self {
        Self { ip }
    }
}

#[async_trait]
impl BootstrapResolve for StaticResolver {
    async fn lookup(&self, hostname: &str) -> Result<IpAddr, DomainError> {
        debug!(hostname = %hostname, ip = %self.ip, "Bootstrap lookup answered statically");
        Ok(self.ip)
    }
}
