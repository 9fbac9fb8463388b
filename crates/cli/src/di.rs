use fleet_dns_application::ResolveQueryUseCase;
use fleet_dns_domain::Config;
use fleet_dns_infrastructure::{ResolverPool, StaticResolver};
use std::net::IpAddr;
use std::sync::Arc;
use tracing::info;

/// The wired resolution stack: bootstrap resolver, racing upstream pool,
/// and the query engine every listener shares.
pub struct ResolverServices {
    pub engine: Arc<ResolveQueryUseCase>,
}

impl ResolverServices {
    pub async fn new(config: &Config) -> anyhow::Result<Self> {
        info!(
            servers = config.upstream.servers.len(),
            query_timeout = config.upstream.query_timeout,
            "Initializing upstream resolver pool"
        );

        let bootstrap_ip: IpAddr = config.upstream.bootstrap.parse().map_err(|_| {
            anyhow::anyhow!("Invalid bootstrap address '{}'", config.upstream.bootstrap)
        })?;
        let bootstrap = StaticResolver::new(bootstrap_ip);

        let pool = ResolverPool::build(&config.upstream, &bootstrap).await?;
        let engine = Arc::new(ResolveQueryUseCase::new(Arc::new(pool)));

        info!("Resolution stack initialized");

        Ok(Self { engine })
    }
}
