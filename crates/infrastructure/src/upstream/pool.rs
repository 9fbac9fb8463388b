//! Upstream resolver pool with parallel racing
//!
//! Built once at startup from the upstream configuration: every server
//! string is parsed, hostnames are expanded through the bootstrap resolver,
//! and a transport is constructed per endpoint. An exchange fans the query
//! out to every endpoint at once and resolves with the first upstream that
//! returns a decodable answer; the slower attempts are aborted.

use super::bootstrap::BootstrapResolve;
use super::transport::{https, quic, tls, Transport};
use super::transport::{
    https::HttpsTransport, quic::QuicTransport, tcp::TcpTransport, tls::TlsTransport,
    udp::UdpTransport,
};
use async_trait::async_trait;
use fleet_dns_application::{RaceOutcome, UpstreamExchange};
use fleet_dns_domain::{DomainError, Endpoint, UpstreamAddr, UpstreamConfig};
use futures::stream::FuturesUnordered;
use futures::StreamExt;
use hickory_proto::op::Message;
use std::net::{IpAddr, SocketAddr};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::time::timeout;
use tracing::{debug, info, warn};

/// One configured upstream: its display form for logs and the transport
/// that talks to it.
struct ResolverEndpoint {
    display: Arc<str>,
    transport: Transport,
}

pub struct ResolverPool {
    endpoints: Vec<Arc<ResolverEndpoint>>,
    query_timeout: Duration,
}

/// Lazily created client endpoints for outbound QUIC, one per address
/// family, shared by every DoQ upstream.
#[derive(Default)]
struct QuicClientEndpoints {
    v4: Option<quinn::Endpoint>,
    v6: Option<quinn::Endpoint>,
}

impl QuicClientEndpoints {
    fn for_addr(&mut self, addr: SocketAddr) -> Result<quinn::Endpoint, DomainError> {
        let slot = if addr.is_ipv6() {
            &mut self.v6
        } else {
            &mut self.v4
        };
        if let Some(endpoint) = slot {
            return Ok(endpoint.clone());
        }
        let endpoint = quic::client_endpoint(quic::client_config()?, addr.is_ipv6())?;
        *slot = Some(endpoint.clone());
        Ok(endpoint)
    }
}

impl ResolverPool {
    /// Parses and prepares every configured upstream. Any unparsable
    /// address or failed bootstrap lookup is fatal.
    pub async fn build(
        config: &UpstreamConfig,
        bootstrap: &dyn BootstrapResolve,
    ) -> Result<Self, DomainError> {
        if config.servers.is_empty() {
            return Err(DomainError::ConfigError(
                "No upstream servers configured".into(),
            ));
        }

        let query_timeout = Duration::from_secs(config.query_timeout);
        let mut shared_tls: Option<Arc<rustls::ClientConfig>> = None;
        let mut quic_clients = QuicClientEndpoints::default();
        let mut endpoints = Vec::with_capacity(config.servers.len());

        for server in &config.servers {
            let endpoint: Endpoint = server.parse().map_err(|e| {
                DomainError::ConfigError(format!("Invalid endpoint '{}': {}", server, e))
            })?;
            let endpoint = resolve_endpoint(endpoint, bootstrap).await?;
            let display_name: Arc<str> = endpoint.to_string().into();

            let transport = match &endpoint {
                Endpoint::Udp { addr } => {
                    Transport::Udp(UdpTransport::new(require_addr(addr, &display_name)?))
                }
                Endpoint::Tcp { addr } => {
                    Transport::Tcp(TcpTransport::new(require_addr(addr, &display_name)?))
                }
                Endpoint::Tls { addr, hostname } => {
                    let tls_config = shared_tls
                        .get_or_insert_with(tls::shared_client_config)
                        .clone();
                    Transport::Tls(TlsTransport::new(
                        require_addr(addr, &display_name)?,
                        hostname.to_string(),
                        tls_config,
                    ))
                }
                Endpoint::Quic { addr, hostname } => {
                    let addr = require_addr(addr, &display_name)?;
                    let client = quic_clients.for_addr(addr)?;
                    Transport::Quic(QuicTransport::new(addr, hostname.clone(), client))
                }
                Endpoint::Https { url, hostname } => {
                    let resolved = if let Ok(ip) = hostname.parse::<IpAddr>() {
                        ip
                    } else {
                        bootstrap.lookup(hostname).await?
                    };
                    let client = https::https_client(
                        hostname,
                        SocketAddr::new(resolved, 443),
                        query_timeout,
                    )?;
                    Transport::Https(HttpsTransport::new(url.to_string(), client))
                }
            };

            info!(server = %display_name, protocol = transport.protocol_name(), "Upstream endpoint ready");
            endpoints.push(Arc::new(ResolverEndpoint { display: display_name, transport }));
        }

        Ok(Self {
            endpoints,
            query_timeout,
        })
    }

    pub fn len(&self) -> usize {
        self.endpoints.len()
    }

    pub fn is_empty(&self) -> bool {
        self.endpoints.is_empty()
    }
}

async fn resolve_endpoint(
    endpoint: Endpoint,
    bootstrap: &dyn BootstrapResolve,
) -> Result<Endpoint, DomainError> {
    if !endpoint.needs_resolution() {
        return Ok(endpoint);
    }
    let (hostname, port) = match &endpoint {
        Endpoint::Udp { addr }
        | Endpoint::Tcp { addr }
        | Endpoint::Tls { addr, .. }
        | Endpoint::Quic { addr, .. } => addr.unresolved_parts(),
        Endpoint::Https { .. } => None,
    }
    .ok_or_else(|| DomainError::ConfigError(format!("Endpoint {} has no hostname", endpoint)))?;

    let ip = bootstrap.lookup(hostname).await?;
    debug!(hostname, ip = %ip, "Resolved upstream hostname through bootstrap");
    Ok(endpoint.with_resolved_addr(SocketAddr::new(ip, port)))
}

fn require_addr(addr: &UpstreamAddr, display: &str) -> Result<SocketAddr, DomainError> {
    addr.socket_addr().ok_or_else(|| {
        DomainError::ConfigError(format!(
            "Endpoint {} was not resolved to an address",
            display
        ))
    })
}

/// One attempt against one endpoint. The response must decode and carry
/// the query's transaction id, otherwise the attempt loses the race.
async fn attempt_exchange(
    endpoint: &ResolverEndpoint,
    query_bytes: &[u8],
    query_id: u16,
    attempt_timeout: Duration,
) -> Result<RaceOutcome, DomainError> {
    let start = Instant::now();

    let response_bytes = endpoint.transport.send(query_bytes, attempt_timeout).await?;

    let response = Message::from_vec(&response_bytes)
        .map_err(|e| DomainError::MessageDecode(e.to_string()))?;

    if response.id() != query_id {
        return Err(DomainError::IoError(format!(
            "Response id {:#06x} from {} does not match query id {:#06x}",
            response.id(),
            endpoint.display,
            query_id
        )));
    }

    Ok(RaceOutcome {
        response,
        server: endpoint.display.to_string(),
        latency_ms: start.elapsed().as_millis() as u64,
    })
}

#[async_trait]
impl UpstreamExchange for ResolverPool {
    async fn exchange(&self, query: &Message) -> Result<RaceOutcome, DomainError> {
        let query_bytes = query
            .to_vec()
            .map_err(|e| DomainError::MessageEncode(e.to_string()))?;
        let query_id = query.id();

        debug!(servers = self.endpoints.len(), query_id, "Racing all upstreams");

        let mut abort_handles = Vec::with_capacity(self.endpoints.len());
        let mut futs = FuturesUnordered::new();

        for endpoint in &self.endpoints {
            let endpoint = Arc::clone(endpoint);
            let query_bytes = query_bytes.clone();
            let attempt_timeout = self.query_timeout;
            let handle = tokio::spawn(async move {
                attempt_exchange(&endpoint, &query_bytes, query_id, attempt_timeout).await
            });
            abort_handles.push(handle.abort_handle());
            futs.push(handle);
        }

        let result = timeout(self.query_timeout, async {
            while let Some(join_result) = futs.next().await {
                match join_result {
                    Ok(Ok(outcome)) => {
                        debug!(server = %outcome.server, latency_ms = outcome.latency_ms, "Fastest response");
                        return Ok(outcome);
                    }
                    Ok(Err(e)) => {
                        debug!(error = %e, "Upstream attempt failed");
                    }
                    Err(e) => {
                        warn!(error = %e, "Upstream attempt panicked");
                    }
                }
            }
            Err(DomainError::TransportAllServersUnreachable)
        })
        .await;

        // Losers (and everything, on timeout) get cancelled best effort.
        for handle in &abort_handles {
            handle.abort();
        }

        match result {
            Ok(r) => r,
            Err(_) => Err(DomainError::QueryTimeout),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::net::IpAddr;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct RecordingResolver {
        ip: IpAddr,
        lookups: AtomicUsize,
    }

    impl RecordingResolver {
        fn new(ip: &str) -> Self {
            Self {
                ip: ip.parse().unwrap(),
                lookups: AtomicUsize::new(0),
            }
        }
    }

    #[async_trait]
    impl BootstrapResolve for RecordingResolver {
        async fn lookup(&self, _hostname: &str) -> Result<IpAddr, DomainError> {
            self.lookups.fetch_add(1, Ordering::SeqCst);
            Ok(self.ip)
        }
    }

    fn config_with(servers: &[&str]) -> UpstreamConfig {
        UpstreamConfig {
            servers: servers.iter().map(|s| s.to_string()).collect(),
            bootstrap: "8.8.8.8".to_string(),
            query_timeout: 5,
        }
    }

    #[tokio::test]
    async fn test_build_rejects_unparsable_endpoint() {
        let bootstrap = RecordingResolver::new("8.8.8.8");
        let config = config_with(&["udp://not-an-address"]);

        let result = ResolverPool::build(&config, &bootstrap).await;

        assert!(matches!(result, Err(DomainError::ConfigError(_))));
    }

    #[tokio::test]
    async fn test_build_rejects_empty_server_list() {
        let bootstrap = RecordingResolver::new("8.8.8.8");
        let config = config_with(&[]);

        let result = ResolverPool::build(&config, &bootstrap).await;

        assert!(matches!(result, Err(DomainError::ConfigError(_))));
    }

    #[tokio::test]
    async fn test_build_accepts_every_endpoint_scheme() {
        let bootstrap = RecordingResolver::new("1.1.1.1");
        let config = config_with(&[
            "udp://8.8.8.8:53",
            "tcp://8.8.8.8:53",
            "tls://one.one.one.one:853",
            "doq://dns.adguard-dns.com:853",
            "https://cloudflare-dns.com/dns-query",
            "9.9.9.9:53",
        ]);

        let pool = ResolverPool::build(&config, &bootstrap).await.unwrap();

        assert_eq!(pool.len(), 6);
        // DoT, DoQ and DoH hostnames all went through the bootstrap resolver.
        assert_eq!(bootstrap.lookups.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_build_skips_bootstrap_for_ip_endpoints() {
        let bootstrap = RecordingResolver::new("1.1.1.1");
        let config = config_with(&["tls://9.9.9.9:853", "udp://8.8.8.8:53"]);

        let pool = ResolverPool::build(&config, &bootstrap).await.unwrap();

        assert_eq!(pool.len(), 2);
        assert_eq!(bootstrap.lookups.load(Ordering::SeqCst), 0);
    }
}
