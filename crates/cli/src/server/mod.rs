mod sockets;

use fleet_dns_application::ResolveQueryUseCase;
use fleet_dns_domain::Config;
use fleet_dns_infrastructure::{ProxyServer, TlsIdentity};
use std::net::{IpAddr, SocketAddr};
use std::path::Path;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::info;

/// Binds every configured listener, then serves until the process receives
/// an interrupt or a listener fails. On interrupt the shared cancellation
/// token stops all listeners and `run` waits for each of them to finish.
pub async fn run(config: &Config, engine: Arc<ResolveQueryUseCase>) -> anyhow::Result<()> {
    let bind_ip: IpAddr = config
        .server
        .bind_address
        .parse()
        .map_err(|_| anyhow::anyhow!("Invalid bind address '{}'", config.server.bind_address))?;

    let shutdown = CancellationToken::new();
    let mut server = ProxyServer::new(engine, shutdown.clone());

    let identity = if config.server.any_encrypted_listener() {
        Some(TlsIdentity::load(
            Path::new(&config.server.cert_file),
            Path::new(&config.server.key_file),
        )?)
    } else {
        None
    };

    let dns_addr = SocketAddr::new(bind_ip, config.server.dns_port);
    server.register_udp_socket(sockets::udp_socket(dns_addr)?);
    server.register_tcp_listener(sockets::tcp_listener(dns_addr)?);
    info!(addr = %dns_addr, "DNS listener ready (UDP and TCP)");

    if let Some(identity) = &identity {
        if config.server.tls_port != 0 {
            let addr = SocketAddr::new(bind_ip, config.server.tls_port);
            server.register_tls_listener(sockets::tcp_listener(addr)?, identity)?;
            info!(addr = %addr, "DNS-over-TLS listener ready");
        }

        if config.server.quic_port != 0 {
            let addr = SocketAddr::new(bind_ip, config.server.quic_port);
            server.register_quic_socket(sockets::std_udp_socket(addr)?, identity)?;
            info!(addr = %addr, "DNS-over-QUIC listener ready");
        }

        if config.server.https_port != 0 {
            let addr = SocketAddr::new(bind_ip, config.server.https_port);
            server.register_https_listener(
                sockets::tcp_listener(addr)?,
                identity,
                &config.server.https_path,
                &config.auth.users,
            )?;
            info!(addr = %addr, path = %config.server.https_path, "DNS-over-HTTPS listener ready");
        }
    }

    tokio::select! {
        result = server.block_until_done() => {
            result?;
        }
        _ = tokio::signal::ctrl_c() => {
            info!("Shutdown signal received, stopping listeners");
            server.shutdown_gracefully().await?;
        }
    }

    Ok(())
}
