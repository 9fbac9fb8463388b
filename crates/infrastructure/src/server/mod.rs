//! Inbound proxy server
//!
//! One listener task per registered transport, all hanging off a shared
//! cancellation token. Every listener decodes client queries into the same
//! resolution engine and writes answers back through a transport-specific
//! response sink. Shutdown cancels the token and joins every task.

pub mod https;
pub mod quic;
pub mod stream;
pub mod tls;
pub mod udp;

pub use tls::TlsIdentity;

use fleet_dns_application::ResolveQueryUseCase;
use fleet_dns_domain::DomainError;
use std::io;
use std::net::{Ipv4Addr, Ipv6Addr, SocketAddr};
use std::sync::Arc;
use tokio::net;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

pub struct ProxyServer {
    engine: Arc<ResolveQueryUseCase>,
    join_set: JoinSet<Result<(), DomainError>>,
    shutdown_token: CancellationToken,
}

impl ProxyServer {
    /// The token is shared with the caller; cancelling it from anywhere
    /// stops every registered listener.
    pub fn new(engine: Arc<ResolveQueryUseCase>, shutdown_token: CancellationToken) -> Self {
        Self {
            engine,
            join_set: JoinSet::new(),
            shutdown_token,
        }
    }

    /// Register a bound UDP socket for classic DNS.
    pub fn register_udp_socket(&mut self, socket: net::UdpSocket) {
        debug!(socket = ?socket, "registering UDP listener");

        let engine = self.engine.clone();
        let shutdown = self.shutdown_token.clone();
        self.join_set
            .spawn(udp::serve_udp(socket, engine, shutdown));
    }

    /// Register a bound TCP listener for classic DNS over a stream.
    pub fn register_tcp_listener(&mut self, listener: net::TcpListener) {
        debug!(listener = ?listener, "registering TCP listener");

        let engine = self.engine.clone();
        let shutdown = self.shutdown_token.clone();
        self.join_set
            .spawn(stream::serve_tcp(listener, engine, shutdown));
    }

    /// Register a bound TCP listener for DNS-over-TLS.
    pub fn register_tls_listener(
        &mut self,
        listener: net::TcpListener,
        identity: &TlsIdentity,
    ) -> Result<(), DomainError> {
        debug!(listener = ?listener, "registering TLS listener");

        let acceptor = tokio_rustls::TlsAcceptor::from(identity.dot_server_config()?);
        let engine = self.engine.clone();
        let shutdown = self.shutdown_token.clone();
        self.join_set
            .spawn(stream::serve_tls(listener, acceptor, engine, shutdown));
        Ok(())
    }

    /// Register a bound UDP socket for DNS-over-QUIC.
    pub fn register_quic_socket(
        &mut self,
        socket: std::net::UdpSocket,
        identity: &TlsIdentity,
    ) -> Result<(), DomainError> {
        debug!(socket = ?socket, "registering QUIC listener");

        let endpoint = quic::build_server_endpoint(socket, identity)?;
        let engine = self.engine.clone();
        let shutdown = self.shutdown_token.clone();
        self.join_set
            .spawn(quic::serve_quic(endpoint, engine, shutdown));
        Ok(())
    }

    /// Register a bound TCP listener for DNS-over-HTTPS.
    pub fn register_https_listener(
        &mut self,
        listener: net::TcpListener,
        identity: &TlsIdentity,
        path: &str,
        users: &[String],
    ) -> Result<(), DomainError> {
        debug!(listener = ?listener, path, "registering HTTPS listener");

        let acceptor = tokio_rustls::TlsAcceptor::from(identity.doh_server_config()?);
        let settings = Arc::new(https::HttpsSettings {
            path: path.to_string(),
            users: users.to_vec(),
        });
        let engine = self.engine.clone();
        let shutdown = self.shutdown_token.clone();
        self.join_set.spawn(https::serve_https(
            listener, acceptor, settings, engine, shutdown,
        ));
        Ok(())
    }

    /// Runs until every listener task completes. If one or more fail, one
    /// of the errors is kept as the result.
    pub async fn block_until_done(&mut self) -> Result<(), DomainError> {
        block_until_done(&mut self.join_set).await
    }

    /// Cancels every listener and waits for all of them to terminate.
    pub async fn shutdown_gracefully(&mut self) -> Result<(), DomainError> {
        self.shutdown_token.cancel();
        block_until_done(&mut self.join_set).await
    }
}

async fn block_until_done(
    join_set: &mut JoinSet<Result<(), DomainError>>,
) -> Result<(), DomainError> {
    if join_set.is_empty() {
        warn!("block_until_done called with no listeners registered");
        return Ok(());
    }

    let mut out = Ok(());
    while let Some(join_result) = join_set.join_next().await {
        match join_result {
            Ok(Ok(())) => (),
            Ok(Err(e)) => {
                // Keep the last error.
                out = Err(e);
            }
            Err(e) => {
                return Err(DomainError::IoError(format!(
                    "Internal error in spawn: {}",
                    e
                )))
            }
        }
    }
    out
}

/// Reap finished tasks from a `JoinSet`, without awaiting or blocking.
pub(crate) fn reap_tasks(join_set: &mut JoinSet<()>) {
    use futures::FutureExt;
    while join_set.join_next().now_or_never().flatten().is_some() {}
}

/// Checks that a client address is safe to answer: no port 0, no
/// unspecified source, no v4 broadcast.
pub(crate) fn sanitize_src_address(src: SocketAddr) -> Result<(), String> {
    if src.port() == 0 {
        return Err(format!("cannot respond to src on port 0: {}", src));
    }

    fn verify_v4(src: Ipv4Addr) -> Result<(), String> {
        if src.is_unspecified() {
            return Err(format!("cannot respond to unspecified v4 addr: {}", src));
        }
        if src.is_broadcast() {
            return Err(format!("cannot respond to broadcast v4 addr: {}", src));
        }
        Ok(())
    }

    fn verify_v6(src: Ipv6Addr) -> Result<(), String> {
        if src.is_unspecified() {
            return Err(format!("cannot respond to unspecified v6 addr: {}", src));
        }
        Ok(())
    }

    match src.ip() {
        std::net::IpAddr::V4(v4) => verify_v4(v4),
        std::net::IpAddr::V6(v6) => verify_v6(v6),
    }
}

pub(crate) fn is_unrecoverable_socket_error(err: &io::Error) -> bool {
    matches!(
        err.kind(),
        io::ErrorKind::NotConnected | io::ErrorKind::ConnectionAborted
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sanitize_rejects_port_zero() {
        let src: SocketAddr = "1.2.3.4:0".parse().unwrap();
        assert!(sanitize_src_address(src).is_err());
    }

    #[test]
    fn test_sanitize_rejects_unspecified_and_broadcast() {
        assert!(sanitize_src_address("0.0.0.0:5353".parse().unwrap()).is_err());
        assert!(sanitize_src_address("255.255.255.255:5353".parse().unwrap()).is_err());
        assert!(sanitize_src_address("[::]:5353".parse().unwrap()).is_err());
    }

    #[test]
    fn test_sanitize_accepts_normal_client() {
        assert!(sanitize_src_address("192.168.1.10:54321".parse().unwrap()).is_ok());
        assert!(sanitize_src_address("[2001:db8::1]:54321".parse().unwrap()).is_ok());
    }
}
