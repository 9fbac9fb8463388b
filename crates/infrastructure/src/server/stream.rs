//! Stream listeners: classic DNS over TCP and DNS-over-TLS
//!
//! Both speak the same two-byte length-prefixed framing; DoT adds a TLS
//! handshake and a tighter first-read deadline. Frames on one connection
//! are answered sequentially in arrival order. A zero-length frame or a
//! malformed message closes the connection without a response.

use super::{is_unrecoverable_socket_error, reap_tasks, sanitize_src_address};
use async_trait::async_trait;
use fleet_dns_application::{ResolveQueryUseCase, ResponseSink};
use fleet_dns_domain::DomainError;
use std::io;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio::net;
use tokio::task::JoinSet;
use tokio::time::timeout;
use tokio_rustls::TlsAcceptor;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

/// Deadline renewed after every answered frame, shared by TCP and TLS.
pub(crate) const STREAM_IDLE_TIMEOUT: Duration = Duration::from_secs(15);
/// Tighter deadline covering the TLS handshake and the first frame.
pub(crate) const TLS_FIRST_READ_TIMEOUT: Duration = Duration::from_secs(10);

const MAX_FRAME_SIZE: usize = u16::MAX as usize;

/// Reads one length-prefixed message. `Ok(None)` means the connection is
/// done: a clean close before the prefix, or a zero-length frame.
pub(crate) async fn read_frame<S>(stream: &mut S) -> io::Result<Option<Vec<u8>>>
where
    S: AsyncRead + Unpin + Send,
{
    let mut len_buf = [0u8; 2];
    match stream.read_exact(&mut len_buf).await {
        Ok(_) => {}
        Err(e) if e.kind() == io::ErrorKind::UnexpectedEof => return Ok(None),
        Err(e) => return Err(e),
    }

    let len = u16::from_be_bytes(len_buf) as usize;
    if len == 0 {
        return Ok(None);
    }

    let mut frame = vec![0u8; len];
    stream.read_exact(&mut frame).await?;
    Ok(Some(frame))
}

/// Writes one length-prefixed message and flushes it.
pub(crate) async fn write_frame<S>(stream: &mut S, message_bytes: &[u8]) -> io::Result<()>
where
    S: AsyncWrite + Unpin + Send,
{
    if message_bytes.len() > MAX_FRAME_SIZE {
        return Err(io::Error::new(
            io::ErrorKind::InvalidInput,
            "response exceeds stream frame limit",
        ));
    }
    let len = message_bytes.len() as u16;
    stream.write_all(&len.to_be_bytes()).await?;
    stream.write_all(message_bytes).await?;
    stream.flush().await
}

/// Response sink framing answers onto one client stream.
pub(crate) struct StreamSink<'a, S> {
    stream: &'a mut S,
    peer: SocketAddr,
}

#[async_trait]
impl<S> ResponseSink for StreamSink<'_, S>
where
    S: AsyncWrite + Unpin + Send,
{
    async fn send(&mut self, response_bytes: Vec<u8>) -> Result<(), DomainError> {
        write_frame(self.stream, &response_bytes)
            .await
            .map_err(|e| {
                DomainError::IoError(format!(
                    "Failed to send stream response to {}: {}",
                    self.peer, e
                ))
            })
    }
}

/// Serves one accepted stream until the client closes, a deadline lapses,
/// or a frame fails to decode.
pub(crate) async fn serve_stream_connection<S>(
    mut stream: S,
    src_addr: SocketAddr,
    first_timeout: Duration,
    idle_timeout: Duration,
    protocol: &'static str,
    engine: Arc<ResolveQueryUseCase>,
    shutdown: CancellationToken,
) where
    S: AsyncRead + AsyncWrite + Unpin + Send,
{
    let mut read_timeout = first_timeout;

    loop {
        let frame = tokio::select! {
            frame = timeout(read_timeout, read_frame(&mut stream)) => frame,
            _ = shutdown.cancelled() => break,
        };

        let frame = match frame {
            Err(_) => {
                debug!(src = %src_addr, protocol, "connection idle, closing");
                break;
            }
            Ok(Err(e)) => {
                debug!(src = %src_addr, protocol, error = %e, "error reading frame, closing");
                break;
            }
            Ok(Ok(None)) => break,
            Ok(Ok(Some(frame))) => frame,
        };
        read_timeout = idle_timeout;

        // Sequential on purpose: one connection's frames are answered in
        // the order they arrived.
        let mut sink = StreamSink {
            stream: &mut stream,
            peer: src_addr,
        };
        if let Err(e) = engine.execute(&frame, &mut sink).await {
            debug!(src = %src_addr, protocol, error = %e, "closing connection after failed exchange");
            break;
        }
    }
}

pub(crate) async fn serve_tcp(
    listener: net::TcpListener,
    engine: Arc<ResolveQueryUseCase>,
    shutdown: CancellationToken,
) -> Result<(), DomainError> {
    let mut inner_join_set = JoinSet::new();

    loop {
        let (tcp_stream, src_addr) = tokio::select! {
            accepted = listener.accept() => match accepted {
                Ok(pair) => pair,
                Err(e) => {
                    debug!(error = %e, "error accepting TCP connection");
                    if is_unrecoverable_socket_error(&e) {
                        break;
                    }
                    continue;
                }
            },
            _ = shutdown.cancelled() => break,
        };

        if let Err(e) = sanitize_src_address(src_addr) {
            warn!(src = %src_addr, "refusing connection: {}", e);
            continue;
        }

        debug!(src = %src_addr, "accepted TCP connection");
        let engine = engine.clone();
        let conn_shutdown = shutdown.clone();
        inner_join_set.spawn(async move {
            serve_stream_connection(
                tcp_stream,
                src_addr,
                STREAM_IDLE_TIMEOUT,
                STREAM_IDLE_TIMEOUT,
                "TCP",
                engine,
                conn_shutdown,
            )
            .await;
        });

        reap_tasks(&mut inner_join_set);
    }

    if shutdown.is_cancelled() {
        Ok(())
    } else {
        Err(DomainError::IoError(
            "unexpected close of TCP listener".into(),
        ))
    }
}

pub(crate) async fn serve_tls(
    listener: net::TcpListener,
    acceptor: TlsAcceptor,
    engine: Arc<ResolveQueryUseCase>,
    shutdown: CancellationToken,
) -> Result<(), DomainError> {
    let mut inner_join_set = JoinSet::new();

    loop {
        let (tcp_stream, src_addr) = tokio::select! {
            accepted = listener.accept() => match accepted {
                Ok(pair) => pair,
                Err(e) => {
                    debug!(error = %e, "error accepting TLS connection");
                    if is_unrecoverable_socket_error(&e) {
                        break;
                    }
                    continue;
                }
            },
            _ = shutdown.cancelled() => break,
        };

        if let Err(e) = sanitize_src_address(src_addr) {
            warn!(src = %src_addr, "refusing connection: {}", e);
            continue;
        }

        debug!(src = %src_addr, "accepted TLS connection");
        let acceptor = acceptor.clone();
        let engine = engine.clone();
        let conn_shutdown = shutdown.clone();
        inner_join_set.spawn(async move {
            let tls_stream = match timeout(TLS_FIRST_READ_TIMEOUT, acceptor.accept(tcp_stream))
                .await
            {
                Ok(Ok(stream)) => stream,
                Ok(Err(e)) => {
                    debug!(src = %src_addr, error = %e, "TLS handshake failed");
                    return;
                }
                Err(_) => {
                    debug!(src = %src_addr, "TLS handshake timed out");
                    return;
                }
            };

            serve_stream_connection(
                tls_stream,
                src_addr,
                TLS_FIRST_READ_TIMEOUT,
                STREAM_IDLE_TIMEOUT,
                "TLS",
                engine,
                conn_shutdown,
            )
            .await;
        });

        reap_tasks(&mut inner_join_set);
    }

    if shutdown.is_cancelled() {
        Ok(())
    } else {
        Err(DomainError::IoError(
            "unexpected close of TLS listener".into(),
        ))
    }
}
