//! DNS-over-HTTPS listener (RFC 8484)
//!
//! HTTP/2 only. GET carries the query in a base64url `dns` parameter,
//! POST carries it as an application/dns-message body. Each request is an
//! independent exchange served on its own task. Basic-auth credentials
//! are checked and logged when users are configured, but a failed check
//! does not block the query.

use super::stream::TLS_FIRST_READ_TIMEOUT;
use super::{is_unrecoverable_socket_error, reap_tasks, sanitize_src_address};
use crate::upstream::transport::https::DNS_MESSAGE_CONTENT_TYPE;
use async_trait::async_trait;
use base64::{
    engine::general_purpose::{STANDARD, URL_SAFE_NO_PAD},
    Engine,
};
use bytes::Bytes;
use fleet_dns_application::{ResolveQueryUseCase, ResponseSink};
use fleet_dns_domain::DomainError;
use http::{header, Method, StatusCode};
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::net;
use tokio::task::JoinSet;
use tokio::time::timeout;
use tokio_rustls::TlsAcceptor;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

const CONNECTION_IDLE_TIMEOUT: Duration = Duration::from_secs(30);
const MAX_READ_FRAME_SIZE: u32 = 16 * 1024;
const STREAM_WINDOW_SIZE: u32 = 65535;
/// Larger bodies cannot be DNS messages; the stream framing tops out here.
const MAX_REQUEST_BODY_SIZE: usize = 65535;

/// Per-listener knobs that survive into every connection task.
pub(crate) struct HttpsSettings {
    pub(crate) path: String,
    pub(crate) users: Vec<String>,
}

pub(crate) async fn serve_https(
    listener: net::TcpListener,
    acceptor: TlsAcceptor,
    settings: Arc<HttpsSettings>,
    engine: Arc<ResolveQueryUseCase>,
    shutdown: CancellationToken,
) -> Result<(), DomainError> {
    let mut inner_join_set = JoinSet::new();

    loop {
        let (tcp_stream, src_addr) = tokio::select! {
            accepted = listener.accept() => match accepted {
                Ok(pair) => pair,
                Err(e) => {
                    debug!(error = %e, "error accepting HTTPS connection");
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

        debug!(src = %src_addr, "accepted HTTPS connection");
        let acceptor = acceptor.clone();
        let settings = settings.clone();
        let engine = engine.clone();
        let conn_shutdown = shutdown.clone();
        inner_join_set.spawn(async move {
            serve_h2_connection(tcp_stream, src_addr, acceptor, settings, engine, conn_shutdown)
                .await;
        });

        reap_tasks(&mut inner_join_set);
    }

    if shutdown.is_cancelled() {
        Ok(())
    } else {
        Err(DomainError::IoError(
            "unexpected close of HTTPS listener".into(),
        ))
    }
}

async fn serve_h2_connection(
    tcp_stream: net::TcpStream,
    src_addr: SocketAddr,
    acceptor: TlsAcceptor,
    settings: Arc<HttpsSettings>,
    engine: Arc<ResolveQueryUseCase>,
    shutdown: CancellationToken,
) {
    let tls_stream = match timeout(TLS_FIRST_READ_TIMEOUT, acceptor.accept(tcp_stream)).await {
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

    let mut h2 = match h2::server::Builder::new()
        .max_frame_size(MAX_READ_FRAME_SIZE)
        .initial_window_size(STREAM_WINDOW_SIZE)
        .initial_connection_window_size(STREAM_WINDOW_SIZE)
        .handshake(tls_stream)
        .await
    {
        Ok(h2) => h2,
        Err(e) => {
            debug!(src = %src_addr, error = %e, "HTTP/2 handshake failed");
            return;
        }
    };

    let mut stream_join_set = JoinSet::new();
    loop {
        let (request, respond) = tokio::select! {
            result = h2.accept() => match result {
                Some(Ok(next_request)) => next_request,
                Some(Err(e)) => {
                    debug!(src = %src_addr, error = %e, "error accepting HTTPS request");
                    return;
                }
                None => return,
            },
            _ = shutdown.cancelled() => return,
            _ = tokio::time::sleep(CONNECTION_IDLE_TIMEOUT) => {
                debug!(src = %src_addr, "HTTPS connection idle, closing");
                return;
            }
        };

        let settings = settings.clone();
        let engine = engine.clone();
        stream_join_set.spawn(async move {
            handle_h2_request(request, respond, src_addr, settings, engine).await;
        });

        reap_tasks(&mut stream_join_set);
    }
}

async fn handle_h2_request(
    request: http::Request<h2::RecvStream>,
    respond: h2::server::SendResponse<Bytes>,
    src_addr: SocketAddr,
    settings: Arc<HttpsSettings>,
    engine: Arc<ResolveQueryUseCase>,
) {
    let mut sink = H2Sink {
        respond,
        peer: src_addr,
        responded: false,
    };

    observe_basic_auth(&request, &settings.users);

    if request.uri().path() != settings.path {
        sink.reject(StatusCode::NOT_FOUND);
        return;
    }

    let query_bytes = match extract_query(request).await {
        Ok(bytes) => bytes,
        Err(status) => {
            sink.reject(status);
            return;
        }
    };

    if let Err(e) = engine.execute(&query_bytes, &mut sink).await {
        debug!(src = %src_addr, error = %e, "rejecting HTTPS query");
        sink.reject(StatusCode::BAD_REQUEST);
    }
}

/// Pulls the wire-format query out of the request, whichever method
/// carried it.
async fn extract_query(request: http::Request<h2::RecvStream>) -> Result<Vec<u8>, StatusCode> {
    let method = request.method().clone();

    if method == Method::GET {
        let encoded = request
            .uri()
            .query()
            .and_then(dns_param)
            .ok_or(StatusCode::BAD_REQUEST)?;
        return URL_SAFE_NO_PAD
            .decode(encoded)
            .map_err(|_| StatusCode::BAD_REQUEST);
    }

    if method == Method::POST {
        let content_type = request
            .headers()
            .get(header::CONTENT_TYPE)
            .and_then(|v| v.to_str().ok());
        if content_type != Some(DNS_MESSAGE_CONTENT_TYPE) {
            return Err(StatusCode::UNSUPPORTED_MEDIA_TYPE);
        }
        return read_body(request.into_body()).await;
    }

    Err(StatusCode::METHOD_NOT_ALLOWED)
}

fn dns_param(query: &str) -> Option<&str> {
    query.split('&').find_map(|pair| pair.strip_prefix("dns="))
}

async fn read_body(mut body: h2::RecvStream) -> Result<Vec<u8>, StatusCode> {
    let mut bytes = Vec::with_capacity(512);
    while let Some(frame) = body.data().await {
        let frame = frame.map_err(|_| StatusCode::BAD_REQUEST)?;
        let _ = body.flow_control().release_capacity(frame.len());
        if bytes.len() + frame.len() > MAX_REQUEST_BODY_SIZE {
            return Err(StatusCode::PAYLOAD_TOO_LARGE);
        }
        bytes.extend_from_slice(&frame);
    }
    Ok(bytes)
}

/// Checks the basic-auth header against the configured users and logs the
/// verdict. Deliberately does not gate the query.
fn observe_basic_auth<T>(request: &http::Request<T>, users: &[String]) {
    if users.is_empty() {
        return;
    }

    let authorized = request
        .headers()
        .get(header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("Basic "))
        .and_then(|payload| STANDARD.decode(payload).ok())
        .and_then(|decoded| String::from_utf8(decoded).ok())
        .map(|credentials| users.iter().any(|user| user == &credentials))
        .unwrap_or(false);

    debug!(authorized, "basic auth checked");
}

/// Response sink answering one HTTP/2 stream. A stream gets exactly one
/// response head: once `send` has put one on the wire, `reject` is a
/// no-op so a failure after a partial send cannot double-respond.
pub(crate) struct H2Sink {
    respond: h2::server::SendResponse<Bytes>,
    peer: SocketAddr,
    responded: bool,
}

impl H2Sink {
    fn reject(&mut self, status: StatusCode) {
        if self.responded {
            return;
        }
        self.responded = true;
        let response = match http::Response::builder().status(status).body(()) {
            Ok(response) => response,
            Err(_) => return,
        };
        if let Err(e) = self.respond.send_response(response, true) {
            debug!(peer = %self.peer, error = %e, "failed to send HTTPS error status");
        }
    }
}

#[async_trait]
impl ResponseSink for H2Sink {
    async fn send(&mut self, response_bytes: Vec<u8>) -> Result<(), DomainError> {
        let response = http::Response::builder()
            .status(StatusCode::OK)
            .header(header::CONTENT_TYPE, DNS_MESSAGE_CONTENT_TYPE)
            .header(header::CONTENT_LENGTH, response_bytes.len())
            .header(header::CACHE_CONTROL, "no-cache, no-store, must-revalidate")
            .header(header::X_CONTENT_TYPE_OPTIONS, "nosniff")
            .body(())
            .map_err(|e| {
                DomainError::IoError(format!("Failed to build HTTPS response: {}", e))
            })?;

        let mut stream = self.respond.send_response(response, false).map_err(|e| {
            DomainError::IoError(format!(
                "Failed to send HTTPS response to {}: {}",
                self.peer, e
            ))
        })?;
        self.responded = true;
        stream
            .send_data(Bytes::from(response_bytes), true)
            .map_err(|e| {
                DomainError::IoError(format!(
                    "Failed to send HTTPS body to {}: {}",
                    self.peer, e
                ))
            })?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_dns_param_found_among_other_params() {
        assert_eq!(dns_param("dns=AAABAA"), Some("AAABAA"));
        assert_eq!(dns_param("other=1&dns=q80BAA&more=2"), Some("q80BAA"));
    }

    #[test]
    fn test_dns_param_missing() {
        assert_eq!(dns_param("other=1"), None);
        assert_eq!(dns_param(""), None);
    }

    fn peer() -> SocketAddr {
        "127.0.0.1:4433".parse().unwrap()
    }

    /// Drives one h2 exchange over an in-memory pipe and returns what the
    /// client saw: status, body bytes, whether more data followed.
    async fn run_h2_exchange<F>(server_side: F) -> (StatusCode, Vec<u8>, bool)
    where
        F: FnOnce(H2Sink) -> futures::future::BoxFuture<'static, ()> + Send + 'static,
    {
        let (client_io, server_io) = tokio::io::duplex(16 * 1024);

        let server = tokio::spawn(async move {
            let mut conn = h2::server::handshake(server_io).await.unwrap();
            let (_request, respond) = conn.accept().await.unwrap().unwrap();
            let sink = H2Sink {
                respond,
                peer: peer(),
                responded: false,
            };
            server_side(sink).await;
            while let Some(next) = conn.accept().await {
                if next.is_err() {
                    break;
                }
            }
        });

        let (client, connection) = h2::client::handshake(client_io).await.unwrap();
        tokio::spawn(async move {
            let _ = connection.await;
        });

        let request = http::Request::builder()
            .method(Method::POST)
            .uri("https://dns.test/dns-query")
            .body(())
            .unwrap();
        let mut client = client.ready().await.unwrap();
        let (response, _send_stream) = client.send_request(request, true).unwrap();
        let response = response.await.unwrap();
        let status = response.status();

        let mut body = response.into_body();
        let mut bytes = Vec::new();
        let mut trailing_data = false;
        while let Some(frame) = body.data().await {
            match frame {
                Ok(frame) => {
                    let _ = body.flow_control().release_capacity(frame.len());
                    if bytes.is_empty() {
                        bytes.extend_from_slice(&frame);
                    } else {
                        trailing_data = true;
                    }
                }
                Err(_) => {
                    trailing_data = true;
                    break;
                }
            }
        }

        server.abort();
        (status, bytes, trailing_data)
    }

    #[tokio::test]
    async fn test_reject_after_send_does_not_double_respond() {
        let payload = vec![0xAB, 0xCD, 0x01, 0x00];
        let expected = payload.clone();
        let (status, body, trailing) = run_h2_exchange(move |mut sink| {
            Box::pin(async move {
                sink.send(payload).await.unwrap();
                sink.reject(StatusCode::BAD_REQUEST);
            })
        })
        .await;

        assert_eq!(status, StatusCode::OK);
        assert_eq!(body, expected);
        assert!(!trailing);
    }

    #[tokio::test]
    async fn test_reject_before_send_delivers_status() {
        let (status, body, _) = run_h2_exchange(move |mut sink| {
            Box::pin(async move {
                sink.reject(StatusCode::NOT_FOUND);
            })
        })
        .await;

        assert_eq!(status, StatusCode::NOT_FOUND);
        assert!(body.is_empty());
    }
}
