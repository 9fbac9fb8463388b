//! Classic DNS over UDP listener
//!
//! Datagrams are independent, so each one is handled on its own task.
//! Responses are bounded by the client's advertised EDNS0 size (or the
//! 512-byte classic minimum) and truncated by the engine when they do
//! not fit. A datagram that fails to decode is logged and skipped; the
//! socket keeps serving.

use super::{is_unrecoverable_socket_error, reap_tasks, sanitize_src_address};
use async_trait::async_trait;
use fleet_dns_application::{ResolveQueryUseCase, ResponseSink};
use fleet_dns_domain::DomainError;
use hickory_proto::op::Message;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

/// Enough for any client query; responses are not received here.
const UDP_RECV_BUFFER_SIZE: usize = 512;

pub(crate) async fn serve_udp(
    socket: net::UdpSocket,
    engine: Arc<ResolveQueryUseCase>,
    shutdown: CancellationToken,
) -> Result<(), DomainError> {
    let socket = Arc::new(socket);
    let mut inner_join_set = JoinSet::new();
    let mut buf = [0u8; UDP_RECV_BUFFER_SIZE];

    loop {
        let received = tokio::select! {
            received = socket.recv_from(&mut buf) => received,
            _ = shutdown.cancelled() => break,
        };

        let (len, src_addr) = match received {
            Ok(r) => r,
            Err(e) => {
                warn!(error = %e, "error receiving UDP datagram");
                if is_unrecoverable_socket_error(&e) {
                    break;
                }
                continue;
            }
        };

        if let Err(e) = sanitize_src_address(src_addr) {
            warn!(src = %src_addr, "ignoring datagram: {}", e);
            continue;
        }

        let query_bytes = buf[..len].to_vec();
        let engine = engine.clone();
        let socket = socket.clone();

        inner_join_set.spawn(async move {
            let mut sink = DatagramSink {
                socket,
                peer: src_addr,
            };
            if let Err(e) = engine.execute(&query_bytes, &mut sink).await {
                debug!(src = %src_addr, error = %e, "dropped UDP query");
            }
        });

        reap_tasks(&mut inner_join_set);
    }

    if shutdown.is_cancelled() {
        Ok(())
    } else {
        Err(DomainError::IoError("unexpected close of UDP socket".into()))
    }
}

/// Response sink writing one datagram back to the querying client.
pub(crate) struct DatagramSink {
    socket: Arc<net::UdpSocket>,
    peer: SocketAddr,
}

#[async_trait]
impl ResponseSink for DatagramSink {
    fn max_response_size(&self, query: &Message) -> Option<u16> {
        // max_payload is the EDNS0 advertised size, or 512 without EDNS.
        Some(query.max_payload())
    }

    async fn send(&mut self, response_bytes: Vec<u8>) -> Result<(), DomainError> {
        self.socket
            .send_to(&response_bytes, self.peer)
            .await
            .map_err(|e| {
                DomainError::IoError(format!("Failed to send UDP response to {}: {}", self.peer, e))
            })?;
        Ok(())
    }
}
