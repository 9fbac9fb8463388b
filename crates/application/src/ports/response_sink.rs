use async_trait::async_trait;
use fleet_dns_domain::DomainError;
use hickory_proto::op::Message;

/// Write half of one client exchange, handed to the resolution engine by a
/// transport adapter. Three variants exist: datagram, length-prefixed
/// stream, and HTTP message. The engine never sees which one it holds.
#[async_trait]
pub trait ResponseSink: Send {
    /// Size bound for one encoded response, derived from the client's
    /// query. Transports without a per-message bound return `None`.
    fn max_response_size(&self, _query: &Message) -> Option<u16> {
        None
    }

    /// Write one response back to the client, framed however the transport
    /// frames messages. Consumes the exchange for one-shot transports.
    async fn send(&mut self, response_bytes: Vec<u8>) -> Result<(), DomainError>;
}
