use async_trait::async_trait;
use fleet_dns_domain::DomainError;
use hickory_proto::op::Message;

/// Result of one upstream race: the winning response and where it came from.
/// The server identity is kept for instrumentation; it does not influence
/// later routing.
#[derive(Debug, Clone)]
pub struct RaceOutcome {
    pub response: Message,
    pub server: String,
    pub latency_ms: u64,
}

/// The resolution engine's only view of the upstream pool.
///
/// One call races the query against every configured endpoint and resolves
/// to the first decodable answer, or fails once all attempts have failed or
/// timed out. Implementations must bound every attempt; a stalled endpoint
/// never stalls the caller past the configured per-attempt timeout.
#[async_trait]
pub trait UpstreamExchange: Send + Sync {
    async fn exchange(&self, query: &Message) -> Result<RaceOutcome, DomainError>;
}
