use std::sync::Arc;

use hickory_proto::op::{Message, ResponseCode};
use tracing::{debug, warn};

use crate::ports::{ResponseSink, UpstreamExchange};
use fleet_dns_domain::DomainError;

/// Orchestrates one client query end to end: decode, race the upstream
/// pool, apply the transport's size policy, encode, send.
pub struct ResolveQueryUseCase {
    pool: Arc<dyn UpstreamExchange>,
}

impl ResolveQueryUseCase {
    pub fn new(pool: Arc<dyn UpstreamExchange>) -> Self {
        Self { pool }
    }

    /// Handle one decoded-or-not client query.
    ///
    /// A decode failure is returned to the adapter, which owns the
    /// drop-or-close decision for its transport. Past a successful decode
    /// exactly one response is produced: an upstream race failure becomes a
    /// SERVFAIL carrying the query's transaction ID and question. An
    /// unserializable response is logged and dropped without poisoning the
    /// client's connection.
    pub async fn execute<S: ResponseSink>(
        &self,
        query_bytes: &[u8],
        sink: &mut S,
    ) -> Result<(), DomainError> {
        let query = Message::from_vec(query_bytes)
            .map_err(|e| DomainError::MessageDecode(e.to_string()))?;

        let query = self.filter_blocked(query);
        let query = self.attach_client_subnet(query);

        let response = match self.pool.exchange(&query).await {
            Ok(outcome) => {
                debug!(
                    id = query.id(),
                    server = %outcome.server,
                    latency_ms = outcome.latency_ms,
                    "Upstream race resolved"
                );
                outcome.response
            }
            Err(e) => {
                warn!(id = query.id(), error = %e, "All upstreams failed, answering SERVFAIL");
                servfail_response(&query)
            }
        };

        let response = self.clamp_ttls(response);

        let encoded = match self.encode_bounded(&query, &response, sink) {
            Ok(bytes) => bytes,
            Err(e) => {
                warn!(id = query.id(), error = %e, "Failed to encode response, dropping");
                return Ok(());
            }
        };

        sink.send(encoded).await
    }

    /// Pre-race filter stage.
    // TODO: answer REFUSED for names listed in options.block_domains
    fn filter_blocked(&self, query: Message) -> Message {
        query
    }

    /// Pre-race augmentation stage.
    // TODO: attach the configured EDNS0 client-subnet option (options.edns0_subnet)
    fn attach_client_subnet(&self, query: Message) -> Message {
        query
    }

    /// Post-race rewrite stage.
    // TODO: clamp answer TTLs into [options.ttl_min, options.ttl_max]
    fn clamp_ttls(&self, response: Message) -> Message {
        response
    }

    /// Encode `response`, shrinking it to the sink's bound when one applies.
    fn encode_bounded<S: ResponseSink>(
        &self,
        query: &Message,
        response: &Message,
        sink: &S,
    ) -> Result<Vec<u8>, DomainError> {
        let encoded = response
            .to_vec()
            .map_err(|e| DomainError::MessageEncode(e.to_string()))?;

        let Some(limit) = sink.max_response_size(query) else {
            return Ok(encoded);
        };
        if encoded.len() <= limit as usize {
            return Ok(encoded);
        }

        debug!(
            id = query.id(),
            size = encoded.len(),
            limit,
            "Response exceeds datagram bound, truncating"
        );
        truncate_to_fit(response, limit as usize)
    }
}

/// SERVFAIL built directly from the query, so the client can match it to
/// its outstanding request: same transaction ID, same question section.
fn servfail_response(query: &Message) -> Message {
    let mut response = Message::error_msg(query.id(), query.op_code(), ResponseCode::ServFail);
    for q in query.queries() {
        response.add_query(q.clone());
    }
    response
        .set_recursion_desired(query.recursion_desired())
        .set_recursion_available(true);
    response
}

/// Rebuilds `response` under `limit` bytes with the truncation flag set:
/// authority and additional records are dropped first, then answers from
/// the back. The header is never touched. Falls back to a header-only
/// reply in the degenerate case where not even the question fits.
fn truncate_to_fit(response: &Message, limit: usize) -> Result<Vec<u8>, DomainError> {
    let mut trimmed = response.clone();
    trimmed.set_truncated(true);
    trimmed.take_name_servers();
    trimmed.take_additionals();

    loop {
        let encoded = trimmed
            .to_vec()
            .map_err(|e| DomainError::MessageEncode(e.to_string()))?;
        if encoded.len() <= limit {
            return Ok(encoded);
        }

        let mut answers = trimmed.take_answers();
        if answers.pop().is_none() {
            return trimmed
                .truncate()
                .to_vec()
                .map_err(|e| DomainError::MessageEncode(e.to_string()));
        }
        trimmed.insert_answers(answers);
    }
}
