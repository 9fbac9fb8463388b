#![allow(dead_code)]

use async_trait::async_trait;
use fleet_dns_application::ports::{RaceOutcome, ResponseSink, UpstreamExchange};
use fleet_dns_domain::DomainError;
use hickory_proto::op::{Message, MessageType, OpCode, Query};
use hickory_proto::rr::rdata::TXT;
use hickory_proto::rr::{Name, RData, Record, RecordType};

/// Pool stand-in answering every exchange with one canned outcome.
pub struct MockUpstreamExchange {
    outcome: Result<RaceOutcome, DomainError>,
}

impl MockUpstreamExchange {
    pub fn answering(response: Message) -> Self {
        Self {
            outcome: Ok(RaceOutcome {
                response,
                server: "udp://127.0.0.1:53".to_string(),
                latency_ms: 1,
            }),
        }
    }

    pub fn failing(error: DomainError) -> Self {
        Self {
            outcome: Err(error),
        }
    }
}

#[async_trait]
impl UpstreamExchange for MockUpstreamExchange {
    async fn exchange(&self, _query: &Message) -> Result<RaceOutcome, DomainError> {
        self.outcome.clone()
    }
}

/// Unbounded sink standing in for the stream and HTTP channel variants.
#[derive(Default)]
pub struct CaptureSink {
    pub sent: Vec<Vec<u8>>,
}

#[async_trait]
impl ResponseSink for CaptureSink {
    async fn send(&mut self, response_bytes: Vec<u8>) -> Result<(), DomainError> {
        self.sent.push(response_bytes);
        Ok(())
    }
}

/// Sink mirroring the datagram adapter's bound: max(client EDNS0 size, 512).
#[derive(Default)]
pub struct DatagramSink {
    pub sent: Vec<Vec<u8>>,
}

#[async_trait]
impl ResponseSink for DatagramSink {
    fn max_response_size(&self, query: &Message) -> Option<u16> {
        Some(query.max_payload())
    }

    async fn send(&mut self, response_bytes: Vec<u8>) -> Result<(), DomainError> {
        self.sent.push(response_bytes);
        Ok(())
    }
}

pub fn query_message(id: u16, name: &str) -> Message {
    let mut query = Message::new(id, MessageType::Query, OpCode::Query);
    query.set_recursion_desired(true);
    query.add_query(Query::query(
        Name::from_ascii(name).unwrap(),
        RecordType::TXT,
    ));
    query
}

/// Response to `query` padded out with `records` TXT answers of ~100 bytes
/// each, so tests can push the encoding past any datagram bound.
pub fn answer_message(query: &Message, records: usize) -> Message {
    let mut response = query.clone();
    let mut header = *query.header();
    header.set_message_type(MessageType::Response);
    response.set_header(header);
    let name = query.queries()[0].name().clone();
    for i in 0..records {
        let txt = TXT::new(vec![format!("filler-{i:04}-{}", "x".repeat(90))]);
        response.add_answer(Record::from_rdata(name.clone(), 300, RData::TXT(txt)));
    }
    response
}
