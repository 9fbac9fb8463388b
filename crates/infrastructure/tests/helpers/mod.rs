#![allow(dead_code)]

use hickory_proto::op::{Message, MessageType, OpCode, Query};
use hickory_proto::rr::rdata::{A, TXT};
use hickory_proto::rr::{Name, RData, Record, RecordType};
use std::net::{Ipv4Addr, SocketAddr};
use std::time::Duration;

/// Knobs for one in-process mock upstream resolver.
#[derive(Clone, Default)]
pub struct MockUpstreamBehavior {
    /// Artificial latency before every answer.
    pub delay: Duration,
    /// Offset applied to the echoed transaction id; nonzero makes every
    /// answer invalid to the racing pool.
    pub id_offset: u16,
    /// TXT filler answers of ~100 bytes each, for oversizing responses.
    pub txt_answers: usize,
}

impl MockUpstreamBehavior {
    pub fn answering() -> Self {
        Self::default()
    }

    pub fn delayed(delay: Duration) -> Self {
        Self {
            delay,
            ..Self::default()
        }
    }

    pub fn wrong_transaction_id() -> Self {
        Self {
            id_offset: 1,
            ..Self::default()
        }
    }

    pub fn oversized(txt_answers: usize) -> Self {
        Self {
            txt_answers,
            ..Self::default()
        }
    }
}

/// Binds a UDP answering socket on a loopback port and serves queries on a
/// background task until the test runtime drops it.
pub async fn spawn_mock_udp_upstream(behavior: MockUpstreamBehavior) -> SocketAddr {
    let socket = tokio::net::UdpSocket::bind("127.0.0.1:0").await.unwrap();
    let addr = socket.local_addr().unwrap();

    tokio::spawn(async move {
        let mut buf = [0u8; 4096];
        loop {
            let Ok((len, peer)) = socket.recv_from(&mut buf).await else {
                break;
            };
            let Ok(query) = Message::from_vec(&buf[..len]) else {
                continue;
            };

            if !behavior.delay.is_zero() {
                tokio::time::sleep(behavior.delay).await;
            }

            let response = mock_answer(&query, &behavior);
            let Ok(bytes) = response.to_vec() else {
                continue;
            };
            let _ = socket.send_to(&bytes, peer).await;
        }
    });

    addr
}

fn mock_answer(query: &Message, behavior: &MockUpstreamBehavior) -> Message {
    let mut response = query.clone();
    let mut header = *query.header();
    header.set_id(query.id().wrapping_add(behavior.id_offset));
    header.set_message_type(MessageType::Response);
    response.set_header(header);
    response.set_recursion_available(true);

    if let Some(first) = query.queries().first() {
        let name = first.name().clone();
        response.add_answer(Record::from_rdata(
            name.clone(),
            60,
            RData::A(A(Ipv4Addr::new(192, 0, 2, 1))),
        ));
        for i in 0..behavior.txt_answers {
            let txt = TXT::new(vec![format!("filler-{i:04}-{}", "x".repeat(90))]);
            response.add_answer(Record::from_rdata(name.clone(), 60, RData::TXT(txt)));
        }
    }

    response
}

/// Binds a UDP socket that swallows every datagram without answering.
pub async fn spawn_black_hole_upstream() -> SocketAddr {
    let socket = tokio::net::UdpSocket::bind("127.0.0.1:0").await.unwrap();
    let addr = socket.local_addr().unwrap();

    tokio::spawn(async move {
        let mut buf = [0u8; 512];
        loop {
            let _ = socket.recv_from(&mut buf).await;
        }
    });

    addr
}

pub fn query_message(id: u16, name: &str) -> Message {
    let mut query = Message::new(id, MessageType::Query, OpCode::Query);
    query.set_recursion_desired(true);
    query.add_query(Query::query(Name::from_ascii(name).unwrap(), RecordType::A));
    query
}

pub fn query_bytes(id: u16, name: &str) -> Vec<u8> {
    query_message(id, name).to_vec().unwrap()
}
