mod response_sink;
mod upstream_exchange;

pub use response_sink::ResponseSink;
pub use upstream_exchange::{RaceOutcome, UpstreamExchange};
