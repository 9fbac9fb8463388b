//! Fleet DNS Application Layer
pub mod ports;
pub mod use_cases;

pub use ports::{RaceOutcome, ResponseSink, UpstreamExchange};
pub use use_cases::ResolveQueryUseCase;
