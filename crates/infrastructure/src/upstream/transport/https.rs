//! DNS-over-HTTPS exchange transport (RFC 8484)
//!
//! Queries go out as HTTP/2 POST requests with an application/dns-message
//! body. The reqwest client is built by the pool with a resolver override
//! so the URL hostname connects to the bootstrap-resolved address instead
//! of triggering a system lookup.

use super::DnsTransport;
use async_trait::async_trait;
use fleet_dns_domain::DomainError;
use std::time::Duration;
use tracing::debug;

pub(crate) const DNS_MESSAGE_CONTENT_TYPE: &str = "application/dns-message";

/// HTTP/2-only client for one DoH endpoint, pinned to its resolved address.
pub(crate) fn https_client(
    hostname: &str,
    resolved: std::net::SocketAddr,
    timeout: Duration,
) -> Result<reqwest::Client, DomainError> {
    reqwest::Client::builder()
        .use_rustls_tls()
        .http2_prior_knowledge()
        .resolve(hostname, resolved)
        .pool_max_idle_per_host(4)
        .timeout(timeout)
        .build()
        .map_err(|e| DomainError::ConfigError(format!("Failed to build HTTPS client: {}", e)))
}

pub struct HttpsTransport {
    url: String,
    client: reqwest::Client,
}

impl HttpsTransport {
    pub fn new(url: String, client: reqwest::Client) -> Self {
        Self { url, client }
    }

    fn map_request_error(&self, e: reqwest::Error) -> DomainError {
        if e.is_timeout() {
            DomainError::TransportTimeout {
                server: self.url.clone(),
            }
        } else if e.is_connect() {
            DomainError::TransportConnectionRefused {
                server: format!("{}: {}", self.url, e),
            }
        } else {
            DomainError::IoError(format!("HTTPS exchange with {} failed: {}", self.url, e))
        }
    }
}

#[async_trait]
impl DnsTransport for HttpsTransport {
    async fn send(&self, message_bytes: &[u8], timeout: Duration) -> Result<Vec<u8>, DomainError> {
        let response = self
            .client
            .post(&self.url)
            .header(reqwest::header::CONTENT_TYPE, DNS_MESSAGE_CONTENT_TYPE)
            .header(reqwest::header::ACCEPT, DNS_MESSAGE_CONTENT_TYPE)
            .timeout(timeout)
            .body(message_bytes.to_vec())
            .send()
            .await
            .map_err(|e| self.map_request_error(e))?;

        let status = response.status();
        if !status.is_success() {
            return Err(DomainError::IoError(format!(
                "HTTPS upstream {} answered {}",
                self.url, status
            )));
        }

        let body = response
            .bytes()
            .await
            .map_err(|e| self.map_request_error(e))?;

        debug!(url = %self.url, response_len = body.len(), "HTTPS response received");

        Ok(body.to_vec())
    }

    fn protocol_name(&self) -> &'static str {
        "HTTPS"
    }
}
