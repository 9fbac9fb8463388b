use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ServerConfig {
    /// Bind address shared by every listener.
    #[serde(default = "default_bind_address")]
    pub bind_address: String,

    /// Classic DNS port; UDP and TCP share it.
    #[serde(default = "default_dns_port")]
    pub dns_port: u16,

    /// DNS-over-TLS port; 0 disables the listener.
    #[serde(default)]
    pub tls_port: u16,

    /// DNS-over-QUIC port; 0 disables the listener.
    #[serde(default)]
    pub quic_port: u16,

    /// DNS-over-HTTPS port; 0 disables the listener.
    #[serde(default)]
    pub https_port: u16,

    /// URL path served by the DNS-over-HTTPS listener.
    #[serde(default = "default_https_path")]
    pub https_path: String,

    /// PEM certificate chain, required once any encrypted listener is enabled.
    #[serde(default)]
    pub cert_file: String,

    /// PEM private key, required once any encrypted listener is enabled.
    #[serde(default)]
    pub key_file: String,
}

impl ServerConfig {
    /// True when at least one TLS-backed listener is configured.
    pub fn any_encrypted_listener(&self) -> bool {
        self.tls_port != 0 || self.quic_port != 0 || self.https_port != 0
    }
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_address: default_bind_address(),
            dns_port: default_dns_port(),
            tls_port: 0,
            quic_port: 0,
            https_port: 0,
            https_path: default_https_path(),
            cert_file: String::new(),
            key_file: String::new(),
        }
    }
}

fn default_bind_address() -> String {
    "0.0.0.0".to_string()
}

fn default_dns_port() -> u16 {
    53
}

fn default_https_path() -> String {
    "/dns-query".to_string()
}
