//! TLS identity shared by the encrypted listeners
//!
//! The certificate chain and private key are loaded once at startup and
//! turned into one rustls server config per listener, since each protocol
//! wants different ALPN identifiers and minimum TLS versions.

use fleet_dns_domain::DomainError;
use rustls::pki_types::{CertificateDer, PrivateKeyDer};
use std::fs::File;
use std::io::BufReader;
use std::path::Path;
use std::sync::Arc;

pub struct TlsIdentity {
    certs: Vec<CertificateDer<'static>>,
    key: PrivateKeyDer<'static>,
}

impl TlsIdentity {
    /// Loads a PEM certificate chain and private key from disk.
    pub fn load(cert_path: &Path, key_path: &Path) -> Result<Self, DomainError> {
        let cert_file = File::open(cert_path).map_err(|e| {
            DomainError::ConfigError(format!(
                "Failed to open certificate file {}: {}",
                cert_path.display(),
                e
            ))
        })?;
        let certs = rustls_pemfile::certs(&mut BufReader::new(cert_file))
            .collect::<Result<Vec<_>, _>>()
            .map_err(|e| {
                DomainError::ConfigError(format!(
                    "Failed to parse certificates in {}: {}",
                    cert_path.display(),
                    e
                ))
            })?;
        if certs.is_empty() {
            return Err(DomainError::ConfigError(format!(
                "No certificates found in {}",
                cert_path.display()
            )));
        }

        let key_file = File::open(key_path).map_err(|e| {
            DomainError::ConfigError(format!(
                "Failed to open key file {}: {}",
                key_path.display(),
                e
            ))
        })?;
        let key = rustls_pemfile::private_key(&mut BufReader::new(key_file))
            .map_err(|e| {
                DomainError::ConfigError(format!(
                    "Failed to parse key in {}: {}",
                    key_path.display(),
                    e
                ))
            })?
            .ok_or_else(|| {
                DomainError::ConfigError(format!(
                    "No private key found in {}",
                    key_path.display()
                ))
            })?;

        Ok(Self { certs, key })
    }

    /// Server config for the DNS-over-TLS listener. TLS 1.2 or newer, no
    /// ALPN requirement.
    pub fn dot_server_config(&self) -> Result<Arc<rustls::ServerConfig>, DomainError> {
        let _ = rustls::crypto::aws_lc_rs::default_provider().install_default();

        let config = rustls::ServerConfig::builder()
            .with_no_client_auth()
            .with_single_cert(self.certs.clone(), self.key.clone_key())
            .map_err(|e| DomainError::ConfigError(format!("Invalid TLS identity: {}", e)))?;
        Ok(Arc::new(config))
    }

    /// Server config for the DNS-over-QUIC listener. QUIC mandates TLS 1.3
    /// and RFC 9250 mandates the "doq" ALPN.
    pub fn doq_server_config(&self) -> Result<Arc<rustls::ServerConfig>, DomainError> {
        let _ = rustls::crypto::aws_lc_rs::default_provider().install_default();

        let mut config =
            rustls::ServerConfig::builder_with_protocol_versions(&[&rustls::version::TLS13])
                .with_no_client_auth()
                .with_single_cert(self.certs.clone(), self.key.clone_key())
                .map_err(|e| DomainError::ConfigError(format!("Invalid TLS identity: {}", e)))?;
        config.alpn_protocols = vec![b"doq".to_vec()];
        Ok(Arc::new(config))
    }

    /// Server config for the DNS-over-HTTPS listener, advertising HTTP/2.
    pub fn doh_server_config(&self) -> Result<Arc<rustls::ServerConfig>, DomainError> {
        let _ = rustls::crypto::aws_lc_rs::default_provider().install_default();

        let mut config = rustls::ServerConfig::builder()
            .with_no_client_auth()
            .with_single_cert(self.certs.clone(), self.key.clone_key())
            .map_err(|e| DomainError::ConfigError(format!("Invalid TLS identity: {}", e)))?;
        config.alpn_protocols = vec![b"h2".to_vec()];
        Ok(Arc::new(config))
    }
}
