//! TLS/SSL configuration types for secure client connections.
//!
//! # Custom CA Certificates
//!
//! ```ignore
//! use tether_net::tls::{Certificate, TlsConfig};
//!
//! // Load from PEM file
//! let ca_cert = Certificate::from_pem_file("/path/to/ca.crt")?;
//!
//! let tls = TlsConfig::new().add_root_certificate(ca_cert);
//! let client = TlsNetClient::with_config(NetClientConfig::new("broker.local", 8883), tls)?;
//! ```
//!
//! # Client Certificates (mTLS)
//!
//! ```ignore
//! use tether_net::tls::{Identity, TlsConfig};
//!
//! let identity = Identity::from_pem_files("/path/to/client.crt", "/path/to/client.key")?;
//! let tls = TlsConfig::new().identity(identity);
//! ```
//!
//! # Skipping Verification
//!
//! ```ignore
//! // Accept any server certificate (self-signed lab equipment, tests)
//! let client = TlsNetClient::new("192.168.1.20", 4840, false, Some("lab"))?;
//! ```

use std::io::{BufReader, Cursor};
use std::path::Path;
use std::sync::Arc;

use rustls::client::WantsClientCert;
use rustls::pki_types::{CertificateDer, PrivateKeyDer};
use rustls::{ClientConfig, ConfigBuilder, RootCertStore};

use crate::error::{NetworkError, Result};

/// Minimum TLS protocol version.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum TlsVersion {
    /// TLS 1.2 (default minimum).
    #[default]
    Tls1_2,
    /// TLS 1.3 (most secure).
    Tls1_3,
}

impl TlsVersion {
    /// Convert to rustls protocol versions.
    pub(crate) fn to_rustls_versions(self) -> Vec<&'static rustls::SupportedProtocolVersion> {
        match self {
            TlsVersion::Tls1_2 => vec![&rustls::version::TLS12, &rustls::version::TLS13],
            TlsVersion::Tls1_3 => vec![&rustls::version::TLS13],
        }
    }
}

/// ALPN (Application-Layer Protocol Negotiation) protocol.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AlpnProtocol {
    /// HTTP/1.1
    Http1,
    /// HTTP/2
    H2,
    /// Custom protocol identifier.
    Custom(Vec<u8>),
}

impl AlpnProtocol {
    /// Get the protocol identifier bytes.
    pub fn as_bytes(&self) -> &[u8] {
        match self {
            AlpnProtocol::Http1 => b"http/1.1",
            AlpnProtocol::H2 => b"h2",
            AlpnProtocol::Custom(bytes) => bytes,
        }
    }
}

fn read_file(path: &Path, what: &str) -> Result<Vec<u8>> {
    std::fs::read(path).map_err(|e| {
        NetworkError::Tls(format!(
            "Failed to read {what} file '{}': {e}",
            path.display()
        ))
    })
}

fn parse_pem_certs(pem: &[u8]) -> Result<Vec<CertificateDer<'static>>> {
    let mut reader = BufReader::new(Cursor::new(pem));
    let certs = rustls_pemfile::certs(&mut reader)
        .collect::<std::result::Result<Vec<_>, _>>()
        .map_err(|e| NetworkError::Tls(format!("Failed to parse PEM certificate: {e}")))?;

    if certs.is_empty() {
        return Err(NetworkError::Tls(
            "No certificates found in PEM data".to_string(),
        ));
    }
    Ok(certs)
}

/// A TLS certificate to add to the trust store.
#[derive(Clone)]
pub struct Certificate {
    der_certs: Vec<CertificateDer<'static>>,
}

impl std::fmt::Debug for Certificate {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Certificate")
            .field("cert_count", &self.der_certs.len())
            .finish()
    }
}

impl Certificate {
    /// Load a certificate from PEM-encoded bytes.
    ///
    /// This can contain multiple certificates (a certificate chain).
    pub fn from_pem(pem_data: impl AsRef<[u8]>) -> Result<Self> {
        Ok(Self {
            der_certs: parse_pem_certs(pem_data.as_ref())?,
        })
    }

    /// Load a certificate from a PEM-encoded file.
    pub fn from_pem_file(path: impl AsRef<Path>) -> Result<Self> {
        Self::from_pem(read_file(path.as_ref(), "certificate")?)
    }

    /// Load a certificate from DER-encoded bytes.
    pub fn from_der(der_data: impl Into<Vec<u8>>) -> Self {
        Self {
            der_certs: vec![CertificateDer::from(der_data.into())],
        }
    }

    /// Get the DER-encoded certificates.
    pub(crate) fn der_certs(&self) -> &[CertificateDer<'static>] {
        &self.der_certs
    }
}

/// Client identity for mutual TLS (mTLS) authentication.
pub struct Identity {
    cert_chain: Vec<CertificateDer<'static>>,
    private_key: PrivateKeyDer<'static>,
}

impl Clone for Identity {
    fn clone(&self) -> Self {
        Self {
            cert_chain: self.cert_chain.clone(),
            private_key: self.private_key.clone_key(),
        }
    }
}

impl std::fmt::Debug for Identity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Identity")
            .field("cert_count", &self.cert_chain.len())
            .field("has_key", &true)
            .finish()
    }
}

impl Identity {
    /// Create an identity from PEM-encoded certificate and key bytes.
    ///
    /// The certificate can be a single certificate or a chain (client
    /// certificate first, followed by intermediates).
    pub fn from_pem(cert_pem: impl AsRef<[u8]>, key_pem: impl AsRef<[u8]>) -> Result<Self> {
        let cert_chain = parse_pem_certs(cert_pem.as_ref())?;

        let mut key_reader = BufReader::new(Cursor::new(key_pem.as_ref()));
        let private_key = rustls_pemfile::private_key(&mut key_reader)
            .map_err(|e| NetworkError::Tls(format!("Failed to parse private key PEM: {e}")))?
            .ok_or_else(|| NetworkError::Tls("No private key found in PEM data".to_string()))?;

        Ok(Self {
            cert_chain,
            private_key,
        })
    }

    /// Create an identity from PEM-encoded files.
    pub fn from_pem_files(
        cert_path: impl AsRef<Path>,
        key_path: impl AsRef<Path>,
    ) -> Result<Self> {
        let cert_pem = read_file(cert_path.as_ref(), "certificate")?;
        let key_pem = read_file(key_path.as_ref(), "key")?;
        Self::from_pem(cert_pem, key_pem)
    }
}

/// Complete TLS configuration for a client connection.
#[derive(Debug, Clone, Default)]
pub struct TlsConfig {
    /// Additional root certificates to trust.
    pub root_certificates: Vec<Certificate>,
    /// Whether to use only the provided root certificates (no bundled roots).
    pub use_only_custom_roots: bool,
    /// Client identity for mutual TLS.
    pub identity: Option<Identity>,
    /// Minimum TLS version.
    pub min_version: TlsVersion,
    /// ALPN protocols to advertise.
    pub alpn_protocols: Vec<AlpnProtocol>,
    /// Accept invalid/self-signed certificates (DANGEROUS - testing only).
    pub danger_accept_invalid_certs: bool,
}

impl TlsConfig {
    /// Create a new TLS configuration with defaults.
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a root certificate to trust.
    pub fn add_root_certificate(mut self, cert: Certificate) -> Self {
        self.root_certificates.push(cert);
        self
    }

    /// Use only custom root certificates (disable the bundled web PKI roots).
    pub fn use_only_custom_roots(mut self) -> Self {
        self.use_only_custom_roots = true;
        self
    }

    /// Set the client identity for mutual TLS.
    pub fn identity(mut self, identity: Identity) -> Self {
        self.identity = Some(identity);
        self
    }

    /// Set the minimum TLS version.
    pub fn min_version(mut self, version: TlsVersion) -> Self {
        self.min_version = version;
        self
    }

    /// Add an ALPN protocol.
    pub fn alpn_protocol(mut self, protocol: AlpnProtocol) -> Self {
        self.alpn_protocols.push(protocol);
        self
    }

    /// Accept invalid certificates (DANGEROUS - for testing only).
    ///
    /// # Warning
    ///
    /// This disables certificate verification and makes the connection
    /// vulnerable to man-in-the-middle attacks.
    pub fn danger_accept_invalid_certs(mut self) -> Self {
        self.danger_accept_invalid_certs = true;
        self
    }

    /// Build a rustls ClientConfig from this TLS configuration.
    pub fn build_rustls_config(&self) -> Result<Arc<ClientConfig>> {
        let provider = Arc::new(rustls::crypto::ring::default_provider());
        let versions = self.min_version.to_rustls_versions();
        let builder = ClientConfig::builder_with_provider(provider)
            .with_protocol_versions(&versions)
            .map_err(|e| NetworkError::Tls(format!("Unsupported protocol versions: {e}")))?;

        let builder = if self.danger_accept_invalid_certs {
            builder
                .dangerous()
                .with_custom_certificate_verifier(Arc::new(DangerousVerifier))
        } else {
            builder.with_root_certificates(self.build_root_store()?)
        };

        let mut config = self.with_client_auth(builder)?;

        if !self.alpn_protocols.is_empty() {
            config.alpn_protocols = self
                .alpn_protocols
                .iter()
                .map(|p| p.as_bytes().to_vec())
                .collect();
        }

        Ok(Arc::new(config))
    }

    fn with_client_auth(
        &self,
        builder: ConfigBuilder<ClientConfig, WantsClientCert>,
    ) -> Result<ClientConfig> {
        match &self.identity {
            Some(identity) => builder
                .with_client_auth_cert(
                    identity.cert_chain.clone(),
                    identity.private_key.clone_key(),
                )
                .map_err(|e| NetworkError::Tls(format!("Invalid client certificate: {e}"))),
            None => Ok(builder.with_no_client_auth()),
        }
    }

    /// Build a root certificate store.
    fn build_root_store(&self) -> Result<RootCertStore> {
        let mut root_store = RootCertStore::empty();

        if !self.use_only_custom_roots {
            root_store.extend(webpki_roots::TLS_SERVER_ROOTS.iter().cloned());
        }

        for cert in &self.root_certificates {
            for der_cert in cert.der_certs() {
                root_store.add(der_cert.clone()).map_err(|e| {
                    NetworkError::Tls(format!("Failed to add root certificate: {e}"))
                })?;
            }
        }

        if root_store.is_empty() {
            return Err(NetworkError::Tls(
                "No root certificates available. Either add custom certificates or \
                 don't use use_only_custom_roots()"
                    .to_string(),
            ));
        }

        Ok(root_store)
    }
}

/// A certificate verifier that accepts all certificates.
///
/// Installed when `danger_accept_invalid_certs` is enabled.
#[derive(Debug)]
struct DangerousVerifier;

impl rustls::client::danger::ServerCertVerifier for DangerousVerifier {
    fn verify_server_cert(
        &self,
        _end_entity: &CertificateDer<'_>,
        _intermediates: &[CertificateDer<'_>],
        _server_name: &rustls::pki_types::ServerName<'_>,
        _ocsp_response: &[u8],
        _now: rustls::pki_types::UnixTime,
    ) -> std::result::Result<rustls::client::danger::ServerCertVerified, rustls::Error> {
        Ok(rustls::client::danger::ServerCertVerified::assertion())
    }

    fn verify_tls12_signature(
        &self,
        _message: &[u8],
        _cert: &CertificateDer<'_>,
        _dss: &rustls::DigitallySignedStruct,
    ) -> std::result::Result<rustls::client::danger::HandshakeSignatureValid, rustls::Error> {
        Ok(rustls::client::danger::HandshakeSignatureValid::assertion())
    }

    fn verify_tls13_signature(
        &self,
        _message: &[u8],
        _cert: &CertificateDer<'_>,
        _dss: &rustls::DigitallySignedStruct,
    ) -> std::result::Result<rustls::client::danger::HandshakeSignatureValid, rustls::Error> {
        Ok(rustls::client::danger::HandshakeSignatureValid::assertion())
    }

    fn supported_verify_schemes(&self) -> Vec<rustls::SignatureScheme> {
        vec![
            rustls::SignatureScheme::RSA_PKCS1_SHA256,
            rustls::SignatureScheme::RSA_PKCS1_SHA384,
            rustls::SignatureScheme::RSA_PKCS1_SHA512,
            rustls::SignatureScheme::ECDSA_NISTP256_SHA256,
            rustls::SignatureScheme::ECDSA_NISTP384_SHA384,
            rustls::SignatureScheme::ECDSA_NISTP521_SHA512,
            rustls::SignatureScheme::RSA_PSS_SHA256,
            rustls::SignatureScheme::RSA_PSS_SHA384,
            rustls::SignatureScheme::RSA_PSS_SHA512,
            rustls::SignatureScheme::ED25519,
        ]
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    // Only the PEM framing matters for these tests.
    const TEST_CERT_PEM: &str = r#"-----BEGIN CERTIFICATE-----
MIIBkTCB+wIJAKHBfpegE3jEMA0GCSqGSIb3DQEBCwUAMBExDzANBgNVBAMMBnRl
c3RjYTAeFw0yMzAxMDEwMDAwMDBaFw0yNDAxMDEwMDAwMDBaMBExDzANBgNVBAMM
BnRlc3RjYTBcMA0GCSqGSIb3DQEBAQUAA0sAMEgCQQC7o96HtiK7onnPevKSE2LL
oSXwnmfYwZPV2bvfGS18lK8F+DL+42IjT3ucMXnLBhzNCLNKE8yCVK6LPlsvpNlX
AgMBAAGjUzBRMB0GA1UdDgQWBBQgHGHqPcVi1N4CG7IxDJaFMvP6XTAfBgNVHSME
GDAWgBQgHGHqPcVi1N4CG7IxDJaFMvP6XTAPBgNVHRMBAf8EBTADAQH/MA0GCSqG
SIb3DQEBCwUAA0EAGLJHfg9dS/T39L6VQLJeZcpH7mY8vKaM9dM/Zn3HMhfc0Yjv
3hxMPmPGjjpQ9JKaLI0Rq7n5oEUP+xluoAAfrQ==
-----END CERTIFICATE-----"#;

    #[test]
    fn test_tls_version_default() {
        assert_eq!(TlsVersion::default(), TlsVersion::Tls1_2);
    }

    #[test]
    fn test_alpn_protocol_bytes() {
        assert_eq!(AlpnProtocol::Http1.as_bytes(), b"http/1.1");
        assert_eq!(AlpnProtocol::H2.as_bytes(), b"h2");
        assert_eq!(AlpnProtocol::Custom(b"mqtt".to_vec()).as_bytes(), b"mqtt");
    }

    #[test]
    fn test_certificate_from_pem() {
        let cert = Certificate::from_pem(TEST_CERT_PEM).unwrap();
        assert_eq!(cert.der_certs().len(), 1);
    }

    #[test]
    fn test_certificate_from_empty_pem_fails() {
        assert!(Certificate::from_pem("").is_err());
    }

    #[test]
    fn test_identity_without_key_fails() {
        let result = Identity::from_pem(TEST_CERT_PEM, "");
        assert!(matches!(result, Err(NetworkError::Tls(msg)) if msg.contains("No private key")));
    }

    #[test]
    fn test_build_rustls_config_with_bundled_roots() {
        let rustls_config = TlsConfig::new()
            .alpn_protocol(AlpnProtocol::Custom(b"mqtt".to_vec()))
            .build_rustls_config()
            .unwrap();
        assert_eq!(rustls_config.alpn_protocols, vec![b"mqtt".to_vec()]);
    }

    #[test]
    fn test_build_rustls_config_only_custom_roots_without_certs_fails() {
        let result = TlsConfig::new().use_only_custom_roots().build_rustls_config();
        assert!(result.is_err());
    }

    #[test]
    fn test_build_dangerous_rustls_config() {
        // No roots are needed when verification is off.
        let config = TlsConfig::new()
            .use_only_custom_roots()
            .danger_accept_invalid_certs();
        assert!(config.build_rustls_config().is_ok());
    }

    #[test]
    fn test_tls13_only() {
        let tls13 = TlsVersion::Tls1_3.to_rustls_versions();
        assert_eq!(tls13.len(), 1);
        assert!(
            TlsConfig::new()
                .min_version(TlsVersion::Tls1_3)
                .build_rustls_config()
                .is_ok()
        );
    }
}
