//! TLS configuration and certificate loading.
//!
//! # Responsibilities
//! - Load serve-side certificate chains and private keys (PEM)
//! - Load CA bundles for outbound verification
//! - Describe outbound TLS (server name, verification, roots)

use std::fs::File;
use std::io::BufReader;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use rustls::pki_types::{CertificateDer, PrivateKeyDer, ServerName};
use rustls::RootCertStore;

/// Certificate file used when a serve node names none.
pub const DEFAULT_CERT_FILE: &str = "cert.pem";
/// Key file used when a serve node names none.
pub const DEFAULT_KEY_FILE: &str = "key.pem";

/// Error type for TLS material loading.
#[derive(Debug, thiserror::Error)]
pub enum TlsError {
    #[error("failed to read {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("no certificates found in {0}")]
    NoCertificates(PathBuf),
    #[error("no private key found in {0}")]
    NoPrivateKey(PathBuf),
    #[error("invalid server name {0:?}")]
    ServerName(String),
    #[error(transparent)]
    Rustls(#[from] rustls::Error),
    #[error("QUIC: {0}")]
    Quic(String),
}

fn provider() -> Arc<rustls::crypto::CryptoProvider> {
    Arc::new(rustls::crypto::ring::default_provider())
}

fn open(path: &Path) -> Result<BufReader<File>, TlsError> {
    File::open(path)
        .map(BufReader::new)
        .map_err(|source| TlsError::Io {
            path: path.to_path_buf(),
            source,
        })
}

/// Load certificates from a PEM file.
pub fn load_certs(path: &Path) -> Result<Vec<CertificateDer<'static>>, TlsError> {
    let certs = rustls_pemfile::certs(&mut open(path)?)
        .collect::<Result<Vec<_>, _>>()
        .map_err(|source| TlsError::Io {
            path: path.to_path_buf(),
            source,
        })?;
    if certs.is_empty() {
        return Err(TlsError::NoCertificates(path.to_path_buf()));
    }
    Ok(certs)
}

/// Load the first private key from a PEM file.
pub fn load_private_key(path: &Path) -> Result<PrivateKeyDer<'static>, TlsError> {
    rustls_pemfile::private_key(&mut open(path)?)
        .map_err(|source| TlsError::Io {
            path: path.to_path_buf(),
            source,
        })?
        .ok_or_else(|| TlsError::NoPrivateKey(path.to_path_buf()))
}

/// Serve-side certificate chain and key.
#[derive(Debug)]
pub struct TlsMaterial {
    pub certs: Vec<CertificateDer<'static>>,
    pub key: PrivateKeyDer<'static>,
}

impl TlsMaterial {
    /// Load a certificate chain and key. When either path is empty both
    /// default to [`DEFAULT_CERT_FILE`] and [`DEFAULT_KEY_FILE`].
    pub fn load(cert: &str, key: &str) -> Result<Self, TlsError> {
        let (cert, key) = if cert.is_empty() || key.is_empty() {
            (DEFAULT_CERT_FILE, DEFAULT_KEY_FILE)
        } else {
            (cert, key)
        };
        Ok(Self {
            certs: load_certs(Path::new(cert))?,
            key: load_private_key(Path::new(key))?,
        })
    }

    /// rustls server configuration with the given ALPN protocols.
    pub fn server_config(&self, alpn: &[&[u8]]) -> Result<rustls::ServerConfig, TlsError> {
        let mut config = rustls::ServerConfig::builder_with_provider(provider())
            .with_safe_default_protocol_versions()?
            .with_no_client_auth()
            .with_single_cert(self.certs.clone(), self.key.clone_key())?;
        config.alpn_protocols = alpn.iter().map(|p| p.to_vec()).collect();
        Ok(config)
    }
}

/// Load serve-side TLS as a ready rustls configuration.
pub fn load_server_tls(cert: &str, key: &str) -> Result<Arc<rustls::ServerConfig>, TlsError> {
    let material = TlsMaterial::load(cert, key)?;
    Ok(Arc::new(material.server_config(&[])?))
}

/// Load a CA bundle into a root store. An empty path yields `None`.
pub fn load_ca(path: &str) -> Result<Option<Arc<RootCertStore>>, TlsError> {
    if path.is_empty() {
        return Ok(None);
    }
    let path = Path::new(path);
    let mut roots = RootCertStore::empty();
    for cert in load_certs(path)? {
        roots.add(cert)?;
    }
    Ok(Some(Arc::new(roots)))
}

/// Outbound TLS parameters for one hop.
#[derive(Debug, Clone, Default)]
pub struct ClientTlsConfig {
    pub server_name: String,
    pub insecure_skip_verify: bool,
    /// The CA bundle path the roots came from.
    pub ca: String,
    pub root_cas: Option<Arc<RootCertStore>>,
}

/// Two configs are equal when built from the same parameters.
impl PartialEq for ClientTlsConfig {
    fn eq(&self, other: &Self) -> bool {
        self.server_name == other.server_name
            && self.insecure_skip_verify == other.insecure_skip_verify
            && self.ca == other.ca
    }
}

impl Eq for ClientTlsConfig {}

impl ClientTlsConfig {
    /// rustls client configuration for dialing the hop.
    pub fn to_rustls(&self) -> Result<rustls::ClientConfig, TlsError> {
        let builder = rustls::ClientConfig::builder_with_provider(provider())
            .with_safe_default_protocol_versions()?;
        let config = if self.insecure_skip_verify {
            builder
                .dangerous()
                .with_custom_certificate_verifier(Arc::new(NoVerifier(provider())))
                .with_no_client_auth()
        } else {
            let roots = match &self.root_cas {
                Some(roots) => roots.as_ref().clone(),
                None => RootCertStore {
                    roots: webpki_roots::TLS_SERVER_ROOTS.to_vec(),
                },
            };
            builder.with_root_certificates(roots).with_no_client_auth()
        };
        Ok(config)
    }

    pub fn server_name(&self) -> Result<ServerName<'static>, TlsError> {
        ServerName::try_from(self.server_name.clone())
            .map_err(|_| TlsError::ServerName(self.server_name.clone()))
    }
}

/// Accepts any server certificate; used when `secure` is off.
#[derive(Debug)]
struct NoVerifier(Arc<rustls::crypto::CryptoProvider>);

impl rustls::client::danger::ServerCertVerifier for NoVerifier {
    fn verify_server_cert(
        &self,
        _end_entity: &CertificateDer<'_>,
        _intermediates: &[CertificateDer<'_>],
        _server_name: &ServerName<'_>,
        _ocsp_response: &[u8],
        _now: rustls::pki_types::UnixTime,
    ) -> Result<rustls::client::danger::ServerCertVerified, rustls::Error> {
        Ok(rustls::client::danger::ServerCertVerified::assertion())
    }

    fn verify_tls12_signature(
        &self,
        message: &[u8],
        cert: &CertificateDer<'_>,
        dss: &rustls::DigitallySignedStruct,
    ) -> Result<rustls::client::danger::HandshakeSignatureValid, rustls::Error> {
        rustls::crypto::verify_tls12_signature(
            message,
            cert,
            dss,
            &self.0.signature_verification_algorithms,
        )
    }

    fn verify_tls13_signature(
        &self,
        message: &[u8],
        cert: &CertificateDer<'_>,
        dss: &rustls::DigitallySignedStruct,
    ) -> Result<rustls::client::danger::HandshakeSignatureValid, rustls::Error> {
        rustls::crypto::verify_tls13_signature(
            message,
            cert,
            dss,
            &self.0.signature_verification_algorithms,
        )
    }

    fn supported_verify_schemes(&self) -> Vec<rustls::SignatureScheme> {
        self.0.signature_verification_algorithms.supported_schemes()
    }
}
