//! Outbound client descriptors attached to chain nodes.
//!
//! These are plain data: the protocol engine that dials and handshakes
//! reads them, the core only builds them.

use std::time::Duration;

use sha2::{Digest, Sha256};

use crate::net::tls::ClientTlsConfig;
use crate::node::{Credential, Protocol, Transport};

/// QUIC session parameters shared by the dialer and the listener.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct QuicConfig {
    pub keep_alive: bool,
    pub timeout: Duration,
    pub idle_timeout: Duration,
    /// Pre-shared key, the SHA-256 of the `cipher` option.
    pub key: Option<[u8; 32]>,
}

impl QuicConfig {
    pub fn new(keep_alive: bool, timeout: Duration, idle_timeout: Duration, cipher: &str) -> Self {
        Self {
            keep_alive,
            timeout,
            idle_timeout,
            key: derive_key(cipher),
        }
    }

    /// Keepalive interval: half the idle timeout, or 10 seconds.
    pub fn keep_alive_interval(&self) -> Duration {
        if self.idle_timeout.is_zero() {
            DEFAULT_KEEP_ALIVE_INTERVAL
        } else {
            self.idle_timeout / 2
        }
    }
}

const DEFAULT_KEEP_ALIVE_INTERVAL: Duration = Duration::from_secs(10);

/// SHA-256 of a non-empty cipher string.
pub fn derive_key(cipher: &str) -> Option<[u8; 32]> {
    if cipher.is_empty() {
        return None;
    }
    Some(Sha256::digest(cipher.as_bytes()).into())
}

/// How bytes reach the next hop.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Transporter {
    Tcp,
    Tls,
    Mtls,
    Quic(QuicConfig),
    /// HTTP-obfuscated TCP, with the Host header to present.
    ObfsHttp { host: String },
}

impl Transporter {
    /// The single mapping from transport tag to transporter.
    pub fn for_transport(
        transport: Transport,
        quic: impl FnOnce() -> QuicConfig,
        obfs_host: &str,
    ) -> Self {
        match transport {
            Transport::Tls => Transporter::Tls,
            Transport::Mtls => Transporter::Mtls,
            Transport::Quic => Transporter::Quic(quic()),
            Transport::Ohttp => Transporter::ObfsHttp {
                host: obfs_host.to_string(),
            },
            _ => Transporter::Tcp,
        }
    }

    /// Whether the transporter wraps the hop in TLS.
    pub fn is_tls(&self) -> bool {
        matches!(self, Transporter::Tls | Transporter::Mtls | Transporter::Quic(_))
    }
}

/// What is spoken to the next hop once connected.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Connector {
    Socks5 { user: Option<Credential> },
    Socks4,
    Socks4a,
    Forward,
    Sni { host: String },
    Http { user: Option<Credential> },
    Auto { user: Option<Credential> },
}

impl Connector {
    /// The single mapping from protocol tag to connector.
    pub fn for_protocol(protocol: Protocol, user: Option<Credential>, sni_host: &str) -> Self {
        match protocol {
            Protocol::Socks5 => Connector::Socks5 { user },
            Protocol::Socks4 => Connector::Socks4,
            Protocol::Socks4a => Connector::Socks4a,
            Protocol::Forward => Connector::Forward,
            Protocol::Sni => Connector::Sni {
                host: sni_host.to_string(),
            },
            Protocol::Http => Connector::Http { user },
            _ => Connector::Auto { user },
        }
    }

    /// Whether the connector can ask its hop to bind a remote port.
    pub fn supports_bind(&self) -> bool {
        matches!(self, Connector::Socks5 { .. } | Connector::Auto { .. })
    }
}

/// Connector and transporter pair for one hop.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Client {
    pub connector: Connector,
    pub transporter: Transporter,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DialOptions {
    pub timeout: Duration,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ConnectOptions {
    pub user_agent: String,
    pub no_tls: bool,
}

/// Per-hop handshake parameters.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct HandshakeOptions {
    /// Address the handshake targets; differs per IP-expanded sibling.
    pub addr: String,
    pub host: String,
    pub user: Option<Credential>,
    pub tls: ClientTlsConfig,
    pub interval: Duration,
    pub timeout: Duration,
    pub retry: i64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn quic_key_is_sha256_of_cipher() {
        let key = derive_key("secret").unwrap();
        let expected: [u8; 32] = Sha256::digest(b"secret").into();
        assert_eq!(key, expected);
        assert_eq!(key.len(), 32);
        assert!(derive_key("").is_none());
    }

    #[test]
    fn connectors_by_protocol() {
        let user = Some(Credential::new("u", None));
        assert_eq!(
            Connector::for_protocol(Protocol::Socks5, user.clone(), ""),
            Connector::Socks5 { user: user.clone() }
        );
        assert_eq!(
            Connector::for_protocol(Protocol::Sni, None, "example.com"),
            Connector::Sni { host: "example.com".into() }
        );
        assert_eq!(
            Connector::for_protocol(Protocol::Tcp, None, ""),
            Connector::Auto { user: None }
        );
        assert!(Connector::Auto { user: None }.supports_bind());
        assert!(!Connector::Http { user: None }.supports_bind());
    }

    #[test]
    fn transporters_by_transport() {
        let t = Transporter::for_transport(Transport::Quic, || QuicConfig::new(true, Duration::ZERO, Duration::ZERO, "k"), "");
        assert!(matches!(t, Transporter::Quic(ref q) if q.key.is_some() && q.keep_alive));
        assert_eq!(Transporter::for_transport(Transport::Rtcp, QuicConfig::default, ""), Transporter::Tcp);
        assert_eq!(
            Transporter::for_transport(Transport::Ohttp, QuicConfig::default, "cdn.example"),
            Transporter::ObfsHttp { host: "cdn.example".into() }
        );
    }
}
