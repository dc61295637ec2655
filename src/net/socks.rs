//! SOCKS5 client handshake (RFC 1928 / RFC 1929), as needed for remote binds.

use std::net::{Ipv4Addr, Ipv6Addr, SocketAddr};

use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};

use crate::node::{split_host_port, Credential};

pub const SOCKS_VERSION: u8 = 5;
const AUTH_VERSION: u8 = 1;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum AuthMethod {
    NoAuth = 0,
    Username = 2,
    Invalid = 0xFF,
}

impl From<u8> for AuthMethod {
    fn from(v: u8) -> Self {
        match v {
            0 => AuthMethod::NoAuth,
            2 => AuthMethod::Username,
            _ => AuthMethod::Invalid,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum Command {
    Connect = 1,
    Bind = 2,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum AddressType {
    IPv4 = 1,
    Domain = 3,
    IPv6 = 4,
}

impl TryFrom<u8> for AddressType {
    type Error = u8;
    fn try_from(v: u8) -> Result<Self, u8> {
        match v {
            1 => Ok(AddressType::IPv4),
            3 => Ok(AddressType::Domain),
            4 => Ok(AddressType::IPv6),
            other => Err(other),
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum SocksError {
    #[error(transparent)]
    Io(#[from] std::io::Error),
    #[error("unexpected SOCKS version {0}")]
    Version(u8),
    #[error("no acceptable authentication method")]
    NoAcceptableMethod,
    #[error("authentication rejected")]
    AuthRejected,
    #[error("credential field longer than 255 bytes")]
    CredentialTooLong,
    #[error("invalid target address {0:?}")]
    Target(String),
    #[error("unsupported address type {0}")]
    AddressType(u8),
    #[error("request failed with reply code {0}")]
    Reply(u8),
}

/// Address carried in a SOCKS5 reply.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReplyAddr {
    Ip(SocketAddr),
    Domain(String, u16),
}

impl ReplyAddr {
    /// The socket address, or an unspecified one for domain replies.
    pub fn socket_addr(&self) -> SocketAddr {
        match self {
            ReplyAddr::Ip(addr) => *addr,
            ReplyAddr::Domain(_, port) => SocketAddr::from((Ipv4Addr::UNSPECIFIED, *port)),
        }
    }
}

/// Build the method selection message.
pub fn build_method_selection(user: Option<&Credential>) -> Vec<u8> {
    match user {
        Some(_) => vec![SOCKS_VERSION, 2, AuthMethod::NoAuth as u8, AuthMethod::Username as u8],
        None => vec![SOCKS_VERSION, 1, AuthMethod::NoAuth as u8],
    }
}

/// Build an RFC 1929 username/password request.
pub fn build_credentials(user: &Credential) -> Result<Vec<u8>, SocksError> {
    let name = user.username.as_bytes();
    let pass = user.password().as_bytes();
    if name.len() > 255 || pass.len() > 255 {
        return Err(SocksError::CredentialTooLong);
    }
    let mut buf = Vec::with_capacity(3 + name.len() + pass.len());
    buf.push(AUTH_VERSION);
    buf.push(name.len() as u8);
    buf.extend_from_slice(name);
    buf.push(pass.len() as u8);
    buf.extend_from_slice(pass);
    Ok(buf)
}

/// Build a request for `target` (`host:port`).
pub fn build_request(command: Command, target: &str) -> Result<Vec<u8>, SocksError> {
    let (host, port) = split_host_port(target);
    let port: u16 = port.parse().map_err(|_| SocksError::Target(target.to_string()))?;

    let mut buf = vec![SOCKS_VERSION, command as u8, 0];
    match host.parse::<std::net::IpAddr>() {
        Ok(std::net::IpAddr::V4(ip)) => {
            buf.push(AddressType::IPv4 as u8);
            buf.extend_from_slice(&ip.octets());
        }
        Ok(std::net::IpAddr::V6(ip)) => {
            buf.push(AddressType::IPv6 as u8);
            buf.extend_from_slice(&ip.octets());
        }
        Err(_) if host.is_empty() => {
            buf.push(AddressType::IPv4 as u8);
            buf.extend_from_slice(&Ipv4Addr::UNSPECIFIED.octets());
        }
        Err(_) => {
            if host.len() > 255 {
                return Err(SocksError::Target(target.to_string()));
            }
            buf.push(AddressType::Domain as u8);
            buf.push(host.len() as u8);
            buf.extend_from_slice(host.as_bytes());
        }
    }
    buf.extend_from_slice(&port.to_be_bytes());
    Ok(buf)
}

/// Negotiate a method and authenticate.
pub async fn handshake<S>(stream: &mut S, user: Option<&Credential>) -> Result<(), SocksError>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    stream.write_all(&build_method_selection(user)).await?;
    let mut reply = [0u8; 2];
    stream.read_exact(&mut reply).await?;
    if reply[0] != SOCKS_VERSION {
        return Err(SocksError::Version(reply[0]));
    }

    match AuthMethod::from(reply[1]) {
        AuthMethod::NoAuth => Ok(()),
        AuthMethod::Username => {
            let user = user.ok_or(SocksError::NoAcceptableMethod)?;
            stream.write_all(&build_credentials(user)?).await?;
            let mut status = [0u8; 2];
            stream.read_exact(&mut status).await?;
            if status[1] != 0 {
                return Err(SocksError::AuthRejected);
            }
            Ok(())
        }
        AuthMethod::Invalid => Err(SocksError::NoAcceptableMethod),
    }
}

/// Read one reply and return its address.
pub async fn read_reply<S>(stream: &mut S) -> Result<ReplyAddr, SocksError>
where
    S: AsyncRead + Unpin,
{
    let mut head = [0u8; 4];
    stream.read_exact(&mut head).await?;
    if head[0] != SOCKS_VERSION {
        return Err(SocksError::Version(head[0]));
    }
    if head[1] != 0 {
        return Err(SocksError::Reply(head[1]));
    }

    let addr = match AddressType::try_from(head[3]).map_err(SocksError::AddressType)? {
        AddressType::IPv4 => {
            let mut ip = [0u8; 4];
            stream.read_exact(&mut ip).await?;
            let port = stream.read_u16().await?;
            ReplyAddr::Ip(SocketAddr::from((Ipv4Addr::from(ip), port)))
        }
        AddressType::IPv6 => {
            let mut ip = [0u8; 16];
            stream.read_exact(&mut ip).await?;
            let port = stream.read_u16().await?;
            ReplyAddr::Ip(SocketAddr::from((Ipv6Addr::from(ip), port)))
        }
        AddressType::Domain => {
            let len = stream.read_u8().await? as usize;
            let mut name = vec![0u8; len];
            stream.read_exact(&mut name).await?;
            let port = stream.read_u16().await?;
            ReplyAddr::Domain(String::from_utf8_lossy(&name).into_owned(), port)
        }
    };
    Ok(addr)
}
