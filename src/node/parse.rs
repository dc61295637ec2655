//! Node spec lexer.
//!
//! Grammar:
//! ```text
//! [protocol[+transport]://][user[:pass]@]host[:port][/remote][?k=v&k=v…]
//! ```

use std::fmt;

use url::form_urlencoded;

use crate::health::state::FailMarker;
use crate::node::{
    split_host_port, ConnectOptions, Credential, DialOptions, Node, Options, Protocol, Transport,
};

/// Error type for node spec parsing.
#[derive(Debug, thiserror::Error)]
pub enum NodeError {
    #[error("bad node spec {spec:?}: {reason}")]
    BadSpec { spec: String, reason: &'static str },
    #[error("invalid auth option: {0}")]
    BadAuth(#[from] base64::DecodeError),
}

fn bad(spec: &str, reason: &'static str) -> NodeError {
    NodeError::BadSpec {
        spec: spec.to_string(),
        reason,
    }
}

/// Parse one node spec.
///
/// The returned node has ID 0 and no client; builders fill those in.
pub fn parse_node(spec: &str) -> Result<Node, NodeError> {
    let input = spec.trim();
    if input.is_empty() {
        return Err(bad(spec, "empty spec"));
    }

    let (scheme, rest) = match input.split_once("://") {
        Some((scheme, rest)) => (scheme, rest),
        None => ("auto", input),
    };
    let (protocol, transport) = parse_scheme(scheme).ok_or_else(|| bad(spec, "too many scheme parts"))?;

    let (rest, query) = match rest.split_once('?') {
        Some((rest, query)) => (rest, Some(query)),
        None => (rest, None),
    };
    let (authority, path) = match rest.find('/') {
        Some(n) => (&rest[..n], &rest[n..]),
        None => (rest, ""),
    };
    let (userinfo, addr) = match authority.rsplit_once('@') {
        Some((userinfo, addr)) => (Some(userinfo), addr),
        None => (None, authority),
    };

    validate_addr(addr).map_err(|reason| bad(spec, reason))?;

    let user = userinfo.map(|info| match info.split_once(':') {
        Some((name, pass)) => Credential::new(percent_decode(name), Some(percent_decode(pass))),
        None => Credential::new(percent_decode(info), None),
    });

    let mut options = Options::new();
    if let Some(query) = query {
        for (key, value) in form_urlencoded::parse(query.as_bytes()) {
            options.insert(key.into_owned(), value.into_owned());
        }
    }

    let mut remote = path.trim_matches('/').to_string();
    if remote.is_empty() {
        remote = options.get("remote").to_string();
    }

    Ok(Node {
        id: 0,
        addr: addr.to_string(),
        host: addr.to_string(),
        protocol,
        transport,
        remote,
        user,
        options,
        client: None,
        dial_options: DialOptions::default(),
        connect_options: ConnectOptions::default(),
        handshake_options: None,
        bypass: None,
        marker: FailMarker::new(),
    })
}

/// Split `protocol[+transport]`. A single tag names both.
fn parse_scheme(scheme: &str) -> Option<(Protocol, Transport)> {
    let mut parts = scheme.split('+');
    let first = parts.next().unwrap_or("");
    let second = parts.next();
    if parts.next().is_some() {
        return None;
    }
    Some(match second {
        Some(transport) => (Protocol::from_tag(first), Transport::from_tag(transport)),
        None => (Protocol::from_tag(first), Transport::from_tag(first)),
    })
}

fn validate_addr(addr: &str) -> Result<(), &'static str> {
    if addr.is_empty() {
        return Err("empty address");
    }
    if addr.starts_with('[') && !addr.contains(']') {
        return Err("unterminated IPv6 literal");
    }
    let (_, port) = split_host_port(addr);
    if addr.ends_with(':') {
        return Err("empty port");
    }
    if !port.is_empty() && port.parse::<u16>().is_err() {
        return Err("invalid port");
    }
    Ok(())
}

fn percent_decode(s: &str) -> String {
    let bytes = s.as_bytes();
    let mut out = Vec::with_capacity(bytes.len());
    let mut i = 0;
    while i < bytes.len() {
        if bytes[i] == b'%' && i + 2 < bytes.len() {
            if let (Some(hi), Some(lo)) = (hex(bytes[i + 1]), hex(bytes[i + 2])) {
                out.push(hi << 4 | lo);
                i += 3;
                continue;
            }
        }
        out.push(bytes[i]);
        i += 1;
    }
    String::from_utf8_lossy(&out).into_owned()
}

fn hex(b: u8) -> Option<u8> {
    match b {
        b'0'..=b'9' => Some(b - b'0'),
        b'a'..=b'f' => Some(b - b'a' + 10),
        b'A'..=b'F' => Some(b - b'A' + 10),
        _ => None,
    }
}

fn percent_encode_userinfo(s: &str, out: &mut fmt::Formatter<'_>) -> fmt::Result {
    for b in s.bytes() {
        match b {
            b'A'..=b'Z' | b'a'..=b'z' | b'0'..=b'9' | b'-' | b'.' | b'_' | b'~' => {
                write!(out, "{}", b as char)?
            }
            _ => write!(out, "%{b:02X}")?,
        }
    }
    Ok(())
}

/// Canonical form; parsing it yields an equal node.
impl fmt::Display for Node {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}+{}://", self.protocol, self.transport)?;
        if let Some(user) = &self.user {
            percent_encode_userinfo(&user.username, f)?;
            if let Some(pass) = &user.password {
                f.write_str(":")?;
                percent_encode_userinfo(pass, f)?;
            }
            f.write_str("@")?;
        }
        f.write_str(&self.addr)?;
        if !self.remote.is_empty() {
            write!(f, "/{}", self.remote)?;
        }
        if !self.options.is_empty() {
            let query = form_urlencoded::Serializer::new(String::new())
                .extend_pairs(self.options.iter())
                .finish();
            write!(f, "?{query}")?;
        }
        Ok(())
    }
}
