//! Node option bag and its typed view.

use std::collections::BTreeMap;
use std::time::Duration;

/// Raw `key=value` options taken from a node's query string.
///
/// Keys keep their first value. Missing keys read as zero values.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Options {
    values: BTreeMap<String, String>,
}

impl Options {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert a value unless the key is already present.
    pub fn insert(&mut self, key: impl Into<String>, value: impl Into<String>) {
        self.values.entry(key.into()).or_insert_with(|| value.into());
    }

    /// Overwrite a value.
    pub fn set(&mut self, key: impl Into<String>, value: impl Into<String>) {
        self.values.insert(key.into(), value.into());
    }

    pub fn get(&self, key: &str) -> &str {
        self.values.get(key).map(String::as_str).unwrap_or("")
    }

    pub fn contains(&self, key: &str) -> bool {
        self.values.contains_key(key)
    }

    pub fn get_int(&self, key: &str) -> i64 {
        self.get(key).trim().parse().unwrap_or(0)
    }

    pub fn get_bool(&self, key: &str) -> bool {
        parse_bool(self.get(key)).unwrap_or(false)
    }

    pub fn get_duration(&self, key: &str) -> Duration {
        parse_duration(self.get(key)).unwrap_or(Duration::ZERO)
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// Iterate in key order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.values.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }
}

/// Parse a boolean flag such as `1`, `t`, `true` or `False`.
pub fn parse_bool(s: &str) -> Option<bool> {
    match s.trim() {
        "1" | "t" | "T" | "true" | "TRUE" | "True" => Some(true),
        "0" | "f" | "F" | "false" | "FALSE" | "False" => Some(false),
        _ => None,
    }
}

/// Parse a duration such as `300ms`, `1.5h` or `1m30s`.
///
/// A bare integer is taken as seconds. Negative durations are rejected.
pub fn parse_duration(s: &str) -> Option<Duration> {
    let s = s.trim();
    if s.is_empty() {
        return None;
    }
    if let Ok(secs) = s.parse::<u64>() {
        return Some(Duration::from_secs(secs));
    }
    let s = s.strip_prefix('+').unwrap_or(s);

    let mut total = 0f64;
    let mut rest = s;
    while !rest.is_empty() {
        let num_len = rest
            .find(|c: char| !(c.is_ascii_digit() || c == '.'))
            .unwrap_or(rest.len());
        if num_len == 0 {
            return None;
        }
        let value: f64 = rest[..num_len].parse().ok()?;
        rest = &rest[num_len..];

        let unit_len = rest
            .find(|c: char| c.is_ascii_digit() || c == '.')
            .unwrap_or(rest.len());
        let nanos_per_unit = match &rest[..unit_len] {
            "ns" => 1e0,
            "us" | "µs" | "μs" => 1e3,
            "ms" => 1e6,
            "s" => 1e9,
            "m" => 60e9,
            "h" => 3600e9,
            _ => return None,
        };
        rest = &rest[unit_len..];
        total += value * nanos_per_unit;
    }

    Some(Duration::from_nanos(total.round() as u64))
}

/// Typed view of every option the core consumes.
///
/// Parsed once at the boundary; the raw [`Options`] bag stays on the node
/// for handlers whose options are open-ended.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct NodeOptions {
    pub auth: String,
    pub secrets: String,
    pub ca: String,
    pub secure: bool,
    pub cert: String,
    pub key: String,
    pub timeout: Duration,
    pub ttl: Duration,
    pub ping: Duration,
    pub idle: Duration,
    pub keepalive: bool,
    pub cipher: String,
    pub host: String,
    pub agent: String,
    pub notls: bool,
    pub retry: i64,
    pub max_fails: i64,
    pub fail_timeout: Duration,
    pub strategy: String,
    pub peer: String,
    pub bypass: String,
    pub whitelist: String,
    pub blacklist: String,
    pub dns: String,
    pub hosts: String,
    pub prefer: String,
    pub ip: String,
    pub mode: String,
    pub probe_resist: String,
    pub knock: String,
    pub tcp: bool,
}

impl NodeOptions {
    pub fn from_options(o: &Options) -> Self {
        Self {
            auth: o.get("auth").to_string(),
            secrets: o.get("secrets").to_string(),
            ca: o.get("ca").to_string(),
            secure: o.get_bool("secure"),
            cert: o.get("cert").to_string(),
            key: o.get("key").to_string(),
            timeout: o.get_duration("timeout"),
            ttl: o.get_duration("ttl"),
            ping: o.get_duration("ping"),
            idle: o.get_duration("idle"),
            keepalive: o.get_bool("keepalive"),
            cipher: o.get("cipher").to_string(),
            host: o.get("host").to_string(),
            agent: o.get("agent").to_string(),
            notls: o.get_bool("notls"),
            retry: o.get_int("retry"),
            max_fails: o.get_int("max_fails"),
            fail_timeout: o.get_duration("fail_timeout"),
            strategy: o.get("strategy").to_string(),
            peer: o.get("peer").to_string(),
            bypass: o.get("bypass").to_string(),
            whitelist: o.get("whitelist").to_string(),
            blacklist: o.get("blacklist").to_string(),
            dns: o.get("dns").to_string(),
            hosts: o.get("hosts").to_string(),
            prefer: o.get("prefer").to_string(),
            ip: o.get("ip").to_string(),
            mode: o.get("mode").to_string(),
            probe_resist: o.get("probe_resist").to_string(),
            knock: o.get("knock").to_string(),
            tcp: o.get_bool("tcp"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_keys_are_zero_values() {
        let o = Options::new();
        assert_eq!(o.get("nope"), "");
        assert_eq!(o.get_int("nope"), 0);
        assert!(!o.get_bool("nope"));
        assert_eq!(o.get_duration("nope"), Duration::ZERO);
    }

    #[test]
    fn first_value_wins() {
        let mut o = Options::new();
        o.insert("retry", "2");
        o.insert("retry", "5");
        assert_eq!(o.get_int("retry"), 2);
    }

    #[test]
    fn go_style_durations() {
        assert_eq!(parse_duration("10s"), Some(Duration::from_secs(10)));
        assert_eq!(parse_duration("300ms"), Some(Duration::from_millis(300)));
        assert_eq!(parse_duration("1m30s"), Some(Duration::from_secs(90)));
        assert_eq!(parse_duration("1.5h"), Some(Duration::from_secs(5400)));
        assert_eq!(parse_duration("45"), Some(Duration::from_secs(45)));
        assert_eq!(parse_duration("0"), Some(Duration::ZERO));
        assert_eq!(parse_duration("-1s"), None);
        assert_eq!(parse_duration("10x"), None);
        assert_eq!(parse_duration("s"), None);
    }

    #[test]
    fn go_style_bools() {
        assert_eq!(parse_bool("true"), Some(true));
        assert_eq!(parse_bool("T"), Some(true));
        assert_eq!(parse_bool("0"), Some(false));
        assert_eq!(parse_bool("yes"), None);
    }

    #[test]
    fn typed_view() {
        let mut o = Options::new();
        o.insert("max_fails", "3");
        o.insert("fail_timeout", "30s");
        o.insert("secure", "true");
        o.insert("strategy", "random");
        let opts = NodeOptions::from_options(&o);
        assert_eq!(opts.max_fails, 3);
        assert_eq!(opts.fail_timeout, Duration::from_secs(30));
        assert!(opts.secure);
        assert_eq!(opts.strategy, "random");
        assert!(!opts.tcp);
    }
}
