//! Bypass rules: destinations that skip the chain.
//!
//! # File Grammar
//! ```text
//! # comment
//! reload 30s
//! reverse true
//! 10.0.0.0/8 *.internal
//! .example.com
//! ```

use std::io::BufRead;
use std::sync::Arc;
use std::time::Duration;

use arc_swap::ArcSwap;

use crate::config::source::{self, LoaderError, Source};
use crate::lifecycle::Signal;
use crate::node::options::{parse_bool, parse_duration};
use crate::node::split_host_port;
use crate::reload::{self, split_line, ReloadError, Reloadable};
use crate::routing::matcher::{new_matcher, Matcher};

#[derive(Debug, Default)]
struct Rules {
    matchers: Vec<Box<dyn Matcher>>,
    reversed: bool,
    period: Duration,
}

/// A reloadable set of matchers.
///
/// A reversed bypass contains every address its matchers do not match,
/// including every address when it has no matchers.
#[derive(Debug)]
pub struct Bypass {
    rules: ArcSwap<Rules>,
    /// Set by a leading `~`; a `reverse` line overrides it for one load only.
    base_reversed: bool,
    stop: Signal,
}

impl Bypass {
    pub fn new(reversed: bool, matchers: Vec<Box<dyn Matcher>>) -> Self {
        Self {
            rules: ArcSwap::from_pointee(Rules {
                matchers,
                reversed,
                period: Duration::ZERO,
            }),
            base_reversed: reversed,
            stop: Signal::new(),
        }
    }

    /// Whether `addr` bypasses the chain. A numeric port is ignored.
    pub fn contains(&self, addr: &str) -> bool {
        if addr.is_empty() {
            return false;
        }
        let host = match split_host_port(addr) {
            (host, port) if !host.is_empty() && port.parse::<u16>().is_ok_and(|p| p > 0) => host,
            _ => addr,
        };

        let rules = self.rules.load();
        let matched = rules.matchers.iter().any(|m| m.matches(host));
        matched != rules.reversed
    }

    pub fn reversed(&self) -> bool {
        self.rules.load().reversed
    }

    pub fn len(&self) -> usize {
        self.rules.load().matchers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl Reloadable for Bypass {
    fn reload(&self, reader: &mut dyn BufRead) -> Result<(), ReloadError> {
        if self.stopped() {
            return Ok(());
        }
        let mut next = Rules {
            reversed: self.base_reversed,
            ..Rules::default()
        };
        for line in reader.lines() {
            let line = line?;
            match split_line(&line).as_slice() {
                [] => {}
                ["reload", period, ..] => next.period = parse_duration(period).unwrap_or_default(),
                ["reverse", value, ..] => next.reversed = parse_bool(value).unwrap_or(false),
                patterns => next.matchers.extend(patterns.iter().filter_map(|p| new_matcher(p))),
            }
        }
        self.rules.store(Arc::new(next));
        Ok(())
    }

    fn period(&self) -> Option<Duration> {
        if self.stopped() {
            return None;
        }
        Some(self.rules.load().period)
    }

    fn stop_signal(&self) -> &Signal {
        &self.stop
    }
}

/// Build a bypass from a `bypass` option value.
///
/// A leading `~` inverts the match. The rest names a file (reloaded live)
/// or is an inline comma list of patterns.
pub fn parse_bypass(arg: &str) -> Result<Option<Arc<Bypass>>, LoaderError> {
    if arg.is_empty() {
        return Ok(None);
    }
    let body = arg.trim_start_matches('~');
    let reversed = body.len() != arg.len();

    match source::open(body)? {
        Some(Source::File { path, contents }) => {
            let bypass = Arc::new(Bypass::new(reversed, Vec::new()));
            bypass
                .reload(&mut contents.as_bytes())
                .map_err(|e| LoaderError::parse("bypass", e.to_string()))?;
            reload::spawn(&bypass, path);
            Ok(Some(bypass))
        }
        Some(src @ Source::Inline(_)) => {
            let matchers = src.entries().into_iter().filter_map(new_matcher).collect();
            Ok(Some(Arc::new(Bypass::new(reversed, matchers))))
        }
        None => Ok(Some(Arc::new(Bypass::new(reversed, Vec::new())))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn inline_patterns() {
        let bp = parse_bypass("10.0.0.0/8,*.example.com, 192.168.1.1").unwrap().unwrap();
        assert_eq!(bp.len(), 3);
        assert!(bp.contains("10.1.2.3:443"));
        assert!(bp.contains("www.example.com:80"));
        assert!(bp.contains("192.168.1.1"));
        assert!(!bp.contains("8.8.8.8:53"));
        assert!(!bp.contains(""));
    }

    #[test]
    fn inverted() {
        let bp = parse_bypass("~*.internal").unwrap().unwrap();
        assert!(bp.reversed());
        assert!(!bp.contains("foo.internal"));
        assert!(bp.contains("example.com:443"));
    }

    #[test]
    fn inverted_empty_body_contains_everything() {
        let bp = parse_bypass("~").unwrap().unwrap();
        assert!(bp.is_empty());
        assert!(bp.contains("anything:80"));
        assert!(parse_bypass("").unwrap().is_none());
    }

    #[test]
    fn file_directives() {
        let bp = Bypass::new(false, Vec::new());
        bp.reload(&mut "# rules\nreload 5s\nreverse true\n10.0.0.1 .corp\n".as_bytes())
            .unwrap();
        assert!(bp.reversed());
        assert_eq!(bp.len(), 2);
        assert_eq!(bp.period(), Some(Duration::from_secs(5)));
        assert!(!bp.contains("mail.corp:25"));
        assert!(bp.contains("example.org"));
    }

    #[test]
    fn reverse_directive_lasts_one_load() {
        let bp = Bypass::new(false, Vec::new());
        bp.reload(&mut "reverse true\n*.internal\n".as_bytes()).unwrap();
        assert!(bp.reversed());
        bp.reload(&mut "*.internal\n".as_bytes()).unwrap();
        assert!(!bp.reversed());
        assert!(bp.contains("db.internal"));

        let inverted = Bypass::new(true, Vec::new());
        inverted.reload(&mut "reverse false\n*.internal\n".as_bytes()).unwrap();
        assert!(!inverted.reversed());
        inverted.reload(&mut "*.internal\n".as_bytes()).unwrap();
        assert!(inverted.reversed());
    }

    #[tokio::test]
    async fn file_backed() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "*.local").unwrap();
        let bp = parse_bypass(file.path().to_str().unwrap()).unwrap().unwrap();
        assert!(bp.contains("printer.local:631"));
        bp.stop();
        assert_eq!(bp.period(), None);
    }
}
