//! Static host mappings, reloaded from a hosts-style file.
//!
//! # File Grammar
//! ```text
//! # comment
//! reload 1m
//! 10.0.0.5  db.internal  db
//! ::1       localhost6
//! ```

use std::collections::HashMap;
use std::io::BufRead;
use std::net::IpAddr;
use std::sync::Arc;
use std::time::Duration;

use arc_swap::ArcSwap;

use crate::config::source::{self, LoaderError, Source};
use crate::lifecycle::Signal;
use crate::node::options::parse_duration;
use crate::reload::{self, split_line, ReloadError, Reloadable};

#[derive(Debug, Default)]
struct Table {
    names: HashMap<String, IpAddr>,
    period: Duration,
}

/// Hostname to address map. Names and aliases are matched case-insensitively.
#[derive(Debug, Default)]
pub struct Hosts {
    table: ArcSwap<Table>,
    stop: Signal,
}

impl Hosts {
    pub fn new() -> Self {
        Self::default()
    }

    /// Address mapped to `name`, if any. The first mapping of a name wins.
    pub fn lookup(&self, name: &str) -> Option<IpAddr> {
        self.table
            .load()
            .names
            .get(&name.to_ascii_lowercase())
            .copied()
    }

    pub fn len(&self) -> usize {
        self.table.load().names.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl Reloadable for Hosts {
    fn reload(&self, reader: &mut dyn BufRead) -> Result<(), ReloadError> {
        if self.stopped() {
            return Ok(());
        }
        let mut next = Table::default();
        for line in reader.lines() {
            let line = line?;
            match split_line(&line).as_slice() {
                ["reload", period, ..] => next.period = parse_duration(period).unwrap_or_default(),
                [ip, names @ ..] if !names.is_empty() => {
                    let Ok(ip) = ip.parse::<IpAddr>() else {
                        tracing::debug!(entry = %ip, "Skipping hosts line with invalid address");
                        continue;
                    };
                    for name in names {
                        next.names.entry(name.to_ascii_lowercase()).or_insert(ip);
                    }
                }
                _ => {}
            }
        }
        self.table.store(Arc::new(next));
        Ok(())
    }

    fn period(&self) -> Option<Duration> {
        if self.stopped() {
            return None;
        }
        Some(self.table.load().period)
    }

    fn stop_signal(&self) -> &Signal {
        &self.stop
    }
}

/// Load a hosts file. Anything that is not a readable file yields `None`.
pub fn parse_hosts(arg: &str) -> Result<Option<Arc<Hosts>>, LoaderError> {
    let Some(Source::File { path, contents }) = source::open(arg)? else {
        return Ok(None);
    };
    let hosts = Arc::new(Hosts::new());
    hosts
        .reload(&mut contents.as_bytes())
        .map_err(|e| LoaderError::parse("hosts", e.to_string()))?;
    reload::spawn(&hosts, path);
    Ok(Some(hosts))
}
