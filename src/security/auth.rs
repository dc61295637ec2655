//! Local user authentication.
//!
//! # Responsibilities
//! - Check inbound credentials against a user table
//! - Load the table from a secrets file and keep it reloaded
//!
//! # File Grammar
//! ```text
//! # comment
//! reload 30s
//! alice secret
//! bob
//! ```

use std::collections::HashMap;
use std::io::BufRead;
use std::sync::Arc;
use std::time::Duration;

use arc_swap::ArcSwap;

use crate::config::source::{self, LoaderError, Source};
use crate::lifecycle::Signal;
use crate::node::options::parse_duration;
use crate::node::Credential;
use crate::reload::{self, split_line, ReloadError, Reloadable};

/// Verifies inbound credentials.
pub trait Authenticator: Send + Sync + std::fmt::Debug {
    fn authenticate(&self, user: &str, password: &str) -> bool;
}

#[derive(Debug, Default)]
struct Table {
    users: HashMap<String, String>,
    period: Duration,
}

/// Authenticator backed by an in-memory table.
///
/// An empty table lets everyone in. A user with an empty password accepts
/// any password.
#[derive(Debug)]
pub struct LocalAuthenticator {
    table: ArcSwap<Table>,
    stop: Signal,
}

impl LocalAuthenticator {
    pub fn new(users: HashMap<String, String>) -> Self {
        Self {
            table: ArcSwap::from_pointee(Table {
                users,
                period: Duration::ZERO,
            }),
            stop: Signal::new(),
        }
    }

    /// A table holding exactly one credential.
    pub fn single(user: &Credential) -> Self {
        let mut users = HashMap::new();
        users.insert(user.username.clone(), user.password().to_string());
        Self::new(users)
    }

    pub fn len(&self) -> usize {
        self.table.load().users.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl Authenticator for LocalAuthenticator {
    fn authenticate(&self, user: &str, password: &str) -> bool {
        let table = self.table.load();
        if table.users.is_empty() {
            return true;
        }
        match table.users.get(user) {
            Some(expected) => expected.is_empty() || expected == password,
            None => false,
        }
    }
}

impl Reloadable for LocalAuthenticator {
    fn reload(&self, reader: &mut dyn BufRead) -> Result<(), ReloadError> {
        if self.stopped() {
            return Ok(());
        }
        let mut next = Table::default();
        for line in reader.lines() {
            let line = line?;
            match split_line(&line).as_slice() {
                [] => {}
                ["reload", period, ..] => next.period = parse_duration(period).unwrap_or_default(),
                [user] => {
                    next.users.insert(user.to_string(), String::new());
                }
                [user, password, ..] => {
                    next.users.insert(user.to_string(), password.to_string());
                }
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

/// Build a file-backed authenticator when `secrets` names a readable file.
///
/// Inline or empty values yield `None`; the caller then falls back to the
/// node's own credential.
pub fn parse_authenticator(secrets: &str) -> Result<Option<Arc<LocalAuthenticator>>, LoaderError> {
    let Some(Source::File { path, contents }) = source::open(secrets)? else {
        return Ok(None);
    };
    let auth = Arc::new(LocalAuthenticator::new(HashMap::new()));
    auth.reload(&mut contents.as_bytes())
        .map_err(|e| LoaderError::parse("secrets", e.to_string()))?;
    reload::spawn(&auth, path);
    Ok(Some(auth))
}
