//! Users lists: `user[ pass]` per line, or a comma list inline.

use crate::config::source::{self, LoaderError};
use crate::node::Credential;

/// Parse one `user[ pass]` entry.
pub fn parse_user_line(line: &str) -> Option<Credential> {
    let line = line.trim();
    if line.is_empty() || line.starts_with('#') {
        return None;
    }
    Some(match line.split_once(char::is_whitespace) {
        Some((user, pass)) => Credential::new(user.trim(), Some(pass.trim().to_string())),
        None => Credential::new(line, None),
    })
}

/// Load the ordered user list named by `arg`.
pub fn parse_users(arg: &str) -> Result<Vec<Credential>, LoaderError> {
    let Some(src) = source::open(arg)? else {
        return Ok(Vec::new());
    };
    Ok(src.entries().into_iter().filter_map(parse_user_line).collect())
}
