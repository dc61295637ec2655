//! Path-or-inline arguments.
//!
//! Every auxiliary option (`secrets`, `ip`, `bypass`, `dns`, …) names a file
//! when one exists at that path, and is the data itself otherwise.

use std::fs;
use std::io::ErrorKind;
use std::path::PathBuf;

/// Error type for auxiliary loaders.
#[derive(Debug, thiserror::Error)]
pub enum LoaderError {
    #[error("failed to read {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("invalid {what}: {reason}")]
    Parse { what: &'static str, reason: String },
}

impl LoaderError {
    pub(crate) fn parse(what: &'static str, reason: impl Into<String>) -> Self {
        LoaderError::Parse {
            what,
            reason: reason.into(),
        }
    }
}

/// Where an argument's contents came from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Source {
    File { path: PathBuf, contents: String },
    Inline(String),
}

impl Source {
    pub fn contents(&self) -> &str {
        match self {
            Source::File { contents, .. } => contents,
            Source::Inline(s) => s,
        }
    }

    pub fn path(&self) -> Option<&PathBuf> {
        match self {
            Source::File { path, .. } => Some(path),
            Source::Inline(_) => None,
        }
    }

    /// Entries of the source: lines of a file, comma or newline separated
    /// items inline. Entries are trimmed; empty ones and `#` comment lines
    /// are dropped.
    pub fn entries(&self) -> Vec<&str> {
        let items: Box<dyn Iterator<Item = &str>> = match self {
            Source::File { contents, .. } => Box::new(contents.lines()),
            Source::Inline(s) => Box::new(s.split([',', '\n'])),
        };
        items
            .map(str::trim)
            .filter(|s| !s.is_empty() && !s.starts_with('#'))
            .collect()
    }
}

/// Resolve an argument: empty is `None`, an existing path is read, anything
/// else is inline data.
pub fn open(arg: &str) -> Result<Option<Source>, LoaderError> {
    if arg.is_empty() {
        return Ok(None);
    }
    let path = PathBuf::from(arg);
    match fs::metadata(&path) {
        Ok(meta) if meta.is_file() => match fs::read_to_string(&path) {
            Ok(contents) => Ok(Some(Source::File { path, contents })),
            Err(source) => Err(LoaderError::Io { path, source }),
        },
        Ok(_) => Err(LoaderError::Io {
            path,
            source: std::io::Error::new(ErrorKind::InvalidInput, "not a regular file"),
        }),
        Err(_) => Ok(Some(Source::Inline(arg.to_string()))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn empty_is_none() {
        assert_eq!(open("").unwrap(), None);
    }

    #[test]
    fn missing_path_is_inline() {
        let src = open("a, b ,,c").unwrap().unwrap();
        assert_eq!(src, Source::Inline("a, b ,,c".into()));
        assert_eq!(src.entries(), vec!["a", "b", "c"]);
        assert!(src.path().is_none());
    }

    #[test]
    fn file_is_read() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "# comment\nfirst\n\n  second  ").unwrap();
        let src = open(file.path().to_str().unwrap()).unwrap().unwrap();
        assert!(matches!(src, Source::File { .. }));
        assert_eq!(src.entries(), vec!["first", "second"]);
    }

    #[test]
    fn directory_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        assert!(matches!(
            open(dir.path().to_str().unwrap()),
            Err(LoaderError::Io { .. })
        ));
    }
}
