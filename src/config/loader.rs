//! Configuration loading from disk.

use std::fs;
use std::path::Path;

use crate::config::schema::BaseConfig;
use crate::config::validation::{validate_config, ValidationError};

/// Error type for configuration loading.
#[derive(Debug)]
pub enum ConfigError {
    Io(std::io::Error),
    Json(serde_json::Error),
    Toml(toml::de::Error),
    Validation(Vec<ValidationError>),
}

impl std::fmt::Display for ConfigError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ConfigError::Io(e) => write!(f, "IO error: {}", e),
            ConfigError::Json(e) => write!(f, "Parse error: {}", e),
            ConfigError::Toml(e) => write!(f, "Parse error: {}", e),
            ConfigError::Validation(errors) => {
                write!(f, "Validation failed: ")?;
                for (i, err) in errors.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{}", err)?;
                }
                Ok(())
            }
        }
    }
}

impl std::error::Error for ConfigError {}

/// Read a configuration file without validating it.
///
/// Files ending in `.toml` are TOML; everything else is JSON.
pub fn read_config(path: &Path) -> Result<BaseConfig, ConfigError> {
    let content = fs::read_to_string(path).map_err(ConfigError::Io)?;
    let is_toml = path
        .extension()
        .is_some_and(|ext| ext.eq_ignore_ascii_case("toml"));
    if is_toml {
        toml::from_str(&content).map_err(ConfigError::Toml)
    } else {
        serde_json::from_str(&content).map_err(ConfigError::Json)
    }
}

/// Load and validate configuration from a file.
pub fn load_config(path: &Path) -> Result<BaseConfig, ConfigError> {
    let config = read_config(path)?;
    validate_config(&config).map_err(ConfigError::Validation)?;
    Ok(config)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn loads_json() {
        let mut file = tempfile::Builder::new().suffix(".json").tempfile().unwrap();
        write!(file, r#"{{"ServeNodes": ["socks5://:1080"], "Retries": 1}}"#).unwrap();
        let cfg = load_config(file.path()).unwrap();
        assert_eq!(cfg.route.serve_nodes, vec!["socks5://:1080"]);
        assert_eq!(cfg.route.retries, 1);
    }

    #[test]
    fn loads_toml() {
        let mut file = tempfile::Builder::new().suffix(".toml").tempfile().unwrap();
        write!(
            file,
            "Debug = true\nServeNodes = [\"http://:8080\"]\n\n[[Routes]]\nServeNodes = [\"socks5://:1081\"]\nChainNodes = [\"socks5://relay:1080\"]\n"
        )
        .unwrap();
        let cfg = load_config(file.path()).unwrap();
        assert!(cfg.debug);
        assert_eq!(cfg.routes[0].chain_nodes, vec!["socks5://relay:1080"]);
    }

    #[test]
    fn invalid_config_is_rejected() {
        let mut file = tempfile::Builder::new().suffix(".json").tempfile().unwrap();
        write!(file, r#"{{"Debug": true}}"#).unwrap();
        assert!(matches!(load_config(file.path()), Err(ConfigError::Validation(_))));
        assert!(read_config(file.path()).is_ok());
    }

    #[test]
    fn malformed_json() {
        let mut file = tempfile::Builder::new().suffix(".json").tempfile().unwrap();
        write!(file, "{{not json").unwrap();
        assert!(matches!(read_config(file.path()), Err(ConfigError::Json(_))));
    }
}
