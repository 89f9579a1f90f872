//! Configuration loading from disk and environment.

use std::fs;
use std::path::Path;

use crate::config::schema::{DiscoveryMode, PickerConfig};
use crate::config::validation::{validate_config, ValidationError};

/// Environment toggle selecting the static endpoint list.
pub const LOCAL_MODE_ENV: &str = "LOCAL_MODE";

/// Comma-separated static endpoint list used in local mode.
pub const LOCAL_ENDPOINTS_ENV: &str = "LOCAL_ENDPOINTS";

/// Error type for configuration loading.
#[derive(Debug)]
pub enum ConfigError {
    Io(std::io::Error),
    Parse(toml::de::Error),
    Validation(Vec<ValidationError>),
}

impl std::fmt::Display for ConfigError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ConfigError::Io(e) => write!(f, "IO error: {}", e),
            ConfigError::Parse(e) => write!(f, "Parse error: {}", e),
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

/// Parse a configuration from TOML text without validating it.
pub fn parse_config(content: &str) -> Result<PickerConfig, ConfigError> {
    toml::from_str(content).map_err(ConfigError::Parse)
}

/// Load configuration from an optional TOML file, apply environment
/// overrides, then validate.
pub fn load_config(path: Option<&Path>) -> Result<PickerConfig, ConfigError> {
    let mut config = match path {
        Some(path) => {
            let content = fs::read_to_string(path).map_err(ConfigError::Io)?;
            parse_config(&content)?
        }
        None => PickerConfig::default(),
    };

    apply_overrides(&mut config, |key| std::env::var(key).ok());

    validate_config(&config).map_err(ConfigError::Validation)?;

    Ok(config)
}

/// Apply `LOCAL_MODE` / `LOCAL_ENDPOINTS` overrides using `lookup` for values.
///
/// `LOCAL_MODE` enables local mode only when it equals `true` ignoring case;
/// any other value forces cluster mode.
pub fn apply_overrides<F>(config: &mut PickerConfig, lookup: F)
where
    F: Fn(&str) -> Option<String>,
{
    if let Some(mode) = lookup(LOCAL_MODE_ENV) {
        config.discovery.mode = if mode.trim().eq_ignore_ascii_case("true") {
            DiscoveryMode::Local
        } else {
            DiscoveryMode::Cluster
        };
    }

    if let Some(list) = lookup(LOCAL_ENDPOINTS_ENV) {
        config.discovery.local_endpoints = list
            .split(',')
            .map(str::trim)
            .filter(|item| !item.is_empty())
            .map(String::from)
            .collect();
    }
}
