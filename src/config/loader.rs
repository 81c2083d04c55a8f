//! Configuration loading from disk.

use std::fs;
use std::path::Path;
use std::time::Duration;

use crate::config::schema::{ObservabilitySection, ProxyConfig};
use crate::config::validation::{validate_config, ValidationError};
use crate::config::{Config, ConfigError, ListenerConfig, RateLimitConfig, UpstreamConfig};

/// Error type for configuration loading.
#[derive(Debug)]
pub enum LoadError {
    Io(std::io::Error),
    Parse(toml::de::Error),
    Validation(Vec<ValidationError>),
    Config(ConfigError),
}

impl std::fmt::Display for LoadError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            LoadError::Io(e) => write!(f, "IO error: {}", e),
            LoadError::Parse(e) => write!(f, "Parse error: {}", e),
            LoadError::Validation(errors) => {
                write!(f, "Validation failed: ")?;
                for (i, err) in errors.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{}", err)?;
                }
                Ok(())
            }
            LoadError::Config(e) => write!(f, "Invalid config: {}", e),
        }
    }
}

impl std::error::Error for LoadError {}

/// Load and validate configuration from a TOML file, reading the referenced
/// PEM material into the runtime [`Config`].
pub fn load_config(path: &Path) -> Result<(Config, ObservabilitySection), LoadError> {
    let content = fs::read_to_string(path).map_err(LoadError::Io)?;
    let schema: ProxyConfig = toml::from_str(&content).map_err(LoadError::Parse)?;

    validate_config(&schema).map_err(LoadError::Validation)?;

    let ca = fs::read(&schema.listener.ca_file).map_err(LoadError::Io)?;
    let certificate = fs::read(&schema.listener.cert_file).map_err(LoadError::Io)?;
    let private_key = fs::read(&schema.listener.key_file).map_err(LoadError::Io)?;

    let config = Config {
        listener: ListenerConfig {
            listen_addr: schema.listener.listen_addr,
            ca,
            certificate,
            private_key,
        },
        upstream: UpstreamConfig {
            name: schema.upstream.name,
            targets: schema.upstream.targets,
            authorized_groups: schema.upstream.authorized_groups.into_iter().collect(),
        },
        rate_limit: schema.rate_limit.map(|section| RateLimitConfig {
            capacity: section.capacity,
            fill_interval: Duration::from_millis(section.fill_interval_ms),
        }),
    };

    config.validate().map_err(LoadError::Config)?;

    Ok((config, schema.observability))
}
