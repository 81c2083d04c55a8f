//! Configuration validation logic.

use crate::config::schema::ProxyConfig;

/// Error type for configuration validation failures.
#[derive(Debug, Clone, PartialEq)]
pub struct ValidationError(pub String);

impl std::fmt::Display for ValidationError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "Validation error: {}", self.0)
    }
}

/// Validate a ProxyConfig for semantic correctness.
pub fn validate_config(config: &ProxyConfig) -> Result<(), Vec<ValidationError>> {
    let mut errors = Vec::new();

    // 1. Listener must have an address and all three PEM files.
    if config.listener.listen_addr.is_empty() {
        errors.push(ValidationError("listener.listen_addr must be set".to_string()));
    }
    for (field, value) in [
        ("listener.ca_file", &config.listener.ca_file),
        ("listener.cert_file", &config.listener.cert_file),
        ("listener.key_file", &config.listener.key_file),
    ] {
        if value.is_empty() {
            errors.push(ValidationError(format!("{} must be set", field)));
        }
    }

    // 2. At least one upstream target, each with a host:port shape.
    if config.upstream.targets.is_empty() {
        errors.push(ValidationError("upstream.targets must not be empty".to_string()));
    }
    for target in &config.upstream.targets {
        if !target.contains(':') {
            errors.push(ValidationError(format!(
                "upstream target '{}' is not a host:port address",
                target
            )));
        }
    }

    // 3. Group names are matched against the portion after '@' in the client
    //    certificate CN, so they cannot themselves contain '@'.
    for group in &config.upstream.authorized_groups {
        if group.is_empty() || group.contains('@') {
            errors.push(ValidationError(format!(
                "authorized group '{}' is not a valid group name",
                group
            )));
        }
    }

    // 4. Rate limiting, when present, needs a positive capacity and interval.
    if let Some(rate_limit) = &config.rate_limit {
        if rate_limit.capacity <= 0 {
            errors.push(ValidationError("rate_limit.capacity must be > 0".to_string()));
        }
        if rate_limit.fill_interval_ms == 0 {
            errors.push(ValidationError("rate_limit.fill_interval_ms must be > 0".to_string()));
        }
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}
