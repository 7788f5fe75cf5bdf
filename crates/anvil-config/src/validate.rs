//! Post-merge configuration validation.

use crate::error::{ConfigError, ConfigResult};
use crate::types::Config;

/// Validate a fully-merged and deserialized configuration.
///
/// # Errors
///
/// Returns the first validation error found.
pub fn validate(config: &Config) -> ConfigResult<()> {
    validate_logging(config)?;
    validate_executor(config)?;
    validate_plugins(config)?;
    Ok(())
}

fn invalid(field: &str, message: impl Into<String>) -> ConfigError {
    ConfigError::ValidationError {
        field: field.to_owned(),
        message: message.into(),
    }
}

fn validate_logging(config: &Config) -> ConfigResult<()> {
    let valid_levels = ["trace", "debug", "info", "warn", "error"];
    if !valid_levels.contains(&config.logging.level.as_str()) {
        return Err(invalid(
            "logging.level",
            format!(
                "unsupported log level '{}'; expected one of: {}",
                config.logging.level,
                valid_levels.join(", ")
            ),
        ));
    }

    let valid_formats = ["pretty", "compact", "json", "full"];
    if !valid_formats.contains(&config.logging.format.as_str()) {
        return Err(invalid(
            "logging.format",
            format!(
                "unsupported log format '{}'; expected one of: {}",
                config.logging.format,
                valid_formats.join(", ")
            ),
        ));
    }

    Ok(())
}

fn validate_executor(config: &Config) -> ConfigResult<()> {
    if config.executor.threads == 0 {
        return Err(invalid("executor.threads", "threads must be at least 1"));
    }
    if config.executor.poll_interval_ms == 0 {
        return Err(invalid(
            "executor.poll_interval_ms",
            "poll interval must be at least 1 ms",
        ));
    }
    Ok(())
}

fn validate_plugins(config: &Config) -> ConfigResult<()> {
    if let Err(e) = semver::Version::parse(&config.plugins.runtime_version) {
        return Err(invalid(
            "plugins.runtime_version",
            format!(
                "'{}' is not a semantic version: {e}",
                config.plugins.runtime_version
            ),
        ));
    }

    for pattern in &config.plugins.extra_core_exports {
        let trimmed = pattern.trim();
        if trimmed.is_empty() {
            return Err(invalid(
                "plugins.extra_core_exports",
                "export patterns must not be blank",
            ));
        }
        let name = trimmed.strip_suffix(".*").unwrap_or(trimmed);
        if name.is_empty()
            || name
                .split('.')
                .any(|seg| seg.is_empty() || seg.contains(char::is_whitespace) || seg.contains('*'))
        {
            return Err(invalid(
                "plugins.extra_core_exports",
                format!("'{pattern}' is not a class name or `package.*` pattern"),
            ));
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_is_valid() {
        assert!(validate(&Config::default()).is_ok());
    }

    #[test]
    fn test_rejects_zero_threads() {
        let mut config = Config::default();
        config.executor.threads = 0;
        let err = validate(&config).unwrap_err();
        assert!(matches!(err, ConfigError::ValidationError { ref field, .. } if field == "executor.threads"));
    }

    #[test]
    fn test_rejects_zero_poll_interval() {
        let mut config = Config::default();
        config.executor.poll_interval_ms = 0;
        assert!(validate(&config).is_err());
    }

    #[test]
    fn test_rejects_bad_runtime_version() {
        let mut config = Config::default();
        config.plugins.runtime_version = "three".into();
        let err = validate(&config).unwrap_err();
        assert!(err.to_string().contains("plugins.runtime_version"));
    }

    #[test]
    fn test_export_patterns() {
        let mut config = Config::default();
        config.plugins.extra_core_exports = vec!["org.slf4j.*".into(), "org.example.Api".into()];
        assert!(validate(&config).is_ok());

        config.plugins.extra_core_exports = vec!["  ".into()];
        assert!(validate(&config).is_err());

        config.plugins.extra_core_exports = vec!["org..bad".into()];
        assert!(validate(&config).is_err());
    }

    #[test]
    fn test_rejects_unknown_log_format() {
        let mut config = Config::default();
        config.logging.format = "xml".into();
        assert!(validate(&config).is_err());
    }
}
