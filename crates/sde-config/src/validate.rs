use crate::config::Config;
use crate::error::ConfigError;

/// Upper bound for `sourcekite.max_retries`.
const MAX_RETRIES_LIMIT: u32 = 20;

/// Validate a [`Config`], returning all detected violations.
pub fn validate(config: &Config) -> Result<(), Vec<ConfigError>> {
    let mut errors = Vec::new();

    if config.sourcekite.path.trim().is_empty() {
        errors.push(ConfigError::Validation {
            field: "sourcekite.path".to_string(),
            message: "must not be empty".to_string(),
        });
    }

    if config.sourcekite.docker_mode && config.sourcekite.docker_image.trim().is_empty() {
        errors.push(ConfigError::Validation {
            field: "sourcekite.docker_image".to_string(),
            message: "must not be empty when docker_mode is on".to_string(),
        });
    }

    if config.sourcekite.max_retries > MAX_RETRIES_LIMIT {
        errors.push(ConfigError::Validation {
            field: "sourcekite.max_retries".to_string(),
            message: format!(
                "must be at most {}, got {}",
                MAX_RETRIES_LIMIT, config.sourcekite.max_retries
            ),
        });
    }

    for (field, value) in [
        ("format.indent_width", config.format.indent_width),
        ("format.tab_width", config.format.tab_width),
    ] {
        if value == 0 || value > 16 {
            errors.push(ConfigError::Validation {
                field: field.to_string(),
                message: format!("must be 1-16, got {}", value),
            });
        }
    }

    for (i, target) in config.targets.iter().enumerate() {
        if target.name.trim().is_empty() {
            errors.push(ConfigError::Validation {
                field: format!("targets[{}].name", i),
                message: "must not be empty".to_string(),
            });
        }
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}
