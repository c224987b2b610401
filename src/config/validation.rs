//! Configuration validation.

use crate::config::Config;
use std::collections::HashSet;

/// Validate the configuration.
///
/// Checks for:
/// - Non-empty, unique check names without '/'
/// - Non-zero timeouts
/// - A known log level
///
/// # Returns
///
/// `Ok(())` if valid, or an error message describing every problem found.
pub fn validate_config(config: &Config) -> Result<(), String> {
    let mut errors = Vec::new();
    let mut names = HashSet::new();

    for check in &config.checks {
        if check.name.is_empty() {
            errors.push("check name cannot be empty".to_string());
        }

        // '/' separates the check name from the setting in lookup keys
        if check.name.contains('/') {
            errors.push(format!("check name '{}' cannot contain '/'", check.name));
        }

        if !names.insert(check.name.as_str()) {
            errors.push(format!("duplicate check name: {}", check.name));
        }

        if check.timeout_seconds == Some(0) {
            errors.push(format!("check '{}' has timeout of 0 seconds", check.name));
        }
    }

    let valid_levels = ["trace", "debug", "info", "warn", "error"];
    if !valid_levels.contains(&config.global.log_level.to_lowercase().as_str()) {
        errors.push(format!(
            "invalid log level '{}', must be one of: {}",
            config.global.log_level,
            valid_levels.join(", ")
        ));
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors.join("; "))
    }
}
