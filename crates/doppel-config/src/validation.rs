// SPDX-FileCopyrightText: 2026 Doppel Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Post-deserialization validation for configuration values.

use crate::diagnostic::ConfigError;
use crate::model::DoppelConfig;

const LOG_LEVELS: &[&str] = &["trace", "debug", "info", "warn", "error"];

/// Validate a deserialized configuration for semantic correctness.
///
/// Collects every failure instead of stopping at the first one.
pub fn validate_config(config: &DoppelConfig) -> Result<(), Vec<ConfigError>> {
    let mut errors = Vec::new();

    if config.storage.database_path.trim().is_empty() {
        errors.push(ConfigError::Validation {
            message: "storage.database_path must not be empty".to_string(),
        });
    }

    if config.storage.min_tokens_to_store == 0 {
        errors.push(ConfigError::Validation {
            message: "storage.min_tokens_to_store must be at least 1".to_string(),
        });
    }

    if config.storage.max_store_chars == 0 {
        errors.push(ConfigError::Validation {
            message: "storage.max_store_chars must be at least 1".to_string(),
        });
    }

    if config.storage.max_messages_per_user == 0 {
        errors.push(ConfigError::Validation {
            message: "storage.max_messages_per_user must be at least 1".to_string(),
        });
    }

    // Filter directives such as "doppel_ingest=debug" are passed through.
    let level = config.agent.log_level.trim();
    if !level.contains('=') && !LOG_LEVELS.contains(&level.to_ascii_lowercase().as_str()) {
        errors.push(ConfigError::Validation {
            message: format!(
                "agent.log_level `{level}` must be one of {}",
                LOG_LEVELS.join(", ")
            ),
        });
    }

    let burst = &config.burst;
    if burst.enabled {
        if burst.inactivity_secs == 0 {
            errors.push(ConfigError::Validation {
                message: "burst.inactivity_secs must be at least 1 when bursts are enabled"
                    .to_string(),
            });
        }
        if burst.gap_secs == 0 {
            errors.push(ConfigError::Validation {
                message: "burst.gap_secs must be at least 1 when bursts are enabled".to_string(),
            });
        }
        if burst.watchdog_interval_secs == 0 {
            errors.push(ConfigError::Validation {
                message: "burst.watchdog_interval_secs must be at least 1".to_string(),
            });
        }
        if burst.watchdog_stale_factor == 0 {
            errors.push(ConfigError::Validation {
                message: "burst.watchdog_stale_factor must be at least 1".to_string(),
            });
        }
    }

    for command in &config.ingest.context_commands {
        if !command.starts_with('/') || command.len() < 2 || command.contains(char::is_whitespace)
        {
            errors.push(ConfigError::Validation {
                message: format!(
                    "ingest.context_commands entry `{command}` must look like `/name`"
                ),
            });
        }
    }

    if config.persona.enabled && config.persona.max_messages == 0 {
        errors.push(ConfigError::Validation {
            message: "persona.max_messages must be at least 1".to_string(),
        });
    }

    if config.relationship.enabled && config.relationship.max_excerpts == 0 {
        errors.push(ConfigError::Validation {
            message: "relationship.max_excerpts must be at least 1".to_string(),
        });
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_is_valid() {
        assert!(validate_config(&DoppelConfig::default()).is_ok());
    }

    #[test]
    fn collects_all_errors() {
        let mut config = DoppelConfig::default();
        config.storage.database_path = "  ".to_string();
        config.storage.min_tokens_to_store = 0;
        config.burst.inactivity_secs = 0;

        let errors = validate_config(&config).expect_err("should fail");
        assert_eq!(errors.len(), 3);
    }

    #[test]
    fn disabled_bursts_skip_timer_checks() {
        let mut config = DoppelConfig::default();
        config.burst.enabled = false;
        config.burst.inactivity_secs = 0;
        config.burst.gap_secs = 0;
        assert!(validate_config(&config).is_ok());
    }

    #[test]
    fn rejects_unknown_log_level_but_accepts_directives() {
        let mut config = DoppelConfig::default();
        config.agent.log_level = "loud".to_string();
        assert!(validate_config(&config).is_err());

        config.agent.log_level = "doppel_ingest=debug,info".to_string();
        assert!(validate_config(&config).is_ok());
    }

    #[test]
    fn rejects_malformed_context_command() {
        let mut config = DoppelConfig::default();
        config.ingest.context_commands = vec!["imitate".to_string()];
        let errors = validate_config(&config).expect_err("should fail");
        assert!(errors[0].to_string().contains("context_commands"));
    }

    #[test]
    fn zero_watchdog_factor_from_toml_is_rejected() {
        let toml_str = r#"
[burst]
watchdog_stale_factor = 0
"#;
        let config: DoppelConfig = toml::from_str(toml_str).unwrap();
        assert_eq!(config.burst.gap_secs, 30);
        let errors = validate_config(&config).expect_err("should fail");
        assert!(errors[0].to_string().contains("watchdog_stale_factor"));
    }

    #[test]
    fn unknown_burst_field_fails_to_deserialize() {
        let toml_str = r#"
[burst]
max_fragments = 4
"#;
        assert!(toml::from_str::<DoppelConfig>(toml_str).is_err());
    }
}
