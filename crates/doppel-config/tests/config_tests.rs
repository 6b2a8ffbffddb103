// SPDX-FileCopyrightText: 2026 Doppel Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Integration tests for the Doppel configuration system.

use doppel_config::diagnostic::ConfigError;
use doppel_config::model::DoppelConfig;
use doppel_config::{load_and_validate_path, load_and_validate_str, load_config_from_str};

/// Valid TOML with every section deserializes successfully.
#[test]
fn valid_toml_deserializes_into_doppel_config() {
    let toml = r#"
[agent]
name = "replayer"
log_level = "debug"
self_platform_id = 777

[storage]
database_path = "/tmp/doppel-test.db"
wal_mode = false
min_tokens_to_store = 4
max_store_chars = 300

[ingest]
voice_transcription = true
context_commands = ["/imitate", "/mimic"]

[burst]
enabled = true
gap_secs = 20
inactivity_secs = 5
max_parts = 4

[persona]
min_pending = 30
cooldown_hours = 0

[relationship]
enabled = false
context_lines = 2
"#;

    let config = load_config_from_str(toml).expect("valid TOML should deserialize");
    assert_eq!(config.agent.name, "replayer");
    assert_eq!(config.agent.self_platform_id, Some(777));
    assert_eq!(config.storage.database_path, "/tmp/doppel-test.db");
    assert!(!config.storage.wal_mode);
    assert_eq!(config.storage.min_tokens_to_store, 4);
    assert_eq!(config.storage.max_store_chars, 300);
    assert!(config.ingest.voice_transcription);
    assert_eq!(config.ingest.context_commands, vec!["/imitate", "/mimic"]);
    assert_eq!(config.burst.gap_secs, 20);
    assert_eq!(config.burst.inactivity_secs, 5);
    assert_eq!(config.burst.max_parts, 4);
    // Unset fields keep their defaults.
    assert_eq!(config.burst.max_chars, 2000);
    assert_eq!(config.persona.min_pending, 30);
    assert_eq!(config.persona.cooldown_hours, 0);
    assert!(!config.relationship.enabled);
    assert_eq!(config.relationship.context_lines, 2);
    assert_eq!(config.relationship.max_excerpts, 20);
}

/// Defaults match the documented values.
#[test]
fn serialized_defaults_are_sensible() {
    let config = DoppelConfig::default();

    assert_eq!(config.agent.name, "doppel");
    assert_eq!(config.agent.log_level, "info");
    assert!(config.agent.self_platform_id.is_none());
    assert_eq!(config.storage.min_tokens_to_store, 3);
    assert_eq!(config.storage.max_store_chars, 500);
    assert_eq!(config.storage.max_messages_per_user, 200);
    assert!(!config.ingest.voice_transcription);
    assert_eq!(config.ingest.context_commands, vec!["/imitate"]);

    let burst = &config.burst;
    assert!(burst.enabled);
    assert_eq!(burst.gap_secs, 30);
    assert_eq!(burst.max_duration_secs, 120);
    assert_eq!(burst.inactivity_secs, 10);
    assert_eq!(burst.max_parts, 6);
    assert_eq!(burst.max_chars, 2000);
    assert_eq!(burst.carryover_max_age_secs, 120);
    assert_eq!(burst.turn_window_secs, 8);
    assert_eq!(burst.watchdog_interval_secs, 5);
    assert_eq!(burst.watchdog_stale_factor, 2);

    assert!(config.persona.enabled);
    assert_eq!(config.persona.min_pending, 50);
    assert_eq!(config.persona.cooldown_hours, 12);
    assert_eq!(config.persona.max_messages, 150);

    assert!(config.relationship.enabled);
    assert_eq!(config.relationship.min_pending, 10);
    assert_eq!(config.relationship.cooldown_hours, 6);
    assert_eq!(config.relationship.max_excerpts, 20);
    assert_eq!(config.relationship.context_lines, 3);
}

/// Empty input yields the defaults.
#[test]
fn missing_sections_use_defaults() {
    let config = load_config_from_str("").expect("empty TOML is valid");
    assert_eq!(config.burst.gap_secs, 30);
    assert_eq!(config.persona.min_pending, 50);
}

/// Env overrides are dotted paths; exercised through the Figment builder.
#[test]
fn env_style_override_wins_over_toml() {
    use figment::{
        providers::{Format, Serialized, Toml},
        Figment,
    };

    let toml_content = r#"
[burst]
max_parts = 4
"#;

    let key = doppel_config::loader::env_key_to_path("burst_max_parts");
    let config: DoppelConfig = Figment::new()
        .merge(Serialized::defaults(DoppelConfig::default()))
        .merge(Toml::string(toml_content))
        .merge((key.as_str(), 9))
        .extract()
        .expect("should merge override");

    assert_eq!(config.burst.max_parts, 9);
}

/// Missing config files are silently skipped.
#[test]
fn missing_config_files_silently_skipped() {
    use figment::{
        providers::{Format, Serialized, Toml},
        Figment,
    };

    let config: DoppelConfig = Figment::new()
        .merge(Serialized::defaults(DoppelConfig::default()))
        .merge(Toml::file("/nonexistent/path/doppel.toml"))
        .extract()
        .expect("missing file should be silently skipped");

    assert_eq!(config.agent.name, "doppel");
}

/// Unknown top-level sections are rejected.
#[test]
fn deny_unknown_fields_at_top_level() {
    let toml = r#"
[telegram]
bot_token = "abc"
"#;

    let err = load_config_from_str(toml).expect_err("should reject unknown section");
    assert!(err.to_string().contains("telegram"), "got: {err}");
}

/// A typo in [burst] produces an UnknownKey diagnostic with a suggestion.
#[test]
fn diagnostic_error_suggests_burst_key() {
    let toml = r#"
[burst]
inactivty_secs = 5
"#;

    let errors = load_and_validate_str(toml).expect_err("should produce errors");
    let has_unknown_key = errors.iter().any(|e| {
        matches!(e, ConfigError::UnknownKey { key, suggestion, valid_keys, .. } if {
            key == "inactivty_secs"
                && suggestion.as_deref() == Some("inactivity_secs")
                && valid_keys.contains("max_parts")
        })
    });
    assert!(
        has_unknown_key,
        "should suggest inactivity_secs, got: {errors:?}"
    );
}

/// Wrong value types produce a readable error.
#[test]
fn diagnostic_invalid_type_message() {
    let toml = r#"
[persona]
min_pending = "lots"
"#;

    let errors = load_and_validate_str(toml).expect_err("should reject invalid type");
    let rendered: Vec<String> = errors.iter().map(|e| e.to_string()).collect();
    assert!(
        rendered
            .iter()
            .any(|e| e.contains("invalid type") || e.contains("min_pending")),
        "got: {rendered:?}"
    );
}

/// ConfigError implements miette::Diagnostic with code and help.
#[test]
fn config_error_implements_diagnostic() {
    use miette::Diagnostic;

    let error = ConfigError::UnknownKey {
        key: "gap_sec".to_string(),
        suggestion: Some("gap_secs".to_string()),
        valid_keys: "enabled, gap_secs".to_string(),
        span: None,
        src: None,
    };

    assert!(error.code().is_some());
    let help = error.help().map(|h| h.to_string()).unwrap_or_default();
    assert!(help.contains("did you mean `gap_secs`"), "got: {help}");
}

/// Validation failures surface through load_and_validate_str.
#[test]
fn load_and_validate_reports_semantic_errors() {
    let toml = r#"
[storage]
min_tokens_to_store = 0

[burst]
inactivity_secs = 0
"#;

    let errors = load_and_validate_str(toml).expect_err("should fail validation");
    assert_eq!(errors.len(), 2, "got: {errors:?}");
    assert!(
        errors
            .iter()
            .all(|e| matches!(e, ConfigError::Validation { .. }))
    );
}

/// Loading from an explicit path reads that file.
#[test]
fn load_and_validate_path_reads_file() {
    let dir = tempfile::tempdir().expect("temp dir");
    let path = dir.path().join("doppel.toml");
    std::fs::write(&path, "[burst]\ngap_secs = 45\n").expect("write config");

    let config = load_and_validate_path(&path).expect("valid file");
    assert_eq!(config.burst.gap_secs, 45);
}
