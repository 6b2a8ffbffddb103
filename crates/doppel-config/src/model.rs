// SPDX-FileCopyrightText: 2026 Doppel Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Configuration model structs for the Doppel pipeline.
//!
//! All structs use `#[serde(deny_unknown_fields)]` to reject unrecognized
//! config keys at startup.

use serde::{Deserialize, Serialize};

/// Top-level Doppel configuration.
///
/// All sections are optional and default to sensible values.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct DoppelConfig {
    /// Process-level settings.
    #[serde(default)]
    pub agent: AgentConfig,

    /// Persistence and storage-worthiness settings.
    #[serde(default)]
    pub storage: StorageConfig,

    /// Per-message classification settings.
    #[serde(default)]
    pub ingest: IngestConfig,

    /// Burst merging and carryover settings.
    #[serde(default)]
    pub burst: BurstConfig,

    /// Persona analyzer settings.
    #[serde(default)]
    pub persona: PersonaConfig,

    /// Relationship analyzer settings.
    #[serde(default)]
    pub relationship: RelationshipConfig,
}

/// Process identity and observability configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct AgentConfig {
    /// Display name used in logs.
    #[serde(default = "default_agent_name")]
    pub name: String,

    /// Logging level (trace, debug, info, warn, error).
    #[serde(default = "default_log_level")]
    pub log_level: String,

    /// Platform id of the bot itself. Its messages are ingested, all other
    /// automated senders are discarded.
    #[serde(default)]
    pub self_platform_id: Option<i64>,

    /// Install the Prometheus recorder and print a scrape at exit.
    #[serde(default)]
    pub metrics_enabled: bool,
}

impl Default for AgentConfig {
    fn default() -> Self {
        Self {
            name: default_agent_name(),
            log_level: default_log_level(),
            self_platform_id: None,
            metrics_enabled: false,
        }
    }
}

fn default_agent_name() -> String {
    "doppel".to_string()
}

fn default_log_level() -> String {
    "info".to_string()
}

/// Storage configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct StorageConfig {
    /// Path to the SQLite database file.
    #[serde(default = "default_database_path")]
    pub database_path: String,

    /// Enable WAL (Write-Ahead Logging) mode for SQLite.
    #[serde(default = "default_wal_mode")]
    pub wal_mode: bool,

    /// Minimum number of word tokens for a text to become a style sample.
    #[serde(default = "default_min_tokens_to_store")]
    pub min_tokens_to_store: usize,

    /// Stored text is truncated to this many characters.
    #[serde(default = "default_max_store_chars")]
    pub max_store_chars: usize,

    /// Older samples beyond this count are trimmed per (chat, user).
    #[serde(default = "default_max_messages_per_user")]
    pub max_messages_per_user: usize,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            database_path: default_database_path(),
            wal_mode: default_wal_mode(),
            min_tokens_to_store: default_min_tokens_to_store(),
            max_store_chars: default_max_store_chars(),
            max_messages_per_user: default_max_messages_per_user(),
        }
    }
}

fn default_database_path() -> String {
    dirs::data_dir()
        .map(|p| p.join("doppel").join("doppel.db"))
        .unwrap_or_else(|| std::path::PathBuf::from("doppel.db"))
        .to_string_lossy()
        .into_owned()
}

fn default_wal_mode() -> bool {
    true
}

fn default_min_tokens_to_store() -> usize {
    3
}

fn default_max_store_chars() -> usize {
    500
}

fn default_max_messages_per_user() -> usize {
    200
}

/// Message classification configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct IngestConfig {
    /// Transcribe voice notes when a transcriber is attached.
    #[serde(default)]
    pub voice_transcription: bool,

    /// Commands whose argument is stored as a context-only snippet.
    #[serde(default = "default_context_commands")]
    pub context_commands: Vec<String>,
}

impl Default for IngestConfig {
    fn default() -> Self {
        Self {
            voice_transcription: false,
            context_commands: default_context_commands(),
        }
    }
}

fn default_context_commands() -> Vec<String> {
    vec!["/imitate".to_string()]
}

/// Burst merging configuration.
///
/// Zero disables `max_duration_secs`, `max_parts` and `max_chars`.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct BurstConfig {
    #[serde(default = "default_true")]
    pub enabled: bool,

    /// Silence longer than this starts a new burst.
    #[serde(default = "default_gap_secs")]
    pub gap_secs: u64,

    /// A burst older than this starts a new one.
    #[serde(default = "default_max_duration_secs")]
    pub max_duration_secs: u64,

    /// Debounce delay before a quiet burst is flushed.
    #[serde(default = "default_inactivity_secs")]
    pub inactivity_secs: u64,

    #[serde(default = "default_max_parts")]
    pub max_parts: usize,

    #[serde(default = "default_max_chars")]
    pub max_chars: usize,

    /// Carryover older than this is committed standalone.
    #[serde(default = "default_carryover_max_age_secs")]
    pub carryover_max_age_secs: u64,

    /// Window in which another speaker's turn interrupts a burst.
    #[serde(default = "default_turn_window_secs")]
    pub turn_window_secs: u64,

    #[serde(default = "default_watchdog_interval_secs")]
    pub watchdog_interval_secs: u64,

    /// The watchdog flushes a burst silent for this many inactivity periods.
    #[serde(default = "default_watchdog_stale_factor")]
    pub watchdog_stale_factor: u32,
}

impl Default for BurstConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            gap_secs: default_gap_secs(),
            max_duration_secs: default_max_duration_secs(),
            inactivity_secs: default_inactivity_secs(),
            max_parts: default_max_parts(),
            max_chars: default_max_chars(),
            carryover_max_age_secs: default_carryover_max_age_secs(),
            turn_window_secs: default_turn_window_secs(),
            watchdog_interval_secs: default_watchdog_interval_secs(),
            watchdog_stale_factor: default_watchdog_stale_factor(),
        }
    }
}

fn default_true() -> bool {
    true
}

fn default_gap_secs() -> u64 {
    30
}

fn default_max_duration_secs() -> u64 {
    120
}

fn default_inactivity_secs() -> u64 {
    10
}

fn default_max_parts() -> usize {
    6
}

fn default_max_chars() -> usize {
    2000
}

fn default_carryover_max_age_secs() -> u64 {
    120
}

fn default_turn_window_secs() -> u64 {
    8
}

fn default_watchdog_interval_secs() -> u64 {
    5
}

fn default_watchdog_stale_factor() -> u32 {
    2
}

/// Persona analyzer configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct PersonaConfig {
    #[serde(default = "default_true")]
    pub enabled: bool,

    /// New samples required before a re-analysis.
    #[serde(default = "default_persona_min_pending")]
    pub min_pending: u32,

    /// Minimum time between analyses of one user. Zero disables it.
    #[serde(default = "default_persona_cooldown_hours")]
    pub cooldown_hours: u64,

    /// Number of recent samples given to the generator.
    #[serde(default = "default_persona_max_messages")]
    pub max_messages: usize,
}

impl Default for PersonaConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            min_pending: default_persona_min_pending(),
            cooldown_hours: default_persona_cooldown_hours(),
            max_messages: default_persona_max_messages(),
        }
    }
}

fn default_persona_min_pending() -> u32 {
    50
}

fn default_persona_cooldown_hours() -> u64 {
    12
}

fn default_persona_max_messages() -> usize {
    150
}

/// Relationship analyzer configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct RelationshipConfig {
    #[serde(default = "default_true")]
    pub enabled: bool,

    #[serde(default = "default_relationship_min_pending")]
    pub min_pending: u32,

    #[serde(default = "default_relationship_cooldown_hours")]
    pub cooldown_hours: u64,

    /// Most recent speaker-to-target messages given to the generator.
    #[serde(default = "default_max_excerpts")]
    pub max_excerpts: usize,

    /// Preceding chat lines shown with each excerpt.
    #[serde(default = "default_context_lines")]
    pub context_lines: usize,
}

impl Default for RelationshipConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            min_pending: default_relationship_min_pending(),
            cooldown_hours: default_relationship_cooldown_hours(),
            max_excerpts: default_max_excerpts(),
            context_lines: default_context_lines(),
        }
    }
}

fn default_relationship_min_pending() -> u32 {
    10
}

fn default_relationship_cooldown_hours() -> u64 {
    6
}

fn default_max_excerpts() -> usize {
    20
}

fn default_context_lines() -> usize {
    3
}
