// SPDX-FileCopyrightText: 2026 Doppel Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Common types shared across the ingestion pipeline, analyzers, and storage.

use std::fmt;

use serde::{Deserialize, Serialize};
use strum::{Display, EnumString};

/// Identifier of a chat on the messaging platform.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ChatId(pub i64);

/// Internal (storage-assigned) user identifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct UserId(pub i64);

/// User identifier native to the messaging platform.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct PlatformUserId(pub i64);

impl fmt::Display for ChatId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl fmt::Display for UserId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl fmt::Display for PlatformUserId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Fallback label for users with neither a name nor a username.
pub const UNKNOWN_USER: &str = "Unknown user";

/// Builds a human-readable name from the optional name parts of a user.
///
/// Prefers "First Last", then "@username", then [`UNKNOWN_USER`].
pub fn display_name(
    username: Option<&str>,
    first_name: Option<&str>,
    last_name: Option<&str>,
) -> String {
    let parts: Vec<&str> = [first_name, last_name]
        .into_iter()
        .flatten()
        .filter(|p| !p.is_empty())
        .collect();
    if !parts.is_empty() {
        return parts.join(" ");
    }
    match username {
        Some(name) if name.starts_with('@') => name.to_string(),
        Some(name) if !name.is_empty() => format!("@{name}"),
        _ => UNKNOWN_USER.to_string(),
    }
}

/// A participant as seen by the messaging platform.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Participant {
    pub platform_id: PlatformUserId,
    #[serde(default)]
    pub username: Option<String>,
    #[serde(default)]
    pub first_name: Option<String>,
    #[serde(default)]
    pub last_name: Option<String>,
    #[serde(default)]
    pub is_bot: bool,
}

impl Participant {
    pub fn display_name(&self) -> String {
        display_name(
            self.username.as_deref(),
            self.first_name.as_deref(),
            self.last_name.as_deref(),
        )
    }
}

/// A chat message handed to the pipeline by the transport layer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IncomingMessage {
    pub chat_id: ChatId,
    /// Author of the message. `None` for anonymous channel posts.
    #[serde(default)]
    pub sender: Option<Participant>,
    #[serde(default)]
    pub text: Option<String>,
    /// Whether the message carries a voice note that may be transcribed.
    #[serde(default)]
    pub has_voice: bool,
    /// Unix timestamp in seconds.
    pub timestamp: i64,
    /// Sent through an inline bot relay.
    #[serde(default)]
    pub via_bot: bool,
    #[serde(default)]
    pub forwarded: bool,
    /// Author of the message this one replies to.
    #[serde(default)]
    pub reply_to: Option<Participant>,
    /// Usernames mentioned in the text, without the leading `@`.
    #[serde(default)]
    pub mentions: Vec<String>,
}

/// Text accepted by the pipeline for a single message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CapturedText {
    pub text: String,
    /// The text came from the alternate (voice) channel.
    pub from_voice: bool,
}

/// A user row as stored by the user directory.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UserRecord {
    pub id: UserId,
    pub platform_id: PlatformUserId,
    pub username: Option<String>,
    pub first_name: Option<String>,
    pub last_name: Option<String>,
}

impl UserRecord {
    pub fn display_name(&self) -> String {
        display_name(
            self.username.as_deref(),
            self.first_name.as_deref(),
            self.last_name.as_deref(),
        )
    }
}

/// A message to persist.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewMessage {
    pub chat_id: ChatId,
    pub user_id: UserId,
    pub text: String,
    pub timestamp: i64,
    /// Stored only as dialogue context, never used as a style sample.
    pub context_only: bool,
}

/// A persisted style sample.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoredMessage {
    pub text: String,
    pub timestamp: i64,
}

/// A persisted chat line with its author's display name.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ContextLine {
    pub author: String,
    pub text: String,
    pub timestamp: i64,
}

/// Kind of derived profile.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Display, EnumString, Serialize, Deserialize)]
#[strum(serialize_all = "snake_case")]
pub enum AnalysisKind {
    Persona,
    Relationship,
}

/// Key of a persona profile: one user within one chat.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct PersonaKey {
    pub chat_id: ChatId,
    pub user_id: UserId,
}

impl PersonaKey {
    pub fn new(chat_id: ChatId, user_id: UserId) -> Self {
        Self { chat_id, user_id }
    }
}

impl fmt::Display for PersonaKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.chat_id, self.user_id)
    }
}

/// Key of a directed relationship profile: how `speaker` talks to `target`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct RelationshipKey {
    pub chat_id: ChatId,
    pub speaker_id: UserId,
    pub target_id: UserId,
}

impl RelationshipKey {
    pub fn new(chat_id: ChatId, speaker_id: UserId, target_id: UserId) -> Self {
        Self {
            chat_id,
            speaker_id,
            target_id,
        }
    }
}

impl fmt::Display for RelationshipKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}->{}", self.chat_id, self.speaker_id, self.target_id)
    }
}

/// Lexical cues detected in a message addressed to another participant.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct InteractionSignals {
    pub informal: bool,
    pub formal: bool,
    pub teasing: bool,
}

impl InteractionSignals {
    pub fn has_any(&self) -> bool {
        self.informal || self.formal || self.teasing
    }
}

/// One speaker-to-target message recorded as relationship evidence.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Interaction {
    pub text: String,
    pub timestamp: i64,
    pub signals: InteractionSignals,
}

/// Aggregated signal counters for a relationship.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SignalCounts {
    pub total: u32,
    pub informal: u32,
    pub formal: u32,
    pub teasing: u32,
}

/// Persisted state of a persona or relationship profile.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct AnalyzableProfile {
    /// Evidence accumulated since the last successful analysis.
    pub pending: u32,
    /// Unix timestamp of the last successful analysis.
    pub last_analyzed_at: Option<i64>,
    pub summary: Option<String>,
    pub details: Option<serde_json::Value>,
}

impl AnalyzableProfile {
    /// Returns true when enough evidence accumulated and the cooldown elapsed.
    ///
    /// A zero `cooldown_secs` disables the cooldown.
    pub fn is_ready(&self, min_pending: u32, cooldown_secs: i64, now: i64) -> bool {
        if self.pending < min_pending {
            return false;
        }
        match self.last_analyzed_at {
            Some(last) if cooldown_secs > 0 => now - last >= cooldown_secs,
            _ => true,
        }
    }
}

/// The result of a successful analysis, written back to storage.
#[derive(Debug, Clone, PartialEq)]
pub struct ProfileAnalysis {
    pub summary: String,
    pub details: serde_json::Value,
    pub analyzed_at: i64,
}

/// A request to the text generation collaborator.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GenerationRequest {
    pub system_prompt: String,
    pub prompt: String,
}

/// Health status reported by storage backends.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HealthStatus {
    Healthy,
    Degraded(String),
    Unhealthy(String),
}
