// SPDX-FileCopyrightText: 2026 Doppel Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Persona analysis: a short personality card per user and chat.

use std::sync::Arc;

use async_trait::async_trait;
use doppel_config::model::PersonaConfig;
use doppel_core::traits::{MessageStore, ProfileStore, TextGenerator, UserDirectory};
use doppel_core::types::{AnalysisKind, GenerationRequest, PersonaKey, ProfileAnalysis};
use doppel_core::DoppelError;
use serde_json::{Map, Value};
use tracing::{debug, info};

use crate::response::{list_field, parse_json_object, string_field};
use crate::worker::{Analysis, AnalysisOutcome, BackgroundWorker};
use crate::{cooldown_secs, unix_now, Clock};

/// System prompt for persona cards.
pub const PERSONA_SYSTEM_PROMPT: &str = "You are an expert in the psychology of \
communication and in speech style. Describe the portrait of a user from a sample of \
their messages. Work carefully and avoid assumptions the messages do not support.";

const PERSONA_INSTRUCTIONS: &str = r#"Build a short personal card of this user from their messages. Cover interests, sense of humor, emotionality, overall tone and characteristic speech habits. Draw conclusions only from the texts and avoid stereotypes. Return a JSON object with the fields:
{"overall_summary": string, "interests": array, "humor_style": string, "emotionality": string, "tonality": string, "speech_traits": array}.
Fill arrays with strings. When there is not enough data, use the value "unknown"."#;

/// Fields the generator sometimes adds that must not be persisted.
const STRIPPED_FIELDS: &[&str] = &["writing_tips"];

/// One style sample handed to the generator.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PersonaSample {
    pub text: String,
    pub timestamp: i64,
}

/// Build the persona prompt from samples sorted oldest first.
pub fn build_persona_prompt(display_name: &str, samples: &[PersonaSample]) -> GenerationRequest {
    let messages = samples
        .iter()
        .enumerate()
        .map(|(idx, sample)| format!("[{}] {}", idx + 1, sample.text))
        .collect::<Vec<_>>()
        .join("\n");

    GenerationRequest {
        system_prompt: PERSONA_SYSTEM_PROMPT.to_string(),
        prompt: format!(
            "{PERSONA_INSTRUCTIONS}\n\nUser: {display_name}.\nMessages:\n{messages}\n\n\
             The answer must contain exactly one JSON object and no explanations."
        ),
    }
}

/// Summary line for a persona card.
///
/// Falls back from `overall_summary` to the interests, then the speech
/// traits, then a fixed line.
pub fn summarize_persona(card: &Map<String, Value>) -> String {
    if let Some(summary) = string_field(card, "overall_summary") {
        return summary;
    }
    let interests = list_field(card, "interests");
    if !interests.is_empty() {
        return format!("Interests: {}.", interests.join(", "));
    }
    let traits = list_field(card, "speech_traits");
    if !traits.is_empty() {
        return format!("Speech traits: {}.", traits.join(", "));
    }
    "Persona card updated.".to_string()
}

/// Recomputes persona cards from a user's recent style samples.
pub struct PersonaAnalyzer {
    config: PersonaConfig,
    profiles: Arc<dyn ProfileStore<PersonaKey>>,
    users: Arc<dyn UserDirectory>,
    messages: Arc<dyn MessageStore>,
    generator: Arc<dyn TextGenerator>,
    clock: Clock,
}

/// Background worker running persona analyses.
pub type PersonaWorker = BackgroundWorker<PersonaKey, PersonaAnalyzer>;

impl PersonaAnalyzer {
    pub fn new(
        config: PersonaConfig,
        profiles: Arc<dyn ProfileStore<PersonaKey>>,
        users: Arc<dyn UserDirectory>,
        messages: Arc<dyn MessageStore>,
        generator: Arc<dyn TextGenerator>,
    ) -> Self {
        Self {
            config,
            profiles,
            users,
            messages,
            generator,
            clock: unix_now,
        }
    }

    /// Replaces the wall clock used for cooldowns and analysis stamps.
    pub fn with_clock(mut self, clock: Clock) -> Self {
        self.clock = clock;
        self
    }

    pub fn config(&self) -> &PersonaConfig {
        &self.config
    }

    async fn ready(&self, key: &PersonaKey) -> Result<bool, DoppelError> {
        let Some(profile) = self.profiles.profile(key).await? else {
            return Ok(false);
        };
        Ok(profile.is_ready(
            self.config.min_pending,
            cooldown_secs(self.config.cooldown_hours),
            (self.clock)(),
        ))
    }

    async fn collect_samples(&self, key: &PersonaKey) -> Result<Vec<PersonaSample>, DoppelError> {
        let rows = self
            .messages
            .recent_messages(key.chat_id, key.user_id, self.config.max_messages)
            .await?;
        let mut samples: Vec<PersonaSample> = rows
            .into_iter()
            .filter_map(|row| {
                let text = row.text.trim();
                (!text.is_empty()).then(|| PersonaSample {
                    text: text.to_string(),
                    timestamp: row.timestamp,
                })
            })
            .collect();
        samples.sort_by_key(|s| s.timestamp);
        Ok(samples)
    }
}

#[async_trait]
impl Analysis<PersonaKey> for PersonaAnalyzer {
    fn kind(&self) -> AnalysisKind {
        AnalysisKind::Persona
    }

    async fn is_ready(&self, key: &PersonaKey) -> Result<bool, DoppelError> {
        self.ready(key).await
    }

    async fn analyze(&self, key: &PersonaKey) -> Result<AnalysisOutcome, DoppelError> {
        if !self.ready(key).await? {
            return Ok(AnalysisOutcome::NotReady);
        }
        let Some(user) = self.users.get_user(key.user_id).await? else {
            return Ok(AnalysisOutcome::InsufficientEvidence);
        };

        let samples = self.collect_samples(key).await?;
        if samples.is_empty() || samples.len() < self.config.min_pending as usize {
            debug!(key = %key, samples = samples.len(), "not enough persona samples");
            return Ok(AnalysisOutcome::InsufficientEvidence);
        }

        let request = build_persona_prompt(&user.display_name(), &samples);
        let response = self.generator.generate(request).await?;
        let Some(mut card) = parse_json_object(&response) else {
            return Ok(AnalysisOutcome::Malformed);
        };
        for field in STRIPPED_FIELDS {
            card.remove(*field);
        }
        if card.is_empty() {
            return Ok(AnalysisOutcome::Malformed);
        }

        let analysis = ProfileAnalysis {
            summary: summarize_persona(&card),
            details: Value::Object(card),
            analyzed_at: (self.clock)(),
        };
        self.profiles.save_analysis(key, &analysis).await?;
        info!(key = %key, samples = samples.len(), "persona profile updated");
        Ok(AnalysisOutcome::Saved)
    }
}
