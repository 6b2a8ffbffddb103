// SPDX-FileCopyrightText: 2026 Doppel Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Relationship analysis: how one participant talks to another.
//!
//! Each analysis reads the most recent speaker-to-target interactions, pairs
//! every one with the chat lines that preceded it, and asks the generator for
//! a tone assessment. The lexical signal counters kept on the pair are
//! summarized into an extra hint line.

use std::sync::Arc;

use async_trait::async_trait;
use doppel_config::model::RelationshipConfig;
use doppel_core::traits::{
    MessageStore, ProfileStore, RelationshipEvidence, TextGenerator, UserDirectory,
};
use doppel_core::types::{
    AnalysisKind, GenerationRequest, ProfileAnalysis, RelationshipKey, SignalCounts,
};
use doppel_core::DoppelError;
use serde_json::{json, Map, Value};
use tracing::{debug, info};

use crate::response::{parse_json_object, string_field};
use crate::worker::{Analysis, AnalysisOutcome, BackgroundWorker};
use crate::{cooldown_secs, unix_now, Clock};

/// Fewest excerpts an analysis will run on, whatever `min_pending` says.
pub const MIN_EXCERPTS: usize = 5;

/// System prompt for relationship analysis.
pub const RELATIONSHIP_SYSTEM_PROMPT: &str = "You are an expert in social psychology and \
communication analysis. Read the dialogue carefully and draw balanced conclusions about the \
tone, the warmth and the dynamics of the relationship between the participants. Base your \
answers only on the given text.";

/// A speaker-to-target message with the chat lines that preceded it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InteractionExcerpt {
    pub focus_text: String,
    pub focus_timestamp: i64,
    /// `"Name: text"` lines, oldest first.
    pub context: Vec<String>,
}

/// Build the relationship prompt from chronologically ordered excerpts.
pub fn build_relationship_prompt(
    speaker_name: &str,
    target_name: &str,
    excerpts: &[InteractionExcerpt],
    observed: Option<&str>,
) -> GenerationRequest {
    let dialogue = excerpts
        .iter()
        .enumerate()
        .map(|(idx, excerpt)| {
            let context = if excerpt.context.is_empty() {
                "(no context)".to_string()
            } else {
                excerpt.context.join("\n")
            };
            format!(
                "### Episode {}\nTime: {}\nContext:\n{}\nLine:\n{}: {}",
                idx + 1,
                excerpt.focus_timestamp,
                context,
                speaker_name,
                excerpt.focus_text
            )
        })
        .collect::<Vec<_>>()
        .join("\n\n");

    let mut prompt = format!(
        "Analyze how one side talks to the other. Speaker: {speaker_name}. \
         Addressee: {target_name}. Use the episodes below as material. Return the result \
         strictly as a JSON object with the fields:\n\
         {{\"summary\": string, \"tone\": string, \"formality\": string, \
         \"teasing_level\": string, \"respect_level\": string, \"emotional_notes\": string, \
         \"example_quotes\": array}}.\n\
         \"example_quotes\" is a list of up to three characteristic quotes of the speaker. \
         If a field cannot be assessed, fill it with the string \"unknown\".\n\n"
    );
    if let Some(observed) = observed {
        prompt.push_str(&format!("Observed cues: {observed}\n\n"));
    }
    prompt.push_str(&format!(
        "Dialogue:\n{dialogue}\n\nThe answer must contain exactly one JSON object and no explanations."
    ));

    GenerationRequest {
        system_prompt: RELATIONSHIP_SYSTEM_PROMPT.to_string(),
        prompt,
    }
}

/// Summary line for a relationship result.
pub fn summarize_relationship(result: &Map<String, Value>) -> String {
    if let Some(summary) = string_field(result, "summary") {
        return summary;
    }
    let tone = string_field(result, "tone").unwrap_or_else(|| "unknown".to_string());
    let notes = string_field(result, "emotional_notes").unwrap_or_else(|| "unknown".to_string());
    format!("Tone: {tone}. Emotional notes: {notes}.")
}

/// One-line reading of the lexical counters, or `None` when they say nothing.
pub fn describe_signals(counts: &SignalCounts, addressee: &str) -> Option<String> {
    if counts.total == 0 {
        return None;
    }
    let total = f64::from(counts.total);
    let informal = f64::from(counts.informal) / total;
    let formal = f64::from(counts.formal) / total;
    let teasing = f64::from(counts.teasing) / total;

    let mut fragments = Vec::new();
    if informal >= 0.4 && informal > formal {
        fragments.push("uses informal address");
    } else if formal >= 0.4 && formal > informal {
        fragments.push("keeps a distance with formal address");
    }
    if teasing >= 0.25 {
        fragments.push("teases often");
    } else if counts.teasing == 0 && informal < 0.2 {
        fragments.push("stays reserved");
    }

    if fragments.is_empty() {
        return None;
    }
    Some(format!("With {addressee} usually {}.", fragments.join(", ")))
}

fn counts_json(counts: &SignalCounts) -> Value {
    json!({
        "total": counts.total,
        "informal": counts.informal,
        "formal": counts.formal,
        "teasing": counts.teasing,
    })
}

/// Recomputes directed relationship profiles.
pub struct RelationshipAnalyzer {
    config: RelationshipConfig,
    profiles: Arc<dyn ProfileStore<RelationshipKey>>,
    evidence: Arc<dyn RelationshipEvidence>,
    users: Arc<dyn UserDirectory>,
    messages: Arc<dyn MessageStore>,
    generator: Arc<dyn TextGenerator>,
    clock: Clock,
}

/// Background worker running relationship analyses.
pub type RelationshipWorker = BackgroundWorker<RelationshipKey, RelationshipAnalyzer>;

impl RelationshipAnalyzer {
    pub fn new(
        config: RelationshipConfig,
        profiles: Arc<dyn ProfileStore<RelationshipKey>>,
        evidence: Arc<dyn RelationshipEvidence>,
        users: Arc<dyn UserDirectory>,
        messages: Arc<dyn MessageStore>,
        generator: Arc<dyn TextGenerator>,
    ) -> Self {
        Self {
            config,
            profiles,
            evidence,
            users,
            messages,
            generator,
            clock: unix_now,
        }
    }

    pub fn with_clock(mut self, clock: Clock) -> Self {
        self.clock = clock;
        self
    }

    pub fn config(&self) -> &RelationshipConfig {
        &self.config
    }

    fn min_excerpts(&self) -> usize {
        (self.config.min_pending as usize).max(MIN_EXCERPTS)
    }

    async fn ready(&self, key: &RelationshipKey) -> Result<bool, DoppelError> {
        let Some(profile) = self.profiles.profile(key).await? else {
            return Ok(false);
        };
        Ok(profile.is_ready(
            self.config.min_pending,
            cooldown_secs(self.config.cooldown_hours),
            (self.clock)(),
        ))
    }

    /// Excerpts oldest first, each with its preceding chat lines.
    async fn collect_excerpts(
        &self,
        key: &RelationshipKey,
    ) -> Result<Vec<InteractionExcerpt>, DoppelError> {
        let interactions = self
            .evidence
            .pair_interactions(key, self.config.max_excerpts)
            .await?;

        let mut excerpts = Vec::with_capacity(interactions.len());
        for interaction in interactions.iter().rev() {
            let focus_text = interaction.text.trim();
            if focus_text.is_empty() {
                continue;
            }
            let lines = self
                .messages
                .messages_before(key.chat_id, interaction.timestamp, self.config.context_lines)
                .await?;
            let skip = lines.len().saturating_sub(self.config.context_lines);
            let context = lines
                .into_iter()
                .skip(skip)
                .filter_map(|line| {
                    let text = line.text.trim();
                    (!text.is_empty()).then(|| format!("{}: {}", line.author, text))
                })
                .collect();
            excerpts.push(InteractionExcerpt {
                focus_text: focus_text.to_string(),
                focus_timestamp: interaction.timestamp,
                context,
            });
        }
        Ok(excerpts)
    }
}

#[async_trait]
impl Analysis<RelationshipKey> for RelationshipAnalyzer {
    fn kind(&self) -> AnalysisKind {
        AnalysisKind::Relationship
    }

    async fn is_ready(&self, key: &RelationshipKey) -> Result<bool, DoppelError> {
        self.ready(key).await
    }

    async fn analyze(&self, key: &RelationshipKey) -> Result<AnalysisOutcome, DoppelError> {
        if !self.ready(key).await? {
            return Ok(AnalysisOutcome::NotReady);
        }
        let speaker = self.users.get_user(key.speaker_id).await?;
        let target = self.users.get_user(key.target_id).await?;
        let (Some(speaker), Some(target)) = (speaker, target) else {
            return Ok(AnalysisOutcome::InsufficientEvidence);
        };

        let excerpts = self.collect_excerpts(key).await?;
        if excerpts.len() < self.min_excerpts() {
            debug!(key = %key, excerpts = excerpts.len(), "not enough relationship excerpts");
            return Ok(AnalysisOutcome::InsufficientEvidence);
        }

        let target_name = target.display_name();
        let counts = self.evidence.signal_counts(key).await?;
        let observed = counts
            .as_ref()
            .and_then(|c| describe_signals(c, &target_name));

        let request = build_relationship_prompt(
            &speaker.display_name(),
            &target_name,
            &excerpts,
            observed.as_deref(),
        );
        let response = self.generator.generate(request).await?;
        let Some(mut result) = parse_json_object(&response) else {
            return Ok(AnalysisOutcome::Malformed);
        };

        let summary = summarize_relationship(&result);
        if let Some(counts) = &counts {
            result.insert("observed_signals".to_string(), counts_json(counts));
        }
        let analysis = ProfileAnalysis {
            summary,
            details: Value::Object(result),
            analyzed_at: (self.clock)(),
        };
        self.profiles.save_analysis(key, &analysis).await?;
        info!(key = %key, excerpts = excerpts.len(), "relationship profile updated");
        Ok(AnalysisOutcome::Saved)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn object(value: Value) -> Map<String, Value> {
        match value {
            Value::Object(map) => map,
            _ => unreachable!(),
        }
    }

    #[test]
    fn prompt_contains_episodes_and_placeholder_context() {
        let excerpts = vec![
            InteractionExcerpt {
                focus_text: "ты опять опоздал".into(),
                focus_timestamp: 100,
                context: vec!["Bob: sorry, traffic".into()],
            },
            InteractionExcerpt {
                focus_text: "ладно".into(),
                focus_timestamp: 200,
                context: vec![],
            },
        ];
        let request = build_relationship_prompt("Alice", "Bob", &excerpts, Some("With Bob usually teases often."));
        assert_eq!(request.system_prompt, RELATIONSHIP_SYSTEM_PROMPT);
        assert!(request.prompt.contains("Speaker: Alice. Addressee: Bob."));
        assert!(request.prompt.contains("### Episode 1\nTime: 100\nContext:\nBob: sorry, traffic\nLine:\nAlice: ты опять опоздал"));
        assert!(request.prompt.contains("### Episode 2\nTime: 200\nContext:\n(no context)"));
        assert!(request.prompt.contains("Observed cues: With Bob usually teases often."));
    }

    #[test]
    fn summary_fallback_uses_tone_and_notes() {
        let map = object(json!({"summary": "Friendly banter"}));
        assert_eq!(summarize_relationship(&map), "Friendly banter");

        let map = object(json!({"tone": "warm", "formality": "low"}));
        assert_eq!(
            summarize_relationship(&map),
            "Tone: warm. Emotional notes: unknown."
        );
    }

    #[test]
    fn signal_description_reads_ratios() {
        let counts = SignalCounts { total: 10, informal: 6, formal: 0, teasing: 3 };
        assert_eq!(
            describe_signals(&counts, "Bob").as_deref(),
            Some("With Bob usually uses informal address, teases often.")
        );

        let counts = SignalCounts { total: 10, informal: 1, formal: 5, teasing: 0 };
        assert_eq!(
            describe_signals(&counts, "Bob").as_deref(),
            Some("With Bob usually keeps a distance with formal address, stays reserved.")
        );

        let counts = SignalCounts { total: 10, informal: 3, formal: 3, teasing: 1 };
        assert_eq!(describe_signals(&counts, "Bob"), None);
        assert_eq!(describe_signals(&SignalCounts::default(), "Bob"), None);
    }
}
