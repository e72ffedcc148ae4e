//! Deterministic local model
//!
//! [`ExtractiveModel`] answers without any network access. Summarization
//! requests (JSON mode) are answered by extracting a compact summary document
//! from the transcript embedded in the compaction prompt; ordinary requests get
//! a short acknowledgement of the latest user message. Scenarios, tests and the
//! CLI run on it.

use anyhow::{bail, Result};
use async_trait::async_trait;
use serde_json::json;

use super::{ChatMessage, Completion, CompletionModel, CompletionOptions, Usage};
use crate::compaction::policy::{PRIOR_SUMMARY_HEADER, TRANSCRIPT_HEADER};
use crate::context::{HeuristicEstimator, TokenEstimator};
use crate::types::Role;

/// Maximum summary length in characters
const MAX_SUMMARY_CHARS: usize = 160;

/// Maximum characters per extracted sentence
const MAX_SENTENCE_CHARS: usize = 60;

/// Maximum facts / open questions carried per summary
const MAX_FACTS: usize = 2;
const MAX_QUESTIONS: usize = 2;

/// Words that mark a line as worth keeping as a fact
const FACT_KEYWORDS: [&str; 10] = [
    "decided", "need", "prefer", "budget", "deadline", "must", "confirmed", "order", "booked",
    "account",
];

/// Offline extractive model
#[derive(Debug, Clone)]
pub struct ExtractiveModel {
    report_usage: bool,
}

impl Default for ExtractiveModel {
    fn default() -> Self {
        Self::new()
    }
}

impl ExtractiveModel {
    pub fn new() -> Self {
        Self { report_usage: true }
    }

    /// Behave like a provider that never reports token usage
    pub fn without_usage() -> Self {
        Self {
            report_usage: false,
        }
    }

    fn reply(messages: &[ChatMessage]) -> String {
        let last_user = messages
            .iter()
            .rev()
            .find(|m| m.role == Role::User)
            .map(|m| m.content.as_str())
            .unwrap_or_default();
        format!("Noted: {}", clip(first_sentence(last_user), MAX_SENTENCE_CHARS))
    }

    fn summarize(prompt: &str) -> String {
        let sections = PromptSections::parse(prompt);

        let mut pieces: Vec<String> = sections.prior_summary.clone();
        pieces.extend(
            sections
                .transcript
                .iter()
                .take(3)
                .map(|(_, line)| clip(first_sentence(line), MAX_SENTENCE_CHARS)),
        );
        let summary = clip(&pieces.join(" "), MAX_SUMMARY_CHARS);

        let mut facts: Vec<String> = Vec::new();
        let candidates = sections.prior_facts.iter().cloned().chain(
            sections
                .transcript
                .iter()
                .filter(|(_, line)| {
                    let lower = line.to_lowercase();
                    FACT_KEYWORDS.iter().any(|k| lower.contains(k))
                })
                .map(|(_, line)| clip(first_sentence(line), MAX_SENTENCE_CHARS)),
        );
        for fact in candidates {
            if facts.len() >= MAX_FACTS {
                break;
            }
            if !fact.is_empty() && !facts.contains(&fact) {
                facts.push(fact);
            }
        }

        let mut questions = sections.prior_questions.clone();
        questions.extend(
            sections
                .transcript
                .iter()
                .filter(|(role, line)| *role == Role::User && line.contains('?'))
                .map(|(_, line)| clip(line, MAX_SENTENCE_CHARS)),
        );
        let skip = questions.len().saturating_sub(MAX_QUESTIONS);
        let questions: Vec<String> = questions.into_iter().skip(skip).collect();

        json!({
            "summary": summary,
            "facts": facts,
            "open_questions": questions,
        })
        .to_string()
    }
}

#[async_trait]
impl CompletionModel for ExtractiveModel {
    fn name(&self) -> &str {
        "offline-extractive"
    }

    async fn complete(
        &self,
        messages: &[ChatMessage],
        options: &CompletionOptions,
    ) -> Result<Completion> {
        if messages.is_empty() {
            bail!("No messages to complete");
        }

        let text = if options.json_mode {
            let prompt = messages
                .iter()
                .rev()
                .find(|m| m.role == Role::User)
                .map(|m| m.content.as_str())
                .unwrap_or_default();
            Self::summarize(prompt)
        } else {
            Self::reply(messages)
        };

        let usage = self.report_usage.then(|| {
            let estimator = HeuristicEstimator::default();
            let prompt = estimator.estimate(messages, options.model.as_deref());
            let completion = estimator.estimate(
                &[ChatMessage::assistant(text.clone())],
                options.model.as_deref(),
            );
            Usage::new(to_u32(prompt), to_u32(completion))
        });

        Ok(Completion { text, usage })
    }
}

/// Pieces of a compaction prompt recognised by the extractive summarizer
#[derive(Debug, Default)]
struct PromptSections {
    prior_summary: Vec<String>,
    prior_facts: Vec<String>,
    prior_questions: Vec<String>,
    transcript: Vec<(Role, String)>,
}

impl PromptSections {
    fn parse(prompt: &str) -> Self {
        enum Section {
            Preamble,
            Prior,
            Transcript,
        }

        let mut sections = Self::default();
        let mut current = Section::Preamble;

        for line in prompt.lines().map(str::trim) {
            if line == PRIOR_SUMMARY_HEADER {
                current = Section::Prior;
                continue;
            }
            if line == TRANSCRIPT_HEADER {
                current = Section::Transcript;
                continue;
            }
            match current {
                Section::Preamble => {}
                Section::Prior => {
                    if let Some(rest) = line.strip_prefix("summary: ") {
                        sections.prior_summary.push(rest.to_string());
                    } else if let Some(rest) = line.strip_prefix("fact: ") {
                        sections.prior_facts.push(rest.to_string());
                    } else if let Some(rest) = line.strip_prefix("question: ") {
                        sections.prior_questions.push(rest.to_string());
                    }
                }
                Section::Transcript => {
                    let parsed = [Role::User, Role::Assistant, Role::System]
                        .into_iter()
                        .find_map(|role| {
                            line.strip_prefix(role.as_str())
                                .and_then(|rest| rest.strip_prefix(": "))
                                .map(|rest| (role, rest.to_string()))
                        });
                    if let Some(entry) = parsed {
                        sections.transcript.push(entry);
                    }
                }
            }
        }

        sections
    }
}

fn first_sentence(text: &str) -> &str {
    let text = text.trim();
    match text.find(['.', '!', '?']) {
        Some(pos) => &text[..=pos],
        None => text,
    }
}

/// Truncate at a word boundary, appending "..." when shortened
fn clip(text: &str, max_chars: usize) -> String {
    let text = text.trim();
    if text.chars().count() <= max_chars {
        return text.to_string();
    }
    let mut s: String = text.chars().take(max_chars).collect();
    if let Some(pos) = s.rfind(' ') {
        s.truncate(pos);
    }
    s.push_str("...");
    s
}

fn to_u32(n: usize) -> u32 {
    u32::try_from(n).unwrap_or(u32::MAX)
}
