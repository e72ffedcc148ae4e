//! Context Assembler
//!
//! Builds the bounded message window sent to the model: the system prompt,
//! the selected summaries (oldest first), then the most recent raw turns
//! (oldest first). Raw turns are chosen by recency alone, so a recent turn
//! that is already summarized still appears verbatim.

use itertools::Itertools;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::compaction::PolicyKind;
use crate::history::{DialogHistory, SummaryRecord};
use crate::llm::ChatMessage;
use crate::types::{Role, SummaryId, Timestamp, TurnId};

/// What went into a context window
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContextUsageReport {
    pub summaries: Vec<SummaryPreview>,
    pub raw_turns: Vec<TurnPreview>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SummaryPreview {
    pub id: SummaryId,
    pub created_at: Timestamp,
    pub preview: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TurnPreview {
    pub id: TurnId,
    pub role: Role,
    pub summarized: bool,
    pub preview: String,
}

/// An assembled window
#[derive(Debug, Clone, Default)]
pub struct ContextWindow {
    pub messages: Vec<ChatMessage>,
    pub report: ContextUsageReport,
}

#[derive(Debug, Clone)]
pub struct ContextAssembler {
    raw_history_limit: usize,
    preview_chars: usize,
    system_prompt: Option<String>,
}

impl ContextAssembler {
    pub fn new(raw_history_limit: usize, preview_chars: usize) -> Self {
        Self {
            raw_history_limit,
            preview_chars,
            system_prompt: None,
        }
    }

    pub fn with_system_prompt(mut self, prompt: impl Into<String>) -> Self {
        let prompt = prompt.into();
        self.system_prompt = (!prompt.trim().is_empty()).then_some(prompt);
        self
    }

    pub fn build_context(
        &self,
        history: &DialogHistory,
        max_summaries: usize,
        policy: PolicyKind,
    ) -> ContextWindow {
        let summaries = policy.select_summaries(history, max_summaries);
        let turns = history.raw_turns();
        let recent = &turns[turns.len().saturating_sub(self.raw_history_limit)..];

        let mut window = ContextWindow::default();
        if let Some(prompt) = &self.system_prompt {
            window.messages.push(ChatMessage::system(prompt.clone()));
        }

        for record in summaries {
            window.messages.push(render_summary(record));
            window.report.summaries.push(SummaryPreview {
                id: record.id,
                created_at: record.created_at,
                preview: preview(&record.summary_text, self.preview_chars),
            });
        }

        for turn in recent {
            window
                .messages
                .push(ChatMessage::new(turn.role, turn.content.clone()));
            window.report.raw_turns.push(TurnPreview {
                id: turn.id,
                role: turn.role,
                summarized: turn.is_summarized(),
                preview: preview(&turn.content, self.preview_chars),
            });
        }

        debug!(
            summaries = window.report.summaries.len(),
            raw_turns = window.report.raw_turns.len(),
            %policy,
            "Assembled context window"
        );
        window
    }
}

/// Render one summary as a system message
pub fn render_summary(record: &SummaryRecord) -> ChatMessage {
    let mut text = format!(
        "Summary {} (created {}, covers {} turns)\n{}",
        record.id.short(),
        record.created_at.to_rfc3339(),
        record.source_turn_ids.len(),
        record.summary_text
    );
    if !record.facts.is_empty() {
        text.push_str("\nFacts:");
        for fact in &record.facts {
            text.push_str("\n- ");
            text.push_str(fact);
        }
    }
    if !record.open_questions.is_empty() {
        text.push_str("\nOpen questions:");
        for question in &record.open_questions {
            text.push_str("\n- ");
            text.push_str(question);
        }
    }
    ChatMessage::system(text)
}

fn preview(text: &str, max_chars: usize) -> String {
    let flat = text.split_whitespace().join(" ");
    if flat.chars().count() <= max_chars {
        return flat;
    }
    let mut clipped: String = flat.chars().take(max_chars).collect();
    clipped.push_str("...");
    clipped
}
