//! # Compaction Policy
//!
//! Decides how a pending span is merged with the summaries that already exist.
//!
//! - **Independent**: the span is summarized on its own and the new record is
//!   appended next to the earlier ones.
//! - **Cumulative**: the span is summarized together with every existing
//!   summary, and the resulting rolling record replaces them all.

use itertools::Itertools;
use serde::{Deserialize, Serialize};
use std::convert::Infallible;
use std::fmt;
use std::str::FromStr;

use crate::error::CompactionError;
use crate::history::{DialogHistory, SummaryRecord, Turn};
use crate::llm::ChatMessage;
use crate::types::TurnId;

/// Line introducing the raw transcript in a compaction prompt
pub const TRANSCRIPT_HEADER: &str = "Conversation:";

/// Line introducing earlier summaries in a cumulative compaction prompt
pub const PRIOR_SUMMARY_HEADER: &str = "Previous summary:";

const SUMMARIZER_INSTRUCTIONS: &str = "You compress conversation history. \
Reply with a single JSON object and nothing else, shaped as \
{\"summary\": string, \"facts\": [string], \"open_questions\": [string]}. \
Keep names, numbers, decisions and commitments. Drop greetings and filler.";

/// Compaction policy
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PolicyKind {
    #[default]
    Independent,
    Cumulative,
}

impl PolicyKind {
    /// Resolve a policy name, case-insensitively. Unknown names fall back to
    /// [`PolicyKind::Independent`].
    pub fn resolve(name: &str) -> Self {
        match name.trim().to_ascii_lowercase().as_str() {
            "cumulative" => Self::Cumulative,
            _ => Self::Independent,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Independent => "independent",
            Self::Cumulative => "cumulative",
        }
    }

    /// Build the summarization request for `span`.
    ///
    /// Only the cumulative policy looks at `existing`.
    pub fn build_prompt(self, span: &[Turn], existing: &[SummaryRecord]) -> Vec<ChatMessage> {
        let mut prompt = String::from(
            "Summarize the conversation below so it can replace the original turns.\n",
        );

        if self == Self::Cumulative && !existing.is_empty() {
            prompt.push('\n');
            prompt.push_str(PRIOR_SUMMARY_HEADER);
            prompt.push('\n');
            for record in existing {
                prompt.push_str(&format!("summary: {}\n", one_line(&record.summary_text)));
                for fact in &record.facts {
                    prompt.push_str(&format!("fact: {}\n", one_line(fact)));
                }
                for question in &record.open_questions {
                    prompt.push_str(&format!("question: {}\n", one_line(question)));
                }
            }
        }

        prompt.push('\n');
        prompt.push_str(TRANSCRIPT_HEADER);
        prompt.push('\n');
        for turn in span {
            prompt.push_str(&format!("{}: {}\n", turn.role, one_line(&turn.content)));
        }

        vec![
            ChatMessage::system(SUMMARIZER_INSTRUCTIONS),
            ChatMessage::user(prompt),
        ]
    }

    /// Turn ids a new record stands for.
    ///
    /// A rolling record inherits the coverage of everything it replaces.
    pub fn source_ids(self, span: &[Turn], existing: &[SummaryRecord]) -> Vec<TurnId> {
        let mut ids = Vec::new();
        if self == Self::Cumulative {
            for record in existing {
                ids.extend(record.source_turn_ids.iter().copied());
            }
        }
        ids.extend(span.iter().map(|t| t.id));
        ids
    }

    /// Store `record` and claim `covered` according to the policy
    pub fn apply(
        self,
        history: &mut DialogHistory,
        record: SummaryRecord,
        covered: &[TurnId],
    ) -> Result<(), CompactionError> {
        match self {
            Self::Independent => history.apply_summary(record, covered),
            Self::Cumulative => history.replace_all_summaries_with(record, covered),
        }
    }

    /// Summaries that belong in the context window.
    ///
    /// A cumulative store normally holds one record. When it still holds
    /// several (a consolidation failed) all of them are shown so no coverage
    /// drops out of the window.
    pub fn select_summaries(
        self,
        history: &DialogHistory,
        max_summaries: usize,
    ) -> &[SummaryRecord] {
        match self {
            Self::Independent => history.latest_summaries(max_summaries),
            Self::Cumulative => history.summaries(),
        }
    }
}

impl fmt::Display for PolicyKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for PolicyKind {
    type Err = Infallible;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(Self::resolve(s))
    }
}

fn one_line(text: &str) -> String {
    text.split_whitespace().join(" ")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::compaction::ParsedSummary;
    use crate::types::Role;

    fn record(text: &str, facts: &[&str], ids: Vec<TurnId>) -> SummaryRecord {
        SummaryRecord::new(
            ParsedSummary {
                summary_text: text.to_string(),
                facts: facts.iter().map(|f| f.to_string()).collect(),
                open_questions: vec![],
            },
            ids,
            TurnId::new(),
            PolicyKind::Cumulative,
        )
    }

    #[test]
    fn test_resolve() {
        assert_eq!(PolicyKind::resolve("Cumulative"), PolicyKind::Cumulative);
        assert_eq!(PolicyKind::resolve("  CUMULATIVE "), PolicyKind::Cumulative);
        assert_eq!(PolicyKind::resolve("independent"), PolicyKind::Independent);
        assert_eq!(PolicyKind::resolve("rolling"), PolicyKind::Independent);
        assert_eq!("".parse::<PolicyKind>().unwrap(), PolicyKind::Independent);
    }

    #[test]
    fn test_serde_lowercase() {
        let json = serde_json::to_string(&PolicyKind::Cumulative).unwrap();
        assert_eq!(json, "\"cumulative\"");
    }

    #[test]
    fn test_prompt_contents() {
        let mut history = DialogHistory::new();
        history.append_user_turn("Book a table\nfor two");
        history.append_assistant_turn("Done.", None);
        let span = history.raw_turns().to_vec();
        let existing = vec![record("Earlier: user is vegetarian.", &["No meat"], vec![])];

        let independent = PolicyKind::Independent.build_prompt(&span, &existing);
        assert_eq!(independent.len(), 2);
        assert_eq!(independent[0].role, Role::System);
        assert!(!independent[1].content.contains(PRIOR_SUMMARY_HEADER));
        assert!(independent[1].content.contains("user: Book a table for two"));

        let cumulative = PolicyKind::Cumulative.build_prompt(&span, &existing);
        let body = &cumulative[1].content;
        assert!(body.contains(PRIOR_SUMMARY_HEADER));
        assert!(body.contains("fact: No meat"));
        assert!(body.find(PRIOR_SUMMARY_HEADER) < body.find(TRANSCRIPT_HEADER));
    }

    #[test]
    fn test_cumulative_source_ids_inherit() {
        let mut history = DialogHistory::new();
        history.append_user_turn("a");
        history.append_user_turn("b");
        let turns = history.raw_turns().to_vec();
        let existing = vec![record("a", &[], vec![turns[0].id])];

        let ids = PolicyKind::Cumulative.source_ids(&turns[1..], &existing);
        assert_eq!(ids, vec![turns[0].id, turns[1].id]);

        let ids = PolicyKind::Independent.source_ids(&turns[1..], &existing);
        assert_eq!(ids, vec![turns[1].id]);
    }
}
