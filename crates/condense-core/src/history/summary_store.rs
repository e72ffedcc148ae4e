//! Summary Store - ordered summary records

use chrono::Utc;
use serde::{Deserialize, Serialize};

use crate::compaction::{ParsedSummary, PolicyKind};
use crate::context::TokenAccountant;
use crate::types::{SummaryId, Timestamp, TurnId};

/// A compressed replacement for a span of turns
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SummaryRecord {
    pub id: SummaryId,
    pub created_at: Timestamp,
    pub summary_text: String,
    pub facts: Vec<String>,
    pub open_questions: Vec<String>,
    /// Turns this record replaces, in creation order
    pub source_turn_ids: Vec<TurnId>,
    /// The turn whose arrival triggered the compaction
    pub anchor_turn_id: TurnId,
    pub policy: PolicyKind,
    pub raw_token_count: Option<u32>,
    pub summary_token_count: Option<u32>,
    pub tokens_saved: Option<u32>,
}

impl SummaryRecord {
    pub fn new(
        parsed: ParsedSummary,
        source_turn_ids: Vec<TurnId>,
        anchor_turn_id: TurnId,
        policy: PolicyKind,
    ) -> Self {
        Self {
            id: SummaryId::new(),
            created_at: Utc::now(),
            summary_text: parsed.summary_text,
            facts: parsed.facts,
            open_questions: parsed.open_questions,
            source_turn_ids,
            anchor_turn_id,
            policy,
            raw_token_count: None,
            summary_token_count: None,
            tokens_saved: None,
        }
    }

    /// Attach token accounting; `tokens_saved` is derived and never negative
    pub fn with_token_counts(mut self, raw: Option<u32>, summary: Option<u32>) -> Self {
        self.raw_token_count = raw;
        self.summary_token_count = summary;
        self.tokens_saved = TokenAccountant::tokens_saved(summary, raw);
        self
    }

    pub fn covers(&self, id: TurnId) -> bool {
        self.source_turn_ids.contains(&id)
    }
}

/// Ordered summary storage
#[derive(Debug, Default, Clone)]
pub struct SummaryStore {
    records: Vec<SummaryRecord>,
}

impl SummaryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn records(&self) -> &[SummaryRecord] {
        &self.records
    }

    /// The `n` most recent records, oldest first
    pub fn latest(&self, n: usize) -> &[SummaryRecord] {
        let start = self.records.len().saturating_sub(n);
        &self.records[start..]
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub(super) fn push(&mut self, record: SummaryRecord) {
        self.records.push(record);
    }

    pub(super) fn replace_all(&mut self, record: SummaryRecord) {
        self.records.clear();
        self.records.push(record);
    }

    pub fn clear(&mut self) {
        self.records.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(text: &str) -> SummaryRecord {
        SummaryRecord::new(
            ParsedSummary {
                summary_text: text.to_string(),
                facts: vec![],
                open_questions: vec![],
            },
            vec![TurnId::new()],
            TurnId::new(),
            PolicyKind::Independent,
        )
    }

    #[test]
    fn test_token_counts_clamp() {
        let r = record("a").with_token_counts(Some(40), Some(90));
        assert_eq!(r.tokens_saved, Some(0));

        let r = record("a").with_token_counts(Some(90), Some(40));
        assert_eq!(r.tokens_saved, Some(50));

        let r = record("a").with_token_counts(None, Some(40));
        assert_eq!(r.tokens_saved, None);
    }

    #[test]
    fn test_latest() {
        let mut store = SummaryStore::new();
        for text in ["one", "two", "three"] {
            store.push(record(text));
        }

        let latest: Vec<&str> = store
            .latest(2)
            .iter()
            .map(|r| r.summary_text.as_str())
            .collect();
        assert_eq!(latest, vec!["two", "three"]);
        assert_eq!(store.latest(10).len(), 3);
        assert!(store.latest(0).is_empty());
    }

    #[test]
    fn test_replace_all() {
        let mut store = SummaryStore::new();
        store.push(record("one"));
        store.push(record("two"));
        store.replace_all(record("rolling"));

        assert_eq!(store.len(), 1);
        assert_eq!(store.records()[0].summary_text, "rolling");
    }
}
