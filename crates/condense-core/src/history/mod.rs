//! Dialog History
//!
//! The per-session aggregate owning the [`TurnLog`] and the [`SummaryStore`].
//! All mutation goes through [`DialogHistory`], which keeps the two in step:
//! a summary is only stored together with the summarized flag on every turn it
//! claims, and a claim that would touch an already summarized turn is refused
//! before anything changes.

mod summary_store;
mod turn_log;

pub use summary_store::{SummaryRecord, SummaryStore};
pub use turn_log::{Turn, TurnLog};

use crate::error::CompactionError;
use crate::types::{Role, Timestamp, TurnId};

/// Turn Log + Summary Store for one session
#[derive(Debug, Default, Clone)]
pub struct DialogHistory {
    turns: TurnLog,
    summaries: SummaryStore,
}

impl DialogHistory {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn append_user_turn(&mut self, text: impl Into<String>) -> Turn {
        self.turns.append(Role::User, text, None)
    }

    pub fn append_assistant_turn(
        &mut self,
        text: impl Into<String>,
        at: Option<Timestamp>,
    ) -> Turn {
        self.turns.append(Role::Assistant, text, at)
    }

    pub fn append_system_turn(&mut self, text: impl Into<String>) -> Turn {
        self.turns.append(Role::System, text, None)
    }

    /// Raw turns in time order
    pub fn raw_turns(&self) -> &[Turn] {
        self.turns.turns()
    }

    pub fn turn(&self, id: TurnId) -> Option<&Turn> {
        self.turns.get(id)
    }

    pub fn summaries(&self) -> &[SummaryRecord] {
        self.summaries.records()
    }

    pub fn latest_summaries(&self, n: usize) -> &[SummaryRecord] {
        self.summaries.latest(n)
    }

    pub fn raw_count(&self) -> usize {
        self.turns.len()
    }

    /// Raw turns still waiting to be summarized
    pub fn unsummarized_count(&self) -> usize {
        self.turns.unsummarized_count()
    }

    pub fn unsummarized_user_count(&self) -> usize {
        self.turns.unsummarized_user_count()
    }

    /// See [`TurnLog::take_span_for_compaction`]
    pub fn take_span_for_compaction(&self, anchor: TurnId, interval: usize) -> Vec<Turn> {
        self.turns.take_span_for_compaction(anchor, interval)
    }

    /// See [`TurnLog::surplus_span`]
    pub fn surplus_span(&self, keep_recent: usize) -> Vec<Turn> {
        self.turns.surplus_span(keep_recent)
    }

    /// Store an independent record and claim the covered turns
    pub fn apply_summary(
        &mut self,
        record: SummaryRecord,
        covered: &[TurnId],
    ) -> Result<(), CompactionError> {
        self.claim(covered)?;
        self.summaries.push(record);
        Ok(())
    }

    /// Replace every stored record with a rolling one and claim the covered turns
    pub fn replace_all_summaries_with(
        &mut self,
        record: SummaryRecord,
        covered: &[TurnId],
    ) -> Result<(), CompactionError> {
        self.claim(covered)?;
        self.summaries.replace_all(record);
        Ok(())
    }

    /// Fold every stored record into `record`. No turn changes state: the
    /// new record must cover exactly what the replaced ones covered.
    pub fn consolidate_summaries(&mut self, record: SummaryRecord) {
        self.summaries.replace_all(record);
    }

    fn claim(&mut self, covered: &[TurnId]) -> Result<(), CompactionError> {
        if covered.is_empty() {
            return Err(CompactionError::EmptySpan);
        }
        self.turns.check_claimable(covered)?;
        self.turns.mark_summarized(covered);
        Ok(())
    }

    /// Drop all turns and summaries
    pub fn clear(&mut self) {
        self.turns.clear();
        self.summaries.clear();
    }
}
