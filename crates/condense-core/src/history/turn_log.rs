//! Turn Log - append-only, time-ordered raw turns

use chrono::Utc;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

use crate::error::CompactionError;
use crate::types::{Role, Timestamp, TurnId};

/// One raw conversation turn.
///
/// Everything except the `summarized` flag is fixed at creation. The flag can
/// only be raised, through [`super::DialogHistory`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Turn {
    pub id: TurnId,
    pub role: Role,
    pub content: String,
    pub created_at: Timestamp,
    summarized: bool,
}

impl Turn {
    fn new(role: Role, content: String, created_at: Timestamp) -> Self {
        Self {
            id: TurnId::new(),
            role,
            content,
            created_at,
            summarized: false,
        }
    }

    /// Whether this turn has been folded into a summary
    pub fn is_summarized(&self) -> bool {
        self.summarized
    }

    pub fn is_user(&self) -> bool {
        self.role == Role::User
    }
}

/// Append-only turn storage
#[derive(Debug, Default, Clone)]
pub struct TurnLog {
    turns: Vec<Turn>,
    index: HashMap<TurnId, usize>,
}

impl TurnLog {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a turn. Timestamps never go backwards: an `at` earlier than the
    /// newest turn is clamped to it.
    pub fn append(
        &mut self,
        role: Role,
        content: impl Into<String>,
        at: Option<Timestamp>,
    ) -> Turn {
        let mut created_at = at.unwrap_or_else(Utc::now);
        if let Some(last) = self.turns.last() {
            created_at = created_at.max(last.created_at);
        }

        let turn = Turn::new(role, content.into(), created_at);
        self.index.insert(turn.id, self.turns.len());
        self.turns.push(turn.clone());
        turn
    }

    pub fn turns(&self) -> &[Turn] {
        &self.turns
    }

    pub fn len(&self) -> usize {
        self.turns.len()
    }

    pub fn is_empty(&self) -> bool {
        self.turns.is_empty()
    }

    pub fn get(&self, id: TurnId) -> Option<&Turn> {
        self.index.get(&id).map(|&i| &self.turns[i])
    }

    pub fn position(&self, id: TurnId) -> Option<usize> {
        self.index.get(&id).copied()
    }

    /// Turns of any role not yet folded into a summary
    pub fn unsummarized_count(&self) -> usize {
        self.turns.iter().filter(|t| !t.summarized).count()
    }

    pub fn unsummarized_user_count(&self) -> usize {
        self.turns
            .iter()
            .filter(|t| t.is_user() && !t.summarized)
            .count()
    }

    /// Earliest contiguous span of un-summarized turns, bounded by `anchor`,
    /// holding exactly `interval` user turns plus the replies that follow the
    /// last of them (still bounded by `anchor`).
    ///
    /// Empty when fewer than `interval` un-summarized user turns precede or
    /// equal the anchor, when the anchor is unknown, or when `interval` is zero.
    pub fn take_span_for_compaction(&self, anchor: TurnId, interval: usize) -> Vec<Turn> {
        if interval == 0 {
            return Vec::new();
        }
        let Some(end) = self.position(anchor) else {
            return Vec::new();
        };
        let Some(start) = self.turns[..=end].iter().position(|t| !t.summarized) else {
            return Vec::new();
        };

        let mut users = 0;
        let mut cut = None;
        for (offset, turn) in self.turns[start..=end].iter().enumerate() {
            if turn.summarized {
                break;
            }
            if turn.is_user() {
                users += 1;
                if users == interval {
                    cut = Some(start + offset);
                    break;
                }
            }
        }

        let Some(mut last) = cut else {
            return Vec::new();
        };
        while last < end {
            let next = &self.turns[last + 1];
            if next.summarized || next.is_user() {
                break;
            }
            last += 1;
        }

        self.turns[start..=last].to_vec()
    }

    /// Un-summarized turns older than the most recent `keep_recent` turns,
    /// as one contiguous run starting at the oldest of them.
    pub fn surplus_span(&self, keep_recent: usize) -> Vec<Turn> {
        let region_end = self.turns.len().saturating_sub(keep_recent);
        let region = &self.turns[..region_end];

        let Some(start) = region.iter().position(|t| !t.summarized) else {
            return Vec::new();
        };
        region[start..]
            .iter()
            .take_while(|t| !t.summarized)
            .cloned()
            .collect()
    }

    /// Ensure every id exists and is still un-summarized
    pub(super) fn check_claimable(&self, ids: &[TurnId]) -> Result<(), CompactionError> {
        for id in ids {
            match self.get(*id) {
                Some(turn) if !turn.summarized => {}
                _ => return Err(CompactionError::StaleSpan(*id)),
            }
        }
        Ok(())
    }

    /// Raise the flag on every id. Callers check claimability first.
    pub(super) fn mark_summarized(&mut self, ids: &[TurnId]) {
        for id in ids {
            if let Some(&i) = self.index.get(id) {
                self.turns[i].summarized = true;
            }
        }
    }

    pub fn clear(&mut self) {
        self.turns.clear();
        self.index.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    fn conversation(exchanges: usize) -> TurnLog {
        let mut log = TurnLog::new();
        for i in 1..=exchanges {
            log.append(Role::User, format!("question {i}"), None);
            log.append(Role::Assistant, format!("answer {i}"), None);
        }
        log
    }

    #[test]
    fn test_append_is_monotonic() {
        let mut log = TurnLog::new();
        let first = log.append(Role::User, "hello", None);
        let earlier = first.created_at - Duration::minutes(5);
        let second = log.append(Role::Assistant, "hi", Some(earlier));

        assert_eq!(second.created_at, first.created_at);
        assert_eq!(log.position(second.id), Some(1));
        assert!(!second.is_summarized());
    }

    #[test]
    fn test_span_requires_interval_users() {
        let log = conversation(2);
        let anchor = log.turns()[3].id;
        assert!(log.take_span_for_compaction(anchor, 3).is_empty());
        assert!(log.take_span_for_compaction(anchor, 0).is_empty());
    }

    #[test]
    fn test_span_includes_trailing_replies() {
        let log = conversation(3);
        let anchor = log.turns()[5].id;
        let span = log.take_span_for_compaction(anchor, 2);

        let contents: Vec<&str> = span.iter().map(|t| t.content.as_str()).collect();
        assert_eq!(
            contents,
            vec!["question 1", "answer 1", "question 2", "answer 2"]
        );
    }

    #[test]
    fn test_span_skips_claimed_turns() {
        let mut log = conversation(3);
        let claimed: Vec<TurnId> = log.turns()[..2].iter().map(|t| t.id).collect();
        log.check_claimable(&claimed).unwrap();
        log.mark_summarized(&claimed);

        let anchor = log.turns()[5].id;
        let span = log.take_span_for_compaction(anchor, 2);
        assert_eq!(span.first().unwrap().content, "question 2");
        assert!(span.iter().all(|t| !t.is_summarized()));
        assert!(matches!(
            log.check_claimable(&claimed),
            Err(CompactionError::StaleSpan(_))
        ));
    }

    #[test]
    fn test_surplus_span() {
        let log = conversation(5);
        let surplus = log.surplus_span(4);
        assert_eq!(surplus.len(), 6);
        assert_eq!(surplus[0].content, "question 1");
        assert!(log.surplus_span(10).is_empty());
    }

    #[test]
    fn test_clear() {
        let mut log = conversation(2);
        let id = log.turns()[0].id;
        log.clear();
        assert!(log.is_empty());
        assert!(log.get(id).is_none());
    }
}
