//! Token Accountant
//!
//! Token estimates and the savings derived from them. Estimates are always
//! `Option`: an empty message set has no estimate, and a missing input never
//! turns into a zero.

use std::sync::Arc;

use crate::history::DialogHistory;
use crate::llm::ChatMessage;

/// Estimates prompt size for a message set
pub trait TokenEstimator: Send + Sync {
    fn estimate(&self, messages: &[ChatMessage], model_hint: Option<&str>) -> usize;
}

/// Character-count heuristic (~4 chars per token) plus a fixed per-message overhead
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HeuristicEstimator {
    pub chars_per_token: usize,
    pub per_message_overhead: usize,
}

impl Default for HeuristicEstimator {
    fn default() -> Self {
        Self {
            chars_per_token: 4,
            per_message_overhead: 4,
        }
    }
}

impl TokenEstimator for HeuristicEstimator {
    fn estimate(&self, messages: &[ChatMessage], _model_hint: Option<&str>) -> usize {
        let per_token = self.chars_per_token.max(1);
        messages
            .iter()
            .map(|m| m.content.chars().count().div_ceil(per_token) + self.per_message_overhead)
            .sum()
    }
}

#[derive(Clone)]
pub struct TokenAccountant {
    estimator: Arc<dyn TokenEstimator>,
    model_hint: Option<String>,
}

impl Default for TokenAccountant {
    fn default() -> Self {
        Self::new(Arc::new(HeuristicEstimator::default()))
    }
}

impl TokenAccountant {
    pub fn new(estimator: Arc<dyn TokenEstimator>) -> Self {
        Self {
            estimator,
            model_hint: None,
        }
    }

    pub fn with_model_hint(mut self, hint: Option<String>) -> Self {
        self.model_hint = hint;
        self
    }

    /// `None` for an empty message set
    pub fn estimate(&self, messages: &[ChatMessage]) -> Option<u32> {
        if messages.is_empty() {
            return None;
        }
        let tokens = self.estimator.estimate(messages, self.model_hint.as_deref());
        Some(u32::try_from(tokens).unwrap_or(u32::MAX))
    }

    /// `max(0, hypothetical - prompt)` when both are known
    pub fn tokens_saved(prompt: Option<u32>, hypothetical: Option<u32>) -> Option<u32> {
        Some(hypothetical?.saturating_sub(prompt?))
    }

    /// Prompt size the call would have had with every raw turn and no
    /// summaries. Only computed once at least one summary exists.
    pub fn hypothetical_prompt(&self, system_prompt: &str, history: &DialogHistory) -> Option<u32> {
        if history.summaries().is_empty() {
            return None;
        }
        let mut messages = Vec::with_capacity(history.raw_count() + 1);
        if !system_prompt.is_empty() {
            messages.push(ChatMessage::system(system_prompt));
        }
        messages.extend(
            history
                .raw_turns()
                .iter()
                .map(|t| ChatMessage::new(t.role, t.content.clone())),
        );
        self.estimate(&messages)
    }
}
