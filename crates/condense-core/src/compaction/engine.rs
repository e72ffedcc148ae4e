//! # Compaction Engine
//!
//! Runs compaction passes against a [`DialogHistory`].
//!
//! A pass reads the span and the existing summaries, awaits the summarizer,
//! parses its output and only then touches the history, in one synchronous
//! step. A pass that fails anywhere before that step leaves the history as it
//! was.
//!
//! Under the cumulative policy a store holding several records (left behind by
//! earlier independent calls) is folded into one rolling record at the end of
//! the loop, even when the trigger asked for nothing.

use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{debug, info, warn};

use crate::compaction::parser::{ParsedSummary, SummaryParser};
use crate::compaction::policy::PolicyKind;
use crate::compaction::trigger::{
    CompactionPlan, CompactionSchedule, CompactionTrigger, TriggerReason,
};
use crate::context::{render_summary, TokenAccountant};
use crate::error::CompactionError;
use crate::history::{DialogHistory, SummaryRecord};
use crate::llm::{ChatMessage, CompletionModel, CompletionOptions};
use crate::types::{SummaryId, TurnId};

/// One applied pass
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CompactionPass {
    pub reason: TriggerReason,
    pub summary_id: SummaryId,
    pub covered_turns: usize,
}

/// Everything the trigger loop did for one incoming turn
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CompactionOutcome {
    pub passes: Vec<CompactionPass>,
    /// Message of the failure that ended the loop, if any
    pub failure: Option<String>,
}

impl CompactionOutcome {
    pub fn compacted(&self) -> bool {
        !self.passes.is_empty()
    }
}

/// Summarizes spans through a [`CompletionModel`]
pub struct Compactor {
    model: Arc<dyn CompletionModel>,
    parser: Arc<dyn SummaryParser>,
    accountant: TokenAccountant,
    options: CompletionOptions,
}

impl Compactor {
    pub fn new(
        model: Arc<dyn CompletionModel>,
        parser: Arc<dyn SummaryParser>,
        accountant: TokenAccountant,
        options: CompletionOptions,
    ) -> Self {
        Self {
            model,
            parser,
            accountant,
            options,
        }
    }

    /// Run one pass for `plan` under `policy`
    pub async fn compact(
        &self,
        history: &mut DialogHistory,
        plan: &CompactionPlan,
        policy: PolicyKind,
    ) -> Result<SummaryRecord, CompactionError> {
        if plan.span.is_empty() {
            return Err(CompactionError::EmptySpan);
        }

        let prompt = policy.build_prompt(&plan.span, history.summaries());
        debug!(
            model = self.model.name(),
            span_len = plan.span.len(),
            reason = %plan.reason,
            "Requesting summary"
        );
        let (parsed, summary_tokens) = self.summarize(&prompt).await?;

        let replaced = self.replaced_messages(history, plan, policy);
        let raw_tokens = self.accountant.estimate(&replaced);

        let covered: Vec<TurnId> = plan.span_ids();
        let record = SummaryRecord::new(
            parsed,
            policy.source_ids(&plan.span, history.summaries()),
            plan.anchor,
            policy,
        )
        .with_token_counts(raw_tokens, summary_tokens);

        policy.apply(history, record.clone(), &covered)?;

        info!(
            summary = %record.id,
            %policy,
            reason = %plan.reason,
            covered = covered.len(),
            tokens_saved = ?record.tokens_saved,
            "Compaction pass applied"
        );
        Ok(record)
    }

    /// Fold every stored record into one rolling record. Claims no turns.
    pub async fn consolidate(
        &self,
        history: &mut DialogHistory,
        anchor: TurnId,
    ) -> Result<SummaryRecord, CompactionError> {
        let policy = PolicyKind::Cumulative;
        let existing = history.summaries();
        let prompt = policy.build_prompt(&[], existing);
        debug!(records = existing.len(), "Requesting consolidated summary");
        let (parsed, summary_tokens) = self.summarize(&prompt).await?;

        let replaced: Vec<ChatMessage> = history.summaries().iter().map(render_summary).collect();
        let raw_tokens = self.accountant.estimate(&replaced);
        let record = SummaryRecord::new(
            parsed,
            policy.source_ids(&[], history.summaries()),
            anchor,
            policy,
        )
        .with_token_counts(raw_tokens, summary_tokens);

        let folded = replaced.len();
        history.consolidate_summaries(record.clone());
        info!(summary = %record.id, folded, "Summaries consolidated");
        Ok(record)
    }

    /// Apply passes until the trigger has nothing left to ask for.
    ///
    /// A failed pass is logged and ends the loop; earlier passes stay applied.
    pub async fn settle(
        &self,
        history: &mut DialogHistory,
        schedule: &CompactionSchedule,
        policy: PolicyKind,
        anchor: TurnId,
    ) -> CompactionOutcome {
        let mut outcome = CompactionOutcome::default();

        while let Some(plan) = CompactionTrigger::evaluate(schedule, history, anchor) {
            match self.compact(history, &plan, policy).await {
                Ok(record) => outcome.passes.push(CompactionPass {
                    reason: plan.reason,
                    summary_id: record.id,
                    covered_turns: plan.span.len(),
                }),
                Err(e) => {
                    warn!(
                        error = %e,
                        reason = %plan.reason,
                        span_len = plan.span.len(),
                        "Compaction pass failed, keeping raw turns until the next eligible turn"
                    );
                    outcome.failure = Some(e.to_string());
                    return outcome;
                }
            }
        }

        let mixed_store = history.summaries().len() > 1;
        if schedule.is_enabled() && policy == PolicyKind::Cumulative && mixed_store {
            match self.consolidate(history, anchor).await {
                Ok(record) => outcome.passes.push(CompactionPass {
                    reason: TriggerReason::Consolidation,
                    summary_id: record.id,
                    covered_turns: 0,
                }),
                Err(e) => {
                    warn!(error = %e, "Consolidation failed, keeping separate summaries");
                    outcome.failure = Some(e.to_string());
                }
            }
        }

        outcome
    }

    /// Ask the summarizer and parse its answer
    async fn summarize(
        &self,
        prompt: &[ChatMessage],
    ) -> Result<(ParsedSummary, Option<u32>), CompactionError> {
        let completion = self
            .model
            .complete(prompt, &self.options)
            .await
            .map_err(CompactionError::Completion)?;
        let parsed = self.parser.parse(&completion.text)?;
        Ok((parsed, completion.usage.map(|u| u.completion_tokens)))
    }

    /// Messages a new record stands in for: the span, plus the records a
    /// rolling summary replaces
    fn replaced_messages(
        &self,
        history: &DialogHistory,
        plan: &CompactionPlan,
        policy: PolicyKind,
    ) -> Vec<ChatMessage> {
        let mut messages = Vec::new();
        if policy == PolicyKind::Cumulative {
            messages.extend(history.summaries().iter().map(render_summary));
        }
        messages.extend(
            plan.span
                .iter()
                .map(|t| ChatMessage::new(t.role, t.content.clone())),
        );
        messages
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::compaction::JsonSummaryParser;
    use crate::llm::{Completion, ExtractiveModel};
    use anyhow::anyhow;
    use async_trait::async_trait;

    struct BrokenModel;

    #[async_trait]
    impl CompletionModel for BrokenModel {
        fn name(&self) -> &str {
            "broken"
        }

        async fn complete(
            &self,
            _messages: &[ChatMessage],
            _options: &CompletionOptions,
        ) -> anyhow::Result<Completion> {
            Err(anyhow!("provider unavailable"))
        }
    }

    fn compactor(model: Arc<dyn CompletionModel>) -> Compactor {
        Compactor::new(
            model,
            Arc::new(JsonSummaryParser),
            TokenAccountant::default(),
            CompletionOptions {
                json_mode: true,
                ..Default::default()
            },
        )
    }

    fn history(exchanges: usize) -> (DialogHistory, TurnId) {
        let mut history = DialogHistory::new();
        let mut anchor = TurnId::new();
        for i in 0..exchanges {
            anchor = history
                .append_user_turn(format!("I need help with order {i}. Where is it?"))
                .id;
            history.append_assistant_turn(format!("Order {i} has shipped."), None);
        }
        (history, anchor)
    }

    #[tokio::test]
    async fn test_settle_applies_interval_pass() {
        let compactor = compactor(Arc::new(ExtractiveModel::new()));
        let (mut history, anchor) = history(3);
        let schedule = CompactionSchedule::enabled(3, 8);

        let outcome = compactor
            .settle(&mut history, &schedule, PolicyKind::Independent, anchor)
            .await;

        assert_eq!(outcome.passes.len(), 1);
        assert_eq!(outcome.passes[0].reason, TriggerReason::Interval);
        assert!(outcome.failure.is_none());
        assert_eq!(history.summaries().len(), 1);
        assert_eq!(history.unsummarized_user_count(), 0);

        let record = &history.summaries()[0];
        assert!(record.raw_token_count.is_some());
        assert!(record.summary_token_count.is_some());
    }

    #[tokio::test]
    async fn test_failed_pass_leaves_history_untouched() {
        let compactor = compactor(Arc::new(BrokenModel));
        let (mut history, anchor) = history(3);
        let schedule = CompactionSchedule::enabled(2, 8);

        let outcome = compactor
            .settle(&mut history, &schedule, PolicyKind::Independent, anchor)
            .await;

        assert!(!outcome.compacted());
        assert!(outcome.failure.unwrap().contains("Summarization call failed"));
        assert!(history.summaries().is_empty());
        assert!(history.raw_turns().iter().all(|t| !t.is_summarized()));
    }

    #[tokio::test]
    async fn test_cumulative_call_folds_independent_records() {
        let compactor = compactor(Arc::new(ExtractiveModel::new()));
        let (mut history, anchor) = history(4);
        let schedule = CompactionSchedule::enabled(2, 8);
        compactor
            .settle(&mut history, &schedule, PolicyKind::Independent, anchor)
            .await;
        assert_eq!(history.summaries().len(), 2);
        let covered: Vec<TurnId> = history
            .summaries()
            .iter()
            .flat_map(|r| r.source_turn_ids.iter().copied())
            .collect();

        // Nothing new to compact, but the store is mixed
        let anchor = history.append_user_turn("Any update on order 9?").id;
        let outcome = compactor
            .settle(&mut history, &schedule, PolicyKind::Cumulative, anchor)
            .await;

        assert_eq!(outcome.passes.len(), 1);
        assert_eq!(outcome.passes[0].reason, TriggerReason::Consolidation);
        assert_eq!(outcome.passes[0].covered_turns, 0);
        assert_eq!(history.summaries().len(), 1);
        assert_eq!(history.summaries()[0].source_turn_ids, covered);
        assert_eq!(history.summaries()[0].policy, PolicyKind::Cumulative);
    }

    #[tokio::test]
    async fn test_missing_usage_leaves_counts_empty() {
        let compactor = compactor(Arc::new(ExtractiveModel::without_usage()));
        let (mut history, anchor) = history(2);
        let schedule = CompactionSchedule::enabled(2, 8);

        compactor
            .settle(&mut history, &schedule, PolicyKind::Cumulative, anchor)
            .await;

        let record = &history.summaries()[0];
        assert_eq!(record.summary_token_count, None);
        assert_eq!(record.tokens_saved, None);
    }
}
