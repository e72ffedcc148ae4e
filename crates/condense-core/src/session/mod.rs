//! Session orchestration
//!
//! A [`Session`] is the single entry point to the engine. It owns one
//! [`DialogHistory`] behind a `tokio::sync::Mutex` that is held for the whole
//! of every public operation, model calls included, so requests against the
//! same session are serialized while different sessions run in parallel.

pub mod registry;

pub use registry::SessionRegistry;

use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::{debug, info};

use crate::compaction::{
    CompactionOutcome, CompactionSchedule, Compactor, JsonSummaryParser, PolicyKind, SummaryParser,
};
use crate::config::EngineConfig;
use crate::context::{ContextAssembler, ContextUsageReport, TokenAccountant, TokenEstimator};
use crate::history::{DialogHistory, SummaryRecord, Turn};
use crate::llm::CompletionModel;
use crate::scenario::{self, ComparisonReport, Scenario, ScenarioRun};
use crate::types::{SessionId, Timestamp};
use crate::{CondenseError, Result};

/// Per-call threshold overrides. Never persisted.
///
/// Values are taken as given by callers: a non-positive interval or a negative
/// summary count falls back to the configured default.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MessageOverrides {
    pub summary_interval: Option<i64>,
    pub max_summaries: Option<i64>,
    pub policy: Option<String>,
}

impl MessageOverrides {
    pub fn with_summary_interval(mut self, interval: i64) -> Self {
        self.summary_interval = Some(interval);
        self
    }

    pub fn with_max_summaries(mut self, max: i64) -> Self {
        self.max_summaries = Some(max);
        self
    }

    pub fn with_policy(mut self, policy: impl Into<String>) -> Self {
        self.policy = Some(policy.into());
        self
    }
}

/// Thresholds in force for one call, after override resolution
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct EffectiveSettings {
    pub summary_interval: usize,
    pub max_summaries_in_context: usize,
    pub raw_history_limit: usize,
    pub policy: PolicyKind,
}

impl EffectiveSettings {
    pub fn resolve(config: &EngineConfig, overrides: &MessageOverrides) -> Self {
        let summary_interval = overrides
            .summary_interval
            .and_then(|v| usize::try_from(v).ok())
            .filter(|&v| v > 0)
            .unwrap_or(config.summary_interval);
        let max_summaries_in_context = overrides
            .max_summaries
            .and_then(|v| usize::try_from(v).ok())
            .unwrap_or(config.max_summaries_in_context);
        let policy = overrides
            .policy
            .as_deref()
            .map(PolicyKind::resolve)
            .unwrap_or(config.default_policy);

        Self {
            summary_interval,
            max_summaries_in_context,
            raw_history_limit: config.raw_history_limit,
            policy,
        }
    }
}

/// Token figures for one reply request
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenUsage {
    /// As reported by the model
    pub prompt: Option<u32>,
    pub completion: Option<u32>,
    pub total: Option<u32>,
    /// Local estimate of the assembled window
    pub estimated_prompt: Option<u32>,
    /// Estimate of the window had nothing been summarized
    pub hypothetical_prompt: Option<u32>,
    pub tokens_saved: Option<u32>,
}

/// Result of [`Session::handle_message`]
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResponseMetrics {
    pub answer: String,
    pub context_used: ContextUsageReport,
    pub token_usage: TokenUsage,
    pub summaries: Vec<SummaryRecord>,
    pub raw_turn_count: usize,
    pub effective_interval: usize,
    pub settings: EffectiveSettings,
    pub compaction: CompactionOutcome,
}

/// Result of [`Session::get_state`]
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionSnapshot {
    pub session_id: SessionId,
    pub created_at: Timestamp,
    pub turns: Vec<Turn>,
    pub summaries: Vec<SummaryRecord>,
}

/// One conversation and its compaction state
pub struct Session {
    id: SessionId,
    config: EngineConfig,
    model: Arc<dyn CompletionModel>,
    parser: Arc<dyn SummaryParser>,
    accountant: TokenAccountant,
    created_at: Timestamp,
    history: Mutex<DialogHistory>,
}

impl Session {
    pub fn new(config: EngineConfig, model: Arc<dyn CompletionModel>) -> Self {
        let accountant = TokenAccountant::default().with_model_hint(config.reply.model.clone());
        let session = Self {
            id: SessionId::new(),
            config,
            model,
            parser: Arc::new(JsonSummaryParser),
            accountant,
            created_at: chrono::Utc::now(),
            history: Mutex::new(DialogHistory::new()),
        };
        info!(session = %session.id, model = session.model.name(), "Session created");
        session
    }

    pub fn with_id(mut self, id: SessionId) -> Self {
        self.id = id;
        self
    }

    pub fn with_parser(mut self, parser: Arc<dyn SummaryParser>) -> Self {
        self.parser = parser;
        self
    }

    pub fn with_estimator(mut self, estimator: Arc<dyn TokenEstimator>) -> Self {
        self.accountant =
            TokenAccountant::new(estimator).with_model_hint(self.config.reply.model.clone());
        self
    }

    pub fn id(&self) -> &SessionId {
        &self.id
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// Record a user message, compact as needed and produce a reply
    pub async fn handle_message(
        &self,
        text: &str,
        overrides: &MessageOverrides,
    ) -> Result<ResponseMetrics> {
        if text.trim().is_empty() {
            return Err(CondenseError::EmptyMessage);
        }
        let settings = EffectiveSettings::resolve(&self.config, overrides);

        let mut history = self.history.lock().await;
        let anchor = history.append_user_turn(text).id;

        let schedule =
            CompactionSchedule::enabled(settings.summary_interval, settings.raw_history_limit);
        let compaction = self
            .compactor()
            .settle(&mut history, &schedule, settings.policy, anchor)
            .await;

        let window = self.assembler(settings.raw_history_limit).build_context(
            &history,
            settings.max_summaries_in_context,
            settings.policy,
        );
        let estimated_prompt = self.accountant.estimate(&window.messages);
        let hypothetical_prompt = self
            .accountant
            .hypothetical_prompt(&self.config.system_prompt, &history);

        let completion = self
            .model
            .complete(&window.messages, &self.config.reply.to_options())
            .await
            .map_err(CondenseError::Completion)?;
        history.append_assistant_turn(completion.text.clone(), None);

        let usage = completion.usage;
        let prompt = usage.map(|u| u.prompt_tokens);
        let token_usage = TokenUsage {
            prompt,
            completion: usage.map(|u| u.completion_tokens),
            total: usage.map(|u| u.total_tokens),
            estimated_prompt,
            hypothetical_prompt,
            tokens_saved: TokenAccountant::tokens_saved(
                prompt.or(estimated_prompt),
                hypothetical_prompt,
            ),
        };

        debug!(
            session = %self.id,
            passes = compaction.passes.len(),
            raw_turns = history.raw_count(),
            tokens_saved = ?token_usage.tokens_saved,
            "Message handled"
        );

        Ok(ResponseMetrics {
            answer: completion.text,
            context_used: window.report,
            token_usage,
            summaries: history.summaries().to_vec(),
            raw_turn_count: history.raw_count(),
            effective_interval: settings.summary_interval,
            settings,
            compaction,
        })
    }

    /// Drop all turns and summaries
    pub async fn reset(&self) {
        self.history.lock().await.clear();
        info!(session = %self.id, "Session reset");
    }

    pub async fn get_state(&self) -> SessionSnapshot {
        let history = self.history.lock().await;
        SessionSnapshot {
            session_id: self.id.clone(),
            created_at: self.created_at,
            turns: history.raw_turns().to_vec(),
            summaries: history.summaries().to_vec(),
        }
    }

    /// Replay a built-in scenario without and then with compaction.
    ///
    /// The session is reset first and ends up holding the state of the run
    /// with compaction enabled. An unknown id is rejected before anything
    /// changes.
    pub async fn run_comparison_scenario(&self, scenario_id: &str) -> Result<ComparisonReport> {
        let scenario = scenario::find(scenario_id)
            .ok_or_else(|| CondenseError::UnknownScenario(scenario_id.to_string()))?;

        let mut history = self.history.lock().await;
        history.clear();
        info!(session = %self.id, scenario = scenario.id, "Running comparison scenario");

        let mut scratch = DialogHistory::new();
        let without = self
            .replay(&mut scratch, scenario, CompactionSchedule::disabled(usize::MAX), 0)
            .await;

        let schedule =
            CompactionSchedule::enabled(scenario.summary_interval, scenario.raw_history_limit);
        let with = self
            .replay(&mut history, scenario, schedule, scenario.max_summaries)
            .await;

        let report = ComparisonReport::new(scenario, with, without);
        info!(
            session = %self.id,
            scenario = scenario.id,
            tokens_saved = report.tokens_saved,
            summaries = report.summaries_generated,
            "Comparison finished"
        );
        Ok(report)
    }

    async fn replay(
        &self,
        history: &mut DialogHistory,
        scenario: &Scenario,
        schedule: CompactionSchedule,
        max_summaries: usize,
    ) -> ScenarioRun {
        let compactor = self.compactor();
        let assembler = self.assembler(schedule.raw_history_limit);
        let mut run = ScenarioRun::new(schedule.is_enabled());

        for (user, assistant) in scenario.exchanges {
            let anchor = history.append_user_turn(*user).id;
            let outcome = compactor
                .settle(history, &schedule, scenario.policy, anchor)
                .await;
            run.summaries_generated += outcome.passes.len();
            if outcome.failure.is_some() {
                run.failed_passes += 1;
            }

            let window = assembler.build_context(history, max_summaries, scenario.policy);
            // The window always holds the user turn just appended, so an
            // estimate exists; an unknown one is recorded as unknown.
            run.record_turn(self.accountant.estimate(&window.messages));
            history.append_assistant_turn(*assistant, None);
        }

        run
    }

    fn compactor(&self) -> Compactor {
        Compactor::new(
            Arc::clone(&self.model),
            Arc::clone(&self.parser),
            self.accountant.clone(),
            self.config.summarizer.to_options(),
        )
    }

    fn assembler(&self, raw_history_limit: usize) -> ContextAssembler {
        ContextAssembler::new(raw_history_limit, self.config.preview_chars)
            .with_system_prompt(self.config.system_prompt.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::llm::{ChatMessage, ExtractiveModel};

    fn session() -> Session {
        Session::new(
            EngineConfig::default().with_summary_interval(3),
            Arc::new(ExtractiveModel::new()),
        )
    }

    #[test]
    fn test_override_resolution() {
        let config = EngineConfig::default()
            .with_summary_interval(4)
            .with_max_summaries(2);

        let settings = EffectiveSettings::resolve(&config, &MessageOverrides::default());
        assert_eq!(settings.summary_interval, 4);
        assert_eq!(settings.max_summaries_in_context, 2);
        assert_eq!(settings.policy, PolicyKind::Independent);

        let overrides = MessageOverrides::default()
            .with_summary_interval(0)
            .with_max_summaries(-1)
            .with_policy("CUMULATIVE");
        let settings = EffectiveSettings::resolve(&config, &overrides);
        assert_eq!(settings.summary_interval, 4);
        assert_eq!(settings.max_summaries_in_context, 2);
        assert_eq!(settings.policy, PolicyKind::Cumulative);

        let overrides = MessageOverrides::default()
            .with_summary_interval(7)
            .with_max_summaries(0)
            .with_policy("something else");
        let settings = EffectiveSettings::resolve(&config, &overrides);
        assert_eq!(settings.summary_interval, 7);
        assert_eq!(settings.max_summaries_in_context, 0);
        assert_eq!(settings.policy, PolicyKind::Independent);
    }

    #[tokio::test]
    async fn test_blank_message_rejected() {
        let session = session();
        let err = session
            .handle_message("   \n", &MessageOverrides::default())
            .await
            .unwrap_err();
        assert!(matches!(err, CondenseError::EmptyMessage));
        assert!(session.get_state().await.turns.is_empty());
    }

    #[tokio::test]
    async fn test_handle_message_records_turns() {
        let session = session();
        let metrics = session
            .handle_message("Hello there. Can you help?", &MessageOverrides::default())
            .await
            .unwrap();

        assert_eq!(metrics.answer, "Noted: Hello there.");
        assert_eq!(metrics.raw_turn_count, 2);
        assert_eq!(metrics.effective_interval, 3);
        assert!(metrics.summaries.is_empty());
        assert_eq!(metrics.token_usage.hypothetical_prompt, None);
        assert_eq!(metrics.token_usage.tokens_saved, None);
        assert!(metrics.token_usage.prompt.is_some());
    }

    struct FlatEstimator;

    impl TokenEstimator for FlatEstimator {
        fn estimate(&self, messages: &[ChatMessage], _model_hint: Option<&str>) -> usize {
            messages.len() * 100
        }
    }

    #[tokio::test]
    async fn test_custom_estimator() {
        let session = session().with_estimator(Arc::new(FlatEstimator));
        let metrics = session
            .handle_message("How big is this prompt?", &MessageOverrides::default())
            .await
            .unwrap();

        // System prompt and the user turn
        assert_eq!(metrics.token_usage.estimated_prompt, Some(200));
        let state = session.get_state().await;
        assert!(state.created_at <= state.turns[0].created_at);
    }

    #[tokio::test]
    async fn test_unknown_scenario_keeps_state() {
        let session = session();
        session
            .handle_message("Keep me", &MessageOverrides::default())
            .await
            .unwrap();

        let err = session.run_comparison_scenario("nope").await.unwrap_err();
        assert!(matches!(err, CondenseError::UnknownScenario(_)));
        assert_eq!(session.get_state().await.turns.len(), 2);
    }
}
