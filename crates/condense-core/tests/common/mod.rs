//! Test doubles shared by the integration suites

#![allow(dead_code)]

use anyhow::{anyhow, Result};
use async_trait::async_trait;
use condense_core::{
    ChatMessage, Completion, CompletionModel, CompletionOptions, EngineConfig, ExtractiveModel,
    Session,
};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;

/// Wraps [`ExtractiveModel`] and can be told to fail either kind of call
#[derive(Default)]
pub struct FlakyModel {
    inner: ExtractiveModel,
    pub fail_summaries: AtomicBool,
    pub fail_replies: AtomicBool,
    pub summary_calls: AtomicUsize,
    pub reply_calls: AtomicUsize,
}

impl FlakyModel {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn set_fail_summaries(&self, fail: bool) {
        self.fail_summaries.store(fail, Ordering::SeqCst);
    }

    pub fn set_fail_replies(&self, fail: bool) {
        self.fail_replies.store(fail, Ordering::SeqCst);
    }

    pub fn summary_calls(&self) -> usize {
        self.summary_calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl CompletionModel for FlakyModel {
    fn name(&self) -> &str {
        "flaky"
    }

    async fn complete(
        &self,
        messages: &[ChatMessage],
        options: &CompletionOptions,
    ) -> Result<Completion> {
        if options.json_mode {
            self.summary_calls.fetch_add(1, Ordering::SeqCst);
            if self.fail_summaries.load(Ordering::SeqCst) {
                return Err(anyhow!("summarizer unavailable"));
            }
        } else {
            self.reply_calls.fetch_add(1, Ordering::SeqCst);
            if self.fail_replies.load(Ordering::SeqCst) {
                return Err(anyhow!("reply model unavailable"));
            }
        }
        self.inner.complete(messages, options).await
    }
}

/// Always answers summarization requests with text that is not JSON
pub struct GarbageSummarizer;

#[async_trait]
impl CompletionModel for GarbageSummarizer {
    fn name(&self) -> &str {
        "garbage"
    }

    async fn complete(
        &self,
        _messages: &[ChatMessage],
        options: &CompletionOptions,
    ) -> Result<Completion> {
        let text = if options.json_mode {
            "I could not summarize that, sorry."
        } else {
            "Sure."
        };
        Ok(Completion {
            text: text.to_string(),
            usage: None,
        })
    }
}

pub fn config(interval: usize, raw_history_limit: usize) -> EngineConfig {
    EngineConfig::default()
        .with_summary_interval(interval)
        .with_raw_history_limit(raw_history_limit)
}

pub fn offline_session(config: EngineConfig) -> Session {
    Session::new(config, Arc::new(ExtractiveModel::new()))
}
