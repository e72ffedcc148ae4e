//! Engine configuration
//!
//! Defaults for the compaction thresholds and the two model call profiles
//! (conversational reply and summarization). Per-call overrides never write
//! back into this struct.

use serde::{Deserialize, Serialize};
use std::path::Path;

use crate::compaction::PolicyKind;
use crate::llm::CompletionOptions;
use crate::{CondenseError, Result, ResultExt};

/// Default number of un-summarized user turns that triggers compaction
pub const DEFAULT_SUMMARY_INTERVAL: usize = 6;

/// Default number of most recent raw turns kept verbatim in the context window
pub const DEFAULT_RAW_HISTORY_LIMIT: usize = 8;

/// Default number of independent summaries shown in the context window
pub const DEFAULT_MAX_SUMMARIES: usize = 3;

const DEFAULT_SYSTEM_PROMPT: &str =
    "You are a helpful assistant. Earlier parts of this conversation may be provided as summaries.";

/// Main engine configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Un-summarized user turns required before a compaction pass runs
    pub summary_interval: usize,

    /// Most recent raw turns always shown verbatim
    pub raw_history_limit: usize,

    /// Independent summaries included in the context window
    pub max_summaries_in_context: usize,

    /// Policy used when a call does not name one
    pub default_policy: PolicyKind,

    /// System prompt placed before summaries and raw turns
    pub system_prompt: String,

    /// Characters kept in the content preview of the usage report
    pub preview_chars: usize,

    /// Options for the user-facing reply
    pub reply: ModelSettings,

    /// Options for summarization calls
    pub summarizer: ModelSettings,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            summary_interval: DEFAULT_SUMMARY_INTERVAL,
            raw_history_limit: DEFAULT_RAW_HISTORY_LIMIT,
            max_summaries_in_context: DEFAULT_MAX_SUMMARIES,
            default_policy: PolicyKind::Independent,
            system_prompt: DEFAULT_SYSTEM_PROMPT.to_string(),
            preview_chars: 80,
            reply: ModelSettings::reply(),
            summarizer: ModelSettings::summarizer(),
        }
    }
}

impl EngineConfig {
    /// Create a new configuration with default values
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the summary interval
    pub fn with_summary_interval(mut self, interval: usize) -> Self {
        self.summary_interval = interval;
        self
    }

    /// Set the raw history limit
    pub fn with_raw_history_limit(mut self, limit: usize) -> Self {
        self.raw_history_limit = limit;
        self
    }

    /// Set max summaries in context
    pub fn with_max_summaries(mut self, max: usize) -> Self {
        self.max_summaries_in_context = max;
        self
    }

    /// Set the default policy
    pub fn with_policy(mut self, policy: PolicyKind) -> Self {
        self.default_policy = policy;
        self
    }

    /// Set the system prompt
    pub fn with_system_prompt(mut self, prompt: impl Into<String>) -> Self {
        self.system_prompt = prompt.into();
        self
    }

    /// Load configuration from a TOML or JSON file, chosen by extension
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("reading {}", path.display()))?;
        let is_toml = path
            .extension()
            .and_then(|ext| ext.to_str())
            .is_some_and(|ext| ext.eq_ignore_ascii_case("toml"));

        let config: Self = if is_toml {
            toml::from_str::<Self>(&content)
                .with_context(|| format!("parsing {}", path.display()))?
        } else {
            serde_json::from_str::<Self>(&content)
                .with_context(|| format!("parsing {}", path.display()))?
        };
        config
            .validate()
            .with_context(|| format!("validating {}", path.display()))?;
        Ok(config)
    }

    /// Save configuration to a JSON file
    pub fn to_file(&self, path: impl AsRef<Path>) -> Result<()> {
        let path = path.as_ref();
        let content = serde_json::to_string_pretty(self)?;
        std::fs::write(path, content).with_context(|| format!("writing {}", path.display()))?;
        Ok(())
    }

    /// Apply `CONDENSE_*` environment overrides
    pub fn apply_env(self) -> Result<Self> {
        self.apply_vars(|key| std::env::var(key).ok())
    }

    fn apply_vars<F>(mut self, lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(raw) = lookup("CONDENSE_SUMMARY_INTERVAL") {
            self.summary_interval = parse_count("CONDENSE_SUMMARY_INTERVAL", &raw)?;
        }
        if let Some(raw) = lookup("CONDENSE_RAW_HISTORY_LIMIT") {
            self.raw_history_limit = parse_count("CONDENSE_RAW_HISTORY_LIMIT", &raw)?;
        }
        if let Some(raw) = lookup("CONDENSE_MAX_SUMMARIES") {
            self.max_summaries_in_context = parse_count("CONDENSE_MAX_SUMMARIES", &raw)?;
        }
        if let Some(raw) = lookup("CONDENSE_POLICY") {
            self.default_policy = PolicyKind::resolve(&raw);
        }
        self.validate()?;
        Ok(self)
    }

    /// Reject configurations the engine cannot honour
    pub fn validate(&self) -> Result<()> {
        if self.summary_interval == 0 {
            return Err(CondenseError::InvalidConfig(
                "summary_interval must be at least 1".to_string(),
            ));
        }
        for (name, settings) in [("reply", &self.reply), ("summarizer", &self.summarizer)] {
            if let Some(t) = settings.temperature {
                if !(0.0..=2.0).contains(&t) {
                    return Err(CondenseError::InvalidConfig(format!(
                        "{name}.temperature must be within [0, 2], got {t}"
                    )));
                }
            }
        }
        Ok(())
    }
}

fn parse_count(key: &str, raw: &str) -> Result<usize> {
    raw.trim()
        .parse()
        .map_err(|_| CondenseError::InvalidConfig(format!("{key} is not a count: {raw:?}")))
}

/// Options for one family of model calls
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ModelSettings {
    /// Model name hint, passed through to the completion capability
    pub model: Option<String>,

    /// Sampling temperature
    pub temperature: Option<f32>,

    /// Request a JSON document as output
    pub json_mode: bool,
}

impl Default for ModelSettings {
    fn default() -> Self {
        Self::reply()
    }
}

impl ModelSettings {
    /// Conversational reply profile
    pub fn reply() -> Self {
        Self {
            model: None,
            temperature: Some(0.7),
            json_mode: false,
        }
    }

    /// Summarization profile: low temperature, structured output
    pub fn summarizer() -> Self {
        Self {
            model: None,
            temperature: Some(0.2),
            json_mode: true,
        }
    }

    pub fn to_options(&self) -> CompletionOptions {
        CompletionOptions {
            model: self.model.clone(),
            temperature: self.temperature,
            json_mode: self.json_mode,
        }
    }
}
