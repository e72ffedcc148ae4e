//! Condense Core - incremental dialog-history compaction
//!
//! Condense keeps a growing conversation bounded by periodically replacing
//! spans of raw turns with compact summary records, while every model call
//! still receives a coherent, token-bounded context window.
//!
//! # Architecture
//!
//! Leaves first:
//!
//! 1. **Dialog History** (`history`): append-only turn log and summary store ✅
//! 2. **Compaction** (`compaction`): trigger, policies, parser and the pass engine ✅
//! 3. **Context** (`context`): window assembly and token accounting ✅
//! 4. **Session** (`session`): the orchestrator, one async lock per session ✅
//! 5. **Scenarios** (`scenario`): scripted dialogs for with/without comparisons ✅
//!
//! # Quick Start
//!
//! ```
//! use std::sync::Arc;
//! use condense_core::{EngineConfig, ExtractiveModel, MessageOverrides, Session};
//!
//! # tokio_test::block_on(async {
//! let config = EngineConfig::default().with_summary_interval(2);
//! let session = Session::new(config, Arc::new(ExtractiveModel::new()));
//!
//! for text in ["My order 1182 never arrived.", "It was a blue kettle.", "Can you resend it?"] {
//!     let metrics = session
//!         .handle_message(text, &MessageOverrides::default())
//!         .await
//!         .unwrap();
//!     println!("{} ({} summaries)", metrics.answer, metrics.summaries.len());
//! }
//!
//! let state = session.get_state().await;
//! assert_eq!(state.summaries.len(), 1);
//! # });
//! ```
//!
//! # Guarantees
//!
//! - A turn is folded into at most one independent summary, and never unfolded
//! - A cumulative call leaves at most one summary, folding any earlier ones
//! - A failed compaction pass changes nothing and never fails the message
//! - Token savings are never negative, and unknown usage stays unknown

#![deny(unsafe_code)]
#![warn(rust_2018_idioms, clippy::all)]

pub mod compaction;
pub mod config;
pub mod context;
pub mod error;
pub mod history;
pub mod llm;
pub mod scenario;
pub mod session;
pub mod types;

// Re-export commonly used types for convenience
pub use compaction::{
    CompactionOutcome, CompactionSchedule, CompactionTrigger, Compactor, JsonSummaryParser,
    ParsedSummary, PolicyKind, SummaryParser, TriggerReason,
};
pub use config::{EngineConfig, ModelSettings};
pub use context::{
    ContextAssembler, ContextWindow, HeuristicEstimator, TokenAccountant, TokenEstimator,
};
pub use error::{CompactionError, CondenseError, ParseError, Result, ResultExt};
pub use history::{DialogHistory, SummaryRecord, Turn};
pub use llm::{
    ChatMessage, Completion, CompletionModel, CompletionOptions, ExtractiveModel, Usage,
};
pub use scenario::{ComparisonReport, Scenario, ScenarioRun};
pub use session::{
    EffectiveSettings, MessageOverrides, ResponseMetrics, Session, SessionRegistry,
    SessionSnapshot, TokenUsage,
};
pub use types::{Role, SessionId, SummaryId, Timestamp, TurnId};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Library name
pub const NAME: &str = env!("CARGO_PKG_NAME");
