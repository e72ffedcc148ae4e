//! # Dialog Compaction
//!
//! Replaces spans of raw turns with summary records so a growing conversation
//! stays bounded.
//!
//! ```text
//! new user turn ──▶ Trigger ──plan──▶ Compactor ──prompt──▶ CompletionModel
//!                     ▲                  │                        │
//!                     │                  ◀────── SummaryParser ◀──┘
//!                     │                  │
//!                     └──── loop ◀── Policy.apply(DialogHistory)
//! ```
//!
//! - [`trigger`]: when a pass runs and which span it covers
//! - [`policy`]: how the span merges with existing summaries
//! - [`parser`]: structured summarizer output
//! - [`engine`]: one atomic pass, and the loop that settles a turn

pub mod engine;
pub mod parser;
pub mod policy;
pub mod trigger;

pub use engine::{CompactionOutcome, CompactionPass, Compactor};
pub use parser::{JsonSummaryParser, ParsedSummary, SummaryParser};
pub use policy::{PolicyKind, PRIOR_SUMMARY_HEADER, TRANSCRIPT_HEADER};
pub use trigger::{CompactionPlan, CompactionSchedule, CompactionTrigger, TriggerReason};
