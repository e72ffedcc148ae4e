//! # Compaction Trigger
//!
//! Decides, after each new user turn, whether a compaction pass must run and
//! which span it covers.
//!
//! Three conditions are checked, in order:
//!
//! 1. **Forced eviction**: the log holds more than twice `raw_history_limit`
//!    turns and the interval threshold is met. The oldest surplus (everything
//!    beyond the most recent `raw_history_limit` turns) is compacted, provided
//!    it holds at least `interval` un-summarized user turns.
//! 2. **Interval**: at least `interval` un-summarized user turns exist. The
//!    earliest span holding `interval` of them is compacted.
//! 3. **Surplus escape**: nothing above applies but more than twice the limit
//!    of turns are still un-summarized. The surplus is compacted regardless of
//!    the interval so a large interval cannot stall eviction forever. The
//!    backlog, not the total log length, gates this: once the backlog is back
//!    under the bound the interval governs again.
//!
//! Every plan covers at least one un-summarized turn, so a loop that applies
//! plans until none is returned terminates.

use serde::{Deserialize, Serialize};
use std::fmt;
use tracing::trace;

use crate::history::{DialogHistory, Turn};
use crate::types::TurnId;

/// Thresholds for one evaluation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct CompactionSchedule {
    /// `None` disables compaction entirely
    pub interval: Option<usize>,
    pub raw_history_limit: usize,
}

impl CompactionSchedule {
    pub fn enabled(interval: usize, raw_history_limit: usize) -> Self {
        Self {
            interval: Some(interval.max(1)),
            raw_history_limit,
        }
    }

    pub fn disabled(raw_history_limit: usize) -> Self {
        Self {
            interval: None,
            raw_history_limit,
        }
    }

    pub fn is_enabled(&self) -> bool {
        self.interval.is_some()
    }

    /// Turn count above which eviction is forced
    pub fn eviction_threshold(&self) -> usize {
        self.raw_history_limit.saturating_mul(2)
    }
}

/// Why a compaction pass was planned
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TriggerReason {
    Interval,
    ForcedEviction,
    SurplusEscape,
    /// Several records folded into one rolling record, no turns claimed
    Consolidation,
}

impl fmt::Display for TriggerReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Interval => "interval",
            Self::ForcedEviction => "forced_eviction",
            Self::SurplusEscape => "surplus_escape",
            Self::Consolidation => "consolidation",
        };
        f.write_str(name)
    }
}

/// A pass the trigger asks for
#[derive(Debug, Clone)]
pub struct CompactionPlan {
    pub reason: TriggerReason,
    /// The newly appended turn that caused the evaluation
    pub anchor: TurnId,
    /// Never empty
    pub span: Vec<Turn>,
}

impl CompactionPlan {
    pub fn span_ids(&self) -> Vec<TurnId> {
        self.span.iter().map(|t| t.id).collect()
    }
}

/// Stateless trigger evaluation
pub struct CompactionTrigger;

impl CompactionTrigger {
    pub fn evaluate(
        schedule: &CompactionSchedule,
        history: &DialogHistory,
        anchor: TurnId,
    ) -> Option<CompactionPlan> {
        let interval = schedule.interval?;
        let raw_count = history.raw_count();
        let backlog = history.unsummarized_count();
        let unsummarized_users = history.unsummarized_user_count();

        let over_limit = raw_count > schedule.eviction_threshold();
        let backlog_over_limit = backlog > schedule.eviction_threshold();
        let interval_met = unsummarized_users >= interval;

        trace!(
            raw_count,
            backlog,
            unsummarized_users,
            interval,
            over_limit,
            "Evaluating compaction trigger"
        );

        let plan = |reason, span: Vec<Turn>| CompactionPlan {
            reason,
            anchor,
            span,
        };

        if over_limit && interval_met {
            let surplus = history.surplus_span(schedule.raw_history_limit);
            if user_count(&surplus) >= interval {
                return Some(plan(TriggerReason::ForcedEviction, surplus));
            }
        }

        if interval_met {
            let span = history.take_span_for_compaction(anchor, interval);
            if !span.is_empty() {
                return Some(plan(TriggerReason::Interval, span));
            }
        }

        if backlog_over_limit {
            let surplus = history.surplus_span(schedule.raw_history_limit);
            if !surplus.is_empty() {
                return Some(plan(TriggerReason::SurplusEscape, surplus));
            }
        }

        None
    }
}

fn user_count(span: &[Turn]) -> usize {
    span.iter().filter(|t| t.is_user()).count()
}
