//! Property tests for the history invariants under random dialogs

mod common;

use common::{config, FlakyModel};
use condense_core::{MessageOverrides, Session, SessionSnapshot, TurnId};
use proptest::prelude::*;
use std::collections::HashSet;

#[derive(Debug, Clone)]
struct Step {
    words: usize,
    cumulative: bool,
    interval: i64,
    summarizer_down: bool,
}

fn step() -> impl Strategy<Value = Step> {
    (1usize..40, any::<bool>(), -1i64..5, prop::bool::weighted(0.2)).prop_map(
        |(words, cumulative, interval, summarizer_down)| Step {
            words,
            cumulative,
            interval,
            summarizer_down,
        },
    )
}

fn message(index: usize, words: usize) -> String {
    let body = (0..words)
        .map(|w| format!("w{}", (index * 7 + w) % 13))
        .collect::<Vec<_>>()
        .join(" ");
    format!("Message {index}: {body}.")
}

fn summarized(state: &SessionSnapshot) -> HashSet<TurnId> {
    state
        .turns
        .iter()
        .filter(|t| t.is_summarized())
        .map(|t| t.id)
        .collect()
}

fn run(steps: Vec<Step>, raw_history_limit: usize) -> Result<(), TestCaseError> {
    tokio_test::block_on(async move {
        let model = FlakyModel::new();
        let session = Session::new(config(3, raw_history_limit), model.clone());
        let mut previously_summarized = HashSet::new();

        for (i, step) in steps.into_iter().enumerate() {
            model.set_fail_summaries(step.summarizer_down);
            let mut overrides = MessageOverrides::default().with_summary_interval(step.interval);
            if step.cumulative {
                overrides = overrides.with_policy("cumulative");
            }

            let metrics = session
                .handle_message(&message(i, step.words), &overrides)
                .await
                .map_err(|e| TestCaseError::fail(e.to_string()))?;

            // Savings are either unknown or bounded by the hypothetical prompt
            if let Some(saved) = metrics.token_usage.tokens_saved {
                let hypothetical = metrics.token_usage.hypothetical_prompt;
                prop_assert!(hypothetical.is_some_and(|h| saved <= h));
            }

            let state = session.get_state().await;

            // Stored records never share a turn
            let mut seen = HashSet::new();
            for record in &state.summaries {
                for id in &record.source_turn_ids {
                    prop_assert!(seen.insert(*id), "turn {} covered twice", id);
                }
                if let Some(saved) = record.tokens_saved {
                    prop_assert!(record.raw_token_count.is_some_and(|raw| saved <= raw));
                    prop_assert!(record.summary_token_count.is_some());
                }
            }

            // A cumulative call with a working summarizer leaves one rolling
            // record; when it could not fold them, every record stays in view
            if step.cumulative {
                if step.summarizer_down {
                    prop_assert_eq!(metrics.context_used.summaries.len(), state.summaries.len());
                } else {
                    prop_assert!(state.summaries.len() <= 1);
                }
            }

            // The summarized flag is never cleared
            let now_summarized = summarized(&state);
            prop_assert!(now_summarized.is_superset(&previously_summarized));
            previously_summarized = now_summarized;

            // A failed pass never leaves a partial claim behind
            let covered: HashSet<TurnId> = state
                .summaries
                .iter()
                .flat_map(|r| r.source_turn_ids.iter().copied())
                .collect();
            prop_assert_eq!(&covered, &previously_summarized);
        }
        Ok::<(), TestCaseError>(())
    })
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(64))]

    #[test]
    fn history_invariants_hold(
        steps in prop::collection::vec(step(), 1..30),
        raw_history_limit in 1usize..8,
    ) {
        run(steps, raw_history_limit)?;
    }

    #[test]
    fn independent_only_dialogs_never_overlap(
        words in prop::collection::vec(1usize..30, 1..40),
        interval in 1i64..5,
    ) {
        let steps = words
            .into_iter()
            .map(|words| Step { words, cumulative: false, interval, summarizer_down: false })
            .collect();
        run(steps, 4)?;
    }
}
