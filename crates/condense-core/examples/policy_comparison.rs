//! Example: Independent vs cumulative compaction
//!
//! Feeds the same dialog to two sessions, one per policy, and prints what
//! each keeps in its summary store.
//! Run with: cargo run --example policy_comparison

use condense_core::{EngineConfig, ExtractiveModel, MessageOverrides, PolicyKind, Session};
use std::sync::Arc;

const DIALOG: &[&str] = &[
    "I am moving to Berlin in March and need a flat near Kreuzberg.",
    "My budget is 1400 euros warm rent.",
    "I work from home, so a separate office room would help.",
    "I have a cat, the landlord must allow pets.",
    "Do I need a Schufa report before viewings?",
    "Which documents should I prepare for the application?",
    "Can I register my address before the lease starts?",
];

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    for policy in [PolicyKind::Independent, PolicyKind::Cumulative] {
        println!("=== {policy} ===");

        let config = EngineConfig::default()
            .with_summary_interval(2)
            .with_raw_history_limit(2)
            .with_policy(policy);
        let session = Session::new(config, Arc::new(ExtractiveModel::new()));

        for text in DIALOG {
            let metrics = session
                .handle_message(text, &MessageOverrides::default())
                .await?;
            for pass in &metrics.compaction.passes {
                println!(
                    "  + summary {} over {} turns ({})",
                    pass.summary_id, pass.covered_turns, pass.reason
                );
            }
        }

        let state = session.get_state().await;
        let summarized = state.turns.iter().filter(|t| t.is_summarized()).count();
        println!(
            "  {} summaries stored, {} of {} turns summarized",
            state.summaries.len(),
            summarized,
            state.turns.len()
        );
        for record in &state.summaries {
            println!("  - {}", record.summary_text);
        }
        println!();
    }

    Ok(())
}
