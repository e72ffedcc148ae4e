//! Human-readable output

use condense_core::scenario;
use condense_core::{ComparisonReport, ResponseMetrics, TriggerReason};

pub fn print_catalog() {
    println!("{:<16} {:<12} {:>8} {:>6} {:>6}", "ID", "POLICY", "INTERVAL", "LIMIT", "TURNS");
    for s in scenario::catalog() {
        println!(
            "{:<16} {:<12} {:>8} {:>6} {:>6}",
            s.id,
            s.policy,
            s.summary_interval,
            s.raw_history_limit,
            s.user_turns()
        );
    }
}

pub fn print_comparison(report: &ComparisonReport) {
    println!("Scenario: {} ({})", report.scenario, report.policy);
    println!(
        "  without compaction: {:>7} prompt tokens",
        report.without_compression.total_prompt_tokens
    );
    println!(
        "  with compaction:    {:>7} prompt tokens, {} summaries",
        report.with_compression.total_prompt_tokens, report.summaries_generated
    );
    println!(
        "  saved:              {:>7} tokens ({:.1}%)",
        report.tokens_saved,
        report.savings_ratio() * 100.0
    );
    println!();
    println!("{}", report.narrative_text);
}

pub fn print_reply(metrics: &ResponseMetrics) {
    println!("{}", metrics.answer);

    let usage = &metrics.token_usage;
    let mut line = format!(
        "  [{} raw turns, {} summaries, interval {}, {}",
        metrics.raw_turn_count,
        metrics.summaries.len(),
        metrics.effective_interval,
        metrics.settings.policy
    );
    if let Some(prompt) = usage.prompt.or(usage.estimated_prompt) {
        line.push_str(&format!(", prompt {prompt} tokens"));
    }
    if let Some(saved) = usage.tokens_saved {
        line.push_str(&format!(", saved {saved}"));
    }
    line.push(']');
    println!("{line}");

    for pass in &metrics.compaction.passes {
        match pass.reason {
            TriggerReason::Consolidation => println!("  folded earlier summaries into one"),
            reason => println!("  compacted {} turns ({reason})", pass.covered_turns),
        }
    }
    if let Some(failure) = &metrics.compaction.failure {
        println!("  compaction skipped: {failure}");
    }
}
