//! Line-oriented chat loop over a single session

use anyhow::Result;
use condense_core::{EngineConfig, ExtractiveModel, MessageOverrides, Session};
use std::sync::Arc;
use tokio::io::{AsyncBufReadExt, BufReader};

use crate::report;

pub struct ChatOptions {
    pub policy: Option<String>,
    pub interval: Option<i64>,
    pub max_summaries: Option<i64>,
    pub json: bool,
}

impl ChatOptions {
    fn overrides(&self) -> MessageOverrides {
        let mut overrides = MessageOverrides::default();
        if let Some(policy) = &self.policy {
            overrides = overrides.with_policy(policy.clone());
        }
        if let Some(interval) = self.interval {
            overrides = overrides.with_summary_interval(interval);
        }
        if let Some(max) = self.max_summaries {
            overrides = overrides.with_max_summaries(max);
        }
        overrides
    }
}

/// Slash commands understood besides plain messages
enum Command<'a> {
    Message(&'a str),
    State,
    Reset,
    Compare(&'a str),
    Quit,
    Skip,
}

fn parse_line(line: &str) -> Command<'_> {
    let line = line.trim();
    match line {
        "" => Command::Skip,
        "/quit" | "/exit" => Command::Quit,
        "/state" => Command::State,
        "/reset" => Command::Reset,
        _ => match line.strip_prefix("/compare ") {
            Some(id) => Command::Compare(id.trim()),
            None => Command::Message(line),
        },
    }
}

pub async fn run(config: EngineConfig, options: ChatOptions) -> Result<()> {
    let session = Session::new(config, Arc::new(ExtractiveModel::new()));
    let overrides = options.overrides();
    eprintln!(
        "Session {} ready. Commands: /state /reset /compare <id> /quit",
        session.id()
    );

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    while let Some(line) = lines.next_line().await? {
        match parse_line(&line) {
            Command::Skip => continue,
            Command::Quit => break,
            Command::State => {
                let state = session.get_state().await;
                println!("{}", serde_json::to_string_pretty(&state)?);
            }
            Command::Reset => {
                session.reset().await;
                eprintln!("History cleared.");
            }
            Command::Compare(id) => match session.run_comparison_scenario(id).await {
                Ok(comparison) => report::print_comparison(&comparison),
                Err(e) => eprintln!("error: {e}"),
            },
            Command::Message(text) => match session.handle_message(text, &overrides).await {
                Ok(metrics) if options.json => {
                    println!("{}", serde_json::to_string_pretty(&metrics)?)
                }
                Ok(metrics) => report::print_reply(&metrics),
                Err(e) => eprintln!("error: {e}"),
            },
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_line() {
        assert!(matches!(parse_line("   "), Command::Skip));
        assert!(matches!(parse_line("/quit"), Command::Quit));
        assert!(matches!(parse_line(" /state "), Command::State));
        assert!(matches!(parse_line("/compare trip-planning"), Command::Compare("trip-planning")));
        assert!(matches!(parse_line("hello"), Command::Message("hello")));
    }

    #[test]
    fn test_overrides_pass_through() {
        let options = ChatOptions {
            policy: Some("cumulative".into()),
            interval: Some(0),
            max_summaries: None,
            json: false,
        };
        let overrides = options.overrides();
        assert_eq!(overrides.policy.as_deref(), Some("cumulative"));
        assert_eq!(overrides.summary_interval, Some(0));
        assert_eq!(overrides.max_summaries, None);
    }
}
