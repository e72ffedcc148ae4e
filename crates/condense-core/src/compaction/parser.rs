//! # Summary Parser
//!
//! Turns raw summarizer output into a [`ParsedSummary`]. Models wrap JSON in
//! code fences or add a sentence around it often enough that the parser looks
//! for the object before deserializing.

use lazy_static::lazy_static;
use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::error::ParseError;

lazy_static! {
    static ref CODE_FENCE: Regex =
        Regex::new(r"(?s)```(?:json|JSON)?\s*(.*?)\s*```").expect("valid regex");
}

/// Structured summarizer output
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ParsedSummary {
    pub summary_text: String,
    pub facts: Vec<String>,
    pub open_questions: Vec<String>,
}

/// Parses summarizer output
pub trait SummaryParser: Send + Sync {
    fn parse(&self, text: &str) -> Result<ParsedSummary, ParseError>;
}

/// Parser for the JSON document requested by the compaction prompt
#[derive(Debug, Clone, Copy, Default)]
pub struct JsonSummaryParser;

#[derive(Deserialize)]
struct RawSummary {
    #[serde(default, alias = "summaryText", alias = "summary_text")]
    summary: Option<String>,
    #[serde(default)]
    facts: Vec<String>,
    #[serde(default, alias = "openQuestions")]
    open_questions: Vec<String>,
}

impl JsonSummaryParser {
    pub fn new() -> Self {
        Self
    }

    fn locate_object(text: &str) -> Option<&str> {
        let text = match CODE_FENCE.captures(text).and_then(|c| c.get(1)) {
            Some(inner) => inner.as_str(),
            None => text,
        };
        let start = text.find('{')?;
        let end = text.rfind('}')?;
        (start < end).then(|| &text[start..=end])
    }
}

impl SummaryParser for JsonSummaryParser {
    fn parse(&self, text: &str) -> Result<ParsedSummary, ParseError> {
        let object = Self::locate_object(text)
            .ok_or_else(|| ParseError::MalformedJson("no JSON object found".to_string()))?;

        let raw: RawSummary =
            serde_json::from_str(object).map_err(|e| ParseError::MalformedJson(e.to_string()))?;

        let summary_text = raw
            .summary
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty())
            .ok_or(ParseError::MissingSummary)?;

        Ok(ParsedSummary {
            summary_text,
            facts: clean(raw.facts),
            open_questions: clean(raw.open_questions),
        })
    }
}

fn clean(items: Vec<String>) -> Vec<String> {
    items
        .into_iter()
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_plain_json() {
        let json = r#"{"summary": "User wants a refund.",
            "facts": ["Order 1182"], "open_questions": []}"#;
        let parsed = JsonSummaryParser.parse(json).unwrap();
        assert_eq!(parsed.summary_text, "User wants a refund.");
        assert_eq!(parsed.facts, vec!["Order 1182".to_string()]);
        assert!(parsed.open_questions.is_empty());
    }

    #[test]
    fn test_fenced_json_with_aliases() {
        let text = "Here you go:\n```json\n\
            {\"summaryText\": \" Trip to Lisbon \",\
            \"openQuestions\": [\"Which hotel?\", \"  \"]}\n\
            ```";
        let parsed = JsonSummaryParser.parse(text).unwrap();
        assert_eq!(parsed.summary_text, "Trip to Lisbon");
        assert_eq!(parsed.open_questions, vec!["Which hotel?".to_string()]);
        assert!(parsed.facts.is_empty());
    }

    #[test]
    fn test_surrounding_prose() {
        let parsed = JsonSummaryParser
            .parse("Summary follows {\"summary\": \"ok\"} thanks")
            .unwrap();
        assert_eq!(parsed.summary_text, "ok");
    }

    #[test]
    fn test_errors() {
        assert!(matches!(
            JsonSummaryParser.parse("no json here"),
            Err(ParseError::MalformedJson(_))
        ));
        assert!(matches!(
            JsonSummaryParser.parse("{\"summary\": 3}"),
            Err(ParseError::MalformedJson(_))
        ));
        assert_eq!(
            JsonSummaryParser.parse("{\"facts\": [\"x\"]}"),
            Err(ParseError::MissingSummary)
        );
        assert_eq!(
            JsonSummaryParser.parse("{\"summary\": \"   \"}"),
            Err(ParseError::MissingSummary)
        );
    }
}
