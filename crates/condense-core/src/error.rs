//! Error types
//!
//! [`CondenseError`] is what callers of the session and the config loader
//! see. [`CompactionError`] describes a failed compaction pass and never
//! leaves the trigger loop.

use thiserror::Error;

use crate::types::TurnId;

/// Result type alias for Condense operations
pub type Result<T> = std::result::Result<T, CondenseError>;

/// Main error type for Condense operations
#[derive(Error, Debug)]
pub enum CondenseError {
    /// Blank user input, rejected before any state mutation
    #[error("Message text must not be empty")]
    EmptyMessage,

    /// Unknown comparison scenario id
    #[error("Unknown scenario: {0}")]
    UnknownScenario(String),

    /// The model call producing the user-facing reply failed
    #[error("Completion failed: {0}")]
    Completion(#[source] anyhow::Error),

    /// Configuration rejected by validation
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    /// Session id not present in a registry
    #[error("Session not found: {0}")]
    SessionNotFound(String),

    /// Serialization errors
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// TOML configuration errors
    #[error("TOML error: {0}")]
    Toml(#[from] toml::de::Error),

    /// IO errors
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// An error annotated with what was being attempted, e.g. the config path
    #[error("{context}: {source}")]
    WithContext {
        context: String,
        source: Box<CondenseError>,
    },
}

/// Failure of a single compaction pass.
///
/// A pass is atomic: when one of these is produced nothing was applied to the
/// history.
#[derive(Error, Debug)]
pub enum CompactionError {
    /// The summarization call failed
    #[error("Summarization call failed: {0}")]
    Completion(#[source] anyhow::Error),

    /// The summarizer output could not be parsed
    #[error("Summary parse failed: {0}")]
    Parse(#[from] ParseError),

    /// Asked to compact an empty span
    #[error("Cannot compact an empty span")]
    EmptySpan,

    /// A span turn is unknown or was claimed by an earlier pass
    #[error("Turn {0} is unknown or already summarized")]
    StaleSpan(TurnId),
}

/// Errors raised while parsing structured summarizer output
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ParseError {
    #[error("Malformed summary document: {0}")]
    MalformedJson(String),

    #[error("Summary document has no summary text")]
    MissingSummary,
}

impl CondenseError {
    /// Wrap with a description of the failed operation
    pub fn context(self, context: impl Into<String>) -> Self {
        Self::WithContext {
            context: context.into(),
            source: Box::new(self),
        }
    }

    /// Whether the session state is guaranteed untouched by this failure
    pub fn is_rejection(&self) -> bool {
        match self {
            Self::EmptyMessage | Self::UnknownScenario(_) | Self::InvalidConfig(_) => true,
            Self::WithContext { source, .. } => source.is_rejection(),
            _ => false,
        }
    }
}

/// Convert any error the crate knows about into a [`CondenseError`] carrying
/// context
pub trait ResultExt<T> {
    fn context(self, context: impl Into<String>) -> Result<T>;

    fn with_context<F>(self, f: F) -> Result<T>
    where
        F: FnOnce() -> String;
}

impl<T, E> ResultExt<T> for std::result::Result<T, E>
where
    E: Into<CondenseError>,
{
    fn context(self, context: impl Into<String>) -> Result<T> {
        self.map_err(|e| e.into().context(context))
    }

    fn with_context<F>(self, f: F) -> Result<T>
    where
        F: FnOnce() -> String,
    {
        self.map_err(|e| e.into().context(f()))
    }
}
