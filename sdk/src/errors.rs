//! Error types and handling
//!
//! This module provides the caller-facing error type of the evaluation
//! engine. Provider failures never surface here: they are absorbed by the
//! fallback chain. Only contract violations, cancellations and
//! infrastructure failures reach the caller.
//!
//! Every error implements [`LexisErrorExt`], which gives a short hint that is
//! safe to show to a learner and says whether retrying can help.

use crate::types::{Capability, Dimension};
use thiserror::Error;

/// Extra context for engine errors
pub trait LexisErrorExt {
    /// Returns a user-friendly hint for the error
    ///
    /// The hint never contains API keys, provider URLs or file paths.
    fn user_hint(&self) -> &str;

    /// Returns whether retrying the same request may succeed
    fn is_recoverable(&self) -> bool;
}

/// Main engine error type
///
/// # Examples
///
/// ```
/// use sdk::errors::{EngineError, LexisErrorExt};
/// use sdk::types::Dimension;
///
/// let cancelled = EngineError::Cancelled;
/// assert!(cancelled.is_recoverable());
///
/// let missing = EngineError::MissingDimension(Dimension::Fluency);
/// assert!(!missing.is_recoverable());
/// println!("Hint: {}", missing.user_hint());
/// ```
#[derive(Debug, Error)]
pub enum EngineError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Database error: {0}")]
    Database(String),

    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// No eligible provider for a capability. Handled internally by falling
    /// back to the local heuristic.
    #[error("No provider available for {0}")]
    ProviderUnavailable(Capability),

    #[error("Missing sub-score for dimension {0}")]
    MissingDimension(Dimension),

    #[error("Sub-score for {dimension} out of range: {value} (max {max})")]
    OutOfRange {
        dimension: Dimension,
        value: f64,
        max: f64,
    },

    /// Illegal evaluation state transition
    #[error("Invalid state transition: {0}")]
    InvalidState(String),

    #[error("Evaluation cancelled")]
    Cancelled,

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl LexisErrorExt for EngineError {
    fn user_hint(&self) -> &str {
        match self {
            Self::Config(_) => "Check your config.toml file for errors",
            Self::Database(_) => "Could not access the evaluation store. Check the data directory",
            Self::InvalidInput(_) => "The conversation input is incomplete or malformed",
            Self::ProviderUnavailable(_) => {
                "No analysis provider is available. Local analysis will be used"
            }
            Self::MissingDimension(_) | Self::OutOfRange { .. } => {
                "The evaluation produced an invalid score. This input cannot be scored"
            }
            Self::InvalidState(_) => "The evaluation ended in an inconsistent state",
            Self::Cancelled => "The evaluation was cancelled. Try again",
            Self::Io(_) => "File system operation failed",
        }
    }

    fn is_recoverable(&self) -> bool {
        match self {
            Self::InvalidInput(_) | Self::MissingDimension(_) | Self::OutOfRange { .. } => false,
            Self::Config(_) | Self::InvalidState(_) => false,
            _ => true,
        }
    }
}

impl From<serde_json::Error> for EngineError {
    fn from(err: serde_json::Error) -> Self {
        EngineError::Database(format!("serialization failed: {}", err))
    }
}
