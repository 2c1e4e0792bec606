//! Evaluation lifecycle
//!
//! ```text
//! Pending -> Transcribing -> Analyzing -> Scoring -> Completed
//!    \____________________/
//! ```
//!
//! `Transcribing` only happens when audio is present and no transcript was
//! supplied. `Failed` and `Cancelled` are reachable from any non-terminal
//! state.

use sdk::errors::EngineError;
use serde::{Deserialize, Serialize};
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EvaluationState {
    Pending,
    Transcribing,
    Analyzing,
    Scoring,
    Completed,
    Failed,
    Cancelled,
}

impl EvaluationState {
    pub fn as_str(&self) -> &'static str {
        match self {
            EvaluationState::Pending => "pending",
            EvaluationState::Transcribing => "transcribing",
            EvaluationState::Analyzing => "analyzing",
            EvaluationState::Scoring => "scoring",
            EvaluationState::Completed => "completed",
            EvaluationState::Failed => "failed",
            EvaluationState::Cancelled => "cancelled",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            EvaluationState::Completed | EvaluationState::Failed | EvaluationState::Cancelled
        )
    }

    pub fn can_transition_to(&self, next: EvaluationState) -> bool {
        use EvaluationState::*;

        match (self, next) {
            (from, Failed | Cancelled) => !from.is_terminal(),
            (Pending, Transcribing | Analyzing) => true,
            (Transcribing, Analyzing) => true,
            (Analyzing, Scoring) => true,
            (Scoring, Completed) => true,
            _ => false,
        }
    }

    /// Move to `next`, rejecting transitions the lifecycle does not allow
    pub fn transition(self, next: EvaluationState) -> Result<EvaluationState, EngineError> {
        if self.can_transition_to(next) {
            Ok(next)
        } else {
            Err(EngineError::InvalidState(format!("{} -> {}", self, next)))
        }
    }
}

impl fmt::Display for EvaluationState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
