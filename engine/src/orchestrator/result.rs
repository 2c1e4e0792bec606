//! Evaluation input and output types

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::PathBuf;

use crate::providers::{GrammarIssue, VocabularyItem};
use crate::scoring::{classify_severity, SubScore};
use sdk::errors::EngineError;
use sdk::types::{CefrLevel, Dimension, Severity};

/// Where the audio of a conversation lives. Bytes are never decoded.
#[derive(Debug, Clone, PartialEq)]
pub enum AudioSource {
    File(PathBuf),
    Bytes { data: Vec<u8>, file_name: String },
}

/// One conversation submitted for evaluation
#[derive(Debug, Clone, PartialEq)]
pub struct ConversationInput {
    pub id: String,
    pub transcript: Option<String>,
    pub audio: Option<AudioSource>,
    /// Spoken duration in seconds, 0 when unknown
    pub duration_secs: f64,
    pub topic: Option<String>,
    pub target_level: Option<CefrLevel>,
}

impl ConversationInput {
    pub fn from_transcript(id: impl Into<String>, transcript: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            transcript: Some(transcript.into()),
            audio: None,
            duration_secs: 0.0,
            topic: None,
            target_level: None,
        }
    }

    pub fn from_audio(id: impl Into<String>, audio: AudioSource) -> Self {
        Self {
            id: id.into(),
            transcript: None,
            audio: Some(audio),
            duration_secs: 0.0,
            topic: None,
            target_level: None,
        }
    }

    pub fn with_duration(mut self, secs: f64) -> Self {
        self.duration_secs = secs;
        self
    }

    pub fn with_topic(mut self, topic: impl Into<String>) -> Self {
        self.topic = Some(topic.into());
        self
    }

    pub fn with_target_level(mut self, level: CefrLevel) -> Self {
        self.target_level = Some(level);
        self
    }

    pub fn with_audio(mut self, audio: AudioSource) -> Self {
        self.audio = Some(audio);
        self
    }

    /// Check the submission contract
    pub fn validate(&self) -> Result<(), EngineError> {
        if self.id.trim().is_empty() {
            return Err(EngineError::InvalidInput(
                "conversation id must not be empty".to_string(),
            ));
        }
        if !self.duration_secs.is_finite() || self.duration_secs < 0.0 {
            return Err(EngineError::InvalidInput(format!(
                "duration must be a non-negative number of seconds, got {}",
                self.duration_secs
            )));
        }
        if self.transcript.is_none() && self.audio.is_none() {
            return Err(EngineError::InvalidInput(
                "either a transcript or audio is required".to_string(),
            ));
        }
        Ok(())
    }

    /// Whether speech-to-text has to run first
    pub fn needs_transcription(&self) -> bool {
        self.transcript.is_none() && self.audio.is_some()
    }
}

/// Who produced a value
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", content = "name", rename_all = "lowercase")]
pub enum ScoreSource {
    Provider(String),
    Local,
}

impl ScoreSource {
    pub fn label(&self) -> &str {
        match self {
            ScoreSource::Provider(name) => name,
            ScoreSource::Local => "local",
        }
    }
}

/// Grammar error with its severity
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GrammarError {
    pub error_type: String,
    pub description: String,
    pub suggestion: Option<String>,
    pub start: usize,
    pub end: usize,
    pub severity: Severity,
}

impl From<GrammarIssue> for GrammarError {
    fn from(issue: GrammarIssue) -> Self {
        Self {
            severity: classify_severity(&issue.error_type),
            error_type: issue.error_type,
            description: issue.description,
            suggestion: issue.suggestion,
            start: issue.start,
            end: issue.end,
        }
    }
}

/// Finished evaluation of one conversation
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EvaluationResult {
    pub conversation_id: String,
    /// Text that was evaluated
    pub transcript: String,
    pub topic: Option<String>,
    pub target_level: Option<CefrLevel>,
    /// One per dimension, in [`Dimension::ALL`] order
    pub subscores: Vec<SubScore>,
    pub overall_score: f64,
    pub level: CefrLevel,
    pub strengths: Vec<String>,
    pub improvements: Vec<String>,
    pub recommendations: Vec<String>,
    /// Tutor reply with a follow-up question, pitched at `level`
    #[serde(default)]
    pub follow_up: String,
    pub grammar_errors: Vec<GrammarError>,
    pub vocabulary: Vec<VocabularyItem>,
    /// Source of each dimension's value
    pub sources: BTreeMap<Dimension, ScoreSource>,
    pub words_per_minute: Option<f64>,
    pub evaluated_at: DateTime<Utc>,
}

impl EvaluationResult {
    pub fn score(&self, dimension: Dimension) -> Option<f64> {
        self.subscores
            .iter()
            .find(|s| s.dimension == dimension)
            .map(|s| s.value)
    }

    pub fn source(&self, dimension: Dimension) -> Option<&ScoreSource> {
        self.sources.get(&dimension)
    }
}
