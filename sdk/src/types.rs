//! Shared evaluation vocabulary
//!
//! Dimensions, capabilities, proficiency levels and severities used by the
//! engine, its providers and the persistence layer.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// One of the five weighted dimensions of an evaluation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Dimension {
    Grammar,
    Vocabulary,
    Fluency,
    Pronunciation,
    Comprehension,
}

impl Dimension {
    /// Every dimension, in reporting order
    pub const ALL: [Dimension; 5] = [
        Dimension::Grammar,
        Dimension::Vocabulary,
        Dimension::Fluency,
        Dimension::Pronunciation,
        Dimension::Comprehension,
    ];

    /// Fixed maximum for the dimension. The maxima sum to 100.
    pub fn max_points(&self) -> f64 {
        match self {
            Dimension::Grammar => 25.0,
            Dimension::Vocabulary => 20.0,
            Dimension::Fluency => 20.0,
            Dimension::Pronunciation => 15.0,
            Dimension::Comprehension => 20.0,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Dimension::Grammar => "grammar",
            Dimension::Vocabulary => "vocabulary",
            Dimension::Fluency => "fluency",
            Dimension::Pronunciation => "pronunciation",
            Dimension::Comprehension => "comprehension",
        }
    }
}

impl fmt::Display for Dimension {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A category of analysis that one or more providers can fulfil
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Capability {
    SpeechToText,
    GrammarAnalysis,
    VocabularyAnalysis,
    FluencyAnalysis,
    LanguageModelScoring,
}

impl Capability {
    pub const ALL: [Capability; 5] = [
        Capability::SpeechToText,
        Capability::GrammarAnalysis,
        Capability::VocabularyAnalysis,
        Capability::FluencyAnalysis,
        Capability::LanguageModelScoring,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Capability::SpeechToText => "speech-to-text",
            Capability::GrammarAnalysis => "grammar-analysis",
            Capability::VocabularyAnalysis => "vocabulary-analysis",
            Capability::FluencyAnalysis => "fluency-analysis",
            Capability::LanguageModelScoring => "language-model-scoring",
        }
    }
}

impl fmt::Display for Capability {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Capability {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Capability::ALL
            .iter()
            .copied()
            .find(|c| c.as_str() == s.trim().to_ascii_lowercase())
            .ok_or_else(|| format!("unknown capability '{}'", s))
    }
}

/// CEFR proficiency level
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum CefrLevel {
    A1,
    A2,
    B1,
    B2,
    C1,
    C2,
}

impl CefrLevel {
    pub fn as_str(&self) -> &'static str {
        match self {
            CefrLevel::A1 => "A1",
            CefrLevel::A2 => "A2",
            CefrLevel::B1 => "B1",
            CefrLevel::B2 => "B2",
            CefrLevel::C1 => "C1",
            CefrLevel::C2 => "C2",
        }
    }

    /// Short description of what a learner at this level can do
    pub fn description(&self) -> &'static str {
        match self {
            CefrLevel::A1 => "Basic user: familiar expressions and simple sentences",
            CefrLevel::A2 => "Elementary user: routine tasks, simple past and present",
            CefrLevel::B1 => "Intermediate user: clear standard input on familiar matters",
            CefrLevel::B2 => "Upper-intermediate user: complex text, spontaneous interaction",
            CefrLevel::C1 => "Advanced user: demanding texts, flexible language use",
            CefrLevel::C2 => "Proficient user: precise expression in virtually everything",
        }
    }
}

impl fmt::Display for CefrLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for CefrLevel {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_uppercase().as_str() {
            "A1" => Ok(CefrLevel::A1),
            "A2" => Ok(CefrLevel::A2),
            "B1" => Ok(CefrLevel::B1),
            "B2" => Ok(CefrLevel::B2),
            "C1" => Ok(CefrLevel::C1),
            "C2" => Ok(CefrLevel::C2),
            other => Err(format!("unknown CEFR level '{}'", other)),
        }
    }
}

/// Severity of a grammar error
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Medium,
    High,
    Critical,
}

impl Severity {
    pub fn as_str(&self) -> &'static str {
        match self {
            Severity::Medium => "medium",
            Severity::High => "high",
            Severity::Critical => "critical",
        }
    }
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
