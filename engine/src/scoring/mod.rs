//! Scoring engine
//!
//! Pure aggregation of the five sub-scores into an overall score and a CEFR
//! level, plus the static grading tables used by the grammar dimension.
//! Nothing here performs I/O.

use sdk::errors::EngineError;
use sdk::types::{CefrLevel, Dimension, Severity};
use serde::{Deserialize, Serialize};

/// Upper bound of each CEFR band, in ascending order. Scores above the last
/// bound are C2.
const CEFR_BANDS: [(f64, CefrLevel); 5] = [
    (20.0, CefrLevel::A1),
    (40.0, CefrLevel::A2),
    (60.0, CefrLevel::B1),
    (80.0, CefrLevel::B2),
    (95.0, CefrLevel::C1),
];

/// Score for one dimension
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SubScore {
    pub dimension: Dimension,
    pub value: f64,
}

impl SubScore {
    pub fn new(dimension: Dimension, value: f64) -> Self {
        Self { dimension, value }
    }

    /// Build a sub-score, clamping into `[0, max]`. Non-finite values become 0.
    pub fn clamped(dimension: Dimension, value: f64) -> Self {
        Self {
            dimension,
            value: clamp_score(value, dimension.max_points()),
        }
    }

    pub fn max(&self) -> f64 {
        self.dimension.max_points()
    }
}

/// Clamp a producer value into `[0, max]`
pub fn clamp_score(value: f64, max: f64) -> f64 {
    if value.is_finite() {
        value.clamp(0.0, max)
    } else {
        0.0
    }
}

/// Round to two decimals
pub fn round2(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}

/// Sub-scores to overall score and CEFR level.
///
/// Requires exactly one entry per dimension with a value in `[0, max]`.
/// Values are never clamped here: a bad producer is a contract violation.
pub fn compute_overall(subscores: &[SubScore]) -> Result<(f64, CefrLevel), EngineError> {
    let mut seen = [false; Dimension::ALL.len()];

    for score in subscores {
        let max = score.max();
        let idx = dimension_index(score.dimension);
        if seen[idx] || !score.value.is_finite() || score.value < 0.0 || score.value > max {
            return Err(EngineError::OutOfRange {
                dimension: score.dimension,
                value: score.value,
                max,
            });
        }
        seen[idx] = true;
    }

    if let Some(missing) = Dimension::ALL
        .iter()
        .find(|d| !seen[dimension_index(**d)])
    {
        return Err(EngineError::MissingDimension(*missing));
    }

    let overall = round2(subscores.iter().map(|s| s.value).sum());
    Ok((overall, cefr_level(overall)))
}

fn dimension_index(dimension: Dimension) -> usize {
    match dimension {
        Dimension::Grammar => 0,
        Dimension::Vocabulary => 1,
        Dimension::Fluency => 2,
        Dimension::Pronunciation => 3,
        Dimension::Comprehension => 4,
    }
}

/// CEFR level for an overall score.
///
/// A score belongs to the first band whose upper bound it does not exceed, so
/// 20 is A1 and anything above 20 up to 40 is A2.
pub fn cefr_level(score: f64) -> CefrLevel {
    CEFR_BANDS
        .iter()
        .find(|(upper, _)| score <= *upper)
        .map(|(_, level)| *level)
        .unwrap_or(CefrLevel::C2)
}

/// Severity of a grammar error type.
///
/// Names are matched case-insensitively with `_` and spaces treated as `-`.
pub fn classify_severity(error_type: &str) -> Severity {
    let normalized: String = error_type
        .trim()
        .chars()
        .map(|c| match c {
            '_' | ' ' => '-',
            other => other.to_ascii_lowercase(),
        })
        .collect();

    match normalized.as_str() {
        "verb-tense" | "subject-verb-agreement" => Severity::Critical,
        "article" | "preposition" => Severity::High,
        _ => Severity::Medium,
    }
}

/// Fraction of the grammar maximum earned for an error rate
pub fn grade_component(error_rate: f64) -> f64 {
    if error_rate < 0.02 {
        1.0
    } else if error_rate < 0.05 {
        0.8
    } else if error_rate < 0.10 {
        0.6
    } else {
        0.4
    }
}

/// Errors per word, 0 for an empty text
pub fn error_rate(errors: usize, words: usize) -> f64 {
    if words == 0 {
        0.0
    } else {
        errors as f64 / words as f64
    }
}

/// Grammar sub-score for an error count over a word count
pub fn grammar_score(errors: usize, words: usize) -> f64 {
    Dimension::Grammar.max_points() * grade_component(error_rate(errors, words))
}
