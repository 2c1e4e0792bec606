//! Local feedback generation from sub-scores and grammar findings

use serde::{Deserialize, Serialize};

use crate::providers::GrammarIssue;
use crate::scoring::{classify_severity, SubScore};
use sdk::types::{Dimension, Severity};

const STRENGTH_RATIO: f64 = 0.75;
const WEAKNESS_RATIO: f64 = 0.5;

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Feedback {
    pub strengths: Vec<String>,
    pub improvements: Vec<String>,
    pub recommendations: Vec<String>,
}

fn strength(dimension: Dimension) -> &'static str {
    match dimension {
        Dimension::Grammar => "Accurate grammar with few errors",
        Dimension::Vocabulary => "Varied and well-chosen vocabulary",
        Dimension::Fluency => "Natural speaking pace and flow",
        Dimension::Pronunciation => "Clear pronunciation",
        Dimension::Comprehension => "Relevant, well-developed answers",
    }
}

fn improvement(dimension: Dimension) -> &'static str {
    match dimension {
        Dimension::Grammar => "Grammar accuracy",
        Dimension::Vocabulary => "Range of vocabulary",
        Dimension::Fluency => "Speaking fluency and pace",
        Dimension::Pronunciation => "Pronunciation clarity",
        Dimension::Comprehension => "Developing answers in more detail",
    }
}

fn recommendation(dimension: Dimension) -> &'static str {
    match dimension {
        Dimension::Grammar => "Review basic sentence patterns and check each sentence for errors",
        Dimension::Vocabulary => "Learn new words in context and try to use them when speaking",
        Dimension::Fluency => "Practise speaking about familiar topics without long pauses",
        Dimension::Pronunciation => "Listen to native speakers and repeat short phrases aloud",
        Dimension::Comprehension => "Answer with full sentences and give reasons or examples",
    }
}

fn error_recommendation(error_type: &str) -> Option<&'static str> {
    match error_type {
        "verb-tense" => Some("Practise past, present and future verb forms"),
        "subject-verb-agreement" => Some("Check that each verb agrees with its subject"),
        "article" => Some("Review when to use a, an and the"),
        "preposition" => Some("Study common preposition combinations"),
        _ => None,
    }
}

/// Strengths, improvements and recommendations for a set of sub-scores.
///
/// Dimensions at or above 75% of their maximum are strengths; below 50% they
/// become improvement areas. Critical and high severity grammar errors add a
/// targeted recommendation per error type. Lists are never empty.
pub fn generate_feedback(subscores: &[SubScore], issues: &[GrammarIssue]) -> Feedback {
    let mut feedback = Feedback::default();

    for score in subscores {
        let ratio = if score.max() > 0.0 { score.value / score.max() } else { 0.0 };
        if ratio >= STRENGTH_RATIO {
            feedback.strengths.push(strength(score.dimension).to_string());
        } else if ratio < WEAKNESS_RATIO {
            feedback.improvements.push(improvement(score.dimension).to_string());
            feedback.recommendations.push(recommendation(score.dimension).to_string());
        }
    }

    for issue in issues {
        if classify_severity(&issue.error_type) < Severity::High {
            continue;
        }
        let normalized = issue.error_type.to_lowercase().replace(['_', ' '], "-");
        if let Some(text) = error_recommendation(&normalized) {
            if !feedback.recommendations.iter().any(|r| r == text) {
                feedback.recommendations.push(text.to_string());
            }
        }
    }

    if feedback.strengths.is_empty() {
        feedback.strengths.push("Willingness to communicate".to_string());
    }
    if feedback.improvements.is_empty() {
        feedback.improvements.push("Keep practising to maintain your level".to_string());
    }
    if feedback.recommendations.is_empty() {
        feedback
            .recommendations
            .push("Try longer conversations on less familiar topics".to_string());
    }

    feedback
}
