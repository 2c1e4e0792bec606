//! Local analysis heuristics
//!
//! Deterministic graders for every dimension. They are the last link of
//! every fallback chain, so an evaluation always completes even when no
//! provider is reachable. Everything here is pure and synchronous.

use regex::Regex;
use sdk::types::Dimension;
use std::collections::HashSet;
use std::sync::OnceLock;

pub mod comprehension;
pub mod feedback;
pub mod fluency;
pub mod grammar;
pub mod reply;
pub mod vocabulary;

pub use comprehension::comprehension_score;
pub use feedback::{generate_feedback, Feedback};
pub use fluency::{fluency_score, words_per_minute};
pub use grammar::check_grammar;
pub use reply::follow_up;
pub use vocabulary::{analyze_vocabulary, vocabulary_score};

/// Pronunciation score when no recogniser confidence is available
pub const NEUTRAL_PRONUNCIATION: f64 = 7.5;

static WORD_PATTERN: OnceLock<Regex> = OnceLock::new();
static SENTENCE_PATTERN: OnceLock<Regex> = OnceLock::new();

fn word_pattern() -> &'static Regex {
    WORD_PATTERN.get_or_init(|| {
        Regex::new(r"\p{L}+(?:'\p{L}+)?").expect("Invalid word pattern")
    })
}

fn sentence_pattern() -> &'static Regex {
    SENTENCE_PATTERN.get_or_init(|| Regex::new(r"[.!?]+").expect("Invalid sentence pattern"))
}

/// A word with its character span in the source text
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Token {
    pub text: String,
    pub lower: String,
    /// Character offset of the first character
    pub start: usize,
    /// Character offset one past the last character
    pub end: usize,
}

/// Split text into words, tracking character offsets
pub fn tokenize(text: &str) -> Vec<Token> {
    let mut tokens = Vec::new();
    let mut chars_before = 0;
    let mut last_byte = 0;

    for m in word_pattern().find_iter(text) {
        chars_before += text[last_byte..m.start()].chars().count();
        let len = m.as_str().chars().count();
        tokens.push(Token {
            text: m.as_str().to_string(),
            lower: m.as_str().to_lowercase(),
            start: chars_before,
            end: chars_before + len,
        });
        chars_before += len;
        last_byte = m.end();
    }

    tokens
}

pub fn word_count(text: &str) -> usize {
    word_pattern().find_iter(text).count()
}

/// Non-empty sentences, split on terminal punctuation
pub fn sentences(text: &str) -> Vec<&str> {
    sentence_pattern()
        .split(text)
        .map(str::trim)
        .filter(|s| word_count(s) > 0)
        .collect()
}

/// Mean words per sentence
pub fn average_sentence_length(text: &str) -> f64 {
    let lengths: Vec<usize> = sentences(text).iter().map(|s| word_count(s)).collect();
    if lengths.is_empty() {
        0.0
    } else {
        lengths.iter().sum::<usize>() as f64 / lengths.len() as f64
    }
}

/// Unique words over total words, 0 for empty input
pub fn lexical_diversity(tokens: &[Token]) -> f64 {
    if tokens.is_empty() {
        return 0.0;
    }
    let unique: HashSet<&str> = tokens.iter().map(|t| t.lower.as_str()).collect();
    unique.len() as f64 / tokens.len() as f64
}

/// Coverage factor that keeps very short texts from scoring high
pub fn length_factor(words: usize) -> f64 {
    match words {
        0..=1 => 0.1,
        2 => 0.2,
        3..=4 => 0.4,
        5..=9 => 0.7,
        _ => 1.0,
    }
}

/// Pronunciation from recogniser confidences.
///
/// `15 * mean confidence` when confidences exist, otherwise the neutral
/// midpoint.
pub fn pronunciation_score(mean_confidence: Option<f64>) -> f64 {
    match mean_confidence {
        Some(confidence) if confidence.is_finite() => {
            Dimension::Pronunciation.max_points() * confidence.clamp(0.0, 1.0)
        }
        _ => NEUTRAL_PRONUNCIATION,
    }
}
