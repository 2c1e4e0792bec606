//! Comprehension heuristic
//!
//! Four components, each worth up to 6 points: response length, sentence
//! length, share of long words and discourse markers. A floor of one point
//! per three words keeps short but valid answers above zero.

use super::tokenize;
use crate::scoring::clamp_score;
use sdk::types::Dimension;

const TRANSITIONS: &[&str] = &[
    "however", "therefore", "moreover", "furthermore", "although", "because", "since",
    "while", "whereas", "consequently", "nevertheless", "meanwhile", "finally", "first",
    "then", "also",
];
const CONJUNCTIONS: &[&str] = &["and", "but", "or", "so", "yet"];
const RELATIVES: &[&str] = &["which", "that", "who"];

const COMPONENT_MAX: f64 = 6.0;

fn length_points(words: usize) -> f64 {
    match words {
        30.. => 6.0,
        20..=29 => 5.0,
        15..=19 => 4.0,
        10..=14 => 3.0,
        5..=9 => 0.5,
        3..=4 => 0.2,
        2 => 0.1,
        _ => 0.05,
    }
}

fn sentence_points(avg_words: f64) -> f64 {
    if avg_words >= 12.0 {
        6.0
    } else if avg_words >= 8.0 {
        5.0
    } else if avg_words >= 6.0 {
        4.0
    } else if avg_words >= 4.0 {
        3.0
    } else {
        2.0
    }
}

fn sophistication_points(long_word_ratio: f64) -> f64 {
    if long_word_ratio >= 0.2 {
        6.0
    } else if long_word_ratio >= 0.15 {
        5.0
    } else if long_word_ratio >= 0.1 {
        4.0
    } else if long_word_ratio >= 0.05 {
        3.0
    } else {
        2.0
    }
}

fn coherence_points(words: &[&str]) -> f64 {
    let has = |list: &[&str]| words.iter().any(|w| list.contains(w));

    let mut points = 0.0;
    if has(TRANSITIONS) {
        points += 3.0;
    }
    if has(CONJUNCTIONS) {
        points += 2.0;
    }
    if has(RELATIVES) {
        points += 1.0;
    }
    f64::min(points, COMPONENT_MAX)
}

/// Comprehension sub-score on the 0-20 scale
pub fn comprehension_score(text: &str) -> f64 {
    let tokens = tokenize(text);
    if tokens.is_empty() {
        return 0.0;
    }

    let words: Vec<&str> = tokens.iter().map(|t| t.lower.as_str()).collect();
    let count = words.len();

    let parts = text.split('.').filter(|s| !s.trim().is_empty()).count().max(1);
    let avg_sentence = count as f64 / parts as f64;

    let long_words = words.iter().filter(|w| w.chars().count() > 5).count();
    let long_ratio = long_words as f64 / count as f64;

    let score = length_points(count)
        + sentence_points(avg_sentence)
        + sophistication_points(long_ratio)
        + coherence_points(&words);

    let floor = f64::min(COMPONENT_MAX, count as f64 / 3.0);
    clamp_score(score.max(floor), Dimension::Comprehension.max_points())
}
