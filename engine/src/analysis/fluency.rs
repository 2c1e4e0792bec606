//! Fluency heuristic
//!
//! Speaking rate, sentence length and diversity each map to a factor in
//! `[0.4, 1.0]`; their mean is scaled to the dimension maximum.

use super::{average_sentence_length, length_factor, lexical_diversity, tokenize};
use crate::scoring::clamp_score;
use sdk::types::Dimension;

/// Rate assumed when no usable duration is known
pub const DEFAULT_WORDS_PER_MINUTE: f64 = 150.0;

pub fn words_per_minute(words: usize, duration_secs: Option<f64>) -> f64 {
    match duration_secs {
        Some(secs) if secs.is_finite() && secs > 0.0 => words as f64 / (secs / 60.0),
        _ => DEFAULT_WORDS_PER_MINUTE,
    }
}

fn rate_factor(wpm: f64) -> f64 {
    if (120.0..=180.0).contains(&wpm) {
        1.0
    } else if (100.0..=200.0).contains(&wpm) {
        0.7
    } else {
        0.4
    }
}

fn sentence_factor(avg_len: f64) -> f64 {
    if (8.0..=20.0).contains(&avg_len) {
        1.0
    } else {
        0.7
    }
}

/// Fluency sub-score on the 0-20 scale
pub fn fluency_score(text: &str, duration_secs: Option<f64>) -> f64 {
    let tokens = tokenize(text);
    if tokens.is_empty() {
        return 0.0;
    }

    let wpm = words_per_minute(tokens.len(), duration_secs);
    let diversity = (2.0 * lexical_diversity(&tokens)).min(1.0);
    let mean = (rate_factor(wpm) + sentence_factor(average_sentence_length(text)) + diversity) / 3.0;

    let max = Dimension::Fluency.max_points();
    clamp_score(mean * max * length_factor(tokens.len()), max)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_words_per_minute() {
        assert_eq!(words_per_minute(100, Some(60.0)), 100.0);
        assert_eq!(words_per_minute(50, Some(20.0)), 150.0);
        assert_eq!(words_per_minute(10, None), DEFAULT_WORDS_PER_MINUTE);
        assert_eq!(words_per_minute(10, Some(0.0)), DEFAULT_WORDS_PER_MINUTE);
        assert_eq!(words_per_minute(10, Some(-3.0)), DEFAULT_WORDS_PER_MINUTE);
    }

    #[test]
    fn test_rate_bands() {
        assert_eq!(rate_factor(150.0), 1.0);
        assert_eq!(rate_factor(110.0), 0.7);
        assert_eq!(rate_factor(190.0), 0.7);
        assert_eq!(rate_factor(60.0), 0.4);
        assert_eq!(rate_factor(250.0), 0.4);
    }

    #[test]
    fn test_empty_text_scores_zero() {
        assert_eq!(fluency_score("", Some(30.0)), 0.0);
        assert_eq!(fluency_score("   ...  ", None), 0.0);
    }

    #[test]
    fn test_full_marks_for_natural_speech() {
        // Ten distinct words in one sentence, spoken at 150 wpm
        let text = "We walked along the quiet river before dinner last night.";
        let score = fluency_score(text, Some(4.0));
        assert!((score - 20.0).abs() < 1e-9);
    }

    #[test]
    fn test_single_word_is_scaled_down() {
        let score = fluency_score("Hello", None);
        assert!(score <= 2.0);
        assert!(score > 0.0);
    }
}
