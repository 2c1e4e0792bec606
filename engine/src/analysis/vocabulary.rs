//! Vocabulary analysis
//!
//! Content words are rated for complexity (length, syllables, affixes and a
//! rough frequency band) and appropriateness. The dimension score blends
//! lexical diversity with the mean item ratings and scales it down for very
//! short texts.

use std::collections::HashSet;

use super::{length_factor, lexical_diversity, tokenize};
use crate::providers::VocabularyItem;
use crate::scoring::clamp_score;
use sdk::types::Dimension;

const DIVERSITY_WEIGHT: f64 = 0.35;
const COMPLEXITY_WEIGHT: f64 = 0.35;
const APPROPRIATENESS_WEIGHT: f64 = 0.30;

/// Raw complexity of the most complex possible word, used to normalise into `[0, 1]`
const MAX_RAW_COMPLEXITY: f64 = (3.0 + 2.0 + 4.0 + 2.7) / 4.0;

const STOPWORDS: &[&str] = &[
    "a", "an", "the", "and", "or", "but", "if", "so", "of", "in", "on", "at", "to", "for",
    "with", "by", "from", "as", "is", "am", "are", "was", "were", "be", "been", "do", "does",
    "did", "have", "has", "had", "i", "you", "he", "she", "it", "we", "they", "me", "him",
    "her", "us", "them", "my", "your", "his", "its", "our", "their", "this", "that", "these",
    "those", "not", "no", "yes", "very", "too", "there", "here", "what", "when", "where",
];

const COMMON_WORDS: &[&str] = &[
    "the", "be", "to", "of", "and", "a", "in", "that", "have", "i", "it", "for", "not", "on",
    "with", "he", "as", "you", "do", "at",
];

const PREFIXES: &[&str] = &["un", "re", "pre", "anti", "dis", "mis", "over", "under"];
const SUFFIXES: &[&str] = &["tion", "sion", "ness", "ment", "able", "ible", "ful", "less"];

/// Distinct content words of the text, in order of first use
pub fn analyze_vocabulary(text: &str) -> Vec<VocabularyItem> {
    let mut seen = HashSet::new();

    tokenize(text)
        .into_iter()
        .filter(|t| !STOPWORDS.contains(&t.lower.as_str()))
        .filter(|t| seen.insert(t.lower.clone()))
        .map(|t| VocabularyItem {
            complexity: word_complexity(&t.lower),
            appropriateness: appropriateness(&t.lower),
            word: t.lower,
        })
        .collect()
}

/// Vocabulary sub-score on the 0-20 scale
pub fn vocabulary_score(text: &str, items: &[VocabularyItem]) -> f64 {
    let tokens = tokenize(text);
    if tokens.is_empty() {
        return 0.0;
    }

    let (complexity, appropriateness) = if items.is_empty() {
        (0.0, 0.0)
    } else {
        let n = items.len() as f64;
        (
            items.iter().map(|i| unit(i.complexity)).sum::<f64>() / n,
            items.iter().map(|i| unit(i.appropriateness)).sum::<f64>() / n,
        )
    };

    let blend = DIVERSITY_WEIGHT * lexical_diversity(&tokens)
        + COMPLEXITY_WEIGHT * complexity
        + APPROPRIATENESS_WEIGHT * appropriateness;

    let max = Dimension::Vocabulary.max_points();
    clamp_score(max * blend * length_factor(tokens.len()), max)
}

fn unit(value: f64) -> f64 {
    if value.is_finite() {
        value.clamp(0.0, 1.0)
    } else {
        0.0
    }
}

/// Complexity of a word in `[0, 1]`
pub fn word_complexity(word: &str) -> f64 {
    let len = word.chars().count() as f64;
    let length_score = (len / 10.0).min(1.0) * 3.0;
    let syllable_score = (count_syllables(word) as f64 / 4.0).min(1.0) * 2.0;
    let morph_score = morphological_complexity(word) * 2.0;
    let freq_score = frequency_score(word) * 3.0;

    let raw = (length_score + syllable_score + morph_score + freq_score) / 4.0;
    (raw / MAX_RAW_COMPLEXITY).clamp(0.0, 1.0)
}

/// Approximate syllable count
fn count_syllables(word: &str) -> usize {
    let mut count = 0;
    let mut prev_was_vowel = false;

    for c in word.chars() {
        let is_vowel = "aeiouy".contains(c);
        if is_vowel && !prev_was_vowel {
            count += 1;
        }
        prev_was_vowel = is_vowel;
    }

    // Silent trailing e
    if word.ends_with('e') && count > 1 {
        count -= 1;
    }

    count.max(1)
}

fn morphological_complexity(word: &str) -> f64 {
    let prefixes = PREFIXES.iter().filter(|p| word.starts_with(*p)).count();
    let suffixes = SUFFIXES.iter().filter(|s| word.ends_with(*s)).count();
    ((prefixes + suffixes) as f64 * 0.5).min(2.0)
}

/// Rarity estimate; higher means less common
fn frequency_score(word: &str) -> f64 {
    let len = word.chars().count();
    if COMMON_WORDS.contains(&word) {
        0.1
    } else if len <= 4 {
        0.3
    } else if len <= 7 {
        0.6
    } else {
        0.9
    }
}

/// Words without vowels or with a letter tripled are likely misspelt
fn appropriateness(word: &str) -> f64 {
    let chars: Vec<char> = word.chars().collect();
    let has_vowel = chars.iter().any(|c| "aeiouy".contains(*c));
    let tripled = chars.windows(3).any(|w| w[0] == w[1] && w[1] == w[2]);

    if !has_vowel || tripled {
        0.5
    } else {
        1.0
    }
}
