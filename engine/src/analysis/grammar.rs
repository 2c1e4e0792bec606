//! Rule-based grammar checker
//!
//! A handful of high-signal rules for learner English: repeated words,
//! a/an mismatches, subject-verb agreement after personal pronouns, present
//! verbs in sentences anchored in the past, and common preposition
//! collocation mistakes. Spans are character offsets.

use std::collections::HashSet;

use super::{sentences, tokenize, Token};
use crate::providers::GrammarIssue;

/// Verbs checked for agreement and tense, with their past forms
const VERBS: &[(&str, &str)] = &[
    ("be", "was"),
    ("go", "went"),
    ("do", "did"),
    ("have", "had"),
    ("make", "made"),
    ("take", "took"),
    ("come", "came"),
    ("see", "saw"),
    ("know", "knew"),
    ("think", "thought"),
    ("say", "said"),
    ("get", "got"),
    ("eat", "ate"),
    ("buy", "bought"),
    ("write", "wrote"),
    ("meet", "met"),
    ("leave", "left"),
    ("find", "found"),
    ("give", "gave"),
    ("tell", "told"),
    ("feel", "felt"),
    ("speak", "spoke"),
    ("read", "read"),
    ("want", "wanted"),
    ("like", "liked"),
    ("need", "needed"),
    ("work", "worked"),
    ("live", "lived"),
    ("play", "played"),
    ("study", "studied"),
    ("watch", "watched"),
    ("visit", "visited"),
    ("walk", "walked"),
    ("talk", "talked"),
    ("travel", "traveled"),
    ("stay", "stayed"),
    ("start", "started"),
    ("finish", "finished"),
    ("listen", "listened"),
    ("cook", "cooked"),
];

const THIRD_PERSON_SUBJECTS: &[&str] = &["he", "she", "it"];
const PLURAL_SUBJECTS: &[&str] = &["i", "you", "we", "they"];
const ALL_SUBJECTS: &[&str] = &["i", "you", "we", "they", "he", "she", "it"];

/// Single-word past markers
const PAST_MARKERS: &[&str] = &["yesterday", "ago"];
/// Nouns that make "last <noun>" a past marker
const LAST_NOUNS: &[&str] = &[
    "night", "week", "weekend", "month", "year", "summer", "winter", "time", "monday",
    "tuesday", "wednesday", "thursday", "friday", "saturday", "sunday",
];

/// Wrong collocation -> correction
const COLLOCATIONS: &[(&str, &str, &str)] = &[
    ("arrive to", "arrive at", "'arrive' takes 'at' or 'in', not 'to'"),
    ("depend of", "depend on", "'depend' takes 'on'"),
    ("discuss about", "discuss", "'discuss' takes a direct object"),
    ("listen music", "listen to music", "'listen' needs 'to' before its object"),
    ("married with", "married to", "'married' takes 'to'"),
    ("good in", "good at", "use 'good at' for skills"),
    ("interested for", "interested in", "'interested' takes 'in'"),
    ("afraid from", "afraid of", "'afraid' takes 'of'"),
];

/// Words starting with a vowel letter but a consonant sound
const CONSONANT_SOUND: &[&str] = &[
    "university", "universe", "unique", "unit", "united", "user", "use", "useful", "usual",
    "usually", "european", "one", "once", "uniform", "union",
];

/// Words starting with a silent h
const VOWEL_SOUND: &[&str] = &["hour", "hours", "honest", "honor", "honour", "heir"];

fn third_person(base: &str) -> String {
    match base {
        "be" => "is".to_string(),
        "have" => "has".to_string(),
        "go" => "goes".to_string(),
        "do" => "does".to_string(),
        _ if consonant_y(base) => format!("{}ies", &base[..base.len() - 1]),
        _ if ["ch", "sh", "s", "x"].iter().any(|s| base.ends_with(s)) => format!("{}es", base),
        _ => format!("{}s", base),
    }
}

/// "study" but not "play" or "buy"
fn consonant_y(word: &str) -> bool {
    let mut rev = word.chars().rev();
    rev.next() == Some('y') && rev.next().is_some_and(|c| !"aeiou".contains(c))
}

/// Base form for a present-tense verb form, if known
fn present_base(word: &str) -> Option<&'static str> {
    if matches!(word, "am" | "is" | "are") {
        return Some("be");
    }
    VERBS
        .iter()
        .find(|(base, _)| *base == word || third_person(base) == word)
        .map(|(base, _)| *base)
}

fn past_form(base: &str, subject: &str) -> String {
    if base == "be" {
        return if matches!(subject, "you" | "we" | "they") {
            "were".to_string()
        } else {
            "was".to_string()
        };
    }
    VERBS
        .iter()
        .find(|(b, _)| *b == base)
        .map(|(_, past)| past.to_string())
        .unwrap_or_else(|| format!("{}ed", base))
}

fn is_past_form(word: &str) -> bool {
    matches!(word, "was" | "were" | "did" | "had")
        || VERBS
            .iter()
            .any(|(base, past)| *past == word && *base != word)
        || (word.len() > 3 && word.ends_with("ed") && present_base(word).is_none())
}

fn issue(
    error_type: &str,
    description: String,
    suggestion: String,
    start: usize,
    end: usize,
) -> GrammarIssue {
    GrammarIssue {
        error_type: error_type.to_string(),
        description,
        suggestion: Some(suggestion),
        start,
        end,
    }
}

/// Run every rule over the text
pub fn check_grammar(text: &str) -> Vec<GrammarIssue> {
    let tokens = tokenize(text);
    let mut issues = Vec::new();
    // Verb spans already reported by the tense rule
    let mut reported: HashSet<usize> = HashSet::new();

    check_verb_tense(text, &mut issues, &mut reported);
    check_repetition(&tokens, &mut issues);
    check_articles(&tokens, &mut issues);
    check_agreement(&tokens, &mut issues, &reported);
    check_collocations(&tokens, &mut issues);

    issues.sort_by_key(|i| (i.start, i.end));
    issues
}

fn check_repetition(tokens: &[Token], issues: &mut Vec<GrammarIssue>) {
    for pair in tokens.windows(2) {
        // "had had" and "that that" are grammatical
        if pair[0].lower == pair[1].lower && !matches!(pair[0].lower.as_str(), "had" | "that") {
            issues.push(issue(
                "repetition",
                format!("Repeated word '{}'", pair[1].text),
                pair[0].text.clone(),
                pair[0].start,
                pair[1].end,
            ));
        }
    }
}

fn check_articles(tokens: &[Token], issues: &mut Vec<GrammarIssue>) {
    for pair in tokens.windows(2) {
        let article = pair[0].lower.as_str();
        if article != "a" && article != "an" {
            continue;
        }
        let next = pair[1].lower.as_str();
        let vowel_sound = if CONSONANT_SOUND.contains(&next) {
            false
        } else if VOWEL_SOUND.contains(&next) {
            true
        } else {
            next.starts_with(['a', 'e', 'i', 'o', 'u'])
        };

        let expected = if vowel_sound { "an" } else { "a" };
        if article != expected {
            issues.push(issue(
                "article",
                format!("Use '{}' before '{}'", expected, pair[1].text),
                format!("{} {}", expected, pair[1].text),
                pair[0].start,
                pair[1].end,
            ));
        }
    }
}

fn check_agreement(tokens: &[Token], issues: &mut Vec<GrammarIssue>, reported: &HashSet<usize>) {
    for pair in tokens.windows(2) {
        let subject = pair[0].lower.as_str();
        let verb = &pair[1];
        if reported.contains(&verb.start) {
            continue;
        }
        let Some(base) = present_base(&verb.lower) else {
            continue;
        };

        let expected = if THIRD_PERSON_SUBJECTS.contains(&subject) {
            third_person(base)
        } else if subject == "i" && base == "be" {
            "am".to_string()
        } else if PLURAL_SUBJECTS.contains(&subject) {
            if base == "be" {
                "are".to_string()
            } else {
                base.to_string()
            }
        } else {
            continue;
        };

        // "I/you/we/they" + bare verb is fine, as is "he goes"
        if verb.lower != expected {
            issues.push(issue(
                "subject-verb-agreement",
                format!("'{}' does not agree with '{}'", verb.text, pair[0].text),
                format!("{} {}", pair[0].text, expected),
                pair[0].start,
                verb.end,
            ));
        }
    }
}

fn check_verb_tense(text: &str, issues: &mut Vec<GrammarIssue>, reported: &mut HashSet<usize>) {
    // Sentence offsets are recovered from the tokens of the whole text
    let all = tokenize(text);
    let mut cursor = 0;

    for sentence in sentences(text) {
        let count = tokenize(sentence).len();
        let Some(tokens) = all.get(cursor..cursor + count) else {
            break;
        };
        cursor += count;

        let words: Vec<&str> = tokens.iter().map(|t| t.lower.as_str()).collect();
        let anchored_in_past = words.iter().any(|w| PAST_MARKERS.contains(w))
            || words
                .windows(2)
                .any(|w| w[0] == "last" && LAST_NOUNS.contains(&w[1]));
        if !anchored_in_past || words.iter().any(|w| is_past_form(w)) {
            continue;
        }

        for pair in tokens.windows(2) {
            let subject = pair[0].lower.as_str();
            if !ALL_SUBJECTS.contains(&subject) {
                continue;
            }
            if let Some(base) = present_base(&pair[1].lower) {
                let past = past_form(base, subject);
                issues.push(issue(
                    "verb-tense",
                    format!(
                        "Use the past tense with a past time reference: '{}' should be '{}'",
                        pair[1].text, past
                    ),
                    past,
                    pair[1].start,
                    pair[1].end,
                ));
                reported.insert(pair[1].start);
            }
        }
    }
}

fn check_collocations(tokens: &[Token], issues: &mut Vec<GrammarIssue>) {
    for pair in tokens.windows(2) {
        // Match on the stem so "arrived to" and "depends of" are caught too
        for (wrong, right, description) in COLLOCATIONS {
            let Some((head, tail)) = wrong.split_once(' ') else {
                continue;
            };
            if pair[0].lower.starts_with(head) && pair[1].lower == tail {
                let suggestion = if pair[0].lower == head {
                    right.to_string()
                } else {
                    right.replacen(head, &pair[0].lower, 1)
                };
                issues.push(issue(
                    "preposition",
                    description.to_string(),
                    suggestion,
                    pair[0].start,
                    pair[1].end,
                ));
            }
        }
    }
}
