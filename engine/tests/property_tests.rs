use proptest::prelude::*;
use std::sync::Arc;
use std::time::Duration;

use lexis_engine::analysis::{
    analyze_vocabulary, check_grammar, comprehension_score, fluency_score, vocabulary_score,
};
use lexis_engine::rate_limiter::{ManualClock, RateLimiter, WINDOW};
use lexis_engine::scoring::{cefr_level, compute_overall, grade_component, round2, SubScore};
use sdk::errors::EngineError;
use sdk::types::Dimension;

/// Five fractions in [0, 1], one per dimension
fn fractions() -> impl Strategy<Value = Vec<f64>> {
    prop::collection::vec(0.0..=1.0f64, 5)
}

/// Learner-like text: short words, spaces and sentence punctuation
fn learner_text() -> impl Strategy<Value = String> {
    "([A-Za-z']{1,12}[ ,.!?]{1,2}){0,40}"
}

proptest! {
    #[test]
    fn test_overall_is_sum_of_subscores(fractions in fractions()) {
        let subscores: Vec<SubScore> = Dimension::ALL
            .iter()
            .zip(&fractions)
            .map(|(d, f)| SubScore::new(*d, d.max_points() * f))
            .collect();

        let (overall, level) = compute_overall(&subscores).unwrap();
        let sum: f64 = subscores.iter().map(|s| s.value).sum();

        prop_assert_eq!(overall, round2(sum));
        prop_assert!((0.0..=100.0).contains(&overall));
        prop_assert_eq!(level, cefr_level(overall));
    }

    #[test]
    fn test_out_of_range_subscore_rejected(idx in 0usize..5, excess in 0.001..1000.0f64) {
        let subscores: Vec<SubScore> = Dimension::ALL
            .iter()
            .enumerate()
            .map(|(i, d)| {
                let value = if i == idx { d.max_points() + excess } else { 0.0 };
                SubScore::new(*d, value)
            })
            .collect();

        let is_out_of_range = matches!(
            compute_overall(&subscores),
            Err(EngineError::OutOfRange { .. })
        );
        prop_assert!(is_out_of_range);
    }

    #[test]
    fn test_cefr_level_is_monotonic(a in 0.0..=100.0f64, b in 0.0..=100.0f64) {
        let (low, high) = if a <= b { (a, b) } else { (b, a) };
        prop_assert!(cefr_level(low) <= cefr_level(high));
    }

    #[test]
    fn test_grade_component_non_increasing(a in 0.0..=1.0f64, b in 0.0..=1.0f64) {
        let (low, high) = if a <= b { (a, b) } else { (b, a) };
        prop_assert!(grade_component(low) >= grade_component(high));
        prop_assert!(grade_component(high) >= 0.4);
    }

    #[test]
    fn test_local_scores_within_bounds(text in learner_text(), duration in 0.0..600.0f64) {
        let items = analyze_vocabulary(&text);
        let vocabulary = vocabulary_score(&text, &items);
        let fluency = fluency_score(&text, Some(duration));
        let comprehension = comprehension_score(&text);

        prop_assert!((0.0..=Dimension::Vocabulary.max_points()).contains(&vocabulary));
        prop_assert!((0.0..=Dimension::Fluency.max_points()).contains(&fluency));
        prop_assert!((0.0..=Dimension::Comprehension.max_points()).contains(&comprehension));
    }

    #[test]
    fn test_grammar_spans_inside_text(text in learner_text()) {
        let len = text.chars().count();
        for issue in check_grammar(&text) {
            prop_assert!(issue.start <= issue.end);
            prop_assert!(issue.end <= len);
        }
    }

    #[test]
    fn test_rate_limiter_never_exceeds_limit(limit in 1u32..20, attempts in 0usize..60) {
        let clock = Arc::new(ManualClock::new());
        let mut limiter = RateLimiter::new(clock.clone());
        limiter.register("provider", limit);

        let granted = (0..attempts).filter(|_| limiter.try_acquire("provider")).count();
        prop_assert_eq!(granted, attempts.min(limit as usize));

        clock.advance(WINDOW);
        prop_assert!(limiter.try_acquire("provider"));
    }
}
