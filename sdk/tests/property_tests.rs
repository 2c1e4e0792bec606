use proptest::prelude::*;
use sdk::errors::{EngineError, LexisErrorExt};
use sdk::types::{CefrLevel, Dimension};

proptest! {
    #[test]
    fn test_error_user_hint_never_echoes_detail(detail in "[a-zA-Z0-9/_.-]{8,40}") {
        let errs = vec![
            EngineError::Config(detail.clone()),
            EngineError::Database(detail.clone()),
            EngineError::InvalidInput(detail.clone()),
        ];

        for err in errs {
            let hint = err.user_hint();
            prop_assert!(!hint.is_empty());
            // Hints are static so raw details (keys, paths) never leak.
            prop_assert!(!hint.contains(&detail));
        }
    }

    #[test]
    fn test_out_of_range_is_never_recoverable(value in any::<f64>(), idx in 0usize..5) {
        let dimension = Dimension::ALL[idx];
        let err = EngineError::OutOfRange { dimension, value, max: dimension.max_points() };
        prop_assert!(!err.is_recoverable());
        prop_assert!(err.to_string().contains(dimension.as_str()));
    }

    #[test]
    fn test_cefr_parse_is_case_insensitive(idx in 0usize..6, lower in any::<bool>()) {
        let levels = [
            CefrLevel::A1,
            CefrLevel::A2,
            CefrLevel::B1,
            CefrLevel::B2,
            CefrLevel::C1,
            CefrLevel::C2,
        ];
        let level = levels[idx];
        let text = if lower {
            level.as_str().to_lowercase()
        } else {
            level.as_str().to_string()
        };
        prop_assert_eq!(text.parse::<CefrLevel>().unwrap(), level);
    }
}
