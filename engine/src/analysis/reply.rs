//! Local tutor follow-up, used when no language model can write one

use sdk::types::CefrLevel;

/// Topic named in the follow-up when the conversation has none
pub const DEFAULT_TOPIC: &str = "everyday life";

/// Encouraging reply with a follow-up question pitched at `level`
pub fn follow_up(level: CefrLevel, topic: Option<&str>) -> String {
    let topic = topic
        .map(str::trim)
        .filter(|t| !t.is_empty())
        .unwrap_or(DEFAULT_TOPIC)
        .to_lowercase();

    match level {
        CefrLevel::A1 => format!(
            "That's great! You're doing well with your English. What do you like most about {}?",
            topic
        ),
        CefrLevel::A2 => format!(
            "Good job! I can see you're improving. Tell me more about your experience with {}.",
            topic
        ),
        CefrLevel::B1 => format!(
            "Interesting point! Your English is getting better. What's your perspective on {}?",
            topic
        ),
        CefrLevel::B2 => format!(
            "Excellent! You're expressing yourself well. How do you think {} has changed recently?",
            topic
        ),
        CefrLevel::C1 => format!(
            "Sophisticated response! Your English is very good. What are your thoughts on the future of {}?",
            topic
        ),
        CefrLevel::C2 => format!(
            "Outstanding! Your command of English is excellent. What's your assessment of current trends in {}?",
            topic
        ),
    }
}
