//! Prompts and reply parsing shared by the chat-model providers
//!
//! OpenAI-compatible and Ollama providers send the same instructions and
//! parse the same JSON shapes; only the transport differs.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::response::{extract_json_object, number_field, string_list};
use super::{
    FluencyAssessment, GrammarIssue, ModelAssessment, ProviderError, ProviderRequest,
    ProviderResponse, Result, VocabularyItem,
};

const SYSTEM_PROMPT: &str = "You are an expert English language teacher and assessor. \
Always respond with a single valid JSON object and nothing else.";

/// Chat message in the OpenAI/Ollama wire format
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: String,
    pub content: String,
}

impl ChatMessage {
    pub fn system(content: impl Into<String>) -> Self {
        Self {
            role: "system".to_string(),
            content: content.into(),
        }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: "user".to_string(),
            content: content.into(),
        }
    }
}

/// Build the chat messages for a request.
///
/// Speech-to-text is not a chat-model capability.
pub fn build_messages(request: &ProviderRequest) -> Result<Vec<ChatMessage>> {
    let user = match request {
        ProviderRequest::Transcribe { .. } => {
            return Err(ProviderError::Unsupported(request.capability()))
        }
        ProviderRequest::Grammar { text, language } => format!(
            "Find the grammar errors in this {language} learner transcript.\n\
TRANSCRIPT: \"{text}\"\n\n\
Reply with:\n\
{{\"errors\": [{{\"type\": \"<verb-tense|subject-verb-agreement|article|preposition|word-order|other>\", \
\"description\": \"<what is wrong>\", \"suggestion\": \"<corrected fragment>\", \
\"text\": \"<the wrong fragment exactly as written>\", \
\"start\": <character offset>, \"end\": <character offset>}}]}}\n\
Use an empty list when there are no errors."
        ),
        ProviderRequest::Vocabulary { text } => format!(
            "Assess the vocabulary of this learner transcript.\n\
TRANSCRIPT: \"{text}\"\n\n\
Reply with:\n\
{{\"items\": [{{\"word\": \"<content word>\", \"complexity\": <0.0-1.0>, \
\"appropriateness\": <0.0-1.0>}}]}}\n\
List each distinct content word once."
        ),
        ProviderRequest::Fluency {
            text,
            duration_secs,
        } => format!(
            "Rate the fluency of this learner transcript spoken in {duration_secs:.1} seconds.\n\
TRANSCRIPT: \"{text}\"\n\n\
Reply with:\n\
{{\"score\": <number between 0-20>, \"words_per_minute\": <number>}}\n\
Very short texts (under 5 words) should get low scores."
        ),
        ProviderRequest::Score {
            text,
            topic,
            target_level,
        } => format!(
            "Assess this learner conversation.\n\
TOPIC: {topic}\n\
TARGET LEVEL: {level}\n\
TRANSCRIPT: \"{text}\"\n\n\
Reply with:\n\
{{\"comprehension_score\": <number between 0-20>, \
\"pronunciation_score\": <number between 0-15 or null if it cannot be judged from text>, \
\"strengths\": [\"<specific strength>\"], \
\"areas_for_improvement\": [\"<specific area>\"], \
\"recommendations\": [\"<specific recommendation>\"]}}",
            topic = topic.as_deref().unwrap_or("General conversation"),
            level = target_level
                .map(|l| l.to_string())
                .unwrap_or_else(|| "not specified".to_string()),
        ),
        ProviderRequest::Reply {
            text,
            topic,
            level,
            strengths,
            improvements,
        } => format!(
            "You are talking with an English learner about their message.\n\
STUDENT MESSAGE: \"{text}\"\n\
TOPIC: {topic}\n\
STUDENT LEVEL: {level}\n\
STUDENT STRENGTHS: {strengths}\n\
AREAS TO IMPROVE: {improvements}\n\n\
Write a short, encouraging reply pitched at level {level} that acknowledges the message \
and ends with one follow-up question about the topic.\n\
Reply with:\n\
{{\"reply\": \"<your reply>\"}}",
            topic = topic.as_deref().unwrap_or("General conversation"),
            strengths = first_two(strengths),
            improvements = first_two(improvements),
        ),
    };

    Ok(vec![ChatMessage::system(SYSTEM_PROMPT), ChatMessage::user(user)])
}

/// Parse a model reply for the request that produced it
pub fn parse_reply(request: &ProviderRequest, content: &str) -> Result<ProviderResponse> {
    let value = extract_json_object(content)
        .ok_or_else(|| ProviderError::InvalidResponse("no JSON object in reply".to_string()))?;

    match request {
        ProviderRequest::Transcribe { .. } => Err(ProviderError::Unsupported(request.capability())),
        ProviderRequest::Grammar { text, .. } => {
            Ok(ProviderResponse::Grammar(parse_grammar(&value, text)?))
        }
        ProviderRequest::Vocabulary { .. } => {
            Ok(ProviderResponse::Vocabulary(parse_vocabulary(&value)?))
        }
        ProviderRequest::Fluency { .. } => {
            let score = number_field(&value, "score")
                .or_else(|| number_field(&value, "fluency_score"))
                .ok_or_else(|| ProviderError::InvalidResponse("missing fluency score".to_string()))?;
            Ok(ProviderResponse::Fluency(FluencyAssessment {
                score,
                words_per_minute: number_field(&value, "words_per_minute"),
            }))
        }
        ProviderRequest::Score { .. } => Ok(ProviderResponse::Score(parse_assessment(&value))),
        ProviderRequest::Reply { .. } => value
            .get("reply")
            .or_else(|| value.get("response"))
            .and_then(Value::as_str)
            .map(str::trim)
            .filter(|reply| !reply.is_empty())
            .map(|reply| ProviderResponse::Reply(reply.to_string()))
            .ok_or_else(|| ProviderError::InvalidResponse("missing reply text".to_string())),
    }
}

fn first_two(items: &[String]) -> String {
    if items.is_empty() {
        return "none noted".to_string();
    }
    items.iter().take(2).map(String::as_str).collect::<Vec<_>>().join(", ")
}

fn parse_grammar(value: &Value, text: &str) -> Result<Vec<GrammarIssue>> {
    let errors = value
        .get("errors")
        .or_else(|| value.get("grammar_errors"))
        .and_then(Value::as_array)
        .ok_or_else(|| ProviderError::InvalidResponse("missing errors list".to_string()))?;

    let text_len = text.chars().count();

    Ok(errors
        .iter()
        .filter_map(|item| {
            let error_type = item
                .get("type")
                .or_else(|| item.get("error_type"))
                .and_then(Value::as_str)?
                .trim()
                .to_string();
            let description = item
                .get("description")
                .and_then(Value::as_str)
                .unwrap_or_default()
                .to_string();
            let suggestion = item
                .get("suggestion")
                .and_then(Value::as_str)
                .filter(|s| !s.trim().is_empty())
                .map(str::to_string);

            let (start, end) = item
                .get("text")
                .and_then(Value::as_str)
                .and_then(|fragment| locate(text, fragment))
                .or_else(|| {
                    let start = number_field(item, "start")? as usize;
                    let end = number_field(item, "end").map(|e| e as usize).unwrap_or(start);
                    Some((start, end))
                })
                .unwrap_or((0, 0));
            let start = start.min(text_len);
            let end = end.clamp(start, text_len);

            Some(GrammarIssue {
                error_type,
                description,
                suggestion,
                start,
                end,
            })
        })
        .collect())
}

/// Character span of the first case-insensitive occurrence of `fragment`.
///
/// Characters are compared one at a time so the span is always counted in
/// the original text, even when lowercasing changes a character's length.
fn locate(text: &str, fragment: &str) -> Option<(usize, usize)> {
    let needle: Vec<char> = fragment.trim().chars().collect();
    if needle.is_empty() {
        return None;
    }
    let haystack: Vec<char> = text.chars().collect();
    let start = haystack.windows(needle.len()).position(|window| {
        window
            .iter()
            .zip(&needle)
            .all(|(a, b)| a.to_lowercase().eq(b.to_lowercase()))
    })?;
    Some((start, start + needle.len()))
}

fn parse_vocabulary(value: &Value) -> Result<Vec<VocabularyItem>> {
    let items = value
        .get("items")
        .or_else(|| value.get("vocabulary_analysis"))
        .and_then(Value::as_array)
        .ok_or_else(|| ProviderError::InvalidResponse("missing vocabulary items".to_string()))?;

    Ok(items
        .iter()
        .filter_map(|item| {
            let word = item.get("word").and_then(Value::as_str)?.trim().to_string();
            if word.is_empty() {
                return None;
            }
            let complexity = number_field(item, "complexity")
                .or_else(|| number_field(item, "complexity_score"))
                .unwrap_or(0.5);
            let appropriateness = number_field(item, "appropriateness").unwrap_or(1.0);
            Some(VocabularyItem {
                word,
                complexity: unit(complexity),
                appropriateness: unit(appropriateness),
            })
        })
        .collect())
}

/// Models mix 0-1 and 0-10 scales; fold both into `[0, 1]`
fn unit(value: f64) -> f64 {
    if value > 1.0 && value <= 10.0 {
        value / 10.0
    } else {
        value.clamp(0.0, 1.0)
    }
}

fn parse_assessment(value: &Value) -> ModelAssessment {
    let mut improvements = string_list(value, "areas_for_improvement");
    if improvements.is_empty() {
        improvements = string_list(value, "improvements");
    }

    ModelAssessment {
        comprehension: number_field(value, "comprehension_score")
            .or_else(|| number_field(value, "comprehension")),
        pronunciation: number_field(value, "pronunciation_score")
            .or_else(|| number_field(value, "pronunciation")),
        strengths: string_list(value, "strengths"),
        improvements,
        recommendations: string_list(value, "recommendations"),
    }
}
