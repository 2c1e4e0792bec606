//! Analysis provider abstraction layer
//!
//! Every third-party analysis service (chat models, speech-to-text, grammar
//! checkers) sits behind the [`AnalysisProvider`] trait. Requests and
//! responses are capability-specific enum variants so one provider can serve
//! several capabilities through a single `invoke` call.
//!
//! Provider failures are [`ProviderError`]s. They never reach the caller of
//! an evaluation: the orchestrator moves to the next provider and finally to
//! the local heuristics.

use async_trait::async_trait;
use sdk::types::{Capability, CefrLevel};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

use crate::config::{Config, ProviderConfig, ProviderKind};

pub mod languagetool;
pub mod ollama;
pub mod openai;
pub mod prompt;
pub mod registry;
pub mod response;
pub mod whisper;

pub use registry::{ProviderRegistry, ProviderStatus};

/// Result type for provider operations
pub type Result<T> = std::result::Result<T, ProviderError>;

/// Errors that can occur while calling a provider
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum ProviderError {
    #[error("Provider unavailable: {0}")]
    Unavailable(String),

    #[error("Authentication failed: {0}")]
    Authentication(String),

    #[error("Rate limit exceeded")]
    RateLimited,

    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    #[error("Network error: {0}")]
    Network(String),

    #[error("Timeout")]
    Timeout,

    #[error("Invalid response: {0}")]
    InvalidResponse(String),

    #[error("Capability not supported: {0}")]
    Unsupported(Capability),
}

impl ProviderError {
    /// Map a transport error from reqwest
    pub(crate) fn from_reqwest(err: reqwest::Error, base_url: &str) -> Self {
        if err.is_timeout() {
            ProviderError::Timeout
        } else if err.is_connect() {
            ProviderError::Unavailable(format!("cannot connect to {}", base_url))
        } else {
            ProviderError::Network(err.to_string())
        }
    }

    /// Map a non-success HTTP status
    pub(crate) fn from_status(status: reqwest::StatusCode, body: String) -> Self {
        match status.as_u16() {
            401 | 403 => ProviderError::Authentication(format!("HTTP {}", status.as_u16())),
            429 => ProviderError::RateLimited,
            400 | 404 | 413 | 422 => ProviderError::InvalidRequest(body),
            _ => ProviderError::Unavailable(format!("HTTP {}: {}", status.as_u16(), body)),
        }
    }
}

/// Raw audio handed to speech-to-text providers untouched
#[derive(Debug, Clone, PartialEq)]
pub struct AudioData {
    pub bytes: Vec<u8>,
    /// File name sent with multipart uploads; providers infer the format from it
    pub file_name: String,
}

/// Capability-specific request
#[derive(Debug, Clone, PartialEq)]
pub enum ProviderRequest {
    Transcribe {
        audio: Arc<AudioData>,
        language: String,
    },
    Grammar {
        text: String,
        language: String,
    },
    Vocabulary {
        text: String,
    },
    Fluency {
        text: String,
        duration_secs: f64,
    },
    Score {
        text: String,
        topic: Option<String>,
        target_level: Option<CefrLevel>,
    },
    /// Tutor follow-up to the learner, adapted to the assessed level
    Reply {
        text: String,
        topic: Option<String>,
        level: CefrLevel,
        strengths: Vec<String>,
        improvements: Vec<String>,
    },
}

impl ProviderRequest {
    pub fn capability(&self) -> Capability {
        match self {
            ProviderRequest::Transcribe { .. } => Capability::SpeechToText,
            ProviderRequest::Grammar { .. } => Capability::GrammarAnalysis,
            ProviderRequest::Vocabulary { .. } => Capability::VocabularyAnalysis,
            ProviderRequest::Fluency { .. } => Capability::FluencyAnalysis,
            ProviderRequest::Score { .. } | ProviderRequest::Reply { .. } => {
                Capability::LanguageModelScoring
            }
        }
    }
}

/// One recognised stretch of speech
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TranscriptSegment {
    pub text: String,
    /// Recogniser confidence in `[0, 1]`
    pub confidence: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Transcript {
    pub text: String,
    #[serde(default)]
    pub segments: Vec<TranscriptSegment>,
}

impl Transcript {
    /// Mean segment confidence, `None` without segments
    pub fn mean_confidence(&self) -> Option<f64> {
        let values: Vec<f64> = self
            .segments
            .iter()
            .map(|s| s.confidence)
            .filter(|c| c.is_finite())
            .collect();
        if values.is_empty() {
            None
        } else {
            Some(values.iter().map(|c| c.clamp(0.0, 1.0)).sum::<f64>() / values.len() as f64)
        }
    }
}

/// Grammar problem reported by a provider or the local checker.
///
/// `start` and `end` are character offsets into the analysed text.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GrammarIssue {
    pub error_type: String,
    pub description: String,
    #[serde(default)]
    pub suggestion: Option<String>,
    pub start: usize,
    pub end: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VocabularyItem {
    pub word: String,
    /// Lexical complexity in `[0, 1]`
    pub complexity: f64,
    /// Fit for the context in `[0, 1]`
    pub appropriateness: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FluencyAssessment {
    /// Score on the 0-20 fluency scale
    pub score: f64,
    #[serde(default)]
    pub words_per_minute: Option<f64>,
}

/// Holistic assessment from a language model
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ModelAssessment {
    #[serde(default)]
    pub comprehension: Option<f64>,
    #[serde(default)]
    pub pronunciation: Option<f64>,
    #[serde(default)]
    pub strengths: Vec<String>,
    #[serde(default)]
    pub improvements: Vec<String>,
    #[serde(default)]
    pub recommendations: Vec<String>,
}

/// Capability-specific response
#[derive(Debug, Clone, PartialEq)]
pub enum ProviderResponse {
    Transcript(Transcript),
    Grammar(Vec<GrammarIssue>),
    Vocabulary(Vec<VocabularyItem>),
    Fluency(FluencyAssessment),
    Score(ModelAssessment),
    Reply(String),
}

impl ProviderResponse {
    pub fn capability(&self) -> Capability {
        match self {
            ProviderResponse::Transcript(_) => Capability::SpeechToText,
            ProviderResponse::Grammar(_) => Capability::GrammarAnalysis,
            ProviderResponse::Vocabulary(_) => Capability::VocabularyAnalysis,
            ProviderResponse::Fluency(_) => Capability::FluencyAnalysis,
            ProviderResponse::Score(_) | ProviderResponse::Reply(_) => {
                Capability::LanguageModelScoring
            }
        }
    }

    /// Whether this is the kind of response `request` asks for
    pub fn answers(&self, request: &ProviderRequest) -> bool {
        matches!(
            (request, self),
            (ProviderRequest::Transcribe { .. }, ProviderResponse::Transcript(_))
                | (ProviderRequest::Grammar { .. }, ProviderResponse::Grammar(_))
                | (ProviderRequest::Vocabulary { .. }, ProviderResponse::Vocabulary(_))
                | (ProviderRequest::Fluency { .. }, ProviderResponse::Fluency(_))
                | (ProviderRequest::Score { .. }, ProviderResponse::Score(_))
                | (ProviderRequest::Reply { .. }, ProviderResponse::Reply(_))
        )
    }
}

/// Analysis provider trait that all providers must implement
#[async_trait]
pub trait AnalysisProvider: Send + Sync {
    /// Unique name, matching the configuration entry
    fn name(&self) -> &str;

    /// Capabilities this provider serves
    fn capabilities(&self) -> &[Capability];

    /// Run one request
    async fn invoke(&self, request: &ProviderRequest) -> Result<ProviderResponse>;

    /// Check if the provider is currently reachable.
    /// Default implementation returns true.
    async fn check_health(&self) -> bool {
        true
    }
}

/// Build the concrete provider for a configuration entry
pub fn build_provider(config: &ProviderConfig) -> Result<Arc<dyn AnalysisProvider>> {
    let api_key = config.resolve_api_key();
    let model = config.model.clone();
    let capabilities = config.capabilities.clone();

    let provider: Arc<dyn AnalysisProvider> = match config.kind {
        ProviderKind::OpenAI => Arc::new(openai::OpenAIProvider::new(
            &config.name,
            &config.base_url,
            model.unwrap_or_else(|| "gpt-4o-mini".to_string()),
            api_key,
            capabilities,
        )?),
        ProviderKind::Ollama => Arc::new(ollama::OllamaProvider::new(
            &config.name,
            &config.base_url,
            model.unwrap_or_else(|| "llama3.1:8b".to_string()),
            capabilities,
        )?),
        ProviderKind::Whisper => Arc::new(whisper::WhisperProvider::new(
            &config.name,
            &config.base_url,
            model.unwrap_or_else(|| "whisper-1".to_string()),
            api_key,
        )?),
        ProviderKind::LanguageTool => Arc::new(languagetool::LanguageToolProvider::new(
            &config.name,
            &config.base_url,
        )?),
    };

    Ok(provider)
}

/// Build every configured provider, in configuration order
pub fn build_providers(config: &Config) -> Result<Vec<(ProviderConfig, Arc<dyn AnalysisProvider>)>> {
    config
        .providers
        .iter()
        .map(|entry| Ok((entry.clone(), build_provider(entry)?)))
        .collect()
}

/// Shared HTTP client construction
pub(crate) fn http_client() -> Result<reqwest::Client> {
    reqwest::Client::builder()
        .build()
        .map_err(|e| ProviderError::Unavailable(format!("failed to create HTTP client: {}", e)))
}

/// Join a base URL and a path without doubling slashes
pub(crate) fn endpoint(base_url: &str, path: &str) -> String {
    format!(
        "{}/{}",
        base_url.trim_end_matches('/'),
        path.trim_start_matches('/')
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_request_capability() {
        let request = ProviderRequest::Fluency {
            text: "hello".to_string(),
            duration_secs: 3.0,
        };
        assert_eq!(request.capability(), Capability::FluencyAnalysis);
    }

    #[test]
    fn test_reply_shares_model_capability_but_not_kind() {
        let request = ProviderRequest::Reply {
            text: "hello".to_string(),
            topic: None,
            level: CefrLevel::A2,
            strengths: vec![],
            improvements: vec![],
        };
        let reply = ProviderResponse::Reply("Hi! How was your day?".to_string());
        let score = ProviderResponse::Score(ModelAssessment::default());

        assert_eq!(request.capability(), Capability::LanguageModelScoring);
        assert_eq!(reply.capability(), score.capability());
        assert!(reply.answers(&request));
        assert!(!score.answers(&request));
    }

    #[test]
    fn test_mean_confidence() {
        let transcript = Transcript {
            text: "a b".to_string(),
            segments: vec![
                TranscriptSegment {
                    text: "a".to_string(),
                    confidence: 0.9,
                },
                TranscriptSegment {
                    text: "b".to_string(),
                    confidence: 0.5,
                },
            ],
        };
        let mean = transcript.mean_confidence().unwrap();
        assert!((mean - 0.7).abs() < 1e-9);

        let empty = Transcript {
            text: String::new(),
            segments: vec![],
        };
        assert!(empty.mean_confidence().is_none());
    }

    #[test]
    fn test_status_mapping() {
        use reqwest::StatusCode;

        assert!(matches!(
            ProviderError::from_status(StatusCode::UNAUTHORIZED, String::new()),
            ProviderError::Authentication(_)
        ));
        assert_eq!(
            ProviderError::from_status(StatusCode::TOO_MANY_REQUESTS, String::new()),
            ProviderError::RateLimited
        );
        assert!(matches!(
            ProviderError::from_status(StatusCode::BAD_GATEWAY, "down".to_string()),
            ProviderError::Unavailable(_)
        ));
    }

    #[test]
    fn test_endpoint_join() {
        assert_eq!(
            endpoint("http://host/v1/", "/chat/completions"),
            "http://host/v1/chat/completions"
        );
    }

    #[test]
    fn test_build_provider_from_default_config() {
        let config = Config::default_config();
        for entry in &config.providers {
            let provider = build_provider(entry).unwrap();
            assert_eq!(provider.name(), entry.name);
            assert_eq!(provider.capabilities(), entry.capabilities.as_slice());
        }
    }
}
