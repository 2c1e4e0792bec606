//! Evaluation orchestrator
//!
//! Runs one conversation through transcription, concurrent analysis and
//! scoring. Each capability walks its provider fallback chain, best priority
//! first, and falls back to the local heuristics when every provider failed,
//! timed out or was rate limited. Provider trouble never aborts an
//! evaluation; only contract violations and cancellation reach the caller.

mod result;
mod state;

pub use result::{
    AudioSource, ConversationInput, EvaluationResult, GrammarError, ScoreSource,
};
pub use state::EvaluationState;

use async_trait::async_trait;
use chrono::Utc;
use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::analysis::{
    analyze_vocabulary, check_grammar, comprehension_score, fluency_score, follow_up,
    generate_feedback, pronunciation_score, tokenize, vocabulary_score, words_per_minute,
};
use crate::config::EvaluationConfig;
use crate::message_bus::{Event, MessageBus};
use crate::providers::{
    AudioData, GrammarIssue, ModelAssessment, ProviderError, ProviderRegistry, ProviderRequest,
    ProviderResponse, Transcript, VocabularyItem,
};
use crate::scoring::{compute_overall, grammar_score, SubScore};
use sdk::errors::EngineError;
use sdk::types::{Capability, CefrLevel, Dimension};

/// Improvement note added when speech-to-text produced nothing
pub const UNTRANSCRIBED_NOTE: &str =
    "The audio could not be transcribed, so the evaluation is based on an empty transcript";

/// Receives completed evaluations
#[async_trait]
pub trait EvaluationSink: Send + Sync {
    async fn store(&self, result: &EvaluationResult) -> Result<(), EngineError>;
}

/// Tracks the lifecycle of one evaluation and publishes every transition
struct Lifecycle<'a> {
    conversation_id: &'a str,
    state: EvaluationState,
    bus: Option<&'a MessageBus>,
}

impl Lifecycle<'_> {
    async fn advance(&mut self, next: EvaluationState) -> Result<(), EngineError> {
        let from = self.state;
        self.state = from.transition(next)?;
        debug!("Evaluation {}: {} -> {}", self.conversation_id, from, next);

        if let Some(bus) = self.bus {
            bus.publish(Event::StateChanged {
                conversation_id: self.conversation_id.to_string(),
                from,
                to: next,
            })
            .await;
        }
        Ok(())
    }
}

/// What the provider stage produced for one capability
struct Served<T> {
    value: T,
    provider: String,
}

pub struct EvaluationOrchestrator {
    registry: Arc<ProviderRegistry>,
    bus: Option<Arc<MessageBus>>,
    provider_timeout: Duration,
    request_timeout: Option<Duration>,
    language: String,
}

impl EvaluationOrchestrator {
    pub fn new(registry: Arc<ProviderRegistry>, settings: &EvaluationConfig) -> Self {
        Self {
            registry,
            bus: None,
            provider_timeout: settings.provider_timeout(),
            request_timeout: settings.request_timeout(),
            language: settings.language.clone(),
        }
    }

    /// Publish lifecycle and fallback events on `bus`
    pub fn with_bus(mut self, bus: Arc<MessageBus>) -> Self {
        self.bus = Some(bus);
        self
    }

    pub fn registry(&self) -> &ProviderRegistry {
        &self.registry
    }

    /// Evaluate one conversation.
    ///
    /// Cancelling `cancel` (or exceeding the configured request timeout)
    /// drops all in-flight provider calls and yields
    /// [`EngineError::Cancelled`]; a partial result is never returned.
    pub async fn evaluate(
        &self,
        input: ConversationInput,
        cancel: CancellationToken,
    ) -> Result<EvaluationResult, EngineError> {
        input.validate()?;

        let mut lifecycle = Lifecycle {
            conversation_id: &input.id,
            state: EvaluationState::Pending,
            bus: self.bus.as_deref(),
        };
        info!("Evaluating conversation {}", input.id);

        let outcome = tokio::select! {
            biased;
            _ = cancel.cancelled() => Err(EngineError::Cancelled),
            _ = deadline(self.request_timeout) => {
                warn!("Evaluation {} exceeded the request timeout", input.id);
                Err(EngineError::Cancelled)
            }
            result = self.run(&input, &mut lifecycle, &cancel) => result,
        };

        match outcome {
            Ok(result) => {
                info!(
                    "Evaluation {} completed: {:.2} ({})",
                    input.id, result.overall_score, result.level
                );
                self.publish(Event::EvaluationCompleted {
                    conversation_id: input.id.clone(),
                    overall_score: result.overall_score,
                    level: result.level,
                })
                .await;
                Ok(result)
            }
            Err(err) => {
                let terminal = if matches!(err, EngineError::Cancelled) {
                    info!("Evaluation {} cancelled", input.id);
                    EvaluationState::Cancelled
                } else {
                    error!("Evaluation {} failed: {}", input.id, err);
                    EvaluationState::Failed
                };
                if !lifecycle.state.is_terminal() {
                    lifecycle.advance(terminal).await?;
                }
                self.publish(Event::EvaluationFailed {
                    conversation_id: input.id.clone(),
                    error: err.to_string(),
                })
                .await;
                Err(err)
            }
        }
    }

    /// Evaluate and hand the result to `sink` before returning it
    pub async fn evaluate_into(
        &self,
        input: ConversationInput,
        cancel: CancellationToken,
        sink: &dyn EvaluationSink,
    ) -> Result<EvaluationResult, EngineError> {
        let result = self.evaluate(input, cancel).await?;
        sink.store(&result).await?;
        Ok(result)
    }

    async fn run(
        &self,
        input: &ConversationInput,
        lifecycle: &mut Lifecycle<'_>,
        cancel: &CancellationToken,
    ) -> Result<EvaluationResult, EngineError> {
        let id = input.id.as_str();
        let mut notes = Vec::new();

        let (text, confidence) = if input.needs_transcription() {
            lifecycle.advance(EvaluationState::Transcribing).await?;
            match self.transcribe(input).await? {
                Some(transcript) => {
                    let confidence = transcript.mean_confidence();
                    (transcript.text, confidence)
                }
                None => {
                    warn!("Evaluation {} continues without a transcript", id);
                    notes.push(UNTRANSCRIBED_NOTE.to_string());
                    (String::new(), None)
                }
            }
        } else {
            (input.transcript.clone().unwrap_or_default(), None)
        };

        lifecycle.advance(EvaluationState::Analyzing).await?;

        let (grammar, vocabulary, fluency, assessment) = if text.trim().is_empty() {
            debug!("Evaluation {} has no text, skipping providers", id);
            (None, None, None, None)
        } else {
            tokio::join!(
                self.dispatch(id, ProviderRequest::Grammar {
                    text: text.clone(),
                    language: self.language.clone(),
                }),
                self.dispatch(id, ProviderRequest::Vocabulary { text: text.clone() }),
                self.dispatch(id, ProviderRequest::Fluency {
                    text: text.clone(),
                    duration_secs: input.duration_secs,
                }),
                self.dispatch(id, ProviderRequest::Score {
                    text: text.clone(),
                    topic: input.topic.clone(),
                    target_level: input.target_level,
                }),
            )
        };

        let mut subscores = Vec::with_capacity(Dimension::ALL.len());
        let mut sources = BTreeMap::new();
        let word_count = tokenize(&text).len();

        // Grammar: errors from a provider or the local checker, score derived locally
        let (issues, source) = match grammar.and_then(grammar_issues) {
            Some(served) => (served.value, ScoreSource::Provider(served.provider)),
            None => (check_grammar(&text), ScoreSource::Local),
        };
        subscores.push(SubScore::clamped(
            Dimension::Grammar,
            grammar_score(issues.len(), word_count),
        ));
        sources.insert(Dimension::Grammar, source);

        let (items, source) = match vocabulary.and_then(vocabulary_items) {
            Some(served) => (served.value, ScoreSource::Provider(served.provider)),
            None => (analyze_vocabulary(&text), ScoreSource::Local),
        };
        subscores.push(SubScore::clamped(
            Dimension::Vocabulary,
            vocabulary_score(&text, &items),
        ));
        sources.insert(Dimension::Vocabulary, source);

        let measured_wpm = (input.duration_secs > 0.0)
            .then(|| words_per_minute(word_count, Some(input.duration_secs)));
        let (fluency_value, wpm, source) = match fluency {
            Some(Served {
                value: ProviderResponse::Fluency(assessment),
                provider,
            }) => (
                assessment.score,
                assessment.words_per_minute.filter(|w| w.is_finite()).or(measured_wpm),
                ScoreSource::Provider(provider),
            ),
            _ => (
                fluency_score(&text, Some(input.duration_secs)),
                measured_wpm,
                ScoreSource::Local,
            ),
        };
        subscores.push(SubScore::clamped(Dimension::Fluency, fluency_value));
        sources.insert(Dimension::Fluency, source);

        let (assessment, model) = match assessment.and_then(model_assessment) {
            Some(served) => (served.value, Some(served.provider)),
            None => (ModelAssessment::default(), None),
        };

        let (value, source) = match (assessment.pronunciation, &model) {
            (Some(value), Some(name)) => (value, ScoreSource::Provider(name.clone())),
            _ => (pronunciation_score(confidence), ScoreSource::Local),
        };
        subscores.push(SubScore::clamped(Dimension::Pronunciation, value));
        sources.insert(Dimension::Pronunciation, source);

        let (value, source) = match (assessment.comprehension, &model) {
            (Some(value), Some(name)) => (value, ScoreSource::Provider(name.clone())),
            _ => (comprehension_score(&text), ScoreSource::Local),
        };
        subscores.push(SubScore::clamped(Dimension::Comprehension, value));
        sources.insert(Dimension::Comprehension, source);

        if cancel.is_cancelled() {
            return Err(EngineError::Cancelled);
        }
        lifecycle.advance(EvaluationState::Scoring).await?;

        let (overall_score, level) = compute_overall(&subscores)?;

        let local = generate_feedback(&subscores, &issues);
        let strengths = non_empty_or(assessment.strengths, local.strengths);
        let mut improvements = non_empty_or(assessment.improvements, local.improvements);
        let recommendations = non_empty_or(assessment.recommendations, local.recommendations);
        notes.append(&mut improvements);

        let follow_up = self
            .follow_up(input, &text, level, &strengths, &notes)
            .await;

        let result = EvaluationResult {
            conversation_id: input.id.clone(),
            transcript: text,
            topic: input.topic.clone(),
            target_level: input.target_level,
            subscores,
            overall_score,
            level,
            strengths,
            improvements: notes,
            recommendations,
            follow_up,
            grammar_errors: issues.into_iter().map(Into::into).collect(),
            vocabulary: items,
            sources,
            words_per_minute: wpm,
            evaluated_at: Utc::now(),
        };

        lifecycle.advance(EvaluationState::Completed).await?;
        Ok(result)
    }

    /// Tutor reply from a language model, or the local template for `level`
    async fn follow_up(
        &self,
        input: &ConversationInput,
        text: &str,
        level: CefrLevel,
        strengths: &[String],
        improvements: &[String],
    ) -> String {
        let local = || follow_up(level, input.topic.as_deref());
        if text.trim().is_empty() {
            return local();
        }

        let request = ProviderRequest::Reply {
            text: text.to_string(),
            topic: input.topic.clone(),
            level,
            strengths: strengths.to_vec(),
            improvements: improvements.to_vec(),
        };
        match self.dispatch(&input.id, request).await {
            Some(Served {
                value: ProviderResponse::Reply(reply),
                ..
            }) if !reply.trim().is_empty() => reply.trim().to_string(),
            _ => local(),
        }
    }

    /// Speech-to-text over the provider chain. `None` when no provider could
    /// transcribe the audio; there is no local recogniser.
    async fn transcribe(&self, input: &ConversationInput) -> Result<Option<Transcript>, EngineError> {
        let audio = match &input.audio {
            Some(AudioSource::File(path)) => AudioData {
                bytes: tokio::fs::read(path).await.map_err(|e| {
                    EngineError::InvalidInput(format!(
                        "cannot read audio file {}: {}",
                        path.display(),
                        e
                    ))
                })?,
                file_name: path
                    .file_name()
                    .map(|n| n.to_string_lossy().into_owned())
                    .unwrap_or_else(|| "audio.wav".to_string()),
            },
            Some(AudioSource::Bytes { data, file_name }) => AudioData {
                bytes: data.clone(),
                file_name: file_name.clone(),
            },
            None => return Ok(None),
        };

        let request = ProviderRequest::Transcribe {
            audio: Arc::new(audio),
            language: self.language.clone(),
        };

        Ok(match self.dispatch(&input.id, request).await {
            Some(Served {
                value: ProviderResponse::Transcript(transcript),
                ..
            }) => Some(transcript),
            _ => None,
        })
    }

    /// Walk the fallback chain for one request.
    ///
    /// At most one attempt per enabled provider. Errors, timeouts and
    /// responses of the wrong kind all move on to the next provider.
    /// `None` means the caller should use its local fallback.
    async fn dispatch(
        &self,
        conversation_id: &str,
        request: ProviderRequest,
    ) -> Option<Served<ProviderResponse>> {
        let capability = request.capability();
        let attempts = self.registry.enabled_count(capability);
        let mut tried = Vec::with_capacity(attempts);

        for _ in 0..attempts {
            let provider = match self.registry.acquire(capability, &mut tried) {
                Ok(provider) => provider,
                Err(e) => {
                    debug!("{}", e);
                    break;
                }
            };
            let name = provider.name().to_string();
            let limit = self
                .registry
                .timeout_override(&name)
                .unwrap_or(self.provider_timeout);
            debug!("Attempting provider {} for {} (timeout: {:?})", name, capability, limit);

            let failure = match tokio::time::timeout(limit, provider.invoke(&request)).await {
                Ok(Ok(response)) if response.answers(&request) => {
                    debug!("Provider {} served {}", name, capability);
                    return Some(Served {
                        value: response,
                        provider: name,
                    });
                }
                Ok(Ok(_)) => ProviderError::InvalidResponse(format!(
                    "response of the wrong kind for {}",
                    capability
                )),
                Ok(Err(e)) => e,
                Err(_) => ProviderError::Timeout,
            };

            warn!("Provider {} failed for {}: {}", name, capability, failure);
            self.publish(Event::ProviderFailed {
                conversation_id: conversation_id.to_string(),
                capability,
                provider: name,
                error: failure.to_string(),
            })
            .await;
        }

        info!("No provider served {}, using local analysis", capability);
        self.publish(Event::LocalFallback {
            conversation_id: conversation_id.to_string(),
            capability,
        })
        .await;
        None
    }

    async fn publish(&self, event: Event) {
        if let Some(bus) = &self.bus {
            bus.publish(event).await;
        }
    }
}

async fn deadline(limit: Option<Duration>) {
    match limit {
        Some(limit) => tokio::time::sleep(limit).await,
        None => std::future::pending().await,
    }
}

fn grammar_issues(served: Served<ProviderResponse>) -> Option<Served<Vec<GrammarIssue>>> {
    match served.value {
        ProviderResponse::Grammar(issues) => Some(Served {
            value: issues,
            provider: served.provider,
        }),
        _ => None,
    }
}

fn vocabulary_items(served: Served<ProviderResponse>) -> Option<Served<Vec<VocabularyItem>>> {
    match served.value {
        ProviderResponse::Vocabulary(items) => Some(Served {
            value: items,
            provider: served.provider,
        }),
        _ => None,
    }
}

fn model_assessment(served: Served<ProviderResponse>) -> Option<Served<ModelAssessment>> {
    match served.value {
        ProviderResponse::Score(assessment) => Some(Served {
            value: assessment,
            provider: served.provider,
        }),
        _ => None,
    }
}

fn non_empty_or(primary: Vec<String>, fallback: Vec<String>) -> Vec<String> {
    let primary: Vec<String> = primary
        .into_iter()
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
        .collect();
    if primary.is_empty() {
        fallback
    } else {
        primary
    }
}
