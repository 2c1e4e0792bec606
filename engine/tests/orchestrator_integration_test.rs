//! Integration tests for the evaluation orchestrator
//!
//! Providers are in-process fakes so every fallback path can be driven
//! deterministically: failures, timeouts, rate limits, cancellation and
//! complete provider outages.

use async_trait::async_trait;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio_util::sync::CancellationToken;

use lexis_engine::analysis::follow_up;
use lexis_engine::config::{EvaluationConfig, ProviderConfig, ProviderKind};
use lexis_engine::message_bus::{Event, EventType, MessageBus};
use lexis_engine::orchestrator::{
    AudioSource, ConversationInput, EvaluationOrchestrator, EvaluationResult, EvaluationSink,
    EvaluationState, ScoreSource, UNTRANSCRIBED_NOTE,
};
use lexis_engine::providers::{
    AnalysisProvider, FluencyAssessment, ModelAssessment, ProviderError, ProviderRegistry,
    ProviderRequest, ProviderResponse, Result as ProviderResult, Transcript, TranscriptSegment,
};
use lexis_engine::rate_limiter::{Clock, ManualClock};
use sdk::errors::EngineError;
use sdk::types::{Capability, CefrLevel, Dimension, Severity};

enum Behavior {
    Respond(ProviderResponse),
    Fail(ProviderError),
    Hang,
}

struct ScriptedProvider {
    name: String,
    capabilities: Vec<Capability>,
    behavior: Behavior,
    calls: AtomicUsize,
}

#[async_trait]
impl AnalysisProvider for ScriptedProvider {
    fn name(&self) -> &str {
        &self.name
    }

    fn capabilities(&self) -> &[Capability] {
        &self.capabilities
    }

    async fn invoke(&self, _request: &ProviderRequest) -> ProviderResult<ProviderResponse> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        match &self.behavior {
            Behavior::Respond(response) => Ok(response.clone()),
            Behavior::Fail(err) => Err(err.clone()),
            Behavior::Hang => {
                tokio::time::sleep(Duration::from_secs(3600)).await;
                Err(ProviderError::Timeout)
            }
        }
    }
}

struct Harness {
    providers: Vec<(ProviderConfig, Arc<ScriptedProvider>)>,
    settings: EvaluationConfig,
}

impl Harness {
    fn new() -> Self {
        Self {
            providers: Vec::new(),
            settings: EvaluationConfig::default(),
        }
    }

    fn provider(
        mut self,
        name: &str,
        capability: Capability,
        priority: i32,
        rpm: u32,
        behavior: Behavior,
    ) -> Self {
        let config = ProviderConfig {
            name: name.to_string(),
            kind: ProviderKind::Ollama,
            capabilities: vec![capability],
            enabled: true,
            requests_per_minute: rpm,
            priority,
            cost_weight: 0.0,
            base_url: "http://localhost".to_string(),
            model: None,
            api_key_env: None,
            timeout_secs: None,
        };
        let provider = Arc::new(ScriptedProvider {
            name: name.to_string(),
            capabilities: vec![capability],
            behavior,
            calls: AtomicUsize::new(0),
        });
        self.providers.push((config, provider));
        self
    }

    fn calls(&self, name: &str) -> usize {
        self.providers
            .iter()
            .find(|(c, _)| c.name == name)
            .map(|(_, p)| p.calls.load(Ordering::SeqCst))
            .unwrap_or(0)
    }

    fn build(&self) -> EvaluationOrchestrator {
        let clock: Arc<dyn Clock> = Arc::new(ManualClock::new());
        let mut registry = ProviderRegistry::new(clock);
        for (config, provider) in &self.providers {
            registry
                .register(config.clone(), Arc::clone(provider) as Arc<dyn AnalysisProvider>)
                .unwrap();
        }
        EvaluationOrchestrator::new(Arc::new(registry), &self.settings)
    }
}

fn unavailable() -> Behavior {
    Behavior::Fail(ProviderError::Unavailable("connection refused".to_string()))
}

#[derive(Default)]
struct MemorySink {
    stored: Mutex<Vec<EvaluationResult>>,
}

#[async_trait]
impl EvaluationSink for MemorySink {
    async fn store(&self, result: &EvaluationResult) -> Result<(), EngineError> {
        self.stored.lock().unwrap().push(result.clone());
        Ok(())
    }
}

#[tokio::test]
async fn test_all_providers_unavailable_uses_local_heuristics() {
    let harness = Harness::new()
        .provider("grammar-a", Capability::GrammarAnalysis, 2, 10, unavailable())
        .provider("grammar-b", Capability::GrammarAnalysis, 1, 10, unavailable())
        .provider("vocab", Capability::VocabularyAnalysis, 1, 10, unavailable())
        .provider("fluency", Capability::FluencyAnalysis, 1, 10, unavailable())
        .provider("model", Capability::LanguageModelScoring, 1, 10, unavailable());
    let orchestrator = harness.build();

    let input = ConversationInput::from_transcript("conv-1", "I go to school yesterday");
    let result = orchestrator
        .evaluate(input, CancellationToken::new())
        .await
        .unwrap();

    // Every provider in every chain was tried once; the model chain runs
    // for the assessment and again for the tutor reply
    assert_eq!(harness.calls("grammar-a"), 1);
    assert_eq!(harness.calls("grammar-b"), 1);
    assert_eq!(harness.calls("model"), 2);

    assert_eq!(result.subscores.len(), Dimension::ALL.len());
    for dimension in Dimension::ALL {
        assert_eq!(result.source(dimension), Some(&ScoreSource::Local));
        let value = result.score(dimension).unwrap();
        assert!(value >= 0.0 && value <= dimension.max_points());
    }

    assert_eq!(result.grammar_errors.len(), 1);
    let error = &result.grammar_errors[0];
    assert_eq!(error.error_type, "verb-tense");
    assert_eq!(error.severity, Severity::Critical);
    assert_eq!((error.start, error.end), (2, 4));

    // 1 error in 5 words is a 20% error rate
    assert_eq!(result.score(Dimension::Grammar), Some(10.0));
    assert_eq!(result.score(Dimension::Pronunciation), Some(7.5));

    let sum: f64 = result.subscores.iter().map(|s| s.value).sum();
    assert!((result.overall_score - sum).abs() < 0.01);
    assert!(!result.strengths.is_empty());
    assert!(!result.improvements.is_empty());
    assert!(!result.recommendations.is_empty());
    assert_eq!(result.follow_up, follow_up(result.level, None));
}

#[tokio::test]
async fn test_no_providers_registered() {
    let orchestrator = Harness::new().build();
    let input = ConversationInput::from_transcript("conv-2", "Hello, how are you today?");

    let result = orchestrator
        .evaluate(input, CancellationToken::new())
        .await
        .unwrap();
    assert!(result.sources.values().all(|s| *s == ScoreSource::Local));
}

#[tokio::test]
async fn test_provider_values_and_feedback_are_used() {
    let assessment = ModelAssessment {
        comprehension: Some(18.0),
        pronunciation: None,
        strengths: vec!["Clear structure".to_string()],
        improvements: vec![],
        recommendations: vec!["Read more news articles".to_string()],
    };
    let harness = Harness::new()
        .provider(
            "model",
            Capability::LanguageModelScoring,
            5,
            10,
            Behavior::Respond(ProviderResponse::Score(assessment)),
        )
        .provider(
            "fluency",
            Capability::FluencyAnalysis,
            5,
            10,
            Behavior::Respond(ProviderResponse::Fluency(FluencyAssessment {
                score: 16.5,
                words_per_minute: None,
            })),
        );
    let orchestrator = harness.build();

    let input = ConversationInput::from_transcript(
        "conv-3",
        "Last summer I travelled to Portugal with my family and we visited Lisbon.",
    )
    .with_duration(6.0)
    .with_topic("Travel")
    .with_target_level(CefrLevel::B1);

    let result = orchestrator
        .evaluate(input, CancellationToken::new())
        .await
        .unwrap();

    assert_eq!(result.score(Dimension::Comprehension), Some(18.0));
    assert_eq!(
        result.source(Dimension::Comprehension),
        Some(&ScoreSource::Provider("model".to_string()))
    );
    // Missing pronunciation falls back locally without transcription confidences
    assert_eq!(result.score(Dimension::Pronunciation), Some(7.5));
    assert_eq!(result.source(Dimension::Pronunciation), Some(&ScoreSource::Local));

    assert_eq!(result.score(Dimension::Fluency), Some(16.5));
    // 13 words in 6 seconds
    let wpm = result.words_per_minute.unwrap();
    assert!((wpm - 130.0).abs() < 1e-6);

    assert_eq!(result.strengths, vec!["Clear structure".to_string()]);
    assert_eq!(result.recommendations, vec!["Read more news articles".to_string()]);
    // Empty improvements list falls back to local feedback
    assert!(!result.improvements.is_empty());

    assert_eq!(result.topic.as_deref(), Some("Travel"));
    assert_eq!(result.target_level, Some(CefrLevel::B1));
}

#[tokio::test]
async fn test_timeout_moves_to_next_provider() {
    let mut harness = Harness::new()
        .provider("slow", Capability::FluencyAnalysis, 2, 10, Behavior::Hang)
        .provider(
            "fast",
            Capability::FluencyAnalysis,
            1,
            10,
            Behavior::Respond(ProviderResponse::Fluency(FluencyAssessment {
                score: 12.0,
                words_per_minute: Some(110.0),
            })),
        );
    harness.settings.provider_timeout_secs = 1;
    let orchestrator = harness.build();

    let input = ConversationInput::from_transcript("conv-4", "We played football after school.");
    let result = orchestrator
        .evaluate(input, CancellationToken::new())
        .await
        .unwrap();

    assert_eq!(harness.calls("slow"), 1);
    assert_eq!(
        result.source(Dimension::Fluency),
        Some(&ScoreSource::Provider("fast".to_string()))
    );
    assert_eq!(result.score(Dimension::Fluency), Some(12.0));
}

#[tokio::test]
async fn test_rate_limited_provider_is_skipped() {
    let harness = Harness::new().provider(
        "model",
        Capability::LanguageModelScoring,
        1,
        1,
        Behavior::Respond(ProviderResponse::Score(ModelAssessment {
            comprehension: Some(15.0),
            ..Default::default()
        })),
    );
    let orchestrator = harness.build();

    let first = orchestrator
        .evaluate(
            ConversationInput::from_transcript("conv-5a", "I enjoy cooking pasta at home."),
            CancellationToken::new(),
        )
        .await
        .unwrap();
    let second = orchestrator
        .evaluate(
            ConversationInput::from_transcript("conv-5b", "I enjoy cooking pasta at home."),
            CancellationToken::new(),
        )
        .await
        .unwrap();

    assert_eq!(harness.calls("model"), 1);
    assert_eq!(
        first.source(Dimension::Comprehension),
        Some(&ScoreSource::Provider("model".to_string()))
    );
    assert_eq!(second.source(Dimension::Comprehension), Some(&ScoreSource::Local));
}

#[tokio::test]
async fn test_cancel_before_scoring_yields_cancelled() {
    let harness =
        Harness::new().provider("stuck", Capability::GrammarAnalysis, 1, 10, Behavior::Hang);
    let bus = Arc::new(MessageBus::new());
    let orchestrator = harness.build().with_bus(Arc::clone(&bus));
    let mut events = bus.subscribe(EventType::All).await;

    let cancel = CancellationToken::new();
    let trigger = cancel.clone();
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(100)).await;
        trigger.cancel();
    });

    let input = ConversationInput::from_transcript("conv-6", "She have two brothers.");
    let err = orchestrator.evaluate(input, cancel).await.unwrap_err();
    assert!(matches!(err, EngineError::Cancelled));

    let mut states = Vec::new();
    let mut completed = false;
    while let Ok(event) = events.try_recv() {
        match event {
            Event::StateChanged { to, .. } => states.push(to),
            Event::EvaluationCompleted { .. } => completed = true,
            _ => {}
        }
    }
    assert!(!completed);
    assert!(!states.contains(&EvaluationState::Scoring));
    assert!(!states.contains(&EvaluationState::Completed));
    assert_eq!(states.last(), Some(&EvaluationState::Cancelled));
}

#[tokio::test]
async fn test_request_timeout_cancels_evaluation() {
    let mut harness =
        Harness::new().provider("stuck", Capability::VocabularyAnalysis, 1, 10, Behavior::Hang);
    harness.settings.request_timeout_secs = 1;
    let orchestrator = harness.build();

    let input = ConversationInput::from_transcript("conv-7", "Nice weather today.");
    let err = orchestrator
        .evaluate(input, CancellationToken::new())
        .await
        .unwrap_err();
    assert!(matches!(err, EngineError::Cancelled));
}

#[tokio::test]
async fn test_transcription_confidence_drives_pronunciation() {
    let transcript = Transcript {
        text: "I would like a cup of coffee please".to_string(),
        segments: vec![
            TranscriptSegment {
                text: "I would like a cup".to_string(),
                confidence: 0.9,
            },
            TranscriptSegment {
                text: "of coffee please".to_string(),
                confidence: 0.7,
            },
        ],
    };
    let harness = Harness::new().provider(
        "whisper",
        Capability::SpeechToText,
        1,
        10,
        Behavior::Respond(ProviderResponse::Transcript(transcript)),
    );
    let orchestrator = harness.build();

    let audio = AudioSource::Bytes {
        data: vec![0u8; 64],
        file_name: "sample.wav".to_string(),
    };
    let input = ConversationInput::from_audio("conv-8", audio).with_duration(4.0);
    let result = orchestrator
        .evaluate(input, CancellationToken::new())
        .await
        .unwrap();

    assert_eq!(result.transcript, "I would like a cup of coffee please");
    let pronunciation = result.score(Dimension::Pronunciation).unwrap();
    assert!((pronunciation - 12.0).abs() < 1e-9);
}

#[tokio::test]
async fn test_failed_transcription_degrades_gracefully() {
    let harness = Harness::new().provider("whisper", Capability::SpeechToText, 1, 10, unavailable());
    let orchestrator = harness.build();

    let audio = AudioSource::Bytes {
        data: vec![1, 2, 3],
        file_name: "clip.mp3".to_string(),
    };
    let result = orchestrator
        .evaluate(
            ConversationInput::from_audio("conv-9", audio),
            CancellationToken::new(),
        )
        .await
        .unwrap();

    assert_eq!(result.transcript, "");
    assert_eq!(result.improvements[0], UNTRANSCRIBED_NOTE);
    assert_eq!(result.score(Dimension::Vocabulary), Some(0.0));
    assert_eq!(result.score(Dimension::Fluency), Some(0.0));
    assert_eq!(result.score(Dimension::Comprehension), Some(0.0));
    assert_eq!(result.score(Dimension::Pronunciation), Some(7.5));
}

#[tokio::test]
async fn test_missing_audio_file_is_invalid_input() {
    let orchestrator = Harness::new().build();
    let input = ConversationInput::from_audio(
        "conv-10",
        AudioSource::File("/nonexistent/lexis/audio.wav".into()),
    );

    let err = orchestrator
        .evaluate(input, CancellationToken::new())
        .await
        .unwrap_err();
    assert!(matches!(err, EngineError::InvalidInput(_)));
}

#[tokio::test]
async fn test_sink_receives_result() {
    let orchestrator = Harness::new().build();
    let sink = MemorySink::default();

    let result = orchestrator
        .evaluate_into(
            ConversationInput::from_transcript("conv-11", "My favourite season is autumn."),
            CancellationToken::new(),
            &sink,
        )
        .await
        .unwrap();

    let stored = sink.stored.lock().unwrap();
    assert_eq!(stored.len(), 1);
    assert_eq!(stored[0], result);
}

#[tokio::test]
async fn test_events_follow_lifecycle() {
    let harness = Harness::new().provider(
        "grammar",
        Capability::GrammarAnalysis,
        1,
        10,
        Behavior::Fail(ProviderError::RateLimited),
    );
    let bus = Arc::new(MessageBus::new());
    let orchestrator = harness.build().with_bus(Arc::clone(&bus));
    let mut events = bus.subscribe(EventType::All).await;

    orchestrator
        .evaluate(
            ConversationInput::from_transcript("conv-12", "They is happy."),
            CancellationToken::new(),
        )
        .await
        .unwrap();

    let mut states = Vec::new();
    let mut failures = Vec::new();
    let mut fallbacks = Vec::new();
    while let Ok(event) = events.try_recv() {
        assert_eq!(event.conversation_id(), "conv-12");
        match event {
            Event::StateChanged { to, .. } => states.push(to),
            Event::ProviderFailed { provider, .. } => failures.push(provider),
            Event::LocalFallback { capability, .. } => fallbacks.push(capability),
            _ => {}
        }
    }

    assert_eq!(
        states,
        vec![
            EvaluationState::Analyzing,
            EvaluationState::Scoring,
            EvaluationState::Completed
        ]
    );
    assert_eq!(failures, vec!["grammar".to_string()]);
    // Four analysis chains plus the tutor reply
    assert_eq!(fallbacks.len(), 5);
}

#[tokio::test]
async fn test_model_reply_becomes_follow_up() {
    let harness = Harness::new()
        .provider(
            "tutor",
            Capability::LanguageModelScoring,
            5,
            10,
            Behavior::Respond(ProviderResponse::Reply(
                " Portugal sounds wonderful! What did you eat in Lisbon? ".to_string(),
            )),
        )
        .provider(
            "model",
            Capability::LanguageModelScoring,
            1,
            10,
            Behavior::Respond(ProviderResponse::Score(ModelAssessment {
                comprehension: Some(17.0),
                ..Default::default()
            })),
        );
    let orchestrator = harness.build();

    let input = ConversationInput::from_transcript(
        "conv-13",
        "Last summer I travelled to Portugal and visited Lisbon.",
    )
    .with_topic("Travel");
    let result = orchestrator
        .evaluate(input, CancellationToken::new())
        .await
        .unwrap();

    assert_eq!(
        result.follow_up,
        "Portugal sounds wonderful! What did you eat in Lisbon?"
    );
    // The reply-only provider is passed over for the assessment
    assert_eq!(
        result.source(Dimension::Comprehension),
        Some(&ScoreSource::Provider("model".to_string()))
    );
    assert_eq!(harness.calls("tutor"), 2);
    assert_eq!(harness.calls("model"), 1);
}

#[tokio::test]
async fn test_local_follow_up_matches_level_and_topic() {
    let harness = Harness::new().provider(
        "model",
        Capability::LanguageModelScoring,
        1,
        10,
        Behavior::Fail(ProviderError::Timeout),
    );
    let orchestrator = harness.build();

    let short = orchestrator
        .evaluate(
            ConversationInput::from_transcript("conv-14a", "I like dogs.").with_topic("Pets"),
            CancellationToken::new(),
        )
        .await
        .unwrap();
    assert_eq!(short.follow_up, follow_up(short.level, Some("Pets")));
    assert!(short.follow_up.contains("pets"));

    // Nothing to reply to: no provider is asked
    let calls_before = harness.calls("model");
    let audio = AudioSource::Bytes {
        data: vec![1, 2, 3],
        file_name: "clip.wav".to_string(),
    };
    let silent = orchestrator
        .evaluate(
            ConversationInput::from_audio("conv-14b", audio),
            CancellationToken::new(),
        )
        .await
        .unwrap();
    assert_eq!(harness.calls("model"), calls_before);
    assert_eq!(silent.follow_up, follow_up(silent.level, None));
}

#[tokio::test]
async fn test_supplied_transcript_skips_speech_to_text() {
    let harness = Harness::new().provider(
        "whisper",
        Capability::SpeechToText,
        1,
        10,
        Behavior::Respond(ProviderResponse::Transcript(Transcript {
            text: "something else entirely".to_string(),
            segments: vec![],
        })),
    );
    let bus = Arc::new(MessageBus::new());
    let orchestrator = harness.build().with_bus(Arc::clone(&bus));
    let mut events = bus.subscribe(EventType::All).await;

    let audio = AudioSource::Bytes {
        data: vec![0u8; 16],
        file_name: "lesson.wav".to_string(),
    };
    let input = ConversationInput::from_transcript("conv-15", "We cooked dinner together.")
        .with_audio(audio);
    let result = orchestrator
        .evaluate(input, CancellationToken::new())
        .await
        .unwrap();

    assert_eq!(harness.calls("whisper"), 0);
    assert_eq!(result.transcript, "We cooked dinner together.");
    assert_eq!(result.score(Dimension::Pronunciation), Some(7.5));

    while let Ok(event) = events.try_recv() {
        if let Event::StateChanged { to, .. } = event {
            assert_ne!(to, EvaluationState::Transcribing);
        }
    }
}
