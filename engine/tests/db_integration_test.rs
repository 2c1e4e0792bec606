//! Integration tests for evaluation storage
//!
//! Evaluations are produced by a provider-less orchestrator, so the stored
//! results have the same shape as real ones, then written to a fresh SQLite
//! database in a temporary directory.

use chrono::{Duration as ChronoDuration, TimeZone, Utc};
use std::sync::Arc;
use tempfile::TempDir;
use tokio_util::sync::CancellationToken;

use lexis_engine::config::EvaluationConfig;
use lexis_engine::db::{Database, TREND_WINDOW};
use lexis_engine::orchestrator::{ConversationInput, EvaluationOrchestrator, EvaluationResult};
use lexis_engine::providers::ProviderRegistry;
use lexis_engine::rate_limiter::SystemClock;
use sdk::types::{CefrLevel, Dimension};

fn orchestrator() -> EvaluationOrchestrator {
    let registry = ProviderRegistry::new(Arc::new(SystemClock));
    EvaluationOrchestrator::new(Arc::new(registry), &EvaluationConfig::default())
}

/// Evaluate `text` locally and pin the timestamp to `minutes` past a fixed base
async fn evaluation(id: &str, text: &str, minutes: i64) -> EvaluationResult {
    let mut result = orchestrator()
        .evaluate(
            ConversationInput::from_transcript(id, text).with_topic("Daily life"),
            CancellationToken::new(),
        )
        .await
        .unwrap();
    let base = Utc.with_ymd_and_hms(2026, 3, 1, 9, 0, 0).unwrap();
    result.evaluated_at = base + ChronoDuration::minutes(minutes);
    result
}

async fn open(dir: &TempDir) -> Database {
    Database::new(&dir.path().join("lexis.db")).await.unwrap()
}

#[tokio::test]
async fn test_database_lifecycle() {
    let temp_dir = TempDir::new().unwrap();
    let db_path = temp_dir.path().join("data").join("lexis.db");

    let db = Database::new(&db_path).await.unwrap();
    assert!(db_path.exists());

    let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM evaluations")
        .fetch_one(db.pool())
        .await
        .unwrap();
    assert_eq!(count, 0);

    db.close().await.unwrap();
}

#[tokio::test]
async fn test_save_and_get() {
    let temp_dir = TempDir::new().unwrap();
    let db = open(&temp_dir).await;
    let repo = db.evaluations();

    let result = evaluation("conv-1", "I go to school yesterday", 0).await;
    repo.save(&result).await.unwrap();

    let stored = repo.get("conv-1").await.unwrap().unwrap();
    assert_eq!(stored.conversation_id, "conv-1");
    assert_eq!(stored.transcript, "I go to school yesterday");
    assert_eq!(stored.level, result.level);
    assert!((stored.overall_score - result.overall_score).abs() < 1e-9);
    assert_eq!(stored.grammar_errors.len(), 1);
    assert_eq!(stored.grammar_errors[0].suggestion.as_deref(), Some("went"));
    assert_eq!(stored.evaluated_at, result.evaluated_at);
    assert_eq!(stored.sources, result.sources);
    assert!(!stored.follow_up.is_empty());
    assert_eq!(stored.follow_up, result.follow_up);

    let sources = repo.sources("conv-1").await.unwrap();
    assert_eq!(sources.len(), Dimension::ALL.len());
    assert!(sources.values().all(|s| s == "local"));

    assert!(repo.get("missing").await.unwrap().is_none());
    db.close().await.unwrap();
}

#[tokio::test]
async fn test_saving_again_replaces_evaluation() {
    let temp_dir = TempDir::new().unwrap();
    let db = open(&temp_dir).await;
    let repo = db.evaluations();

    let first = evaluation("conv-1", "Hello", 0).await;
    repo.save(&first).await.unwrap();

    let second = evaluation(
        "conv-1",
        "Yesterday I visited my grandmother and we cooked a delicious dinner together.",
        5,
    )
    .await;
    repo.save(&second).await.unwrap();

    let history = repo.recent(10).await.unwrap();
    assert_eq!(history.len(), 1);
    assert!((history[0].overall_score - second.overall_score).abs() < 1e-9);

    let stored = repo.get("conv-1").await.unwrap().unwrap();
    assert_eq!(stored.transcript, second.transcript);
    assert_eq!(repo.sources("conv-1").await.unwrap().len(), Dimension::ALL.len());
    db.close().await.unwrap();
}

#[tokio::test]
async fn test_recent_is_newest_first() {
    let temp_dir = TempDir::new().unwrap();
    let db = open(&temp_dir).await;
    let repo = db.evaluations();

    for (minutes, id) in [(10, "b"), (0, "a"), (20, "c")] {
        repo.save(&evaluation(id, "I like reading books in the park.", minutes).await)
            .await
            .unwrap();
    }

    let history = repo.recent(2).await.unwrap();
    let ids: Vec<&str> = history.iter().map(|h| h.conversation_id.as_str()).collect();
    assert_eq!(ids, vec!["c", "b"]);
    assert_eq!(history[0].topic.as_deref(), Some("Daily life"));
    db.close().await.unwrap();
}

#[tokio::test]
async fn test_progress_without_evaluations() {
    let temp_dir = TempDir::new().unwrap();
    let db = open(&temp_dir).await;

    let progress = db.evaluations().progress().await.unwrap();
    assert_eq!(progress.total_evaluations, 0);
    assert_eq!(progress.average_score, 0.0);
    assert_eq!(progress.current_level, CefrLevel::A1);
    assert!(progress.last_evaluated_at.is_none());
    assert!(progress.trends.values().all(|t| t.is_empty()));
    db.close().await.unwrap();
}

#[tokio::test]
async fn test_progress_trends() {
    let temp_dir = TempDir::new().unwrap();
    let db = open(&temp_dir).await;
    let repo = db.evaluations();

    let texts = [
        "Hello",
        "I like cats",
        "My brother works in a hospital near our house.",
    ];
    let mut saved = Vec::new();
    for (i, text) in texts.iter().enumerate() {
        let result = evaluation(&format!("conv-{}", i), text, i as i64).await;
        repo.save(&result).await.unwrap();
        saved.push(result);
    }

    let progress = repo.progress().await.unwrap();
    assert_eq!(progress.total_evaluations, 3);

    let expected_average =
        saved.iter().map(|r| r.overall_score).sum::<f64>() / saved.len() as f64;
    assert!((progress.average_score - expected_average).abs() <= 0.005 + 1e-9);

    let latest = saved.last().unwrap();
    assert_eq!(progress.current_level, latest.level);
    assert_eq!(progress.last_evaluated_at, Some(latest.evaluated_at));

    let grammar = &progress.trends[&Dimension::Grammar];
    assert_eq!(grammar.len(), 3);
    assert_eq!(grammar[0], latest.score(Dimension::Grammar).unwrap());
    assert_eq!(grammar[2], saved[0].score(Dimension::Grammar).unwrap());
    db.close().await.unwrap();
}

#[tokio::test]
async fn test_trend_window_is_bounded() {
    let temp_dir = TempDir::new().unwrap();
    let db = open(&temp_dir).await;
    let repo = db.evaluations();

    for i in 0..(TREND_WINDOW + 2) {
        repo.save(&evaluation(&format!("conv-{}", i), "We walked to the beach.", i).await)
            .await
            .unwrap();
    }

    let progress = repo.progress().await.unwrap();
    assert_eq!(progress.total_evaluations, TREND_WINDOW + 2);
    for trend in progress.trends.values() {
        assert_eq!(trend.len() as i64, TREND_WINDOW);
    }
    db.close().await.unwrap();
}

#[tokio::test]
async fn test_repository_as_sink() {
    let temp_dir = TempDir::new().unwrap();
    let db = open(&temp_dir).await;
    let repo = db.evaluations();

    let result = orchestrator()
        .evaluate_into(
            ConversationInput::from_transcript("sink-1", "She have a red bicycle."),
            CancellationToken::new(),
            &repo,
        )
        .await
        .unwrap();

    let stored = repo.get("sink-1").await.unwrap().unwrap();
    assert_eq!(stored.level, result.level);
    assert_eq!(stored.grammar_errors.len(), result.grammar_errors.len());
    db.close().await.unwrap();
}

#[tokio::test]
async fn test_delete_removes_sources() {
    let temp_dir = TempDir::new().unwrap();
    let db = open(&temp_dir).await;
    let repo = db.evaluations();

    repo.save(&evaluation("conv-1", "Good morning everyone", 0).await)
        .await
        .unwrap();

    assert!(repo.delete("conv-1").await.unwrap());
    assert!(!repo.delete("conv-1").await.unwrap());
    assert!(repo.get("conv-1").await.unwrap().is_none());
    assert!(repo.sources("conv-1").await.unwrap().is_empty());
    db.close().await.unwrap();
}

#[tokio::test]
async fn test_data_survives_reopen() {
    let temp_dir = TempDir::new().unwrap();

    let db = open(&temp_dir).await;
    db.evaluations()
        .save(&evaluation("conv-1", "The weather is lovely today.", 0).await)
        .await
        .unwrap();
    db.close().await.unwrap();

    let db = open(&temp_dir).await;
    assert!(db.evaluations().get("conv-1").await.unwrap().is_some());
    db.close().await.unwrap();
}

#[tokio::test]
async fn test_results_stored_before_follow_up_still_load() {
    let result = evaluation("conv-old", "I visited my aunt on Sunday.", 0).await;
    let mut value = serde_json::to_value(&result).unwrap();
    value.as_object_mut().unwrap().remove("follow_up");

    let loaded: EvaluationResult = serde_json::from_value(value).unwrap();
    assert_eq!(loaded.follow_up, "");
    assert_eq!(loaded.overall_score, result.overall_score);
}
