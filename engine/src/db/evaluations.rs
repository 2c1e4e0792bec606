//! Evaluation persistence
//!
//! Completed evaluations are stored whole as JSON, with the overall score,
//! level and the five sub-scores denormalised into columns for history and
//! progress queries. Storing a conversation again replaces its previous
//! evaluation.

use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::{DateTime, TimeZone, Utc};
use serde::{Deserialize, Serialize};
use sqlx::{Row, SqlitePool};
use std::collections::BTreeMap;
use tracing::debug;

use crate::orchestrator::{EvaluationResult, EvaluationSink};
use sdk::errors::EngineError;
use sdk::types::{CefrLevel, Dimension};

/// Number of evaluations that make up a trend
pub const TREND_WINDOW: i64 = 10;

/// One row of evaluation history
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EvaluationSummary {
    pub conversation_id: String,
    pub overall_score: f64,
    pub level: CefrLevel,
    pub topic: Option<String>,
    pub evaluated_at: DateTime<Utc>,
}

/// Learner progress across stored evaluations
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Progress {
    pub total_evaluations: i64,
    pub average_score: f64,
    /// Level of the latest evaluation, A1 when there is none
    pub current_level: CefrLevel,
    pub last_evaluated_at: Option<DateTime<Utc>>,
    /// Sub-scores of the latest evaluations, newest first
    pub trends: BTreeMap<Dimension, Vec<f64>>,
}

pub struct EvaluationRepository {
    pool: SqlitePool,
}

impl EvaluationRepository {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Insert or replace an evaluation and its per-dimension sources
    pub async fn save(&self, result: &EvaluationResult) -> Result<()> {
        let score = |dimension| result.score(dimension).unwrap_or(0.0);
        let json = serde_json::to_string(result).context("Failed to serialize evaluation")?;

        let mut tx = self.pool.begin().await.context("Failed to begin transaction")?;

        sqlx::query(
            "INSERT INTO evaluations (conversation_id, overall_score, level, topic, target_level, \
             grammar, vocabulary, fluency, pronunciation, comprehension, result_json, evaluated_at) \
             VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?) \
             ON CONFLICT(conversation_id) DO UPDATE SET \
             overall_score = excluded.overall_score, level = excluded.level, \
             topic = excluded.topic, target_level = excluded.target_level, \
             grammar = excluded.grammar, vocabulary = excluded.vocabulary, \
             fluency = excluded.fluency, pronunciation = excluded.pronunciation, \
             comprehension = excluded.comprehension, result_json = excluded.result_json, \
             evaluated_at = excluded.evaluated_at",
        )
        .bind(&result.conversation_id)
        .bind(result.overall_score)
        .bind(result.level.as_str())
        .bind(result.topic.as_deref())
        .bind(result.target_level.map(|l| l.as_str()))
        .bind(score(Dimension::Grammar))
        .bind(score(Dimension::Vocabulary))
        .bind(score(Dimension::Fluency))
        .bind(score(Dimension::Pronunciation))
        .bind(score(Dimension::Comprehension))
        .bind(&json)
        .bind(result.evaluated_at.timestamp_millis())
        .execute(&mut *tx)
        .await
        .context("Failed to store evaluation")?;

        sqlx::query("DELETE FROM evaluation_sources WHERE conversation_id = ?")
            .bind(&result.conversation_id)
            .execute(&mut *tx)
            .await
            .context("Failed to clear evaluation sources")?;

        for (dimension, source) in &result.sources {
            sqlx::query(
                "INSERT INTO evaluation_sources (conversation_id, dimension, source) VALUES (?, ?, ?)",
            )
            .bind(&result.conversation_id)
            .bind(dimension.as_str())
            .bind(source.label())
            .execute(&mut *tx)
            .await
            .context("Failed to store evaluation source")?;
        }

        tx.commit().await.context("Failed to commit evaluation")?;
        debug!("Stored evaluation {}", result.conversation_id);
        Ok(())
    }

    /// Full evaluation for a conversation
    pub async fn get(&self, conversation_id: &str) -> Result<Option<EvaluationResult>> {
        let row = sqlx::query("SELECT result_json FROM evaluations WHERE conversation_id = ?")
            .bind(conversation_id)
            .fetch_optional(&self.pool)
            .await
            .context("Failed to fetch evaluation")?;

        row.map(|r| {
            let json: String = r.get("result_json");
            serde_json::from_str(&json).context("Stored evaluation is corrupt")
        })
        .transpose()
    }

    /// Most recent evaluations, newest first
    pub async fn recent(&self, limit: i64) -> Result<Vec<EvaluationSummary>> {
        let rows = sqlx::query(
            "SELECT conversation_id, overall_score, level, topic, evaluated_at FROM evaluations \
             ORDER BY evaluated_at DESC, rowid DESC LIMIT ?",
        )
        .bind(limit)
        .fetch_all(&self.pool)
        .await
        .context("Failed to fetch evaluation history")?;

        rows.into_iter()
            .map(|r| {
                Ok(EvaluationSummary {
                    conversation_id: r.get("conversation_id"),
                    overall_score: r.get("overall_score"),
                    level: parse_level(&r.get::<String, _>("level"))?,
                    topic: r.get("topic"),
                    evaluated_at: from_millis(r.get("evaluated_at")),
                })
            })
            .collect()
    }

    /// Source label per dimension for a stored evaluation
    pub async fn sources(&self, conversation_id: &str) -> Result<BTreeMap<Dimension, String>> {
        let rows = sqlx::query(
            "SELECT dimension, source FROM evaluation_sources WHERE conversation_id = ?",
        )
        .bind(conversation_id)
        .fetch_all(&self.pool)
        .await
        .context("Failed to fetch evaluation sources")?;

        let mut sources = BTreeMap::new();
        for row in rows {
            let name: String = row.get("dimension");
            if let Some(dimension) = Dimension::ALL.iter().find(|d| d.as_str() == name) {
                sources.insert(*dimension, row.get("source"));
            }
        }
        Ok(sources)
    }

    /// Count, average, current level and per-dimension trends
    pub async fn progress(&self) -> Result<Progress> {
        let totals = sqlx::query(
            "SELECT COUNT(*) AS total, AVG(overall_score) AS average, MAX(evaluated_at) AS last \
             FROM evaluations",
        )
        .fetch_one(&self.pool)
        .await
        .context("Failed to compute progress totals")?;

        let total_evaluations: i64 = totals.get("total");
        let average: Option<f64> = totals.get("average");
        let last: Option<i64> = totals.get("last");

        let latest_level: Option<String> = sqlx::query_scalar(
            "SELECT level FROM evaluations ORDER BY evaluated_at DESC, rowid DESC LIMIT 1",
        )
        .fetch_optional(&self.pool)
        .await
        .context("Failed to fetch current level")?;

        let rows = sqlx::query(
            "SELECT grammar, vocabulary, fluency, pronunciation, comprehension FROM evaluations \
             ORDER BY evaluated_at DESC, rowid DESC LIMIT ?",
        )
        .bind(TREND_WINDOW)
        .fetch_all(&self.pool)
        .await
        .context("Failed to fetch score trends")?;

        let mut trends: BTreeMap<Dimension, Vec<f64>> =
            Dimension::ALL.iter().map(|d| (*d, Vec::new())).collect();
        for row in &rows {
            for dimension in Dimension::ALL {
                if let Some(trend) = trends.get_mut(&dimension) {
                    trend.push(row.get(dimension.as_str()));
                }
            }
        }

        Ok(Progress {
            total_evaluations,
            average_score: crate::scoring::round2(average.unwrap_or(0.0)),
            current_level: match latest_level {
                Some(level) => parse_level(&level)?,
                None => CefrLevel::A1,
            },
            last_evaluated_at: last.map(from_millis),
            trends,
        })
    }

    /// Delete an evaluation. Returns whether it existed.
    pub async fn delete(&self, conversation_id: &str) -> Result<bool> {
        let result = sqlx::query("DELETE FROM evaluations WHERE conversation_id = ?")
            .bind(conversation_id)
            .execute(&self.pool)
            .await
            .context("Failed to delete evaluation")?;
        Ok(result.rows_affected() > 0)
    }
}

#[async_trait]
impl EvaluationSink for EvaluationRepository {
    async fn store(&self, result: &EvaluationResult) -> Result<(), EngineError> {
        self.save(result)
            .await
            .map_err(|e| EngineError::Database(format!("{:#}", e)))
    }
}

fn parse_level(level: &str) -> Result<CefrLevel> {
    level
        .parse()
        .map_err(|_| anyhow::anyhow!("Stored level '{}' is not a CEFR level", level))
}

fn from_millis(millis: i64) -> DateTime<Utc> {
    Utc.timestamp_millis_opt(millis)
        .single()
        .unwrap_or_default()
}
