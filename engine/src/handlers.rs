//! Command handlers for CLI operations
//!
//! Each handler loads what it needs (registry, database), runs the command
//! and prints either a human-readable report or JSON.

use anyhow::{Context, Result};
use serde_json::json;
use std::path::Path;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

use crate::cli::EvaluateArgs;
use crate::config::Config;
use crate::db::Database;
use crate::message_bus::{Event, EventType, MessageBus};
use crate::orchestrator::{
    AudioSource, ConversationInput, EvaluationOrchestrator, EvaluationResult,
};
use crate::providers::ProviderRegistry;
use sdk::errors::LexisErrorExt;
use sdk::types::{CefrLevel, Dimension};

/// Output format for command results
#[derive(Debug, Clone, Copy)]
pub enum OutputFormat {
    /// Human-readable text output
    Text,
    /// JSON output for machine consumption
    Json,
}

/// Turn `evaluate` arguments into a conversation input
pub fn build_input(args: &EvaluateArgs) -> Result<ConversationInput> {
    let transcript = match (&args.transcript, &args.file) {
        (Some(text), _) => Some(text.clone()),
        (None, Some(path)) => Some(
            std::fs::read_to_string(path)
                .with_context(|| format!("Failed to read transcript from {}", path.display()))?,
        ),
        (None, None) => None,
    };

    let target_level = args
        .level
        .as_deref()
        .map(|l| {
            l.parse::<CefrLevel>()
                .map_err(|_| anyhow::anyhow!("Unknown CEFR level '{}', expected A1-C2", l))
        })
        .transpose()?;

    let input = ConversationInput {
        id: args
            .id
            .clone()
            .unwrap_or_else(|| uuid::Uuid::new_v4().to_string()),
        transcript,
        audio: args.audio.clone().map(AudioSource::File),
        duration_secs: args.duration.unwrap_or(0.0),
        topic: args.topic.clone(),
        target_level,
    };
    input.validate()?;
    Ok(input)
}

/// Evaluate one conversation and store the result
pub async fn handle_evaluate(args: EvaluateArgs, config: &Config, format: OutputFormat) -> Result<()> {
    let input = build_input(&args)?;

    let registry = Arc::new(ProviderRegistry::from_config(config)?);
    let bus = Arc::new(MessageBus::new());
    let orchestrator =
        EvaluationOrchestrator::new(registry, &config.evaluation).with_bus(Arc::clone(&bus));

    let progress = match format {
        OutputFormat::Text => {
            let mut rx = bus.subscribe(EventType::All).await;
            Some(tokio::spawn(async move {
                while let Some(event) = rx.recv().await {
                    match event {
                        Event::StateChanged { to, .. } => eprintln!("  {}...", to),
                        Event::ProviderFailed { provider, capability, .. } => {
                            eprintln!("  {} failed for {}, trying next", provider, capability)
                        }
                        Event::LocalFallback { capability, .. } => {
                            eprintln!("  {}: using local analysis", capability)
                        }
                        _ => {}
                    }
                }
            }))
        }
        OutputFormat::Json => None,
    };

    let cancel = CancellationToken::new();
    let ctrl_c = {
        let cancel = cancel.clone();
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                eprintln!("Cancelling evaluation...");
                cancel.cancel();
            }
        })
    };

    let outcome = if args.no_store {
        orchestrator.evaluate(input, cancel).await
    } else {
        let database = Database::new(&config.database_path())
            .await
            .context("Failed to open database")?;
        let repository = database.evaluations();
        let outcome = orchestrator.evaluate_into(input, cancel, &repository).await;
        database.close().await?;
        outcome
    };

    ctrl_c.abort();
    if let Some(progress) = progress {
        progress.abort();
    }

    let result = outcome.map_err(|e| {
        tracing::debug!("Evaluation error: {}", e);
        anyhow::anyhow!("{} ({})", e, e.user_hint())
    })?;

    match format {
        OutputFormat::Text => print_result(&result),
        OutputFormat::Json => println!("{}", serde_json::to_string_pretty(&result)?),
    }
    Ok(())
}

fn print_result(result: &EvaluationResult) {
    println!();
    println!("Conversation: {}", result.conversation_id);
    if let Some(topic) = &result.topic {
        println!("Topic: {}", topic);
    }
    println!(
        "Overall: {:.2}/100  Level: {} ({})",
        result.overall_score,
        result.level,
        result.level.description()
    );
    if let Some(target) = result.target_level {
        println!("Target level: {}", target);
    }
    println!();

    for score in &result.subscores {
        let source = result
            .source(score.dimension)
            .map(|s| s.label().to_string())
            .unwrap_or_default();
        println!(
            "  {:<14} {:>6.2} / {:<4}  [{}]",
            score.dimension.as_str(),
            score.value,
            score.max(),
            source
        );
    }
    if let Some(wpm) = result.words_per_minute {
        println!("  {:<14} {:>6.1}", "words/minute", wpm);
    }

    if !result.grammar_errors.is_empty() {
        println!();
        println!("Grammar errors:");
        for error in &result.grammar_errors {
            let fragment: String = result
                .transcript
                .chars()
                .skip(error.start)
                .take(error.end.saturating_sub(error.start))
                .collect();
            print!("  [{}] {} \"{}\"", error.severity, error.error_type, fragment);
            if let Some(suggestion) = &error.suggestion {
                print!(" -> \"{}\"", suggestion);
            }
            println!();
        }
    }

    print_list("Strengths", &result.strengths);
    print_list("Areas for improvement", &result.improvements);
    print_list("Recommendations", &result.recommendations);

    if !result.follow_up.is_empty() {
        println!();
        println!("Tutor: {}", result.follow_up);
    }
}

fn print_list(title: &str, items: &[String]) {
    println!();
    println!("{}:", title);
    for item in items {
        println!("  - {}", item);
    }
}

/// Show provider status, optionally probing each provider
pub async fn handle_providers(config: &Config, check: bool, format: OutputFormat) -> Result<()> {
    let registry = ProviderRegistry::from_config(config)?;
    let statuses = registry.statuses();
    let health = if check {
        Some(registry.check_health().await)
    } else {
        None
    };
    let healthy = |name: &str| {
        health
            .as_ref()
            .and_then(|h| h.iter().find(|(n, _)| n == name).map(|(_, ok)| *ok))
    };

    match format {
        OutputFormat::Text => {
            if statuses.is_empty() {
                println!("No providers configured");
                return Ok(());
            }
            println!(
                "{:<16} {:<8} {:>8} {:>10} {:>6}  {}",
                "NAME", "ENABLED", "PRIORITY", "RATE", "HEALTH", "CAPABILITIES"
            );
            for status in &statuses {
                let capabilities: Vec<&str> =
                    status.capabilities.iter().map(|c| c.as_str()).collect();
                let health = match healthy(&status.name) {
                    Some(true) => "ok",
                    Some(false) => "down",
                    None => "-",
                };
                println!(
                    "{:<16} {:<8} {:>8} {:>10} {:>6}  {}",
                    status.name,
                    if status.enabled { "yes" } else { "no" },
                    status.priority,
                    format!("{}/{}", status.requests_in_window, status.requests_per_minute),
                    health,
                    capabilities.join(", ")
                );
            }
        }
        OutputFormat::Json => {
            let providers: Vec<_> = statuses
                .iter()
                .map(|status| {
                    let mut value = json!(status);
                    if let Some(ok) = healthy(&status.name) {
                        value["healthy"] = json!(ok);
                    }
                    value
                })
                .collect();
            println!("{}", serde_json::to_string_pretty(&json!({ "providers": providers }))?);
        }
    }
    Ok(())
}

/// Show the most recent evaluations
pub async fn handle_history(limit: i64, config: &Config, format: OutputFormat) -> Result<()> {
    let database = open_database(&config.database_path()).await?;
    let history = database.evaluations().recent(limit).await?;

    match format {
        OutputFormat::Text => {
            if history.is_empty() {
                println!("No evaluations in history");
            } else {
                println!("Evaluation History (last {}):", limit);
                println!();
                for entry in &history {
                    println!(
                        "{}  {:>6.2}  {}  {}  {}",
                        entry.evaluated_at.format("%Y-%m-%d %H:%M:%S"),
                        entry.overall_score,
                        entry.level,
                        entry.conversation_id,
                        entry.topic.as_deref().unwrap_or("")
                    );
                }
            }
        }
        OutputFormat::Json => {
            let output = json!({
                "evaluations": history,
                "count": history.len(),
                "limit": limit
            });
            println!("{}", serde_json::to_string_pretty(&output)?);
        }
    }

    database.close().await
}

/// Show one stored evaluation
pub async fn handle_show(id: &str, config: &Config, format: OutputFormat) -> Result<()> {
    let database = open_database(&config.database_path()).await?;
    let result = database
        .evaluations()
        .get(id)
        .await?
        .ok_or_else(|| anyhow::anyhow!("Evaluation not found: {}", id))?;

    match format {
        OutputFormat::Text => print_result(&result),
        OutputFormat::Json => println!("{}", serde_json::to_string_pretty(&result)?),
    }

    database.close().await
}

/// Show learner progress across stored evaluations
pub async fn handle_progress(config: &Config, format: OutputFormat) -> Result<()> {
    let database = open_database(&config.database_path()).await?;
    let progress = database.evaluations().progress().await?;

    match format {
        OutputFormat::Text => {
            println!("Evaluations: {}", progress.total_evaluations);
            println!("Average score: {:.2}", progress.average_score);
            println!("Current level: {}", progress.current_level);
            if let Some(last) = progress.last_evaluated_at {
                println!("Last evaluation: {}", last.format("%Y-%m-%d %H:%M:%S"));
            }
            println!();
            for dimension in Dimension::ALL {
                let trend = progress.trends.get(&dimension).cloned().unwrap_or_default();
                let values: Vec<String> = trend.iter().rev().map(|v| format!("{:.1}", v)).collect();
                println!("  {:<14} {}", dimension.as_str(), values.join(" "));
            }
        }
        OutputFormat::Json => println!("{}", serde_json::to_string_pretty(&progress)?),
    }

    database.close().await
}

pub fn handle_config_show(config: &Config, format: OutputFormat) -> Result<()> {
    match format {
        OutputFormat::Text => print!(
            "{}",
            toml::to_string_pretty(config).context("Failed to serialize configuration")?
        ),
        OutputFormat::Json => println!("{}", serde_json::to_string_pretty(config)?),
    }
    Ok(())
}

pub fn handle_config_path(path: &Path, format: OutputFormat) -> Result<()> {
    match format {
        OutputFormat::Text => println!("{}", path.display()),
        OutputFormat::Json => println!("{}", json!({ "path": path })),
    }
    Ok(())
}

async fn open_database(path: &Path) -> Result<Database> {
    Database::new(path).await.context("Failed to open database")
}
