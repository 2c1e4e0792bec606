//! Lexis Engine Library
//!
//! Conversation evaluation: provider registry with rate-limited fallback,
//! local analysis heuristics, scoring and CEFR mapping, and persistence of
//! results. Used by the `lexis` binary and integration tests.

/// Configuration management module
pub mod config;

/// Database persistence module
pub mod db;

/// Rate limiting module
pub mod rate_limiter;

/// Message bus for evaluation events
pub mod message_bus;

/// Analysis providers and the provider registry
pub mod providers;

/// Local analysis heuristics
pub mod analysis;

/// Sub-score aggregation and CEFR mapping
pub mod scoring;

/// Evaluation orchestration
pub mod orchestrator;

/// Telemetry and Observability
pub mod telemetry;

/// CLI interface module
pub mod cli;

/// Command handlers module
pub mod handlers;
