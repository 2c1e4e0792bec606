//! CLI interface for Lexis
//!
//! Command-line definitions using clap's derive API.

use clap::{Parser, Subcommand};
use std::path::PathBuf;

/// Lexis conversation evaluation engine
///
/// Scores spoken or written conversations on grammar, vocabulary, fluency,
/// pronunciation and comprehension, and maps the result to a CEFR level.
#[derive(Parser, Debug)]
#[command(name = "lexis")]
#[command(version, about, long_about = None)]
pub struct Cli {
    /// Output in JSON format
    #[arg(long, global = true)]
    pub json: bool,

    /// Set log level (error, warn, info, debug, trace)
    #[arg(long, global = true, value_name = "LEVEL")]
    pub log: Option<String>,

    /// Specify alternate configuration file
    #[arg(long, global = true, value_name = "PATH")]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Command,
}

/// Available commands
#[derive(Subcommand, Debug)]
pub enum Command {
    /// Evaluate one conversation
    Evaluate(EvaluateArgs),

    /// Show provider status
    Providers {
        /// Also probe every provider
        #[arg(long)]
        check: bool,
    },

    /// Show recent evaluations
    History {
        /// Number of evaluations to show
        #[arg(short, long, default_value = "10")]
        limit: i64,
    },

    /// Show a stored evaluation
    Show {
        /// Conversation ID
        id: String,
    },

    /// Show learner progress
    Progress,

    /// Manage configuration
    Config {
        #[command(subcommand)]
        action: ConfigAction,
    },
}

#[derive(clap::Args, Debug, Clone, Default)]
pub struct EvaluateArgs {
    /// Transcript text
    pub transcript: Option<String>,

    /// Read the transcript from a file
    #[arg(long, value_name = "PATH", conflicts_with = "transcript")]
    pub file: Option<PathBuf>,

    /// Audio recording to transcribe
    #[arg(long, value_name = "PATH")]
    pub audio: Option<PathBuf>,

    /// Spoken duration in seconds
    #[arg(long, value_name = "SECS")]
    pub duration: Option<f64>,

    /// Conversation topic
    #[arg(long)]
    pub topic: Option<String>,

    /// Target CEFR level (A1-C2)
    #[arg(long, value_name = "LEVEL")]
    pub level: Option<String>,

    /// Conversation ID (generated when omitted)
    #[arg(long)]
    pub id: Option<String>,

    /// Do not store the result
    #[arg(long)]
    pub no_store: bool,
}

/// Configuration management actions
#[derive(Subcommand, Debug)]
pub enum ConfigAction {
    /// Print the effective configuration
    Show,

    /// Print the configuration file path
    Path,
}
