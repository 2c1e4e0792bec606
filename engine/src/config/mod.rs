//! Configuration management
//!
//! This module handles loading, validation, and management of the Lexis configuration.
//! Configuration is stored in TOML format at ~/.lexis/config.toml.
//!
//! # Configuration Sections
//!
//! - **core**: Log level and data directory
//! - **evaluation**: Provider and request timeouts, analysis language
//! - **providers**: Ordered list of analysis providers. The order of the
//!   `[[providers]]` tables is the registration order, which breaks ties
//!   between providers of equal priority.
//!
//! # Examples
//!
//! ```no_run
//! use lexis_engine::config::Config;
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let config = Config::load_or_create()?;
//!
//! println!("Data dir: {:?}", config.core.data_dir);
//! println!("Providers: {}", config.providers.len());
//! # Ok(())
//! # }
//! ```

use sdk::errors::EngineError;
use sdk::types::Capability;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::warn;

/// Main configuration structure
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Core engine settings
    pub core: CoreConfig,

    /// Evaluation settings
    #[serde(default)]
    pub evaluation: EvaluationConfig,

    /// Analysis providers in registration order
    #[serde(default)]
    pub providers: Vec<ProviderConfig>,
}

/// Core engine configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CoreConfig {
    /// Log level (error, warn, info, debug, trace)
    #[serde(default = "default_log_level")]
    pub log_level: String,

    /// Data directory path (supports ~ expansion)
    #[serde(default = "default_data_dir")]
    pub data_dir: PathBuf,
}

/// Evaluation settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EvaluationConfig {
    /// Timeout for a single provider call (seconds)
    #[serde(default = "default_provider_timeout")]
    pub provider_timeout_secs: u64,

    /// Timeout for a whole evaluation (seconds, 0 disables)
    #[serde(default = "default_request_timeout")]
    pub request_timeout_secs: u64,

    /// Language code passed to grammar and transcription providers
    #[serde(default = "default_language")]
    pub language: String,
}

impl Default for EvaluationConfig {
    fn default() -> Self {
        Self {
            provider_timeout_secs: default_provider_timeout(),
            request_timeout_secs: default_request_timeout(),
            language: default_language(),
        }
    }
}

impl EvaluationConfig {
    pub fn provider_timeout(&self) -> Duration {
        Duration::from_secs(self.provider_timeout_secs)
    }

    /// Overall evaluation deadline, `None` when disabled
    pub fn request_timeout(&self) -> Option<Duration> {
        (self.request_timeout_secs > 0).then(|| Duration::from_secs(self.request_timeout_secs))
    }
}

/// Transport family of a provider
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProviderKind {
    /// OpenAI-compatible chat completions
    OpenAI,
    /// Local Ollama chat API
    Ollama,
    /// OpenAI-compatible audio transcription
    Whisper,
    /// LanguageTool HTTP API
    LanguageTool,
}

impl ProviderKind {
    /// Capabilities a provider of this kind can serve
    pub fn supported_capabilities(&self) -> &'static [Capability] {
        match self {
            ProviderKind::OpenAI | ProviderKind::Ollama => &[
                Capability::GrammarAnalysis,
                Capability::VocabularyAnalysis,
                Capability::FluencyAnalysis,
                Capability::LanguageModelScoring,
            ],
            ProviderKind::Whisper => &[Capability::SpeechToText],
            ProviderKind::LanguageTool => &[Capability::GrammarAnalysis],
        }
    }
}

/// One registered analysis provider
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProviderConfig {
    /// Unique provider name
    pub name: String,

    pub kind: ProviderKind,

    /// Capabilities served, sharing one rate-limit window
    pub capabilities: Vec<Capability>,

    #[serde(default = "default_true")]
    pub enabled: bool,

    #[serde(default = "default_requests_per_minute")]
    pub requests_per_minute: u32,

    /// Higher priority is tried first
    #[serde(default)]
    pub priority: i32,

    /// Informational only
    #[serde(default)]
    pub cost_weight: f64,

    pub base_url: String,

    #[serde(default)]
    pub model: Option<String>,

    /// Name of the environment variable holding the API key
    #[serde(default)]
    pub api_key_env: Option<String>,

    /// Per-call timeout override (seconds)
    #[serde(default)]
    pub timeout_secs: Option<u64>,
}

impl ProviderConfig {
    /// Read the API key from the configured environment variable
    pub fn resolve_api_key(&self) -> Option<String> {
        self.api_key_env
            .as_deref()
            .and_then(|var| std::env::var(var).ok())
            .filter(|key| !key.trim().is_empty())
    }

    /// Effective per-call timeout
    pub fn timeout(&self, evaluation: &EvaluationConfig) -> Duration {
        self.timeout_secs
            .map(Duration::from_secs)
            .unwrap_or_else(|| evaluation.provider_timeout())
    }
}

// Default value functions
fn default_log_level() -> String {
    "info".to_string()
}

fn default_true() -> bool {
    true
}

fn default_data_dir() -> PathBuf {
    PathBuf::from("~/.lexis")
}

fn default_provider_timeout() -> u64 {
    30
}

fn default_request_timeout() -> u64 {
    300
}

fn default_language() -> String {
    "en-US".to_string()
}

fn default_requests_per_minute() -> u32 {
    30
}

impl Config {
    /// Load configuration from the default location (~/.lexis/config.toml)
    ///
    /// If the configuration file doesn't exist, creates a default configuration.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read, TOML parsing fails or
    /// validation fails.
    pub fn load_or_create() -> Result<Self, EngineError> {
        let config_path = Self::default_config_path()?;
        Self::load_or_create_at(&config_path)
    }

    /// Same as [`Config::load_or_create`] for an explicit path
    pub fn load_or_create_at(path: &Path) -> Result<Self, EngineError> {
        if path.exists() {
            Self::load_from_path(path)
        } else {
            Self::create_default(path)
        }
    }

    /// Load configuration from a specific path
    pub fn load_from_path(path: &Path) -> Result<Self, EngineError> {
        let contents = fs::read_to_string(path)
            .map_err(|e| EngineError::Config(format!("Failed to read config file: {}", e)))?;

        Self::from_toml_str(&contents)
    }

    /// Parse and validate configuration text
    pub fn from_toml_str(contents: &str) -> Result<Self, EngineError> {
        let mut config: Config = toml::from_str(contents)
            .map_err(|e| EngineError::Config(format!("Failed to parse config: {}", e)))?;

        config.validate_and_process()?;

        Ok(config)
    }

    /// Create default configuration and save to path
    fn create_default(path: &Path) -> Result<Self, EngineError> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).map_err(|e| {
                EngineError::Config(format!("Failed to create config directory: {}", e))
            })?;
        }

        // Serialize before processing so the file keeps the portable `~` form
        let config = Self::default_config();
        let toml_string = toml::to_string_pretty(&config)
            .map_err(|e| EngineError::Config(format!("Failed to serialize config: {}", e)))?;

        fs::write(path, toml_string)
            .map_err(|e| EngineError::Config(format!("Failed to write config file: {}", e)))?;

        let mut config = config;
        config.validate_and_process()?;
        Ok(config)
    }

    /// Get the default configuration file path (~/.lexis/config.toml)
    pub fn default_config_path() -> Result<PathBuf, EngineError> {
        let home = dirs::home_dir()
            .ok_or_else(|| EngineError::Config("Could not determine home directory".to_string()))?;

        Ok(home.join(".lexis").join("config.toml"))
    }

    /// Path of the SQLite evaluation store
    pub fn database_path(&self) -> PathBuf {
        self.core.data_dir.join("lexis.db")
    }

    /// Create a default configuration
    pub fn default_config() -> Self {
        Self {
            core: CoreConfig {
                log_level: default_log_level(),
                data_dir: default_data_dir(),
            },
            evaluation: EvaluationConfig::default(),
            providers: vec![
                ProviderConfig {
                    name: "openai".to_string(),
                    kind: ProviderKind::OpenAI,
                    capabilities: ProviderKind::OpenAI.supported_capabilities().to_vec(),
                    enabled: true,
                    requests_per_minute: 60,
                    priority: 20,
                    cost_weight: 1.0,
                    base_url: "https://api.openai.com/v1".to_string(),
                    model: Some("gpt-4o-mini".to_string()),
                    api_key_env: Some("OPENAI_API_KEY".to_string()),
                    timeout_secs: None,
                },
                ProviderConfig {
                    name: "ollama".to_string(),
                    kind: ProviderKind::Ollama,
                    capabilities: ProviderKind::Ollama.supported_capabilities().to_vec(),
                    enabled: true,
                    requests_per_minute: 30,
                    priority: 10,
                    cost_weight: 0.0,
                    base_url: "http://localhost:11434".to_string(),
                    model: Some("llama3.1:8b".to_string()),
                    api_key_env: None,
                    timeout_secs: None,
                },
                ProviderConfig {
                    name: "languagetool".to_string(),
                    kind: ProviderKind::LanguageTool,
                    capabilities: vec![Capability::GrammarAnalysis],
                    enabled: true,
                    requests_per_minute: 20,
                    priority: 5,
                    cost_weight: 0.0,
                    base_url: "https://api.languagetool.org".to_string(),
                    model: None,
                    api_key_env: None,
                    timeout_secs: None,
                },
                ProviderConfig {
                    name: "whisper".to_string(),
                    kind: ProviderKind::Whisper,
                    capabilities: vec![Capability::SpeechToText],
                    enabled: true,
                    requests_per_minute: 50,
                    priority: 10,
                    cost_weight: 0.6,
                    base_url: "https://api.openai.com/v1".to_string(),
                    model: Some("whisper-1".to_string()),
                    api_key_env: Some("OPENAI_API_KEY".to_string()),
                    timeout_secs: Some(120),
                },
            ],
        }
    }

    /// Validate and process configuration
    ///
    /// Expands `~` in the data directory and creates it. Providers whose API
    /// key variable is unset stay registered but are disabled.
    fn validate_and_process(&mut self) -> Result<(), EngineError> {
        let valid_log_levels = ["error", "warn", "info", "debug", "trace"];
        if !valid_log_levels.contains(&self.core.log_level.as_str()) {
            return Err(EngineError::Config(format!(
                "Invalid log level '{}'. Must be one of: {}",
                self.core.log_level,
                valid_log_levels.join(", ")
            )));
        }

        if self.evaluation.provider_timeout_secs == 0 {
            return Err(EngineError::Config(
                "provider_timeout_secs must be greater than 0".to_string(),
            ));
        }

        let mut names = HashSet::new();
        for provider in &mut self.providers {
            validate_provider(provider)?;

            if !names.insert(provider.name.clone()) {
                return Err(EngineError::Config(format!(
                    "Duplicate provider name '{}'",
                    provider.name
                )));
            }

            if provider.enabled {
                if let Some(var) = &provider.api_key_env {
                    if provider.resolve_api_key().is_none() {
                        warn!(
                            "Provider '{}' disabled: environment variable {} is not set",
                            provider.name, var
                        );
                        provider.enabled = false;
                    }
                }
            }
        }

        self.core.data_dir = expand_path(&self.core.data_dir)?;

        if !self.core.data_dir.exists() {
            fs::create_dir_all(&self.core.data_dir).map_err(|e| {
                EngineError::Config(format!("Failed to create data directory: {}", e))
            })?;
        }

        Ok(())
    }
}

fn validate_provider(provider: &ProviderConfig) -> Result<(), EngineError> {
    if provider.name.trim().is_empty() {
        return Err(EngineError::Config(
            "Provider name must not be empty".to_string(),
        ));
    }

    if provider.capabilities.is_empty() {
        return Err(EngineError::Config(format!(
            "Provider '{}' must declare at least one capability",
            provider.name
        )));
    }

    let supported = provider.kind.supported_capabilities();
    if let Some(unsupported) = provider
        .capabilities
        .iter()
        .find(|c| !supported.contains(c))
    {
        return Err(EngineError::Config(format!(
            "Provider '{}' of kind {:?} cannot serve {}",
            provider.name, provider.kind, unsupported
        )));
    }

    if provider.requests_per_minute == 0 {
        return Err(EngineError::Config(format!(
            "Provider '{}': requests_per_minute must be greater than 0",
            provider.name
        )));
    }

    if provider.timeout_secs == Some(0) {
        return Err(EngineError::Config(format!(
            "Provider '{}': timeout_secs must be greater than 0",
            provider.name
        )));
    }

    if !provider.cost_weight.is_finite() || provider.cost_weight < 0.0 {
        return Err(EngineError::Config(format!(
            "Provider '{}': cost_weight must be a non-negative number",
            provider.name
        )));
    }

    Ok(())
}

/// Expand ~ in path to user's home directory
pub(crate) fn expand_path(path: &Path) -> Result<PathBuf, EngineError> {
    let path_str = path
        .to_str()
        .ok_or_else(|| EngineError::Config("Invalid UTF-8 in path".to_string()))?;

    if let Some(rest) = path_str.strip_prefix("~/") {
        let home = dirs::home_dir()
            .ok_or_else(|| EngineError::Config("Could not determine home directory".to_string()))?;

        Ok(home.join(rest))
    } else if path_str == "~" {
        dirs::home_dir()
            .ok_or_else(|| EngineError::Config("Could not determine home directory".to_string()))
    } else {
        Ok(path.to_path_buf())
    }
}
