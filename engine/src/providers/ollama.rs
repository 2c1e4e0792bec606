//! Ollama chat provider
//!
//! Local models served by Ollama, typically at http://localhost:11434.
//! No API key; requests go to `/api/chat` with streaming disabled.

use async_trait::async_trait;
use reqwest::Client;
use sdk::types::Capability;
use serde::{Deserialize, Serialize};

use super::prompt::{build_messages, parse_reply, ChatMessage};
use super::{
    endpoint, http_client, AnalysisProvider, ProviderError, ProviderRequest, ProviderResponse,
    Result,
};

#[derive(Debug, Clone)]
pub struct OllamaProvider {
    name: String,
    /// Base URL for the Ollama API
    base_url: String,
    /// Model name (e.g. "llama3.1:8b")
    model: String,
    capabilities: Vec<Capability>,
    client: Client,
}

impl OllamaProvider {
    pub fn new(
        name: impl Into<String>,
        base_url: impl Into<String>,
        model: impl Into<String>,
        capabilities: Vec<Capability>,
    ) -> Result<Self> {
        Ok(Self {
            name: name.into(),
            base_url: base_url.into(),
            model: model.into(),
            capabilities,
            client: http_client()?,
        })
    }
}

#[async_trait]
impl AnalysisProvider for OllamaProvider {
    fn name(&self) -> &str {
        &self.name
    }

    fn capabilities(&self) -> &[Capability] {
        &self.capabilities
    }

    async fn check_health(&self) -> bool {
        self.client
            .get(endpoint(&self.base_url, "api/tags"))
            .send()
            .await
            .map(|r| r.status().is_success())
            .unwrap_or(false)
    }

    async fn invoke(&self, request: &ProviderRequest) -> Result<ProviderResponse> {
        if !self.capabilities.contains(&request.capability()) {
            return Err(ProviderError::Unsupported(request.capability()));
        }

        let body = OllamaRequest {
            model: self.model.clone(),
            messages: build_messages(request)?,
            stream: false,
            format: "json",
        };

        let start = std::time::Instant::now();
        let response = self
            .client
            .post(endpoint(&self.base_url, "api/chat"))
            .json(&body)
            .send()
            .await
            .map_err(|e| ProviderError::from_reqwest(e, &self.base_url))?;

        tracing::debug!(
            "{} responded in {:.1}s for {}",
            self.name,
            start.elapsed().as_secs_f64(),
            request.capability()
        );

        if !response.status().is_success() {
            let status = response.status();
            let error_text = response.text().await.unwrap_or_default();
            return Err(ProviderError::from_status(status, error_text));
        }

        let ollama_response: OllamaResponse = response.json().await.map_err(|e| {
            ProviderError::InvalidResponse(format!("Failed to parse Ollama response: {}", e))
        })?;

        parse_reply(request, &ollama_response.message.content)
    }
}

/// Ollama API request format
#[derive(Debug, Serialize)]
struct OllamaRequest {
    model: String,
    messages: Vec<ChatMessage>,
    stream: bool,
    format: &'static str,
}

/// Ollama API response format
#[derive(Debug, Deserialize)]
struct OllamaResponse {
    message: ChatMessage,
}
