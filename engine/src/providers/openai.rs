//! OpenAI-compatible chat provider
//!
//! Sends the analysis prompt to `{base_url}/chat/completions` and parses the
//! JSON object out of the first choice. Works with any endpoint speaking the
//! chat-completions protocol.

use async_trait::async_trait;
use sdk::types::Capability;
use serde_json::json;

use super::prompt::{build_messages, parse_reply};
use super::{
    endpoint, http_client, AnalysisProvider, ProviderError, ProviderRequest, ProviderResponse,
    Result,
};

pub struct OpenAIProvider {
    name: String,
    base_url: String,
    model: String,
    api_key: Option<String>,
    capabilities: Vec<Capability>,
    client: reqwest::Client,
}

impl OpenAIProvider {
    pub fn new(
        name: impl Into<String>,
        base_url: impl Into<String>,
        model: impl Into<String>,
        api_key: Option<String>,
        capabilities: Vec<Capability>,
    ) -> Result<Self> {
        Ok(Self {
            name: name.into(),
            base_url: base_url.into(),
            model: model.into(),
            api_key,
            capabilities,
            client: http_client()?,
        })
    }
}

#[async_trait]
impl AnalysisProvider for OpenAIProvider {
    fn name(&self) -> &str {
        &self.name
    }

    fn capabilities(&self) -> &[Capability] {
        &self.capabilities
    }

    async fn check_health(&self) -> bool {
        let Some(api_key) = &self.api_key else {
            return false;
        };
        self.client
            .get(endpoint(&self.base_url, "models"))
            .bearer_auth(api_key)
            .send()
            .await
            .map(|r| r.status().is_success())
            .unwrap_or(false)
    }

    async fn invoke(&self, request: &ProviderRequest) -> Result<ProviderResponse> {
        if !self.capabilities.contains(&request.capability()) {
            return Err(ProviderError::Unsupported(request.capability()));
        }

        let api_key = self
            .api_key
            .as_deref()
            .ok_or_else(|| ProviderError::Authentication("API key not set".to_string()))?;

        let payload = json!({
            "model": self.model,
            "messages": build_messages(request)?,
            "temperature": 0.1,
        });

        let response = self
            .client
            .post(endpoint(&self.base_url, "chat/completions"))
            .bearer_auth(api_key)
            .json(&payload)
            .send()
            .await
            .map_err(|e| ProviderError::from_reqwest(e, &self.base_url))?;

        if !response.status().is_success() {
            let status = response.status();
            let text = response.text().await.unwrap_or_default();
            return Err(ProviderError::from_status(status, text));
        }

        let data: serde_json::Value = response
            .json()
            .await
            .map_err(|e| ProviderError::InvalidResponse(e.to_string()))?;

        let content = data
            .get("choices")
            .and_then(|c| c.as_array())
            .and_then(|c| c.first())
            .and_then(|choice| choice.get("message"))
            .and_then(|message| message.get("content"))
            .and_then(|content| content.as_str())
            .ok_or_else(|| ProviderError::InvalidResponse("no content in response".to_string()))?;

        tracing::debug!(
            "{} replied with {} chars for {}",
            self.name,
            content.len(),
            request.capability()
        );

        parse_reply(request, content)
    }
}
