//! OpenAI-compatible speech-to-text provider
//!
//! Uploads the raw audio bytes to `{base_url}/audio/transcriptions` as
//! multipart form data and asks for `verbose_json`, whose segments carry an
//! average log-probability that becomes the segment confidence.

use async_trait::async_trait;
use reqwest::multipart::{Form, Part};
use sdk::types::Capability;
use serde::Deserialize;

use super::{
    endpoint, http_client, AnalysisProvider, ProviderError, ProviderRequest, ProviderResponse,
    Result, Transcript, TranscriptSegment,
};

const CAPABILITIES: &[Capability] = &[Capability::SpeechToText];

pub struct WhisperProvider {
    name: String,
    base_url: String,
    model: String,
    api_key: Option<String>,
    client: reqwest::Client,
}

impl WhisperProvider {
    pub fn new(
        name: impl Into<String>,
        base_url: impl Into<String>,
        model: impl Into<String>,
        api_key: Option<String>,
    ) -> Result<Self> {
        Ok(Self {
            name: name.into(),
            base_url: base_url.into(),
            model: model.into(),
            api_key,
            client: http_client()?,
        })
    }
}

#[async_trait]
impl AnalysisProvider for WhisperProvider {
    fn name(&self) -> &str {
        &self.name
    }

    fn capabilities(&self) -> &[Capability] {
        CAPABILITIES
    }

    async fn check_health(&self) -> bool {
        self.api_key.is_some()
    }

    async fn invoke(&self, request: &ProviderRequest) -> Result<ProviderResponse> {
        let ProviderRequest::Transcribe { audio, language } = request else {
            return Err(ProviderError::Unsupported(request.capability()));
        };

        if audio.bytes.is_empty() {
            return Err(ProviderError::InvalidRequest("empty audio".to_string()));
        }

        let api_key = self
            .api_key
            .as_deref()
            .ok_or_else(|| ProviderError::Authentication("API key not set".to_string()))?;

        let file = Part::bytes(audio.bytes.clone()).file_name(audio.file_name.clone());
        let mut form = Form::new()
            .part("file", file)
            .text("model", self.model.clone())
            .text("response_format", "verbose_json");
        if let Some(code) = iso_language(language) {
            form = form.text("language", code);
        }

        let response = self
            .client
            .post(endpoint(&self.base_url, "audio/transcriptions"))
            .bearer_auth(api_key)
            .multipart(form)
            .send()
            .await
            .map_err(|e| ProviderError::from_reqwest(e, &self.base_url))?;

        if !response.status().is_success() {
            let status = response.status();
            let text = response.text().await.unwrap_or_default();
            return Err(ProviderError::from_status(status, text));
        }

        let body: VerboseTranscription = response
            .json()
            .await
            .map_err(|e| ProviderError::InvalidResponse(e.to_string()))?;

        Ok(ProviderResponse::Transcript(body.into_transcript()))
    }
}

/// "en-US" -> "en". Whisper expects ISO-639-1 codes.
fn iso_language(language: &str) -> Option<String> {
    let code = language.split(['-', '_']).next()?.trim().to_ascii_lowercase();
    (code.len() == 2).then_some(code)
}

#[derive(Debug, Deserialize)]
struct VerboseTranscription {
    text: String,
    #[serde(default)]
    segments: Vec<VerboseSegment>,
}

#[derive(Debug, Deserialize)]
struct VerboseSegment {
    #[serde(default)]
    text: String,
    #[serde(default)]
    avg_logprob: Option<f64>,
    #[serde(default)]
    confidence: Option<f64>,
}

impl VerboseTranscription {
    fn into_transcript(self) -> Transcript {
        let segments = self
            .segments
            .into_iter()
            .filter_map(|segment| {
                let confidence = segment
                    .confidence
                    .or_else(|| segment.avg_logprob.map(f64::exp))?;
                Some(TranscriptSegment {
                    text: segment.text.trim().to_string(),
                    confidence: if confidence.is_finite() {
                        confidence.clamp(0.0, 1.0)
                    } else {
                        0.0
                    },
                })
            })
            .collect();

        Transcript {
            text: self.text.trim().to_string(),
            segments,
        }
    }
}
