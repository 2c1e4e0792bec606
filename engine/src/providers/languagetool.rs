//! LanguageTool grammar provider
//!
//! Posts the transcript to `{base_url}/v2/check` and maps each match to a
//! grammar issue. Rule identifiers are folded into the error-type names used
//! for severity classification.

use async_trait::async_trait;
use reqwest::Client;
use sdk::types::Capability;
use serde::Deserialize;

use super::{
    endpoint, http_client, AnalysisProvider, GrammarIssue, ProviderError, ProviderRequest,
    ProviderResponse, Result,
};

const CAPABILITIES: &[Capability] = &[Capability::GrammarAnalysis];

pub struct LanguageToolProvider {
    name: String,
    base_url: String,
    client: Client,
}

impl LanguageToolProvider {
    pub fn new(name: impl Into<String>, base_url: impl Into<String>) -> Result<Self> {
        Ok(Self {
            name: name.into(),
            base_url: base_url.into(),
            client: http_client()?,
        })
    }
}

#[async_trait]
impl AnalysisProvider for LanguageToolProvider {
    fn name(&self) -> &str {
        &self.name
    }

    fn capabilities(&self) -> &[Capability] {
        CAPABILITIES
    }

    async fn check_health(&self) -> bool {
        self.client
            .get(endpoint(&self.base_url, "v2/languages"))
            .send()
            .await
            .map(|r| r.status().is_success())
            .unwrap_or(false)
    }

    async fn invoke(&self, request: &ProviderRequest) -> Result<ProviderResponse> {
        let ProviderRequest::Grammar { text, language } = request else {
            return Err(ProviderError::Unsupported(request.capability()));
        };

        let response = self
            .client
            .post(endpoint(&self.base_url, "v2/check"))
            .form(&[("text", text.as_str()), ("language", language.as_str())])
            .send()
            .await
            .map_err(|e| ProviderError::from_reqwest(e, &self.base_url))?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(ProviderError::from_status(status, body));
        }

        let check: CheckResponse = response
            .json()
            .await
            .map_err(|e| ProviderError::InvalidResponse(e.to_string()))?;

        let issues = check
            .matches
            .into_iter()
            .map(|m| {
                let (start, end) = char_span(text, m.offset, m.length);
                GrammarIssue {
                    error_type: error_type_for(&m.rule),
                    description: m.message,
                    suggestion: m.replacements.into_iter().next().map(|r| r.value),
                    start,
                    end,
                }
            })
            .collect();

        Ok(ProviderResponse::Grammar(issues))
    }
}

/// Fold a LanguageTool rule into an error-type name
fn error_type_for(rule: &Rule) -> String {
    let id = rule.id.to_ascii_uppercase();
    if id.contains("AGR") || id.contains("SVA") {
        "subject-verb-agreement".to_string()
    } else if id.contains("TENSE") || id.contains("PAST") {
        "verb-tense".to_string()
    } else if id.contains("A_AN")
        || id.contains("A_VS_AN")
        || id.contains("ARTICLE")
        || id.contains("DT_")
    {
        "article".to_string()
    } else if id.contains("PREPOSITION") || id.contains("_PREP") {
        "preposition".to_string()
    } else {
        match rule.category.id.as_str() {
            "TYPOS" => "spelling".to_string(),
            "PUNCTUATION" => "punctuation".to_string(),
            "CASING" => "capitalization".to_string(),
            other => other.to_ascii_lowercase().replace('_', "-"),
        }
    }
}

/// Convert a match given in UTF-16 code units into a character span,
/// clamped to the text
fn char_span(text: &str, offset: usize, length: usize) -> (usize, usize) {
    let start = char_index(text, offset);
    let end = char_index(text, offset.saturating_add(length)).max(start);
    (start, end)
}

/// Number of characters that end at or before the UTF-16 unit `units`.
/// An offset that splits a surrogate pair rounds up to the next character.
fn char_index(text: &str, units: usize) -> usize {
    let mut consumed = 0;
    for (index, c) in text.chars().enumerate() {
        if consumed >= units {
            return index;
        }
        consumed += c.len_utf16();
    }
    text.chars().count()
}

#[derive(Debug, Deserialize)]
struct CheckResponse {
    #[serde(default)]
    matches: Vec<Match>,
}

#[derive(Debug, Deserialize)]
struct Match {
    message: String,
    offset: usize,
    length: usize,
    #[serde(default)]
    replacements: Vec<Replacement>,
    rule: Rule,
}

#[derive(Debug, Deserialize)]
struct Replacement {
    value: String,
}

#[derive(Debug, Deserialize)]
struct Rule {
    id: String,
    category: Category,
}

#[derive(Debug, Deserialize)]
struct Category {
    id: String,
}
