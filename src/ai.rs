//! Text-suggestion gateway backed by the Gemini `generateContent` API.

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, warn};

pub const DEFAULT_MODEL: &str = "gemini-2.0-flash";
pub const DEFAULT_BASE_URL: &str = "https://generativelanguage.googleapis.com";

#[derive(Debug, Error)]
pub enum AiError {
    #[error("AI features are disabled: no API key configured")]
    Unavailable,

    #[error("request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("API returned {status}: {message}")]
    Api { status: u16, message: String },

    #[error("the model returned no text")]
    EmptyResponse,
}

impl AiError {
    /// Text shown to users in place of a suggestion.
    pub fn user_message(&self) -> String {
        format!("Error: {self}")
    }
}

#[async_trait]
pub trait SuggestionProvider: Send + Sync {
    /// Whether a credential is configured.
    fn is_available(&self) -> bool;

    async fn generate_text_suggestion(&self, prompt: &str) -> Result<String, AiError>;
}

pub struct GeminiProvider {
    client: Client,
    base_url: String,
    model: String,
    api_key: Option<String>,
}

impl GeminiProvider {
    #[must_use]
    pub fn new(client: Client, api_key: Option<String>, model: String, base_url: String) -> Self {
        Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            model,
            api_key: api_key.filter(|k| !k.trim().is_empty()),
        }
    }
}

#[async_trait]
impl SuggestionProvider for GeminiProvider {
    fn is_available(&self) -> bool {
        self.api_key.is_some()
    }

    async fn generate_text_suggestion(&self, prompt: &str) -> Result<String, AiError> {
        let api_key = self.api_key.as_deref().ok_or(AiError::Unavailable)?;
        let url = format!(
            "{}/v1beta/models/{}:generateContent",
            self.base_url, self.model
        );
        debug!(model = %self.model, prompt_len = prompt.len(), "Requesting text suggestion");

        let response = self
            .client
            .post(&url)
            .header("x-goog-api-key", api_key)
            .json(&to_request(prompt))
            .send()
            .await?;

        if !response.status().is_success() {
            let status = response.status().as_u16();
            let message = response.text().await.unwrap_or_default();
            warn!(status, "Suggestion request rejected");
            return Err(AiError::Api { status, message });
        }

        let body: Response = response.json().await?;
        from_response(body)
    }
}

// ============================================================================
// Request/Response Types
// ============================================================================

#[derive(Serialize)]
struct Request {
    contents: Vec<RequestContent>,
}

#[derive(Serialize)]
struct RequestContent {
    parts: Vec<Part>,
}

#[derive(Serialize, Deserialize)]
struct Part {
    #[serde(default)]
    text: String,
}

#[derive(Deserialize)]
struct Response {
    #[serde(default)]
    candidates: Vec<Candidate>,
}

#[derive(Deserialize)]
struct Candidate {
    content: Option<CandidateContent>,
}

#[derive(Deserialize)]
struct CandidateContent {
    #[serde(default)]
    parts: Vec<Part>,
}

fn to_request(prompt: &str) -> Request {
    Request {
        contents: vec![RequestContent {
            parts: vec![Part {
                text: prompt.to_string(),
            }],
        }],
    }
}

fn from_response(response: Response) -> Result<String, AiError> {
    let text: String = response
        .candidates
        .into_iter()
        .next()
        .and_then(|c| c.content)
        .map(|content| content.parts.into_iter().map(|p| p.text).collect())
        .unwrap_or_default();
    let text = text.trim();
    if text.is_empty() {
        Err(AiError::EmptyResponse)
    } else {
        Ok(text.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[tokio::test]
    async fn test_missing_key_is_unavailable() {
        let provider = GeminiProvider::new(
            Client::new(),
            Some("   ".into()),
            DEFAULT_MODEL.into(),
            DEFAULT_BASE_URL.into(),
        );
        assert!(!provider.is_available());
        let err = provider.generate_text_suggestion("hi").await.unwrap_err();
        assert!(matches!(err, AiError::Unavailable));
        assert!(err.user_message().starts_with("Error:"));
    }

    #[test]
    fn test_request_shape() {
        let value = serde_json::to_value(to_request("Suggest a subject")).unwrap();
        assert_eq!(value, json!({"contents": [{"parts": [{"text": "Suggest a subject"}]}]}));
    }

    #[test]
    fn test_response_parts_are_joined_and_trimmed() {
        let response: Response = serde_json::from_value(json!({
            "candidates": [{"content": {"parts": [{"text": " Big "}, {"text": "News\n"}]}}]
        }))
        .unwrap();
        assert_eq!(from_response(response).unwrap(), "Big News");
    }

    #[test]
    fn test_empty_candidates_is_an_error() {
        let response: Response = serde_json::from_value(json!({"candidates": []})).unwrap();
        assert!(matches!(from_response(response), Err(AiError::EmptyResponse)));
    }
}
