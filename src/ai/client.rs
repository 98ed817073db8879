use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::debug;
use url::Url;

use crate::error::AiError;

/// Text generation seam. Implemented over HTTP by [`GeminiClient`].
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait TextGenerator: Send + Sync {
    /// Returns the model's raw reply text.
    async fn generate(&self, api_key: &str, model: &str, prompt: &str) -> Result<String, AiError>;
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct GenerateRequest<'a> {
    contents: Vec<Content<'a>>,
    generation_config: GenerationConfig,
}

#[derive(Serialize)]
struct Content<'a> {
    role: &'static str,
    parts: Vec<Part<'a>>,
}

#[derive(Serialize)]
struct Part<'a> {
    text: &'a str,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct GenerationConfig {
    response_mime_type: &'static str,
}

#[derive(Deserialize)]
struct GenerateResponse {
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
    parts: Vec<ResponsePart>,
}

#[derive(Deserialize)]
struct ResponsePart {
    text: Option<String>,
}

/// Client for the Gemini `generateContent` REST endpoint.
pub struct GeminiClient {
    http: reqwest::Client,
    base_url: Url,
}

impl GeminiClient {
    pub fn new(base_url: &str, timeout: Duration) -> Result<Self, AiError> {
        let mut normalized = base_url.trim_end_matches('/').to_string();
        normalized.push('/');
        let base_url = Url::parse(&normalized)
            .map_err(|e| AiError::RequestFailed(format!("Invalid AI base URL: {}", e)))?;

        let http = reqwest::Client::builder()
            .timeout(timeout)
            .build()?;

        Ok(Self { http, base_url })
    }

    fn endpoint(&self, model: &str) -> Result<Url, AiError> {
        self.base_url
            .join(&format!("v1beta/models/{}:generateContent", model))
            .map_err(|e| AiError::RequestFailed(format!("Invalid model endpoint: {}", e)))
    }
}

#[async_trait]
impl TextGenerator for GeminiClient {
    async fn generate(&self, api_key: &str, model: &str, prompt: &str) -> Result<String, AiError> {
        let body = GenerateRequest {
            contents: vec![Content {
                role: "user",
                parts: vec![Part { text: prompt }],
            }],
            generation_config: GenerationConfig {
                response_mime_type: "application/json",
            },
        };

        let res = self.http
            .post(self.endpoint(model)?)
            .header("x-goog-api-key", api_key)
            .json(&body)
            .send()
            .await?;

        let status = res.status();
        if !status.is_success() {
            let detail = res.text().await.unwrap_or_default();
            debug!("Gemini returned {}: {}", status, detail);
            return Err(match status.as_u16() {
                429 => AiError::QuotaExceeded,
                401 | 403 => AiError::InvalidApiKey,
                400 if detail.contains("API key") => AiError::InvalidApiKey,
                _ => AiError::ResponseError(format!("status {}", status)),
            });
        }

        let parsed: GenerateResponse = res.json().await?;
        let text: String = parsed
            .candidates
            .into_iter()
            .next()
            .and_then(|c| c.content)
            .map(|c| c.parts.into_iter().filter_map(|p| p.text).collect())
            .unwrap_or_default();

        if text.trim().is_empty() {
            return Err(AiError::MalformedResponse("empty candidate text".to_string()));
        }
        Ok(text)
    }
}

/// Drops a surrounding Markdown code fence (```json ... ```), if any.
pub fn strip_code_fence(raw: &str) -> &str {
    let trimmed = raw.trim();
    let Some(rest) = trimmed.strip_prefix("```") else {
        return trimmed;
    };
    // skip the info string ("json") up to the first newline
    let body = match rest.find('\n') {
        Some(idx) => &rest[idx + 1..],
        None => rest,
    };
    body.trim_end().strip_suffix("```").unwrap_or(body).trim()
}

/// Parses a model reply as JSON of type `T`.
pub fn parse_reply<T: serde::de::DeserializeOwned>(raw: &str) -> Result<T, AiError> {
    serde_json::from_str(strip_code_fence(raw))
        .map_err(|e| AiError::MalformedResponse(e.to_string()))
}
