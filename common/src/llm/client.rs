use crate::error::{Result, SqlGenError};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::env;
use std::time::Duration;

const BASE_URL: &str = "https://generativelanguage.googleapis.com/v1beta/models";
const DEFAULT_MODEL: &str = "gemini-2.5-flash";
const API_KEY_VAR: &str = "GEMINI_API_KEY";
const MODEL_VAR: &str = "GEMINI_MODEL";

/// Narrow seam to the remote text-generation service: one prompt string
/// in, one completion string out. The workflow controller and all of its
/// tests depend only on this trait.
#[async_trait]
pub trait CompletionService: Send + Sync {
    async fn complete(&self, prompt: &str) -> Result<String>;
}

#[derive(Serialize)]
struct GenerateRequest {
    contents: Vec<Content>,
}

#[derive(Serialize, Deserialize)]
struct Content {
    parts: Vec<Part>,
}

#[derive(Serialize, Deserialize)]
struct Part {
    text: String,
}

#[derive(Deserialize)]
struct GenerateResponse {
    candidates: Option<Vec<Candidate>>,
}

#[derive(Deserialize)]
struct Candidate {
    content: Option<Content>,
}

fn extract_text(response: GenerateResponse) -> Result<String> {
    response
        .candidates
        .and_then(|mut candidates| {
            if candidates.is_empty() {
                None
            } else {
                Some(candidates.remove(0))
            }
        })
        .and_then(|candidate| candidate.content)
        .and_then(|mut content| {
            if content.parts.is_empty() {
                None
            } else {
                Some(content.parts.remove(0).text)
            }
        })
        .ok_or_else(|| {
            SqlGenError::Generation("completion response contained no candidates".to_string())
        })
}

fn truncate_body(body: &str) -> String {
    const LIMIT: usize = 500;

    if body.len() <= LIMIT {
        return body.to_string();
    }

    // cut must land on a char boundary or the slice below panics
    let mut end = LIMIT;
    while !body.is_char_boundary(end) {
        end -= 1;
    }
    format!("{}... (truncated)", &body[..end])
}

/// Client for the Gemini `generateContent` REST endpoint.
pub struct GeminiClient {
    client: reqwest::Client,
    api_key: String,
    model: String,
}

impl GeminiClient {
    pub fn new(api_key: impl Into<String>, model: impl Into<String>) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(30))
            .build()
            .map_err(|e| SqlGenError::Generation(format!("failed to build http client: {}", e)))?;

        Ok(Self {
            client,
            api_key: api_key.into(),
            model: model.into(),
        })
    }

    /// Read the API credential from the environment. A missing or empty
    /// `GEMINI_API_KEY` is a fatal configuration error at startup, not a
    /// per-call failure.
    pub fn from_env() -> Result<Self> {
        let api_key = env::var(API_KEY_VAR)
            .ok()
            .filter(|v| !v.is_empty())
            .ok_or_else(|| {
                SqlGenError::Config(format!("{} environment variable is not set", API_KEY_VAR))
            })?;

        let model = env::var(MODEL_VAR)
            .ok()
            .filter(|v| !v.is_empty())
            .unwrap_or_else(|| DEFAULT_MODEL.to_string());

        Self::new(api_key, model)
    }

    pub fn model(&self) -> &str {
        &self.model
    }
}

#[async_trait]
impl CompletionService for GeminiClient {
    #[tracing::instrument(skip(self, prompt), fields(model = %self.model, prompt_len = prompt.len()))]
    async fn complete(&self, prompt: &str) -> Result<String> {
        let url = format!("{}/{}:generateContent", BASE_URL, self.model);
        let body = GenerateRequest {
            contents: vec![Content {
                parts: vec![Part {
                    text: prompt.to_string(),
                }],
            }],
        };

        let response = self
            .client
            .post(&url)
            .header("x-goog-api-key", &self.api_key)
            .json(&body)
            .send()
            .await
            .map_err(|e| SqlGenError::Generation(format!("request to {} failed: {}", url, e)))?;

        let status = response.status();
        let text = response.text().await.map_err(|e| {
            SqlGenError::Generation(format!("failed to read response body: {}", e))
        })?;

        if !status.is_success() {
            return Err(SqlGenError::Generation(format!(
                "HTTP {} from generation service: {}",
                status.as_u16(),
                truncate_body(&text)
            )));
        }

        let parsed: GenerateResponse = serde_json::from_str(&text)
            .map_err(|e| SqlGenError::Generation(format!("malformed service response: {}", e)))?;

        let completion = extract_text(parsed)?;
        tracing::debug!("received {} chars", completion.len());

        Ok(completion)
    }
}
