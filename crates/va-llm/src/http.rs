use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;

use va_core::error::{CoreError, Result};
use va_core::llm::LlmInvoker;

/// API format determines how requests and responses are serialized.
/// `Custom` covers Ollama-compatible local servers, which speak the
/// OpenAI chat-completions shape but need no `Authorization` header.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ApiFormat {
    OpenAi,
    Claude,
    GeminiApi,
    Custom,
}

pub const OPENAI_DEFAULT_MODEL: &str = "gpt-4o-mini";
pub const CLAUDE_DEFAULT_MODEL: &str = "claude-sonnet-4-20250514";
pub const GEMINI_API_DEFAULT_MODEL: &str = "gemini-2.0-flash";

/// HTTP-based LLM invoker supporting multiple API formats. One instance
/// is bound to one backend (format + base URL + key); the model name is
/// supplied per call since `SummaryPipeline`/`MindMapPipeline` each
/// resolve their own model from `EffectiveSettings`.
pub struct HttpLlmInvoker {
    client: Client,
    api_format: ApiFormat,
    base_url: String,
    api_key: String,
    timeout_secs: u64,
}

impl HttpLlmInvoker {
    pub fn openai(api_key: String) -> Self {
        Self::new(ApiFormat::OpenAi, "https://api.openai.com/v1".to_string(), api_key)
    }

    pub fn claude(api_key: String) -> Self {
        Self::new(ApiFormat::Claude, "https://api.anthropic.com".to_string(), api_key)
    }

    pub fn gemini_api(api_key: String) -> Self {
        Self::new(
            ApiFormat::GeminiApi,
            "https://generativelanguage.googleapis.com".to_string(),
            api_key,
        )
    }

    /// An OpenAI-compatible custom endpoint (Ollama, vLLM, LocalAI, ...).
    pub fn custom(base_url: String, api_key: String) -> Self {
        Self::new(ApiFormat::Custom, base_url, api_key)
    }

    fn new(api_format: ApiFormat, base_url: String, api_key: String) -> Self {
        Self {
            client: Client::new(),
            api_format,
            base_url,
            api_key,
            timeout_secs: 30,
        }
    }

    fn build_request(&self, model: &str, prompt: &str) -> Result<reqwest::RequestBuilder> {
        match self.api_format {
            ApiFormat::OpenAi | ApiFormat::Custom => {
                let url = format!("{}/chat/completions", self.base_url);
                let body = serde_json::json!({
                    "model": model,
                    "messages": [
                        { "role": "system", "content": "You are a helpful assistant. Follow the instructions precisely and return only what is asked for." },
                        { "role": "user", "content": prompt }
                    ]
                });
                let mut request = self.client.post(&url).json(&body);
                if !self.api_key.is_empty() {
                    request = request.header("Authorization", format!("Bearer {}", self.api_key));
                }
                Ok(request)
            }
            ApiFormat::Claude => {
                let url = format!("{}/v1/messages", self.base_url);
                let body = serde_json::json!({
                    "model": model,
                    "max_tokens": 4096,
                    "messages": [
                        { "role": "user", "content": prompt }
                    ]
                });
                Ok(self
                    .client
                    .post(&url)
                    .header("x-api-key", &self.api_key)
                    .header("anthropic-version", "2023-06-01")
                    .header("content-type", "application/json")
                    .json(&body))
            }
            ApiFormat::GeminiApi => {
                let url = format!(
                    "{}/v1beta/models/{}:generateContent?key={}",
                    self.base_url, model, self.api_key
                );
                let body = serde_json::json!({
                    "contents": [{ "parts": [{ "text": prompt }] }]
                });
                Ok(self.client.post(&url).json(&body))
            }
        }
    }

    fn extract_response(&self, json: &serde_json::Value) -> Result<String> {
        let text = match self.api_format {
            ApiFormat::OpenAi | ApiFormat::Custom => json
                .get("choices")
                .and_then(|c| c.get(0))
                .and_then(|c| c.get("message"))
                .and_then(|m| m.get("content"))
                .and_then(|c| c.as_str()),
            ApiFormat::Claude => json
                .get("content")
                .and_then(|c| c.get(0))
                .and_then(|c| c.get("text"))
                .and_then(|t| t.as_str()),
            ApiFormat::GeminiApi => json
                .get("candidates")
                .and_then(|c| c.get(0))
                .and_then(|c| c.get("content"))
                .and_then(|c| c.get("parts"))
                .and_then(|p| p.get(0))
                .and_then(|p| p.get("text"))
                .and_then(|t| t.as_str()),
        };

        text.map(|s| s.to_string()).ok_or_else(|| {
            CoreError::LlmFailure(format!(
                "failed to extract text from API response: {}",
                serde_json::to_string_pretty(json).unwrap_or_default()
            ))
        })
    }

    fn map_http_error(&self, status: reqwest::StatusCode, body: &str) -> CoreError {
        match status.as_u16() {
            401 => CoreError::LlmFailure("authentication failed, check API key".to_string()),
            429 => CoreError::LlmFailure("rate limited, try again later".to_string()),
            500..=599 => CoreError::LlmFailure("upstream server error".to_string()),
            _ => CoreError::LlmFailure(format!(
                "request failed (HTTP {status}): {}",
                body.chars().take(200).collect::<String>()
            )),
        }
    }
}

#[async_trait]
impl LlmInvoker for HttpLlmInvoker {
    async fn complete(&self, model: &str, prompt: &str) -> Result<String> {
        let request = self.build_request(model, prompt)?;

        let response = request
            .timeout(Duration::from_secs(self.timeout_secs))
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    CoreError::LlmFailure(format!("request timed out ({}s)", self.timeout_secs))
                } else if e.is_connect() {
                    CoreError::LlmFailure(format!("failed to connect to {}", self.base_url))
                } else {
                    CoreError::LlmFailure(format!("HTTP request failed: {e}"))
                }
            })?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            tracing::error!(%status, %body, "LLM API error");
            return Err(self.map_http_error(status, &body));
        }

        let json: serde_json::Value = response
            .json()
            .await
            .map_err(|e| CoreError::LlmFailure(format!("failed to parse API response: {e}")))?;

        self.extract_response(&json)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn openai_constructor_sets_base_url() {
        let invoker = HttpLlmInvoker::openai("test-key".to_string());
        assert_eq!(invoker.base_url, "https://api.openai.com/v1");
        assert_eq!(invoker.api_format, ApiFormat::OpenAi);
    }

    #[test]
    fn custom_constructor_uses_given_url() {
        let invoker =
            HttpLlmInvoker::custom("http://localhost:11434/v1".to_string(), "".to_string());
        assert_eq!(invoker.base_url, "http://localhost:11434/v1");
        assert_eq!(invoker.api_format, ApiFormat::Custom);
    }

    #[test]
    fn extract_openai_response() {
        let invoker = HttpLlmInvoker::openai("key".to_string());
        let json = serde_json::json!({
            "choices": [{ "message": { "content": "Hello world" } }]
        });
        assert_eq!(invoker.extract_response(&json).unwrap(), "Hello world");
    }

    #[test]
    fn extract_claude_response() {
        let invoker = HttpLlmInvoker::claude("key".to_string());
        let json = serde_json::json!({
            "content": [{ "type": "text", "text": "Hello world" }]
        });
        assert_eq!(invoker.extract_response(&json).unwrap(), "Hello world");
    }

    #[test]
    fn extract_gemini_response() {
        let invoker = HttpLlmInvoker::gemini_api("key".to_string());
        let json = serde_json::json!({
            "candidates": [{ "content": { "parts": [{ "text": "Hello world" }] } }]
        });
        assert_eq!(invoker.extract_response(&json).unwrap(), "Hello world");
    }

    #[test]
    fn missing_field_is_an_error() {
        let invoker = HttpLlmInvoker::openai("key".to_string());
        let json = serde_json::json!({ "choices": [] });
        assert!(invoker.extract_response(&json).is_err());
    }
}
