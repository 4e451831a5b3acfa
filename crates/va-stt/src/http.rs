use async_trait::async_trait;
use reqwest::multipart::{Form, Part};
use serde::Deserialize;

use va_core::error::Result;
use va_core::transcriber::{Transcriber, TranscriptionOutcome};

use crate::error::SttError;

#[derive(Debug, Deserialize)]
struct WhisperResponse {
    text: String,
    #[serde(default)]
    language: Option<String>,
}

/// Transcriber backed by an OpenAI-compatible `/audio/transcriptions`
/// endpoint (whisper.cpp, faster-whisper, LocalAI, the real OpenAI API).
pub struct HttpTranscriber {
    client: reqwest::Client,
    base_url: String,
    api_key: Option<String>,
}

impl HttpTranscriber {
    pub fn new(base_url: String, api_key: Option<String>) -> Self {
        Self {
            client: reqwest::Client::new(),
            base_url,
            api_key: api_key.filter(|k| !k.is_empty()),
        }
    }

    async fn call(&self, wav_bytes: Vec<u8>, language: &str, model: &str) -> std::result::Result<TranscriptionOutcome, SttError> {
        let part = Part::bytes(wav_bytes)
            .file_name("audio.wav")
            .mime_str("audio/wav")
            .map_err(|e| SttError::RequestFailed(e.to_string()))?;

        let mut form = Form::new()
            .part("file", part)
            .text("model", model.to_string())
            .text("response_format", "json");

        if language != "auto" && !language.is_empty() {
            form = form.text("language", language.to_string());
        }

        let url = format!("{}/audio/transcriptions", self.base_url.trim_end_matches('/'));
        let mut request = self.client.post(&url);
        if let Some(ref key) = self.api_key {
            request = request.header("Authorization", format!("Bearer {key}"));
        }

        let response = request
            .multipart(form)
            .send()
            .await
            .map_err(|e| SttError::RequestFailed(e.to_string()))?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response
                .text()
                .await
                .unwrap_or_else(|_| "<no body>".to_string());
            return Err(SttError::BackendError {
                status: status.as_u16(),
                body,
            });
        }

        let parsed: WhisperResponse = response
            .json()
            .await
            .map_err(|e| SttError::InvalidResponse(e.to_string()))?;

        Ok(TranscriptionOutcome {
            text: parsed.text,
            language: parsed.language.unwrap_or_else(|| language.to_string()),
        })
    }
}

#[async_trait]
impl Transcriber for HttpTranscriber {
    async fn transcribe(
        &self,
        wav_bytes: Vec<u8>,
        language: &str,
        model: &str,
    ) -> Result<TranscriptionOutcome> {
        Ok(self.call(wav_bytes, language, model).await?)
    }
}
