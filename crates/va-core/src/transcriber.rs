use async_trait::async_trait;

use crate::error::Result;

/// Outcome of transcribing one audio batch.
#[derive(Debug, Clone, PartialEq)]
pub struct TranscriptionOutcome {
    pub text: String,
    pub language: String,
}

/// Turns a WAV-encoded audio batch into text. Implementations call out to
/// a speech-to-text backend; `va-stt::http::HttpTranscriber` is the only
/// one shipped, but the trait lets tests substitute a mock.
#[async_trait]
pub trait Transcriber: Send + Sync {
    async fn transcribe(
        &self,
        wav_bytes: Vec<u8>,
        language: &str,
        model: &str,
    ) -> Result<TranscriptionOutcome>;
}
