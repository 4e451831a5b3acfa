use async_trait::async_trait;
use std::sync::atomic::{AtomicUsize, Ordering};

use va_core::error::Result;
use va_core::transcriber::{Transcriber, TranscriptionOutcome};

/// Test double that echoes back a fixed transcript and counts calls, so
/// worker/orchestrator tests can assert on call count without a live
/// HTTP backend. Shape grounded on the teacher's own `#[cfg(test)]`
/// `MockSttProvider` in `lt-pipeline::orchestrator`.
pub struct MockTranscriber {
    response_text: String,
    calls: AtomicUsize,
}

impl MockTranscriber {
    pub fn new(response_text: impl Into<String>) -> Self {
        Self {
            response_text: response_text.into(),
            calls: AtomicUsize::new(0),
        }
    }

    pub fn call_count(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Transcriber for MockTranscriber {
    async fn transcribe(
        &self,
        _wav_bytes: Vec<u8>,
        language: &str,
        _model: &str,
    ) -> Result<TranscriptionOutcome> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Ok(TranscriptionOutcome {
            text: self.response_text.clone(),
            language: language.to_string(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn counts_calls_and_echoes_response() {
        let mock = MockTranscriber::new("hello world");
        let outcome = mock.transcribe(vec![], "en", "whisper-1").await.unwrap();
        assert_eq!(outcome.text, "hello world");
        assert_eq!(outcome.language, "en");
        assert_eq!(mock.call_count(), 1);
    }
}
