use thiserror::Error;

/// Workspace-wide error type. Subsystem crates define their own narrower
/// error enum at their boundary (`va_audio::AudioError`, `va_stt::SttError`,
/// `va_llm::LlmError`, `va_store::StoreError`) and convert into this one
/// where they cross into the pipeline/server layer.
#[derive(Error, Debug)]
pub enum CoreError {
    /// Frame failed WAV validation (RIFF/WAVE, PCM, mono, 16kHz, 16-bit).
    #[error("invalid audio frame: {0}")]
    InvalidFrame(String),

    /// Intake queue high-water mark breached; oldest frame was dropped.
    #[error("intake queue overflow for session {session_id}")]
    Overflow { session_id: String },

    /// Transcriber exceeded its soft deadline.
    #[error("transcriber timed out after {0}s")]
    TranscriberTimeout(u64),

    /// Transcriber returned an error.
    #[error("transcriber error: {0}")]
    TranscriberError(String),

    /// A pipeline found zero transcripts to work with.
    #[error("no content to process for session {0}")]
    NoContent(String),

    /// LLM invocation failed.
    #[error("LLM call failed: {0}")]
    LlmFailure(String),

    /// Mind-map JSON was unparseable even after one repair attempt.
    #[error("invalid mind-map JSON after repair: {0}")]
    InvalidMindMap(String),

    /// Reference to a session that does not exist.
    #[error("session not found: {0}")]
    SessionNotFound(String),

    #[error("store error: {0}")]
    Store(String),

    #[error("config error: {0}")]
    Config(String),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("TOML error: {0}")]
    Toml(#[from] toml::de::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, CoreError>;
