use thiserror::Error;

#[derive(Error, Debug)]
pub enum LlmError {
    #[error("request failed: {0}")]
    RequestFailed(String),

    #[error("backend returned HTTP {status}: {body}")]
    BackendError { status: u16, body: String },

    #[error("failed to parse response: {0}")]
    InvalidResponse(String),
}

impl From<LlmError> for va_core::error::CoreError {
    fn from(err: LlmError) -> Self {
        va_core::error::CoreError::LlmFailure(err.to_string())
    }
}
