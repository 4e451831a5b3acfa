use thiserror::Error;

pub type Result<T> = std::result::Result<T, SttError>;

#[derive(Error, Debug)]
pub enum SttError {
    #[error("transcription request failed: {0}")]
    RequestFailed(String),

    #[error("transcription backend returned {status}: {body}")]
    BackendError { status: u16, body: String },

    #[error("failed to parse transcription response: {0}")]
    InvalidResponse(String),
}

impl From<SttError> for va_core::error::CoreError {
    fn from(err: SttError) -> Self {
        va_core::error::CoreError::TranscriberError(err.to_string())
    }
}
