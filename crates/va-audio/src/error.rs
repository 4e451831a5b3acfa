use thiserror::Error;

pub type Result<T> = std::result::Result<T, AudioError>;

#[derive(Error, Debug)]
pub enum AudioError {
    #[error("invalid WAV frame: {0}")]
    InvalidWav(String),

    #[error("unsupported audio format: {0}")]
    UnsupportedFormat(String),

    #[error("invalid base64 payload: {0}")]
    InvalidBase64(String),

    #[error("unknown session: {0}")]
    UnknownSession(String),
}

impl From<AudioError> for va_core::error::CoreError {
    fn from(err: AudioError) -> Self {
        va_core::error::CoreError::InvalidFrame(err.to_string())
    }
}
