pub mod error;
pub mod http;
pub mod mock;
pub mod worker;

pub use error::{Result, SttError};
pub use http::HttpTranscriber;
pub use mock::MockTranscriber;
pub use worker::{spawn, WorkerConfig, WorkerHandle};
