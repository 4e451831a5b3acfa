pub mod bus;
pub mod config;
pub mod error;
pub mod llm;
pub mod session;
pub mod settings;
pub mod store;
pub mod transcriber;

pub use bus::{BusEvent, NewTranscript, OperationKind};
pub use config::ServerConfig;
pub use error::{CoreError, Result};
pub use llm::LlmInvoker;
pub use session::{Analysis, MindMap, MindMapEdge, MindMapNode, Session, SessionId, Transcript};
pub use settings::{
    EffectiveSettings, SettingsProfile, SettingsSource, TemporaryOverride, DISABLED_MODEL,
};
pub use store::Store;
pub use transcriber::{Transcriber, TranscriptionOutcome};
