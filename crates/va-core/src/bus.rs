use serde::{Deserialize, Serialize};

use crate::session::SessionId;

/// Which derived pipeline a status or error event concerns. A session runs
/// at most one job of each kind at a time (SPEC_FULL §4.3) but the two
/// kinds are independent of each other.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OperationKind {
    Summary,
    MindMap,
}

impl OperationKind {
    pub fn as_str(self) -> &'static str {
        match self {
            OperationKind::Summary => "summary",
            OperationKind::MindMap => "mind_map",
        }
    }
}

/// Wire events broadcast over a session's `SessionBus`. Every subscriber
/// to a session — there may be several connected clients — receives the
/// same stream.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum BusEvent {
    /// A batch of audio finished transcribing.
    TranscriptionResult {
        session_id: SessionId,
        transcript_id: i64,
        text: String,
        language: String,
        model: String,
        success: bool,
    },
    /// A summary run finished.
    SessionAnalysis {
        session_id: SessionId,
        analysis_id: i64,
        processing_time_ms: u64,
        analysis: String,
    },
    /// A mind-map run finished.
    MindMapResult {
        session_id: SessionId,
        mind_map_id: i64,
        model: String,
        nodes: usize,
        edges: usize,
    },
    /// A processing slot was claimed or released. Lets a client poll-free
    /// reflect busy state in its UI.
    ProcessingStatus {
        session_id: SessionId,
        kind: OperationKind,
        busy: bool,
    },
    /// Something failed. `session_id` is `None` for transport-level
    /// errors not tied to a particular session.
    Error {
        session_id: Option<SessionId>,
        kind: Option<OperationKind>,
        message: String,
        recoverable: bool,
    },
}

/// Internal signal a `TranscriptionWorker` posts to `PipelineOrchestrator`
/// once a non-empty transcript has been persisted (SPEC_FULL §4.2). Never
/// serialized and never reaches a client — it is the trigger that decides
/// whether a summary/mind-map run starts, not a wire event.
#[derive(Debug, Clone)]
pub struct NewTranscript {
    pub session_id: SessionId,
    pub transcript_id: i64,
}
