use std::collections::HashMap;
use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};

use axum::extract::ws::{Message, WebSocket, WebSocketUpgrade};
use axum::extract::{Query, State};
use axum::response::IntoResponse;
use futures_util::{SinkExt, StreamExt};
use serde::{Deserialize, Serialize};
use tokio::sync::Mutex as AsyncMutex;
use tracing::{info, warn};

use va_audio::frame::AudioChunkEnvelope;
use va_audio::{AudioIntake, FrameUnit};
use va_core::bus::BusEvent;
use va_core::error::CoreError;
use va_core::session::SessionId;
use va_llm::LlmInvoker;
use va_stt::{WorkerConfig, WorkerHandle};

use crate::settings_resolver::SettingsResolver;
use va_core::store::Store;
use va_core::transcriber::Transcriber;
use va_pipeline::{ProcessingStateManager, SessionBus};

/// Shared state handed to every axum handler. Cloned per-request (cheap:
/// everything inside is an `Arc`), mirroring the teacher's
/// `tauri::State` wrapping of its app handles.
#[derive(Clone)]
pub struct AppState {
    pub store: Arc<dyn Store>,
    pub transcriber: Arc<dyn Transcriber>,
    pub llm: Arc<dyn LlmInvoker>,
    pub intake: Arc<AudioIntake>,
    pub bus: Arc<SessionBus>,
    pub settings: Arc<SettingsResolver>,
    pub processing_state: Arc<ProcessingStateManager>,
    pub new_transcript_tx: tokio::sync::mpsc::UnboundedSender<va_core::bus::NewTranscript>,
    pub worker_config: Arc<WorkerConfig>,
    pub workers: Arc<AsyncMutex<HashMap<SessionId, WorkerHandle>>>,
}

impl AppState {
    /// Spawns a `TranscriptionWorker` for `session_id` if one isn't
    /// already running, and ensures the session row exists
    /// (SPEC_FULL §9: the server never mints a session id itself, but it
    /// does lazily create the row for an id the client supplied).
    async fn ensure_worker(&self, session_id: &SessionId) {
        let mut workers = self.workers.lock().await;
        if workers.contains_key(session_id) {
            return;
        }
        if let Err(e) = self.store.create_or_get_session(session_id).await {
            warn!(session_id = %session_id, error = %e, "failed to create session row");
            return;
        }
        let bus_tx = self.bus.sender(session_id).await;
        let handle = va_stt::spawn(
            session_id.clone(),
            self.intake.clone(),
            self.transcriber.clone(),
            self.store.clone(),
            self.settings.clone() as Arc<dyn va_core::settings::SettingsSource>,
            bus_tx,
            self.new_transcript_tx.clone(),
            WorkerConfig {
                idle_timeout: self.worker_config.idle_timeout,
                transcriber_timeout: self.worker_config.transcriber_timeout,
            },
        );
        workers.insert(session_id.clone(), handle);
    }

    /// Requests an immediate flush of a session's pending batch
    /// (`stop_stream`, SPEC_FULL §4.2.1). A no-op if no worker is
    /// currently running for the session.
    async fn flush_worker(&self, session_id: &SessionId) {
        if let Some(handle) = self.workers.lock().await.get(session_id) {
            handle.flush();
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct ConnectParams {
    #[serde(rename = "session_id")]
    pub session_id: Option<SessionId>,
}

#[derive(Debug, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum InboundEnvelope {
    AudioChunk { data: AudioChunkData },
    Status { data: StatusData },
}

#[derive(Debug, Deserialize)]
struct AudioChunkData {
    data: String,
    #[serde(rename = "sessionId", default)]
    session_id: Option<SessionId>,
}

#[derive(Debug, Deserialize)]
struct StatusData {
    action: String,
    #[serde(rename = "sessionId", default)]
    session_id: Option<SessionId>,
}

#[derive(Debug, Serialize)]
struct OutboundEnvelope {
    #[serde(rename = "type")]
    kind: &'static str,
    data: BusEvent,
    timestamp: i64,
    #[serde(rename = "sessionId", skip_serializing_if = "Option::is_none")]
    session_id: Option<SessionId>,
}

fn envelope_for(event: BusEvent) -> OutboundEnvelope {
    let (kind, session_id) = match &event {
        BusEvent::TranscriptionResult { session_id, .. } => {
            ("transcription_result", Some(session_id.clone()))
        }
        BusEvent::SessionAnalysis { session_id, .. } => {
            ("session_analysis", Some(session_id.clone()))
        }
        BusEvent::MindMapResult { session_id, .. } => {
            ("mind_map_result", Some(session_id.clone()))
        }
        BusEvent::ProcessingStatus { session_id, .. } => {
            ("processing_status", Some(session_id.clone()))
        }
        BusEvent::Error { session_id, .. } => ("error", session_id.clone()),
    };
    OutboundEnvelope {
        kind,
        data: event,
        timestamp: now_millis(),
        session_id,
    }
}

fn now_millis() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as i64)
        .unwrap_or(0)
}

/// `GET /ws` — the bidirectional streaming endpoint (SPEC_FULL §4.8.2).
pub async fn ws_handler(
    ws: WebSocketUpgrade,
    Query(params): Query<ConnectParams>,
    State(state): State<AppState>,
) -> impl IntoResponse {
    ws.on_upgrade(move |socket| handle_socket(socket, state, params.session_id))
}

async fn handle_socket(socket: WebSocket, state: AppState, query_session_id: Option<SessionId>) {
    let (mut ws_sender, mut ws_receiver) = socket.split();

    let session_id = match resolve_session_id(query_session_id, &mut ws_receiver).await {
        Some(id) => id,
        None => {
            let err = envelope_for(BusEvent::Error {
                session_id: None,
                kind: None,
                message: "session not found: no session_id supplied".to_string(),
                recoverable: false,
            });
            if let Ok(text) = serde_json::to_string(&err) {
                let _ = ws_sender.send(Message::Text(text)).await;
            }
            let _ = ws_sender.close().await;
            return;
        }
    };

    state.ensure_worker(&session_id).await;
    let _ = state.store.bump_activity(&session_id).await;
    let mut bus_rx = state.bus.subscribe(&session_id).await;

    info!(session_id = %session_id, "websocket connection opened");

    let mut egress = tokio::spawn(async move {
        loop {
            match bus_rx.recv().await {
                Ok(event) => {
                    let envelope = envelope_for(event);
                    match serde_json::to_string(&envelope) {
                        Ok(text) => {
                            if ws_sender.send(Message::Text(text)).await.is_err() {
                                break;
                            }
                        }
                        Err(e) => warn!(error = %e, "failed to serialize outbound event"),
                    }
                }
                Err(tokio::sync::broadcast::error::RecvError::Lagged(skipped)) => {
                    warn!(skipped, "outbound event receiver lagged, events dropped");
                }
                Err(tokio::sync::broadcast::error::RecvError::Closed) => break,
            }
        }
    });

    let state_for_ingest = state.clone();
    let session_for_ingest = session_id.clone();
    let mut ingest = tokio::spawn(async move {
        while let Some(msg) = ws_receiver.next().await {
            match msg {
                Ok(Message::Binary(bytes)) => {
                    push_frame(&state_for_ingest, &session_for_ingest, bytes.into()).await;
                }
                Ok(Message::Text(text)) => {
                    dispatch_text(&state_for_ingest, &session_for_ingest, &text).await;
                }
                Ok(Message::Close(_)) | Err(_) => break,
                Ok(_) => {}
            }
        }
    });

    tokio::select! {
        _ = &mut ingest => { egress.abort(); }
        _ = &mut egress => { ingest.abort(); }
    }

    info!(session_id = %session_id, "websocket connection closed");
}

/// Determines the session id for a connection: the query-string value if
/// present, otherwise whatever the first inbound text envelope carries.
/// Returns `None` if neither source yields one (SPEC_FULL §9).
async fn resolve_session_id(
    query_session_id: Option<SessionId>,
    ws_receiver: &mut (impl futures_util::Stream<Item = Result<Message, axum::Error>> + Unpin),
) -> Option<SessionId> {
    if query_session_id.is_some() {
        return query_session_id;
    }
    while let Some(msg) = ws_receiver.next().await {
        match msg {
            Ok(Message::Text(text)) => {
                if let Ok(envelope) = serde_json::from_str::<InboundEnvelope>(&text) {
                    match envelope {
                        InboundEnvelope::AudioChunk { data } => {
                            if data.session_id.is_some() {
                                return data.session_id;
                            }
                        }
                        InboundEnvelope::Status { data } => {
                            if data.session_id.is_some() {
                                return data.session_id;
                            }
                        }
                    }
                }
            }
            Ok(Message::Close(_)) | Err(_) => return None,
            _ => continue,
        }
    }
    None
}

async fn push_frame(state: &AppState, session_id: &SessionId, bytes: Vec<u8>) {
    let result = state
        .intake
        .push(FrameUnit {
            session_id: session_id.clone(),
            bytes,
            received_at_ms: now_millis().max(0) as u64,
        })
        .await;

    match result {
        Ok(overflowed) => {
            if overflowed {
                let err = CoreError::Overflow {
                    session_id: session_id.clone(),
                };
                warn!(session_id = %session_id, "intake queue overflow, oldest frame dropped");
                state
                    .bus
                    .publish(
                        session_id,
                        BusEvent::Error {
                            session_id: Some(session_id.clone()),
                            kind: None,
                            message: err.to_string(),
                            recoverable: true,
                        },
                    )
                    .await;
            }
        }
        Err(e) => {
            warn!(session_id = %session_id, error = %e, "rejected malformed audio frame");
            state
                .bus
                .publish(
                    session_id,
                    BusEvent::Error {
                        session_id: Some(session_id.clone()),
                        kind: None,
                        message: format!("invalid audio frame: {e}"),
                        recoverable: true,
                    },
                )
                .await;
        }
    }
}

async fn dispatch_text(state: &AppState, session_id: &SessionId, text: &str) {
    let envelope = match serde_json::from_str::<InboundEnvelope>(text) {
        Ok(envelope) => envelope,
        Err(e) => {
            warn!(session_id = %session_id, error = %e, "failed to parse inbound envelope");
            return;
        }
    };

    match envelope {
        InboundEnvelope::AudioChunk { data } => match AudioChunkEnvelope {
            session_id: data.session_id.unwrap_or_else(|| session_id.clone()),
            data: data.data,
        }
        .decode_bytes()
        {
            Ok(bytes) => push_frame(state, session_id, bytes).await,
            Err(e) => warn!(session_id = %session_id, error = %e, "invalid base64 audio chunk"),
        },
        InboundEnvelope::Status { data } => match data.action.as_str() {
            "start_stream" => {
                state.ensure_worker(session_id).await;
                if let Err(e) = state.store.bump_activity(session_id).await {
                    warn!(session_id = %session_id, error = %e, "failed to mark session active");
                }
            }
            "stop_stream" => {
                state.flush_worker(session_id).await;
                if let Err(e) = state.store.deactivate_session(session_id).await {
                    warn!(session_id = %session_id, error = %e, "failed to deactivate session");
                }
            }
            other => {
                warn!(session_id = %session_id, action = other, "unknown status action");
            }
        },
    }
}
