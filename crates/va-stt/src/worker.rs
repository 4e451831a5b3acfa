use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{broadcast, mpsc, Notify};
use tracing::{info, warn};

use va_audio::frame::{decode_pcm, encode_pcm};
use va_audio::AudioIntake;
use va_core::bus::{BusEvent, NewTranscript};
use va_core::error::CoreError;
use va_core::session::SessionId;
use va_core::settings::SettingsSource;
use va_core::store::Store;
use va_core::transcriber::Transcriber;

/// Handle to a running worker: lets the owner force an early flush (the
/// `stop_stream` contract, SPEC_FULL §4.2.1) without waiting for the
/// batch threshold or the idle timeout.
pub struct WorkerHandle {
    flush: Arc<Notify>,
    task: tokio::task::JoinHandle<()>,
}

impl WorkerHandle {
    /// Requests an immediate flush of any partial batch. Does not wait
    /// for it to complete.
    pub fn flush(&self) {
        self.flush.notify_one();
    }

    pub fn abort(&self) {
        self.task.abort();
    }
}

/// Config a worker is spawned with; grouped to keep `spawn`'s signature
/// from growing unbounded as the wiring matures.
pub struct WorkerConfig {
    pub idle_timeout: Duration,
    pub transcriber_timeout: Duration,
}

/// Spawns one transcription worker for `session_id`. Per SPEC_FULL
/// §4.2/§4.2.1: accumulates `FrameUnit`s up to the resolved
/// `frames_per_batch`, transcribes the concatenated PCM as one WAV,
/// writes a `Transcript` row, and publishes `TranscriptionResult`. Exits
/// (retires) after `idle_timeout` with no new frames; a later frame for
/// the same session causes its owner to spawn a fresh worker.
pub fn spawn(
    session_id: SessionId,
    intake: Arc<AudioIntake>,
    transcriber: Arc<dyn Transcriber>,
    store: Arc<dyn Store>,
    settings: Arc<dyn SettingsSource>,
    bus_tx: broadcast::Sender<BusEvent>,
    new_transcript_tx: mpsc::UnboundedSender<NewTranscript>,
    config: WorkerConfig,
) -> WorkerHandle {
    let flush = Arc::new(Notify::new());
    let flush_for_task = flush.clone();
    let task = tokio::spawn(async move {
        run(
            session_id,
            intake,
            transcriber,
            store,
            settings,
            bus_tx,
            new_transcript_tx,
            config,
            flush_for_task,
        )
        .await;
    });
    WorkerHandle { flush, task }
}

#[allow(clippy::too_many_arguments)]
async fn run(
    session_id: SessionId,
    intake: Arc<AudioIntake>,
    transcriber: Arc<dyn Transcriber>,
    store: Arc<dyn Store>,
    settings: Arc<dyn SettingsSource>,
    bus_tx: broadcast::Sender<BusEvent>,
    new_transcript_tx: mpsc::UnboundedSender<NewTranscript>,
    config: WorkerConfig,
    flush: Arc<Notify>,
) {
    let mut batch: Vec<i16> = Vec::new();
    let mut pending_frames: u32 = 0;

    loop {
        let notify = intake.notifier(&session_id).await;

        while let Some(frame) = intake.pop(&session_id).await {
            match decode_pcm(&frame.bytes) {
                Ok(samples) => {
                    batch.extend(samples);
                    pending_frames += 1;
                }
                Err(e) => {
                    warn!(session_id = %session_id, error = %e, "dropping unparseable audio frame");
                    let _ = bus_tx.send(BusEvent::Error {
                        session_id: Some(session_id.clone()),
                        kind: None,
                        message: format!("invalid audio frame: {e}"),
                        recoverable: true,
                    });
                }
            }
        }

        let effective = match settings.resolve(&session_id).await {
            Ok(s) => s,
            Err(e) => {
                warn!(session_id = %session_id, error = %e, "settings resolution failed, retiring worker");
                break;
            }
        };

        if !batch.is_empty() && pending_frames >= effective.frames_per_batch.max(1) {
            flush_batch(
                &session_id,
                &mut batch,
                &mut pending_frames,
                &transcriber,
                &store,
                &bus_tx,
                &new_transcript_tx,
                &effective.whisper_language,
                &effective.whisper_model,
                config.transcriber_timeout,
            )
            .await;
            continue;
        }

        tokio::select! {
            _ = notify.notified() => {
                continue;
            }
            _ = flush.notified() => {
                if !batch.is_empty() {
                    flush_batch(
                        &session_id,
                        &mut batch,
                        &mut pending_frames,
                        &transcriber,
                        &store,
                        &bus_tx,
                        &new_transcript_tx,
                        &effective.whisper_language,
                        &effective.whisper_model,
                        config.transcriber_timeout,
                    )
                    .await;
                }
            }
            _ = tokio::time::sleep(config.idle_timeout) => {
                if batch.is_empty() {
                    info!(session_id = %session_id, "transcription worker idle, retiring");
                    break;
                }
                flush_batch(
                    &session_id,
                    &mut batch,
                    &mut pending_frames,
                    &transcriber,
                    &store,
                    &bus_tx,
                    &new_transcript_tx,
                    &effective.whisper_language,
                    &effective.whisper_model,
                    config.transcriber_timeout,
                )
                .await;
            }
        }
    }

    intake.remove_session(&session_id).await;
}

#[allow(clippy::too_many_arguments)]
async fn flush_batch(
    session_id: &SessionId,
    batch: &mut Vec<i16>,
    pending_frames: &mut u32,
    transcriber: &Arc<dyn Transcriber>,
    store: &Arc<dyn Store>,
    bus_tx: &broadcast::Sender<BusEvent>,
    new_transcript_tx: &mpsc::UnboundedSender<NewTranscript>,
    language: &str,
    model: &str,
    transcriber_timeout: Duration,
) {
    let samples = std::mem::take(batch);
    *pending_frames = 0;

    let wav_bytes = match encode_pcm(&samples) {
        Ok(bytes) => bytes,
        Err(e) => {
            let _ = bus_tx.send(BusEvent::Error {
                session_id: Some(session_id.clone()),
                kind: None,
                message: format!("failed to encode batch: {e}"),
                recoverable: true,
            });
            return;
        }
    };

    let outcome = tokio::time::timeout(
        transcriber_timeout,
        transcriber.transcribe(wav_bytes, language, model),
    )
    .await;

    let outcome = match outcome {
        Ok(Ok(outcome)) => outcome,
        Ok(Err(e)) => {
            let _ = bus_tx.send(BusEvent::Error {
                session_id: Some(session_id.clone()),
                kind: None,
                message: e.to_string(),
                recoverable: true,
            });
            return;
        }
        Err(_) => {
            let err = CoreError::TranscriberTimeout(transcriber_timeout.as_secs());
            let _ = bus_tx.send(BusEvent::Error {
                session_id: Some(session_id.clone()),
                kind: None,
                message: err.to_string(),
                recoverable: true,
            });
            return;
        }
    };

    match store
        .insert_transcript(session_id, &outcome.text, &outcome.language, model)
        .await
    {
        Ok(transcript) => {
            let text_is_empty = transcript.text.trim().is_empty();
            let _ = bus_tx.send(BusEvent::TranscriptionResult {
                session_id: session_id.clone(),
                transcript_id: transcript.id,
                text: transcript.text,
                language: transcript.language,
                model: transcript.model,
                success: true,
            });
            // Empty-text results are a successful transcription but never
            // trigger the LLM pipelines (SPEC_FULL §4.2).
            if !text_is_empty {
                let _ = new_transcript_tx.send(NewTranscript {
                    session_id: session_id.clone(),
                    transcript_id: transcript.id,
                });
            }
        }
        Err(e) => {
            let _ = bus_tx.send(BusEvent::Error {
                session_id: Some(session_id.clone()),
                kind: None,
                message: e.to_string(),
                recoverable: true,
            });
        }
    }
}
