use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::Arc;

use tokio::sync::{broadcast, mpsc, Semaphore};
use tracing::{info, warn};

use va_core::bus::{BusEvent, NewTranscript, OperationKind};
use va_core::llm::LlmInvoker;
use va_core::settings::SettingsSource;
use va_core::store::Store;
use va_llm::{MindMapPipeline, SummaryPipeline};

use crate::bus::SessionBus;
use crate::state::ProcessingStateManager;

/// Reacts to `NewTranscript` signals by launching a summary run and a
/// mind-map run for the session, each gated by `ProcessingStateManager`
/// so a session never has two runs of the same kind in flight at once
/// (SPEC_FULL §4.3). Bounded by a shared `Semaphore` so the number of
/// concurrent LLM calls across *all* sessions stays within
/// `ServerConfig::worker_pool_size` (SPEC_FULL §5).
///
/// Grounded on `lt-pipeline::orchestrator::PipelineOrchestrator`'s
/// receive-signal-then-dispatch-tasks shape, replacing its single
/// linear audio-capture-to-output chain with two independent,
/// slot-guarded dispatches per signal.
pub struct PipelineOrchestrator {
    store: Arc<dyn Store>,
    settings: Arc<dyn SettingsSource>,
    bus: Arc<SessionBus>,
    state: Arc<ProcessingStateManager>,
    summary: Arc<SummaryPipeline>,
    mind_map: Arc<MindMapPipeline>,
    worker_pool: Arc<Semaphore>,
}

impl PipelineOrchestrator {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        store: Arc<dyn Store>,
        llm: Arc<dyn LlmInvoker>,
        settings: Arc<dyn SettingsSource>,
        bus: Arc<SessionBus>,
        state: Arc<ProcessingStateManager>,
        worker_pool_size: usize,
    ) -> Self {
        Self {
            summary: Arc::new(SummaryPipeline::new(store.clone(), llm.clone())),
            mind_map: Arc::new(MindMapPipeline::new(store.clone(), llm)),
            store,
            settings,
            bus,
            state,
            worker_pool: Arc::new(Semaphore::new(worker_pool_size.max(1))),
        }
    }

    /// Drives the orchestrator until `rx` closes (every
    /// `TranscriptionWorker` and its `mpsc::UnboundedSender` handle has
    /// been dropped). Each signal spawns two independent dispatch tasks
    /// — one per `OperationKind` — so a slow mind-map run never delays
    /// the summary run for the same transcript.
    pub async fn run(self: Arc<Self>, mut rx: mpsc::UnboundedReceiver<NewTranscript>) {
        while let Some(signal) = rx.recv().await {
            // Shared between both dispatches for this signal so the
            // transcript's `processed_at` is stamped once both kinds
            // have considered it (SPEC_FULL §3), whichever finishes last.
            let considered = Arc::new(AtomicU8::new(2));
            self.clone()
                .dispatch(OperationKind::Summary, signal.clone(), considered.clone());
            self.clone().dispatch(OperationKind::MindMap, signal, considered);
        }
        info!("pipeline orchestrator shutting down: signal channel closed");
    }

    /// Attempts to claim the `(session, kind)` slot and, if successful,
    /// spawns the bounded-pool task that actually runs the pipeline. A
    /// busy slot means a run is already in flight for this session/kind
    /// — the new signal is simply dropped, matching the "skip, don't
    /// queue" behavior in SPEC_FULL §4.3/§8.4.
    fn dispatch(self: Arc<Self>, kind: OperationKind, signal: NewTranscript, considered: Arc<AtomicU8>) {
        let guard = match self.state.try_start_guarded(signal.session_id.clone(), kind) {
            Some(guard) => guard,
            None => {
                info!(
                    session_id = %signal.session_id,
                    kind = kind.as_str(),
                    "skipping run: a job of this kind is already in flight"
                );
                tokio::spawn(async move {
                    // Tells the client this particular transcript won't
                    // produce a result from `kind` — a run is already in
                    // flight and will fold its latest state in instead
                    // (SPEC_FULL §4.4).
                    self.bus
                        .publish(
                            &signal.session_id,
                            BusEvent::ProcessingStatus {
                                session_id: signal.session_id.clone(),
                                kind,
                                busy: true,
                            },
                        )
                        .await;
                    self.clone().mark_considered(&signal, considered);
                });
                return;
            }
        };

        tokio::spawn(async move {
            let _guard = guard;
            self.bus
                .publish(
                    &signal.session_id,
                    BusEvent::ProcessingStatus {
                        session_id: signal.session_id.clone(),
                        kind,
                        busy: true,
                    },
                )
                .await;

            let permit = self.worker_pool.clone().acquire_owned().await;
            let permit = match permit {
                Ok(permit) => permit,
                Err(_) => return,
            };

            self.run_one(kind, &signal).await;
            drop(permit);

            self.bus
                .publish(
                    &signal.session_id,
                    BusEvent::ProcessingStatus {
                        session_id: signal.session_id.clone(),
                        kind,
                        busy: false,
                    },
                )
                .await;

            self.clone().mark_considered(&signal, considered);
        });
    }

    /// Decrements the per-transcript considered-count; once both kinds
    /// have weighed in (run, skipped, or disabled all count), stamps
    /// `processed_at` on the triggering transcript.
    fn mark_considered(self: Arc<Self>, signal: &NewTranscript, considered: Arc<AtomicU8>) {
        if considered.fetch_sub(1, Ordering::AcqRel) != 1 {
            return;
        }
        let store = self.store.clone();
        let session_id = signal.session_id.clone();
        let transcript_id = signal.transcript_id;
        tokio::spawn(async move {
            if let Err(e) = store.mark_transcript_processed(&session_id, transcript_id).await {
                warn!(session_id = %session_id, transcript_id, error = %e, "failed to mark transcript processed");
            }
        });
    }

    async fn run_one(&self, kind: OperationKind, signal: &NewTranscript) {
        let effective = match self.settings.resolve(&signal.session_id).await {
            Ok(effective) => effective,
            Err(e) => {
                warn!(session_id = %signal.session_id, error = %e, "settings resolution failed");
                return;
            }
        };

        let bus_tx: broadcast::Sender<BusEvent> = self.bus.sender(&signal.session_id).await;

        match kind {
            OperationKind::Summary => {
                if effective.summary_disabled() {
                    return;
                }
                if let Err(e) = self
                    .summary
                    .run(
                        &signal.session_id,
                        &effective.summary_model,
                        &effective.summary_prompt,
                        &bus_tx,
                    )
                    .await
                {
                    warn!(session_id = %signal.session_id, error = %e, "summary run failed");
                }
            }
            OperationKind::MindMap => {
                if effective.mind_map_disabled() {
                    return;
                }
                if let Err(e) = self
                    .mind_map
                    .run(
                        &signal.session_id,
                        &effective.mind_map_model,
                        &effective.mind_map_prompt,
                        &bus_tx,
                    )
                    .await
                {
                    warn!(session_id = %signal.session_id, error = %e, "mind map run failed");
                }
            }
        }
    }

    pub fn store(&self) -> &Arc<dyn Store> {
        &self.store
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use va_core::error::{CoreError, Result};
    use va_core::session::{Analysis, MindMap, MindMapEdge, MindMapNode, Session, SessionId, Transcript};
    use va_core::settings::EffectiveSettings;

    struct FakeStore {
        calls: AtomicUsize,
    }

    #[async_trait]
    impl Store for FakeStore {
        async fn create_or_get_session(&self, _id: &SessionId) -> Result<Session> {
            unimplemented!()
        }
        async fn get_session(&self, _id: &SessionId) -> Result<Option<Session>> {
            unimplemented!()
        }
        async fn rename_session(&self, _id: &SessionId, _name: &str) -> Result<()> {
            unimplemented!()
        }
        async fn deactivate_session(&self, _id: &SessionId) -> Result<()> {
            unimplemented!()
        }
        async fn delete_session(&self, _id: &SessionId) -> Result<()> {
            unimplemented!()
        }
        async fn bump_activity(&self, _id: &SessionId) -> Result<()> {
            unimplemented!()
        }
        async fn insert_transcript(
            &self,
            session_id: &SessionId,
            text: &str,
            language: &str,
            model: &str,
        ) -> Result<Transcript> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Ok(Transcript {
                id: 1,
                session_id: session_id.clone(),
                text: text.to_string(),
                language: language.to_string(),
                model: model.to_string(),
                created_at: chrono::Utc::now(),
                processed_at: None,
            })
        }
        async fn list_transcripts(&self, _id: &SessionId) -> Result<Vec<Transcript>> {
            Ok(vec![])
        }
        async fn mark_transcript_processed(
            &self,
            _session_id: &SessionId,
            _transcript_id: i64,
        ) -> Result<()> {
            Ok(())
        }
        async fn insert_analysis(
            &self,
            _session_id: &SessionId,
            _prompt: &str,
            _response: &str,
            _model: &str,
            _processing_time_ms: u64,
        ) -> Result<Analysis> {
            unimplemented!()
        }
        async fn list_analyses(&self, _id: &SessionId) -> Result<Vec<Analysis>> {
            Ok(vec![])
        }
        async fn insert_mind_map(
            &self,
            _session_id: &SessionId,
            _nodes: Vec<MindMapNode>,
            _edges: Vec<MindMapEdge>,
            _model: &str,
        ) -> Result<MindMap> {
            unimplemented!()
        }
        async fn list_mind_maps(&self, _id: &SessionId) -> Result<Vec<MindMap>> {
            Ok(vec![])
        }
        async fn get_settings_profile(&self) -> Result<va_core::settings::SettingsProfile> {
            Ok(va_core::settings::SettingsProfile::default())
        }
        async fn save_settings_profile(
            &self,
            _profile: &va_core::settings::SettingsProfile,
        ) -> Result<()> {
            unimplemented!()
        }
    }

    struct FakeLlm;

    #[async_trait]
    impl LlmInvoker for FakeLlm {
        async fn complete(&self, _model: &str, _prompt: &str) -> Result<String> {
            Err(CoreError::LlmFailure("no content to test with".to_string()))
        }
    }

    struct FakeSettings;

    #[async_trait]
    impl SettingsSource for FakeSettings {
        async fn resolve(&self, _session_id: &SessionId) -> Result<EffectiveSettings> {
            Ok(va_core::settings::SettingsProfile::default().resolve(None))
        }
    }

    #[tokio::test]
    async fn no_content_dispatch_releases_slot() {
        let store: Arc<dyn Store> = Arc::new(FakeStore {
            calls: AtomicUsize::new(0),
        });
        let llm: Arc<dyn LlmInvoker> = Arc::new(FakeLlm);
        let settings: Arc<dyn SettingsSource> = Arc::new(FakeSettings);
        let bus = Arc::new(SessionBus::new());
        let state = Arc::new(ProcessingStateManager::new());

        let orchestrator = Arc::new(PipelineOrchestrator::new(
            store, llm, settings, bus, state.clone(), 2,
        ));

        let (tx, rx) = mpsc::unbounded_channel();
        let session_id: SessionId = "s1".to_string();
        tx.send(NewTranscript {
            session_id: session_id.clone(),
            transcript_id: 1,
        })
        .unwrap();
        drop(tx);

        orchestrator.run(rx).await;

        assert!(!state.is_busy_any(&session_id));
    }
}
