use std::sync::Arc;

use arc_swap::ArcSwapOption;
use async_trait::async_trait;
use tokio::sync::Mutex as AsyncMutex;

use va_core::error::Result;
use va_core::session::SessionId;
use va_core::settings::{EffectiveSettings, SettingsSource, TemporaryOverride};
use va_core::store::Store;

/// Resolves each pipeline's effective settings from the persisted
/// `SettingsProfile` plus a process-wide `TemporaryOverride` patch
/// (SPEC_FULL §4.7). The override is held as a lock-free
/// `ArcSwapOption` so every pipeline's `resolve` call — the hot path,
/// run at the start of every summary and mind-map job — never blocks on
/// a writer; only `set`/`clear` take the internal write lock
/// (SPEC_FULL §4.7.1).
pub struct SettingsResolver {
    store: Arc<dyn Store>,
    overrides: ArcSwapOption<TemporaryOverride>,
    write_lock: AsyncMutex<()>,
}

impl SettingsResolver {
    pub fn new(store: Arc<dyn Store>) -> Self {
        Self {
            store,
            overrides: ArcSwapOption::empty(),
            write_lock: AsyncMutex::new(()),
        }
    }

    /// Merges `patch` into the current override, creating one if absent.
    /// Returns the override as it stands after the merge.
    pub async fn set(&self, patch: TemporaryOverride) -> TemporaryOverride {
        let _guard = self.write_lock.lock().await;
        let mut current = self.current_override();
        current.merge(patch);
        self.overrides.store(Some(Arc::new(current.clone())));
        current
    }

    /// Current override, or the empty default if none has been set.
    pub fn get(&self) -> TemporaryOverride {
        self.current_override()
    }

    pub async fn clear(&self) {
        let _guard = self.write_lock.lock().await;
        self.overrides.store(None);
    }

    fn current_override(&self) -> TemporaryOverride {
        self.overrides
            .load_full()
            .map(|arc| (*arc).clone())
            .unwrap_or_default()
    }
}

#[async_trait]
impl SettingsSource for SettingsResolver {
    /// Loads the persisted profile and applies whatever override is
    /// live at this exact instant (SPEC_FULL §8.5: a pipeline must see
    /// the snapshot resolved at job start, not one mutated mid-run).
    async fn resolve(&self, _session_id: &SessionId) -> Result<EffectiveSettings> {
        let profile = self.store.get_settings_profile().await?;
        let over = self.overrides.load_full();
        Ok(profile.resolve(over.as_deref()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait as at;
    use va_core::session::{Analysis, MindMap, MindMapEdge, MindMapNode, Session, Transcript};
    use va_core::settings::SettingsProfile;
    use va_core::error::Result as CoreResult;

    struct FakeStore;

    #[at]
    impl Store for FakeStore {
        async fn create_or_get_session(&self, _id: &SessionId) -> CoreResult<Session> {
            unimplemented!()
        }
        async fn get_session(&self, _id: &SessionId) -> CoreResult<Option<Session>> {
            unimplemented!()
        }
        async fn rename_session(&self, _id: &SessionId, _name: &str) -> CoreResult<()> {
            unimplemented!()
        }
        async fn deactivate_session(&self, _id: &SessionId) -> CoreResult<()> {
            unimplemented!()
        }
        async fn delete_session(&self, _id: &SessionId) -> CoreResult<()> {
            unimplemented!()
        }
        async fn bump_activity(&self, _id: &SessionId) -> CoreResult<()> {
            unimplemented!()
        }
        async fn insert_transcript(
            &self,
            _session_id: &SessionId,
            _text: &str,
            _language: &str,
            _model: &str,
        ) -> CoreResult<Transcript> {
            unimplemented!()
        }
        async fn list_transcripts(&self, _id: &SessionId) -> CoreResult<Vec<Transcript>> {
            Ok(vec![])
        }
        async fn mark_transcript_processed(
            &self,
            _session_id: &SessionId,
            _transcript_id: i64,
        ) -> CoreResult<()> {
            Ok(())
        }
        async fn insert_analysis(
            &self,
            _session_id: &SessionId,
            _prompt: &str,
            _response: &str,
            _model: &str,
            _processing_time_ms: u64,
        ) -> CoreResult<Analysis> {
            unimplemented!()
        }
        async fn list_analyses(&self, _id: &SessionId) -> CoreResult<Vec<Analysis>> {
            Ok(vec![])
        }
        async fn insert_mind_map(
            &self,
            _session_id: &SessionId,
            _nodes: Vec<MindMapNode>,
            _edges: Vec<MindMapEdge>,
            _model: &str,
        ) -> CoreResult<MindMap> {
            unimplemented!()
        }
        async fn list_mind_maps(&self, _id: &SessionId) -> CoreResult<Vec<MindMap>> {
            Ok(vec![])
        }
        async fn get_settings_profile(&self) -> CoreResult<SettingsProfile> {
            Ok(SettingsProfile::default())
        }
        async fn save_settings_profile(&self, _profile: &SettingsProfile) -> CoreResult<()> {
            Ok(())
        }
    }

    #[tokio::test]
    async fn resolves_persisted_defaults_with_no_override() {
        let resolver = SettingsResolver::new(Arc::new(FakeStore));
        let effective = resolver.resolve(&"s1".to_string()).await.unwrap();
        assert_eq!(effective.summary_model, SettingsProfile::default().summary_model);
    }

    #[tokio::test]
    async fn set_then_resolve_reflects_override() {
        let resolver = SettingsResolver::new(Arc::new(FakeStore));
        resolver
            .set(TemporaryOverride {
                ollama_summary_model: Some("custom-model".to_string()),
                ..Default::default()
            })
            .await;
        let effective = resolver.resolve(&"s1".to_string()).await.unwrap();
        assert_eq!(effective.summary_model, "custom-model");
    }

    #[tokio::test]
    async fn clear_removes_override() {
        let resolver = SettingsResolver::new(Arc::new(FakeStore));
        resolver
            .set(TemporaryOverride {
                ollama_model: Some("blanket".to_string()),
                ..Default::default()
            })
            .await;
        resolver.clear().await;
        assert!(resolver.get().is_empty());
        let effective = resolver.resolve(&"s1".to_string()).await.unwrap();
        assert_eq!(effective.summary_model, SettingsProfile::default().summary_model);
    }

    #[tokio::test]
    async fn merge_keeps_previously_set_fields() {
        let resolver = SettingsResolver::new(Arc::new(FakeStore));
        resolver
            .set(TemporaryOverride {
                ollama_summary_model: Some("s-model".to_string()),
                ..Default::default()
            })
            .await;
        resolver
            .set(TemporaryOverride {
                ollama_mind_map_model: Some("m-model".to_string()),
                ..Default::default()
            })
            .await;
        let over = resolver.get();
        assert_eq!(over.ollama_summary_model.as_deref(), Some("s-model"));
        assert_eq!(over.ollama_mind_map_model.as_deref(), Some("m-model"));
    }
}
