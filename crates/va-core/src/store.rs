use async_trait::async_trait;

use crate::error::Result;
use crate::session::{Analysis, MindMap, Session, SessionId, Transcript};
use crate::settings::SettingsProfile;

/// Persistence boundary. `va-store::sqlite::SqliteStore` is the only
/// implementation shipped; the trait exists so the pipeline and server
/// crates never depend on `sqlx` directly and tests can swap in an
/// in-memory double.
#[async_trait]
pub trait Store: Send + Sync {
    /// Returns the existing session if `id` is known, otherwise creates
    /// and returns a fresh one. The server never mints an id on the
    /// client's behalf (SPEC_FULL §9) — `id` always comes from the caller.
    async fn create_or_get_session(&self, id: &SessionId) -> Result<Session>;

    async fn get_session(&self, id: &SessionId) -> Result<Option<Session>>;

    async fn rename_session(&self, id: &SessionId, name: &str) -> Result<()>;

    async fn deactivate_session(&self, id: &SessionId) -> Result<()>;

    async fn delete_session(&self, id: &SessionId) -> Result<()>;

    /// Stamps `last_activity` and marks the session active again — the
    /// only way `is_active` flips back to `true` once `deactivate_session`
    /// has cleared it (SPEC_FULL §3, §4.8's `start_stream` action).
    async fn bump_activity(&self, id: &SessionId) -> Result<()>;

    async fn insert_transcript(
        &self,
        session_id: &SessionId,
        text: &str,
        language: &str,
        model: &str,
    ) -> Result<Transcript>;

    async fn list_transcripts(&self, session_id: &SessionId) -> Result<Vec<Transcript>>;

    /// Stamps `processed_at` on a transcript once both the summary and
    /// mind-map pipelines have considered it (SPEC_FULL §3). A no-op if
    /// the transcript is already marked.
    async fn mark_transcript_processed(
        &self,
        session_id: &SessionId,
        transcript_id: i64,
    ) -> Result<()>;

    async fn insert_analysis(
        &self,
        session_id: &SessionId,
        prompt: &str,
        response: &str,
        model: &str,
        processing_time_ms: u64,
    ) -> Result<Analysis>;

    async fn list_analyses(&self, session_id: &SessionId) -> Result<Vec<Analysis>>;

    async fn insert_mind_map(
        &self,
        session_id: &SessionId,
        nodes: Vec<crate::session::MindMapNode>,
        edges: Vec<crate::session::MindMapEdge>,
        model: &str,
    ) -> Result<MindMap>;

    async fn list_mind_maps(&self, session_id: &SessionId) -> Result<Vec<MindMap>>;

    /// Loads the singleton settings row, seeding it with `SettingsProfile::default()`
    /// on first access.
    async fn get_settings_profile(&self) -> Result<SettingsProfile>;

    async fn save_settings_profile(&self, profile: &SettingsProfile) -> Result<()>;
}
