use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::sqlite::{SqlitePoolOptions, SqliteRow};
use sqlx::{Row, SqlitePool};

use va_core::error::{CoreError, Result};

use crate::error::StoreError;
use va_core::session::{Analysis, MindMap, MindMapEdge, MindMapNode, Session, SessionId, Transcript};
use va_core::settings::SettingsProfile;
use va_core::store::Store;

const SCHEMA: &str = "
CREATE TABLE IF NOT EXISTS sessions (
    id TEXT PRIMARY KEY,
    name TEXT,
    created_at TEXT NOT NULL,
    last_activity TEXT NOT NULL,
    is_active INTEGER NOT NULL
);

CREATE TABLE IF NOT EXISTS transcripts (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    session_id TEXT NOT NULL REFERENCES sessions(id),
    text TEXT NOT NULL,
    language TEXT NOT NULL,
    model TEXT NOT NULL,
    created_at TEXT NOT NULL,
    processed_at TEXT
);

CREATE TABLE IF NOT EXISTS analyses (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    session_id TEXT NOT NULL REFERENCES sessions(id),
    prompt TEXT NOT NULL,
    response TEXT NOT NULL,
    model TEXT NOT NULL,
    processing_time_ms INTEGER NOT NULL,
    created_at TEXT NOT NULL
);

CREATE TABLE IF NOT EXISTS mind_maps (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    session_id TEXT NOT NULL REFERENCES sessions(id),
    nodes_json TEXT NOT NULL,
    edges_json TEXT NOT NULL,
    model TEXT NOT NULL,
    created_at TEXT NOT NULL
);

CREATE TABLE IF NOT EXISTS settings (
    id INTEGER PRIMARY KEY CHECK (id = 1),
    whisper_language TEXT NOT NULL,
    whisper_model TEXT NOT NULL,
    summary_model TEXT NOT NULL,
    mind_map_model TEXT NOT NULL,
    summary_prompt TEXT NOT NULL,
    mind_map_prompt TEXT NOT NULL,
    frame_length_ms INTEGER NOT NULL,
    frames_per_batch INTEGER NOT NULL,
    active_session_id TEXT
);
";

/// `sqlx`-backed `Store`. The teacher has no persistence layer at all
/// (its `lt-output` crate writes to the clipboard/keyboard, not a
/// database); this is new, grounded on the `sqlx` + `sqlite` +
/// `runtime-tokio-rustls` stack found in the `gugamistri-meetingmind`
/// and `mmogr-gglib` manifests in the retrieval pack.
pub struct SqliteStore {
    pool: SqlitePool,
}

impl SqliteStore {
    pub async fn connect(database_url: &str) -> Result<Self> {
        let pool = SqlitePoolOptions::new()
            .max_connections(8)
            .connect(database_url)
            .await
            .map_err(StoreError::from)?;

        sqlx::query(SCHEMA)
            .execute(&pool)
            .await
            .map_err(StoreError::from)?;

        Ok(Self { pool })
    }

    fn row_to_session(row: &SqliteRow) -> std::result::Result<Session, sqlx::Error> {
        Ok(Session {
            id: row.try_get("id")?,
            name: row.try_get("name")?,
            created_at: row.try_get::<DateTime<Utc>, _>("created_at")?,
            last_activity: row.try_get::<DateTime<Utc>, _>("last_activity")?,
            is_active: row.try_get::<i64, _>("is_active")? != 0,
        })
    }

    fn row_to_transcript(row: &SqliteRow) -> std::result::Result<Transcript, sqlx::Error> {
        Ok(Transcript {
            id: row.try_get("id")?,
            session_id: row.try_get("session_id")?,
            text: row.try_get("text")?,
            language: row.try_get("language")?,
            model: row.try_get("model")?,
            created_at: row.try_get::<DateTime<Utc>, _>("created_at")?,
            processed_at: row.try_get::<Option<DateTime<Utc>>, _>("processed_at")?,
        })
    }

    fn row_to_analysis(row: &SqliteRow) -> std::result::Result<Analysis, sqlx::Error> {
        Ok(Analysis {
            id: row.try_get("id")?,
            session_id: row.try_get("session_id")?,
            prompt: row.try_get("prompt")?,
            response: row.try_get("response")?,
            model: row.try_get("model")?,
            processing_time_ms: row.try_get::<i64, _>("processing_time_ms")? as u64,
            created_at: row.try_get::<DateTime<Utc>, _>("created_at")?,
        })
    }

    fn row_to_mind_map(row: &SqliteRow) -> Result<MindMap> {
        let nodes_json: String = row
            .try_get("nodes_json")
            .map_err(StoreError::from)?;
        let edges_json: String = row
            .try_get("edges_json")
            .map_err(StoreError::from)?;
        Ok(MindMap {
            id: row.try_get("id").map_err(StoreError::from)?,
            session_id: row
                .try_get("session_id")
                .map_err(StoreError::from)?,
            nodes: serde_json::from_str::<Vec<MindMapNode>>(&nodes_json)?,
            edges: serde_json::from_str::<Vec<MindMapEdge>>(&edges_json)?,
            model: row.try_get("model").map_err(StoreError::from)?,
            created_at: row
                .try_get::<DateTime<Utc>, _>("created_at")
                .map_err(StoreError::from)?,
        })
    }
}

#[async_trait]
impl Store for SqliteStore {
    async fn create_or_get_session(&self, id: &SessionId) -> Result<Session> {
        if let Some(session) = self.get_session(id).await? {
            return Ok(session);
        }
        let session = Session::new(id.clone());
        sqlx::query(
            "INSERT INTO sessions (id, name, created_at, last_activity, is_active) VALUES (?, ?, ?, ?, ?)",
        )
        .bind(&session.id)
        .bind(&session.name)
        .bind(session.created_at)
        .bind(session.last_activity)
        .bind(session.is_active as i64)
        .execute(&self.pool)
        .await
        .map_err(StoreError::from)?;
        Ok(session)
    }

    async fn get_session(&self, id: &SessionId) -> Result<Option<Session>> {
        let row = sqlx::query("SELECT * FROM sessions WHERE id = ?")
            .bind(id)
            .fetch_optional(&self.pool)
            .await
            .map_err(StoreError::from)?;
        row.as_ref()
            .map(Self::row_to_session)
            .transpose()
            .map_err(|e| CoreError::from(StoreError::from(e)))
    }

    async fn rename_session(&self, id: &SessionId, name: &str) -> Result<()> {
        let result = sqlx::query("UPDATE sessions SET name = ? WHERE id = ?")
            .bind(name)
            .bind(id)
            .execute(&self.pool)
            .await
            .map_err(StoreError::from)?;
        if result.rows_affected() == 0 {
            return Err(CoreError::SessionNotFound(id.clone()));
        }
        Ok(())
    }

    async fn deactivate_session(&self, id: &SessionId) -> Result<()> {
        let result = sqlx::query("UPDATE sessions SET is_active = 0 WHERE id = ?")
            .bind(id)
            .execute(&self.pool)
            .await
            .map_err(StoreError::from)?;
        if result.rows_affected() == 0 {
            return Err(CoreError::SessionNotFound(id.clone()));
        }
        Ok(())
    }

    async fn delete_session(&self, id: &SessionId) -> Result<()> {
        sqlx::query("DELETE FROM mind_maps WHERE session_id = ?")
            .bind(id)
            .execute(&self.pool)
            .await
            .map_err(StoreError::from)?;
        sqlx::query("DELETE FROM analyses WHERE session_id = ?")
            .bind(id)
            .execute(&self.pool)
            .await
            .map_err(StoreError::from)?;
        sqlx::query("DELETE FROM transcripts WHERE session_id = ?")
            .bind(id)
            .execute(&self.pool)
            .await
            .map_err(StoreError::from)?;
        let result = sqlx::query("DELETE FROM sessions WHERE id = ?")
            .bind(id)
            .execute(&self.pool)
            .await
            .map_err(StoreError::from)?;
        if result.rows_affected() == 0 {
            return Err(CoreError::SessionNotFound(id.clone()));
        }
        Ok(())
    }

    async fn bump_activity(&self, id: &SessionId) -> Result<()> {
        let result =
            sqlx::query("UPDATE sessions SET last_activity = ?, is_active = 1 WHERE id = ?")
                .bind(Utc::now())
                .bind(id)
                .execute(&self.pool)
                .await
                .map_err(StoreError::from)?;
        if result.rows_affected() == 0 {
            return Err(CoreError::SessionNotFound(id.clone()));
        }
        Ok(())
    }

    async fn insert_transcript(
        &self,
        session_id: &SessionId,
        text: &str,
        language: &str,
        model: &str,
    ) -> Result<Transcript> {
        let created_at = Utc::now();
        let id = sqlx::query(
            "INSERT INTO transcripts (session_id, text, language, model, created_at) VALUES (?, ?, ?, ?, ?)",
        )
        .bind(session_id)
        .bind(text)
        .bind(language)
        .bind(model)
        .bind(created_at)
        .execute(&self.pool)
        .await
        .map_err(StoreError::from)?
        .last_insert_rowid();

        Ok(Transcript {
            id,
            session_id: session_id.clone(),
            text: text.to_string(),
            language: language.to_string(),
            model: model.to_string(),
            created_at,
            processed_at: None,
        })
    }

    async fn list_transcripts(&self, session_id: &SessionId) -> Result<Vec<Transcript>> {
        let rows = sqlx::query("SELECT * FROM transcripts WHERE session_id = ? ORDER BY created_at ASC")
            .bind(session_id)
            .fetch_all(&self.pool)
            .await
            .map_err(StoreError::from)?;
        rows.iter()
            .map(Self::row_to_transcript)
            .collect::<std::result::Result<Vec<_>, _>>()
            .map_err(|e| CoreError::from(StoreError::from(e)))
    }

    async fn mark_transcript_processed(
        &self,
        session_id: &SessionId,
        transcript_id: i64,
    ) -> Result<()> {
        sqlx::query(
            "UPDATE transcripts SET processed_at = ? WHERE id = ? AND session_id = ? AND processed_at IS NULL",
        )
        .bind(Utc::now())
        .bind(transcript_id)
        .bind(session_id)
        .execute(&self.pool)
        .await
        .map_err(StoreError::from)?;
        Ok(())
    }

    async fn insert_analysis(
        &self,
        session_id: &SessionId,
        prompt: &str,
        response: &str,
        model: &str,
        processing_time_ms: u64,
    ) -> Result<Analysis> {
        let created_at = Utc::now();
        let id = sqlx::query(
            "INSERT INTO analyses (session_id, prompt, response, model, processing_time_ms, created_at) VALUES (?, ?, ?, ?, ?, ?)",
        )
        .bind(session_id)
        .bind(prompt)
        .bind(response)
        .bind(model)
        .bind(processing_time_ms as i64)
        .bind(created_at)
        .execute(&self.pool)
        .await
        .map_err(StoreError::from)?
        .last_insert_rowid();

        Ok(Analysis {
            id,
            session_id: session_id.clone(),
            prompt: prompt.to_string(),
            response: response.to_string(),
            model: model.to_string(),
            processing_time_ms,
            created_at,
        })
    }

    async fn list_analyses(&self, session_id: &SessionId) -> Result<Vec<Analysis>> {
        let rows = sqlx::query("SELECT * FROM analyses WHERE session_id = ? ORDER BY created_at ASC")
            .bind(session_id)
            .fetch_all(&self.pool)
            .await
            .map_err(StoreError::from)?;
        rows.iter()
            .map(Self::row_to_analysis)
            .collect::<std::result::Result<Vec<_>, _>>()
            .map_err(|e| CoreError::from(StoreError::from(e)))
    }

    async fn insert_mind_map(
        &self,
        session_id: &SessionId,
        nodes: Vec<MindMapNode>,
        edges: Vec<MindMapEdge>,
        model: &str,
    ) -> Result<MindMap> {
        let nodes_json = serde_json::to_string(&nodes)?;
        let edges_json = serde_json::to_string(&edges)?;
        let created_at = Utc::now();
        let id = sqlx::query(
            "INSERT INTO mind_maps (session_id, nodes_json, edges_json, model, created_at) VALUES (?, ?, ?, ?, ?)",
        )
        .bind(session_id)
        .bind(&nodes_json)
        .bind(&edges_json)
        .bind(model)
        .bind(created_at)
        .execute(&self.pool)
        .await
        .map_err(StoreError::from)?
        .last_insert_rowid();

        Ok(MindMap {
            id,
            session_id: session_id.clone(),
            nodes,
            edges,
            model: model.to_string(),
            created_at,
        })
    }

    async fn list_mind_maps(&self, session_id: &SessionId) -> Result<Vec<MindMap>> {
        let rows = sqlx::query("SELECT * FROM mind_maps WHERE session_id = ? ORDER BY created_at ASC")
            .bind(session_id)
            .fetch_all(&self.pool)
            .await
            .map_err(StoreError::from)?;
        rows.iter().map(Self::row_to_mind_map).collect()
    }

    async fn get_settings_profile(&self) -> Result<SettingsProfile> {
        let row = sqlx::query("SELECT * FROM settings WHERE id = 1")
            .fetch_optional(&self.pool)
            .await
            .map_err(StoreError::from)?;

        match row {
            Some(row) => Ok(SettingsProfile {
                whisper_language: row.try_get("whisper_language").map_err(StoreError::from)?,
                whisper_model: row.try_get("whisper_model").map_err(StoreError::from)?,
                summary_model: row.try_get("summary_model").map_err(StoreError::from)?,
                mind_map_model: row.try_get("mind_map_model").map_err(StoreError::from)?,
                summary_prompt: row.try_get("summary_prompt").map_err(StoreError::from)?,
                mind_map_prompt: row.try_get("mind_map_prompt").map_err(StoreError::from)?,
                frame_length_ms: row.try_get::<i64, _>("frame_length_ms").map_err(StoreError::from)? as u32,
                frames_per_batch: row.try_get::<i64, _>("frames_per_batch").map_err(StoreError::from)? as u32,
                active_session_id: row.try_get("active_session_id").map_err(StoreError::from)?,
            }),
            None => {
                let default = SettingsProfile::default();
                self.save_settings_profile(&default).await?;
                Ok(default)
            }
        }
    }

    async fn save_settings_profile(&self, profile: &SettingsProfile) -> Result<()> {
        sqlx::query(
            "INSERT INTO settings (id, whisper_language, whisper_model, summary_model, mind_map_model, summary_prompt, mind_map_prompt, frame_length_ms, frames_per_batch, active_session_id)
             VALUES (1, ?, ?, ?, ?, ?, ?, ?, ?, ?)
             ON CONFLICT(id) DO UPDATE SET
                whisper_language = excluded.whisper_language,
                whisper_model = excluded.whisper_model,
                summary_model = excluded.summary_model,
                mind_map_model = excluded.mind_map_model,
                summary_prompt = excluded.summary_prompt,
                mind_map_prompt = excluded.mind_map_prompt,
                frame_length_ms = excluded.frame_length_ms,
                frames_per_batch = excluded.frames_per_batch,
                active_session_id = excluded.active_session_id",
        )
        .bind(&profile.whisper_language)
        .bind(&profile.whisper_model)
        .bind(&profile.summary_model)
        .bind(&profile.mind_map_model)
        .bind(&profile.summary_prompt)
        .bind(&profile.mind_map_prompt)
        .bind(profile.frame_length_ms as i64)
        .bind(profile.frames_per_batch as i64)
        .bind(&profile.active_session_id)
        .execute(&self.pool)
        .await
        .map_err(StoreError::from)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    async fn memory_store() -> SqliteStore {
        SqliteStore::connect("sqlite::memory:").await.unwrap()
    }

    #[tokio::test]
    async fn create_or_get_session_is_idempotent() {
        let store = memory_store().await;
        let id = "s1".to_string();
        let first = store.create_or_get_session(&id).await.unwrap();
        let second = store.create_or_get_session(&id).await.unwrap();
        assert_eq!(first.id, second.id);
        assert_eq!(first.created_at, second.created_at);
    }

    #[tokio::test]
    async fn rename_unknown_session_is_session_not_found() {
        let store = memory_store().await;
        let err = store.rename_session(&"missing".to_string(), "new name").await;
        assert!(matches!(err, Err(CoreError::SessionNotFound(_))));
    }

    #[tokio::test]
    async fn transcripts_list_in_creation_order() {
        let store = memory_store().await;
        let id = "s1".to_string();
        store.create_or_get_session(&id).await.unwrap();
        store.insert_transcript(&id, "first", "en", "whisper-1").await.unwrap();
        store.insert_transcript(&id, "second", "en", "whisper-1").await.unwrap();

        let transcripts = store.list_transcripts(&id).await.unwrap();
        assert_eq!(transcripts.len(), 2);
        assert_eq!(transcripts[0].text, "first");
        assert_eq!(transcripts[1].text, "second");
        assert!(transcripts[0].id < transcripts[1].id);
    }

    #[tokio::test]
    async fn delete_session_cascades_to_children() {
        let store = memory_store().await;
        let id = "s1".to_string();
        store.create_or_get_session(&id).await.unwrap();
        store.insert_transcript(&id, "hello", "en", "whisper-1").await.unwrap();
        store
            .insert_analysis(&id, "prompt", "response", "gpt-4o-mini", 10)
            .await
            .unwrap();
        store
            .insert_mind_map(&id, vec![], vec![], "gpt-4o-mini")
            .await
            .unwrap();

        store.delete_session(&id).await.unwrap();

        assert!(store.get_session(&id).await.unwrap().is_none());
        assert!(store.list_transcripts(&id).await.unwrap().is_empty());
        assert!(store.list_analyses(&id).await.unwrap().is_empty());
        assert!(store.list_mind_maps(&id).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn mark_transcript_processed_sets_timestamp_once() {
        let store = memory_store().await;
        let id = "s1".to_string();
        store.create_or_get_session(&id).await.unwrap();
        let transcript = store.insert_transcript(&id, "hello", "en", "whisper-1").await.unwrap();
        assert!(transcript.processed_at.is_none());

        store.mark_transcript_processed(&id, transcript.id).await.unwrap();
        let reloaded = &store.list_transcripts(&id).await.unwrap()[0];
        assert!(reloaded.processed_at.is_some());
        let first_stamp = reloaded.processed_at;

        store.mark_transcript_processed(&id, transcript.id).await.unwrap();
        let reloaded_again = &store.list_transcripts(&id).await.unwrap()[0];
        assert_eq!(reloaded_again.processed_at, first_stamp);
    }

    #[tokio::test]
    async fn settings_profile_seeds_defaults_then_persists_updates() {
        let store = memory_store().await;
        let loaded = store.get_settings_profile().await.unwrap();
        assert_eq!(loaded, SettingsProfile::default());

        let mut updated = loaded;
        updated.summary_model = "custom-model".to_string();
        store.save_settings_profile(&updated).await.unwrap();

        let reloaded = store.get_settings_profile().await.unwrap();
        assert_eq!(reloaded.summary_model, "custom-model");
    }
}
