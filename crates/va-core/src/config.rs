use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::{CoreError, Result};

/// Process-wide server configuration, loaded once at startup. Unlike
/// `SettingsProfile` (store-backed, mutable at runtime, per-session
/// default models/prompts) this governs the server itself and never
/// changes after boot.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    /// Address the HTTP/websocket listener binds to, e.g. "0.0.0.0:8787".
    pub bind_address: String,

    /// Path to the sqlite database file (or ":memory:" for tests).
    pub database_path: String,

    /// Upper bound on concurrently-running LLM jobs across all sessions
    /// and both pipeline kinds (SPEC_FULL §4.4).
    pub worker_pool_size: usize,

    /// Soft deadline for a single transcriber call, in seconds
    /// (SPEC_FULL §4.2.1).
    pub transcriber_timeout_secs: u64,

    /// Soft deadline for a single LLM call, in seconds.
    pub llm_timeout_secs: u64,

    /// How long a per-session transcription worker sits idle before it
    /// retires and frees its task (SPEC_FULL §4.2.1).
    pub worker_idle_timeout_secs: u64,

    /// Max frames an `AudioIntake` queue holds before dropping the
    /// oldest one (SPEC_FULL §4.1).
    pub intake_queue_high_water_mark: usize,

    /// Base URL of the STT backend's OpenAI-compatible endpoint.
    pub stt_base_url: String,

    /// Base URL of the LLM backend's chat-completions-compatible endpoint.
    pub llm_base_url: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_address: "0.0.0.0:8787".to_string(),
            database_path: "voice-assistant.db".to_string(),
            worker_pool_size: 4,
            transcriber_timeout_secs: 60,
            llm_timeout_secs: 60,
            worker_idle_timeout_secs: 120,
            intake_queue_high_water_mark: 64,
            stt_base_url: "https://api.openai.com/v1".to_string(),
            llm_base_url: "https://api.openai.com/v1".to_string(),
        }
    }
}

impl ServerConfig {
    /// Default config directory, following the same `directories` crate
    /// convention as the rest of this project's config surface.
    pub fn default_config_dir() -> Result<PathBuf> {
        directories::ProjectDirs::from("com", "voiceassistant", "Server")
            .map(|proj_dirs| proj_dirs.config_dir().to_path_buf())
            .ok_or_else(|| CoreError::Config("failed to get config directory".to_string()))
    }

    pub fn default_config_file() -> Result<PathBuf> {
        Ok(Self::default_config_dir()?.join("config.toml"))
    }

    /// Loads from a TOML file, falling back to defaults for any field
    /// left unspecified. API keys are intentionally absent from this
    /// struct — they're read from the environment at adapter-construction
    /// time so they never round-trip through a config file on disk.
    pub fn load_from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let config: ServerConfig = toml::from_str(&content)?;
        Ok(config)
    }

    pub fn save_to_file<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let content = toml::to_string_pretty(self)
            .map_err(|e| CoreError::Config(format!("failed to serialize config: {e}")))?;

        if let Some(parent) = path.as_ref().parent() {
            std::fs::create_dir_all(parent)?;
        }

        std::fs::write(path, content)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_has_sane_worker_pool() {
        let config = ServerConfig::default();
        assert!(config.worker_pool_size > 0);
        assert!(config.transcriber_timeout_secs > 0);
    }

    #[test]
    fn round_trips_through_toml() {
        let config = ServerConfig::default();
        let toml_str = toml::to_string_pretty(&config).unwrap();
        let parsed: ServerConfig = toml::from_str(&toml_str).unwrap();
        assert_eq!(parsed.bind_address, config.bind_address);
    }
}
