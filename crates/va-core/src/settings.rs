use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::Result;
use crate::session::SessionId;

/// Reserved model name meaning "this pipeline is disabled" (`SPEC_FULL.md` §6).
pub const DISABLED_MODEL: &str = "none";

/// Resolves a session's effective settings at the moment a pipeline
/// starts. `va-server::SettingsResolver` is the only implementation
/// shipped; the trait exists so `va-stt`/`va-llm` workers never depend on
/// `arc-swap` or the server's override-storage details directly.
#[async_trait]
pub trait SettingsSource: Send + Sync {
    async fn resolve(&self, session_id: &SessionId) -> Result<EffectiveSettings>;
}

/// The persisted settings singleton row (`SPEC_FULL.md` §3.1 / §6).
/// Seeded with sensible defaults on first boot if the store has no row yet.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SettingsProfile {
    pub whisper_language: String,
    pub whisper_model: String,
    pub summary_model: String,
    pub mind_map_model: String,
    pub summary_prompt: String,
    pub mind_map_prompt: String,
    pub frame_length_ms: u32,
    pub frames_per_batch: u32,
    pub active_session_id: Option<String>,
}

impl SettingsProfile {
    /// Apply a `TemporaryOverride` patch field-wise, producing the
    /// immutable snapshot a pipeline resolves once at job start.
    pub fn resolve(&self, over: Option<&TemporaryOverride>) -> EffectiveSettings {
        let mut summary_model = self.summary_model.clone();
        let mut mind_map_model = self.mind_map_model.clone();
        let mut summary_prompt = self.summary_prompt.clone();
        let mut mind_map_prompt = self.mind_map_prompt.clone();

        if let Some(over) = over {
            // `ollama_model` is a blanket override applied to both pipeline
            // models before the more specific per-pipeline fields, which
            // take precedence when present.
            if let Some(ref model) = over.ollama_model {
                summary_model = model.clone();
                mind_map_model = model.clone();
            }
            if let Some(ref model) = over.ollama_summary_model {
                summary_model = model.clone();
            }
            if let Some(ref model) = over.ollama_mind_map_model {
                mind_map_model = model.clone();
            }
            if let Some(ref prompt) = over.ollama_task_prompt {
                summary_prompt = prompt.clone();
            }
            if let Some(ref prompt) = over.ollama_mind_map_prompt {
                mind_map_prompt = prompt.clone();
            }
        }

        EffectiveSettings {
            whisper_language: self.whisper_language.clone(),
            whisper_model: self.whisper_model.clone(),
            summary_model,
            mind_map_model,
            summary_prompt,
            mind_map_prompt,
            frame_length_ms: self.frame_length_ms,
            frames_per_batch: self.frames_per_batch,
        }
    }
}

impl Default for SettingsProfile {
    fn default() -> Self {
        Self {
            whisper_language: "auto".to_string(),
            whisper_model: "whisper-1".to_string(),
            summary_model: "gpt-4o-mini".to_string(),
            mind_map_model: "gpt-4o-mini".to_string(),
            summary_prompt: default_summary_prompt(),
            mind_map_prompt: default_mind_map_prompt(),
            frame_length_ms: 3000,
            frames_per_batch: 1,
            active_session_id: None,
        }
    }
}

/// Templates are embedded at compile time the way the teacher embeds its
/// post-processing templates, so the running binary never depends on a
/// working-directory-relative `prompts/` path.
pub fn default_summary_prompt() -> String {
    include_str!("../../../prompts/summary.md").to_string()
}

pub fn default_mind_map_prompt() -> String {
    include_str!("../../../prompts/mind_map.md").to_string()
}

pub fn mind_map_repair_prompt(raw_output: &str) -> String {
    include_str!("../../../prompts/mind_map_repair.md").replace("{raw_output}", raw_output)
}

/// Derived, immutable settings snapshot a pipeline resolves exactly once
/// at job start (`SPEC_FULL.md` §3).
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct EffectiveSettings {
    pub whisper_language: String,
    pub whisper_model: String,
    pub summary_model: String,
    pub mind_map_model: String,
    pub summary_prompt: String,
    pub mind_map_prompt: String,
    pub frame_length_ms: u32,
    pub frames_per_batch: u32,
}

impl EffectiveSettings {
    pub fn summary_disabled(&self) -> bool {
        self.summary_model == DISABLED_MODEL
    }

    pub fn mind_map_disabled(&self) -> bool {
        self.mind_map_model == DISABLED_MODEL
    }
}

/// A shallow, process-wide patch over the persisted `SettingsProfile`.
/// Field names mirror the wire shape of `POST /settings/apply-temporary`
/// (`SPEC_FULL.md` §6) exactly, so the HTTP handler can deserialize the
/// request body directly into this type.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct TemporaryOverride {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ollama_summary_model: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ollama_mind_map_model: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ollama_model: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ollama_task_prompt: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ollama_mind_map_prompt: Option<String>,
}

impl TemporaryOverride {
    pub fn is_empty(&self) -> bool {
        self == &TemporaryOverride::default()
    }

    /// Field-wise merge: fields present in `patch` overwrite this value's
    /// counterparts; absent fields fall through.
    pub fn merge(&mut self, patch: TemporaryOverride) {
        if patch.ollama_summary_model.is_some() {
            self.ollama_summary_model = patch.ollama_summary_model;
        }
        if patch.ollama_mind_map_model.is_some() {
            self.ollama_mind_map_model = patch.ollama_mind_map_model;
        }
        if patch.ollama_model.is_some() {
            self.ollama_model = patch.ollama_model;
        }
        if patch.ollama_task_prompt.is_some() {
            self.ollama_task_prompt = patch.ollama_task_prompt;
        }
        if patch.ollama_mind_map_prompt.is_some() {
            self.ollama_mind_map_prompt = patch.ollama_mind_map_prompt;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn resolve_with_no_override_returns_persisted_values() {
        let profile = SettingsProfile::default();
        let effective = profile.resolve(None);
        assert_eq!(effective.summary_model, profile.summary_model);
        assert_eq!(effective.mind_map_model, profile.mind_map_model);
    }

    #[test]
    fn specific_override_wins_over_blanket_override() {
        let profile = SettingsProfile::default();
        let over = TemporaryOverride {
            ollama_model: Some("blanket".to_string()),
            ollama_summary_model: Some("specific-summary".to_string()),
            ..Default::default()
        };
        let effective = profile.resolve(Some(&over));
        assert_eq!(effective.summary_model, "specific-summary");
        assert_eq!(effective.mind_map_model, "blanket");
    }

    #[test]
    fn disabled_sentinel_is_case_sensitive() {
        let mut profile = SettingsProfile::default();
        profile.summary_model = "None".to_string();
        let effective = profile.resolve(None);
        assert!(!effective.summary_disabled());
        profile.summary_model = "none".to_string();
        let effective = profile.resolve(None);
        assert!(effective.summary_disabled());
    }

    #[test]
    fn merge_only_overwrites_present_fields() {
        let mut current = TemporaryOverride {
            ollama_summary_model: Some("a".to_string()),
            ollama_mind_map_model: Some("b".to_string()),
            ..Default::default()
        };
        let patch = TemporaryOverride {
            ollama_summary_model: Some("c".to_string()),
            ..Default::default()
        };
        current.merge(patch);
        assert_eq!(current.ollama_summary_model, Some("c".to_string()));
        assert_eq!(current.ollama_mind_map_model, Some("b".to_string()));
    }

    #[test]
    fn empty_override_detected() {
        assert!(TemporaryOverride::default().is_empty());
        let over = TemporaryOverride {
            ollama_model: Some("x".to_string()),
            ..Default::default()
        };
        assert!(!over.is_empty());
    }
}
