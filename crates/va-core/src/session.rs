use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::{CoreError, Result};

/// Opaque session identifier. The server never mints one on the client's
/// behalf — see `SPEC_FULL.md` §9's resolution of the auto-creation
/// Open Question.
pub type SessionId = String;

/// A logical conversation with its own transcript history and derived
/// artifacts.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Session {
    pub id: SessionId,
    pub name: Option<String>,
    pub created_at: DateTime<Utc>,
    pub last_activity: DateTime<Utc>,
    pub is_active: bool,
}

impl Session {
    pub fn new(id: impl Into<SessionId>) -> Self {
        let now = Utc::now();
        Self {
            id: id.into(),
            name: None,
            created_at: now,
            last_activity: now,
            is_active: true,
        }
    }
}

/// A single transcribed utterance. Text and language are immutable once
/// created; only `processed_at` may be set later.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Transcript {
    pub id: i64,
    pub session_id: SessionId,
    pub text: String,
    pub language: String,
    pub model: String,
    pub created_at: DateTime<Utc>,
    pub processed_at: Option<DateTime<Utc>>,
}

/// An LLM-derived textual summary of a session's transcripts so far.
/// Append-only: a session may have many.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Analysis {
    pub id: i64,
    pub session_id: SessionId,
    pub prompt: String,
    pub response: String,
    pub model: String,
    pub processing_time_ms: u64,
    pub created_at: DateTime<Utc>,
}

/// A node in a mind-map graph. `id` is unique within its parent `MindMap`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct MindMapNode {
    pub id: String,
    pub label: String,
    #[serde(rename = "type", skip_serializing_if = "Option::is_none")]
    pub node_type: Option<String>,
}

/// An edge connecting two nodes within the same `MindMap`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct MindMapEdge {
    pub id: String,
    pub source: String,
    pub target: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub label: Option<String>,
    #[serde(rename = "type", skip_serializing_if = "Option::is_none")]
    pub edge_type: Option<String>,
}

/// A small labeled concept graph derived from a session's transcripts.
/// Append-only. Invariant: every edge endpoint resolves to a node in the
/// same map (enforced by [`MindMap::validate`]).
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct MindMap {
    pub id: i64,
    pub session_id: SessionId,
    pub nodes: Vec<MindMapNode>,
    pub edges: Vec<MindMapEdge>,
    pub model: String,
    pub created_at: DateTime<Utc>,
}

impl MindMap {
    /// Checks the structural invariant from `SPEC_FULL.md` §3 / §8.6:
    /// node ids are unique, edge ids are unique, and every edge endpoint
    /// resolves to a node in the same map.
    pub fn validate(&self) -> Result<()> {
        validate_graph(&self.nodes, &self.edges)
    }
}

/// Shared validation for a candidate node/edge set, used both by
/// `MindMap::validate` (persisted rows) and the mind-map pipeline's JSON
/// validation pass before anything is persisted.
pub fn validate_graph(nodes: &[MindMapNode], edges: &[MindMapEdge]) -> Result<()> {
    use std::collections::HashSet;

    let mut node_ids = HashSet::with_capacity(nodes.len());
    for node in nodes {
        if node.id.trim().is_empty() {
            return Err(CoreError::InvalidMindMap("node with empty id".into()));
        }
        if node.label.trim().is_empty() {
            return Err(CoreError::InvalidMindMap(format!(
                "node {} has empty label",
                node.id
            )));
        }
        if !node_ids.insert(node.id.as_str()) {
            return Err(CoreError::InvalidMindMap(format!(
                "duplicate node id {}",
                node.id
            )));
        }
    }

    let mut edge_ids = HashSet::with_capacity(edges.len());
    for edge in edges {
        if !edge_ids.insert(edge.id.as_str()) {
            return Err(CoreError::InvalidMindMap(format!(
                "duplicate edge id {}",
                edge.id
            )));
        }
        if !node_ids.contains(edge.source.as_str()) {
            return Err(CoreError::InvalidMindMap(format!(
                "edge {} source {} is not a known node",
                edge.id, edge.source
            )));
        }
        if !node_ids.contains(edge.target.as_str()) {
            return Err(CoreError::InvalidMindMap(format!(
                "edge {} target {} is not a known node",
                edge.id, edge.target
            )));
        }
    }

    Ok(())
}
