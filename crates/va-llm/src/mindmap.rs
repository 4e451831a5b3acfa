use std::sync::Arc;

use tokio::sync::broadcast;

use va_core::bus::{BusEvent, OperationKind};
use va_core::error::{CoreError, Result};
use va_core::llm::LlmInvoker;
use va_core::session::SessionId;
use va_core::store::Store;

use crate::json_repair::{parse_and_validate, repair_prompt};
use crate::prompts::PromptBuilder;

/// Composes the mind-map prompt, invokes the LLM, parses/repairs the
/// JSON response, and persists the result, per SPEC_FULL §4.6.
pub struct MindMapPipeline {
    store: Arc<dyn Store>,
    invoker: Arc<dyn LlmInvoker>,
    prompts: PromptBuilder,
}

impl MindMapPipeline {
    pub fn new(store: Arc<dyn Store>, invoker: Arc<dyn LlmInvoker>) -> Self {
        Self {
            store,
            invoker,
            prompts: PromptBuilder::new(),
        }
    }

    pub async fn run(
        &self,
        session_id: &SessionId,
        model: &str,
        prompt_template: &str,
        bus_tx: &broadcast::Sender<BusEvent>,
    ) -> Result<()> {
        let transcripts = self.store.list_transcripts(session_id).await?;
        if transcripts.is_empty() {
            return Err(CoreError::NoContent(session_id.clone()));
        }

        let combined: String = transcripts
            .iter()
            .map(|t| t.text.as_str())
            .collect::<Vec<_>>()
            .join(" ");

        let prompt = self.prompts.mind_map_prompt(prompt_template, &combined);

        let raw_response = match self.invoker.complete(model, &prompt).await {
            Ok(response) => response,
            Err(e) => {
                let _ = bus_tx.send(BusEvent::Error {
                    session_id: Some(session_id.clone()),
                    kind: Some(OperationKind::MindMap),
                    message: e.to_string(),
                    recoverable: true,
                });
                return Err(e);
            }
        };

        let (nodes, edges) = match parse_and_validate(&raw_response) {
            Ok(graph) => graph,
            Err(_first_error) => {
                // One repair attempt, per SPEC_FULL §4.6 — quote the
                // offending output and ask for a corrected response.
                let repaired = match self
                    .invoker
                    .complete(model, &repair_prompt(&raw_response))
                    .await
                {
                    Ok(repaired) => repaired,
                    Err(e) => {
                        let _ = bus_tx.send(BusEvent::Error {
                            session_id: Some(session_id.clone()),
                            kind: Some(OperationKind::MindMap),
                            message: e.to_string(),
                            recoverable: true,
                        });
                        return Err(e);
                    }
                };
                match parse_and_validate(&repaired) {
                    Ok(graph) => graph,
                    Err(_) => {
                        let err = CoreError::InvalidMindMap(raw_response.clone());
                        let _ = bus_tx.send(BusEvent::Error {
                            session_id: Some(session_id.clone()),
                            kind: Some(OperationKind::MindMap),
                            message: err.to_string(),
                            recoverable: true,
                        });
                        return Err(err);
                    }
                }
            }
        };

        let node_count = nodes.len();
        let edge_count = edges.len();
        let mind_map = self
            .store
            .insert_mind_map(session_id, nodes, edges, model)
            .await?;

        let _ = bus_tx.send(BusEvent::MindMapResult {
            session_id: session_id.clone(),
            mind_map_id: mind_map.id,
            model: mind_map.model,
            nodes: node_count,
            edges: edge_count,
        });

        Ok(())
    }
}
