use std::sync::Arc;
use std::time::Instant;

use tokio::sync::broadcast;

use va_core::bus::{BusEvent, OperationKind};
use va_core::error::{CoreError, Result};
use va_core::llm::LlmInvoker;
use va_core::session::SessionId;
use va_core::store::Store;

use crate::prompts::PromptBuilder;

/// Composes the summary prompt, invokes the LLM, and persists the
/// result, per SPEC_FULL §4.5. Grounded on
/// `lt-pipeline::orchestrator::PipelineOrchestrator::start`'s post-
/// transcription invoke-then-persist-then-emit sequence.
pub struct SummaryPipeline {
    store: Arc<dyn Store>,
    invoker: Arc<dyn LlmInvoker>,
    prompts: PromptBuilder,
}

impl SummaryPipeline {
    pub fn new(store: Arc<dyn Store>, invoker: Arc<dyn LlmInvoker>) -> Self {
        Self {
            store,
            invoker,
            prompts: PromptBuilder::new(),
        }
    }

    /// Runs to completion or failure; the caller (`PipelineOrchestrator`)
    /// is responsible for releasing the processing slot regardless of
    /// the outcome.
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

        let prompt = self.prompts.summary_prompt(prompt_template, &combined);

        let started = Instant::now();
        let response = match self.invoker.complete(model, &prompt).await {
            Ok(response) => response,
            Err(e) => {
                let _ = bus_tx.send(BusEvent::Error {
                    session_id: Some(session_id.clone()),
                    kind: Some(OperationKind::Summary),
                    message: e.to_string(),
                    recoverable: true,
                });
                return Err(e);
            }
        };
        let processing_time_ms = started.elapsed().as_millis() as u64;

        let analysis = self
            .store
            .insert_analysis(session_id, &prompt, &response, model, processing_time_ms)
            .await?;

        let _ = bus_tx.send(BusEvent::SessionAnalysis {
            session_id: session_id.clone(),
            analysis_id: analysis.id,
            processing_time_ms,
            analysis: analysis.response,
        });

        Ok(())
    }
}
