mod http_routes;
mod settings_resolver;
mod transport;

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use axum::routing::{get, post};
use axum::Router;
use tokio::sync::Mutex as AsyncMutex;
use tower_http::cors::CorsLayer;
use tracing::info;

use va_audio::AudioIntake;
use va_core::config::ServerConfig;
use va_llm::http::HttpLlmInvoker;
use va_pipeline::{PipelineOrchestrator, ProcessingStateManager, SessionBus};
use va_stt::http::HttpTranscriber;
use va_stt::WorkerConfig;
use va_store::SqliteStore;

use settings_resolver::SettingsResolver;
use transport::AppState;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let config = load_config();
    info!(bind_address = %config.bind_address, "starting voice assistant server");

    let database_url = format!("sqlite://{}?mode=rwc", config.database_path);
    let store: Arc<dyn va_core::store::Store> =
        Arc::new(SqliteStore::connect(&database_url).await?);

    let stt_api_key = std::env::var("VA_STT_API_KEY").ok();
    let transcriber: Arc<dyn va_core::transcriber::Transcriber> =
        Arc::new(HttpTranscriber::new(config.stt_base_url.clone(), stt_api_key));

    let llm_api_key = std::env::var("VA_LLM_API_KEY").unwrap_or_default();
    let llm: Arc<dyn va_core::llm::LlmInvoker> = Arc::new(HttpLlmInvoker::custom(
        config.llm_base_url.clone(),
        llm_api_key,
    ));

    let intake = Arc::new(AudioIntake::new(config.intake_queue_high_water_mark));
    let bus = Arc::new(SessionBus::new());
    let processing_state = Arc::new(ProcessingStateManager::new());
    let settings = Arc::new(SettingsResolver::new(store.clone()));

    let (new_transcript_tx, new_transcript_rx) = tokio::sync::mpsc::unbounded_channel();

    let orchestrator = Arc::new(PipelineOrchestrator::new(
        store.clone(),
        llm.clone(),
        settings.clone() as Arc<dyn va_core::settings::SettingsSource>,
        bus.clone(),
        processing_state.clone(),
        config.worker_pool_size,
    ));
    tokio::spawn(orchestrator.run(new_transcript_rx));

    let worker_config = Arc::new(WorkerConfig {
        idle_timeout: Duration::from_secs(config.worker_idle_timeout_secs),
        transcriber_timeout: Duration::from_secs(config.transcriber_timeout_secs),
    });

    let state = AppState {
        store,
        transcriber,
        llm,
        intake,
        bus,
        settings,
        processing_state,
        new_transcript_tx,
        worker_config,
        workers: Arc::new(AsyncMutex::new(HashMap::new())),
    };

    let app = Router::new()
        .route("/ws", get(transport::ws_handler))
        .route(
            "/settings/apply-temporary",
            post(http_routes::apply_temporary_settings),
        )
        .route(
            "/settings/temporary-settings",
            get(http_routes::get_temporary_settings).delete(http_routes::clear_temporary_settings),
        )
        .route(
            "/processing-status/:session_id",
            get(http_routes::processing_status),
        )
        .route(
            "/sessions/:session_id/transcripts",
            get(http_routes::list_transcripts),
        )
        .route(
            "/sessions/:session_id/analyses",
            get(http_routes::list_analyses),
        )
        .route(
            "/sessions/:session_id/mind-maps",
            get(http_routes::list_mind_maps),
        )
        .layer(CorsLayer::permissive())
        .with_state(state);

    let listener = tokio::net::TcpListener::bind(&config.bind_address).await?;
    info!(addr = %config.bind_address, "listening");
    axum::serve(listener, app).await?;

    Ok(())
}

/// Loads `ServerConfig` from the platform config directory, falling back
/// to defaults and writing them out on first run — mirrors the
/// teacher's `AppConfig` bootstrap.
fn load_config() -> ServerConfig {
    match ServerConfig::default_config_file() {
        Ok(path) => match ServerConfig::load_from_file(&path) {
            Ok(config) => config,
            Err(_) => {
                let config = ServerConfig::default();
                if let Err(e) = config.save_to_file(&path) {
                    tracing::warn!(error = %e, "failed to write default config, continuing with in-memory defaults");
                }
                config
            }
        },
        Err(e) => {
            tracing::warn!(error = %e, "failed to resolve config directory, using defaults");
            ServerConfig::default()
        }
    }
}
