//! services/journal_api/src/bin/journal_api.rs

use async_openai::{config::OpenAIConfig, Client};
use journal_api_lib::{
    adapters::{
        ChatModel, ConnectivityProbe, FileDeviceStore, FirebaseIdentityAdapter,
        OpenAiErasAdapter, OpenAiMoodAdapter, OpenAiReportAdapter, OpenAiSstAdapter,
    },
    config::{Config, ConfigError},
    error::ApiError,
    web::{build_router, state::AppState},
};
use mood_journal_core::{AuthSessionMonitor, ClassificationServices, Journal, JournalStore};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> Result<(), ApiError> {
    // --- 1. Load Configuration & Set Up Logging ---
    let config = Config::from_env()?;
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(config.log_level.to_string()))
        .with(tracing_subscriber::fmt::layer())
        .init();
    info!("Configuration loaded ({:?}). Starting server...", config.environment);

    // --- 2. Open the Device Store & Rehydrate the Journal ---
    let device = Arc::new(FileDeviceStore::open(&config.data_dir).await?);
    let store = JournalStore::create(device.clone()).await;

    // --- 3. Initialize Service Adapters ---
    let openai_key = config
        .openai_api_key
        .clone()
        .ok_or_else(|| ConfigError::MissingVar("OPENAI_API_KEY".to_string()))?;
    let openai_client = Client::with_config(OpenAIConfig::new().with_api_key(openai_key));
    let insights = config.insight_config();

    let classifier = ChatModel::new(openai_client.clone(), config.classifier_model.clone());
    let insights_model = ChatModel::new(openai_client.clone(), config.insights_model.clone());
    let services = ClassificationServices {
        speech: Arc::new(OpenAiSstAdapter::new(
            openai_client.clone(),
            config.transcription_model.clone(),
        )),
        mood: Arc::new(OpenAiMoodAdapter::new(classifier)),
        eras: Arc::new(OpenAiErasAdapter::new(
            insights_model.clone(),
            insights.min_eras,
            insights.max_eras,
        )),
        reports: Arc::new(OpenAiReportAdapter::new(
            insights_model,
            insights.report_summary_max_words,
        )),
    };
    let journal = Arc::new(Journal::new(store.clone(), services, insights));

    let firebase_key = config
        .firebase_api_key
        .clone()
        .ok_or_else(|| ConfigError::MissingVar("FIREBASE_API_KEY".to_string()))?;
    let identity = Arc::new(FirebaseIdentityAdapter::new(
        firebase_key,
        config.identity_base_url.clone(),
        config.token_base_url.clone(),
        device.clone(),
    )?);

    // --- 4. Start the Connectivity Probe & Session Monitor ---
    let shutdown = CancellationToken::new();
    let connectivity = ConnectivityProbe::new(
        config.connectivity_probe_url.clone(),
        config.poll_interval,
    )?
    .start(shutdown.clone())
    .await;
    let session = AuthSessionMonitor::create(
        identity,
        device,
        connectivity,
        config.monitor_config(),
    );
    let restored = session.restore().await;
    info!(
        "Session restored: signed in = {}, verified = {}",
        restored.user.is_some(),
        restored.is_verified
    );

    // --- 5. Build the Shared AppState & Router ---
    let app_state = Arc::new(AppState {
        journal,
        session: session.clone(),
    });
    let app = build_router(app_state);

    // --- 6. Start the Server ---
    info!("Starting server on {}", config.bind_address);
    info!(
        "Swagger UI available at http://{}/swagger-ui",
        config.bind_address
    );
    let listener = tokio::net::TcpListener::bind(&config.bind_address).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(async {
            if let Err(e) = tokio::signal::ctrl_c().await {
                warn!("Failed to listen for shutdown signal: {}", e);
            }
        })
        .await?;

    // --- 7. Tear Down ---
    info!("Shutting down...");
    shutdown.cancel();
    session.dispose();
    store.dispose().await;
    Ok(())
}
