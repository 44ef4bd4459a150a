//! Surprise Sender server
//!
//! Hydrates the session store from Sled and serves the REST API.
//!
//! Usage:
//!   cargo run --bin load_data         # seed demo accounts, SMTP entries and drafts
//!   cargo run --bin surprise_sender   # start server
//!   cargo run --bin surprise-cli -- login --email admin-0@surprisesender.com --password password

use std::sync::Arc;

use tokio::net::TcpListener;
use tracing::{info, warn};

use surprise_sender::agents::{AgentDesk, AgentRegistry, DEFAULT_AGENT_SEND_LATENCY};
use surprise_sender::ai::{GeminiProvider, SuggestionProvider};
use surprise_sender::autosave::DraftAutoSaver;
use surprise_sender::config::AppConfig;
use surprise_sender::dispatch::Dispatcher;
use surprise_sender::rest::{create_router, AppState};
use surprise_sender::session::SessionStore;
use surprise_sender::storage::Storage;
use surprise_sender::telemetry;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Config first: the log settings come from it
    let config = AppConfig::from_env()?;
    let _log_guard = telemetry::init(&config.log);

    println!("🚀 Surprise Sender starting...");
    println!("📦 Storage: Sled at {}", config.data_dir);
    println!("🌐 REST (Axum) on {}", config.addr);

    // Open Sled and restore the session records
    let storage = Storage::open(&config.data_dir)?;
    let mut store = SessionStore::new(storage.clone()).with_demo_password(config.demo_password.clone());
    store.hydrate();
    match store.current_user() {
        Some(user) => info!(email = %user.email, role = %user.role, "Session restored"),
        None => info!("No signed-in user"),
    }
    let session = store.into_shared();

    // Gemini gateway; without a key every suggestion reports AI as unavailable
    let ai = GeminiProvider::new(
        reqwest::Client::new(),
        config.ai.api_key.clone(),
        config.ai.model.clone(),
        config.ai.base_url.clone(),
    );
    if !ai.is_available() {
        warn!("API key not configured; AI suggestions are disabled");
    }
    let ai: Arc<dyn SuggestionProvider> = Arc::new(ai);

    let dispatcher = Dispatcher::new(session.clone(), config.send_latency);
    let autosaver = DraftAutoSaver::new(session.clone(), config.autosave_quiet_period);
    // Agent composers share the draft quiet period
    let agents = AgentDesk::new(
        session.clone(),
        AgentRegistry::builtin(),
        config.autosave_quiet_period,
        DEFAULT_AGENT_SEND_LATENCY,
    );
    let app = create_router(AppState::new(
        session,
        dispatcher,
        autosaver,
        agents,
        ai,
        &config.jwt_secret,
    ));

    // Start Axum HTTP server
    let listener = TcpListener::bind(config.addr).await?;
    info!(addr = %config.addr, "Listening");
    axum::serve(listener, app.into_make_service())
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    // Make sure the last write-through reaches disk
    storage.flush()?;
    println!("Shutting down...");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        warn!(error = %e, "Failed to listen for Ctrl-C");
    }
}
