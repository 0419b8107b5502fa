//! Main Entrypoint for the Duet Client Runtime
//!
//! This binary is responsible for:
//! 1. Loading configuration from the environment.
//! 2. Initializing logging.
//! 3. Loading persisted voice settings.
//! 4. Assembling the gateway, voice session, and session runtime.
//! 5. Running until Ctrl+C and shutting down gracefully.
//!
//! It is a headless harness: stdin lines become chat input, which makes
//! the runtime usable from a terminal without any UI embedding.

use anyhow::Context;
use clap::Parser;
use duet_client::{
    api::ApiClient,
    config::Config,
    session::{SessionRuntime, UiEvent},
    settings::SettingsStore,
    state::AppState,
};
use duet_core::voice::VoiceSession;
use duet_gateway::{ConnectionManager, GatewayConfig};
use std::sync::Arc;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::sync::{Mutex, mpsc};
use tokio_util::sync::CancellationToken;
use tracing::info;
use uuid::Uuid;

/// Command-line options. Most configuration lives in the environment;
/// these are the per-invocation overrides.
#[derive(Parser, Debug)]
#[command(name = "duet-client", about = "Duet assistant client runtime")]
struct Cli {
    /// Gateway URL override.
    #[arg(long)]
    gateway_url: Option<String>,
    /// Resume an existing session instead of starting a new one.
    #[arg(long)]
    session: Option<Uuid>,
}

/// Forwards stdin lines to the runtime as chat input.
async fn read_stdin(ui_events: mpsc::Sender<UiEvent>, cancel: CancellationToken) {
    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    loop {
        tokio::select! {
            () = cancel.cancelled() => break,
            line = lines.next_line() => match line {
                Ok(Some(line)) if !line.trim().is_empty() => {
                    if ui_events.send(UiEvent::ChatInput(line)).await.is_err() {
                        break;
                    }
                }
                Ok(Some(_)) => {}
                Ok(None) | Err(_) => break,
            },
        }
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // --- 1. Load Configuration ---
    let mut config = Config::from_env().context("Failed to load configuration")?;
    if let Some(url) = cli.gateway_url {
        config.gateway_url = url;
    }

    // --- 2. Initialize Logging ---
    tracing_subscriber::fmt()
        .with_max_level(config.log_level)
        .with_timer(tracing_subscriber::fmt::time::ChronoLocal::rfc_3339())
        .init();
    info!("Configuration loaded. Initializing client runtime...");

    // --- 3. Load Persisted Settings ---
    let settings = SettingsStore::load(&config.settings_path);
    let voice_settings = settings.get();
    info!(
        auto_play = voice_settings.auto_play,
        wake_mode = voice_settings.wake_mode,
        "Loaded voice preferences."
    );

    // --- 4. Assemble the Runtime ---
    let gateway = ConnectionManager::new(GatewayConfig {
        url: config.gateway_url.clone(),
        backoff_base: config.reconnect_base,
        backoff_cap: config.reconnect_cap,
        max_reconnect_attempts: config.max_reconnect_attempts,
    });

    // No platform speech engine ships with the headless binary; embedding
    // UIs construct the voice session with their own engines.
    let (voice, utterances) = VoiceSession::unsupported();

    let state = AppState {
        config: Arc::new(config.clone()),
        settings: Arc::new(Mutex::new(settings)),
        api: ApiClient::new(config.api_base_url.clone()),
    };

    let (runtime, ui_events) = SessionRuntime::new(state, gateway, voice, utterances);
    let runtime = match cli.session {
        Some(session_id) => runtime.with_session(session_id),
        None => runtime,
    };
    let cancel = CancellationToken::new();

    tokio::spawn(read_stdin(ui_events, cancel.clone()));
    let runtime_handle = tokio::spawn(runtime.run(cancel.clone()));

    info!(
        gateway_url = %config.gateway_url,
        "Client runtime started. Press Ctrl+C to exit."
    );

    // --- 5. Run Until Shutdown ---
    tokio::signal::ctrl_c()
        .await
        .expect("Failed to install Ctrl+C handler");
    info!("Received shutdown signal. Shutting down gracefully...");
    cancel.cancel();
    let _ = runtime_handle.await;

    info!("Client runtime has shut down.");
    Ok(())
}
