//! Roombook - meeting room booking server
//!
//! Loads configuration, opens storage and serves the booking protocol until
//! interrupted.

use std::process::ExitCode;
use std::sync::Arc;
use std::time::Duration;

use roombook_core::{AppConfig, Storage, UserRepository};
use roombook_net::Server;
use tokio::sync::broadcast;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

mod state;

/// How often expired sessions are purged
const SESSION_SWEEP_INTERVAL: Duration = Duration::from_secs(60 * 60);

fn main() -> ExitCode {
    // Initialize logging
    tracing_subscriber::registry()
        .with(tracing_subscriber::fmt::layer())
        .with(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    tracing::info!("Starting Roombook");

    let config = match AppConfig::load() {
        Ok(config) => config,
        Err(e) => {
            tracing::error!("Failed to load configuration: {}", e);
            return ExitCode::FAILURE;
        }
    };

    let app_state = match state::AppState::new(config) {
        Ok(state) => state,
        Err(e) => {
            tracing::error!("Failed to initialize application: {}", e);
            return ExitCode::FAILURE;
        }
    };

    let runtime = match tokio::runtime::Runtime::new() {
        Ok(runtime) => runtime,
        Err(e) => {
            tracing::error!("Failed to create tokio runtime: {}", e);
            return ExitCode::FAILURE;
        }
    };

    match runtime.block_on(serve(app_state)) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            tracing::error!("Server failed: {}", e);
            ExitCode::FAILURE
        }
    }
}

async fn serve(app_state: state::AppState) -> roombook_net::Result<()> {
    let address = app_state.config.server.address();
    let server = Server::start(address.as_str(), app_state.handler.clone()).await?;
    tracing::info!(addr = %server.addr(), "Accepting connections");

    let (stop_tx, stop_rx) = broadcast::channel(1);
    let sweeper = tokio::spawn(sweep_sessions(app_state.store.clone(), stop_rx));

    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %e, "Failed to listen for shutdown signal");
    }

    tracing::info!("Shutting down");
    server.shutdown();
    let _ = stop_tx.send(());
    let _ = sweeper.await;
    Ok(())
}

/// Periodically drop expired sessions
async fn sweep_sessions(store: Arc<dyn Storage>, mut stop_rx: broadcast::Receiver<()>) {
    loop {
        tokio::select! {
            _ = tokio::time::sleep(SESSION_SWEEP_INTERVAL) => {
                let store = store.clone();
                match tokio::task::spawn_blocking(move || store.cleanup_expired_sessions()).await {
                    Ok(Ok(removed)) if removed > 0 => {
                        tracing::debug!(removed, "Expired sessions purged");
                    }
                    Ok(Ok(_)) => {}
                    Ok(Err(e)) => tracing::warn!(error = %e, "Session purge failed"),
                    Err(e) => tracing::warn!(error = %e, "Session purge task failed"),
                }
            }
            _ = stop_rx.recv() => {
                tracing::debug!("Session sweeper shutting down");
                break;
            }
        }
    }
}
