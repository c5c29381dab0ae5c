//! Provision Agent - asynchronous provisioning pipeline for a hosting
//! reseller control panel

pub mod error;
pub mod middleware;
pub mod domain;
pub mod config;
pub mod panel;
pub mod ca;
pub mod dns;
pub mod state;
pub mod api;
pub mod services;

use tracing_subscriber::EnvFilter;

use crate::config::EnvConfig;
use crate::state::{get_shutdown_token, trigger_shutdown, AppState};

/// Command-line overrides applied on top of the environment configuration
#[derive(Debug, Default)]
pub struct RuntimeConfig {
    pub port_override: Option<u16>,
}

/// Initialize logging, build state, and serve until shutdown
pub async fn init_and_run(runtime: RuntimeConfig) {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let mut config = EnvConfig::from_env();
    if let Some(port) = runtime.port_override {
        config.port = port;
    }
    let port = config.port;

    let state = match AppState::from_env(config) {
        Ok(state) => state,
        Err(e) => {
            tracing::error!(error = %e, "Failed to build application state");
            std::process::exit(1);
        }
    };

    let shutdown = get_shutdown_token();
    tokio::spawn(services::sweep::run(state.clone(), shutdown.clone()));

    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::info!("Ctrl-C received, shutting down");
            trigger_shutdown();
        }
    });

    let app = api::router(state.clone());
    let addr = format!("0.0.0.0:{}", port);
    let listener = match tokio::net::TcpListener::bind(&addr).await {
        Ok(listener) => listener,
        Err(e) => {
            tracing::error!(addr = %addr, error = %e, "Failed to bind");
            std::process::exit(1);
        }
    };
    tracing::info!(addr = %addr, "Provision agent listening");

    if let Err(e) = axum::serve(listener, app)
        .with_graceful_shutdown(async move { shutdown.cancelled().await })
        .await
    {
        tracing::error!(error = %e, "Server exited with error");
    }

    state.cancel_running_ops().await;
    tracing::info!("Provision agent stopped");
}
