//! HTTP API Server
//!
//! Axum-based server exposing generation and the generated files.

use anyhow::{Context, Result};
use axum::http::HeaderValue;
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

use crate::commands::serve::{ServeArgs, print_endpoints};

pub mod error;
pub mod handlers;
pub mod outputs;
pub mod routes;
pub mod state;

/// Log filter used when `RUST_LOG` is unset
pub const DEFAULT_LOG_FILTER: &str = "promptwave=info,promptwave_cli=info,tower_http=info";

/// Settings the router needs, validated from the command line
#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub outputs_dir: PathBuf,
    pub cors_origin: HeaderValue,
}

impl ServerConfig {
    pub fn from_args(args: &ServeArgs) -> Result<Self> {
        let cors_origin = HeaderValue::from_str(&args.cors_origin)
            .with_context(|| format!("Invalid CORS origin {:?}", args.cors_origin))?;
        Ok(Self {
            outputs_dir: args.outputs_dir.clone(),
            cors_origin,
        })
    }
}

pub fn init_tracing() {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_LOG_FILTER));
    let _ = tracing_subscriber::fmt().with_env_filter(filter).try_init();
}

pub async fn start_server(args: ServeArgs) -> Result<()> {
    init_tracing();
    let config = ServerConfig::from_args(&args)?;

    let model_args = args.model.clone();
    let model = tokio::task::spawn_blocking(move || model_args.load()).await??;
    tracing::info!(
        "Model loaded (sample rate: {}Hz, {} decoder steps per request)",
        model.sample_rate,
        model.total_steps()
    );

    let outputs = outputs::OutputStore::new(&config.outputs_dir);
    let state = state::AppState::new(Box::new(model), outputs);
    let app = routes::create_router(state, config.cors_origin);

    let addr = format!("{}:{}", args.host, args.port);
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .with_context(|| format!("Failed to bind {}", addr))?;

    print_endpoints(&args.host, args.port);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::warn!("failed to listen for ctrl-c: {}", e);
        std::future::pending::<()>().await;
    }
    tracing::info!("shutting down");
}
