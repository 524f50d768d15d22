use crate::server::error::ApiError;
use crate::server::state::AppState;
use axum::{
    Json,
    extract::{Path, Request, State},
    http::header,
    response::{IntoResponse, Response},
};
use promptwave::generate_to_file;
use serde::{Deserialize, Serialize};
use std::time::Instant;
use tower::ServiceExt;
use tower_http::services::ServeFile;

/// Decoder steps between progress log lines
const PROGRESS_LOG_INTERVAL: usize = 50;

#[derive(Serialize)]
pub struct HealthResponse {
    status: &'static str,
    version: &'static str,
}

pub async fn health_check() -> impl IntoResponse {
    Json(HealthResponse {
        status: "healthy",
        version: env!("CARGO_PKG_VERSION"),
    })
}

#[derive(Deserialize)]
pub struct GenerateRequest {
    prompt: String,
}

/// Run the model on the prompt, save the result under a fresh name and
/// return the WAV bytes.
pub async fn generate(
    State(state): State<AppState>,
    Json(payload): Json<GenerateRequest>,
) -> Result<Response, ApiError> {
    // Sequential processing: wait for any running generation
    let mut generator = state.generator.clone().lock_owned().await;
    let outputs = state.outputs.clone();
    let prompt = payload.prompt;

    let bytes = tokio::task::spawn_blocking(move || -> anyhow::Result<Vec<u8>> {
        outputs.ensure_dir()?;
        let path = outputs.new_file_path();
        tracing::info!(
            prompt_chars = prompt.chars().count(),
            "generating {}",
            path.display()
        );

        let start = Instant::now();
        let samples = generate_to_file(&mut **generator, &prompt, &path, &mut |step, total| {
            if step % PROGRESS_LOG_INTERVAL == 0 || step == total {
                tracing::info!("step {}/{}", step, total);
            }
        })?;
        tracing::info!(
            samples,
            "wrote {} in {:.2?}",
            path.display(),
            start.elapsed()
        );

        Ok(std::fs::read(&path)?)
    })
    .await??;

    Ok(([(header::CONTENT_TYPE, "audio/wav")], bytes).into_response())
}

/// Names of the generated files
pub async fn list_outputs(State(state): State<AppState>) -> Result<Json<Vec<String>>, ApiError> {
    let outputs = state.outputs.clone();
    let names = tokio::task::spawn_blocking(move || outputs.list()).await??;
    Ok(Json(names))
}

/// Static retrieval of one file from the outputs directory
pub async fn serve_output(
    State(state): State<AppState>,
    Path(filename): Path<String>,
    request: Request,
) -> Result<Response, ApiError> {
    let path = state
        .outputs
        .resolve(&filename)
        .ok_or(ApiError::NotFound(filename))?;

    match ServeFile::new(path).oneshot(request).await {
        Ok(response) => Ok(response.into_response()),
        Err(never) => match never {},
    }
}
