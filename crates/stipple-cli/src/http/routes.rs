use std::sync::Arc;

use axum::extract::multipart::{Multipart, MultipartRejection};
use axum::extract::rejection::JsonRejection;
use axum::extract::{DefaultBodyLimit, State};
use axum::routing::{get, post};
use axum::{Json, Router};
use stipple_contracts::tasks::TaskRequest;
use stipple_contracts::GatewayResult;
use tower_http::services::ServeDir;

use super::models::{
    AudioResponse, CurrentImageResponse, GenerateRequest, HealthResponse, HttpError,
    ImageResponse,
};
use super::{AppState, STATIC_MOUNT};

const MAX_UPLOAD_BYTES: usize = 25 * 1024 * 1024;

/// API routes. The web root is mounted under `/static` and also backs `/` for the page shell.
pub fn create_router(state: AppState) -> Router {
    let web_root = Arc::clone(&state.web_root);
    Router::new()
        .route("/health", get(health_handler))
        .route("/current-image", get(current_image_handler))
        .route("/generate-image", post(generate_image_handler))
        .route("/modify-image", post(modify_image_handler))
        .route("/process-audio", post(process_audio_handler))
        .nest_service(STATIC_MOUNT, ServeDir::new(web_root.as_path()))
        .fallback_service(ServeDir::new(web_root.as_path()))
        .layer(DefaultBodyLimit::max(MAX_UPLOAD_BYTES))
        .with_state(state)
}

async fn health_handler() -> Json<HealthResponse> {
    Json(HealthResponse { status: "ok" })
}

/// GET /current-image
async fn current_image_handler(
    State(state): State<AppState>,
) -> Result<Json<CurrentImageResponse>, HttpError> {
    let dispatcher = Arc::clone(&state.dispatcher);
    let current = run_blocking(move || Ok(dispatcher.current_image())).await?;
    Ok(Json(CurrentImageResponse {
        image_path: current.map(|path| state.public_path(&path)),
    }))
}

/// POST /generate-image
async fn generate_image_handler(
    State(state): State<AppState>,
    payload: Result<Json<GenerateRequest>, JsonRejection>,
) -> Result<Json<ImageResponse>, HttpError> {
    let Json(req) = payload.map_err(json_rejected)?;
    let prompt = req.prompt.unwrap_or_default();
    let dispatcher = Arc::clone(&state.dispatcher);
    let path = run_blocking(move || dispatcher.generate(&prompt)).await?;
    Ok(Json(ImageResponse {
        image_path: state.public_path(&path),
    }))
}

/// POST /modify-image
async fn modify_image_handler(
    State(state): State<AppState>,
    payload: Result<Json<TaskRequest>, JsonRejection>,
) -> Result<Json<ImageResponse>, HttpError> {
    let Json(req) = payload.map_err(json_rejected)?;
    let dispatcher = Arc::clone(&state.dispatcher);
    let path = run_blocking(move || dispatcher.modify(&req)).await?;
    Ok(Json(ImageResponse {
        image_path: state.public_path(&path),
    }))
}

/// POST /process-audio: multipart upload with an `audio` field.
async fn process_audio_handler(
    State(state): State<AppState>,
    multipart: Result<Multipart, MultipartRejection>,
) -> Result<Json<AudioResponse>, HttpError> {
    let mut multipart = multipart.map_err(|err| HttpError::InvalidRequest(err.body_text()))?;
    let audio = read_audio_field(&mut multipart)
        .await?
        .ok_or_else(|| HttpError::InvalidRequest("Audio file is required.".to_string()))?;
    let bridge = state
        .audio
        .clone()
        .ok_or_else(|| HttpError::Internal("Speech service is not configured.".to_string()))?;

    let dispatcher = Arc::clone(&state.dispatcher);
    let outcome = run_blocking(move || {
        let transcript = bridge.transcribe(&audio)?;
        dispatcher.apply_instruction(&transcript)
    })
    .await?;

    Ok(Json(AudioResponse {
        audio_instruction: outcome.instruction,
        image_path: state.public_path(&outcome.image_path),
    }))
}

async fn read_audio_field(multipart: &mut Multipart) -> Result<Option<Vec<u8>>, HttpError> {
    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|err| HttpError::InvalidRequest(err.to_string()))?
    {
        if field.name() == Some("audio") {
            let bytes = field
                .bytes()
                .await
                .map_err(|err| HttpError::InvalidRequest(err.to_string()))?;
            return Ok(Some(bytes.to_vec()));
        }
    }
    Ok(None)
}

fn json_rejected(rejection: JsonRejection) -> HttpError {
    HttpError::InvalidRequest(rejection.body_text())
}

/// Dispatcher work blocks on outbound HTTP, so it runs on the blocking pool.
async fn run_blocking<T, F>(work: F) -> Result<T, HttpError>
where
    F: FnOnce() -> GatewayResult<T> + Send + 'static,
    T: Send + 'static,
{
    tokio::task::spawn_blocking(work)
        .await
        .map_err(|err| HttpError::Internal(format!("worker task failed: {err}")))?
        .map_err(HttpError::from)
}
