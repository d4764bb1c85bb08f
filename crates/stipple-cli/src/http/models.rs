use std::path::Path;

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::{Deserialize, Serialize};
use stipple_contracts::GatewayError;

#[derive(Debug, Deserialize)]
pub struct GenerateRequest {
    #[serde(default)]
    pub prompt: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct ImageResponse {
    pub image_path: String,
}

impl ImageResponse {
    pub fn from_path(path: &Path) -> Self {
        Self {
            image_path: path.display().to_string(),
        }
    }
}

#[derive(Debug, Serialize)]
pub struct AudioResponse {
    pub audio_instruction: String,
    pub image_path: String,
}

#[derive(Debug, Serialize)]
pub struct CurrentImageResponse {
    pub image_path: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
}

#[derive(Debug)]
pub enum HttpError {
    Gateway(GatewayError),
    InvalidRequest(String),
    Internal(String),
}

impl From<GatewayError> for HttpError {
    fn from(err: GatewayError) -> Self {
        Self::Gateway(err)
    }
}

impl HttpError {
    pub fn status(&self) -> StatusCode {
        match self {
            Self::Gateway(err) if err.is_client_error() => StatusCode::BAD_REQUEST,
            Self::InvalidRequest(_) => StatusCode::BAD_REQUEST,
            Self::Gateway(_) | Self::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    pub fn message(&self) -> String {
        match self {
            Self::Gateway(err) => err.to_string(),
            Self::InvalidRequest(msg) | Self::Internal(msg) => msg.clone(),
        }
    }
}

impl IntoResponse for HttpError {
    fn into_response(self) -> Response {
        let body = serde_json::json!({ "error": self.message() });
        (self.status(), Json(body)).into_response()
    }
}
