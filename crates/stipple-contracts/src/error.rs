use std::time::Duration;

use serde_json::Value;

pub type GatewayResult<T> = Result<T, GatewayError>;

/// Every failure a gateway operation can surface to its caller.
///
/// The first group (`Validation` through `Precondition`) is caused by the caller and maps to a
/// 400 at the HTTP boundary; everything else is a 500.
#[derive(Debug, thiserror::Error)]
pub enum GatewayError {
    #[error("{0}")]
    Validation(String),
    #[error("Unknown task: {0}")]
    UnknownTask(String),
    #[error("Unrecognized instruction: {0}")]
    UnrecognizedInstruction(String),
    #[error("{0}")]
    Precondition(String),
    #[error("Error: {payload}")]
    RemoteService { status: u16, payload: Value },
    #[error("upstream request timed out after {}s", .0.as_secs())]
    UpstreamTimeout(Duration),
    #[error("upstream request failed: {0}")]
    Transport(String),
    #[error("audio transcoding failed: {0}")]
    Transcode(String),
    #[error("transcription failed: {0}")]
    Transcription(String),
    #[error("failed to store artifact: {0}")]
    Storage(String),
    #[error("configuration error: {0}")]
    Config(String),
}

impl GatewayError {
    pub fn validation(message: impl Into<String>) -> Self {
        Self::Validation(message.into())
    }

    pub fn precondition(message: impl Into<String>) -> Self {
        Self::Precondition(message.into())
    }

    /// Builds a `RemoteService` error from a raw upstream body. Bodies that are not JSON are
    /// kept as a JSON string so the payload is never lost.
    pub fn remote_service(status: u16, body: &[u8]) -> Self {
        let payload = serde_json::from_slice::<Value>(body)
            .unwrap_or_else(|_| Value::String(String::from_utf8_lossy(body).trim().to_string()));
        Self::RemoteService { status, payload }
    }

    pub fn is_client_error(&self) -> bool {
        matches!(
            self,
            Self::Validation(_)
                | Self::UnknownTask(_)
                | Self::UnrecognizedInstruction(_)
                | Self::Precondition(_)
        )
    }

    pub fn kind(&self) -> &'static str {
        match self {
            Self::Validation(_) => "validation",
            Self::UnknownTask(_) => "unknown_task",
            Self::UnrecognizedInstruction(_) => "unrecognized_instruction",
            Self::Precondition(_) => "precondition",
            Self::RemoteService { .. } => "remote_service",
            Self::UpstreamTimeout(_) => "upstream_timeout",
            Self::Transport(_) => "transport",
            Self::Transcode(_) => "transcode",
            Self::Transcription(_) => "transcription",
            Self::Storage(_) => "storage",
            Self::Config(_) => "config",
        }
    }
}
