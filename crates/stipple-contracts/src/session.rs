use std::path::{Path, PathBuf};

use crate::error::{GatewayError, GatewayResult};

pub const NO_CURRENT_IMAGE: &str = "No image has been generated yet. Generate an image first.";

/// The most recently produced artifact, used as the implicit source of every modify task.
///
/// Empty until the first successful generate; replaced after every successful operation.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SessionState {
    current: Option<PathBuf>,
}

impl SessionState {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn current(&self) -> Option<&Path> {
        self.current.as_deref()
    }

    pub fn require_current(&self) -> GatewayResult<&Path> {
        self.current()
            .ok_or_else(|| GatewayError::precondition(NO_CURRENT_IMAGE))
    }

    /// Stores `path` as the current image and returns the one it replaced.
    pub fn replace(&mut self, path: PathBuf) -> Option<PathBuf> {
        self.current.replace(path)
    }

    pub fn has_image(&self) -> bool {
        self.current.is_some()
    }
}
