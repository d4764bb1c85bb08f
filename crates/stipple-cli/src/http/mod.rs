pub mod middleware;
pub mod models;
pub mod routes;
pub mod server;

use std::path::{Component, Path, PathBuf};
use std::sync::Arc;

use stipple_engine::{AudioBridge, Gateway, TaskDispatcher};

/// URL prefix the web root is mounted under.
pub const STATIC_MOUNT: &str = "/static";

/// Shared by every handler.
#[derive(Clone)]
pub struct AppState {
    pub dispatcher: Arc<TaskDispatcher>,
    pub audio: Option<Arc<AudioBridge>>,
    pub web_root: Arc<PathBuf>,
}

impl AppState {
    pub fn new(gateway: Gateway, web_root: impl Into<PathBuf>) -> Self {
        Self {
            dispatcher: gateway.dispatcher,
            audio: gateway.audio,
            web_root: Arc::new(web_root.into()),
        }
    }

    /// The URL a browser fetches `artifact` from. Artifacts outside the web root keep their
    /// filesystem path.
    pub fn public_path(&self, artifact: &Path) -> String {
        let artifact_parts = normal_parts(artifact);
        let root_parts = normal_parts(&self.web_root);
        match artifact_parts.strip_prefix(root_parts.as_slice()) {
            Some(rest) if !rest.is_empty() => format!("{STATIC_MOUNT}/{}", rest.join("/")),
            _ => artifact.display().to_string(),
        }
    }
}

fn normal_parts(path: &Path) -> Vec<String> {
    path.components()
        .filter(|component| !matches!(component, Component::CurDir))
        .map(|component| component.as_os_str().to_string_lossy().into_owned())
        .collect()
}
