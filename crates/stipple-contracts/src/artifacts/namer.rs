use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use uuid::Uuid;

use crate::error::GatewayError;
use crate::tasks::Task;

pub const DEFAULT_EXTENSION: &str = "png";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum NamingPolicy {
    /// One file per label; a later artifact for the same label overwrites the earlier one.
    FixedSlot,
    /// `{label}_{uuid-hex}.{ext}`, a fresh path on every call.
    #[default]
    Unique,
}

impl NamingPolicy {
    pub fn as_str(self) -> &'static str {
        match self {
            NamingPolicy::FixedSlot => "fixed",
            NamingPolicy::Unique => "unique",
        }
    }
}

impl fmt::Display for NamingPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for NamingPolicy {
    type Err = GatewayError;

    fn from_str(raw: &str) -> Result<Self, Self::Err> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "fixed" | "fixed_slot" | "fixed-slot" => Ok(NamingPolicy::FixedSlot),
            "unique" | "uuid" => Ok(NamingPolicy::Unique),
            other => Err(GatewayError::Config(format!(
                "unknown artifact naming policy '{other}' (expected 'unique' or 'fixed')"
            ))),
        }
    }
}

/// Builds artifact paths under the output directory. Pure: never touches the filesystem.
#[derive(Debug, Clone)]
pub struct ArtifactNamer {
    output_dir: PathBuf,
    policy: NamingPolicy,
}

impl ArtifactNamer {
    pub fn new(output_dir: impl Into<PathBuf>, policy: NamingPolicy) -> Self {
        Self {
            output_dir: output_dir.into(),
            policy,
        }
    }

    pub fn output_dir(&self) -> &Path {
        &self.output_dir
    }

    pub fn policy(&self) -> NamingPolicy {
        self.policy
    }

    pub fn name(&self, label: &str, extension: &str) -> PathBuf {
        let ext = extension.trim().trim_start_matches('.');
        let ext = if ext.is_empty() { DEFAULT_EXTENSION } else { ext };
        let file_name = match self.policy {
            NamingPolicy::FixedSlot => format!("{label}.{ext}"),
            NamingPolicy::Unique => format!("{label}_{}.{ext}", Uuid::new_v4().simple()),
        };
        self.output_dir.join(file_name)
    }

    pub fn for_task(&self, task: Task) -> PathBuf {
        self.name(task.artifact_label(), task.output_format())
    }
}
