use std::fs::OpenOptions;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use chrono::{SecondsFormat, Utc};
use serde::Serialize;
use serde_json::{Map, Value};

use crate::error::GatewayError;
use crate::tasks::Task;

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ActivityEvent {
    SessionStarted {
        output_dir: String,
        naming: String,
    },
    ArtifactCreated {
        task: Task,
        path: String,
        bytes: u64,
        sha256: String,
        #[serde(skip_serializing_if = "Option::is_none")]
        width: Option<u32>,
        #[serde(skip_serializing_if = "Option::is_none")]
        height: Option<u32>,
    },
    TaskFailed {
        #[serde(skip_serializing_if = "Option::is_none")]
        task: Option<Task>,
        kind: String,
        message: String,
    },
}

impl ActivityEvent {
    pub fn task_failed(task: Option<Task>, err: &GatewayError) -> Self {
        ActivityEvent::TaskFailed {
            task,
            kind: err.kind().to_string(),
            message: err.to_string(),
        }
    }
}

/// Append-only writer for `events.jsonl`.
///
/// - every line carries `type`, `session_id` and `ts`
/// - one compact JSON object per line
/// - clones share the file and the append lock
#[derive(Debug, Clone)]
pub struct ActivityLog {
    inner: Arc<ActivityLogInner>,
}

#[derive(Debug)]
struct ActivityLogInner {
    path: PathBuf,
    session_id: String,
    lock: Mutex<()>,
}

impl ActivityLog {
    pub fn new(path: impl Into<PathBuf>, session_id: impl Into<String>) -> Self {
        Self {
            inner: Arc::new(ActivityLogInner {
                path: path.into(),
                session_id: session_id.into(),
                lock: Mutex::new(()),
            }),
        }
    }

    pub fn path(&self) -> &Path {
        &self.inner.path
    }

    pub fn session_id(&self) -> &str {
        &self.inner.session_id
    }

    pub fn emit(&self, event: &ActivityEvent) -> anyhow::Result<Value> {
        let mut line = Map::new();
        line.insert(
            "session_id".to_string(),
            Value::String(self.inner.session_id.clone()),
        );
        line.insert("ts".to_string(), Value::String(now_utc_iso()));
        if let Value::Object(fields) = serde_json::to_value(event)? {
            for (key, value) in fields {
                line.insert(key, value);
            }
        }

        if let Some(parent) = self.inner.path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let encoded = serde_json::to_string(&line)?;
        let _guard = self
            .inner
            .lock
            .lock()
            .map_err(|_| anyhow::anyhow!("activity log lock poisoned"))?;
        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.inner.path)?;
        file.write_all(encoded.as_bytes())?;
        file.write_all(b"\n")?;

        Ok(Value::Object(line))
    }
}

fn now_utc_iso() -> String {
    Utc::now().to_rfc3339_opts(SecondsFormat::Micros, false)
}
