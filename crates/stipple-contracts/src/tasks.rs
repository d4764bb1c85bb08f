use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::{GatewayError, GatewayResult};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Task {
    Generate,
    RemoveBackground,
    Recolor,
    SearchAndReplace,
    Outpaint,
    ReplaceBackgroundAndRelight,
}

impl Task {
    pub const ALL: [Task; 6] = [
        Task::Generate,
        Task::RemoveBackground,
        Task::Recolor,
        Task::SearchAndReplace,
        Task::Outpaint,
        Task::ReplaceBackgroundAndRelight,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            Task::Generate => "generate",
            Task::RemoveBackground => "remove_background",
            Task::Recolor => "recolor",
            Task::SearchAndReplace => "search_and_replace",
            Task::Outpaint => "outpaint",
            Task::ReplaceBackgroundAndRelight => "replace_background_and_relight",
        }
    }

    /// File stem used by the artifact namer for this task's output.
    pub fn artifact_label(self) -> &'static str {
        match self {
            Task::Generate => "generated_image",
            Task::RemoveBackground => "background_removed",
            Task::Recolor => "recolored_image",
            Task::SearchAndReplace => "search_replaced_image",
            Task::Outpaint => "outpainted_image",
            Task::ReplaceBackgroundAndRelight => "relit_image",
        }
    }

    pub fn output_format(self) -> &'static str {
        match self {
            Task::Outpaint => "webp",
            _ => "png",
        }
    }

    /// Modify tasks take the current session image as their source.
    pub fn is_modify(self) -> bool {
        self != Task::Generate
    }
}

impl fmt::Display for Task {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Task {
    type Err = GatewayError;

    fn from_str(raw: &str) -> Result<Self, Self::Err> {
        let normalized = raw.trim();
        Task::ALL
            .into_iter()
            .find(|task| task.as_str() == normalized)
            .ok_or_else(|| GatewayError::UnknownTask(normalized.to_string()))
    }
}

/// Body of a `modify-image` call. Only the fields the selected task needs are read.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TaskRequest {
    #[serde(default)]
    pub task: Option<String>,
    #[serde(default)]
    pub prompt: Option<String>,
    #[serde(default)]
    pub search_prompt: Option<String>,
    #[serde(default)]
    pub new_prompt: Option<String>,
    #[serde(default)]
    pub left: Option<i64>,
    #[serde(default)]
    pub down: Option<i64>,
    #[serde(default)]
    pub background_prompt: Option<String>,
}

impl TaskRequest {
    pub fn for_task(task: Task) -> Self {
        Self {
            task: Some(task.as_str().to_string()),
            ..Self::default()
        }
    }

    /// Resolves the task identifier. Only modify tasks are accepted here; `generate` has its
    /// own entry point.
    pub fn modify_task(&self) -> GatewayResult<Task> {
        let raw = self
            .task
            .as_deref()
            .map(str::trim)
            .filter(|value| !value.is_empty())
            .ok_or_else(|| GatewayError::validation("Task is required."))?;
        let task: Task = raw.parse()?;
        if !task.is_modify() {
            return Err(GatewayError::UnknownTask(raw.to_string()));
        }
        Ok(task)
    }

    pub fn edit_params(&self) -> GatewayResult<EditParams> {
        let task = self.modify_task()?;
        EditParams::from_request(task, self)
    }
}

/// Validated parameters of a modify task.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EditParams {
    RemoveBackground,
    Recolor {
        prompt: String,
    },
    SearchAndReplace {
        search_prompt: String,
        new_prompt: String,
    },
    Outpaint {
        left: u32,
        down: u32,
    },
    ReplaceBackgroundAndRelight {
        background_prompt: String,
    },
}

impl EditParams {
    pub fn task(&self) -> Task {
        match self {
            EditParams::RemoveBackground => Task::RemoveBackground,
            EditParams::Recolor { .. } => Task::Recolor,
            EditParams::SearchAndReplace { .. } => Task::SearchAndReplace,
            EditParams::Outpaint { .. } => Task::Outpaint,
            EditParams::ReplaceBackgroundAndRelight { .. } => Task::ReplaceBackgroundAndRelight,
        }
    }

    pub fn from_request(task: Task, request: &TaskRequest) -> GatewayResult<Self> {
        match task {
            Task::Generate => Err(GatewayError::UnknownTask(task.as_str().to_string())),
            Task::RemoveBackground => Ok(EditParams::RemoveBackground),
            Task::Recolor => Ok(EditParams::Recolor {
                prompt: required_text(request.prompt.as_deref(), "prompt", task)?,
            }),
            Task::SearchAndReplace => Ok(EditParams::SearchAndReplace {
                search_prompt: required_text(request.search_prompt.as_deref(), "search_prompt", task)?,
                new_prompt: required_text(request.new_prompt.as_deref(), "new_prompt", task)?,
            }),
            Task::Outpaint => {
                let left = required_extent(request.left, "left")?;
                let down = required_extent(request.down, "down")?;
                if left == 0 && down == 0 {
                    return Err(GatewayError::validation(
                        "outpaint requires a non-zero left or down extent.",
                    ));
                }
                Ok(EditParams::Outpaint { left, down })
            }
            Task::ReplaceBackgroundAndRelight => Ok(EditParams::ReplaceBackgroundAndRelight {
                background_prompt: required_text(
                    request.background_prompt.as_deref(),
                    "background_prompt",
                    task,
                )?,
            }),
        }
    }
}

/// Returns the trimmed prompt, or a validation error for a missing or blank one.
pub fn require_prompt(prompt: Option<&str>) -> GatewayResult<String> {
    prompt
        .map(str::trim)
        .filter(|value| !value.is_empty())
        .map(str::to_string)
        .ok_or_else(|| GatewayError::validation("Prompt is required."))
}

fn required_text(value: Option<&str>, field: &str, task: Task) -> GatewayResult<String> {
    value
        .map(str::trim)
        .filter(|value| !value.is_empty())
        .map(str::to_string)
        .ok_or_else(|| GatewayError::validation(format!("{task} requires '{field}'.")))
}

fn required_extent(value: Option<i64>, field: &str) -> GatewayResult<u32> {
    let Some(raw) = value else {
        return Err(GatewayError::validation(format!("outpaint requires '{field}'.")));
    };
    u32::try_from(raw).map_err(|_| {
        GatewayError::validation(format!(
            "outpaint '{field}' must be a non-negative pixel count, got {raw}."
        ))
    })
}
