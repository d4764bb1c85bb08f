use std::path::Path;

use stipple_contracts::tasks::{EditParams, Task};

/// One supported remote operation: where it posts and how its payload is shaped.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct OperationSpec {
    pub task: Task,
    pub endpoint: &'static str,
    /// Multipart field carrying the source image, if the operation takes one.
    pub file_field: Option<&'static str>,
}

const GENERATE: OperationSpec = OperationSpec {
    task: Task::Generate,
    endpoint: "/v2beta/stable-image/generate/core",
    file_field: None,
};

const REMOVE_BACKGROUND: OperationSpec = OperationSpec {
    task: Task::RemoveBackground,
    endpoint: "/v2beta/stable-image/edit/remove-background",
    file_field: Some("image"),
};

const RECOLOR: OperationSpec = OperationSpec {
    task: Task::Recolor,
    endpoint: "/v2beta/stable-image/edit/search-and-recolor",
    file_field: Some("image"),
};

const SEARCH_AND_REPLACE: OperationSpec = OperationSpec {
    task: Task::SearchAndReplace,
    endpoint: "/v2beta/stable-image/edit/search-and-replace",
    file_field: Some("image"),
};

const OUTPAINT: OperationSpec = OperationSpec {
    task: Task::Outpaint,
    endpoint: "/v2beta/stable-image/edit/outpaint",
    file_field: Some("image"),
};

const RELIGHT: OperationSpec = OperationSpec {
    task: Task::ReplaceBackgroundAndRelight,
    endpoint: "/v2beta/stable-image/edit/replace-background-and-relight",
    file_field: Some("subject_image"),
};

pub const OPERATIONS: &[OperationSpec] = &[
    GENERATE,
    REMOVE_BACKGROUND,
    RECOLOR,
    SEARCH_AND_REPLACE,
    OUTPAINT,
    RELIGHT,
];

pub fn operation_for(task: Task) -> &'static OperationSpec {
    match task {
        Task::Generate => &GENERATE,
        Task::RemoveBackground => &REMOVE_BACKGROUND,
        Task::Recolor => &RECOLOR,
        Task::SearchAndReplace => &SEARCH_AND_REPLACE,
        Task::Outpaint => &OUTPAINT,
        Task::ReplaceBackgroundAndRelight => &RELIGHT,
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FilePart {
    pub field: &'static str,
    pub file_name: String,
    pub mime: &'static str,
    pub bytes: Vec<u8>,
}

/// A fully prepared outbound request, independent of the HTTP library.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EditCall {
    pub task: Task,
    pub endpoint: &'static str,
    pub fields: Vec<(&'static str, String)>,
    pub file: Option<FilePart>,
}

impl EditCall {
    pub fn field(&self, name: &str) -> Option<&str> {
        self.fields
            .iter()
            .find(|(key, _)| *key == name)
            .map(|(_, value)| value.as_str())
    }

    pub fn output_format(&self) -> &'static str {
        self.task.output_format()
    }
}

pub fn generate_call(prompt: &str) -> EditCall {
    let spec = operation_for(Task::Generate);
    EditCall {
        task: spec.task,
        endpoint: spec.endpoint,
        fields: vec![
            ("prompt", prompt.to_string()),
            ("output_format", spec.task.output_format().to_string()),
        ],
        file: None,
    }
}

pub fn edit_call(params: &EditParams, source_name: &str, source: Vec<u8>) -> EditCall {
    let spec = operation_for(params.task());
    let mut fields: Vec<(&'static str, String)> = match params {
        EditParams::RemoveBackground => Vec::new(),
        EditParams::Recolor { prompt } => vec![
            ("prompt", prompt.clone()),
            ("select_prompt", prompt.clone()),
        ],
        EditParams::SearchAndReplace {
            search_prompt,
            new_prompt,
        } => vec![
            ("prompt", new_prompt.clone()),
            ("search_prompt", search_prompt.clone()),
        ],
        EditParams::Outpaint { left, down } => {
            vec![("left", left.to_string()), ("down", down.to_string())]
        }
        EditParams::ReplaceBackgroundAndRelight { background_prompt } => {
            vec![("background_prompt", background_prompt.clone())]
        }
    };
    fields.push(("output_format", spec.task.output_format().to_string()));

    let file = spec.file_field.map(|field| FilePart {
        field,
        file_name: source_name.to_string(),
        mime: mime_for_path(Path::new(source_name)),
        bytes: source,
    });

    EditCall {
        task: spec.task,
        endpoint: spec.endpoint,
        fields,
        file,
    }
}

fn mime_for_path(path: &Path) -> &'static str {
    let ext = path
        .extension()
        .and_then(|value| value.to_str())
        .map(|value| value.to_ascii_lowercase())
        .unwrap_or_default();
    match ext.as_str() {
        "webp" => "image/webp",
        "jpg" | "jpeg" => "image/jpeg",
        _ => "image/png",
    }
}
