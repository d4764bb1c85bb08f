use std::path::PathBuf;
use std::sync::{Mutex, MutexGuard, PoisonError};

use stipple_contracts::chat::{match_instruction, InstructionKind};
use stipple_contracts::events::{ActivityEvent, ActivityLog};
use stipple_contracts::session::SessionState;
use stipple_contracts::tasks::{require_prompt, Task, TaskRequest};
use stipple_contracts::GatewayResult;
use tracing::{info, warn};

use crate::client::RemoteEditClient;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InstructionOutcome {
    pub instruction: String,
    pub task: Task,
    pub image_path: PathBuf,
}

/// Routes generate and modify requests to the edit client and owns the session's current image.
///
/// The state lock is held for the whole of every operation, so at most one operation reads or
/// replaces the current image at a time.
pub struct TaskDispatcher {
    client: RemoteEditClient,
    state: Mutex<SessionState>,
    activity: Option<ActivityLog>,
}

impl TaskDispatcher {
    pub fn new(client: RemoteEditClient) -> Self {
        Self {
            client,
            state: Mutex::new(SessionState::new()),
            activity: None,
        }
    }

    pub fn with_activity_log(mut self, activity: ActivityLog) -> Self {
        self.activity = Some(activity);
        self
    }

    pub fn client(&self) -> &RemoteEditClient {
        &self.client
    }

    pub fn current_image(&self) -> Option<PathBuf> {
        self.lock_state().current().map(|path| path.to_path_buf())
    }

    /// Seeds the session with an existing image, returning the one it replaced.
    pub fn set_current_image(&self, path: impl Into<PathBuf>) -> Option<PathBuf> {
        self.lock_state().replace(path.into())
    }

    pub fn generate(&self, prompt: &str) -> GatewayResult<PathBuf> {
        self.observe(Some(Task::Generate), || {
            let prompt = require_prompt(Some(prompt))?;
            let mut state = self.lock_state();
            let path = self.client.generate(&prompt)?;
            state.replace(path.clone());
            Ok(path)
        })
    }

    /// Runs a modify task against the current image. Parameters are validated before the
    /// current image is required, and both before anything is sent upstream.
    pub fn modify(&self, request: &TaskRequest) -> GatewayResult<PathBuf> {
        self.observe(request.modify_task().ok(), || {
            let params = request.edit_params()?;
            let mut state = self.lock_state();
            let source = state.require_current()?.to_path_buf();
            let path = self.client.edit(&source, &params)?;
            state.replace(path.clone());
            Ok(path)
        })
    }

    /// Maps a free-text instruction onto a task: "create image" generates from the whole text,
    /// "modify image" recolors the current image with it.
    pub fn apply_instruction(&self, text: &str) -> GatewayResult<InstructionOutcome> {
        let instruction = text.trim().to_string();
        let kind = self.observe(None, || match_instruction(&instruction))?;
        info!(?kind, instruction = %instruction, "instruction matched");

        let (task, image_path) = match kind {
            InstructionKind::CreateImage => (Task::Generate, self.generate(&instruction)?),
            InstructionKind::ModifyImage => {
                let mut request = TaskRequest::for_task(Task::Recolor);
                request.prompt = Some(instruction.clone());
                (Task::Recolor, self.modify(&request)?)
            }
        };
        Ok(InstructionOutcome {
            instruction,
            task,
            image_path,
        })
    }

    fn lock_state(&self) -> MutexGuard<'_, SessionState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn observe<T>(
        &self,
        task: Option<Task>,
        run: impl FnOnce() -> GatewayResult<T>,
    ) -> GatewayResult<T> {
        let result = run();
        if let Err(err) = &result {
            warn!(task = ?task, kind = err.kind(), error = %err, "task failed");
            if let Some(activity) = &self.activity {
                if let Err(log_err) = activity.emit(&ActivityEvent::task_failed(task, err)) {
                    warn!(error = %log_err, "failed to append task failure event");
                }
            }
        }
        result
    }
}

#[cfg(test)]
mod tests {
    use std::fs;
    use std::path::Path;
    use std::sync::Arc;
    use std::thread;

    use serde_json::Value;
    use stipple_contracts::artifacts::{ArtifactNamer, NamingPolicy};
    use stipple_contracts::events::ActivityLog;
    use stipple_contracts::session::NO_CURRENT_IMAGE;
    use stipple_contracts::tasks::{Task, TaskRequest};
    use stipple_contracts::GatewayError;

    use crate::client::RemoteEditClient;
    use crate::stub_transport::StubTransport;

    use super::TaskDispatcher;

    fn dispatcher(dir: &Path, stub: &StubTransport) -> TaskDispatcher {
        TaskDispatcher::new(RemoteEditClient::new(
            stub.clone(),
            ArtifactNamer::new(dir, NamingPolicy::Unique),
        ))
    }

    fn request(task: &str) -> TaskRequest {
        TaskRequest {
            task: Some(task.to_string()),
            ..TaskRequest::default()
        }
    }

    fn valid_request(task: Task) -> TaskRequest {
        let mut req = TaskRequest::for_task(task);
        match task {
            Task::Recolor => req.prompt = Some("make it blue".to_string()),
            Task::SearchAndReplace => {
                req.search_prompt = Some("cat".to_string());
                req.new_prompt = Some("dog".to_string());
            }
            Task::Outpaint => {
                req.left = Some(64);
                req.down = Some(32);
            }
            Task::ReplaceBackgroundAndRelight => {
                req.background_prompt = Some("a misty forest".to_string())
            }
            Task::Generate | Task::RemoveBackground => {}
        }
        req
    }

    #[test]
    fn generate_sets_current_image() -> anyhow::Result<()> {
        let temp = tempfile::tempdir()?;
        let stub = StubTransport::always(200, b"img".to_vec());
        let dispatcher = dispatcher(temp.path(), &stub);
        assert_eq!(dispatcher.current_image(), None);

        let path = dispatcher.generate("  a red kite ")?;
        assert_eq!(dispatcher.current_image(), Some(path));
        assert_eq!(stub.calls()[0].field("prompt"), Some("a red kite"));
        Ok(())
    }

    #[test]
    fn blank_prompt_is_rejected_without_outbound_call() -> anyhow::Result<()> {
        let temp = tempfile::tempdir()?;
        let stub = StubTransport::always(200, b"img".to_vec());
        let dispatcher = dispatcher(temp.path(), &stub);

        for prompt in ["", "   ", "\t\n"] {
            let err = dispatcher.generate(prompt).unwrap_err();
            assert!(matches!(err, GatewayError::Validation(_)));
        }
        assert_eq!(stub.call_count(), 0);
        assert_eq!(dispatcher.current_image(), None);
        Ok(())
    }

    #[test]
    fn each_modify_task_sends_one_call_from_current_image() -> anyhow::Result<()> {
        let temp = tempfile::tempdir()?;
        let stub = StubTransport::new();
        let dispatcher = dispatcher(temp.path(), &stub);
        stub.push_reply(200, b"seed".to_vec());
        dispatcher.generate("seed")?;

        for (index, task) in Task::ALL.into_iter().filter(|task| task.is_modify()).enumerate() {
            let source = dispatcher.current_image().unwrap_or_default();
            let source_bytes = fs::read(&source)?;
            let before = stub.call_count();
            stub.push_reply(200, format!("edit-{index}").into_bytes());

            let produced = dispatcher.modify(&valid_request(task))?;

            let calls = stub.calls();
            assert_eq!(calls.len(), before + 1);
            let call = &calls[before];
            assert_eq!(call.task, task);
            assert_eq!(call.file.as_ref().map(|part| part.bytes.clone()), Some(source_bytes));
            assert_ne!(produced, source);
            assert_eq!(dispatcher.current_image(), Some(produced));
        }
        Ok(())
    }

    #[test]
    fn unknown_task_leaves_state_and_sends_nothing() -> anyhow::Result<()> {
        let temp = tempfile::tempdir()?;
        let stub = StubTransport::always(200, b"img".to_vec());
        let dispatcher = dispatcher(temp.path(), &stub);
        let current = dispatcher.generate("seed")?;

        for task in ["blur", "generate", "RECOLOR"] {
            let err = dispatcher.modify(&request(task)).unwrap_err();
            assert!(matches!(err, GatewayError::UnknownTask(_)), "{task}: {err}");
        }
        assert_eq!(stub.call_count(), 1);
        assert_eq!(dispatcher.current_image(), Some(current));
        Ok(())
    }

    #[test]
    fn modify_before_generate_is_a_precondition_failure() -> anyhow::Result<()> {
        let temp = tempfile::tempdir()?;
        let stub = StubTransport::always(200, b"img".to_vec());
        let dispatcher = dispatcher(temp.path(), &stub);

        let err = dispatcher.modify(&valid_request(Task::Recolor)).unwrap_err();
        assert!(matches!(err, GatewayError::Precondition(_)));
        assert_eq!(err.to_string(), NO_CURRENT_IMAGE);
        assert_eq!(stub.call_count(), 0);
        Ok(())
    }

    #[test]
    fn parameters_are_validated_before_the_precondition() -> anyhow::Result<()> {
        let temp = tempfile::tempdir()?;
        let stub = StubTransport::always(200, b"img".to_vec());
        let dispatcher = dispatcher(temp.path(), &stub);

        let err = dispatcher.modify(&request("recolor")).unwrap_err();
        assert!(matches!(err, GatewayError::Validation(_)));
        assert_eq!(stub.call_count(), 0);
        Ok(())
    }

    #[test]
    fn upstream_rejection_leaves_state_unset() -> anyhow::Result<()> {
        let temp = tempfile::tempdir()?;
        let stub = StubTransport::always(422, br#"{"error": "bad prompt"}"#.to_vec());
        let dispatcher = dispatcher(temp.path(), &stub);

        let err = dispatcher.generate("x").unwrap_err();
        assert!(matches!(err, GatewayError::RemoteService { status: 422, .. }));
        assert!(err.to_string().contains("bad prompt"));
        assert_eq!(dispatcher.current_image(), None);
        Ok(())
    }

    #[test]
    fn failed_modify_keeps_previous_image() -> anyhow::Result<()> {
        let temp = tempfile::tempdir()?;
        let stub = StubTransport::new();
        let dispatcher = dispatcher(temp.path(), &stub);
        stub.push_reply(200, b"seed".to_vec());
        let seed = dispatcher.generate("seed")?;

        stub.push_error(GatewayError::Transport("connection reset".to_string()));
        assert!(dispatcher.modify(&valid_request(Task::RemoveBackground)).is_err());
        assert_eq!(dispatcher.current_image(), Some(seed));
        Ok(())
    }

    #[test]
    fn concurrent_modifies_are_serialised() -> anyhow::Result<()> {
        let temp = tempfile::tempdir()?;
        let stub = StubTransport::new();
        let dispatcher = Arc::new(dispatcher(temp.path(), &stub));
        stub.push_reply(200, b"seed".to_vec());
        dispatcher.generate("seed")?;

        let workers = 8;
        for index in 0..workers {
            stub.push_reply(200, format!("edit-{index}").into_bytes());
        }
        let handles: Vec<_> = (0..workers)
            .map(|_| {
                let dispatcher = Arc::clone(&dispatcher);
                thread::spawn(move || dispatcher.modify(&valid_request(Task::RemoveBackground)))
            })
            .collect();
        for handle in handles {
            assert!(matches!(handle.join(), Ok(Ok(_))));
        }

        let sources: Vec<Vec<u8>> = stub
            .calls()
            .iter()
            .skip(1)
            .filter_map(|call| call.file.as_ref().map(|part| part.bytes.clone()))
            .collect();
        assert_eq!(sources.len(), workers);
        assert_eq!(sources[0], b"seed".to_vec());
        for index in 1..workers {
            assert_eq!(sources[index], format!("edit-{}", index - 1).into_bytes());
        }
        let current = dispatcher.current_image().unwrap_or_default();
        assert_eq!(fs::read(current)?, format!("edit-{}", workers - 1).into_bytes());
        Ok(())
    }

    #[test]
    fn instructions_route_by_vocabulary() -> anyhow::Result<()> {
        let temp = tempfile::tempdir()?;
        let stub = StubTransport::always(200, b"img".to_vec());
        let dispatcher = dispatcher(temp.path(), &stub);

        let created = dispatcher.apply_instruction(" Create image of a lighthouse ")?;
        assert_eq!(created.task, Task::Generate);
        assert_eq!(created.instruction, "Create image of a lighthouse");
        assert_eq!(
            stub.calls()[0].field("prompt"),
            Some("Create image of a lighthouse")
        );

        let modified = dispatcher.apply_instruction("modify image to look like winter")?;
        assert_eq!(modified.task, Task::Recolor);
        assert_eq!(dispatcher.current_image(), Some(modified.image_path));
        let recolor = &stub.calls()[1];
        assert_eq!(recolor.task, Task::Recolor);
        assert_eq!(recolor.field("prompt"), Some("modify image to look like winter"));
        Ok(())
    }

    #[test]
    fn unrecognised_instruction_sends_nothing() -> anyhow::Result<()> {
        let temp = tempfile::tempdir()?;
        let stub = StubTransport::always(200, b"img".to_vec());
        let dispatcher = dispatcher(temp.path(), &stub);

        let err = dispatcher.apply_instruction("paint me a picture").unwrap_err();
        assert!(matches!(err, GatewayError::UnrecognizedInstruction(_)));
        assert_eq!(stub.call_count(), 0);
        Ok(())
    }

    #[test]
    fn failures_are_recorded_in_activity_log() -> anyhow::Result<()> {
        let temp = tempfile::tempdir()?;
        let events = temp.path().join("events.jsonl");
        let stub = StubTransport::always(200, b"img".to_vec());
        let dispatcher = dispatcher(temp.path(), &stub)
            .with_activity_log(ActivityLog::new(&events, "session-1"));

        let _ = dispatcher.modify(&valid_request(Task::Outpaint));

        let raw = fs::read_to_string(&events)?;
        let event: Value = serde_json::from_str(raw.lines().next().unwrap_or("{}"))?;
        assert_eq!(event["type"], Value::from("task_failed"));
        assert_eq!(event["task"], Value::from("outpaint"));
        assert_eq!(event["kind"], Value::from("precondition"));
        Ok(())
    }

    #[test]
    fn seeded_image_becomes_modify_source() -> anyhow::Result<()> {
        let temp = tempfile::tempdir()?;
        let seed = temp.path().join("photo.png");
        fs::write(&seed, b"photo")?;
        let stub = StubTransport::always(200, b"edited".to_vec());
        let dispatcher = dispatcher(temp.path(), &stub);

        assert_eq!(dispatcher.set_current_image(&seed), None);
        dispatcher.modify(&valid_request(Task::RemoveBackground))?;
        let call = &stub.calls()[0];
        assert_eq!(call.file.as_ref().map(|part| part.file_name.clone()), Some("photo.png".to_string()));
        Ok(())
    }
}
