use std::fs;
use std::io::{Cursor, Write};
use std::path::{Path, PathBuf};

use sha2::{Digest, Sha256};
use stipple_contracts::artifacts::ArtifactNamer;
use stipple_contracts::events::{ActivityEvent, ActivityLog};
use stipple_contracts::tasks::EditParams;
use stipple_contracts::{GatewayError, GatewayResult};
use tracing::warn;

use crate::operations::{edit_call, generate_call, EditCall};
use crate::transport::EditTransport;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Artifact {
    pub path: PathBuf,
    pub bytes: u64,
    pub sha256: String,
    pub width: Option<u32>,
    pub height: Option<u32>,
}

impl Artifact {
    fn describe(path: PathBuf, bytes: &[u8]) -> Self {
        let dims = image::ImageReader::new(Cursor::new(bytes))
            .with_guessed_format()
            .ok()
            .and_then(|reader| reader.into_dimensions().ok());
        Self {
            path,
            bytes: bytes.len() as u64,
            sha256: hex::encode(Sha256::digest(bytes)),
            width: dims.map(|(width, _)| width),
            height: dims.map(|(_, height)| height),
        }
    }
}

/// Issues one outbound call per operation and persists the image the service returns.
pub struct RemoteEditClient {
    transport: Box<dyn EditTransport>,
    namer: ArtifactNamer,
    activity: Option<ActivityLog>,
}

impl RemoteEditClient {
    pub fn new(transport: impl EditTransport + 'static, namer: ArtifactNamer) -> Self {
        Self {
            transport: Box::new(transport),
            namer,
            activity: None,
        }
    }

    pub fn with_activity_log(mut self, activity: ActivityLog) -> Self {
        self.activity = Some(activity);
        self
    }

    pub fn namer(&self) -> &ArtifactNamer {
        &self.namer
    }

    pub fn generate(&self, prompt: &str) -> GatewayResult<PathBuf> {
        self.call_and_persist(generate_call(prompt))
            .map(|artifact| artifact.path)
    }

    pub fn remove_background(&self, source: &Path) -> GatewayResult<PathBuf> {
        self.edit(source, &EditParams::RemoveBackground)
    }

    pub fn recolor(&self, source: &Path, prompt: &str) -> GatewayResult<PathBuf> {
        self.edit(
            source,
            &EditParams::Recolor {
                prompt: prompt.to_string(),
            },
        )
    }

    pub fn search_and_replace(
        &self,
        source: &Path,
        search_prompt: &str,
        new_prompt: &str,
    ) -> GatewayResult<PathBuf> {
        self.edit(
            source,
            &EditParams::SearchAndReplace {
                search_prompt: search_prompt.to_string(),
                new_prompt: new_prompt.to_string(),
            },
        )
    }

    pub fn outpaint(&self, source: &Path, left: u32, down: u32) -> GatewayResult<PathBuf> {
        self.edit(source, &EditParams::Outpaint { left, down })
    }

    pub fn replace_background_and_relight(
        &self,
        subject: &Path,
        background_prompt: &str,
    ) -> GatewayResult<PathBuf> {
        self.edit(
            subject,
            &EditParams::ReplaceBackgroundAndRelight {
                background_prompt: background_prompt.to_string(),
            },
        )
    }

    pub fn edit(&self, source: &Path, params: &EditParams) -> GatewayResult<PathBuf> {
        let bytes = fs::read(source).map_err(|err| {
            GatewayError::Storage(format!("failed reading {}: {err}", source.display()))
        })?;
        let source_name = source
            .file_name()
            .and_then(|value| value.to_str())
            .filter(|value| !value.is_empty())
            .unwrap_or("image.png");
        self.call_and_persist(edit_call(params, source_name, bytes))
            .map(|artifact| artifact.path)
    }

    /// Sends `call`, and on HTTP 200 writes the body verbatim to a fresh artifact path.
    /// Any other status becomes `RemoteService` and nothing is written.
    pub fn call_and_persist(&self, call: EditCall) -> GatewayResult<Artifact> {
        let reply = self.transport.send(&call)?;
        if reply.status != 200 {
            return Err(GatewayError::remote_service(reply.status, &reply.body));
        }

        let path = self.namer.for_task(call.task);
        persist_atomically(&path, &reply.body)?;
        let artifact = Artifact::describe(path, &reply.body);

        if let Some(activity) = &self.activity {
            let event = ActivityEvent::ArtifactCreated {
                task: call.task,
                path: artifact.path.display().to_string(),
                bytes: artifact.bytes,
                sha256: artifact.sha256.clone(),
                width: artifact.width,
                height: artifact.height,
            };
            if let Err(err) = activity.emit(&event) {
                warn!(error = %err, "failed to append artifact event");
            }
        }
        Ok(artifact)
    }
}

/// Writes next to the destination and renames into place, so readers never see a partial
/// artifact.
fn persist_atomically(path: &Path, bytes: &[u8]) -> GatewayResult<()> {
    let dir = path
        .parent()
        .filter(|parent| !parent.as_os_str().is_empty())
        .unwrap_or_else(|| Path::new("."));
    let storage = |err: std::io::Error| {
        GatewayError::Storage(format!("failed to write {}: {err}", path.display()))
    };

    let mut staged = tempfile::Builder::new()
        .prefix(".stipple-")
        .suffix(".part")
        .tempfile_in(dir)
        .map_err(storage)?;
    staged.write_all(bytes).map_err(storage)?;
    staged.as_file().sync_all().map_err(storage)?;
    staged.persist(path).map_err(|err| storage(err.error))?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use std::fs;
    use std::path::Path;

    use serde_json::{json, Value};
    use stipple_contracts::artifacts::{ArtifactNamer, NamingPolicy};
    use stipple_contracts::events::ActivityLog;
    use stipple_contracts::tasks::Task;
    use stipple_contracts::GatewayError;

    use crate::config::GatewayConfig;
    use crate::stub_transport::StubTransport;
    use crate::transport::StabilityTransport;

    use super::RemoteEditClient;

    fn png_3x2() -> Vec<u8> {
        let mut bytes = Vec::new();
        image::RgbImage::new(3, 2)
            .write_to(&mut std::io::Cursor::new(&mut bytes), image::ImageFormat::Png)
            .unwrap_or_default();
        bytes
    }

    fn entries(dir: &Path) -> Vec<String> {
        let mut names: Vec<String> = fs::read_dir(dir)
            .map(|rows| {
                rows.filter_map(Result::ok)
                    .map(|entry| entry.file_name().to_string_lossy().to_string())
                    .collect()
            })
            .unwrap_or_default();
        names.sort();
        names
    }

    #[test]
    fn generate_then_remove_background_persists_each_body() -> anyhow::Result<()> {
        let temp = tempfile::tempdir()?;
        let stub = StubTransport::new();
        stub.push_reply(200, b"generated-bytes".to_vec());
        stub.push_reply(200, b"cutout-bytes".to_vec());
        let client = RemoteEditClient::new(
            stub.clone(),
            ArtifactNamer::new(temp.path(), NamingPolicy::Unique),
        );

        let generated = client.generate("a red kite")?;
        assert_eq!(fs::read(&generated)?, b"generated-bytes".to_vec());

        let cutout = client.remove_background(&generated)?;
        assert_ne!(generated, cutout);
        assert_eq!(fs::read(&cutout)?, b"cutout-bytes".to_vec());

        let calls = stub.calls();
        assert_eq!(calls.len(), 2);
        assert_eq!(calls[1].task, Task::RemoveBackground);
        assert_eq!(
            calls[1].file.as_ref().map(|part| part.bytes.clone()),
            Some(b"generated-bytes".to_vec())
        );
        Ok(())
    }

    #[test]
    fn rejected_call_writes_nothing() -> anyhow::Result<()> {
        let temp = tempfile::tempdir()?;
        let stub = StubTransport::always(422, br#"{"error": "bad prompt"}"#.to_vec());
        let client = RemoteEditClient::new(
            stub,
            ArtifactNamer::new(temp.path(), NamingPolicy::Unique),
        );

        let err = client.generate("???").unwrap_err();
        assert!(err.to_string().contains("bad prompt"));
        assert!(matches!(
            err,
            GatewayError::RemoteService { status: 422, ref payload } if payload == &json!({"error": "bad prompt"})
        ));
        assert!(entries(temp.path()).is_empty());
        Ok(())
    }

    #[test]
    fn fixed_slot_policy_overwrites_previous_artifact() -> anyhow::Result<()> {
        let temp = tempfile::tempdir()?;
        let stub = StubTransport::new();
        stub.push_reply(200, b"first".to_vec());
        stub.push_reply(200, b"second".to_vec());
        let client = RemoteEditClient::new(
            stub,
            ArtifactNamer::new(temp.path(), NamingPolicy::FixedSlot),
        );

        let first = client.generate("one")?;
        let second = client.generate("two")?;
        assert_eq!(first, second);
        assert_eq!(fs::read(&second)?, b"second".to_vec());
        assert_eq!(entries(temp.path()), vec!["generated_image.png".to_string()]);
        Ok(())
    }

    #[test]
    fn outpaint_artifact_uses_webp_extension() -> anyhow::Result<()> {
        let temp = tempfile::tempdir()?;
        let source = temp.path().join("source.png");
        fs::write(&source, b"src")?;
        let client = RemoteEditClient::new(
            StubTransport::always(200, b"webp".to_vec()),
            ArtifactNamer::new(temp.path(), NamingPolicy::Unique),
        );

        let path = client.outpaint(&source, 128, 0)?;
        assert_eq!(path.extension().and_then(|ext| ext.to_str()), Some("webp"));
        Ok(())
    }

    #[test]
    fn missing_source_image_is_a_storage_error_without_a_call() -> anyhow::Result<()> {
        let temp = tempfile::tempdir()?;
        let stub = StubTransport::always(200, b"x".to_vec());
        let client = RemoteEditClient::new(
            stub.clone(),
            ArtifactNamer::new(temp.path(), NamingPolicy::Unique),
        );

        let err = client
            .recolor(&temp.path().join("missing.png"), "blue")
            .unwrap_err();
        assert!(matches!(err, GatewayError::Storage(_)));
        assert_eq!(stub.call_count(), 0);
        Ok(())
    }

    #[test]
    fn activity_log_records_artifact_digest_and_dimensions() -> anyhow::Result<()> {
        let temp = tempfile::tempdir()?;
        let events = temp.path().join("events.jsonl");
        let body = png_3x2();
        let client = RemoteEditClient::new(
            StubTransport::always(200, body.clone()),
            ArtifactNamer::new(temp.path(), NamingPolicy::Unique),
        )
        .with_activity_log(ActivityLog::new(&events, "session-1"));

        let path = client.generate("grid")?;

        let raw = fs::read_to_string(&events)?;
        let event: Value = serde_json::from_str(raw.lines().next().unwrap_or("{}"))?;
        assert_eq!(event["type"], json!("artifact_created"));
        assert_eq!(event["task"], json!("generate"));
        assert_eq!(event["path"], json!(path.display().to_string()));
        assert_eq!(event["bytes"], json!(body.len()));
        assert_eq!(event["width"], json!(3));
        assert_eq!(event["height"], json!(2));
        assert_eq!(event["sha256"].as_str().map(str::len), Some(64));
        Ok(())
    }

    #[test]
    fn round_trip_through_http_stub_is_byte_identical() -> anyhow::Result<()> {
        let temp = tempfile::tempdir()?;
        let mut server = mockito::Server::new();
        let generate = server
            .mock("POST", "/v2beta/stable-image/generate/core")
            .with_status(200)
            .with_body(b"GENERATED\x00\x01\x02")
            .create();
        let remove = server
            .mock("POST", "/v2beta/stable-image/edit/remove-background")
            .with_status(200)
            .with_body(b"CUTOUT\xff\xfe")
            .create();

        let config = GatewayConfig::new()
            .with_api_key("sk-test")
            .with_api_base(server.url())
            .with_image_dir(temp.path());
        let client = RemoteEditClient::new(StabilityTransport::new(&config)?, config.namer());

        let generated = client.generate("a red kite")?;
        let cutout = client.remove_background(&generated)?;

        generate.assert();
        remove.assert();
        assert_eq!(fs::read(generated)?, b"GENERATED\x00\x01\x02".to_vec());
        assert_eq!(fs::read(cutout)?, b"CUTOUT\xff\xfe".to_vec());
        Ok(())
    }

    #[test]
    fn upstream_error_payload_is_parsed_from_http_stub() -> anyhow::Result<()> {
        let temp = tempfile::tempdir()?;
        let mut server = mockito::Server::new();
        server
            .mock("POST", "/v2beta/stable-image/generate/core")
            .with_status(422)
            .with_header("content-type", "application/json")
            .with_body(r#"{"error": "bad prompt"}"#)
            .create();

        let config = GatewayConfig::new()
            .with_api_key("sk-test")
            .with_api_base(server.url())
            .with_image_dir(temp.path());
        let client = RemoteEditClient::new(StabilityTransport::new(&config)?, config.namer());

        let err = client.generate("x").unwrap_err();
        assert!(err.to_string().contains("bad prompt"));
        assert!(entries(temp.path()).is_empty());
        Ok(())
    }
}
