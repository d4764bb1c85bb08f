pub mod client;
pub mod config;
pub mod dispatcher;
pub mod operations;
pub mod stub_transport;
pub mod transcription;
pub mod transport;

use std::sync::Arc;

use stipple_contracts::events::{ActivityEvent, ActivityLog};
use stipple_contracts::GatewayResult;
use tracing::{info, warn};

pub use client::{Artifact, RemoteEditClient};
pub use config::{load_dotenv, GatewayConfig, SpeechConfig};
pub use dispatcher::{InstructionOutcome, TaskDispatcher};
pub use transcription::{AudioBridge, FfmpegTranscoder, SpeechToText, Transcoder, WhisperClient};
pub use transport::{EditTransport, StabilityTransport, UpstreamReply};

/// A fully wired gateway: the dispatcher plus the optional audio bridge.
#[derive(Clone)]
pub struct Gateway {
    pub dispatcher: Arc<TaskDispatcher>,
    pub audio: Option<Arc<AudioBridge>>,
}

impl Gateway {
    /// Creates the output directory, opens the activity log and builds the real transports.
    /// The audio bridge is only wired when a speech key is configured.
    pub fn from_config(config: &GatewayConfig) -> GatewayResult<Self> {
        let transport = StabilityTransport::new(config)?;
        let audio = if config.speech_enabled() {
            let speech = WhisperClient::new(&config.speech, config.upstream_timeout)?;
            let transcoder = FfmpegTranscoder::new(&config.ffmpeg).with_timeout(config.upstream_timeout);
            Some(AudioBridge::new(transcoder, speech))
        } else {
            None
        };
        Self::assemble(config, transport, audio)
    }

    /// Same wiring as [`Gateway::from_config`] with caller-supplied transport and audio bridge.
    pub fn assemble(
        config: &GatewayConfig,
        transport: impl EditTransport + 'static,
        audio: Option<AudioBridge>,
    ) -> GatewayResult<Self> {
        config.check_events_path()?;
        let output_dir = config.ensure_image_dir()?.to_path_buf();
        let namer = config.namer();
        let activity = ActivityLog::new(
            config.events_path().to_path_buf(),
            uuid::Uuid::new_v4().simple().to_string(),
        );
        if let Err(err) = activity.emit(&ActivityEvent::SessionStarted {
            output_dir: output_dir.display().to_string(),
            naming: namer.policy().to_string(),
        }) {
            warn!(error = %err, "failed to append session event");
        }
        if config.api_key.is_none() {
            warn!("STABILITY_API_KEY not set; image calls will fail");
        }
        info!(
            output_dir = %output_dir.display(),
            naming = %namer.policy(),
            speech = audio.is_some(),
            session_id = activity.session_id(),
            "gateway ready"
        );

        let client = RemoteEditClient::new(transport, namer).with_activity_log(activity.clone());
        let dispatcher = TaskDispatcher::new(client).with_activity_log(activity);
        Ok(Self {
            dispatcher: Arc::new(dispatcher),
            audio: audio.map(Arc::new),
        })
    }
}
