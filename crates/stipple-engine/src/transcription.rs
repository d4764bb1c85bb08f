use std::io::{Read, Write};
use std::path::PathBuf;
use std::process::{Command, Stdio};
use std::time::Duration;

use reqwest::blocking::multipart::{Form as MultipartForm, Part as MultipartPart};
use reqwest::blocking::Client as HttpClient;
use stipple_contracts::{GatewayError, GatewayResult};
use tracing::{debug, info, warn};
use wait_timeout::ChildExt;

use crate::config::SpeechConfig;

pub const TARGET_SAMPLE_RATE: u32 = 16_000;
pub const DEFAULT_TRANSCODE_TIMEOUT: Duration = Duration::from_secs(60);

/// Re-encodes an uploaded audio blob into something the speech service accepts.
pub trait Transcoder: Send + Sync {
    fn transcode(&self, audio: &[u8]) -> GatewayResult<Vec<u8>>;
}

pub trait SpeechToText: Send + Sync {
    fn transcribe(&self, wav: &[u8]) -> GatewayResult<String>;
}

/// Runs the `ffmpeg` binary to produce mono 16 kHz WAV. A run that outlives the timeout is
/// killed.
#[derive(Debug, Clone)]
pub struct FfmpegTranscoder {
    binary: PathBuf,
    timeout: Duration,
}

impl FfmpegTranscoder {
    pub fn new(binary: impl Into<PathBuf>) -> Self {
        Self {
            binary: binary.into(),
            timeout: DEFAULT_TRANSCODE_TIMEOUT,
        }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }
}

impl Transcoder for FfmpegTranscoder {
    fn transcode(&self, audio: &[u8]) -> GatewayResult<Vec<u8>> {
        let staging = |err: std::io::Error| GatewayError::Transcode(format!("failed to stage audio: {err}"));

        let mut input = tempfile::Builder::new()
            .prefix("stipple-audio-")
            .suffix(".input")
            .tempfile()
            .map_err(staging)?;
        input.write_all(audio).map_err(staging)?;
        input.flush().map_err(staging)?;
        let output = tempfile::Builder::new()
            .prefix("stipple-audio-")
            .suffix(".wav")
            .tempfile()
            .map_err(staging)?;

        let sample_rate = TARGET_SAMPLE_RATE.to_string();
        let mut child = Command::new(&self.binary)
            .args(["-hide_banner", "-loglevel", "error", "-y", "-i"])
            .arg(input.path())
            .args(["-ac", "1", "-ar", sample_rate.as_str(), "-f", "wav"])
            .arg(output.path())
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::piped())
            .spawn()
            .map_err(|err| {
                GatewayError::Transcode(format!("failed to run {}: {err}", self.binary.display()))
            })?;

        let status = match child.wait_timeout(self.timeout) {
            Ok(Some(status)) => status,
            Ok(None) => {
                warn!(binary = %self.binary.display(), "transcoder timed out; killing it");
                let _ = child.kill();
                let _ = child.wait();
                return Err(GatewayError::Transcode(format!(
                    "{} timed out after {:.1}s",
                    self.binary.display(),
                    self.timeout.as_secs_f64()
                )));
            }
            Err(err) => {
                let _ = child.kill();
                return Err(GatewayError::Transcode(format!(
                    "failed waiting for {}: {err}",
                    self.binary.display()
                )));
            }
        };
        if !status.success() {
            let mut stderr = String::new();
            if let Some(mut pipe) = child.stderr.take() {
                let _ = pipe.read_to_string(&mut stderr);
            }
            return Err(GatewayError::Transcode(format!(
                "{} exited with {status}: {}",
                self.binary.display(),
                stderr.trim()
            )));
        }

        let wav = std::fs::read(output.path()).map_err(|err| {
            GatewayError::Transcode(format!("failed to read transcoded audio: {err}"))
        })?;
        if wav.is_empty() {
            return Err(GatewayError::Transcode(
                "transcoder produced no audio".to_string(),
            ));
        }
        debug!(input_bytes = audio.len(), output_bytes = wav.len(), "audio transcoded");
        Ok(wav)
    }
}

/// Blocking client for an OpenAI-compatible `/audio/transcriptions` endpoint.
pub struct WhisperClient {
    http: HttpClient,
    api_key: String,
    api_base: String,
    model: String,
    timeout: Duration,
}

impl WhisperClient {
    pub fn new(config: &SpeechConfig, timeout: Duration) -> GatewayResult<Self> {
        let api_key = config
            .api_key
            .clone()
            .ok_or_else(|| GatewayError::Config("SPEECH_API_KEY not set".to_string()))?;
        let http = HttpClient::builder()
            .timeout(timeout)
            .build()
            .map_err(|err| GatewayError::Config(format!("failed to build HTTP client: {err}")))?;
        Ok(Self {
            http,
            api_key,
            api_base: config.api_base.clone(),
            model: config.model.clone(),
            timeout,
        })
    }
}

impl WhisperClient {
    fn map_send_error(&self, err: reqwest::Error, stage: &str) -> GatewayError {
        if err.is_timeout() {
            GatewayError::UpstreamTimeout(self.timeout)
        } else {
            GatewayError::Transcription(format!("{stage}: {err}"))
        }
    }
}

impl SpeechToText for WhisperClient {
    fn transcribe(&self, wav: &[u8]) -> GatewayResult<String> {
        let url = format!("{}/audio/transcriptions", self.api_base);
        let failed = |detail: String| GatewayError::Transcription(detail);

        let file_part = MultipartPart::bytes(wav.to_vec())
            .file_name("audio.wav")
            .mime_str("audio/wav")
            .map_err(|err| failed(format!("mime: {err}")))?;
        let form = MultipartForm::new()
            .text("model", self.model.clone())
            .text("response_format", "text")
            .part("file", file_part);

        debug!(model = %self.model, "sending audio to speech service");
        let response = self
            .http
            .post(&url)
            .bearer_auth(&self.api_key)
            .multipart(form)
            .send()
            .map_err(|err| self.map_send_error(err, "request"))?;

        let status = response.status();
        let body = response
            .text()
            .map_err(|err| self.map_send_error(err, "body"))?;
        if !status.is_success() {
            return Err(failed(format!("status {}: {}", status.as_u16(), body.trim())));
        }

        let transcript = body.trim().to_string();
        if transcript.is_empty() {
            return Err(failed("speech service returned an empty transcript".to_string()));
        }
        info!(chars = transcript.len(), "transcription completed");
        Ok(transcript)
    }
}

/// Audio upload to instruction text: transcode, then transcribe.
pub struct AudioBridge {
    transcoder: Box<dyn Transcoder>,
    speech: Box<dyn SpeechToText>,
}

impl AudioBridge {
    pub fn new(
        transcoder: impl Transcoder + 'static,
        speech: impl SpeechToText + 'static,
    ) -> Self {
        Self {
            transcoder: Box::new(transcoder),
            speech: Box::new(speech),
        }
    }

    pub fn transcribe(&self, audio: &[u8]) -> GatewayResult<String> {
        if audio.is_empty() {
            return Err(GatewayError::validation("Audio upload is empty."));
        }
        let wav = self.transcoder.transcode(audio)?;
        self.speech.transcribe(&wav)
    }
}
