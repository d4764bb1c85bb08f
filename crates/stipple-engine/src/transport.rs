use std::time::Duration;

use reqwest::blocking::multipart::{Form as MultipartForm, Part as MultipartPart};
use reqwest::blocking::Client as HttpClient;
use reqwest::header::ACCEPT;
use stipple_contracts::{GatewayError, GatewayResult};
use tracing::{info, warn};

use crate::config::GatewayConfig;
use crate::operations::EditCall;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UpstreamReply {
    pub status: u16,
    pub body: Vec<u8>,
}

pub trait EditTransport: Send + Sync {
    fn send(&self, call: &EditCall) -> GatewayResult<UpstreamReply>;
}

/// Blocking multipart transport for the Stability image API.
pub struct StabilityTransport {
    api_base: String,
    api_key: Option<String>,
    timeout: Duration,
    http: HttpClient,
}

impl StabilityTransport {
    pub fn new(config: &GatewayConfig) -> GatewayResult<Self> {
        let http = HttpClient::builder()
            .timeout(config.upstream_timeout)
            .build()
            .map_err(|err| GatewayError::Config(format!("failed to build HTTP client: {err}")))?;
        Ok(Self {
            api_base: config.api_base.clone(),
            api_key: config.api_key.clone(),
            timeout: config.upstream_timeout,
            http,
        })
    }

    fn url(&self, call: &EditCall) -> String {
        format!("{}{}", self.api_base, call.endpoint)
    }

    fn form(call: &EditCall) -> GatewayResult<MultipartForm> {
        let mut form = MultipartForm::new();
        for (name, value) in &call.fields {
            form = form.text(*name, value.clone());
        }
        if let Some(file) = &call.file {
            let part = MultipartPart::bytes(file.bytes.clone())
                .file_name(file.file_name.clone())
                .mime_str(file.mime)
                .map_err(|err| GatewayError::Transport(format!("invalid mime type: {err}")))?;
            form = form.part(file.field, part);
        }
        Ok(form)
    }

    fn map_send_error(&self, err: reqwest::Error) -> GatewayError {
        if err.is_timeout() {
            GatewayError::UpstreamTimeout(self.timeout)
        } else {
            GatewayError::Transport(error_chain_text(&err))
        }
    }
}

impl EditTransport for StabilityTransport {
    fn send(&self, call: &EditCall) -> GatewayResult<UpstreamReply> {
        let Some(api_key) = self.api_key.as_deref() else {
            return Err(GatewayError::Config("STABILITY_API_KEY not set".to_string()));
        };
        let url = self.url(call);
        let form = Self::form(call)?;

        let response = self
            .http
            .post(&url)
            .bearer_auth(api_key)
            .header(ACCEPT, "image/*")
            .multipart(form)
            .send()
            .map_err(|err| self.map_send_error(err))?;
        let status = response.status().as_u16();
        let body = response
            .bytes()
            .map_err(|err| self.map_send_error(err))?
            .to_vec();

        if status == 200 {
            info!(task = %call.task, endpoint = %url, status, bytes = body.len(), "upstream call succeeded");
        } else {
            warn!(task = %call.task, endpoint = %url, status, "upstream call rejected");
        }
        Ok(UpstreamReply { status, body })
    }
}

fn error_chain_text(err: &(dyn std::error::Error + 'static)) -> String {
    let mut parts = vec![err.to_string()];
    let mut source = err.source();
    while let Some(cause) = source {
        let text = cause.to_string();
        if parts.last().map(|last| last != &text).unwrap_or(true) {
            parts.push(text);
        }
        source = cause.source();
    }
    parts.join(" | caused by: ")
}
