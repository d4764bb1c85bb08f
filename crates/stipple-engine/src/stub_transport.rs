use std::collections::VecDeque;
use std::sync::{Arc, Mutex, PoisonError};

use stipple_contracts::{GatewayError, GatewayResult};

use crate::operations::EditCall;
use crate::transport::{EditTransport, UpstreamReply};

/// In-memory transport that records every call and answers from a script.
///
/// Clones share the script and the call log, so a test can keep one handle for assertions
/// after handing another to a client.
#[derive(Debug, Clone, Default)]
pub struct StubTransport {
    inner: Arc<Mutex<StubState>>,
}

#[derive(Debug, Default)]
struct StubState {
    scripted: VecDeque<GatewayResult<UpstreamReply>>,
    fallback: Option<UpstreamReply>,
    calls: Vec<EditCall>,
}

impl StubTransport {
    pub fn new() -> Self {
        Self::default()
    }

    /// Answers every unscripted call with the same reply.
    pub fn always(status: u16, body: impl Into<Vec<u8>>) -> Self {
        let stub = Self::new();
        stub.state().fallback = Some(UpstreamReply {
            status,
            body: body.into(),
        });
        stub
    }

    pub fn push_reply(&self, status: u16, body: impl Into<Vec<u8>>) {
        self.state().scripted.push_back(Ok(UpstreamReply {
            status,
            body: body.into(),
        }));
    }

    pub fn push_error(&self, err: GatewayError) {
        self.state().scripted.push_back(Err(err));
    }

    pub fn calls(&self) -> Vec<EditCall> {
        self.state().calls.clone()
    }

    pub fn call_count(&self) -> usize {
        self.state().calls.len()
    }

    fn state(&self) -> std::sync::MutexGuard<'_, StubState> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl EditTransport for StubTransport {
    fn send(&self, call: &EditCall) -> GatewayResult<UpstreamReply> {
        let mut state = self.state();
        state.calls.push(call.clone());
        if let Some(reply) = state.scripted.pop_front() {
            return reply;
        }
        state
            .fallback
            .clone()
            .ok_or_else(|| GatewayError::Transport("stub transport has no reply scripted".to_string()))
    }
}
