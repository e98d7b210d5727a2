//! Scripted provider for unit and end-to-end tests.
//!
//! Responses are consumed in FIFO order. Once the queue is empty the
//! fallback response (if any) is returned for every further call;
//! otherwise the call fails with [`ProviderError::EmptyResponse`].

use std::collections::VecDeque;
use std::sync::Mutex;

use async_trait::async_trait;

use cw_protocol::ProviderKind;

use crate::error::{ProviderError, ProviderResult};
use crate::provider::{CompletionRequest, Provider};

pub struct MockProvider {
    id: String,
    kind: ProviderKind,
    available: bool,
    /// Queued results returned by `complete` (FIFO order).
    responses: Mutex<VecDeque<ProviderResult<String>>>,
    fallback: Option<String>,
    /// Every request passed to `complete` (for test assertions).
    calls: Mutex<Vec<CompletionRequest>>,
    probes: Mutex<u32>,
}

impl MockProvider {
    fn new(id: &str, kind: ProviderKind) -> Self {
        Self {
            id: id.to_string(),
            kind,
            available: true,
            responses: Mutex::new(VecDeque::new()),
            fallback: None,
            calls: Mutex::new(Vec::new()),
            probes: Mutex::new(0),
        }
    }

    /// A networked provider with the given id.
    pub fn cloud(id: &str) -> Self {
        Self::new(id, ProviderKind::Cloud)
    }

    /// A local provider with the given id.
    pub fn local(id: &str) -> Self {
        Self::new(id, ProviderKind::Local)
    }

    /// Probe fails, so the proxy marks this provider unavailable.
    pub fn unavailable(mut self) -> Self {
        self.available = false;
        self
    }

    /// Queue a successful response.
    pub fn with_response(self, text: impl Into<String>) -> Self {
        self.queue_response(text);
        self
    }

    /// Queue a failure.
    pub fn with_error(self, error: ProviderError) -> Self {
        self.responses.lock().unwrap().push_back(Err(error));
        self
    }

    /// Response returned whenever the queue is empty.
    pub fn always(mut self, text: impl Into<String>) -> Self {
        self.fallback = Some(text.into());
        self
    }

    pub fn queue_response(&self, text: impl Into<String>) {
        self.responses.lock().unwrap().push_back(Ok(text.into()));
    }

    /// Copies of every request received.
    pub fn calls(&self) -> Vec<CompletionRequest> {
        self.calls.lock().unwrap().clone()
    }

    pub fn call_count(&self) -> usize {
        self.calls.lock().unwrap().len()
    }

    pub fn probe_count(&self) -> u32 {
        *self.probes.lock().unwrap()
    }
}

#[async_trait]
impl Provider for MockProvider {
    fn id(&self) -> &str {
        &self.id
    }

    fn name(&self) -> &str {
        &self.id
    }

    fn kind(&self) -> ProviderKind {
        self.kind
    }

    async fn probe(&self) -> ProviderResult<u32> {
        *self.probes.lock().unwrap() += 1;
        if self.available {
            Ok(1)
        } else {
            Err(ProviderError::Unavailable(format!("{} is down", self.id)))
        }
    }

    async fn complete(&self, request: &CompletionRequest) -> ProviderResult<String> {
        self.calls.lock().unwrap().push(request.clone());
        if let Some(next) = self.responses.lock().unwrap().pop_front() {
            return next;
        }
        match &self.fallback {
            Some(text) => Ok(text.clone()),
            None => Err(ProviderError::EmptyResponse),
        }
    }
}
