//! Scripted transport for tests and offline rendering
//!
//! Responses are queued per URL path and served FIFO. A path with an empty
//! queue falls back to its `always` response, and otherwise fails like an
//! unreachable network.

use std::collections::{HashMap, VecDeque};
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;
use serde_json::Value;

use super::{Failure, PreparedRequest, RawResponse, Transport};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MockResponse {
    pub status: u16,
    pub body: Vec<u8>,
    pub delay: Option<Duration>,
}

impl MockResponse {
    pub fn json(status: u16, body: Value) -> Self {
        Self {
            status,
            body: body.to_string().into_bytes(),
            delay: None,
        }
    }

    pub fn text(status: u16, body: impl Into<String>) -> Self {
        Self {
            status,
            body: body.into().into_bytes(),
            delay: None,
        }
    }

    /// Hold the response for `delay` before answering
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }
}

type Scripted = Result<MockResponse, Failure>;

#[derive(Default)]
pub struct MockTransport {
    queued: Mutex<HashMap<String, VecDeque<Scripted>>>,
    always: Mutex<HashMap<String, MockResponse>>,
    requests: Mutex<Vec<PreparedRequest>>,
}

impl MockTransport {
    pub fn new() -> Self {
        Self::default()
    }

    /// No routes: every request fails at the transport level
    pub fn offline() -> Self {
        Self::default()
    }

    /// Queue a response for `path`
    pub fn respond(&self, path: &str, response: MockResponse) {
        self.queued
            .lock()
            .entry(path.to_string())
            .or_default()
            .push_back(Ok(response));
    }

    /// Queue a failure for `path`
    pub fn fail(&self, path: &str, failure: Failure) {
        self.queued
            .lock()
            .entry(path.to_string())
            .or_default()
            .push_back(Err(failure));
    }

    /// Answer every otherwise-unscripted request to `path`
    pub fn always(&self, path: &str, response: MockResponse) {
        self.always.lock().insert(path.to_string(), response);
    }

    pub fn requests(&self) -> Vec<PreparedRequest> {
        self.requests.lock().clone()
    }

    pub fn last_request(&self) -> Option<PreparedRequest> {
        self.requests.lock().last().cloned()
    }

    pub fn request_count(&self) -> usize {
        self.requests.lock().len()
    }

    fn next_for(&self, path: &str) -> Scripted {
        if let Some(next) = self.queued.lock().get_mut(path).and_then(VecDeque::pop_front) {
            return next;
        }
        match self.always.lock().get(path) {
            Some(response) => Ok(response.clone()),
            None => Err(Failure::transport(format!("offline: no route for {path}"))),
        }
    }
}

#[async_trait]
impl Transport for MockTransport {
    fn name(&self) -> &str {
        "mock"
    }

    async fn send(&self, request: &PreparedRequest) -> Result<RawResponse, Failure> {
        self.requests.lock().push(request.clone());
        let response = self.next_for(request.url.path())?;
        if let Some(delay) = response.delay {
            tokio::time::sleep(delay).await;
        }
        Ok(RawResponse {
            status: response.status,
            body: response.body,
        })
    }
}

impl std::fmt::Debug for MockTransport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MockTransport")
            .field("requests", &self.request_count())
            .finish()
    }
}
