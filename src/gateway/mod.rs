//! # Remote Data Gateway
//!
//! Issues requests to named endpoints and folds every failure into an
//! [`Outcome`] instead of an error.
//!
//! - [`Transport`] - the raw exchange (status + body), swappable
//! - [`HttpTransport`] - reqwest-backed production transport
//! - [`MockTransport`] - scripted transport for tests and offline rendering
//!
//! ## Failure policy
//!
//! | Situation | Read (GET) | Write (POST/PUT/DELETE) |
//! |-----------|------------|-------------------------|
//! | 2xx + JSON | `Live` | `Live` |
//! | 2xx + empty body | `Live(Null)` | `Live(Null)` |
//! | transport error / non-2xx / bad JSON | `Fallback` if the page has one, else `Empty` | `Empty` |
//!
//! Writes never substitute the page snapshot: a bookmark that did not reach
//! the server must not look like it did.

mod http;
mod mock;

pub use http::HttpTransport;
pub use mock::{MockResponse, MockTransport};

use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;
use serde::Serialize;
use serde_json::Value;
use tracing::{debug, instrument, warn};
use url::Url;

use crate::config::{Configuration, Endpoint};
use crate::dom::Document;
use crate::event_log::{EventKind, EventLog};
use crate::upload::ImageUpload;

// ============================================================================
// REQUESTS
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum Method {
    Get,
    Post,
    Put,
    Delete,
}

impl Method {
    pub fn as_str(self) -> &'static str {
        match self {
            Method::Get => "GET",
            Method::Post => "POST",
            Method::Put => "PUT",
            Method::Delete => "DELETE",
        }
    }

    pub fn is_read(self) -> bool {
        self == Method::Get
    }
}

impl fmt::Display for Method {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum RequestBody {
    Empty,
    Json(Value),
    /// Multipart form with the file under field `image`
    Multipart(ImageUpload),
}

/// A request against a logical endpoint, before URL composition
#[derive(Debug, Clone, PartialEq)]
pub struct ApiRequest {
    pub endpoint: Endpoint,
    pub method: Method,
    pub params: Vec<(String, String)>,
    pub query: Vec<(String, String)>,
    pub body: RequestBody,
}

impl ApiRequest {
    fn new(endpoint: Endpoint, method: Method, body: RequestBody) -> Self {
        Self {
            endpoint,
            method,
            params: Vec::new(),
            query: Vec::new(),
            body,
        }
    }

    pub fn get(endpoint: Endpoint) -> Self {
        Self::new(endpoint, Method::Get, RequestBody::Empty)
    }

    pub fn post_json(endpoint: Endpoint, body: Value) -> Self {
        Self::new(endpoint, Method::Post, RequestBody::Json(body))
    }

    pub fn put_json(endpoint: Endpoint, body: Value) -> Self {
        Self::new(endpoint, Method::Put, RequestBody::Json(body))
    }

    pub fn delete(endpoint: Endpoint) -> Self {
        Self::new(endpoint, Method::Delete, RequestBody::Empty)
    }

    pub fn upload(endpoint: Endpoint, upload: ImageUpload) -> Self {
        Self::new(endpoint, Method::Post, RequestBody::Multipart(upload))
    }

    /// Add a query-string parameter
    pub fn query(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.query.push((key.into(), value.into()));
        self
    }

    /// Fill a `{name}` placeholder in the endpoint path
    pub fn param(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.params.push((key.into(), value.into()));
        self
    }
}

/// A request with its final URL, handed to the transport
#[derive(Debug, Clone, PartialEq)]
pub struct PreparedRequest {
    pub endpoint: Endpoint,
    pub method: Method,
    pub url: Url,
    pub body: RequestBody,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawResponse {
    pub status: u16,
    pub body: Vec<u8>,
}

// ============================================================================
// FAILURES AND OUTCOMES
// ============================================================================

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureKind {
    /// Could not build the request (URL, body)
    Request,
    /// Network-level failure
    Transport,
    /// Non-2xx status
    Status(u16),
    /// Body was not valid JSON
    Decode,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Failure {
    pub kind: FailureKind,
    pub reason: String,
}

impl Failure {
    pub fn request(reason: impl Into<String>) -> Self {
        Self {
            kind: FailureKind::Request,
            reason: reason.into(),
        }
    }

    pub fn transport(reason: impl Into<String>) -> Self {
        Self {
            kind: FailureKind::Transport,
            reason: reason.into(),
        }
    }

    pub fn status(code: u16) -> Self {
        Self {
            kind: FailureKind::Status(code),
            reason: format!("HTTP error! status: {code}"),
        }
    }

    pub fn decode(reason: impl Into<String>) -> Self {
        Self {
            kind: FailureKind::Decode,
            reason: reason.into(),
        }
    }

    /// 401 or 403
    pub fn is_unauthorized(&self) -> bool {
        matches!(self.kind, FailureKind::Status(401) | FailureKind::Status(403))
    }
}

impl fmt::Display for Failure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.reason)
    }
}

/// Result of a gateway call. Never an error.
#[derive(Debug, Clone, PartialEq)]
pub enum Outcome {
    /// Decoded server response
    Live(Value),
    /// The page's embedded snapshot, served because the live call failed
    Fallback { payload: Value, failure: Failure },
    /// Nothing to render
    Empty(Failure),
}

impl Outcome {
    pub fn is_live(&self) -> bool {
        matches!(self, Outcome::Live(_))
    }

    /// Payload to bind, live or fallback
    pub fn payload(&self) -> Option<&Value> {
        match self {
            Outcome::Live(payload) | Outcome::Fallback { payload, .. } => Some(payload),
            Outcome::Empty(_) => None,
        }
    }

    pub fn into_payload(self) -> Option<Value> {
        match self {
            Outcome::Live(payload) | Outcome::Fallback { payload, .. } => Some(payload),
            Outcome::Empty(_) => None,
        }
    }

    pub fn failure(&self) -> Option<&Failure> {
        match self {
            Outcome::Live(_) => None,
            Outcome::Fallback { failure, .. } | Outcome::Empty(failure) => Some(failure),
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            Outcome::Live(_) => "live",
            Outcome::Fallback { .. } => "fallback",
            Outcome::Empty(_) => "empty",
        }
    }
}

// ============================================================================
// TRANSPORT TRAIT
// ============================================================================

/// Performs one exchange. Status handling and decoding belong to [`Gateway`].
#[async_trait]
pub trait Transport: Send + Sync {
    /// Short name for logs ("http", "mock")
    fn name(&self) -> &str;

    async fn send(&self, request: &PreparedRequest) -> Result<RawResponse, Failure>;
}

// ============================================================================
// GATEWAY
// ============================================================================

pub struct Gateway {
    config: Configuration,
    origin: String,
    transport: Arc<dyn Transport>,
    fallback: Option<Value>,
    events: EventLog,
}

impl Gateway {
    pub fn new(
        config: Configuration,
        origin: impl Into<String>,
        transport: Arc<dyn Transport>,
        events: EventLog,
    ) -> Self {
        Self {
            config,
            origin: origin.into(),
            transport,
            fallback: None,
            events,
        }
    }

    pub fn with_fallback(mut self, fallback: Option<Value>) -> Self {
        self.fallback = fallback;
        self
    }

    /// Parse the page's embedded snapshot once.
    ///
    /// A missing element gives `None`; so does a malformed one, with a warning.
    pub fn load_fallback(doc: &Document, template_id: &str) -> Option<Value> {
        let element = doc.element_by_id(template_id)?;
        match serde_json::from_str(&doc.text_content(element)) {
            Ok(value) => Some(value),
            Err(e) => {
                warn!(template = template_id, error = %e, "fallback template is not valid JSON");
                None
            }
        }
    }

    pub fn config(&self) -> &Configuration {
        &self.config
    }

    pub fn fallback(&self) -> Option<&Value> {
        self.fallback.as_ref()
    }

    /// What a failed read degrades to
    pub fn degrade(&self, endpoint: Endpoint, failure: Failure) -> Outcome {
        match &self.fallback {
            Some(payload) => {
                debug!(endpoint = %endpoint, "serving fallback payload");
                self.events.emit(EventKind::FallbackServed {
                    endpoint: endpoint.name().to_string(),
                });
                Outcome::Fallback {
                    payload: payload.clone(),
                    failure,
                }
            }
            None => Outcome::Empty(failure),
        }
    }

    #[instrument(skip(self, request), fields(endpoint = %request.endpoint, method = %request.method, transport = self.transport.name()))]
    pub async fn request(&self, request: ApiRequest) -> Outcome {
        let endpoint = request.endpoint;
        let is_read = request.method.is_read();

        match self.fetch_live(request).await {
            Ok(payload) => Outcome::Live(payload),
            Err(failure) => {
                warn!(reason = %failure, "gateway request failed");
                self.events.emit(EventKind::RequestFailed {
                    endpoint: endpoint.name().to_string(),
                    reason: failure.reason.clone(),
                });
                if is_read {
                    self.degrade(endpoint, failure)
                } else {
                    Outcome::Empty(failure)
                }
            }
        }
    }

    async fn fetch_live(&self, request: ApiRequest) -> Result<Value, Failure> {
        let url = self
            .config
            .url(&self.origin, request.endpoint, &request.params, &request.query)
            .map_err(|e| Failure::request(e.to_string()))?;

        let prepared = PreparedRequest {
            endpoint: request.endpoint,
            method: request.method,
            url,
            body: request.body,
        };

        self.events.emit(EventKind::RequestSent {
            endpoint: prepared.endpoint.name().to_string(),
            method: prepared.method.as_str().to_string(),
            url: prepared.url.to_string(),
        });

        let response = self.transport.send(&prepared).await?;
        if !(200..300).contains(&response.status) {
            return Err(Failure::status(response.status));
        }

        let payload = decode_body(&response.body)?;
        debug!(status = response.status, "gateway request succeeded");
        self.events.emit(EventKind::RequestSucceeded {
            endpoint: prepared.endpoint.name().to_string(),
            status: response.status,
        });
        Ok(payload)
    }
}

impl fmt::Debug for Gateway {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Gateway")
            .field("base_url", &self.config.base_url)
            .field("origin", &self.origin)
            .field("transport", &self.transport.name())
            .field("has_fallback", &self.fallback.is_some())
            .finish()
    }
}

/// Full decode before anything is bound; empty bodies are `Null`.
fn decode_body(body: &[u8]) -> Result<Value, Failure> {
    if body.iter().all(u8::is_ascii_whitespace) {
        return Ok(Value::Null);
    }
    serde_json::from_slice(body).map_err(|e| Failure::decode(e.to_string()))
}
