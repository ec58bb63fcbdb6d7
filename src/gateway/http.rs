//! reqwest-backed transport

use async_trait::async_trait;
use reqwest::header::ACCEPT;
use reqwest::multipart::{Form, Part};

use super::{Failure, Method, PreparedRequest, RawResponse, RequestBody, Transport};
use crate::config::Settings;
use crate::error::PageError;

const USER_AGENT: &str = concat!("trademark-pages/", env!("CARGO_PKG_VERSION"));

/// Production transport with a shared client (connection pooling)
#[derive(Clone)]
pub struct HttpTransport {
    client: reqwest::Client,
}

impl HttpTransport {
    pub fn new(settings: &Settings) -> Result<Self, PageError> {
        let client = reqwest::Client::builder()
            .timeout(settings.request_timeout())
            .connect_timeout(settings.connect_timeout())
            .redirect(reqwest::redirect::Policy::limited(5))
            .user_agent(USER_AGENT)
            .build()
            .map_err(|e| PageError::HttpClient {
                details: e.to_string(),
            })?;
        Ok(Self { client })
    }
}

#[async_trait]
impl Transport for HttpTransport {
    fn name(&self) -> &str {
        "http"
    }

    async fn send(&self, request: &PreparedRequest) -> Result<RawResponse, Failure> {
        let url = request.url.clone();
        let builder = match request.method {
            Method::Get => self.client.get(url),
            Method::Post => self.client.post(url),
            Method::Put => self.client.put(url),
            Method::Delete => self.client.delete(url),
        }
        .header(ACCEPT, "application/json");

        let builder = match &request.body {
            RequestBody::Empty => builder,
            RequestBody::Json(body) => builder.json(body),
            RequestBody::Multipart(upload) => {
                let part = Part::bytes(upload.bytes.clone())
                    .file_name(upload.file_name.clone())
                    .mime_str(&upload.content_type)
                    .map_err(|e| Failure::request(format!("invalid content type: {e}")))?;
                builder.multipart(Form::new().part("image", part))
            }
        };

        let response = builder
            .send()
            .await
            .map_err(|e| Failure::transport(format!("HTTP request failed: {e}")))?;
        let status = response.status().as_u16();
        let body = response
            .bytes()
            .await
            .map_err(|e| Failure::transport(format!("Failed to read response: {e}")))?;

        Ok(RawResponse {
            status,
            body: body.to_vec(),
        })
    }
}

impl std::fmt::Debug for HttpTransport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HttpTransport").finish_non_exhaustive()
    }
}
