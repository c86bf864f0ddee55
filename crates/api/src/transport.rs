//! HTTP transport seam.
//!
//! The orchestrator only builds [`HttpRequest`]s and classifies
//! [`HttpResponse`]s; performing the call is up to an [`HttpTransport`].

use std::future::Future;
use std::pin::Pin;

use serde_json::Value;
use tracing::trace;

use crate::error::TransportError;
use crate::operation::Method;

/// Encoded request body.
#[derive(Debug, Clone, PartialEq)]
pub enum RequestBody {
    Json(Value),
    /// Multipart text fields, in payload order.
    Form(Vec<(String, String)>),
}

#[derive(Debug, Clone, PartialEq)]
pub struct HttpRequest {
    pub method: Method,
    pub url: String,
    pub headers: Vec<(String, String)>,
    pub body: Option<RequestBody>,
}

impl HttpRequest {
    /// First header value with the given name, compared case-insensitively.
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }
}

/// Status and parsed body. Non-2xx statuses are ordinary responses.
#[derive(Debug, Clone, PartialEq)]
pub struct HttpResponse {
    pub status: u16,
    pub body: Value,
}

impl HttpResponse {
    pub fn new(status: u16, body: Value) -> Self {
        Self { status, body }
    }

    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }
}

/// Performs HTTP calls.
pub trait HttpTransport: Send + Sync {
    fn call<'a>(
        &'a self,
        request: HttpRequest,
    ) -> Pin<Box<dyn Future<Output = Result<HttpResponse, TransportError>> + Send + 'a>>;
}

/// [`HttpTransport`] backed by `reqwest`.
#[derive(Debug, Clone, Default)]
pub struct ReqwestTransport {
    client: reqwest::Client,
}

impl ReqwestTransport {
    pub fn new(client: reqwest::Client) -> Self {
        Self { client }
    }
}

impl HttpTransport for ReqwestTransport {
    fn call<'a>(
        &'a self,
        request: HttpRequest,
    ) -> Pin<Box<dyn Future<Output = Result<HttpResponse, TransportError>> + Send + 'a>> {
        Box::pin(async move {
            let method = reqwest::Method::from_bytes(request.method.as_str().as_bytes())
                .map_err(|e| TransportError::InvalidRequest(e.to_string()))?;

            let mut builder = self.client.request(method, &request.url);
            for (name, value) in &request.headers {
                builder = builder.header(name.as_str(), value.as_str());
            }
            builder = match request.body {
                Some(RequestBody::Json(value)) => builder.body(value.to_string()),
                Some(RequestBody::Form(fields)) => {
                    let form = fields
                        .into_iter()
                        .fold(reqwest::multipart::Form::new(), |form, (k, v)| form.text(k, v));
                    builder.multipart(form)
                }
                None => builder,
            };

            let response = builder
                .send()
                .await
                .map_err(|e| TransportError::Http(format!("request to {} failed: {e}", request.url)))?;
            let status = response.status().as_u16();
            let bytes = response
                .bytes()
                .await
                .map_err(|e| TransportError::Http(format!("failed to read response: {e}")))?;

            trace!(status, len = bytes.len(), "HTTP response received");
            Ok(HttpResponse::new(status, parse_body(&bytes)))
        })
    }
}

/// JSON bodies are parsed; an empty body is `null` and anything else is
/// kept as a string.
pub(crate) fn parse_body(bytes: &[u8]) -> Value {
    if bytes.iter().all(u8::is_ascii_whitespace) {
        return Value::Null;
    }
    serde_json::from_slice(bytes)
        .unwrap_or_else(|_| Value::String(String::from_utf8_lossy(bytes).into_owned()))
}
