//! The network boundary.
//!
//! # Design
//! The pipeline depends only on `Transport`: "send this request, give me a
//! status and a body", either blocking or with a one-shot completion. The
//! transport owns whatever dispatch machinery it needs for the async path;
//! the call engine never spawns threads of its own.
//!
//! `UreqTransport` is the default. Async calls run on tokio's blocking pool
//! when the caller is inside a tokio runtime, and on a short-lived worker
//! thread otherwise.

use std::error::Error as StdError;
use std::fmt;
use std::thread;

use thiserror::Error;
use tracing::trace;

use crate::http::{HttpMethod, HttpRequest, HttpResponse};

/// Completion notification for `Transport::enqueue`. Invoked exactly once.
pub type Completion = Box<dyn FnOnce(Result<HttpResponse, TransportError>) + Send + 'static>;

/// Performs HTTP round-trips.
pub trait Transport: Send + Sync + 'static {
    /// Perform the request on the calling thread.
    fn send(&self, request: &HttpRequest) -> Result<HttpResponse, TransportError>;

    /// Perform the request off the calling thread and report through
    /// `on_complete`. Must not block the caller.
    fn enqueue(&self, request: HttpRequest, on_complete: Completion);
}

/// The round-trip failed before a complete response was received.
#[derive(Debug, Error)]
#[error("{message}")]
pub struct TransportError {
    message: String,
    #[source]
    source: Option<Box<dyn StdError + Send + Sync + 'static>>,
}

impl TransportError {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            source: None,
        }
    }

    pub fn from_source<E>(source: E) -> Self
    where
        E: StdError + Send + Sync + 'static,
    {
        Self {
            message: source.to_string(),
            source: Some(Box::new(source)),
        }
    }
}

/// `Transport` backed by a blocking `ureq` agent.
///
/// Non-2xx statuses are returned as data, not as errors, so status
/// interpretation stays with the call engine.
#[derive(Clone)]
pub struct UreqTransport {
    agent: ureq::Agent,
}

impl UreqTransport {
    pub fn new() -> Self {
        let agent = ureq::Agent::config_builder()
            .http_status_as_error(false)
            .build()
            .new_agent();
        Self { agent }
    }

    /// Use a preconfigured agent. It must have `http_status_as_error`
    /// disabled, or error responses will surface as transport failures.
    pub fn with_agent(agent: ureq::Agent) -> Self {
        Self { agent }
    }
}

impl Default for UreqTransport {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for UreqTransport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("UreqTransport").finish_non_exhaustive()
    }
}

impl Transport for UreqTransport {
    fn send(&self, request: &HttpRequest) -> Result<HttpResponse, TransportError> {
        let url = request.url.as_str();
        let headers = request.headers.as_slice();
        let body = request.body.as_deref();

        let result = match request.method {
            HttpMethod::Get => with_headers(self.agent.get(url), headers).call(),
            HttpMethod::Delete => with_headers(self.agent.delete(url), headers).call(),
            HttpMethod::Post => send_body(with_headers(self.agent.post(url), headers), body),
            HttpMethod::Put => send_body(with_headers(self.agent.put(url), headers), body),
            HttpMethod::Patch => send_body(with_headers(self.agent.patch(url), headers), body),
        };
        let mut response = result.map_err(TransportError::from_source)?;

        let status = response.status().as_u16();
        let headers = response
            .headers()
            .iter()
            .filter_map(|(name, value)| {
                value
                    .to_str()
                    .ok()
                    .map(|value| (name.as_str().to_string(), value.to_string()))
            })
            .collect();
        let body = response
            .body_mut()
            .read_to_vec()
            .map_err(TransportError::from_source)?;

        Ok(HttpResponse {
            status,
            headers,
            body,
        })
    }

    fn enqueue(&self, request: HttpRequest, on_complete: Completion) {
        let transport = self.clone();
        let job = move || on_complete(transport.send(&request));
        match tokio::runtime::Handle::try_current() {
            Ok(handle) => {
                trace!("dispatching on the tokio blocking pool");
                drop(handle.spawn_blocking(job));
            }
            Err(_) => {
                trace!("dispatching on a worker thread");
                drop(thread::spawn(job));
            }
        }
    }
}

fn with_headers<B>(
    mut builder: ureq::RequestBuilder<B>,
    headers: &[(String, String)],
) -> ureq::RequestBuilder<B> {
    for (name, value) in headers {
        builder = builder.header(name.as_str(), value.as_str());
    }
    builder
}

fn send_body(
    builder: ureq::RequestBuilder<ureq::typestate::WithBody>,
    body: Option<&[u8]>,
) -> Result<ureq::http::Response<ureq::Body>, ureq::Error> {
    match body {
        Some(bytes) => builder.send(bytes),
        None => builder.send_empty(),
    }
}
