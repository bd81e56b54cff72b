//! Client wiring: base address, serializer, transport and callback executor.
//!
//! # Design
//! `Client` holds only shared, immutable collaborators behind an `Arc`, so it
//! is cheap to clone and safe to use from any thread. Defaults (JSON,
//! `UreqTransport`, inline callbacks) are supplied by `ClientBuilder` and
//! can each be replaced; nothing is process-wide.

use std::fmt;
use std::sync::Arc;

use serde::de::DeserializeOwned;
use tracing::debug;
use url::Url;

use crate::call::{decode_nothing, decode_typed};
use crate::callback::{Executor, Inline};
use crate::error::ConfigError;
use crate::request::{check_header, parse_base_url, RequestBuilder};
use crate::serializer::{JsonSerializer, Serializer};
use crate::transport::{Transport, UreqTransport};

struct Inner<S> {
    base_url: Url,
    serializer: Arc<S>,
    transport: Arc<dyn Transport>,
    executor: Arc<dyn Executor>,
    default_headers: Vec<(String, String)>,
}

/// Entry point for building requests against one API.
pub struct Client<S = JsonSerializer> {
    inner: Arc<Inner<S>>,
}

impl<S> Clone for Client<S> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<S> fmt::Debug for Client<S> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Client")
            .field("base_url", &self.inner.base_url.as_str())
            .field("default_headers", &self.inner.default_headers)
            .finish_non_exhaustive()
    }
}

impl Client<JsonSerializer> {
    /// A client with every default: JSON bodies, `UreqTransport`, inline
    /// callbacks.
    pub fn new(base_url: &str) -> Result<Self, ConfigError> {
        Self::builder().base_url(base_url)?.build()
    }

    pub fn builder() -> ClientBuilder<JsonSerializer> {
        ClientBuilder {
            base_url: None,
            serializer: Arc::new(JsonSerializer),
            transport: None,
            executor: None,
            default_headers: Vec::new(),
        }
    }
}

impl<S: Serializer> Client<S> {
    /// Start a request whose successful response decodes into `T`.
    pub fn new_request<T: DeserializeOwned>(&self) -> RequestBuilder<S, T> {
        RequestBuilder::new(self.clone(), decode_typed::<S, T>)
    }

    /// Start a request with no declared response type; a successful body is
    /// ignored.
    pub fn new_request_no_content(&self) -> RequestBuilder<S, ()> {
        RequestBuilder::new(self.clone(), decode_nothing::<S>)
    }

    pub fn base_url(&self) -> &Url {
        &self.inner.base_url
    }

    pub fn serializer(&self) -> &Arc<S> {
        &self.inner.serializer
    }

    pub(crate) fn transport(&self) -> &Arc<dyn Transport> {
        &self.inner.transport
    }

    pub(crate) fn executor(&self) -> &Arc<dyn Executor> {
        &self.inner.executor
    }

    pub(crate) fn default_headers(&self) -> &[(String, String)] {
        &self.inner.default_headers
    }
}

/// Configures a `Client`.
pub struct ClientBuilder<S> {
    base_url: Option<Url>,
    serializer: Arc<S>,
    transport: Option<Arc<dyn Transport>>,
    executor: Option<Arc<dyn Executor>>,
    default_headers: Vec<(String, String)>,
}

impl<S: Serializer> ClientBuilder<S> {
    /// Set the absolute http(s) address all request paths are appended to.
    /// An invalid address is rejected here, not when a request runs.
    pub fn base_url(mut self, base_url: &str) -> Result<Self, ConfigError> {
        self.base_url = Some(parse_base_url(base_url)?);
        Ok(self)
    }

    /// Replace the wire format.
    pub fn serializer<N: Serializer>(self, serializer: N) -> ClientBuilder<N> {
        self.shared_serializer(Arc::new(serializer))
    }

    /// Replace the wire format with a serializer shared with other clients.
    pub fn shared_serializer<N: Serializer>(self, serializer: Arc<N>) -> ClientBuilder<N> {
        ClientBuilder {
            base_url: self.base_url,
            serializer,
            transport: self.transport,
            executor: self.executor,
            default_headers: self.default_headers,
        }
    }

    pub fn transport(mut self, transport: impl Transport) -> Self {
        self.transport = Some(Arc::new(transport));
        self
    }

    pub fn shared_transport(mut self, transport: Arc<dyn Transport>) -> Self {
        self.transport = Some(transport);
        self
    }

    /// Where `Call::start` callbacks run. Defaults to `Inline`.
    pub fn callback_executor(mut self, executor: impl Executor) -> Self {
        self.executor = Some(Arc::new(executor));
        self
    }

    /// A header sent with every request unless the request sets its own.
    pub fn default_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        let name = name.into();
        let value = value.into();
        match self
            .default_headers
            .iter_mut()
            .find(|(key, _)| key.eq_ignore_ascii_case(&name))
        {
            Some(entry) => entry.1 = value,
            None => self.default_headers.push((name, value)),
        }
        self
    }

    pub fn build(self) -> Result<Client<S>, ConfigError> {
        let base_url = self.base_url.ok_or(ConfigError::MissingBaseUrl)?;
        for (name, value) in &self.default_headers {
            check_header(name, value)?;
        }
        debug!(base_url = %base_url, media_type = self.serializer.media_type(), "client configured");
        Ok(Client {
            inner: Arc::new(Inner {
                base_url,
                serializer: self.serializer,
                transport: self
                    .transport
                    .unwrap_or_else(|| Arc::new(UreqTransport::new())),
                executor: self.executor.unwrap_or_else(|| Arc::new(Inline)),
                default_headers: self.default_headers,
            }),
        })
    }
}

impl<S> fmt::Debug for ClientBuilder<S> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ClientBuilder")
            .field("base_url", &self.base_url.as_ref().map(Url::as_str))
            .field("default_headers", &self.default_headers)
            .finish_non_exhaustive()
    }
}
