//! Execution engine: turns a `RequestPlan` into a transport call and the
//! transport response into `T` or an `Error`.
//!
//! # Design
//! The same plan can run in two modes:
//! - `execute` blocks the calling thread for the whole round-trip.
//! - `start` hands the request to `Transport::enqueue` and returns at once.
//!   When the transport completes, the outcome is wrapped in a task and
//!   given to the client's `Executor`, which runs the callback.
//!
//! `send` is the `async` form of `start`: it resolves on the caller's
//! runtime and does not go through the executor.
//!
//! Body encoding follows the plan: no body or empty parameters send
//! nothing, an object or non-empty parameters are encoded with the
//! client's serializer. A 2xx response is decoded into `T`; any other
//! status goes to `parse_error_response`.

use std::fmt;
use std::sync::Arc;

use serde::de::DeserializeOwned;
use tokio::sync::oneshot;
use tracing::{debug, warn};

use crate::callback::{deliver, Callback};
use crate::client::Client;
use crate::error::{parse_error_response, Error, ParseError};
use crate::http::{HttpRequest, HttpResponse};
use crate::request::{Body, RequestPlan};
use crate::serializer::Serializer;
use crate::transport::TransportError;

/// Decodes a successful response body into the declared response type.
pub(crate) type Decode<S, T> = fn(&S, &[u8]) -> Result<T, ParseError>;

pub(crate) fn decode_typed<S: Serializer, T: DeserializeOwned>(
    serializer: &S,
    body: &[u8],
) -> Result<T, ParseError> {
    serializer.parser::<T>().parse(body)
}

pub(crate) fn decode_nothing<S>(_: &S, _: &[u8]) -> Result<(), ParseError> {
    Ok(())
}

/// A built request, ready to run. Cheap to clone; never mutated.
pub struct Call<S, T> {
    client: Client<S>,
    plan: Arc<RequestPlan>,
    decode: Decode<S, T>,
}

impl<S, T> Clone for Call<S, T> {
    fn clone(&self) -> Self {
        Self {
            client: self.client.clone(),
            plan: Arc::clone(&self.plan),
            decode: self.decode,
        }
    }
}

impl<S, T> fmt::Debug for Call<S, T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Call").field("plan", &self.plan).finish_non_exhaustive()
    }
}

impl<S: Serializer, T> Call<S, T> {
    pub(crate) fn new(client: Client<S>, plan: RequestPlan, decode: Decode<S, T>) -> Self {
        Self {
            client,
            plan: Arc::new(plan),
            decode,
        }
    }

    pub fn plan(&self) -> &RequestPlan {
        &self.plan
    }

    /// The request exactly as it will be handed to the transport.
    pub fn http_request(&self) -> Result<HttpRequest, Error> {
        let serializer = self.client.serializer();
        let body = match self.plan.body() {
            Body::None => None,
            Body::Parameters(params) if params.is_empty() => None,
            Body::Parameters(params) => Some(serializer.serialize(params)?),
            Body::Object(value) => Some(serializer.serialize(value)?),
        };

        let mut headers = self.plan.headers().to_vec();
        let has_content_type = headers
            .iter()
            .any(|(name, _)| name.eq_ignore_ascii_case("content-type"));
        if body.is_some() && !has_content_type {
            headers.push((
                "Content-Type".to_string(),
                serializer.media_type().to_string(),
            ));
        }

        Ok(HttpRequest {
            method: self.plan.method(),
            url: self.plan.url().to_string(),
            headers,
            body,
        })
    }

    /// Perform the call on the current thread.
    pub fn execute(&self) -> Result<T, Error> {
        let request = self.http_request()?;
        debug!(method = %request.method, url = %request.url, "executing request");
        let response = self.client.transport().send(&request)?;
        decode_response(&**self.client.serializer(), self.decode, response)
    }

    /// Perform the call in the background and deliver the outcome to
    /// `callback` through the client's executor. The callback runs exactly
    /// once, after the transport has finished.
    pub fn start<C>(&self, callback: C)
    where
        C: Callback<T>,
        T: Send + 'static,
    {
        let executor = Arc::clone(self.client.executor());
        self.dispatch(move |outcome| {
            executor.execute(Box::new(move || deliver(callback, outcome)));
        });
    }

    /// Perform the call in the background and await the outcome.
    pub async fn send(&self) -> Result<T, Error>
    where
        T: Send + 'static,
    {
        let (tx, rx) = oneshot::channel();
        self.dispatch(move |outcome| {
            // The receiver is gone only if the caller dropped the future.
            let _ = tx.send(outcome);
        });
        rx.await
            .map_err(|_| Error::Transport(TransportError::new(DROPPED)))?
    }

    fn dispatch<F>(&self, on_outcome: F)
    where
        F: FnOnce(Result<T, Error>) + Send + 'static,
        T: Send + 'static,
    {
        let request = match self.http_request() {
            Ok(request) => request,
            Err(err) => return on_outcome(Err(err)),
        };
        debug!(method = %request.method, url = %request.url, "enqueueing request");

        let serializer = Arc::clone(self.client.serializer());
        let decode = self.decode;
        let pending: Pending<T> = Pending(Some(Box::new(on_outcome)));
        self.client.transport().enqueue(
            request,
            Box::new(move |result| {
                let outcome = result
                    .map_err(Error::from)
                    .and_then(|response| decode_response(&*serializer, decode, response));
                pending.complete(outcome);
            }),
        );
    }
}

/// Outcome handler for an enqueued call. If the completion is dropped
/// without running (a transport bug, a runtime shutting down) the handler
/// still receives a transport error.
struct Pending<T>(Option<Box<dyn FnOnce(Result<T, Error>) + Send>>);

impl<T> Pending<T> {
    fn complete(mut self, outcome: Result<T, Error>) {
        if let Some(on_outcome) = self.0.take() {
            on_outcome(outcome);
        }
    }
}

impl<T> Drop for Pending<T> {
    fn drop(&mut self) {
        if let Some(on_outcome) = self.0.take() {
            warn!("request dropped before the transport completed it");
            on_outcome(Err(Error::Transport(TransportError::new(DROPPED))));
        }
    }
}

const DROPPED: &str = "transport dropped the request without completing it";

fn decode_response<S: Serializer, T>(
    serializer: &S,
    decode: Decode<S, T>,
    response: HttpResponse,
) -> Result<T, Error> {
    debug!(
        status = response.status,
        bytes = response.body.len(),
        "response received"
    );
    if response.is_success() {
        decode(serializer, &response.body).map_err(Error::Parse)
    } else {
        Err(parse_error_response(serializer, &response))
    }
}
