//! Client-side request/response pipeline for a JSON REST API.
//!
//! # Overview
//! Builds HTTP requests, encodes bodies, runs calls either blocking or in the
//! background, decodes typed responses, and turns error responses into a
//! closed set of error kinds callers can match on.
//!
//! ```no_run
//! use restcall_core::{Client, Error, ServerErrorKind};
//! use serde::Deserialize;
//!
//! #[derive(Deserialize)]
//! struct TenantInfo {
//!     name: String,
//! }
//!
//! # fn main() -> Result<(), Error> {
//! let client = Client::new("https://tenant.example.com")?;
//! let tenant: TenantInfo = client.new_request().get("/api/tenant-info").build()?.execute()?;
//! println!("{}", tenant.name);
//!
//! let verify = client
//!     .new_request_no_content()
//!     .post("/api/verify-otp")
//!     .bearer_token("TX_TOKEN")
//!     .parameter("type", "push_notification")
//!     .parameter("code", "123456")
//!     .build()?;
//! match verify.execute() {
//!     Ok(()) => {}
//!     Err(Error::Server(err)) if err.kind == ServerErrorKind::InvalidCode => {
//!         eprintln!("wrong code");
//!     }
//!     Err(err) => return Err(err),
//! }
//! # Ok(())
//! # }
//! ```
//!
//! # Design
//! - `Serializer` is the only place that knows the wire format.
//! - `RequestBuilder` records the first configuration error and reports it
//!   from `build()`; the resulting `RequestPlan` is immutable.
//! - `Call::execute` blocks; `Call::start` runs through the `Transport`'s own
//!   async mechanism and delivers one callback via an `Executor`.
//! - Every failure surfaces as an `Error` variant; nothing is retried.

pub mod call;
pub mod callback;
pub mod client;
pub mod error;
pub mod http;
pub mod request;
pub mod serializer;
pub mod transport;

pub use call::Call;
pub use callback::{Callback, Executor, Inline, Task};
pub use client::{Client, ClientBuilder};
pub use error::{
    parse_error_response, ConfigError, Error, ParseError, SerializeError, ServerError,
    ServerErrorBody, ServerErrorKind,
};
pub use http::{HttpMethod, HttpRequest, HttpResponse};
pub use request::{Body, BodyKind, RequestBuilder, RequestPlan};
pub use serializer::{JsonSerializer, Parser, Serializer};
pub use transport::{Completion, Transport, TransportError, UreqTransport};
