//! Error types and server error classification.
//!
//! # Design
//! Failures are split by the layer they come from so callers can tell them
//! apart without string matching:
//! - `Config` — the request was mis-built. Raised before any I/O.
//! - `Transport` — the network round-trip itself failed.
//! - `Server` — a non-2xx response whose body parsed as an error record,
//!   classified into a `ServerErrorKind` by its `errorCode`.
//! - `UnparseableServer` — a non-2xx response whose body did not parse as an
//!   error record (HTML error pages, proxies, plain text).
//! - `Parse` — a 2xx response whose body did not parse as the declared type.
//!
//! Nothing here retries or suppresses a failure.

use std::error::Error as StdError;
use std::fmt;

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::warn;

use crate::http::{HttpMethod, HttpResponse};
use crate::request::BodyKind;
use crate::serializer::Serializer;
use crate::transport::TransportError;

type BoxError = Box<dyn StdError + Send + Sync + 'static>;

/// Every failure the pipeline can report, for both `execute` and `start`.
#[derive(Debug, Error)]
pub enum Error {
    #[error("invalid request configuration: {0}")]
    Config(#[from] ConfigError),

    #[error("transport failure: {0}")]
    Transport(#[from] TransportError),

    #[error(transparent)]
    Server(#[from] ServerError),

    #[error("HTTP {status_code} with an unparseable error body: {source}")]
    UnparseableServer {
        status_code: u16,
        #[source]
        source: ParseError,
    },

    #[error("failed to parse response body: {0}")]
    Parse(#[from] ParseError),

    #[error("failed to serialize request body: {0}")]
    Serialize(#[from] SerializeError),
}

impl Error {
    /// The classified server error, if the server rejected the request with
    /// a well-formed error body.
    pub fn server_error(&self) -> Option<&ServerError> {
        match self {
            Error::Server(err) => Some(err),
            _ => None,
        }
    }

    /// The HTTP status of the failed response, for server-side failures.
    pub fn status_code(&self) -> Option<u16> {
        match self {
            Error::Server(err) => Some(err.status_code),
            Error::UnparseableServer { status_code, .. } => Some(*status_code),
            _ => None,
        }
    }

    pub fn is_transport(&self) -> bool {
        matches!(self, Error::Transport(_))
    }

    /// True when a response arrived but its body could not be decoded,
    /// on either the success or the error path.
    pub fn is_parse_failure(&self) -> bool {
        matches!(self, Error::Parse(_) | Error::UnparseableServer { .. })
    }
}

/// A request could not be built. These are programming errors and are
/// reported before anything is sent.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ConfigError {
    #[error("invalid base url `{url}`: {reason}")]
    InvalidBaseUrl { url: String, reason: String },

    #[error("no base url configured")]
    MissingBaseUrl,

    #[error("request has no method and path")]
    MissingMethod,

    #[error("{method} requests cannot carry a body")]
    BodyNotAllowed { method: HttpMethod },

    #[error("request body is already {existing}; cannot add {attempted}")]
    ConflictingBody {
        existing: BodyKind,
        attempted: BodyKind,
    },

    #[error("value for `{name}` cannot be encoded: {reason}")]
    InvalidValue { name: String, reason: String },

    #[error("path `{path}` does not form a valid url: {reason}")]
    InvalidPath { path: String, reason: String },

    #[error("invalid header `{name}`: {reason}")]
    InvalidHeader { name: String, reason: String },
}

/// A body could not be decoded into the requested type.
#[derive(Debug, Error)]
#[error("{message}")]
pub struct ParseError {
    message: String,
    #[source]
    source: Option<BoxError>,
}

impl ParseError {
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

    pub fn message(&self) -> &str {
        &self.message
    }
}

/// A value could not be encoded into the wire format.
#[derive(Debug, Error)]
#[error("{message}")]
pub struct SerializeError {
    message: String,
    #[source]
    source: Option<BoxError>,
}

impl SerializeError {
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

/// The error-code families the API is known to return.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ServerErrorKind {
    /// `invalid_token` — the bearer token was rejected.
    InvalidToken,
    /// `invalid_otp` — the submitted one-time code was wrong.
    InvalidCode,
    /// `login_transaction_not_found`
    LoginTransactionNotFound,
    /// `device_account_not_found`
    DeviceAccountNotFound,
    /// `enrollment_transaction_not_found`
    EnrollmentTransactionNotFound,
    /// Any other code, or no code at all.
    Generic,
}

impl ServerErrorKind {
    pub fn from_code(code: Option<&str>) -> Self {
        match code {
            Some("invalid_token") => ServerErrorKind::InvalidToken,
            Some("invalid_otp") => ServerErrorKind::InvalidCode,
            Some("login_transaction_not_found") => ServerErrorKind::LoginTransactionNotFound,
            Some("device_account_not_found") => ServerErrorKind::DeviceAccountNotFound,
            Some("enrollment_transaction_not_found") => {
                ServerErrorKind::EnrollmentTransactionNotFound
            }
            _ => ServerErrorKind::Generic,
        }
    }

    /// The wire code this kind is recognized from; `None` for `Generic`.
    pub fn code(self) -> Option<&'static str> {
        match self {
            ServerErrorKind::InvalidToken => Some("invalid_token"),
            ServerErrorKind::InvalidCode => Some("invalid_otp"),
            ServerErrorKind::LoginTransactionNotFound => Some("login_transaction_not_found"),
            ServerErrorKind::DeviceAccountNotFound => Some("device_account_not_found"),
            ServerErrorKind::EnrollmentTransactionNotFound => {
                Some("enrollment_transaction_not_found")
            }
            ServerErrorKind::Generic => None,
        }
    }
}

impl fmt::Display for ServerErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ServerErrorKind::InvalidToken => "invalid token",
            ServerErrorKind::InvalidCode => "invalid code",
            ServerErrorKind::LoginTransactionNotFound => "login transaction not found",
            ServerErrorKind::DeviceAccountNotFound => "device account not found",
            ServerErrorKind::EnrollmentTransactionNotFound => "enrollment transaction not found",
            ServerErrorKind::Generic => "server error",
        };
        f.write_str(name)
    }
}

/// Error record as the server sends it.
///
/// `message` is the only required field: a body without it is treated as
/// unparseable rather than as a generic server error.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ServerErrorBody {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error_code: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status_code: Option<u16>,
}

/// A classified, well-formed error response.
///
/// Every kind carries the same fields, so callers can match on `kind` for
/// targeted recovery or read the fields uniformly for display.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{kind} (HTTP {status_code}): {message}")]
pub struct ServerError {
    pub kind: ServerErrorKind,
    pub error_code: Option<String>,
    pub error: Option<String>,
    pub message: String,
    pub status_code: u16,
}

impl ServerError {
    /// Classify a decoded error record. `http_status` is used when the body
    /// does not carry its own `statusCode`.
    pub fn from_body(body: ServerErrorBody, http_status: u16) -> Self {
        Self {
            kind: ServerErrorKind::from_code(body.error_code.as_deref()),
            status_code: body.status_code.unwrap_or(http_status),
            error_code: body.error_code,
            error: body.error,
            message: body.message,
        }
    }
}

/// Turn a non-2xx response into the matching `Error`.
///
/// The body is decoded with the same serializer used for successful
/// responses; if that fails the result is `Error::UnparseableServer`
/// carrying the response status.
pub fn parse_error_response<S: Serializer>(serializer: &S, response: &HttpResponse) -> Error {
    match serializer.deserialize::<ServerErrorBody>(&response.body) {
        Ok(body) => Error::Server(ServerError::from_body(body, response.status)),
        Err(source) => {
            warn!(
                status = response.status,
                error = %source,
                "error response body is not an error record"
            );
            Error::UnparseableServer {
                status_code: response.status,
                source,
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::serializer::JsonSerializer;
    use pretty_assertions::assert_eq;

    fn response(status: u16, body: &str) -> HttpResponse {
        HttpResponse {
            status,
            headers: Vec::new(),
            body: body.as_bytes().to_vec(),
        }
    }

    fn classify(status: u16, body: &str) -> Error {
        parse_error_response(&JsonSerializer, &response(status, body))
    }

    #[test]
    fn every_known_code_maps_to_its_kind() {
        let cases = [
            ("invalid_token", ServerErrorKind::InvalidToken),
            ("invalid_otp", ServerErrorKind::InvalidCode),
            ("login_transaction_not_found", ServerErrorKind::LoginTransactionNotFound),
            ("device_account_not_found", ServerErrorKind::DeviceAccountNotFound),
            (
                "enrollment_transaction_not_found",
                ServerErrorKind::EnrollmentTransactionNotFound,
            ),
        ];
        for (code, kind) in cases {
            let body = format!(
                r#"{{"errorCode":"{code}","error":"Unauthorized","message":"nope","statusCode":401}}"#
            );
            let err = classify(401, &body);
            let server = err.server_error().expect("server error");
            assert_eq!(server.kind, kind, "{code}");
            assert_eq!(server.error_code.as_deref(), Some(code));
            assert_eq!(server.error.as_deref(), Some("Unauthorized"));
            assert_eq!(server.message, "nope");
            assert_eq!(server.status_code, 401);
            assert_eq!(kind.code(), Some(code));
        }
    }

    #[test]
    fn unknown_code_is_generic() {
        let err = classify(
            400,
            r#"{"errorCode":"too_many_requests","error":"Bad Request","message":"slow down"}"#,
        );
        let server = err.server_error().unwrap();
        assert_eq!(server.kind, ServerErrorKind::Generic);
        assert_eq!(server.error_code.as_deref(), Some("too_many_requests"));
        assert_eq!(server.status_code, 400);
    }

    #[test]
    fn missing_code_is_generic() {
        let err = classify(403, r#"{"message":"forbidden"}"#);
        let server = err.server_error().unwrap();
        assert_eq!(server.kind, ServerErrorKind::Generic);
        assert!(server.error_code.is_none());
        assert!(server.error.is_none());
    }

    #[test]
    fn plain_text_body_is_unparseable() {
        let err = classify(500, "Internal Server Error");
        assert!(matches!(err, Error::UnparseableServer { status_code: 500, .. }));
        assert!(err.is_parse_failure());
        assert_eq!(err.status_code(), Some(500));
        assert!(err.server_error().is_none());
    }

    #[test]
    fn field_incomplete_body_is_unparseable() {
        let err = classify(404, r#"{"errorCode":"invalid_token"}"#);
        assert!(matches!(err, Error::UnparseableServer { status_code: 404, .. }));
    }

    #[test]
    fn empty_and_non_object_bodies_are_unparseable() {
        for body in ["", "[]", "\"oops\"", "null"] {
            let err = classify(502, body);
            assert!(
                matches!(err, Error::UnparseableServer { status_code: 502, .. }),
                "{body:?}"
            );
        }
    }

    #[test]
    fn body_status_code_wins_over_http_status() {
        let err = classify(400, r#"{"message":"m","statusCode":422}"#);
        assert_eq!(err.status_code(), Some(422));
    }

    #[test]
    fn display_includes_kind_status_and_message() {
        let err = classify(401, r#"{"errorCode":"invalid_otp","message":"wrong code"}"#);
        assert_eq!(err.to_string(), "invalid code (HTTP 401): wrong code");
    }
}
