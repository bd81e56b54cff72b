//! Fluent request builder and the immutable plan it produces.
//!
//! # Design
//! `RequestBuilder` never fails mid-chain. The first configuration error is
//! recorded and every later step becomes a no-op; `build()` then returns
//! that error. A successful `build()` yields a `Call` wrapping a
//! `RequestPlan`, which is read-only from then on and may be executed any
//! number of times.
//!
//! Body values are stored as `serde_json::Value`. That model is itself
//! `Serialize`, so whichever `Serializer` the client uses encodes it at
//! execution time.

use std::fmt;

use serde::Serialize;
use serde_json::{Map, Value};
use ureq::http::{HeaderName, HeaderValue};
use url::Url;

use crate::call::{Call, Decode};
use crate::client::Client;
use crate::error::ConfigError;
use crate::http::HttpMethod;
use crate::serializer::Serializer;

/// The two mutually exclusive ways of supplying a request body.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BodyKind {
    Object,
    Parameters,
}

impl fmt::Display for BodyKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BodyKind::Object => f.write_str("a single object"),
            BodyKind::Parameters => f.write_str("named parameters"),
        }
    }
}

/// Logical request body, before encoding.
#[derive(Debug, Clone, PartialEq, Default)]
pub enum Body {
    #[default]
    None,
    Object(Value),
    Parameters(Map<String, Value>),
}

impl Body {
    pub fn kind(&self) -> Option<BodyKind> {
        match self {
            Body::None => None,
            Body::Object(_) => Some(BodyKind::Object),
            Body::Parameters(_) => Some(BodyKind::Parameters),
        }
    }
}

/// Fully resolved description of one HTTP call.
#[derive(Debug, Clone, PartialEq)]
pub struct RequestPlan {
    method: HttpMethod,
    path: String,
    url: Url,
    headers: Vec<(String, String)>,
    query: Vec<(String, String)>,
    body: Body,
}

impl RequestPlan {
    pub fn method(&self) -> HttpMethod {
        self.method
    }

    pub fn path(&self) -> &str {
        &self.path
    }

    /// Base address, path and encoded query parameters.
    pub fn url(&self) -> &Url {
        &self.url
    }

    pub fn headers(&self) -> &[(String, String)] {
        &self.headers
    }

    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(key, _)| key.eq_ignore_ascii_case(name))
            .map(|(_, value)| value.as_str())
    }

    pub fn query(&self) -> &[(String, String)] {
        &self.query
    }

    pub fn body(&self) -> &Body {
        &self.body
    }
}

/// Accumulates one request against a client's base address.
///
/// Created by `Client::new_request`. `T` is the declared response type.
pub struct RequestBuilder<S, T> {
    client: Client<S>,
    decode: Decode<S, T>,
    method: Option<HttpMethod>,
    path: String,
    headers: Vec<(String, String)>,
    query: Vec<(String, String)>,
    body: Body,
    error: Option<ConfigError>,
}

impl<S: Serializer, T> RequestBuilder<S, T> {
    pub(crate) fn new(client: Client<S>, decode: Decode<S, T>) -> Self {
        Self {
            client,
            decode,
            method: None,
            path: String::new(),
            headers: Vec::new(),
            query: Vec::new(),
            body: Body::None,
            error: None,
        }
    }

    /// Set the method and the path appended to the base address.
    ///
    /// GET and DELETE requests reject any body, whether it was set before or
    /// after this call.
    pub fn method_and_path(mut self, method: HttpMethod, path: impl Into<String>) -> Self {
        if self.error.is_some() {
            return self;
        }
        if self.body.kind().is_some() && !method.allows_body() {
            return self.fail(ConfigError::BodyNotAllowed { method });
        }
        self.method = Some(method);
        self.path = path.into();
        self
    }

    /// `method_and_path` followed by `body`.
    pub fn method_and_path_with_body<B>(
        self,
        method: HttpMethod,
        path: impl Into<String>,
        body: &B,
    ) -> Self
    where
        B: Serialize + ?Sized,
    {
        self.method_and_path(method, path).body(body)
    }

    pub fn get(self, path: impl Into<String>) -> Self {
        self.method_and_path(HttpMethod::Get, path)
    }

    pub fn post(self, path: impl Into<String>) -> Self {
        self.method_and_path(HttpMethod::Post, path)
    }

    pub fn put(self, path: impl Into<String>) -> Self {
        self.method_and_path(HttpMethod::Put, path)
    }

    pub fn patch(self, path: impl Into<String>) -> Self {
        self.method_and_path(HttpMethod::Patch, path)
    }

    pub fn delete(self, path: impl Into<String>) -> Self {
        self.method_and_path(HttpMethod::Delete, path)
    }

    /// Use `value` as the whole request body. Replaces an earlier object
    /// body; conflicts with named parameters.
    pub fn body<B>(mut self, value: &B) -> Self
    where
        B: Serialize + ?Sized,
    {
        if self.error.is_some() {
            return self;
        }
        if let Some(err) = self.check_body_slot(BodyKind::Object) {
            return self.fail(err);
        }
        match serde_json::to_value(value) {
            Ok(value) => {
                self.body = Body::Object(value);
                self
            }
            Err(err) => self.fail(ConfigError::InvalidValue {
                name: "body".to_string(),
                reason: err.to_string(),
            }),
        }
    }

    /// Add one named body parameter. A later value for the same name
    /// replaces the earlier one; conflicts with an object body.
    pub fn parameter<V>(mut self, name: impl Into<String>, value: V) -> Self
    where
        V: Serialize,
    {
        if self.error.is_some() {
            return self;
        }
        if let Some(err) = self.check_body_slot(BodyKind::Parameters) {
            return self.fail(err);
        }
        let name = name.into();
        let value = match serde_json::to_value(value) {
            Ok(value) => value,
            Err(err) => {
                return self.fail(ConfigError::InvalidValue {
                    name,
                    reason: err.to_string(),
                })
            }
        };
        match &mut self.body {
            Body::Parameters(params) => {
                params.insert(name, value);
            }
            body => {
                let mut params = Map::new();
                params.insert(name, value);
                *body = Body::Parameters(params);
            }
        }
        self
    }

    /// Add a query parameter; a later value for the same name wins.
    pub fn query(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        if self.error.is_none() {
            upsert(&mut self.query, name.into(), value.into(), false);
        }
        self
    }

    /// Add a header; a later value for the same (case-insensitive) name wins.
    pub fn header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        if self.error.is_some() {
            return self;
        }
        let (name, value) = (name.into(), value.into());
        if let Err(err) = check_header(&name, &value) {
            return self.fail(err);
        }
        upsert(&mut self.headers, name, value, true);
        self
    }

    /// `Authorization: Bearer <token>`.
    pub fn bearer_token(self, token: &str) -> Self {
        self.header("Authorization", format!("Bearer {token}"))
    }

    /// Resolve the plan, or report the first configuration error.
    pub fn build(self) -> Result<Call<S, T>, ConfigError> {
        if let Some(err) = self.error {
            return Err(err);
        }
        let method = self.method.ok_or(ConfigError::MissingMethod)?;
        let url = resolve_url(self.client.base_url(), &self.path, &self.query)?;

        let mut headers = self.client.default_headers().to_vec();
        for (name, value) in self.headers {
            upsert(&mut headers, name, value, true);
        }
        if !headers.iter().any(|(name, _)| name.eq_ignore_ascii_case("accept")) {
            let media_type = self.client.serializer().media_type().to_string();
            headers.push(("Accept".to_string(), media_type));
        }

        let plan = RequestPlan {
            method,
            path: self.path,
            url,
            headers,
            query: self.query,
            body: self.body,
        };
        Ok(Call::new(self.client, plan, self.decode))
    }

    fn check_body_slot(&self, attempted: BodyKind) -> Option<ConfigError> {
        if let Some(method) = self.method {
            if !method.allows_body() {
                return Some(ConfigError::BodyNotAllowed { method });
            }
        }
        match self.body.kind() {
            Some(existing) if existing != attempted => Some(ConfigError::ConflictingBody {
                existing,
                attempted,
            }),
            _ => None,
        }
    }

    fn fail(mut self, err: ConfigError) -> Self {
        self.error.get_or_insert(err);
        self
    }
}

impl<S, T> fmt::Debug for RequestBuilder<S, T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RequestBuilder")
            .field("method", &self.method)
            .field("path", &self.path)
            .field("headers", &self.headers)
            .field("query", &self.query)
            .field("body", &self.body)
            .field("error", &self.error)
            .finish_non_exhaustive()
    }
}

/// Validate an absolute http(s) base address.
pub(crate) fn parse_base_url(raw: &str) -> Result<Url, ConfigError> {
    let invalid = |reason: String| ConfigError::InvalidBaseUrl {
        url: raw.to_string(),
        reason,
    };
    let url = Url::parse(raw).map_err(|err| invalid(err.to_string()))?;
    if !matches!(url.scheme(), "http" | "https") {
        return Err(invalid(format!("unsupported scheme `{}`", url.scheme())));
    }
    if url.host_str().is_none() {
        return Err(invalid("missing host".to_string()));
    }
    if url.query().is_some() || url.fragment().is_some() {
        return Err(invalid("query and fragment are not allowed".to_string()));
    }
    Ok(url)
}

/// Reject header names and values the HTTP layer would refuse to send.
pub(crate) fn check_header(name: &str, value: &str) -> Result<(), ConfigError> {
    let invalid = |reason: String| ConfigError::InvalidHeader {
        name: name.to_string(),
        reason,
    };
    HeaderName::from_bytes(name.as_bytes()).map_err(|err| invalid(err.to_string()))?;
    HeaderValue::from_str(value).map_err(|err| invalid(err.to_string()))?;
    Ok(())
}

fn resolve_url(base: &Url, path: &str, query: &[(String, String)]) -> Result<Url, ConfigError> {
    let joined = format!(
        "{}/{}",
        base.as_str().trim_end_matches('/'),
        path.trim_start_matches('/')
    );
    let mut url = Url::parse(&joined).map_err(|err| ConfigError::InvalidPath {
        path: path.to_string(),
        reason: err.to_string(),
    })?;
    if !query.is_empty() {
        let mut pairs = url.query_pairs_mut();
        for (name, value) in query {
            pairs.append_pair(name, value);
        }
    }
    Ok(url)
}

fn upsert(entries: &mut Vec<(String, String)>, name: String, value: String, ignore_case: bool) {
    let existing = entries.iter_mut().find(|(key, _)| {
        if ignore_case {
            key.eq_ignore_ascii_case(&name)
        } else {
            *key == name
        }
    });
    match existing {
        Some(entry) => entry.1 = value,
        None => entries.push((name, value)),
    }
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeMap;

    use pretty_assertions::assert_eq;
    use serde_json::json;

    use super::*;
    use crate::client::Client;
    use crate::serializer::JsonSerializer;

    fn client() -> Client<JsonSerializer> {
        Client::new("http://localhost:3000").unwrap()
    }

    fn plan(builder: RequestBuilder<JsonSerializer, Value>) -> RequestPlan {
        builder.build().unwrap().plan().clone()
    }

    #[test]
    fn path_is_appended_to_base_address() {
        let plan = plan(client().new_request().get("/api/tenant-info"));
        assert_eq!(plan.method(), HttpMethod::Get);
        assert_eq!(plan.url().as_str(), "http://localhost:3000/api/tenant-info");
        assert_eq!(plan.body(), &Body::None);
    }

    #[test]
    fn base_path_and_slashes_are_joined_once() {
        let client = Client::new("https://auth.example.com/tenant/").unwrap();
        let plan = client
            .new_request::<Value>()
            .get("api/tenant-info")
            .build()
            .unwrap()
            .plan()
            .clone();
        assert_eq!(
            plan.url().as_str(),
            "https://auth.example.com/tenant/api/tenant-info"
        );
    }

    #[test]
    fn query_parameters_are_encoded_and_overwritten() {
        let plan = plan(
            client()
                .new_request()
                .get("/api/search")
                .query("q", "a b")
                .query("page", "1")
                .query("q", "c&d"),
        );
        assert_eq!(
            plan.query(),
            &[
                ("q".to_string(), "c&d".to_string()),
                ("page".to_string(), "1".to_string())
            ]
        );
        assert_eq!(
            plan.url().as_str(),
            "http://localhost:3000/api/search?q=c%26d&page=1"
        );
    }

    #[test]
    fn headers_keep_order_and_last_write_wins() {
        let plan = plan(
            client()
                .new_request()
                .get("/x")
                .header("X-One", "1")
                .header("X-Two", "2")
                .header("x-one", "3"),
        );
        assert_eq!(
            plan.headers(),
            &[
                ("X-One".to_string(), "3".to_string()),
                ("X-Two".to_string(), "2".to_string()),
                ("Accept".to_string(), "application/json; charset=utf-8".to_string()),
            ]
        );
    }

    #[test]
    fn bearer_token_sets_authorization() {
        let plan = plan(
            client()
                .new_request()
                .post("/api/verify-otp")
                .bearer_token("OLD")
                .bearer_token("TX_TOKEN"),
        );
        assert_eq!(plan.header("authorization"), Some("Bearer TX_TOKEN"));
    }

    #[test]
    fn explicit_accept_is_kept() {
        let plan = plan(client().new_request().get("/x").header("accept", "text/plain"));
        assert_eq!(plan.header("Accept"), Some("text/plain"));
        assert_eq!(plan.headers().len(), 1);
    }

    #[test]
    fn parameters_accumulate_into_a_map() {
        let plan = plan(
            client()
                .new_request()
                .post("/api/verify-otp")
                .parameter("type", "push_notification")
                .parameter("code", "000000")
                .parameter("code", "123456"),
        );
        let Body::Parameters(params) = plan.body() else {
            panic!("expected parameters, got {:?}", plan.body());
        };
        assert_eq!(params.len(), 2);
        assert_eq!(params["code"], "123456");
        assert_eq!(params["type"], "push_notification");
    }

    #[test]
    fn object_body_with_method() {
        let mut body = BTreeMap::new();
        body.insert("enabled", true);
        let plan = plan(client().new_request().method_and_path_with_body(
            HttpMethod::Patch,
            "/api/device-accounts/1",
            &body,
        ));
        assert_eq!(plan.body(), &Body::Object(json!({"enabled": true})));
    }

    #[test]
    fn object_after_parameters_conflicts() {
        let err = client()
            .new_request::<Value>()
            .post("/x")
            .parameter("a", 1)
            .body(&json!({"b": 2}))
            .build()
            .unwrap_err();
        assert_eq!(
            err,
            ConfigError::ConflictingBody {
                existing: BodyKind::Parameters,
                attempted: BodyKind::Object,
            }
        );
    }

    #[test]
    fn parameters_after_object_conflicts() {
        let err = client()
            .new_request::<Value>()
            .put("/x")
            .body("plain")
            .parameter("a", 1)
            .build()
            .unwrap_err();
        assert_eq!(
            err,
            ConfigError::ConflictingBody {
                existing: BodyKind::Object,
                attempted: BodyKind::Parameters,
            }
        );
    }

    #[test]
    fn first_error_is_reported() {
        let err = client()
            .new_request::<Value>()
            .get("/x")
            .parameter("a", 1)
            .body(&1)
            .build()
            .unwrap_err();
        assert_eq!(
            err,
            ConfigError::BodyNotAllowed {
                method: HttpMethod::Get
            }
        );
    }

    #[test]
    fn get_and_delete_reject_bodies_set_earlier() {
        for method in [HttpMethod::Get, HttpMethod::Delete] {
            let err = client()
                .new_request::<Value>()
                .parameter("a", 1)
                .method_and_path(method, "/x")
                .build()
                .unwrap_err();
            assert_eq!(err, ConfigError::BodyNotAllowed { method });
        }
    }

    #[test]
    fn missing_method_fails_at_build() {
        let err = client().new_request::<Value>().build().unwrap_err();
        assert_eq!(err, ConfigError::MissingMethod);
    }

    #[test]
    fn unencodable_parameter_is_rejected() {
        let mut bad = BTreeMap::new();
        bad.insert((1, 2), "tuple keys are not strings");
        let err = client()
            .new_request::<Value>()
            .post("/x")
            .parameter("bad", bad)
            .build()
            .unwrap_err();
        assert!(matches!(err, ConfigError::InvalidValue { name, .. } if name == "bad"));
    }

    #[test]
    fn base_url_validation() {
        assert!(parse_base_url("https://tenant.example.com").is_ok());
        assert!(parse_base_url("https://tenant.example.com/tenant/").is_ok());
        for bad in [
            "not a url",
            "ftp://example.com",
            "mailto:a@b.c",
            "/relative",
            "http://localhost:3000/tenant?region=eu",
            "http://localhost:3000/tenant#top",
        ] {
            let err = parse_base_url(bad).unwrap_err();
            assert!(matches!(err, ConfigError::InvalidBaseUrl { .. }), "{bad}");
        }
    }

    #[test]
    fn invalid_headers_fail_at_build_time() {
        let err = client()
            .new_request::<Value>()
            .get("/x")
            .header("Bad Header", "v")
            .build()
            .unwrap_err();
        assert!(
            matches!(&err, ConfigError::InvalidHeader { name, .. } if name == "Bad Header"),
            "{err:?}"
        );

        let err = client()
            .new_request::<Value>()
            .get("/x")
            .header("X-Trace", "line\nbreak")
            .build()
            .unwrap_err();
        assert!(matches!(err, ConfigError::InvalidHeader { .. }), "{err:?}");

        let plan = plan(client().new_request().get("/x").header("X-Trace", "abc"));
        assert_eq!(plan.header("x-trace"), Some("abc"));
    }
}
