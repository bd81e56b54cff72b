//! Pluggable wire format.
//!
//! # Design
//! The request builder, the call engine and the error classifier never touch
//! a concrete format; they only see a `Serializer`. Decoding is generic over
//! the target type, so the same serializer handles a single object, a
//! `Vec<T>` or an open `HashMap<String, Value>` without runtime type tokens.
//!
//! A serializer is stateless and shared behind an `Arc` by the client and
//! every call it creates.

use std::fmt;
use std::marker::PhantomData;

use serde::de::DeserializeOwned;
use serde::Serialize;

use crate::error::{ParseError, SerializeError};

/// Encodes request bodies and decodes response bodies.
pub trait Serializer: Send + Sync + 'static {
    /// Content type sent with encoded bodies.
    fn media_type(&self) -> &str;

    fn serialize<T>(&self, value: &T) -> Result<Vec<u8>, SerializeError>
    where
        T: Serialize + ?Sized;

    fn deserialize<T>(&self, bytes: &[u8]) -> Result<T, ParseError>
    where
        T: DeserializeOwned;

    /// A reusable decoder bound to the target type `T`.
    fn parser<T>(&self) -> Parser<'_, Self, T>
    where
        Self: Sized,
        T: DeserializeOwned,
    {
        Parser {
            serializer: self,
            target: PhantomData,
        }
    }
}

/// Decoder for one target type, created by `Serializer::parser`.
pub struct Parser<'a, S, T> {
    serializer: &'a S,
    target: PhantomData<fn() -> T>,
}

impl<S, T> Parser<'_, S, T>
where
    S: Serializer,
    T: DeserializeOwned,
{
    pub fn parse(&self, bytes: &[u8]) -> Result<T, ParseError> {
        self.serializer.deserialize(bytes)
    }
}

impl<S, T> fmt::Debug for Parser<'_, S, T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Parser")
            .field("target", &std::any::type_name::<T>())
            .finish()
    }
}

/// JSON via `serde_json`.
///
/// An empty (or all-whitespace) body decodes as `null`, so `()` and
/// `Option<T>` targets accept 204-style responses while struct targets
/// still fail.
#[derive(Debug, Clone, Copy, Default)]
pub struct JsonSerializer;

impl Serializer for JsonSerializer {
    fn media_type(&self) -> &str {
        "application/json; charset=utf-8"
    }

    fn serialize<T>(&self, value: &T) -> Result<Vec<u8>, SerializeError>
    where
        T: Serialize + ?Sized,
    {
        serde_json::to_vec(value).map_err(SerializeError::from_source)
    }

    fn deserialize<T>(&self, bytes: &[u8]) -> Result<T, ParseError>
    where
        T: DeserializeOwned,
    {
        let bytes = if bytes.iter().all(u8::is_ascii_whitespace) {
            b"null".as_slice()
        } else {
            bytes
        };
        serde_json::from_slice(bytes).map_err(ParseError::from_source)
    }
}
