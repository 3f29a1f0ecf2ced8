//! Request descriptors.
//!
//! A [`RequestConfig`] describes the remote call behind a slice: where it
//! goes, how payloads are renamed on the way out and how responses are
//! renamed on the way back. The declarative part deserializes from JSON;
//! override functions are attached with the builder.
//!
//! # Example
//!
//! ```
//! use request_slice_core::config::{HttpMethod, RequestConfig};
//!
//! let config = RequestConfig::from_json(r#"{
//!     "url": "https://api.example.com/todos",
//!     "method": "get",
//!     "pagination": true,
//!     "startPage": 1,
//!     "serializer": { "params": { "page": "_page" } }
//! }"#).unwrap();
//!
//! assert_eq!(config.method, HttpMethod::Get);
//! assert_eq!(config.start_page, Some(1));
//! ```

use crate::error::{ConfigError, RequestError};
use crate::transcode::{ErrorRecord, NestedRenameMap, RenameMap};
use futures::future::BoxFuture;
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

/// HTTP method of a request descriptor
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum HttpMethod {
    /// GET
    #[default]
    #[serde(alias = "GET")]
    Get,
    /// POST
    #[serde(alias = "POST")]
    Post,
    /// PUT
    #[serde(alias = "PUT")]
    Put,
    /// PATCH
    #[serde(alias = "PATCH")]
    Patch,
    /// DELETE
    #[serde(alias = "DELETE")]
    Delete,
    /// HEAD
    #[serde(alias = "HEAD")]
    Head,
}

impl HttpMethod {
    /// Uppercase wire name
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Get => "GET",
            Self::Post => "POST",
            Self::Put => "PUT",
            Self::Patch => "PATCH",
            Self::Delete => "DELETE",
            Self::Head => "HEAD",
        }
    }
}

impl fmt::Display for HttpMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Custom response parser: raw result → success action fields
pub type ParseFn = Arc<dyn Fn(Value) -> Result<Value, RequestError> + Send + Sync>;

/// Custom payload serializer: captured payload → request arguments
pub type SerializeFn = Arc<dyn Fn(Value) -> Result<Value, RequestError> + Send + Sync>;

/// Custom request: serialized payload → raw result
pub type RequestFn =
    Arc<dyn Fn(Value) -> BoxFuture<'static, Result<Value, RequestError>> + Send + Sync>;

/// Custom error normalization
pub type ErrorParseFn =
    Arc<dyn Fn(&RequestError) -> Result<ErrorRecord, serde_json::Error> + Send + Sync>;

/// How responses are turned into success action fields
#[derive(Clone)]
pub enum ParserSpec {
    /// Declarative rename (local ← remote)
    Rename(RenameMap),
    /// Arbitrary function
    Custom(ParseFn),
}

impl<'de> Deserialize<'de> for ParserSpec {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        RenameMap::deserialize(deserializer).map(Self::Rename)
    }
}

impl fmt::Debug for ParserSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Rename(map) => f.debug_tuple("Rename").field(map).finish(),
            Self::Custom(_) => f.write_str("Custom(<fn>)"),
        }
    }
}

/// How captured payloads are turned into request arguments
#[derive(Clone)]
pub enum SerializerSpec {
    /// Declarative rename (remote ← local), one map per top-level key
    Rename(NestedRenameMap),
    /// Arbitrary function
    Custom(SerializeFn),
}

impl<'de> Deserialize<'de> for SerializerSpec {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        NestedRenameMap::deserialize(deserializer).map(Self::Rename)
    }
}

impl fmt::Debug for SerializerSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Rename(map) => f.debug_tuple("Rename").field(map).finish(),
            Self::Custom(_) => f.write_str("Custom(<fn>)"),
        }
    }
}

/// Parser map used when a descriptor names none.
///
/// Lifts `max_page` to `maxPage` and strips the transport metadata
/// (`status`, `statusText`, `headers`, `config`, `request`) by mapping each
/// of those keys onto itself.
#[must_use]
pub fn default_response_map() -> RenameMap {
    RenameMap::new()
        .rename("maxPage", "max_page")
        .rename("status", "status")
        .rename("statusText", "statusText")
        .rename("headers", "headers")
        .rename("config", "config")
        .rename("request", "request")
}

/// Description of the remote call behind a slice.
#[derive(Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RequestConfig {
    /// Base URL; `/{id}` is appended when the payload carries an id
    #[serde(default)]
    pub url: String,

    /// HTTP method, GET when omitted
    #[serde(default)]
    pub method: HttpMethod,

    /// Headers sent with every call
    #[serde(default)]
    pub headers: BTreeMap<String, String>,

    /// Whether fetch slices merge the current page into the query
    #[serde(default)]
    pub pagination: bool,

    /// First page of a paginated fetch
    #[serde(default)]
    pub start_page: Option<i64>,

    /// Response parser, [`default_response_map`] when omitted
    #[serde(default)]
    pub parser: Option<ParserSpec>,

    /// Payload serializer, identity when omitted
    #[serde(default)]
    pub serializer: Option<SerializerSpec>,

    /// Replaces the transport-backed request entirely
    #[serde(skip)]
    pub request: Option<RequestFn>,

    /// Replaces the default error normalization
    #[serde(skip)]
    pub error_parser: Option<ErrorParseFn>,
}

impl fmt::Debug for RequestConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RequestConfig")
            .field("url", &self.url)
            .field("method", &self.method)
            .field("headers", &self.headers)
            .field("pagination", &self.pagination)
            .field("start_page", &self.start_page)
            .field("parser", &self.parser)
            .field("serializer", &self.serializer)
            .field("request", &self.request.as_ref().map(|_| "<fn>"))
            .field("error_parser", &self.error_parser.as_ref().map(|_| "<fn>"))
            .finish()
    }
}

impl RequestConfig {
    /// A GET descriptor for `url` with every other option at its default
    #[must_use]
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            ..Self::default()
        }
    }

    /// Parse and validate a JSON descriptor.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Parse`] for malformed JSON and
    /// [`ConfigError::Invalid`] when validation fails.
    pub fn from_json(raw: &str) -> Result<Self, ConfigError> {
        let config: Self = serde_json::from_str(raw)?;
        config.validate()?;
        Ok(config)
    }

    /// Set the HTTP method
    #[must_use]
    pub fn method(mut self, method: HttpMethod) -> Self {
        self.method = method;
        self
    }

    /// Add a header
    #[must_use]
    pub fn header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.insert(name.into(), value.into());
        self
    }

    /// Enable or disable pagination
    #[must_use]
    pub const fn pagination(mut self, enabled: bool) -> Self {
        self.pagination = enabled;
        self
    }

    /// Set the first page
    #[must_use]
    pub const fn start_page(mut self, page: i64) -> Self {
        self.start_page = Some(page);
        self
    }

    /// Use a declarative response parser
    #[must_use]
    pub fn parser_map(mut self, map: RenameMap) -> Self {
        self.parser = Some(ParserSpec::Rename(map));
        self
    }

    /// Use a custom response parser
    #[must_use]
    pub fn parser_fn<F>(mut self, parser: F) -> Self
    where
        F: Fn(Value) -> Result<Value, RequestError> + Send + Sync + 'static,
    {
        self.parser = Some(ParserSpec::Custom(Arc::new(parser)));
        self
    }

    /// Use a declarative payload serializer
    #[must_use]
    pub fn serializer_map(mut self, map: NestedRenameMap) -> Self {
        self.serializer = Some(SerializerSpec::Rename(map));
        self
    }

    /// Use a custom payload serializer
    #[must_use]
    pub fn serializer_fn<F>(mut self, serializer: F) -> Self
    where
        F: Fn(Value) -> Result<Value, RequestError> + Send + Sync + 'static,
    {
        self.serializer = Some(SerializerSpec::Custom(Arc::new(serializer)));
        self
    }

    /// Replace the transport-backed request
    #[must_use]
    pub fn request_fn<F>(mut self, request: F) -> Self
    where
        F: Fn(Value) -> BoxFuture<'static, Result<Value, RequestError>> + Send + Sync + 'static,
    {
        self.request = Some(Arc::new(request));
        self
    }

    /// Replace the default error normalization
    #[must_use]
    pub fn error_parser_fn<F>(mut self, error_parser: F) -> Self
    where
        F: Fn(&RequestError) -> Result<ErrorRecord, serde_json::Error> + Send + Sync + 'static,
    {
        self.error_parser = Some(Arc::new(error_parser));
        self
    }

    /// Check the descriptor can back a slice.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Invalid`] when the URL is empty and no request
    /// function replaces the transport, or when a header name is empty.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.url.trim().is_empty() && self.request.is_none() {
            return Err(ConfigError::Invalid(
                "url cannot be empty unless a request function is supplied".to_string(),
            ));
        }
        if self.headers.keys().any(|name| name.trim().is_empty()) {
            return Err(ConfigError::Invalid("header names cannot be empty".to_string()));
        }
        Ok(())
    }

    /// The descriptor with template defaults filled in.
    ///
    /// Only the parser has a non-trivial default ([`default_response_map`]).
    #[must_use]
    pub fn effective(&self) -> Self {
        let mut config = self.clone();
        if config.parser.is_none() {
            config.parser = Some(ParserSpec::Rename(default_response_map()));
        }
        config
    }

    /// `start_page` when truthy, i.e. set and non-zero
    #[must_use]
    pub fn first_page(&self) -> Value {
        self.start_page
            .filter(|page| *page != 0)
            .map_or(Value::Null, Value::from)
    }
}
