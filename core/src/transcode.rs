//! Request invocation and field renaming between slices and the wire.
//!
//! The effect routine of every template runs the same pipeline:
//!
//! ```text
//! payload ──serializer──▶ request args ──request──▶ raw result ──parser──▶ success fields
//!                                          │
//!                                          └── error ──error parser──▶ {message, log}
//! ```
//!
//! Both rename maps are written from the slice's point of view: each entry
//! maps a *local* name to the *remote* name used on the wire. The response
//! parser reads remote keys and writes local ones; the payload serializer
//! does the opposite.
//!
//! # Rename semantics
//!
//! Entries are applied in insertion order to a shallow copy of the input.
//! For each `(local, remote)` entry the value under the source key is copied
//! to the target key when it is present (truthy or exactly `0`), and the
//! source key is then removed unconditionally. An entry whose two names are
//! equal therefore strips that key, which is how the default parser map
//! removes transport metadata from the raw result.

use crate::config::{
    ErrorParseFn, HttpMethod, ParseFn, ParserSpec, RequestConfig, RequestFn, SerializeFn,
    SerializerSpec, default_response_map,
};
use crate::environment::{HttpRequest, Transport};
use crate::error::RequestError;
use crate::value::is_present;
use futures::future::BoxFuture;
use serde::de::{Deserialize, Deserializer, MapAccess, Visitor};
use serde::ser::{Serialize, SerializeMap, Serializer};
use serde_json::{Map, Value};
use std::collections::BTreeMap;
use std::fmt;
use std::marker::PhantomData;
use std::sync::Arc;

/// Ordered `local → remote` key renames for one object level.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct RenameMap {
    entries: Vec<(String, String)>,
}

impl RenameMap {
    /// An empty map
    #[must_use]
    pub const fn new() -> Self {
        Self { entries: Vec::new() }
    }

    /// Append an entry mapping `local` to `remote`.
    ///
    /// Entries are applied in the order they were added.
    #[must_use]
    pub fn rename(mut self, local: impl Into<String>, remote: impl Into<String>) -> Self {
        self.entries.push((local.into(), remote.into()));
        self
    }

    /// `(local, remote)` pairs in application order
    pub fn entries(&self) -> impl Iterator<Item = (&str, &str)> {
        self.entries.iter().map(|(local, remote)| (local.as_str(), remote.as_str()))
    }

    /// Whether the map has no entries
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Rename remote keys of `fields` to their local names.
    pub fn to_local(&self, fields: &mut Map<String, Value>) {
        for (local, remote) in &self.entries {
            rename_key(fields, remote, local);
        }
    }

    /// Rename local keys of `fields` to their remote names.
    pub fn to_remote(&self, fields: &mut Map<String, Value>) {
        for (local, remote) in &self.entries {
            rename_key(fields, local, remote);
        }
    }
}

fn rename_key(fields: &mut Map<String, Value>, source: &str, target: &str) {
    if let Some(value) = fields.get(source).filter(|value| is_present(value)).cloned() {
        fields.insert(target.to_string(), value);
    }
    // Same-key entries land here too and strip the key.
    fields.remove(source);
}

impl<K: Into<String>, V: Into<String>> FromIterator<(K, V)> for RenameMap {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        Self {
            entries: iter.into_iter().map(|(k, v)| (k.into(), v.into())).collect(),
        }
    }
}

/// Per-top-level-key rename maps, used by payload serializers.
///
/// `{"params": {"page": "_page"}}` renames `payload.params.page` to
/// `payload.params._page` and leaves every other key alone.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct NestedRenameMap {
    levels: Vec<(String, RenameMap)>,
}

impl NestedRenameMap {
    /// An empty map
    #[must_use]
    pub const fn new() -> Self {
        Self { levels: Vec::new() }
    }

    /// Add the rename map for one top-level key
    #[must_use]
    pub fn level(mut self, key: impl Into<String>, map: RenameMap) -> Self {
        self.levels.push((key.into(), map));
        self
    }

    /// `(top-level key, map)` pairs in application order
    pub fn levels(&self) -> impl Iterator<Item = (&str, &RenameMap)> {
        self.levels.iter().map(|(key, map)| (key.as_str(), map))
    }
}

// JSON object order is significant for rename maps, so they keep their own
// ordered (de)serialization instead of going through a BTreeMap.
struct OrderedEntries<V>(Vec<(String, V)>);

struct OrderedEntriesVisitor<V>(PhantomData<V>);

impl<'de, V: Deserialize<'de>> Visitor<'de> for OrderedEntriesVisitor<V> {
    type Value = OrderedEntries<V>;

    fn expecting(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        formatter.write_str("an object of field renames")
    }

    fn visit_map<A: MapAccess<'de>>(self, mut access: A) -> Result<Self::Value, A::Error> {
        let mut entries = Vec::with_capacity(access.size_hint().unwrap_or(0));
        while let Some((key, value)) = access.next_entry::<String, V>()? {
            entries.push((key, value));
        }
        Ok(OrderedEntries(entries))
    }
}

impl<'de, V: Deserialize<'de>> Deserialize<'de> for OrderedEntries<V> {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        deserializer.deserialize_map(OrderedEntriesVisitor(PhantomData))
    }
}

fn serialize_ordered<S: Serializer, V: Serialize>(
    entries: &[(String, V)],
    serializer: S,
) -> Result<S::Ok, S::Error> {
    let mut map = serializer.serialize_map(Some(entries.len()))?;
    for (key, value) in entries {
        map.serialize_entry(key, value)?;
    }
    map.end()
}

impl<'de> Deserialize<'de> for RenameMap {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        OrderedEntries::<String>::deserialize(deserializer)
            .map(|OrderedEntries(entries)| Self { entries })
    }
}

impl Serialize for RenameMap {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serialize_ordered(&self.entries, serializer)
    }
}

impl<'de> Deserialize<'de> for NestedRenameMap {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        OrderedEntries::<RenameMap>::deserialize(deserializer)
            .map(|OrderedEntries(levels)| Self { levels })
    }
}

impl Serialize for NestedRenameMap {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serialize_ordered(&self.levels, serializer)
    }
}

/// Apply a parser map to a raw result.
///
/// Falsy results and non-objects come back unchanged.
#[must_use]
pub fn parse_response(map: &RenameMap, raw: Value) -> Value {
    match raw {
        Value::Object(mut fields) => {
            map.to_local(&mut fields);
            Value::Object(fields)
        },
        other => other,
    }
}

/// Apply a nested serializer map to a payload.
///
/// Top-level keys named by the map are renamed one level down when they hold
/// an object; missing or non-object levels are left as they are.
#[must_use]
pub fn serialize_payload(map: &NestedRenameMap, payload: Value) -> Value {
    match payload {
        Value::Object(mut top) => {
            for (key, renames) in map.levels() {
                if let Some(Value::Object(level)) = top.get_mut(key) {
                    renames.to_remote(level);
                }
            }
            Value::Object(top)
        },
        other => other,
    }
}

/// Response parser backed by a declarative map.
#[must_use]
pub fn build_response_parser(map: RenameMap) -> ParseFn {
    Arc::new(move |raw: Value| -> Result<Value, RequestError> { Ok(parse_response(&map, raw)) })
}

/// Payload serializer backed by a declarative map.
#[must_use]
pub fn build_payload_serializer(map: NestedRenameMap) -> SerializeFn {
    Arc::new(move |payload: Value| -> Result<Value, RequestError> {
        Ok(serialize_payload(&map, payload))
    })
}

/// Request arguments read from a serialized payload.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RequestArgs {
    /// Appended to the base URL as `/{id}`
    pub id: Option<Value>,
    /// Query parameters
    pub params: Option<Value>,
    /// Request body
    pub body: Option<Value>,
}

impl RequestArgs {
    /// Read `{id, params, body}` from a payload; `null` and non-objects give
    /// empty arguments.
    #[must_use]
    pub fn from_payload(payload: &Value) -> Self {
        let field = |key: &str| payload.get(key).filter(|value| !value.is_null()).cloned();
        Self {
            id: field("id"),
            params: field("params"),
            body: field("body"),
        }
    }

    /// URL with the id segment appended when the id is present.
    ///
    /// `0` counts as present; `""` and `false` do not.
    #[must_use]
    pub fn resolve_url(&self, base: &str) -> String {
        match self.id.as_ref().filter(|id| is_present(id)) {
            Some(Value::String(id)) => format!("{base}/{id}"),
            Some(id) => format!("{base}/{id}"),
            None => base.to_string(),
        }
    }

    /// The full request for a descriptor's URL, method and headers
    #[must_use]
    pub fn into_request(
        self,
        base: &str,
        method: HttpMethod,
        headers: &BTreeMap<String, String>,
    ) -> HttpRequest {
        HttpRequest {
            url: self.resolve_url(base),
            method,
            headers: headers.clone(),
            params: self.params,
            data: self.body,
        }
    }
}

/// Transport-backed request for a descriptor.
///
/// Resolves with the raw result `{data, status, statusText, headers, config}`.
#[must_use]
pub fn build_request_invoker(config: &RequestConfig, transport: Arc<dyn Transport>) -> RequestFn {
    let url = config.url.clone();
    let method = config.method;
    let headers = config.headers.clone();

    Arc::new(move |payload: Value| -> BoxFuture<'static, Result<Value, RequestError>> {
        let request = RequestArgs::from_payload(&payload).into_request(&url, method, &headers);
        let transport = Arc::clone(&transport);
        Box::pin(async move {
            tracing::trace!(url = %request.url, method = %request.method, "Invoking transport");
            let response = transport.invoke(request.clone()).await?;
            Ok(response.into_value(&request))
        })
    })
}

/// Normalized error stored in slice state: `{message, log}`.
#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct ErrorRecord {
    /// Human readable message
    pub message: String,
    /// Every other serializable property of the error
    pub log: Value,
}

impl ErrorRecord {
    /// `{message, log}` as a JSON value
    #[must_use]
    pub fn to_value(&self) -> Value {
        serde_json::json!({"message": self.message, "log": self.log})
    }
}

/// Split an error into its message and a deep copy of its other properties.
///
/// # Errors
///
/// Returns the serializer error when the error cannot be represented as
/// JSON. Effect routines treat this as fatal.
pub fn normalize_error<E>(error: &E) -> Result<ErrorRecord, serde_json::Error>
where
    E: fmt::Display + Serialize + ?Sized,
{
    let mut log = serde_json::to_value(error)?;
    if let Value::Object(fields) = &mut log {
        fields.remove("message");
    }
    Ok(ErrorRecord {
        message: error.to_string(),
        log,
    })
}

/// The request, parser, serializer and error parser behind one slice.
#[derive(Clone)]
pub struct HttpPipeline {
    /// Serialized payload → raw result
    pub request: RequestFn,
    /// Raw result → success action fields
    pub parser: ParseFn,
    /// Captured payload → request arguments
    pub serializer: SerializeFn,
    /// Error → `{message, log}`
    pub error_parser: ErrorParseFn,
}

impl HttpPipeline {
    /// Assemble the pipeline, preferring the descriptor's overrides.
    #[must_use]
    pub fn from_config(config: &RequestConfig, transport: Arc<dyn Transport>) -> Self {
        let request = config
            .request
            .clone()
            .unwrap_or_else(|| build_request_invoker(config, transport));

        let parser_spec = config
            .parser
            .clone()
            .unwrap_or_else(|| ParserSpec::Rename(default_response_map()));
        let parser = match parser_spec {
            ParserSpec::Rename(map) => build_response_parser(map),
            ParserSpec::Custom(parser) => parser,
        };

        let serializer = match config.serializer.clone() {
            Some(SerializerSpec::Rename(map)) => build_payload_serializer(map),
            Some(SerializerSpec::Custom(serializer)) => serializer,
            None => Arc::new(|payload: Value| -> Result<Value, RequestError> { Ok(payload) }),
        };

        let error_parser = config
            .error_parser
            .clone()
            .unwrap_or_else(|| Arc::new(|error: &RequestError| normalize_error(error)));

        Self {
            request,
            parser,
            serializer,
            error_parser,
        }
    }

    /// Serialize, request and parse.
    ///
    /// # Errors
    ///
    /// Returns the first error raised by any stage.
    pub async fn perform(&self, payload: Value) -> Result<Value, RequestError> {
        let args = (self.serializer)(payload)?;
        let raw = (self.request)(args).await?;
        (self.parser)(raw)
    }

    /// Normalize a failure for the `failed` action.
    ///
    /// # Errors
    ///
    /// Propagates the error parser's failure.
    pub fn normalize(&self, error: &RequestError) -> Result<ErrorRecord, serde_json::Error> {
        (self.error_parser)(error)
    }
}

impl fmt::Debug for HttpPipeline {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HttpPipeline").finish_non_exhaustive()
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::environment::RawResponse;
    use proptest::prelude::*;
    use serde_json::json;
    use std::sync::Mutex;

    fn parse(map: &RenameMap, raw: Value) -> Value {
        parse_response(map, raw)
    }

    #[test]
    fn test_parser_renames_remote_keys() {
        let map = RenameMap::new().rename("page", "_page");

        assert_eq!(parse(&map, json!({"_page": 42})), json!({"page": 42}));
        assert_eq!(parse(&map, json!({"_page": 0})), json!({"page": 0}));
    }

    #[test]
    fn test_parser_drops_falsy_sources_without_setting_target() {
        let map = RenameMap::new().rename("page", "_page");

        assert_eq!(parse(&map, json!({"_page": null, "x": 1})), json!({"x": 1}));
        assert_eq!(parse(&map, json!({"_page": false})), json!({}));
    }

    #[test]
    fn test_parser_same_key_entry_strips_the_key() {
        let map = RenameMap::new().rename("status", "status");

        assert_eq!(parse(&map, json!({"status": 200, "data": [1]})), json!({"data": [1]}));
    }

    #[test]
    fn test_parser_passes_falsy_and_non_objects_through() {
        let map = RenameMap::new().rename("page", "_page");

        for raw in [Value::Null, json!(false), json!(""), json!([1, 2]), json!(7)] {
            assert_eq!(parse(&map, raw.clone()), raw);
        }
    }

    #[test]
    fn test_default_map_strips_transport_metadata() {
        let raw = RawResponse::new(200, json!([{"id": 1}])).into_value(&HttpRequest {
            url: "https://api.example.com/todos".to_string(),
            method: HttpMethod::Get,
            headers: BTreeMap::new(),
            params: None,
            data: None,
        });
        let mut with_page = raw;
        with_page["max_page"] = json!(5);

        assert_eq!(
            parse(&default_response_map(), with_page),
            json!({"data": [{"id": 1}], "maxPage": 5})
        );
    }

    #[test]
    fn test_serializer_renames_one_level_down() {
        let map: NestedRenameMap =
            serde_json::from_value(json!({"params": {"page": "_page"}})).unwrap();

        assert_eq!(
            serialize_payload(&map, json!({"params": {"page": 42, "token": "abc"}})),
            json!({"params": {"_page": 42, "token": "abc"}})
        );
        assert_eq!(
            serialize_payload(&map, json!({"body": {"page": 1}})),
            json!({"body": {"page": 1}})
        );
        assert_eq!(serialize_payload(&map, json!({"params": null})), json!({"params": null}));
    }

    #[test]
    fn test_rename_maps_keep_json_order() {
        let map: RenameMap = serde_json::from_str(r#"{"z": "a", "b": "y", "m": "m"}"#).unwrap();

        assert_eq!(map.entries().collect::<Vec<_>>(), vec![("z", "a"), ("b", "y"), ("m", "m")]);
        assert_eq!(serde_json::to_string(&map).unwrap(), r#"{"z":"a","b":"y","m":"m"}"#);
    }

    #[test]
    fn test_request_args() {
        let args = RequestArgs::from_payload(&json!({"id": 0, "params": {"q": "x"}, "body": null}));

        assert_eq!(args.resolve_url("https://api/users"), "https://api/users/0");
        assert_eq!(args.params, Some(json!({"q": "x"})));
        assert_eq!(args.body, None);

        assert_eq!(RequestArgs::from_payload(&Value::Null), RequestArgs::default());
        assert_eq!(
            RequestArgs::from_payload(&json!({"id": "abc"})).resolve_url("https://api/users"),
            "https://api/users/abc"
        );
        assert_eq!(
            RequestArgs::from_payload(&json!({"id": ""})).resolve_url("https://api/users"),
            "https://api/users"
        );
    }

    #[test]
    fn test_normalize_error_splits_message_from_log() {
        #[derive(serde::Serialize)]
        struct Failure {
            message: String,
            status: u16,
            extra: String,
        }

        impl fmt::Display for Failure {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(&self.message)
            }
        }

        let record = normalize_error(&Failure {
            message: "x".to_string(),
            status: 404,
            extra: "y".to_string(),
        })
        .unwrap();

        assert_eq!(record.message, "x");
        assert_eq!(record.log, json!({"status": 404, "extra": "y"}));
        assert_eq!(
            record.to_value(),
            json!({"message": "x", "log": {"status": 404, "extra": "y"}})
        );
    }

    #[test]
    fn test_normalize_request_error() {
        let record = normalize_error(&RequestError::Network {
            message: "connection refused".to_string(),
        })
        .unwrap();

        assert_eq!(record.message, "Network error: connection refused");
        assert_eq!(record.log, json!({"kind": "network"}));
    }

    struct RecordingTransport {
        seen: Mutex<Vec<HttpRequest>>,
    }

    impl Transport for RecordingTransport {
        fn invoke(&self, request: HttpRequest) -> BoxFuture<'_, Result<RawResponse, RequestError>> {
            self.seen.lock().unwrap().push(request);
            let body = json!({"items": [1, 2], "total_pages": 3});
            Box::pin(async move { Ok(RawResponse::new(200, body)) })
        }
    }

    #[tokio::test]
    async fn test_pipeline_runs_every_stage() {
        let transport = Arc::new(RecordingTransport { seen: Mutex::new(Vec::new()) });
        let config = RequestConfig::new("https://api/todos")
            .header("Accept", "application/json")
            .serializer_map(
                NestedRenameMap::new().level("params", RenameMap::new().rename("page", "_page")),
            )
            .parser_fn(|raw| {
                let body = raw.get("data").cloned().unwrap_or(Value::Null);
                Ok(parse_response(&RenameMap::new().rename("maxPage", "total_pages"), body))
            });
        let pipeline = HttpPipeline::from_config(&config, transport.clone());

        let parsed = pipeline
            .perform(json!({"id": 7, "params": {"page": 2}}))
            .await
            .unwrap();

        assert_eq!(parsed, json!({"items": [1, 2], "maxPage": 3}));
        let seen = transport.seen.lock().unwrap();
        assert_eq!(seen.len(), 1);
        assert_eq!(seen[0].url, "https://api/todos/7");
        assert_eq!(seen[0].params, Some(json!({"_page": 2})));
        assert_eq!(seen[0].headers.get("Accept").map(String::as_str), Some("application/json"));
    }

    #[tokio::test]
    async fn test_pipeline_prefers_request_override() {
        let transport = Arc::new(RecordingTransport { seen: Mutex::new(Vec::new()) });
        let config = RequestConfig::new("https://api/todos")
            .request_fn(|_payload| Box::pin(async { Err(RequestError::custom("offline")) }));
        let pipeline = HttpPipeline::from_config(&config, transport.clone());

        let error = pipeline.perform(Value::Null).await.unwrap_err();

        assert_eq!(error, RequestError::custom("offline"));
        assert!(transport.seen.lock().unwrap().is_empty());
        assert_eq!(pipeline.normalize(&error).unwrap().message, "offline");
    }

    proptest! {
        #[test]
        fn prop_parse_then_reverse_restores_remote_keys(
            pairs in prop::collection::btree_map("[a-z]{1,8}", 1i64..1000, 1..8)
        ) {
            let map: RenameMap =
                pairs.keys().map(|k| (format!("local_{k}"), format!("remote_{k}"))).collect();
            let raw: Map<String, Value> =
                pairs.iter().map(|(k, v)| (format!("remote_{k}"), json!(v))).collect();

            let Value::Object(mut parsed) = parse_response(&map, Value::Object(raw.clone())) else {
                unreachable!("objects parse to objects");
            };
            prop_assert!(parsed.keys().all(|k| k.starts_with("local_")));

            map.to_remote(&mut parsed);
            prop_assert_eq!(parsed, raw);
        }
    }
}
