//! Request life-cycle templates.
//!
//! A template turns a namespace and a [`RequestConfig`] into a complete slice:
//! action constructors, a [`SliceReducer`](crate::slice::SliceReducer), a
//! [`SelectorSet`] and a saga [`Listener`], plus an [`Introspection`] record
//! describing what was built.
//!
//! | Template                  | Actions                                    |
//! |---------------------------|--------------------------------------------|
//! | [`async_template`]        | `{NAME}_{NS}_{START,SUCCESS,FAILED}`       |
//! | [`fetch_template`]        | `{NS}_FETCH_{START,...,CLEAR}`             |
//!
//! [`request_slice`] picks one by [`TemplateKind`].

use crate::action::{Action, ActionCreator, ActionSet, Cycle};
use crate::config::RequestConfig;
use crate::environment::Transport;
use crate::error::{ConfigError, RequestError};
use crate::listener::Listener;
use crate::selector::SelectorSet;
use crate::slice::{FieldReducer, build_field_reducer};
use crate::transcode::HttpPipeline;
use crate::value::is_truthy;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

pub mod async_template;
pub mod fetch;

pub use async_template::{AsyncActions, AsyncCycle, AsyncSlice, async_template};
pub use fetch::{FetchActions, FetchCycle, FetchSlice, fetch_template};

/// Cycles of a slice that goes through `start → success | failed`.
pub trait RequestCycle: Cycle {
    /// Request dispatched
    const START: Self;
    /// Request resolved
    const SUCCESS: Self;
    /// Request rejected
    const FAILED: Self;
}

/// What a template built, for debugging and composition.
#[derive(Debug, Clone)]
pub struct Introspection<C: Cycle> {
    /// Every action type of the slice
    pub base_actions: ActionSet<C>,
    /// Where the slice is expected to be mounted
    pub reducer_path: Option<String>,
    /// The descriptor with template defaults filled in
    pub request: RequestConfig,
}

/// Arguments of a `start` action.
///
/// ```
/// use request_slice_core::templates::RequestPayload;
/// use serde_json::json;
///
/// let payload = RequestPayload::new().id(7).params(json!({"expand": "owner"}));
/// assert_eq!(payload.into_value(), json!({"id": 7, "params": {"expand": "owner"}}));
/// ```
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RequestPayload {
    /// Resource id, appended to the URL
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<Value>,
    /// Query parameters
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub params: Option<Value>,
    /// Request body
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub body: Option<Value>,
}

impl RequestPayload {
    /// An empty payload
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the resource id
    #[must_use]
    pub fn id(mut self, id: impl Into<Value>) -> Self {
        self.id = Some(id.into());
        self
    }

    /// Set the query parameters; falsy values are dropped
    #[must_use]
    pub fn params(mut self, params: Value) -> Self {
        self.params = is_truthy(&params).then_some(params);
        self
    }

    /// Set the request body; falsy values are dropped
    #[must_use]
    pub fn body(mut self, body: Value) -> Self {
        self.body = is_truthy(&body).then_some(body);
        self
    }

    /// The payload as stored in slice state
    #[must_use]
    pub fn into_value(self) -> Value {
        let mut fields = Map::new();
        if let Some(id) = self.id {
            fields.insert("id".to_string(), id);
        }
        if let Some(params) = self.params {
            fields.insert("params".to_string(), params);
        }
        if let Some(body) = self.body {
            fields.insert("body".to_string(), body);
        }
        Value::Object(fields)
    }
}

/// Which template [`request_slice`] builds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TemplateKind {
    /// Async template named `get`
    Get,
    /// Async template named `create`
    Create,
    /// Async template named `edit`
    Edit,
    /// Async template named `delete`
    Delete,
    /// Paginated fetch template
    Fetch,
}

impl TemplateKind {
    /// Lowercase name, also the async action name
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Get => "get",
            Self::Create => "create",
            Self::Edit => "edit",
            Self::Delete => "delete",
            Self::Fetch => "fetch",
        }
    }
}

impl fmt::Display for TemplateKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for TemplateKind {
    type Err = ConfigError;

    fn from_str(raw: &str) -> Result<Self, Self::Err> {
        match raw {
            "get" => Ok(Self::Get),
            "create" => Ok(Self::Create),
            "edit" => Ok(Self::Edit),
            "delete" => Ok(Self::Delete),
            "fetch" => Ok(Self::Fetch),
            other => Err(ConfigError::Invalid(format!("unknown template '{other}'"))),
        }
    }
}

/// A slice built by [`request_slice`].
#[derive(Debug)]
pub enum RequestSlice {
    /// Built by the async template
    Async(AsyncSlice, Introspection<AsyncCycle>),
    /// Built by the fetch template
    Fetch(FetchSlice, Introspection<FetchCycle>),
}

impl RequestSlice {
    /// The slice's effect listener
    #[must_use]
    pub const fn saga(&self) -> &Listener {
        match self {
            Self::Async(slice, _) => &slice.saga,
            Self::Fetch(slice, _) => &slice.saga,
        }
    }

    /// The slice's selectors
    #[must_use]
    pub const fn selectors(&self) -> &SelectorSet {
        match self {
            Self::Async(slice, _) => &slice.selectors,
            Self::Fetch(slice, _) => &slice.selectors,
        }
    }

    /// Where the slice is expected to be mounted
    #[must_use]
    pub fn reducer_path(&self) -> Option<&str> {
        match self {
            Self::Async(_, info) => info.reducer_path.as_deref(),
            Self::Fetch(_, info) => info.reducer_path.as_deref(),
        }
    }
}

/// Build the slice for `kind`.
///
/// `get`, `create`, `edit` and `delete` build an async slice whose action
/// name is the kind; `fetch` builds a paginated fetch slice.
///
/// # Errors
///
/// Returns [`ConfigError`] when `config` does not validate.
pub fn request_slice(
    kind: TemplateKind,
    namespace: &str,
    config: RequestConfig,
    reducer_path: Option<&str>,
    transport: Arc<dyn Transport>,
) -> Result<RequestSlice, ConfigError> {
    match kind {
        TemplateKind::Fetch => {
            let (slice, info) = fetch_template(namespace, config, reducer_path, transport)?;
            Ok(RequestSlice::Fetch(slice, info))
        },
        TemplateKind::Get | TemplateKind::Create | TemplateKind::Edit | TemplateKind::Delete => {
            let (slice, info) =
                async_template(kind.as_str(), namespace, config, reducer_path, transport)?;
            Ok(RequestSlice::Async(slice, info))
        },
    }
}

/// `error`: set on failed, cleared on success, kept otherwise.
pub(crate) fn error_field<C: RequestCycle>() -> FieldReducer<C> {
    build_field_reducer(
        |_kind: Option<C>| true,
        |state, event| match event.kind {
            Some(kind) if kind == C::FAILED => event.param("error"),
            Some(kind) if kind == C::SUCCESS => Value::Null,
            _ => state,
        },
        None,
    )
}

/// `payload`: captured from start.
pub(crate) fn payload_field<C: RequestCycle>() -> FieldReducer<C> {
    build_field_reducer(
        |kind: Option<C>| kind == Some(C::START),
        |_state, event| event.param("payload"),
        None,
    )
}

/// `isLoading`: true on start, false on success and failed.
pub(crate) fn is_loading_field<C: RequestCycle>() -> FieldReducer<C> {
    build_field_reducer(
        |kind: Option<C>| {
            kind.is_some_and(|kind| kind == C::START || kind == C::SUCCESS || kind == C::FAILED)
        },
        |_state, event| Value::Bool(event.kind == Some(C::START)),
        None,
    )
}

/// Success action carrying the parsed result.
///
/// Object results are spread into the action, anything else lands under
/// `data`.
pub(crate) fn success_action(creator: &ActionCreator, parsed: Value) -> Action {
    match parsed {
        Value::Object(fields) => creator.create(Some(fields)),
        other => creator.event().with("data", other),
    }
}

/// Failed action for `error`, or `None` when the error cannot be normalized.
pub(crate) fn failed_action(
    pipeline: &HttpPipeline,
    creator: &ActionCreator,
    error: &RequestError,
    slice: &str,
) -> Option<Action> {
    tracing::warn!(slice, error = %error, "Request failed");
    match pipeline.normalize(error) {
        Ok(record) => Some(creator.event().with("error", record.to_value())),
        Err(normalize_error) => {
            tracing::error!(
                slice,
                error = %normalize_error,
                "Failed to normalize request error, no failed action dispatched"
            );
            None
        },
    }
}

/// Run the pipeline for one payload and turn the outcome into an action.
pub(crate) async fn settle(
    pipeline: &HttpPipeline,
    payload: Value,
    success: &ActionCreator,
    failed: &ActionCreator,
    slice: &str,
) -> Option<Action> {
    tracing::debug!(slice, "Dispatching request");
    match pipeline.perform(payload).await {
        Ok(parsed) => {
            tracing::debug!(slice, "Request succeeded");
            Some(success_action(success, parsed))
        },
        Err(error) => failed_action(pipeline, failed, &error, slice),
    }
}
