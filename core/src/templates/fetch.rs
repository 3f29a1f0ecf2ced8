//! Paginated collection slice.
//!
//! Besides the request life cycle, the collection can be mutated locally
//! without going through the network:
//!
//! | Action    | `data`                         | `page`                    |
//! |-----------|--------------------------------|---------------------------|
//! | `start`   | `[]`                           | first page                |
//! | `success` | incoming items appended        | kept                      |
//! | `more`    | kept                           | `+1` (`null` counts as 0) |
//! | `unshift` | item appended at the **end**   | kept                      |
//! | `push`    | item prepended at the **start**| kept                      |
//! | `remove`  | every equal item dropped       | kept                      |
//! | `clear`   | `[]`                           | kept                      |
//!
//! `unshift` and `push` are named after the slice's public API, not after
//! the array operation they perform.
//!
//! The saga listens for both `start` and `more`. It reads the captured
//! `payload` (and the current `page` when pagination is enabled) from the
//! slice's own selectors, so `more` always repeats the last started query.
//! A `more` with no captured query fails with
//! [`RequestError::MissingPayload`]; a `start` without a payload is sent
//! without arguments.

use super::{
    Introspection, RequestCycle, error_field, failed_action, is_loading_field, payload_field,
    settle,
};
use crate::action::{Action, ActionSet, Cycle};
use crate::config::RequestConfig;
use crate::environment::Transport;
use crate::error::{ConfigError, RequestError};
use crate::listener::{Listener, SharedState, TriggerMode, build_listener, wrap_effect_routine};
use crate::selector::{SelectorSet, build_selector_set};
use crate::slice::{SliceDescriptor, SliceEvent, SliceReducer, combine_slice_reducer};
use crate::transcode::HttpPipeline;
use crate::value::is_truthy;
use serde_json::{Map, Value};
use std::sync::Arc;

/// Life-cycle phases of a fetch slice
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum FetchCycle {
    /// First page requested, collection reset
    Start,
    /// Page received
    Success,
    /// Request rejected
    Failed,
    /// Next page requested
    More,
    /// Item appended at the end
    Unshift,
    /// Item prepended at the start
    Push,
    /// Item removed
    Remove,
    /// Collection emptied
    Clear,
}

impl Cycle for FetchCycle {
    fn all() -> &'static [Self] {
        &[
            Self::Start,
            Self::Success,
            Self::Failed,
            Self::More,
            Self::Unshift,
            Self::Push,
            Self::Remove,
            Self::Clear,
        ]
    }

    fn suffix(self) -> &'static str {
        match self {
            Self::Start => "start",
            Self::Success => "success",
            Self::Failed => "failed",
            Self::More => "more",
            Self::Unshift => "unshift",
            Self::Push => "push",
            Self::Remove => "remove",
            Self::Clear => "clear",
        }
    }
}

impl RequestCycle for FetchCycle {
    const START: Self = Self::Start;
    const SUCCESS: Self = Self::Success;
    const FAILED: Self = Self::Failed;
}

/// Public actions of a fetch slice.
#[derive(Clone, Debug)]
pub struct FetchActions {
    set: ActionSet<FetchCycle>,
}

impl FetchActions {
    /// Start a new query; falsy `params` and `body` are left out of the payload
    #[must_use]
    pub fn fetch(&self, params: Option<Value>, body: Option<Value>) -> Action {
        let mut payload = Map::new();
        if let Some(params) = params.filter(is_truthy) {
            payload.insert("params".to_string(), params);
        }
        if let Some(body) = body.filter(is_truthy) {
            payload.insert("body".to_string(), body);
        }
        self.set
            .creator(FetchCycle::Start)
            .event()
            .with("payload", Value::Object(payload))
    }

    /// Request the next page of the last query
    #[must_use]
    pub fn more(&self) -> Action {
        self.set.creator(FetchCycle::More).event()
    }

    /// Prepend `item`
    #[must_use]
    pub fn push(&self, item: Value) -> Action {
        self.with_data(FetchCycle::Push, item)
    }

    /// Append `item`
    #[must_use]
    pub fn unshift(&self, item: Value) -> Action {
        self.with_data(FetchCycle::Unshift, item)
    }

    /// Drop every element equal to `item`
    #[must_use]
    pub fn remove(&self, item: Value) -> Action {
        self.with_data(FetchCycle::Remove, item)
    }

    /// Empty the collection
    #[must_use]
    pub fn clear(&self) -> Action {
        self.set.creator(FetchCycle::Clear).event()
    }

    /// `{type: SUCCESS, data, maxPage?}`, as the saga would dispatch it
    #[must_use]
    pub fn success(&self, data: Value, max_page: Option<i64>) -> Action {
        let action = self.with_data(FetchCycle::Success, data);
        match max_page {
            Some(max_page) => action.with("maxPage", Value::from(max_page)),
            None => action,
        }
    }

    /// The underlying action set
    #[must_use]
    pub const fn set(&self) -> &ActionSet<FetchCycle> {
        &self.set
    }

    fn with_data(&self, cycle: FetchCycle, data: Value) -> Action {
        self.set.creator(cycle).event().with("data", data)
    }
}

/// Everything a fetch template builds.
#[derive(Clone, Debug)]
pub struct FetchSlice {
    /// Action constructors
    pub actions: FetchActions,
    /// Slice reducer, to be mounted at the introspected path
    pub reducer: SliceReducer<FetchCycle>,
    /// One selector per field
    pub selectors: SelectorSet,
    /// Runs the request for every start and more
    pub saga: Listener,
}

fn items(state: Value) -> Vec<Value> {
    match state {
        Value::Array(items) => items,
        _ => Vec::new(),
    }
}

fn reduce_data(state: Value, event: &SliceEvent<'_, FetchCycle>) -> Value {
    let incoming = event.param("data");
    match event.kind {
        Some(FetchCycle::Success) => {
            let mut current = items(state);
            match incoming {
                Value::Array(page) => current.extend(page),
                Value::Null => {},
                item => current.push(item),
            }
            Value::Array(current)
        },
        Some(FetchCycle::Start | FetchCycle::Clear) => Value::Array(Vec::new()),
        Some(FetchCycle::Unshift) => {
            let mut current = items(state);
            current.push(incoming);
            Value::Array(current)
        },
        Some(FetchCycle::Push) => {
            let mut current = items(state);
            current.insert(0, incoming);
            Value::Array(current)
        },
        Some(FetchCycle::Remove) => {
            Value::Array(items(state).into_iter().filter(|item| *item != incoming).collect())
        },
        _ => state,
    }
}

fn reduce_page(state: &Value, kind: Option<FetchCycle>, first_page: &Value) -> Value {
    match kind {
        Some(FetchCycle::More) => match state {
            Value::Number(n) if n.is_f64() => Value::from(n.as_f64().unwrap_or(0.0) + 1.0),
            other => Value::from(other.as_i64().unwrap_or(0).saturating_add(1)),
        },
        Some(FetchCycle::Start) => first_page.clone(),
        _ => state.clone(),
    }
}

fn fetch_descriptor(first_page: &Value) -> SliceDescriptor<FetchCycle> {
    let page_reset = first_page.clone();

    SliceDescriptor::new()
        .field_with_init(
            "data",
            |_kind: Option<FetchCycle>| true,
            reduce_data,
            Value::Array(Vec::new()),
        )
        .field_with_init(
            "page",
            |_kind: Option<FetchCycle>| true,
            move |state, event| reduce_page(&state, event.kind, &page_reset),
            first_page.clone(),
        )
        .field_with_init(
            "maxPage",
            |kind: Option<FetchCycle>| kind == Some(FetchCycle::Success),
            |_state, event| Some(event.param("maxPage")).filter(is_truthy).unwrap_or(Value::Null),
            Value::from(0),
        )
        .push("error", error_field())
        .push("payload", payload_field())
        .push("isLoading", is_loading_field())
}

/// Merge the current page into `payload.params`.
fn with_page(payload: Value, page: Value) -> Value {
    let mut fields = match payload {
        Value::Object(fields) => fields,
        _ => Map::new(),
    };
    let mut params = match fields.remove("params") {
        Some(Value::Object(params)) => params,
        _ => Map::new(),
    };
    params.insert("page".to_string(), page);
    fields.insert("params".to_string(), Value::Object(params));
    Value::Object(fields)
}

/// Build a paginated fetch slice for `{namespace}_FETCH`.
///
/// # Errors
///
/// Returns [`ConfigError`] when `config` does not validate.
pub fn fetch_template(
    namespace: &str,
    config: RequestConfig,
    reducer_path: Option<&str>,
    transport: Arc<dyn Transport>,
) -> Result<(FetchSlice, Introspection<FetchCycle>), ConfigError> {
    config.validate()?;
    let config = config.effective();

    let set = ActionSet::<FetchCycle>::new(namespace, "fetch");
    let reducer = combine_slice_reducer(fetch_descriptor(&config.first_page()), set.clone());
    let selectors = build_selector_set(&reducer.field_names().collect::<Vec<_>>(), reducer_path);

    let (Some(payload_selector), Some(page_selector)) =
        (selectors.get("payload").cloned(), selectors.get("page").cloned())
    else {
        return Err(ConfigError::Invalid(format!(
            "fetch slice '{namespace}' lost its payload or page field"
        )));
    };

    let pipeline = Arc::new(HttpPipeline::from_config(&config, transport));
    let success = set.creator(FetchCycle::Success);
    let failed = set.creator(FetchCycle::Failed);
    let pagination = config.pagination;
    let slice_name: Arc<str> = Arc::from(namespace);
    let more_type = set.action_type(FetchCycle::More);

    let routine = wrap_effect_routine(move |action: Action, state: SharedState| {
        let is_more = action.action_type() == &more_type;
        let pipeline = Arc::clone(&pipeline);
        let success = success.clone();
        let failed = failed.clone();
        let slice_name = Arc::clone(&slice_name);
        let payload_selector = payload_selector.clone();
        let page_selector = page_selector.clone();
        async move {
            let payload = state.select(&payload_selector).await;
            if is_more && payload.is_null() {
                let error = RequestError::MissingPayload {
                    slice: slice_name.to_string(),
                };
                return failed_action(&pipeline, &failed, &error, &slice_name);
            }

            let payload = if pagination {
                let page = state.select(&page_selector).await;
                tracing::trace!(slice = %slice_name, %page, "Merging page into query");
                with_page(payload, page)
            } else {
                payload
            };

            settle(&pipeline, payload, &success, &failed, &slice_name).await
        }
    });
    let saga = build_listener(
        [set.action_type(FetchCycle::Start), set.action_type(FetchCycle::More)],
        routine,
        TriggerMode::EveryMatching,
    );

    tracing::debug!(namespace, ?reducer_path, pagination, "Built fetch slice");

    Ok((
        FetchSlice {
            actions: FetchActions { set: set.clone() },
            reducer,
            selectors,
            saga,
        },
        Introspection {
            base_actions: set,
            reducer_path: reducer_path.map(str::to_string),
            request: config,
        },
    ))
}
