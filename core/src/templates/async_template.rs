//! Single-result request slice: `start → success | failed`.
//!
//! | Field       | Init   | start     | success        | failed         |
//! |-------------|--------|-----------|----------------|----------------|
//! | `data`      | `null` | kept      | `action.data`  | kept           |
//! | `error`     | `null` | kept      | `null`         | `action.error` |
//! | `payload`   | `null` | captured  | kept           | kept           |
//! | `isLoading` | `null` | `true`    | `false`        | `false`        |
//!
//! Every `start` runs its own request. Overlapping requests are neither
//! cancelled nor serialized, and whichever completion is reduced last wins.

use super::{
    Introspection, RequestCycle, RequestPayload, error_field, is_loading_field, payload_field,
    settle,
};
use crate::action::{Action, ActionSet, Cycle};
use crate::config::RequestConfig;
use crate::environment::Transport;
use crate::error::ConfigError;
use crate::listener::{Listener, SharedState, TriggerMode, build_listener, wrap_effect_routine};
use crate::selector::{SelectorSet, build_selector_set};
use crate::slice::{SliceDescriptor, SliceReducer, combine_slice_reducer};
use crate::transcode::{ErrorRecord, HttpPipeline};
use serde_json::{Map, Value};
use std::sync::Arc;

/// Life-cycle phases of an async slice
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum AsyncCycle {
    /// Request dispatched
    Start,
    /// Request resolved
    Success,
    /// Request rejected
    Failed,
}

impl Cycle for AsyncCycle {
    fn all() -> &'static [Self] {
        &[Self::Start, Self::Success, Self::Failed]
    }

    fn suffix(self) -> &'static str {
        match self {
            Self::Start => "start",
            Self::Success => "success",
            Self::Failed => "failed",
        }
    }
}

impl RequestCycle for AsyncCycle {
    const START: Self = Self::Start;
    const SUCCESS: Self = Self::Success;
    const FAILED: Self = Self::Failed;
}

/// Public actions of an async slice.
#[derive(Clone, Debug)]
pub struct AsyncActions {
    set: ActionSet<AsyncCycle>,
}

impl AsyncActions {
    /// `{type: START, payload}`
    #[must_use]
    pub fn start(&self, payload: RequestPayload) -> Action {
        self.set
            .creator(AsyncCycle::Start)
            .event()
            .with("payload", payload.into_value())
    }

    /// `{type: SUCCESS, ...fields}`, as the saga would dispatch it
    #[must_use]
    pub fn success(&self, fields: Map<String, Value>) -> Action {
        self.set.creator(AsyncCycle::Success).create(Some(fields))
    }

    /// `{type: FAILED, error: {message, log}}`, as the saga would dispatch it
    #[must_use]
    pub fn failed(&self, error: &ErrorRecord) -> Action {
        self.set
            .creator(AsyncCycle::Failed)
            .event()
            .with("error", error.to_value())
    }

    /// The underlying action set
    #[must_use]
    pub const fn set(&self) -> &ActionSet<AsyncCycle> {
        &self.set
    }
}

/// Everything an async template builds.
#[derive(Clone, Debug)]
pub struct AsyncSlice {
    /// Action constructors
    pub actions: AsyncActions,
    /// Slice reducer, to be mounted at the introspected path
    pub reducer: SliceReducer<AsyncCycle>,
    /// One selector per field
    pub selectors: SelectorSet,
    /// Runs the request for every start
    pub saga: Listener,
}

fn async_descriptor() -> SliceDescriptor<AsyncCycle> {
    SliceDescriptor::new()
        .field(
            "data",
            |kind: Option<AsyncCycle>| kind == Some(AsyncCycle::Success),
            |_state, event| event.param("data"),
        )
        .push("error", error_field())
        .push("payload", payload_field())
        .push("isLoading", is_loading_field())
}

/// Build an async slice for `{action_name}_{namespace}`.
///
/// The saga listens for `start`, then serializes `action.payload`, performs
/// the request and parses the result into a `success`. Request errors become
/// a `failed` carrying the normalized error.
///
/// # Errors
///
/// Returns [`ConfigError`] when `config` does not validate.
pub fn async_template(
    action_name: &str,
    namespace: &str,
    config: RequestConfig,
    reducer_path: Option<&str>,
    transport: Arc<dyn Transport>,
) -> Result<(AsyncSlice, Introspection<AsyncCycle>), ConfigError> {
    config.validate()?;
    let config = config.effective();

    let set = ActionSet::<AsyncCycle>::new(action_name, namespace);
    let reducer = combine_slice_reducer(async_descriptor(), set.clone());
    let selectors = build_selector_set(&reducer.field_names().collect::<Vec<_>>(), reducer_path);

    let pipeline = Arc::new(HttpPipeline::from_config(&config, transport));
    let success = set.creator(AsyncCycle::Success);
    let failed = set.creator(AsyncCycle::Failed);
    let slice_name: Arc<str> = Arc::from(format!("{action_name}_{namespace}"));

    let routine = wrap_effect_routine(move |action: Action, _state: SharedState| {
        let pipeline = Arc::clone(&pipeline);
        let success = success.clone();
        let failed = failed.clone();
        let slice_name = Arc::clone(&slice_name);
        async move {
            let payload = action.get("payload").cloned().unwrap_or(Value::Null);
            settle(&pipeline, payload, &success, &failed, &slice_name).await
        }
    });
    let saga =
        build_listener(set.action_type(AsyncCycle::Start), routine, TriggerMode::EveryMatching);

    tracing::debug!(action_name, namespace, ?reducer_path, "Built async slice");

    Ok((
        AsyncSlice {
            actions: AsyncActions { set: set.clone() },
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

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::ActionType;
    use crate::environment::{HttpRequest, RawResponse};
    use crate::error::RequestError;
    use crate::listener::StateAccess;
    use crate::selector::Selector;
    use futures::future::BoxFuture;
    use serde_json::json;
    use std::sync::Mutex;

    struct Scripted {
        response: Result<RawResponse, RequestError>,
        seen: Mutex<Vec<HttpRequest>>,
    }

    impl Transport for Scripted {
        fn invoke(&self, request: HttpRequest) -> BoxFuture<'_, Result<RawResponse, RequestError>> {
            self.seen.lock().unwrap().push(request);
            let response = self.response.clone();
            Box::pin(async move { response })
        }
    }

    struct NoState;

    impl StateAccess for NoState {
        fn select<'a>(&'a self, _selector: &'a Selector) -> BoxFuture<'a, Value> {
            Box::pin(async { Value::Null })
        }
    }

    fn build(response: Result<RawResponse, RequestError>) -> (AsyncSlice, Arc<Scripted>) {
        let transport = Arc::new(Scripted {
            response,
            seen: Mutex::new(Vec::new()),
        });
        let (slice, _info) = async_template(
            "get",
            "user",
            RequestConfig::new("https://api.example.com/users"),
            Some("api.user"),
            transport.clone(),
        )
        .unwrap();
        (slice, transport)
    }

    async fn run_saga(slice: &AsyncSlice, action: &Action) -> Option<Action> {
        match slice.saga.effect_for(action, Arc::new(NoState)) {
            Some(crate::effect::Effect::Future(fut)) => fut.await,
            _ => None,
        }
    }

    #[test]
    fn test_action_types() {
        let (slice, _) = build(Ok(RawResponse::new(200, Value::Null)));

        let types: Vec<_> =
            slice.actions.set().iter().map(|(_, e)| e.action_type.to_string()).collect();
        assert_eq!(types, vec!["GET_USER_START", "GET_USER_SUCCESS", "GET_USER_FAILED"]);
    }

    #[test]
    fn test_start_action_carries_payload() {
        let (slice, _) = build(Ok(RawResponse::new(200, Value::Null)));

        let action = slice.actions.start(
            RequestPayload::new()
                .id(1)
                .params(json!({"expand": "team"}))
                .body(json!({"name": "Ada"})),
        );

        assert_eq!(
            serde_json::to_value(&action).unwrap(),
            json!({
                "type": "GET_USER_START",
                "payload": {"id": 1, "params": {"expand": "team"}, "body": {"name": "Ada"}}
            })
        );
    }

    #[test]
    fn test_reducer_life_cycle() {
        let (slice, _) = build(Ok(RawResponse::new(200, Value::Null)));
        let reducer = &slice.reducer;

        let mut state = reducer.initial_state();
        assert_eq!(state, json!({"data": null, "error": null, "payload": null, "isLoading": null}));

        state = reducer.next_state(&state, &slice.actions.start(RequestPayload::new().id(1)));
        assert_eq!(state["isLoading"], json!(true));
        assert_eq!(state["payload"], json!({"id": 1}));

        let error = ErrorRecord {
            message: "boom".to_string(),
            log: json!({}),
        };
        state = reducer.next_state(&state, &slice.actions.failed(&error));
        assert_eq!(state["isLoading"], json!(false));
        assert_eq!(state["error"], json!({"message": "boom", "log": {}}));

        let unrelated = Action::new(ActionType::new("SOMETHING_ELSE"));
        state = reducer.next_state(&state, &unrelated);
        assert_eq!(state["error"], json!({"message": "boom", "log": {}}));
        assert_eq!(state["isLoading"], json!(false));

        state = reducer.next_state(&state, &slice.actions.start(RequestPayload::new().id(2)));
        let mut fields = Map::new();
        fields.insert("data".to_string(), json!({"id": 2, "name": "Grace"}));
        state = reducer.next_state(&state, &slice.actions.success(fields));

        assert_eq!(
            state,
            json!({
                "data": {"id": 2, "name": "Grace"},
                "error": null,
                "payload": {"id": 2},
                "isLoading": false
            })
        );
    }

    #[test]
    fn test_selectors_follow_reducer_path() {
        let (slice, _) = build(Ok(RawResponse::new(200, Value::Null)));
        let root = json!({"api": {"user": {"data": {"id": 1}, "isLoading": false}}});

        assert_eq!(slice.selectors.select("data", &root), json!({"id": 1}));
        // false reads back as null
        assert_eq!(slice.selectors.select("isLoading", &root), Value::Null);
    }

    #[tokio::test]
    async fn test_saga_dispatches_parsed_success() {
        let (slice, transport) = build(Ok(RawResponse::new(200, json!({"id": 1, "name": "Ada"}))));

        let produced = run_saga(&slice, &slice.actions.start(RequestPayload::new().id(1)))
            .await
            .unwrap();

        assert_eq!(
            serde_json::to_value(&produced).unwrap(),
            json!({"type": "GET_USER_SUCCESS", "data": {"id": 1, "name": "Ada"}})
        );
        assert_eq!(transport.seen.lock().unwrap()[0].url, "https://api.example.com/users/1");
    }

    #[tokio::test]
    async fn test_saga_dispatches_failed_on_status_error() {
        let (slice, _) = build(Err(RequestError::Status {
            status: 404,
            status_text: "Not Found".to_string(),
            data: json!({"detail": "no such user"}),
        }));

        let produced = run_saga(&slice, &slice.actions.start(RequestPayload::new().id(9)))
            .await
            .unwrap();

        assert_eq!(produced.action_type().as_str(), "GET_USER_FAILED");
        assert_eq!(
            produced.get("error"),
            Some(&json!({
                "message": "Request failed with status code 404",
                "log": {
                    "kind": "status",
                    "status": 404,
                    "statusText": "Not Found",
                    "data": {"detail": "no such user"}
                }
            }))
        );
    }

    #[tokio::test]
    async fn test_saga_ignores_other_actions() {
        let (slice, transport) = build(Ok(RawResponse::new(200, Value::Null)));

        let produced = run_saga(&slice, &Action::new(ActionType::new("GET_USER_SUCCESS"))).await;

        assert!(produced.is_none());
        assert!(transport.seen.lock().unwrap().is_empty());
    }
}
