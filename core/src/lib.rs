//! # Request Slice Core
//!
//! Declarative building blocks for asynchronous-request state slices.
//!
//! Given a namespace and an HTTP request description, a template produces a
//! self-contained bundle of action creators, a reducer, selectors and an
//! effect listener that together model the life cycle of a remote call
//! (pending → success / failed). The paginated fetch template adds
//! collection mutations (append, prepend, remove, clear, advance page).
//!
//! ## Core Concepts
//!
//! - **Action**: `{type, ...params}` event, discriminated by an [`ActionType`]
//! - **Cycle**: closed enum of life-cycle phases owned by one slice
//! - **Reducer**: Pure function `(State, Action, Environment) → (State, Effects)`
//! - **Selector**: Dotted-path accessor into the global state tree
//! - **Listener**: Effect routine run once per matching action
//! - **Transcoding**: Field renaming between local payloads and the wire
//!
//! ## Building Blocks
//!
//! | Module          | Responsibility                                        |
//! |-----------------|-------------------------------------------------------|
//! | [`action`]      | Action type derivation and constructors               |
//! | [`slice`]       | Conditional field reducers combined into one slice    |
//! | [`selector`]    | Path-based state accessors                            |
//! | [`listener`]    | Effect routines and their trigger registration        |
//! | [`transcode`]   | Request invocation, response parsing, serialization   |
//! | [`templates`]   | Async and fetch templates assembled from the above    |
//! | [`composition`] | Keyed combination of slice reducers                   |
//!
//! ## Example
//!
//! ```ignore
//! use request_slice_core::composition::nest_at;
//! use request_slice_core::config::RequestConfig;
//! use request_slice_core::templates::{async_template, RequestPayload};
//!
//! let (users, info) = async_template(
//!     "get",
//!     "user",
//!     RequestConfig::new("https://api.example.com/users"),
//!     Some("api.user"),
//!     transport,
//! )?;
//!
//! let store = Store::new(Value::Null, nest_at("api.user", users.reducer.clone()), ());
//! store.run(users.saga.clone()).await;
//!
//! let mut handle = store.send(users.actions.start(RequestPayload::new().id(1))).await?;
//! handle.wait().await;
//! let user = users.selectors.select("data", &store.state(Value::clone).await);
//! ```

// Re-export commonly used types
pub use serde::{Deserialize, Serialize};
pub use serde_json::{Map, Value};
pub use smallvec::{SmallVec, smallvec};

pub mod action;
pub mod composition;
pub mod config;
pub mod error;
pub mod listener;
pub mod selector;
pub mod slice;
pub mod templates;
pub mod transcode;
pub mod value;

pub use action::{Action, ActionCreator, ActionSet, ActionType, Cycle};
pub use effect::Effect;
pub use error::{ConfigError, RequestError};
pub use listener::{Listener, StateAccess, StateSnapshot};
pub use reducer::Reducer;
pub use selector::{Selector, SelectorSet};
pub use slice::{SliceDescriptor, SliceReducer};

/// Reducer module - The core trait for state transitions
///
/// Reducers are pure functions: `(State, Action, Environment) → (State, Effects)`
///
/// Slice reducers built by the templates never return effects; network work
/// happens in listeners. Hand-written reducers mounted next to them may.
pub mod reducer {
    use super::effect::Effect;
    use smallvec::SmallVec;

    /// The Reducer trait - core abstraction for state transitions
    ///
    /// # Type Parameters
    ///
    /// - `State`: The state this reducer operates on
    /// - `Action`: The action type this reducer processes
    /// - `Environment`: The injected dependencies this reducer needs
    ///
    /// # Example
    ///
    /// ```ignore
    /// impl Reducer for CounterReducer {
    ///     type State = Value;
    ///     type Action = Action;
    ///     type Environment = ();
    ///
    ///     fn reduce(
    ///         &self,
    ///         state: &mut Value,
    ///         action: Action,
    ///         _env: &(),
    ///     ) -> SmallVec<[Effect<Action>; 4]> {
    ///         if action.action_type().as_str() == "INCREMENT_COUNTER" {
    ///             *state = json!(state.as_i64().unwrap_or(0) + 1);
    ///         }
    ///         smallvec![]
    ///     }
    /// }
    /// ```
    pub trait Reducer {
        /// The state type this reducer operates on
        type State;

        /// The action type this reducer processes
        type Action;

        /// The environment type with injected dependencies
        type Environment;

        /// Reduce an action into state changes and effects
        ///
        /// # Arguments
        ///
        /// - `state`: Mutable reference to current state
        /// - `action`: The action to process
        /// - `env`: Reference to injected dependencies
        ///
        /// # Returns
        ///
        /// The effects to be executed by the runtime
        fn reduce(
            &self,
            state: &mut Self::State,
            action: Self::Action,
            env: &Self::Environment,
        ) -> SmallVec<[Effect<Self::Action>; 4]>;
    }
}

/// Effect module - Side effect descriptions
///
/// Effects describe side effects to be performed by the runtime.
/// They are values, not execution.
pub mod effect {
    use std::future::Future;
    use std::pin::Pin;

    /// Effect type - describes a side effect to be executed
    ///
    /// Effects are NOT executed immediately. They are descriptions of what should happen,
    /// returned from reducers or listeners and executed by the Store runtime.
    ///
    /// # Type Parameters
    ///
    /// - `Action`: The action type that effects can produce (feedback loop)
    pub enum Effect<Action> {
        /// No-op effect
        None,

        /// Arbitrary async computation
        ///
        /// Returns `Option<Action>` - if Some, the action is fed back into the reducer
        Future(Pin<Box<dyn Future<Output = Option<Action>> + Send>>),
    }

    // Manual Debug implementation since Future doesn't implement Debug
    impl<Action> std::fmt::Debug for Effect<Action>
    where
        Action: std::fmt::Debug,
    {
        fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
            match self {
                Effect::None => write!(f, "Effect::None"),
                Effect::Future(_) => write!(f, "Effect::Future(<future>)"),
            }
        }
    }
}

/// Environment module - Dependency injection traits
///
/// The network is the only external dependency of a slice. It is abstracted
/// behind [`Transport`](environment::Transport) and injected when a template
/// is built.
pub mod environment {
    use crate::config::HttpMethod;
    use crate::error::RequestError;
    use futures::future::BoxFuture;
    use serde::{Deserialize, Serialize};
    use serde_json::{Value, json};
    use std::collections::BTreeMap;

    /// A fully resolved HTTP call handed to a [`Transport`].
    #[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
    pub struct HttpRequest {
        /// Target URL, id segment already appended
        pub url: String,
        /// HTTP method
        pub method: HttpMethod,
        /// Request headers
        #[serde(default)]
        pub headers: BTreeMap<String, String>,
        /// Query parameters (a JSON object when present)
        #[serde(default, skip_serializing_if = "Option::is_none")]
        pub params: Option<Value>,
        /// JSON request body
        #[serde(default, skip_serializing_if = "Option::is_none")]
        pub data: Option<Value>,
    }

    /// What a [`Transport`] resolves with on a successful call.
    #[derive(Debug, Clone, PartialEq)]
    pub struct RawResponse {
        /// HTTP status code
        pub status: u16,
        /// Canonical reason phrase
        pub status_text: String,
        /// Response headers
        pub headers: BTreeMap<String, String>,
        /// Decoded body
        pub data: Value,
    }

    impl RawResponse {
        /// Create a response with the given status and body and no headers.
        #[must_use]
        pub fn new(status: u16, data: Value) -> Self {
            Self {
                status,
                status_text: String::new(),
                headers: BTreeMap::new(),
                data,
            }
        }

        /// Raw result as seen by response parsers.
        ///
        /// `{data, status, statusText, headers, config}` where `config` echoes
        /// the request that produced it.
        #[must_use]
        pub fn into_value(self, request: &HttpRequest) -> Value {
            json!({
                "data": self.data,
                "status": self.status,
                "statusText": self.status_text,
                "headers": self.headers,
                "config": request,
            })
        }
    }

    /// Transport trait - the network primitive used by request invokers
    ///
    /// # Examples
    ///
    /// ```ignore
    /// // Production - reqwest client
    /// let transport: Arc<dyn Transport> = Arc::new(ReqwestTransport::new());
    ///
    /// // Test - scripted responses
    /// let transport = Arc::new(MockTransport::new());
    /// transport.respond_json(200, json!([{"id": 1}]));
    /// ```
    pub trait Transport: Send + Sync {
        /// Perform the call.
        ///
        /// # Errors
        ///
        /// Returns [`RequestError`] when the call cannot be completed or the
        /// server answers with a non-success status.
        fn invoke(&self, request: HttpRequest) -> BoxFuture<'_, Result<RawResponse, RequestError>>;
    }
}
