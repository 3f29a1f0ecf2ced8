//! # Request Slice Testing
//!
//! Testing utilities and helpers for request slices.
//!
//! This crate provides:
//! - A scripted [`MockTransport`] standing in for the network
//! - Test helpers for responses and log output
//! - Property-based testing strategies for JSON payloads
//! - A Given-When-Then harness for reducers
//!
//! ## Example
//!
//! ```ignore
//! use request_slice_testing::MockTransport;
//!
//! #[tokio::test]
//! async fn test_user_flow() {
//!     let transport = Arc::new(MockTransport::new());
//!     transport.respond_json(200, json!({"id": 1}));
//!
//!     let (users, info) = async_template("get", "user", config, Some("user"), transport.clone())?;
//!     let store = Store::new(Value::Null, nest_at("user", users.reducer.clone()), ());
//!     store.run(users.saga.clone()).await;
//!
//!     let mut handle = store.send(users.actions.start(RequestPayload::new().id(1))).await?;
//!     handle.wait().await;
//!
//!     assert_eq!(transport.requests()[0].url, "https://api.example.com/users/1");
//! }
//! ```


pub use reducer_test::{ReducerTest, assertions};

/// Mock implementations of the [`Transport`](request_slice_core::environment::Transport) seam.
pub mod mocks {
    use futures::future::BoxFuture;
    use request_slice_core::RequestError;
    use request_slice_core::environment::{HttpRequest, RawResponse, Transport};
    use serde_json::Value;
    use std::collections::VecDeque;
    use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
    use std::time::Duration;

    type Handler = Arc<dyn Fn(&HttpRequest) -> Result<RawResponse, RequestError> + Send + Sync>;

    struct Scripted {
        delay: Duration,
        result: Result<RawResponse, RequestError>,
    }

    /// Scripted network for tests
    ///
    /// Answers calls in FIFO order from a script. Once the script is
    /// exhausted, the fallback handler answers; without one, the call fails
    /// with [`RequestError::Network`]. Every request is recorded.
    ///
    /// # Example
    ///
    /// ```
    /// use request_slice_core::environment::{HttpRequest, Transport};
    /// use request_slice_core::config::HttpMethod;
    /// use request_slice_testing::MockTransport;
    /// use serde_json::json;
    ///
    /// # tokio_test::block_on(async {
    /// let transport = MockTransport::new();
    /// transport.respond_json(200, json!([1, 2]));
    ///
    /// let request = HttpRequest {
    ///     url: "https://api.example.com/todos".to_string(),
    ///     method: HttpMethod::Get,
    ///     headers: Default::default(),
    ///     params: None,
    ///     data: None,
    /// };
    /// let response = transport.invoke(request).await.map(|r| r.data);
    ///
    /// assert_eq!(response.ok(), Some(json!([1, 2])));
    /// assert_eq!(transport.request_count(), 1);
    /// # });
    /// ```
    #[derive(Default)]
    pub struct MockTransport {
        script: Mutex<VecDeque<Scripted>>,
        fallback: Option<Handler>,
        requests: Mutex<Vec<HttpRequest>>,
    }

    fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
        mutex.lock().unwrap_or_else(PoisonError::into_inner)
    }

    impl MockTransport {
        /// Create a transport with an empty script
        #[must_use]
        pub fn new() -> Self {
            Self::default()
        }

        /// Create a transport that answers every call with `handler`
        #[must_use]
        pub fn with_handler<F>(handler: F) -> Self
        where
            F: Fn(&HttpRequest) -> Result<RawResponse, RequestError> + Send + Sync + 'static,
        {
            Self {
                fallback: Some(Arc::new(handler)),
                ..Self::default()
            }
        }

        /// Queue a result
        pub fn respond(&self, result: Result<RawResponse, RequestError>) -> &Self {
            self.respond_after(Duration::ZERO, result)
        }

        /// Queue a result delivered after `delay`
        pub fn respond_after(
            &self,
            delay: Duration,
            result: Result<RawResponse, RequestError>,
        ) -> &Self {
            lock(&self.script).push_back(Scripted { delay, result });
            self
        }

        /// Queue a JSON answer.
        ///
        /// Non-2xx statuses become [`RequestError::Status`], the way a real
        /// client reports them.
        pub fn respond_json(&self, status: u16, body: Value) -> &Self {
            self.respond(crate::helpers::status_result(status, body))
        }

        /// Queue a JSON answer delivered after `delay`
        pub fn respond_json_after(&self, delay: Duration, status: u16, body: Value) -> &Self {
            self.respond_after(delay, crate::helpers::status_result(status, body))
        }

        /// Queue a connection failure
        pub fn fail_network(&self, message: impl Into<String>) -> &Self {
            self.respond(Err(RequestError::Network {
                message: message.into(),
            }))
        }

        /// Requests seen so far, in call order
        #[must_use]
        pub fn requests(&self) -> Vec<HttpRequest> {
            lock(&self.requests).clone()
        }

        /// Number of calls seen so far
        #[must_use]
        pub fn request_count(&self) -> usize {
            lock(&self.requests).len()
        }

        /// Scripted answers not consumed yet
        #[must_use]
        pub fn remaining(&self) -> usize {
            lock(&self.script).len()
        }
    }

    impl Transport for MockTransport {
        fn invoke(&self, request: HttpRequest) -> BoxFuture<'_, Result<RawResponse, RequestError>> {
            let next = lock(&self.script).pop_front();
            let next = next.unwrap_or_else(|| Scripted {
                delay: Duration::ZERO,
                result: self.fallback.as_ref().map_or_else(
                    || {
                        Err(RequestError::Network {
                            message: format!(
                                "no scripted response for {} {}",
                                request.method, request.url
                            ),
                        })
                    },
                    |handler| handler(&request),
                ),
            });
            lock(&self.requests).push(request);

            Box::pin(async move {
                if !next.delay.is_zero() {
                    tokio::time::sleep(next.delay).await;
                }
                next.result
            })
        }
    }

    impl std::fmt::Debug for MockTransport {
        fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
            f.debug_struct("MockTransport")
                .field("remaining", &self.remaining())
                .field("requests", &self.request_count())
                .field("has_fallback", &self.fallback.is_some())
                .finish()
        }
    }
}

/// Test helpers and utilities.
pub mod helpers {
    use request_slice_core::RequestError;
    use request_slice_core::environment::RawResponse;
    use serde_json::Value;

    /// Reason phrase for the statuses tests usually script
    #[must_use]
    pub const fn reason_phrase(status: u16) -> &'static str {
        match status {
            200 => "OK",
            201 => "Created",
            204 => "No Content",
            400 => "Bad Request",
            401 => "Unauthorized",
            403 => "Forbidden",
            404 => "Not Found",
            409 => "Conflict",
            422 => "Unprocessable Entity",
            500 => "Internal Server Error",
            502 => "Bad Gateway",
            503 => "Service Unavailable",
            _ => "",
        }
    }

    /// A successful response with a JSON body
    #[must_use]
    pub fn json_response(status: u16, body: Value) -> RawResponse {
        RawResponse {
            status_text: reason_phrase(status).to_string(),
            ..RawResponse::new(status, body)
        }
    }

    /// `Ok` for 2xx, [`RequestError::Status`] otherwise
    ///
    /// # Errors
    ///
    /// Returns [`RequestError::Status`] for any status outside `200..300`.
    pub fn status_result(status: u16, body: Value) -> Result<RawResponse, RequestError> {
        if (200..300).contains(&status) {
            Ok(json_response(status, body))
        } else {
            Err(RequestError::Status {
                status,
                status_text: reason_phrase(status).to_string(),
                data: body,
            })
        }
    }

    /// Install a fmt subscriber for test output, once per process.
    ///
    /// Honors `RUST_LOG`; defaults to debug output for the request-slice crates.
    pub fn init_test_tracing() {
        use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

        let filter = tracing_subscriber::EnvFilter::try_from_default_env()
            .unwrap_or_else(|_| "request_slice_core=debug,request_slice_runtime=debug".into());
        let _ = tracing_subscriber::registry()
            .with(filter)
            .with(tracing_subscriber::fmt::layer().with_test_writer())
            .try_init();
    }
}

/// Property-based testing strategies for JSON payloads.
pub mod properties {
    use proptest::prelude::*;
    use serde_json::Value;

    /// Scalars as they show up in collection items and ids
    pub fn arb_scalar() -> impl Strategy<Value = Value> {
        prop_oneof![
            Just(Value::Null),
            any::<bool>().prop_map(Value::from),
            any::<i64>().prop_map(Value::from),
            "[a-z0-9]{0,8}".prop_map(Value::from),
        ]
    }

    /// Flat JSON objects keyed by short lowercase names
    pub fn arb_flat_object() -> impl Strategy<Value = Value> {
        prop::collection::btree_map("[a-z]{1,6}", arb_scalar(), 0..6)
            .prop_map(|fields| Value::Object(fields.into_iter().collect()))
    }

    /// A page of collection items
    pub fn arb_page() -> impl Strategy<Value = Vec<Value>> {
        prop::collection::vec(prop_oneof![arb_scalar(), arb_flat_object()], 0..8)
    }
}

// Re-export commonly used items
pub use helpers::{init_test_tracing, json_response};
pub use mocks::MockTransport;
