//! # Request Slice Runtime
//!
//! Runtime host for request slices.
//!
//! This crate provides the Store runtime that coordinates reducer execution,
//! listener scheduling and effect handling over a JSON state tree.
//!
//! ## Core Components
//!
//! - **Store**: The runtime that manages state and executes effects
//! - **Listeners**: Sagas registered with [`Store::run`], started for every matching action
//! - **Feedback Loop**: action → reducer → listeners/effects → action
//!
//! ## Example
//!
//! ```ignore
//! use request_slice_core::composition::nest_at;
//! use request_slice_runtime::Store;
//!
//! let store = Store::new(Value::Null, nest_at("api.user", users.reducer.clone()), ());
//! store.run(users.saga.clone()).await;
//!
//! // Send an action
//! let mut handle = store.send(users.actions.start(RequestPayload::new().id(1))).await?;
//! handle.wait().await;
//!
//! // Read state
//! let loading = store.select(selector).await;
//! ```

use request_slice_core::listener::{Listener, StateSnapshot};
use request_slice_core::{Action, Effect, Reducer, Selector, Value};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::time::Duration;
use tokio::sync::{RwLock, watch};

/// Error types for the Store runtime
pub mod error {
    use thiserror::Error;

    /// Errors that can occur during Store operations
    #[derive(Error, Debug)]
    pub enum StoreError {
        /// Store is shutting down and not accepting new actions
        ///
        /// This error is returned when `send()` is called after shutdown initiated.
        #[error("Store is shutting down")]
        ShutdownInProgress,

        /// Shutdown timed out waiting for effects to complete
        ///
        /// Some effects were still running when the timeout elapsed.
        #[error("Shutdown timed out with {0} effects still running")]
        ShutdownTimeout(usize),

        /// Timeout waiting for terminal action
        ///
        /// Returned by `send_and_wait_for` when the timeout expires before
        /// a matching action is received.
        #[error("Timeout waiting for action")]
        Timeout,

        /// Action broadcast channel closed
        #[error("Action broadcast channel closed")]
        ChannelClosed,
    }
}

pub use error::StoreError;

/// Configuration for Store instances
///
/// # Example
///
/// ```
/// use request_slice_runtime::StoreConfig;
/// use std::time::Duration;
///
/// let config = StoreConfig::default()
///     .with_broadcast_capacity(256)
///     .with_shutdown_timeout(Duration::from_secs(5));
///
/// assert_eq!(config.broadcast_capacity, 256);
/// ```
#[derive(Debug, Clone)]
pub struct StoreConfig {
    /// Number of actions buffered for slow observers
    pub broadcast_capacity: usize,
    /// Default timeout for graceful shutdown
    pub default_shutdown_timeout: Duration,
}

impl StoreConfig {
    /// Create a new configuration with custom values
    #[must_use]
    pub const fn new(broadcast_capacity: usize, default_shutdown_timeout: Duration) -> Self {
        Self {
            broadcast_capacity,
            default_shutdown_timeout,
        }
    }

    /// Set the broadcast capacity
    #[must_use]
    pub const fn with_broadcast_capacity(mut self, capacity: usize) -> Self {
        self.broadcast_capacity = capacity;
        self
    }

    /// Set the default shutdown timeout
    #[must_use]
    pub const fn with_shutdown_timeout(mut self, timeout: Duration) -> Self {
        self.default_shutdown_timeout = timeout;
        self
    }
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            broadcast_capacity: 16,
            default_shutdown_timeout: Duration::from_secs(30),
        }
    }
}

/// Handle for tracking effect completion
///
/// Returned by [`Store::send()`] to allow waiting for the effects and
/// listener tasks started by that action. A task counts as finished once
/// the action it produced (if any) has been reduced.
///
/// # Example
///
/// ```ignore
/// let mut handle = store.send(actions.start(RequestPayload::new().id(1))).await?;
/// handle.wait_with_timeout(Duration::from_secs(5)).await?;
/// // The success or failed action is now in the state
/// ```
#[derive(Clone)]
pub struct EffectHandle {
    effects: Arc<AtomicUsize>,
    completion: watch::Receiver<()>,
}

impl EffectHandle {
    fn new() -> (Self, EffectTracking) {
        let counter = Arc::new(AtomicUsize::new(0));
        let (tx, rx) = watch::channel(());

        let handle = Self {
            effects: Arc::clone(&counter),
            completion: rx,
        };

        let tracking = EffectTracking {
            counter,
            notifier: Arc::new(tx),
        };

        (handle, tracking)
    }

    /// Create a handle that's already complete
    #[must_use]
    pub fn completed() -> Self {
        let (tx, rx) = watch::channel(());
        let _ = tx.send(());

        Self {
            effects: Arc::new(AtomicUsize::new(0)),
            completion: rx,
        }
    }

    /// Number of tasks still running
    #[must_use]
    pub fn pending(&self) -> usize {
        self.effects.load(Ordering::SeqCst)
    }

    /// Wait for all effects to complete
    pub async fn wait(&mut self) {
        while self.effects.load(Ordering::SeqCst) > 0 {
            if self.completion.changed().await.is_err() {
                break;
            }
        }
    }

    /// Wait for all effects to complete with a timeout
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Timeout`] if the timeout expires before all
    /// effects complete.
    pub async fn wait_with_timeout(&mut self, timeout: Duration) -> Result<(), StoreError> {
        tokio::time::timeout(timeout, self.wait())
            .await
            .map_err(|_| StoreError::Timeout)
    }
}

impl std::fmt::Debug for EffectHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EffectHandle")
            .field("pending_effects", &self.effects.load(Ordering::SeqCst))
            .finish_non_exhaustive()
    }
}

/// Internal: Effect tracking context passed through effect execution
#[derive(Clone)]
struct EffectTracking {
    counter: Arc<AtomicUsize>,
    notifier: Arc<watch::Sender<()>>,
}

impl EffectTracking {
    /// Increment the effect counter (effect started)
    fn increment(&self) {
        self.counter.fetch_add(1, Ordering::SeqCst);
    }

    /// Decrement the effect counter (effect completed)
    fn decrement(&self) {
        if self.counter.fetch_sub(1, Ordering::SeqCst) == 1 {
            // Counter reached zero, notify waiters
            let _ = self.notifier.send(());
        }
    }
}

/// Internal: RAII guard that decrements effect counter on drop
///
/// Ensures the effect counter is always decremented, even if the effect panics.
struct DecrementGuard(EffectTracking);

impl Drop for DecrementGuard {
    fn drop(&mut self) {
        self.0.decrement();
    }
}

/// Guard that decrements an atomic counter on drop (for shutdown tracking)
struct AtomicCounterGuard(Arc<AtomicUsize>);

impl Drop for AtomicCounterGuard {
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::SeqCst);
    }
}

/// Store runtime for coordinating reducer execution and effect handling.
pub mod store {
    use super::{
        Action, Arc, AtomicBool, AtomicCounterGuard, AtomicUsize, DecrementGuard, Duration, Effect,
        EffectHandle, EffectTracking, Listener, Ordering, Reducer, RwLock, Selector, StateSnapshot,
        StoreConfig, StoreError, Value,
    };
    use tokio::sync::broadcast;

    /// The Store - runtime coordinator for a JSON state tree
    ///
    /// The Store manages:
    /// 1. State (behind `RwLock` for concurrent access)
    /// 2. Reducer (usually slices combined with `combine_named` / `nest_at`)
    /// 3. Environment (injected dependencies)
    /// 4. Listeners (sagas started for every matching action)
    /// 5. Effect execution (with feedback loop)
    ///
    /// # Example
    ///
    /// ```ignore
    /// let store = Store::new(Value::Null, nest_at("todos", todos.reducer.clone()), ());
    /// store.run(todos.saga.clone()).await;
    ///
    /// store.send(todos.actions.fetch(None, None)).await?;
    /// ```
    pub struct Store<R>
    where
        R: Reducer<State = Value, Action = Action>,
    {
        state: Arc<RwLock<Value>>,
        reducer: Arc<R>,
        environment: Arc<R::Environment>,
        listeners: Arc<RwLock<Vec<Listener>>>,
        config: StoreConfig,
        shutdown: Arc<AtomicBool>,
        pending_effects: Arc<AtomicUsize>,
        /// Action broadcast channel for observing actions produced by effects.
        ///
        /// Actions produced by effects and listeners are broadcast after
        /// they have been reduced.
        action_broadcast: broadcast::Sender<Action>,
    }

    impl<R> Store<R>
    where
        R: Reducer<State = Value, Action = Action> + Send + Sync + 'static,
        R::Environment: Send + Sync + 'static,
    {
        /// Create a new store with initial state, reducer, and environment
        ///
        /// Uses [`StoreConfig::default`].
        #[must_use]
        pub fn new(initial_state: Value, reducer: R, environment: R::Environment) -> Self {
            Self::with_config(initial_state, reducer, environment, StoreConfig::default())
        }

        /// Create a new Store with custom configuration
        ///
        /// # Example
        ///
        /// ```ignore
        /// let config = StoreConfig::default()
        ///     .with_broadcast_capacity(256)
        ///     .with_shutdown_timeout(Duration::from_secs(60));
        ///
        /// let store = Store::with_config(Value::Null, reducer, (), config);
        /// ```
        #[must_use]
        pub fn with_config(
            initial_state: Value,
            reducer: R,
            environment: R::Environment,
            config: StoreConfig,
        ) -> Self {
            let (action_broadcast, _) = broadcast::channel(config.broadcast_capacity.max(1));
            let state = Arc::new(RwLock::new(initial_state));

            Self {
                state,
                reducer: Arc::new(reducer),
                environment: Arc::new(environment),
                listeners: Arc::new(RwLock::new(Vec::new())),
                config,
                shutdown: Arc::new(AtomicBool::new(false)),
                pending_effects: Arc::new(AtomicUsize::new(0)),
                action_broadcast,
            }
        }

        /// Register a listener.
        ///
        /// From now on, every action whose type the listener subscribes to
        /// starts one independent run of its routine, after the action has
        /// been reduced.
        #[tracing::instrument(skip(self, listener), name = "store_run")]
        pub async fn run(&self, listener: Listener) {
            tracing::debug!(triggers = ?listener.triggers(), "Registering listener");
            metrics::counter!("store.listeners.registered").increment(1);
            self.listeners.write().await.push(listener);
        }

        /// Initiate graceful shutdown of the store
        ///
        /// This method:
        /// 1. Sets the shutdown flag (rejecting new actions from callers)
        /// 2. Waits for pending effects to complete (with timeout)
        /// 3. Returns when all effects finish or timeout expires
        ///
        /// Actions produced by effects that were already running are still
        /// reduced.
        ///
        /// # Errors
        ///
        /// Returns [`StoreError::ShutdownTimeout`] if the timeout expires before all
        /// pending effects complete.
        pub async fn shutdown(&self, timeout: Duration) -> Result<(), StoreError> {
            tracing::info!("Initiating graceful shutdown");
            metrics::counter!("store.shutdown.initiated").increment(1);

            // Set shutdown flag to reject new actions
            self.shutdown.store(true, Ordering::Release);

            let start = std::time::Instant::now();
            let poll_interval = Duration::from_millis(10);

            loop {
                let pending = self.pending_effects.load(Ordering::Acquire);

                if pending == 0 {
                    tracing::info!("All effects completed, shutdown successful");
                    metrics::counter!("store.shutdown.completed").increment(1);
                    return Ok(());
                }

                if start.elapsed() >= timeout {
                    tracing::error!(
                        pending_effects = pending,
                        "Shutdown timeout: {} effects still running",
                        pending
                    );
                    metrics::counter!("store.shutdown.timeout").increment(1);
                    return Err(StoreError::ShutdownTimeout(pending));
                }

                tracing::trace!(pending_effects = pending, "Waiting for effects to complete");
                tokio::time::sleep(poll_interval).await;
            }
        }

        /// [`shutdown`](Self::shutdown) with the configured default timeout
        ///
        /// # Errors
        ///
        /// Returns [`StoreError::ShutdownTimeout`] if effects are still running
        /// when the timeout expires.
        pub async fn shutdown_gracefully(&self) -> Result<(), StoreError> {
            self.shutdown(self.config.default_shutdown_timeout).await
        }

        /// Send an action to the store
        ///
        /// 1. Acquires write lock on state
        /// 2. Calls reducer with (state, action, environment)
        /// 3. Starts returned effects and one task per matching listener
        /// 4. Effects may produce more actions (feedback loop)
        ///
        /// # Concurrency and Effect Execution
        ///
        /// - The reducer executes synchronously while holding a write lock
        /// - Listeners start after the write lock is released and observe the
        ///   post-reduction state
        /// - Overlapping listener runs are never cancelled; whichever produced
        ///   action is reduced last wins
        ///
        /// # Errors
        ///
        /// Returns [`StoreError::ShutdownInProgress`] if the store is shutting down.
        #[tracing::instrument(
            skip(self, action),
            fields(action_type = %action.action_type()),
            name = "store_send"
        )]
        pub async fn send(&self, action: Action) -> Result<EffectHandle, StoreError> {
            if self.shutdown.load(Ordering::Acquire) {
                tracing::warn!("Rejected action: store is shutting down");
                metrics::counter!("store.shutdown.rejected_actions").increment(1);
                return Err(StoreError::ShutdownInProgress);
            }

            Ok(self.dispatch(action).await)
        }

        /// Send an action and wait for a matching result action
        ///
        /// Subscribes to the action broadcast before sending, so a result
        /// produced immediately is not missed. Broadcast actions have already
        /// been reduced when the predicate sees them.
        ///
        /// # Errors
        ///
        /// - [`StoreError::Timeout`]: Timeout expired before matching action received
        /// - [`StoreError::ChannelClosed`]: Action broadcast channel closed
        /// - [`StoreError::ShutdownInProgress`]: Store is shutting down
        ///
        /// # Example
        ///
        /// ```ignore
        /// let result = store
        ///     .send_and_wait_for(
        ///         users.actions.start(RequestPayload::new().id(1)),
        ///         |a| a.action_type() == &success || a.action_type() == &failed,
        ///         Duration::from_secs(10),
        ///     )
        ///     .await?;
        /// ```
        pub async fn send_and_wait_for<F>(
            &self,
            action: Action,
            predicate: F,
            timeout: Duration,
        ) -> Result<Action, StoreError>
        where
            F: Fn(&Action) -> bool,
        {
            // Subscribe BEFORE sending to avoid race condition
            let mut rx = self.action_broadcast.subscribe();

            self.send(action).await?;

            tokio::time::timeout(timeout, async {
                loop {
                    match rx.recv().await {
                        Ok(action) if predicate(&action) => return Ok(action),
                        Ok(_) => {},
                        Err(broadcast::error::RecvError::Lagged(skipped)) => {
                            tracing::warn!(
                                skipped,
                                "Action observer lagged, {} actions skipped",
                                skipped
                            );
                        },
                        Err(broadcast::error::RecvError::Closed) => {
                            return Err(StoreError::ChannelClosed);
                        },
                    }
                }
            })
            .await
            .map_err(|_| StoreError::Timeout)?
        }

        /// Subscribe to actions produced by effects and listeners
        ///
        /// Actions sent by callers through [`send`](Self::send) are not
        /// broadcast.
        #[must_use]
        pub fn subscribe_actions(&self) -> broadcast::Receiver<Action> {
            self.action_broadcast.subscribe()
        }

        /// Read current state via a closure
        ///
        /// ```ignore
        /// let count = store.state(|s| s["todos"]["data"].as_array().map_or(0, Vec::len)).await;
        /// ```
        pub async fn state<F, T>(&self, f: F) -> T
        where
            F: FnOnce(&Value) -> T,
        {
            let state = self.state.read().await;
            f(&state)
        }

        /// Read one selector against the current state
        pub async fn select(&self, selector: &Selector) -> Value {
            let state = self.state.read().await;
            selector.select(&state)
        }

        /// Reduce, then start effects and listeners.
        ///
        /// Matching listeners read a snapshot of the state taken before the
        /// write lock is released, never a later one.
        async fn dispatch(&self, action: Action) -> EffectHandle {
            tracing::debug!("Processing action");
            metrics::counter!("store.commands.total").increment(1);

            let (handle, tracking) = EffectHandle::new();
            let trigger = action.clone();

            let matching: Vec<Listener> = {
                let listeners = self.listeners.read().await;
                listeners
                    .iter()
                    .filter(|listener| listener.matches(trigger.action_type()))
                    .cloned()
                    .collect()
            };

            let (effects, snapshot) = {
                let mut state = self.state.write().await;
                tracing::trace!("Acquired write lock on state");

                let span = tracing::debug_span!("reducer_execution");
                let _enter = span.enter();

                let start = std::time::Instant::now();
                let effects = self.reducer.reduce(&mut state, action, &self.environment);
                metrics::histogram!("store.reducer.duration_seconds")
                    .record(start.elapsed().as_secs_f64());

                tracing::trace!("Reducer completed, returned {} effects", effects.len());
                let snapshot = (!matching.is_empty())
                    .then(|| StateSnapshot::new(Value::clone(&state)).shared());
                (effects, snapshot)
            };

            let listener_effects: Vec<Effect<Action>> = snapshot
                .map(|snapshot| {
                    matching
                        .iter()
                        .filter_map(|listener| listener.effect_for(&trigger, Arc::clone(&snapshot)))
                        .collect()
                })
                .unwrap_or_default();

            if !listener_effects.is_empty() {
                tracing::trace!(count = listener_effects.len(), "Starting listeners");
                #[allow(clippy::cast_possible_truncation)]
                metrics::counter!("store.listeners.triggered")
                    .increment(listener_effects.len() as u64);
            }

            for effect in effects.into_iter().chain(listener_effects) {
                self.execute_effect_internal(effect, tracking.clone());
            }
            tracing::debug!("Action processing completed, returning handle");

            handle
        }

        /// Execute an effect with tracking
        ///
        /// Uses [`DecrementGuard`] so the counter is always decremented, even
        /// if the effect panics. A produced action is reduced before the
        /// guard drops, then broadcast.
        #[allow(clippy::needless_pass_by_value)]
        fn execute_effect_internal(&self, effect: Effect<Action>, tracking: EffectTracking) {
            match effect {
                Effect::None => {
                    tracing::trace!("Executing Effect::None (no-op)");
                    metrics::counter!("store.effects.executed", "type" => "none").increment(1);
                },
                Effect::Future(fut) => {
                    tracing::trace!("Executing Effect::Future");
                    metrics::counter!("store.effects.executed", "type" => "future").increment(1);
                    tracking.increment();

                    self.pending_effects.fetch_add(1, Ordering::SeqCst);
                    let pending_guard = AtomicCounterGuard(Arc::clone(&self.pending_effects));

                    let store = self.clone();

                    tokio::spawn(async move {
                        let _guard = DecrementGuard(tracking);
                        let _pending_guard = pending_guard;

                        if let Some(action) = fut.await {
                            tracing::trace!(
                                action_type = %action.action_type(),
                                "Effect produced an action, feeding back"
                            );
                            let _ = store.dispatch(action.clone()).await;
                            let _ = store.action_broadcast.send(action);
                        } else {
                            tracing::trace!("Effect::Future completed with no action");
                        }
                    });
                },
            }
        }
    }

    impl<R> Clone for Store<R>
    where
        R: Reducer<State = Value, Action = Action>,
    {
        fn clone(&self) -> Self {
            Self {
                state: Arc::clone(&self.state),
                reducer: Arc::clone(&self.reducer),
                environment: Arc::clone(&self.environment),
                listeners: Arc::clone(&self.listeners),
                config: self.config.clone(),
                shutdown: Arc::clone(&self.shutdown),
                pending_effects: Arc::clone(&self.pending_effects),
                action_broadcast: self.action_broadcast.clone(),
            }
        }
    }
}

// Re-export for convenience
pub use store::Store;
