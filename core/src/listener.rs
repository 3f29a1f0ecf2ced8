//! Effect routines and the listeners that trigger them.
//!
//! A [`Listener`] is the registration handed to the effect scheduler (the
//! runtime `Store`): a set of action types plus an [`EffectRoutine`]. For
//! every dispatched action whose type is in the set, the scheduler asks the
//! listener for an [`Effect::Future`] and runs it as an independent task.
//! Overlapping invocations are never serialized or cancelled.
//!
//! Routines read state through [`StateAccess`]. The scheduler hands each
//! routine a [`StateSnapshot`] taken right after its triggering action was
//! reduced, so back-to-back triggers each see their own state.

use crate::action::{Action, ActionType};
use crate::effect::Effect;
use crate::selector::Selector;
use futures::future::BoxFuture;
use serde_json::Value;
use std::future::Future;
use std::sync::Arc;

/// Read access to the global state seen by an effect routine.
pub trait StateAccess: Send + Sync {
    /// Read one selector against the state
    fn select<'a>(&'a self, selector: &'a Selector) -> BoxFuture<'a, Value>;
}

/// Shared handle to the scheduler's state
pub type SharedState = Arc<dyn StateAccess>;

/// The global state frozen at one point of the dispatch sequence.
#[derive(Debug, Clone, PartialEq)]
pub struct StateSnapshot(Value);

impl StateSnapshot {
    /// Freeze `state`
    #[must_use]
    pub const fn new(state: Value) -> Self {
        Self(state)
    }

    /// Type-erased handle for [`Listener::effect_for`]
    #[must_use]
    pub fn shared(self) -> SharedState {
        Arc::new(self)
    }
}

impl StateAccess for StateSnapshot {
    fn select<'a>(&'a self, selector: &'a Selector) -> BoxFuture<'a, Value> {
        Box::pin(futures::future::ready(selector.select(&self.0)))
    }
}

/// A boxed effect routine: runs once per triggering action.
pub type EffectRoutine =
    Arc<dyn Fn(Action, SharedState) -> BoxFuture<'static, Option<Action>> + Send + Sync>;

/// Wrap an async routine so the scheduler can store and invoke it.
pub fn wrap_effect_routine<F, Fut>(routine: F) -> EffectRoutine
where
    F: Fn(Action, SharedState) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Option<Action>> + Send + 'static,
{
    Arc::new(move |action: Action, state: SharedState| -> BoxFuture<'static, Option<Action>> {
        Box::pin(routine(action, state))
    })
}

/// Wrap a routine that does not suspend.
///
/// Its result is handed back through a ready future.
pub fn wrap_effect_fn<F>(routine: F) -> EffectRoutine
where
    F: Fn(Action) -> Option<Action> + Send + Sync + 'static,
{
    Arc::new(move |action: Action, _state: SharedState| -> BoxFuture<'static, Option<Action>> {
        let output = routine(action);
        Box::pin(futures::future::ready(output))
    })
}

/// How a listener reacts to matching actions
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
#[non_exhaustive]
pub enum TriggerMode {
    /// Run the routine for every matching action, concurrently
    #[default]
    EveryMatching,
}

/// One or more action types a listener subscribes to.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Triggers(Vec<ActionType>);

impl From<ActionType> for Triggers {
    fn from(action_type: ActionType) -> Self {
        Self(vec![action_type])
    }
}

impl From<Vec<ActionType>> for Triggers {
    fn from(action_types: Vec<ActionType>) -> Self {
        Self(action_types)
    }
}

impl<const N: usize> From<[ActionType; N]> for Triggers {
    fn from(action_types: [ActionType; N]) -> Self {
        Self(action_types.to_vec())
    }
}

/// An effect routine registered for a set of action types.
#[derive(Clone)]
pub struct Listener {
    triggers: Vec<ActionType>,
    routine: EffectRoutine,
    mode: TriggerMode,
}

/// Register `routine` for one or several action types.
pub fn build_listener(
    triggers: impl Into<Triggers>,
    routine: EffectRoutine,
    mode: TriggerMode,
) -> Listener {
    Listener {
        triggers: triggers.into().0,
        routine,
        mode,
    }
}

impl Listener {
    /// Types this listener reacts to
    #[must_use]
    pub fn triggers(&self) -> &[ActionType] {
        &self.triggers
    }

    /// Trigger policy
    #[must_use]
    pub const fn mode(&self) -> TriggerMode {
        self.mode
    }

    /// Whether an action of this type starts the routine
    #[must_use]
    pub fn matches(&self, action_type: &ActionType) -> bool {
        self.triggers.contains(action_type)
    }

    /// The effect to run for `action`, if it matches.
    ///
    /// The future is created lazily; nothing runs until the scheduler polls it.
    #[must_use]
    pub fn effect_for(&self, action: &Action, state: SharedState) -> Option<Effect<Action>> {
        if !self.matches(action.action_type()) {
            return None;
        }
        match self.mode {
            TriggerMode::EveryMatching => {
                Some(Effect::Future((self.routine)(action.clone(), state)))
            },
        }
    }
}

impl std::fmt::Debug for Listener {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Listener")
            .field("triggers", &self.triggers)
            .field("mode", &self.mode)
            .finish_non_exhaustive()
    }
}
