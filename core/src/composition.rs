//! Reducer composition utilities
//!
//! Slices are mounted into a JSON state tree, so composition is keyed:
//! - **`combine_named`**: Run one reducer per top-level key of an object state
//! - **`nest_at`**: Focus a reducer on the value at a dotted path
//!
//! The path a slice is mounted at must match the `reducer_path` its
//! selectors were built with.
//!
//! # Examples
//!
//! ```
//! use request_slice_core::composition::{combine_named, nest_at};
//! use request_slice_core::reducer::Reducer;
//! use request_slice_core::{Action, ActionType, Effect, SmallVec, Value, smallvec};
//! use serde_json::json;
//!
//! struct Counter;
//!
//! impl Reducer for Counter {
//!     type State = Value;
//!     type Action = Action;
//!     type Environment = ();
//!
//!     fn reduce(
//!         &self,
//!         state: &mut Value,
//!         action: Action,
//!         _env: &(),
//!     ) -> SmallVec<[Effect<Action>; 4]> {
//!         if action.action_type().as_str() == "INCREMENT" {
//!             *state = json!(state.as_i64().unwrap_or(0) + 1);
//!         }
//!         smallvec![]
//!     }
//! }
//!
//! let root = combine_named(vec![("api".to_string(), nest_at("counters.clicks", Counter))]);
//!
//! let mut state = json!({"session": "abc"});
//! let _ = root.reduce(&mut state, Action::new(ActionType::new("INCREMENT")), &());
//!
//! assert_eq!(state, json!({"session": "abc", "api": {"counters": {"clicks": 1}}}));
//! ```

use crate::effect::Effect;
use crate::reducer::Reducer;
use serde_json::{Map, Value};
use smallvec::SmallVec;
use std::sync::Arc;

/// A reducer over a JSON sub-tree, shareable between compositions.
pub type NamedChild<A, E> =
    Arc<dyn Reducer<State = Value, Action = A, Environment = E> + Send + Sync>;

/// Combines reducers that each own one top-level key of an object state.
///
/// Every child sees every action. A child whose key is absent receives
/// `null` and is expected to answer with its initial state. Keys without a
/// reducer are carried over untouched. Effects are concatenated in child
/// order.
#[must_use]
pub fn combine_named<A, E, R>(children: Vec<(String, R)>) -> NamedReducer<A, E>
where
    A: Clone + 'static,
    E: 'static,
    R: Reducer<State = Value, Action = A, Environment = E> + Send + Sync + 'static,
{
    NamedReducer {
        children: children
            .into_iter()
            .map(|(key, reducer)| (key, Arc::new(reducer) as NamedChild<A, E>))
            .collect(),
    }
}

/// A keyed combination of reducers.
///
/// Created by [`combine_named`] or built up with [`NamedReducer::with`].
pub struct NamedReducer<A, E> {
    children: Vec<(String, NamedChild<A, E>)>,
}

impl<A, E> Default for NamedReducer<A, E> {
    fn default() -> Self {
        Self { children: Vec::new() }
    }
}

impl<A, E> Clone for NamedReducer<A, E> {
    fn clone(&self) -> Self {
        Self {
            children: self.children.clone(),
        }
    }
}

impl<A, E> std::fmt::Debug for NamedReducer<A, E> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("NamedReducer")
            .field("keys", &self.keys().collect::<Vec<_>>())
            .finish()
    }
}

impl<A, E> NamedReducer<A, E>
where
    A: Clone + 'static,
    E: 'static,
{
    /// Mount another reducer under `key`, replacing any previous one
    #[must_use]
    pub fn with<R>(mut self, key: impl Into<String>, reducer: R) -> Self
    where
        R: Reducer<State = Value, Action = A, Environment = E> + Send + Sync + 'static,
    {
        let key = key.into();
        self.children.retain(|(existing, _)| *existing != key);
        self.children.push((key, Arc::new(reducer) as NamedChild<A, E>));
        self
    }
}

impl<A, E> NamedReducer<A, E> {
    /// Keys with a mounted reducer, in reduction order
    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.children.iter().map(|(key, _)| key.as_str())
    }
}

impl<A, E> Reducer for NamedReducer<A, E>
where
    A: Clone + 'static,
    E: 'static,
{
    type State = Value;
    type Action = A;
    type Environment = E;

    fn reduce(&self, state: &mut Value, action: A, env: &E) -> SmallVec<[Effect<A>; 4]> {
        let mut fields = take_object(state);
        let mut all_effects = SmallVec::new();

        for (key, reducer) in &self.children {
            let mut child = fields.remove(key).unwrap_or(Value::Null);
            all_effects.extend(reducer.reduce(&mut child, action.clone(), env));
            fields.insert(key.clone(), child);
        }

        *state = Value::Object(fields);
        all_effects
    }
}

/// Scopes a reducer to the value at a dotted path of a larger state.
///
/// Missing intermediate objects are created and non-objects found on the
/// way are replaced by objects.
pub fn nest_at<R>(path: &str, reducer: R) -> NestedReducer<R>
where
    R: Reducer<State = Value>,
{
    NestedReducer {
        segments: path
            .split('.')
            .filter(|segment| !segment.is_empty())
            .map(str::to_string)
            .collect(),
        reducer,
    }
}

/// A reducer mounted below a fixed path.
///
/// Created by [`nest_at`].
#[derive(Clone, Debug)]
pub struct NestedReducer<R> {
    segments: Vec<String>,
    reducer: R,
}

impl<R> NestedReducer<R> {
    /// Dotted mount path
    #[must_use]
    pub fn path(&self) -> String {
        self.segments.join(".")
    }
}

impl<R> Reducer for NestedReducer<R>
where
    R: Reducer<State = Value>,
{
    type State = Value;
    type Action = R::Action;
    type Environment = R::Environment;

    fn reduce(
        &self,
        state: &mut Value,
        action: R::Action,
        env: &R::Environment,
    ) -> SmallVec<[Effect<R::Action>; 4]> {
        reduce_at(&self.reducer, &self.segments, state, action, env)
    }
}

fn reduce_at<R>(
    reducer: &R,
    segments: &[String],
    state: &mut Value,
    action: R::Action,
    env: &R::Environment,
) -> SmallVec<[Effect<R::Action>; 4]>
where
    R: Reducer<State = Value>,
{
    let Some((head, rest)) = segments.split_first() else {
        return reducer.reduce(state, action, env);
    };

    let mut fields = take_object(state);
    let mut child = fields.remove(head).unwrap_or(Value::Null);
    let effects = reduce_at(reducer, rest, &mut child, action, env);
    fields.insert(head.clone(), child);
    *state = Value::Object(fields);

    effects
}

fn take_object(value: &mut Value) -> Map<String, Value> {
    match std::mem::take(value) {
        Value::Object(fields) => fields,
        _ => Map::new(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::action::{Action, ActionType};
    use serde_json::json;
    use smallvec::smallvec;

    struct CounterReducer;

    impl Reducer for CounterReducer {
        type State = Value;
        type Action = Action;
        type Environment = ();

        fn reduce(
            &self,
            state: &mut Value,
            action: Action,
            _env: &(),
        ) -> SmallVec<[Effect<Action>; 4]> {
            match action.action_type().as_str() {
                "INCREMENT" => {
                    *state = json!(state.as_i64().unwrap_or(0) + 1);
                    smallvec![Effect::None]
                },
                "DECREMENT" => {
                    *state = json!(state.as_i64().unwrap_or(0) - 1);
                    smallvec![Effect::None]
                },
                _ => smallvec![],
            }
        }
    }

    struct NameReducer;

    impl Reducer for NameReducer {
        type State = Value;
        type Action = Action;
        type Environment = ();

        fn reduce(
            &self,
            state: &mut Value,
            action: Action,
            _env: &(),
        ) -> SmallVec<[Effect<Action>; 4]> {
            if action.action_type().as_str() == "SET_NAME" {
                *state = action.get("name").cloned().unwrap_or(Value::Null);
            }
            if state.is_null() {
                *state = json!("anonymous");
            }
            smallvec![]
        }
    }

    fn act(action_type: &str) -> Action {
        Action::new(ActionType::new(action_type))
    }

    #[test]
    fn test_combine_named() {
        let combined = NamedReducer::default()
            .with("counter", CounterReducer)
            .with("name", NameReducer);

        let mut state = json!({"untouched": [1, 2]});

        let effects = combined.reduce(&mut state, act("INCREMENT"), &());
        assert_eq!(effects.len(), 1);
        assert_eq!(state, json!({"untouched": [1, 2], "counter": 1, "name": "anonymous"}));

        let _ = combined.reduce(&mut state, act("SET_NAME").with("name", json!("Alice")), &());
        let _ = combined.reduce(&mut state, act("DECREMENT"), &());
        assert_eq!(state, json!({"untouched": [1, 2], "counter": 0, "name": "Alice"}));
        assert_eq!(combined.keys().collect::<Vec<_>>(), vec!["counter", "name"]);
    }

    #[test]
    fn test_combine_named_replaces_non_object_root() {
        let combined = combine_named(vec![("counter".to_string(), CounterReducer)]);
        let mut state = Value::Null;

        let _ = combined.reduce(&mut state, act("INCREMENT"), &());

        assert_eq!(state, json!({"counter": 1}));
    }

    #[test]
    fn test_nest_at() {
        let nested = nest_at("api.stats.clicks", CounterReducer);
        let mut state = json!({"api": {"other": true, "stats": 7}});

        let _ = nested.reduce(&mut state, act("INCREMENT"), &());
        let _ = nested.reduce(&mut state, act("INCREMENT"), &());

        assert_eq!(nested.path(), "api.stats.clicks");
        assert_eq!(state, json!({"api": {"other": true, "stats": {"clicks": 2}}}));
    }

    #[test]
    fn test_nest_at_empty_path_is_identity() {
        let nested = nest_at("", CounterReducer);
        let mut state = json!(4);

        let _ = nested.reduce(&mut state, act("INCREMENT"), &());

        assert_eq!(state, json!(5));
    }
}
