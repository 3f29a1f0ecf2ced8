//! Conditional field reducers combined into one slice reducer.
//!
//! A slice is a JSON object whose fields are each owned by one
//! [`FieldReducer`]: a `(condition, mutation, init)` triple. The condition
//! looks at the cycle of the incoming action (`None` when the action does
//! not belong to the slice) and decides whether the mutation runs.
//!
//! ```
//! use request_slice_core::action::{ActionSet, Cycle};
//! use request_slice_core::reducer::Reducer;
//! use request_slice_core::slice::{SliceDescriptor, combine_slice_reducer};
//! use serde_json::{Value, json};
//!
//! #[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
//! enum Counter { Increment }
//!
//! impl Cycle for Counter {
//!     fn all() -> &'static [Self] { &[Self::Increment] }
//!     fn suffix(self) -> &'static str { "increment" }
//! }
//!
//! let actions = ActionSet::<Counter>::new("count", "clicks");
//! let descriptor = SliceDescriptor::<Counter>::new().field_with_init(
//!     "total",
//!     |kind| kind == Some(Counter::Increment),
//!     |state, _event| json!(state.as_i64().unwrap_or(0) + 1),
//!     json!(0),
//! );
//! let reducer = combine_slice_reducer(descriptor, actions.clone());
//!
//! let mut state = Value::Null;
//! reducer.reduce(&mut state, actions.creator(Counter::Increment).event(), &());
//! assert_eq!(state, json!({"total": 1}));
//! ```

use crate::action::{Action, ActionSet, Cycle};
use crate::effect::Effect;
use crate::reducer::Reducer;
use serde_json::{Map, Value};
use smallvec::SmallVec;
use std::sync::Arc;

/// The action being reduced, together with its cycle within the slice.
#[derive(Debug, Clone, Copy)]
pub struct SliceEvent<'a, C> {
    /// Cycle of the action, `None` when the slice does not own it
    pub kind: Option<C>,
    /// The action itself
    pub action: &'a Action,
}

impl<C> SliceEvent<'_, C> {
    /// A parameter of the action, `null` when absent
    #[must_use]
    pub fn param(&self, key: &str) -> Value {
        self.action.get(key).cloned().unwrap_or(Value::Null)
    }
}

/// Decides whether a field reacts to an action of the given cycle
pub type Condition<C> = Arc<dyn Fn(Option<C>) -> bool + Send + Sync>;

/// Computes a field's next value from its current value and the event
pub type Mutation<C> = Arc<dyn Fn(Value, &SliceEvent<'_, C>) -> Value + Send + Sync>;

/// Reducer for a single field of a slice.
#[derive(Clone)]
pub struct FieldReducer<C> {
    condition: Condition<C>,
    mutation: Mutation<C>,
    init: Value,
}

impl<C: Copy> FieldReducer<C> {
    /// Next value of the field.
    ///
    /// An absent state (`None`) is replaced by the initial value before the
    /// condition is evaluated.
    #[must_use]
    pub fn reduce(&self, state: Option<Value>, event: &SliceEvent<'_, C>) -> Value {
        let state = state.unwrap_or_else(|| self.init.clone());
        if (self.condition)(event.kind) {
            (self.mutation)(state, event)
        } else {
            state
        }
    }

    /// Value used when the field has no state yet
    #[must_use]
    pub const fn init(&self) -> &Value {
        &self.init
    }
}

impl<C> std::fmt::Debug for FieldReducer<C> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FieldReducer")
            .field("init", &self.init)
            .finish_non_exhaustive()
    }
}

/// Wrap a `(condition, mutation, init)` triple into a field reducer.
///
/// `init` defaults to JSON `null`.
pub fn build_field_reducer<C, F, M>(
    condition: F,
    mutation: M,
    init: Option<Value>,
) -> FieldReducer<C>
where
    F: Fn(Option<C>) -> bool + Send + Sync + 'static,
    M: Fn(Value, &SliceEvent<'_, C>) -> Value + Send + Sync + 'static,
{
    FieldReducer {
        condition: Arc::new(condition),
        mutation: Arc::new(mutation),
        init: init.unwrap_or(Value::Null),
    }
}

/// Declares the fields of a slice, in order.
pub struct SliceDescriptor<C> {
    fields: Vec<(String, FieldReducer<C>)>,
}

impl<C> Default for SliceDescriptor<C> {
    fn default() -> Self {
        Self { fields: Vec::new() }
    }
}

impl<C: Copy> SliceDescriptor<C> {
    /// An empty descriptor
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a field that starts as `null`
    #[must_use]
    pub fn field<F, M>(self, name: impl Into<String>, condition: F, mutation: M) -> Self
    where
        F: Fn(Option<C>) -> bool + Send + Sync + 'static,
        M: Fn(Value, &SliceEvent<'_, C>) -> Value + Send + Sync + 'static,
    {
        self.push(name, build_field_reducer(condition, mutation, None))
    }

    /// Add a field with an explicit initial value
    #[must_use]
    pub fn field_with_init<F, M>(
        self,
        name: impl Into<String>,
        condition: F,
        mutation: M,
        init: Value,
    ) -> Self
    where
        F: Fn(Option<C>) -> bool + Send + Sync + 'static,
        M: Fn(Value, &SliceEvent<'_, C>) -> Value + Send + Sync + 'static,
    {
        self.push(name, build_field_reducer(condition, mutation, Some(init)))
    }

    /// Add a prebuilt field reducer
    #[must_use]
    pub fn push(mut self, name: impl Into<String>, reducer: FieldReducer<C>) -> Self {
        let name = name.into();
        self.fields.retain(|(existing, _)| *existing != name);
        self.fields.push((name, reducer));
        self
    }

    /// Field names, in declaration order
    #[must_use]
    pub fn field_names(&self) -> Vec<String> {
        self.fields.iter().map(|(name, _)| name.clone()).collect()
    }
}

/// Object-shaped reducer for one slice.
///
/// Every field reducer sees the same action and only the previous value of
/// its own field; fields never observe each other's updates within one
/// dispatch.
pub struct SliceReducer<C: Cycle> {
    actions: ActionSet<C>,
    fields: Arc<Vec<(String, FieldReducer<C>)>>,
}

impl<C: Cycle> Clone for SliceReducer<C> {
    fn clone(&self) -> Self {
        Self {
            actions: self.actions.clone(),
            fields: Arc::clone(&self.fields),
        }
    }
}

impl<C: Cycle> std::fmt::Debug for SliceReducer<C> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SliceReducer")
            .field("actions", &self.actions)
            .field("fields", &self.fields.iter().map(|(n, _)| n).collect::<Vec<_>>())
            .finish()
    }
}

/// Combine a descriptor's field reducers into one slice reducer.
///
/// `actions` is used to recognise which incoming types belong to the slice.
#[must_use]
pub fn combine_slice_reducer<C: Cycle>(
    descriptor: SliceDescriptor<C>,
    actions: ActionSet<C>,
) -> SliceReducer<C> {
    SliceReducer {
        actions,
        fields: Arc::new(descriptor.fields),
    }
}

impl<C: Cycle> SliceReducer<C> {
    /// The slice with every field at its initial value
    #[must_use]
    pub fn initial_state(&self) -> Value {
        Value::Object(
            self.fields
                .iter()
                .map(|(name, field)| (name.clone(), field.init().clone()))
                .collect(),
        )
    }

    /// Pure form of [`Reducer::reduce`]: the next slice state.
    ///
    /// A non-object `state` counts as a slice with no fields yet.
    #[must_use]
    pub fn next_state(&self, state: &Value, action: &Action) -> Value {
        let event = SliceEvent {
            kind: self.actions.kind_of(action.action_type()),
            action,
        };
        let previous = state.as_object();

        let next: Map<String, Value> = self
            .fields
            .iter()
            .map(|(name, field)| {
                let current = previous.and_then(|fields| fields.get(name)).cloned();
                (name.clone(), field.reduce(current, &event))
            })
            .collect();

        Value::Object(next)
    }

    /// Field names, in declaration order
    pub fn field_names(&self) -> impl Iterator<Item = &str> {
        self.fields.iter().map(|(name, _)| name.as_str())
    }

    /// The action set this reducer recognises
    #[must_use]
    pub const fn actions(&self) -> &ActionSet<C> {
        &self.actions
    }
}

impl<C: Cycle> Reducer for SliceReducer<C> {
    type State = Value;
    type Action = Action;
    type Environment = ();

    fn reduce(
        &self,
        state: &mut Self::State,
        action: Self::Action,
        _env: &Self::Environment,
    ) -> SmallVec<[Effect<Self::Action>; 4]> {
        *state = self.next_state(state, &action);
        SmallVec::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::action::{ActionType, Cycle};
    use serde_json::json;

    #[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
    enum TestCycle {
        Bump,
        Reset,
    }

    impl Cycle for TestCycle {
        fn all() -> &'static [Self] {
            &[Self::Bump, Self::Reset]
        }

        fn suffix(self) -> &'static str {
            match self {
                Self::Bump => "bump",
                Self::Reset => "reset",
            }
        }
    }

    fn bump_event(action: &Action) -> SliceEvent<'_, TestCycle> {
        SliceEvent {
            kind: Some(TestCycle::Bump),
            action,
        }
    }

    #[test]
    fn test_field_reducer() {
        let reducer = build_field_reducer(
            |kind: Option<TestCycle>| kind == Some(TestCycle::Bump),
            |state: Value, _: &SliceEvent<'_, TestCycle>| json!(state.as_i64().unwrap_or(0) + 1),
            Some(json!(0)),
        );
        let action = Action::new(ActionType::new("TEST_REDUX"));
        let other = SliceEvent { kind: None, action: &action };

        assert_eq!(reducer.reduce(Some(json!(0)), &bump_event(&action)), json!(1));
        assert_eq!(reducer.reduce(None, &bump_event(&action)), json!(1));
        assert_eq!(reducer.reduce(Some(json!(0)), &other), json!(0));
        assert_eq!(reducer.reduce(None, &other), json!(0));
    }

    #[test]
    fn test_field_reducer_defaults_to_null() {
        let reducer = build_field_reducer(
            |kind: Option<TestCycle>| kind == Some(TestCycle::Bump),
            |state: Value, _: &SliceEvent<'_, TestCycle>| state,
            None,
        );
        let action = Action::new(ActionType::new("RETURN_DEFAULT"));

        assert_eq!(reducer.reduce(None, &SliceEvent { kind: None, action: &action }), Value::Null);
    }

    #[test]
    fn test_slice_fields_see_previous_values_only() {
        let actions = ActionSet::<TestCycle>::new("count", "test");
        let descriptor = SliceDescriptor::<TestCycle>::new()
            .field_with_init(
                "count",
                |kind| kind.is_some(),
                |state, event: &SliceEvent<'_, TestCycle>| match event.kind {
                    Some(TestCycle::Bump) => json!(state.as_i64().unwrap_or(0) + 1),
                    _ => json!(0),
                },
                json!(0),
            )
            .field(
                "seen",
                |kind| kind == Some(TestCycle::Bump),
                |_, event: &SliceEvent<'_, TestCycle>| event.param("count"),
            );
        let reducer = combine_slice_reducer(descriptor, actions.clone());

        let mut state = reducer.initial_state();
        assert_eq!(state, json!({"count": 0, "seen": null}));

        let bump = actions.creator(TestCycle::Bump).event().with("count", json!("from action"));
        let _ = reducer.reduce(&mut state, bump, &());
        assert_eq!(state, json!({"count": 1, "seen": "from action"}));

        let _ = reducer.reduce(&mut state, Action::new(ActionType::new("UNRELATED")), &());
        assert_eq!(state, json!({"count": 1, "seen": "from action"}));

        let _ = reducer.reduce(&mut state, actions.creator(TestCycle::Reset).event(), &());
        assert_eq!(state, json!({"count": 0, "seen": "from action"}));
    }

    #[test]
    fn test_slice_reducer_returns_no_effects() {
        let actions = ActionSet::<TestCycle>::new("count", "test");
        let reducer = combine_slice_reducer(SliceDescriptor::new(), actions.clone());
        let mut state = Value::Null;

        let effects = reducer.reduce(&mut state, actions.creator(TestCycle::Bump).event(), &());
        assert!(effects.is_empty());
        assert_eq!(state, json!({}));
    }

    #[test]
    fn test_redeclared_field_replaces_previous() {
        let descriptor = SliceDescriptor::<TestCycle>::new()
            .field("a", |_| true, |s, _| s)
            .field("b", |_| true, |s, _| s)
            .field("a", |_| true, |s, _| s);

        assert_eq!(descriptor.field_names(), vec!["b".to_string(), "a".to_string()]);
    }
}
