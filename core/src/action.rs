//! Action types, action constructors and per-slice action sets.
//!
//! Every action carries an [`ActionType`] of the form
//! `{BASE}_{NAMESPACE}[_{CYCLE}]` plus arbitrary JSON parameters. A slice owns
//! one [`ActionSet`], which maps its closed [`Cycle`] enum to concrete types
//! and back, so reducers can pattern-match on the cycle instead of comparing
//! strings.
//!
//! # Example
//!
//! ```
//! use request_slice_core::action::{derive_action_type, make_action_constructor};
//! use serde_json::json;
//!
//! let action_type = derive_action_type("get", "user", Some("start"));
//! assert_eq!(action_type.as_str(), "GET_USER_START");
//!
//! let start = make_action_constructor(action_type);
//! let action = start.create(json!({"payload": {"id": 1}}).as_object().cloned());
//! assert_eq!(action.get("payload"), Some(&json!({"id": 1})));
//! ```

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::fmt;
use std::hash::Hash;
use std::sync::Arc;

/// Uppercase action discriminator, e.g. `GET_USER_START`.
///
/// Cheap to clone; serializes as a plain string.
#[derive(Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ActionType(Arc<str>);

impl ActionType {
    /// Wrap an already-derived type string verbatim.
    #[must_use]
    pub fn new(raw: impl AsRef<str>) -> Self {
        Self(Arc::from(raw.as_ref()))
    }

    /// The type as a string slice
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Debug for ActionType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ActionType({})", self.0)
    }
}

impl fmt::Display for ActionType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for ActionType {
    fn from(raw: &str) -> Self {
        Self::new(raw)
    }
}

/// Derive the canonical action type for `(name, namespace, cycle)`.
///
/// Name and namespace are uppercased and joined with `_`; the cycle, when
/// given, is appended as `_{CYCLE}`. Nothing is escaped, so callers must keep
/// `_` out of names that could otherwise collide.
#[must_use]
pub fn derive_action_type(name: &str, namespace: &str, cycle: Option<&str>) -> ActionType {
    let base = format!("{}_{}", name.to_uppercase(), namespace.to_uppercase());
    match cycle {
        Some(cycle) => ActionType::new(format!("{base}_{}", cycle.to_uppercase())),
        None => ActionType::new(base),
    }
}

/// A dispatched event: `{type, ...params}`.
///
/// Serializes flat, with `type` next to the parameters.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Action {
    #[serde(rename = "type")]
    action_type: ActionType,
    #[serde(flatten)]
    params: Map<String, Value>,
}

impl Action {
    /// An action with no parameters
    #[must_use]
    pub fn new(action_type: ActionType) -> Self {
        Self {
            action_type,
            params: Map::new(),
        }
    }

    /// An action carrying the given parameters.
    ///
    /// A `type` key among the parameters is dropped; the discriminator always
    /// comes from `action_type`.
    #[must_use]
    pub fn with_params(action_type: ActionType, mut params: Map<String, Value>) -> Self {
        params.remove("type");
        Self {
            action_type,
            params,
        }
    }

    /// The discriminator of this action
    #[must_use]
    pub const fn action_type(&self) -> &ActionType {
        &self.action_type
    }

    /// All parameters except `type`
    #[must_use]
    pub const fn params(&self) -> &Map<String, Value> {
        &self.params
    }

    /// A single parameter
    #[must_use]
    pub fn get(&self, key: &str) -> Option<&Value> {
        self.params.get(key)
    }

    /// Copy of this action with one more parameter
    #[must_use]
    pub fn with(mut self, key: impl Into<String>, value: Value) -> Self {
        let key = key.into();
        if key != "type" {
            self.params.insert(key, value);
        }
        self
    }
}

/// Builds actions of one fixed type.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ActionCreator {
    action_type: ActionType,
}

impl ActionCreator {
    /// The type every created action carries
    #[must_use]
    pub const fn action_type(&self) -> &ActionType {
        &self.action_type
    }

    /// `{type}` when `params` is `None`, `{type, ...params}` otherwise.
    #[must_use]
    pub fn create(&self, params: Option<Map<String, Value>>) -> Action {
        match params {
            Some(params) => Action::with_params(self.action_type.clone(), params),
            None => Action::new(self.action_type.clone()),
        }
    }

    /// Shorthand for `create(None)`
    #[must_use]
    pub fn event(&self) -> Action {
        self.create(None)
    }
}

/// Create the constructor for one action type.
#[must_use]
pub const fn make_action_constructor(action_type: ActionType) -> ActionCreator {
    ActionCreator { action_type }
}

/// A closed set of life-cycle phases owned by one slice.
///
/// ```
/// use request_slice_core::action::Cycle;
///
/// #[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
/// enum Toggle { On, Off }
///
/// impl Cycle for Toggle {
///     fn all() -> &'static [Self] { &[Self::On, Self::Off] }
///     fn suffix(self) -> &'static str {
///         match self { Self::On => "on", Self::Off => "off" }
///     }
/// }
/// ```
pub trait Cycle: Copy + Eq + Hash + fmt::Debug + Send + Sync + 'static {
    /// Every phase, in declaration order
    fn all() -> &'static [Self];

    /// Lowercase suffix appended to the action type
    fn suffix(self) -> &'static str;
}

/// One entry of an [`ActionSet`]
#[derive(Clone, Debug)]
pub struct ActionEntry {
    /// Constructor for this cycle's actions
    pub creator: ActionCreator,
    /// Type of this cycle's actions
    pub action_type: ActionType,
}

/// Action types and constructors of one slice, keyed by cycle.
#[derive(Clone, Debug)]
pub struct ActionSet<C: Cycle> {
    name: String,
    namespace: String,
    entries: Vec<(C, ActionEntry)>,
}

/// Derive one entry per cycle, preserving input order.
#[must_use]
pub fn build_action_set<C: Cycle>(name: &str, namespace: &str, cycles: &[C]) -> ActionSet<C> {
    let entries = cycles
        .iter()
        .map(|&cycle| {
            let action_type = derive_action_type(name, namespace, Some(cycle.suffix()));
            let entry = ActionEntry {
                creator: make_action_constructor(action_type.clone()),
                action_type,
            };
            (cycle, entry)
        })
        .collect();

    ActionSet {
        name: name.to_string(),
        namespace: namespace.to_string(),
        entries,
    }
}

impl<C: Cycle> ActionSet<C> {
    /// Entries for every cycle of `C`
    #[must_use]
    pub fn new(name: &str, namespace: &str) -> Self {
        build_action_set(name, namespace, C::all())
    }

    /// Base name the types were derived from
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Namespace the types were derived from
    #[must_use]
    pub fn namespace(&self) -> &str {
        &self.namespace
    }

    /// Entry for a cycle, if the set was built with it
    #[must_use]
    pub fn get(&self, cycle: C) -> Option<&ActionEntry> {
        self.entries
            .iter()
            .find(|(c, _)| *c == cycle)
            .map(|(_, entry)| entry)
    }

    /// Constructor for a cycle.
    ///
    /// Falls back to deriving the type when the set was built without it.
    #[must_use]
    pub fn creator(&self, cycle: C) -> ActionCreator {
        self.get(cycle).map_or_else(
            || {
                make_action_constructor(derive_action_type(
                    &self.name,
                    &self.namespace,
                    Some(cycle.suffix()),
                ))
            },
            |entry| entry.creator.clone(),
        )
    }

    /// Type of a cycle's actions
    #[must_use]
    pub fn action_type(&self, cycle: C) -> ActionType {
        self.creator(cycle).action_type
    }

    /// Which cycle of this set an incoming type belongs to
    #[must_use]
    pub fn kind_of(&self, action_type: &ActionType) -> Option<C> {
        self.entries
            .iter()
            .find(|(_, entry)| entry.action_type == *action_type)
            .map(|(cycle, _)| *cycle)
    }

    /// Entries in build order
    pub fn iter(&self) -> impl Iterator<Item = (C, &ActionEntry)> {
        self.entries.iter().map(|(cycle, entry)| (*cycle, entry))
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use proptest::prelude::*;
    use serde_json::json;

    #[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
    enum TestCycle {
        Start,
        Stop,
    }

    impl Cycle for TestCycle {
        fn all() -> &'static [Self] {
            &[Self::Start, Self::Stop]
        }

        fn suffix(self) -> &'static str {
            match self {
                Self::Start => "start",
                Self::Stop => "stop",
            }
        }
    }

    #[test]
    fn test_derive_action_type() {
        assert_eq!(derive_action_type("test", "redux", None).as_str(), "TEST_REDUX");
        assert_eq!(
            derive_action_type("test", "redux", Some("saga")).as_str(),
            "TEST_REDUX_SAGA"
        );
    }

    #[test]
    fn test_constructor_without_params() {
        let creator = make_action_constructor(ActionType::new("ACTION_TYPE"));
        let action = creator.create(None);

        assert_eq!(action.action_type().as_str(), "ACTION_TYPE");
        assert!(action.params().is_empty());
        assert_eq!(serde_json::to_value(&action).unwrap(), json!({"type": "ACTION_TYPE"}));
    }

    #[test]
    fn test_constructor_merges_params() {
        let creator = make_action_constructor(ActionType::new("ACTION_TYPE"));
        let params = json!({"payload": "test"}).as_object().cloned();

        assert_eq!(
            serde_json::to_value(creator.create(params)).unwrap(),
            json!({"type": "ACTION_TYPE", "payload": "test"})
        );
    }

    #[test]
    fn test_params_cannot_override_type() {
        let creator = make_action_constructor(ActionType::new("REAL"));
        let action = creator.create(json!({"type": "FAKE", "x": 1}).as_object().cloned());

        assert_eq!(action.action_type().as_str(), "REAL");
        assert_eq!(action.get("type"), None);
        assert_eq!(action.clone().with("type", json!("FAKE")), action);
    }

    #[test]
    fn test_action_set() {
        let set = build_action_set("test", "redux-rs", TestCycle::all());
        let start = set.get(TestCycle::Start).unwrap();

        assert_eq!(start.action_type.as_str(), "TEST_REDUX-RS_START");
        let params = json!({"params": {"data": "content"}}).as_object().cloned();
        assert_eq!(
            serde_json::to_value(start.creator.create(params)).unwrap(),
            json!({"type": "TEST_REDUX-RS_START", "params": {"data": "content"}})
        );
        assert_eq!(set.kind_of(&ActionType::new("TEST_REDUX-RS_STOP")), Some(TestCycle::Stop));
        assert_eq!(set.kind_of(&ActionType::new("OTHER")), None);
    }

    #[test]
    fn test_partial_action_set_still_derives_creators() {
        let set = build_action_set("test", "redux", &[TestCycle::Start]);

        assert!(set.get(TestCycle::Stop).is_none());
        assert_eq!(set.kind_of(&ActionType::new("TEST_REDUX_STOP")), None);
        assert_eq!(set.action_type(TestCycle::Stop).as_str(), "TEST_REDUX_STOP");
    }

    #[test]
    fn test_action_deserializes_flat() {
        let raw = json!({"type": "GET_USER_START", "payload": {"id": 1}});
        let action: Action = serde_json::from_value(raw).unwrap();

        assert_eq!(action.action_type().as_str(), "GET_USER_START");
        assert_eq!(action.get("payload"), Some(&json!({"id": 1})));
    }

    #[test]
    fn test_action_type_serializes_as_plain_string() {
        let action_type = ActionType::new("GET_USER_SUCCESS");

        assert_eq!(serde_json::to_value(&action_type).unwrap(), json!("GET_USER_SUCCESS"));
        let back: ActionType = serde_json::from_value(json!("GET_USER_SUCCESS")).unwrap();
        assert_eq!(back, action_type);
    }

    proptest! {
        #[test]
        fn prop_action_type_is_uppercase_and_stable(
            name in "[a-zA-Z]{1,12}",
            namespace in "[a-zA-Z-]{1,12}",
            cycle in proptest::option::of("[a-zA-Z]{1,8}"),
        ) {
            let first = derive_action_type(&name, &namespace, cycle.as_deref());
            let again = derive_action_type(&name, &namespace, cycle.as_deref());
            let shouted = derive_action_type(
                &name.to_uppercase(),
                &namespace.to_lowercase(),
                cycle.as_deref().map(str::to_lowercase).as_deref(),
            );

            prop_assert_eq!(&first, &again);
            prop_assert_eq!(&first, &shouted);
            prop_assert_eq!(first.as_str(), first.as_str().to_uppercase());
        }
    }
}
