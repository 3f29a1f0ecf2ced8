//! Path-based selectors into the global state tree.
//!
//! A selector reads one field of a slice mounted somewhere in the state
//! tree. The location is a dotted path prefix (`"api.users"`) and the field
//! name is appended as the last segment.
//!
//! # Falsy leaves
//!
//! The walk stops and yields `null` as soon as any segment resolves to a
//! falsy value: `null`, `false`, `0`, `""` or a missing key. A slice field
//! legitimately holding `0` or `false` therefore reads back as `null`, and
//! callers cannot tell it apart from an absent path.
//!
//! ```
//! use request_slice_core::selector::build_selector;
//! use serde_json::{Value, json};
//!
//! let selector = build_selector("count", Some("reducer.content.data"));
//! let state = json!({"reducer": {"content": {"data": {"count": 42}}}});
//!
//! assert_eq!(selector.select(&state), json!(42));
//! assert_eq!(selector.select(&json!({})), Value::Null);
//! ```

use crate::value::is_truthy;
use serde_json::Value;

/// Accessor for one field at a fixed location in the state tree.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Selector {
    field: String,
    segments: Vec<String>,
}

/// Build a selector for `field` under `path_prefix`.
///
/// An empty prefix is treated like no prefix.
#[must_use]
pub fn build_selector(field: &str, path_prefix: Option<&str>) -> Selector {
    let full_path = match path_prefix {
        Some(prefix) if !prefix.is_empty() => format!("{prefix}.{field}"),
        _ => field.to_string(),
    };

    Selector {
        field: field.to_string(),
        segments: full_path.split('.').map(str::to_string).collect(),
    }
}

impl Selector {
    /// Field this selector reads
    #[must_use]
    pub fn field(&self) -> &str {
        &self.field
    }

    /// Full dotted path, field included
    #[must_use]
    pub fn path(&self) -> String {
        self.segments.join(".")
    }

    /// Borrowing form of [`select`](Self::select); `None` stands for `null`.
    #[must_use]
    pub fn select_ref<'a>(&self, root: &'a Value) -> Option<&'a Value> {
        self.segments.iter().try_fold(root, |current, segment| {
            if !is_truthy(current) {
                return None;
            }
            let next = match current {
                Value::Object(fields) => fields.get(segment),
                Value::Array(items) => segment.parse::<usize>().ok().and_then(|i| items.get(i)),
                _ => None,
            }?;
            is_truthy(next).then_some(next)
        })
    }

    /// The value at this selector's path, `null` when any segment is falsy.
    #[must_use]
    pub fn select(&self, root: &Value) -> Value {
        self.select_ref(root).cloned().unwrap_or(Value::Null)
    }
}

/// Selectors for every field of a slice.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct SelectorSet {
    selectors: Vec<Selector>,
}

/// Build one selector per field, all under the same prefix.
#[must_use]
pub fn build_selector_set<S: AsRef<str>>(fields: &[S], path_prefix: Option<&str>) -> SelectorSet {
    SelectorSet {
        selectors: fields
            .iter()
            .map(|field| build_selector(field.as_ref(), path_prefix))
            .collect(),
    }
}

impl SelectorSet {
    /// Selector for one field
    #[must_use]
    pub fn get(&self, field: &str) -> Option<&Selector> {
        self.selectors.iter().find(|selector| selector.field == field)
    }

    /// Read one field; `null` for unknown fields and falsy paths alike.
    #[must_use]
    pub fn select(&self, field: &str, root: &Value) -> Value {
        self.get(field).map_or(Value::Null, |selector| selector.select(root))
    }

    /// All selectors, in field order
    pub fn iter(&self) -> impl Iterator<Item = &Selector> {
        self.selectors.iter()
    }

    /// Number of selectors
    #[must_use]
    pub fn len(&self) -> usize {
        self.selectors.len()
    }

    /// Whether the set is empty
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.selectors.is_empty()
    }
}
