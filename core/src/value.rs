//! Truthiness rules shared by selectors and transcoding.
//!
//! Slices store plain JSON, and several building blocks decide whether a
//! field "is there" by its truthiness rather than by its presence:
//!
//! | Value                       | truthy | present |
//! |-----------------------------|--------|---------|
//! | `null`, missing             | no     | no      |
//! | `false`                     | no     | no      |
//! | `0`, `0.0`                  | no     | yes     |
//! | `""`                        | no     | no      |
//! | anything else               | yes    | yes     |

use serde_json::Value;

/// Whether a JSON value is truthy.
#[must_use]
pub fn is_truthy(value: &Value) -> bool {
    match value {
        Value::Null => false,
        Value::Bool(b) => *b,
        Value::Number(n) => n.as_f64().is_some_and(|f| f != 0.0 && !f.is_nan()),
        Value::String(s) => !s.is_empty(),
        Value::Array(_) | Value::Object(_) => true,
    }
}

/// Whether a JSON value is exactly the number zero.
#[must_use]
pub fn is_zero(value: &Value) -> bool {
    matches!(value, Value::Number(n) if n.as_f64() == Some(0.0))
}

/// Truthy, or exactly zero. Used for ids and rename-map copies.
#[must_use]
pub fn is_present(value: &Value) -> bool {
    is_truthy(value) || is_zero(value)
}
