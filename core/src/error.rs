//! Error types for request slices.
//!
//! [`RequestError`] covers everything that can go wrong between a `start`
//! action and its `success`: building the request, the network call, and
//! decoding or parsing the answer. These are business-level failures and end
//! up in slice state as a `failed` action.
//!
//! [`ConfigError`] covers request descriptors that cannot be turned into a
//! slice at all; templates refuse to build with one.

use serde::Serialize;
use serde_json::Value;
use thiserror::Error;

/// Errors raised while performing a slice's request.
///
/// The type is serializable so it can be normalized into an
/// [`ErrorRecord`](crate::transcode::ErrorRecord): the `log` of a record is
/// this enum's JSON form.
#[derive(Error, Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum RequestError {
    /// The call never produced a response (connection refused, DNS, TLS, ...)
    #[error("Network error: {message}")]
    Network {
        /// Transport-level description
        message: String,
    },

    /// The server answered with a non-success status
    #[error("Request failed with status code {status}")]
    Status {
        /// HTTP status code
        status: u16,
        /// Canonical reason phrase
        #[serde(rename = "statusText")]
        status_text: String,
        /// Response body, if any
        data: Value,
    },

    /// The response body could not be decoded
    #[error("Failed to decode response: {message}")]
    Decode {
        /// Decoder description
        message: String,
    },

    /// A paginated fetch continued before any `start` captured a payload
    #[error("No payload captured for slice '{slice}', dispatch start before more")]
    MissingPayload {
        /// Namespace of the slice
        slice: String,
    },

    /// Raised by user-supplied request, parser or serializer overrides
    #[error("{message}")]
    Custom {
        /// Human readable message
        message: String,
        /// Free-form details kept in the error log
        details: Value,
    },
}

impl RequestError {
    /// Build a [`RequestError::Custom`] without details.
    #[must_use]
    pub fn custom(message: impl Into<String>) -> Self {
        Self::Custom {
            message: message.into(),
            details: Value::Null,
        }
    }
}

impl From<serde_json::Error> for RequestError {
    fn from(err: serde_json::Error) -> Self {
        Self::Decode {
            message: err.to_string(),
        }
    }
}

/// Errors raised while validating or loading a request descriptor.
#[derive(Error, Debug)]
pub enum ConfigError {
    /// The descriptor is structurally valid but unusable
    #[error("Invalid request configuration: {0}")]
    Invalid(String),

    /// The descriptor could not be parsed
    #[error("Failed to parse request configuration: {0}")]
    Parse(#[from] serde_json::Error),
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_status_error_message_and_log_shape() {
        let error = RequestError::Status {
            status: 404,
            status_text: "Not Found".to_string(),
            data: json!({"detail": "missing"}),
        };

        assert_eq!(error.to_string(), "Request failed with status code 404");
        assert_eq!(
            serde_json::to_value(&error).ok(),
            Some(json!({
                "kind": "status",
                "status": 404,
                "statusText": "Not Found",
                "data": {"detail": "missing"}
            }))
        );
    }

    #[test]
    fn test_custom_error_displays_message() {
        let error = RequestError::custom("boom");
        assert_eq!(error.to_string(), "boom");
    }
}
