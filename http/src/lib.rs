//! # Request Slice HTTP
//!
//! [`Transport`] implementation on top of a shared [`reqwest::Client`].
//!
//! ```ignore
//! use request_slice_http::ReqwestTransport;
//!
//! let transport = ReqwestTransport::new().with_timeout(Duration::from_secs(10)).shared();
//! let (users, _) = async_template("get", "user", config, Some("user"), transport)?;
//! ```

use futures::future::BoxFuture;
use request_slice_core::RequestError;
use request_slice_core::config::HttpMethod;
use request_slice_core::environment::{HttpRequest, RawResponse, Transport};
use reqwest::{Client, Method, Response};
use serde_json::Value;
use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

/// reqwest-backed network access
///
/// - Query parameters come from the request's JSON object; `null` entries
///   are skipped, strings are sent verbatim and anything else as its JSON text
/// - A present `data` is sent as a JSON body
/// - 2xx answers resolve with the decoded body: JSON when it parses, the raw
///   text as a JSON string otherwise, `null` when empty
/// - Other statuses become [`RequestError::Status`]
#[derive(Clone, Debug, Default)]
pub struct ReqwestTransport {
    client: Client,
    timeout: Option<Duration>,
}

impl ReqwestTransport {
    /// Create a transport with a fresh client
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Reuse an existing client (connection pool, TLS and proxy settings)
    #[must_use]
    pub const fn with_client(client: Client) -> Self {
        Self { client, timeout: None }
    }

    /// Fail calls that take longer than `timeout`
    #[must_use]
    pub const fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    /// Type-erased handle for the templates
    #[must_use]
    pub fn shared(self) -> Arc<dyn Transport> {
        Arc::new(self)
    }

    async fn execute(&self, request: HttpRequest) -> Result<RawResponse, RequestError> {
        let mut builder = self.client.request(to_method(request.method), &request.url);

        let query = query_pairs(request.params.as_ref());
        if !query.is_empty() {
            builder = builder.query(&query);
        }
        for (name, value) in &request.headers {
            builder = builder.header(name, value);
        }
        if let Some(data) = &request.data {
            builder = builder.json(data);
        }
        if let Some(timeout) = self.timeout {
            builder = builder.timeout(timeout);
        }

        tracing::debug!(method = %request.method, url = %request.url, "Sending request");
        let response = builder.send().await.map_err(network_error)?;
        let status = response.status();
        tracing::debug!(status = status.as_u16(), url = %request.url, "Received response");

        let status_text = status.canonical_reason().unwrap_or_default().to_string();
        let headers = header_map(&response);
        let data = decode_body(response).await?;

        if status.is_success() {
            Ok(RawResponse {
                status: status.as_u16(),
                status_text,
                headers,
                data,
            })
        } else {
            Err(RequestError::Status {
                status: status.as_u16(),
                status_text,
                data,
            })
        }
    }
}

impl Transport for ReqwestTransport {
    fn invoke(&self, request: HttpRequest) -> BoxFuture<'_, Result<RawResponse, RequestError>> {
        Box::pin(self.execute(request))
    }
}

fn to_method(method: HttpMethod) -> Method {
    match method {
        HttpMethod::Get => Method::GET,
        HttpMethod::Post => Method::POST,
        HttpMethod::Put => Method::PUT,
        HttpMethod::Patch => Method::PATCH,
        HttpMethod::Delete => Method::DELETE,
        HttpMethod::Head => Method::HEAD,
    }
}

/// Flatten a params object into query pairs.
fn query_pairs(params: Option<&Value>) -> Vec<(String, String)> {
    let Some(Value::Object(fields)) = params else {
        return Vec::new();
    };
    fields
        .iter()
        .filter_map(|(key, value)| match value {
            Value::Null => None,
            Value::String(text) => Some((key.clone(), text.clone())),
            other => Some((key.clone(), other.to_string())),
        })
        .collect()
}

fn header_map(response: &Response) -> BTreeMap<String, String> {
    response
        .headers()
        .iter()
        .filter_map(|(name, value)| {
            Some((name.as_str().to_string(), value.to_str().ok()?.to_string()))
        })
        .collect()
}

async fn decode_body(response: Response) -> Result<Value, RequestError> {
    let bytes = response.bytes().await.map_err(|e| RequestError::Decode {
        message: e.to_string(),
    })?;
    if bytes.is_empty() {
        return Ok(Value::Null);
    }
    Ok(serde_json::from_slice(&bytes)
        .unwrap_or_else(|_| Value::String(String::from_utf8_lossy(&bytes).into_owned())))
}

fn network_error(error: reqwest::Error) -> RequestError {
    let message = if error.is_timeout() {
        format!("timeout: {error}")
    } else {
        error.to_string()
    };
    RequestError::Network { message }
}
