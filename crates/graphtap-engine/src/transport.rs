//! Transport seam between the engine and HTTP.
//!
//! The core only ever sees [`Transport::execute`] and the small slice of
//! response shape it documents: the status code, the `{error: {...}}`
//! payload, and the `paging.next` continuation field. The real
//! [`HttpTransport`] is an explicitly constructed handle with a fixed
//! per-request timeout, not ambient global state.

use std::time::Duration;

use serde_json::Value;

/// Raw response as seen by the core.
///
/// Returned for every completed HTTP exchange regardless of status code;
/// status/payload classification happens in one place downstream.
#[derive(Debug, Clone, PartialEq)]
pub struct Response {
    pub status: u16,
    pub body: Value,
}

impl Response {
    /// `error.message` from the documented error payload shape.
    #[must_use]
    pub fn error_message(&self) -> Option<&str> {
        self.body.get("error")?.get("message")?.as_str()
    }

    /// `error.error_user_title` from the documented error payload shape.
    #[must_use]
    pub fn error_user_title(&self) -> Option<&str> {
        self.body.get("error")?.get("error_user_title")?.as_str()
    }

    /// `paging.next` continuation URL, when the page sequence continues.
    #[must_use]
    pub fn next_page_url(&self) -> Option<&str> {
        self.body.get("paging")?.get("next")?.as_str()
    }
}

/// Transport-level failure (no HTTP response was obtained).
#[derive(Debug, Clone, thiserror::Error)]
#[error("transport error: {message}")]
pub struct TransportError {
    pub message: String,
    /// Timeouts and connection failures are retryable; request-building
    /// failures are not.
    pub retryable: bool,
}

/// Capability the core uses to reach the upstream API.
pub trait Transport {
    /// Execute one request and return the raw response.
    ///
    /// # Errors
    ///
    /// Returns [`TransportError`] only when no response was obtained;
    /// non-2xx responses come back as `Ok`.
    fn execute(
        &self,
        method: &str,
        url: &str,
        params: &[(String, String)],
    ) -> Result<Response, TransportError>;
}

/// Blocking `reqwest` transport with a fixed per-request timeout.
pub struct HttpTransport {
    client: reqwest::blocking::Client,
}

impl HttpTransport {
    /// Build a transport with the given timeout and optional User-Agent.
    ///
    /// # Errors
    ///
    /// Returns an error if the underlying client cannot be constructed.
    pub fn new(timeout: Duration, user_agent: Option<&str>) -> anyhow::Result<Self> {
        let mut builder = reqwest::blocking::Client::builder().timeout(timeout);
        if let Some(ua) = user_agent {
            builder = builder.user_agent(ua.to_string());
        }
        Ok(Self {
            client: builder.build()?,
        })
    }
}

impl Transport for HttpTransport {
    fn execute(
        &self,
        method: &str,
        url: &str,
        params: &[(String, String)],
    ) -> Result<Response, TransportError> {
        let method: reqwest::Method = method.parse().map_err(|_| TransportError {
            message: format!("unsupported HTTP method: {method}"),
            retryable: false,
        })?;

        let response = self
            .client
            .request(method, url)
            .query(params)
            .send()
            .map_err(|e| TransportError {
                message: e.to_string(),
                retryable: e.is_timeout() || e.is_connect() || e.is_request(),
            })?;

        let status = response.status().as_u16();
        // Error responses carry a JSON payload too; an unparseable body is
        // classified downstream purely by status.
        let body = response.json::<Value>().unwrap_or(Value::Null);
        Ok(Response { status, body })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn response_accessors_read_documented_shape() {
        let resp = Response {
            status: 400,
            body: json!({
                "error": {
                    "message": "Unsupported get request.",
                    "error_user_title": "Media posted before business account conversion"
                }
            }),
        };
        assert_eq!(resp.error_message(), Some("Unsupported get request."));
        assert_eq!(
            resp.error_user_title(),
            Some("Media posted before business account conversion")
        );
        assert_eq!(resp.next_page_url(), None);
    }

    #[test]
    fn next_page_url_reads_paging_next() {
        let resp = Response {
            status: 200,
            body: json!({
                "data": [],
                "paging": {"next": "https://graph.facebook.com/v1/x?after=QVFI"}
            }),
        };
        assert_eq!(
            resp.next_page_url(),
            Some("https://graph.facebook.com/v1/x?after=QVFI")
        );
    }

    #[test]
    fn accessors_tolerate_missing_fields() {
        let resp = Response {
            status: 200,
            body: json!({"data": []}),
        };
        assert_eq!(resp.error_message(), None);
        assert_eq!(resp.error_user_title(), None);
        assert_eq!(resp.next_page_url(), None);
    }
}
