//! Page-sequence driver for one endpoint.
//!
//! Turns a single logical query into a lazy, finite sequence of raw
//! response pages. Each iteration issues one request, extracts the
//! continuation token from `paging.next`, and stops when none is found.
//! Classification of a response (ok / soft-skip / retryable / fatal)
//! happens in exactly one place here.

use serde_json::Value;

use graphtap_types::error::ExtractError;

use crate::backoff::compute_backoff;
use crate::transport::{Response, Transport};

/// Error title the upstream returns for media that predates the account's
/// business conversion. Not an error: the stream reports zero rows.
pub const SOFT_SKIP_TITLE: &str = "Media posted before business account conversion";

/// Request template for the first page of a sequence.
#[derive(Debug, Clone)]
pub struct PageRequest {
    /// Fully resolved endpoint URL.
    pub url: String,
    /// Base query parameters. A continuation token replaces these entirely.
    pub params: Vec<(String, String)>,
}

/// Single classification of a completed response.
#[derive(Debug)]
enum PageClass {
    Ok,
    SoftSkip(String),
    Retryable(ExtractError),
    Fatal(ExtractError),
}

fn classify_response(stream: &str, resp: &Response) -> PageClass {
    if let Some(title) = resp.error_user_title() {
        if title == SOFT_SKIP_TITLE {
            return PageClass::SoftSkip(title.to_string());
        }
    }
    match resp.status {
        200..=299 => PageClass::Ok,
        429 => PageClass::Retryable(ExtractError::rate_limit(
            stream,
            resp.error_message().unwrap_or("rate limit exceeded"),
            None,
        )),
        500..=599 => PageClass::Retryable(ExtractError::server(
            stream,
            resp.status,
            resp.error_message().unwrap_or("upstream server error"),
        )),
        status => PageClass::Fatal(ExtractError::client(
            stream,
            status,
            resp.error_message().unwrap_or("upstream rejected request"),
        )),
    }
}

/// Lazy page iterator over one (endpoint, params, context).
///
/// Yields raw response bodies; never touches bookmarks. A soft-skip ends
/// the sequence with zero pages and is observable via
/// [`Paginator::soft_skipped`].
pub struct Paginator<'a> {
    transport: &'a dyn Transport,
    stream: &'a str,
    context_desc: String,
    request: PageRequest,
    next_url: Option<String>,
    started: bool,
    done: bool,
    soft_skipped: bool,
    max_retries: u32,
    pages_fetched: u64,
}

impl<'a> Paginator<'a> {
    /// Start a page sequence. `context_desc` is attached to errors.
    #[must_use]
    pub fn new(
        transport: &'a dyn Transport,
        stream: &'a str,
        context_desc: String,
        request: PageRequest,
        max_retries: u32,
    ) -> Self {
        Self {
            transport,
            stream,
            context_desc,
            request,
            next_url: None,
            started: false,
            done: false,
            soft_skipped: false,
            max_retries,
            pages_fetched: 0,
        }
    }

    /// Whether the sequence ended on a recognized not-applicable payload.
    #[must_use]
    pub fn soft_skipped(&self) -> bool {
        self.soft_skipped
    }

    /// Pages successfully fetched so far.
    #[must_use]
    pub fn pages_fetched(&self) -> u64 {
        self.pages_fetched
    }

    /// Resolve the URL and params for the next request.
    ///
    /// A continuation token is a full follow-up URL; its query string
    /// replaces the base parameters entirely rather than merging.
    fn next_request(&self) -> Result<(String, Vec<(String, String)>), ExtractError> {
        match &self.next_url {
            None => Ok((self.request.url.clone(), self.request.params.clone())),
            Some(token) => {
                let parsed = url::Url::parse(token).map_err(|e| {
                    ExtractError::client(
                        self.stream,
                        0,
                        format!("malformed continuation URL '{token}': {e}"),
                    )
                    .with_context(self.context_desc.clone())
                })?;
                let params: Vec<(String, String)> = parsed
                    .query_pairs()
                    .map(|(k, v)| (k.into_owned(), v.into_owned()))
                    .collect();
                let mut base = parsed.clone();
                base.set_query(None);
                Ok((base.to_string(), params))
            }
        }
    }

    fn fetch_with_retry(
        &self,
        url: &str,
        params: &[(String, String)],
    ) -> Result<Response, ExtractError> {
        let mut attempt = 0u32;
        loop {
            attempt += 1;
            let err = match self.transport.execute("GET", url, params) {
                Ok(resp) => match classify_response(self.stream, &resp) {
                    PageClass::Retryable(err) => err,
                    _ => return Ok(resp),
                },
                Err(terr) if terr.retryable => {
                    ExtractError::transport(self.stream, terr.message)
                }
                Err(terr) => {
                    return Err(ExtractError::transport(self.stream, terr.message)
                        .into_fatal()
                        .with_context(self.context_desc.clone()))
                }
            };
            if attempt > self.max_retries {
                tracing::error!(
                    stream = self.stream,
                    context = self.context_desc.as_str(),
                    attempts = attempt,
                    "Retries exhausted: {err}"
                );
                return Err(err.into_fatal().with_context(self.context_desc.clone()));
            }
            let delay = compute_backoff(&err, attempt);
            tracing::warn!(
                stream = self.stream,
                attempt,
                max_retries = self.max_retries,
                delay_ms = u64::try_from(delay.as_millis()).unwrap_or(u64::MAX),
                "Retryable error, will retry: {err}"
            );
            std::thread::sleep(delay);
        }
    }
}

impl Iterator for Paginator<'_> {
    type Item = Result<Value, ExtractError>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.done {
            return None;
        }
        if self.started && self.next_url.is_none() {
            self.done = true;
            return None;
        }

        let (url, params) = match self.next_request() {
            Ok(pair) => pair,
            Err(err) => {
                self.done = true;
                return Some(Err(err));
            }
        };

        let resp = match self.fetch_with_retry(&url, &params) {
            Ok(resp) => resp,
            Err(err) => {
                self.done = true;
                return Some(Err(err));
            }
        };

        match classify_response(self.stream, &resp) {
            PageClass::Ok => {
                self.started = true;
                self.pages_fetched += 1;
                self.next_url = resp.next_page_url().map(str::to_string);
                if self.next_url.is_none() {
                    self.done = true;
                }
                Some(Ok(resp.body))
            }
            PageClass::SoftSkip(title) => {
                tracing::warn!(
                    stream = self.stream,
                    context = self.context_desc.as_str(),
                    title = title.as_str(),
                    "Skipping: entity not applicable for this stream"
                );
                self.done = true;
                self.soft_skipped = true;
                None
            }
            PageClass::Fatal(err) => {
                self.done = true;
                Some(Err(err.with_context(self.context_desc.clone())))
            }
            // fetch_with_retry already resolved retryable outcomes.
            PageClass::Retryable(err) => {
                self.done = true;
                Some(Err(err.into_fatal().with_context(self.context_desc.clone())))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transport::TransportError;
    use serde_json::json;
    use std::cell::RefCell;

    /// Scripted transport: pops one canned result per request and records
    /// what was asked of it.
    struct ScriptedTransport {
        responses: RefCell<Vec<Result<Response, TransportError>>>,
        requests: RefCell<Vec<(String, Vec<(String, String)>)>>,
    }

    impl ScriptedTransport {
        fn new(responses: Vec<Result<Response, TransportError>>) -> Self {
            let mut responses = responses;
            responses.reverse();
            Self {
                responses: RefCell::new(responses),
                requests: RefCell::new(Vec::new()),
            }
        }

        fn ok(body: Value) -> Result<Response, TransportError> {
            Ok(Response { status: 200, body })
        }
    }

    impl Transport for ScriptedTransport {
        fn execute(
            &self,
            _method: &str,
            url: &str,
            params: &[(String, String)],
        ) -> Result<Response, TransportError> {
            self.requests
                .borrow_mut()
                .push((url.to_string(), params.to_vec()));
            self.responses
                .borrow_mut()
                .pop()
                .expect("unexpected request")
        }
    }

    fn request() -> PageRequest {
        PageRequest {
            url: "https://api.test/v1/123/media".into(),
            params: vec![("access_token".into(), "tok".into())],
        }
    }

    fn page_with_next(id: u32, next: Option<&str>) -> Value {
        let mut body = json!({"data": [{"id": id.to_string()}]});
        if let Some(next) = next {
            body["paging"] = json!({"next": next});
        }
        body
    }

    #[test]
    fn three_pages_then_stop() {
        let transport = ScriptedTransport::new(vec![
            ScriptedTransport::ok(page_with_next(1, Some("https://api.test/v1/123/media?after=A"))),
            ScriptedTransport::ok(page_with_next(2, Some("https://api.test/v1/123/media?after=B"))),
            ScriptedTransport::ok(page_with_next(3, None)),
        ]);
        let pages: Vec<_> = Paginator::new(&transport, "media", "user_id=123".into(), request(), 3)
            .collect::<Result<_, _>>()
            .unwrap();
        assert_eq!(pages.len(), 3);
        assert_eq!(pages[2]["data"][0]["id"], "3");
    }

    #[test]
    fn single_page_without_token_yields_one() {
        let transport = ScriptedTransport::new(vec![ScriptedTransport::ok(page_with_next(1, None))]);
        let pages: Vec<_> = Paginator::new(&transport, "media", "user_id=123".into(), request(), 3)
            .collect::<Result<_, _>>()
            .unwrap();
        assert_eq!(pages.len(), 1);
    }

    #[test]
    fn continuation_params_replace_base_params() {
        let transport = ScriptedTransport::new(vec![
            ScriptedTransport::ok(page_with_next(
                1,
                Some("https://api.test/v1/123/media?after=CURSOR&access_token=tok2"),
            )),
            ScriptedTransport::ok(page_with_next(2, None)),
        ]);
        let mut base = request();
        base.params.push(("fields".into(), "id,timestamp".into()));
        let pages: Vec<_> = Paginator::new(&transport, "media", "user_id=123".into(), base, 3)
            .collect::<Result<_, _>>()
            .unwrap();
        assert_eq!(pages.len(), 2);

        let requests = transport.requests.borrow();
        // First request carries the base params.
        assert!(requests[0].1.iter().any(|(k, _)| k == "fields"));
        // Second request carries only the continuation URL's params.
        assert!(requests[1].1.iter().any(|(k, v)| k == "after" && v == "CURSOR"));
        assert!(!requests[1].1.iter().any(|(k, _)| k == "fields"));
    }

    #[test]
    fn soft_skip_yields_zero_pages_without_error() {
        let transport = ScriptedTransport::new(vec![Ok(Response {
            status: 400,
            body: json!({"error": {"message": "x", "error_user_title": SOFT_SKIP_TITLE}}),
        })]);
        let mut paginator =
            Paginator::new(&transport, "media_insights", "media_id=9".into(), request(), 3);
        assert!(paginator.next().is_none());
        assert!(paginator.soft_skipped());
    }

    #[test]
    fn client_error_is_fatal_with_context() {
        let transport = ScriptedTransport::new(vec![Ok(Response {
            status: 400,
            body: json!({"error": {"message": "Unsupported get request."}}),
        })]);
        let mut paginator =
            Paginator::new(&transport, "media", "user_id=123".into(), request(), 3);
        let err = paginator.next().unwrap().unwrap_err();
        assert_eq!(err.status, Some(400));
        assert_eq!(err.context.as_deref(), Some("user_id=123"));
        assert!(err.message.contains("Unsupported get request"));
        assert!(paginator.next().is_none());
    }

    #[test]
    fn server_error_retried_then_succeeds() {
        let transport = ScriptedTransport::new(vec![
            Ok(Response {
                status: 503,
                body: Value::Null,
            }),
            ScriptedTransport::ok(page_with_next(1, None)),
        ]);
        // Zero backoff would be nicer here; attempt 1 of a Normal class
        // sleeps 1s, acceptable for a single retry in tests.
        let pages: Vec<_> = Paginator::new(&transport, "media", "user_id=123".into(), request(), 3)
            .collect::<Result<_, _>>()
            .unwrap();
        assert_eq!(pages.len(), 1);
        assert_eq!(transport.requests.borrow().len(), 2);
    }

    #[test]
    fn retries_exhausted_promotes_to_fatal() {
        let transport = ScriptedTransport::new(vec![
            Err(TransportError {
                message: "timed out".into(),
                retryable: true,
            }),
            Err(TransportError {
                message: "timed out".into(),
                retryable: true,
            }),
        ]);
        let mut paginator =
            Paginator::new(&transport, "media", "user_id=123".into(), request(), 1);
        let err = paginator.next().unwrap().unwrap_err();
        assert!(!err.retryable);
        assert!(err.message.contains("timed out"));
    }
}
